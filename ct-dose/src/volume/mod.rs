//! 体数据聚合.
//!
//! 按采样策略从切片序列中选出若干切片, 逐张计算直径, 最后求平均.
//! 分割失败的切片记为 0, 但不计入平均值的分母.
//!
//! # 注意
//!
//! 所有索引都从 0 开始. `Regional` 策略的输入沿用界面上从 1 开始的编号.

use crate::data::{CalibratedImage, SliceSource};
use crate::diameter::{self, water, DiameterConfig, WaterConfig};
use crate::error::{DoseError, DoseResult};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 切片采样策略.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SamplingPolicy {
    /// 所有切片.
    #[default]
    All,

    /// 每隔 `n` 张取一张: `0, n, 2n, ...`.
    Step(usize),

    /// 把序列分成 `n` 段近似等长的连续区间, 取每段的中间一张.
    Number(usize),

    /// 第 `a` 到第 `b` 张 (从 1 开始, 两端包含). `a > b` 时自动交换.
    Regional(usize, usize),
}

/// 采样得到的切片索引, 严格升序.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplingPlan {
    indices: Vec<usize>,
}

impl SamplingPlan {
    /// 对共 `total` 张切片的序列按 `policy` 采样.
    ///
    /// `Step(0)` 与 `Number(0)` 返回 [`DoseError::InvalidInput`];
    /// 采样结果为空时返回 [`DoseError::EmptyPlan`].
    pub fn new(policy: SamplingPolicy, total: usize) -> DoseResult<Self> {
        let indices: Vec<usize> = match policy {
            SamplingPolicy::All => (0..total).collect(),
            SamplingPolicy::Step(0) | SamplingPolicy::Number(0) => {
                return Err(DoseError::InvalidInput(format!("{policy:?} 的参数必须为正")))
            }
            SamplingPolicy::Step(n) => (0..total).step_by(n).collect(),
            SamplingPolicy::Number(n) => {
                let (base, extra) = (total / n, total % n);
                let mut start = 0;
                let mut ans = Vec::with_capacity(n);
                for i in 0..n {
                    let len = base + usize::from(i < extra);
                    if len > 0 {
                        ans.push(start + len / 2);
                    }
                    start += len;
                }
                ans
            }
            SamplingPolicy::Regional(a, b) => {
                let (first, last) = (a.min(b), a.max(b));
                (first.saturating_sub(1)..last.min(total)).collect()
            }
        };
        if indices.is_empty() {
            return Err(DoseError::EmptyPlan);
        }
        Ok(Self { indices })
    }

    /// 采样的索引.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// 采样个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// 是否为空. 构建成功的计划总是返回 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// 按升序迭代索引.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }
}

/// 逐张计算所用的直径.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DiameterMode {
    /// 有效直径 (Deff).
    Effective(DiameterConfig),

    /// 水等效直径 (Dw).
    WaterEquivalent(WaterConfig),
}

impl Default for DiameterMode {
    fn default() -> Self {
        Self::Effective(DiameterConfig::default())
    }
}

impl DiameterMode {
    /// 计算单张切片的直径 (cm).
    pub fn measure(&self, image: &CalibratedImage) -> DoseResult<f64> {
        match self {
            Self::Effective(cfg) => diameter::diameter_from_image(image, cfg).map(|r| r.diameter),
            Self::WaterEquivalent(cfg) => water::dw_from_image(image, cfg),
        }
    }
}

/// 长时间计算的进度与取消通道.
pub trait ProgressReporter {
    /// 已完成 `done` / `total` 项. 返回 `false` 表示请求取消.
    fn progress(&mut self, done: usize, total: usize) -> bool;
}

impl<F: FnMut(usize, usize) -> bool> ProgressReporter for F {
    #[inline]
    fn progress(&mut self, done: usize, total: usize) -> bool {
        self(done, total)
    }
}

/// 不关心进度, 也从不取消.
#[derive(Copy, Clone, Debug, Default)]
pub struct Silent;

impl ProgressReporter for Silent {
    #[inline]
    fn progress(&mut self, _: usize, _: usize) -> bool {
        true
    }
}

/// 体数据聚合结果.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeDiameter {
    /// 平均直径 (cm) = 所有已处理切片的直径之和 / 分割成功的切片数.
    pub mean: f64,

    /// 已处理的切片索引, 升序. 取消时只包含取消前处理完的切片.
    pub indices: Vec<usize>,

    /// 每张已处理切片的直径. 分割失败的切片为 0.
    pub values: BTreeMap<usize, f64>,

    /// 分割失败 (或无法标定) 的切片.
    pub failed: Vec<usize>,

    /// 是否被取消.
    pub cancelled: bool,
}

impl VolumeDiameter {
    /// 分割成功的切片索引.
    pub fn valid_indices(&self) -> Vec<usize> {
        self.indices
            .iter()
            .copied()
            .filter(|i| !self.failed.contains(i))
            .collect()
    }

    fn collect<I: IntoIterator<Item = (usize, Option<f64>)>>(
        results: I,
        cancelled: bool,
    ) -> DoseResult<Self> {
        let mut values = BTreeMap::new();
        let mut failed = vec![];
        for (idx, d) in results {
            if d.is_none() {
                failed.push(idx);
            }
            values.insert(idx, d.unwrap_or(0.0));
        }
        failed.sort_unstable();
        let n_seg = values.len() - failed.len();
        if n_seg == 0 {
            log::warn!("{} 张切片全部分割失败", values.len());
            return Err(DoseError::NoSegmentedSlice);
        }
        let mean = values.values().sum::<f64>() / n_seg as f64;
        Ok(Self {
            mean,
            indices: values.keys().copied().collect(),
            values,
            failed,
            cancelled,
        })
    }
}

/// 计算单张切片; 分割失败与无法标定记为 `None`, 其余错误向上传递.
fn measure_slice<S: SliceSource + ?Sized>(
    source: &S,
    idx: usize,
    mode: &DiameterMode,
) -> DoseResult<Option<f64>> {
    if idx >= source.len() {
        return Err(DoseError::SliceOutOfRange(idx, source.len()));
    }
    let Some(image) = source.image_at(idx) else {
        return Ok(None);
    };
    match mode.measure(&image) {
        Ok(d) => {
            log::debug!("第 {idx} 张切片直径 {d:.2} cm");
            Ok(Some(d))
        }
        Err(DoseError::SegmentationFailed) => Ok(None),
        Err(e) => Err(e),
    }
}

/// 按采样计划逐张计算直径并求平均.
///
/// 每处理完一张切片调用一次 `reporter`; 它返回 `false` 时停止, 返回已处理部分的结果.
/// 没有任何切片分割成功时返回 [`DoseError::NoSegmentedSlice`].
pub fn aggregate<S, R>(
    source: &S,
    plan: &SamplingPlan,
    mode: &DiameterMode,
    reporter: &mut R,
) -> DoseResult<VolumeDiameter>
where
    S: SliceSource + ?Sized,
    R: ProgressReporter + ?Sized,
{
    let total = plan.len();
    let mut results = Vec::with_capacity(total);
    let mut cancelled = false;
    for (done, idx) in plan.iter().enumerate() {
        results.push((idx, measure_slice(source, idx, mode)?));
        if !reporter.progress(done + 1, total) && done + 1 < total {
            log::info!("聚合在 {} / {total} 张切片后被取消", done + 1);
            cancelled = true;
            break;
        }
    }
    VolumeDiameter::collect(results, cancelled)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 借助 `rayon`, 并行地按采样计划计算直径并求平均.
///
/// 结果按切片索引组织, 与完成顺序无关. `keep_going(done, total)` 返回 `false` 后,
/// 尚未开始的切片被跳过, 因此取消时已处理的切片不一定是计划的前缀.
#[cfg(feature = "rayon")]
pub fn par_aggregate<S, F>(
    source: &S,
    plan: &SamplingPlan,
    mode: &DiameterMode,
    keep_going: F,
) -> DoseResult<VolumeDiameter>
where
    S: SliceSource + Sync + ?Sized,
    F: Fn(usize, usize) -> bool + Sync,
{
    let total = plan.len();
    let done = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let results: Vec<Option<(usize, Option<f64>)>> = plan
        .indices()
        .into_par_iter()
        .map(|&idx| -> DoseResult<Option<(usize, Option<f64>)>> {
            if stop.load(Ordering::Relaxed) {
                return Ok(None);
            }
            let d = measure_slice(source, idx, mode)?;
            let n = done.fetch_add(1, Ordering::SeqCst) + 1;
            if !keep_going(n, total) {
                stop.store(true, Ordering::Relaxed);
            }
            Ok(Some((idx, d)))
        })
        .collect::<DoseResult<_>>()?;

    let cancelled = results.iter().any(Option::is_none);
    if cancelled {
        log::info!("并行聚合被取消");
    }
    VolumeDiameter::collect(results.into_iter().flatten(), cancelled)
}
