//! 计算会话.
//!
//! 一个会话对应一次打开的检查: 载入切片序列后, 直径, CTDIvol, SSDE 等结果可以分步计算,
//! 按切片索引累积在会话中, 最后汇总为一条 [`PatientRecord`]. 关闭会话会丢弃所有结果.

use crate::data::{CtSeries, PatientInfo, SliceSource};
use crate::dose::ssde::{self, ConversionFactor, EffectiveDoseModel, SsdeResult, VolumeSsde};
use crate::dose::CtdiEstimate;
use crate::error::{DoseError, DoseResult};
use crate::volume::{DiameterMode, SamplingPlan, VolumeDiameter};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 直径的种类.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DiameterKind {
    /// 有效直径.
    Effective,

    /// 水等效直径.
    WaterEquivalent,
}

impl DiameterKind {
    /// 记录中使用的简称.
    pub fn abbr(&self) -> &'static str {
        match self {
            Self::Effective => "Deff",
            Self::WaterEquivalent => "Dw",
        }
    }
}

impl From<&DiameterMode> for DiameterKind {
    #[inline]
    fn from(mode: &DiameterMode) -> Self {
        match mode {
            DiameterMode::Effective(_) => Self::Effective,
            DiameterMode::WaterEquivalent(_) => Self::WaterEquivalent,
        }
    }
}

/// 会话中累积的结果. 按切片索引 (从 0 开始) 保存.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionResults {
    /// 各切片的 CTDIvol, mGy.
    pub ctdi: BTreeMap<usize, f64>,

    /// 各切片的直径, cm.
    pub diameters: BTreeMap<usize, f64>,

    /// 各切片的 SSDE, mGy.
    pub ssde: BTreeMap<usize, f64>,

    /// 各切片的转换因子.
    pub conversion_factors: BTreeMap<usize, f64>,

    /// 各切片的修正 DLP, mGy·cm.
    pub dlp_corrected: BTreeMap<usize, f64>,

    /// 各切片的有效剂量, mSv.
    pub effective_doses: BTreeMap<usize, f64>,

    /// 当前直径.
    pub diameter: Option<f64>,

    /// 当前直径的种类.
    pub diameter_kind: Option<DiameterKind>,

    /// 当前 CTDIvol.
    pub ctdi_vol: Option<f64>,

    /// 当前 DLP.
    pub dlp: Option<f64>,

    /// 汇总 SSDE 结果.
    pub summary: Option<SsdeResult>,
}

impl SessionResults {
    fn store_ssde(&mut self, idx: usize, r: &SsdeResult) {
        self.ssde.insert(idx, r.ssde);
        self.conversion_factors.insert(idx, r.conversion_factor);
        self.dlp_corrected.insert(idx, r.dlp_corrected);
        self.effective_doses.insert(idx, r.effective_dose);
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Closed,
    Loaded {
        series: CtSeries,
        results: SessionResults,
    },
}

/// 计算会话. 只有两种状态: 未载入 (关闭) 与已载入.
#[derive(Debug, Default)]
pub struct DoseSession {
    state: State,
}

impl DoseSession {
    /// 创建一个关闭的会话.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 载入切片序列. 已有的序列与结果被丢弃.
    pub fn load(&mut self, series: CtSeries) {
        log::info!("载入 {} 张切片", series.len());
        self.state = State::Loaded {
            series,
            results: SessionResults::default(),
        };
    }

    /// 是否已载入.
    #[inline]
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, State::Loaded { .. })
    }

    /// 关闭会话, 交还切片序列.
    pub fn close(&mut self) -> DoseResult<CtSeries> {
        match std::mem::take(&mut self.state) {
            State::Closed => Err(DoseError::SessionClosed),
            State::Loaded { series, .. } => Ok(series),
        }
    }

    /// 当前切片序列.
    pub fn series(&self) -> DoseResult<&CtSeries> {
        match &self.state {
            State::Closed => Err(DoseError::SessionClosed),
            State::Loaded { series, .. } => Ok(series),
        }
    }

    /// 当前累积的结果.
    pub fn results(&self) -> DoseResult<&SessionResults> {
        match &self.state {
            State::Closed => Err(DoseError::SessionClosed),
            State::Loaded { results, .. } => Ok(results),
        }
    }

    fn loaded_mut(&mut self) -> DoseResult<(&CtSeries, &mut SessionResults)> {
        match &mut self.state {
            State::Closed => Err(DoseError::SessionClosed),
            State::Loaded { series, results } => Ok((series, results)),
        }
    }

    fn checked_mut(&mut self, idx: usize) -> DoseResult<&mut SessionResults> {
        let (series, results) = self.loaded_mut()?;
        if idx >= series.len() {
            return Err(DoseError::SliceOutOfRange(idx, series.len()));
        }
        Ok(results)
    }

    /// 设置当前直径 (例如手动输入).
    pub fn set_diameter(&mut self, diameter: f64, kind: DiameterKind) -> DoseResult<()> {
        let (_, results) = self.loaded_mut()?;
        results.diameter = Some(diameter);
        results.diameter_kind = Some(kind);
        Ok(())
    }

    /// 记录第 `idx` 张切片的直径, 同时作为当前直径.
    pub fn set_slice_diameter(
        &mut self,
        idx: usize,
        diameter: f64,
        kind: DiameterKind,
    ) -> DoseResult<()> {
        let results = self.checked_mut(idx)?;
        results.diameters.insert(idx, diameter);
        results.diameter = Some(diameter);
        results.diameter_kind = Some(kind);
        Ok(())
    }

    /// 记录体数据聚合结果. 只保存分割成功的切片, 平均直径作为当前直径.
    pub fn apply_volume_diameter(
        &mut self,
        volume: &VolumeDiameter,
        kind: DiameterKind,
    ) -> DoseResult<()> {
        let (_, results) = self.loaded_mut()?;
        for idx in volume.valid_indices() {
            if let Some(&d) = volume.values.get(&idx) {
                results.diameters.insert(idx, d);
            }
        }
        results.diameter = Some(volume.mean);
        results.diameter_kind = Some(kind);
        Ok(())
    }

    /// 设置当前 CTDIvol 与 DLP.
    pub fn set_ctdi(&mut self, estimate: CtdiEstimate) -> DoseResult<()> {
        let (_, results) = self.loaded_mut()?;
        results.ctdi_vol = Some(estimate.ctdi_vol);
        results.dlp = Some(estimate.dlp);
        Ok(())
    }

    /// 记录第 `idx` 张切片的 CTDIvol (管电流调制时逐张不同).
    pub fn set_slice_ctdi(&mut self, idx: usize, ctdi_vol: f64) -> DoseResult<()> {
        self.checked_mut(idx)?.ctdi.insert(idx, ctdi_vol);
        Ok(())
    }

    /// 记录第 `idx` 张切片的 SSDE 结果, 同时作为汇总结果.
    pub fn apply_slice_ssde(&mut self, idx: usize, result: &SsdeResult) -> DoseResult<()> {
        let results = self.checked_mut(idx)?;
        results.store_ssde(idx, result);
        results.summary = Some(*result);
        Ok(())
    }

    /// 记录多张切片的 SSDE 结果.
    pub fn apply_volume_ssde(&mut self, volume: &VolumeSsde) -> DoseResult<()> {
        let (_, results) = self.loaded_mut()?;
        for (&idx, r) in &volume.per_slice {
            results.store_ssde(idx, r);
        }
        results.summary = Some(volume.summary);
        Ok(())
    }

    /// 用会话中已有的逐张直径与 CTDIvol 计算 `plan` 上的 SSDE, 并记录结果.
    ///
    /// 尚未设置 DLP 时返回 [`DoseError::NoData`].
    pub fn compute_volume_ssde(
        &mut self,
        plan: &SamplingPlan,
        cf: &ConversionFactor,
        ed: &EffectiveDoseModel,
    ) -> DoseResult<VolumeSsde> {
        let (_, results) = self.loaded_mut()?;
        let dlp = results
            .dlp
            .ok_or_else(|| DoseError::NoData("尚未计算 DLP".into()))?;
        let volume = ssde::volume_ssde(
            plan.indices(),
            &results.diameters,
            &results.ctdi,
            dlp,
            cf,
            ed,
        )?;
        self.apply_volume_ssde(&volume)?;
        Ok(volume)
    }

    /// 由当前结果与患者信息汇总一条记录.
    pub fn record(&self) -> DoseResult<PatientRecord> {
        let series = self.series()?;
        let results = self.results()?;
        Ok(PatientRecord::new(series.patient(), results))
    }

    /// 汇总记录后关闭会话.
    pub fn save(&mut self) -> DoseResult<PatientRecord> {
        let record = self.record()?;
        let empty = record.empty_fields();
        if !empty.is_empty() {
            log::warn!("以下字段为空: {}", empty.join(", "));
        }
        self.close()?;
        Ok(record)
    }
}

/// 一条患者记录.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PatientRecord {
    /// 患者信息.
    pub patient: PatientInfo,

    /// CTDIvol, mGy.
    pub ctdi_vol: Option<f64>,

    /// 直径, cm.
    pub diameter: Option<f64>,

    /// 直径种类.
    pub diameter_kind: Option<DiameterKind>,

    /// SSDE, mGy.
    pub ssde: Option<f64>,

    /// DLP, mGy·cm.
    pub dlp: Option<f64>,

    /// 修正后的 DLP, mGy·cm.
    pub dlp_corrected: Option<f64>,

    /// 有效剂量, mSv.
    pub effective_dose: Option<f64>,
}

impl PatientRecord {
    fn new(patient: &PatientInfo, results: &SessionResults) -> Self {
        let summary = results.summary.as_ref();
        Self {
            patient: patient.clone(),
            ctdi_vol: results.ctdi_vol.or(summary.map(|s| s.ctdi_vol)),
            diameter: results.diameter.or(summary.map(|s| s.diameter)),
            diameter_kind: results.diameter_kind,
            ssde: summary.map(|s| s.ssde),
            dlp: results.dlp,
            dlp_corrected: summary.map(|s| s.dlp_corrected),
            effective_dose: summary.map(|s| s.effective_dose),
        }
    }

    /// 为空的字段名.
    pub fn empty_fields(&self) -> Vec<&'static str> {
        let p = &self.patient;
        [
            ("patient_id", p.id.is_none()),
            ("name", p.name.is_none()),
            ("age", p.age.is_none()),
            ("sex", p.sex.is_none()),
            ("exam_date", p.date.is_none()),
            ("institution", p.institution.is_none()),
            ("manufacturer", p.manufacturer.is_none()),
            ("model", p.model.is_none()),
            ("protocol", p.protocol.is_none()),
            ("ctdi_vol", self.ctdi_vol.is_none()),
            ("diameter", self.diameter.is_none()),
            ("diameter_mode", self.diameter_kind.is_none()),
            ("ssde", self.ssde.is_none()),
            ("dlp", self.dlp.is_none()),
            ("dlp_corrected", self.dlp_corrected.is_none()),
            ("effective_dose", self.effective_dose.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect()
    }
}
