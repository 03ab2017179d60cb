//! 运行时错误与可恢复警告.

use crate::fitting::SplineError;
use thiserror::Error;

/// 计算过程中调用者必须处理的错误.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DoseError {
    /// 没有满足条件 (位置, 面积) 的区域. 调用者可以调整阈值或最小面积后重试.
    #[error("分割失败: 未找到符合条件的对象")]
    SegmentationFailed,

    /// 体数据聚合中没有任何一张切片分割成功, 平均值无定义.
    #[error("没有任何切片分割成功")]
    NoSegmentedSlice,

    /// 采样计划为空.
    #[error("采样计划为空")]
    EmptyPlan,

    /// 会话尚未载入图像 (或已关闭).
    #[error("会话未载入图像")]
    SessionClosed,

    /// 切片索引越界. 第一个参数为索引, 第二个为切片总数.
    #[error("切片索引 {0} 越界 (共 {1} 张)")]
    SliceOutOfRange(usize, usize),

    /// 输入参数不合法.
    #[error("非法输入: {0}")]
    InvalidInput(String),

    /// 查表失败或某切片缺少必要结果.
    #[error("无数据: {0}")]
    NoData(String),

    /// 插值表无法构建样条.
    #[error("样条构建失败: {0}")]
    Spline(#[from] SplineError),
}

/// 计算结果.
pub type DoseResult<T> = Result<T, DoseError>;

/// 已就地恢复, 但需要告知调用者的情况.
#[derive(Debug, Clone, PartialEq)]
pub enum DoseWarning {
    /// DICOM 标签缺失, 已以默认值 (通常为 0) 代替. 参数为标签名.
    MissingAttribute(&'static str),

    /// 系数表中没有对应数据, 依赖值已置 0.
    NoData(String),

    /// 螺距为 0, 有效 mAs 退化为 mAs, CTDIvol 置 0.
    ZeroPitch,

    /// 插值自变量超出表格定义域, 结果为外推值.
    Extrapolated {
        /// 输入值.
        x: f64,
        /// 定义域下界.
        lower: f64,
        /// 定义域上界.
        upper: f64,
    },
}

/// 带警告的计算结果 (值 + 状态).
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// 计算值. 出现警告时可能是默认值.
    pub value: T,

    /// 计算过程中的所有警告.
    pub warnings: Vec<DoseWarning>,
}

impl<T> Outcome<T> {
    /// 没有警告的结果.
    #[inline]
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: vec![],
        }
    }

    /// 带警告的结果.
    #[inline]
    pub fn with_warnings(value: T, warnings: Vec<DoseWarning>) -> Self {
        Self { value, warnings }
    }

    /// 是否没有任何警告.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// 所有缺失的标签名.
    pub fn missing_attributes(&self) -> Vec<&'static str> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                DoseWarning::MissingAttribute(name) => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// 对值做变换, 保留警告.
    pub fn map<U, F: FnOnce(T) -> U>(self, op: F) -> Outcome<U> {
        Outcome {
            value: op(self.value),
            warnings: self.warnings,
        }
    }

    /// 丢弃警告, 取出值.
    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }
}
