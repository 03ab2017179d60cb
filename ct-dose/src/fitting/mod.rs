//! 曲线拟合与插值.
//!
//! 给定一系列表格点 `(x, y)`, 该模块拟合三次样条曲线, 并在任意位置求值.
//! 超出表格定义域的输入以两端多项式外推, 结果会被标记.

use crate::error::{DoseResult, DoseWarning, Outcome};
use ndarray::ArrayView1;
use once_cell::sync::OnceCell;
use thiserror::Error;

mod cubic_spline;

pub use cubic_spline::{CubicSpline, SplineBoundary};

/// 样条构建错误.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplineError {
    /// `x` 与 `y` 长度不一致.
    #[error("x 值 ({x} 个) 和 y 值 ({y} 个) 必须一一对应")]
    LengthMismatch {
        /// `x` 的长度.
        x: usize,
        /// `y` 的长度.
        y: usize,
    },

    /// 点数不足 (至少两个).
    #[error("样条曲线至少需要两个点, 实际为 {0} 个")]
    TooFewPoints(usize),

    /// `x` 不是严格单调的.
    #[error("x 值必须严格递减或严格递增")]
    NotMonotonic,

    /// 输入含有 inf 或 NaN.
    #[error("输入含有非有限值")]
    NonFinite,

    /// 线性方程组奇异.
    #[error("系数矩阵奇异")]
    Singular,
}

/// 插值结果.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Interpolated {
    /// 函数值.
    pub value: f64,

    /// 自变量是否位于表格定义域之外.
    pub extrapolated: bool,
}

impl Interpolated {
    /// 转换为带警告的结果. `domain` 为表格定义域 `(下界, 上界)`.
    pub fn into_outcome(self, x: f64, (lower, upper): (f64, f64)) -> Outcome<f64> {
        if self.extrapolated {
            Outcome::with_warnings(
                self.value,
                vec![DoseWarning::Extrapolated { x, lower, upper }],
            )
        } else {
            Outcome::clean(self.value)
        }
    }
}

/// 表格曲线. 首次求值时拟合非节点三次样条并缓存.
///
/// 表格在载入后只读, 因此可以在线程之间共享.
#[derive(Debug, Clone)]
pub struct TabulatedCurve {
    x: Vec<f64>,
    y: Vec<f64>,
    spline: OnceCell<Result<CubicSpline, SplineError>>,
}

impl TabulatedCurve {
    /// 由表格点创建. 合法性检查推迟到第一次求值.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            x,
            y,
            spline: OnceCell::new(),
        }
    }

    /// 表格点 `(x, y)`.
    #[inline]
    pub fn points(&self) -> (&[f64], &[f64]) {
        (&self.x, &self.y)
    }

    /// 拟合好的样条.
    pub fn spline(&self) -> Result<&CubicSpline, SplineError> {
        self.spline
            .get_or_init(|| {
                CubicSpline::new(
                    ArrayView1::from(&self.x[..]),
                    ArrayView1::from(&self.y[..]),
                    SplineBoundary::NotAKnot,
                )
            })
            .as_ref()
            .map_err(|e| *e)
    }

    /// 表格定义域 `(下界, 上界)`.
    #[inline]
    pub fn domain(&self) -> Result<(f64, f64), SplineError> {
        self.spline().map(CubicSpline::domain)
    }

    /// 在 `x` 处插值. 超出定义域时外推, 并附带 [`DoseWarning::Extrapolated`].
    pub fn eval(&self, x: f64) -> DoseResult<Outcome<f64>> {
        let spline = self.spline()?;
        Ok(spline.eval(x).into_outcome(x, spline.domain()))
    }
}
