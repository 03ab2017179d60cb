//! 三次样条曲线.

use super::{Interpolated, SplineError};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use ndarray_linalg::Solve;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ref: https://zhuanlan.zhihu.com/p/628508199

/// 样条的边界条件.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SplineBoundary {
    /// 自然边界: 两端二阶导数为 0.
    Natural,

    /// 非节点边界: 第一, 二段 (以及最后两段) 的三阶导数相同.
    ///
    /// 三个点时曲线退化为过三点的抛物线; 两个点时退化为直线.
    #[default]
    NotAKnot,
}

/// 插值三次样条.
///
/// 第 `i` 段 (`x[i] <= t <= x[i + 1]`) 上, 曲线为
/// `y[i] + b * dt + c * dt^2 + d * dt^3`, 其中 `dt = t - x[i]`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CubicSpline {
    x: Array1<f64>,
    y: Array1<f64>,

    /// 每段的系数 `[b, c, d]`, 形状为 `(n - 1, 3)`.
    coe: Array2<f64>,
}

impl CubicSpline {
    /// 由表格点构建样条.
    ///
    /// `x` 必须严格递增或严格递减. 递减时内部会反转为递增.
    pub fn new(
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        boundary: SplineBoundary,
    ) -> Result<Self, SplineError> {
        if x.len() != y.len() {
            return Err(SplineError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(SplineError::TooFewPoints(x.len()));
        }
        if !x.iter().chain(y.iter()).all(|v| v.is_finite()) {
            return Err(SplineError::NonFinite);
        }

        let increasing = x.windows(2).into_iter().all(|v| v[0] < v[1]);
        let decreasing = x.windows(2).into_iter().all(|v| v[0] > v[1]);
        let (x, y) = match (increasing, decreasing) {
            (true, _) => (x.to_owned(), y.to_owned()),
            (_, true) => (
                x.slice(s![..;-1]).to_owned(),
                y.slice(s![..;-1]).to_owned(),
            ),
            _ => return Err(SplineError::NotMonotonic),
        };

        let coe = Self::spline_coefficient(x.view(), y.view(), boundary)?;
        Ok(Self { x, y, coe })
    }

    /// 表格定义域 `(下界, 上界)`.
    #[inline]
    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// 表格点个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// 是否没有表格点. 构建成功的样条总是返回 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// 在 `t` 处求值. 超出定义域时使用两端多项式外推.
    pub fn eval(&self, t: f64) -> Interpolated {
        let (lower, upper) = self.domain();
        let segments = self.coe.len_of(Axis(0));
        let xs = self.x.as_slice().unwrap_or(&[]);
        let i = xs
            .partition_point(|v| *v <= t)
            .saturating_sub(1)
            .min(segments - 1);
        Interpolated {
            value: self.eval_segment(i, t),
            extrapolated: t < lower || t > upper,
        }
    }

    #[inline]
    fn eval_segment(&self, i: usize, t: f64) -> f64 {
        let dt = t - self.x[i];
        let (b, c, d) = (self.coe[(i, 0)], self.coe[(i, 1)], self.coe[(i, 2)]);
        self.y[i] + dt * (b + dt * (c + dt * d))
    }

    fn array1_diff(arr: ArrayView1<f64>) -> Array1<f64> {
        let vector: Vec<f64> = arr.windows(2).into_iter().map(|v| v[1] - v[0]).collect();
        Array1::from_vec(vector)
    }

    fn spline_coefficient(
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        boundary: SplineBoundary,
    ) -> Result<Array2<f64>, SplineError> {
        let len = x.len();
        let mut a = Array2::<f64>::zeros((len, len));
        let mut r = Array1::<f64>::zeros(len);
        let dx = Self::array1_diff(x);
        let dy = Self::array1_diff(y);
        for i in 1..(len - 1) {
            let mut a_slice = a.slice_mut(s![i, (i - 1)..=(i + 1)]);
            a_slice.assign(&ArrayView1::from(&[
                dx[i - 1],
                2.0 * (dx[i - 1] + dx[i]),
                dx[i],
            ]));
            r[i] = 3.0 * (dy[i] / dx[i] - dy[i - 1] / dx[i - 1]);
        }

        let last = len - 1;
        match (boundary, len) {
            (SplineBoundary::NotAKnot, 3) => {
                // 抛物线: 两段二阶系数相同.
                a.slice_mut(s![0, 0..2]).assign(&ArrayView1::from(&[1.0, -1.0]));
                a.slice_mut(s![last, 1..3]).assign(&ArrayView1::from(&[1.0, -1.0]));
            }
            (SplineBoundary::NotAKnot, n) if n >= 4 => {
                a.slice_mut(s![0, 0..3]).assign(&ArrayView1::from(&[
                    -dx[1],
                    dx[0] + dx[1],
                    -dx[0],
                ]));
                a.slice_mut(s![last, (last - 2)..=last]).assign(&ArrayView1::from(&[
                    -dx[last - 1],
                    dx[last - 2] + dx[last - 1],
                    -dx[last - 2],
                ]));
            }
            _ => {
                a[(0, 0)] = 1.0;
                a[(last, last)] = 1.0;
            }
        }

        let c = a.solve(&r).map_err(|e| {
            log::debug!("样条方程组求解失败: {e}");
            SplineError::Singular
        })?;

        let mut coe: Array2<f64> = Array2::zeros((len - 1, 3));
        for i in 0..(len - 1) {
            coe[(i, 1)] = c[i];
            coe[(i, 2)] = (c[i + 1] - c[i]) / (3.0 * dx[i]);
            coe[(i, 0)] = dy[i] / dx[i] - dx[i] * (2.0 * c[i] + c[i + 1]) / 3.0;
        }
        Ok(coe)
    }
}

#[cfg(test)]
mod tests {
    use super::{CubicSpline, SplineBoundary};
    use crate::fitting::SplineError;
    use ndarray::{array, Array1};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reject_bad_input() {
        let x = array![0.0, 1.0, 1.0, 2.0];
        let y = array![0.0, 1.0, 2.0, 3.0];
        assert_eq!(
            CubicSpline::new(x.view(), y.view(), SplineBoundary::Natural).unwrap_err(),
            SplineError::NotMonotonic
        );
        let x = array![0.0];
        assert_eq!(
            CubicSpline::new(x.view(), x.view(), SplineBoundary::Natural).unwrap_err(),
            SplineError::TooFewPoints(1)
        );
        let x = array![0.0, 1.0];
        let y = array![0.0, 1.0, 2.0];
        assert!(matches!(
            CubicSpline::new(x.view(), y.view(), SplineBoundary::Natural),
            Err(SplineError::LengthMismatch { x: 2, y: 3 })
        ));
    }

    #[test]
    fn test_natural_line() {
        let x = array![0.0, 1.0, 2.5, 4.0];
        let y = x.mapv(|v| 2.0 * v + 1.0);
        let sp = CubicSpline::new(x.view(), y.view(), SplineBoundary::Natural).unwrap();
        for t in [0.0, 0.3, 1.7, 3.9, 4.0] {
            assert!(f64_eq(sp.eval(t).value, 2.0 * t + 1.0));
        }
    }

    #[test]
    fn test_not_a_knot_reproduces_cubic() {
        let f = |v: f64| v * v * v - 2.0 * v + 0.5;
        let x: Array1<f64> = array![0.0, 1.0, 2.0, 3.5, 5.0];
        let y = x.mapv(f);
        let sp = CubicSpline::new(x.view(), y.view(), SplineBoundary::NotAKnot).unwrap();
        for t in [0.25, 1.5, 2.5, 4.75] {
            let r = sp.eval(t);
            assert!(!r.extrapolated);
            assert!((r.value - f(t)).abs() < 1e-8, "{t}: {} vs {}", r.value, f(t));
        }
        // 外推
        let r = sp.eval(6.0);
        assert!(r.extrapolated);
        assert!((r.value - f(6.0)).abs() < 1e-6);
    }

    #[test]
    fn test_natural_reference_values() {
        // 二阶系数 c = [0, -2, 2, 0].
        let x = array![0.0, 1.0, 2.0, 3.0];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let sp = CubicSpline::new(x.view(), y.view(), SplineBoundary::Natural).unwrap();
        assert!(f64_eq(sp.eval(0.5).value, 0.75));
        assert!(f64_eq(sp.eval(1.5).value, 0.5));
        assert!(f64_eq(sp.eval(2.5).value, 0.25));
        for i in 0..4 {
            assert!(f64_eq(sp.eval(x[i]).value, y[i]));
        }
    }

    #[test]
    fn test_three_points_parabola() {
        let x = array![0.0, 1.0, 3.0];
        let y = x.mapv(|v| v * v);
        let sp = CubicSpline::new(x.view(), y.view(), SplineBoundary::NotAKnot).unwrap();
        assert!(f64_eq(sp.eval(2.0).value, 4.0));
        assert!(f64_eq(sp.eval(0.5).value, 0.25));
    }

    #[test]
    fn test_decreasing_x() {
        let x = array![3.0, 2.0, 1.0, 0.0];
        let y = array![9.0, 4.0, 1.0, 0.0];
        let sp = CubicSpline::new(x.view(), y.view(), SplineBoundary::NotAKnot).unwrap();
        assert_eq!(sp.domain(), (0.0, 3.0));
        assert!(f64_eq(sp.eval(2.0).value, 4.0));
        assert!(f64_eq(sp.eval(1.5).value, 2.25));
    }
}
