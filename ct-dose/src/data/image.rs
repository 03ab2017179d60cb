//! 标定后的 CT 图像.

use super::{BinaryMask, CtWindow, RawSlice};
use crate::consts::AIR_HU;
use crate::error::{DoseError, DoseResult, DoseWarning, Outcome};
use crate::Idx2d;
use ndarray::iter::Iter;
use ndarray::{Array2, ArrayView2, Ix2};
use std::ops::Index;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 单张标定后的 CT 切片, 像素为 HU 值.
///
/// 标定之后不可变. 像素间距与重建直径总是严格为正.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibratedImage {
    data: Array2<i16>,

    /// (行方向, 列方向), 毫米.
    pixel_spacing: (f64, f64),

    /// 毫米.
    reconstruction_diameter: f64,

    slice_location: Option<f64>,
}

impl Index<Idx2d> for CalibratedImage {
    type Output = i16;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

#[inline]
fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

impl CalibratedImage {
    /// 由 HU 像素数组直接构建.
    ///
    /// 像素间距 (行, 列) 与重建直径 (毫米) 必须为有限正数, 图像不能为空.
    pub fn new(
        data: Array2<i16>,
        pixel_spacing: (f64, f64),
        reconstruction_diameter: f64,
    ) -> DoseResult<Self> {
        if data.is_empty() {
            return Err(DoseError::InvalidInput("空图像".into()));
        }
        if !is_positive(pixel_spacing.0) || !is_positive(pixel_spacing.1) {
            return Err(DoseError::InvalidInput(format!(
                "像素间距必须为正: {pixel_spacing:?}"
            )));
        }
        if !is_positive(reconstruction_diameter) {
            return Err(DoseError::InvalidInput(format!(
                "重建直径必须为正: {reconstruction_diameter}"
            )));
        }
        Ok(Self {
            data,
            pixel_spacing,
            reconstruction_diameter,
            slice_location: None,
        })
    }

    /// 由 HU 像素数组和重建直径构建, 像素间距由 `rd / 列数` 推出 (方形像素).
    pub fn from_hu(data: Array2<i16>, reconstruction_diameter: f64) -> DoseResult<Self> {
        let cols = data.ncols().max(1) as f64;
        let s = reconstruction_diameter / cols;
        Self::new(data, (s, s), reconstruction_diameter)
    }

    /// 设置切片位置 (毫米).
    #[inline]
    pub fn with_slice_location(mut self, location: Option<f64>) -> Self {
        self.slice_location = location;
        self
    }

    /// 按 `pixel * slope + intercept` 把原始切片换算为 HU, 小数部分截断.
    /// 超出 `i16` 范围的值被钳位到 `i16::MIN` / `i16::MAX`, 不会回绕.
    ///
    /// 缺失 rescale slope / intercept 时分别以 1 / 0 代替并给出警告.
    /// 缺失重建直径时以 `列数 * 列方向像素间距` 代替; 缺失像素间距时以
    /// `重建直径 / 列数` 代替. 两者均缺失时返回 [`DoseError::InvalidInput`].
    pub fn calibrate(raw: &RawSlice) -> DoseResult<Outcome<Self>> {
        let meta = &raw.meta;
        let (rows, cols) = raw.shape();
        let mut warnings = vec![];

        let slope = meta.rescale_slope.unwrap_or_else(|| {
            warnings.push(DoseWarning::MissingAttribute("RescaleSlope"));
            1.0
        });
        let intercept = meta.rescale_intercept.unwrap_or_else(|| {
            warnings.push(DoseWarning::MissingAttribute("RescaleIntercept"));
            0.0
        });

        let (spacing, rd) = match (meta.pixel_spacing, meta.reconstruction_diameter) {
            (Some(ps), Some(rd)) => (ps, rd),
            (Some(ps), None) => {
                warnings.push(DoseWarning::MissingAttribute("ReconstructionDiameter"));
                (ps, cols as f64 * ps.1)
            }
            (None, Some(rd)) => {
                warnings.push(DoseWarning::MissingAttribute("PixelSpacing"));
                (
                    (rd / rows.max(1) as f64, rd / cols.max(1) as f64),
                    rd,
                )
            }
            (None, None) => {
                return Err(DoseError::InvalidInput(
                    "缺少像素间距和重建直径, 无法确定物理尺寸".into(),
                ))
            }
        };

        let (lo, hi) = (i16::MIN as f64, i16::MAX as f64);
        let data = raw
            .pixels
            .mapv(|v| num::clamp(v as f64 * slope + intercept, lo, hi) as i16);
        let image = Self::new(data, spacing, rd)?.with_slice_location(meta.slice_location);
        for w in warnings.iter() {
            log::debug!("标定警告: {w:?}");
        }
        Ok(Outcome::with_warnings(image, warnings))
    }

    /// 获得底层数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<i16> {
        self.data.view()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<i16> {
        self.data
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, i16, Ix2> {
        self.data.iter()
    }

    /// 以行优先规则, 获取能迭代图像所有 `(索引, HU 值)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &i16)> {
        self.data.indexed_iter()
    }

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&i16> {
        self.data.get(pos)
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 行数.
    #[inline]
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// 列数.
    #[inline]
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// 图像的像素个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 像素间距 (行方向, 列方向), 毫米.
    #[inline]
    pub fn pixel_spacing(&self) -> (f64, f64) {
        self.pixel_spacing
    }

    /// 重建直径 (视野), 毫米.
    #[inline]
    pub fn reconstruction_diameter(&self) -> f64 {
        self.reconstruction_diameter
    }

    /// 切片位置, 毫米.
    #[inline]
    pub fn slice_location(&self) -> Option<f64> {
        self.slice_location
    }

    /// 以同样的物理信息包装新的像素数组.
    ///
    /// 如果形状不一致, 则程序 panic.
    pub(crate) fn with_data(&self, data: Array2<i16>) -> Self {
        assert_eq!(self.shape(), data.dim(), "图像形状不符");
        Self {
            data,
            pixel_spacing: self.pixel_spacing,
            reconstruction_diameter: self.reconstruction_diameter,
            slice_location: self.slice_location,
        }
    }

    /// 把低于 `min` 的像素抬高到 `min`, 返回新图像.
    pub fn clip_below(&self, min: i16) -> Self {
        self.with_data(self.data.mapv(|v| v.max(min)))
    }

    /// 把低于空气 HU 值的像素 (通常是视野外填充值) 抬高到 -1000.
    #[inline]
    pub fn clip_to_air(&self) -> Self {
        self.clip_below(AIR_HU)
    }

    /// `mask` 内像素的平均 HU 值. `mask` 为空时返回 `None`.
    ///
    /// 如果形状不一致, 则程序 panic.
    pub fn mean_within(&self, mask: &BinaryMask) -> Option<f64> {
        assert_eq!(self.shape(), mask.shape(), "掩膜与图像形状不符");
        let (sum, cnt) = self
            .data
            .iter()
            .zip(mask.iter())
            .filter(|(_, &m)| m)
            .fold((0.0_f64, 0usize), |(s, c), (&v, _)| (s + v as f64, c + 1));
        (cnt > 0).then(|| sum / cnt as f64)
    }

    /// 按 `window` 转化为 8 位灰度图, 供可视化使用.
    pub fn windowed(&self, window: &CtWindow) -> Array2<u8> {
        self.data.mapv(|v| window.eval(v))
    }
}

#[cfg(test)]
mod tests {
    use super::CalibratedImage;
    use crate::data::{RawSlice, SliceMeta};
    use crate::error::{DoseError, DoseWarning};
    use ndarray::{array, Array2};

    #[test]
    fn test_calibrate_rescale() {
        let meta = SliceMeta {
            pixel_spacing: Some((0.5, 0.5)),
            reconstruction_diameter: Some(1.0),
            rescale_slope: Some(1.0),
            rescale_intercept: Some(-1024.0),
            slice_location: Some(12.5),
            ..Default::default()
        };
        let raw = RawSlice::new(array![[0, 1024], [1024, 2048]], meta);
        let out = CalibratedImage::calibrate(&raw).unwrap();
        assert!(out.is_clean());
        let img = out.value;
        assert_eq!(img.data(), array![[-1024_i16, 0], [0, 1024]]);
        assert_eq!(img.slice_location(), Some(12.5));
        assert_eq!(img.reconstruction_diameter(), 1.0);
    }

    #[test]
    fn test_calibrate_saturates() {
        let meta = SliceMeta {
            pixel_spacing: Some((0.5, 0.5)),
            reconstruction_diameter: Some(1.0),
            rescale_slope: Some(2.0),
            rescale_intercept: Some(0.0),
            ..Default::default()
        };
        let raw = RawSlice::new(array![[40_000, -40_000], [16_383, -7]], meta);
        let img = CalibratedImage::calibrate(&raw).unwrap().value;
        assert_eq!(img.data(), array![[i16::MAX, i16::MIN], [32_766, -14]]);
    }

    #[test]
    fn test_calibrate_missing_tags() {
        let meta = SliceMeta {
            pixel_spacing: Some((0.5, 0.5)),
            ..Default::default()
        };
        let raw = RawSlice::new(Array2::from_elem((4, 8), 7), meta);
        let out = CalibratedImage::calibrate(&raw).unwrap();
        assert_eq!(
            out.missing_attributes(),
            vec!["RescaleSlope", "RescaleIntercept", "ReconstructionDiameter"]
        );
        assert_eq!(out.value.reconstruction_diameter(), 4.0);
        assert!(out.value.iter().all(|&v| v == 7));

        let raw = RawSlice::new(Array2::zeros((4, 8)), SliceMeta::default());
        assert!(matches!(
            CalibratedImage::calibrate(&raw),
            Err(DoseError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_calibrate_missing_spacing() {
        let meta = SliceMeta {
            reconstruction_diameter: Some(300.0),
            rescale_slope: Some(1.0),
            rescale_intercept: Some(0.0),
            ..Default::default()
        };
        let raw = RawSlice::new(Array2::zeros((3, 6)), meta);
        let out = CalibratedImage::calibrate(&raw).unwrap();
        assert_eq!(
            out.warnings,
            vec![DoseWarning::MissingAttribute("PixelSpacing")]
        );
        assert_eq!(out.value.pixel_spacing(), (100.0, 50.0));
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(CalibratedImage::new(Array2::zeros((2, 2)), (0.0, 1.0), 1.0).is_err());
        assert!(CalibratedImage::new(Array2::zeros((2, 2)), (1.0, 1.0), -1.0).is_err());
        assert!(CalibratedImage::new(Array2::zeros((0, 0)), (1.0, 1.0), 1.0).is_err());
    }

    #[test]
    fn test_clip() {
        let img = CalibratedImage::from_hu(array![[-3000, -1000], [-999, 40]], 2.0).unwrap();
        let clipped = img.clip_to_air();
        assert_eq!(clipped.data(), array![[-1000_i16, -1000], [-999, 40]]);
        assert_eq!(clipped.pixel_spacing(), (1.0, 1.0));
    }
}
