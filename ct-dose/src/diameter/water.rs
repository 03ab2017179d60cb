//! 水等效直径 (Dw).
//!
//! 按掩膜内平均 HU 值把面积换算为等效水面积, 再求等效圆直径:
//! `Dw = 0.1 * 2 * sqrt((HU / 1000 + 1) * area / pi)`.
//! 视野截断时, 可按边界像素落在图像边缘的比例进行修正.

use crate::consts::TRUNCATION_COEFFICIENT;
use crate::data::{BinaryMask, CalibratedImage};
use crate::error::{DoseError, DoseResult};
use crate::segment::{self, LabeledRegionSet, SegmentationConfig};
use crate::Idx2d;
use ndarray::ArrayView2;
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 参与计算的区域.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WaterRoi {
    /// 分割得到的患者截面.
    #[default]
    Segmented,

    /// 整幅图像. 低于 -1000 HU 的像素会先被抬高到 -1000.
    WholeImage {
        /// 先去除扫描床 (阈值取分割阈值).
        remove_table: bool,
    },
}

/// 水等效直径计算参数.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WaterConfig {
    /// 分割参数. `largest_only` 同时决定只统计最大区域还是所有区域.
    pub segmentation: SegmentationConfig,

    /// 是否进行视野截断修正.
    pub truncated: bool,

    /// 参与计算的区域.
    pub roi: WaterRoi,
}

/// 掩膜外边界像素中落在图像边缘的百分比.
///
/// 落在角上的像素同时计入行边缘和列边缘, 因此结果可能超过 100.
/// 掩膜为空时返回 0.
pub fn truncation_percent(mask: &BinaryMask) -> f64 {
    let (rows, cols) = mask.shape();
    let edges = mask.boundary_positions();
    if edges.is_empty() {
        return 0.0;
    }
    let on_row = edges
        .iter()
        .filter(|&&(h, _)| h == 0 || h + 1 == rows)
        .count();
    let on_col = edges
        .iter()
        .filter(|&&(_, w)| w == 0 || w + 1 == cols)
        .count();
    (on_row + on_col) as f64 / edges.len() as f64 * 100.0
}

/// 截断修正倍率 `exp(1.14e-6 * percent^3)`.
#[inline]
pub fn truncation_correction(percent: f64) -> f64 {
    (TRUNCATION_COEFFICIENT * percent.powi(3)).exp()
}

/// 计算水等效直径 (cm).
///
/// `pixels` 与 `mask` 形状相同, 可以是整幅图像或手动选取的局部区域;
/// `dims` 是完整图像的形状, 与重建直径 `rd` (mm) 一起决定像素面积.
/// `largest_only` 为真时只统计面积最大的区域, 否则面积求和, HU 值取各区域均值的平均.
///
/// 掩膜为空时返回 [`DoseError::SegmentationFailed`]. 如果形状不一致, 则程序 panic.
pub fn water_equivalent_diameter(
    pixels: ArrayView2<i16>,
    mask: &BinaryMask,
    dims: Idx2d,
    rd: f64,
    truncated: bool,
    largest_only: bool,
) -> DoseResult<f64> {
    let regions = LabeledRegionSet::label_with_intensity(mask, pixels);
    let (px_area, avg) = if largest_only {
        let Some(r) = regions.largest() else {
            return Err(DoseError::SegmentationFailed);
        };
        (r.area(), r.mean_intensity().unwrap_or_default())
    } else {
        if regions.is_empty() {
            return Err(DoseError::SegmentationFailed);
        }
        let area = regions.iter().map(|r| r.area()).sum();
        let avg = regions
            .iter()
            .filter_map(|r| r.mean_intensity())
            .sum::<f64>()
            / regions.len() as f64;
        (area, avg)
    };

    let (rows, cols) = dims;
    let area = px_area as f64 * rd * rd / (rows * cols) as f64;
    let factor = avg / 1000.0 + 1.0;
    if factor < 0.0 {
        log::warn!("平均 HU 值 {avg:.1} 低于 -1000, 按 0 处理");
    }
    let mut dw = 0.1 * 2.0 * (factor.max(0.0) * area / PI).sqrt();
    if truncated {
        let percent = truncation_percent(mask);
        log::debug!("截断比例 {percent:.2}%");
        dw *= truncation_correction(percent);
    }
    Ok(dw)
}

/// 从标定图像出发计算水等效直径.
pub fn dw_from_image(image: &CalibratedImage, config: &WaterConfig) -> DoseResult<f64> {
    let rd = image.reconstruction_diameter();
    let seg: &SegmentationConfig = &config.segmentation;
    match config.roi {
        WaterRoi::Segmented => {
            let mask = segment::segment(image, seg)?;
            water_equivalent_diameter(
                image.data(),
                &mask,
                image.shape(),
                rd,
                config.truncated,
                seg.largest_only,
            )
        }
        WaterRoi::WholeImage { remove_table } => {
            let image = if remove_table {
                segment::remove_table(image, seg.threshold)
            } else {
                image.clone()
            };
            let image = image.clip_to_air();
            let mask = BinaryMask::full(image.shape());
            water_equivalent_diameter(
                image.data(),
                &mask,
                image.shape(),
                rd,
                config.truncated,
                seg.largest_only,
            )
        }
    }
}
