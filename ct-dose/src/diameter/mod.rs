//! 有效直径 (Deff).
//!
//! 由患者截面掩膜按三种几何方法之一计算有效直径, 可选骨 / 肺组织成分修正.
//!
//! # 注意
//!
//! 所有长度输出单位均为 cm. 像素的物理尺寸取 `重建直径 / 行数` 与
//! `重建直径 / 列数`.

use crate::consts::tissue::*;
use crate::data::{BinaryMask, CalibratedImage, CorrectionMask, TissueBand};
use crate::error::{DoseError, DoseResult};
use crate::segment::{self, Connectivity, LabeledRegionSet, Region, SegmentationConfig};
use crate::Idx2d;
use ndarray::ArrayView1;
use std::f64::consts::PI;

pub mod manual;
pub mod water;

pub use water::{water_equivalent_diameter, WaterConfig, WaterRoi};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 有效直径的几何计算方法.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DiameterMethod {
    /// 与掩膜面积相同的圆的直径.
    #[default]
    Area,

    /// 过质心的竖直线与水平线上掩膜长度的几何平均.
    Center,

    /// 外接矩形内最长的竖直线与水平线长度的几何平均.
    Max,
}

/// 组织成分修正开关.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TissueCorrection {
    /// 把低密度 (肺) 像素计数乘以 0.3.
    pub lung: bool,

    /// 把骨像素计数乘以 1.8.
    pub bone: bool,
}

impl TissueCorrection {
    /// 不做修正.
    pub const NONE: Self = Self {
        lung: false,
        bone: false,
    };

    /// 是否开启了任意一种修正.
    #[inline]
    pub const fn any(&self) -> bool {
        self.lung || self.bone
    }
}

/// 有效直径计算参数.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiameterConfig {
    /// 几何方法.
    pub method: DiameterMethod,

    /// 组织成分修正. 仅对 `Center` 和 `Max` 方法生效.
    pub correction: TissueCorrection,

    /// 骨组织下限 (HU).
    pub bone_lower_bound: i16,

    /// 软组织下限 (HU).
    pub soft_tissue_lower_bound: i16,

    /// 分割参数. 计算时总是只保留最大区域.
    pub segmentation: SegmentationConfig,
}

impl Default for DiameterConfig {
    fn default() -> Self {
        Self {
            method: DiameterMethod::Area,
            correction: TissueCorrection::NONE,
            bone_lower_bound: DEFAULT_BONE_LOWER_BOUND,
            soft_tissue_lower_bound: DEFAULT_SOFT_TISSUE_LOWER_BOUND,
            segmentation: SegmentationConfig::default(),
        }
    }
}

/// 直径计算结果.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiameterResult {
    /// 直径, cm.
    pub diameter: f64,

    /// 测量线交点 `(行, 列)`. `Area` 方法没有该值.
    pub center: Option<Idx2d>,

    /// 前后 (AP, 竖直方向) 长度, cm.
    pub ap_length: Option<f64>,

    /// 左右 (LAT, 水平方向) 长度, cm.
    pub lat_length: Option<f64>,
}

impl DiameterResult {
    /// 只有直径的结果.
    #[inline]
    pub fn plain(diameter: f64) -> Self {
        Self {
            diameter,
            ..Default::default()
        }
    }
}

/// 以 cm 为单位的像素尺寸 `(行方向, 列方向)`.
#[inline]
fn pixel_cm((rows, cols): Idx2d, rd: f64) -> (f64, f64) {
    (0.1 * rd / rows as f64, 0.1 * rd / cols as f64)
}

/// 外接矩形内每一列 (竖直线) 与每一行 (水平线) 的像素个数.
fn bbox_profiles(region: &Region) -> (Vec<usize>, Vec<usize>) {
    let (r0, c0, r1, c1) = region.bbox();
    let mut col_sums = vec![0usize; c1 - c0];
    let mut row_sums = vec![0usize; r1 - r0];
    for &(r, c) in region.pixels() {
        col_sums[c - c0] += 1;
        row_sums[r - r0] += 1;
    }
    (col_sums, row_sums)
}

/// 第一个最大值的位置与值.
fn argmax(v: &[usize]) -> (usize, usize) {
    v.iter()
        .enumerate()
        .fold((0, 0), |(bi, bv), (i, &x)| if x > bv { (i, x) } else { (bi, bv) })
}

/// 由掩膜计算有效直径. 只使用面积最大的连通区域 (8-邻接).
///
/// `dims` 为用于换算像素尺寸的图像形状 `(行, 列)`, `rd` 为重建直径 (mm).
/// 掩膜为空时返回 [`DoseError::SegmentationFailed`].
pub fn effective_diameter(
    mask: &BinaryMask,
    dims: Idx2d,
    rd: f64,
    method: DiameterMethod,
) -> DoseResult<DiameterResult> {
    let regions = LabeledRegionSet::label(mask.data(), Connectivity::Eight);
    let Some(region) = regions.largest() else {
        return Err(DoseError::SegmentationFailed);
    };
    let (rows, cols) = dims;

    let result = match method {
        DiameterMethod::Area => {
            let area = region.area() as f64 * rd * rd / (rows * cols) as f64;
            DiameterResult::plain(2.0 * 0.1 * (area / PI).sqrt())
        }
        DiameterMethod::Center => {
            let (lr, lc) = region.local_centroid();
            let n_row = LabeledRegionSet::bbox_column_count(region, lc as usize);
            let n_col = LabeledRegionSet::bbox_row_count(region, lr as usize);
            let (sr, sc) = pixel_cm(mask.shape(), rd);
            let (ap, lat) = (n_row as f64 * sr, n_col as f64 * sc);
            DiameterResult {
                diameter: (ap * lat).sqrt(),
                center: Some(region.centroid_index()),
                ap_length: Some(ap),
                lat_length: Some(lat),
            }
        }
        DiameterMethod::Max => {
            let (r0, c0, _, _) = region.bbox();
            let (col_sums, row_sums) = bbox_profiles(region);
            let (max_c, n_row) = argmax(&col_sums);
            let (max_r, n_col) = argmax(&row_sums);
            let (sr, sc) = pixel_cm(mask.shape(), rd);
            let (ap, lat) = (n_row as f64 * sr, n_col as f64 * sc);
            DiameterResult {
                diameter: (ap * lat).sqrt(),
                center: Some((max_r + r0, max_c + c0)),
                ap_length: Some(ap),
                lat_length: Some(lat),
            }
        }
    };
    Ok(result)
}

/// 最大区域的质心 (取整). 掩膜为空时返回 `None`.
pub fn center(mask: &BinaryMask) -> Option<Idx2d> {
    let regions = LabeledRegionSet::label(mask.data(), Connectivity::Eight);
    regions.largest().map(Region::centroid_index)
}

/// 最大区域中最长水平线所在行与最长竖直线所在列. 掩膜为空时返回 `None`.
pub fn center_max(mask: &BinaryMask) -> Option<Idx2d> {
    let regions = LabeledRegionSet::label(mask.data(), Connectivity::Eight);
    let region = regions.largest()?;
    let (r0, c0, _, _) = region.bbox();
    let (col_sums, row_sums) = bbox_profiles(region);
    Some((argmax(&row_sums).0 + r0, argmax(&col_sums).0 + c0))
}

/// 一条测量线上修正后的像素个数.
///
/// 掩膜外像素不计; 低密度与骨像素在开启对应修正时按倍率缩放, 并向下取整.
fn corrected_count(line: ArrayView1<u8>, correction: TissueCorrection) -> usize {
    let count = |band: TissueBand| line.iter().filter(|&&p| p == band.code()).count();
    let low = count(TissueBand::LowDensity);
    let soft = count(TissueBand::SoftTissue);
    let bone = count(TissueBand::Bone);
    let low = if correction.lung {
        (LUNG_FACTOR * low as f64) as usize
    } else {
        low
    };
    let bone = if correction.bone {
        (BONE_FACTOR * bone as f64) as usize
    } else {
        bone
    };
    low + soft + bone
}

/// 组织成分修正后的有效直径.
///
/// 过 `center` 的竖直线给出 AP 长度, 水平线给出 LAT 长度.
/// 如果 `center` 越界, 则程序 panic.
pub fn corrected_diameter(
    correction: TissueCorrection,
    corr_mask: &CorrectionMask,
    (row, col): Idx2d,
    rd: f64,
) -> DiameterResult {
    let (sr, sc) = pixel_cm(corr_mask.shape(), rd);
    let ap = corrected_count(corr_mask.column(col), correction) as f64 * sr;
    let lat = corrected_count(corr_mask.row(row), correction) as f64 * sc;
    DiameterResult {
        diameter: (ap * lat).sqrt(),
        center: Some((row, col)),
        ap_length: Some(ap),
        lat_length: Some(lat),
    }
}

/// 从标定图像出发计算有效直径: 分割 (仅保留最大区域), 然后按 `config` 计算.
///
/// 开启组织成分修正且方法不是 `Area` 时, 走修正路径; 否则走几何路径.
pub fn diameter_from_image(
    image: &CalibratedImage,
    config: &DiameterConfig,
) -> DoseResult<DiameterResult> {
    let mask = segment::segment(image, &config.segmentation.largest())?;
    diameter_from_mask(image, &mask, config)
}

/// 同 [`diameter_from_image`], 但使用已有的掩膜.
pub fn diameter_from_mask(
    image: &CalibratedImage,
    mask: &BinaryMask,
    config: &DiameterConfig,
) -> DoseResult<DiameterResult> {
    let rd = image.reconstruction_diameter();
    if config.correction.any() && config.method != DiameterMethod::Area {
        let c = match config.method {
            DiameterMethod::Max => center_max(mask),
            _ => center(mask),
        };
        let c = c.ok_or(DoseError::SegmentationFailed)?;
        let corr_mask = CorrectionMask::build(
            image,
            mask,
            config.soft_tissue_lower_bound,
            config.bone_lower_bound,
        );
        Ok(corrected_diameter(config.correction, &corr_mask, c, rd))
    } else {
        effective_diameter(mask, image.shape(), rd, config.method)
    }
}
