//! 患者截面分割与扫描床去除.
//!
//! 两者共用同一条流水线: 阈值化, 填洞, 8-邻接标记, 按面积降序排列;
//! 区别只在于按质心所在行选取哪些区域.

use crate::consts::*;
use crate::data::{BinaryMask, CalibratedImage};
use crate::error::{DoseError, DoseResult};
use ndarray::{Array2, Zip};

pub mod label;
pub mod morph;

pub use label::{Connectivity, LabeledRegionSet, Region};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 分割参数.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentationConfig {
    /// 严格高于该 HU 值的像素视为前景.
    pub threshold: i16,

    /// 被选取区域的最小像素面积.
    pub minimum_area: usize,

    /// 最多选取的区域个数. 必须为正.
    pub max_objects: usize,

    /// 只选取一个区域 (面积最大的合格区域).
    pub largest_only: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            minimum_area: DEFAULT_MINIMUM_AREA,
            max_objects: DEFAULT_MAX_OBJECTS,
            largest_only: false,
        }
    }
}

impl SegmentationConfig {
    /// 同样的参数, 但只选取最大区域.
    #[inline]
    pub fn largest(self) -> Self {
        Self {
            largest_only: true,
            ..self
        }
    }

    /// 实际允许选取的区域个数.
    #[inline]
    pub fn object_limit(&self) -> usize {
        if self.largest_only {
            1
        } else {
            self.max_objects
        }
    }
}

/// 阈值化并填洞, 然后按 8-邻接规则标记.
fn threshold_regions(image: &CalibratedImage, threshold: i16) -> LabeledRegionSet {
    let fg: Array2<bool> = image.data().mapv(|v| v > threshold);
    let filled = morph::fill_holes(fg.view());
    LabeledRegionSet::label(filled.view(), Connectivity::Eight)
}

/// 分割患者截面.
///
/// 在面积降序的区域中, 依次选取质心行号小于 `rows * 7 / 10` 且面积不小于
/// `minimum_area` 的区域, 直到选够 [`SegmentationConfig::object_limit`] 个.
/// 没有任何区域被选取时返回 [`DoseError::SegmentationFailed`].
#[inline]
pub fn segment(image: &CalibratedImage, config: &SegmentationConfig) -> DoseResult<BinaryMask> {
    segment_labeled(image, config).map(|(mask, _)| mask)
}

/// 同 [`segment`], 但额外返回对结果掩膜重新标记的区域集合.
pub fn segment_labeled(
    image: &CalibratedImage,
    config: &SegmentationConfig,
) -> DoseResult<(BinaryMask, LabeledRegionSet)> {
    if config.object_limit() == 0 {
        return Err(DoseError::InvalidInput("最多选取的区域个数必须为正".into()));
    }
    let regions = threshold_regions(image, config.threshold);
    if regions.is_empty() {
        log::warn!("分割失败: 阈值 {} 以上没有前景", config.threshold);
        return Err(DoseError::SegmentationFailed);
    }

    let row_limit = body_row_limit(image.rows()) as f64;
    let selected: Vec<&Region> = regions
        .iter()
        .filter(|r| r.centroid().0 < row_limit && r.area() >= config.minimum_area)
        .take(config.object_limit())
        .collect();
    log::debug!(
        "共 {} 个连通区域, 选取 {} 个",
        regions.len(),
        selected.len()
    );
    if selected.is_empty() {
        log::warn!(
            "分割失败: 没有质心位于上部且面积不小于 {} 的区域",
            config.minimum_area
        );
        return Err(DoseError::SegmentationFailed);
    }

    let mask = regions.mask_of(selected);
    let relabeled = LabeledRegionSet::label(mask.data(), Connectivity::Eight);
    Ok((mask, relabeled))
}

/// 扫描床掩膜: 质心行号大于 `floor(rows * 7.5 / 10)` 的区域, 以半径 10 的圆盘膨胀.
pub fn table_mask(image: &CalibratedImage, threshold: i16) -> BinaryMask {
    let regions = threshold_regions(image, threshold);
    let row_limit = table_row_limit(image.rows());
    let tables = regions.mask_of(regions.iter().filter(|r| r.centroid().0 > row_limit));
    let dilated = morph::dilate_disk(tables.data(), TABLE_DILATION_RADIUS);
    BinaryMask::new(dilated)
}

/// 去除扫描床: 把 [`table_mask`] 覆盖的像素替换为空气 (-1000 HU).
pub fn remove_table(image: &CalibratedImage, threshold: i16) -> CalibratedImage {
    let tables = table_mask(image, threshold);
    let mut data = image.data().to_owned();
    Zip::from(&mut data)
        .and(tables.data())
        .for_each(|v, &t| {
            if t {
                *v = AIR_HU;
            }
        });
    log::debug!("去除扫描床像素 {} 个", tables.area());
    image.with_data(data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{remove_table, segment, segment_labeled, SegmentationConfig};
    use crate::consts::AIR_HU;
    use crate::error::DoseError;
    use crate::CalibratedImage;
    use ndarray::Array2;

    /// 在 `shape` 大小的空气背景上画若干实心椭圆 `(中心行, 中心列, 行半轴, 列半轴, HU)`.
    pub(crate) fn phantom(shape: (usize, usize), shapes: &[(f64, f64, f64, f64, i16)]) -> Array2<i16> {
        let mut data = Array2::from_elem(shape, AIR_HU);
        for ((h, w), v) in data.indexed_iter_mut() {
            for &(ch, cw, rh, rw, hu) in shapes {
                let (dh, dw) = ((h as f64 - ch) / rh, (w as f64 - cw) / rw);
                if dh * dh + dw * dw <= 1.0 {
                    *v = hu;
                }
            }
        }
        data
    }

    /// 512 x 512, 半径 150 的水圆盘, 重建直径 300 mm.
    pub(crate) fn disk_image() -> CalibratedImage {
        let data = phantom((512, 512), &[(256.0, 256.0, 150.0, 150.0, 0)]);
        CalibratedImage::new(data, (0.5, 0.5), 300.0).unwrap()
    }

    #[test]
    fn test_segment_disk() {
        let img = disk_image();
        let (mask, regions) = segment_labeled(&img, &SegmentationConfig::default()).unwrap();
        assert_eq!(regions.len(), 1);
        let area = mask.area() as f64;
        let expected = std::f64::consts::PI * 150.0 * 150.0;
        assert!((area - expected).abs() / expected < 0.01, "{area}");
    }

    #[test]
    fn test_uniform_air_fails() {
        let img = CalibratedImage::from_hu(Array2::from_elem((64, 64), AIR_HU), 300.0).unwrap();
        assert_eq!(
            segment(&img, &SegmentationConfig::default()),
            Err(DoseError::SegmentationFailed)
        );
    }

    #[test]
    fn test_minimum_area_excludes_all() {
        let data = phantom((128, 128), &[(40.0, 64.0, 5.0, 5.0, 0)]);
        let img = CalibratedImage::from_hu(data, 300.0).unwrap();
        assert_eq!(
            segment(&img, &SegmentationConfig::default()),
            Err(DoseError::SegmentationFailed)
        );
        let cfg = SegmentationConfig {
            minimum_area: 10,
            ..Default::default()
        };
        assert!(segment(&img, &cfg).is_ok());
    }

    #[test]
    fn test_holes_filled() {
        // 圆盘内部的空气 (肠道气体等) 被视为患者的一部分.
        let data = phantom(
            (128, 128),
            &[(50.0, 64.0, 40.0, 40.0, 0), (50.0, 64.0, 10.0, 10.0, AIR_HU)],
        );
        let img = CalibratedImage::from_hu(data, 300.0).unwrap();
        let cfg = SegmentationConfig {
            minimum_area: 10,
            ..Default::default()
        };
        let mask = segment(&img, &cfg).unwrap();
        assert!(mask[(50, 64)]);
    }

    #[test]
    fn test_object_selection() {
        // 大小两个对象在上部, 一个扫描床在底部.
        let data = phantom(
            (200, 200),
            &[
                (60.0, 60.0, 30.0, 30.0, 0),
                (60.0, 150.0, 20.0, 20.0, 0),
                (190.0, 100.0, 4.0, 90.0, 200),
            ],
        );
        let img = CalibratedImage::from_hu(data, 300.0).unwrap();
        let cfg = SegmentationConfig {
            minimum_area: 100,
            ..Default::default()
        };
        let (all, regions) = segment_labeled(&img, &cfg).unwrap();
        assert_eq!(regions.len(), 2);
        assert!(!all[(190, 100)]);

        let largest = segment(&img, &cfg.largest()).unwrap();
        assert!(largest[(60, 60)]);
        assert!(!largest[(60, 150)]);

        let bad = SegmentationConfig {
            max_objects: 0,
            ..cfg
        };
        assert!(matches!(segment(&img, &bad), Err(DoseError::InvalidInput(_))));
    }

    #[test]
    fn test_remove_table() {
        let data = phantom(
            (200, 200),
            &[(60.0, 100.0, 40.0, 40.0, 0), (190.0, 100.0, 4.0, 90.0, 200)],
        );
        let img = CalibratedImage::from_hu(data, 300.0).unwrap();
        let cleaned = remove_table(&img, -200);
        assert_eq!(cleaned[(190, 100)], AIR_HU);
        // 膨胀半径之内的像素也被清除
        assert_eq!(cleaned[(180, 100)], AIR_HU);
        assert_eq!(cleaned[(60, 100)], 0);
        assert_eq!(cleaned.shape(), img.shape());
    }
}
