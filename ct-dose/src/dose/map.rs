//! 剂量分布图与器官轮廓统计.
//!
//! 以患者截面质心为中心, 剂量随 (等效) 半径从中心剂量线性变化到外周剂量.
//! 中心剂量与外周剂量由 SSDE 乘以 h/k 修正因子得到.

use super::lookup::HkTable;
use crate::data::{BinaryMask, CalibratedImage};
use crate::diameter;
use crate::error::{DoseError, DoseResult, Outcome};
use crate::volume::ProgressReporter;
use crate::Idx2d;
use ndarray::{Array, Array2, ArrayView2, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 中心与外周剂量 (mGy).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CentralPeripheral {
    /// 中心剂量.
    pub central: f64,

    /// 外周剂量.
    pub peripheral: f64,
}

/// 以直径 `diameter` 处的 h/k 因子把 SSDE 换算为中心与外周剂量.
///
/// 直径超出 h/k 表定义域时仍外推, 并附带警告.
pub fn central_peripheral(
    ssde: f64,
    diameter: f64,
    hk: &HkTable,
) -> DoseResult<Outcome<CentralPeripheral>> {
    let h = hk.h().eval(diameter)?;
    let k = hk.k().eval(diameter)?;
    // h 与 k 共用同一组直径节点, 外推警告相同, 只保留一份.
    let mut warnings = h.warnings;
    if warnings.is_empty() {
        warnings = k.warnings;
    }
    Ok(Outcome::with_warnings(
        CentralPeripheral {
            central: h.value * ssde,
            peripheral: k.value * ssde,
        },
        warnings,
    ))
}

/// 距离的度量方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DistanceMode {
    /// 欧氏距离 (配合有效直径).
    #[default]
    Radial,

    /// 水等效距离: 欧氏距离乘以中心到该像素连线上平均 HU 的水等效因子 (配合水等效直径).
    WaterEquivalent,
}

/// 剂量分布图. 两幅图与原图形状相同, 掩膜外为 0.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DoseMap {
    /// 到中心的距离, cm.
    pub distance: Array2<f64>,

    /// 剂量, mGy.
    pub dose: Array2<f64>,
}

/// 从 `from` 到 `to` 连线上的平均 HU 值.
///
/// 取 `floor(hypot)` 个等距采样点 (两端包含, 从 `from` 开始), 坐标向下取整.
/// 两点重合时返回 0.
fn mean_profile(pixels: ArrayView2<i16>, from: Idx2d, to: Idx2d) -> f64 {
    let (r0, c0) = (from.0 as f64, from.1 as f64);
    let (r1, c1) = (to.0 as f64, to.1 as f64);
    let n = (r1 - r0).hypot(c1 - c0) as usize;
    if n == 0 {
        return 0.0;
    }
    let rows = Array::linspace(r0, r1, n);
    let cols = Array::linspace(c0, c1, n);
    let sum: f64 = rows
        .iter()
        .zip(cols.iter())
        .map(|(&r, &c)| pixels[(r as usize, c as usize)] as f64)
        .sum();
    sum / n as f64
}

/// 构建剂量分布图.
///
/// `mask` 为患者截面 (只使用其最大区域的质心作为中心), `diameter` 为直径 (cm),
/// 必须大于 2. 水等效模式下每处理一个像素向 `reporter` 报告一次进度,
/// 被取消时返回 `Ok(None)`.
///
/// 如果 `mask` 与 `image` 形状不一致, 则程序 panic.
pub fn dose_map<R: ProgressReporter + ?Sized>(
    image: &CalibratedImage,
    mask: &BinaryMask,
    diameter: f64,
    dose: CentralPeripheral,
    mode: DistanceMode,
    reporter: &mut R,
) -> DoseResult<Option<DoseMap>> {
    assert_eq!(image.shape(), mask.shape(), "掩膜与图像形状不符");
    if diameter <= 2.0 {
        return Err(DoseError::InvalidInput(format!(
            "直径 {diameter} cm 过小, 无法构建剂量分布图"
        )));
    }
    let center = diameter::center(mask).ok_or(DoseError::SegmentationFailed)?;
    let positions = mask.positions();

    let mut dist: Vec<f64> = positions
        .iter()
        .map(|&(r, c)| {
            (r as f64 - center.0 as f64).hypot(c as f64 - center.1 as f64)
        })
        .collect();

    if mode == DistanceMode::WaterEquivalent {
        let total = positions.len();
        for (i, (&pos, d)) in positions.iter().zip(dist.iter_mut()).enumerate() {
            let avg = mean_profile(image.data(), pos, center);
            *d *= avg / 1000.0 + 1.0;
            if !reporter.progress(i + 1, total) && i + 1 < total {
                log::info!("剂量分布图在 {} / {total} 个像素后被取消", i + 1);
                return Ok(None);
            }
        }
    }

    let scale = 0.1 * image.reconstruction_diameter() / image.rows() as f64;
    let slope = (dose.peripheral - dose.central) / (diameter * 0.5 - 1.0);
    let mut distance = Array2::zeros(image.shape());
    let mut dose_map = Array2::zeros(image.shape());
    for (&pos, d) in positions.iter().zip(dist) {
        let d = d * scale;
        distance[pos] = d;
        dose_map[pos] = d * slope + dose.central;
    }
    Ok(Some(DoseMap {
        distance,
        dose: dose_map,
    }))
}

/// 轮廓内的剂量统计.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DoseStats {
    /// 平均值, mGy.
    pub mean: f64,

    /// 总体标准差, mGy.
    pub std: f64,

    /// 参与统计的像素个数.
    pub count: usize,
}

/// 统计剂量图在轮廓内非零像素上的平均值与总体标准差.
///
/// 没有任何非零像素时返回 `None`. 如果形状不一致, 则程序 panic.
pub fn contour_stats(dose: ArrayView2<f64>, contour: &BinaryMask) -> Option<DoseStats> {
    assert_eq!(dose.dim(), contour.shape(), "轮廓与剂量图形状不符");
    let mut values = vec![];
    Zip::from(&dose).and(contour.data()).for_each(|&v, &inside| {
        if inside && v != 0.0 {
            values.push(v);
        }
    });
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(DoseStats {
        mean,
        std: var.sqrt(),
        count: values.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dose::lookup::tests::sample_table;
    use crate::dose::lookup::CoefficientSource;
    use crate::segment::tests::phantom;
    use crate::volume::Silent;
    use crate::DoseWarning;

    fn disk() -> (CalibratedImage, BinaryMask) {
        let data = phantom((101, 101), &[(50.0, 50.0, 30.0, 30.0, 0)]);
        let img = CalibratedImage::from_hu(data, 101.0).unwrap();
        let mask = BinaryMask::new(img.data().mapv(|v| v > -300));
        (img, mask)
    }

    #[test]
    fn test_central_peripheral() {
        let table = sample_table();
        let hk = table.hk_table().unwrap();
        let cp = central_peripheral(10.0, 20.0, hk).unwrap();
        assert!(cp.is_clean());
        assert!((cp.value.central - 11.0).abs() < 1e-9);
        assert!((cp.value.peripheral - 10.0).abs() < 1e-9);

        let cp = central_peripheral(10.0, 50.0, hk).unwrap();
        assert!(matches!(&cp.warnings[..], [DoseWarning::Extrapolated { .. }]));
    }

    #[test]
    fn test_radial_dose_map() {
        let (img, mask) = disk();
        let cp = CentralPeripheral {
            central: 10.0,
            peripheral: 20.0,
        };
        let map = dose_map(&img, &mask, 6.0, cp, DistanceMode::Radial, &mut Silent)
            .unwrap()
            .unwrap();
        // 中心处为中心剂量, 掩膜外为 0.
        assert_eq!(map.dose[(50, 50)], 10.0);
        assert_eq!(map.dose[(0, 0)], 0.0);
        assert_eq!(map.distance[(50, 50)], 0.0);
        // 距中心 20 像素 = 2 cm, 剂量 10 + 2 / (3 - 1) * 10 = 20.
        assert!((map.distance[(50, 70)] - 2.0).abs() < 1e-12);
        assert!((map.dose[(50, 70)] - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_water_dose_map() {
        // 上半部分 -500 HU, 水等效距离减半.
        let mut data = phantom((101, 101), &[(50.0, 50.0, 30.0, 30.0, 0)]);
        for r in 0..50 {
            for c in 0..101 {
                if data[(r, c)] == 0 {
                    data[(r, c)] = -500;
                }
            }
        }
        let img = CalibratedImage::from_hu(data, 101.0).unwrap();
        let mask = BinaryMask::new(img.data().mapv(|v| v > -600));
        let cp = CentralPeripheral {
            central: 10.0,
            peripheral: 20.0,
        };
        let water = dose_map(&img, &mask, 6.0, cp, DistanceMode::WaterEquivalent, &mut Silent)
            .unwrap()
            .unwrap();
        let radial = dose_map(&img, &mask, 6.0, cp, DistanceMode::Radial, &mut Silent)
            .unwrap()
            .unwrap();
        // 水平方向 (第 50 行) 上全是水.
        assert!((water.distance[(50, 70)] - radial.distance[(50, 70)]).abs() < 1e-12);
        // 竖直向上的连线除中心像素外都是 -500 HU.
        let up = water.distance[(30, 50)] / radial.distance[(30, 50)];
        assert!((up - (1.0 - 0.5 * 19.0 / 20.0)).abs() < 1e-12, "{up}");
        assert_eq!(water.dose[(50, 50)], 10.0);
    }

    #[test]
    fn test_mean_profile_starts_at_pixel() {
        let mut pixels = Array2::<i16>::zeros((101, 101));
        pixels[(50, 83)] = 1000;
        // 从 (50, 83) 到中心共 33 个采样点, 只有第一个落在该像素上.
        let avg = mean_profile(pixels.view(), (50, 83), (50, 50));
        assert!((avg - 1000.0 / 33.0).abs() < 1e-12, "{avg}");
        assert_eq!(mean_profile(pixels.view(), (50, 50), (50, 50)), 0.0);
    }

    #[test]
    fn test_dose_map_cancel_and_errors() {
        let (img, mask) = disk();
        let cp = CentralPeripheral::default();
        let mut reporter = |done: usize, _: usize| done < 100;
        let res = dose_map(&img, &mask, 6.0, cp, DistanceMode::WaterEquivalent, &mut reporter);
        assert_eq!(res, Ok(None));

        assert!(matches!(
            dose_map(&img, &mask, 2.0, cp, DistanceMode::Radial, &mut Silent),
            Err(DoseError::InvalidInput(_))
        ));
        let empty = BinaryMask::empty(img.shape());
        assert_eq!(
            dose_map(&img, &empty, 6.0, cp, DistanceMode::Radial, &mut Silent),
            Err(DoseError::SegmentationFailed)
        );
    }

    #[test]
    fn test_contour_stats() {
        let dose = ndarray::array![[0.0, 1.0, 2.0], [3.0, 0.0, 5.0]];
        let contour = BinaryMask::new(ndarray::array![
            [true, true, true],
            [true, true, false]
        ]);
        let stats = contour_stats(dose.view(), &contour).unwrap();
        // 非零值 1, 2, 3.
        assert_eq!(stats.count, 3);
        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert!((stats.std - (2.0_f64 / 3.0).sqrt()).abs() < 1e-12);

        let none = BinaryMask::from_positions((2, 3), [(0, 0), (1, 1)]);
        assert_eq!(contour_stats(dose.view(), &none), None);
    }
}
