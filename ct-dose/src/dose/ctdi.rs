//! CTDIvol 与 DLP.
//!
//! CTDIvol 有三种来源:
//!
//! 1. 由扫描参数与扫描仪系数计算 ([`ctdi_from_technique`]);
//! 2. 用户直接输入 ([`CtdiEstimate::manual`]);
//! 3. 读取 DICOM 中厂商报告的值 ([`ctdi_from_dicom`]).

use super::lookup::CoefficientSource;
use crate::data::{CtSeries, Phantom, SliceMeta};
use crate::error::{DoseWarning, Outcome};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 扫描参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Technique {
    /// 厂商.
    pub manufacturer: String,

    /// 型号.
    pub model: String,

    /// 管电压, kVp.
    pub kvp: f64,

    /// 管电流, mA.
    pub tube_current: f64,

    /// 旋转时间, 秒.
    pub rotation_time: f64,

    /// 螺距.
    pub pitch: f64,

    /// 总准直宽度, mm.
    pub collimation_width: f64,
}

impl Default for Technique {
    fn default() -> Self {
        Self {
            manufacturer: String::new(),
            model: String::new(),
            kvp: 0.0,
            tube_current: 0.0,
            rotation_time: 1.0,
            pitch: 1.0,
            collimation_width: 0.0,
        }
    }
}

impl Technique {
    /// 从 DICOM 元信息提取扫描参数.
    ///
    /// 缺失的标签以 0 (或空字符串) 代替, 并以 [`DoseWarning::MissingAttribute`] 列出,
    /// 提示用户手动补全. 曝光时间以毫秒记录, 换算为秒作为旋转时间.
    pub fn from_meta(meta: &SliceMeta) -> Outcome<Self> {
        let mut warnings = vec![];
        let mut text = |v: &Option<String>, name: &'static str| {
            v.clone().unwrap_or_else(|| {
                warnings.push(DoseWarning::MissingAttribute(name));
                String::new()
            })
        };
        let manufacturer = text(&meta.manufacturer, "Manufacturer");
        let model = text(&meta.model, "ManufacturerModelName");

        let mut number = |v: Option<f64>, name: &'static str| {
            v.unwrap_or_else(|| {
                warnings.push(DoseWarning::MissingAttribute(name));
                0.0
            })
        };
        let tech = Self {
            manufacturer,
            model,
            kvp: number(meta.kvp, "KVP"),
            tube_current: number(meta.tube_current, "XRayTubeCurrent"),
            rotation_time: number(meta.exposure_time, "ExposureTime") / 1000.0,
            pitch: number(meta.spiral_pitch_factor, "SpiralPitchFactor"),
            collimation_width: number(meta.total_collimation_width, "TotalCollimationWidth"),
        };
        Outcome::with_warnings(tech, warnings)
    }

    /// 管电流时间积 (mAs).
    #[inline]
    pub fn mas(&self) -> f64 {
        self.tube_current * self.rotation_time
    }

    /// 有效 mAs = mAs / 螺距. 螺距为 0 时退化为 mAs.
    #[inline]
    pub fn effective_mas(&self) -> f64 {
        if self.pitch == 0.0 {
            self.mas()
        } else {
            self.mas() / self.pitch
        }
    }
}

/// 扫描仪系数: CTDI 参考值 (mGy / 100 mAs) 与准直系数.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CtdiCoefficients {
    /// CTDI 参考值. 查不到时为 0.
    pub ctdi: f64,

    /// 准直系数. 查不到时为 0.
    pub collimation: f64,
}

/// 按厂商, 型号, 最接近的管电压与准直宽度, 从数据源取得扫描仪系数.
///
/// 任一环节查不到时, 对应系数为 0, 并附带 [`DoseWarning::NoData`].
pub fn resolve_coefficients<S: CoefficientSource + ?Sized>(
    technique: &Technique,
    phantom: Phantom,
    source: &S,
) -> Outcome<CtdiCoefficients> {
    let mut out = CtdiCoefficients::default();
    let mut warnings = vec![];
    let mut no_data = |msg: String| {
        log::warn!("无数据: {msg}");
        warnings.push(DoseWarning::NoData(msg));
    };

    if !source.has_brand(&technique.manufacturer) {
        no_data(format!("Manufacturer: {}", technique.manufacturer));
        return Outcome::with_warnings(out, warnings);
    }
    let Some(scanner) = source.scanner(&technique.manufacturer, &technique.model) else {
        no_data(format!("ManufacturerModelName: {}", technique.model));
        return Outcome::with_warnings(out, warnings);
    };

    match scanner.closest_voltage(technique.kvp) {
        None => no_data(format!("{} 没有 CTDI 数据", technique.model)),
        Some(v) => match v.ctdi(phantom) {
            Some(ctdi) => out.ctdi = ctdi,
            None => no_data(format!("{} kVp 下没有 {phantom:?} 体模的 CTDI", v.kvp)),
        },
    }
    match scanner.closest_collimation(technique.collimation_width) {
        None => no_data(format!("{} 没有准直数据", technique.model)),
        Some(c) => match c.factor {
            Some(factor) => out.collimation = factor,
            None => no_data(format!("准直 {} mm 没有系数", c.width)),
        },
    }
    Outcome::with_warnings(out, warnings)
}

/// 由扫描参数计算的全部中间量.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CtdiCalculation {
    /// mAs.
    pub mas: f64,

    /// 有效 mAs.
    pub effective_mas: f64,

    /// 加权 CTDI, mGy.
    pub ctdi_w: f64,

    /// 体积 CTDI, mGy.
    pub ctdi_vol: f64,

    /// 剂量长度乘积, mGy·cm.
    pub dlp: f64,
}

/// 由扫描参数计算 CTDIvol.
///
/// `CTDIw = 准直系数 * CTDI 参考值 * mAs / 100`, `CTDIvol = CTDIw / 螺距`,
/// `DLP = CTDIvol * 扫描长度 (cm)`. 螺距为 0 时 CTDIvol 与 DLP 为 0,
/// 并附带 [`DoseWarning::ZeroPitch`].
pub fn ctdi_from_technique(
    technique: &Technique,
    coefficients: CtdiCoefficients,
    scan_length: f64,
) -> Outcome<CtdiCalculation> {
    let mas = technique.mas();
    let ctdi_w = coefficients.collimation * coefficients.ctdi * mas / 100.0;
    let mut warnings = vec![];
    let ctdi_vol = if technique.pitch == 0.0 {
        log::warn!("螺距为 0, CTDIvol 置 0");
        warnings.push(DoseWarning::ZeroPitch);
        0.0
    } else {
        ctdi_w / technique.pitch
    };
    let calc = CtdiCalculation {
        mas,
        effective_mas: technique.effective_mas(),
        ctdi_w,
        ctdi_vol,
        dlp: ctdi_vol * scan_length,
    };
    Outcome::with_warnings(calc, warnings)
}

/// 扫描长度 (cm): `(|last - first| + |second - first| + thickness) * 0.1`.
///
/// 只有一张切片时 `second` 取 `last`.
#[inline]
pub fn scan_length_cm(first: f64, second: Option<f64>, last: f64, thickness: f64) -> f64 {
    let second = second.unwrap_or(last);
    ((last - first).abs() + (second - first).abs() + thickness) * 0.1
}

/// 由切片序列的位置与层厚计算扫描长度 (cm).
///
/// 缺少首末切片位置或首张切片层厚时返回 `None`.
pub fn series_scan_length(series: &CtSeries) -> Option<f64> {
    let first = series.get(0)?;
    let last = series.iter().last()?;
    let second = series.get(1).and_then(|s| s.meta.slice_location);
    Some(scan_length_cm(
        first.meta.slice_location?,
        second,
        last.meta.slice_location?,
        first.meta.slice_thickness?,
    ))
}

/// 序列的平均管电流 (mA), 用于管电流调制 (TCM) 的扫描.
///
/// 任一切片缺少管电流时返回 `None`.
pub fn mean_tube_current(series: &CtSeries) -> Option<f64> {
    let currents = series.tube_currents()?;
    if currents.is_empty() {
        return None;
    }
    Some(currents.iter().sum::<f64>() / currents.len() as f64)
}

/// CTDIvol 与 DLP.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CtdiEstimate {
    /// 体积 CTDI, mGy.
    pub ctdi_vol: f64,

    /// 剂量长度乘积, mGy·cm.
    pub dlp: f64,
}

impl CtdiEstimate {
    /// 用户直接输入的 CTDIvol 与 DLP.
    #[inline]
    pub fn manual(ctdi_vol: f64, dlp: f64) -> Self {
        Self { ctdi_vol, dlp }
    }

    /// 用户输入 CTDIvol, DLP 由扫描长度得到.
    #[inline]
    pub fn with_scan_length(ctdi_vol: f64, scan_length: f64) -> Self {
        Self {
            ctdi_vol,
            dlp: ctdi_vol * scan_length,
        }
    }
}

impl From<CtdiCalculation> for CtdiEstimate {
    #[inline]
    fn from(c: CtdiCalculation) -> Self {
        Self {
            ctdi_vol: c.ctdi_vol,
            dlp: c.dlp,
        }
    }
}

/// 读取 DICOM 中的 CTDIvol, DLP 由扫描长度得到.
///
/// 标签缺失时 CTDIvol 为 0, 并附带 [`DoseWarning::MissingAttribute`].
pub fn ctdi_from_dicom(meta: &SliceMeta, scan_length: f64) -> Outcome<CtdiEstimate> {
    match meta.ctdi_vol {
        Some(ctdi_vol) => Outcome::clean(CtdiEstimate::with_scan_length(ctdi_vol, scan_length)),
        None => {
            log::warn!("DICOM 中没有 CTDIvol");
            Outcome::with_warnings(
                CtdiEstimate::default(),
                vec![DoseWarning::MissingAttribute("CTDIvol")],
            )
        }
    }
}
