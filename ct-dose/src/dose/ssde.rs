//! SSDE 与基于回归模型的剂量.

use super::lookup::{CoefficientSource, OrganCoefficient};
use crate::consts::{BODY_CF_DOMAIN, HEAD_CF_DOMAIN};
use crate::data::Phantom;
use crate::error::{DoseError, DoseResult};
use itertools::{Either, Itertools};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 转换因子模型 `f(d) = a * exp(-b * d)`, `d` 为直径 (cm).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConversionFactor {
    /// 系数 `a`.
    pub a: f64,

    /// 系数 `b`.
    pub b: f64,
}

impl ConversionFactor {
    /// 直接创建.
    #[inline]
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// 按报告标准与体模查表. 查不到时返回 [`DoseError::NoData`].
    pub fn lookup<S: CoefficientSource + ?Sized>(
        source: &S,
        report: &str,
        phantom: Phantom,
    ) -> DoseResult<Self> {
        let (a, b) = source.conversion_factor(report, phantom).ok_or_else(|| {
            log::warn!("{report} 报告中没有 {phantom:?} 体模的数据");
            DoseError::NoData(format!("{report} 报告 ({phantom:?} 体模)"))
        })?;
        Ok(Self { a, b })
    }

    /// 直径 `d` 处的转换因子.
    #[inline]
    pub fn eval(&self, d: f64) -> f64 {
        self.a * (-self.b * d).exp()
    }

    /// 供绘图的转换因子曲线: 体模展示范围内每隔 1 cm 一个点 (两端包含).
    pub fn curve(&self, phantom: Phantom) -> (Vec<f64>, Vec<f64>) {
        let (lower, upper) = match phantom {
            Phantom::Head => HEAD_CF_DOMAIN,
            Phantom::Body => BODY_CF_DOMAIN,
        };
        (lower..=upper)
            .map(|d| {
                let d = d as f64;
                (d, self.eval(d))
            })
            .unzip()
    }
}

/// 有效剂量模型 `E = DLP * exp(alpha * d + beta)`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EffectiveDoseModel {
    /// 直径系数.
    pub alpha: f64,

    /// 常数项.
    pub beta: f64,
}

impl EffectiveDoseModel {
    /// 按检查协议查表. 查不到时返回 [`DoseError::NoData`].
    pub fn lookup<S: CoefficientSource + ?Sized>(source: &S, protocol: &str) -> DoseResult<Self> {
        let (alpha, beta) = source
            .effective_dose(protocol)
            .ok_or_else(|| DoseError::NoData(format!("{protocol} 协议的有效剂量系数")))?;
        Ok(Self { alpha, beta })
    }

    /// 有效剂量 (mSv).
    #[inline]
    pub fn eval(&self, dlp: f64, diameter: f64) -> f64 {
        effective_dose(dlp, diameter, self.alpha, self.beta)
    }
}

/// SSDE (mGy) = 转换因子 * CTDIvol.
#[inline]
pub fn ssde(diameter: f64, ctdi_vol: f64, cf: &ConversionFactor) -> f64 {
    cf.eval(diameter) * ctdi_vol
}

/// 有效剂量 (mSv) `dlp * exp(alpha * diameter + beta)`.
#[inline]
pub fn effective_dose(dlp: f64, diameter: f64, alpha: f64, beta: f64) -> f64 {
    dlp * (alpha * diameter + beta).exp()
}

/// 单个器官的剂量.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrganDose {
    /// 器官名.
    pub organ: String,

    /// 剂量, mGy.
    pub dose: f64,
}

/// 各器官剂量 `ctdi_vol * exp(alpha_i * diameter + beta_i)`, 顺序与系数表相同.
pub fn organ_dose(ctdi_vol: f64, diameter: f64, coefficients: &[OrganCoefficient]) -> Vec<OrganDose> {
    coefficients
        .iter()
        .map(|c| OrganDose {
            organ: c.organ.clone(),
            dose: ctdi_vol * (c.alpha * diameter + c.beta).exp(),
        })
        .collect()
}

/// 一组 SSDE 相关结果.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SsdeResult {
    /// 直径, cm.
    pub diameter: f64,

    /// CTDIvol, mGy.
    pub ctdi_vol: f64,

    /// 转换因子.
    pub conversion_factor: f64,

    /// SSDE, mGy.
    pub ssde: f64,

    /// 修正后的 DLP, mGy·cm.
    pub dlp_corrected: f64,

    /// 有效剂量, mSv.
    pub effective_dose: f64,
}

impl SsdeResult {
    /// 由直径, CTDIvol 与整个扫描的 DLP 计算.
    pub fn compute(
        diameter: f64,
        ctdi_vol: f64,
        dlp: f64,
        cf: &ConversionFactor,
        ed: &EffectiveDoseModel,
    ) -> Self {
        let conversion_factor = cf.eval(diameter);
        Self {
            diameter,
            ctdi_vol,
            conversion_factor,
            ssde: conversion_factor * ctdi_vol,
            dlp_corrected: conversion_factor * dlp,
            effective_dose: ed.eval(dlp, diameter),
        }
    }
}

/// 多张切片的 SSDE.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeSsde {
    /// 汇总结果. 直径与 CTDIvol 取平均, SSDE 取各切片 SSDE 的平均,
    /// 其余量在平均直径处计算.
    pub summary: SsdeResult,

    /// 各切片结果.
    pub per_slice: BTreeMap<usize, SsdeResult>,

    /// 缺少直径或 CTDIvol 而被跳过的切片.
    pub skipped: Vec<usize>,
}

/// 在 `indices` 指定的切片上计算 SSDE.
///
/// 同时具有直径与 CTDIvol 的切片才参与计算. 没有任何可用切片时返回
/// [`DoseError::NoData`].
pub fn volume_ssde(
    indices: &[usize],
    diameters: &BTreeMap<usize, f64>,
    ctdis: &BTreeMap<usize, f64>,
    dlp: f64,
    cf: &ConversionFactor,
    ed: &EffectiveDoseModel,
) -> DoseResult<VolumeSsde> {
    let (usable, skipped): (Vec<_>, Vec<_>) =
        indices
            .iter()
            .partition_map(|&i| match (diameters.get(&i), ctdis.get(&i)) {
                (Some(&d), Some(&c)) => Either::Left((i, d, c)),
                _ => Either::Right(i),
            });
    if !skipped.is_empty() {
        log::debug!("跳过缺少直径或 CTDIvol 的切片 {skipped:?}");
    }
    if usable.is_empty() {
        return Err(DoseError::NoData("没有同时具有直径与 CTDIvol 的切片".into()));
    }

    let per_slice: BTreeMap<usize, SsdeResult> = usable
        .iter()
        .map(|&(i, d, c)| (i, SsdeResult::compute(d, c, dlp, cf, ed)))
        .collect();
    let n = usable.len() as f64;
    let mean_d = usable.iter().map(|&(_, d, _)| d).sum::<f64>() / n;
    let mean_c = usable.iter().map(|&(_, _, c)| c).sum::<f64>() / n;
    let mean_ssde = per_slice.values().map(|r| r.ssde).sum::<f64>() / n;

    let summary = SsdeResult {
        ssde: mean_ssde,
        ..SsdeResult::compute(mean_d, mean_c, dlp, cf, ed)
    };
    Ok(VolumeSsde {
        summary,
        per_slice,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dose::lookup::tests::sample_table;

    fn cf() -> ConversionFactor {
        ConversionFactor::new(3.704369, 0.03671937)
    }

    #[test]
    fn test_ssde_round_trip() {
        let cf = cf();
        for d in [8.0, 15.0, 22.5, 30.0, 45.0] {
            for ctdi in [0.5, 10.0, 37.2] {
                let s = ssde(d, ctdi, &cf);
                assert!((s / cf.eval(d) - ctdi).abs() < 1e-9 * ctdi);
            }
        }
    }

    #[test]
    fn test_conversion_factor_lookup() {
        let table = sample_table();
        let head = ConversionFactor::lookup(&table, "AAPM 204", Phantom::Head).unwrap();
        assert_eq!(head, ConversionFactor::new(1.874799, 0.03871313));
        assert!(matches!(
            ConversionFactor::lookup(&table, "AAPM 220", Phantom::Head),
            Err(DoseError::NoData(_))
        ));
        // 体部模型在 32 cm 处约为 1.14.
        assert!((cf().eval(32.0) - 1.144).abs() < 1e-3);
    }

    #[test]
    fn test_curve() {
        let (x, y) = cf().curve(Phantom::Head);
        assert_eq!(x.len(), 50);
        assert_eq!((x[0], x[49]), (6.0, 55.0));
        assert!(y.windows(2).all(|w| w[1] < w[0]));
        let (x, _) = cf().curve(Phantom::Body);
        assert_eq!((x.len(), x[0]), (38, 8.0));
    }

    #[test]
    fn test_effective_and_organ_dose() {
        let table = sample_table();
        let ed = EffectiveDoseModel::lookup(&table, "chest").unwrap();
        let e = ed.eval(400.0, 25.0);
        assert!((e - 400.0 * (-0.04_f64 * 25.0 - 3.9).exp()).abs() < 1e-12);
        assert!(EffectiveDoseModel::lookup(&table, "head").is_err());

        let organs = organ_dose(10.0, 20.0, table.organ_dose("chest").unwrap());
        assert_eq!(organs.len(), 2);
        assert_eq!(organs[0].organ, "lung");
        assert!((organs[0].dose - 10.0 * (-0.05_f64 * 20.0 + 0.9).exp()).abs() < 1e-12);
        assert!(organ_dose(10.0, 20.0, &[]).is_empty());
    }

    #[test]
    fn test_volume_ssde() {
        let cf = cf();
        let ed = EffectiveDoseModel {
            alpha: -0.04,
            beta: -3.9,
        };
        let diameters = BTreeMap::from([(0, 20.0), (1, 24.0), (2, 28.0)]);
        let ctdis = BTreeMap::from([(0, 10.0), (2, 14.0), (3, 9.0)]);
        let res = volume_ssde(&[0, 1, 2, 3], &diameters, &ctdis, 300.0, &cf, &ed).unwrap();
        assert_eq!(res.skipped, vec![1, 3]);
        assert_eq!(res.per_slice.keys().copied().collect::<Vec<_>>(), vec![0, 2]);

        let s = res.summary;
        assert!((s.diameter - 24.0).abs() < 1e-12);
        assert!((s.ctdi_vol - 12.0).abs() < 1e-12);
        let expected = (ssde(20.0, 10.0, &cf) + ssde(28.0, 14.0, &cf)) / 2.0;
        assert!((s.ssde - expected).abs() < 1e-12);
        assert!((s.conversion_factor - cf.eval(24.0)).abs() < 1e-12);
        assert!((s.dlp_corrected - cf.eval(24.0) * 300.0).abs() < 1e-9);

        assert!(matches!(
            volume_ssde(&[1, 3], &diameters, &ctdis, 300.0, &cf, &ed),
            Err(DoseError::NoData(_))
        ));
    }
}
