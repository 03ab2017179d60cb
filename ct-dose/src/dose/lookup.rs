//! 系数查表服务.
//!
//! 扫描仪 CTDI 系数, 转换因子回归系数, 有效剂量/器官剂量系数, 体型查找表
//! 以及 h/k 修正因子表都来自外部数据库. 本模块只定义查询接口 [`CoefficientSource`],
//! 并提供一个内存实现 [`CoefficientTable`].
//!
//! 所有字符串键 (厂商, 型号, 报告, 协议) 都按小写比较.

use crate::data::Phantom;
use crate::fitting::TabulatedCurve;
use ordered_float::OrderedFloat;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 体型查找表的自变量类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SizeTableKind {
    /// 年龄 (年). 与体模无关.
    Age,

    /// 前后径 (cm).
    Ap,

    /// 左右径 (cm).
    Lat,

    /// 前后径与左右径之和 (cm).
    ApLat,
}

/// 某一管电压下的 CTDI 参考值 (mGy / 100 mAs).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoltageEntry {
    /// 管电压, kVp.
    pub kvp: f64,

    /// 头部体模的 CTDI. 数据库中可能缺失.
    pub ctdi_head: Option<f64>,

    /// 体部体模的 CTDI. 数据库中可能缺失.
    pub ctdi_body: Option<f64>,
}

impl VoltageEntry {
    /// 对应体模的 CTDI 参考值.
    #[inline]
    pub fn ctdi(&self, phantom: Phantom) -> Option<f64> {
        match phantom {
            Phantom::Head => self.ctdi_head,
            Phantom::Body => self.ctdi_body,
        }
    }
}

/// 某一准直选项的修正系数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollimationEntry {
    /// 总准直宽度, mm.
    pub width: f64,

    /// 准直系数. 数据库中可能缺失.
    pub factor: Option<f64>,
}

/// 一台扫描仪的 CTDI 数据.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScannerData {
    /// 各管电压的 CTDI 参考值.
    pub voltages: Vec<VoltageEntry>,

    /// 各准直选项.
    pub collimations: Vec<CollimationEntry>,
}

/// 在 `values` 中选取与 `target` 最接近者. 距离相同时取靠前的元素.
pub fn closest_by<T, F: Fn(&T) -> f64>(values: &[T], target: f64, key: F) -> Option<&T> {
    values
        .iter()
        .min_by_key(|v| OrderedFloat((key(v) - target).abs()))
}

impl ScannerData {
    /// 最接近 `kvp` 的管电压条目.
    #[inline]
    pub fn closest_voltage(&self, kvp: f64) -> Option<&VoltageEntry> {
        closest_by(&self.voltages, kvp, |v| v.kvp)
    }

    /// 最接近 `width` 的准直条目.
    #[inline]
    pub fn closest_collimation(&self, width: f64) -> Option<&CollimationEntry> {
        closest_by(&self.collimations, width, |c| c.width)
    }
}

/// 单个器官的剂量回归系数: `dose = CTDIvol * exp(alpha * d + beta)`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrganCoefficient {
    /// 器官名.
    pub organ: String,

    /// 直径系数.
    pub alpha: f64,

    /// 常数项.
    pub beta: f64,
}

/// h/k 修正因子表: 中心与外周剂量相对 SSDE 的倍率, 以直径为自变量.
#[derive(Clone, Debug)]
pub struct HkTable {
    h: TabulatedCurve,
    k: TabulatedCurve,
}

impl HkTable {
    /// 由直径, h 因子, k 因子三列数据创建.
    pub fn new(diameter: Vec<f64>, h: Vec<f64>, k: Vec<f64>) -> Self {
        Self {
            h: TabulatedCurve::new(diameter.clone(), h),
            k: TabulatedCurve::new(diameter, k),
        }
    }

    /// 中心剂量倍率曲线.
    #[inline]
    pub fn h(&self) -> &TabulatedCurve {
        &self.h
    }

    /// 外周剂量倍率曲线.
    #[inline]
    pub fn k(&self) -> &TabulatedCurve {
        &self.k
    }
}

/// 外部系数数据服务.
///
/// 所有表在载入后只读. 查询不到时返回 `None`, 由调用者决定如何降级.
pub trait CoefficientSource {
    /// 数据库中是否有该厂商.
    fn has_brand(&self, brand: &str) -> bool;

    /// 某厂商某型号扫描仪的 CTDI 数据.
    fn scanner(&self, brand: &str, model: &str) -> Option<&ScannerData>;

    /// 某报告标准下, 某体模的转换因子系数 `(a, b)`.
    fn conversion_factor(&self, report: &str, phantom: Phantom) -> Option<(f64, f64)>;

    /// 某检查协议的有效剂量系数 `(alpha, beta)`.
    fn effective_dose(&self, protocol: &str) -> Option<(f64, f64)>;

    /// 某检查协议下各器官的剂量系数, 顺序固定.
    fn organ_dose(&self, protocol: &str) -> Option<&[OrganCoefficient]>;

    /// 体型查找表. `Age` 表忽略 `phantom`.
    fn size_table(&self, kind: SizeTableKind, phantom: Phantom) -> Option<&TabulatedCurve>;

    /// h/k 修正因子表.
    fn hk_table(&self) -> Option<&HkTable>;
}

/// [`CoefficientSource`] 的内存实现.
#[derive(Clone, Debug, Default)]
pub struct CoefficientTable {
    scanners: HashMap<String, HashMap<String, ScannerData>>,
    conversion: HashMap<(String, Phantom), (f64, f64)>,
    effective: HashMap<String, (f64, f64)>,
    organs: HashMap<String, Vec<OrganCoefficient>>,
    sizes: HashMap<(SizeTableKind, Option<Phantom>), TabulatedCurve>,
    hk: Option<HkTable>,
}

#[inline]
fn size_key(kind: SizeTableKind, phantom: Phantom) -> (SizeTableKind, Option<Phantom>) {
    match kind {
        SizeTableKind::Age => (kind, None),
        _ => (kind, Some(phantom)),
    }
}

impl CoefficientTable {
    /// 空表.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一台扫描仪.
    pub fn with_scanner(mut self, brand: &str, model: &str, data: ScannerData) -> Self {
        self.scanners
            .entry(brand.to_lowercase())
            .or_default()
            .insert(model.to_lowercase(), data);
        self
    }

    /// 加入转换因子系数.
    pub fn with_conversion_factor(mut self, report: &str, phantom: Phantom, a: f64, b: f64) -> Self {
        self.conversion
            .insert((report.to_lowercase(), phantom), (a, b));
        self
    }

    /// 加入有效剂量系数.
    pub fn with_effective_dose(mut self, protocol: &str, alpha: f64, beta: f64) -> Self {
        self.effective
            .insert(protocol.to_lowercase(), (alpha, beta));
        self
    }

    /// 加入器官剂量系数.
    pub fn with_organ_dose(mut self, protocol: &str, organs: Vec<OrganCoefficient>) -> Self {
        self.organs.insert(protocol.to_lowercase(), organs);
        self
    }

    /// 加入体型查找表.
    pub fn with_size_table(
        mut self,
        kind: SizeTableKind,
        phantom: Phantom,
        x: Vec<f64>,
        diameter: Vec<f64>,
    ) -> Self {
        self.sizes
            .insert(size_key(kind, phantom), TabulatedCurve::new(x, diameter));
        self
    }

    /// 设置 h/k 修正因子表.
    pub fn with_hk_table(mut self, table: HkTable) -> Self {
        self.hk = Some(table);
        self
    }
}

impl CoefficientSource for CoefficientTable {
    #[inline]
    fn has_brand(&self, brand: &str) -> bool {
        self.scanners.contains_key(&brand.to_lowercase())
    }

    fn scanner(&self, brand: &str, model: &str) -> Option<&ScannerData> {
        self.scanners
            .get(&brand.to_lowercase())?
            .get(&model.to_lowercase())
    }

    fn conversion_factor(&self, report: &str, phantom: Phantom) -> Option<(f64, f64)> {
        self.conversion
            .get(&(report.to_lowercase(), phantom))
            .copied()
    }

    fn effective_dose(&self, protocol: &str) -> Option<(f64, f64)> {
        self.effective.get(&protocol.to_lowercase()).copied()
    }

    fn organ_dose(&self, protocol: &str) -> Option<&[OrganCoefficient]> {
        self.organs
            .get(&protocol.to_lowercase())
            .map(Vec::as_slice)
    }

    #[inline]
    fn size_table(&self, kind: SizeTableKind, phantom: Phantom) -> Option<&TabulatedCurve> {
        self.sizes.get(&size_key(kind, phantom))
    }

    #[inline]
    fn hk_table(&self) -> Option<&HkTable> {
        self.hk.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 测试用系数表.
    pub(crate) fn sample_table() -> CoefficientTable {
        let scanner = ScannerData {
            voltages: vec![
                VoltageEntry {
                    kvp: 80.0,
                    ctdi_head: Some(8.0),
                    ctdi_body: Some(3.0),
                },
                VoltageEntry {
                    kvp: 120.0,
                    ctdi_head: Some(20.0),
                    ctdi_body: None,
                },
            ],
            collimations: vec![
                CollimationEntry {
                    width: 20.0,
                    factor: Some(1.1),
                },
                CollimationEntry {
                    width: 40.0,
                    factor: Some(1.0),
                },
            ],
        };
        CoefficientTable::new()
            .with_scanner("GE", "Revolution", scanner)
            .with_conversion_factor("AAPM 204", Phantom::Body, 3.704369, 0.03671937)
            .with_conversion_factor("AAPM 204", Phantom::Head, 1.874799, 0.03871313)
            .with_effective_dose("chest", -0.04, -3.9)
            .with_organ_dose(
                "chest",
                vec![
                    OrganCoefficient {
                        organ: "lung".into(),
                        alpha: -0.05,
                        beta: 0.9,
                    },
                    OrganCoefficient {
                        organ: "breast".into(),
                        alpha: -0.04,
                        beta: 0.7,
                    },
                ],
            )
            .with_size_table(
                SizeTableKind::Age,
                Phantom::Body,
                vec![0.0, 1.0, 5.0, 10.0, 15.0],
                vec![12.0, 14.0, 17.5, 20.5, 24.0],
            )
            .with_size_table(
                SizeTableKind::Ap,
                Phantom::Body,
                vec![10.0, 15.0, 20.0, 25.0, 30.0],
                vec![12.0, 17.0, 22.0, 27.0, 32.0],
            )
            .with_size_table(
                SizeTableKind::ApLat,
                Phantom::Head,
                vec![20.0, 25.0, 30.0, 35.0],
                vec![10.0, 12.5, 15.0, 17.5],
            )
            .with_hk_table(HkTable::new(
                vec![10.0, 20.0, 30.0, 40.0],
                vec![1.2, 1.1, 1.0, 0.9],
                vec![0.9, 1.0, 1.1, 1.2],
            ))
    }

    #[test]
    fn test_case_insensitive() {
        let table = sample_table();
        assert!(table.has_brand("ge"));
        assert!(!table.has_brand("siemens"));
        assert!(table.scanner("Ge", "REVOLUTION").is_some());
        assert!(table.scanner("GE", "Optima").is_none());
        assert!(table.conversion_factor("aapm 204", Phantom::Head).is_some());
        assert_eq!(table.effective_dose("CHEST"), Some((-0.04, -3.9)));
        assert_eq!(table.organ_dose("chest").map(<[_]>::len), Some(2));
        assert!(table.organ_dose("abdomen").is_none());
    }

    #[test]
    fn test_size_table_keys() {
        let table = sample_table();
        // 年龄表与体模无关.
        assert!(table.size_table(SizeTableKind::Age, Phantom::Head).is_some());
        assert!(table.size_table(SizeTableKind::Ap, Phantom::Body).is_some());
        assert!(table.size_table(SizeTableKind::Ap, Phantom::Head).is_none());
        assert!(table.size_table(SizeTableKind::Lat, Phantom::Body).is_none());
    }

    #[test]
    fn test_closest() {
        let table = sample_table();
        let scanner = table.scanner("ge", "revolution").unwrap();
        assert_eq!(scanner.closest_voltage(110.0).unwrap().kvp, 120.0);
        assert_eq!(scanner.closest_voltage(0.0).unwrap().kvp, 80.0);
        // 距离相同取靠前者.
        assert_eq!(scanner.closest_voltage(100.0).unwrap().kvp, 80.0);
        assert_eq!(scanner.closest_collimation(38.4).unwrap().width, 40.0);
        assert!(ScannerData::default().closest_voltage(120.0).is_none());
    }
}
