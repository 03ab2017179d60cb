//! 剂量推导.
//!
//! 从扫描参数得到 CTDIvol 与 DLP, 再结合患者直径得到 SSDE, 修正后的 DLP,
//! 有效剂量, 器官剂量以及剂量分布图. 所需系数由 [`CoefficientSource`] 提供.

pub mod ctdi;
pub mod lookup;
pub mod map;
pub mod ssde;

pub use ctdi::{
    ctdi_from_dicom, ctdi_from_technique, resolve_coefficients, CtdiEstimate, Technique,
};
pub use lookup::{CoefficientSource, CoefficientTable, HkTable, SizeTableKind};
pub use map::{central_peripheral, contour_stats, dose_map, CentralPeripheral, DistanceMode, DoseMap};
pub use ssde::{ssde, volume_ssde, ConversionFactor, EffectiveDoseModel, SsdeResult, VolumeSsde};
