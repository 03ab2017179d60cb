//! 手动体型输入.
//!
//! 用户在图像上画出前后 (AP) 与左右 (LAT) 测量线, 或直接输入年龄, AP, LAT,
//! AP+LAT 之一, 再通过查找表得到有效直径.

use crate::data::Phantom;
use crate::dose::lookup::{CoefficientSource, SizeTableKind};
use crate::error::{DoseError, DoseResult, Outcome};
use crate::Idx2dF;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 图像上两点之间的物理距离 (cm).
///
/// 像素尺寸取 `rd / cols`, 与绘制测量线的界面保持一致.
#[inline]
pub fn line_length_cm(p1: Idx2dF, p2: Idx2dF, rd: f64, cols: usize) -> f64 {
    (p2.0 - p1.0).hypot(p2.1 - p1.1) * 0.1 * rd / cols as f64
}

/// 由 AP 与 LAT 长度求有效直径 `sqrt(AP * LAT)`.
#[inline]
pub fn deff_from_lines(ap: f64, lat: f64) -> f64 {
    (ap * lat).sqrt()
}

/// 手动输入的体型信息.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ManualInput {
    /// 直接给出有效直径 (cm).
    Deff(f64),

    /// 年龄.
    Age {
        /// 周岁.
        years: u32,
        /// 月.
        months: u32,
    },

    /// 前后径 (cm).
    Ap(f64),

    /// 左右径 (cm).
    Lat(f64),

    /// 前后径与左右径 (cm), 查表时使用两者之和.
    ApLat {
        /// 前后径.
        ap: f64,
        /// 左右径.
        lat: f64,
    },
}

impl ManualInput {
    /// 查找表的类型与自变量. `Deff` 不需要查表, 返回 `None`.
    pub fn table_argument(&self) -> Option<(SizeTableKind, f64)> {
        match *self {
            Self::Deff(_) => None,
            Self::Age { years, months } => {
                Some((SizeTableKind::Age, years as f64 + months as f64 / 12.0))
            }
            Self::Ap(ap) => Some((SizeTableKind::Ap, ap)),
            Self::Lat(lat) => Some((SizeTableKind::Lat, lat)),
            Self::ApLat { ap, lat } => Some((SizeTableKind::ApLat, ap + lat)),
        }
    }
}

/// 由手动输入得到有效直径 (cm).
///
/// 自变量超出查找表定义域时仍给出外推值, 并附带
/// [`DoseWarning::Extrapolated`](crate::DoseWarning::Extrapolated).
/// 找不到对应的查找表时返回 [`DoseError::NoData`].
pub fn manual_diameter<S: CoefficientSource + ?Sized>(
    input: ManualInput,
    phantom: Phantom,
    source: &S,
) -> DoseResult<Outcome<f64>> {
    if let ManualInput::Deff(d) = input {
        return Ok(Outcome::clean(d));
    }
    let Some((kind, x)) = input.table_argument() else {
        return Err(DoseError::InvalidInput(format!("{input:?} 不需要查表")));
    };
    let table = source
        .size_table(kind, phantom)
        .ok_or_else(|| DoseError::NoData(format!("{kind:?} 查找表 ({phantom:?})")))?;
    let out = table.eval(x)?;
    if !out.is_clean() {
        log::info!("{kind:?} = {x:.2} 超出查找表范围, 结果为外推值");
    }
    Ok(out)
}
