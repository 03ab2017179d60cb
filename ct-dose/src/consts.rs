//! 通用常量.

/// 空气的 HU 值. 也用作 "视野外" 的填充值.
pub const AIR_HU: i16 = -1000;

/// 分割默认阈值 (HU). 高于该值的像素视为前景.
pub const DEFAULT_THRESHOLD: i16 = -300;

/// 分割时单个区域的默认最小像素面积.
pub const DEFAULT_MINIMUM_AREA: usize = 500;

/// 分割时默认最多选取的区域个数.
pub const DEFAULT_MAX_OBJECTS: usize = 5;

/// 去除扫描床时的默认阈值 (HU).
pub const DEFAULT_TABLE_THRESHOLD: i16 = -200;

/// 扫描床掩膜的膨胀半径 (像素).
pub const TABLE_DILATION_RADIUS: usize = 10;

/// 患者区域质心所在行必须小于 `rows * 7 / 10` (向下取整).
#[inline]
pub const fn body_row_limit(rows: usize) -> usize {
    rows * 7 / 10
}

/// 扫描床区域质心所在行必须大于 `floor(rows * 7.5 / 10)`.
#[inline]
pub fn table_row_limit(rows: usize) -> f64 {
    (rows as f64 * 7.5 / 10.0).floor()
}

/// 组织成分修正.
pub mod tissue {
    /// 骨组织下限的默认值 (HU).
    pub const DEFAULT_BONE_LOWER_BOUND: i16 = 250;

    /// 软组织下限的默认值 (HU).
    pub const DEFAULT_SOFT_TISSUE_LOWER_BOUND: i16 = -250;

    /// 骨像素计数的倍率.
    pub const BONE_FACTOR: f64 = 1.8;

    /// 肺 (低密度) 像素计数的倍率.
    pub const LUNG_FACTOR: f64 = 0.3;

    /// 修正掩膜中, 掩膜外像素的编码.
    pub const CODE_OUTSIDE: u8 = 0;

    /// 修正掩膜中, 低于软组织下限 (肺等低密度组织) 的像素编码.
    pub const CODE_LOW_DENSITY: u8 = 20;

    /// 修正掩膜中, 软组织像素编码.
    pub const CODE_SOFT_TISSUE: u8 = 40;

    /// 修正掩膜中, 不低于骨下限的像素编码.
    pub const CODE_BONE: u8 = 60;
}

/// 视野截断修正 `exp(TRUNCATION_COEFFICIENT * percent^3)` 的系数.
pub const TRUNCATION_COEFFICIENT: f64 = 1.14e-6;

/// 头部体模对应的检查部位 (`BodyPartExamined`, 大写).
pub const HEAD_BODY_PARTS: [&str; 3] = ["HEAD", "HEADNECK", "NECK"];

/// 转换因子曲线在头部体模上的展示范围 (cm).
pub const HEAD_CF_DOMAIN: (u32, u32) = (6, 55);

/// 转换因子曲线在体部体模上的展示范围 (cm).
pub const BODY_CF_DOMAIN: (u32, u32) = (8, 45);
