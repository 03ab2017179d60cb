//! CT 切片数据源, 元信息与基础数据结构.

use ndarray::Array2;
use ordered_float::OrderedFloat;
use std::ops::Index;

pub mod image;
pub mod mask;
pub mod window;

pub use image::CalibratedImage;
pub use mask::{BinaryMask, CorrectionMask, TissueBand};
pub use window::CtWindow;

use crate::consts::HEAD_BODY_PARTS;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 单张切片的 DICOM 元信息. 任何字段都可能缺失.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SliceMeta {
    /// 像素间距 (行方向, 列方向), 毫米.
    pub pixel_spacing: Option<(f64, f64)>,

    /// 层厚, 毫米.
    pub slice_thickness: Option<f64>,

    /// 重建视野直径, 毫米.
    pub reconstruction_diameter: Option<f64>,

    /// Rescale slope.
    pub rescale_slope: Option<f64>,

    /// Rescale intercept.
    pub rescale_intercept: Option<f64>,

    /// 切片位置, 毫米.
    pub slice_location: Option<f64>,

    /// 管电流, mA.
    pub tube_current: Option<f64>,

    /// 曝光时间 (`ExposureTime`), 毫秒.
    pub exposure_time: Option<f64>,

    /// 厂商报告的 CTDIvol, mGy.
    pub ctdi_vol: Option<f64>,

    /// 螺旋螺距因子.
    pub spiral_pitch_factor: Option<f64>,

    /// 总准直宽度, 毫米.
    pub total_collimation_width: Option<f64>,

    /// 管电压, kVp.
    pub kvp: Option<f64>,

    /// 厂商.
    pub manufacturer: Option<String>,

    /// 设备型号.
    pub model: Option<String>,
}

/// 未标定的原始切片: 像素数组 + 元信息.
#[derive(Debug, Clone)]
pub struct RawSlice {
    /// 原始像素值 (存储值), 按 `(行, 列)` 组织.
    pub pixels: Array2<i32>,

    /// 元信息.
    pub meta: SliceMeta,
}

impl RawSlice {
    /// 直接初始化.
    #[inline]
    pub fn new(pixels: Array2<i32>, meta: SliceMeta) -> Self {
        Self { pixels, meta }
    }

    /// 图像的分辨率 (行, 列).
    #[inline]
    pub fn shape(&self) -> crate::Idx2d {
        self.pixels.dim()
    }
}

/// 患者与检查信息.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PatientInfo {
    /// 患者 ID.
    pub id: Option<String>,
    /// 姓名.
    pub name: Option<String>,
    /// 性别.
    pub sex: Option<String>,
    /// DICOM 年龄字符串, 如 `"045Y"`.
    pub age: Option<String>,
    /// 检查部位 (`BodyPartExamined`).
    pub protocol: Option<String>,
    /// 检查日期.
    pub date: Option<String>,
    /// 机构.
    pub institution: Option<String>,
    /// 厂商.
    pub manufacturer: Option<String>,
    /// 设备型号.
    pub model: Option<String>,
}

impl PatientInfo {
    /// 年龄数值, 取年龄字符串的前三个字符解析. 无法解析时返回 `None`.
    pub fn age_years(&self) -> Option<u32> {
        let age = self.age.as_deref()?;
        let head: String = age.chars().take(3).collect();
        head.trim().parse().ok()
    }

    /// `厂商-型号` 形式的扫描仪名称. 两者皆缺失时返回 `None`.
    pub fn scanner(&self) -> Option<String> {
        match (self.manufacturer.as_deref(), self.model.as_deref()) {
            (None, None) => None,
            (brand, model) => Some(format!(
                "{}-{}",
                brand.unwrap_or_default(),
                model.unwrap_or_default()
            )),
        }
    }

    /// 按检查部位推断体模.
    #[inline]
    pub fn phantom(&self) -> Phantom {
        Phantom::from_body_part(self.protocol.as_deref())
    }
}

/// 剂量标定所用的参考体模.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phantom {
    /// 16 cm 头部体模.
    Head,

    /// 32 cm 体部体模.
    Body,
}

impl Phantom {
    /// 由检查部位推断体模. `HEAD`, `HEADNECK`, `NECK` (不区分大小写) 为头部,
    /// 其余 (包括缺失) 为体部.
    pub fn from_body_part(body_part: Option<&str>) -> Self {
        match body_part {
            Some(part) if HEAD_BODY_PARTS.contains(&part.to_uppercase().as_str()) => Self::Head,
            _ => Self::Body,
        }
    }
}

/// 体数据聚合使用的切片数据源.
///
/// 实现者按索引提供标定后的图像. 无法标定的切片返回 `None`,
/// 聚合器将其视为分割失败.
pub trait SliceSource {
    /// 切片总数.
    fn len(&self) -> usize;

    /// 是否没有切片.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取第 `index` 张切片的标定图像.
    fn image_at(&self, index: usize) -> Option<CalibratedImage>;
}

impl SliceSource for [CalibratedImage] {
    #[inline]
    fn len(&self) -> usize {
        <[CalibratedImage]>::len(self)
    }

    #[inline]
    fn image_at(&self, index: usize) -> Option<CalibratedImage> {
        self.get(index).cloned()
    }
}

impl SliceSource for Vec<CalibratedImage> {
    #[inline]
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    fn image_at(&self, index: usize) -> Option<CalibratedImage> {
        self.get(index).cloned()
    }
}

/// 一次检查的切片序列.
#[derive(Debug, Clone, Default)]
pub struct CtSeries {
    slices: Vec<RawSlice>,
    patient: PatientInfo,
}

impl Index<usize> for CtSeries {
    type Output = RawSlice;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.slices[index]
    }
}

impl CtSeries {
    /// 直接创建.
    #[inline]
    pub fn new(slices: Vec<RawSlice>, patient: PatientInfo) -> Self {
        Self { slices, patient }
    }

    /// 患者信息.
    #[inline]
    pub fn patient(&self) -> &PatientInfo {
        &self.patient
    }

    /// 获取第 `index` 张原始切片. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&RawSlice> {
        self.slices.get(index)
    }

    /// 按升序迭代所有原始切片.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &RawSlice> {
        self.slices.iter()
    }

    /// 按切片位置排序. 缺少切片位置的切片会被丢弃.
    ///
    /// 返回被丢弃的切片个数.
    pub fn reslice(&mut self, reverse: bool) -> usize {
        let before = self.slices.len();
        self.slices.retain(|s| s.meta.slice_location.is_some());
        // 稳定排序, 位置相同的切片保持原顺序.
        self.slices.sort_by_key(|s| OrderedFloat(s.meta.slice_location.unwrap_or_default()));
        if reverse {
            self.slices.reverse();
        }
        before - self.slices.len()
    }

    /// 所有切片的管电流. 任一切片缺失该标签时返回 `None`.
    pub fn tube_currents(&self) -> Option<Vec<f64>> {
        self.slices.iter().map(|s| s.meta.tube_current).collect()
    }
}

impl SliceSource for CtSeries {
    #[inline]
    fn len(&self) -> usize {
        self.slices.len()
    }

    fn image_at(&self, index: usize) -> Option<CalibratedImage> {
        let raw = self.slices.get(index)?;
        match CalibratedImage::calibrate(raw) {
            Ok(outcome) => Some(outcome.into_value()),
            Err(e) => {
                log::warn!("第 {index} 张切片无法标定: {e}");
                None
            }
        }
    }
}
