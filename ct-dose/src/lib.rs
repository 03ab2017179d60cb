#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 从 CT 轴向切片估计患者体型 (有效直径 / 水等效直径),
//! 并据此推导 CTDIvol, SSDE, DLP 修正值, 有效剂量与器官剂量.
//!
//! 该 crate 不负责 DICOM 文件读取, 系数数据库与界面展示:
//! 它们被视为外部协作者. 输入是像素数组和标签值, 输出是数值结果与可供可视化的掩膜/剂量图.
//!
//! # 注意
//!
//! 1. 所有二维索引均为 `(行, 列)`, 即 `(h, w)`. 行向下增长, 列向右增长.
//! 2. 可恢复的情况 (缺失标签, 查表失败, 螺距为零等) 以 [`Outcome`] 携带警告返回;
//!    调用者决定如何回退. 分割失败等以 [`DoseError`] 返回.
//! 3. 掩膜与图像形状不一致属于内部不变量被破坏, 程序会直接 panic.
//!
//! # 模块概览
//!
//! ### 图像标定 ✅
//!
//! 原始像素按 rescale slope/intercept 线性换算为 HU.
//!
//! 实现位于 `ct-dose/src/data`.
//!
//! ### 分割 ✅
//!
//! 阈值化, 填洞, 8-连通标记, 面积降序排列, 按质心位置选取患者截面;
//! 另有去除扫描床的操作.
//!
//! 实现位于 `ct-dose/src/segment`.
//!
//! ### 有效直径 ✅
//!
//! `area`, `center`, `max` 三种几何方法, 以及骨/肺组织成分修正.
//!
//! 实现位于 `ct-dose/src/diameter`.
//!
//! ### 水等效直径 ✅
//!
//! 按平均 HU 缩放面积后求等效圆直径, 可选视野截断修正.
//!
//! 实现位于 `ct-dose/src/diameter/water.rs`.
//!
//! ### 手动体型输入 ✅
//!
//! AP/LAT 测量线, 以及基于年龄, AP, LAT, AP+LAT 的三次样条查表.
//!
//! 实现位于 `ct-dose/src/diameter/manual.rs` 和 `ct-dose/src/fitting`.
//!
//! ### 体数据聚合 ✅
//!
//! slice step / slice number / regional 三种采样策略, 支持协作式取消.
//! 开启 `rayon` feature 时提供并行版本.
//!
//! 实现位于 `ct-dose/src/volume`.
//!
//! ### 剂量推导 ✅
//!
//! CTDIvol, SSDE, DLPc, 有效剂量, 器官剂量, 剂量分布图与轮廓统计.
//!
//! 实现位于 `ct-dose/src/dose`.
//!
//! ### 会话 ✅
//!
//! 按切片索引保存各项结果, 允许分步计算, 最后汇总为一条患者记录.
//!
//! 实现位于 `ct-dose/src/session.rs`.

/// 二维索引 `(行, 列)`, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 高精度二维坐标 `(行, 列)`.
pub type Idx2dF = (f64, f64);

pub mod consts;

pub mod data;

pub mod diameter;

pub mod dose;

mod error;

pub mod fitting;

pub mod prelude;

pub mod segment;

pub mod session;

pub mod volume;

pub use data::{
    BinaryMask, CalibratedImage, CorrectionMask, CtSeries, CtWindow, PatientInfo, Phantom,
    RawSlice, SliceMeta, SliceSource,
};

pub use error::{DoseError, DoseResult, DoseWarning, Outcome};
