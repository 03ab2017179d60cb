//! 二值掩膜与组织成分修正掩膜.

use super::CalibratedImage;
use crate::consts::tissue::*;
use crate::{Idx2d, Idx2dF};
use ndarray::iter::Iter;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Ix2, Zip};
use std::ops::Index;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 与图像配准的二值掩膜, `true` 表示属于患者截面.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinaryMask {
    data: Array2<bool>,
}

impl Index<Idx2d> for BinaryMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl From<Array2<bool>> for BinaryMask {
    #[inline]
    fn from(data: Array2<bool>) -> Self {
        Self { data }
    }
}

impl BinaryMask {
    /// 直接初始化.
    #[inline]
    pub fn new(data: Array2<bool>) -> Self {
        Self { data }
    }

    /// 全 `false` 掩膜.
    #[inline]
    pub fn empty(shape: Idx2d) -> Self {
        Self {
            data: Array2::from_elem(shape, false),
        }
    }

    /// 全 `true` 掩膜, 即整幅图像.
    #[inline]
    pub fn full(shape: Idx2d) -> Self {
        Self {
            data: Array2::from_elem(shape, true),
        }
    }

    /// 由一组索引构建掩膜. 越界索引会被忽略.
    pub fn from_positions<I: IntoIterator<Item = Idx2d>>(shape: Idx2d, it: I) -> Self {
        let mut data = Array2::from_elem(shape, false);
        for pos in it {
            if let Some(p) = data.get_mut(pos) {
                *p = true;
            }
        }
        Self { data }
    }

    /// 获得底层数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<bool> {
        self.data.view()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<bool> {
        self.data
    }

    /// 获取可以迭代掩膜像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, bool, Ix2> {
        self.data.iter()
    }

    /// 以行优先规则, 获取能迭代所有 `(索引, 值)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &bool)> {
        self.data.indexed_iter()
    }

    /// 获取给定位置 (高, 宽) 的值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<bool> {
        self.data.get(pos).copied()
    }

    /// 掩膜的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 前景像素个数.
    #[inline]
    pub fn area(&self) -> usize {
        self.data.iter().filter(|&&p| p).count()
    }

    /// 是否没有任何前景像素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&p| p)
    }

    /// 以行优先规则收集所有前景像素索引.
    pub fn positions(&self) -> Vec<Idx2d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, &p)| p.then_some(pos))
            .collect()
    }

    /// 前景像素的质心 `(行, 列)`. 掩膜为空时返回 `None`.
    pub fn centroid(&self) -> Option<Idx2dF> {
        let (mut sr, mut sc, mut n) = (0usize, 0usize, 0usize);
        for ((r, c), _) in self.data.indexed_iter().filter(|(_, &p)| p) {
            sr += r;
            sc += c;
            n += 1;
        }
        (n > 0).then(|| (sr as f64 / n as f64, sc as f64 / n as f64))
    }

    /// 求并集.
    ///
    /// 如果形状不一致, 则程序 panic.
    pub fn union(&self, other: &BinaryMask) -> BinaryMask {
        assert_eq!(self.shape(), other.shape(), "掩膜形状不符");
        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| a || b);
        Self { data }
    }

    /// 求交集.
    ///
    /// 如果形状不一致, 则程序 panic.
    pub fn intersection(&self, other: &BinaryMask) -> BinaryMask {
        assert_eq!(self.shape(), other.shape(), "掩膜形状不符");
        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| a && b);
        Self { data }
    }

    /// 掩膜的外边界像素: 前景像素中 4-邻域含有背景 (或位于图像之外) 者.
    ///
    /// 结果按行优先排列.
    pub fn boundary_positions(&self) -> Vec<Idx2d> {
        crate::segment::morph::boundary(self.data.view())
    }
}

/// 组织成分修正掩膜中的组织分档.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TissueBand {
    /// 掩膜外.
    Outside,

    /// 低于软组织下限, 如肺.
    LowDensity,

    /// 软组织.
    SoftTissue,

    /// 不低于骨下限.
    Bone,
}

impl TissueBand {
    /// 该分档在修正掩膜中的编码.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            Self::Outside => CODE_OUTSIDE,
            Self::LowDensity => CODE_LOW_DENSITY,
            Self::SoftTissue => CODE_SOFT_TISSUE,
            Self::Bone => CODE_BONE,
        }
    }

    /// 由编码还原分档. 未知编码返回 `None`.
    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            CODE_OUTSIDE => Some(Self::Outside),
            CODE_LOW_DENSITY => Some(Self::LowDensity),
            CODE_SOFT_TISSUE => Some(Self::SoftTissue),
            CODE_BONE => Some(Self::Bone),
            _ => None,
        }
    }
}

/// 覆盖在二值掩膜之上的整数编码网格, 把患者像素按 HU 值划分为
/// 低密度 / 软组织 / 骨三档. 编码见 [`TissueBand::code`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrectionMask {
    data: Array2<u8>,
}

impl Index<Idx2d> for CorrectionMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl CorrectionMask {
    /// 由图像与掩膜构建. 掩膜内 HU 值低于 `soft_tissue_lower_bound` 的为低密度,
    /// 低于 `bone_lower_bound` 的为软组织, 其余为骨.
    ///
    /// 如果形状不一致, 则程序 panic.
    pub fn build(
        image: &CalibratedImage,
        mask: &BinaryMask,
        soft_tissue_lower_bound: i16,
        bone_lower_bound: i16,
    ) -> Self {
        assert_eq!(image.shape(), mask.shape(), "掩膜与图像形状不符");
        let data = Zip::from(image.data())
            .and(mask.data())
            .map_collect(|&hu, &m| {
                let band = if !m {
                    TissueBand::Outside
                } else if hu < soft_tissue_lower_bound {
                    TissueBand::LowDensity
                } else if hu < bone_lower_bound {
                    TissueBand::SoftTissue
                } else {
                    TissueBand::Bone
                };
                band.code()
            });
        Self { data }
    }

    /// 获得底层数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<u8> {
        self.data.view()
    }

    /// 分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 第 `row` 行 (水平线).
    #[inline]
    pub fn row(&self, row: usize) -> ArrayView1<u8> {
        self.data.index_axis(Axis(0), row)
    }

    /// 第 `col` 列 (竖直线).
    #[inline]
    pub fn column(&self, col: usize) -> ArrayView1<u8> {
        self.data.index_axis(Axis(1), col)
    }

    /// 统计值为 `band` 的像素个数.
    #[inline]
    pub fn count(&self, band: TissueBand) -> usize {
        let code = band.code();
        self.data.iter().filter(|&&p| p == code).count()
    }
}

#[cfg(test)]
mod tests {
    use super::{BinaryMask, CorrectionMask, TissueBand};
    use crate::CalibratedImage;
    use ndarray::array;

    #[test]
    fn test_mask_basic() {
        let m = BinaryMask::new(array![
            [false, true, true],
            [false, true, true],
            [false, false, false]
        ]);
        assert_eq!(m.area(), 4);
        assert!(!m.is_empty());
        assert_eq!(m.centroid(), Some((0.5, 1.5)));
        assert_eq!(m.positions(), vec![(0, 1), (0, 2), (1, 1), (1, 2)]);
        assert!(BinaryMask::empty((3, 3)).is_empty());
        assert_eq!(BinaryMask::empty((3, 3)).centroid(), None);

        let other = BinaryMask::from_positions((3, 3), [(2, 0), (0, 1), (9, 9)]);
        assert_eq!(m.union(&other).area(), 5);
        assert_eq!(m.intersection(&other).area(), 1);
    }

    #[test]
    fn test_correction_mask() {
        let img = CalibratedImage::from_hu(array![[-900, -250, 0], [249, 250, 1000]], 3.0)
            .unwrap();
        let mask = BinaryMask::new(array![[true, true, true], [true, true, false]]);
        let cm = CorrectionMask::build(&img, &mask, -250, 250);
        assert_eq!(cm.data(), array![[20_u8, 40, 40], [40, 60, 0]]);
        assert_eq!(cm.count(TissueBand::SoftTissue), 3);
        assert_eq!(cm.row(1).to_vec(), vec![40, 60, 0]);
        assert_eq!(cm.column(0).to_vec(), vec![20, 40]);
        assert_eq!(TissueBand::from_code(60), Some(TissueBand::Bone));
        assert_eq!(TissueBand::from_code(1), None);
    }
}
