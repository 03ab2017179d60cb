//! 连通区域标记与区域属性.

use super::morph::{neighbour4, neighbour8};
use crate::data::BinaryMask;
use crate::{Idx2d, Idx2dF};
use ndarray::{Array2, ArrayView2};
use std::collections::VecDeque;

/// 连通规则.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Connectivity {
    /// 4-邻接.
    Four,

    /// 8-邻接.
    #[default]
    Eight,
}

/// 单个连通区域的属性.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    label: u32,
    pixels: Vec<Idx2d>,
    centroid: Idx2dF,

    /// `(min_row, min_col, max_row, max_col)`, 上界不包含.
    bbox: (usize, usize, usize, usize),
    mean_intensity: Option<f64>,
}

impl Region {
    fn new(label: u32, pixels: Vec<Idx2d>, image: Option<ArrayView2<i16>>) -> Self {
        debug_assert!(!pixels.is_empty());
        let n = pixels.len() as f64;
        let (mut sr, mut sc) = (0usize, 0usize);
        let mut bbox = (usize::MAX, usize::MAX, 0, 0);
        for &(r, c) in pixels.iter() {
            sr += r;
            sc += c;
            bbox.0 = bbox.0.min(r);
            bbox.1 = bbox.1.min(c);
            bbox.2 = bbox.2.max(r + 1);
            bbox.3 = bbox.3.max(c + 1);
        }
        let mean_intensity =
            image.map(|img| pixels.iter().map(|&p| img[p] as f64).sum::<f64>() / n);
        Self {
            label,
            centroid: (sr as f64 / n, sc as f64 / n),
            pixels,
            bbox,
            mean_intensity,
        }
    }

    /// 标签值 (从 1 开始, 按行优先扫描顺序分配).
    #[inline]
    pub fn label(&self) -> u32 {
        self.label
    }

    /// 像素面积.
    #[inline]
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    /// 全部像素索引, 行优先.
    #[inline]
    pub fn pixels(&self) -> &[Idx2d] {
        &self.pixels
    }

    /// 质心 `(行, 列)`.
    #[inline]
    pub fn centroid(&self) -> Idx2dF {
        self.centroid
    }

    /// 质心取整 (向零截断).
    #[inline]
    pub fn centroid_index(&self) -> Idx2d {
        (self.centroid.0 as usize, self.centroid.1 as usize)
    }

    /// 相对于外接矩形左上角的质心.
    #[inline]
    pub fn local_centroid(&self) -> Idx2dF {
        (
            self.centroid.0 - self.bbox.0 as f64,
            self.centroid.1 - self.bbox.1 as f64,
        )
    }

    /// 外接矩形 `(min_row, min_col, max_row, max_col)`, 上界不包含.
    #[inline]
    pub fn bbox(&self) -> (usize, usize, usize, usize) {
        self.bbox
    }

    /// 平均 HU 值. 仅当标记时提供了图像才有值.
    #[inline]
    pub fn mean_intensity(&self) -> Option<f64> {
        self.mean_intensity
    }

    /// 外接矩形内的二值子图.
    pub fn image(&self) -> Array2<bool> {
        let (r0, c0, r1, c1) = self.bbox;
        let mut sub = Array2::from_elem((r1 - r0, c1 - c0), false);
        for &(r, c) in self.pixels.iter() {
            sub[(r - r0, c - c0)] = true;
        }
        sub
    }
}

/// 按面积降序排列的连通区域集合. 面积相同时保持标签分配顺序.
#[derive(Clone, Debug)]
pub struct LabeledRegionSet {
    labels: Array2<u32>,
    regions: Vec<Region>,
}

impl LabeledRegionSet {
    /// 标记前景的连通区域.
    #[inline]
    pub fn label(fg: ArrayView2<bool>, connectivity: Connectivity) -> Self {
        Self::label_with(fg, connectivity, None)
    }

    /// 标记掩膜的连通区域 (8-邻接), 并统计每个区域在 `pixels` 上的平均 HU 值.
    ///
    /// 如果形状不一致, 则程序 panic.
    pub fn label_with_intensity(mask: &BinaryMask, pixels: ArrayView2<i16>) -> Self {
        assert_eq!(mask.shape(), pixels.dim(), "掩膜与图像形状不符");
        Self::label_with(mask.data(), Connectivity::Eight, Some(pixels))
    }

    fn label_with(
        fg: ArrayView2<bool>,
        connectivity: Connectivity,
        image: Option<ArrayView2<i16>>,
    ) -> Self {
        let mut labels = Array2::<u32>::zeros(fg.dim());
        let mut regions = Vec::with_capacity(4);
        let mut bfs_q: VecDeque<Idx2d> = VecDeque::with_capacity(16);
        let mut next = 0u32;

        for (pos, &p) in fg.indexed_iter() {
            if !p || labels[pos] != 0 {
                continue;
            }
            next += 1;
            labels[pos] = next;
            bfs_q.push_back(pos);
            let mut this_area = Vec::with_capacity(16);
            while let Some(cur) = bfs_q.pop_front() {
                this_area.push(cur);
                let mut visit = |neigh: Idx2d| {
                    if fg.get(neigh).copied().unwrap_or(false) && labels[neigh] == 0 {
                        labels[neigh] = next;
                        bfs_q.push_back(neigh);
                    }
                };
                match connectivity {
                    Connectivity::Four => neighbour4(cur).into_iter().for_each(&mut visit),
                    Connectivity::Eight => neighbour8(cur).into_iter().for_each(&mut visit),
                }
            }
            this_area.sort_unstable();
            regions.push(Region::new(next, this_area, image));
        }

        // 稳定排序
        regions.sort_by(|a, b| b.area().cmp(&a.area()));
        Self { labels, regions }
    }

    /// 标签图, 0 为背景.
    #[inline]
    pub fn labels(&self) -> ArrayView2<u32> {
        self.labels.view()
    }

    /// 区域个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// 是否没有任何区域.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// 按面积降序迭代所有区域.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Region> {
        self.regions.iter()
    }

    /// 面积最大的区域 (并列时取标签较小者).
    #[inline]
    pub fn largest(&self) -> Option<&Region> {
        self.regions.first()
    }

    /// 面积排名第 `index` 的区域.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    /// 把一组区域合并为掩膜.
    pub fn mask_of<'r, I: IntoIterator<Item = &'r Region>>(&self, regions: I) -> BinaryMask {
        let mut data = Array2::from_elem(self.labels.dim(), false);
        for region in regions {
            for &pos in region.pixels() {
                data[pos] = true;
            }
        }
        BinaryMask::new(data)
    }

    /// 某个区域在外接矩形内第 `col` 列 (局部坐标) 的像素个数.
    pub(crate) fn bbox_column_count(region: &Region, col: usize) -> usize {
        let c0 = region.bbox().1;
        region
            .pixels()
            .iter()
            .filter(|&&(_, c)| c == c0 + col)
            .count()
    }

    /// 某个区域在外接矩形内第 `row` 行 (局部坐标) 的像素个数.
    pub(crate) fn bbox_row_count(region: &Region, row: usize) -> usize {
        let r0 = region.bbox().0;
        region
            .pixels()
            .iter()
            .filter(|&&(r, _)| r == r0 + row)
            .count()
    }
}
