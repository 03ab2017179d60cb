//! 二值形态学: 邻域, 填洞, 圆盘膨胀, 边界提取.

use crate::Idx2d;
use ndarray::{Array2, ArrayView2};
use std::collections::VecDeque;

/// 获得 `(h, w)` 的 4-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour4((h, w): Idx2d) -> [Idx2d; 4] {
    [
        (h.wrapping_sub(1), w),
        (h.saturating_add(1), w),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
    ]
}

/// 获得 `(h, w)` 的 8-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour8((h, w): Idx2d) -> [Idx2d; 8] {
    [
        (h.wrapping_sub(1), w.wrapping_sub(1)),
        (h.wrapping_sub(1), w),
        (h.wrapping_sub(1), w.saturating_add(1)),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
        (h.saturating_add(1), w.wrapping_sub(1)),
        (h.saturating_add(1), w),
        (h.saturating_add(1), w.saturating_add(1)),
    ]
}

/// 判断一个索引是否位于 `shape` 形状图像的边缘.
#[inline]
pub(crate) fn is_at_border((h, w): Idx2d, (rows, cols): Idx2d) -> bool {
    h == 0 || h.saturating_add(1) == rows || w == 0 || w.saturating_add(1) == cols
}

/// 填充前景中的封闭空洞.
///
/// 背景以 4-邻接规则分组; 不与图像边缘连通的背景区域被填充为前景.
pub fn fill_holes(fg: ArrayView2<bool>) -> Array2<bool> {
    let shape = fg.dim();
    let mut outside = Array2::from_elem(shape, false);
    let mut bfs_q: VecDeque<Idx2d> = fg
        .indexed_iter()
        .filter_map(|(pos, &p)| (!p && is_at_border(pos, shape)).then_some(pos))
        .collect();
    for &pos in bfs_q.iter() {
        outside[pos] = true;
    }

    while let Some(cur) = bfs_q.pop_front() {
        for neigh in neighbour4(cur) {
            if let (Some(false), Some(o)) = (fg.get(neigh).copied(), outside.get_mut(neigh)) {
                if !*o {
                    *o = true;
                    bfs_q.push_back(neigh);
                }
            }
        }
    }
    outside.mapv_inplace(|o| !o);
    outside
}

/// 半径为 `radius` 的圆盘结构元素的偏移量 `(dh, dw)`, 满足 `dh^2 + dw^2 <= radius^2`.
pub fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut ans = Vec::with_capacity((2 * radius + 1).pow(2));
    for dh in -r..=r {
        for dw in -r..=r {
            if dh * dh + dw * dw <= r * r {
                ans.push((dh, dw));
            }
        }
    }
    ans
}

/// 以半径为 `radius` 的圆盘膨胀前景. 结果与输入形状相同, 超出图像的部分被裁去.
pub fn dilate_disk(fg: ArrayView2<bool>, radius: usize) -> Array2<bool> {
    let (rows, cols) = fg.dim();
    let offsets = disk_offsets(radius);
    let mut ans = fg.to_owned();
    for ((h, w), _) in fg.indexed_iter().filter(|(_, &p)| p) {
        for &(dh, dw) in offsets.iter() {
            let (nh, nw) = (h as isize + dh, w as isize + dw);
            if (0..rows as isize).contains(&nh) && (0..cols as isize).contains(&nw) {
                ans[(nh as usize, nw as usize)] = true;
            }
        }
    }
    ans
}

/// 前景的外边界: 4-邻域含有背景或图像之外像素的前景像素, 按行优先排列.
///
/// 等价于把掩膜向外补一圈背景, 再减去十字形 (半径 1 的圆盘) 腐蚀的结果.
pub fn boundary(fg: ArrayView2<bool>) -> Vec<Idx2d> {
    fg.indexed_iter()
        .filter_map(|(pos, &p)| {
            let on_edge = p
                && neighbour4(pos)
                    .into_iter()
                    .any(|n| !fg.get(n).copied().unwrap_or(false));
            on_edge.then_some(pos)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{boundary, dilate_disk, disk_offsets, fill_holes};
    use ndarray::{array, Array2};

    #[test]
    fn test_fill_holes() {
        let fg = array![
            [false, false, false, false, false],
            [false, true, true, true, false],
            [false, true, false, true, false],
            [false, true, true, true, false],
            [false, false, false, false, false],
        ];
        let filled = fill_holes(fg.view());
        assert!(filled[(2, 2)]);
        assert!(!filled[(0, 0)]);
        assert_eq!(filled.iter().filter(|&&p| p).count(), 9);
    }

    #[test]
    fn test_fill_holes_diagonal_leak() {
        // 对角相邻的背景不算连通, 中心仍被视为空洞.
        let fg = array![
            [true, true, true, false],
            [true, false, true, true],
            [true, true, true, true],
        ];
        let filled = fill_holes(fg.view());
        assert!(filled[(1, 1)]);
        assert!(!filled[(0, 3)]);
    }

    #[test]
    fn test_fill_holes_touching_border() {
        let fg = array![[true, false, true], [true, false, true], [true, true, true]];
        let filled = fill_holes(fg.view());
        assert!(!filled[(1, 1)]);
    }

    #[test]
    fn test_disk() {
        assert_eq!(disk_offsets(0), vec![(0, 0)]);
        assert_eq!(disk_offsets(1).len(), 5);
        assert_eq!(disk_offsets(10).len(), 317);
    }

    #[test]
    fn test_dilate() {
        let mut fg = Array2::from_elem((7, 7), false);
        fg[(0, 0)] = true;
        let d = dilate_disk(fg.view(), 2);
        // 圆盘 r=2 的一个象限 (含轴) 有 6 个点.
        assert_eq!(d.iter().filter(|&&p| p).count(), 6);
        assert!(d[(2, 0)] && d[(1, 1)] && !d[(2, 1)]);
    }

    #[test]
    fn test_boundary() {
        let fg = Array2::from_elem((3, 4), true);
        // 整幅图像: 只有内部两个像素不是边界.
        let b = boundary(fg.view());
        assert_eq!(b.len(), 10);
        assert!(!b.contains(&(1, 1)) && !b.contains(&(1, 2)));

        let mut fg = Array2::from_elem((5, 5), false);
        for h in 1..4 {
            for w in 1..4 {
                fg[(h, w)] = true;
            }
        }
        let b = boundary(fg.view());
        assert_eq!(b.len(), 8);
    }
}
