//! 单标签掩码的符号欧氏距离场.

use crate::data::LabelSlice;
use crate::Idx2d;
use binary_heap_plus::BinaryHeap;
use ndarray::Array2;

/// 8 邻域偏移.
const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[inline]
fn euclid((ah, aw): Idx2d, (bh, bw): Idx2d) -> f64 {
    let dh = ah as f64 - bh as f64;
    let dw = aw as f64 - bw as f64;
    (dh * dh + dw * dw).sqrt()
}

/// 从种子集合出发, 按最近种子传播计算每个像素到种子集的欧氏距离.
///
/// 堆元素携带自己的最近种子坐标, 以真实欧氏距离为序弹出;
/// 像素以首次弹出的距离定值. 种子集为空时返回全 `far` 的场.
fn nearest_field(shape: Idx2d, seeds: &[Idx2d], far: f64) -> Array2<f64> {
    let (height, width) = shape;
    let mut dist = Array2::from_elem(shape, far);
    let mut settled = Array2::from_elem(shape, false);

    // 最小堆: 距离小者先出.
    let mut heap = BinaryHeap::new_by(|a: &(f64, Idx2d, Idx2d), b: &(f64, Idx2d, Idx2d)| {
        b.0.total_cmp(&a.0)
    });
    for &s in seeds {
        dist[s] = 0.0;
        heap.push((0.0, s, s));
    }

    while let Some((d, pos, seed)) = heap.pop() {
        if settled[pos] {
            continue;
        }
        settled[pos] = true;
        dist[pos] = d;

        for (dh, dw) in NEIGHBORS {
            let nh = pos.0 as i64 + dh;
            let nw = pos.1 as i64 + dw;
            if nh < 0 || nw < 0 || nh >= height as i64 || nw >= width as i64 {
                continue;
            }
            let next = (nh as usize, nw as usize);
            if settled[next] {
                continue;
            }
            let nd = euclid(next, seed);
            if nd < dist[next] {
                dist[next] = nd;
                heap.push((nd, next, seed));
            }
        }
    }
    dist
}

/// 计算切片中标签 `label` 掩码的符号欧氏距离场.
///
/// 掩码内像素取负值 (到最近掩码外像素距离的相反数),
/// 掩码外像素取正值 (到最近掩码内像素的距离).
/// 任一侧为空时, 对应数值以有限的 `h + w` 截断, 使后续线性混合安全.
///
/// 距离的参考点只可能出现在掩码边界上, 因此种子集取
/// 边界两侧的像素: 掩码外种子须与掩码 4 连通相邻, 反之亦然.
pub(crate) fn signed_distance(slice: &LabelSlice, label: u8) -> Array2<f64> {
    let shape = slice.shape();
    let (height, width) = shape;
    let far = (height + width) as f64;

    let inside = |pos: Idx2d| slice[pos] == label;
    let touches_opposite = |pos: Idx2d, want_inside: bool| {
        let (h, w) = pos;
        let mut sides = [None; 4];
        if h > 0 {
            sides[0] = Some((h - 1, w));
        }
        if h + 1 < height {
            sides[1] = Some((h + 1, w));
        }
        if w > 0 {
            sides[2] = Some((h, w - 1));
        }
        if w + 1 < width {
            sides[3] = Some((h, w + 1));
        }
        sides
            .into_iter()
            .flatten()
            .any(|n| inside(n) == want_inside)
    };

    // 两个种子集: 掩码外的边界像素 (掩码内像素向外测距的参考),
    // 与掩码内的边界像素 (掩码外像素向内测距的参考).
    let mut outer_seeds = Vec::new();
    let mut inner_seeds = Vec::new();
    for (pos, _) in slice.indexed_iter() {
        if inside(pos) {
            if touches_opposite(pos, false) {
                inner_seeds.push(pos);
            }
        } else if touches_opposite(pos, true) {
            outer_seeds.push(pos);
        }
    }

    let to_outside = nearest_field(shape, &outer_seeds, far);
    let to_inside = nearest_field(shape, &inner_seeds, far);

    let mut field = Array2::zeros(shape);
    for (pos, _) in slice.indexed_iter() {
        field[pos] = if inside(pos) {
            -to_outside[pos].min(far)
        } else {
            to_inside[pos].min(far)
        };
    }
    field
}
