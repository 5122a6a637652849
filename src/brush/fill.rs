//! 闭合多边形的扫描线填充.

use crate::data::LabelSliceMut;
use crate::{Idx2d, Idx2dF};

/// 以 even-odd 规则将闭合多边形填充进切片, 返回本次实际写入的像素索引.
///
/// 多边形顶点按 `(h, w)` 连续索引坐标给出, 首尾自动闭合;
/// 像素归属以其质心 (整数坐标) 判定. 越出切片范围的部分被裁掉.
/// 顶点序列中的水平折返与重复顶点 (画笔轮廓常见) 不影响结果.
pub(crate) fn fill_polygon(points: &[Idx2dF], slice: &mut LabelSliceMut, value: u8) -> Vec<Idx2d> {
    let mut filled = Vec::new();
    if points.len() < 3 {
        return filled;
    }

    let (height, width) = slice.shape();

    // 多边形的行范围, 裁剪到切片内.
    let h_min = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let h_max = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    if !h_min.is_finite() || !h_max.is_finite() || h_max < 0.0 {
        return filled;
    }
    let row_lo = h_min.ceil().max(0.0) as usize;
    let row_hi = (h_max.floor().min((height - 1) as f64)).max(0.0) as usize;

    let mut crossings: Vec<f64> = Vec::with_capacity(8);

    for row in row_lo..=row_hi {
        let rf = row as f64;
        crossings.clear();

        // 半开规则 (a.h <= r) != (b.h <= r) 统计穿越,
        // 自然跳过水平边并正确处理落在顶点上的扫描线.
        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            if (a.0 <= rf) != (b.0 <= rf) {
                let t = (rf - a.0) / (b.0 - a.0);
                crossings.push(a.1 + t * (b.1 - a.1));
            }
        }
        crossings.sort_unstable_by(|x, y| x.total_cmp(y));

        for pair in crossings.chunks_exact(2) {
            let (wa, wb) = (pair[0], pair[1]);
            let col_lo = wa.ceil().max(0.0) as usize;
            if wb < 0.0 {
                continue;
            }
            let col_hi = wb.floor().min((width - 1) as f64);
            if col_hi < 0.0 {
                continue;
            }
            let col_hi = col_hi as usize;
            for col in col_lo..=col_hi.min(width.saturating_sub(1)) {
                let pos = (row, col);
                if slice[pos] != value {
                    slice[pos] = value;
                    filled.push(pos);
                }
            }
        }
    }
    filled
}
