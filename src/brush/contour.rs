//! 画笔轮廓光栅化: 把圆形笔刷转换为像素索引空间中的闭合多边形.

use super::{BrushError, BrushResult};
use crate::Idx2dF;

/// 以原点为中心的闭合画笔轮廓.
///
/// 顶点按 `(h, w)` 连续索引坐标存储, 逆时针一圈;
/// 对给定尺寸构建后不可变, 尺寸变化时整体重建.
///
/// 笔刷被视为半径 `size / 2` 的圆盘. 圆心参考点的选取随尺寸奇偶而不同:
/// 奇数尺寸以像素质心为圆心, 偶数尺寸修正 `(+0.5, +0.5)` 对齐到像素角点,
/// 使两种奇偶下笔刷的增长都保持对称.
#[derive(Clone, Debug)]
pub struct BrushContour {
    size: u32,
    points: Vec<Idx2dF>,
}

/// 把像素索引换算为该像素的角点坐标 (h 方向 -0.5, w 方向 +0.5).
/// 轮廓顶点取在角点上, 使填充结果与像素网格对齐.
#[inline]
fn corner((h, w): Idx2dF) -> Idx2dF {
    (h - 0.5, w + 0.5)
}

impl BrushContour {
    /// 构建尺寸为 `size` 的画笔轮廓.
    ///
    /// `size == 0` 时返回 [`BrushError::InvalidSize`].
    /// 结果是确定性的; `size == 1` 退化为包围单个像素的四边形.
    pub fn build(size: u32) -> BrushResult<Self> {
        if size == 0 {
            return Err(BrushError::InvalidSize);
        }

        let radius = (size / 2) as f64;
        let fradius = size as f64 / 2.0;

        // 偶数尺寸的圆心修正量.
        let corr = if size % 2 == 0 { 0.5 } else { 0.0 };
        let even = size % 2 == 0;

        // 先计算右上四分之一圆弧: 从 (0, radius) 出发,
        // 每行向外步进 h 直到越出圆外, 再下降一行, 直至 w 到 0.
        // 顶点记录在进出圆的跳变处.
        let dist = |h: f64, w: f64| ((h - corr).powi(2) + (w - corr).powi(2)).sqrt();

        let mut upper_right: Vec<Idx2dF> = Vec::with_capacity(4);
        let (mut cur_h, mut cur_w) = (0.0f64, radius);
        let mut inside = true;

        upper_right.push(corner((cur_h, cur_w)));

        while cur_w > 0.0 {
            while inside {
                cur_h += 1.0;
                if dist(cur_h, cur_w) > fradius {
                    inside = false;
                }
            }
            upper_right.push(corner((cur_h, cur_w)));

            while !inside {
                cur_w -= 1.0;
                if dist(cur_h, cur_w) <= fradius {
                    inside = true;
                    upper_right.push(corner((cur_h, cur_w)));
                }
                if cur_w <= 0.0 {
                    break;
                }
            }
        }

        // 将四分之一圆弧镜像到其余三个象限.
        // 奇数尺寸是纯符号翻转; 偶数尺寸翻转后额外 +1,
        // 补偿圆心修正带来的半像素偏移, 保证四象限无缝拼合.
        let mirror = |(h, w): Idx2dF, flip_h: bool, flip_w: bool| -> Idx2dF {
            let shift = if even { 1.0 } else { 0.0 };
            let nh = if flip_h { -h + shift } else { h };
            let nw = if flip_w { -w + shift } else { w };
            (nh, nw)
        };

        let lower_right: Vec<Idx2dF> = upper_right
            .iter()
            .map(|&p| mirror(p, false, true))
            .collect();
        let lower_left: Vec<Idx2dF> =
            upper_right.iter().map(|&p| mirror(p, true, true)).collect();
        let upper_left: Vec<Idx2dF> =
            upper_right.iter().map(|&p| mirror(p, true, false)).collect();

        // 右上 -> 右下 (倒序) -> 左下 -> 左上 (倒序), 逆时针闭合一圈.
        let mut points = upper_right;
        points.extend(lower_right.into_iter().rev());
        points.extend(lower_left);
        points.extend(upper_left.into_iter().rev());

        Ok(Self { size, points })
    }

    /// 获取构建时的笔刷尺寸.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// 获取笔刷半径 (连续值, `size / 2`).
    #[inline]
    pub fn radius(&self) -> f64 {
        self.size as f64 / 2.0
    }

    /// 获取轮廓顶点.
    #[inline]
    pub fn points(&self) -> &[Idx2dF] {
        &self.points
    }

    /// 获得轮廓被平移到 `center` 处的一份顶点副本.
    /// 该副本同时也是提供给外部渲染的实时反馈轮廓.
    pub fn translated(&self, center: Idx2dF) -> Vec<Idx2dF> {
        self.points
            .iter()
            .map(|&(h, w)| (h + center.0, w + center.1))
            .collect()
    }
}
