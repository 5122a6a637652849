//! 画笔几何与笔划合成.
//!
//! [`BrushContour`] 把整数笔刷尺寸光栅化为以原点为中心的闭合轮廓;
//! [`PaintSession`] 在一次连续绘制手势内将轮廓平移、填充进绘制缓冲,
//! 并在指针快速移动时以矩形补隙. 本模块只改动绘制缓冲,
//! 从不直接触碰标签体数据.

mod contour;
mod fill;
mod stroke;

pub use contour::BrushContour;
pub use stroke::{PaintSession, StrokeFeedback};

pub(crate) use fill::fill_polygon;

/// 画笔几何错误.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrushError {
    /// 笔刷尺寸必须为正整数.
    InvalidSize,
}

/// 画笔操作结果.
pub type BrushResult<T> = Result<T, BrushError>;
