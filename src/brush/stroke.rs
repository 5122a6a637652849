//! 笔划合成: 把指针移动序列合成进二维绘制缓冲.

use super::{fill_polygon, BrushContour, BrushResult};
use crate::consts::label::INTERNAL_FILL;
use crate::consts::EPS;
use crate::data::{LabelSlice, OwnedLabelSlice};
use crate::{Idx2d, Idx2dF};

/// 一次 `extend_stroke` 调用的产出.
#[derive(Clone, Debug)]
pub struct StrokeFeedback {
    /// 平移到当前指针位置的反馈轮廓, 供外部渲染实时预览.
    /// 与填充缓冲相互独立: 笔刷未按下时也会更新.
    pub contour: Vec<Idx2dF>,

    /// 本次调用实际填充的像素索引. 笔刷未按下时为空.
    pub filled: Vec<Idx2d>,
}

/// 一次连续绘制手势的瞬态状态.
///
/// 会话持有激活切片形状的私有绘制缓冲; 笔划只写入该缓冲,
/// 手势结束后由调用方将缓冲合并进标签体数据
/// (参见 [`crate::LabelVolume::merge_paint`]).
/// 激活切片发生变化时必须调用 [`PaintSession::reset`] 丢弃缓冲.
#[derive(Debug)]
pub struct PaintSession {
    /// 缓存的画笔轮廓. 只在尺寸变化时重建.
    contour: BrushContour,

    /// 激活绘制缓冲, 与激活切片形状一致.
    buffer: OwnedLabelSlice,

    /// 上一次取整后的指针位置.
    last_pos: Option<Idx2dF>,

    /// 缓冲自上次重置以来是否被写入过.
    dirty: bool,
}

impl PaintSession {
    /// 为形状 `slice_shape` 的激活切片创建绘制会话.
    ///
    /// `brush_size == 0` 时返回 `Err`.
    pub fn new(slice_shape: Idx2d, brush_size: u32) -> BrushResult<Self> {
        Ok(Self {
            contour: BrushContour::build(brush_size)?,
            buffer: OwnedLabelSlice::zeros(slice_shape),
            last_pos: None,
            dirty: false,
        })
    }

    /// 获取当前笔刷尺寸.
    #[inline]
    pub fn brush_size(&self) -> u32 {
        self.contour.size()
    }

    /// 调整笔刷尺寸. 尺寸未变化时不重建轮廓.
    pub fn set_brush_size(&mut self, size: u32) -> BrushResult<()> {
        if size != self.contour.size() {
            self.contour = BrushContour::build(size)?;
        }
        Ok(())
    }

    /// 获取绘制缓冲的只读视图.
    #[inline]
    pub fn buffer(&self) -> LabelSlice<'_> {
        self.buffer.as_immut()
    }

    /// 缓冲自上次重置以来是否被写入过?
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 开始一次笔划. 等价于在新位置上按下笔刷的一次
    /// [`PaintSession::extend_stroke`].
    pub fn begin_stroke(&mut self, pos: Idx2dF) -> StrokeFeedback {
        self.last_pos = None;
        self.extend_stroke(pos, true)
            .expect("新位置上的首次移动不会被跳过")
    }

    /// 处理一次指针移动.
    ///
    /// 位置先取整到最近体素质心 (与笔刷尺寸奇偶无关).
    /// 若取整位置与上次相同且笔刷未按下, 返回 `None` (无事发生);
    /// 笔刷按下时即使位置不变也强制重新填充,
    /// 保证指针静止时光标下仍有覆盖.
    ///
    /// 笔刷按下且两次取整位置的距离超过笔刷半径时,
    /// 额外填充连接两位置的补隙矩形, 避免快速移动留下空洞.
    pub fn extend_stroke(&mut self, pos: Idx2dF, brush_down: bool) -> Option<StrokeFeedback> {
        let rounded = (pos.0.round(), pos.1.round());

        if let Some(last) = self.last_pos {
            let moved = (rounded.0 - last.0).abs() > EPS || (rounded.1 - last.1).abs() > EPS;
            if !moved && !brush_down {
                return None;
            }
        }

        let contour = self.contour.translated(rounded);
        let mut filled = Vec::new();

        if brush_down {
            filled = fill_polygon(&contour, &mut self.buffer.as_mutable(), INTERNAL_FILL);

            if let Some(last) = self.last_pos {
                let radius = self.contour.radius();
                let (dh, dw) = (rounded.0 - last.0, rounded.1 - last.1);
                let dist = (dh * dh + dw * dw).sqrt();

                if dist > radius {
                    // 方向向量旋转 90 度得到法向, 沿法向 ± 半径展开矩形.
                    let (nh, nw) = (-dw / dist, dh / dist);
                    let quad = [
                        (last.0 + nh * radius, last.1 + nw * radius),
                        (rounded.0 + nh * radius, rounded.1 + nw * radius),
                        (rounded.0 - nh * radius, rounded.1 - nw * radius),
                        (last.0 - nh * radius, last.1 - nw * radius),
                    ];
                    filled.extend(fill_polygon(
                        &quad,
                        &mut self.buffer.as_mutable(),
                        INTERNAL_FILL,
                    ));
                }
            }
            self.dirty |= !filled.is_empty();
        }

        self.last_pos = Some(rounded);
        Some(StrokeFeedback { contour, filled })
    }

    /// 结束一次笔划, 取出绘制缓冲供外部合并; 会话随即被重置.
    ///
    /// 合并本身不属于笔划合成的职责, 参见
    /// [`crate::LabelVolume::merge_paint`].
    pub fn end_stroke(&mut self) -> OwnedLabelSlice {
        let shape = self.buffer.as_immut().shape();
        let buffer = std::mem::replace(&mut self.buffer, OwnedLabelSlice::zeros(shape));
        self.last_pos = None;
        self.dirty = false;
        buffer
    }

    /// 丢弃缓冲与笔划状态. 激活切片变化时必须调用.
    pub fn reset(&mut self, slice_shape: Idx2d) {
        self.buffer = OwnedLabelSlice::zeros(slice_shape);
        self.last_pos = None;
        self.dirty = false;
    }
}
