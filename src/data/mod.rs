//! 标签体数据基础结构.

use ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis};

use crate::geometry::{SliceAxis, VolumeGeometry};

mod diff;
pub mod slice;

pub use diff::DiffVolume;
pub use slice::{CompactLabelSlice, LabelMirror, LabelSlice, LabelSliceMut, OwnedLabelSlice};

/// 3D (+ 可选时间维) 整数标签体数据.
///
/// 每个时间步持有一帧形状一致的 `(z, h, w)` 标签数组.
/// 体数据生命周期内几何信息固定, 只有标签值会变化;
/// 值的修改只应经由可撤销合并 ([`crate::UndoHistory`])
/// 或绘制提交 ([`LabelVolume::merge_paint`]) 两条路径进行.
#[derive(Clone, Debug)]
pub struct LabelVolume {
    frames: Vec<Array3<u8>>,
    geo: VolumeGeometry,
}

impl LabelVolume {
    /// 按几何信息创建全背景体数据.
    pub fn zeros(geo: VolumeGeometry) -> Self {
        let (z, h, w) = geo.shape();
        let frames = (0..geo.num_time_steps())
            .map(|_| Array3::zeros((z, h, w)))
            .collect();
        Self { frames, geo }
    }

    /// 由单帧裸数据直接创建 (单时间步, 各向同性几何).
    /// 主要用于测试与实验场景.
    pub fn from_frame(frame: Array3<u8>) -> Self {
        let &[z, h, w] = frame.shape() else {
            unreachable!()
        };
        Self {
            frames: vec![frame],
            geo: VolumeGeometry::isotropic((z, h, w)),
        }
    }

    /// 获取几何信息.
    #[inline]
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geo
    }

    /// 获取时间步个数.
    #[inline]
    pub fn num_time_steps(&self) -> usize {
        self.frames.len()
    }

    /// 获取第 `time_step` 帧的不可变视图.
    ///
    /// 当 `time_step` 越界时 panic.
    #[inline]
    pub fn frame(&self, time_step: usize) -> ArrayView3<'_, u8> {
        self.frames[time_step].view()
    }

    /// 获取第 `time_step` 帧的可变视图.
    ///
    /// 当 `time_step` 越界时 panic.
    #[inline]
    pub fn frame_mut(&mut self, time_step: usize) -> ArrayViewMut3<'_, u8> {
        self.frames[time_step].view_mut()
    }

    /// 获取 `axis` 方向第 `index` 张切片的不可变视图.
    ///
    /// 当任一索引越界时 panic.
    #[inline]
    pub fn slice_at(&self, axis: SliceAxis, index: usize, time_step: usize) -> LabelSlice<'_> {
        LabelSlice::new(self.frames[time_step].index_axis(Axis(axis.index()), index))
    }

    /// 获取 `axis` 方向第 `index` 张切片的可变视图.
    ///
    /// 当任一索引越界时 panic.
    #[inline]
    pub fn slice_at_mut(
        &mut self,
        axis: SliceAxis,
        index: usize,
        time_step: usize,
    ) -> LabelSliceMut<'_> {
        LabelSliceMut::new(self.frames[time_step].index_axis_mut(Axis(axis.index()), index))
    }

    /// 获取能按索引升序迭代 `axis` 方向所有不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(
        &self,
        axis: SliceAxis,
        time_step: usize,
    ) -> impl ExactSizeIterator<Item = LabelSlice> {
        self.frames[time_step]
            .axis_iter(Axis(axis.index()))
            .map(LabelSlice::new)
    }

    /// 判断一张切片是否已被标注 (含有任意前景标签).
    #[inline]
    pub fn is_slice_labeled(&self, axis: SliceAxis, index: usize, time_step: usize) -> bool {
        self.slice_at(axis, index, time_step).has_foreground()
    }

    /// 收集 `axis` 方向上所有已标注切片的索引, 升序.
    pub fn labeled_slices(&self, axis: SliceAxis, time_step: usize) -> Vec<usize> {
        self.slice_iter(axis, time_step)
            .enumerate()
            .filter_map(|(i, s)| s.has_foreground().then_some(i))
            .collect()
    }

    /// 统计第 `time_step` 帧中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8, time_step: usize) -> usize {
        self.frames[time_step].iter().filter(|p| **p == label).count()
    }

    /// 绘制提交: 将画笔缓冲 `buffer` 中所有非背景位置以 `value`
    /// 写入指定切片, 其余位置不变. 返回被写入的像素个数.
    ///
    /// 当索引越界或缓冲形状与切片不符时 panic.
    pub fn merge_paint(
        &mut self,
        axis: SliceAxis,
        index: usize,
        time_step: usize,
        buffer: &LabelSlice,
        value: u8,
    ) -> usize {
        self.slice_at_mut(axis, index, time_step)
            .transfer_foreground(buffer, value)
    }
}
