//! diff 卷: 插值或绘制一轮产生的稀疏切片增量.

use super::OwnedLabelSlice;
use crate::geometry::SliceAxis;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一组待合并的切片增量.
///
/// 条目存储的是目标切片的 **绝对后像** (而非逐体素增量):
/// apply 即整片覆写. 撤销所需的前像由合并方在 apply
/// 时刻自行捕获, 参见 [`crate::UndoHistory`].
///
/// 同一个 diff 卷中的条目互不重叠 (并行插值的轮转分片保证了这一点),
/// 因此合并时的写入顺序无关紧要.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct DiffVolume {
    axis: SliceAxis,
    time_step: usize,
    entries: Vec<(usize, OwnedLabelSlice)>,
}

impl DiffVolume {
    /// 创建空 diff 卷.
    #[inline]
    pub fn new(axis: SliceAxis, time_step: usize) -> Self {
        Self {
            axis,
            time_step,
            entries: Vec::new(),
        }
    }

    /// 创建只含一张切片的 diff 卷. 用于绘制提交等单切片场景.
    pub fn single(axis: SliceAxis, time_step: usize, index: usize, slice: OwnedLabelSlice) -> Self {
        let mut diff = Self::new(axis, time_step);
        diff.push(index, slice);
        diff
    }

    /// 追加一个切片条目.
    ///
    /// 调用者必须保证索引不重复; debug 构建下重复索引会 panic.
    pub fn push(&mut self, index: usize, slice: OwnedLabelSlice) {
        debug_assert!(
            self.entries.iter().all(|(i, _)| *i != index),
            "diff 卷条目索引重复"
        );
        self.entries.push((index, slice));
    }

    /// 吸收另一个 worker 的条目. 两者的方向与时间步必须一致.
    pub fn absorb(&mut self, other: DiffVolume) {
        assert_eq!(self.axis, other.axis);
        assert_eq!(self.time_step, other.time_step);
        for (index, slice) in other.entries {
            self.push(index, slice);
        }
    }

    /// 获取切片方向.
    #[inline]
    pub fn axis(&self) -> SliceAxis {
        self.axis
    }

    /// 获取时间步.
    #[inline]
    pub fn time_step(&self) -> usize {
        self.time_step
    }

    /// 条目个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否不含任何条目. 空 diff 卷的合并应被调用方跳过.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 判断是否含有指定切片索引的条目.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.entries.iter().any(|(i, _)| *i == index)
    }

    /// 按插入序迭代所有 `(切片索引, 后像)` 条目.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (usize, &OwnedLabelSlice)> {
        self.entries.iter().map(|(i, s)| (*i, s))
    }

    /// 将条目按切片索引升序排列. 仅影响迭代顺序, 不影响合并语义.
    #[inline]
    pub fn sort_by_index(&mut self) {
        self.entries.sort_by_key(|(i, _)| *i);
    }
}
