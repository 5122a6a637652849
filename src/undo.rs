//! 可撤销的体数据合并: 成组操作记录、撤销 / 重做栈.

use std::collections::VecDeque;

use crate::data::{CompactLabelSlice, DiffVolume, LabelVolume};
use crate::geometry::SliceAxis;
use crate::Idx2d;

/// 操作组编号. 单调递增, 一次合并的所有切片写入共享同一个编号.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GroupId(u64);

/// 合并错误.
#[derive(Clone, Debug, PartialEq)]
pub enum MergeError {
    /// diff 卷的时间步越界. 两个参数依次为 (时间步, 时间步总数).
    InvalidTimeStep(usize, usize),

    /// diff 卷条目的切片索引越界. 两个参数依次为 (索引, 切片总数).
    SliceIndexOutOfRange(usize, usize),

    /// diff 卷条目的形状与目标切片不符.
    ShapeMismatch {
        /// 出错条目的切片索引.
        index: usize,
        /// 目标切片的形状.
        expected: Idx2d,
        /// 条目的实际形状.
        actual: Idx2d,
    },

    /// diff 卷不含任何条目, 无事可合并.
    EmptyDiff,

    /// 撤销栈为空.
    NothingToUndo,

    /// 重做栈为空.
    NothingToRedo,
}

/// 合并操作结果.
pub type MergeResult<T> = Result<T, MergeError>;

/// 一张切片的前像 / 后像对. 两者均以压缩形态保留.
#[derive(Clone, Debug)]
struct SliceRecord {
    index: usize,
    before: CompactLabelSlice,
    after: CompactLabelSlice,
}

/// 一次成组合并的完整操作记录.
#[derive(Clone, Debug)]
struct MergeRecord {
    group: GroupId,
    axis: SliceAxis,
    time_step: usize,
    description: String,
    slices: Vec<SliceRecord>,
}

/// 撤销服务: 把 diff 卷原子地合并进标签卷, 并维护撤销 / 重做栈.
///
/// 该服务是一个显式对象, 由会话持有并在调用点传入,
/// 不依赖任何进程级全局状态; 一个程序可以同时存在多个互不干扰的
/// 撤销域. 服务与标签卷分离存放, 每次操作都以 `&mut` 同时借到两者.
///
/// 合并是全有或全无的: 任一条目校验失败时整组拒绝, 标签卷不被触碰.
/// 撤销所需的前像在 apply 时刻捕获并压缩保留; 栈深超出上限时
/// 从最旧的记录开始丢弃.
#[derive(Debug)]
pub struct UndoHistory {
    undo: VecDeque<MergeRecord>,
    redo: Vec<MergeRecord>,
    next_group: u64,
    object_events: u64,
    depth: usize,
}

/// 默认撤销栈深度.
const DEFAULT_DEPTH: usize = 64;

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoHistory {
    /// 创建默认栈深的撤销服务.
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_DEPTH)
    }

    /// 创建指定栈深的撤销服务.
    ///
    /// 当 `depth` 为 0 时 panic.
    pub fn with_depth(depth: usize) -> Self {
        assert!(depth > 0, "撤销栈深度不能为 0");
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            next_group: 0,
            object_events: 0,
            depth,
        }
    }

    /// 把 diff 卷合并进标签卷, 生成一条可撤销的成组操作记录.
    ///
    /// 先整组校验 (时间步、切片索引、条目形状), 任一条目不合法时
    /// 返回 `Err` 且标签卷不被触碰; 校验通过后逐条目捕获前像并整片
    /// 覆写. 成功时返回新记录的组编号, 同时清空重做栈.
    ///
    /// 空 diff 卷被整组拒绝 ([`MergeError::EmptyDiff`]):
    /// 空记录会让随后的一次撤销静默消耗一个撤销步.
    pub fn apply(
        &mut self,
        volume: &mut LabelVolume,
        diff: &DiffVolume,
        description: &str,
    ) -> MergeResult<GroupId> {
        if diff.is_empty() {
            return Err(MergeError::EmptyDiff);
        }
        let axis = diff.axis();
        let time_step = diff.time_step();
        let geo = volume.geometry().clone();

        if time_step >= geo.num_time_steps() {
            return Err(MergeError::InvalidTimeStep(time_step, geo.num_time_steps()));
        }
        let num = geo.num_slices(axis);
        let expected = geo.slice_shape(axis);
        for (index, slice) in diff.iter() {
            if index >= num {
                return Err(MergeError::SliceIndexOutOfRange(index, num));
            }
            let actual = slice.as_immut().shape();
            if actual != expected {
                return Err(MergeError::ShapeMismatch {
                    index,
                    expected,
                    actual,
                });
            }
        }

        let mut slices = Vec::with_capacity(diff.len());
        for (index, after) in diff.iter() {
            let mut target = volume.slice_at_mut(axis, index, time_step);
            let before = target.to_owned().compress();
            target.overwrite(&after.as_immut());
            slices.push(SliceRecord {
                index,
                before,
                after: after.compress(),
            });
        }

        let group = GroupId(self.next_group);
        self.next_group += 1;
        self.object_events += diff.len() as u64;

        self.undo.push_back(MergeRecord {
            group,
            axis,
            time_step,
            description: description.to_owned(),
            slices,
        });
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
        self.redo.clear();
        Ok(group)
    }

    /// 撤销最近一条记录: 回填 apply 时刻捕获的前像.
    ///
    /// 记录整组迁移到重做栈. 撤销栈为空时返回 `Err`.
    /// 标签卷必须与记录生成时是同一个, 否则 panic.
    pub fn undo(&mut self, volume: &mut LabelVolume) -> MergeResult<GroupId> {
        let record = self.undo.pop_back().ok_or(MergeError::NothingToUndo)?;
        for rec in record.slices.iter().rev() {
            let before = rec.before.decompress();
            volume
                .slice_at_mut(record.axis, rec.index, record.time_step)
                .overwrite(&before.as_immut());
        }
        let group = record.group;
        self.redo.push(record);
        Ok(group)
    }

    /// 重做最近被撤销的记录: 重新写入后像.
    ///
    /// 记录整组迁回撤销栈. 重做栈为空时返回 `Err`.
    pub fn redo(&mut self, volume: &mut LabelVolume) -> MergeResult<GroupId> {
        let record = self.redo.pop().ok_or(MergeError::NothingToRedo)?;
        for rec in record.slices.iter() {
            let after = rec.after.decompress();
            volume
                .slice_at_mut(record.axis, rec.index, record.time_step)
                .overwrite(&after.as_immut());
        }
        let group = record.group;
        self.undo.push_back(record);
        Ok(group)
    }

    /// 撤销栈当前深度.
    #[inline]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// 重做栈当前深度.
    #[inline]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// 是否有可撤销的记录?
    #[inline]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// 是否有可重做的记录?
    #[inline]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// 最近一条可撤销记录的描述.
    pub fn last_description(&self) -> Option<&str> {
        self.undo.back().map(|r| r.description.as_str())
    }

    /// 历史上所有切片级写入事件的累计个数.
    #[inline]
    pub fn object_events(&self) -> u64 {
        self.object_events
    }

    /// 丢弃全部撤销 / 重做记录. 编号序列不重置.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{MergeError, UndoHistory};
    use crate::{DiffVolume, LabelVolume, OwnedLabelSlice, SliceAxis, VolumeGeometry};

    fn uniform_slice(shape: (usize, usize), label: u8) -> OwnedLabelSlice {
        let mut sli = OwnedLabelSlice::zeros(shape);
        sli.as_mutable().replace(0, label);
        sli
    }

    fn small_volume() -> LabelVolume {
        LabelVolume::zeros(VolumeGeometry::isotropic((6, 4, 4)))
    }

    /// 测试合并、撤销与重做的完整往返.
    #[test]
    fn test_apply_undo_redo_round_trip() {
        let mut vol = small_volume();
        vol.slice_at_mut(SliceAxis::Axial, 1, 0).fill_batch([(0, 0)], 9);

        let mut diff = DiffVolume::new(SliceAxis::Axial, 0);
        diff.push(1, uniform_slice((4, 4), 2));
        diff.push(3, uniform_slice((4, 4), 2));

        let mut history = UndoHistory::new();
        let group = history.apply(&mut vol, &diff, "插值合并").unwrap();
        assert_eq!(vol.count(2, 0), 32);
        assert_eq!(vol.count(9, 0), 0);
        assert_eq!(history.last_description(), Some("插值合并"));
        assert_eq!(history.object_events(), 2);

        assert_eq!(history.undo(&mut vol).unwrap(), group);
        // 前像精确回填, 包括 apply 前的手工写入.
        assert_eq!(vol.count(2, 0), 0);
        assert_eq!(vol.frame(0)[(1, 0, 0)], 9);
        assert!(history.can_redo());

        assert_eq!(history.redo(&mut vol).unwrap(), group);
        assert_eq!(vol.count(2, 0), 32);
    }

    /// 测试组编号单调递增.
    #[test]
    fn test_group_id_monotonic() {
        let mut vol = small_volume();
        let mut history = UndoHistory::new();
        let diff = DiffVolume::single(SliceAxis::Axial, 0, 0, uniform_slice((4, 4), 1));

        let g1 = history.apply(&mut vol, &diff, "a").unwrap();
        let g2 = history.apply(&mut vol, &diff, "b").unwrap();
        let g3 = history.apply(&mut vol, &diff, "c").unwrap();
        assert!(g1 < g2 && g2 < g3);
    }

    /// 测试校验失败时的全有或全无.
    #[test]
    fn test_all_or_nothing_validation() {
        let mut vol = small_volume();
        let mut history = UndoHistory::new();

        // 合法条目 + 越界条目: 整组被拒, 标签卷不被触碰.
        let mut diff = DiffVolume::new(SliceAxis::Axial, 0);
        diff.push(0, uniform_slice((4, 4), 1));
        diff.push(6, uniform_slice((4, 4), 1));
        assert_eq!(
            history.apply(&mut vol, &diff, "x").unwrap_err(),
            MergeError::SliceIndexOutOfRange(6, 6)
        );
        assert_eq!(vol.count(1, 0), 0);
        assert!(!history.can_undo());

        // 形状不符.
        let diff = DiffVolume::single(SliceAxis::Axial, 0, 0, uniform_slice((3, 4), 1));
        assert_eq!(
            history.apply(&mut vol, &diff, "x").unwrap_err(),
            MergeError::ShapeMismatch {
                index: 0,
                expected: (4, 4),
                actual: (3, 4),
            }
        );

        // 时间步越界.
        let diff = DiffVolume::single(SliceAxis::Axial, 3, 0, uniform_slice((4, 4), 1));
        assert_eq!(
            history.apply(&mut vol, &diff, "x").unwrap_err(),
            MergeError::InvalidTimeStep(3, 1)
        );
    }

    /// 测试栈深上限与最旧记录的丢弃.
    #[test]
    fn test_depth_eviction() {
        let mut vol = small_volume();
        let mut history = UndoHistory::with_depth(2);
        for label in 1..=3u8 {
            let diff =
                DiffVolume::single(SliceAxis::Axial, 0, 0, uniform_slice((4, 4), label));
            history.apply(&mut vol, &diff, "覆写").unwrap();
        }
        assert_eq!(history.undo_depth(), 2);

        history.undo(&mut vol).unwrap();
        history.undo(&mut vol).unwrap();
        assert_eq!(history.undo(&mut vol).unwrap_err(), MergeError::NothingToUndo);
        // 最旧的记录已被丢弃, 卷停留在第一次合并的后像上.
        assert_eq!(vol.count(1, 0), 16);
    }

    /// 测试空 diff 卷被拒绝, 不产生占位记录.
    #[test]
    fn test_empty_diff_rejected() {
        let mut vol = small_volume();
        let mut history = UndoHistory::new();

        let empty = DiffVolume::new(SliceAxis::Axial, 0);
        assert_eq!(
            history.apply(&mut vol, &empty, "x").unwrap_err(),
            MergeError::EmptyDiff
        );
        assert!(!history.can_undo());
        assert_eq!(history.object_events(), 0);

        // 真实记录之后的撤销不会被空记录抵消.
        let diff = DiffVolume::single(SliceAxis::Axial, 0, 0, uniform_slice((4, 4), 1));
        history.apply(&mut vol, &diff, "覆写").unwrap();
        assert!(history.apply(&mut vol, &empty, "x").is_err());
        history.undo(&mut vol).unwrap();
        assert_eq!(vol.count(1, 0), 0);
    }

    /// 测试新的合并清空重做栈.
    #[test]
    fn test_apply_clears_redo() {
        let mut vol = small_volume();
        let mut history = UndoHistory::new();
        let diff = DiffVolume::single(SliceAxis::Axial, 0, 0, uniform_slice((4, 4), 1));

        history.apply(&mut vol, &diff, "a").unwrap();
        history.undo(&mut vol).unwrap();
        assert!(history.can_redo());

        history.apply(&mut vol, &diff, "b").unwrap();
        assert!(!history.can_redo());
        assert_eq!(history.redo(&mut vol).unwrap_err(), MergeError::NothingToRedo);
    }
}
