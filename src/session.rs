//! 编辑会话: 画笔、插值、撤销与切换钩子的编排.

use std::sync::Arc;

use crate::brush::{BrushError, PaintSession, StrokeFeedback};
use crate::data::{DiffVolume, LabelVolume};
use crate::geometry::{GeometryError, ReferencePlane, SliceAxis};
use crate::interp::{
    interpolate_all, InterpError, InterpOutcome, InterpResult, InterpolationRequest,
    ShapeBasedInterpolation, SliceInterpolator,
};
use crate::task::TaskGate;
use crate::undo::{GroupId, MergeError, UndoHistory};
use crate::Idx2dF;

/// 会话级错误: 各子系统错误的聚合.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionError {
    /// 画笔错误.
    Brush(BrushError),

    /// 几何 / 时间校验错误.
    Geometry(GeometryError),

    /// 插值错误.
    Interp(InterpError),

    /// 全卷插值存在失败的 worker, 部分产出被整体放弃.
    InterpolationFailed {
        /// 各失败切片及其错误, 按切片索引升序.
        failures: Vec<(usize, InterpError)>,
    },

    /// 合并错误.
    Merge(MergeError),
}

impl From<BrushError> for SessionError {
    fn from(e: BrushError) -> Self {
        Self::Brush(e)
    }
}

impl From<GeometryError> for SessionError {
    fn from(e: GeometryError) -> Self {
        Self::Geometry(e)
    }
}

impl From<InterpError> for SessionError {
    fn from(e: InterpError) -> Self {
        Self::Interp(e)
    }
}

impl From<MergeError> for SessionError {
    fn from(e: MergeError) -> Self {
        Self::Merge(e)
    }
}

/// 会话操作结果.
pub type SessionResult<T> = Result<T, SessionError>;

/// 切片切换钩子.
type SliceHook = Box<dyn FnMut(SliceAxis, usize)>;

/// 时间切换钩子.
type TimeHook = Box<dyn FnMut(f64)>;

/// 一次交互式分割编辑会话.
///
/// 会话独占标签卷, 并持有为其服务的画笔会话、插值算法、
/// 撤销服务与后台任务闸门; 所有修改路径在此汇合,
/// 保证画笔提交与插值合并都经过同一个撤销域,
/// 且任何修改后距离场缓存都被失效.
///
/// 切片 / 时间切换钩子是普通可调用对象, 在切换点被同步调用;
/// 调用期间钩子自身已被会话取出, 天然不可重入.
/// 钩子不能访问会话本身, 只能携带外部状态.
pub struct EditSession {
    volume: LabelVolume,
    history: UndoHistory,
    paint: PaintSession,
    algo: Arc<dyn SliceInterpolator + Send + Sync>,
    gate: TaskGate<InterpResult<InterpOutcome>>,

    axis: SliceAxis,
    slice_index: usize,
    time_point: f64,
    time_step: usize,
    active_label: u8,

    on_slice_changed: Option<SliceHook>,
    on_time_changed: Option<TimeHook>,
}

impl EditSession {
    /// 以轴状位第 0 张切片、时间点 0、激活标签 1 创建会话,
    /// 插值算法为 [`ShapeBasedInterpolation`].
    pub fn new(volume: LabelVolume, brush_size: u32) -> SessionResult<Self> {
        Self::with_interpolator(volume, brush_size, Arc::new(ShapeBasedInterpolation::new()))
    }

    /// 以指定的插值算法创建会话.
    pub fn with_interpolator(
        volume: LabelVolume,
        brush_size: u32,
        algo: Arc<dyn SliceInterpolator + Send + Sync>,
    ) -> SessionResult<Self> {
        let axis = SliceAxis::Axial;
        let paint = PaintSession::new(volume.geometry().slice_shape(axis), brush_size)?;
        Ok(Self {
            volume,
            history: UndoHistory::new(),
            paint,
            algo,
            gate: TaskGate::new(),
            axis,
            slice_index: 0,
            time_point: 0.0,
            time_step: 0,
            active_label: 1,
            on_slice_changed: None,
            on_time_changed: None,
        })
    }

    /// 获取标签卷的只读引用.
    #[inline]
    pub fn volume(&self) -> &LabelVolume {
        &self.volume
    }

    /// 获取撤销服务的只读引用.
    #[inline]
    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    /// 当前切片方向.
    #[inline]
    pub fn axis(&self) -> SliceAxis {
        self.axis
    }

    /// 当前切片索引.
    #[inline]
    pub fn slice_index(&self) -> usize {
        self.slice_index
    }

    /// 当前时间点.
    #[inline]
    pub fn time_point(&self) -> f64 {
        self.time_point
    }

    /// 当前激活标签.
    #[inline]
    pub fn active_label(&self) -> u8 {
        self.active_label
    }

    /// 设置激活标签.
    #[inline]
    pub fn set_active_label(&mut self, label: u8) {
        self.active_label = label;
    }

    /// 调整笔刷尺寸.
    pub fn set_brush_size(&mut self, size: u32) -> SessionResult<()> {
        Ok(self.paint.set_brush_size(size)?)
    }

    /// 注册切片切换钩子, 替换已有钩子.
    pub fn set_on_slice_changed(&mut self, hook: impl FnMut(SliceAxis, usize) + 'static) {
        self.on_slice_changed = Some(Box::new(hook));
    }

    /// 注册时间切换钩子, 替换已有钩子.
    pub fn set_on_time_changed(&mut self, hook: impl FnMut(f64) + 'static) {
        self.on_time_changed = Some(Box::new(hook));
    }

    /// 切换激活切片.
    ///
    /// 未提交的绘制缓冲被丢弃, 随后同步触发切片切换钩子.
    pub fn activate_slice(&mut self, axis: SliceAxis, index: usize) -> SessionResult<()> {
        self.volume.geometry().check_slice_index(axis, index)?;
        self.axis = axis;
        self.slice_index = index;
        self.paint.reset(self.volume.geometry().slice_shape(axis));

        if let Some(mut hook) = self.on_slice_changed.take() {
            hook(axis, index);
            self.on_slice_changed = Some(hook);
        }
        Ok(())
    }

    /// 切换时间点.
    ///
    /// 时间步变化会使距离场缓存失效; 随后同步触发时间切换钩子.
    pub fn set_time_point(&mut self, time_point: f64) -> SessionResult<()> {
        let Some(step) = self.volume.geometry().time_point_to_time_step(time_point) else {
            return Err(GeometryError::InvalidTimePoint(time_point).into());
        };
        self.time_point = time_point;
        if step != self.time_step {
            self.time_step = step;
            self.algo.clear_cache();
        }

        if let Some(mut hook) = self.on_time_changed.take() {
            hook(time_point);
            self.on_time_changed = Some(hook);
        }
        Ok(())
    }

    /// 在当前切片上开始一次笔划.
    pub fn begin_stroke(&mut self, pos: Idx2dF) -> StrokeFeedback {
        self.paint.begin_stroke(pos)
    }

    /// 处理一次指针移动. 语义见 [`PaintSession::extend_stroke`].
    pub fn extend_stroke(&mut self, pos: Idx2dF, brush_down: bool) -> Option<StrokeFeedback> {
        self.paint.extend_stroke(pos, brush_down)
    }

    /// 提交当前笔划: 绘制缓冲以激活标签合入当前切片,
    /// 生成一条可撤销记录.
    ///
    /// 缓冲为空时不产生记录, 返回 `Ok(None)`.
    pub fn commit_stroke(&mut self) -> SessionResult<Option<GroupId>> {
        if !self.paint.is_dirty() {
            self.paint.end_stroke();
            return Ok(None);
        }
        let buffer = self.paint.end_stroke();

        let mut after = self
            .volume
            .slice_at(self.axis, self.slice_index, self.time_step)
            .to_owned();
        after
            .as_mutable()
            .transfer_foreground(&buffer.as_immut(), self.active_label);

        let diff = DiffVolume::single(self.axis, self.time_step, self.slice_index, after);
        let group = self.history.apply(&mut self.volume, &diff, "画笔笔划")?;
        self.algo.clear_cache();
        Ok(Some(group))
    }

    /// 在后台启动一轮全卷插值.
    ///
    /// 闸门保证同一时刻只有一个在途任务: 若有旧任务, 先阻塞等待
    /// 并返回其结果. 任务在提交时刻的标签卷快照上运行;
    /// 任务在途期间提交的编辑不会反映在其产出中.
    pub fn start_background_interpolation(
        &mut self,
    ) -> SessionResult<Option<InterpResult<InterpOutcome>>> {
        let plane = ReferencePlane::for_slice(self.volume.geometry(), self.axis, self.slice_index)?;
        let snapshot = self.volume.clone();
        let algo = Arc::clone(&self.algo);
        let time_point = self.time_point;
        Ok(self
            .gate
            .submit(move || interpolate_all(&snapshot, &plane, time_point, algo.as_ref())))
    }

    /// 确认全部插值: 把当前方向上所有可插值切片合入标签卷,
    /// 生成一条成组可撤销记录.
    ///
    /// 有在途后台任务时直接采用其产出, 否则同步计算一轮.
    /// 任一 worker 失败时整份部分产出被放弃, 标签卷不被触碰
    /// ([`SessionError::InterpolationFailed`]); 要合并部分产出的调用方
    /// 需自行组合 [`interpolate_all`] 与 [`UndoHistory::apply`].
    /// 产出为空时不产生记录, 返回 `Ok(None)`.
    pub fn accept_all_interpolations(&mut self) -> SessionResult<Option<GroupId>> {
        let outcome = match self.gate.drain() {
            Some(result) => result?,
            None => {
                let plane =
                    ReferencePlane::for_slice(self.volume.geometry(), self.axis, self.slice_index)?;
                interpolate_all(&self.volume, &plane, self.time_point, self.algo.as_ref())?
            }
        };
        if !outcome.failures.is_empty() {
            return Err(SessionError::InterpolationFailed {
                failures: outcome.failures,
            });
        }
        if outcome.diff.is_empty() {
            return Ok(None);
        }

        let description = format!("确认全部插值 ({})", outcome.changed);
        let group = self
            .history
            .apply(&mut self.volume, &outcome.diff, &description)?;
        self.algo.clear_cache();
        Ok(Some(group))
    }

    /// 确认当前切片的插值: 只把激活切片的插值结果合入标签卷,
    /// 生成一条单切片可撤销记录.
    ///
    /// 切片缺少参考无法插值时不产生记录, 返回 `Ok(None)`.
    pub fn accept_interpolation(&mut self) -> SessionResult<Option<GroupId>> {
        let request = InterpolationRequest {
            axis: self.axis,
            slice_index: self.slice_index,
            time_step: self.time_step,
        };
        let Some(slice) = self.algo.interpolate(&self.volume, &request)? else {
            return Ok(None);
        };

        let diff = DiffVolume::single(self.axis, self.time_step, self.slice_index, slice);
        let group = self.history.apply(&mut self.volume, &diff, "确认插值")?;
        self.algo.clear_cache();
        Ok(Some(group))
    }

    /// 撤销最近一条记录.
    pub fn undo(&mut self) -> SessionResult<GroupId> {
        let group = self.history.undo(&mut self.volume)?;
        self.algo.clear_cache();
        Ok(group)
    }

    /// 重做最近被撤销的记录.
    pub fn redo(&mut self) -> SessionResult<GroupId> {
        let group = self.history.redo(&mut self.volume)?;
        self.algo.clear_cache();
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::{EditSession, SessionError};
    use crate::interp::{InterpError, InterpResult, InterpolationRequest, SliceInterpolator};
    use crate::{LabelVolume, OwnedLabelSlice, SliceAxis, VolumeGeometry};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn session(shape: (usize, usize, usize)) -> EditSession {
        EditSession::new(LabelVolume::zeros(VolumeGeometry::isotropic(shape)), 3).unwrap()
    }

    /// 测试画笔提交与撤销的端到端路径.
    #[test]
    fn test_paint_commit_undo() {
        let mut s = session((4, 20, 20));
        s.set_active_label(5);

        s.begin_stroke((10.0, 8.0));
        s.extend_stroke((10.0, 12.0), true);
        let group = s.commit_stroke().unwrap().expect("非空笔划应产生记录");

        let painted = s.volume().count(5, 0);
        assert!(painted > 0);
        assert_eq!(s.volume().frame(0)[(0, 10, 10)], 5);
        assert_eq!(s.history().last_description(), Some("画笔笔划"));

        assert_eq!(s.undo().unwrap(), group);
        assert_eq!(s.volume().count(5, 0), 0);
        assert_eq!(s.redo().unwrap(), group);
        assert_eq!(s.volume().count(5, 0), painted);
    }

    /// 测试空笔划不产生撤销记录.
    #[test]
    fn test_empty_stroke_no_record() {
        let mut s = session((4, 10, 10));
        assert_eq!(s.commit_stroke().unwrap(), None);
        assert!(!s.history().can_undo());
    }

    /// 测试切片与时间切换钩子被同步触发.
    #[test]
    fn test_change_hooks() {
        let mut s = session((6, 10, 10));

        let slices: Rc<RefCell<Vec<(SliceAxis, usize)>>> = Rc::new(RefCell::new(Vec::new()));
        let times: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&slices);
        s.set_on_slice_changed(move |axis, index| log.borrow_mut().push((axis, index)));
        let log = Rc::clone(&times);
        s.set_on_time_changed(move |tp| log.borrow_mut().push(tp));

        s.activate_slice(SliceAxis::Coronal, 4).unwrap();
        s.activate_slice(SliceAxis::Axial, 2).unwrap();
        s.set_time_point(0.5).unwrap();

        assert_eq!(
            *slices.borrow(),
            vec![(SliceAxis::Coronal, 4), (SliceAxis::Axial, 2)]
        );
        assert_eq!(*times.borrow(), vec![0.5]);

        // 非法切换不触发钩子.
        assert!(s.activate_slice(SliceAxis::Axial, 6).is_err());
        assert!(s.set_time_point(9.0).is_err());
        assert_eq!(slices.borrow().len(), 2);
        assert_eq!(times.borrow().len(), 1);
    }

    /// 测试切片切换丢弃未提交的绘制缓冲.
    #[test]
    fn test_slice_change_discards_buffer() {
        let mut s = session((4, 10, 10));
        s.begin_stroke((5.0, 5.0));
        s.activate_slice(SliceAxis::Axial, 1).unwrap();
        assert_eq!(s.commit_stroke().unwrap(), None);
        assert_eq!(s.volume().count(1, 0), 0);
    }

    /// 在两端切片画出同一个方块.
    fn bracket_volume() -> LabelVolume {
        let mut vol = LabelVolume::zeros(VolumeGeometry::isotropic((8, 16, 16)));
        for index in [0, 7] {
            let mut sli = vol.slice_at_mut(SliceAxis::Axial, index, 0);
            for h in 6..=10 {
                for w in 6..=10 {
                    sli[(h, w)] = 1;
                }
            }
        }
        vol
    }

    /// 测试确认全部插值的合并与成组撤销.
    #[test]
    fn test_accept_all_interpolations() {
        let mut s = EditSession::new(bracket_volume(), 3).unwrap();
        let before = s.volume().count(1, 0);

        let group = s
            .accept_all_interpolations()
            .unwrap()
            .expect("有参考切片时应产生记录");
        assert_eq!(s.history().last_description(), Some("确认全部插值 (6)"));
        // 中间 6 张切片被填充为同一方块.
        assert_eq!(s.volume().count(1, 0), before * 4);
        for index in 1..=6 {
            assert!(s.volume().is_slice_labeled(SliceAxis::Axial, index, 0));
        }

        // 一次撤销整组回退.
        assert_eq!(s.undo().unwrap(), group);
        assert_eq!(s.volume().count(1, 0), before);
    }

    /// 测试单切片确认插值: 只有激活切片被合入, 撤销可回退.
    #[test]
    fn test_accept_single_interpolation() {
        let mut s = EditSession::new(bracket_volume(), 3).unwrap();
        s.activate_slice(SliceAxis::Axial, 3).unwrap();
        let before = s.volume().count(1, 0);

        let group = s
            .accept_interpolation()
            .unwrap()
            .expect("有参考切片时应产生记录");
        assert_eq!(s.history().last_description(), Some("确认插值"));
        assert!(s.volume().is_slice_labeled(SliceAxis::Axial, 3, 0));
        for index in [1, 2, 4, 5, 6] {
            assert!(!s.volume().is_slice_labeled(SliceAxis::Axial, index, 0));
        }

        assert_eq!(s.undo().unwrap(), group);
        assert_eq!(s.volume().count(1, 0), before);
    }

    /// 测试空卷上确认插值为 no-op.
    #[test]
    fn test_accept_on_empty_volume() {
        let mut s = session((6, 8, 8));
        assert_eq!(s.accept_all_interpolations().unwrap(), None);
        assert_eq!(s.accept_interpolation().unwrap(), None);
        assert!(!s.history().can_undo());
    }

    /// 在固定切片上必然失败、其余切片产出同一后像的注入式算法.
    struct FailingAt {
        index: usize,
    }

    impl SliceInterpolator for FailingAt {
        fn interpolate(
            &self,
            volume: &LabelVolume,
            request: &InterpolationRequest,
        ) -> InterpResult<Option<OwnedLabelSlice>> {
            if request.slice_index == self.index {
                return Err(InterpError::SliceIndexOutOfRange(self.index, 0));
            }
            let mut out = OwnedLabelSlice::zeros(volume.geometry().slice_shape(request.axis));
            out.as_mutable().fill_batch([(0, 0)], 1);
            Ok(Some(out))
        }
    }

    /// 测试任一 worker 失败时整份插值产出被放弃, 标签卷不被触碰.
    #[test]
    fn test_accept_all_discards_on_failure() {
        let vol = LabelVolume::zeros(VolumeGeometry::isotropic((8, 8, 8)));
        let mut s =
            EditSession::with_interpolator(vol, 3, Arc::new(FailingAt { index: 4 })).unwrap();

        match s.accept_all_interpolations() {
            Err(SessionError::InterpolationFailed { failures }) => {
                assert_eq!(failures, vec![(4, InterpError::SliceIndexOutOfRange(4, 0))]);
            }
            other => panic!("期望 InterpolationFailed, 实为 {other:?}"),
        }

        // 其余切片的成功产出也被一并放弃.
        assert_eq!(s.volume().count(1, 0), 0);
        assert!(!s.history().can_undo());
    }

    /// 测试后台插值任务的产出被确认路径采用.
    #[test]
    fn test_background_interpolation_accept() {
        let mut s = EditSession::new(bracket_volume(), 3).unwrap();
        assert!(s.start_background_interpolation().unwrap().is_none());

        assert!(s.accept_all_interpolations().unwrap().is_some());
        for index in 1..=6 {
            assert!(s.volume().is_slice_labeled(SliceAxis::Axial, index, 0));
        }
    }
}
