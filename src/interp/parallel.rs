//! 并行全卷插值: 轮转分片、私有 diff 区域与结果聚合.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use super::{InterpError, InterpResult, InterpolationRequest, SliceInterpolator};
use crate::data::{DiffVolume, LabelVolume};
use crate::geometry::ReferencePlane;

/// 全卷插值的进度计数. 可被外部观察者在任务运行中读取.
#[derive(Debug, Default)]
pub struct InterpProgress {
    completed: AtomicUsize,
    changed: AtomicUsize,
}

impl InterpProgress {
    /// 创建零值进度计数.
    pub fn new() -> Self {
        Self::default()
    }

    /// 已处理 (含跳过) 的切片个数.
    #[inline]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// 已产出插值结果的切片个数.
    #[inline]
    pub fn changed(&self) -> usize {
        self.changed.load(Ordering::Relaxed)
    }

    #[inline]
    fn note_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn note_changed(&self) {
        self.changed.fetch_add(1, Ordering::Relaxed);
    }
}

/// 一轮全卷插值的聚合产出.
#[derive(Debug)]
pub struct InterpOutcome {
    /// 所有 worker 产出的切片后像, 按切片索引升序.
    pub diff: DiffVolume,

    /// 产出插值结果的切片个数. 恒等于 `diff.len()`.
    pub changed: usize,

    /// 各 worker 遇到的失败, 按 `(切片索引, 错误)` 记录.
    /// 一个 worker 失败后会放弃自己剩余的切片,
    /// 其余 worker 的产出不受影响.
    pub failures: Vec<(usize, InterpError)>,
}

/// 把 `0..num` 的切片索引轮转分配给 `workers` 个桶.
///
/// 索引 `i` 落入桶 `i % workers`. 这样相邻切片大概率被
/// 不同 worker 处理, 自然摊平了各切片的计算量差异.
pub fn partition_round_robin(num: usize, workers: usize) -> Vec<Vec<usize>> {
    assert!(workers > 0, "worker 个数不能为 0");
    let mut buckets = vec![Vec::with_capacity(num.div_ceil(workers)); workers];
    for i in 0..num {
        buckets[i % workers].push(i);
    }
    buckets
}

/// 对参考平面方向上的所有未标注切片做插值, 聚合为一个 diff 卷.
///
/// 便捷入口, 进度不对外暴露; 参见 [`interpolate_all_observed`].
pub fn interpolate_all<A>(
    volume: &LabelVolume,
    plane: &ReferencePlane,
    time_point: f64,
    algo: &A,
) -> InterpResult<InterpOutcome>
where
    A: SliceInterpolator + ?Sized,
{
    interpolate_all_observed(volume, plane, time_point, algo, &InterpProgress::new())
}

/// 对参考平面方向上的所有未标注切片做插值, 聚合为一个 diff 卷,
/// 并把进度写入 `progress`.
///
/// worker 个数取硬件并行度与切片总数的较小者. 每个 worker
/// 克隆一份参考平面, 逐切片推算平面原点并调用算法,
/// 结果写入各自私有的 diff 区域, 全部结束后聚合.
/// 已标注的参考切片被跳过; 某个 worker 失败只放弃该 worker
/// 自己剩余的切片, 部分产出仍会出现在 [`InterpOutcome::diff`] 中.
///
/// 时间点无效时记录警告并返回 `Err`, 不做任何插值.
pub fn interpolate_all_observed<A>(
    volume: &LabelVolume,
    plane: &ReferencePlane,
    time_point: f64,
    algo: &A,
    progress: &InterpProgress,
) -> InterpResult<InterpOutcome>
where
    A: SliceInterpolator + ?Sized,
{
    let workers = thread::available_parallelism().map(|p| p.get()).unwrap_or(1);
    interpolate_all_with_workers(volume, plane, time_point, algo, progress, workers)
}

/// 指定 worker 个数的插值入口. 并发失败场景的测试依赖确定的分片.
fn interpolate_all_with_workers<A>(
    volume: &LabelVolume,
    plane: &ReferencePlane,
    time_point: f64,
    algo: &A,
    progress: &InterpProgress,
    workers: usize,
) -> InterpResult<InterpOutcome>
where
    A: SliceInterpolator + ?Sized,
{
    let geo = volume.geometry();
    let Some(time_step) = geo.time_point_to_time_step(time_point) else {
        log::warn!("全卷插值请求的时间点 {time_point} 无效, 已拒绝");
        return Err(InterpError::InvalidTimePoint(time_point));
    };

    let axis = plane.axis();
    let num = geo.num_slices(axis);
    let mut labeled = vec![false; num];
    for i in volume.labeled_slices(axis, time_step) {
        labeled[i] = true;
    }

    let workers = workers.min(num).max(1);
    let buckets = partition_round_robin(num, workers);

    let run = |bucket: Vec<usize>| -> (DiffVolume, Vec<(usize, InterpError)>) {
        let mut diff = DiffVolume::new(axis, time_step);
        let mut failures = Vec::new();
        let worker_plane = plane.clone();

        for index in bucket {
            if labeled[index] {
                progress.note_completed();
                continue;
            }
            let slice_plane = worker_plane.with_slice_index(geo, index);
            let request = InterpolationRequest::from_plane(geo, &slice_plane, time_step);
            match algo.interpolate(volume, &request) {
                Ok(Some(slice)) => {
                    diff.push(index, slice);
                    progress.note_changed();
                }
                Ok(None) => {}
                Err(e) => {
                    // 放弃本 worker 剩余的切片.
                    failures.push((index, e));
                    break;
                }
            }
            progress.note_completed();
        }
        (diff, failures)
    };

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::prelude::*;
            let parts: Vec<_> = buckets.into_par_iter().map(run).collect();
        } else {
            let parts: Vec<_> = buckets.into_iter().map(run).collect();
        }
    }

    let mut diff = DiffVolume::new(axis, time_step);
    let mut failures = Vec::new();
    for (part, mut errs) in parts {
        diff.absorb(part);
        failures.append(&mut errs);
    }
    diff.sort_by_index();
    failures.sort_by_key(|(i, _)| *i);

    let changed = diff.len();
    Ok(InterpOutcome {
        diff,
        changed,
        failures,
    })
}
