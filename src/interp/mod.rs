//! 切片形状插值: 单切片算法与并行全卷编排.
//!
//! [`SliceInterpolator`] 是插值算法的统一入口;
//! [`ShapeBasedInterpolation`] 是其符号距离场实现.
//! [`interpolate_all`] 把一个方向上所有未标注切片轮转分配给
//! 固定数量的 worker 并聚合结果.

mod distance;
mod parallel;
mod shape;

pub use parallel::{
    interpolate_all, interpolate_all_observed, partition_round_robin, InterpOutcome,
    InterpProgress,
};
pub use shape::ShapeBasedInterpolation;

use crate::data::{LabelVolume, OwnedLabelSlice};
use crate::geometry::{GeometryError, ReferencePlane, SliceAxis, VolumeGeometry};

/// 插值错误.
#[derive(Clone, Debug, PartialEq)]
pub enum InterpError {
    /// 请求的时间点不在体数据的有效时间范围内.
    InvalidTimePoint(f64),

    /// 切片索引超出 `[0, num_slices)`. 两个参数依次为 (索引, 切片总数).
    SliceIndexOutOfRange(usize, usize),
}

impl From<GeometryError> for InterpError {
    fn from(e: GeometryError) -> Self {
        match e {
            GeometryError::InvalidTimePoint(t) => InterpError::InvalidTimePoint(t),
            GeometryError::SliceIndexOutOfRange(i, n) => InterpError::SliceIndexOutOfRange(i, n),
        }
    }
}

/// 插值操作结果.
pub type InterpResult<T> = Result<T, InterpError>;

/// 一次单切片插值请求.
#[derive(Clone, Debug, PartialEq)]
pub struct InterpolationRequest {
    /// 切片方向.
    pub axis: SliceAxis,

    /// 目标切片索引.
    pub slice_index: usize,

    /// 时间步.
    pub time_step: usize,
}

impl InterpolationRequest {
    /// 由参考平面反推目标切片, 构造插值请求.
    pub fn from_plane(geo: &VolumeGeometry, plane: &ReferencePlane, time_step: usize) -> Self {
        Self {
            axis: plane.axis(),
            slice_index: plane.slice_index(geo),
            time_step,
        }
    }
}

/// 单切片插值算法.
///
/// `Sync` 约束允许同一个算法实例被多个 worker 并发调用;
/// 实现内部如有缓存, 需要自行保证线程安全.
pub trait SliceInterpolator: Sync {
    /// 估计请求切片的标签.
    ///
    /// 返回 `Ok(None)` 表示该切片缺少足够的参考切片, 无法插值
    /// (不是错误); 返回 `Ok(Some(_))` 给出完整的切片后像.
    fn interpolate(
        &self,
        volume: &LabelVolume,
        request: &InterpolationRequest,
    ) -> InterpResult<Option<OwnedLabelSlice>>;

    /// 丢弃实现内部的缓存 (若有). 参考数据被改写后由调用方触发.
    fn clear_cache(&self) {}
}
