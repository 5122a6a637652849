#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 3D 医学分割标注编辑所需的画笔几何、切片形状插值
//! 与可撤销体数据合并功能.
//!
//! 该 crate 是交互式可视化应用中分割编辑子系统的算法核心:
//! 渲染管线、窗口/事件框架、场景数据管理和文件 I/O 均为外部协作者,
//! 不属于本库的职责范围.
//!
//! # 注意
//!
//! 1. 该 crate 目前仅提供 `safe` 接口.
//! 2. 在非期望情况下 (如索引越界), 程序会直接 panic, 而不会导致内存错误.
//!   As what Rust promises.
//!
//! # 坐标约定
//!
//! 1. 体数据按 `(z, h, w)` 组织, 其中 z 为切片方向, h 向下增长,
//!   w 向右增长; 时间维度独立于空间三维, 以帧序列存储.
//! 2. 二维切片索引为 `(h, w)`. 连续 (索引空间) 坐标下,
//!   整数点即像素质心; 像素角点位于半整数处.
//! 3. 世界坐标与索引坐标之间为轴对齐仿射变换 (原点 + 各向分辨率),
//!   由 [`VolumeGeometry`] 提供.
//!
//! # 功能地图
//!
//! ### 画笔轮廓与笔划合成
//!
//! 把整数笔刷尺寸光栅化为闭合圆形轮廓 (区分奇偶尺寸的中心修正),
//! 并在指针移动时将轮廓填充进绘制缓冲, 快速移动时以矩形补隙.
//!
//! 实现位于 `src/brush`.
//!
//! ### 切片形状插值
//!
//! 由上下两张已标注切片的符号距离场线性混合, 估计中间切片的标签.
//! 多标签时按 "最近标签所有权" 归属.
//!
//! 实现位于 `src/interp/{distance, shape}.rs`.
//!
//! ### 并行全卷插值
//!
//! 将切片索引轮转分配给固定数量的 worker, 各自写入私有 diff 区域,
//! join 后聚合结果与错误.
//!
//! 实现位于 `src/interp/parallel.rs`.
//!
//! ### 可撤销合并
//!
//! diff 卷以一个成组操作记录的形式原子地写入标签卷,
//! 撤销时回填 apply 时刻捕获的前像. 记录以 zlib 压缩保留.
//!
//! 实现位于 `src/undo.rs`.
//!
//! ### 任务串行化与会话编排
//!
//! 后台插值任务的 "先等待旧任务再启动新任务" 规则,
//! 以及切片/时间切换钩子与绘制会话的重置联动.
//!
//! 实现位于 `src/{task, session}.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 高精度通用索引 / 向量.
pub type Idx2dF = (f64, f64);

/// 标签体数据与二维切片视图.
mod data;

pub use data::{
    CompactLabelSlice, DiffVolume, LabelMirror, LabelSlice, LabelSliceMut, LabelVolume,
    OwnedLabelSlice,
};

pub mod consts;

mod geometry;

pub use geometry::{GeometryError, ReferencePlane, SliceAxis, VolumeGeometry};

pub mod brush;

pub mod interp;

mod undo;

pub use undo::{GroupId, MergeError, MergeResult, UndoHistory};

pub mod task;

mod session;

pub use session::{EditSession, SessionError, SessionResult};

pub mod prelude;
