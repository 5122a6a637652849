//! 体数据几何: 世界/索引坐标变换、时间几何与切片参考平面.
//!
//! 外层应用中的几何协作者在本 crate 内被收敛为该模块:
//! 所有变换都是确定性的纯函数.

use crate::{Idx2d, Idx3d};
use num::ToPrimitive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 切片方向.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SliceAxis {
    /// 轴状位. 沿 z 方向切片, 切片形状为 `(h, w)`.
    Axial,

    /// 冠状位. 沿 h 方向切片, 切片形状为 `(z, w)`.
    Coronal,

    /// 矢状位. 沿 w 方向切片, 切片形状为 `(z, h)`.
    Sagittal,
}

impl SliceAxis {
    /// 该方向对应 `(z, h, w)` 数据的轴编号.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            SliceAxis::Axial => 0,
            SliceAxis::Coronal => 1,
            SliceAxis::Sagittal => 2,
        }
    }
}

/// 几何 / 时间校验错误.
#[derive(Clone, Debug, PartialEq)]
pub enum GeometryError {
    /// 请求的时间点不在体数据的有效时间范围内.
    InvalidTimePoint(f64),

    /// 切片索引超出 `[0, num_slices)`. 两个参数依次为 (索引, 切片总数).
    SliceIndexOutOfRange(usize, usize),
}

/// 体数据的不可变几何信息.
///
/// 体数据生命周期内形状与分辨率固定, 只有体素值会变化;
/// 因此该结构在构造后不提供任何修改接口.
///
/// 世界坐标轴与索引坐标轴同序 (`[z, h, w]`),
/// 两者之间为轴对齐仿射变换: `world = origin + spacing * index`.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeGeometry {
    /// 空间形状 `(z, h, w)`. 各维严格为正.
    shape: Idx3d,

    /// 体素分辨率, 以毫米为单位, 按 `[z, h, w]` 存储.
    spacing: [f64; 3],

    /// 索引 `(0, 0, 0)` 处体素质心的世界坐标, 以毫米为单位.
    origin: [f64; 3],

    /// 时间步个数. 纯 3D 数据为 1.
    num_time_steps: usize,
}

impl VolumeGeometry {
    /// 创建几何信息.
    ///
    /// 当任一维度或时间步个数为 0, 或分辨率非正时 panic.
    pub fn new(shape: Idx3d, spacing: [f64; 3], origin: [f64; 3], num_time_steps: usize) -> Self {
        let (z, h, w) = shape;
        assert!(z > 0 && h > 0 && w > 0, "体数据形状不能为空");
        assert!(num_time_steps > 0, "时间步个数不能为 0");
        assert!(spacing.iter().all(|s| *s > 0.0), "体素分辨率必须为正");
        Self {
            shape,
            spacing,
            origin,
            num_time_steps,
        }
    }

    /// 创建各向同性 (1 mm)、原点为零、单时间步的几何信息.
    /// 主要用于测试与实验场景.
    #[inline]
    pub fn isotropic(shape: Idx3d) -> Self {
        Self::new(shape, [1.0; 3], [0.0; 3], 1)
    }

    /// 获取空间形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 获取体素分辨率, 以毫米为单位, 按 `[z, h, w]` 排列.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 获取时间步个数.
    #[inline]
    pub fn num_time_steps(&self) -> usize {
        self.num_time_steps
    }

    /// 获取 `axis` 方向上的切片个数.
    #[inline]
    pub fn num_slices(&self, axis: SliceAxis) -> usize {
        let (z, h, w) = self.shape;
        [z, h, w][axis.index()]
    }

    /// 获取 `axis` 方向上单张切片的形状.
    #[inline]
    pub fn slice_shape(&self, axis: SliceAxis) -> Idx2d {
        let (z, h, w) = self.shape;
        match axis {
            SliceAxis::Axial => (h, w),
            SliceAxis::Coronal => (z, w),
            SliceAxis::Sagittal => (z, h),
        }
    }

    /// 判断三维索引是否合法 (未越界).
    #[inline]
    pub fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape;
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 世界坐标转换为连续索引坐标.
    #[inline]
    pub fn world_to_index(&self, world: [f64; 3]) -> [f64; 3] {
        let mut idx = [0.0; 3];
        for i in 0..3 {
            idx[i] = (world[i] - self.origin[i]) / self.spacing[i];
        }
        idx
    }

    /// 连续索引坐标转换为世界坐标.
    #[inline]
    pub fn index_to_world(&self, index: [f64; 3]) -> [f64; 3] {
        let mut world = [0.0; 3];
        for i in 0..3 {
            world[i] = self.origin[i] + index[i] * self.spacing[i];
        }
        world
    }

    /// 判断一个时间点是否落在体数据的有效时间范围内.
    ///
    /// 第 `i` 个时间步覆盖半开时间区间 `[i, i + 1)`.
    #[inline]
    pub fn is_valid_time_point(&self, time_point: f64) -> bool {
        self.time_point_to_time_step(time_point).is_some()
    }

    /// 将时间点换算为时间步. 时间点无效时返回 `None`.
    pub fn time_point_to_time_step(&self, time_point: f64) -> Option<usize> {
        // 负数、NaN 与无穷都换算失败.
        let step = time_point.floor().to_usize()?;
        (step < self.num_time_steps).then_some(step)
    }

    /// 校验时间步编号. 合法时原样返回.
    #[inline]
    pub fn check_time_step(&self, time_step: usize) -> Result<usize, GeometryError> {
        if time_step < self.num_time_steps {
            Ok(time_step)
        } else {
            Err(GeometryError::InvalidTimePoint(time_step as f64))
        }
    }

    /// 校验 `axis` 方向的切片索引. 合法时原样返回.
    #[inline]
    pub fn check_slice_index(&self, axis: SliceAxis, index: usize) -> Result<usize, GeometryError> {
        let n = self.num_slices(axis);
        if index < n {
            Ok(index)
        } else {
            Err(GeometryError::SliceIndexOutOfRange(index, n))
        }
    }
}

/// 切片参考平面: 切片方向加上平面原点的世界坐标.
///
/// 平面对象本身不持有几何信息; 并行插值的每个 worker
/// 克隆一份共享平面, 再按自己负责的切片索引重新推算原点.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferencePlane {
    axis: SliceAxis,
    origin: [f64; 3],
}

impl ReferencePlane {
    /// 构造 `geo` 中 `axis` 方向第 `index` 张切片的参考平面.
    ///
    /// 当 `index` 越界时返回 `Err`.
    pub fn for_slice(
        geo: &VolumeGeometry,
        axis: SliceAxis,
        index: usize,
    ) -> Result<Self, GeometryError> {
        geo.check_slice_index(axis, index)?;
        let plane = Self {
            axis,
            origin: geo.index_to_world([0.0; 3]),
        };
        Ok(plane.with_slice_index(geo, index))
    }

    /// 获取切片方向.
    #[inline]
    pub fn axis(&self) -> SliceAxis {
        self.axis
    }

    /// 获取平面原点的世界坐标.
    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// 返回一个新平面: 原点沿切片方向移动到第 `index` 张切片处.
    ///
    /// 推算顺序为 世界 -> 索引 -> 替换分量 -> 世界,
    /// 与外层应用对平面原点的处理一致.
    pub fn with_slice_index(&self, geo: &VolumeGeometry, index: usize) -> Self {
        let mut idx = geo.world_to_index(self.origin);
        idx[self.axis.index()] = index as f64;
        Self {
            axis: self.axis,
            origin: geo.index_to_world(idx),
        }
    }

    /// 反推平面当前对应的切片索引.
    pub fn slice_index(&self, geo: &VolumeGeometry) -> usize {
        let idx = geo.world_to_index(self.origin);
        idx[self.axis.index()].round().max(0.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::{GeometryError, ReferencePlane, SliceAxis, VolumeGeometry};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// 测试世界坐标与索引坐标的互逆性.
    #[test]
    fn test_world_index_round_trip() {
        let geo = VolumeGeometry::new((10, 20, 30), [2.0, 0.5, 0.5], [-4.0, 1.0, 3.5], 1);
        let idx = [3.0, 17.0, 29.0];
        let world = geo.index_to_world(idx);
        let back = geo.world_to_index(world);
        for i in 0..3 {
            assert!(f64_eq(idx[i], back[i]));
        }
    }

    /// 测试时间点 / 时间步的换算与合法性判定.
    #[test]
    fn test_time_geometry() {
        let geo = VolumeGeometry::new((2, 2, 2), [1.0; 3], [0.0; 3], 3);
        assert!(geo.is_valid_time_point(0.0));
        assert!(geo.is_valid_time_point(2.999));
        assert!(!geo.is_valid_time_point(3.0));
        assert!(!geo.is_valid_time_point(-0.5));
        assert!(!geo.is_valid_time_point(f64::NAN));

        assert_eq!(geo.time_point_to_time_step(1.25), Some(1));
        assert_eq!(geo.time_point_to_time_step(7.0), None);

        assert_eq!(geo.check_time_step(2), Ok(2));
        assert!(geo.check_time_step(3).is_err());
    }

    /// 测试参考平面的原点推算与切片索引反推.
    #[test]
    fn test_reference_plane_slide() {
        let geo = VolumeGeometry::new((10, 20, 30), [2.0, 1.0, 1.0], [5.0, 0.0, 0.0], 1);
        let plane = ReferencePlane::for_slice(&geo, SliceAxis::Axial, 0).unwrap();
        assert_eq!(plane.slice_index(&geo), 0);

        let moved = plane.with_slice_index(&geo, 7);
        assert_eq!(moved.slice_index(&geo), 7);
        // z 分量移动 7 个切片 * 2.0 mm.
        assert!(f64_eq(moved.origin()[0], 5.0 + 14.0));
        // 其余分量不变.
        assert!(f64_eq(moved.origin()[1], plane.origin()[1]));
        assert!(f64_eq(moved.origin()[2], plane.origin()[2]));

        assert_eq!(
            ReferencePlane::for_slice(&geo, SliceAxis::Axial, 10).unwrap_err(),
            GeometryError::SliceIndexOutOfRange(10, 10)
        );
    }
}
