//! 基于符号距离场的形状插值.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use itertools::izip;
use ndarray::Array2;
use ordered_float::NotNan;

use super::distance::signed_distance;
use super::{InterpResult, InterpolationRequest, SliceInterpolator};
use crate::consts::label::BACKGROUND;
use crate::data::{LabelVolume, OwnedLabelSlice};
use crate::geometry::SliceAxis;

/// 距离场缓存键: (时间步, 方向, 切片索引, 标签).
type FieldKey = (usize, SliceAxis, usize, u8);

/// 符号距离场形状插值.
///
/// 目标切片的标签由上下最近两张已标注切片估计:
/// 对每个标签分别计算两侧的符号距离场, 按目标切片的相对位置
/// 线性混合; 像素归属于混合值最负的标签, 所有标签的混合值
/// 均非负时归属背景. 多标签切片因此天然得到 "最近标签所有权" 划分.
///
/// 已标注参考切片的距离场会被缓存; 同一张参考切片通常服务于
/// 两侧的多张目标切片, 全卷插值时缓存收益明显.
/// 参考切片被改写后必须调用 [`SliceInterpolator::clear_cache`].
pub struct ShapeBasedInterpolation {
    fields: Mutex<HashMap<FieldKey, Arc<Array2<f64>>>>,
}

impl Default for ShapeBasedInterpolation {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeBasedInterpolation {
    /// 创建插值算法实例.
    pub fn new() -> Self {
        Self {
            fields: Mutex::new(HashMap::new()),
        }
    }

    /// 取出 (或计算并缓存) 一张参考切片中某个标签的距离场.
    ///
    /// 计算在锁外进行; 并发未命中时的重复计算是可接受的,
    /// 后写入者覆盖同值结果.
    fn field(&self, volume: &LabelVolume, key: FieldKey) -> Arc<Array2<f64>> {
        let (time_step, axis, index, label) = key;
        if let Some(hit) = self.fields.lock().expect("缓存锁中毒").get(&key) {
            return Arc::clone(hit);
        }
        let slice = volume.slice_at(axis, index, time_step);
        let computed = Arc::new(signed_distance(&slice, label));
        self.fields
            .lock()
            .expect("缓存锁中毒")
            .insert(key, Arc::clone(&computed));
        computed
    }
}

impl SliceInterpolator for ShapeBasedInterpolation {
    fn interpolate(
        &self,
        volume: &LabelVolume,
        request: &InterpolationRequest,
    ) -> InterpResult<Option<OwnedLabelSlice>> {
        let geo = volume.geometry();
        let &InterpolationRequest {
            axis,
            slice_index,
            time_step,
        } = request;
        geo.check_time_step(time_step)?;
        geo.check_slice_index(axis, slice_index)?;

        // 上下最近的已标注参考切片. 目标自身已标注时两者即目标.
        let labeled = volume.labeled_slices(axis, time_step);
        let lower = labeled.iter().copied().filter(|i| *i <= slice_index).max();
        let upper = labeled.iter().copied().filter(|i| *i >= slice_index).min();
        let (Some(lower), Some(upper)) = (lower, upper) else {
            return Ok(None);
        };
        if lower == upper {
            return Ok(Some(volume.slice_at(axis, lower, time_step).to_owned()));
        }

        let t = (slice_index - lower) as f64 / (upper - lower) as f64;

        // 两侧出现过的所有标签都参与归属竞争.
        let mut labels = volume.slice_at(axis, lower, time_step).foreground_labels();
        labels.extend(volume.slice_at(axis, upper, time_step).foreground_labels());
        labels.sort_unstable();
        labels.dedup();

        // 每个标签一张混合距离场.
        let shape = geo.slice_shape(axis);
        let blended: Vec<(u8, Array2<f64>)> = labels
            .into_iter()
            .map(|label| {
                let lo = self.field(volume, (time_step, axis, lower, label));
                let hi = self.field(volume, (time_step, axis, upper, label));
                let mut field = Array2::zeros(shape);
                for (b, l, h) in izip!(field.iter_mut(), lo.iter(), hi.iter()) {
                    *b = (1.0 - t) * l + t * h;
                }
                (label, field)
            })
            .collect();

        // 像素归属: 混合值最负的标签胜出, 全部非负时归属背景.
        let mut result = OwnedLabelSlice::zeros(shape);
        {
            let mut view = result.as_mutable();
            let mut raw = view.array_view_mut();
            for (pos, out) in raw.indexed_iter_mut() {
                let mut best: Option<(NotNan<f64>, u8)> = None;
                for (label, field) in &blended {
                    let v = NotNan::new(field[pos]).expect("距离场混合值不应为 NaN");
                    if v.into_inner() < 0.0 && best.map_or(true, |(b, _)| v < b) {
                        best = Some((v, *label));
                    }
                }
                *out = best.map_or(BACKGROUND, |(_, label)| label);
            }
        }
        Ok(Some(result))
    }

    fn clear_cache(&self) {
        self.fields.lock().expect("缓存锁中毒").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ShapeBasedInterpolation;
    use crate::interp::{InterpError, InterpolationRequest, SliceInterpolator};
    use crate::{LabelVolume, SliceAxis, VolumeGeometry};

    fn request(slice_index: usize) -> InterpolationRequest {
        InterpolationRequest {
            axis: SliceAxis::Axial,
            slice_index,
            time_step: 0,
        }
    }

    /// 在 `index` 切片上画一个以 (ch, cw) 为中心、半边长 r 的正方形.
    fn draw_square(vol: &mut LabelVolume, index: usize, (ch, cw): (usize, usize), r: usize, label: u8) {
        let mut sli = vol.slice_at_mut(SliceAxis::Axial, index, 0);
        for h in ch - r..=ch + r {
            for w in cw - r..=cw + r {
                sli[(h, w)] = label;
            }
        }
    }

    /// 测试上下参考切片一致时, 中间切片被精确复制.
    #[test]
    fn test_identity_between_equal_slices() {
        let mut vol = LabelVolume::zeros(VolumeGeometry::isotropic((7, 16, 16)));
        draw_square(&mut vol, 0, (8, 8), 3, 1);
        draw_square(&mut vol, 6, (8, 8), 3, 1);

        let algo = ShapeBasedInterpolation::new();
        let out = algo.interpolate(&vol, &request(3)).unwrap().unwrap();
        let expect = vol.slice_at(SliceAxis::Axial, 0, 0).to_owned();
        assert_eq!(out, expect);
    }

    /// 测试同心正方形之间的插值: 中间形状被夹在两端之间.
    #[test]
    fn test_nested_squares() {
        let mut vol = LabelVolume::zeros(VolumeGeometry::isotropic((9, 20, 20)));
        draw_square(&mut vol, 0, (10, 10), 2, 1);
        draw_square(&mut vol, 8, (10, 10), 6, 1);

        let algo = ShapeBasedInterpolation::new();
        let mid = algo.interpolate(&vol, &request(4)).unwrap().unwrap();

        let small = vol.slice_at(SliceAxis::Axial, 0, 0);
        let big = vol.slice_at(SliceAxis::Axial, 8, 0);

        // 小正方形内两侧距离场均为负, 必为前景;
        // 大正方形外两侧均为正, 必为背景.
        for (pos, &p) in small.indexed_iter() {
            if p == 1 {
                assert_eq!(mid.as_immut()[pos], 1, "{pos:?} 应在中间形状内");
            }
        }
        for (pos, &p) in big.indexed_iter() {
            if p == 0 {
                assert_eq!(mid.as_immut()[pos], 0, "{pos:?} 应在中间形状外");
            }
        }
        let mid_count = mid.as_immut().count(1);
        assert!(small.count(1) < mid_count && mid_count < big.count(1));
        assert_eq!(mid.as_immut()[(10, 10)], 1);
    }

    /// 测试多标签竞争: 各标签保住自己一侧的领地.
    #[test]
    fn test_two_label_ownership() {
        let mut vol = LabelVolume::zeros(VolumeGeometry::isotropic((5, 20, 20)));
        draw_square(&mut vol, 0, (9, 4), 2, 1);
        draw_square(&mut vol, 0, (9, 15), 2, 2);
        draw_square(&mut vol, 4, (9, 4), 2, 1);
        draw_square(&mut vol, 4, (9, 15), 2, 2);

        let algo = ShapeBasedInterpolation::new();
        let mid = algo.interpolate(&vol, &request(2)).unwrap().unwrap();
        assert_eq!(mid.as_immut()[(9, 4)], 1);
        assert_eq!(mid.as_immut()[(9, 15)], 2);
        assert_eq!(mid.as_immut().foreground_labels(), vec![1, 2]);
    }

    /// 测试参考切片不足时返回 `None`.
    #[test]
    fn test_missing_reference() {
        let mut vol = LabelVolume::zeros(VolumeGeometry::isotropic((6, 8, 8)));
        let algo = ShapeBasedInterpolation::new();

        // 全空卷: 双侧均缺.
        assert_eq!(algo.interpolate(&vol, &request(2)).unwrap(), None);

        // 只有下方参考: 上方缺.
        draw_square(&mut vol, 0, (4, 4), 1, 1);
        assert_eq!(algo.interpolate(&vol, &request(3)).unwrap(), None);
    }

    /// 测试目标切片自身已标注时被原样返回.
    #[test]
    fn test_target_already_labeled() {
        let mut vol = LabelVolume::zeros(VolumeGeometry::isotropic((6, 8, 8)));
        draw_square(&mut vol, 2, (4, 4), 1, 3);

        let algo = ShapeBasedInterpolation::new();
        let out = algo.interpolate(&vol, &request(2)).unwrap().unwrap();
        assert_eq!(out, vol.slice_at(SliceAxis::Axial, 2, 0).to_owned());
    }

    /// 测试距离场缓存命中与清空都不改变结果.
    #[test]
    fn test_cache_transparency() {
        let mut vol = LabelVolume::zeros(VolumeGeometry::isotropic((7, 16, 16)));
        draw_square(&mut vol, 0, (8, 8), 3, 1);
        draw_square(&mut vol, 6, (8, 8), 5, 1);

        let algo = ShapeBasedInterpolation::new();
        let first = algo.interpolate(&vol, &request(3)).unwrap().unwrap();
        // 第二次调用命中缓存.
        let second = algo.interpolate(&vol, &request(3)).unwrap().unwrap();
        assert_eq!(first, second);

        algo.clear_cache();
        let third = algo.interpolate(&vol, &request(3)).unwrap().unwrap();
        assert_eq!(first, third);
    }

    /// 测试非法请求被拒绝.
    #[test]
    fn test_invalid_request() {
        let vol = LabelVolume::zeros(VolumeGeometry::isotropic((4, 8, 8)));
        let algo = ShapeBasedInterpolation::new();

        let mut bad = request(2);
        bad.time_step = 5;
        assert_eq!(
            algo.interpolate(&vol, &bad).unwrap_err(),
            InterpError::InvalidTimePoint(5.0)
        );

        assert_eq!(
            algo.interpolate(&vol, &request(4)).unwrap_err(),
            InterpError::SliceIndexOutOfRange(4, 4)
        );
    }
}
