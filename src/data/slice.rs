//! 二维标签切片视图、其拥有所有权 / 压缩 / 镜像形态.

use crate::consts::label::*;
use crate::Idx2d;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::iter::{Iter, IterMut};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Ix2};
use std::borrow::Cow;
use std::io::{Read, Write};
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 不可变、借用的二维标签切片.
pub struct LabelSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::LabelVolume`] 或独立缓冲.
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, u8>,
}

impl Index<Idx2d> for LabelSlice<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维标签切片.
pub struct LabelSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::LabelVolume`] 或独立缓冲.
    ///
    /// 这里有意把代码写死为 `ArrayViewMut` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayViewMut2<'a, u8>,
}

/// 可变方法集合.
impl<'a> LabelSliceMut<'a> {
    /// 获得 **底层** 数据的一份可变 shallow copy.
    #[inline]
    pub fn array_view_mut(&mut self) -> ArrayViewMut2<u8> {
        self.data.view_mut()
    }

    /// 获取可以迭代并修改图像像素的迭代器.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, u8, Ix2> {
        self.data.iter_mut()
    }

    /// 获取给定位置 (高, 宽) 的像素值, 并可就地修改. 越界时返回 `None`.
    #[inline]
    pub fn get_mut(&mut self, pos: Idx2d) -> Option<&mut u8> {
        self.data.get_mut(pos)
    }

    /// 用 `mirror` 覆写原本 `self` 的内容.
    ///
    /// 如果 `mirror` 大小与 `self.size()` 不符, 则程序 panic.
    pub fn resume(&mut self, mirror: &LabelMirror) {
        assert_eq!(self.size(), mirror.0.len(), "镜像大小不符");
        for (r, w) in mirror.0.iter().zip(self.iter_mut()) {
            *w = *r;
        }
    }

    /// 用 `src` 的内容整体覆写 `self`.
    ///
    /// 如果两者形状不符, 则程序 panic.
    pub fn overwrite(&mut self, src: &LabelSlice) {
        assert_eq!(self.shape(), src.shape(), "切片形状不符");
        self.data.assign(&src.array_view());
    }

    /// 将切片中值为 `old` 的像素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn replace(&mut self, old: u8, new: u8) -> usize {
        let mut cnt = 0usize;
        self.data
            .iter_mut()
            .filter(|pix| **pix == old)
            .for_each(|p| {
                cnt += 1;
                *p = new;
            });
        cnt
    }

    /// 将 `it` 给出的所有位置填充为 `value`.
    ///
    /// 如果存在越界索引, 则程序 panic.
    pub fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, value: u8) {
        for pos in it.into_iter() {
            self.data[pos] = value;
        }
    }

    /// 以 `src` 为模板做标签转移: `src` 中所有非背景位置
    /// 在 `self` 的对应位置被写为 `value`, 其余位置保持不变.
    ///
    /// 这是画笔缓冲提交到工作切片的路径. 返回被写入的像素个数.
    ///
    /// 如果两者形状不符, 则程序 panic.
    pub fn transfer_foreground(&mut self, src: &LabelSlice, value: u8) -> usize {
        assert_eq!(self.shape(), src.shape(), "切片形状不符");
        let mut cnt = 0usize;
        for (w, r) in self.data.iter_mut().zip(src.iter()) {
            if is_foreground(*r) {
                *w = value;
                cnt += 1;
            }
        }
        cnt
    }
}

impl Index<Idx2d> for LabelSliceMut<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for LabelSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// label 不可变方法集合.
macro_rules! impl_label_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<u8> {
                self.data.view()
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, u8, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&u8> {
                self.data.get(pos)
            }

            /// 该图是否为全背景图?
            #[inline]
            pub fn is_background(&self) -> bool {
                self.data.iter().copied().all(is_background)
            }

            /// 该图是否含有任意前景标签?
            #[inline]
            pub fn has_foreground(&self) -> bool {
                !self.is_background()
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 统计图像中值为 `label` 的像素总个数.
            #[inline]
            pub fn count(&self, label: u8) -> usize {
                self.data.iter().filter(|&p| *p == label).count()
            }

            /// 收集图像中出现过的所有非背景标签值, 升序去重.
            pub fn foreground_labels(&self) -> Vec<u8> {
                let mut seen = [false; 256];
                for p in self.iter().copied().filter(|p| is_foreground(*p)) {
                    seen[p as usize] = true;
                }
                (0u16..=255)
                    .filter(|v| seen[*v as usize])
                    .map(|v| v as u8)
                    .collect()
            }

            /// 将图像转化为行优先的序列化存储.
            pub fn as_row_major_vec(&self) -> Vec<u8> {
                let mut buf = Vec::with_capacity(self.size());
                buf.extend(self.iter());
                buf
            }

            /// 获得行优先存储的序列化数据.
            /// 当原始数据本身就是行优先格式时, 可以避免一次 deepcopy.
            pub fn as_row_major_slice(&self) -> Cow<[u8]> {
                if self.data.is_standard_layout() {
                    Cow::Borrowed(self.data.as_slice().unwrap())
                } else {
                    Cow::Owned(self.as_row_major_vec())
                }
            }

            /// 获取拥有所有权的镜像, 供以后可能的恢复.
            #[inline]
            pub fn mirror(&self) -> LabelMirror {
                self.into()
            }

            /// 克隆自己, 获得一个拥有所有权的切片对象.
            pub fn to_owned(&self) -> OwnedLabelSlice {
                OwnedLabelSlice {
                    data: self.data.to_owned(),
                }
            }

            /// 获得图像的高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得图像的宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &u8)> {
                self.data.indexed_iter()
            }
        }
    };
}
impl_label_slice_immut!('a, LabelSlice<'a>, ArrayView2<'a, u8>);
impl_label_slice_immut!('a, LabelSliceMut<'a>, ArrayViewMut2<'a, u8>);

/// 拥有所有权的二维标签切片.
///
/// 绘制缓冲、插值结果与 diff 卷条目均以该形态流转.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedLabelSlice {
    data: Array2<u8>,
}

impl OwnedLabelSlice {
    /// 创建一个全背景切片.
    #[inline]
    pub fn zeros(shape: Idx2d) -> Self {
        Self {
            data: Array2::from_elem(shape, BACKGROUND),
        }
    }

    /// 由底层数组直接创建.
    #[inline]
    pub fn from_raw(data: Array2<u8>) -> Self {
        Self { data }
    }

    /// 获得不可变切片引用.
    #[inline]
    pub fn as_immut(&self) -> LabelSlice<'_> {
        LabelSlice::new(self.data.view())
    }

    /// 获得可变切片引用.
    #[inline]
    pub fn as_mutable(&mut self) -> LabelSliceMut<'_> {
        LabelSliceMut::new(self.data.view_mut())
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<u8> {
        self.data
    }

    /// 将全部像素重置为背景.
    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(BACKGROUND);
    }

    /// 压缩数据.
    pub fn compress(&self) -> CompactLabelSlice {
        let data = self.as_immut();
        let buf = data.as_row_major_slice();
        let mut e = ZlibEncoder::new(Vec::with_capacity(8), Compression::best());
        e.write_all(buf.as_ref()).expect("Compression error");
        let sh = data.shape();
        CompactLabelSlice {
            buf: e.finish().expect("Compression error"),
            sh,
        }
    }
}

/// 压缩存储的 `OwnedLabelSlice`; 不透明类型.
///
/// 撤销栈保留的操作记录以该形态持有前像与后像.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompactLabelSlice {
    /// 压缩的不透明字节流.
    buf: Vec<u8>,

    /// 形状.
    sh: Idx2d,
}

impl CompactLabelSlice {
    /// 解压缩数据.
    pub fn decompress(&self) -> OwnedLabelSlice {
        let (h, w) = self.sh;
        let mut d = ZlibDecoder::new(self.buf.as_slice());
        let mut buf = Vec::with_capacity(h * w);
        d.read_to_end(&mut buf).expect("Decompression error");
        debug_assert_eq!(buf.len(), h * w);
        let data = Array2::<u8>::from_shape_vec((h, w), buf).unwrap();
        OwnedLabelSlice { data }
    }

    /// 获取原始切片形状.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.sh
    }
}

/// 一个拥有所有权的标签切片的不透明镜像.
/// 用于临时保存一个切片的值, 并在随后恢复.
///
/// 注意该结构是被设计来 **快速** 回填原数据的,
/// 因此并不压缩原数据.
#[derive(Clone, Debug)]
pub struct LabelMirror(pub(crate) Vec<u8>);

impl From<&LabelSlice<'_>> for LabelMirror {
    fn from(value: &LabelSlice<'_>) -> Self {
        Self(value.iter().copied().collect())
    }
}

impl From<&LabelSliceMut<'_>> for LabelMirror {
    fn from(value: &LabelSliceMut<'_>) -> Self {
        Self(value.iter().copied().collect())
    }
}
