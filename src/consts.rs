//! 通用常量.

/// 单通道标签值.
pub mod label {
    /// 背景的像素值.
    pub const BACKGROUND: u8 = 0;

    /// 笔刷在绘制缓冲内部使用的填充值.
    /// 提交时会被转换为当前激活标签的实际值.
    pub const INTERNAL_FILL: u8 = 1;

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, BACKGROUND)
    }

    /// 像素是否是前景 (任意非背景标签)?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        !is_background(p)
    }
}

/// 浮点坐标比较容差. 指针取整位置的变化小于该值时视为未移动.
pub const EPS: f64 = 1e-5;
