//! 面与边的材质
//!
//! 宿主模型只需要颜色来区分合并生成的形状，这里不涉及渲染。

use serde::{Deserialize, Serialize};

/// RGBA颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// 从十六进制值创建（如 0xFF0000 表示红色）
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
            a: 255,
        }
    }

    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0);
    /// 合并形状默认的面颜色
    pub const MERGED_FACE: Color = Color::from_hex(0xD8C3A5);
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}
