//! 数学基础类型
//!
//! 基于 nalgebra 提供的向量和点类型的别名，以及坐标量化工具。

use nalgebra as na;
use serde::{Deserialize, Serialize};

/// 2D点类型
pub type Point2 = na::Point2<f64>;

/// 2D向量类型
pub type Vector2 = na::Vector2<f64>;

/// 2D齐次变换矩阵
pub type Matrix3 = na::Matrix3<f64>;

/// 数值容差，用于几何比较
pub const EPSILON: f64 = 1e-10;

/// 坐标量化步长
///
/// 缓存的世界坐标都会吸附到该网格上，之后的形状比较使用精确相等。
pub const COORD_QUANTUM: f64 = 1e-9;

/// 判断两个浮点数是否近似相等
#[inline]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// 将数值吸附到量化网格
#[inline]
pub fn snap(value: f64) -> f64 {
    let snapped = (value / COORD_QUANTUM).round() * COORD_QUANTUM;
    // 消除 -0.0，保证按位比较稳定
    if snapped == 0.0 {
        0.0
    } else {
        snapped
    }
}

/// 将点吸附到量化网格
#[inline]
pub fn snap_point(point: &Point2) -> Point2 {
    Point2::new(snap(point.x), snap(point.y))
}

/// 二维叉积（z 分量）
#[inline]
pub fn cross(a: &Vector2, b: &Vector2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// 2D包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2 {
    pub min: Point2,
    pub max: Point2,
}

impl BoundingBox2 {
    /// 创建空的包围盒（无效状态）
    pub fn empty() -> Self {
        Self {
            min: Point2::new(f64::MAX, f64::MAX),
            max: Point2::new(f64::MIN, f64::MIN),
        }
    }

    /// 从点集创建包围盒
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.expand_to_include(p);
        }
        bbox
    }

    /// 扩展包围盒以包含指定点
    pub fn expand_to_include(&mut self, point: &Point2) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    /// 获取中心点
    pub fn center(&self) -> Point2 {
        Point2::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox2::from_points(&[
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 5.0),
            Point2::new(-5.0, 8.0),
        ]);

        assert!(approx_eq(bbox.min.x, -5.0));
        assert!(approx_eq(bbox.max.y, 8.0));
        assert!(approx_eq(bbox.center().x, 2.5));
        assert!(approx_eq(bbox.width(), 15.0));
        assert!(approx_eq(bbox.height(), 8.0));
    }

    #[test]
    fn test_snap_is_stable() {
        let a = 0.1 + 0.2;
        let b = 0.3;
        assert_ne!(a, b);
        assert_eq!(snap(a), snap(b));
        assert_eq!(snap(-1e-12).to_bits(), 0.0f64.to_bits());
    }
}
