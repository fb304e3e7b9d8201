//! 2D变换操作
//!
//! 实例放置使用的仿射变换：平移、（非均匀）缩放与镜像。

use crate::math::{snap, Matrix3, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// 2D仿射变换
///
/// 相等比较是逐元素的精确比较，用于判断两个实例是否处于同一放置状态。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    matrix: Matrix3,
}

impl Transform2D {
    /// 创建单位变换
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// 创建平移变换
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            matrix: Matrix3::new(
                1.0, 0.0, dx,
                0.0, 1.0, dy,
                0.0, 0.0, 1.0,
            ),
        }
    }

    /// 按向量平移
    pub fn translation_by(v: &Vector2) -> Self {
        Self::translation(v.x, v.y)
    }

    /// 创建缩放变换（绕原点）
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            matrix: Matrix3::new(
                sx, 0.0, 0.0,
                0.0, sy, 0.0,
                0.0, 0.0, 1.0,
            ),
        }
    }

    /// 创建绕指定点的缩放变换
    ///
    /// `sx`/`sy` 取 -1 时即为绕该点的镜像。
    pub fn scale_around(center: Point2, sx: f64, sy: f64) -> Self {
        Self::translation(center.x, center.y)
            .then(&Self::scale(sx, sy))
            .then(&Self::translation(-center.x, -center.y))
    }

    /// 组合两个变换（self 在后，other 在前）
    pub fn then(&self, other: &Transform2D) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// 变换一个点
    pub fn transform_point(&self, point: &Point2) -> Point2 {
        let v = self.matrix * nalgebra::Vector3::new(point.x, point.y, 1.0);
        Point2::new(v.x, v.y)
    }

    /// 变换一个向量（不受平移影响）
    pub fn transform_vector(&self, vector: &Vector2) -> Vector2 {
        let v = self.matrix * nalgebra::Vector3::new(vector.x, vector.y, 0.0);
        Vector2::new(v.x, v.y)
    }

    /// 获取逆变换
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|m| Self { matrix: m })
    }

    /// 行主序的 2x3 仿射系数，已吸附到量化网格
    ///
    /// 作为实例的缓存变换参与形状比较。
    pub fn to_array(&self) -> [f64; 6] {
        [
            snap(self.matrix[(0, 0)]),
            snap(self.matrix[(0, 1)]),
            snap(self.matrix[(0, 2)]),
            snap(self.matrix[(1, 0)]),
            snap(self.matrix[(1, 1)]),
            snap(self.matrix[(1, 2)]),
        ]
    }

    /// 从 2x3 仿射系数恢复
    pub fn from_array(a: [f64; 6]) -> Self {
        Self {
            matrix: Matrix3::new(
                a[0], a[1], a[2],
                a[3], a[4], a[5],
                0.0, 0.0, 1.0,
            ),
        }
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}
