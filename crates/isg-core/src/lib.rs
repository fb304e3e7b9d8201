//! ISG 几何基础
//!
//! 为迭代形状文法（Iterative Shape Grammars）提供平面几何基础设施。
//!
//! # 架构设计
//!
//! 场景中的每个对象都是某个多边形定义的放置实例：
//! - `Definition`: 多边形模板（面、基点）
//! - `Entity`: 放置实例（定义名、变换、图层、属性字典）
//! - `Layer`: 按角色划分实体（解、规则库、边界）
//!
//! # 示例
//!
//! ```rust
//! use isg_core::prelude::*;
//!
//! let square = Definition::rectangle("Square", 1.0, 1.0);
//! let t = Transform2D::translation(10.0, 5.0);
//! let points: Vec<Point2> = square.vertices().iter().map(|p| t.transform_point(p)).collect();
//!
//! assert_eq!(points.len(), 4);
//! ```

pub mod attributes;
pub mod definition;
pub mod entity;
pub mod layer;
pub mod math;
pub mod polygon;
pub mod properties;
pub mod transform;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::attributes::{AttributeDictionaries, AttributeValue};
    pub use crate::definition::{Definition, DefinitionTable, Face};
    pub use crate::entity::{Entity, EntityId};
    pub use crate::layer::{Layer, LayerManager};
    pub use crate::math::{BoundingBox2, Point2, Vector2};
    pub use crate::properties::Color;
    pub use crate::transform::Transform2D;
}
