//! 实体标识和管理
//!
//! 实体是某个多边形定义的放置实例。实体本身只保存放置信息，
//! 几何顶点来自它引用的定义。

use crate::attributes::AttributeDictionaries;
use crate::transform::Transform2D;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 全局实体ID生成器
static ENTITY_COUNTER: AtomicU64 = AtomicU64::new(2);

/// 实体唯一标识符（场景句柄，不跨会话稳定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    /// 唯一ID
    pub id: u64,
    /// 代数（从文件重新载入时保留）
    pub generation: u32,
}

impl EntityId {
    /// 创建新的实体ID
    pub fn new() -> Self {
        Self {
            id: ENTITY_COUNTER.fetch_add(1, Ordering::Relaxed),
            generation: 0,
        }
    }

    /// 从指定值创建（用于文件加载）
    ///
    /// 同时推进全局计数器，避免之后新建的ID与载入的ID冲突。
    pub fn from_raw(id: u64, generation: u32) -> Self {
        ENTITY_COUNTER.fetch_max(id + 1, Ordering::Relaxed);
        Self { id, generation }
    }

    /// 空ID（无效）
    pub const NULL: EntityId = EntityId {
        id: 0,
        generation: 0,
    };
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// 放置实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// 唯一标识符
    pub id: EntityId,

    /// 引用的定义名称
    pub definition: String,

    /// 放置变换（定义坐标 -> 世界坐标）
    pub transform: Transform2D,

    /// 所属图层ID
    pub layer_id: EntityId,

    /// 是否可见
    pub visible: bool,

    /// 属性字典
    pub attributes: AttributeDictionaries,
}

impl Entity {
    /// 创建新实体
    pub fn new(definition: impl Into<String>, transform: Transform2D) -> Self {
        Self {
            id: EntityId::new(),
            definition: definition.into(),
            transform,
            layer_id: EntityId::NULL,
            visible: true,
            attributes: AttributeDictionaries::new(),
        }
    }

    /// 使用指定的图层
    pub fn with_layer(mut self, layer_id: EntityId) -> Self {
        self.layer_id = layer_id;
        self
    }

    /// 复制为新实体
    ///
    /// 与宿主的复制行为一致：属性字典随之复制，ID 重新分配。
    pub fn duplicate(&self) -> Self {
        Self {
            id: EntityId::new(),
            ..self.clone()
        }
    }

    /// 在现有变换之前叠加一个世界空间变换
    pub fn transform_by(&mut self, t: &Transform2D) {
        self.transform = t.then(&self.transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert_ne!(a, EntityId::NULL);
    }

    #[test]
    fn test_from_raw_advances_counter() {
        let loaded = EntityId::from_raw(1_000_000, 0);
        let fresh = EntityId::new();
        assert!(fresh.id > loaded.id);
    }

    #[test]
    fn test_duplicate_keeps_attributes() {
        let mut e = Entity::new("Square", Transform2D::translation(1.0, 2.0));
        e.attributes.set("IterativeSG", "UID", "u1");

        let copy = e.duplicate();
        assert_ne!(copy.id, e.id);
        assert_eq!(copy.attributes.get_str("IterativeSG", "UID"), Some("u1"));
        assert_eq!(copy.transform, e.transform);
    }
}
