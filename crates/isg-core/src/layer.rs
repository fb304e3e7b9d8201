//! 图层管理
//!
//! 图层按角色划分实体：解、规则库、边界，以及合并后被隐藏的形状。

use crate::entity::EntityId;
use serde::{Deserialize, Serialize};

/// 图层定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    /// 图层ID
    pub id: EntityId,

    /// 图层名称
    pub name: String,
}

impl Layer {
    /// 创建新图层
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
        }
    }

    /// 默认图层（0层）
    pub fn default_layer() -> Self {
        Self {
            id: EntityId::from_raw(1, 0), // 固定ID
            name: "0".to_string(),
        }
    }
}

/// 图层管理器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerManager {
    /// 所有图层
    layers: Vec<Layer>,
}

impl LayerManager {
    /// 创建新的图层管理器
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::default_layer()],
        }
    }

    /// 添加新图层
    pub fn add_layer(&mut self, layer: Layer) -> Result<EntityId, LayerError> {
        if self.layers.iter().any(|l| l.name == layer.name) {
            return Err(LayerError::LayerAlreadyExists(layer.name));
        }
        let id = layer.id;
        self.layers.push(layer);
        Ok(id)
    }

    /// 获取图层；不存在时创建
    pub fn ensure_layer(&mut self, name: &str) -> EntityId {
        if let Some(layer) = self.get_layer(name) {
            return layer.id;
        }
        let layer = Layer::new(name);
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    /// 获取图层（按名称）
    pub fn get_layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// 获取图层（按ID）
    pub fn get_layer_by_id(&self, id: EntityId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// 获取所有图层
    pub fn all_layers(&self) -> &[Layer] {
        &self.layers
    }
}

impl Default for LayerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 图层操作错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum LayerError {
    #[error("Layer already exists: {0}")]
    LayerAlreadyExists(String),
}
