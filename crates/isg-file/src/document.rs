//! 场景文档数据模型
//!
//! `Document` 扮演宿主模型的角色：保存放置实例、定义、图层和属性字典，
//! 规则引擎的所有场景修改都经由这里完成。

use crate::error::FileError;
use chrono::{DateTime, Utc};
use isg_core::attributes::{AttributeDictionaries, AttributeDictionary, AttributeValue};
use isg_core::definition::{Definition, DefinitionTable};
use isg_core::entity::{Entity, EntityId};
use isg_core::layer::LayerManager;
use isg_core::math::{BoundingBox2, Point2};
use isg_core::transform::Transform2D;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 文档元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// 文档唯一标识
    pub id: Uuid,

    /// 文档标题
    pub title: String,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 最后修改时间
    pub modified_at: DateTime<Utc>,

    /// 文件格式版本
    pub format_version: u32,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: "Untitled".to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            format_version: 1,
        }
    }
}

/// 场景文档
#[derive(Debug)]
pub struct Document {
    /// 元数据
    pub metadata: DocumentMetadata,

    /// 所有实体
    entities: HashMap<EntityId, Entity>,

    /// 定义表
    pub definitions: DefinitionTable,

    /// 图层管理器
    pub layers: LayerManager,

    /// 模型级属性字典
    attributes: AttributeDictionaries,

    /// 文件路径（如果已保存）
    file_path: Option<std::path::PathBuf>,
}

impl Document {
    /// 创建新文档
    pub fn new() -> Self {
        Self {
            metadata: DocumentMetadata::default(),
            entities: HashMap::new(),
            definitions: DefinitionTable::new(),
            layers: LayerManager::new(),
            attributes: AttributeDictionaries::new(),
            file_path: None,
        }
    }

    /// 从文件加载
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, FileError> {
        let path = path.as_ref();

        match path.extension().and_then(|e| e.to_str()) {
            Some("isg") => {
                let mut document = crate::native::load(path)?;
                document.file_path = Some(path.to_path_buf());
                Ok(document)
            }
            _ => Err(FileError::InvalidFormat(
                "Unknown file extension".to_string(),
            )),
        }
    }

    /// 保存文件
    pub fn save(&mut self) -> Result<(), FileError> {
        if let Some(path) = &self.file_path.clone() {
            self.save_as(path)
        } else {
            Err(FileError::InvalidFormat("No file path set".to_string()))
        }
    }

    /// 另存为
    pub fn save_as(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), FileError> {
        let path = path.as_ref();

        match path.extension().and_then(|e| e.to_str()) {
            Some("isg") => crate::native::save(self, path)?,
            _ => {
                return Err(FileError::InvalidFormat(
                    "Unknown file extension".to_string(),
                ))
            }
        }

        self.file_path = Some(path.to_path_buf());
        self.metadata.modified_at = Utc::now();

        Ok(())
    }

    // ---------------------------------------------------------------------
    // 定义与图层
    // ---------------------------------------------------------------------

    /// 添加定义
    pub fn add_definition(&mut self, definition: Definition) -> Result<(), FileError> {
        let name = definition.name.clone();
        if !self.definitions.add(definition) {
            return Err(FileError::DefinitionAlreadyExists(name));
        }
        Ok(())
    }

    /// 获取定义
    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    /// 实体引用的定义
    pub fn definition_of(&self, id: &EntityId) -> Result<&Definition, FileError> {
        let entity = self.entity(id)?;
        self.definitions
            .get(&entity.definition)
            .ok_or_else(|| FileError::DefinitionNotFound(entity.definition.clone()))
    }

    /// 获取图层ID；不存在时创建
    pub fn ensure_layer(&mut self, name: &str) -> EntityId {
        self.layers.ensure_layer(name)
    }

    // ---------------------------------------------------------------------
    // 实体
    // ---------------------------------------------------------------------

    /// 放置定义的一个实例
    pub fn place_instance(
        &mut self,
        definition: &str,
        transform: Transform2D,
        layer: &str,
    ) -> Result<EntityId, FileError> {
        if !self.definitions.contains(definition) {
            return Err(FileError::DefinitionNotFound(definition.to_string()));
        }
        let layer_id = self.ensure_layer(layer);
        let entity = Entity::new(definition, transform).with_layer(layer_id);
        Ok(self.add_entity(entity))
    }

    /// 添加实体
    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let id = entity.id;
        self.entities.insert(id, entity);
        id
    }

    /// 复制实体（属性字典一并复制）
    pub fn copy_entity(&mut self, id: &EntityId) -> Result<EntityId, FileError> {
        let copy = self.entity(id)?.duplicate();
        Ok(self.add_entity(copy))
    }

    /// 删除实体
    pub fn remove_entity(&mut self, id: &EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    /// 获取实体
    pub fn get_entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// 获取实体，不存在时返回错误
    pub fn entity(&self, id: &EntityId) -> Result<&Entity, FileError> {
        self.entities.get(id).ok_or(FileError::EntityNotFound(*id))
    }

    /// 获取可变实体
    pub fn entity_mut(&mut self, id: &EntityId) -> Result<&mut Entity, FileError> {
        self.entities
            .get_mut(id)
            .ok_or(FileError::EntityNotFound(*id))
    }

    /// 实体是否存在
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// 设置实体的放置变换
    pub fn set_transform(&mut self, id: &EntityId, transform: Transform2D) -> Result<(), FileError> {
        self.entity_mut(id)?.transform = transform;
        Ok(())
    }

    /// 在世界空间中对实体施加变换
    pub fn transform_entity(&mut self, id: &EntityId, t: &Transform2D) -> Result<(), FileError> {
        self.entity_mut(id)?.transform_by(t);
        Ok(())
    }

    /// 移动实体到指定图层（图层不存在时创建）
    pub fn set_layer(&mut self, id: &EntityId, layer: &str) -> Result<(), FileError> {
        let layer_id = self.ensure_layer(layer);
        self.entity_mut(id)?.layer_id = layer_id;
        Ok(())
    }

    /// 设置实体可见性
    pub fn set_visible(&mut self, id: &EntityId, visible: bool) -> Result<(), FileError> {
        self.entity_mut(id)?.visible = visible;
        Ok(())
    }

    /// 实体所在图层名称
    pub fn layer_name(&self, id: &EntityId) -> Option<&str> {
        let entity = self.entities.get(id)?;
        self.layers
            .get_layer_by_id(entity.layer_id)
            .map(|l| l.name.as_str())
    }

    /// 指定图层上的实体，按ID排序
    pub fn entities_on_layer(&self, layer: &str) -> Vec<EntityId> {
        let Some(layer_id) = self.layers.get_layer(layer).map(|l| l.id) else {
            return Vec::new();
        };
        let mut ids: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.layer_id == layer_id)
            .map(|e| e.id)
            .collect();
        ids.sort();
        ids
    }

    /// 所有实体ID，按ID排序
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort();
        ids
    }

    /// 获取所有实体
    pub fn all_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// 获取实体数量
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ---------------------------------------------------------------------
    // 世界坐标几何
    // ---------------------------------------------------------------------

    /// 实体所有顶点的世界坐标（去重）
    pub fn world_points(&self, id: &EntityId) -> Result<Vec<Point2>, FileError> {
        let entity = self.entity(id)?;
        let definition = self.definition_of(id)?;
        Ok(definition
            .vertices()
            .iter()
            .map(|p| entity.transform.transform_point(p))
            .collect())
    }

    /// 实体每个面的世界坐标外环
    pub fn world_faces(&self, id: &EntityId) -> Result<Vec<Vec<Point2>>, FileError> {
        let entity = self.entity(id)?;
        let definition = self.definition_of(id)?;
        Ok(definition
            .faces
            .iter()
            .map(|face| {
                face.outer_loop
                    .iter()
                    .map(|p| entity.transform.transform_point(p))
                    .collect()
            })
            .collect())
    }

    /// 实体的世界包围盒
    pub fn world_bounds(&self, id: &EntityId) -> Result<BoundingBox2, FileError> {
        Ok(BoundingBox2::from_points(&self.world_points(id)?))
    }

    // ---------------------------------------------------------------------
    // 属性字典
    // ---------------------------------------------------------------------

    /// 读取实体属性
    pub fn entity_attribute(&self, id: &EntityId, dictionary: &str, key: &str) -> Option<&AttributeValue> {
        self.entities.get(id)?.attributes.get(dictionary, key)
    }

    /// 写入实体属性
    pub fn set_entity_attribute(
        &mut self,
        id: &EntityId,
        dictionary: &str,
        key: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<(), FileError> {
        self.entity_mut(id)?.attributes.set(dictionary, key, value);
        Ok(())
    }

    /// 读取模型属性
    pub fn attribute(&self, dictionary: &str, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(dictionary, key)
    }

    /// 写入模型属性
    pub fn set_attribute(&mut self, dictionary: &str, key: &str, value: impl Into<AttributeValue>) {
        self.attributes.set(dictionary, key, value);
    }

    /// 删除模型属性
    pub fn delete_attribute(&mut self, dictionary: &str, key: &str) -> Option<AttributeValue> {
        self.attributes.delete(dictionary, key)
    }

    /// 获取模型属性字典
    pub fn attribute_dictionary(&self, dictionary: &str) -> Option<&AttributeDictionary> {
        self.attributes.dictionary(dictionary)
    }

    /// 删除模型属性字典
    pub fn delete_attribute_dictionary(&mut self, dictionary: &str) {
        self.attributes.delete_dictionary(dictionary);
    }

    /// 所有模型属性（用于文件保存）
    pub fn model_attributes(&self) -> &AttributeDictionaries {
        &self.attributes
    }

    /// 获取实体的可变HashMap引用（用于文件加载）
    pub(crate) fn entities_mut(&mut self) -> &mut HashMap<EntityId, Entity> {
        &mut self.entities
    }

    /// 模型属性的可变引用（用于文件加载）
    pub(crate) fn model_attributes_mut(&mut self) -> &mut AttributeDictionaries {
        &mut self.attributes
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isg_core::math::approx_eq;

    #[test]
    fn test_place_and_query_world_points() {
        let mut doc = Document::new();
        doc.add_definition(Definition::rectangle("Square", 1.0, 1.0)).unwrap();

        let id = doc
            .place_instance("Square", Transform2D::translation(2.0, 3.0), "SG Solution Layer")
            .unwrap();

        let bounds = doc.world_bounds(&id).unwrap();
        assert!(approx_eq(bounds.min.x, 2.0));
        assert!(approx_eq(bounds.max.y, 4.0));
        assert_eq!(doc.world_points(&id).unwrap().len(), 4);
        assert_eq!(doc.layer_name(&id), Some("SG Solution Layer"));
        assert_eq!(doc.entities_on_layer("SG Solution Layer"), vec![id]);
    }

    #[test]
    fn test_place_unknown_definition_fails() {
        let mut doc = Document::new();
        let result = doc.place_instance("Missing", Transform2D::identity(), "0");
        assert!(matches!(result, Err(FileError::DefinitionNotFound(_))));
    }

    #[test]
    fn test_copy_keeps_attributes_and_transform() {
        let mut doc = Document::new();
        doc.add_definition(Definition::rectangle("Square", 1.0, 1.0)).unwrap();
        let id = doc
            .place_instance("Square", Transform2D::translation(1.0, 0.0), "0")
            .unwrap();
        doc.set_entity_attribute(&id, "IterativeSG", "UID", "abc").unwrap();

        let copy = doc.copy_entity(&id).unwrap();
        assert_ne!(copy, id);
        assert_eq!(
            doc.entity_attribute(&copy, "IterativeSG", "UID").and_then(|v| v.as_str()),
            Some("abc")
        );
        assert_eq!(doc.world_points(&copy).unwrap(), doc.world_points(&id).unwrap());
        assert_eq!(doc.entity_count(), 2);
    }

    #[test]
    fn test_model_attributes() {
        let mut doc = Document::new();
        doc.set_attribute("IterativeSG Rules", "Rule 1", serde_json::json!({"kind": "merge"}));
        assert!(doc.attribute("IterativeSG Rules", "Rule 1").is_some());

        doc.delete_attribute("IterativeSG Rules", "Rule 1");
        assert!(doc.attribute_dictionary("IterativeSG Rules").is_none());
    }
}
