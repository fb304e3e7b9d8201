//! ISG工作文件格式（.isg）
//!
//! 基于SQLite的单文件格式，保存：
//! - 文档元数据与格式版本
//! - 图层、定义、实体（含实体属性字典）
//! - 模型属性字典（规则记录等）

use crate::document::{Document, DocumentMetadata};
use crate::error::FileError;
use isg_core::attributes::AttributeDictionary;
use isg_core::definition::Definition;
use isg_core::entity::{Entity, EntityId};
use isg_core::layer::{Layer, LayerManager};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, warn};

/// 当前文件格式版本
const FORMAT_VERSION: u32 = 1;

/// 创建数据库架构
fn create_schema(conn: &Connection) -> Result<(), FileError> {
    conn.execute_batch(
        r#"
        -- 元数据表
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- 图层表
        CREATE TABLE IF NOT EXISTS layers (
            id INTEGER PRIMARY KEY,
            generation INTEGER NOT NULL,
            name TEXT NOT NULL UNIQUE,
            data TEXT NOT NULL
        );

        -- 定义表
        CREATE TABLE IF NOT EXISTS definitions (
            name TEXT PRIMARY KEY,
            data TEXT NOT NULL
        );

        -- 实体表
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY,
            generation INTEGER NOT NULL,
            layer_id INTEGER NOT NULL,
            definition TEXT NOT NULL,
            transform TEXT NOT NULL,
            attributes TEXT NOT NULL,
            visible INTEGER NOT NULL DEFAULT 1
        );

        -- 模型属性表
        CREATE TABLE IF NOT EXISTS model_attributes (
            dictionary TEXT PRIMARY KEY,
            data TEXT NOT NULL
        );

        -- 创建索引
        CREATE INDEX IF NOT EXISTS idx_entities_layer ON entities(layer_id);
        CREATE INDEX IF NOT EXISTS idx_entities_definition ON entities(definition);
        "#,
    )?;

    Ok(())
}

/// 保存文档到文件
pub fn save(document: &Document, path: &Path) -> Result<(), FileError> {
    let mut conn = Connection::open(path)?;

    create_schema(&conn)?;

    let tx = conn.transaction()?;

    save_metadata(&tx, &document.metadata)?;

    tx.execute("DELETE FROM layers", [])?;
    for layer in document.layers.all_layers() {
        save_layer(&tx, layer)?;
    }

    tx.execute("DELETE FROM definitions", [])?;
    for definition in document.definitions.iter() {
        save_definition(&tx, definition)?;
    }

    tx.execute("DELETE FROM entities", [])?;
    for entity in document.all_entities() {
        save_entity(&tx, entity)?;
    }

    tx.execute("DELETE FROM model_attributes", [])?;
    for (name, dictionary) in document.model_attributes().iter() {
        tx.execute(
            "INSERT INTO model_attributes (dictionary, data) VALUES (?, ?)",
            params![name, serde_json::to_string(dictionary)?],
        )?;
    }

    tx.commit()?;

    debug!(
        "Saved {} entities and {} definitions to {}",
        document.entity_count(),
        document.definitions.count(),
        path.display()
    );

    Ok(())
}

fn save_metadata(conn: &Connection, metadata: &DocumentMetadata) -> Result<(), FileError> {
    let json = serde_json::to_string(metadata)?;
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('document', ?)",
        params![json],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('format_version', ?)",
        params![FORMAT_VERSION.to_string()],
    )?;
    Ok(())
}

fn save_layer(conn: &Connection, layer: &Layer) -> Result<(), FileError> {
    let data = serde_json::to_string(layer)?;
    conn.execute(
        "INSERT INTO layers (id, generation, name, data) VALUES (?, ?, ?, ?)",
        params![layer.id.id as i64, layer.id.generation, &layer.name, &data],
    )?;
    Ok(())
}

fn save_definition(conn: &Connection, definition: &Definition) -> Result<(), FileError> {
    let data = serde_json::to_string(definition)?;
    conn.execute(
        "INSERT INTO definitions (name, data) VALUES (?, ?)",
        params![&definition.name, &data],
    )?;
    Ok(())
}

fn save_entity(conn: &Connection, entity: &Entity) -> Result<(), FileError> {
    let transform = serde_json::to_string(&entity.transform.to_array())?;
    let attributes = serde_json::to_string(&entity.attributes)?;

    conn.execute(
        "INSERT INTO entities (id, generation, layer_id, definition, transform, attributes, visible)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            entity.id.id as i64,
            entity.id.generation,
            entity.layer_id.id as i64,
            &entity.definition,
            &transform,
            &attributes,
            entity.visible as i32,
        ],
    )?;

    Ok(())
}

/// 从文件加载文档
pub fn load(path: &Path) -> Result<Document, FileError> {
    let conn = Connection::open(path)?;

    // 检查格式版本
    let version: String = conn.query_row(
        "SELECT value FROM metadata WHERE key = 'format_version'",
        [],
        |row| row.get(0),
    )?;

    let version: u32 = version
        .parse()
        .map_err(|_| FileError::InvalidFormat("Invalid version".to_string()))?;

    if version > FORMAT_VERSION {
        return Err(FileError::UnsupportedVersion(format!(
            "File version {} is newer than supported version {}",
            version, FORMAT_VERSION
        )));
    }

    let mut document = Document::new();

    let metadata_json: String = conn.query_row(
        "SELECT value FROM metadata WHERE key = 'document'",
        [],
        |row| row.get(0),
    )?;
    document.metadata = serde_json::from_str(&metadata_json)?;

    // 加载图层
    let mut stmt = conn.prepare("SELECT id, generation, data FROM layers ORDER BY id")?;
    let layers: Vec<Layer> = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let generation: u32 = row.get(1)?;
            let data: String = row.get(2)?;
            Ok((id, generation, data))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(id, generation, data)| -> Result<Layer, FileError> {
            let mut layer: Layer = serde_json::from_str(&data)?;
            layer.id = EntityId::from_raw(id as u64, generation);
            Ok(layer)
        })
        .collect::<Result<Vec<_>, _>>()?;

    document.layers = LayerManager::new();
    for layer in layers.into_iter().filter(|l| l.name != "0") {
        if let Err(e) = document.layers.add_layer(layer) {
            warn!("Skipping layer while loading: {}", e);
        }
    }

    // 加载定义
    let mut stmt = conn.prepare("SELECT data FROM definitions")?;
    let definitions: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for data in definitions {
        let definition: Definition = serde_json::from_str(&data)?;
        document.definitions.add(definition);
    }

    // 加载实体
    let mut stmt = conn.prepare(
        "SELECT id, generation, layer_id, definition, transform, attributes, visible FROM entities",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let generation: u32 = row.get(1)?;
            let layer_id: i64 = row.get(2)?;
            let definition: String = row.get(3)?;
            let transform: String = row.get(4)?;
            let attributes: String = row.get(5)?;
            let visible: i32 = row.get(6)?;
            Ok((id, generation, layer_id, definition, transform, attributes, visible))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (id, generation, layer_id, definition, transform, attributes, visible) in rows {
        let transform: [f64; 6] = serde_json::from_str(&transform)?;
        let entity = Entity {
            id: EntityId::from_raw(id as u64, generation),
            definition,
            transform: isg_core::transform::Transform2D::from_array(transform),
            layer_id: EntityId::from_raw(layer_id as u64, 0),
            visible: visible != 0,
            attributes: serde_json::from_str(&attributes)?,
        };
        document.entities_mut().insert(entity.id, entity);
    }

    // 加载模型属性
    let mut stmt = conn.prepare("SELECT dictionary, data FROM model_attributes")?;
    let dictionaries: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (name, data) in dictionaries {
        let dictionary: AttributeDictionary = serde_json::from_str(&data)?;
        for (key, value) in dictionary {
            document.model_attributes_mut().set(&name, &key, value);
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use isg_core::transform::Transform2D;

    #[test]
    fn test_save_load_roundtrip() {
        let file_path = std::env::temp_dir().join(format!("isg_roundtrip_{}.isg", std::process::id()));
        std::fs::remove_file(&file_path).ok();

        let mut doc = Document::new();
        doc.metadata.title = "Test Document".to_string();
        doc.add_definition(Definition::rectangle("Square", 1.0, 1.0)).unwrap();
        let id = doc
            .place_instance("Square", Transform2D::translation(0.25, 0.5), "SG Solution Layer")
            .unwrap();
        doc.set_entity_attribute(&id, "IterativeSG", "UID", "u-1").unwrap();
        doc.set_attribute("IterativeSG Rules", "Rule 1", serde_json::json!({"kind": "merge"}));

        save(&doc, &file_path).expect("Failed to save");
        let loaded = load(&file_path).expect("Failed to load");

        assert_eq!(loaded.metadata.title, "Test Document");
        assert_eq!(loaded.entity_count(), 1);
        assert_eq!(loaded.layer_name(&id), Some("SG Solution Layer"));
        assert_eq!(loaded.world_points(&id).unwrap(), doc.world_points(&id).unwrap());
        assert_eq!(
            loaded.entity_attribute(&id, "IterativeSG", "UID").and_then(|v| v.as_str()),
            Some("u-1")
        );
        assert!(loaded.attribute("IterativeSG Rules", "Rule 1").is_some());

        std::fs::remove_file(&file_path).ok();
    }
}
