//! 文档与文件操作错误定义

use isg_core::entity::EntityId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Definition already exists: {0}")]
    DefinitionAlreadyExists(String),
}
