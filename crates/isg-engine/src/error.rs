//! 引擎错误定义
//!
//! 只有配置类错误会返回给调用者；几何拒绝、找不到候选形状等情况
//! 由生成循环在内部消化，不经过这里。

use isg_core::entity::EntityId;
use isg_file::FileError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No boundary entity found")]
    NoBoundary,

    #[error("Ambiguous boundary: {0} candidate entities")]
    AmbiguousBoundary(usize),

    #[error("Invalid boundary: expected exactly one face, found {0}")]
    InvalidBoundary(usize),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Rule already exists: {0}")]
    RuleAlreadyExists(String),

    #[error("Entity is not registered: {0}")]
    EntityNotFound(EntityId),

    #[error("Could not generate a free UID after {0} attempts")]
    UidSpaceExhausted(usize),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn selection(message: impl Into<String>) -> Self {
        Self::InvalidSelection(message.into())
    }
}
