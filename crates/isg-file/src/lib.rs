//! ISG 场景文档
//!
//! 提供规则引擎所依赖的宿主能力：
//! - 放置、复制、删除、变换实例
//! - 查询定义、变换与世界坐标顶点
//! - 实体与模型级别的属性字典
//! - `.isg` 工作文件（基于SQLite）

pub mod document;
pub mod error;
pub mod native;

pub use document::Document;
pub use error::FileError;
