//! ISG 规则引擎
//!
//! 从一个凸边界和一组规则出发，随机地反复应用规则来生长设计，
//! 并在每一步保证几何合法性：形状不越界、不重复。
//!
//! # 结构
//!
//! - [`registry`]: UID 分配与形状状态缓存
//! - [`geometry`]: 绑定边界的几何查询
//! - [`rules`]: 替换、合并、拉伸三类规则
//! - [`controller`]: 初始化、规则定义与生成循环
//!
//! # 示例
//!
//! ```no_run
//! use isg_engine::{Controller, EngineConfig};
//! use isg_file::Document;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), isg_engine::EngineError> {
//! let document = Document::open("design.isg")?;
//! let mut controller = Controller::initialize(document, None, EngineConfig::default())?;
//! let rules: Vec<String> = controller.rules().keys().cloned().collect();
//! let report = controller.generate_design(120, &rules, Duration::from_secs(20))?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod generation;
pub mod geometry;
pub mod record;
pub mod registry;
pub mod rules;
pub mod session;
pub mod uid;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use controller::Controller;
pub use error::EngineError;
pub use generation::{GenerationReport, StopReason};
pub use rules::{ApplyOutcome, Rule, RuleId};
pub use uid::Uid;
