//! 引擎配置

use crate::error::EngineError;
use isg_core::properties::Color;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 引擎配置
///
/// 所有字段都有默认值，JSON 配置文件中可以只写需要覆盖的部分。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 解图层：生成的设计所在的分区
    pub solution_layer: String,
    /// 规则库图层：规则模板形状与原点标记
    pub rules_layer: String,
    /// 边界图层
    pub boundary_layer: String,
    /// 被合并规则隐藏的原始形状
    pub hidden_layer: String,

    /// 随机种子；不设置时从系统熵初始化
    pub seed: Option<u64>,

    /// 默认迭代次数
    pub default_iterations: usize,
    /// 默认超时（秒）
    pub default_timeout_secs: u64,

    /// 合并规则的射线步进次数
    pub ray_march_steps: usize,
    /// 生成 UID 的最大尝试次数
    pub uid_max_attempts: usize,

    /// 合并后形状的面颜色
    pub merged_face_color: Color,
    /// 合并后形状的边颜色
    pub merged_edge_color: Color,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            solution_layer: "SG Solution Layer".to_string(),
            rules_layer: "SG Rules Layer".to_string(),
            boundary_layer: "SG Boundary Layer".to_string(),
            hidden_layer: "SG Hidden Layer".to_string(),
            seed: None,
            default_iterations: 120,
            default_timeout_secs: 20,
            ray_march_steps: 512,
            uid_max_attempts: 8,
            merged_face_color: Color::MERGED_FACE,
            merged_edge_color: Color::BLACK,
        }
    }
}

impl EngineConfig {
    /// 从 JSON 文件加载
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// 设置随机种子
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"seed": 42, "default_iterations": 10}"#).unwrap();

        assert_eq!(config.seed, Some(42));
        assert_eq!(config.default_iterations, 10);
        assert_eq!(config.solution_layer, "SG Solution Layer");
        assert_eq!(config.default_timeout(), Duration::from_secs(20));
        assert_eq!(config.ray_march_steps, 512);
    }
}
