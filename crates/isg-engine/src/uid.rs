//! 形状唯一标识

use rand::Rng;
use serde::{Deserialize, Serialize};

/// 持久化的形状标识
///
/// 与定义名不同：同一定义的每个放置实例都有自己的 UID。
/// UID 保存在实体的属性字典中，因此在保存和重新载入后保持不变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// 128 位随机令牌，十六进制编码
    pub fn random(rng: &mut impl Rng) -> Self {
        let bytes: [u8; 16] = rng.gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
