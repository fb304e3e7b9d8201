//! 属性字典
//!
//! 宿主模型为每个实体以及模型本身提供的字符串键值存储：
//! 字典名 -> (键 -> 值)。值使用 JSON 表示，便于持久化。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 属性值
pub type AttributeValue = serde_json::Value;

/// 单个属性字典
pub type AttributeDictionary = BTreeMap<String, AttributeValue>;

/// 一组按名称索引的属性字典
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDictionaries {
    dictionaries: BTreeMap<String, AttributeDictionary>,
}

impl AttributeDictionaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取属性
    pub fn get(&self, dictionary: &str, key: &str) -> Option<&AttributeValue> {
        self.dictionaries.get(dictionary).and_then(|d| d.get(key))
    }

    /// 写入属性（字典不存在时自动创建）
    pub fn set(&mut self, dictionary: &str, key: &str, value: impl Into<AttributeValue>) {
        self.dictionaries
            .entry(dictionary.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// 删除属性，返回旧值
    pub fn delete(&mut self, dictionary: &str, key: &str) -> Option<AttributeValue> {
        let dict = self.dictionaries.get_mut(dictionary)?;
        let old = dict.remove(key);
        if dict.is_empty() {
            self.dictionaries.remove(dictionary);
        }
        old
    }

    /// 获取整个字典
    pub fn dictionary(&self, dictionary: &str) -> Option<&AttributeDictionary> {
        self.dictionaries.get(dictionary)
    }

    /// 删除整个字典
    pub fn delete_dictionary(&mut self, dictionary: &str) -> Option<AttributeDictionary> {
        self.dictionaries.remove(dictionary)
    }

    /// 读取字符串属性
    pub fn get_str(&self, dictionary: &str, key: &str) -> Option<&str> {
        self.get(dictionary, key).and_then(|v| v.as_str())
    }

    /// 读取布尔属性，缺省为 false
    pub fn get_bool(&self, dictionary: &str, key: &str) -> bool {
        self.get(dictionary, key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// 迭代所有字典
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeDictionary)> {
        self.dictionaries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }
}
