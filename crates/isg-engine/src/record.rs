//! 规则的持久化记录
//!
//! 每条规则以带版本号的 JSON 记录保存在模型属性字典 `IterativeSG Rules` 中，
//! 键为规则名。记录按 `kind` 字段区分变体。

use crate::error::EngineError;
use crate::rules::RuleId;
use crate::uid::Uid;
use isg_file::Document;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 规则记录所在的模型属性字典
pub const RULES_DICTIONARY: &str = "IterativeSG Rules";

/// 当前记录版本
pub const RECORD_VERSION: u32 = 1;

/// 规则记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleRecord {
    Replace {
        origin: Uid,
        shapes: Vec<Uid>,
        origin_new: Uid,
        shapes_new: Vec<Uid>,
        mirror_x: bool,
        mirror_y: bool,
        disable_overlap: bool,
    },
    Merge {
        merge_x: bool,
        merge_y: bool,
        num_objects: usize,
        definitions: Vec<String>,
        #[serde(default = "default_max_distance")]
        max_distance: f64,
    },
    Stretch {
        stretch_x: bool,
        stretch_y: bool,
        min_stretch: f64,
        max_stretch: f64,
        definitions: Vec<String>,
        #[serde(default)]
        constrain_connecting: bool,
    },
}

fn default_max_distance() -> f64 {
    1.0
}

impl RuleRecord {
    /// 记录引用的所有 UID
    pub fn uids(&self) -> Vec<&Uid> {
        match self {
            RuleRecord::Replace {
                origin,
                shapes,
                origin_new,
                shapes_new,
                ..
            } => std::iter::once(origin)
                .chain(shapes)
                .chain(std::iter::once(origin_new))
                .chain(shapes_new)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 记录引用的定义名
    pub fn definitions(&self) -> &[String] {
        match self {
            RuleRecord::Replace { .. } => &[],
            RuleRecord::Merge { definitions, .. } | RuleRecord::Stretch { definitions, .. } => definitions,
        }
    }

    /// 简短的文字描述
    pub fn summary(&self) -> String {
        match self {
            RuleRecord::Replace {
                shapes,
                shapes_new,
                mirror_x,
                mirror_y,
                disable_overlap,
                ..
            } => format!(
                "replace {} shape(s) with {} (mirror x: {}, mirror y: {}, no overlap: {})",
                shapes.len(),
                shapes_new.len(),
                mirror_x,
                mirror_y,
                disable_overlap
            ),
            RuleRecord::Merge {
                merge_x,
                merge_y,
                num_objects,
                definitions,
                max_distance,
            } => format!(
                "merge {} of [{}] along {}{} within {}",
                num_objects,
                definitions.join(", "),
                if *merge_x { "x" } else { "" },
                if *merge_y { "y" } else { "" },
                max_distance
            ),
            RuleRecord::Stretch {
                stretch_x,
                stretch_y,
                min_stretch,
                max_stretch,
                definitions,
                constrain_connecting,
            } => format!(
                "stretch [{}] along {}{} by {}..{}{}",
                definitions.join(", "),
                if *stretch_x { "x" } else { "" },
                if *stretch_y { "y" } else { "" },
                min_stretch,
                max_stretch,
                if *constrain_connecting { " without overlap" } else { "" }
            ),
        }
    }
}

/// 带版本号的持久化外壳
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRule {
    pub version: u32,
    pub rule: RuleRecord,
}

/// 写入规则记录（覆盖同名记录）
pub fn store(document: &mut Document, rule_id: &str, record: &RuleRecord) -> Result<(), EngineError> {
    let persisted = PersistedRule {
        version: RECORD_VERSION,
        rule: record.clone(),
    };
    document.set_attribute(RULES_DICTIONARY, rule_id, serde_json::to_value(&persisted)?);
    Ok(())
}

/// 删除规则记录
pub fn purge(document: &mut Document, rule_id: &str) {
    document.delete_attribute(RULES_DICTIONARY, rule_id);
}

/// 读取所有规则记录，按规则名排序
///
/// 无法解析或版本过新的记录会被跳过并记录警告，但不会被删除。
pub fn load_all(document: &Document) -> Vec<(RuleId, RuleRecord)> {
    let Some(dictionary) = document.attribute_dictionary(RULES_DICTIONARY) else {
        return Vec::new();
    };
    dictionary
        .iter()
        .filter_map(|(name, value)| {
            match serde_json::from_value::<PersistedRule>(value.clone()) {
                Ok(p) if p.version <= RECORD_VERSION => Some((name.clone(), p.rule)),
                Ok(p) => {
                    warn!("Rule '{}' has unsupported record version {}", name, p.version);
                    None
                }
                Err(e) => {
                    warn!("Rule '{}' has an unreadable record: {}", name, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_load() {
        let mut doc = Document::new();
        let record = RuleRecord::Merge {
            merge_x: true,
            merge_y: false,
            num_objects: 2,
            definitions: vec!["Square".to_string()],
            max_distance: 1.5,
        };
        store(&mut doc, "Rule 1", &record).unwrap();

        let value = doc.attribute(RULES_DICTIONARY, "Rule 1").unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["rule"]["kind"], "merge");

        assert_eq!(load_all(&doc), vec![("Rule 1".to_string(), record)]);

        purge(&mut doc, "Rule 1");
        assert!(load_all(&doc).is_empty());
    }

    #[test]
    fn test_unreadable_record_is_skipped() {
        let mut doc = Document::new();
        doc.set_attribute(RULES_DICTIONARY, "Broken", serde_json::json!({"version": 1, "rule": {"kind": "twist"}}));
        doc.set_attribute(
            RULES_DICTIONARY,
            "Future",
            serde_json::json!({"version": 99, "rule": {"kind": "merge", "merge_x": true, "merge_y": false, "num_objects": 2, "definitions": []}}),
        );
        assert!(load_all(&doc).is_empty());
    }

    #[test]
    fn test_replace_record_uids() {
        let record = RuleRecord::Replace {
            origin: Uid::from("o"),
            shapes: vec![Uid::from("a")],
            origin_new: Uid::from("n"),
            shapes_new: vec![Uid::from("b"), Uid::from("c")],
            mirror_x: false,
            mirror_y: false,
            disable_overlap: true,
        };
        let uids: Vec<&str> = record.uids().into_iter().map(Uid::as_str).collect();
        assert_eq!(uids, vec!["o", "a", "n", "b", "c"]);
        assert!(record.definitions().is_empty());
    }
}
