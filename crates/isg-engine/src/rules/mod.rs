//! 形状规则
//!
//! 三类规则共享同一套生命周期：由选择集定义、持久化为记录、
//! 在初始化时从记录重建，并在生成循环中被反复应用。

pub mod merge;
pub mod replace;
pub mod stretch;

pub use merge::MergeRule;
pub use replace::ReplaceRule;
pub use stretch::StretchRule;

use crate::error::EngineError;
use crate::record::RuleRecord;
use crate::session::Session;
use crate::uid::Uid;
use isg_core::entity::EntityId;

/// 规则名
pub type RuleId = String;

/// 一次规则应用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 产生（或保留）的解形状
    Applied(Vec<EntityId>),
    /// 没有产生新的不同形状
    NoOp,
    /// 几何上不合法，已撤销
    Rejected(Rejection),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}

/// 拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutsideBoundary,
    Overlap,
}

/// 规则
#[derive(Debug, Clone)]
pub enum Rule {
    Replace(ReplaceRule),
    Merge(MergeRule),
    Stretch(StretchRule),
}

impl Rule {
    pub fn id(&self) -> &str {
        match self {
            Rule::Replace(r) => r.id(),
            Rule::Merge(r) => r.id(),
            Rule::Stretch(r) => r.id(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Rule::Replace(_) => "replace",
            Rule::Merge(_) => "merge",
            Rule::Stretch(_) => "stretch",
        }
    }

    /// 持久化记录
    pub fn record(&self) -> RuleRecord {
        match self {
            Rule::Replace(r) => r.record(),
            Rule::Merge(r) => r.record(),
            Rule::Stretch(r) => r.record(),
        }
    }

    /// 从记录重建
    ///
    /// 记录中的 UID 通过注册表解析，重建时重新计算缓存的模板几何。
    pub fn from_record(session: &Session, id: &str, record: &RuleRecord) -> Result<Self, EngineError> {
        match record {
            RuleRecord::Replace {
                origin,
                shapes,
                origin_new,
                shapes_new,
                mirror_x,
                mirror_y,
                disable_overlap,
            } => {
                let resolve = |uid: &Uid| {
                    session
                        .registry()
                        .resolve(uid)
                        .ok_or_else(|| EngineError::selection(format!("rule {id} references unknown UID {uid}")))
                };
                let origin = resolve(origin)?;
                let shapes = shapes.iter().map(resolve).collect::<Result<Vec<_>, _>>()?;
                let origin_new = resolve(origin_new)?;
                let shapes_new = shapes_new.iter().map(resolve).collect::<Result<Vec<_>, _>>()?;
                let options = replace::ReplaceOptions {
                    mirror_x: *mirror_x,
                    mirror_y: *mirror_y,
                    disable_overlap: *disable_overlap,
                };
                Ok(Rule::Replace(ReplaceRule::define(
                    session,
                    id,
                    origin,
                    &shapes,
                    origin_new,
                    &shapes_new,
                    options,
                )?))
            }
            RuleRecord::Merge {
                merge_x,
                merge_y,
                num_objects,
                definitions,
                max_distance,
            } => Ok(Rule::Merge(MergeRule::define(
                session,
                id,
                merge::MergeOptions {
                    merge_x: *merge_x,
                    merge_y: *merge_y,
                    num_objects: *num_objects,
                    definitions: definitions.clone(),
                    max_distance: *max_distance,
                },
            )?)),
            RuleRecord::Stretch {
                stretch_x,
                stretch_y,
                min_stretch,
                max_stretch,
                definitions,
                constrain_connecting,
            } => Ok(Rule::Stretch(StretchRule::define(
                session,
                id,
                stretch::StretchOptions {
                    stretch_x: *stretch_x,
                    stretch_y: *stretch_y,
                    min_stretch: *min_stretch,
                    max_stretch: *max_stretch,
                    definitions: definitions.clone(),
                    constrain_connecting: *constrain_connecting,
                },
            )?)),
        }
    }
}
