//! 形状注册表
//!
//! 为每个被引擎管理的实体保存一份状态缓存：UID、世界坐标顶点、位置、
//! 缓存变换以及已经应用过的规则。UID 与实体之间是一一映射。

use crate::error::EngineError;
use crate::rules::RuleId;
use crate::uid::Uid;
use isg_core::entity::EntityId;
use isg_core::math::Point2;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};

/// 注册实体的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// 带面的多边形实例
    Shape,
    /// 规则的原点标记
    Marker,
}

/// 形状状态缓存
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeState {
    pub uid: Uid,
    pub kind: EntityKind,
    /// 实例引用的定义名
    pub definition: String,
    /// 世界包围盒中心；标记为其自身位置
    pub position: Point2,
    /// 所有顶点的世界坐标（已吸附）
    pub points: Vec<Point2>,
    /// 放置变换的 2x3 系数（已吸附）
    pub transform: [f64; 6],
    /// 已对该形状应用（或失败）过的规则
    pub rules_applied: BTreeSet<RuleId>,
    pub mirrored_x: bool,
    pub mirrored_y: bool,
    /// 产生该形状的可撤销规则
    pub applied_by_rule: Option<RuleId>,
    /// 被该形状替代的原始形状
    pub erased_entities: Vec<Uid>,
}

/// 注册表
#[derive(Debug, Default)]
pub struct Registry {
    uids: HashMap<Uid, EntityId>,
    states: HashMap<EntityId, ShapeState>,
    /// 注册顺序，保证迭代结果可复现
    order: Vec<EntityId>,
    /// 解集合
    solution: Vec<EntityId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成一个尚未被使用的 UID
    pub fn generate_uid(&self, rng: &mut impl Rng, max_attempts: usize) -> Result<Uid, EngineError> {
        for _ in 0..max_attempts.max(1) {
            let uid = Uid::random(rng);
            if !self.uids.contains_key(&uid) {
                return Ok(uid);
            }
        }
        Err(EngineError::UidSpaceExhausted(max_attempts))
    }

    pub fn contains_uid(&self, uid: &Uid) -> bool {
        self.uids.contains_key(uid)
    }

    /// UID 对应的实体
    pub fn resolve(&self, uid: &Uid) -> Option<EntityId> {
        self.uids.get(uid).copied()
    }

    pub fn is_registered(&self, id: &EntityId) -> bool {
        self.states.contains_key(id)
    }

    pub fn state(&self, id: &EntityId) -> Option<&ShapeState> {
        self.states.get(id)
    }

    /// 获取状态，未注册时返回错误
    pub fn try_state(&self, id: &EntityId) -> Result<&ShapeState, EngineError> {
        self.states.get(id).ok_or(EngineError::EntityNotFound(*id))
    }

    pub fn state_mut(&mut self, id: &EntityId) -> Result<&mut ShapeState, EngineError> {
        self.states.get_mut(id).ok_or(EngineError::EntityNotFound(*id))
    }

    /// 注册实体；已注册时替换其状态
    pub fn insert(&mut self, id: EntityId, state: ShapeState) {
        if let Some(old) = self.states.get(&id) {
            self.uids.remove(&old.uid);
        } else {
            self.order.push(id);
        }
        self.uids.insert(state.uid.clone(), id);
        self.states.insert(id, state);
    }

    /// 注销实体，同时从解集合中移除
    pub fn remove(&mut self, id: &EntityId) -> Option<ShapeState> {
        let state = self.states.remove(id)?;
        self.uids.remove(&state.uid);
        self.order.retain(|e| e != id);
        self.solution.retain(|e| e != id);
        Some(state)
    }

    /// 加入解集合（已在集合中时忽略）
    pub fn add_to_solution(&mut self, id: EntityId) {
        if self.states.contains_key(&id) && !self.solution.contains(&id) {
            self.solution.push(id);
        }
    }

    pub fn remove_from_solution(&mut self, id: &EntityId) {
        self.solution.retain(|e| e != id);
    }

    pub fn in_solution(&self, id: &EntityId) -> bool {
        self.solution.contains(id)
    }

    pub fn solution(&self) -> &[EntityId] {
        &self.solution
    }

    /// 所有注册的形状（不含标记），按注册顺序
    pub fn shapes(&self) -> Vec<EntityId> {
        self.of_kind(EntityKind::Shape)
    }

    /// 所有注册的标记
    pub fn markers(&self) -> Vec<EntityId> {
        self.of_kind(EntityKind::Marker)
    }

    fn of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.order
            .iter()
            .filter(|id| self.states.get(id).is_some_and(|s| s.kind == kind))
            .copied()
            .collect()
    }

    /// 解集合中引用给定定义之一的形状
    pub fn solution_instances_of(&self, definitions: &[String]) -> Vec<EntityId> {
        self.solution
            .iter()
            .filter(|id| {
                self.states
                    .get(id)
                    .is_some_and(|s| definitions.iter().any(|d| *d == s.definition))
            })
            .copied()
            .collect()
    }

    /// 记录规则已应用到形状（集合语义，重复标记无效果）
    pub fn mark_rule(&mut self, id: &EntityId, rule: &str) -> Result<(), EngineError> {
        self.state_mut(id)?.rules_applied.insert(rule.to_string());
        Ok(())
    }

    pub fn has_rule(&self, id: &EntityId, rule: &str) -> bool {
        self.states
            .get(id)
            .is_some_and(|s| s.rules_applied.contains(rule))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn state(uid: &str, definition: &str) -> ShapeState {
        ShapeState {
            uid: Uid::from(uid),
            kind: EntityKind::Shape,
            definition: definition.to_string(),
            position: Point2::origin(),
            points: Vec::new(),
            transform: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            rules_applied: BTreeSet::new(),
            mirrored_x: false,
            mirrored_y: false,
            applied_by_rule: None,
            erased_entities: Vec::new(),
        }
    }

    #[test]
    fn test_insert_and_remove_keep_uid_map_in_sync() {
        let mut registry = Registry::new();
        let a = EntityId::new();
        let b = EntityId::new();
        registry.insert(a, state("a", "Square"));
        registry.insert(b, state("b", "Square"));
        registry.add_to_solution(a);
        registry.add_to_solution(a);

        assert_eq!(registry.solution(), &[a]);
        assert_eq!(registry.resolve(&Uid::from("b")), Some(b));

        registry.remove(&a);
        assert!(!registry.contains_uid(&Uid::from("a")));
        assert!(registry.solution().is_empty());
        assert_eq!(registry.shapes(), vec![b]);
    }

    #[test]
    fn test_reinsert_replaces_uid() {
        let mut registry = Registry::new();
        let a = EntityId::new();
        registry.insert(a, state("old", "Square"));
        registry.insert(a, state("new", "Square"));

        assert!(!registry.contains_uid(&Uid::from("old")));
        assert_eq!(registry.resolve(&Uid::from("new")), Some(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mark_rule_is_idempotent() {
        let mut registry = Registry::new();
        let a = EntityId::new();
        registry.insert(a, state("a", "Square"));

        registry.mark_rule(&a, "Rule 1").unwrap();
        registry.mark_rule(&a, "Rule 1").unwrap();

        assert_eq!(registry.state(&a).unwrap().rules_applied.len(), 1);
        assert!(registry.has_rule(&a, "Rule 1"));
    }

    #[test]
    fn test_generate_uid_avoids_registered() {
        let mut registry = Registry::new();
        let mut rng = StdRng::seed_from_u64(1);
        let first = registry.generate_uid(&mut rng, 8).unwrap();

        let mut replay = StdRng::seed_from_u64(1);
        registry.insert(EntityId::new(), state(first.as_str(), "Square"));
        let second = registry.generate_uid(&mut replay, 8).unwrap();

        assert_ne!(first, second);
    }
}
