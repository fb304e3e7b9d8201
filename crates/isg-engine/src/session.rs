//! 引擎会话
//!
//! 会话持有场景文档、注册表、边界几何与随机数发生器。
//! 所有对场景的修改都经由这里，保证注册表缓存与场景保持一致。

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::geometry::Geometry;
use crate::registry::{EntityKind, Registry, ShapeState};
use crate::rules::stretch::FACTOR_MAX;
use crate::uid::Uid;
use isg_core::entity::EntityId;
use isg_core::math::{snap_point, BoundingBox2, Point2};
use isg_file::Document;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::debug;

/// 实体属性字典名
pub const ISG_DICTIONARY: &str = "IterativeSG";

const KEY_UID: &str = "UID";
const KEY_MIRRORED_X: &str = "mirrored_x";
const KEY_MIRRORED_Y: &str = "mirrored_y";
const KEY_APPLIED_BY_RULE: &str = "applied_by_rule";
const KEY_ERASED_ENTITIES: &str = "erased_entities";

/// 引擎会话
#[derive(Debug)]
pub struct Session {
    pub(crate) document: Document,
    pub(crate) registry: Registry,
    pub(crate) geometry: Geometry,
    pub(crate) rng: StdRng,
    pub(crate) config: EngineConfig,
    /// 最近一次被拒绝或产生恒等结果的原始形状
    pub(crate) last_failed: Option<Vec<EntityId>>,
}

impl Session {
    pub fn new(document: Document, geometry: Geometry, config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            document,
            registry: Registry::new(),
            geometry,
            rng,
            config,
            last_failed: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn into_document(self) -> Document {
        self.document
    }

    /// 取出最近一次失败记录
    pub(crate) fn take_last_failed(&mut self) -> Option<Vec<EntityId>> {
        self.last_failed.take()
    }

    /// 随机选取一个元素
    pub(crate) fn choose<T: Copy>(&mut self, items: &[T]) -> Option<T> {
        items.choose(&mut self.rng).copied()
    }

    /// 随机打乱
    pub(crate) fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// `0..len` 中的随机下标
    pub(crate) fn random_index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// 随机的 +1 或 -1
    pub(crate) fn random_sign(&mut self) -> f64 {
        if self.rng.gen_bool(0.5) {
            -1.0
        } else {
            1.0
        }
    }

    /// 拉伸规则使用的随机因子（0~10）
    pub(crate) fn random_factor(&mut self) -> f64 {
        self.rng.gen_range(0.0..=FACTOR_MAX)
    }

    pub fn state(&self, id: &EntityId) -> Result<&ShapeState, EngineError> {
        self.registry.try_state(id)
    }

    // ---------------------------------------------------------------------
    // 注册
    // ---------------------------------------------------------------------

    /// 注册一个形状
    ///
    /// 已有 UID 且未被占用时沿用，否则分配新的 UID。
    /// 不在隐藏图层上且位于边界内的形状会被加入解集合并移到解图层。
    pub fn initialize_shape(&mut self, id: EntityId) -> Result<Uid, EngineError> {
        let uid = self.initialize_entity(id, EntityKind::Shape)?;

        let hidden = self.document.layer_name(&id) == Some(self.config.hidden_layer.as_str());
        let inside = self.geometry.state_inside(self.registry.try_state(&id)?);
        if !hidden && inside {
            let layer = self.config.solution_layer.clone();
            self.document.set_layer(&id, &layer)?;
            self.registry.add_to_solution(id);
        }
        Ok(uid)
    }

    /// 注册一个原点标记
    pub fn initialize_marker(&mut self, id: EntityId) -> Result<Uid, EngineError> {
        self.initialize_entity(id, EntityKind::Marker)
    }

    fn initialize_entity(&mut self, id: EntityId, kind: EntityKind) -> Result<Uid, EngineError> {
        if let Some(state) = self.registry.state(&id) {
            return Ok(state.uid.clone());
        }

        let stored = self
            .document
            .entity_attribute(&id, ISG_DICTIONARY, KEY_UID)
            .and_then(|v| v.as_str())
            .map(Uid::from);
        let uid = match stored {
            Some(uid) if !self.registry.contains_uid(&uid) => uid,
            _ => self
                .registry
                .generate_uid(&mut self.rng, self.config.uid_max_attempts)?,
        };
        self.document
            .set_entity_attribute(&id, ISG_DICTIONARY, KEY_UID, uid.as_str())?;

        let entity = self.document.entity(&id)?;
        let attributes = &entity.attributes;
        let applied_by_rule = attributes
            .get_str(ISG_DICTIONARY, KEY_APPLIED_BY_RULE)
            .map(str::to_string);
        let erased_entities: Vec<Uid> = attributes
            .get(ISG_DICTIONARY, KEY_ERASED_ENTITIES)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let state = ShapeState {
            uid: uid.clone(),
            kind,
            definition: entity.definition.clone(),
            position: Point2::origin(),
            points: Vec::new(),
            transform: entity.transform.to_array(),
            rules_applied: BTreeSet::new(),
            mirrored_x: attributes.get_bool(ISG_DICTIONARY, KEY_MIRRORED_X),
            mirrored_y: attributes.get_bool(ISG_DICTIONARY, KEY_MIRRORED_Y),
            applied_by_rule,
            erased_entities,
        };
        self.registry.insert(id, state);
        self.update_shape(&id)?;

        debug!("Registered {:?} {} as {}", kind, id, uid);
        Ok(uid)
    }

    /// 从场景重新计算形状的缓存坐标
    pub fn update_shape(&mut self, id: &EntityId) -> Result<(), EngineError> {
        let points: Vec<Point2> = self
            .document
            .world_points(id)?
            .iter()
            .map(snap_point)
            .collect();
        let transform = self.document.entity(id)?.transform.to_array();
        let state = self.registry.state_mut(id)?;
        state.position = match state.kind {
            EntityKind::Marker => points.first().copied().unwrap_or_else(Point2::origin),
            EntityKind::Shape => snap_point(&BoundingBox2::from_points(&points).center()),
        };
        state.points = points;
        state.transform = transform;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // 场景修改
    // ---------------------------------------------------------------------

    /// 注销形状并从场景中删除
    pub fn remove_shape(&mut self, id: &EntityId) {
        self.registry.remove(id);
        self.document.remove_entity(id);
    }

    /// 隐藏形状：移到隐藏图层并移出解集合，保留注册
    pub fn hide_shape(&mut self, id: &EntityId) -> Result<(), EngineError> {
        let layer = self.config.hidden_layer.clone();
        self.document.set_layer(id, &layer)?;
        self.document.set_visible(id, false)?;
        self.registry.remove_from_solution(id);
        Ok(())
    }

    /// 恢复被隐藏的形状
    pub fn restore_shape(&mut self, id: &EntityId) -> Result<(), EngineError> {
        let layer = self.config.solution_layer.clone();
        self.document.set_layer(id, &layer)?;
        self.document.set_visible(id, true)?;
        self.registry.add_to_solution(*id);
        Ok(())
    }

    /// 记录规则已应用于形状
    pub fn mark_rule(&mut self, id: &EntityId, rule: &str) -> Result<(), EngineError> {
        self.registry.mark_rule(id, rule)
    }

    /// 设置镜像状态，同时写入实体属性
    pub fn set_mirror_state(&mut self, id: &EntityId, mirrored_x: bool, mirrored_y: bool) -> Result<(), EngineError> {
        self.document
            .set_entity_attribute(id, ISG_DICTIONARY, KEY_MIRRORED_X, mirrored_x)?;
        self.document
            .set_entity_attribute(id, ISG_DICTIONARY, KEY_MIRRORED_Y, mirrored_y)?;
        let state = self.registry.state_mut(id)?;
        state.mirrored_x = mirrored_x;
        state.mirrored_y = mirrored_y;
        Ok(())
    }

    /// 记录形状由哪条规则产生、替代了哪些形状
    pub fn set_ancestry(&mut self, id: &EntityId, rule: &str, erased: Vec<Uid>) -> Result<(), EngineError> {
        self.document
            .set_entity_attribute(id, ISG_DICTIONARY, KEY_APPLIED_BY_RULE, rule)?;
        self.document.set_entity_attribute(
            id,
            ISG_DICTIONARY,
            KEY_ERASED_ENTITIES,
            serde_json::to_value(&erased)?,
        )?;
        let state = self.registry.state_mut(id)?;
        state.applied_by_rule = Some(rule.to_string());
        state.erased_entities = erased;
        Ok(())
    }

    /// 移到规则库图层并移出解集合
    pub(crate) fn move_to_rules_layer(&mut self, id: &EntityId) -> Result<(), EngineError> {
        let layer = self.config.rules_layer.clone();
        self.document.set_layer(id, &layer)?;
        self.registry.remove_from_solution(id);
        Ok(())
    }

    /// 与给定点集重叠的解形状是否存在
    pub(crate) fn overlaps_solution(&self, points: &[Point2], exclude: &[EntityId]) -> bool {
        Geometry::overlaps_solution(&self.registry, points, exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use isg_core::transform::Transform2D;

    #[test]
    fn test_copied_shape_gets_fresh_uid() {
        let mut fixture = Fixture::new();
        let original = fixture.square_at(0.25, 0.25);
        let mut session = fixture.session();
        let uid = session.initialize_shape(original).unwrap();

        let copy = session.document.copy_entity(&original).unwrap();
        let copy_uid = session.initialize_shape(copy).unwrap();

        assert_ne!(uid, copy_uid);
        assert_eq!(session.registry.resolve(&uid), Some(original));
        assert_eq!(session.registry.resolve(&copy_uid), Some(copy));
    }

    #[test]
    fn test_stored_uid_survives_when_free() {
        let mut fixture = Fixture::new();
        let id = fixture.square_at(0.0, 0.0);
        fixture
            .document
            .set_entity_attribute(&id, ISG_DICTIONARY, KEY_UID, "kept")
            .unwrap();
        let mut session = fixture.session();

        assert_eq!(session.initialize_shape(id).unwrap(), Uid::from("kept"));
        assert!(session.registry.in_solution(&id));
    }

    #[test]
    fn test_outside_shape_is_not_in_solution() {
        let mut fixture = Fixture::new();
        let id = fixture.square_at(5.0, 5.0);
        let mut session = fixture.session();
        session.initialize_shape(id).unwrap();

        assert!(session.registry.is_registered(&id));
        assert!(!session.registry.in_solution(&id));
    }

    #[test]
    fn test_hide_and_restore() {
        let mut fixture = Fixture::new();
        let id = fixture.square_at(0.0, 0.0);
        let mut session = fixture.session();
        session.initialize_shape(id).unwrap();

        session.hide_shape(&id).unwrap();
        assert!(!session.registry.in_solution(&id));
        assert!(!session.document.entity(&id).unwrap().visible);

        session.restore_shape(&id).unwrap();
        assert!(session.registry.in_solution(&id));
        assert_eq!(session.document.layer_name(&id), Some("SG Solution Layer"));
    }

    #[test]
    fn test_update_shape_snaps_coordinates() {
        let mut fixture = Fixture::new();
        let id = fixture.square_at(0.1, 0.2);
        let mut session = fixture.session();
        session.initialize_shape(id).unwrap();

        session
            .document
            .transform_entity(&id, &Transform2D::translation(0.1, 0.1))
            .unwrap();
        session.update_shape(&id).unwrap();

        let state = session.state(&id).unwrap();
        assert_eq!(state.points[0], snap_point(&Point2::new(0.2, 0.3)));
    }
}
