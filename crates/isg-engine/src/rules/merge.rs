//! 合并规则
//!
//! 把沿同一坐标轴相邻排列的若干形状融合为一个凸多边形。
//! 被合并的形状不会被删除，而是隐藏起来并记录在新形状上，以便撤销。

use super::RuleId;
use crate::error::EngineError;
use crate::geometry::{add_face_in_component, collect_in_direction, sort_components_in_direction, Axis};
use crate::record::RuleRecord;
use crate::session::Session;
use crate::uid::Uid;
use isg_core::entity::EntityId;
use isg_core::math::Point2;
use tracing::{debug, warn};

/// 合并规则参数
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    pub merge_x: bool,
    pub merge_y: bool,
    /// 每次合并的形状数量
    pub num_objects: usize,
    /// 可参与合并的定义
    pub definitions: Vec<String>,
    /// 射线搜索的最远距离
    pub max_distance: f64,
}

/// 合并规则
#[derive(Debug, Clone)]
pub struct MergeRule {
    id: RuleId,
    options: MergeOptions,
}

impl MergeRule {
    pub fn define(session: &Session, id: &str, options: MergeOptions) -> Result<Self, EngineError> {
        if options.num_objects < 2 {
            return Err(EngineError::selection("a merge rule needs at least two objects"));
        }
        if !options.merge_x && !options.merge_y {
            return Err(EngineError::selection("a merge rule needs at least one axis"));
        }
        if !(options.max_distance > 0.0 && options.max_distance.is_finite()) {
            return Err(EngineError::selection(format!("invalid merge distance {}", options.max_distance)));
        }
        check_definitions(session, &options.definitions)?;
        Ok(Self {
            id: id.to_string(),
            options,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record(&self) -> RuleRecord {
        RuleRecord::Merge {
            merge_x: self.options.merge_x,
            merge_y: self.options.merge_y,
            num_objects: self.options.num_objects,
            definitions: self.options.definitions.clone(),
            max_distance: self.options.max_distance,
        }
    }

    fn axes(&self) -> Vec<Axis> {
        let mut axes = Vec::with_capacity(2);
        if self.options.merge_x {
            axes.push(Axis::X);
        }
        if self.options.merge_y {
            axes.push(Axis::Y);
        }
        axes
    }

    /// 查找一组可合并的形状
    ///
    /// 未指定种子时按随机顺序尝试所有合格形状；未指定方向时在允许的轴中随机选择。
    /// 返回的第一个元素是种子，其余按沿轴方向的距离排列。
    pub fn collect_candidate_shapes(
        &self,
        session: &mut Session,
        seed: Option<EntityId>,
        axis: Option<Axis>,
    ) -> Option<Vec<EntityId>> {
        let eligible = session.registry().solution_instances_of(&self.options.definitions);
        let seeds = match seed {
            Some(seed) => vec![seed],
            None => {
                let mut seeds = eligible.clone();
                session.shuffle(&mut seeds);
                seeds
            }
        };

        for seed in seeds {
            let mut axes = match axis {
                Some(axis) => vec![axis],
                None => self.axes(),
            };
            session.shuffle(&mut axes);
            for axis in axes {
                if let Some(cluster) = self.cluster(session, &seed, &eligible, axis) {
                    return Some(cluster);
                }
            }
        }
        None
    }

    fn cluster(&self, session: &Session, seed: &EntityId, eligible: &[EntityId], axis: Axis) -> Option<Vec<EntityId>> {
        if !eligible.contains(seed) {
            return None;
        }
        let wanted = self.options.num_objects - 1;
        let hits = collect_in_direction(
            session.registry(),
            seed,
            eligible,
            wanted,
            &axis.vector(),
            self.options.max_distance,
            session.config().ray_march_steps,
        );
        if hits.len() < wanted {
            return None;
        }
        let all_valid = hits.iter().all(|h| {
            eligible.contains(h)
                && session
                    .registry()
                    .state(h)
                    .is_some_and(|s| session.geometry().state_inside(s))
        });
        if !all_valid {
            return None;
        }
        Some(std::iter::once(*seed).chain(hits).collect())
    }

    /// 检查选择集是否恰好是一组可合并的形状，返回按轴排序后的顺序
    pub fn check_rule(&self, session: &Session, selection: &[EntityId]) -> Option<Vec<EntityId>> {
        if selection.len() != self.options.num_objects {
            return None;
        }
        let eligible = session.registry().solution_instances_of(&self.options.definitions);
        self.axes().into_iter().find_map(|axis| {
            let sorted = sort_components_in_direction(session.registry(), selection, axis);
            let cluster = self.cluster(session, sorted.first()?, &eligible, axis)?;
            (cluster == sorted).then_some(cluster)
        })
    }

    /// 合并形状，返回新形状
    pub fn apply_rule(&self, session: &mut Session, shapes: &[EntityId]) -> Result<EntityId, EngineError> {
        if shapes.len() < 2 {
            return Err(EngineError::selection("merging needs at least two shapes"));
        }
        let mut points: Vec<Point2> = Vec::new();
        let mut erased: Vec<Uid> = Vec::with_capacity(shapes.len());
        for shape in shapes {
            let state = session.state(shape)?;
            points.extend(state.points.iter().copied());
            erased.push(state.uid.clone());
        }

        let name = session
            .document()
            .definitions
            .unique_name(&format!("{} merged", self.id));
        let layer = session.config().solution_layer.clone();
        let (face, edge) = (session.config().merged_face_color, session.config().merged_edge_color);
        let merged = add_face_in_component(&mut session.document, &name, &points, face, edge, &layer)?;

        session.initialize_shape(merged)?;
        session.set_ancestry(&merged, &self.id, erased)?;
        for shape in shapes {
            session.hide_shape(shape)?;
        }

        debug!("Rule {} merged {:?} into {}", self.id, shapes, merged);
        Ok(merged)
    }

    /// 撤销合并：恢复被替代的形状并删除合并结果
    ///
    /// 只依赖形状上记录的祖先信息，规则本身被删除后仍然可以撤销。
    pub fn remove_rule(session: &mut Session, shape: &EntityId) -> Result<Vec<EntityId>, EngineError> {
        let erased = session.state(shape)?.erased_entities.clone();
        if erased.is_empty() {
            return Err(EngineError::selection(format!("{shape} does not replace any shapes")));
        }

        let mut restored = Vec::with_capacity(erased.len());
        for uid in &erased {
            match session.registry().resolve(uid) {
                Some(id) => {
                    session.restore_shape(&id)?;
                    restored.push(id);
                }
                None => warn!("Cannot restore {}: shape is no longer registered", uid),
            }
        }
        session.remove_shape(shape);
        Ok(restored)
    }
}

/// 定义名必须非空且都存在于文档中
pub(crate) fn check_definitions(session: &Session, definitions: &[String]) -> Result<(), EngineError> {
    if definitions.is_empty() {
        return Err(EngineError::selection("no shape definitions given"));
    }
    match definitions
        .iter()
        .find(|d| session.document().definition(d).map_or(true, |def| def.is_marker()))
    {
        Some(missing) => Err(EngineError::selection(format!("unknown shape definition '{missing}'"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use isg_core::polygon::{convex_hull, point_in_polygon_2d};

    fn options(num_objects: usize) -> MergeOptions {
        MergeOptions {
            merge_x: true,
            merge_y: false,
            num_objects,
            definitions: vec!["Square".to_string()],
            max_distance: 1.0,
        }
    }

    fn two_squares() -> (Session, Vec<EntityId>) {
        let mut fixture = Fixture::new();
        let ids = vec![fixture.square_at(0.0, 0.0), fixture.square_at(1.0, 0.0)];
        let mut session = fixture.session();
        for id in &ids {
            session.initialize_shape(*id).unwrap();
        }
        (session, ids)
    }

    #[test]
    fn test_merge_two_adjacent_squares() {
        let (mut session, ids) = two_squares();
        let rule = MergeRule::define(&session, "M1", options(2)).unwrap();

        let cluster = rule.collect_candidate_shapes(&mut session, Some(ids[0]), None).unwrap();
        assert_eq!(cluster, ids);

        let union: Vec<Point2> = ids
            .iter()
            .flat_map(|id| session.state(id).unwrap().points.clone())
            .collect();
        let merged = rule.apply_rule(&mut session, &cluster).unwrap();

        let state = session.state(&merged).unwrap();
        let mut expected = convex_hull(&union);
        let mut actual = state.points.clone();
        expected.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        actual.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        assert_eq!(actual, expected);
        assert!(union.iter().all(|p| point_in_polygon_2d(p, &state.points, true)));
        assert_eq!(state.applied_by_rule.as_deref(), Some("M1"));

        assert_eq!(session.registry().solution(), &[merged]);
        assert!(ids.iter().all(|id| session.registry().is_registered(id)));

        let restored = MergeRule::remove_rule(&mut session, &merged).unwrap();
        assert_eq!(restored, ids);
        assert_eq!(session.registry().solution(), ids.as_slice());
        assert!(!session.document().contains(&merged));
        assert!(session.document().entity(&ids[0]).unwrap().visible);
    }

    #[test]
    fn test_seed_without_neighbour_has_no_cluster() {
        let (mut session, ids) = two_squares();
        let rule = MergeRule::define(&session, "M1", options(2)).unwrap();

        assert!(rule.collect_candidate_shapes(&mut session, Some(ids[1]), None).is_none());
        assert!(rule.collect_candidate_shapes(&mut session, Some(ids[0]), Some(Axis::Y)).is_none());

        let rule = MergeRule::define(&session, "M3", options(3)).unwrap();
        assert!(rule.collect_candidate_shapes(&mut session, None, None).is_none());
    }

    #[test]
    fn test_check_rule_orders_selection() {
        let (session, ids) = two_squares();
        let rule = MergeRule::define(&session, "M1", options(2)).unwrap();

        assert_eq!(rule.check_rule(&session, &[ids[1], ids[0]]), Some(ids.clone()));
        assert_eq!(rule.check_rule(&session, &ids[..1]), None);
    }

    #[test]
    fn test_define_validates_options() {
        let (session, _) = two_squares();
        let mut bad = options(1);
        assert!(MergeRule::define(&session, "M", bad.clone()).is_err());

        bad.num_objects = 2;
        bad.definitions = vec!["Origin".to_string()];
        assert!(MergeRule::define(&session, "M", bad.clone()).is_err());

        bad.definitions = vec!["Square".to_string()];
        bad.merge_x = false;
        assert!(MergeRule::define(&session, "M", bad).is_err());
    }

    #[test]
    fn test_remove_rule_requires_ancestry() {
        let (mut session, ids) = two_squares();
        assert!(matches!(
            MergeRule::remove_rule(&mut session, &ids[0]),
            Err(EngineError::InvalidSelection(_))
        ));
    }
}
