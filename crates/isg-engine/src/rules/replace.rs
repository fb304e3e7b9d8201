//! 替换规则
//!
//! 规则由两组模板定义：原点标记加上 1~2 个源形状，以及新原点标记加上若干新形状。
//! 应用时找到与源形状匹配的解形状，把新形状按相对于原点标记的布局
//! 放到原始形状所在的位置，然后删除原始形状。

use super::{ApplyOutcome, Rejection, RuleId};
use crate::error::EngineError;
use crate::geometry::{get_by_distance, identical};
use crate::record::RuleRecord;
use crate::registry::{EntityKind, Registry, ShapeState};
use crate::session::Session;
use crate::uid::Uid;
use isg_core::entity::EntityId;
use isg_core::math::{BoundingBox2, Vector2};
use isg_core::transform::Transform2D;
use tracing::debug;

/// 替换规则选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOptions {
    /// 允许沿 X 轴镜像
    pub mirror_x: bool,
    /// 允许沿 Y 轴镜像
    pub mirror_y: bool,
    /// 新形状不得与已有解形状重叠
    pub disable_overlap: bool,
}

/// 新形状模板
#[derive(Debug, Clone)]
struct Template {
    uid: Uid,
    /// 定义坐标 -> 以新形状组包围盒左下角为原点的组坐标
    local: Transform2D,
}

/// 两个源形状之间的相对位置（源形状坐标系下）
#[derive(Debug, Clone, Copy)]
struct PairPattern {
    distance: f64,
    vector: Vector2,
}

/// 替换规则
#[derive(Debug, Clone)]
pub struct ReplaceRule {
    id: RuleId,
    origin: Uid,
    shapes: Vec<Uid>,
    origin_new: Uid,
    shapes_new: Vec<Uid>,
    options: ReplaceOptions,

    source_definitions: Vec<String>,
    /// 第一个源形状放置变换的逆
    source_inverse: Transform2D,
    /// 组坐标 -> 第一个源形状的定义坐标
    placement: Transform2D,
    templates: Vec<Template>,
    pair: Option<PairPattern>,
}

impl ReplaceRule {
    /// 由模板实体定义规则，并计算缓存的模板几何
    pub fn define(
        session: &Session,
        id: &str,
        origin: EntityId,
        shapes: &[EntityId],
        origin_new: EntityId,
        shapes_new: &[EntityId],
        options: ReplaceOptions,
    ) -> Result<Self, EngineError> {
        if shapes.is_empty() || shapes.len() > 2 {
            return Err(EngineError::selection(format!(
                "a replace rule needs one or two source shapes, got {}",
                shapes.len()
            )));
        }
        if shapes_new.is_empty() {
            return Err(EngineError::selection("a replace rule needs at least one new shape"));
        }

        let registry = session.registry();
        let origin_state = expect_kind(registry, &origin, EntityKind::Marker)?;
        let origin_new_state = expect_kind(registry, &origin_new, EntityKind::Marker)?;
        let source_states = shapes
            .iter()
            .map(|s| expect_kind(registry, s, EntityKind::Shape))
            .collect::<Result<Vec<_>, _>>()?;
        let new_states = shapes_new
            .iter()
            .map(|s| expect_kind(registry, s, EntityKind::Shape))
            .collect::<Result<Vec<_>, _>>()?;

        let source_min = BoundingBox2::from_points(source_states.iter().flat_map(|s| &s.points)).min;
        let new_min = BoundingBox2::from_points(new_states.iter().flat_map(|s| &s.points)).min;
        // 新形状组相对源形状组的平移，两组各自相对原点标记对齐
        let translation = (new_min - origin_new_state.position) - (source_min - origin_state.position);

        let source_transform = session.document().entity(&shapes[0])?.transform;
        let source_inverse = source_transform
            .inverse()
            .ok_or_else(|| EngineError::selection("source shape has a degenerate transform"))?;
        let placement = source_inverse.then(&Transform2D::translation_by(&(source_min.coords + translation)));

        let to_group = Transform2D::translation(-new_min.x, -new_min.y);
        let templates = shapes_new
            .iter()
            .zip(&new_states)
            .map(|(s, state)| -> Result<Template, EngineError> {
                Ok(Template {
                    uid: state.uid.clone(),
                    local: to_group.then(&session.document().entity(s)?.transform),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pair = if source_states.len() == 2 {
            let offset = source_states[1].position - source_states[0].position;
            Some(PairPattern {
                distance: offset.norm(),
                vector: source_inverse.transform_vector(&offset),
            })
        } else {
            None
        };

        Ok(Self {
            id: id.to_string(),
            origin: origin_state.uid.clone(),
            shapes: source_states.iter().map(|s| s.uid.clone()).collect(),
            origin_new: origin_new_state.uid.clone(),
            shapes_new: new_states.iter().map(|s| s.uid.clone()).collect(),
            options,
            source_definitions: source_states.iter().map(|s| s.definition.clone()).collect(),
            source_inverse,
            placement,
            templates,
            pair,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record(&self) -> RuleRecord {
        RuleRecord::Replace {
            origin: self.origin.clone(),
            shapes: self.shapes.clone(),
            origin_new: self.origin_new.clone(),
            shapes_new: self.shapes_new.clone(),
            mirror_x: self.options.mirror_x,
            mirror_y: self.options.mirror_y,
            disable_overlap: self.options.disable_overlap,
        }
    }

    /// 在解集合中查找可应用的原始形状
    ///
    /// 单形状模式随机返回一个尚未标记本规则的源定义实例；
    /// 双形状模式按缓存的距离与方向寻找匹配的一对。
    pub fn collect_candidate_shapes(&self, session: &mut Session) -> Option<Vec<EntityId>> {
        let unmarked = |session: &Session, definitions: &[String]| -> Vec<EntityId> {
            session
                .registry()
                .solution_instances_of(definitions)
                .into_iter()
                .filter(|id| !session.registry().has_rule(id, &self.id))
                .collect()
        };

        let mut firsts = unmarked(&*session, &self.source_definitions[..1]);
        let Some(pair) = self.pair else {
            return session.choose(&firsts).map(|id| vec![id]);
        };

        let seconds = unmarked(&*session, &self.source_definitions[1..]);
        session.shuffle(&mut firsts);
        for first in firsts {
            let matches = self.paired_with(session, &first, &seconds, &pair);
            if let Some(second) = session.choose(&matches) {
                return Some(vec![first, second]);
            }
        }
        None
    }

    fn paired_with(&self, session: &Session, first: &EntityId, seconds: &[EntityId], pair: &PairPattern) -> Vec<EntityId> {
        let Some(entity) = session.document().get_entity(first) else {
            return Vec::new();
        };
        let vector = entity.transform.then(&self.source_inverse).transform_vector(&pair.vector);
        get_by_distance(session.registry(), first, seconds, pair.distance, &vector)
    }

    /// 检查选择集能否应用本规则，返回按源形状顺序排列的原始形状
    pub fn check_rule(&self, session: &Session, selection: &[EntityId]) -> Option<Vec<EntityId>> {
        if selection.len() != self.source_definitions.len() {
            return None;
        }
        // 只接受解集合中的形状，规则库中的模板不能被替换
        let is_definition = |id: &EntityId, index: usize| {
            session.registry().in_solution(id)
                && session
                    .registry()
                    .state(id)
                    .is_some_and(|s| s.kind == EntityKind::Shape && s.definition == self.source_definitions[index])
        };

        match &self.pair {
            None => is_definition(&selection[0], 0).then(|| selection.to_vec()),
            Some(pair) => [(selection[0], selection[1]), (selection[1], selection[0])]
                .into_iter()
                .find(|(a, b)| {
                    is_definition(a, 0)
                        && is_definition(b, 1)
                        && !self.paired_with(session, a, &[*b], pair).is_empty()
                })
                .map(|(a, b)| vec![a, b]),
        }
    }

    /// 应用规则
    ///
    /// `mirror_x`/`mirror_y` 取 -1 表示请求沿该轴镜像，只对规则允许的轴生效。
    /// 被拒绝或产生恒等结果时，原始形状会记录在会话的最近失败中。
    pub fn apply_rule(
        &self,
        session: &mut Session,
        mark_rule: bool,
        originals: &[EntityId],
        mirror_x: f64,
        mirror_y: f64,
    ) -> Result<ApplyOutcome, EngineError> {
        session.last_failed = None;

        let anchor = *originals
            .first()
            .ok_or_else(|| EngineError::selection("no original shapes given"))?;
        for original in originals {
            session.state(original)?;
        }
        let sources = self
            .templates
            .iter()
            .map(|t| {
                session
                    .registry()
                    .resolve(&t.uid)
                    .ok_or_else(|| EngineError::selection(format!("template shape {} is gone", t.uid)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // 镜像
        let saved_transform = session.document().entity(&anchor)?.transform;
        let (was_mirrored_x, was_mirrored_y) = {
            let state = session.state(&anchor)?;
            (state.mirrored_x, state.mirrored_y)
        };
        let mut sx = if self.options.mirror_x { mirror_x.signum() } else { 1.0 };
        let mut sy = if self.options.mirror_y { mirror_y.signum() } else { 1.0 };
        if self.options.mirror_x && was_mirrored_x {
            sx = -sx;
        }
        if self.options.mirror_y && was_mirrored_y {
            sy = -sy;
        }
        let mirrored = sx < 0.0 || sy < 0.0;
        if mirrored {
            let center = session.state(&anchor)?.position;
            session
                .document
                .transform_entity(&anchor, &Transform2D::scale_around(center, sx, sy))?;
            session.set_mirror_state(&anchor, was_mirrored_x ^ (sx < 0.0), was_mirrored_y ^ (sy < 0.0))?;
            session.update_shape(&anchor)?;
        }
        let (anchor_mirrored_x, anchor_mirrored_y) = {
            let state = session.state(&anchor)?;
            (state.mirrored_x, state.mirrored_y)
        };

        // 放置新形状
        let frame = session.document().entity(&anchor)?.transform.then(&self.placement);
        let mut produced: Vec<EntityId> = Vec::with_capacity(sources.len());
        for (template, source) in self.templates.iter().zip(&sources) {
            let (template_x, template_y) = {
                let state = session.state(source)?;
                (state.mirrored_x, state.mirrored_y)
            };
            let copy = session.document.copy_entity(source)?;
            session.document.set_transform(&copy, frame.then(&template.local))?;
            session.initialize_shape(copy)?;
            session.set_mirror_state(&copy, template_x ^ anchor_mirrored_x, template_y ^ anchor_mirrored_y)?;
            produced.push(copy);
        }

        // 合法性检查
        let rejection = if self.options.disable_overlap && self.overlaps(session, originals, &produced) {
            Some(Rejection::Overlap)
        } else if produced
            .iter()
            .any(|n| session.registry().state(n).is_some_and(|s| !session.geometry().state_inside(s)))
        {
            Some(Rejection::OutsideBoundary)
        } else {
            None
        };

        if let Some(reason) = rejection {
            for n in &produced {
                session.remove_shape(n);
            }
            if mirrored {
                session.document.set_transform(&anchor, saved_transform)?;
                session.set_mirror_state(&anchor, was_mirrored_x, was_mirrored_y)?;
                session.update_shape(&anchor)?;
            }
            if mark_rule {
                for original in originals {
                    session.mark_rule(original, &self.id)?;
                }
            }
            session.last_failed = Some(originals.to_vec());
            debug!("Rule {} rejected on {}: {:?}", self.id, anchor, reason);
            return Ok(ApplyOutcome::Rejected(reason));
        }

        if mark_rule {
            for original in originals {
                session.mark_rule(original, &self.id)?;
            }
        }

        // 与原始形状相同的新形状视为原地保留
        let mut remaining = produced.clone();
        let mut redundant = 0usize;
        let mut kept_originals = Vec::new();
        let mut erase = Vec::new();
        for original in originals {
            let original_state = session.state(original)?.clone();
            let twin = remaining.iter().position(|n| {
                session
                    .registry()
                    .state(n)
                    .is_some_and(|s| identical(s, &original_state))
            });
            match twin {
                Some(i) => {
                    let n = remaining.remove(i);
                    session.remove_shape(&n);
                    redundant += 1;
                    kept_originals.push(*original);
                    session.last_failed = Some(originals.to_vec());
                }
                None => erase.push(*original),
            }
        }
        for original in &erase {
            session.remove_shape(original);
        }

        // 去除与现有解形状重复的新形状
        let mut kept = Vec::new();
        for n in remaining {
            let state = session.state(&n)?.clone();
            let duplicate = session
                .registry()
                .solution()
                .iter()
                .filter(|other| **other != n)
                .filter_map(|other| session.registry().state(other))
                .any(|other| identical(other, &state));
            if duplicate {
                session.remove_shape(&n);
                redundant += 1;
            } else {
                kept.push(n);
            }
        }

        if redundant == produced.len() {
            debug!("Rule {} produced nothing new on {}", self.id, anchor);
            return Ok(ApplyOutcome::NoOp);
        }

        kept.extend(kept_originals);
        debug!("Rule {} replaced {:?} with {:?}", self.id, erase, kept);
        Ok(ApplyOutcome::Applied(kept))
    }

    fn overlaps(&self, session: &Session, originals: &[EntityId], produced: &[EntityId]) -> bool {
        let exclude: Vec<EntityId> = originals.iter().chain(produced).copied().collect();
        produced.iter().any(|n| {
            session
                .registry()
                .state(n)
                .is_some_and(|s| session.overlaps_solution(&s.points, &exclude))
        })
    }
}

/// 获取指定种类的注册状态
fn expect_kind<'a>(registry: &'a Registry, id: &EntityId, kind: EntityKind) -> Result<&'a ShapeState, EngineError> {
    let state = registry.try_state(id)?;
    if state.kind != kind {
        return Err(EngineError::selection(format!("{id} is not a {kind:?}")));
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use isg_core::math::{snap_point, Point2};

    const ORIGIN: (f64, f64) = (5.0, 5.0);
    const ORIGIN_NEW: (f64, f64) = (8.0, 5.0);

    struct Setup {
        session: Session,
        origin: EntityId,
        source: Vec<EntityId>,
        origin_new: EntityId,
        new: Vec<EntityId>,
    }

    /// 在单位边界内放置种子形状，并在规则库中按相对原点标记的偏移放置模板
    fn setup(mut fixture: Fixture, seeds: &[(f64, f64)], source: &[(f64, f64)], new: &[(f64, f64)]) -> (Setup, Vec<EntityId>) {
        let seeds: Vec<EntityId> = seeds.iter().map(|(x, y)| fixture.place("Small", *x, *y)).collect();
        let origin = fixture.library("Origin", ORIGIN.0, ORIGIN.1);
        let source: Vec<EntityId> = source
            .iter()
            .map(|(dx, dy)| fixture.library("Small", ORIGIN.0 + dx, ORIGIN.1 + dy))
            .collect();
        let origin_new = fixture.library("Origin", ORIGIN_NEW.0, ORIGIN_NEW.1);
        let new: Vec<EntityId> = new
            .iter()
            .map(|(dx, dy)| fixture.library("Small", ORIGIN_NEW.0 + dx, ORIGIN_NEW.1 + dy))
            .collect();

        let mut session = fixture.session();
        for id in seeds.iter().chain(&source).chain(&new) {
            session.initialize_shape(*id).unwrap();
        }
        session.initialize_marker(origin).unwrap();
        session.initialize_marker(origin_new).unwrap();

        (
            Setup {
                session,
                origin,
                source,
                origin_new,
                new,
            },
            seeds,
        )
    }

    fn define(setup: &Setup, options: ReplaceOptions) -> ReplaceRule {
        ReplaceRule::define(
            &setup.session,
            "R1",
            setup.origin,
            &setup.source,
            setup.origin_new,
            &setup.new,
            options,
        )
        .unwrap()
    }

    fn positions(session: &Session, ids: &[EntityId]) -> Vec<Point2> {
        ids.iter().map(|id| session.state(id).unwrap().position).collect()
    }

    #[test]
    fn test_replace_places_new_shapes_at_original() {
        let (mut s, seeds) = setup(Fixture::with_boundary(1.0, 1.0), &[(0.5, 0.5)], &[(0.0, 0.0)], &[(-0.3, 0.0), (0.3, 0.0)]);
        let rule = define(&s, ReplaceOptions::default());

        let outcome = rule.apply_rule(&mut s.session, false, &seeds, 1.0, 1.0).unwrap();
        let ApplyOutcome::Applied(new_shapes) = outcome else {
            panic!("expected the rule to apply, got {outcome:?}");
        };

        assert_eq!(
            positions(&s.session, &new_shapes),
            vec![snap_point(&Point2::new(0.2, 0.5)), snap_point(&Point2::new(0.8, 0.5))]
        );
        assert!(!s.session.registry().is_registered(&seeds[0]));
        assert!(!s.session.document().contains(&seeds[0]));
        assert_eq!(s.session.registry().solution(), new_shapes.as_slice());
    }

    #[test]
    fn test_outside_boundary_is_rejected_and_undone() {
        let (mut s, seeds) = setup(Fixture::with_boundary(1.0, 1.0), &[(0.5, 0.5)], &[(0.0, 0.0)], &[(0.6, 0.0)]);
        let rule = define(&s, ReplaceOptions::default());
        let count = s.session.document().entity_count();

        let outcome = rule.apply_rule(&mut s.session, true, &seeds, 1.0, 1.0).unwrap();

        assert_eq!(outcome, ApplyOutcome::Rejected(Rejection::OutsideBoundary));
        assert_eq!(s.session.document().entity_count(), count);
        assert_eq!(s.session.registry().solution(), seeds.as_slice());
        assert!(s.session.registry().has_rule(&seeds[0], "R1"));
        assert_eq!(s.session.take_last_failed(), Some(seeds.clone()));
    }

    #[test]
    fn test_identity_rule_is_noop_and_marks_once() {
        let (mut s, seeds) = setup(Fixture::with_boundary(1.0, 1.0), &[(0.5, 0.5)], &[(0.0, 0.0)], &[(0.0, 0.0)]);
        let rule = define(&s, ReplaceOptions::default());

        for _ in 0..2 {
            let outcome = rule.apply_rule(&mut s.session, true, &seeds, 1.0, 1.0).unwrap();
            assert_eq!(outcome, ApplyOutcome::NoOp);
            assert_eq!(s.session.registry().solution(), seeds.as_slice());
            assert_eq!(s.session.take_last_failed(), Some(seeds.clone()));
        }

        let state = s.session.state(&seeds[0]).unwrap();
        assert_eq!(state.rules_applied.len(), 1);
        assert!(state.rules_applied.contains("R1"));
    }

    #[test]
    fn test_duplicate_of_existing_shape_is_noop() {
        // 新形状落在已有的解形状上
        let (mut s, seeds) = setup(Fixture::with_boundary(1.0, 1.0), &[(0.5, 0.5), (0.8, 0.5)], &[(0.0, 0.0)], &[(0.3, 0.0)]);
        let rule = define(&s, ReplaceOptions::default());
        let outcome = rule.apply_rule(&mut s.session, false, &seeds[..1], 1.0, 1.0).unwrap();

        // 原始形状已被替换，但没有产生新的不同形状
        assert_eq!(outcome, ApplyOutcome::NoOp);
        assert_eq!(s.session.registry().solution(), &seeds[1..]);
    }

    #[test]
    fn test_overlap_is_rejected_when_disabled() {
        let (mut s, seeds) = setup(Fixture::with_boundary(1.0, 1.0), &[(0.3, 0.5), (0.7, 0.5)], &[(0.0, 0.0)], &[(0.3, 0.0)]);
        let rule = define(
            &s,
            ReplaceOptions {
                disable_overlap: true,
                ..Default::default()
            },
        );

        let outcome = rule.apply_rule(&mut s.session, false, &seeds[..1], 1.0, 1.0).unwrap();
        assert_eq!(outcome, ApplyOutcome::Rejected(Rejection::Overlap));
        assert_eq!(s.session.registry().solution(), seeds.as_slice());
    }

    #[test]
    fn test_mirror_flips_layout() {
        let (mut s, seeds) = setup(Fixture::with_boundary(1.0, 1.0), &[(0.5, 0.5)], &[(0.0, 0.0)], &[(0.3, 0.0)]);
        let rule = define(
            &s,
            ReplaceOptions {
                mirror_x: true,
                ..Default::default()
            },
        );

        let ApplyOutcome::Applied(new_shapes) = rule.apply_rule(&mut s.session, false, &seeds, -1.0, 1.0).unwrap() else {
            panic!("expected the rule to apply");
        };

        assert_eq!(positions(&s.session, &new_shapes), vec![snap_point(&Point2::new(0.2, 0.5))]);
        let state = s.session.state(&new_shapes[0]).unwrap();
        assert!(state.mirrored_x);
        assert!(!state.mirrored_y);
    }

    #[test]
    fn test_rejected_original_fits_when_mirrored() {
        let (mut s, seeds) = setup(Fixture::with_boundary(1.0, 1.0), &[(0.8, 0.5)], &[(0.0, 0.0)], &[(0.3, 0.0)]);
        let rule = define(
            &s,
            ReplaceOptions {
                mirror_x: true,
                ..Default::default()
            },
        );

        let outcome = rule.apply_rule(&mut s.session, false, &seeds, 1.0, 1.0).unwrap();
        assert_eq!(outcome, ApplyOutcome::Rejected(Rejection::OutsideBoundary));
        assert!(!s.session.registry().has_rule(&seeds[0], "R1"));
        let failed = s.session.take_last_failed().unwrap();
        assert_eq!(failed, seeds);

        let ApplyOutcome::Applied(new_shapes) = rule.apply_rule(&mut s.session, true, &failed, -1.0, 1.0).unwrap() else {
            panic!("expected the mirrored application to fit");
        };
        assert_eq!(positions(&s.session, &new_shapes), vec![snap_point(&Point2::new(0.5, 0.5))]);
        assert!(!s.session.registry().is_registered(&seeds[0]));
    }

    #[test]
    fn test_pair_pattern_candidates_and_check() {
        let (mut s, seeds) = setup(
            Fixture::with_boundary(2.0, 1.0),
            &[(0.5, 0.5), (0.9, 0.5), (1.5, 0.5)],
            &[(0.0, 0.0), (0.4, 0.0)],
            &[(0.2, 0.0)],
        );
        let rule = define(&s, ReplaceOptions::default());

        assert_eq!(rule.collect_candidate_shapes(&mut s.session), Some(vec![seeds[0], seeds[1]]));
        assert_eq!(rule.check_rule(&s.session, &[seeds[1], seeds[0]]), Some(vec![seeds[0], seeds[1]]));
        assert_eq!(rule.check_rule(&s.session, &[seeds[1], seeds[2]]), None);
        assert_eq!(rule.check_rule(&s.session, &seeds[..1]), None);
    }

    #[test]
    fn test_define_rejects_bad_selection() {
        let (s, _) = setup(Fixture::new(), &[], &[(0.0, 0.0)], &[(0.0, 0.0)]);
        let result = ReplaceRule::define(
            &s.session,
            "R1",
            s.source[0],
            &s.source,
            s.origin_new,
            &s.new,
            ReplaceOptions::default(),
        );
        assert!(matches!(result, Err(EngineError::InvalidSelection(_))));

        let result = ReplaceRule::define(&s.session, "R1", s.origin, &s.source, s.origin_new, &[], ReplaceOptions::default());
        assert!(matches!(result, Err(EngineError::InvalidSelection(_))));
    }
}
