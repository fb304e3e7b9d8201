//! 拉伸规则
//!
//! 在允许的坐标轴上绕形状中心做非均匀缩放，缩放系数由 0~10 的因子
//! 线性映射到 `[min_stretch, max_stretch]`。每个形状只拉伸一次。

use super::merge::check_definitions;
use super::{ApplyOutcome, Rejection, RuleId};
use crate::error::EngineError;
use crate::record::RuleRecord;
use crate::session::Session;
use isg_core::entity::EntityId;
use isg_core::transform::Transform2D;
use tracing::debug;

/// 因子上限
pub const FACTOR_MAX: f64 = 10.0;

/// 拉伸规则参数
#[derive(Debug, Clone, PartialEq)]
pub struct StretchOptions {
    pub stretch_x: bool,
    pub stretch_y: bool,
    pub min_stretch: f64,
    pub max_stretch: f64,
    /// 可拉伸的定义
    pub definitions: Vec<String>,
    /// 拉伸后不得与其他解形状重叠
    pub constrain_connecting: bool,
}

/// 拉伸规则
#[derive(Debug, Clone)]
pub struct StretchRule {
    id: RuleId,
    options: StretchOptions,
}

impl StretchRule {
    pub fn define(session: &Session, id: &str, options: StretchOptions) -> Result<Self, EngineError> {
        if !options.stretch_x && !options.stretch_y {
            return Err(EngineError::selection("a stretch rule needs at least one axis"));
        }
        if !(options.min_stretch > 0.0 && options.max_stretch >= options.min_stretch && options.max_stretch.is_finite()) {
            return Err(EngineError::selection(format!(
                "invalid stretch range {}..{}",
                options.min_stretch, options.max_stretch
            )));
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
        RuleRecord::Stretch {
            stretch_x: self.options.stretch_x,
            stretch_y: self.options.stretch_y,
            min_stretch: self.options.min_stretch,
            max_stretch: self.options.max_stretch,
            definitions: self.options.definitions.clone(),
            constrain_connecting: self.options.constrain_connecting,
        }
    }

    /// 因子（0~10）对应的缩放系数
    pub fn scale_for(&self, factor: f64) -> f64 {
        let t = factor.clamp(0.0, FACTOR_MAX) / FACTOR_MAX;
        self.options.min_stretch + (self.options.max_stretch - self.options.min_stretch) * t
    }

    /// 随机选取一个尚未拉伸过的合格解形状
    pub fn collect_candidate_shapes(&self, session: &mut Session) -> Option<EntityId> {
        let candidates: Vec<EntityId> = session
            .registry()
            .solution_instances_of(&self.options.definitions)
            .into_iter()
            .filter(|id| !session.registry().has_rule(id, &self.id))
            .collect();
        session.choose(&candidates)
    }

    /// 选择集是否为单个合格的解形状
    pub fn check_rule(&self, session: &Session, selection: &[EntityId]) -> Option<EntityId> {
        match selection {
            [shape] if session
                .registry()
                .solution_instances_of(&self.options.definitions)
                .contains(shape) =>
            {
                Some(*shape)
            }
            _ => None,
        }
    }

    /// 拉伸形状
    ///
    /// 越界（或在要求时与其他形状重叠）时恢复原变换并返回拒绝。
    pub fn apply_rule(
        &self,
        session: &mut Session,
        shape: &EntityId,
        factor_x: f64,
        factor_y: f64,
    ) -> Result<ApplyOutcome, EngineError> {
        let saved = session.document().entity(shape)?.transform;
        let center = session.state(shape)?.position;
        let sx = if self.options.stretch_x { self.scale_for(factor_x) } else { 1.0 };
        let sy = if self.options.stretch_y { self.scale_for(factor_y) } else { 1.0 };

        session
            .document
            .transform_entity(shape, &Transform2D::scale_around(center, sx, sy))?;
        session.update_shape(shape)?;

        let state = session.state(shape)?;
        let rejection = if !session.geometry().state_inside(state) {
            Some(Rejection::OutsideBoundary)
        } else if self.options.constrain_connecting && session.overlaps_solution(&state.points, &[*shape]) {
            Some(Rejection::Overlap)
        } else {
            None
        };

        if let Some(reason) = rejection {
            session.document.set_transform(shape, saved)?;
            session.update_shape(shape)?;
            debug!("Rule {} rejected stretching {}: {:?}", self.id, shape, reason);
            return Ok(ApplyOutcome::Rejected(reason));
        }

        session.mark_rule(shape, &self.id)?;
        debug!("Rule {} stretched {} by ({}, {})", self.id, shape, sx, sy);
        Ok(ApplyOutcome::Applied(vec![*shape]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use isg_core::math::approx_eq;

    fn options(constrain_connecting: bool) -> StretchOptions {
        StretchOptions {
            stretch_x: true,
            stretch_y: false,
            min_stretch: 1.0,
            max_stretch: 2.0,
            definitions: vec!["Square".to_string()],
            constrain_connecting,
        }
    }

    fn session_with(squares: &[(f64, f64)]) -> (Session, Vec<EntityId>) {
        let mut fixture = Fixture::new();
        let ids: Vec<EntityId> = squares.iter().map(|(x, y)| fixture.square_at(*x, *y)).collect();
        let mut session = fixture.session();
        for id in &ids {
            session.initialize_shape(*id).unwrap();
        }
        (session, ids)
    }

    #[test]
    fn test_factor_mapping() {
        let (session, _) = session_with(&[]);
        let rule = StretchRule::define(&session, "S1", options(false)).unwrap();

        assert!(approx_eq(rule.scale_for(0.0), 1.0));
        assert!(approx_eq(rule.scale_for(5.0), 1.5));
        assert!(approx_eq(rule.scale_for(10.0), 2.0));
        assert!(approx_eq(rule.scale_for(42.0), 2.0));
    }

    #[test]
    fn test_stretch_inside_boundary() {
        let (mut session, ids) = session_with(&[(1.0, 1.0)]);
        let rule = StretchRule::define(&session, "S1", options(false)).unwrap();

        let outcome = rule.apply_rule(&mut session, &ids[0], 10.0, 10.0).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied(vec![ids[0]]));

        let bounds = session.document().world_bounds(&ids[0]).unwrap();
        assert!(approx_eq(bounds.width(), 2.0));
        assert!(approx_eq(bounds.height(), 1.0));
        assert!(session.registry().has_rule(&ids[0], "S1"));
        assert_eq!(rule.collect_candidate_shapes(&mut session), None);
    }

    #[test]
    fn test_stretch_outside_boundary_is_restored() {
        let (mut session, ids) = session_with(&[(3.0, 1.0)]);
        let rule = StretchRule::define(&session, "S1", options(false)).unwrap();
        let before = session.state(&ids[0]).unwrap().clone();

        let outcome = rule.apply_rule(&mut session, &ids[0], 10.0, 0.0).unwrap();

        assert_eq!(outcome, ApplyOutcome::Rejected(Rejection::OutsideBoundary));
        assert_eq!(session.state(&ids[0]).unwrap(), &before);
    }

    #[test]
    fn test_constrain_connecting_rejects_overlap() {
        let (mut session, ids) = session_with(&[(1.0, 1.0), (2.0, 1.0)]);
        let free = StretchRule::define(&session, "S1", options(false)).unwrap();
        let constrained = StretchRule::define(&session, "S2", options(true)).unwrap();

        let outcome = constrained.apply_rule(&mut session, &ids[0], 10.0, 0.0).unwrap();
        assert_eq!(outcome, ApplyOutcome::Rejected(Rejection::Overlap));

        let outcome = free.apply_rule(&mut session, &ids[0], 10.0, 0.0).unwrap();
        assert!(outcome.is_applied());
    }

    #[test]
    fn test_check_rule() {
        let (session, ids) = session_with(&[(1.0, 1.0), (2.0, 1.0)]);
        let rule = StretchRule::define(&session, "S1", options(false)).unwrap();

        assert_eq!(rule.check_rule(&session, &ids[..1]), Some(ids[0]));
        assert_eq!(rule.check_rule(&session, &ids), None);
    }
}
