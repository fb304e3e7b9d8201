//! 控制器
//!
//! 控制器绑定一个边界，拥有会话与规则集，负责：
//! - 初始化：确定边界、扫描场景中的形状与标记、清理失效规则、重建规则
//! - 规则定义：从选取的模板实体定义替换、合并、拉伸规则
//! - 迭代生成：随机选择规则并反复应用，直到次数、超时或候选耗尽

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generation::{GenerationReport, StopReason};
use crate::geometry::Geometry;
use crate::record;
use crate::registry::EntityKind;
use crate::rules::merge::MergeOptions;
use crate::rules::replace::ReplaceOptions;
use crate::rules::stretch::StretchOptions;
use crate::rules::{ApplyOutcome, MergeRule, ReplaceRule, Rule, RuleId, StretchRule};
use crate::session::Session;
use crate::uid::Uid;
use isg_core::entity::EntityId;
use isg_file::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 选取结果所在的模型属性字典
pub const PICKS_DICTIONARY: &str = "IterativeSG Picks";

const PICK_ORIGINAL: &str = "original";
const PICK_NEW: &str = "new";

/// 一次选取：一个原点标记加上若干形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub origin: Uid,
    pub shapes: Vec<Uid>,
}

/// 控制器
#[derive(Debug)]
pub struct Controller {
    session: Session,
    rules: BTreeMap<RuleId, Rule>,
    boundary: EntityId,
}

impl Controller {
    /// 初始化控制器
    ///
    /// 未指定边界时使用边界图层上唯一的实体。
    pub fn initialize(
        mut document: Document,
        boundary: Option<EntityId>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        for layer in [
            &config.solution_layer,
            &config.rules_layer,
            &config.boundary_layer,
            &config.hidden_layer,
        ] {
            document.ensure_layer(layer);
        }

        let boundary = match boundary {
            Some(id) => {
                document.entity(&id)?;
                id
            }
            None => {
                let candidates = document.entities_on_layer(&config.boundary_layer);
                match candidates.as_slice() {
                    [] => return Err(EngineError::NoBoundary),
                    [id] => *id,
                    _ => return Err(EngineError::AmbiguousBoundary(candidates.len())),
                }
            }
        };
        let geometry = Geometry::initialize(&document, &boundary)?;

        let mut controller = Self {
            session: Session::new(document, geometry, config),
            rules: BTreeMap::new(),
            boundary,
        };
        controller.scan()?;
        controller.cleanup_rules();
        controller.load_rules();

        info!(
            "Initialized with boundary {}: {} shapes, {} markers, {} in solution, {} rules",
            boundary,
            controller.session.registry().shapes().len(),
            controller.session.registry().markers().len(),
            controller.session.registry().solution().len(),
            controller.rules.len()
        );
        Ok(controller)
    }

    /// 注册场景中已有的实体：先形状，后标记
    fn scan(&mut self) -> Result<(), EngineError> {
        let mut shapes = Vec::new();
        let mut markers = Vec::new();
        for id in self.session.document().entity_ids() {
            if id == self.boundary {
                continue;
            }
            match self.session.document().definition_of(&id) {
                Ok(definition) if definition.is_marker() => markers.push(id),
                Ok(_) => shapes.push(id),
                Err(e) => warn!("Skipping entity {}: {}", id, e),
            }
        }
        for id in shapes {
            self.session.initialize_shape(id)?;
        }
        for id in markers {
            self.session.initialize_marker(id)?;
        }
        Ok(())
    }

    /// 删除引用了不存在的实体或定义的规则记录，返回被删除的规则名
    pub fn cleanup_rules(&mut self) -> Vec<RuleId> {
        let mut purged = Vec::new();
        for (name, record) in record::load_all(self.session.document()) {
            let missing_uid = record
                .uids()
                .into_iter()
                .find(|uid| !self.session.registry().contains_uid(uid))
                .map(|uid| format!("UID {uid}"));
            let missing_definition = record
                .definitions()
                .iter()
                .find(|d| self.session.document().definition(d).is_none())
                .map(|d| format!("definition '{d}'"));

            if let Some(missing) = missing_uid.or(missing_definition) {
                warn!("Removing rule '{}': {} no longer exists", name, missing);
                record::purge(&mut self.session.document, &name);
                self.rules.remove(&name);
                purged.push(name);
            }
        }
        purged
    }

    /// 从持久化记录重建规则
    fn load_rules(&mut self) {
        for (name, record) in record::load_all(self.session.document()) {
            match Rule::from_record(&self.session, &name, &record) {
                Ok(rule) => {
                    debug!("Loaded {} rule '{}'", rule.kind_name(), name);
                    self.rules.insert(name, rule);
                }
                Err(e) => warn!("Could not rebuild rule '{}': {}", name, e),
            }
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn document(&self) -> &Document {
        self.session.document()
    }

    pub fn boundary(&self) -> EntityId {
        self.boundary
    }

    pub fn rules(&self) -> &BTreeMap<RuleId, Rule> {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Result<&Rule, EngineError> {
        self.rules
            .get(id)
            .ok_or_else(|| EngineError::RuleNotFound(id.to_string()))
    }

    /// 保存到文档当前的文件路径
    pub fn save(&mut self) -> Result<(), EngineError> {
        Ok(self.session.document.save()?)
    }

    pub fn into_document(self) -> Document {
        self.session.into_document()
    }

    // ---------------------------------------------------------------------
    // 规则定义
    // ---------------------------------------------------------------------

    /// 第一个未被占用的默认规则名
    pub fn generate_rule_name(&self) -> RuleId {
        (1..)
            .map(|n| format!("Rule {n}"))
            .find(|name| !self.rules.contains_key(name))
            .unwrap_or_default()
    }

    fn claim_rule_name(&self, name: Option<&str>, overwrite: bool) -> Result<RuleId, EngineError> {
        let id = match name {
            Some(name) => name.trim().to_string(),
            None => self.generate_rule_name(),
        };
        if id.is_empty() {
            return Err(EngineError::selection("rule name must not be empty"));
        }
        if self.rules.contains_key(&id) && !overwrite {
            return Err(EngineError::RuleAlreadyExists(id));
        }
        Ok(id)
    }

    fn insert_rule(&mut self, rule: Rule) -> Result<RuleId, EngineError> {
        let id = rule.id().to_string();
        record::store(&mut self.session.document, &id, &rule.record())?;
        info!("Defined {} rule '{}'", rule.kind_name(), id);
        self.rules.insert(id.clone(), rule);
        Ok(id)
    }

    /// 把选择集分成一个标记和若干形状
    fn classify(&self, selection: &[EntityId]) -> Result<Pick, EngineError> {
        let mut origin = None;
        let mut shapes = Vec::new();
        for id in selection {
            let state = self.session.state(id)?;
            match state.kind {
                EntityKind::Marker if origin.is_none() => origin = Some(state.uid.clone()),
                EntityKind::Marker => return Err(EngineError::selection("select exactly one origin marker")),
                EntityKind::Shape => shapes.push(state.uid.clone()),
            }
        }
        let origin = origin.ok_or_else(|| EngineError::selection("select exactly one origin marker"))?;
        if shapes.is_empty() {
            return Err(EngineError::selection("select at least one shape"));
        }
        Ok(Pick { origin, shapes })
    }

    fn store_pick(&mut self, key: &str, pick: &Pick) -> Result<(), EngineError> {
        self.session
            .document
            .set_attribute(PICKS_DICTIONARY, key, serde_json::to_value(pick)?);
        Ok(())
    }

    fn stored_pick(&self, key: &str) -> Result<Pick, EngineError> {
        let value = self
            .session
            .document()
            .attribute(PICKS_DICTIONARY, key)
            .ok_or_else(|| EngineError::selection(format!("no {key} shapes picked")))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// 选取规则的原始形状：一个原点标记加一到两个形状
    pub fn pick_original_shape(&mut self, selection: &[EntityId]) -> Result<Pick, EngineError> {
        let pick = self.classify(selection)?;
        if pick.shapes.len() > 2 {
            return Err(EngineError::selection("pick one or two original shapes"));
        }
        self.store_pick(PICK_ORIGINAL, &pick)?;
        Ok(pick)
    }

    /// 选取规则的新形状：一个原点标记加至少一个形状
    pub fn pick_new_shape(&mut self, selection: &[EntityId]) -> Result<Pick, EngineError> {
        let pick = self.classify(selection)?;
        self.store_pick(PICK_NEW, &pick)?;
        Ok(pick)
    }

    /// 由已选取的原始形状与新形状定义替换规则
    pub fn define_replace_rule(
        &mut self,
        name: Option<&str>,
        options: ReplaceOptions,
        overwrite: bool,
    ) -> Result<RuleId, EngineError> {
        let id = self.claim_rule_name(name, overwrite)?;
        let original = self.stored_pick(PICK_ORIGINAL)?;
        let new = self.stored_pick(PICK_NEW)?;

        let registry = self.session.registry();
        let resolve = |uid: &Uid| {
            registry
                .resolve(uid)
                .ok_or_else(|| EngineError::selection(format!("picked shape {uid} no longer exists")))
        };
        let origin = resolve(&original.origin)?;
        let shapes = original.shapes.iter().map(resolve).collect::<Result<Vec<_>, _>>()?;
        let origin_new = resolve(&new.origin)?;
        let shapes_new = new.shapes.iter().map(resolve).collect::<Result<Vec<_>, _>>()?;

        let rule = ReplaceRule::define(&self.session, &id, origin, &shapes, origin_new, &shapes_new, options)?;

        for template in std::iter::once(&origin)
            .chain(&shapes)
            .chain(std::iter::once(&origin_new))
            .chain(&shapes_new)
        {
            self.session.move_to_rules_layer(template)?;
        }
        self.session.document.delete_attribute_dictionary(PICKS_DICTIONARY);

        self.insert_rule(Rule::Replace(rule))
    }

    /// 定义合并规则
    pub fn define_merge_rule(
        &mut self,
        name: Option<&str>,
        options: MergeOptions,
        overwrite: bool,
    ) -> Result<RuleId, EngineError> {
        let id = self.claim_rule_name(name, overwrite)?;
        let rule = MergeRule::define(&self.session, &id, options)?;
        self.insert_rule(Rule::Merge(rule))
    }

    /// 定义拉伸规则
    pub fn define_stretch_rule(
        &mut self,
        name: Option<&str>,
        options: StretchOptions,
        overwrite: bool,
    ) -> Result<RuleId, EngineError> {
        let id = self.claim_rule_name(name, overwrite)?;
        let rule = StretchRule::define(&self.session, &id, options)?;
        self.insert_rule(Rule::Stretch(rule))
    }

    // ---------------------------------------------------------------------
    // 单次应用与撤销
    // ---------------------------------------------------------------------

    /// 对选择集应用一条规则
    ///
    /// `factors` 只用于拉伸规则，取值范围 0~10。
    pub fn apply_rule_to_selection(
        &mut self,
        rule_id: &str,
        selection: &[EntityId],
        factors: (f64, f64),
    ) -> Result<ApplyOutcome, EngineError> {
        let rule = self
            .rules
            .get(rule_id)
            .ok_or_else(|| EngineError::RuleNotFound(rule_id.to_string()))?;
        let incompatible = || EngineError::selection(format!("selection does not match rule '{rule_id}'"));

        match rule {
            Rule::Replace(r) => {
                let originals = r.check_rule(&self.session, selection).ok_or_else(incompatible)?;
                r.apply_rule(&mut self.session, true, &originals, 1.0, 1.0)
            }
            Rule::Merge(r) => {
                let shapes = r.check_rule(&self.session, selection).ok_or_else(incompatible)?;
                let merged = r.apply_rule(&mut self.session, &shapes)?;
                Ok(ApplyOutcome::Applied(vec![merged]))
            }
            Rule::Stretch(r) => {
                let shape = r.check_rule(&self.session, selection).ok_or_else(incompatible)?;
                r.apply_rule(&mut self.session, &shape, factors.0, factors.1)
            }
        }
    }

    /// 撤销产生该形状的规则应用，返回被恢复的形状
    pub fn undo_rule(&mut self, shape: &EntityId) -> Result<Vec<EntityId>, EngineError> {
        if self.session.state(shape)?.applied_by_rule.is_none() {
            return Err(EngineError::selection(format!(
                "{shape} was not produced by a reversible rule"
            )));
        }
        MergeRule::remove_rule(&mut self.session, shape)
    }

    /// 清空解：删除解集合中的形状以及被合并隐藏的形状，返回删除数量
    pub fn reset(&mut self) -> Result<usize, EngineError> {
        let hidden_layer = self.session.config().hidden_layer.clone();
        let mut doomed: Vec<EntityId> = self.session.registry().solution().to_vec();
        doomed.extend(
            self.session
                .document()
                .entities_on_layer(&hidden_layer)
                .into_iter()
                .filter(|id| self.session.registry().is_registered(id)),
        );
        for id in &doomed {
            self.session.remove_shape(id);
        }
        self.session.last_failed = None;
        info!("Reset removed {} shapes", doomed.len());
        Ok(doomed.len())
    }

    // ---------------------------------------------------------------------
    // 迭代生成
    // ---------------------------------------------------------------------

    /// 迭代生成设计
    ///
    /// 每轮从规则池中随机选一条规则并尝试应用。找不到候选形状的替换和拉伸规则
    /// 会被移出本次的规则池；合并规则找不到候选时整次生成结束。
    /// 应用时出错的规则记录警告后同样移出规则池。每轮开始时检查超时。
    pub fn generate_design(
        &mut self,
        num_applications: usize,
        rule_ids: &[RuleId],
        timeout: Duration,
    ) -> Result<GenerationReport, EngineError> {
        if let Some(unknown) = rule_ids.iter().find(|id| !self.rules.contains_key(*id)) {
            return Err(EngineError::RuleNotFound(unknown.clone()));
        }
        let mut pool: Vec<RuleId> = Vec::with_capacity(rule_ids.len());
        for id in rule_ids {
            if !pool.contains(id) {
                pool.push(id.clone());
            }
        }

        let start = Instant::now();
        let mut remaining = num_applications;
        let mut applied = 0usize;
        let mut stop = StopReason::Completed;

        while remaining > 0 {
            if start.elapsed() >= timeout {
                stop = StopReason::TimedOut;
                break;
            }
            if pool.is_empty() {
                stop = StopReason::PoolExhausted;
                break;
            }

            let index = self.session.random_index(pool.len());
            let Some(rule) = self.rules.get(&pool[index]) else {
                pool.remove(index);
                continue;
            };

            let attempt = match rule {
                Rule::Replace(r) => {
                    let Some(candidates) = r.collect_candidate_shapes(&mut self.session) else {
                        debug!("Rule '{}' has no candidates left", r.id());
                        pool.remove(index);
                        continue;
                    };
                    let mirror_x = self.session.random_sign();
                    let mirror_y = self.session.random_sign();
                    try_replace(r, &mut self.session, &candidates, mirror_x, mirror_y)
                }
                Rule::Merge(r) => {
                    let Some(shapes) = r.collect_candidate_shapes(&mut self.session, None, None) else {
                        stop = StopReason::MergeExhausted;
                        break;
                    };
                    r.apply_rule(&mut self.session, &shapes).map(|_| true)
                }
                Rule::Stretch(r) => {
                    let Some(shape) = r.collect_candidate_shapes(&mut self.session) else {
                        debug!("Rule '{}' has no candidates left", r.id());
                        pool.remove(index);
                        continue;
                    };
                    let factor_x = self.session.random_factor();
                    let factor_y = self.session.random_factor();
                    try_stretch(r, &mut self.session, &shape, factor_x, factor_y)
                }
            };

            let success = match attempt {
                Ok(success) => success,
                Err(e) => {
                    warn!("Dropping rule '{}' from this run: {}", pool[index], e);
                    pool.remove(index);
                    continue;
                }
            };

            if success {
                remaining -= 1;
                applied += 1;
            }
        }

        let report = GenerationReport {
            requested: num_applications,
            applied,
            elapsed: start.elapsed(),
            stop,
        };
        info!("Generation finished: {}", report);
        Ok(report)
    }
}

/// 应用一次替换规则；失败时对同一原始形状反转镜像方向重试一次，并标记该形状
fn try_replace(
    rule: &ReplaceRule,
    session: &mut Session,
    candidates: &[EntityId],
    mirror_x: f64,
    mirror_y: f64,
) -> Result<bool, EngineError> {
    let mut outcome = rule.apply_rule(session, false, candidates, mirror_x, mirror_y)?;
    if !outcome.is_applied() {
        if let Some(failed) = session.take_last_failed() {
            outcome = rule.apply_rule(session, true, &failed, -mirror_x, -mirror_y)?;
        }
    }
    Ok(outcome.is_applied())
}

/// 应用一次拉伸规则；失败的形状不再参与该规则
fn try_stretch(
    rule: &StretchRule,
    session: &mut Session,
    shape: &EntityId,
    factor_x: f64,
    factor_y: f64,
) -> Result<bool, EngineError> {
    let outcome = rule.apply_rule(session, shape, factor_x, factor_y)?;
    if !outcome.is_applied() {
        session.mark_rule(shape, rule.id())?;
    }
    Ok(outcome.is_applied())
}
