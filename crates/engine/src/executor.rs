//! Status engine execution loop.
//!
//! `Engine` drives one record through a [`StatusGraph`] for one trigger:
//! 1. Builds the substitution context for the current status.
//! 2. Walks the status items in order; an interactive item suspends the
//!    pass, an automatic one runs when its condition holds.
//! 3. A jump restarts the walk in the new status; no jump ends the pass.
//! 4. Recoverable failures go to the failure recorder and count as "no jump".
//!
//! The engine is synchronous and holds no per-record state; the host
//! serialises passes per record and persists the record afterwards.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use expr::Evaluator;
use providers::{Notifier, RoleDirectory, UserId};

use crate::actions::Effect;
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, SubstitutionContext};
use crate::failures::{FailureKind, FailureRecorder, FailureSite};
use crate::graph::StatusGraph;
use crate::jobs::AfterJob;
use crate::markers::{resolve_target, Destination};
use crate::models::{
    ActionItem, ActionKind, EditScope, EvolutionEntry, GlobalAction, GlobalTrigger, ItemId,
    JumpMode, MessageLevel, Record, Status, StatusId, TriggerOrigin,
};
use crate::roles::{ResolveError, RoleResolver};
use crate::{ConfigError, EngineError};

// ---------------------------------------------------------------------------
// Outcome of a pass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PassState {
    /// No item fired; the record waits in its status.
    Waiting,
    /// Stopped at an interactive item.
    Suspended { item: ItemId },
    /// Reached an endpoint status.
    Terminal,
    /// Cut short after too many transitions.
    HopLimit,
}

/// What a pass did. The record itself is mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassOutcome {
    pub status: StatusId,
    pub state: PassState,
    /// Transitions performed by this pass.
    pub hops: usize,
    /// Recoverable failures recorded during the pass.
    pub failures: usize,
    /// Work to enqueue once the record is saved.
    pub after_jobs: Vec<AfterJob>,
}

impl PassOutcome {
    pub fn is_terminal(&self) -> bool {
        self.state == PassState::Terminal
    }
}

/// An interactive item offered to the acting user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceItem {
    pub id: ItemId,
    pub kind: &'static str,
    pub label: Option<String>,
    pub require_confirmation: bool,
    pub confirmation_text: Option<String>,
    /// Editable fields; `None` means every field.
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayedMessage {
    pub item: ItemId,
    pub level: MessageLevel,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) evaluator: Evaluator,
    pub(crate) directory: Arc<dyn RoleDirectory>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) recorder: Arc<dyn FailureRecorder>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        directory: Arc<dyn RoleDirectory>,
        notifier: Arc<dyn Notifier>,
        recorder: Arc<dyn FailureRecorder>,
    ) -> Self {
        let evaluator = Evaluator::with_cache_capacity(
            config.catalogue(),
            expr::FunctionRegistry::with_builtins(),
            config.expression_cache_capacity,
        );
        Self {
            config,
            evaluator,
            directory,
            notifier,
            recorder,
        }
    }

    /// Replace the evaluator, e.g. to register host functions.
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn recorder(&self) -> &Arc<dyn FailureRecorder> {
        &self.recorder
    }

    /// Parse and validate a workflow definition against this engine's
    /// evaluator.
    pub fn load_workflow(&self, definition: &str) -> Result<StatusGraph, ConfigError> {
        StatusGraph::from_json(definition, &self.evaluator)
    }

    pub fn create_record(
        &self,
        graph: &StatusGraph,
        data: Map<String, Value>,
        submitter: Option<UserId>,
    ) -> Record {
        Record::new(graph.workflow(), data, submitter)
    }

    /// Automatic pass.
    ///
    /// # Errors
    /// Only when the record does not belong to the graph.
    #[instrument(skip_all, fields(workflow = graph.id(), record = %record.id))]
    pub fn run(
        &self,
        graph: &StatusGraph,
        record: &mut Record,
        exec: &ExecutionContext,
    ) -> Result<PassOutcome, EngineError> {
        let mut pass = Pass::new(self, graph, exec, record)?;
        pass.drive(record)?;
        Ok(pass.finish(record))
    }

    /// Fire an interactive item of the current status, then continue with
    /// an automatic pass.
    ///
    /// # Errors
    /// User-visible [`EngineError`]s; the record is untouched when one is
    /// returned.
    #[instrument(skip_all, fields(workflow = graph.id(), record = %record.id, item = item_id))]
    pub fn submit(
        &self,
        graph: &StatusGraph,
        record: &mut Record,
        item_id: &str,
        form: &Map<String, Value>,
        exec: &ExecutionContext,
    ) -> Result<PassOutcome, EngineError> {
        let mut pass = Pass::new(self, graph, exec, record)?;
        let status = pass.current_status(record)?;
        let item = status
            .item(item_id)
            .ok_or_else(|| EngineError::UnknownItem(item_id.to_string()))?;
        if !item.is_interactive() {
            return Err(EngineError::NotInteractive(item_id.to_string()));
        }

        let ctx = SubstitutionContext::build(graph.workflow(), record, exec);
        if !pass.condition_holds(record, item, &ctx) {
            return Err(EngineError::Unavailable(item_id.to_string()));
        }

        match &item.kind {
            ActionKind::Choice(choice) => {
                pass.authorise(record, item, &choice.by)?;
                pass.transition(record, item, &choice.target, choice.mark, exec.origin);
            }
            ActionKind::Editable(edit) => {
                pass.authorise(record, item, &edit.by)?;
                pass.apply_edit(record, item, edit, form)?;
            }
            _ => return Err(EngineError::NotInteractive(item_id.to_string())),
        }

        pass.drive(record)?;
        Ok(pass.finish(record))
    }

    /// Fire the first trigger-mode jump named `name` whose condition holds,
    /// or else the first global action with a webservice trigger of that
    /// name; then continue with an automatic pass.
    #[instrument(skip_all, fields(workflow = graph.id(), record = %record.id, trigger = name))]
    pub fn trigger(
        &self,
        graph: &StatusGraph,
        record: &mut Record,
        name: &str,
        exec: &ExecutionContext,
    ) -> Result<PassOutcome, EngineError> {
        let mut pass = Pass::new(self, graph, exec, record)?;
        let status = pass.current_status(record)?;
        let ctx = SubstitutionContext::build(graph.workflow(), record, exec);

        let jump = status.items.iter().find_map(|item| match &item.kind {
            ActionKind::Jump(jump)
                if matches!(&jump.mode, JumpMode::Trigger { name: n } if n == name)
                    && pass.condition_holds(record, item, &ctx) =>
            {
                Some((item, jump))
            }
            _ => None,
        });

        if let Some((item, jump)) = jump {
            pass.transition(record, item, &jump.target, jump.mark, exec.origin);
        } else {
            let action = graph
                .workflow()
                .global_actions
                .iter()
                .find(|a| {
                    a.triggers.iter().any(
                        |t| matches!(t, GlobalTrigger::Webservice { name: n } if n == name),
                    )
                })
                .ok_or_else(|| EngineError::NoMatchingTrigger(name.to_string()))?;
            pass.perform_global(record, action)?;
        }

        pass.drive(record)?;
        Ok(pass.finish(record))
    }

    /// Run a global action's items, then continue with an automatic pass.
    #[instrument(skip_all, fields(workflow = graph.id(), record = %record.id, action = action_id))]
    pub fn run_global_action(
        &self,
        graph: &StatusGraph,
        record: &mut Record,
        action_id: &str,
        exec: &ExecutionContext,
    ) -> Result<PassOutcome, EngineError> {
        let mut pass = Pass::new(self, graph, exec, record)?;
        let action = graph
            .global_action(action_id)
            .ok_or_else(|| EngineError::UnknownGlobalAction(action_id.to_string()))?;

        let allowed = action.triggers.iter().any(|trigger| match trigger {
            GlobalTrigger::Manual { by } => {
                exec.acting_user.is_some() && pass.is_authorised(record, by)
            }
            GlobalTrigger::Webservice { .. } => exec.origin == TriggerOrigin::Webservice,
        });
        if !allowed {
            return Err(EngineError::NotAuthorised(action_id.to_string()));
        }

        pass.perform_global(record, action)?;
        pass.drive(record)?;
        Ok(pass.finish(record))
    }

    /// Interactive items of the current status available to the acting user.
    pub fn surface(
        &self,
        graph: &StatusGraph,
        record: &Record,
        exec: &ExecutionContext,
    ) -> Result<Vec<SurfaceItem>, EngineError> {
        let mut pass = Pass::new(self, graph, exec, record)?;
        let status = pass.current_status(record)?;
        let ctx = SubstitutionContext::build(graph.workflow(), record, exec);

        let mut surface = Vec::new();
        for item in &status.items {
            let entry = match &item.kind {
                ActionKind::Choice(choice) if pass.is_authorised(record, &choice.by) => {
                    SurfaceItem {
                        id: item.id.clone(),
                        kind: item.kind_name(),
                        label: Some(choice.label.clone()),
                        require_confirmation: choice.require_confirmation,
                        confirmation_text: choice.confirmation_text.clone(),
                        fields: None,
                    }
                }
                ActionKind::Editable(edit) if pass.is_authorised(record, &edit.by) => {
                    SurfaceItem {
                        id: item.id.clone(),
                        kind: item.kind_name(),
                        label: edit.label.clone(),
                        require_confirmation: false,
                        confirmation_text: None,
                        fields: match &edit.scope {
                            EditScope::Full => None,
                            EditScope::Fields(fields) => Some(fields.clone()),
                        },
                    }
                }
                _ => continue,
            };
            if pass.condition_holds(record, item, &ctx) {
                surface.push(entry);
            }
        }
        Ok(surface)
    }

    /// Messages of the current status visible to the acting user.
    pub fn messages(
        &self,
        graph: &StatusGraph,
        record: &Record,
        exec: &ExecutionContext,
    ) -> Result<Vec<DisplayedMessage>, EngineError> {
        let mut pass = Pass::new(self, graph, exec, record)?;
        let status = pass.current_status(record)?;
        let ctx = SubstitutionContext::build(graph.workflow(), record, exec);
        Ok(pass.display_messages(record, status, &ctx))
    }
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

pub(crate) enum Transition {
    Moved,
    Stayed,
    Limited,
}

/// State of one pass over one record.
pub(crate) struct Pass<'a> {
    pub(crate) engine: &'a Engine,
    pub(crate) graph: &'a StatusGraph,
    pub(crate) exec: &'a ExecutionContext,
    pub(crate) hops: usize,
    pub(crate) failures: usize,
    pub(crate) state: Option<PassState>,
    pub(crate) after_jobs: Vec<AfterJob>,
}

impl<'a> Pass<'a> {
    fn new(
        engine: &'a Engine,
        graph: &'a StatusGraph,
        exec: &'a ExecutionContext,
        record: &Record,
    ) -> Result<Self, EngineError> {
        if record.workflow_id != graph.id() {
            return Err(EngineError::WorkflowMismatch {
                expected: graph.id().to_string(),
                found: record.workflow_id.clone(),
            });
        }
        Ok(Self {
            engine,
            graph,
            exec,
            hops: 0,
            failures: 0,
            state: None,
            after_jobs: Vec::new(),
        })
    }

    fn finish(self, record: &Record) -> PassOutcome {
        PassOutcome {
            status: record.status.clone(),
            state: self.state.unwrap_or(PassState::Waiting),
            hops: self.hops,
            failures: self.failures,
            after_jobs: self.after_jobs,
        }
    }

    pub(crate) fn current_status(&self, record: &Record) -> Result<&'a Status, EngineError> {
        self.graph
            .status(&record.status)
            .ok_or_else(|| EngineError::UnknownStatus(record.status.clone()))
    }

    // -----------------------------------------------------------------------
    // The loop
    // -----------------------------------------------------------------------

    fn drive(&mut self, record: &mut Record) -> Result<(), EngineError> {
        if self.state == Some(PassState::HopLimit) {
            return Ok(());
        }

        loop {
            let status = self.current_status(record)?;
            let ctx = SubstitutionContext::build(self.graph.workflow(), record, self.exec);
            debug!(status = %status.id, hops = self.hops, "entering status");

            let mut moved = false;
            for item in &status.items {
                if item.is_interactive() {
                    if self.condition_holds(record, item, &ctx) {
                        debug!(item = %item.id, "suspended on interactive item");
                        self.state = Some(PassState::Suspended {
                            item: item.id.clone(),
                        });
                        return Ok(());
                    }
                    continue;
                }

                if !self.condition_holds(record, item, &ctx) {
                    continue;
                }

                let Effect::Jump {
                    target,
                    mark,
                    origin,
                } = self.perform(record, item, &ctx)
                else {
                    continue;
                };

                match self.transition(record, item, &target, mark, origin) {
                    Transition::Moved => {
                        moved = true;
                        break;
                    }
                    Transition::Stayed => {}
                    Transition::Limited => return Ok(()),
                }
            }

            if !moved {
                self.state = Some(if status.is_endpoint {
                    PassState::Terminal
                } else {
                    PassState::Waiting
                });
                return Ok(());
            }
        }
    }

    /// Run a global action's automatic items until one jumps.
    fn perform_global(
        &mut self,
        record: &mut Record,
        action: &GlobalAction,
    ) -> Result<(), EngineError> {
        self.current_status(record)?;
        let ctx = SubstitutionContext::build(self.graph.workflow(), record, self.exec);
        info!(action = %action.id, "running global action");

        for item in action.items.iter().filter(|i| !i.is_interactive()) {
            if !self.condition_holds(record, item, &ctx) {
                continue;
            }
            if let Effect::Jump { target, mark, .. } = self.perform(record, item, &ctx) {
                match self.transition(record, item, &target, mark, TriggerOrigin::GlobalAction) {
                    Transition::Stayed => {}
                    Transition::Moved | Transition::Limited => break,
                }
            }
        }
        Ok(())
    }

    /// Move the record. The status write comes last, after the marker stack
    /// and the evolution entry.
    pub(crate) fn transition(
        &mut self,
        record: &mut Record,
        item: &ActionItem,
        target: &str,
        mark: bool,
        origin: TriggerOrigin,
    ) -> Transition {
        if self.hops >= self.engine.config.max_hops {
            let site = self.site(record, Some(item.id.as_str()));
            self.fail(
                &site,
                FailureKind::TooManyJumps,
                &format!("too many jumps (limit {})", self.engine.config.max_hops),
            );
            self.state = Some(PassState::HopLimit);
            return Transition::Limited;
        }

        let current = record.status.clone();
        match resolve_target(&mut record.marker_stack, &current, target, mark) {
            Destination::Stay => {
                debug!(item = %item.id, "nothing marked, staying");
                Transition::Stayed
            }
            Destination::Status(next) => {
                record.evolution.push(EvolutionEntry {
                    time: self.exec.now,
                    status: Some(next.clone()),
                    actor: self.exec.acting_user.clone(),
                    origin,
                    action_id: Some(item.id.clone()),
                    identifier: item.identifier.clone(),
                });
                record.last_update = self.exec.now;
                info!(from = %current, to = %next, item = %item.id, "status changed");
                record.status = next;
                self.hops += 1;
                Transition::Moved
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shared helpers for action items
    // -----------------------------------------------------------------------

    pub(crate) fn site(&self, record: &Record, action_id: Option<&str>) -> FailureSite {
        let mut site = FailureSite::new(self.graph.id())
            .status(record.status.clone())
            .record(record.id);
        site.action_id = action_id.map(str::to_string);
        site
    }

    pub(crate) fn fail(&mut self, site: &FailureSite, kind: FailureKind, detail: &str) {
        self.failures += 1;
        self.engine.recorder.record(site, kind, detail);
    }

    pub(crate) fn record_miss(&mut self, site: &FailureSite, miss: ResolveError) {
        let kind = match &miss {
            ResolveError::MissingRole { .. } => FailureKind::MissingRole,
            ResolveError::MissingUser { .. } => FailureKind::MissingUser,
            ResolveError::Template { .. } => FailureKind::TemplateFailed,
        };
        self.fail(site, kind, &miss.to_string());
    }

    /// A resolver bound to the record's submitter and function buckets.
    pub(crate) fn resolver<'r>(&self, record: &'r Record) -> RoleResolver<'r>
    where
        'a: 'r,
    {
        let engine: &'a Engine = self.engine;
        RoleResolver::new(engine.directory.as_ref(), &engine.evaluator)
            .submitter(record.submitter.as_deref())
            .functions(&record.workflow_roles)
    }

    /// Evaluate an item's condition; failures count as false.
    pub(crate) fn condition_holds(
        &mut self,
        record: &Record,
        item: &ActionItem,
        ctx: &SubstitutionContext,
    ) -> bool {
        let Some(condition) = &item.condition else {
            return true;
        };
        let engine = self.engine;
        let mut failure = None;
        let holds = engine
            .evaluator
            .condition_or(condition, ctx, false, |error| failure = Some(error.to_string()));
        if let Some(detail) = failure {
            let site = self.site(record, Some(item.id.as_str()));
            self.fail(
                &site,
                FailureKind::ConditionFailed,
                &format!("condition {condition:?} failed: {detail}"),
            );
        }
        holds
    }
}
