//! End-to-end tests for the status engine.
//!
//! Workflows are written as JSON, loaded through `Engine::load_workflow`
//! and run against the in-memory directory, a recording notifier and the
//! in-memory failure recorder, so no database or gateway is needed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

use providers::mock::{InMemoryDirectory, RecordingNotifier};
use providers::{Channel, NotifyError, Role, RoleDirectory, User};

use crate::failures::{FailureKind, FailureRecorder, InMemoryFailureRecorder};
use crate::jobs::{AfterJob, RoleOperation};
use crate::{
    ConfigError, Engine, EngineConfig, EngineError, ExecutionContext, PassState, Record,
    StatusGraph, TriggerOrigin,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    engine: Engine,
    directory: InMemoryDirectory,
    notifier: RecordingNotifier,
    recorder: Arc<InMemoryFailureRecorder>,
}

impl Harness {
    fn new() -> Self {
        Self::with(EngineConfig::default(), RecordingNotifier::new())
    }

    fn with(config: EngineConfig, notifier: RecordingNotifier) -> Self {
        let directory = InMemoryDirectory::new()
            .with_role(Role::new("R1", "Receivers", "receivers"))
            .with_role(Role::new("R2", "Managers", "managers"))
            .with_user(
                User::new("u-1", "Ada")
                    .with_email("ada@example.org")
                    .with_name_id("nid-1")
                    .with_role("R1"),
            )
            .with_user(User::new("u-2", "Bob"));
        let recorder = Arc::new(InMemoryFailureRecorder::new());
        let engine = Engine::new(
            config,
            Arc::new(directory.clone()),
            Arc::new(notifier.clone()),
            recorder.clone(),
        );
        Self {
            engine,
            directory,
            notifier,
            recorder,
        }
    }

    fn load(&self, statuses: Value) -> StatusGraph {
        self.engine
            .load_workflow(&workflow(statuses).to_string())
            .expect("valid workflow")
    }

    fn record(&self, graph: &StatusGraph, data: Value) -> Record {
        self.engine.create_record(
            graph,
            data.as_object().cloned().unwrap_or_default(),
            Some("u-1".into()),
        )
    }

    fn run(&self, graph: &StatusGraph, record: &mut Record) -> crate::PassOutcome {
        self.engine
            .run(graph, record, &ExecutionContext::automatic())
            .expect("pass should run")
    }
}

/// A workflow starting at the first status given.
fn workflow(statuses: Value) -> Value {
    json!({
        "id": "wf",
        "name": "Test workflow",
        "initial_status": statuses[0]["id"],
        "statuses": statuses,
    })
}

fn as_user(user: &str) -> ExecutionContext {
    ExecutionContext::for_user(user, TriggerOrigin::Interactive)
}

// ============================================================
// Loading
// ============================================================

#[test]
fn dangling_jump_target_fails_to_load() {
    let h = Harness::new();
    let definition = workflow(json!([
        {"id": "S1", "name": "S1", "items": [{"id": "go", "type": "jump", "target": "S9"}]}
    ]));
    let err = h.engine.load_workflow(&definition.to_string()).unwrap_err();
    assert!(matches!(err, ConfigError::DanglingJump { .. }));
}

// ============================================================
// Automatic passes
// ============================================================

#[test]
fn dispatch_then_jump_routes_the_record() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "route", "type": "dispatch", "role_key": "_receiver",
             "variable": "groups", "rules": [{"role": "R1", "value": "Test"}]},
            {"id": "next", "type": "jump", "target": "S2"}
        ]},
        {"id": "S2", "name": "S2", "is_endpoint": true}
    ]));
    let mut record = h.record(&graph, json!({"groups": ["Test"]}));

    let outcome = h.run(&graph, &mut record);

    assert_eq!(record.status, "S2");
    assert_eq!(outcome.state, PassState::Terminal);
    assert_eq!(outcome.hops, 1);
    assert_eq!(record.roles_for("_receiver"), vec!["R1".to_string()]);
    assert_eq!(record.workflow_roles.len(), 1);
    assert_eq!(record.evolution.len(), 1);
    assert!(h.recorder.is_empty());
}

#[test]
fn dispatch_first_matching_rule_wins() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "route", "type": "dispatch", "role_key": "_receiver", "variable": "choice",
             "rules": [
                {"role": "R1", "value": "foo"},
                {"role": "R2", "value": "bar"},
                {"role": "R1", "value": "42"}
             ]}
        ]}
    ]));

    for (choice, expected) in [(json!("foo"), "R1"), (json!("bar"), "R2"), (json!(42), "R1")] {
        let mut record = h.record(&graph, json!({ "choice": choice }));
        h.run(&graph, &mut record);
        assert_eq!(record.roles_for("_receiver"), vec![expected.to_string()]);
    }

    let mut record = h.record(&graph, json!({"choice": "none"}));
    h.run(&graph, &mut record);
    assert!(record.workflow_roles.is_empty());
}

#[test]
fn unresolvable_role_is_logged_once_per_cause() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "route", "type": "dispatch", "role_key": "_receiver", "variable": "kind",
             "rules": [{"role": "{{ team }}", "value": "x"}]}
        ]}
    ]));

    let mut record = h.record(&graph, json!({"kind": "x", "team": "ghost-a"}));
    h.run(&graph, &mut record);
    h.run(&graph, &mut record);

    let entries = h.recorder.list();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].occurrences_count, 2);
    assert_eq!(entries[0].kind, FailureKind::MissingRole);
    assert!(record.workflow_roles.is_empty());

    let mut other = h.record(&graph, json!({"kind": "x", "team": "ghost-b"}));
    h.run(&graph, &mut other);
    assert_eq!(h.recorder.len(), 2);
}

#[test]
fn manual_dispatch_falls_back_to_users() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "by-slug", "type": "dispatch", "role_key": "_manager", "role_spec": "managers"},
            {"id": "by-mail", "type": "dispatch", "role_key": "_owner", "role_spec": "{{ email }}"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({"email": "ada@example.org"}));
    h.run(&graph, &mut record);

    assert_eq!(record.roles_for("_manager"), vec!["R2".to_string()]);
    assert_eq!(record.roles_for("_owner"), vec!["_user:u-1".to_string()]);
}

#[test]
fn rendered_role_names_are_looked_up_whole() {
    let h = Harness::new();
    let _ = h
        .directory
        .clone()
        .with_role(Role::new("R7", "Sales, North", "sales-north"));
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "route", "type": "dispatch", "role_key": "_receiver", "role_spec": "{{ team }}"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({"team": "Sales, North"}));
    h.run(&graph, &mut record);

    assert_eq!(record.roles_for("_receiver"), vec!["R7".to_string()]);
    assert!(h.recorder.is_empty());
}

#[test]
fn previous_with_nothing_marked_stays() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [{"id": "back", "type": "jump", "target": "_previous"}]}
    ]));
    let mut record = h.record(&graph, json!({}));

    let outcome = h.run(&graph, &mut record);

    assert_eq!(record.status, "S1");
    assert_eq!(outcome.state, PassState::Waiting);
    assert!(record.evolution.is_empty());
    assert!(h.recorder.is_empty());
}

#[test]
fn marked_detour_returns_to_the_marked_status() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "ask", "type": "choice", "label": "Ask for details", "target": "info", "mark": true}
        ]},
        {"id": "info", "name": "Waiting for details", "items": [
            {"id": "answer", "type": "choice", "label": "Answer", "target": "_previous"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({}));

    h.engine
        .submit(&graph, &mut record, "ask", &Map::new(), &as_user("u-1"))
        .unwrap();
    assert_eq!(record.status, "info");
    assert_eq!(record.marker_stack.as_slice(), ["S1".to_string()]);

    h.engine
        .submit(&graph, &mut record, "answer", &Map::new(), &as_user("u-1"))
        .unwrap();
    assert_eq!(record.status, "S1");
    assert!(record.marker_stack.is_empty());
    assert_eq!(record.evolution.len(), 2);
}

#[test]
fn cycles_are_cut_at_the_hop_limit() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "a", "name": "A", "items": [{"id": "to-b", "type": "jump", "target": "b"}]},
        {"id": "b", "name": "B", "items": [{"id": "to-a", "type": "jump", "target": "a"}]}
    ]));
    let mut record = h.record(&graph, json!({}));

    let outcome = h.run(&graph, &mut record);

    assert_eq!(outcome.state, PassState::HopLimit);
    assert_eq!(outcome.hops, 20);
    assert_eq!(record.status, "a");
    assert_eq!(record.evolution.len(), 20);
    let entries = h.recorder.list();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, FailureKind::TooManyJumps);
}

#[test]
fn failing_condition_is_recorded_and_treated_as_false() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "go", "type": "jump", "target": "S2", "condition": "missing == 1"},
            {"id": "fallback", "type": "jump", "target": "S3", "condition": "amount > 10"}
        ]},
        {"id": "S2", "name": "S2"},
        {"id": "S3", "name": "S3"}
    ]));
    let mut record = h.record(&graph, json!({"amount": 12}));

    let outcome = h.run(&graph, &mut record);

    assert_eq!(record.status, "S3");
    assert_eq!(outcome.failures, 1);
    assert_eq!(h.recorder.list()[0].kind, FailureKind::ConditionFailed);
}

#[test]
fn trigger_jumps_wait_for_their_trigger() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "approve", "type": "jump", "target": "S2",
             "mode": {"kind": "trigger", "name": "approve"}}
        ]},
        {"id": "S2", "name": "S2", "is_endpoint": true}
    ]));
    let mut record = h.record(&graph, json!({}));

    h.run(&graph, &mut record);
    assert_eq!(record.status, "S1");

    let err = h
        .engine
        .trigger(&graph, &mut record, "reject", &ExecutionContext::webservice())
        .unwrap_err();
    assert_eq!(err, EngineError::NoMatchingTrigger("reject".into()));

    let outcome = h
        .engine
        .trigger(&graph, &mut record, "approve", &ExecutionContext::webservice())
        .unwrap();
    assert_eq!(record.status, "S2");
    assert!(outcome.is_terminal());
    assert_eq!(record.evolution[0].origin, TriggerOrigin::Webservice);
}

#[test]
fn timeout_jumps_fire_once_the_delay_has_passed() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "expire", "type": "jump", "target": "late",
             "mode": {"kind": "timeout", "seconds": 3600}}
        ]},
        {"id": "late", "name": "Late"}
    ]));
    let mut record = h.record(&graph, json!({}));
    let now = Utc::now();

    record.last_update = now - Duration::minutes(30);
    h.engine
        .run(&graph, &mut record, &ExecutionContext::automatic().at(now))
        .unwrap();
    assert_eq!(record.status, "S1");

    record.last_update = now - Duration::hours(2);
    h.engine
        .run(&graph, &mut record, &ExecutionContext::automatic().at(now))
        .unwrap();
    assert_eq!(record.status, "late");
    assert_eq!(record.evolution[0].origin, TriggerOrigin::Timeout);
    assert_eq!(record.last_update, now);
}

// ============================================================
// Interactive items
// ============================================================

#[test]
fn choice_with_confirmation_moves_on_submit() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "confirm", "type": "choice", "label": "Validate",
             "require_confirmation": true, "target": "S2"}
        ]},
        {"id": "S2", "name": "S2"}
    ]));
    let mut record = h.record(&graph, json!({}));

    let outcome = h.run(&graph, &mut record);
    assert_eq!(
        outcome.state,
        PassState::Suspended {
            item: "confirm".into()
        }
    );

    h.engine
        .submit(&graph, &mut record, "confirm", &Map::new(), &as_user("u-2"))
        .unwrap();

    assert_eq!(record.status, "S2");
    assert_eq!(record.evolution.len(), 1);
    let entry = &record.evolution[0];
    assert_eq!(entry.status.as_deref(), Some("S2"));
    assert_eq!(entry.action_id.as_deref(), Some("confirm"));
    assert_eq!(entry.actor.as_deref(), Some("u-2"));
    assert_eq!(entry.origin, TriggerOrigin::Interactive);
}

#[test]
fn submit_checks_item_and_authorisation() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "accept", "type": "choice", "label": "Accept", "by": ["receivers"], "target": "S2"},
            {"id": "hidden", "type": "choice", "label": "Hidden", "condition": "False", "target": "S2"},
            {"id": "auto", "type": "jump", "target": "S2", "condition": "False"}
        ]},
        {"id": "S2", "name": "S2"}
    ]));
    let mut record = h.record(&graph, json!({}));
    let before = record.clone();

    let attempts = [
        ("accept", "u-2", EngineError::NotAuthorised("accept".into())),
        ("hidden", "u-1", EngineError::Unavailable("hidden".into())),
        ("auto", "u-1", EngineError::NotInteractive("auto".into())),
        ("nope", "u-1", EngineError::UnknownItem("nope".into())),
    ];
    for (item, user, expected) in attempts {
        let err = h
            .engine
            .submit(&graph, &mut record, item, &Map::new(), &as_user(user))
            .unwrap_err();
        assert_eq!(err, expected);
        assert!(err.is_user_visible());
        assert_eq!(record, before);
    }

    h.engine
        .submit(&graph, &mut record, "accept", &Map::new(), &as_user("u-1"))
        .unwrap();
    assert_eq!(record.status, "S2");
}

#[test]
fn function_keys_authorise_their_members() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "route", "type": "dispatch", "role_key": "_receiver", "role_spec": "_user_email:ada@example.org"},
            {"id": "take", "type": "choice", "label": "Take", "by": ["_receiver"], "target": "S2"}
        ]},
        {"id": "S2", "name": "S2"}
    ]));
    let mut record = h.record(&graph, json!({}));
    h.run(&graph, &mut record);

    assert!(h
        .engine
        .submit(&graph, &mut record, "take", &Map::new(), &as_user("u-2"))
        .is_err());
    h.engine
        .submit(&graph, &mut record, "take", &Map::new(), &as_user("u-1"))
        .unwrap();
    assert_eq!(record.status, "S2");
}

#[test]
fn editable_merges_fields_within_scope() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "edit", "type": "editable", "by": ["_submitter"],
             "scope": {"fields": ["comment"]}, "target_status": "S2"}
        ]},
        {"id": "S2", "name": "S2"}
    ]));
    let mut record = h.record(&graph, json!({"amount": 3}));
    let before = record.clone();

    let mut form = Map::new();
    form.insert("amount".into(), json!(100));
    let err = h
        .engine
        .submit(&graph, &mut record, "edit", &form, &as_user("u-1"))
        .unwrap_err();
    assert_eq!(err, EngineError::FieldNotEditable("amount".into()));
    assert_eq!(record, before);

    let mut form = Map::new();
    form.insert("comment".into(), json!("looks good"));
    assert!(matches!(
        h.engine
            .submit(&graph, &mut record, "edit", &form, &as_user("u-2")),
        Err(EngineError::NotAuthorised(_))
    ));

    h.engine
        .submit(&graph, &mut record, "edit", &form, &as_user("u-1"))
        .unwrap();
    assert_eq!(record.data["comment"], json!("looks good"));
    assert_eq!(record.data["amount"], json!(3));
    assert_eq!(record.status, "S2");
}

#[test]
fn edit_that_stays_is_still_recorded() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "edit", "type": "editable", "target_status": "_previous"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({}));

    let mut form = Map::new();
    form.insert("comment".into(), json!("noted"));
    h.engine
        .submit(&graph, &mut record, "edit", &form, &as_user("u-1"))
        .unwrap();

    assert_eq!(record.status, "S1");
    assert_eq!(record.data["comment"], json!("noted"));
    assert_eq!(record.evolution.len(), 1);
    assert_eq!(record.evolution[0].status, None);
    assert_eq!(record.evolution[0].action_id.as_deref(), Some("edit"));
}

#[test]
fn surface_lists_available_interactive_items() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "ok", "type": "choice", "label": "OK", "require_confirmation": true,
             "confirmation_text": "Sure?", "target": "S1"},
            {"id": "later", "type": "editable", "condition": "amount > 100"},
            {"id": "managers-only", "type": "choice", "label": "Escalate", "by": ["managers"], "target": "S1"}
        ]}
    ]));
    let record = h.record(&graph, json!({"amount": 10}));

    let surface = h.engine.surface(&graph, &record, &as_user("u-1")).unwrap();

    assert_eq!(surface.len(), 1);
    assert_eq!(surface[0].id, "ok");
    assert_eq!(surface[0].kind, "choice");
    assert!(surface[0].require_confirmation);
    assert_eq!(surface[0].confirmation_text.as_deref(), Some("Sure?"));
}

#[test]
fn messages_render_for_allowed_viewers() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "info", "type": "display_message", "template": "Amount is {{ amount }}"},
            {"id": "staff", "type": "display_message", "to": ["managers"],
             "level": "warning", "template": "Check the amount"}
        ]}
    ]));
    let record = h.record(&graph, json!({"amount": 12}));

    let messages = h.engine.messages(&graph, &record, &as_user("u-1")).unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "Amount is 12");
}

// ============================================================
// Global actions
// ============================================================

#[test]
fn global_actions_are_authorised_by_their_triggers() {
    let h = Harness::new();
    let definition = json!({
        "id": "wf",
        "name": "Test workflow",
        "initial_status": "S1",
        "statuses": [
            {"id": "S1", "name": "S1"},
            {"id": "cancelled", "name": "Cancelled", "is_endpoint": true}
        ],
        "global_actions": [{
            "id": "cancel",
            "name": "Cancel",
            "triggers": [{"type": "manual", "by": ["receivers"]}, {"type": "webservice", "name": "cancel"}],
            "items": [{"id": "cancel-jump", "type": "jump", "target": "cancelled"}]
        }]
    });
    let graph = h.engine.load_workflow(&definition.to_string()).unwrap();

    let mut record = h.record(&graph, json!({}));
    assert_eq!(
        h.engine
            .run_global_action(&graph, &mut record, "cancel", &as_user("u-2"))
            .unwrap_err(),
        EngineError::NotAuthorised("cancel".into())
    );

    let outcome = h
        .engine
        .run_global_action(&graph, &mut record, "cancel", &as_user("u-1"))
        .unwrap();
    assert_eq!(record.status, "cancelled");
    assert!(outcome.is_terminal());
    assert_eq!(record.evolution[0].origin, TriggerOrigin::GlobalAction);

    let mut other = h.record(&graph, json!({}));
    h.engine
        .trigger(&graph, &mut other, "cancel", &ExecutionContext::webservice())
        .unwrap();
    assert_eq!(other.status, "cancelled");
}

// ============================================================
// Side effects
// ============================================================

#[test]
fn add_role_twice_equals_once_and_remove_unheld_is_a_no_op() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "grant", "type": "add_role", "role_spec": "managers", "mode": "local_only"},
            {"id": "grant-again", "type": "add_role", "role_spec": "R2", "mode": "local_only"},
            {"id": "revoke", "type": "remove_role", "role_spec": "R1", "mode": "local_only"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({}));
    record.submitter = Some("u-2".into());

    let outcome = h.run(&graph, &mut record);

    assert_eq!(h.directory.roles_of("u-2"), vec!["R2".to_string()]);
    assert_eq!(outcome.failures, 0);
    assert!(outcome.after_jobs.is_empty());
}

#[test]
fn propagated_role_changes_queue_a_sync_job() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "grant", "type": "add_role", "role_spec": "managers"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({}));

    let outcome = h.run(&graph, &mut record);

    assert!(h.directory.user_has_role("u-1", "R2"));
    assert_eq!(outcome.after_jobs.len(), 1);
    match &outcome.after_jobs[0] {
        AfterJob::SyncRole {
            user_id,
            name_ids,
            role_id,
            operation,
            ..
        } => {
            assert_eq!(user_id, "u-1");
            assert_eq!(name_ids, &vec!["nid-1".to_string()]);
            assert_eq!(role_id, "R2");
            assert_eq!(*operation, RoleOperation::Add);
        }
        other => panic!("unexpected job {other:?}"),
    }
}

#[test]
fn sms_notification_is_sent_inline() {
    let h = Harness::new();
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "sms", "type": "notify", "channel": "sms",
             "recipients_template": "{{ phone }}", "body_template": "Hello {{ name }}"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({"phone": "+33600000000", "name": "Ada"}));

    h.run(&graph, &mut record);

    let calls = h.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].channel, Channel::Sms);
    assert_eq!(calls[0].recipients, vec!["+33600000000".to_string()]);
    assert_eq!(calls[0].body, "Hello Ada");
}

#[test]
fn webservice_notification_targets_reachable_members() {
    let h = Harness::new();
    h.directory
        .add_role("u-2", "R1")
        .expect("role exists");
    h.directory.set_reachable("u-2", false, false);
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "ws", "type": "notify", "channel": "webservice",
             "recipients_template": "receivers", "body_template": "New request"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({}));

    h.run(&graph, &mut record);

    let calls = h.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].recipients, vec!["nid-1".to_string()]);
}

#[test]
fn notification_failure_never_stops_the_pass() {
    let h = Harness::with(
        EngineConfig::default(),
        RecordingNotifier::failing(NotifyError::Unavailable("gateway down".into())),
    );
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "sms", "type": "notify", "channel": "sms",
             "recipients_template": "+33600000000", "body_template": "Hi"},
            {"id": "next", "type": "jump", "target": "S2"}
        ]},
        {"id": "S2", "name": "S2"}
    ]));
    let mut record = h.record(&graph, json!({}));

    let outcome = h.run(&graph, &mut record);

    assert_eq!(record.status, "S2");
    assert_eq!(outcome.failures, 1);
    assert_eq!(h.recorder.list()[0].kind, FailureKind::NotifyFailed);
}

#[test]
fn deferred_notifications_become_after_jobs() {
    let config = EngineConfig {
        defer_notifications: true,
        ..EngineConfig::default()
    };
    let h = Harness::with(config, RecordingNotifier::new());
    let graph = h.load(json!([
        {"id": "S1", "name": "S1", "items": [
            {"id": "sms", "type": "notify", "channel": "sms",
             "recipients_template": "+33600000000", "body_template": "Hi"}
        ]}
    ]));
    let mut record = h.record(&graph, json!({}));

    let outcome = h.run(&graph, &mut record);

    assert_eq!(h.notifier.call_count(), 0);
    assert!(matches!(
        outcome.after_jobs.as_slice(),
        [AfterJob::Notify { channel: Channel::Sms, .. }]
    ));
}

#[test]
fn records_of_other_workflows_are_refused() {
    let h = Harness::new();
    let graph = h.load(json!([{"id": "S1", "name": "S1"}]));
    let mut record = h.record(&graph, json!({}));
    record.workflow_id = "other".into();

    assert!(matches!(
        h.engine.run(&graph, &mut record, &ExecutionContext::automatic()),
        Err(EngineError::WorkflowMismatch { .. })
    ));
}
