//! Execution and substitution contexts.
//!
//! [`ExecutionContext`] says who triggered a pass and when; it is passed
//! explicitly with every call. [`SubstitutionContext`] is the read-only
//! variable namespace expressions see, rebuilt at each hop.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use providers::UserId;

use crate::models::{Record, TriggerOrigin, Workflow};

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub acting_user: Option<UserId>,
    pub origin: TriggerOrigin,
    /// Clock used for timeouts and evolution entries.
    pub now: DateTime<Utc>,
    /// Host-provided variables, overridden by record data.
    pub variables: Map<String, Value>,
}

impl ExecutionContext {
    /// A scheduled or host-initiated re-evaluation with nobody acting.
    pub fn automatic() -> Self {
        Self {
            acting_user: None,
            origin: TriggerOrigin::Automatic,
            now: Utc::now(),
            variables: Map::new(),
        }
    }

    pub fn for_user(user: impl Into<UserId>, origin: TriggerOrigin) -> Self {
        Self {
            acting_user: Some(user.into()),
            origin,
            ..Self::automatic()
        }
    }

    pub fn webservice() -> Self {
        Self {
            origin: TriggerOrigin::Webservice,
            ..Self::automatic()
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// SubstitutionContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    vars: Map<String, Value>,
}

impl SubstitutionContext {
    /// Layer process variables, record data and engine variables, later
    /// layers winning.
    pub fn build(workflow: &Workflow, record: &Record, exec: &ExecutionContext) -> Self {
        let mut vars = exec.variables.clone();

        for (key, value) in &record.data {
            if !key.starts_with('_') {
                vars.insert(key.clone(), value.clone());
            }
        }

        let status_name = workflow
            .status(&record.status)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| record.status.clone());
        let roles: Map<String, Value> = record
            .workflow_roles
            .iter()
            .map(|(key, ids)| {
                (
                    key.clone(),
                    Value::Array(ids.iter().cloned().map(Value::String).collect()),
                )
            })
            .collect();

        vars.insert("form_id".into(), Value::String(record.id.to_string()));
        vars.insert("form_status".into(), Value::String(status_name));
        vars.insert("form_status_id".into(), Value::String(record.status.clone()));
        vars.insert(
            "form_submitter".into(),
            record.submitter.clone().map_or(Value::Null, Value::String),
        );
        vars.insert("form_workflow_roles".into(), Value::Object(roles));

        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }
}

impl expr::Context for SubstitutionContext {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}
