//! Failure recorder: deduplicated, counted log of recoverable failures.
//!
//! Nothing recorded here interrupts a pass. Repeats of the same cause at
//! the same site collapse into a single [`LoggedError`] whose count grows.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConditionFailed,
    TemplateFailed,
    MissingRole,
    MissingUser,
    DispatchFailed,
    DirectoryFailed,
    NotifyFailed,
    RoleSyncFailed,
    TooManyJumps,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ConditionFailed => "condition_failed",
            FailureKind::TemplateFailed => "template_failed",
            FailureKind::MissingRole => "missing_role",
            FailureKind::MissingUser => "missing_user",
            FailureKind::DispatchFailed => "dispatch_failed",
            FailureKind::DirectoryFailed => "directory_failed",
            FailureKind::NotifyFailed => "notify_failed",
            FailureKind::RoleSyncFailed => "role_sync_failed",
            FailureKind::TooManyJumps => "too_many_jumps",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSite {
    pub workflow_id: String,
    pub status_id: Option<String>,
    pub action_id: Option<String>,
    pub record_id: Option<Uuid>,
}

impl FailureSite {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Self::default()
        }
    }

    pub fn status(mut self, status_id: impl Into<String>) -> Self {
        self.status_id = Some(status_id.into());
        self
    }

    pub fn action(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn record(mut self, record_id: Uuid) -> Self {
        self.record_id = Some(record_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedError {
    pub tech_id: String,
    pub workflow_id: String,
    pub status_id: Option<String>,
    pub action_id: Option<String>,
    /// Last record the failure happened on.
    pub record_id: Option<Uuid>,
    pub kind: FailureKind,
    pub summary: String,
    pub occurrences_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Handle returned by [`FailureRecorder::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedErrorRef {
    pub tech_id: String,
    pub occurrences_count: u64,
}

/// Dedupe key: site, kind and a short hash of the cause.
///
/// The record id is left out so the same fault on many records collapses.
pub fn tech_id(site: &FailureSite, kind: FailureKind, detail: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(detail.as_bytes()));
    format!(
        "{}-{}-{}-{}-{}",
        site.workflow_id,
        site.status_id.as_deref().unwrap_or("_"),
        site.action_id.as_deref().unwrap_or("_"),
        kind,
        &digest[..16]
    )
}

pub trait FailureRecorder: Send + Sync {
    fn record(&self, site: &FailureSite, kind: FailureKind, detail: &str) -> LoggedErrorRef;

    /// Entries, most recently seen first.
    fn list(&self) -> Vec<LoggedError>;

    fn get(&self, tech_id: &str) -> Option<LoggedError>;

    fn clear(&self);
}

// ---------------------------------------------------------------------------
// InMemoryFailureRecorder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryFailureRecorder {
    entries: Mutex<HashMap<String, LoggedError>>,
}

impl InMemoryFailureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, LoggedError>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FailureRecorder for InMemoryFailureRecorder {
    fn record(&self, site: &FailureSite, kind: FailureKind, detail: &str) -> LoggedErrorRef {
        let tech_id = tech_id(site, kind, detail);
        let now = Utc::now();

        warn!(
            tech_id = %tech_id,
            workflow = %site.workflow_id,
            status = site.status_id.as_deref().unwrap_or("-"),
            action = site.action_id.as_deref().unwrap_or("-"),
            %kind,
            "{detail}"
        );

        let mut entries = self.lock();
        let entry = entries
            .entry(tech_id.clone())
            .and_modify(|e| {
                e.occurrences_count += 1;
                e.last_seen = now;
                e.record_id = site.record_id.or(e.record_id);
            })
            .or_insert_with(|| LoggedError {
                tech_id: tech_id.clone(),
                workflow_id: site.workflow_id.clone(),
                status_id: site.status_id.clone(),
                action_id: site.action_id.clone(),
                record_id: site.record_id,
                kind,
                summary: detail.to_string(),
                occurrences_count: 1,
                first_seen: now,
                last_seen: now,
            });

        LoggedErrorRef {
            tech_id,
            occurrences_count: entry.occurrences_count,
        }
    }

    fn list(&self) -> Vec<LoggedError> {
        let mut entries: Vec<_> = self.lock().values().cloned().collect();
        entries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.tech_id.cmp(&b.tech_id)));
        entries
    }

    fn get(&self, tech_id: &str) -> Option<LoggedError> {
        self.lock().get(tech_id).cloned()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> FailureSite {
        FailureSite::new("wf").status("s1").action("dispatch-1")
    }

    #[test]
    fn same_cause_collapses_into_one_entry() {
        let recorder = InMemoryFailureRecorder::new();
        let first = recorder.record(&site(), FailureKind::MissingRole, "missing role (R9)");
        let second = recorder.record(
            &site().record(Uuid::new_v4()),
            FailureKind::MissingRole,
            "missing role (R9)",
        );
        assert_eq!(first.tech_id, second.tech_id);
        assert_eq!(second.occurrences_count, 2);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn distinct_causes_stay_distinct() {
        let recorder = InMemoryFailureRecorder::new();
        recorder.record(&site(), FailureKind::MissingRole, "missing role (R8)");
        recorder.record(&site(), FailureKind::MissingRole, "missing role (R9)");
        recorder.record(&site(), FailureKind::MissingUser, "missing role (R9)");
        assert_eq!(recorder.len(), 3);
    }

    #[test]
    fn tech_id_is_stable_and_readable() {
        let id = tech_id(&site(), FailureKind::TooManyJumps, "x");
        assert_eq!(id, tech_id(&site(), FailureKind::TooManyJumps, "x"));
        assert!(id.starts_with("wf-s1-dispatch-1-too_many_jumps-"));
        assert_eq!(id.rsplit('-').next().map(str::len), Some(16));

        let bare = tech_id(&FailureSite::new("wf"), FailureKind::NotifyFailed, "x");
        assert!(bare.starts_with("wf-_-_-notify_failed-"));
    }

    #[test]
    fn clear_empties_the_log() {
        let recorder = InMemoryFailureRecorder::new();
        recorder.record(&site(), FailureKind::NotifyFailed, "down");
        assert!(recorder.get(&tech_id(&site(), FailureKind::NotifyFailed, "down")).is_some());
        recorder.clear();
        assert!(recorder.list().is_empty());
    }
}
