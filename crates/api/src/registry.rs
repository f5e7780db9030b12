//! Loaded workflows, keyed by id.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use engine::StatusGraph;

/// What `GET /api/v1/workflows` lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub initial_status: String,
    pub statuses: Vec<String>,
    pub global_actions: Vec<String>,
}

impl From<&StatusGraph> for WorkflowSummary {
    fn from(graph: &StatusGraph) -> Self {
        let workflow = graph.workflow();
        Self {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            initial_status: workflow.initial_status.clone(),
            statuses: workflow.statuses.iter().map(|s| s.id.clone()).collect(),
            global_actions: workflow.global_actions.iter().map(|a| a.id.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    graphs: Arc<RwLock<BTreeMap<String, Arc<StatusGraph>>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a workflow. Records already in flight keep running
    /// against whichever graph their next pass finds.
    pub fn insert(&self, graph: StatusGraph) {
        let mut graphs = self.graphs.write().unwrap_or_else(|e| e.into_inner());
        graphs.insert(graph.id().to_string(), Arc::new(graph));
    }

    pub fn get(&self, id: &str) -> Option<Arc<StatusGraph>> {
        let graphs = self.graphs.read().unwrap_or_else(|e| e.into_inner());
        graphs.get(id).cloned()
    }

    pub fn summaries(&self) -> Vec<WorkflowSummary> {
        let graphs = self.graphs.read().unwrap_or_else(|e| e.into_inner());
        graphs.values().map(|g| WorkflowSummary::from(g.as_ref())).collect()
    }
}
