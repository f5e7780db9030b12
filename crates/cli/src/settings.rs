//! Settings file and the inputs the CLI reads from disk.
//!
//! ```toml
//! [engine]
//! max_hops = 20
//! defer_notifications = true
//!
//! [gateway]
//! portal_url = "https://portal.example.org"
//! idp_url = "https://idp.example.org"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use engine::{EngineConfig, StatusGraph};
use expr::{Evaluator, FunctionRegistry};
use providers::mock::InMemoryDirectory;
use providers::{Role, User};
use queue::GatewaySettings;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub gateway: GatewaySettings,
}

impl Settings {
    /// Read a settings file; no path means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read settings {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid settings {}", path.display()))
    }

    /// Settings for `serve`. Notifications are always deferred there: the
    /// HTTP gateway is async and only the after-job worker drives it.
    pub fn for_serving(mut self) -> Self {
        if !self.engine.defer_notifications {
            info!("serve sends notifications through the after-job worker");
            self.engine.defer_notifications = true;
        }
        self
    }

    /// An evaluator configured like the engine's, for offline validation.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::with_cache_capacity(
            self.engine.catalogue(),
            FunctionRegistry::with_builtins(),
            self.engine.expression_cache_capacity,
        )
    }
}

/// Roles and users seeding the in-memory directory.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryFile {
    pub roles: Vec<Role>,
    pub users: Vec<User>,
}

pub fn load_directory(path: Option<&Path>) -> Result<InMemoryDirectory> {
    let file: DirectoryFile = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("cannot read directory {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid directory {}", path.display()))?
        }
        None => {
            warn!("no directory file given, every role lookup will miss");
            DirectoryFile::default()
        }
    };
    info!(roles = file.roles.len(), users = file.users.len(), "directory loaded");
    let directory = file
        .roles
        .into_iter()
        .fold(InMemoryDirectory::new(), InMemoryDirectory::with_role);
    Ok(file.users.into_iter().fold(directory, InMemoryDirectory::with_user))
}

/// Workflow files to load: the file itself, or every `*.json` in a directory.
pub fn workflow_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("cannot list {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

pub fn load_workflow(path: &Path, evaluator: &Evaluator) -> Result<StatusGraph> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read workflow {}", path.display()))?;
    StatusGraph::from_json(&text, evaluator)
        .with_context(|| format!("invalid workflow {}", path.display()))
}
