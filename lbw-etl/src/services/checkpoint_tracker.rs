//! Checkpoint tracker
//!
//! Durable record of which stages finished for which run context, so a
//! re-invocation skips completed work. The store is a single JSON document:
//!
//! ```json
//! {
//!   "contexts": { "data/raw/a.json": { "csv_parsed": true, "csv_loaded": true } },
//!   "staging_owner": "data/raw/a.json",
//!   "targets": { "data/raw/a.json": "data/sqlite/listenbrainz.db" }
//! }
//! ```
//!
//! `staging_owner` names the context whose rows currently sit in the shared
//! staging relations. A context that resumes after another one reloaded
//! staging has to redo its staging-dependent stages.
//!
//! `targets` names the warehouse each context was loaded into. Checkpoints
//! recorded against another warehouse say nothing about this one.
//!
//! Only `Done` is persisted. `Running` exists in memory while a stage
//! executes and falls back to `Pending` on failure, so a crash between a
//! stage's commit and its checkpoint write simply re-runs that stage.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use lbw_common::Result;
use serde::{Deserialize, Serialize};

use crate::models::{Stage, StageState};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointDocument {
    #[serde(default)]
    contexts: BTreeMap<String, BTreeMap<String, bool>>,
    #[serde(default)]
    staging_owner: Option<String>,
    #[serde(default)]
    targets: BTreeMap<String, String>,
}

/// File-backed checkpoint store
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state for one run context
    pub fn open_context(&self, key: &str) -> Result<RunContext> {
        let doc = self.load()?;
        let completed: BTreeSet<Stage> = doc
            .contexts
            .get(key)
            .map(|stages| {
                Stage::ALL
                    .into_iter()
                    .filter(|stage| stages.get(stage.as_str()).copied().unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default();

        Ok(RunContext {
            store: self.clone(),
            key: key.to_string(),
            completed,
            running: None,
            target: doc.targets.get(key).cloned(),
            staging_owner: doc.staging_owner,
        })
    }

    fn load(&self) -> Result<CheckpointDocument> {
        if !self.path.exists() {
            return Ok(CheckpointDocument::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(CheckpointDocument::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write-then-rename so a crash never leaves a torn document
    fn save(&self, doc: &CheckpointDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, serde_json::to_vec_pretty(doc)?)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut CheckpointDocument),
    {
        let mut doc = self.load()?;
        f(&mut doc);
        self.save(&doc)
    }
}

/// Checkpoint state of one run context, passed to each stage
#[derive(Debug)]
pub struct RunContext {
    store: CheckpointStore,
    key: String,
    completed: BTreeSet<Stage>,
    running: Option<Stage>,
    target: Option<String>,
    staging_owner: Option<String>,
}

impl RunContext {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    pub fn state(&self, stage: Stage) -> StageState {
        if self.completed.contains(&stage) {
            StageState::Done
        } else if self.running == Some(stage) {
            StageState::Running
        } else {
            StageState::Pending
        }
    }

    pub fn completed_stages(&self) -> Vec<Stage> {
        self.completed.iter().copied().collect()
    }

    /// Every stage done
    pub fn is_finished(&self) -> bool {
        Stage::ALL.iter().all(|stage| self.completed.contains(stage))
    }

    /// Pending → Running
    pub fn begin(&mut self, stage: Stage) {
        tracing::debug!(context = %self.key, stage = %stage, "Stage running");
        self.running = Some(stage);
    }

    /// Running → Pending
    pub fn fail(&mut self, stage: Stage) {
        if self.running == Some(stage) {
            self.running = None;
        }
        tracing::debug!(context = %self.key, stage = %stage, "Stage back to pending");
    }

    /// Running → Done, persisted
    ///
    /// Call only after the stage's effects are committed.
    pub fn mark_complete(&mut self, stage: Stage) -> Result<()> {
        let key = self.key.clone();
        self.store.update(|doc| {
            doc.contexts
                .entry(key)
                .or_default()
                .insert(stage.as_str().to_string(), true);
        })?;

        self.completed.insert(stage);
        if self.running == Some(stage) {
            self.running = None;
        }
        tracing::debug!(context = %self.key, stage = %stage, "Checkpoint saved");
        Ok(())
    }

    /// Warehouse the recorded checkpoints apply to
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Tie this context to warehouse `target`
    ///
    /// Checkpoints recorded against a different warehouse are dropped.
    /// Returns whether anything was dropped.
    pub fn bind_target(&mut self, target: &str) -> Result<bool> {
        if self.target.as_deref() == Some(target) {
            return Ok(false);
        }

        let previous = self.target.take();
        let dropped = previous.is_some() && !self.completed.is_empty();
        let key = self.key.clone();
        self.store.update(|doc| {
            if previous.is_some() {
                doc.contexts.remove(&key);
            }
            doc.targets.insert(key.clone(), target.to_string());
        })?;

        if previous.is_some() {
            self.completed.clear();
        }
        self.target = Some(target.to_string());

        if dropped {
            tracing::info!(
                context = %self.key,
                previous = previous.as_deref().unwrap_or_default(),
                warehouse = target,
                "Checkpoints belong to another warehouse, starting over"
            );
        }
        Ok(dropped)
    }

    pub fn owns_staging(&self) -> bool {
        self.staging_owner.as_deref() == Some(self.key.as_str())
    }

    /// Record that this context is about to (re)fill the staging relations
    pub fn claim_staging(&mut self) -> Result<()> {
        if self.owns_staging() {
            return Ok(());
        }
        let key = self.key.clone();
        self.store.update(|doc| doc.staging_owner = Some(key.clone()))?;
        self.staging_owner = Some(key);
        Ok(())
    }

    /// Forget `from` and every later stage
    pub fn invalidate_from(&mut self, from: Stage) -> Result<()> {
        let dropped: Vec<Stage> = self.completed.iter().copied().filter(|s| *s >= from).collect();
        if dropped.is_empty() {
            return Ok(());
        }

        let key = self.key.clone();
        self.store.update(|doc| {
            if let Some(stages) = doc.contexts.get_mut(&key) {
                for stage in &dropped {
                    stages.remove(stage.as_str());
                }
            }
        })?;

        for stage in &dropped {
            self.completed.remove(stage);
        }
        tracing::info!(context = %self.key, from = %from, "Invalidated checkpoints");
        Ok(())
    }

    /// Drop every checkpoint of this context
    pub fn reset(&mut self) -> Result<()> {
        let key = self.key.clone();
        self.store.update(|doc| {
            doc.contexts.remove(&key);
            doc.targets.remove(&key);
            if doc.staging_owner.as_deref() == Some(key.as_str()) {
                doc.staging_owner = None;
            }
        })?;
        self.completed.clear();
        self.running = None;
        self.target = None;
        if self.owns_staging() {
            self.staging_owner = None;
        }
        Ok(())
    }
}
