//! Quest Catalog
//!
//! Loads quest definitions from TOML files once at startup. The catalog is
//! immutable after load and shared by reference across all sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::definition::{QuestDefinition, QuestId, RawQuestFile};
use crate::error::QuestError;

/// Process-wide lookup from quest id to quest definition
#[derive(Debug, Default)]
pub struct QuestCatalog {
    quests: HashMap<QuestId, Arc<QuestDefinition>>,
}

impl QuestCatalog {
    /// Load every `*.toml` quest file under `dir`, recursively.
    pub fn load_dir(dir: &Path) -> Result<Self, QuestError> {
        info!("loading quests from {:?}", dir);

        if !dir.exists() {
            warn!("quest directory does not exist: {:?}", dir);
            return Ok(Self::default());
        }

        let mut paths = Vec::new();
        collect_toml_files(dir, &mut paths)?;

        let mut catalog = Self::default();
        for path in paths {
            match catalog.load_file(&path) {
                Ok(id) => info!("loaded quest {} from {:?}", id, path),
                Err(e) => warn!("failed to load quest {:?}: {}", path, e),
            }
        }

        info!("loaded {} quest definitions", catalog.quests.len());
        catalog.validate_references();
        Ok(catalog)
    }

    /// Build a catalog directly from definitions. Used by tests and tools.
    pub fn from_definitions(defs: impl IntoIterator<Item = QuestDefinition>) -> Self {
        let mut catalog = Self::default();
        for def in defs {
            catalog.quests.insert(def.id, Arc::new(def));
        }
        catalog.validate_references();
        catalog
    }

    fn load_file(&mut self, path: &Path) -> Result<QuestId, QuestError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuestError::Catalog(format!("failed to read {:?}: {}", path, e)))?;

        let raw: RawQuestFile = toml::from_str(&content)
            .map_err(|e| QuestError::Catalog(format!("failed to parse {:?}: {}", path, e)))?;

        let def = QuestDefinition::from_raw(&raw.quest).map_err(QuestError::Catalog)?;
        let id = def.id;

        if self.quests.insert(id, Arc::new(def)).is_some() {
            warn!("duplicate quest id {} from {:?}, keeping the last", id, path);
        }

        Ok(id)
    }

    /// Warn about dangling quest references. Dangling chains are tolerated at
    /// runtime (the lookup just fails), but they are almost always data bugs.
    fn validate_references(&self) {
        for def in self.quests.values() {
            if let Some(next) = def.next_quest {
                if !self.quests.contains_key(&next) {
                    warn!("quest {} chains to unknown quest {}", def.id, next);
                }
            }
            for req in &def.required_quests {
                if !self.quests.contains_key(req) {
                    warn!("quest {} requires unknown quest {}", def.id, req);
                }
            }
        }
    }

    pub fn definition(&self, id: QuestId) -> Option<Arc<QuestDefinition>> {
        self.quests.get(&id).cloned()
    }

    pub fn contains(&self, id: QuestId) -> bool {
        self.quests.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<QuestDefinition>> {
        self.quests.values()
    }
}

fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), QuestError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| QuestError::Catalog(format!("failed to read directory {:?}: {}", dir, e)))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| QuestError::Catalog(format!("failed to read entry: {}", e)))?;
        let path = entry.path();

        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().map_or(false, |ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}
