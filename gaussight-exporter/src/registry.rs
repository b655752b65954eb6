//! The active definition table and its atomic replacement on reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use gaussight_common::{QueryDefinition, load_definitions};

/// Reload failures. The previous table stays active.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("No query definition path configured")]
    NoPath,

    #[error(transparent)]
    Load(#[from] gaussight_common::Error),
}

/// An immutable set of definitions, ordered by (priority, name).
#[derive(Debug, Clone)]
pub struct DefinitionTable {
    definitions: Vec<Arc<QueryDefinition>>,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

impl DefinitionTable {
    /// Build a table; a later definition replaces an earlier one with the same name.
    pub fn new(definitions: Vec<QueryDefinition>) -> Self {
        Self::with_generation(definitions, 0)
    }

    fn with_generation(definitions: Vec<QueryDefinition>, generation: u64) -> Self {
        let mut by_name = std::collections::BTreeMap::new();
        for def in definitions {
            by_name.insert(def.name().to_string(), Arc::new(def));
        }

        let mut definitions: Vec<_> = by_name.into_values().collect();
        definitions.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.name().cmp(b.name()))
        });

        Self {
            definitions,
            generation,
            loaded_at: Utc::now(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<QueryDefinition>> {
        self.definitions.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<QueryDefinition>> {
        self.definitions.iter().find(|d| d.name() == name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Number of reloads that produced this table.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Holds the active table. Scrapes take a snapshot; reloads swap the pointer.
pub struct DefinitionRegistry {
    current: ArcSwap<DefinitionTable>,
    path: Option<PathBuf>,
    generation: AtomicU64,
}

impl DefinitionRegistry {
    /// Registry over a fixed table, without a reload source.
    pub fn new(table: DefinitionTable) -> Self {
        Self {
            generation: AtomicU64::new(table.generation()),
            current: ArcSwap::from_pointee(table),
            path: None,
        }
    }

    /// Load definitions from `path`; reloads read the same path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReloadError> {
        let path = path.as_ref().to_path_buf();
        let table = DefinitionTable::new(load_definitions(&path)?);
        Ok(Self {
            current: ArcSwap::from_pointee(table),
            path: Some(path),
            generation: AtomicU64::new(0),
        })
    }

    /// The table in effect now. Stays valid across later reloads.
    pub fn snapshot(&self) -> Arc<DefinitionTable> {
        self.current.load_full()
    }

    /// Publish a new table.
    pub fn publish(&self, definitions: Vec<QueryDefinition>) -> Arc<DefinitionTable> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let table = Arc::new(DefinitionTable::with_generation(definitions, generation));
        self.current.store(table.clone());
        info!(
            definitions = table.len(),
            generation, "Published definition table"
        );
        table
    }

    /// Re-read the configured path and publish the result.
    pub fn reload(&self) -> Result<Arc<DefinitionTable>, ReloadError> {
        let path = self.path.as_ref().ok_or(ReloadError::NoPath)?;
        let definitions = load_definitions(path)?;
        Ok(self.publish(definitions))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
