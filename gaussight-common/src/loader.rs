//! Query-definition loading from a JSON5 file or a directory of them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{load_config, parse_config};
use crate::definition::{MAX_PRIORITY, QueryDefinition, QueryDefinitionSpec};
use crate::error::{Error, Result};

/// Extension of definition files picked up from a directory.
pub const DEFINITION_EXTENSION: &str = "json5";

/// Base priority for definitions that do not set one.
pub const RANK_PRIORITY_BASE: u32 = 100;

/// Load definitions from `path`, ordered by (priority, name).
///
/// A file path is loaded as a single definition map; any invalid
/// definition rejects the file. A directory loads every `*.json5` file
/// in it (not recursively) in alphabetical order, skipping files that
/// fail. Definitions without a priority get `100 + rank` of their file,
/// and a later file overrides an earlier one with the same name.
pub fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<QueryDefinition>> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path).map_err(|e| {
        Error::Config(format!("Invalid query path '{}': {}", path.display(), e))
    })?;

    let merged = if metadata.is_dir() {
        load_dir(path)?
    } else {
        let mut merged = BTreeMap::new();
        for def in load_file(path)? {
            let def = assign_priority(def, 1)?;
            merged.insert(def.name().to_string(), def);
        }
        merged
    };

    let mut definitions: Vec<QueryDefinition> = merged.into_values().collect();
    definitions.sort_by(|a, b| {
        a.priority()
            .cmp(&b.priority())
            .then_with(|| a.name().cmp(b.name()))
    });

    info!(
        path = %path.display(),
        definitions = definitions.len(),
        "Loaded query definitions"
    );

    Ok(definitions)
}

/// Parse a JSON5 map of definitions. Every definition must pass its check.
pub fn parse_definitions(content: &str) -> Result<Vec<QueryDefinition>> {
    build_all(parse_config(content)?)
}

fn build_all(specs: BTreeMap<String, QueryDefinitionSpec>) -> Result<Vec<QueryDefinition>> {
    specs
        .into_iter()
        .map(|(name, spec)| QueryDefinition::build(name, spec).map_err(Error::from))
        .collect()
}

fn load_file(path: &Path) -> Result<Vec<QueryDefinition>> {
    build_all(load_config(path)?).map_err(|e| {
        Error::Config(format!(
            "Invalid definitions in '{}': {}",
            path.display(),
            e
        ))
    })
}

fn load_dir(dir: &Path) -> Result<BTreeMap<String, QueryDefinition>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file() && p.extension().is_some_and(|ext| ext == DEFINITION_EXTENSION)
        })
        .collect();
    files.sort();

    let mut merged = BTreeMap::new();
    let mut rank = 0u32;
    for file in &files {
        let definitions = match load_file(file) {
            Ok(defs) => defs,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Skipping definition file");
                continue;
            }
        };

        rank += 1;
        for def in definitions {
            let def = assign_priority(def, rank)?;
            if merged.contains_key(def.name()) {
                info!(
                    query = %def.name(),
                    file = %file.display(),
                    "Definition overridden by later file"
                );
            }
            merged.insert(def.name().to_string(), def);
        }
    }

    info!(
        dir = %dir.display(),
        files = files.len(),
        loaded = rank,
        "Merged definition directory"
    );

    Ok(merged)
}

fn assign_priority(def: QueryDefinition, rank: u32) -> Result<QueryDefinition> {
    if def.priority() != 0 {
        return Ok(def);
    }
    let priority = (RANK_PRIORITY_BASE + rank).min(MAX_PRIORITY);
    Ok(def.with_priority(priority)?)
}
