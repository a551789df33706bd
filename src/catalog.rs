// SPDX-License-Identifier: MIT
//! Catalog CRUD with write-time validation.
//!
//! Every definition entering the catalog is checked here: at least one
//! condition and one reward, every prerequisite id resolves, and the
//! prerequisite graph stays acyclic. Invalid definitions never reach the
//! engine. Deletion is refused while dependent user records exist unless
//! the caller passes the cascade flag.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::EngineError;
use crate::model::AchievementDefinition;
use crate::store::AchievementStore;

/// Walk prerequisite edges from `def`'s prerequisites; finding `def.id`
/// again means the write would close a cycle. The existing catalog is
/// acyclic by invariant, so any new cycle must pass through `def.id`.
fn closes_cycle(def: &AchievementDefinition, graph: &HashMap<String, Vec<String>>) -> bool {
    let mut stack: Vec<&str> = def.prerequisites.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    while let Some(id) = stack.pop() {
        if id == def.id {
            return true;
        }
        if !seen.insert(id) {
            continue;
        }
        if let Some(prereqs) = graph.get(id) {
            stack.extend(prereqs.iter().map(String::as_str));
        }
    }
    false
}

fn validate(
    def: &AchievementDefinition,
    existing: &[AchievementDefinition],
) -> Result<(), EngineError> {
    if def.conditions.is_empty() {
        return Err(EngineError::MissingConditions { id: def.id.clone() });
    }
    if def.rewards.is_empty() {
        return Err(EngineError::MissingRewards { id: def.id.clone() });
    }

    // Prerequisite graph with this definition's edges replacing any previous
    // version of itself.
    let mut graph: HashMap<String, Vec<String>> = existing
        .iter()
        .filter(|d| d.id != def.id)
        .map(|d| (d.id.clone(), d.prerequisites.clone()))
        .collect();
    for prereq in &def.prerequisites {
        if prereq == &def.id {
            return Err(EngineError::PrerequisiteCycle { id: def.id.clone() });
        }
        if !graph.contains_key(prereq) {
            return Err(EngineError::UnknownPrerequisite {
                id: def.id.clone(),
                prerequisite: prereq.clone(),
            });
        }
    }
    graph.insert(def.id.clone(), def.prerequisites.clone());
    if closes_cycle(def, &graph) {
        return Err(EngineError::PrerequisiteCycle { id: def.id.clone() });
    }
    Ok(())
}

#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn AchievementStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn AchievementStore>) -> Self {
        Self { store }
    }

    /// Validate and insert a new definition.
    pub async fn create(
        &self,
        mut def: AchievementDefinition,
    ) -> Result<AchievementDefinition, EngineError> {
        let existing = self.store.list_definitions().await?;
        if existing.iter().any(|d| d.id == def.id) {
            return Err(EngineError::DefinitionExists { id: def.id });
        }
        validate(&def, &existing)?;
        def.version = 1;
        def.created_at = Utc::now();
        def.updated_at = def.created_at;
        self.store.insert_definition(&def).await?;
        info!(id = %def.id, "achievement definition created");
        Ok(def)
    }

    pub async fn get(&self, id: &str) -> Result<AchievementDefinition, EngineError> {
        self.store
            .get_definition(id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound { id: id.to_string() })
    }

    pub async fn list(&self) -> Result<Vec<AchievementDefinition>, EngineError> {
        Ok(self.store.list_definitions().await?)
    }

    pub async fn list_active(&self) -> Result<Vec<AchievementDefinition>, EngineError> {
        Ok(self
            .store
            .list_definitions()
            .await?
            .into_iter()
            .filter(|d| d.active)
            .collect())
    }

    /// Validate and apply an update; the stored version bumps by one.
    pub async fn update(
        &self,
        mut def: AchievementDefinition,
    ) -> Result<AchievementDefinition, EngineError> {
        let existing = self.store.list_definitions().await?;
        let current = existing
            .iter()
            .find(|d| d.id == def.id)
            .ok_or_else(|| EngineError::DefinitionNotFound { id: def.id.clone() })?;
        validate(&def, &existing)?;
        def.version = current.version + 1;
        def.created_at = current.created_at;
        def.updated_at = Utc::now();
        self.store.update_definition(&def).await?;
        info!(id = %def.id, version = def.version, "achievement definition updated");
        Ok(def)
    }

    /// Delete a definition. Refused with [`EngineError::DeletionBlocked`]
    /// while dependent user records exist, unless `cascade` removes them
    /// first. Returns the number of cascaded user records.
    pub async fn delete(&self, id: &str, cascade: bool) -> Result<u64, EngineError> {
        // Ensure the definition exists before touching dependents.
        self.get(id).await?;
        let dependents = self.store.count_dependent_records(id).await?;
        if dependents > 0 && !cascade {
            return Err(EngineError::DeletionBlocked {
                id: id.to_string(),
                dependents,
            });
        }
        let removed = if dependents > 0 {
            self.store.delete_dependent_records(id).await?
        } else {
            0
        };
        self.store.delete_definition(id).await?;
        info!(id, cascaded = removed, "achievement definition deleted");
        Ok(removed)
    }
}
