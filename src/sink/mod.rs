//! Ingestion sinks
//!
//! The scraper's only output contract: each normalized recipe is handed to
//! [`IngestSink::ingest`] exactly once per successful parse. How repeated
//! recipes from the same source URL are reconciled is the sink's decision;
//! both sinks here keep the first copy and report later ones as duplicates.

use crate::crawler::NormalizedRecipe;
use crate::storage::{SqliteStorage, Storage};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The recipe is already known; not an error for the crawl
    #[error("Recipe already ingested: {0}")]
    Duplicate(String),

    #[error("Ingestion failed: {0}")]
    Failed(String),
}

/// Destination for normalized recipes
#[async_trait]
pub trait IngestSink: Send + Sync {
    async fn ingest(&self, recipe: NormalizedRecipe) -> Result<(), IngestError>;
}

/// Stores recipes in the `recipes` table of the crawl database
pub struct SqliteRecipeSink {
    storage: Mutex<SqliteStorage>,
}

impl SqliteRecipeSink {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }
}

#[async_trait]
impl IngestSink for SqliteRecipeSink {
    async fn ingest(&self, recipe: NormalizedRecipe) -> Result<(), IngestError> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| IngestError::Failed("recipe store lock poisoned".to_string()))?;

        match storage.insert_recipe(&recipe) {
            Ok(true) => Ok(()),
            Ok(false) => Err(IngestError::Duplicate(recipe.source_url)),
            Err(e) => Err(IngestError::Failed(e.to_string())),
        }
    }
}

/// Keeps recipes in memory, in ingestion order
#[derive(Default)]
pub struct MemorySink {
    recipes: Mutex<Vec<NormalizedRecipe>>,
    seen: Mutex<HashSet<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of everything ingested so far
    pub fn recipes(&self) -> Vec<NormalizedRecipe> {
        self.recipes
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.recipes.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IngestSink for MemorySink {
    async fn ingest(&self, recipe: NormalizedRecipe) -> Result<(), IngestError> {
        let poisoned = || IngestError::Failed("memory sink lock poisoned".to_string());

        if !self
            .seen
            .lock()
            .map_err(|_| poisoned())?
            .insert(recipe.source_url.clone())
        {
            return Err(IngestError::Duplicate(recipe.source_url));
        }
        self.recipes.lock().map_err(|_| poisoned())?.push(recipe);
        Ok(())
    }
}
