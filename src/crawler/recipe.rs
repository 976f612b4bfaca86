//! Normalized recipe schema
//!
//! Every site, whether it publishes JSON-LD or only styled HTML, is reduced
//! to these types before the recipe leaves the scraper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ingredient line split into quantity, unit and name
///
/// Lines the quantity heuristic cannot split keep the whole text in `name`
/// with an empty `amount` and `unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub amount: String,
    pub unit: String,
}

/// One instruction step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    pub duration_seconds: Option<u32>,
}

/// A recipe in the canonical schema handed to the ingestion sink
///
/// A value of this type always has at least one ingredient and one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecipe {
    pub source_url: String,
    pub title: String,
    pub servings: Option<u32>,
    pub total_time_minutes: Option<u32>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    pub fetched_at: DateTime<Utc>,
}
