//! Crawler module for recipe page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with per-request deadlines
//! - Structured recipe extraction (JSON-LD first, CSS selectors second)
//! - Normalization of ingredients, durations and servings
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod normalize;
mod parser;
mod recipe;

pub use coordinator::{AbandonedUrl, CrawlSummary, CrawlTarget, Crawler, EndReason, SkippedSite};
pub use fetcher::{build_http_client, fetch_url, FetchFailure, FetchResult, FetchedPage};
pub use parser::{parse_recipe, ParseError};
pub use recipe::{Ingredient, NormalizedRecipe, Step};

pub use crate::queue::FailureKind;
