//! URL handling module for Ladle
//!
//! This module provides URL normalization (the crawl queue's dedup key),
//! the fetchable form of discovered URLs, and site/host matching.

mod domain;
mod normalize;

pub use domain::{canonical_domain, host_belongs_to};
pub use normalize::{fetch_url_form, normalize_url};
