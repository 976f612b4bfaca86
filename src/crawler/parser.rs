//! Recipe extraction from fetched HTML
//!
//! Extraction prefers an embedded schema.org `Recipe` JSON-LD block. Pages
//! without one (or with an unusable one) fall back to the site's declarative
//! selector rules, interpreted by the same generic routine for every site.

use crate::config::{SelectorRule, SelectorRules};
use crate::crawler::fetcher::FetchedPage;
use crate::crawler::normalize::{
    clean_text, first_integer, infer_step_seconds, parse_duration_minutes,
    parse_duration_seconds, split_ingredient,
};
use crate::crawler::recipe::{Ingredient, NormalizedRecipe, Step};
use crate::registry::SiteConfig;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;

/// Why a page could not be turned into a recipe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    fn no_recipe() -> Self {
        Self("no structured or selector-matched recipe data".to_string())
    }
}

/// Fields extracted by one strategy, before completeness is checked
#[derive(Debug, Default)]
struct Extracted {
    title: Option<String>,
    servings: Option<u32>,
    total_time_minutes: Option<u32>,
    ingredients: Vec<Ingredient>,
    steps: Vec<Step>,
}

/// Parses a fetched page into a normalized recipe
///
/// # Algorithm
///
/// 1. A JSON-LD `Recipe` with a name and at least one ingredient is used
///    directly. If it carries no instructions, steps come from the site's
///    `steps` selector.
/// 2. Otherwise every field comes from the site's selector rules. Without a
///    title rule the first `<h1>`, then `<title>`, is used.
/// 3. A result without ingredients or without steps is a [`ParseError`].
///
/// # Arguments
///
/// * `page` - A successfully fetched page
/// * `site` - Configuration of the site the page belongs to
pub fn parse_recipe(page: &FetchedPage, site: &SiteConfig) -> Result<NormalizedRecipe, ParseError> {
    let html = page.text();
    let document = Html::parse_document(&html);

    let extracted = match extract_from_json_ld(&document) {
        Some(mut structured) => {
            if structured.steps.is_empty() {
                if let Some(rule) = &site.selector_rules.steps {
                    structured.steps = select_steps(&document, rule)?;
                }
            }
            structured
        }
        None => extract_from_selectors(&document, &site.selector_rules)?,
    };

    let title = extracted
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(ParseError::no_recipe)?;
    if extracted.ingredients.is_empty() || extracted.steps.is_empty() {
        return Err(ParseError::no_recipe());
    }

    Ok(NormalizedRecipe {
        source_url: page.url.clone(),
        title,
        servings: extracted.servings,
        total_time_minutes: extracted.total_time_minutes,
        ingredients: extracted.ingredients,
        steps: extracted.steps,
        fetched_at: Utc::now(),
    })
}

// ===== JSON-LD =====

/// Finds the first usable `Recipe` object among the page's JSON-LD blocks
fn extract_from_json_ld(document: &Html) -> Option<Extracted> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    for script in document.select(&selector) {
        let raw = script.text().collect::<String>();
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Skipping malformed JSON-LD block: {}", e);
                continue;
            }
        };

        let mut recipes = Vec::new();
        collect_recipes(&value, &mut recipes);

        for recipe in recipes {
            let extracted = recipe_from_json(recipe);
            if extracted.title.is_some() && !extracted.ingredients.is_empty() {
                return Some(extracted);
            }
        }
    }

    None
}

/// Collects `Recipe` objects from arrays, `@graph` containers and `mainEntity`
fn collect_recipes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_recipes(item, out);
            }
        }
        Value::Object(map) => {
            if has_type(value, "Recipe") {
                out.push(value);
                return;
            }
            for key in ["@graph", "mainEntity", "mainEntityOfPage"] {
                if let Some(nested) = map.get(key) {
                    collect_recipes(nested, out);
                }
            }
        }
        _ => {}
    }
}

/// Checks `@type`, which may be a string or an array of strings
fn has_type(value: &Value, wanted: &str) -> bool {
    let matches = |t: &str| t == wanted || t.ends_with(&format!("/{}", wanted));
    match value.get("@type") {
        Some(Value::String(t)) => matches(t.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn recipe_from_json(recipe: &Value) -> Extracted {
    let title = recipe
        .get("name")
        .or_else(|| recipe.get("headline"))
        .and_then(Value::as_str)
        .map(clean_text)
        .filter(|t| !t.is_empty());

    let ingredients = recipe
        .get("recipeIngredient")
        .or_else(|| recipe.get("ingredients"))
        .map(string_list)
        .unwrap_or_default()
        .iter()
        .map(|line| split_ingredient(line))
        .filter(|i| !i.name.is_empty())
        .collect();

    let mut steps = Vec::new();
    if let Some(instructions) = recipe.get("recipeInstructions") {
        collect_steps(instructions, &mut steps);
    }

    let total_time_minutes = recipe
        .get("totalTime")
        .and_then(Value::as_str)
        .and_then(parse_duration_minutes)
        .or_else(|| {
            let prep = recipe.get("prepTime").and_then(Value::as_str).and_then(parse_duration_minutes);
            let cook = recipe.get("cookTime").and_then(Value::as_str).and_then(parse_duration_minutes);
            match (prep, cook) {
                (None, None) => None,
                (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
            }
        });

    Extracted {
        title,
        servings: recipe.get("recipeYield").and_then(parse_yield),
        total_time_minutes,
        ingredients,
        steps,
    }
}

/// Flattens `recipeInstructions` in any of its published shapes
fn collect_steps(value: &Value, out: &mut Vec<Step>) {
    match value {
        Value::String(text) => {
            // A single blob; sites separate steps with line breaks or paragraphs
            let text = text.replace("</p>", "\n").replace("<br>", "\n").replace("<br/>", "\n");
            for line in text.lines() {
                push_step(out, line, None);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_steps(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(list) = map.get("itemListElement") {
                collect_steps(list, out);
                return;
            }
            let text = map
                .get("text")
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let explicit = map
                .get("timeRequired")
                .or_else(|| map.get("performTime"))
                .and_then(Value::as_str)
                .and_then(parse_duration_seconds);
            push_step(out, text, explicit);
        }
        _ => {}
    }
}

fn push_step(out: &mut Vec<Step>, text: &str, duration_seconds: Option<u32>) {
    let text = clean_text(text);
    if text.is_empty() {
        return;
    }
    let duration_seconds = duration_seconds.or_else(|| infer_step_seconds(&text));
    out.push(Step {
        text,
        duration_seconds,
    });
}

/// Reads `recipeYield`: a number, a string like "4 servings", or an array of either
fn parse_yield(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0),
        Value::String(s) => first_integer(s),
        Value::Array(items) => items.iter().find_map(parse_yield),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

// ===== Selector Rules =====

fn extract_from_selectors(document: &Html, rules: &SelectorRules) -> Result<Extracted, ParseError> {
    let title = match &rules.title {
        Some(rule) => select_values(document, rule)?.into_iter().next(),
        None => None,
    }
    .or_else(|| first_text(document, "h1"))
    .or_else(|| first_text(document, "title"));

    let ingredients = match &rules.ingredients {
        Some(rule) => select_values(document, rule)?
            .iter()
            .map(|line| split_ingredient(line))
            .collect(),
        None => Vec::new(),
    };

    let steps = match &rules.steps {
        Some(rule) => select_steps(document, rule)?,
        None => Vec::new(),
    };

    let total_time_minutes = match &rules.total_time {
        Some(rule) => select_values(document, rule)?
            .first()
            .and_then(|t| parse_duration_minutes(t)),
        None => None,
    };

    let servings = match &rules.servings {
        Some(rule) => select_values(document, rule)?
            .first()
            .and_then(|s| first_integer(s)),
        None => None,
    };

    Ok(Extracted {
        title,
        servings,
        total_time_minutes,
        ingredients,
        steps,
    })
}

fn select_steps(document: &Html, rule: &SelectorRule) -> Result<Vec<Step>, ParseError> {
    let mut steps = Vec::new();
    for text in select_values(document, rule)? {
        push_step(&mut steps, &text, None);
    }
    Ok(steps)
}

/// Applies a rule and returns the non-empty text (or attribute) of each match
fn select_values(document: &Html, rule: &SelectorRule) -> Result<Vec<String>, ParseError> {
    let selector = Selector::parse(rule.selector())
        .map_err(|e| ParseError(format!("invalid selector '{}': {}", rule.selector(), e)))?;

    Ok(document
        .select(&selector)
        .filter_map(|element| match rule.attribute() {
            Some(attr) => element.value().attr(attr).map(clean_text),
            None => Some(element_text(element)),
        })
        .filter(|s| !s.is_empty())
        .collect())
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(element_text)
        .find(|s| !s.is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}
