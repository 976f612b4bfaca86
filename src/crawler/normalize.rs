//! Text heuristics for recipe fields
//!
//! Ingredient lines, durations and yields arrive as free text in every
//! imaginable format. These helpers are best-effort: anything they cannot
//! make sense of is returned unchanged (ingredients) or as `None`.

use crate::crawler::recipe::Ingredient;
use lazy_static::lazy_static;
use regex::Regex;

const FRACTIONS: &str = "¼½¾⅓⅔⅛⅜⅝⅞";

lazy_static! {
    // "2", "1.5", "1/2", "1 1/2", "1½", "½", optionally a range "2-3" / "2 to 3"
    static ref INGREDIENT_LINE: Regex = {
        let quantity = format!(
            r"(?:\d+(?:[.,]\d+)?(?:\s+\d+/\d+|/\d+)?[{f}]?|[{f}])",
            f = FRACTIONS
        );
        let units = [
            "cups?", "c", "tablespoons?", "tbsps?", "tbs", "teaspoons?", "tsps?",
            "ounces?", "oz", "fl\\.? oz", "pounds?", "lbs?", "grams?", "g", "kilograms?", "kg",
            "milliliters?", "millilitres?", "ml", "liters?", "litres?", "l",
            "pints?", "quarts?", "qt", "gallons?", "cloves?", "cans?", "packages?",
            "pinch(?:es)?", "dash(?:es)?", "sticks?", "slices?", "bunch(?:es)?",
            "sprigs?", "handfuls?", "pieces?",
        ]
        .join("|");
        Regex::new(&format!(
            r"(?i)^\s*(?P<amount>{q}(?:\s*(?:-|–|to)\s*{q})?)\s*(?:(?P<unit>{u})\b\.?)?\s*(?P<name>.+?)\s*$",
            q = quantity,
            u = units
        ))
        .unwrap()
    };

    static ref ISO_DURATION: Regex = Regex::new(
        r"(?i)^P(?:(?P<d>\d+(?:\.\d+)?)D)?(?:T(?:(?P<h>\d+(?:\.\d+)?)H)?(?:(?P<m>\d+(?:\.\d+)?)M)?(?:(?P<s>\d+(?:\.\d+)?)S)?)?$"
    )
    .unwrap();

    static ref TEXT_DURATION: Regex = Regex::new(
        r"(?i)(?P<n>\d+(?:\.\d+)?)\s*(?P<unit>days?|d|hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)\b"
    )
    .unwrap();

    // Only spelled-out units, so "2 m pieces" or "350 F" never read as time
    static ref STEP_DURATION: Regex = Regex::new(
        r"(?i)\b(?P<low>\d+)(?:\s*(?:-|–|to)\s*(?P<high>\d+))?\s*(?P<unit>hours?|hrs?|minutes?|mins?|seconds?|secs?)\b"
    )
    .unwrap();

    static ref INTEGER: Regex = Regex::new(r"\d+").unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Splits an ingredient line into amount, unit and name
///
/// "2 cups broth" becomes amount "2", unit "cups", name "broth". A line
/// without a leading quantity is kept whole as the name.
pub fn split_ingredient(line: &str) -> Ingredient {
    let line = clean_text(line);

    if let Some(caps) = INGREDIENT_LINE.captures(&line) {
        let name = caps.name("name").map_or("", |m| m.as_str());
        let name = strip_prefix_ci(name, "of ").trim();
        if !name.is_empty() {
            return Ingredient {
                name: name.to_string(),
                amount: caps
                    .name("amount")
                    .map_or(String::new(), |m| m.as_str().trim().to_string()),
                unit: caps
                    .name("unit")
                    .map_or(String::new(), |m| m.as_str().to_string()),
            };
        }
    }

    Ingredient {
        name: line,
        amount: String::new(),
        unit: String::new(),
    }
}

/// Parses an ISO 8601 duration ("PT1H15M") or free text ("1 hr 15 min")
/// into whole seconds
///
/// Zero-length durations are treated as absent.
pub fn parse_duration_seconds(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let seconds = match ISO_DURATION.captures(text) {
        Some(caps) => {
            let part = |name: &str| {
                caps.name(name)
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .unwrap_or(0.0)
            };
            part("d") * 86_400.0 + part("h") * 3_600.0 + part("m") * 60.0 + part("s")
        }
        None => {
            let mut total = 0.0;
            let mut matched = false;
            for caps in TEXT_DURATION.captures_iter(text) {
                let Ok(n) = caps["n"].parse::<f64>() else {
                    continue;
                };
                total += n * unit_seconds(&caps["unit"]);
                matched = true;
            }
            if !matched {
                return None;
            }
            total
        }
    };

    if seconds <= 0.0 || seconds > u32::MAX as f64 {
        return None;
    }
    Some(seconds.round() as u32)
}

/// Same as [`parse_duration_seconds`], rounded to the nearest minute
///
/// Durations that round down to zero minutes are absent.
pub fn parse_duration_minutes(text: &str) -> Option<u32> {
    let minutes = parse_duration_seconds(text)?.saturating_add(30) / 60;
    (minutes > 0).then_some(minutes)
}

/// Reads a duration mentioned in step text ("simmer for 10 minutes")
///
/// For a range ("bake 25-30 minutes") the upper bound is used.
pub fn infer_step_seconds(text: &str) -> Option<u32> {
    let caps = STEP_DURATION.captures(text)?;
    let value = caps
        .name("high")
        .or_else(|| caps.name("low"))?
        .as_str()
        .parse::<f64>()
        .ok()?;
    let seconds = value * unit_seconds(&caps["unit"]);
    (seconds > 0.0 && seconds <= u32::MAX as f64).then(|| seconds as u32)
}

/// First integer in a yield string ("Serves 4-6" -> 4)
pub fn first_integer(text: &str) -> Option<u32> {
    INTEGER
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .filter(|n| *n > 0)
}

/// Strips markup, decodes common entities and collapses whitespace
pub fn clean_text(text: &str) -> String {
    let without_tags = TAG.replace_all(text, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn unit_seconds(unit: &str) -> f64 {
    let unit = unit.to_ascii_lowercase();
    if unit.starts_with('d') {
        86_400.0
    } else if unit.starts_with('h') {
        3_600.0
    } else if unit.starts_with('m') {
        60.0
    } else {
        1.0
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> &'a str {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &s[prefix.len()..],
        _ => s,
    }
}
