//! Markdown report generation
//!
//! The report lists every URL abandoned during a run, grouped by domain and
//! then by failure kind, after a short header describing the run.

use crate::crawler::{AbandonedUrl, CrawlSummary};
use crate::output::OutputResult;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the abandoned-URL report for a run
///
/// # Arguments
///
/// * `summary` - The finished run
/// * `output_path` - Path where the markdown file should be written
pub fn write_abandoned_report(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_abandoned_report(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats the abandoned-URL report as markdown
pub fn format_abandoned_report(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Ladle Crawl Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Ended**: {}\n", summary.end_reason));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        summary.duration_ms as f64 / 1000.0
    ));
    md.push_str(&format!("- **Recipes Ingested**: {}\n", summary.done));
    md.push_str(&format!("- **Abandoned**: {}\n", summary.abandoned));
    md.push_str(&format!("- **Left Pending**: {}\n\n", summary.pending_left));

    if !summary.skipped_sites.is_empty() {
        md.push_str("## Skipped Sites\n\n");
        md.push_str("| Domain | Reason |\n");
        md.push_str("|--------|--------|\n");
        for site in &summary.skipped_sites {
            md.push_str(&format!(
                "| {} | {} |\n",
                site.domain,
                escape_cell(&site.reason)
            ));
        }
        md.push('\n');
    }

    md.push_str("## Abandoned URLs\n\n");
    if summary.abandoned_urls.is_empty() {
        md.push_str("None.\n");
        return md;
    }

    for (domain, by_kind) in group_abandoned(&summary.abandoned_urls) {
        md.push_str(&format!("### {}\n\n", domain));
        for (kind, entries) in by_kind {
            md.push_str(&format!("#### {} ({})\n\n", kind, entries.len()));
            md.push_str("| URL | Error |\n");
            md.push_str("|-----|-------|\n");
            for entry in entries {
                md.push_str(&format!(
                    "| {} | {} |\n",
                    entry.url,
                    escape_cell(&entry.message)
                ));
            }
            md.push('\n');
        }
    }

    md
}

type Grouped<'a> = BTreeMap<&'a str, BTreeMap<String, Vec<&'a AbandonedUrl>>>;

fn group_abandoned(abandoned: &[AbandonedUrl]) -> Grouped<'_> {
    let mut grouped: Grouped<'_> = BTreeMap::new();
    for entry in abandoned {
        grouped
            .entry(entry.domain.as_str())
            .or_default()
            .entry(entry.kind.to_string())
            .or_default()
            .push(entry);
    }
    grouped
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{EndReason, FailureKind, SkippedSite};

    fn abandoned(url: &str, domain: &str, kind: FailureKind, message: &str) -> AbandonedUrl {
        AbandonedUrl {
            url: url.to_string(),
            domain: domain.to_string(),
            kind,
            message: message.to_string(),
        }
    }

    fn create_test_summary() -> CrawlSummary {
        CrawlSummary {
            run_id: 7,
            done: 12,
            abandoned: 3,
            pending_left: 0,
            duration_ms: 4500,
            abandoned_urls: vec![
                abandoned(
                    "https://b.example/recipes/x",
                    "b.example",
                    FailureKind::Http4xx,
                    "HTTP 404",
                ),
                abandoned(
                    "https://a.example/recipes/y",
                    "a.example",
                    FailureKind::Parse,
                    "no recipe | data",
                ),
                abandoned(
                    "https://a.example/recipes/z",
                    "a.example",
                    FailureKind::Parse,
                    "no recipe data",
                ),
            ],
            skipped_sites: vec![SkippedSite {
                domain: "c.example".to_string(),
                reason: "HTTP 500".to_string(),
            }],
            end_reason: EndReason::Drained,
        }
    }

    #[test]
    fn test_report_header() {
        let markdown = format_abandoned_report(&create_test_summary());

        assert!(markdown.contains("# Ladle Crawl Report"));
        assert!(markdown.contains("- **Run ID**: 7"));
        assert!(markdown.contains("- **Ended**: drained"));
        assert!(markdown.contains("- **Duration**: 4.5 seconds"));
        assert!(markdown.contains("| c.example | HTTP 500 |"));
    }

    #[test]
    fn test_report_groups_by_domain_then_kind() {
        let markdown = format_abandoned_report(&create_test_summary());

        let a = markdown.find("### a.example").unwrap();
        let b = markdown.find("### b.example").unwrap();
        assert!(a < b);
        assert!(markdown.contains("#### parse (2)"));
        assert!(markdown.contains("#### http_4xx (1)"));
        assert!(markdown.contains("| https://a.example/recipes/y | no recipe \\| data |"));
    }

    #[test]
    fn test_report_without_abandoned() {
        let mut summary = create_test_summary();
        summary.abandoned_urls.clear();
        summary.skipped_sites.clear();

        let markdown = format_abandoned_report(&summary);
        assert!(markdown.ends_with("## Abandoned URLs\n\nNone.\n"));
        assert!(!markdown.contains("Skipped Sites"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");

        write_abandoned_report(&create_test_summary(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("https://b.example/recipes/x"));
    }
}
