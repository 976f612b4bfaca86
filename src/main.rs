//! Ladle main entry point
//!
//! This is the command-line interface for the Ladle recipe scraper.

use clap::Parser;
use ladle::config::{load_config_with_hash, Config};
use ladle::sink::SqliteRecipeSink;
use ladle::storage::{SqliteStorage, Storage};
use ladle::{CrawlTarget, Crawler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Ladle: a polite recipe-site scraper
///
/// Ladle discovers recipe pages through the sitemaps of an allow-list of
/// cooking sites, fetches them under per-host politeness limits, and stores
/// the normalized recipes in its SQLite database.
#[derive(Parser, Debug)]
#[command(name = "ladle")]
#[command(version)]
#[command(about = "A polite recipe-site scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Crawl a single configured site instead of all of them
    #[arg(long, value_name = "DOMAIN")]
    site: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Clear the queue and abandoned log before crawling (stored recipes are kept)
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "list_sites"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "list_sites"])]
    stats: bool,

    /// List configured sites and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    list_sites: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.list_sites {
        handle_list_sites(&config);
    } else {
        let target = match cli.site {
            Some(domain) => CrawlTarget::Site(domain),
            None => CrawlTarget::All,
        };
        handle_crawl(config, config_hash, target, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ladle=info,warn"),
            1 => EnvFilter::new("ladle=debug,info"),
            2 => EnvFilter::new("ladle=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Ladle Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Fetch timeout: {}ms", config.crawler.fetch_timeout_ms);
    println!("  Stall timeout: {}s", config.crawler.stall_timeout_secs);
    println!(
        "  Retry backoff: {}ms base, {}ms cap",
        config.crawler.backoff_base_ms, config.crawler.backoff_cap_ms
    );
    println!("  Sitemap max depth: {}", config.crawler.sitemap_max_depth);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Report: {}", config.output.report_path);

    println!("\nSites ({}):", config.sites.len());
    for site in &config.sites {
        println!(
            "  - {} (concurrency {}, delay {}ms, retries {}, robots {})",
            site.domain,
            site.max_concurrency,
            site.request_delay_ms,
            site.retry_limit,
            if site.respect_robots { "on" } else { "off" }
        );
        println!("    recipe paths: {}", site.recipe_path_pattern);
        if site.sitemap_urls.is_empty() {
            println!("    sitemaps: from robots.txt or /sitemap.xml");
        }
        for sitemap in &site.sitemap_urls {
            println!("    * {}", sitemap);
        }
        for (field, rule) in site.selectors.iter() {
            println!("    {} -> {}", field, rule.selector());
        }
    }

    // Building the registry also compiles patterns and selectors
    let registry = ladle::SiteRegistry::from_config(config)?;
    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} site(s)", registry.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use ladle::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --list-sites mode
fn handle_list_sites(config: &Config) {
    for site in &config.sites {
        println!("{}", site.domain);
    }
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    target: CrawlTarget,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    use ladle::output::{print_summary, write_abandoned_report};

    let database_path = PathBuf::from(&config.output.database_path);
    let report_path = PathBuf::from(&config.output.report_path);

    if fresh {
        tracing::info!("Clearing queue and abandoned log");
        SqliteStorage::new(&database_path)?.clear_queue()?;
    }

    let sink = Arc::new(SqliteRecipeSink::new(SqliteStorage::new(&database_path)?));
    let crawler = Crawler::new(config, sink)?.with_config_hash(config_hash);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping workers");
            signal_token.cancel();
        }
    });

    let summary = match crawler.run(target, cancel).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    print_summary(&summary);
    write_abandoned_report(&summary, &report_path)?;
    println!("✓ Report written to: {}", report_path.display());

    Ok(())
}
