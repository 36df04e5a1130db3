mod addresses;
mod config;
mod corrections;
mod crawl;
mod detail;
mod error;
mod feed;
mod fetch;
mod model;
mod names;
mod pdf;
mod readme;
mod reconcile;
mod site;
mod store;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::addresses::TailAddressNormalizer;
use crate::config::DataDirs;
use crate::corrections::Corrections;
use crate::model::{PrivateRecord, PublicRecord, ReportType};
use crate::names::{CommaNameClassifier, NameCache};
use crate::site::SearchDriver;

#[derive(Parser)]
#[command(name = "sd_lobbyists", about = "South Dakota lobbyist registration pipeline")]
struct Cli {
    /// Data root for caches and published outputs
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download year exports and extract the canonical record sets
    Extract,
    /// Search the portal for every canonical last name
    Crawl,
    /// Fetch detail pages referenced by crawl results
    Fetch,
    /// Parse cached detail pages into structured registrations
    Parse,
    /// Verify canonical and scraped year coverage agree
    Reconcile,
    /// Rebuild the RSS change feed from this run's new content
    Feed,
    /// Full pipeline: extract through feed, gated by reconciliation
    Run,
    /// Show cache and dataset statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let dirs = DataDirs::new(&cli.data_dir);

    let result = match cli.command {
        Commands::Extract => {
            let corrections = Corrections::load(&dirs.corrections_path())?;
            let driver = site::PortalDriver::launch().await?;
            download_exports(&driver, &dirs).await?;
            let (mut public, private) = extract_canonical(&dirs, &corrections)?;
            store::write_public_dataset(&dirs, &mut public)?;
            println!(
                "Extracted {} public and {} private records",
                public.len(),
                private.len()
            );
            Ok(())
        }
        Commands::Crawl => {
            let corrections = Corrections::load(&dirs.corrections_path())?;
            let (_, private) = extract_canonical(&dirs, &corrections)?;
            let names = last_names_for_crawl(&private);
            if names.is_empty() {
                println!("No canonical names in the active year. Run 'extract' first.");
                return Ok(());
            }
            let driver = site::PortalDriver::launch().await?;
            let stubs = crawl::run_crawl(&driver, &dirs, &names).await?;
            let total: usize = stubs.values().map(Vec::len).sum();
            println!("Crawled {} name(s); {} result row(s) cached", stubs.len(), total);
            Ok(())
        }
        Commands::Fetch => {
            let stubs = store::load_all_stubs(&dirs)?;
            if stubs.is_empty() {
                println!("No crawl results on disk. Run 'crawl' first.");
                return Ok(());
            }
            let urls: Vec<String> = stubs
                .values()
                .flatten()
                .map(|stub| stub.url.clone())
                .collect();
            let client = fetch::http_client()?;
            let fetched = fetch::fetch_pages(&client, &dirs, &urls).await?;
            println!("Fetched {} new detail page(s)", fetched.len());
            Ok(())
        }
        Commands::Parse => {
            let registrations = parse_registrations(&dirs).await?;
            println!("Parsed {} registration(s) from cached pages", registrations.len());
            Ok(())
        }
        Commands::Reconcile => {
            let corrections = Corrections::load(&dirs.corrections_path())?;
            let (_, private) = extract_canonical(&dirs, &corrections)?;
            let registrations = parse_registrations(&dirs).await?;
            reconcile::verify(
                &reconcile::coverage_from_canonical(&private),
                &reconcile::coverage_from_scraped(&registrations),
                &corrections,
            )?;
            println!("Coverage verified: canonical and scraped datasets agree");
            Ok(())
        }
        Commands::Feed => {
            let registrations = parse_registrations(&dirs).await?;
            feed::build_feed(&dirs, &registrations)?;
            Ok(())
        }
        Commands::Run => run_pipeline(&dirs).await,
        Commands::Stats => {
            let cache = NameCache::load(&dirs.name_cache_path(), Box::new(CommaNameClassifier))?;
            println!("Exports:        {}", list_exports(&dirs)?.len());
            println!("Crawled names:  {}", count_files(&dirs.crawl_dir(), "json")?);
            println!("Cached pages:   {}", count_files(&dirs.pages_dir(), "html")?);
            println!("Filing docs:    {}", count_files(&dirs.filings_dir(), "pdf")?);
            println!("Name cache:     {}", cache.len());
            println!("Pending guids:  {}", store::load_new_guids(&dirs)?.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// One batch run: every stage in order, with reconciliation gating the
/// private dataset, feed, and README writes. Caches written by earlier
/// stages stay valid even when a later stage aborts.
async fn run_pipeline(dirs: &DataDirs) -> anyhow::Result<()> {
    let corrections = Corrections::load(&dirs.corrections_path())?;
    let driver = site::PortalDriver::launch().await?;

    let t = Instant::now();
    download_exports(&driver, dirs).await?;
    let (mut public, private) = extract_canonical(dirs, &corrections)?;
    store::write_public_dataset(dirs, &mut public)?;
    println!(
        "Extracted {} public / {} private records in {:.1}s",
        public.len(),
        private.len(),
        t.elapsed().as_secs_f64()
    );

    let t = Instant::now();
    let names = last_names_for_crawl(&private);
    let stubs = crawl::run_crawl(&driver, dirs, &names).await?;
    println!(
        "Crawled {} name(s) in {:.1}s",
        stubs.len(),
        t.elapsed().as_secs_f64()
    );
    drop(driver);

    let t = Instant::now();
    let urls: Vec<String> = stubs
        .values()
        .flatten()
        .map(|stub| stub.url.clone())
        .collect();
    let client = fetch::http_client()?;
    let fetched = fetch::fetch_pages(&client, dirs, &urls).await?;
    println!(
        "Fetched {} new page(s) in {:.1}s",
        fetched.len(),
        t.elapsed().as_secs_f64()
    );

    let cache = NameCache::load(&dirs.name_cache_path(), Box::new(CommaNameClassifier))?;
    let mut registrations =
        detail::parse_cached_pages(&client, dirs, &cache, &corrections, &TailAddressNormalizer)
            .await?;

    reconcile::verify(
        &reconcile::coverage_from_canonical(&private),
        &reconcile::coverage_from_scraped(&registrations),
        &corrections,
    )?;

    store::write_private_dataset(dirs, &mut registrations)?;
    feed::build_feed(dirs, &registrations)?;
    readme::write_readme(dirs, &public, &registrations)?;
    println!(
        "Published {} registrations and {} public records",
        registrations.len(),
        public.len()
    );
    Ok(())
}

/// Download any missing year exports. Past years already on disk are frozen;
/// the active year is always refreshed.
async fn download_exports(driver: &dyn SearchDriver, dirs: &DataDirs) -> error::Result<()> {
    let years = driver.year_options().await?;
    info!("Portal lists {} year option(s)", years.len());
    for year_text in &years {
        let Ok(year) = year_text.parse::<u16>() else {
            warn!("Ignoring year option {year_text:?}");
            continue;
        };
        for report in [ReportType::Public, ReportType::Private] {
            let path = dirs.export_path(report.as_str(), year);
            if year < config::active_year() && path.exists() {
                continue;
            }
            info!("Downloading the {} {} export", year, report.as_str());
            let bytes = driver.export_report(report, year_text).await?;
            store::atomic_write(&path, &bytes)?;
            config::polite_delay().await;
        }
    }
    Ok(())
}

/// Parse every export on disk into canonical records, resolving private
/// names through the cache (classifying and persisting any new ones).
fn extract_canonical(
    dirs: &DataDirs,
    corrections: &Corrections,
) -> error::Result<(Vec<PublicRecord>, Vec<PrivateRecord>)> {
    let mut public = Vec::new();
    let mut private = Vec::new();

    let exports = list_exports(dirs)?;
    if exports.is_empty() {
        warn!("No exports on disk under {}", dirs.exports_dir().display());
    }
    for (report, path) in exports {
        let bytes = std::fs::read(&path)?;
        let doc = pdf::load_export(&bytes)?;
        match report {
            ReportType::Public => {
                let mut records = pdf::extract_public(&doc)?;
                info!("{}: {} public records", path.display(), records.len());
                public.append(&mut records);
            }
            ReportType::Private => {
                let mut records = pdf::extract_private(&doc)?;
                info!("{}: {} private records", path.display(), records.len());
                private.append(&mut records);
            }
        }
    }

    let mut cache = NameCache::load(&dirs.name_cache_path(), Box::new(CommaNameClassifier))?;
    for record in &mut private {
        let full = format!("{}, {}", record.name_last, record.name_first);
        let parse = cache.resolve(corrections, &full)?;
        record.name_last = parse.last;
        record.name_first = parse.given;
    }
    cache.persist(&dirs.name_cache_path())?;
    info!(
        "Name cache: {} entries ({} classified this run)",
        cache.len(),
        cache.misses()
    );

    Ok((public, private))
}

/// Export files currently on disk, typed by the filename suffix.
fn list_exports(dirs: &DataDirs) -> error::Result<Vec<(ReportType, PathBuf)>> {
    let dir = dirs.exports_dir();
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.extension().is_some_and(|e| e == "pdf") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let report = if stem.ends_with("-public") {
            ReportType::Public
        } else if stem.ends_with("-private") {
            ReportType::Private
        } else {
            continue;
        };
        out.push((report, path));
    }
    out.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(out)
}

/// Search list for the crawl stage: last names of canonical private records
/// in the active year and later.
fn last_names_for_crawl(private: &[PrivateRecord]) -> Vec<String> {
    let cutoff = config::active_year();
    let mut names: Vec<String> = private
        .iter()
        .filter(|r| r.year >= cutoff)
        .map(|r| r.name_last.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Cached-page parse shared by the parse, reconcile, and feed commands.
async fn parse_registrations(dirs: &DataDirs) -> error::Result<Vec<model::Registration>> {
    let corrections = Corrections::load(&dirs.corrections_path())?;
    let cache = NameCache::load(&dirs.name_cache_path(), Box::new(CommaNameClassifier))?;
    let client = fetch::http_client()?;
    detail::parse_cached_pages(&client, dirs, &cache, &corrections, &TailAddressNormalizer).await
}

fn count_files(dir: &Path, ext: &str) -> error::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut n = 0;
    for entry in std::fs::read_dir(dir)? {
        if entry?.path().extension().is_some_and(|e| e == ext) {
            n += 1;
        }
    }
    Ok(n)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private(last: &str, year: u16) -> PrivateRecord {
        PrivateRecord {
            year,
            name_last: last.to_string(),
            name_first: "JOHN".to_string(),
            employer: "ACME".to_string(),
            expense_flag: "NO".to_string(),
            status: "ACTIVE".to_string(),
        }
    }

    #[test]
    fn crawl_list_is_sorted_deduped_and_active_only() {
        let year = config::active_year();
        let records = vec![
            private("SMITH", year),
            private("ADAMS", year),
            private("SMITH", year),
            private("OLDTIMER", year - 1),
        ];
        assert_eq!(last_names_for_crawl(&records), ["ADAMS", "SMITH"]);
    }

    #[test]
    fn export_listing_types_by_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DataDirs::new(tmp.path());
        std::fs::create_dir_all(dirs.exports_dir()).unwrap();
        std::fs::write(dirs.export_path("public", 2024), b"x").unwrap();
        std::fs::write(dirs.export_path("private", 2024), b"x").unwrap();
        std::fs::write(dirs.exports_dir().join("notes.txt"), b"x").unwrap();

        let exports = list_exports(&dirs).unwrap();
        assert_eq!(exports.len(), 2);
        assert_eq!(exports[0].0, ReportType::Private);
        assert_eq!(exports[1].0, ReportType::Public);
    }
}
