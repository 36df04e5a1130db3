use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::config::{polite_delay, DataDirs, BASE_BACKOFF_MS, MAX_RETRIES, SEARCH_URL};
use crate::error::{PipelineError, Result};
use crate::model::Stub;
use crate::site::SearchDriver;
use crate::store;

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#DataTables_Table_0").unwrap());
static ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#DataTables_Table_0 tbody tr").unwrap());
static CELLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static BASE: LazyLock<Url> = LazyLock::new(|| Url::parse(SEARCH_URL).unwrap());

fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse one search-results page into registration stubs. Result columns:
/// year, registration number (linking to the detail page), name, address,
/// employer, status. An explicit "no records found" marker is an error for
/// a last-name search, never an empty success.
pub fn parse_results_table(html: &str, last_name: &str) -> Result<Vec<Stub>> {
    let doc = Html::parse_document(html);
    let table = doc.select(&TABLE).next().ok_or_else(|| {
        PipelineError::BadPage(format!("results table missing for {last_name:?}"))
    })?;
    let table_text = table.text().collect::<String>().to_lowercase();
    if table_text.contains("no records found") {
        return Err(PipelineError::SearchFailure {
            name: last_name.to_string(),
        });
    }

    let mut stubs = Vec::new();
    for row in doc.select(&ROWS) {
        let cells: Vec<ElementRef> = row.select(&CELLS).collect();
        if cells.len() < 6 {
            continue;
        }
        let Ok(year) = cell_text(&cells[0]).parse::<u16>() else {
            continue;
        };
        let href = cells[1]
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| {
                PipelineError::BadPage(format!("result row without a detail link for {last_name:?}"))
            })?;
        let url = BASE
            .join(href)
            .map_err(|_| PipelineError::MalformedUrl(href.to_string()))?;
        stubs.push(Stub {
            year,
            number: cell_text(&cells[1]),
            url: url.to_string(),
            status: cell_text(&cells[5]),
            raw_name: cell_text(&cells[2]),
            raw_address: cell_text(&cells[3]),
            raw_employer: cell_text(&cells[4]),
        });
    }
    Ok(stubs)
}

async fn search_once(driver: &dyn SearchDriver, name: &str) -> Result<Vec<Stub>> {
    let html = driver.search_last_name(name).await?;
    parse_results_table(&html, name)
}

/// Bounded per-name retry with exponential backoff. Failures stay contained
/// to the one name; other names keep crawling.
async fn search_with_retry(driver: &dyn SearchDriver, name: &str) -> Result<Vec<Stub>> {
    let mut attempt = 0u32;
    loop {
        match search_once(driver, name).await {
            Ok(stubs) => return Ok(stubs),
            Err(err) => {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    return Err(err);
                }
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt - 1));
                warn!(
                    "Search for {} failed (attempt {}/{}): {}; backing off {:.1}s",
                    name,
                    attempt,
                    MAX_RETRIES,
                    err,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Search every last name, persisting each name's stubs as soon as that name
/// succeeds. Names that exhaust their retries go through one more pass in
/// randomized order; whatever still fails aborts the stage with the full
/// list, leaving the successful caches on disk as resume state.
pub async fn run_crawl(
    driver: &dyn SearchDriver,
    dirs: &DataDirs,
    names: &[String],
) -> Result<BTreeMap<String, Vec<Stub>>> {
    let mut queue: Vec<String> = names.to_vec();
    queue.sort();
    queue.dedup();
    info!("Crawling {} last names", queue.len());

    let pb = ProgressBar::new(queue.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut results = BTreeMap::new();
    let mut failed: Vec<String> = Vec::new();

    for name in &queue {
        match search_with_retry(driver, name).await {
            Ok(stubs) => {
                store::save_stubs(dirs, name, &stubs)?;
                results.insert(name.clone(), stubs);
            }
            Err(err) => {
                warn!("Deferring {}: {}", name, err);
                failed.push(name.clone());
            }
        }
        pb.inc(1);
        polite_delay().await;
    }
    pb.finish_and_clear();

    if !failed.is_empty() {
        // Final pass over the deferred names, randomized order.
        failed.shuffle(&mut rand::rng());
        let mut gave_up = Vec::new();
        for name in failed {
            match search_with_retry(driver, &name).await {
                Ok(stubs) => {
                    store::save_stubs(dirs, &name, &stubs)?;
                    results.insert(name.clone(), stubs);
                }
                Err(err) => {
                    warn!("Giving up on {}: {}", name, err);
                    gave_up.push(name);
                }
            }
            polite_delay().await;
        }
        if !gave_up.is_empty() {
            gave_up.sort();
            return Err(PipelineError::CrawlIncomplete {
                count: gave_up.len(),
                attempts: MAX_RETRIES * 2,
                names: gave_up.join(", "),
            });
        }
    }

    info!("Crawl complete: {} names cached", results.len());
    Ok(results)
}
