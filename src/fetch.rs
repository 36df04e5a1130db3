use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::config::{polite_delay, DataDirs, USER_AGENT};
use crate::error::{PipelineError, Result};
use crate::store;

static GUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}(-[0-9a-fA-F]{4}){3}-[0-9a-fA-F]{12}$").unwrap()
});

/// Registration guid from a detail or filing URL's `id` query parameter,
/// lowercased for content addressing.
pub fn guid_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|_| PipelineError::MalformedUrl(url.to_string()))?;
    let id = parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| PipelineError::MalformedUrl(url.to_string()))?;
    if !GUID.is_match(&id) {
        return Err(PipelineError::MalformedUrl(url.to_string()));
    }
    Ok(id.to_lowercase())
}

pub fn http_client() -> Result<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// GET one URL, insisting on a success status.
pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::FetchFailure {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

/// Download every uncached detail page, one jittered request at a time.
/// A page already on disk is skipped with no network call and no rewrite.
/// Returns the guids of the current delta window: everything fetched this
/// run, merged with pending guids left by an interrupted earlier run. The
/// set is persisted after every download so a crash never loses it.
pub async fn fetch_pages(
    client: &Client,
    dirs: &DataDirs,
    urls: &[String],
) -> Result<BTreeSet<String>> {
    let mut by_guid: BTreeMap<String, String> = BTreeMap::new();
    for url in urls {
        by_guid.insert(guid_from_url(url)?, url.clone());
    }
    let total = by_guid.len();

    let mut new_guids = store::load_new_guids(dirs)?;
    let pending: Vec<(String, String)> = by_guid
        .into_iter()
        .filter(|(guid, _)| !dirs.page_path(guid).exists())
        .collect();
    info!(
        "Fetching {} uncached detail pages ({} already cached)",
        pending.len(),
        total - pending.len()
    );

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    for (guid, url) in pending {
        debug!("GET {}", url);
        let bytes = fetch_bytes(client, &url).await?;
        store::atomic_write(&dirs.page_path(&guid), &bytes)?;
        new_guids.insert(guid);
        store::save_new_guids(dirs, &new_guids)?;
        pb.inc(1);
        polite_delay().await;
    }
    pb.finish_and_clear();

    Ok(new_guids)
}
