use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Datelike;
use rand::Rng;

/// Search page on the SD Secretary of State portal.
pub const SEARCH_URL: &str =
    "https://sosenterprise.sd.gov/BusinessServices/Lobbyist/LobbyistSearch.aspx";

/// Identifying header sent with every direct HTTP request.
pub const USER_AGENT: &str =
    "sd_lobbyists/0.1 (lobbyist registration archive; +https://github.com/sd-lobbyists)";

/// Canonical detail-page URL for a registration guid.
pub fn detail_url(guid: &str) -> String {
    format!("https://sosenterprise.sd.gov/BusinessServices/Lobbyist/LobbyistDetail.aspx?id={guid}")
}

/// Base politeness delay between site interactions, plus uniform jitter.
pub const BASE_DELAY_MS: u64 = 2000;
pub const JITTER_MS: u64 = 1500;

/// Per-name retry budget for the crawl stage.
pub const MAX_RETRIES: u32 = 3;
pub const BASE_BACKOFF_MS: u64 = 2000;

/// Jittered politeness pause between consecutive portal requests.
pub async fn polite_delay() {
    let jitter = rand::rng().random_range(0..JITTER_MS);
    tokio::time::sleep(Duration::from_millis(BASE_DELAY_MS + jitter)).await;
}

/// Registrations are re-verified for the current year only; older years are
/// frozen once captured.
pub fn active_year() -> u16 {
    chrono::Utc::now().year() as u16
}

/// Layout of every persisted artifact under one data root.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Freshly downloaded PDF exports, one per report type and year.
    pub fn export_path(&self, report: &str, year: u16) -> PathBuf {
        self.exports_dir().join(format!("{year}-{report}.pdf"))
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    pub fn name_cache_path(&self) -> PathBuf {
        self.root.join("name-cache.json")
    }

    pub fn corrections_path(&self) -> PathBuf {
        self.root.join("corrections.json")
    }

    /// Per-last-name crawl cache file.
    pub fn stub_path(&self, last_name: &str) -> PathBuf {
        self.root.join("crawl").join(format!("{last_name}.json"))
    }

    pub fn crawl_dir(&self) -> PathBuf {
        self.root.join("crawl")
    }

    /// Content-addressed detail page cache.
    pub fn page_path(&self, guid: &str) -> PathBuf {
        self.root.join("pages").join(format!("{guid}.html"))
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    /// Content-addressed filing document cache.
    pub fn filing_path(&self, guid: &str) -> PathBuf {
        self.filings_dir().join(format!("{guid}.pdf"))
    }

    pub fn filings_dir(&self) -> PathBuf {
        self.root.join("filings")
    }

    /// Guids fetched by the most recent fetch stage, for a later feed stage.
    pub fn new_guids_path(&self) -> PathBuf {
        self.root.join("new-guids.json")
    }

    pub fn private_dataset_path(&self) -> PathBuf {
        self.root.join("sd-lobbyists-private.json")
    }

    pub fn public_dataset_path(&self) -> PathBuf {
        self.root.join("sd-lobbyists-public.csv")
    }

    pub fn feed_path(&self) -> PathBuf {
        self.root.join("feed.xml")
    }

    pub fn readme_path(&self) -> PathBuf {
        self.root.join("README.md")
    }
}
