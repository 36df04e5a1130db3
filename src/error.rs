use thiserror::Error;

/// Fatal pipeline conditions. Everything here aborts the current stage;
/// cache files already written stay on disk as valid resume state.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The name classifier returned a non-person category or could not
    /// commit to one. Needs a corrections-table entry and a rerun.
    #[error("cannot parse {0:?} as a person name; add a corrections entry and rerun")]
    UnparseableName(String),

    /// A last-name search produced no usable result rows.
    #[error("search for {name:?} returned no results")]
    SearchFailure { name: String },

    /// Non-2xx response while fetching a page or document.
    #[error("fetch of {url} failed with status {status}")]
    FetchFailure { url: String, status: u16 },

    /// A lobbyist name was missing from the resolution cache during the
    /// detail-parse pass: the extract stage did not run first.
    #[error("{name:?} is not in the name cache; run the extract stage before parsing")]
    OrderingViolation { name: String },

    /// Canonical and scraped datasets disagree on a lobbyist's year coverage.
    #[error("coverage mismatch for {name}: canonical [{canonical}] vs scraped [{scraped}]")]
    ReconciliationMismatch {
        name: String,
        canonical: String,
        scraped: String,
    },

    /// Names still failing after the bounded retry passes.
    #[error("crawl gave up on {count} name(s) after {attempts} attempts each: {names}")]
    CrawlIncomplete {
        count: usize,
        attempts: u32,
        names: String,
    },

    /// Browser driver failure (navigation, form control, download).
    #[error("browser driver: {0}")]
    Driver(String),

    /// A detail or filing URL without a recognizable guid parameter.
    #[error("no guid in url {0}")]
    MalformedUrl(String),

    /// A page or cell whose shape does not match the expected layout.
    #[error("unexpected page structure: {0}")]
    BadPage(String),

    #[error("pdf: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
