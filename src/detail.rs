use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::addresses::{self, AddressNormalizer};
use crate::config::{detail_url, polite_delay, DataDirs, SEARCH_URL};
use crate::corrections::Corrections;
use crate::error::{PipelineError, Result};
use crate::fetch::{fetch_bytes, guid_from_url};
use crate::model::{Filing, Registration};
use crate::names::NameCache;
use crate::store;

static SPANS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span[id]").unwrap());
static FILING_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#ctl00_MainContent_grdFilings tr").unwrap());
static CELLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static BASE: LazyLock<Url> = LazyLock::new(|| Url::parse(SEARCH_URL).unwrap());

const LBL_NAME: &str = "ctl00_MainContent_lblLobbyistName";
const LBL_ADDRESS: &str = "ctl00_MainContent_lblAddress";
const LBL_EMPLOYER: &str = "ctl00_MainContent_lblEmployer";
const LBL_EMPLOYER_ADDRESS: &str = "ctl00_MainContent_lblEmployerAddress";
const LBL_YEAR: &str = "ctl00_MainContent_lblYear";
const LBL_NUMBER: &str = "ctl00_MainContent_lblRegNumber";
const LBL_STATUS: &str = "ctl00_MainContent_lblStatus";
const LBL_REGISTERED: &str = "ctl00_MainContent_lblRegisteredDate";
const LBL_SUBJECT: &str = "ctl00_MainContent_lblSubject";

/// The portal prints dates as `MM/DD/YYYY`.
fn date_to_iso(raw: &str, guid: &str) -> Result<String> {
    NaiveDate::parse_from_str(raw.trim(), "%m/%d/%Y")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| PipelineError::BadPage(format!("bad date {raw:?} on {guid}")))
}

fn flat_text(el: ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Label spans render addresses with `<br>` line breaks; rebuild them as one
/// comma-joined string for the normalizer.
fn address_text(el: ElementRef) -> String {
    el.text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_filings(doc: &Html, guid: &str) -> Result<Vec<Filing>> {
    let mut filings = Vec::new();
    for row in doc.select(&FILING_ROWS) {
        let cells: Vec<ElementRef> = row.select(&CELLS).collect();
        if cells.len() < 3 {
            continue;
        }
        let url = cells
            .iter()
            .find_map(|cell| cell.select(&LINK).next())
            .and_then(|a| a.value().attr("href"))
            .map(|href| {
                BASE.join(href)
                    .map(|u| u.to_string())
                    .map_err(|_| PipelineError::MalformedUrl(href.to_string()))
            })
            .transpose()?;
        let filing_guid = match &url {
            Some(u) => Some(guid_from_url(u)?),
            None => None,
        };
        filings.push(Filing {
            kind: flat_text(cells[0]),
            date: date_to_iso(&flat_text(cells[1]), guid)?,
            number: flat_text(cells[2]),
            url,
            guid: filing_guid,
            document: None,
            newly_fetched: false,
        });
    }
    Ok(filings)
}

/// Parse one cached detail page into a structured registration.
///
/// The name cache is consulted read-only: the extract stage has already
/// resolved every lobbyist who appears in the canonical records, so a miss
/// here is an ordering violation, not a classification opportunity. Returns
/// `Ok(None)` for guids the corrections table marks as miscategorized public
/// lobbyists; those belong in the public dataset.
pub fn parse_detail_page(
    html: &str,
    guid: &str,
    cache: &NameCache,
    corrections: &Corrections,
    normalizer: &dyn AddressNormalizer,
) -> Result<Option<Registration>> {
    if corrections.is_public_guid(guid) {
        debug!("Skipping {}: listed as public", guid);
        return Ok(None);
    }

    let doc = Html::parse_document(html);
    let labels: HashMap<&str, ElementRef> = doc
        .select(&SPANS)
        .filter_map(|el| el.value().attr("id").map(|id| (id, el)))
        .collect();
    let required = |id: &str| {
        labels
            .get(id)
            .copied()
            .ok_or_else(|| PipelineError::BadPage(format!("label {id} missing on {guid}")))
    };

    let year_text = flat_text(required(LBL_YEAR)?);
    let year: u16 = year_text
        .parse()
        .map_err(|_| PipelineError::BadPage(format!("bad year {year_text:?} on {guid}")))?;

    let lobbyist = cache.lookup(corrections, &flat_text(required(LBL_NAME)?))?;
    let address = addresses::resolve(normalizer, &address_text(required(LBL_ADDRESS)?));
    let employer = flat_text(required(LBL_EMPLOYER)?);
    let employer_address = addresses::resolve(
        normalizer,
        &labels
            .get(LBL_EMPLOYER_ADDRESS)
            .copied()
            .map(address_text)
            .unwrap_or_default(),
    );

    let mut registered_on = date_to_iso(&flat_text(required(LBL_REGISTERED)?), guid)?;
    if let Some(fixed) = corrections.date_fix(guid) {
        debug!("Date correction for {}: {}", guid, fixed);
        registered_on = fixed.to_string();
    }

    Ok(Some(Registration {
        guid: guid.to_string(),
        year,
        number: flat_text(required(LBL_NUMBER)?),
        status: flat_text(required(LBL_STATUS)?),
        lobbyist,
        address,
        employer,
        employer_address,
        registered_on,
        subject: labels.get(LBL_SUBJECT).copied().map(flat_text).unwrap_or_default(),
        url: detail_url(guid),
        filings: parse_filings(&doc, guid)?,
    }))
}

/// Fetch any filing documents not yet cached, content-addressed by guid.
/// Already-cached documents only get their path attached; fetched ones are
/// additionally marked newly fetched for the change feed.
pub async fn hydrate_filings(
    client: &Client,
    dirs: &DataDirs,
    registration: &mut Registration,
) -> Result<()> {
    for filing in &mut registration.filings {
        let (Some(url), Some(guid)) = (filing.url.clone(), filing.guid.clone()) else {
            continue;
        };
        let path = dirs.filing_path(&guid);
        if path.exists() {
            filing.document = Some(path);
            continue;
        }
        debug!("GET filing {}", url);
        let bytes = fetch_bytes(client, &url).await?;
        store::atomic_write(&path, &bytes)?;
        filing.document = Some(path);
        filing.newly_fetched = true;
        polite_delay().await;
    }
    Ok(())
}

/// Parse every cached detail page in guid order, hydrating filing documents
/// as needed. Skipped (public-listed) guids are not returned.
pub async fn parse_cached_pages(
    client: &Client,
    dirs: &DataDirs,
    cache: &NameCache,
    corrections: &Corrections,
    normalizer: &dyn AddressNormalizer,
) -> Result<Vec<Registration>> {
    let mut guids = Vec::new();
    if dirs.pages_dir().exists() {
        for entry in std::fs::read_dir(dirs.pages_dir())? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "html") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    guids.push(stem.to_string());
                }
            }
        }
    }
    guids.sort();
    info!("Parsing {} cached detail pages", guids.len());

    let mut registrations = Vec::new();
    for guid in guids {
        let html = std::fs::read_to_string(dirs.page_path(&guid))?;
        let Some(mut registration) =
            parse_detail_page(&html, &guid, cache, corrections, normalizer)?
        else {
            continue;
        };
        hydrate_filings(client, dirs, &mut registration).await?;
        registrations.push(registration);
    }
    Ok(registrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addresses::TailAddressNormalizer;
    use crate::names::{CommaNameClassifier, NameCache};

    const DETAIL_PAGE: &str = include_str!("../tests/fixtures/detail_page.html");
    const GUID: &str = "8f3c2d14-aaaa-bbbb-cccc-000000000001";

    fn seeded_cache() -> NameCache {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = NameCache::load(
            &tmp.path().join("name-cache.json"),
            Box::new(CommaNameClassifier),
        )
        .unwrap();
        cache
            .resolve(&Corrections::default(), "SMITH, JOHN A")
            .unwrap();
        cache
    }

    #[test]
    fn full_page_parses() {
        let cache = seeded_cache();
        let corrections = Corrections::default();
        let reg = parse_detail_page(
            DETAIL_PAGE,
            GUID,
            &cache,
            &corrections,
            &TailAddressNormalizer,
        )
        .unwrap()
        .expect("not a skipped guid");

        assert_eq!(reg.guid, GUID);
        assert_eq!(reg.year, 2024);
        assert_eq!(reg.number, "24-1101");
        assert_eq!(reg.status, "ACTIVE");
        assert_eq!(reg.lobbyist.last, "SMITH");
        assert_eq!(reg.lobbyist.given, "JOHN");
        assert_eq!(reg.registered_on, "2024-01-15");
        assert_eq!(reg.subject, "HEALTHCARE, INSURANCE");
        assert_eq!(reg.employer, "ACME LOBBYING, LLC");
        assert_eq!(reg.url, detail_url(GUID));

        let parts = reg.address.parts.as_ref().expect("structured address");
        assert_eq!(parts.street, "123 MAIN ST");
        assert_eq!(parts.city, "PIERRE");
        assert_eq!(parts.zip, "57501");

        assert_eq!(reg.filings.len(), 2);
        let first = &reg.filings[0];
        assert_eq!(first.kind, "REGISTRATION");
        assert_eq!(first.date, "2024-01-15");
        assert_eq!(first.number, "24-1101");
        assert_eq!(
            first.guid.as_deref(),
            Some("9a1b2c3d-0000-1111-2222-333333333333")
        );
        assert!(first.url.as_deref().unwrap().starts_with("https://"));
        assert!(!first.newly_fetched);

        let second = &reg.filings[1];
        assert_eq!(second.kind, "EXPENSE REPORT");
        assert!(second.url.is_none());
        assert!(second.guid.is_none());
    }

    #[test]
    fn public_listed_guid_is_skipped() {
        let corrections: Corrections = serde_json::from_str(&format!(
            r#"{{"public_guids": ["{GUID}"]}}"#
        ))
        .unwrap();
        let got = parse_detail_page(
            DETAIL_PAGE,
            GUID,
            &seeded_cache(),
            &corrections,
            &TailAddressNormalizer,
        )
        .unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn unseeded_cache_is_an_ordering_violation() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = NameCache::load(
            &tmp.path().join("name-cache.json"),
            Box::new(CommaNameClassifier),
        )
        .unwrap();
        let err = parse_detail_page(
            DETAIL_PAGE,
            GUID,
            &cache,
            &Corrections::default(),
            &TailAddressNormalizer,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::OrderingViolation { .. }));
    }

    #[test]
    fn date_fix_overwrites_parsed_value() {
        let corrections: Corrections = serde_json::from_str(&format!(
            r#"{{"date_fixes": {{"{GUID}": "2024-02-02"}}}}"#
        ))
        .unwrap();
        let reg = parse_detail_page(
            DETAIL_PAGE,
            GUID,
            &seeded_cache(),
            &corrections,
            &TailAddressNormalizer,
        )
        .unwrap()
        .unwrap();
        assert_eq!(reg.registered_on, "2024-02-02");
    }

    #[test]
    fn missing_label_is_a_bad_page() {
        let err = parse_detail_page(
            "<html><body><span id=\"unrelated\">x</span></body></html>",
            GUID,
            &seeded_cache(),
            &Corrections::default(),
            &TailAddressNormalizer,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::BadPage(_)));
    }
}
