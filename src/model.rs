use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The two report layouts the portal exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Public,
    Private,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Public => "public",
            ReportType::Private => "private",
        }
    }
}

/// Canonical public-lobbyist record, straight from the PDF export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicRecord {
    pub year: u16,
    pub name_last: String,
    pub name_first: String,
    pub state_agency_or_tribe: String,
    pub agency_address: String,
}

/// Canonical private-lobbyist record. Ground truth for who lobbied what year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateRecord {
    pub year: u16,
    pub name_last: String,
    pub name_first: String,
    pub employer: String,
    pub expense_flag: String,
    pub status: String,
}

impl PrivateRecord {
    /// Key both datasets can agree on: surname plus given name.
    pub fn coverage_key(&self) -> String {
        format!("{}, {}", self.name_last, self.name_first)
    }
}

/// Parsed person-name components, keyed in the cache by the corrected,
/// uppercased full name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameParse {
    pub full: String,
    pub last: String,
    pub given: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Structured address components. All-or-nothing: a failed normalization
/// keeps only the raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParts {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParse {
    pub full: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<AddressParts>,
}

impl AddressParse {
    pub fn raw_only(full: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            parts: None,
        }
    }
}

/// One filing row from a registration's detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filing {
    pub kind: String,
    /// ISO-8601 date.
    pub date: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<PathBuf>,
    /// Set while this run fetched the backing document; consumed by the
    /// change feed, never persisted.
    #[serde(skip)]
    pub newly_fetched: bool,
}

/// Fully structured private registration, assembled from a cached detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub guid: String,
    pub year: u16,
    pub number: String,
    pub status: String,
    pub lobbyist: NameParse,
    pub address: AddressParse,
    pub employer: String,
    pub employer_address: AddressParse,
    /// ISO-8601 registration date.
    pub registered_on: String,
    pub subject: String,
    pub url: String,
    pub filings: Vec<Filing>,
}

impl Registration {
    pub fn coverage_key(&self) -> String {
        format!("{}, {}", self.lobbyist.last, self.lobbyist.given)
    }
}

/// Search-result row cached per last name during the crawl stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stub {
    pub year: u16,
    pub number: String,
    pub url: String,
    pub status: String,
    pub raw_name: String,
    pub raw_address: String,
    pub raw_employer: String,
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// ISO-8601 date.
    pub published: String,
    pub guid: String,
}
