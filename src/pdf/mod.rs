pub mod columns;
pub mod page;
pub mod segment;

use std::collections::BTreeMap;

use lopdf::Document;

use crate::error::Result;
use crate::model::{PrivateRecord, PublicRecord, ReportType};
use columns::ColumnBand;
use page::{PageView, PdfPage};

/// Column geometry for one report type's export layout.
pub struct ReportSchema {
    pub bands: &'static [ColumnBand],
    /// Every page repeats the export title above a horizontal rule.
    pub cropped_header: bool,
}

static PUBLIC_SCHEMA: ReportSchema = ReportSchema {
    cropped_header: true,
    bands: &[
        ColumnBand {
            name: "year",
            x0: 18.0,
            x1: Some(72.0),
            multi_line: false,
            secondary: None,
        },
        ColumnBand {
            name: "name",
            x0: 72.0,
            x1: Some(252.0),
            multi_line: false,
            secondary: None,
        },
        ColumnBand {
            name: "state_agency_or_tribe",
            x0: 252.0,
            x1: None,
            multi_line: true,
            secondary: Some("agency_address"),
        },
    ],
};

static PRIVATE_SCHEMA: ReportSchema = ReportSchema {
    cropped_header: true,
    bands: &[
        ColumnBand {
            name: "year",
            x0: 18.0,
            x1: Some(72.0),
            multi_line: false,
            secondary: None,
        },
        ColumnBand {
            name: "name",
            x0: 72.0,
            x1: Some(252.0),
            multi_line: true,
            secondary: Some("address"),
        },
        ColumnBand {
            name: "employer",
            x0: 252.0,
            x1: Some(432.0),
            multi_line: true,
            secondary: Some("employer_address"),
        },
        ColumnBand {
            name: "expense",
            x0: 432.0,
            x1: Some(504.0),
            multi_line: false,
            secondary: None,
        },
        ColumnBand {
            name: "status",
            x0: 504.0,
            x1: None,
            multi_line: false,
            secondary: None,
        },
    ],
};

pub fn schema(report: ReportType) -> &'static ReportSchema {
    match report {
        ReportType::Public => &PUBLIC_SCHEMA,
        ReportType::Private => &PRIVATE_SCHEMA,
    }
}

pub fn load_export(bytes: &[u8]) -> Result<Document> {
    Ok(Document::load_mem(bytes)?)
}

/// Two-pass extraction per page: geometry → record blocks → field maps.
fn page_field_maps(page: &dyn PageView, schema: &ReportSchema) -> Vec<BTreeMap<String, String>> {
    segment::split_bands(page, schema.cropped_header)
        .iter()
        .map(|band| columns::extract_fields(page, band, schema.bands))
        .collect()
}

fn field_maps(doc: &Document, schema: &ReportSchema) -> Result<Vec<BTreeMap<String, String>>> {
    let mut maps = Vec::new();
    for page in PdfPage::load_all(doc)? {
        maps.extend(page_field_maps(&page, schema));
    }
    Ok(maps)
}

/// `None` unless the field is a plausible 4-digit year; anything else is a
/// decoration remnant the segmenter let through.
fn record_year(fields: &BTreeMap<String, String>) -> Option<u16> {
    let year = fields.get("year")?;
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        year.parse().ok()
    } else {
        None
    }
}

fn field(fields: &BTreeMap<String, String>, name: &str) -> String {
    fields.get(name).cloned().unwrap_or_default()
}

fn split_name(name: &str) -> (String, String) {
    match name.split_once(',') {
        Some((last, first)) => (last.trim().to_string(), first.trim().to_string()),
        None => (name.trim().to_string(), String::new()),
    }
}

fn build_public(maps: Vec<BTreeMap<String, String>>) -> Vec<PublicRecord> {
    maps.into_iter()
        .filter_map(|fields| {
            let year = record_year(&fields)?;
            let (name_last, name_first) = split_name(&field(&fields, "name"));
            Some(PublicRecord {
                year,
                name_last,
                name_first,
                state_agency_or_tribe: field(&fields, "state_agency_or_tribe"),
                agency_address: field(&fields, "agency_address"),
            })
        })
        .collect()
}

fn build_private(maps: Vec<BTreeMap<String, String>>) -> Vec<PrivateRecord> {
    maps.into_iter()
        .filter_map(|fields| {
            let year = record_year(&fields)?;
            let (name_last, name_first) = split_name(&field(&fields, "name"));
            Some(PrivateRecord {
                year,
                name_last,
                name_first,
                employer: field(&fields, "employer"),
                expense_flag: field(&fields, "expense"),
                status: field(&fields, "status"),
            })
        })
        .collect()
}

pub fn extract_public(doc: &Document) -> Result<Vec<PublicRecord>> {
    Ok(build_public(field_maps(doc, &PUBLIC_SCHEMA)?))
}

pub fn extract_private(doc: &Document) -> Result<Vec<PrivateRecord>> {
    Ok(build_private(field_maps(doc, &PRIVATE_SCHEMA)?))
}
