use std::collections::BTreeMap;

use super::page::{PageView, Region};

/// One named column: a half-open `[x0, x1)` interval, with `x1 = None`
/// extending to the record block's right edge. Multi-line bands keep their
/// first line as the named field and join the continuation lines into
/// `secondary`.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBand {
    pub name: &'static str,
    pub x0: f64,
    pub x1: Option<f64>,
    pub multi_line: bool,
    pub secondary: Option<&'static str>,
}

fn collapse_upper(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Read every band of one record block into a field map. Empty bands
/// contribute no key.
pub fn extract_fields(
    page: &dyn PageView,
    block: &Region,
    bands: &[ColumnBand],
) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for band in bands {
        let crop = Region {
            x0: band.x0,
            top: block.top,
            x1: band.x1.unwrap_or(block.x1),
            bottom: block.bottom,
        };
        let text = page.text_within(&crop);
        let lines: Vec<String> = text
            .lines()
            .map(collapse_upper)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            continue;
        }
        if band.multi_line {
            fields.insert(band.name.to_string(), lines[0].clone());
            if lines.len() > 1 {
                if let Some(secondary) = band.secondary {
                    fields.insert(secondary.to_string(), lines[1..].join(" "));
                }
            }
        } else {
            fields.insert(band.name.to_string(), lines.join(" "));
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::segment::tests::FakePage;

    const BANDS: &[ColumnBand] = &[
        ColumnBand {
            name: "year",
            x0: 0.0,
            x1: Some(80.0),
            multi_line: false,
            secondary: None,
        },
        ColumnBand {
            name: "agency",
            x0: 80.0,
            x1: None,
            multi_line: true,
            secondary: Some("agency_address"),
        },
    ];

    fn block() -> Region {
        Region {
            x0: 0.0,
            top: 90.0,
            x1: 612.0,
            bottom: 140.0,
        }
    }

    #[test]
    fn bands_crop_and_normalize() {
        let page = FakePage::letter()
            .word(10.0, 100.0, "2024")
            .word(100.0, 100.0, "dept  of health");
        let fields = extract_fields(&page, &block(), BANDS);
        assert_eq!(fields.get("year").map(String::as_str), Some("2024"));
        assert_eq!(
            fields.get("agency").map(String::as_str),
            Some("DEPT OF HEALTH")
        );
        assert!(fields.get("agency_address").is_none());
    }

    #[test]
    fn continuation_lines_join_into_secondary() {
        let page = FakePage::letter()
            .word(100.0, 100.0, "DEPT OF HEALTH")
            .word(100.0, 112.0, "600 E CAPITOL AVE,")
            .word(100.0, 124.0, "PIERRE, SD 57501");
        let fields = extract_fields(&page, &block(), BANDS);
        assert_eq!(
            fields.get("agency").map(String::as_str),
            Some("DEPT OF HEALTH")
        );
        assert_eq!(
            fields.get("agency_address").map(String::as_str),
            Some("600 E CAPITOL AVE, PIERRE, SD 57501")
        );
    }

    #[test]
    fn final_band_reaches_block_edge() {
        let page = FakePage::letter().word(600.0, 100.0, "EDGE");
        let fields = extract_fields(&page, &block(), BANDS);
        assert_eq!(fields.get("agency").map(String::as_str), Some("EDGE"));
    }

    #[test]
    fn empty_block_yields_no_fields() {
        let page = FakePage::letter();
        assert!(extract_fields(&page, &block(), BANDS).is_empty());
    }

    #[test]
    fn single_line_band_joins_wrapped_lines() {
        let single: &[ColumnBand] = &[ColumnBand {
            name: "agency",
            x0: 80.0,
            x1: None,
            multi_line: false,
            secondary: None,
        }];
        let page = FakePage::letter()
            .word(100.0, 100.0, "DEPARTMENT OF")
            .word(100.0, 112.0, "TRIBAL RELATIONS");
        let fields = extract_fields(&page, &block(), single);
        assert_eq!(
            fields.get("agency").map(String::as_str),
            Some("DEPARTMENT OF TRIBAL RELATIONS")
        );
    }
}
