//! Regenerates the data-directory README each run, the way the published
//! dataset repo keeps its counts and dates current.

use std::path::Path;

use chrono::Local;
use tracing::info;

use crate::config::{self, DataDirs};
use crate::error::Result;
use crate::model::{PublicRecord, Registration};
use crate::store;

fn with_commas(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn write_readme(
    dirs: &DataDirs,
    public: &[PublicRecord],
    registrations: &[Registration],
) -> Result<()> {
    let earliest_year = public
        .iter()
        .map(|r| r.year)
        .chain(registrations.iter().map(|r| r.year))
        .min()
        .unwrap_or_else(config::active_year);

    let private_file = file_name(&dirs.private_dataset_path());
    let public_file = file_name(&dirs.public_dataset_path());
    let feed_file = file_name(&dirs.feed_path());

    let body = format!(
        "# South Dakota lobbyist data\n\
         \n\
         _Updated {updated}_\n\
         \n\
         You can look up South Dakota lobbyist registrations since {earliest_year} on \
         [this state website]({search_url}), but a) you can't export all the data at \
         once, b) each year's export is a printable PDF with no machine-readable \
         schema, and c) the public (state and tribal) lobbyist information isn't \
         exportable as data at all.\n\
         \n\
         This pipeline drives the search form, recovers structured records from the \
         PDF exports, and cross-checks them against every lobbyist's detail page:\n\
         \n\
         - [`{private_file}`]({private_file}) ({count_private} records)\n\
         - [`{public_file}`]({public_file}) ({count_public} records)\n\
         - [`{feed_file}`]({feed_file}) contains registrations and filings new since \
         the previous run\n",
        updated = Local::now().format("%B %d, %Y"),
        search_url = config::SEARCH_URL,
        count_private = with_commas(registrations.len()),
        count_public = with_commas(public.len()),
    );

    store::atomic_write(&dirs.readme_path(), body.as_bytes())?;
    info!("Wrote {}", dirs.readme_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AddressParse, NameParse};

    fn public_record(year: u16) -> PublicRecord {
        PublicRecord {
            year,
            name_last: "SMITH".to_string(),
            name_first: "JOHN".to_string(),
            state_agency_or_tribe: "DEPT OF HEALTH".to_string(),
            agency_address: "600 E CAPITOL AVE, PIERRE, SD 57501".to_string(),
        }
    }

    fn private_registration(year: u16) -> Registration {
        Registration {
            guid: "aaaa0000-1111-2222-3333-444444444444".to_string(),
            year,
            number: "24-1101".to_string(),
            status: "ACTIVE".to_string(),
            lobbyist: NameParse {
                full: "SMITH, JOHN".to_string(),
                last: "SMITH".to_string(),
                given: "JOHN".to_string(),
                middle: None,
                nickname: None,
                prefix: None,
                suffix: None,
            },
            address: AddressParse::raw_only("123 MAIN ST, PIERRE, SD 57501"),
            employer: "ACME".to_string(),
            employer_address: AddressParse::raw_only(""),
            registered_on: format!("{year}-01-15"),
            subject: String::new(),
            url: String::new(),
            filings: Vec::new(),
        }
    }

    #[test]
    fn counts_and_earliest_year_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DataDirs::new(tmp.path());
        let public = vec![public_record(2009), public_record(2024)];
        let private = vec![private_registration(2024)];

        write_readme(&dirs, &public, &private).unwrap();
        let text = std::fs::read_to_string(dirs.readme_path()).unwrap();

        assert!(text.starts_with("# South Dakota lobbyist data"));
        assert!(text.contains("since 2009"));
        assert!(text.contains("(2 records)"));
        assert!(text.contains("(1 records)"));
        assert!(text.contains("sd-lobbyists-private.json"));
        assert!(text.contains("feed.xml"));
    }

    #[test]
    fn empty_datasets_fall_back_to_the_active_year() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DataDirs::new(tmp.path());
        write_readme(&dirs, &[], &[]).unwrap();
        let text = std::fs::read_to_string(dirs.readme_path()).unwrap();
        assert!(text.contains(&format!("since {}", config::active_year())));
    }

    #[test]
    fn comma_grouping() {
        assert_eq!(with_commas(0), "0");
        assert_eq!(with_commas(999), "999");
        assert_eq!(with_commas(1000), "1,000");
        assert_eq!(with_commas(1234567), "1,234,567");
    }
}
