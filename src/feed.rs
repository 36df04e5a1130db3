//! RSS change feed scoped to content first seen this run: registrations
//! whose detail page was freshly fetched, and filing documents freshly
//! downloaded while hydrating. Re-parsing an unchanged cache produces no
//! items.

use std::collections::BTreeSet;
use std::io::Write;

use chrono::{NaiveDate, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::info;

use crate::config::{DataDirs, SEARCH_URL};
use crate::error::Result;
use crate::model::{FeedItem, Registration};
use crate::store;

const CHANNEL_TITLE: &str = "South Dakota Lobbyist Registrations";
const CHANNEL_DESCRIPTION: &str =
    "New lobbyist registrations and filings published by the South Dakota Secretary of State";

/// Feed items for this run's delta, newest first.
pub fn collect_items(registrations: &[Registration], new_guids: &BTreeSet<String>) -> Vec<FeedItem> {
    let mut items = Vec::new();
    for reg in registrations {
        if new_guids.contains(&reg.guid) {
            items.push(FeedItem {
                title: format!(
                    "{}, {} registered to lobby for {}",
                    reg.lobbyist.last, reg.lobbyist.given, reg.employer
                ),
                link: reg.url.clone(),
                description: reg.subject.clone(),
                published: reg.registered_on.clone(),
                guid: reg.guid.clone(),
            });
        }
        for filing in &reg.filings {
            if !filing.newly_fetched {
                continue;
            }
            let (Some(url), Some(guid)) = (&filing.url, &filing.guid) else {
                continue;
            };
            items.push(FeedItem {
                title: format!(
                    "{} {} filed by {}, {} for {}",
                    filing.kind, filing.number, reg.lobbyist.last, reg.lobbyist.given, reg.employer
                ),
                link: url.clone(),
                description: String::new(),
                published: filing.date.clone(),
                guid: guid.clone(),
            });
        }
    }
    // ISO dates compare lexicographically; guid tiebreak keeps output stable.
    items.sort_by(|a, b| b.published.cmp(&a.published).then_with(|| a.guid.cmp(&b.guid)));
    items
}

/// RSS wants RFC 822 dates; items carry ISO internally.
fn rfc822(iso: &str) -> String {
    NaiveDate::parse_from_str(iso, "%Y-%m-%d")
        .map(|d| format!("{} 00:00:00 GMT", d.format("%a, %d %b %Y")))
        .unwrap_or_else(|_| iso.to_string())
}

fn text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Render an RSS 2.0 document. `BytesText` escapes ampersands and the other
/// markup-significant characters on write.
pub fn render_rss(items: &[FeedItem]) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", CHANNEL_TITLE)?;
    text_element(&mut writer, "link", SEARCH_URL)?;
    text_element(&mut writer, "description", CHANNEL_DESCRIPTION)?;
    text_element(
        &mut writer,
        "lastBuildDate",
        &Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
    )?;

    for item in items {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(&mut writer, "title", &item.title)?;
        text_element(&mut writer, "link", &item.link)?;
        text_element(&mut writer, "description", &item.description)?;
        text_element(&mut writer, "pubDate", &rfc822(&item.published))?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "false"));
        writer.write_event(Event::Start(guid))?;
        writer.write_event(Event::Text(BytesText::new(&item.guid)))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;

        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;
    Ok(writer.into_inner())
}

/// Build the feed from this run's delta window, then clear the window. An
/// empty delta leaves the published feed.xml untouched.
pub fn build_feed(dirs: &DataDirs, registrations: &[Registration]) -> Result<()> {
    let new_guids = store::load_new_guids(dirs)?;
    let items = collect_items(registrations, &new_guids);
    if items.is_empty() {
        info!("No new content since last run; feed unchanged");
    } else {
        let xml = render_rss(&items)?;
        store::atomic_write(&dirs.feed_path(), &xml)?;
        info!("Wrote {} feed item(s) to {}", items.len(), dirs.feed_path().display());
    }
    store::save_new_guids(dirs, &BTreeSet::new())?;
    Ok(())
}
