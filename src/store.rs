use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::info;

use crate::config::DataDirs;
use crate::error::Result;
use crate::model::{PublicRecord, Registration, Stub};

/// Write-temp-then-rename. Readers see either the old file or the complete
/// new one, never a truncation.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = parent.join(tmp_name);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ── Crawl cache ──

pub fn save_stubs(dirs: &DataDirs, last_name: &str, stubs: &[Stub]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(stubs)?;
    atomic_write(&dirs.stub_path(last_name), &bytes)
}

pub fn load_stubs(dirs: &DataDirs, last_name: &str) -> Result<Vec<Stub>> {
    let text = fs::read_to_string(dirs.stub_path(last_name))?;
    Ok(serde_json::from_str(&text)?)
}

/// Every per-name stub file currently on disk.
pub fn load_all_stubs(dirs: &DataDirs) -> Result<BTreeMap<String, Vec<Stub>>> {
    let mut out = BTreeMap::new();
    let dir = dirs.crawl_dir();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json") {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let text = fs::read_to_string(&path)?;
            out.insert(name, serde_json::from_str(&text)?);
        }
    }
    Ok(out)
}

// ── Fetch-stage handoff ──

pub fn save_new_guids(dirs: &DataDirs, guids: &BTreeSet<String>) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(guids)?;
    atomic_write(&dirs.new_guids_path(), &bytes)
}

pub fn load_new_guids(dirs: &DataDirs) -> Result<BTreeSet<String>> {
    let path = dirs.new_guids_path();
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

// ── Final datasets ──

/// The original's sort key: year, then case-folded last and first name.
fn sort_key(year: u16, last: &str, first: &str) -> (u16, String, String) {
    (year, last.to_lowercase(), first.to_lowercase())
}

pub fn write_private_dataset(dirs: &DataDirs, regs: &mut [Registration]) -> Result<()> {
    regs.sort_by_key(|r| sort_key(r.year, &r.lobbyist.last, &r.lobbyist.given));
    let bytes = serde_json::to_vec_pretty(&regs)?;
    atomic_write(&dirs.private_dataset_path(), &bytes)?;
    info!("Wrote {} private registrations", regs.len());
    Ok(())
}

pub fn write_public_dataset(dirs: &DataDirs, records: &mut [PublicRecord]) -> Result<()> {
    records.sort_by_key(|r| sort_key(r.year, &r.name_last, &r.name_first));
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records.iter() {
        writer
            .serialize(record)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    atomic_write(&dirs.public_dataset_path(), &bytes)?;
    info!("Wrote {} public records", records.len());
    Ok(())
}
