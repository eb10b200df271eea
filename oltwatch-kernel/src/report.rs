//! Read-side views over a store snapshot, and JSON export.

use rust_xlsxwriter::{Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;

use crate::backup::site_dir;
use crate::models::{BackupRecord, PortProtectionRecord, PowerReading};
use crate::store::Snapshot;

const DEFAULT_FOLDER: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("nothing to export for {0}")]
    Empty(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device: String,
    pub site: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePowerSummary {
    pub device: String,
    pub site: String,
    pub total: usize,
    pub weak_count: usize,
}

/// A power reading joined with the ONT's descriptions (empty when unknown).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingWithDescription {
    pub device: String,
    pub site: String,
    pub host: String,
    pub ont_idx: String,
    pub olt_rx: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub measured_at: OffsetDateTime,
    pub desc1: String,
    pub desc2: String,
}

/// Readings strictly below `threshold`, weakest first.
pub fn weak_readings(snapshot: &Snapshot, threshold: f64) -> Vec<PowerReading> {
    let mut out: Vec<PowerReading> = snapshot
        .power
        .iter()
        .filter(|r| r.olt_rx < threshold)
        .cloned()
        .collect();
    out.sort_by(|a, b| a.olt_rx.total_cmp(&b.olt_rx));
    out
}

pub fn readings_for_host(snapshot: &Snapshot, host: &str) -> Vec<PowerReading> {
    let mut out: Vec<PowerReading> = snapshot.power.iter().filter(|r| r.host == host).cloned().collect();
    out.sort_by(|a, b| a.ont_idx.cmp(&b.ont_idx));
    out
}

/// Distinct devices with power readings, ordered by site then device.
pub fn devices(snapshot: &Snapshot) -> Vec<DeviceInfo> {
    let set: BTreeSet<(String, String, String)> = snapshot
        .power
        .iter()
        .map(|r| (r.site.clone(), r.device.clone(), r.host.clone()))
        .collect();
    set.into_iter()
        .map(|(site, device, host)| DeviceInfo { device, site, host })
        .collect()
}

/// Reading count and weak count per (site, device).
pub fn power_summary(snapshot: &Snapshot, threshold: f64) -> Vec<DevicePowerSummary> {
    let mut groups: BTreeMap<(String, String), (usize, usize)> = BTreeMap::new();
    for r in &snapshot.power {
        let entry = groups.entry((r.site.clone(), r.device.clone())).or_default();
        entry.0 += 1;
        if r.olt_rx < threshold {
            entry.1 += 1;
        }
    }
    groups
        .into_iter()
        .map(|((site, device), (total, weak_count))| DevicePowerSummary { device, site, total, weak_count })
        .collect()
}

pub fn down_ports(snapshot: &Snapshot) -> Vec<PortProtectionRecord> {
    let mut out = snapshot.port_protection.clone();
    out.sort_by(|a, b| (&a.host, &a.port).cmp(&(&b.host, &b.port)));
    out
}

/// Weak readings joined on (host, ONT index) with their descriptions.
pub fn weak_with_descriptions(snapshot: &Snapshot, threshold: f64) -> Vec<ReadingWithDescription> {
    let descs: HashMap<(&str, &str), (&str, &str)> = snapshot
        .descriptions
        .iter()
        .map(|d| ((d.host.as_str(), d.ont_idx.as_str()), (d.desc1.as_str(), d.desc2.as_str())))
        .collect();

    weak_readings(snapshot, threshold)
        .into_iter()
        .map(|r| {
            let (desc1, desc2) = descs
                .get(&(r.host.as_str(), r.ont_idx.as_str()))
                .copied()
                .unwrap_or(("", ""));
            ReadingWithDescription {
                desc1: desc1.to_string(),
                desc2: desc2.to_string(),
                device: r.device,
                site: r.site,
                host: r.host,
                ont_idx: r.ont_idx,
                olt_rx: r.olt_rx,
                measured_at: r.measured_at,
            }
        })
        .collect()
}

/// Backups of one site, newest first. `site` is matched the way it is
/// written to the backup directory.
pub fn backups_for_site(snapshot: &Snapshot, site: &str) -> Vec<BackupRecord> {
    let site = site_dir(site);
    let mut out: Vec<BackupRecord> = snapshot.backups.iter().filter(|b| b.site == site).cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}

/// All backups grouped by site, newest first within each site.
pub fn backups_by_site(snapshot: &Snapshot) -> BTreeMap<String, Vec<BackupRecord>> {
    let mut groups: BTreeMap<String, Vec<BackupRecord>> = BTreeMap::new();
    for record in &snapshot.backups {
        groups.entry(record.site.clone()).or_default().push(record.clone());
    }
    for records in groups.values_mut() {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    groups
}

fn export_path(folder: &Path, name: &str, ext: &str) -> PathBuf {
    let file_name = if Path::new(name).extension().is_some_and(|e| e == ext) {
        name.to_string()
    } else {
        format!("{name}.{ext}")
    };
    folder.join(file_name)
}

async fn ensure_folder(folder: &Path) -> Result<&Path, ReportError> {
    let folder = if folder.as_os_str().is_empty() { Path::new(DEFAULT_FOLDER) } else { folder };
    fs::create_dir_all(folder)
        .await
        .map_err(|source| ReportError::Io { path: folder.to_path_buf(), source })?;
    Ok(folder)
}

/// Writes `value` as pretty JSON into `folder` (default `json`), adding the
/// `.json` extension when missing. Returns the written path.
pub async fn save_json<T: Serialize + ?Sized>(
    folder: &Path,
    name: &str,
    value: &T,
) -> Result<PathBuf, ReportError> {
    let folder = ensure_folder(folder).await?;
    let path = export_path(folder, name, "json");
    let body = serde_json::to_string_pretty(value)?;
    fs::write(&path, body)
        .await
        .map_err(|source| ReportError::Io { path: path.clone(), source })?;
    Ok(path)
}

pub enum Cell<'a> {
    Text(&'a str),
    Number(f64),
}

/// A row type that can be laid out as one spreadsheet line.
pub trait SheetRow {
    fn headers() -> &'static [&'static str];
    fn cells(&self) -> Vec<Cell<'_>>;
}

impl SheetRow for ReadingWithDescription {
    fn headers() -> &'static [&'static str] {
        &["host", "ont_idx", "rx", "desc1", "desc2"]
    }

    fn cells(&self) -> Vec<Cell<'_>> {
        vec![
            Cell::Text(&self.host),
            Cell::Text(&self.ont_idx),
            Cell::Number(self.olt_rx),
            Cell::Text(&self.desc1),
            Cell::Text(&self.desc2),
        ]
    }
}

impl SheetRow for DevicePowerSummary {
    fn headers() -> &'static [&'static str] {
        &["device", "site", "total", "weak_count"]
    }

    fn cells(&self) -> Vec<Cell<'_>> {
        vec![
            Cell::Text(&self.device),
            Cell::Text(&self.site),
            Cell::Number(self.total as f64),
            Cell::Number(self.weak_count as f64),
        ]
    }
}

/// Writes `rows` as a single-sheet workbook with a header line, adding the
/// `.xlsx` extension when missing. An empty slice is an error.
pub async fn save_xlsx<R: SheetRow>(folder: &Path, name: &str, rows: &[R]) -> Result<PathBuf, ReportError> {
    if rows.is_empty() {
        return Err(ReportError::Empty(name.to_string()));
    }
    let folder = ensure_folder(folder).await?;
    let path = export_path(folder, name, "xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in R::headers().iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let line = i as u32 + 1;
        for (col, cell) in row.cells().into_iter().enumerate() {
            match cell {
                Cell::Text(text) => sheet.write_string(line, col as u16, text)?,
                Cell::Number(n) => sheet.write_number(line, col as u16, n)?,
            };
        }
    }
    let bytes = workbook.save_to_buffer()?;
    fs::write(&path, bytes)
        .await
        .map_err(|source| ReportError::Io { path: path.clone(), source })?;
    Ok(path)
}
