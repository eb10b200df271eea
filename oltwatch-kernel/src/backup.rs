//! Configuration backup files: `{base}/{site}/{YYYY-MM-DD}/{device}_{host}.txt`.

use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tokio::fs;
use uuid::Uuid;

use crate::models::{BackupRecord, Device};

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("cannot create backup directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write backup {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot format backup date: {0}")]
    Date(#[from] time::error::Format),
}

fn path_segment(raw: &str) -> String {
    raw.replace('/', "-")
}

/// Site name as used for the backup directory and the stored record.
pub fn site_dir(site: &str) -> String {
    if site.trim().is_empty() {
        "unknown".to_string()
    } else {
        path_segment(site)
    }
}

/// Target file for a device backup taken on `date`.
pub fn backup_path(
    base: &Path,
    site: &str,
    device: &str,
    host: &str,
    date: Date,
) -> Result<PathBuf, BackupError> {
    let day = date.format(format_description!("[year]-[month]-[day]"))?;
    Ok(base
        .join(site_dir(site))
        .join(day)
        .join(format!("{}_{}.txt", path_segment(device), host)))
}

/// Writes the cleaned configuration text and returns the record to append.
pub async fn write_backup(
    base: &Path,
    device: &Device,
    text: &str,
    now: OffsetDateTime,
) -> Result<BackupRecord, BackupError> {
    let file_path = backup_path(base, &device.site, &device.name, &device.host, now.date())?;
    if let Some(dir) = file_path.parent() {
        fs::create_dir_all(dir)
            .await
            .map_err(|source| BackupError::CreateDir { path: dir.to_path_buf(), source })?;
    }
    fs::write(&file_path, text)
        .await
        .map_err(|source| BackupError::Write { path: file_path.clone(), source })?;

    tracing::debug!(host = %device.host, path = %file_path.display(), bytes = text.len(), "backup written");

    Ok(BackupRecord {
        id: Uuid::new_v4(),
        device: device.name.clone(),
        site: site_dir(&device.site),
        host: device.host.clone(),
        file_path,
        created_at: now,
    })
}
