// src/utils/store.rs - Canonical directory persistence
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::models::{DirectoryFile, DirectoryRecord};

pub fn load_directory(path: &Path) -> Result<Vec<DirectoryRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open directory file {}", path.display()))?;
    let directory: DirectoryFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse directory file {}", path.display()))?;
    info!(
        "📂 Loaded {} directory records from {}",
        directory.records.len(),
        path.display()
    );
    Ok(directory.records)
}

/// Replace the directory as a whole. Readers never see a half-written file:
/// the new content goes to a temp file in the same directory, then is renamed
/// over the target.
pub fn replace_directory(path: &Path, records: &[DirectoryRecord]) -> Result<()> {
    #[derive(Serialize)]
    struct DirectoryView<'a> {
        mosques: &'a [DirectoryRecord],
    }
    write_json_atomic(path, &DirectoryView { mosques: records })?;
    info!("💾 Wrote {} directory records to {}", records.len(), path.display());
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)
            .with_context(|| format!("Failed to serialize {}", path.display()))?;
        writer.write_all(b"\n")?;
        writer.flush().context("Failed to flush temp file")?;
    }
    tmp.as_file()
        .sync_all()
        .context("Failed to sync temp file")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// SHA-256 over the serialized directory, hex encoded. Two runs producing the
/// same records produce the same signature.
pub fn directory_signature(records: &[DirectoryRecord]) -> Result<String> {
    let mut hasher = Sha256::new();
    for record in records {
        let line = serde_json::to_string(record).context("Failed to serialize record for signature")?;
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}
