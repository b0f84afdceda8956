// sitecopy/src/restore/archive.rs
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{Result, SnapshotError};

fn restore_err(context: String, e: impl std::fmt::Display) -> SnapshotError {
    SnapshotError::Restore(format!("{}: {}", context, e))
}

/// Unpacks a `.tar.gz` archive into `extract_to_dir`, replacing any file
/// that already exists at the same path.
///
/// # Arguments
/// * `archive_path` - Path to the downloaded file archive.
/// * `extract_to_dir` - The local file tree to restore into.
pub fn extract_files(archive_path: &Path, extract_to_dir: &Path) -> Result<PathBuf> {
    if !archive_path.is_file() {
        return Err(SnapshotError::Restore(format!(
            "Archive for extraction is not a file: {}",
            archive_path.display()
        )));
    }

    if !extract_to_dir.exists() {
        std::fs::create_dir_all(extract_to_dir).map_err(|e| {
            restore_err(
                format!("Failed to create extraction directory {}", extract_to_dir.display()),
                e,
            )
        })?;
    } else if !extract_to_dir.is_dir() {
        return Err(SnapshotError::Restore(format!(
            "Extraction path exists but is not a directory: {}",
            extract_to_dir.display()
        )));
    }

    info!(
        "📂 Extracting {} into {}",
        archive_path.display(),
        extract_to_dir.display()
    );

    let archive_file = File::open(archive_path).map_err(|e| {
        restore_err(format!("Failed to open archive file {}", archive_path.display()), e)
    })?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(archive_file)));
    archive.set_overwrite(true);
    archive.set_preserve_mtime(true);

    archive.unpack(extract_to_dir).map_err(|e| {
        restore_err(
            format!(
                "Failed to unpack archive {} to {}",
                archive_path.display(),
                extract_to_dir.display()
            ),
            e,
        )
    })?;

    info!("✓ Files restored to {}", extract_to_dir.display());
    Ok(extract_to_dir.to_path_buf())
}

/// Stream-decompresses `X.gz` into `X` next to it and returns the new path.
pub fn decompress(path: &Path) -> Result<PathBuf> {
    let plain_path = match path.extension() {
        Some(ext) if ext == "gz" => path.with_extension(""),
        _ => {
            return Err(SnapshotError::Restore(format!(
                "Expected a .gz file to decompress, got {}",
                path.display()
            )));
        }
    };

    let input = File::open(path)
        .map_err(|e| restore_err(format!("Failed to open {}", path.display()), e))?;
    let output = File::create(&plain_path)
        .map_err(|e| restore_err(format!("Failed to create {}", plain_path.display()), e))?;

    let mut decoder = GzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(output);
    let bytes = io::copy(&mut decoder, &mut writer)
        .and_then(|n| writer.flush().map(|_| n))
        .map_err(|e| restore_err(format!("Failed to decompress {}", path.display()), e))?;

    info!(
        "✓ Decompressed {} ({} bytes) to {}",
        path.display(),
        bytes,
        plain_path.display()
    );
    Ok(plain_path)
}
