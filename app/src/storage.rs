// ==============================================================================
// storage.rs - Local Upload Storage
// ==============================================================================
// Description: Fetches an uploaded genome from the upload directory into a
//              per-run workspace, unpacking .zip and .gz archives
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::ProcessingError;
use crate::models::FileRecord;
use crate::services::{FetchedGenome, GenomeSource};

/// Archive directories some vendors' zip tools add alongside the export
const IGNORED_ARCHIVE_PREFIXES: [&str; 1] = ["__MACOSX/"];

/// Uploads stored as `<upload_dir>/<original_name>`
#[derive(Debug, Clone)]
pub struct LocalGenomeSource {
    upload_dir: PathBuf,
}

impl LocalGenomeSource {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    fn resolve(&self, original_name: &str) -> Result<PathBuf> {
        let name = Path::new(original_name);
        let plain = name.components().count() == 1
            && matches!(name.components().next(), Some(Component::Normal(_)));
        if !plain {
            bail!("Refusing upload name '{}'", original_name);
        }
        Ok(self.upload_dir.join(name))
    }
}

#[async_trait]
impl GenomeSource for LocalGenomeSource {
    async fn fetch(&self, record: &FileRecord) -> Result<FetchedGenome, ProcessingError> {
        let source = self
            .resolve(&record.original_name)
            .map_err(|e| ProcessingError::Storage(e.to_string()))?;
        let original_name = record.original_name.clone();

        info!("Fetching {} for file {}", source.display(), record.id);

        let fetched = tokio::task::spawn_blocking(move || prepare_working_copy(&source, &original_name))
            .await
            .map_err(|e| ProcessingError::Storage(format!("fetch task failed: {}", e)))?;

        fetched.map_err(|e| ProcessingError::Storage(format!("{:#}", e)))
    }
}

/// Copy the upload into a fresh workspace and unpack it if compressed
pub fn prepare_working_copy(source: &Path, original_name: &str) -> Result<FetchedGenome> {
    let workspace = TempDir::new().context("Failed to create working directory")?;
    let copy = workspace.path().join(original_name);
    std::fs::copy(source, &copy).with_context(|| format!("Failed to copy {}", source.display()))?;

    let lower = original_name.to_ascii_lowercase();
    let path = if lower.ends_with(".zip") {
        extract_zip(&copy, workspace.path())?
    } else if lower.ends_with(".gz") {
        let stem = original_name[..original_name.len() - 3].to_string();
        extract_gzip(&copy, &workspace.path().join("extracted").join(stem))?
    } else {
        copy
    };

    debug!("Working copy ready at {}", path.display());
    Ok(FetchedGenome {
        path,
        original_name: original_name.to_string(),
        workspace,
    })
}

/// Extract the first regular file of a zip archive
fn extract_zip(archive_path: &Path, workspace: &Path) -> Result<PathBuf> {
    let file = File::open(archive_path).context("Failed to open zip archive")?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).context("Invalid zip archive")?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).context("Failed to read zip entry")?;
        if !entry.is_file() || IGNORED_ARCHIVE_PREFIXES.iter().any(|p| entry.name().starts_with(p)) {
            continue;
        }

        let file_name = entry
            .enclosed_name()
            .and_then(|name| name.file_name().map(|n| n.to_os_string()))
            .with_context(|| format!("Unsafe zip entry name '{}'", entry.name()))?;

        let target = workspace.join("extracted").join(file_name);
        std::fs::create_dir_all(workspace.join("extracted"))?;
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out).context("Failed to extract zip entry")?;

        debug!("Extracted {} from archive", entry.name());
        return Ok(target);
    }

    bail!("Zip archive contains no files")
}

fn extract_gzip(archive_path: &Path, target: &Path) -> Result<PathBuf> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut decoder = MultiGzDecoder::new(BufReader::new(File::open(archive_path)?));
    let mut out = File::create(target)?;
    io::copy(&mut decoder, &mut out).context("Failed to decompress gzip upload")?;
    Ok(target.to_path_buf())
}
