// ==============================================================================
// secure_delete.rs - Working Copy Release
// ==============================================================================
// Description: Multi-pass overwrite and removal of a run's genome working copy
// Version: 2.0.0
// ==============================================================================
// Pass pattern:
//   1. 0x00
//   2. 0xFF
//   3-6. random bytes
//   7. 0x00
// ==============================================================================

use anyhow::{Context, Result};
use rand::RngCore;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::services::FetchedGenome;

const PASSES: usize = 7;
const CHUNK_SIZE: usize = 64 * 1024;

/// Overwrite a file in place seven times, then unlink it
pub fn secure_delete_file(path: &Path) -> Result<()> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    debug!("Overwriting {} ({} bytes, {} passes)", path.display(), size, PASSES);

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for overwrite", path.display()))?;

    let mut rng = rand::thread_rng();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    for pass in 0..PASSES {
        file.seek(SeekFrom::Start(0)).context("Failed to seek to file start")?;

        let mut remaining = size;
        while remaining > 0 {
            let len = remaining.min(CHUNK_SIZE as u64) as usize;
            match pass {
                1 => buffer[..len].fill(0xFF),
                2..=5 => rng.fill_bytes(&mut buffer[..len]),
                _ => buffer[..len].fill(0x00),
            }
            file.write_all(&buffer[..len]).context("Failed to write overwrite pattern")?;
            remaining -= len as u64;
        }

        file.sync_all().context("Failed to sync file to disk")?;
    }

    drop(file);
    std::fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    Ok(())
}

/// Securely delete every regular file below `path`, then the tree itself
pub fn secure_delete_directory(path: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(path).contents_first(true) {
        let entry = entry.context("Failed to walk working directory")?;
        let entry_path = entry.path();

        if entry.file_type().is_file() {
            secure_delete_file(entry_path)?;
        } else if entry.file_type().is_dir() {
            std::fs::remove_dir(entry_path)
                .with_context(|| format!("Failed to remove {}", entry_path.display()))?;
        } else {
            std::fs::remove_file(entry_path)
                .with_context(|| format!("Failed to remove {}", entry_path.display()))?;
        }
    }
    Ok(())
}

/// Destroy the working copy of a run on a blocking thread
///
/// The temporary workspace is consumed; if the overwrite fails part way the
/// remaining files are still removed when it drops.
pub async fn release(genome: FetchedGenome) -> Result<()> {
    let name = genome.original_name.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let root = genome.workspace.path().to_path_buf();
        let result = secure_delete_directory(&root);
        if result.is_ok() {
            // Already gone from disk; skip the TempDir cleanup
            let _ = genome.workspace.keep();
        }
        result
    })
    .await
    .context("Release task panicked")?;

    match &outcome {
        Ok(()) => info!("Working copy of {} securely deleted", name),
        Err(e) => warn!("Secure deletion of {} incomplete: {:#}", name, e),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_secure_delete_removes_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();
        std::fs::write(&path, vec![b'A'; CHUNK_SIZE * 2 + 17]).unwrap();

        secure_delete_file(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_secure_delete_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        assert!(secure_delete_file(&dir.path().join("absent.txt")).is_err());
    }

    #[tokio::test]
    async fn test_release_removes_workspace() {
        let workspace = TempDir::new().unwrap();
        let root = workspace.path().to_path_buf();
        std::fs::create_dir(root.join("extracted")).unwrap();
        let path: PathBuf = root.join("extracted").join("genome.txt");
        std::fs::write(&path, b"rs4680\t22\t19951271\tAG\n").unwrap();
        std::fs::write(root.join("genome.zip"), b"PK").unwrap();

        let genome = FetchedGenome {
            path,
            original_name: "genome.zip".to_string(),
            workspace,
        };

        release(genome).await.unwrap();
        assert!(!root.exists());
    }
}
