use std::fs;
use std::path::{Path, PathBuf};

use crate::primitives::{AtomicWriteOptions, RetryOptions, atomic_write, len_or_zero, remove_if_exists, replace_file};
use crate::{Error, Result};

const PART_SUFFIX: &str = ".part";
const VERIFYING_PREFIX: &str = ".verifying.";
const DOWNLOADED_PREFIX: &str = ".downloaded.";

/// What the files on disk say about a download after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The downloaded marker exists; nothing left to do.
    AlreadyDownloaded,
    /// A final file exists that has not been verified yet.
    Verify,
    /// Transfer from this byte offset, the current length of the partial file.
    Resume(u64),
}

/// On-disk layout of a single download inside its destination directory.
///
/// ```text
/// <dir>/<name>.part
/// <dir>/.verifying.<name>
/// <dir>/.downloaded.<name>
/// <dir>/<name>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    dir: PathBuf,
    name: String,
}

impl FileLayout {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    pub fn part_path(&self) -> PathBuf {
        self.dir.join(format!("{}{PART_SUFFIX}", self.name))
    }

    pub fn verifying_marker(&self) -> PathBuf {
        self.dir.join(format!("{VERIFYING_PREFIX}{}", self.name))
    }

    pub fn downloaded_marker(&self) -> PathBuf {
        self.dir.join(format!("{DOWNLOADED_PREFIX}{}", self.name))
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::Write {
            path: self.dir.clone(),
            source: e,
        })
    }

    /// Bytes already committed to the partial file.
    pub fn part_len(&self) -> Result<u64> {
        len_or_zero(self.part_path())
    }

    pub fn discard_part(&self) -> Result<bool> {
        remove_if_exists(self.part_path())
    }

    /// Rename the partial file to its final name.
    pub fn promote_part(&self, retry: RetryOptions) -> Result<()> {
        replace_file(self.part_path(), self.final_path(), retry)
    }

    /// Create an empty final file directly, for zero-length items.
    pub fn create_empty(&self) -> Result<()> {
        atomic_write(self.final_path(), &[], AtomicWriteOptions::new())
    }

    /// Persist the crash-recovery checkpoint taken between rename and verification.
    pub fn mark_verifying(&self, size: u64) -> Result<()> {
        atomic_write(self.verifying_marker(), size.to_string().as_bytes(), AtomicWriteOptions::new())
    }

    /// Persist the downloaded marker, then drop the verifying marker.
    pub fn mark_downloaded(&self, size: u64) -> Result<()> {
        atomic_write(self.downloaded_marker(), size.to_string().as_bytes(), AtomicWriteOptions::new())?;
        remove_if_exists(self.verifying_marker())?;
        Ok(())
    }

    /// Remove the final file, the partial file and the verifying marker.
    pub fn discard_output(&self) -> Result<()> {
        remove_if_exists(self.final_path())?;
        remove_if_exists(self.part_path())?;
        remove_if_exists(self.verifying_marker())?;
        Ok(())
    }

    /// Inspect the layout after a restart.
    ///
    /// A verifying marker without a final file is stale and removed. A final file with no
    /// marker and no partial file means the process stopped between the rename and the
    /// marker write, so it is verified rather than downloaded again.
    pub fn recover(&self) -> Result<Recovery> {
        if self.downloaded_marker().exists() {
            return Ok(Recovery::AlreadyDownloaded);
        }

        let has_final = self.final_path().is_file();
        if self.verifying_marker().exists() {
            if has_final {
                return Ok(Recovery::Verify);
            }
            remove_if_exists(self.verifying_marker())?;
        }

        let part = self.part_path();
        if has_final && !part.exists() {
            return Ok(Recovery::Verify);
        }

        Ok(Recovery::Resume(len_or_zero(part)?))
    }
}
