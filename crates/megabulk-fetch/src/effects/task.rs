use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use futures_util::StreamExt;
use megabulk_crypto::{CryptoParams, KEY_LEN, StreamCipher, derive_item_key};
use megabulk_fs::{FileLayout, Recovery, RetryOptions};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::core::{PlannedFile, ranged_request};
use crate::data::TaskStatus;
use crate::effects::http::HttpClient;
use crate::error::{Error, Result};

/// Progress signals emitted by [`FileTask::transfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// The first byte of the response arrived.
    FirstByte,
    /// The partial file now holds this many bytes.
    Committed(u64),
}

/// One file of the share: its identity, its place on disk and its key material.
///
/// Everything here is fixed for the whole run. Mutable progress lives on the scheduler's
/// board, and resume state lives on disk.
pub struct FileTask {
    index: usize,
    item_id: String,
    relative_path: PathBuf,
    size: u64,
    layout: FileLayout,
    key_field: String,
    master_key: [u8; KEY_LEN],
    params: OnceLock<CryptoParams>,
}

impl std::fmt::Debug for FileTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTask")
            .field("index", &self.index)
            .field("item_id", &self.item_id)
            .field("relative_path", &self.relative_path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl FileTask {
    pub fn new(index: usize, file: &PlannedFile, destination: &Path, master_key: [u8; KEY_LEN]) -> Self {
        Self {
            index,
            item_id: file.item.id.clone(),
            relative_path: file.relative_path(),
            size: file.item.size,
            layout: FileLayout::new(destination.join(&file.dir), file.name.clone()),
            key_field: file.item.key.clone(),
            master_key,
            params: OnceLock::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn name(&self) -> &str {
        self.layout.name()
    }

    /// Path relative to the destination directory.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Content key, IV, nonce and expected tag, derived on first use.
    pub fn params(&self) -> Result<&CryptoParams> {
        if let Some(params) = self.params.get() {
            return Ok(params);
        }
        let params = derive_item_key(&self.key_field, &self.master_key)?
            .into_params()
            .ok_or_else(|| megabulk_crypto::Error::MalformedKey(format!("{} carries a folder key", self.item_id)))?;
        Ok(self.params.get_or_init(|| params))
    }

    /// Work out the starting status from what is on disk.
    ///
    /// Partial files that already hold every byte, and empty items, are promoted to their final
    /// name immediately so they go straight to verification. A partial file longer than the
    /// item is discarded. Returns the status and the bytes already committed.
    pub fn recover(&self, retry: RetryOptions) -> Result<(TaskStatus, u64)> {
        self.layout.ensure_dir()?;

        match self.layout.recover()? {
            Recovery::AlreadyDownloaded => Ok((TaskStatus::AlreadyDownloaded, self.size)),
            Recovery::Verify => Ok((TaskStatus::Verifying, self.size)),
            Recovery::Resume(offset) if offset > self.size => {
                debug!(file = %self.relative_path.display(), offset, size = self.size, "discarding oversized part file");
                self.layout.discard_part()?;
                Ok((TaskStatus::Waiting, 0))
            }
            Recovery::Resume(offset) if offset == self.size => {
                self.commit(retry)?;
                Ok((TaskStatus::Verifying, self.size))
            }
            Recovery::Resume(offset) => Ok((TaskStatus::Waiting, offset)),
        }
    }

    /// Stream the remaining bytes from `url`, decrypt them, and append them to the partial file.
    ///
    /// The resume offset is the partial file's length on disk. Every chunk is decrypted at its
    /// absolute offset and written before the next one is read, so whatever is on disk after an
    /// error is a valid prefix. `inactivity` bounds the wait for each chunk.
    pub async fn transfer<H: HttpClient>(
        &self,
        client: &H,
        url: &str,
        inactivity: Duration,
        mut on_event: impl FnMut(TransferEvent) + Send,
    ) -> Result<()> {
        let params = self.params()?;
        let part_path = self.layout.part_path();

        let mut offset = self.layout.part_len()?;
        if offset > self.size {
            self.layout.discard_part()?;
            offset = 0;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&part_path)
            .await
            .map_err(|e| write_error(&part_path, e))?;

        if offset == self.size {
            return Ok(());
        }

        let request = ranged_request(url, offset, self.size - 1);
        debug!(file = %self.relative_path.display(), offset, url = %request.url, "requesting range");

        let mut stream = timeout(inactivity, client.stream(&request.url, &request.headers))
            .await
            .map_err(|_| Error::TransferTimeout(inactivity))??;

        let mut cipher = StreamCipher::seek(&params.key, &params.iv, offset);
        let mut committed = offset;

        let streamed: Result<()> = async {
            let mut first = true;
            while committed < self.size {
                let chunk = match timeout(inactivity, stream.next()).await {
                    Err(_) => return Err(Error::TransferTimeout(inactivity)),
                    Ok(None) => break,
                    Ok(Some(chunk)) => chunk?,
                };
                if chunk.is_empty() {
                    continue;
                }
                if first {
                    first = false;
                    on_event(TransferEvent::FirstByte);
                }

                let wanted = (self.size - committed).min(chunk.len() as u64) as usize;
                let mut buf = chunk[..wanted].to_vec();
                cipher.apply(&mut buf);

                file.write_all(&buf).await.map_err(|e| write_error(&part_path, e))?;
                committed += wanted as u64;
                on_event(TransferEvent::Committed(committed));
            }
            Ok(())
        }
        .await;

        // the part length is the next resume offset, so it must be on disk before returning
        file.flush().await.map_err(|e| write_error(&part_path, e))?;
        file.sync_data().await.map_err(|e| write_error(&part_path, e))?;
        trace!(file = %self.relative_path.display(), committed, "transfer ended");
        streamed?;

        if committed < self.size {
            return Err(Error::IncompleteTransfer {
                expected: self.size,
                received: committed,
            });
        }
        Ok(())
    }

    /// Rename the complete partial file to its final name and persist the verifying marker.
    pub fn commit(&self, retry: RetryOptions) -> Result<()> {
        commit(&self.layout, self.size, retry)
    }

    /// [`FileTask::commit`] on the blocking thread pool.
    pub async fn commit_blocking(&self, retry: RetryOptions) -> Result<()> {
        let size = self.size;
        self.with_layout(move |layout| commit(layout, size, retry)).await
    }

    /// Persist the downloaded marker, off the async workers.
    pub async fn mark_downloaded(&self) -> Result<()> {
        let size = self.size;
        self.with_layout(move |layout| Ok(layout.mark_downloaded(size)?)).await
    }

    /// Delete the final file and both markers, off the async workers.
    pub async fn discard_output(&self) -> Result<()> {
        self.with_layout(|layout| Ok(layout.discard_output()?)).await
    }

    /// Run filesystem work on this file's layout with `spawn_blocking`. Renames retry with
    /// a sleeping backoff and markers are synced, neither of which may stall the runtime.
    pub(crate) async fn with_layout<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileLayout) -> Result<T> + Send + 'static,
    {
        let layout = self.layout.clone();
        tokio::task::spawn_blocking(move || work(&layout))
            .await
            .map_err(|e| Error::InvalidState(format!("filesystem task failed: {e}")))?
    }
}

fn commit(layout: &FileLayout, size: u64, retry: RetryOptions) -> Result<()> {
    if size == 0 && !layout.part_path().exists() {
        layout.create_empty()?;
    } else {
        layout.promote_part(retry)?;
    }
    layout.mark_verifying(size)?;
    Ok(())
}

fn write_error(path: &Path, source: std::io::Error) -> Error {
    Error::Fs(megabulk_fs::Error::Write {
        path: path.to_path_buf(),
        source,
    })
}
