use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use megabulk_fs::RetryOptions;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::core::{Board, FailureClass, TaskState, classify, plan};
use crate::data::{FailedFile, Item, RunOptions, RunReport, RunSnapshot, ShareCredential, TaskStatus, Tier};
use crate::effects::http::Connector;
use crate::effects::pool::{PoolOptions, ProxyLease, ProxyPool};
use crate::effects::provider::Provider;
use crate::effects::proxy_source::ProxySource;
use crate::effects::task::{FileTask, TransferEvent};
use crate::effects::verify::{VerifyEvent, verify};
use crate::error::{Error, Result};

/// Drives every file of a shared folder to a terminal state.
///
/// A fixed set of proxy workers claims waiting files and proxies and asks the provider for
/// download URLs. Each URL obtained is handed to a separately spawned transfer, and each
/// finished transfer to a separately spawned verification, so workers keep probing while
/// bytes flow. All shared state lives in one context object behind an `Arc`.
///
/// # Examples
///
/// ```no_run
/// use megabulk_fetch::{
///     RemoteProxyLists, ReqwestClient, ReqwestConnector, RunOptions, Scheduler, ShareCredential,
/// };
///
/// # async fn example() -> megabulk_fetch::Result<()> {
/// let credential = ShareCredential::parse("https://mega.nz/folder/abcdEFGH#0123456789abcdefghijkl")?;
/// let source = RemoteProxyLists::new(ReqwestClient::new()?);
///
/// let scheduler = Scheduler::prepare(&credential, "downloads", ReqwestConnector, source, RunOptions::default()).await?;
/// let report = scheduler.run().await?;
/// println!("{} downloaded, {} failed", report.downloaded, report.failed.len());
/// # Ok(())
/// # }
/// ```
pub struct Scheduler<C: Connector, S> {
    shared: Arc<Shared<C, S>>,
}

struct Shared<C: Connector, S> {
    options: RunOptions,
    provider: Provider,
    pool: ProxyPool<C, S>,
    tasks: Vec<FileTask>,
    board: Mutex<Board>,
    changed: watch::Sender<u64>,
    background: Mutex<JoinSet<()>>,
    skipped: Vec<(String, String)>,
}

impl<C: Connector, S: ProxySource> Scheduler<C, S> {
    /// List the shared folder over a direct connection and build the run.
    pub async fn prepare(
        credential: &ShareCredential,
        destination: impl AsRef<Path>,
        connector: C,
        source: S,
        options: RunOptions,
    ) -> Result<Self> {
        let provider = Provider::new(options.api_url.clone(), credential.folder_id());
        let client = connector.direct()?;
        let items = provider.list_folder(&client, options.probe_timeout).await?;
        info!(items = items.len(), folder = credential.folder_id(), "listed shared folder");

        Self::from_items(credential, &items, destination, connector, source, options)
    }

    /// Build the run from an already fetched listing.
    ///
    /// Every file's state is recovered from disk here: finished files are skipped, files
    /// whose verification was interrupted go straight back to verification, and partial
    /// files resume from their length.
    pub fn from_items(
        credential: &ShareCredential,
        items: &[Item],
        destination: impl AsRef<Path>,
        connector: C,
        source: S,
        options: RunOptions,
    ) -> Result<Self> {
        let destination = destination.as_ref();
        let planned = plan(items, credential.master_key());
        for (id, reason) in &planned.skipped {
            warn!(item = %id, %reason, "skipping item with unreadable metadata");
        }

        let retry = RetryOptions::new();
        let mut tasks = Vec::with_capacity(planned.files.len());
        let mut states = Vec::with_capacity(planned.files.len());
        for (index, file) in planned.files.iter().enumerate() {
            let task = FileTask::new(index, file, destination, *credential.master_key());
            let state = match task.recover(retry) {
                Ok((status, downloaded)) => {
                    debug!(file = %task.relative_path().display(), %status, downloaded, "recovered");
                    TaskState::new(status, downloaded)
                }
                Err(e) => {
                    error!(file = %task.relative_path().display(), error = %e, "cannot prepare file");
                    let mut state = TaskState::new(TaskStatus::Failed, 0);
                    state.error = Some(e.to_string());
                    state
                }
            };
            tasks.push(task);
            states.push(state);
        }

        let pool = ProxyPool::new(connector, source, PoolOptions::from(&options));
        Ok(Self {
            shared: Arc::new(Shared {
                provider: Provider::new(options.api_url.clone(), credential.folder_id()),
                options,
                pool,
                tasks,
                board: Mutex::new(Board::new(states)),
                changed: watch::Sender::new(0),
                background: Mutex::new(JoinSet::new()),
                skipped: planned.skipped,
            }),
        })
    }

    pub fn tasks(&self) -> &[FileTask] {
        &self.shared.tasks
    }

    pub fn status(&self, index: usize) -> TaskStatus {
        self.shared.board().status(index)
    }

    pub fn pool(&self) -> &ProxyPool<C, S> {
        &self.shared.pool
    }

    /// Aggregate progress at this instant.
    pub fn snapshot(&self) -> RunSnapshot {
        self.shared.snapshot()
    }

    /// Subscribe to state changes; the value is bumped on every transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changed.subscribe()
    }

    /// Run until every file is downloaded, already downloaded or failed.
    ///
    /// Fails with [`Error::ProxyExhaustion`] when no proxy can be obtained any more; work
    /// already in flight is allowed to finish first and partial files stay on disk for the
    /// next run.
    pub async fn run(&self) -> Result<RunReport> {
        let shared = &self.shared;
        info!(
            files = shared.tasks.len(),
            workers = shared.options.workers,
            max_probing = shared.options.max_probing,
            max_transferring = shared.options.max_transferring,
            "starting run"
        );

        let pending: Vec<usize> = {
            let board = shared.board();
            (0..board.len()).filter(|&i| board.status(i) == TaskStatus::Verifying).collect()
        };
        for index in pending {
            Arc::clone(shared).spawn_verification(index);
        }

        if shared.board().count(TaskStatus::Waiting) > 0 {
            let loaded = shared.pool.refresh().await;
            info!(proxies = loaded, "loaded proxy lists");
        }

        let refresher = tokio::spawn(Arc::clone(shared).refresh_periodically());

        let mut workers = JoinSet::new();
        for id in 0..shared.options.workers.max(1) {
            workers.spawn(Arc::clone(shared).work(id));
        }

        let fatal = shared.wait(&mut workers).await;

        workers.abort_all();
        refresher.abort();
        drop(std::mem::take(&mut *shared.background()));
        while workers.join_next().await.is_some() {}

        if let Some(e) = fatal {
            error!(error = %e, "run aborted");
            return Err(e);
        }

        let report = shared.report();
        info!(
            downloaded = report.downloaded,
            already_downloaded = report.already_downloaded,
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "run finished"
        );
        Ok(report)
    }
}

impl<C: Connector, S: ProxySource> Shared<C, S> {
    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn background(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changed.send_modify(|n| *n = n.wrapping_add(1));
    }

    fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
        let mut background = self.background();
        while background.try_join_next().is_some() {}
        background.spawn(future);
    }

    fn snapshot(&self) -> RunSnapshot {
        let mut snapshot = self.board().snapshot(self.tasks.iter().map(FileTask::size));
        snapshot.proxies = self.pool.counts();
        snapshot
    }

    fn set_status(&self, index: usize, next: TaskStatus) -> bool {
        let result = self.board().transition(index, next);
        match result {
            Ok(previous) => {
                debug!(file = %self.tasks[index].relative_path().display(), from = %previous, to = %next, "transition");
                self.notify();
                true
            }
            Err(e) => {
                warn!(file = %self.tasks[index].relative_path().display(), error = %e, "rejected transition");
                false
            }
        }
    }

    fn fail(&self, index: usize, reason: &Error) {
        let path = self.tasks[index].relative_path();
        error!(file = %path.display(), error = %reason, "file failed");
        if let Err(e) = self.board().fail(index, reason.to_string()) {
            warn!(file = %path.display(), error = %e, "rejected transition");
        }
        self.notify();
    }

    /// Tasks that still hold a probe, a transfer or a verification.
    fn active(board: &Board) -> usize {
        board.count(TaskStatus::FindingProxy) + board.transferring() + board.count(TaskStatus::Verifying)
    }

    async fn wait(&self, workers: &mut JoinSet<Result<()>>) -> Option<Error> {
        let mut changes = self.changed.subscribe();
        let mut fatal = None;

        loop {
            changes.borrow_and_update();
            let (complete, active) = {
                let board = self.board();
                (board.is_complete(), Self::active(&board))
            };
            if complete {
                return None;
            }
            if active == 0 && (fatal.is_some() || workers.is_empty()) {
                return Some(fatal.unwrap_or_else(|| Error::InvalidState("every worker stopped".into())));
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return fatal;
                    }
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        fatal.get_or_insert(e);
                    }
                    Err(e) if e.is_panic() => {
                        fatal.get_or_insert(Error::InvalidState(format!("worker panicked: {e}")));
                    }
                    Err(_) => {}
                },
            }
        }
    }

    fn report(&self) -> RunReport {
        let board = self.board();
        let mut report = RunReport {
            skipped: self.skipped.clone(),
            ..RunReport::default()
        };
        for (index, task) in self.tasks.iter().enumerate() {
            let state = board.state(index);
            match state.status {
                TaskStatus::Downloaded => report.downloaded += 1,
                TaskStatus::AlreadyDownloaded => report.already_downloaded += 1,
                TaskStatus::Failed => report.failed.push(FailedFile {
                    path: task.relative_path().to_path_buf(),
                    reason: state.error.clone().unwrap_or_default(),
                }),
                _ => {}
            }
        }
        report
    }

    async fn refresh_periodically(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.options.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            let added = self.pool.refresh_if_idle().await;
            debug!(added, "periodic proxy refresh");
        }
    }

    /// One proxy worker: claim a file and a proxy, obtain a URL, hand off the transfer.
    async fn work(self: Arc<Self>, id: usize) -> Result<()> {
        let mut changes = self.changed.subscribe();
        let (max_probing, max_transferring) = (self.options.max_probing, self.options.max_transferring);

        loop {
            changes.borrow_and_update();
            let (done, admissible) = {
                let board = self.board();
                (
                    board.is_complete() || board.is_halted(),
                    board.admissible(max_probing, max_transferring),
                )
            };
            if done {
                return Ok(());
            }
            if !admissible {
                if changes.changed().await.is_err() {
                    return Ok(());
                }
                continue;
            }

            let lease = match self.pool.acquire().await {
                Ok(lease) => lease,
                Err(e) => {
                    // no further claims by any worker; in-flight work drains
                    self.board().halt();
                    self.notify();
                    return Err(e);
                }
            };
            let claimed = self.board().claim(max_probing, max_transferring);
            let Some(index) = claimed else {
                self.pool.restore(lease);
                continue;
            };
            self.notify();
            debug!(worker = id, file = %self.tasks[index].relative_path().display(), proxy = %lease.address(), "probing");

            self.probe(index, lease).await;
        }
    }

    async fn probe(self: &Arc<Self>, index: usize, lease: ProxyLease<C::Client>) {
        let task = &self.tasks[index];
        let requested = self
            .provider
            .request_download_url(lease.client(), task.item_id(), self.options.probe_timeout)
            .await;

        match requested {
            Ok(ticket) => {
                if ticket.size != 0 && ticket.size != task.size() {
                    debug!(file = %task.relative_path().display(), listed = task.size(), offered = ticket.size, "size differs from listing");
                }
                let started = self.board().begin_stream(index, self.options.max_transferring);
                self.notify();
                if started {
                    let shared = Arc::clone(self);
                    self.spawn(shared.transfer(index, lease, ticket.url));
                } else {
                    debug!(file = %task.relative_path().display(), "transfer slots full, returning url");
                    self.pool.release(lease, Tier::Working);
                }
            }
            Err(e) => {
                let class = classify(&e);
                self.pool.release_after(lease, Some(class));
                if class == FailureClass::Item {
                    self.fail(index, &e);
                } else {
                    debug!(file = %task.relative_path().display(), error = %e, "download url request failed");
                    self.set_status(index, TaskStatus::Waiting);
                }
            }
        }
    }

    async fn transfer(self: Arc<Self>, index: usize, lease: ProxyLease<C::Client>, url: String) {
        let task = &self.tasks[index];
        let shared = &self;

        let result = task
            .transfer(lease.client(), &url, self.options.inactivity_timeout, |event| match event {
                TransferEvent::FirstByte => {
                    shared.set_status(index, TaskStatus::Downloading);
                }
                TransferEvent::Committed(bytes) => {
                    shared.board().record_downloaded(index, Instant::now(), bytes);
                }
            })
            .await;
        let result = match result {
            Ok(()) => task.commit_blocking(RetryOptions::new()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.pool.release(lease, Tier::Working);
                if self.set_status(index, TaskStatus::Verifying) {
                    Arc::clone(&self).spawn_verification(index);
                }
            }
            Err(e) if e.is_fatal_for_file() => {
                self.pool.release(lease, Tier::Working);
                self.fail(index, &e);
            }
            Err(e) => {
                debug!(file = %task.relative_path().display(), proxy = %lease.address(), error = %e, "transfer interrupted");
                self.pool.release_after(lease, Some(classify(&e)));
                self.set_status(index, TaskStatus::Waiting);
            }
        }
    }

    fn spawn_verification(self: Arc<Self>, index: usize) {
        let shared = Arc::clone(&self);
        self.spawn(shared.verify(index));
    }

    async fn verify(self: Arc<Self>, index: usize) {
        let task = &self.tasks[index];
        let params = match task.params() {
            Ok(params) => params,
            Err(e) => return self.fail(index, &e),
        };
        let path: PathBuf = task.layout().final_path();
        debug!(file = %task.relative_path().display(), "verifying");

        let (events, mut progress) = mpsc::channel(16);
        let drain = async {
            while let Some(VerifyEvent::Progress(bytes)) = progress.recv().await {
                self.board().record_verified(index, bytes);
            }
        };
        let (result, ()) = tokio::join!(verify(&self.options.verify, &path, params, events), drain);

        match result {
            Ok(_) => match task.mark_downloaded().await {
                Ok(()) => {
                    info!(file = %task.relative_path().display(), size = task.size(), "downloaded");
                    self.set_status(index, TaskStatus::Downloaded);
                }
                Err(e) => self.fail(index, &e),
            },
            Err(Error::IntegrityMismatch { expected, actual }) => {
                warn!(file = %task.relative_path().display(), %expected, %actual, "integrity mismatch, restarting file");
                if let Err(e) = task.discard_output().await {
                    return self.fail(index, &e);
                }
                let failures = self.board().record_integrity_failure(index);
                if failures > self.options.max_integrity_failures {
                    self.fail(index, &Error::IntegrityMismatch { expected, actual });
                } else {
                    self.set_status(index, TaskStatus::Waiting);
                }
            }
            Err(e) => self.fail(index, &e),
        }
    }
}

impl<C: Connector, S> std::fmt::Debug for Scheduler<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.shared.tasks.len())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}
