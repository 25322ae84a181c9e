use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::seq::IteratorRandom;
use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::core::{FailureClass, verdict};
use crate::data::{PoolCounts, ProxyAddress, RunOptions, Tier};
use crate::effects::http::Connector;
use crate::effects::proxy_source::ProxySource;
use crate::error::{Error, Result};

/// Tuning of a [`ProxyPool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub failure_threshold: u32,
    pub refill_retry_delay: Duration,
    pub max_refill_attempts: u32,
    pub proxy_cooldown: Duration,
    pub rate_limit_cooldown: Duration,
}

impl From<&RunOptions> for PoolOptions {
    fn from(options: &RunOptions) -> Self {
        Self {
            failure_threshold: options.proxy_failure_threshold,
            refill_retry_delay: options.refill_retry_delay,
            max_refill_attempts: options.max_refill_attempts,
            proxy_cooldown: options.proxy_cooldown,
            rate_limit_cooldown: options.rate_limit_cooldown,
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from(&RunOptions::default())
    }
}

struct Entry<T> {
    tier: Tier,
    leased: bool,
    failures: u32,
    last_used: Option<Instant>,
    cooldown_until: Option<Instant>,
    client: Option<Arc<T>>,
}

impl<T> Entry<T> {
    fn new() -> Self {
        Self {
            tier: Tier::Base,
            leased: false,
            failures: 0,
            last_used: None,
            cooldown_until: None,
            client: None,
        }
    }

    fn available(&self) -> bool {
        !self.leased && self.tier != Tier::Broken
    }
}

/// A proxy checked out of the pool.
///
/// The proxy keeps its tier while leased; hand it back with [`ProxyPool::release`],
/// [`ProxyPool::release_after`] or [`ProxyPool::restore`].
#[derive(Debug)]
pub struct ProxyLease<T> {
    address: ProxyAddress,
    client: Arc<T>,
    failures: u32,
    cooldown: Option<Duration>,
}

impl<T> ProxyLease<T> {
    pub fn address(&self) -> &ProxyAddress {
        &self.address
    }

    pub fn client(&self) -> &T {
        &self.client
    }

    /// Count one failure against the proxy when it is released.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Keep the proxy unavailable for `duration` after it is released.
    pub fn cool_down(&mut self, duration: Duration) {
        self.cooldown = Some(duration);
    }
}

/// Every known proxy, each in exactly one of the base, working and broken tiers.
///
/// Membership is a single map keyed by address, so a proxy can never sit in two tiers.
/// Leasing a proxy marks it in use without moving it.
pub struct ProxyPool<C: Connector, S> {
    connector: C,
    source: S,
    options: PoolOptions,
    entries: Mutex<HashMap<ProxyAddress, Entry<C::Client>>>,
    refill_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    exhausted_after: AtomicU32,
    released: watch::Sender<u64>,
}

impl<C: Connector, S: ProxySource> ProxyPool<C, S> {
    pub fn new(connector: C, source: S, options: PoolOptions) -> Self {
        Self {
            connector,
            source,
            options,
            entries: Mutex::new(HashMap::new()),
            refill_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            exhausted_after: AtomicU32::new(0),
            released: watch::Sender::new(0),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ProxyAddress, Entry<C::Client>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add unknown proxies to the base tier. Returns how many were new.
    pub fn insert(&self, addresses: impl IntoIterator<Item = ProxyAddress>) -> usize {
        let mut entries = self.entries();
        let mut added = 0;
        for address in addresses {
            entries.entry(address).or_insert_with(|| {
                added += 1;
                Entry::new()
            });
        }
        drop(entries);

        if added > 0 {
            self.released.send_modify(|n| *n += 1);
        }
        added
    }

    pub fn counts(&self) -> PoolCounts {
        let entries = self.entries();
        let mut counts = PoolCounts::default();
        for entry in entries.values() {
            match entry.tier {
                Tier::Base => counts.base += 1,
                Tier::Working => counts.working += 1,
                Tier::Broken => counts.broken += 1,
            }
            if entry.leased {
                counts.leased += 1;
            }
        }
        counts
    }

    pub fn tier_of(&self, address: &ProxyAddress) -> Option<Tier> {
        self.entries().get(address).map(|entry| entry.tier)
    }

    /// Fetch the proxy source once and insert what it returns.
    pub async fn refresh(&self) -> usize {
        let found = self.source.fetch().await;
        let fetched = found.len();
        let added = self.insert(found);
        info!(fetched, added, "refreshed proxy list");
        added
    }

    /// Refresh unless a refill is already running.
    pub async fn refresh_if_idle(&self) -> usize {
        match self.refill_lock.try_lock() {
            Ok(_guard) => self.refresh().await,
            Err(_) => 0,
        }
    }

    /// Check out a proxy.
    ///
    /// Picks a random working proxy, else the least recently used base proxy, and waits out
    /// its cooldown. While every live proxy is leased it waits for a release. With no live
    /// proxy left a single shared refill runs; it retries after `refill_retry_delay` until
    /// proxies appear, giving up with [`Error::ProxyExhaustion`] after `max_refill_attempts`
    /// fruitless fetches.
    pub async fn acquire(&self) -> Result<ProxyLease<C::Client>> {
        loop {
            let mut released = self.released.subscribe();
            let generation = self.generation.load(Ordering::Acquire);

            if let Some((lease, ready_at)) = self.try_take() {
                if let Some(ready_at) = ready_at {
                    trace!(proxy = %lease.address, "waiting out proxy cooldown");
                    sleep_until(ready_at).await;
                }
                return Ok(lease);
            }

            self.refill(generation, &mut released).await?;
        }
    }

    fn try_take(&self) -> Option<(ProxyLease<C::Client>, Option<Instant>)> {
        let mut entries = self.entries();
        let now = Instant::now();

        loop {
            let address = pick(&entries, now)?;
            let Some(entry) = entries.get_mut(&address) else {
                return None;
            };

            let client = match &entry.client {
                Some(client) => Arc::clone(client),
                None => match self.connector.via_proxy(&address) {
                    Ok(client) => {
                        let client = Arc::new(client);
                        entry.client = Some(Arc::clone(&client));
                        client
                    }
                    Err(e) => {
                        debug!(proxy = %address, error = %e, "unusable proxy");
                        entry.tier = Tier::Broken;
                        continue;
                    }
                },
            };

            entry.leased = true;
            entry.last_used = Some(now);
            let ready_at = entry.cooldown_until.filter(|&until| until > now);

            return Some((
                ProxyLease {
                    address,
                    client,
                    failures: 0,
                    cooldown: None,
                },
                ready_at,
            ));
        }
    }

    async fn refill(&self, seen_generation: u64, released: &mut watch::Receiver<u64>) -> Result<()> {
        let _guard = self.refill_lock.lock().await;

        if self.generation.load(Ordering::Acquire) != seen_generation {
            // another caller refilled while we queued behind it
            return match self.exhausted_after.load(Ordering::Acquire) {
                0 => Ok(()),
                attempts => Err(Error::ProxyExhaustion { attempts }),
            };
        }

        let mut attempts = 0;
        let outcome = loop {
            if self.has_available() {
                break Ok(());
            }
            if self.has_live() {
                // every usable proxy is leased; the pool is busy, not exhausted
                trace!("all live proxies leased, waiting for a release");
                let _ = released.changed().await;
                attempts = 0;
                continue;
            }
            if self.refresh().await > 0 {
                break Ok(());
            }

            attempts += 1;
            if attempts >= self.options.max_refill_attempts {
                warn!(attempts, "proxy sources are exhausted");
                break Err(Error::ProxyExhaustion { attempts });
            }

            debug!(attempts, delay = ?self.options.refill_retry_delay, "no new proxies, retrying later");
            tokio::select! {
                _ = sleep(self.options.refill_retry_delay) => {}
                _ = released.changed() => {}
            }
        };

        let exhausted = match &outcome {
            Err(Error::ProxyExhaustion { attempts }) => *attempts,
            _ => 0,
        };
        self.exhausted_after.store(exhausted, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    fn has_available(&self) -> bool {
        self.entries().values().any(Entry::available)
    }

    /// Whether any member is not broken, leased or not.
    fn has_live(&self) -> bool {
        self.entries().values().any(|entry| entry.tier != Tier::Broken)
    }

    /// Return a proxy into `target`.
    ///
    /// Releasing into working clears the failure counter; a proxy whose counter reached the
    /// threshold goes to broken whatever the target.
    pub fn release(&self, lease: ProxyLease<C::Client>, target: Tier) {
        let now = Instant::now();
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&lease.address) else {
            return;
        };

        entry.leased = false;
        entry.last_used = Some(now);
        if let Some(cooldown) = lease.cooldown {
            entry.cooldown_until = Some(now + cooldown);
        }

        entry.failures += lease.failures;
        if target == Tier::Working {
            entry.failures = 0;
        }
        entry.tier = if entry.failures >= self.options.failure_threshold {
            Tier::Broken
        } else {
            target
        };
        trace!(proxy = %lease.address, tier = ?entry.tier, failures = entry.failures, "released proxy");
        drop(entries);

        self.released.send_modify(|n| *n += 1);
    }

    /// Release after an exchange that succeeded (`None`) or failed with `class`.
    pub fn release_after(&self, mut lease: ProxyLease<C::Client>, class: Option<FailureClass>) {
        let verdict = verdict(class, self.options.proxy_cooldown, self.options.rate_limit_cooldown);

        if verdict.count_failure {
            lease.record_failure();
        }
        if let Some(cooldown) = verdict.cooldown {
            lease.cool_down(cooldown);
        }
        self.release(lease, verdict.tier);
    }

    /// Give back an unused proxy, leaving its tier and counters untouched.
    pub fn restore(&self, lease: ProxyLease<C::Client>) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(&lease.address) {
            entry.leased = false;
        }
        drop(entries);
        self.released.send_modify(|n| *n += 1);
    }
}

fn pick<T>(entries: &HashMap<ProxyAddress, Entry<T>>, now: Instant) -> Option<ProxyAddress> {
    let ready = |entry: &Entry<T>| entry.cooldown_until.is_none_or(|until| until <= now);

    let working = entries
        .iter()
        .filter(|(_, e)| e.available() && e.tier == Tier::Working && ready(e))
        .map(|(address, _)| address)
        .choose(&mut rand::thread_rng());
    if let Some(address) = working {
        return Some(address.clone());
    }

    entries
        .iter()
        .filter(|(_, e)| e.available() && e.tier == Tier::Base)
        .min_by_key(|(_, e)| e.last_used)
        .or_else(|| {
            entries
                .iter()
                .filter(|(_, e)| e.available() && e.tier == Tier::Working)
                .min_by_key(|(_, e)| e.cooldown_until)
        })
        .map(|(address, _)| address.clone())
}
