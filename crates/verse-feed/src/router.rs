//! Routes batch fetches between the local and remote corpora and tracks the
//! remote's health.
//!
//! Remote failures never surface to the feed: the request is served from the
//! local corpus instead. After `degraded_after` consecutive failures the
//! remote is skipped entirely until a cooldown passes, then probed again.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use verse_proto::protocol::{SourceHealth, SourceMode};
use verse_proto::{CorpusSource, Item, SearchField, SearchMatch, SourceError};

/// Where the items of one routed fetch came from.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub items: Vec<Item>,
    pub from_remote: usize,
    pub from_local: usize,
    /// The remote was asked and failed; local stood in.
    pub fell_back: bool,
}

#[derive(Debug)]
struct HealthTracker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    last_error: String,
    degraded_since: Option<Instant>,
}

impl HealthTracker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            consecutive_failures: 0,
            last_error: String::new(),
            degraded_since: None,
        }
    }

    /// False while a degraded remote is cooling down.
    fn remote_allowed(&self) -> bool {
        match self.degraded_since {
            Some(since) => since.elapsed() >= self.cooldown,
            None => true,
        }
    }

    fn record_success(&mut self) {
        if self.degraded_since.is_some() {
            info!("[router] remote recovered");
        }
        self.consecutive_failures = 0;
        self.last_error.clear();
        self.degraded_since = None;
    }

    fn record_failure(&mut self, err: &SourceError) {
        self.consecutive_failures += 1;
        self.last_error = err.to_string();
        if self.consecutive_failures >= self.threshold {
            if self.degraded_since.is_none() {
                warn!(
                    "[router] remote degraded after {} failures: {}",
                    self.consecutive_failures, err
                );
            }
            // A failed probe restarts the cooldown.
            self.degraded_since = Some(Instant::now());
        }
    }

    fn health(&self) -> SourceHealth {
        if self.consecutive_failures >= self.threshold {
            SourceHealth::Degraded {
                consecutive_failures: self.consecutive_failures,
                last_error: self.last_error.clone(),
            }
        } else {
            SourceHealth::Healthy
        }
    }
}

pub struct SourceRouter {
    local: Arc<dyn CorpusSource>,
    remote: Option<Arc<dyn CorpusSource>>,
    health: Mutex<HealthTracker>,
}

impl SourceRouter {
    pub fn new(
        local: Arc<dyn CorpusSource>,
        remote: Option<Arc<dyn CorpusSource>>,
        degraded_after: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            health: Mutex::new(HealthTracker::new(degraded_after, cooldown)),
        }
    }

    pub fn local(&self) -> Arc<dyn CorpusSource> {
        Arc::clone(&self.local)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn health(&self) -> SourceHealth {
        self.tracker().health()
    }

    fn tracker(&self) -> MutexGuard<'_, HealthTracker> {
        match self.health.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The remote, unless it is absent or cooling down.
    fn usable_remote(&self) -> Option<&Arc<dyn CorpusSource>> {
        let remote = self.remote.as_ref()?;
        if self.tracker().remote_allowed() {
            Some(remote)
        } else {
            None
        }
    }

    async fn try_remote<T, F, Fut>(&self, remote: &Arc<dyn CorpusSource>, op: F) -> Option<T>
    where
        F: FnOnce(Arc<dyn CorpusSource>) -> Fut,
        Fut: std::future::Future<Output = Result<T, SourceError>>,
    {
        match op(Arc::clone(remote)).await {
            Ok(value) => {
                self.tracker().record_success();
                Some(value)
            }
            Err(e) => {
                warn!("[router] remote failed, using local corpus: {}", e);
                self.tracker().record_failure(&e);
                None
            }
        }
    }

    /// Fetch up to `count` items for `mode`.
    ///
    /// Local mode reads the local corpus only. Remote mode asks the remote for
    /// everything. Hybrid asks the remote for half and the local corpus for
    /// the rest. Whatever the remote does not deliver is topped up locally.
    /// Fails only when the local corpus fails and nothing else came back.
    pub async fn fetch_batch(
        &self,
        mode: SourceMode,
        count: usize,
    ) -> Result<FetchReport, SourceError> {
        let mut report = FetchReport::default();
        if count == 0 {
            return Ok(report);
        }

        let remote_share = match mode {
            SourceMode::Local => 0,
            SourceMode::Hybrid => count / 2,
            SourceMode::Remote => count,
        };

        if remote_share > 0 {
            match self.usable_remote() {
                Some(remote) => {
                    match self
                        .try_remote(remote, |r| async move { r.fetch_batch(remote_share).await })
                        .await
                    {
                        Some(items) => {
                            report.from_remote = items.len();
                            report.items = items;
                        }
                        None => report.fell_back = true,
                    }
                }
                None => debug!("[router] remote unavailable, {} mode served locally", mode),
            }
        }

        let local_share = count.saturating_sub(report.items.len());
        if local_share > 0 {
            match self.local.fetch_batch(local_share).await {
                Ok(items) => {
                    report.from_local = items.len();
                    report.items.extend(items);
                }
                Err(e) if report.items.is_empty() => return Err(e),
                Err(e) => warn!("[router] local corpus failed: {}", e),
            }
        }

        debug!(
            "[router] {} fetch of {}: {} remote, {} local{}",
            mode,
            count,
            report.from_remote,
            report.from_local,
            if report.fell_back { " (fallback)" } else { "" }
        );
        Ok(report)
    }

    /// Discovery search: the remote when reachable, else the local corpus.
    /// An empty remote answer also falls through to local.
    pub async fn search_by(
        &self,
        field: SearchField,
        query: &str,
        mode: SearchMatch,
        limit: usize,
    ) -> Result<Vec<Item>, SourceError> {
        if let Some(remote) = self.usable_remote() {
            let query = query.to_string();
            let found = self
                .try_remote(remote, |r| async move {
                    r.search_by(field, &query, mode, limit).await
                })
                .await;
            if let Some(items) = found.filter(|items| !items.is_empty()) {
                return Ok(items);
            }
        }
        self.local.search_by(field, query, mode, limit).await
    }
}
