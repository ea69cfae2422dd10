#![allow(dead_code)]

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use verse_feed::core::{FeedCore, FeedEvent};
use verse_feed::SourceRouter;
use verse_proto::config::FeedConfig;
use verse_proto::local::LocalCorpus;
use verse_proto::protocol::{Broadcast, FeedSnapshot};
use verse_proto::{CorpusSource, Item, ItemId, SearchField, SearchMatch, SourceError, SourceKind};

pub const WAIT: Duration = Duration::from_secs(3);

pub fn local_corpus(n: u64) -> Arc<dyn CorpusSource> {
    let poems = (0..n)
        .map(|i| Item::new(ItemId::Local(i), format!("Local poem {}", i), "Anon", "line"))
        .collect();
    Arc::new(LocalCorpus::with_rng(poems, StdRng::seed_from_u64(11)))
}

/// A stand-in remote corpus: mints fresh items, optionally slowly. It can
/// fail every call or only the first few.
pub struct ScriptedRemote {
    fail: AtomicBool,
    fail_first: usize,
    delay: Duration,
    calls: AtomicUsize,
    next_id: AtomicU64,
}

impl ScriptedRemote {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            fail_first: 0,
            delay,
            calls: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn failing() -> Arc<Self> {
        let remote = Self::new(Duration::ZERO);
        remote.fail.store(true, Ordering::SeqCst);
        remote
    }

    /// Fails the first `n` calls, then recovers.
    pub fn flaky(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            fail_first: n,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn mint(&self, count: usize) -> Vec<Item> {
        (0..count)
            .map(|_| {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                Item::new(ItemId::Remote(n), format!("Remote poem {}", n), "Anon", "line")
            })
            .collect()
    }

    async fn call(&self, count: usize) -> Result<Vec<Item>, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) || call < self.fail_first {
            return Err(SourceError::Network("connection refused".into()));
        }
        Ok(self.mint(count))
    }
}

#[async_trait]
impl CorpusSource for ScriptedRemote {
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn total_count(&self) -> Result<Option<usize>, SourceError> {
        Ok(None)
    }

    async fn get_page(&self, _offset: usize, _limit: usize) -> Result<Vec<Item>, SourceError> {
        Err(SourceError::Unsupported {
            kind: SourceKind::Remote,
            operation: "get_page",
        })
    }

    async fn fetch_batch(&self, count: usize) -> Result<Vec<Item>, SourceError> {
        self.call(count).await
    }

    async fn search_by(
        &self,
        _field: SearchField,
        _query: &str,
        _mode: SearchMatch,
        limit: usize,
    ) -> Result<Vec<Item>, SourceError> {
        self.call(limit).await
    }
}

pub struct Harness {
    pub event_tx: mpsc::Sender<FeedEvent>,
    pub broadcast_rx: broadcast::Receiver<Broadcast>,
    pub snapshot: Arc<RwLock<FeedSnapshot>>,
    pub router: Arc<SourceRouter>,
}

pub fn start(config: FeedConfig, router: SourceRouter) -> Harness {
    let (broadcast_tx, broadcast_rx) = broadcast::channel(4096);
    let (event_tx, event_rx) = mpsc::channel(64);
    let core = FeedCore::new(config, Arc::new(router), broadcast_tx, event_tx.clone());
    let snapshot = core.snapshot();
    let router = core.router();
    tokio::spawn(core.run(event_rx));
    Harness {
        event_tx,
        broadcast_rx,
        snapshot,
        router,
    }
}

impl Harness {
    pub async fn send(&self, cmd: verse_proto::protocol::Command) {
        self.event_tx
            .send(FeedEvent::Client(cmd))
            .await
            .expect("feed core stopped");
    }

    /// Poll the snapshot until `pred` holds or `WAIT` runs out.
    pub async fn wait_for<F>(&self, pred: F) -> FeedSnapshot
    where
        F: Fn(&FeedSnapshot) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let snapshot = self.snapshot.read().await.clone();
            if pred(&snapshot) {
                return snapshot;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting on snapshot: {:?}", snapshot);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Everything broadcast so far.
    pub fn drain(&mut self) -> Vec<Broadcast> {
        let mut out = Vec::new();
        while let Ok(msg) = self.broadcast_rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// The cursor sits at `position` with nothing loading and its slot filled.
pub fn settled_at(position: usize) -> impl Fn(&FeedSnapshot) -> bool {
    move |s| {
        s.cursor == position
            && s.loading == 0
            && s.slot_at(position).and_then(|v| v.item_id()).is_some()
    }
}

pub fn filled_ids(snapshot: &FeedSnapshot) -> Vec<ItemId> {
    snapshot
        .window
        .iter()
        .filter_map(|s| s.slot.item_id())
        .collect()
}
