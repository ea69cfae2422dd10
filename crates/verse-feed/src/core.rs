//! FeedCore: single-owner event loop for the feed.
//!
//! FeedCore owns the source switch (and through it the pool, slot array and
//! cursor) exclusively. HTTP handlers, fetch tasks and the maintenance ticker
//! talk to it by sending `FeedEvent`s. After every change it rewrites the
//! shared `FeedSnapshot` and broadcasts what happened.
//!
//! At most one fetch is outstanding. A fill needed while a fetch is running
//! is remembered and re-run when that fetch lands. Targets left Empty by a
//! failed or short fetch are retried once the pool has items again.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};
use verse_proto::config::FeedConfig;
use verse_proto::protocol::{Broadcast, Command, FeedSnapshot, SourceHealth, SourceMode};
use verse_proto::{Item, SourceError};

use crate::controller::{FillOutcome, MoveOutcome};
use crate::router::{FetchReport, SourceRouter};
use crate::switch::SourceSwitch;

// ── FeedEvent ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// Slots near the cursor are waiting on this batch.
    Fill,
    /// The pool fell below its floor.
    Replenish,
}

/// All inputs into the FeedCore loop.
#[derive(Debug)]
pub enum FeedEvent {
    /// A command from an HTTP client.
    Client(Command),
    /// A batch fetch finished. `generation` is the session it was issued for.
    FetchDone {
        generation: u64,
        purpose: FetchPurpose,
        result: Result<FetchReport, SourceError>,
    },
    /// Periodic replenishment check.
    MaintenanceTick,
    #[allow(dead_code)]
    Shutdown,
}

// ── FeedCore ──────────────────────────────────────────────────────────────────

pub struct FeedCore {
    switch: SourceSwitch,
    router: Arc<SourceRouter>,
    snapshot: Arc<RwLock<FeedSnapshot>>,
    broadcast_tx: broadcast::Sender<Broadcast>,
    event_tx: mpsc::Sender<FeedEvent>,
    /// Generation of the outstanding fetch, if any.
    in_flight: Option<u64>,
    /// A fill pass wanted a fetch while one was already running.
    pending_fill: bool,
    last_health: SourceHealth,
    rev: u64,
}

impl FeedCore {
    pub fn new(
        config: FeedConfig,
        router: Arc<SourceRouter>,
        broadcast_tx: broadcast::Sender<Broadcast>,
        event_tx: mpsc::Sender<FeedEvent>,
    ) -> Self {
        let mode = if router.has_remote() {
            config.initial_mode
        } else {
            SourceMode::Local
        };
        let switch = SourceSwitch::new(config, mode);
        let last_health = router.health();
        Self {
            switch,
            router,
            snapshot: Arc::new(RwLock::new(FeedSnapshot::default())),
            broadcast_tx,
            event_tx,
            in_flight: None,
            pending_fill: false,
            last_health,
            rev: 0,
        }
    }

    /// Shared read handle for the HTTP server.
    pub fn snapshot(&self) -> Arc<RwLock<FeedSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    pub fn router(&self) -> Arc<SourceRouter> {
        Arc::clone(&self.router)
    }

    /// Run the core event loop. Returns on `Shutdown` or when every sender
    /// is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<FeedEvent>) -> anyhow::Result<()> {
        info!(
            "[core] starting event loop in {} mode",
            self.switch.mode()
        );

        let tick_tx = self.event_tx.clone();
        let interval = self.switch.session().controller().config().maintenance_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if tick_tx.send(FeedEvent::MaintenanceTick).await.is_err() {
                    break;
                }
            }
        });

        self.move_cursor(0);
        self.publish().await;

        loop {
            match event_rx.recv().await {
                None => {
                    info!("[core] event channel closed, shutting down");
                    break;
                }

                Some(FeedEvent::Shutdown) => {
                    info!("[core] shutdown requested");
                    break;
                }

                Some(FeedEvent::Client(cmd)) => {
                    debug!("[core] command {:?}", cmd);
                    self.handle_command(cmd);
                }

                Some(FeedEvent::FetchDone {
                    generation,
                    purpose,
                    result,
                }) => {
                    if !self.switch.accepts(generation) {
                        debug!(
                            "[core] discarding {:?} fetch from generation {} (now {})",
                            purpose,
                            generation,
                            self.switch.generation()
                        );
                        continue;
                    }
                    self.handle_fetch_done(purpose, result);
                }

                Some(FeedEvent::MaintenanceTick) => {
                    // Searches reach the remote outside the fetch path.
                    self.check_health();
                    self.retry_empty_targets();
                    self.maybe_replenish();
                }
            }
            self.publish().await;
        }

        Ok(())
    }

    // ── commands ─────────────────────────────────────────────────────────────

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::MoveTo { position } => self.move_cursor(position),
            Command::Next => {
                let controller = self.switch.session().controller();
                let last = controller.slots().capacity().saturating_sub(1);
                let target = (controller.cursor() + 1).min(last);
                self.move_cursor(target);
            }
            Command::Prev => {
                let target = self.switch.session().controller().cursor().saturating_sub(1);
                self.move_cursor(target);
            }
            Command::SwitchSource { mode } => self.switch_source(mode),
            Command::Replenish => self.maybe_replenish(),
            // Every handled event republishes the snapshot.
            Command::GetState => {}
        }
    }

    fn move_cursor(&mut self, position: usize) {
        let outcome = match self.switch.session_mut().controller_mut().move_to(position) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("[core] move rejected: {}", e);
                return;
            }
        };
        let MoveOutcome {
            cursor,
            released,
            fill,
        } = outcome;
        if !released.is_empty() {
            debug!("[core] eviction released {} items", released.len());
        }
        let _ = self
            .broadcast_tx
            .send(Broadcast::CursorMoved { position: cursor });
        self.apply_fill(fill, FetchPurpose::Fill);
        self.maybe_replenish();
    }

    fn switch_source(&mut self, mode: SourceMode) {
        if mode.uses_remote() && !self.router.has_remote() {
            warn!("[core] {} mode needs the remote corpus, which is disabled", mode);
            return;
        }
        let Some(generation) = self.switch.switch_to(mode) else {
            debug!("[core] already in {} mode", mode);
            return;
        };
        // The old fetch, if any, will be discarded when it lands.
        self.in_flight = None;
        self.pending_fill = false;
        let _ = self
            .broadcast_tx
            .send(Broadcast::SourceSwitched { mode, generation });
        self.move_cursor(0);
    }

    // ── fetching ─────────────────────────────────────────────────────────────

    fn apply_fill(&mut self, fill: FillOutcome, purpose: FetchPurpose) {
        for (position, item) in &fill.filled {
            let _ = self.broadcast_tx.send(Broadcast::SlotFilled {
                position: *position,
                item: Item::clone(item),
            });
        }
        if !fill.abandoned.is_empty() {
            debug!(
                "[core] {} slots left empty until the pool has items",
                fill.abandoned.len()
            );
        }
        if fill.needs_fetch() {
            self.request_fetch(purpose);
        }
    }

    fn request_fetch(&mut self, purpose: FetchPurpose) {
        if self.in_flight.is_some() {
            if purpose == FetchPurpose::Fill {
                self.pending_fill = true;
            }
            return;
        }

        let generation = self.switch.generation();
        let mode = self.switch.mode();
        let count = self.switch.session().controller().config().batch_size;
        self.in_flight = Some(generation);

        let router = Arc::clone(&self.router);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = router.fetch_batch(mode, count).await;
            let _ = tx
                .send(FeedEvent::FetchDone {
                    generation,
                    purpose,
                    result,
                })
                .await;
        });
    }

    fn handle_fetch_done(&mut self, purpose: FetchPurpose, result: Result<FetchReport, SourceError>) {
        self.in_flight = None;
        self.check_health();

        let controller = self.switch.session_mut().controller_mut();
        let (fill, succeeded) = match result {
            Ok(report) => {
                let (added, fill) = controller.accept_batch(report.items);
                debug!(
                    "[core] {:?} fetch: {} new items, {} slots filled",
                    purpose,
                    added.added,
                    fill.filled.len()
                );
                (fill, true)
            }
            Err(e) => {
                warn!("[core] fetch failed: {}", e);
                let fill = FillOutcome {
                    abandoned: controller.abandon_loading(),
                    ..FillOutcome::default()
                };
                (fill, false)
            }
        };
        self.apply_fill(fill, FetchPurpose::Fill);

        if std::mem::take(&mut self.pending_fill) {
            let fill = self.switch.session_mut().controller_mut().fill_targets();
            self.apply_fill(fill, FetchPurpose::Fill);
        } else if succeeded {
            // Targets abandoned by an earlier shortfall.
            self.retry_empty_targets();
        }
    }

    fn retry_empty_targets(&mut self) {
        let fill = self
            .switch
            .session_mut()
            .controller_mut()
            .retry_empty_targets();
        if !fill.filled.is_empty() {
            debug!("[core] refilled {} empty targets", fill.filled.len());
        }
        self.apply_fill(fill, FetchPurpose::Fill);
    }

    fn maybe_replenish(&mut self) {
        if self.in_flight.is_none() && self.switch.session().controller().needs_replenish() {
            debug!(
                "[core] pool below floor ({} unconsumed), replenishing",
                self.switch.session().controller().pool().unconsumed_count()
            );
            self.request_fetch(FetchPurpose::Replenish);
        }
    }

    fn check_health(&mut self) {
        let health = self.router.health();
        if health != self.last_health {
            info!("[core] remote health: {:?}", health);
            self.last_health = health.clone();
            let _ = self.broadcast_tx.send(Broadcast::HealthChanged { health });
        }
    }

    // ── snapshot ─────────────────────────────────────────────────────────────

    fn build_snapshot(&self) -> FeedSnapshot {
        let session = self.switch.session();
        let controller = session.controller();
        FeedSnapshot {
            rev: self.rev,
            generation: session.generation(),
            mode: session.mode(),
            health: self.last_health.clone(),
            cursor: controller.cursor(),
            capacity: controller.slots().capacity(),
            pool_size: controller.pool().len(),
            unconsumed: controller.pool().unconsumed_count(),
            filled: controller.slots().filled_count(),
            loading: controller.slots().loading_count(),
            window: controller.window_views(),
        }
    }

    async fn publish(&mut self) {
        self.rev += 1;
        let snapshot = self.build_snapshot();
        *self.snapshot.write().await = snapshot;
        let _ = self
            .broadcast_tx
            .send(Broadcast::StateUpdated { rev: self.rev });
    }
}
