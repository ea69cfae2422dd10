//! Fixed-size sliding window over a corpus of known size, for ordered
//! browsing.
//!
//! The window holds at most [`WINDOW_SIZE`] contiguous items and keeps the
//! reader near its middle. It only refetches when the reader reaches an edge,
//! and then shifts by [`BUFFER`] so one fetch covers ten moves.

use rand::Rng;
use std::sync::Arc;
use tracing::debug;
use verse_proto::{CorpusSource, Item, SourceError};

pub const WINDOW_SIZE: usize = 21;
pub const BUFFER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStart {
    Beginning,
    /// Clamped to the last full window.
    At(usize),
    Random,
}

impl std::str::FromStr for WindowStart {
    type Err = String;

    /// `beginning`, `random`, or a corpus index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginning" | "start" => Ok(Self::Beginning),
            "random" => Ok(Self::Random),
            other => other
                .parse()
                .map(Self::At)
                .map_err(|_| format!("unknown window start: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("corpus is empty")]
    EmptyCorpus,
    #[error("corpus size is unknown; windows need a finite corpus")]
    UnknownTotal,
    #[error(transparent)]
    Source(#[from] SourceError),
}

pub struct BoundedWindow {
    source: Arc<dyn CorpusSource>,
    items: Vec<Item>,
    local_index: usize,
    global_index: usize,
    corpus_total: usize,
    window_start: usize,
}

impl std::fmt::Debug for BoundedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedWindow")
            .field("source", &self.source.kind())
            .field("items", &self.items.len())
            .field("local_index", &self.local_index)
            .field("global_index", &self.global_index)
            .field("corpus_total", &self.corpus_total)
            .field("window_start", &self.window_start)
            .finish()
    }
}

impl BoundedWindow {
    pub async fn create(
        source: Arc<dyn CorpusSource>,
        start: WindowStart,
    ) -> Result<Self, WindowError> {
        let total = known_total(&source).await?;
        let start = resolve_start(start, total, &mut rand::thread_rng());
        Self::open(source, start, total).await
    }

    /// Like [`create`](Self::create), drawing a random start from `rng`.
    pub async fn create_with_rng<R: Rng + ?Sized>(
        source: Arc<dyn CorpusSource>,
        start: WindowStart,
        rng: &mut R,
    ) -> Result<Self, WindowError> {
        let total = known_total(&source).await?;
        let start = resolve_start(start, total, rng);
        Self::open(source, start, total).await
    }

    async fn open(
        source: Arc<dyn CorpusSource>,
        start: usize,
        total: usize,
    ) -> Result<Self, WindowError> {
        let items = source.get_page(start, WINDOW_SIZE).await?;
        if items.is_empty() {
            return Err(WindowError::EmptyCorpus);
        }
        let local_index = BUFFER.min(items.len() - 1);
        debug!(
            "[window] opened at {} ({} items of {})",
            start,
            items.len(),
            total
        );
        Ok(Self {
            source,
            items,
            local_index,
            global_index: start + local_index,
            corpus_total: total,
            window_start: start,
        })
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn current(&self) -> Option<&Item> {
        self.items.get(self.local_index)
    }

    pub fn local_index(&self) -> usize {
        self.local_index
    }

    pub fn global_index(&self) -> usize {
        self.global_index
    }

    pub fn corpus_total(&self) -> usize {
        self.corpus_total
    }

    pub fn window_start(&self) -> usize {
        self.window_start
    }

    fn max_start(&self) -> usize {
        self.corpus_total.saturating_sub(WINDOW_SIZE)
    }

    /// Move one item. Returns whether the window was refetched. At either
    /// end of the corpus the move is a no-op.
    pub async fn slide(&mut self, direction: Direction) -> Result<bool, WindowError> {
        let last = self.corpus_total.saturating_sub(1);
        let global = match direction {
            Direction::Next => (self.global_index + 1).min(last),
            Direction::Prev => self.global_index.saturating_sub(1),
        };
        if global == self.global_index {
            return Ok(false);
        }

        let shift = match direction {
            Direction::Next => {
                let at_edge = global - self.window_start >= WINDOW_SIZE - 1;
                (at_edge && self.window_start < self.max_start())
                    .then(|| (self.window_start + BUFFER).min(self.max_start()))
            }
            Direction::Prev => {
                let at_edge = global <= self.window_start;
                (at_edge && self.window_start > 0).then(|| self.window_start.saturating_sub(BUFFER))
            }
        };

        match shift {
            Some(start) => {
                self.reload(start, global).await?;
                Ok(true)
            }
            None => {
                self.global_index = global;
                self.local_index = global - self.window_start;
                Ok(false)
            }
        }
    }

    /// Re-centre the window on `global`, clamped to the corpus.
    pub async fn jump_to(&mut self, global: usize) -> Result<(), WindowError> {
        let global = global.min(self.corpus_total.saturating_sub(1));
        let start = global.saturating_sub(BUFFER).min(self.max_start());
        self.reload(start, global).await
    }

    /// Fetch the page at `start` and only then move onto it, so a failed
    /// fetch leaves the window as it was.
    async fn reload(&mut self, start: usize, global: usize) -> Result<(), WindowError> {
        let items = self.source.get_page(start, WINDOW_SIZE).await?;
        if items.is_empty() {
            return Err(WindowError::EmptyCorpus);
        }
        debug!("[window] shifted {} -> {}", self.window_start, start);
        let local_index = (global - start).min(items.len() - 1);
        self.items = items;
        self.window_start = start;
        self.local_index = local_index;
        self.global_index = start + local_index;
        Ok(())
    }
}

async fn known_total(source: &Arc<dyn CorpusSource>) -> Result<usize, WindowError> {
    let total = source
        .total_count()
        .await?
        .ok_or(WindowError::UnknownTotal)?;
    if total == 0 {
        return Err(WindowError::EmptyCorpus);
    }
    Ok(total)
}

fn resolve_start<R: Rng + ?Sized>(start: WindowStart, total: usize, rng: &mut R) -> usize {
    let max_start = total.saturating_sub(WINDOW_SIZE);
    match start {
        WindowStart::Beginning => 0,
        WindowStart::At(s) => s.min(max_start),
        WindowStart::Random => rng.gen_range(0..=max_start),
    }
}
