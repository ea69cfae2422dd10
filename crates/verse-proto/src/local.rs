//! In-memory local corpus loaded from a TOML poem file.
//!
//! ```toml
//! [[poem]]
//! id = 1
//! title = "Ozymandias"
//! author = "Percy Bysshe Shelley"
//! lines = ["I met a traveller from an antique land,", "..."]
//! ```

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::item::{Item, ItemId, SearchField, SearchMatch, SourceKind};
use crate::source::{CorpusSource, SourceError};

pub struct LocalCorpus {
    /// Ordered by id.
    poems: Vec<Item>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl LocalCorpus {
    pub fn new(poems: Vec<Item>) -> Self {
        Self::with_rng(poems, StdRng::from_entropy())
    }

    /// Build a corpus whose random sampling draws from `rng`.
    pub fn with_rng(mut poems: Vec<Item>, rng: impl RngCore + Send + 'static) -> Self {
        poems.sort_by_key(|p| p.id);
        let mut seen = HashSet::new();
        poems.retain(|p| {
            let fresh = seen.insert(p.id);
            if !fresh {
                warn!("[local] duplicate poem id {} dropped", p.id);
            }
            fresh
        });
        Self {
            poems,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let poems = parse_poems_from_toml_str(&content)?;
        info!("[local] loaded {} poems from {}", poems.len(), path.display());
        Ok(Self::new(poems))
    }

    pub fn len(&self) -> usize {
        self.poems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poems.is_empty()
    }

    fn sample(&self, count: usize) -> Vec<Item> {
        let amount = count.min(self.poems.len());
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rand::seq::index::sample(&mut *rng, self.poems.len(), amount)
            .into_iter()
            .map(|i| self.poems[i].clone())
            .collect()
    }
}

#[async_trait]
impl CorpusSource for LocalCorpus {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn total_count(&self) -> Result<Option<usize>, SourceError> {
        Ok(Some(self.poems.len()))
    }

    async fn get_page(&self, offset: usize, limit: usize) -> Result<Vec<Item>, SourceError> {
        let total = self.poems.len();
        if limit == 0 || offset > total {
            return Err(SourceError::InvalidRange {
                offset,
                limit,
                total,
            });
        }
        let end = offset.saturating_add(limit).min(total);
        Ok(self.poems[offset..end].to_vec())
    }

    async fn fetch_batch(&self, count: usize) -> Result<Vec<Item>, SourceError> {
        Ok(self.sample(count))
    }

    async fn search_by(
        &self,
        field: SearchField,
        query: &str,
        mode: SearchMatch,
        limit: usize,
    ) -> Result<Vec<Item>, SourceError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(SourceError::InvalidQuery("empty query".into()));
        }

        let matches: Box<dyn Fn(&Item) -> bool> = match field {
            SearchField::LineCount => {
                let wanted: usize = needle
                    .parse()
                    .map_err(|_| SourceError::InvalidQuery(format!("not a line count: {}", query)))?;
                Box::new(move |p: &Item| p.line_count() == wanted)
            }
            SearchField::Author => Box::new(move |p: &Item| text_matches(&p.author, &needle, mode)),
            SearchField::Title => Box::new(move |p: &Item| text_matches(&p.title, &needle, mode)),
            SearchField::Body => {
                Box::new(move |p: &Item| p.lines().any(|l| text_matches(l, &needle, mode)))
            }
        };

        Ok(self
            .poems
            .iter()
            .filter(|p| matches(p))
            .take(limit)
            .cloned()
            .collect())
    }
}

fn text_matches(haystack: &str, needle: &str, mode: SearchMatch) -> bool {
    let hay = haystack.trim().to_lowercase();
    match mode {
        SearchMatch::Exact => hay == needle,
        SearchMatch::Partial => hay.contains(needle),
    }
}

// ── TOML poem loader ─────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct TomlPoemFile {
    #[serde(default)]
    poem: Vec<TomlPoem>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlPoem {
    id: u64,
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    lines: Vec<String>,
    /// Alternative to `lines` for poems stored as one block of text.
    #[serde(default)]
    body: Option<String>,
}

pub fn parse_poems_from_toml_str(content: &str) -> anyhow::Result<Vec<Item>> {
    let file: TomlPoemFile = toml::from_str(content)?;
    let poems = file
        .poem
        .into_iter()
        .map(|p| {
            let body = p.body.unwrap_or_else(|| p.lines.join("\n"));
            Item::new(ItemId::Local(p.id), p.title, p.author, body)
        })
        .collect();
    Ok(poems)
}
