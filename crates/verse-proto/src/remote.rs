//! Client for a PoetryDB-compatible poem service.
//!
//! Endpoints used:
//!   GET {base}/random/{n}              n random poems
//!   GET {base}/{field}/{query}[:abs]   search (`:abs` = exact match)
//!
//! Successful responses are a JSON array of `{title, author, lines, linecount}`.
//! Misses come back as `{"status": 404, "reason": "Not found"}`, usually with
//! an HTTP 200.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RemoteConfig;
use crate::item::{Item, ItemId, SearchField, SearchMatch, SourceKind};
use crate::retry::RetryConfig;
use crate::source::{CorpusSource, SourceError};

#[derive(Debug, Deserialize)]
struct RemotePoem {
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PoetryResponse {
    Poems(Vec<RemotePoem>),
    Status {
        status: serde_json::Value,
        #[serde(default)]
        reason: String,
    },
}

pub struct RemoteCorpus {
    client: Client,
    base_url: Url,
    retry: RetryConfig,
    /// Next remote id. Ids are never reused for the lifetime of the corpus.
    next_id: AtomicU64,
}

impl RemoteCorpus {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("verse-stream/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build reqwest client")?;
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid remote base URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("remote base URL cannot carry a path: {}", config.base_url);
        }
        info!("[remote] using {}", base_url);
        Ok(Self {
            client,
            base_url,
            retry: config.retry(),
            next_id: AtomicU64::new(1),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    async fn get_poems(&self, url: Url) -> Result<Vec<RemotePoem>, SourceError> {
        let label = url.path().to_string();
        self.retry
            .run(&label, || {
                let url = url.clone();
                async move {
                    debug!("[remote] GET {}", url);
                    let response = self
                        .client
                        .get(url)
                        .header("Accept", "application/json")
                        .send()
                        .await?
                        .error_for_status()?;
                    let body: PoetryResponse = response.json().await?;
                    match body {
                        PoetryResponse::Poems(poems) => Ok(poems),
                        PoetryResponse::Status { status, reason } => {
                            let status = status
                                .as_u64()
                                .or_else(|| status.as_str().and_then(|s| s.parse().ok()))
                                .unwrap_or(500) as u16;
                            if status == 404 {
                                Ok(Vec::new())
                            } else {
                                Err(SourceError::Service { status, reason })
                            }
                        }
                    }
                }
            })
            .await
    }

    fn mint(&self, poem: RemotePoem) -> Item {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Item::new(ItemId::Remote(n), poem.title, poem.author, poem.lines.join("\n"))
    }
}

#[async_trait]
impl CorpusSource for RemoteCorpus {
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
        if count == 0 {
            return Ok(Vec::new());
        }
        let url = self.endpoint(&["random", &count.to_string()]);
        let poems = self.get_poems(url).await?;
        if poems.is_empty() {
            return Err(SourceError::Service {
                status: 404,
                reason: "random endpoint returned no poems".into(),
            });
        }
        Ok(poems.into_iter().map(|p| self.mint(p)).collect())
    }

    async fn search_by(
        &self,
        field: SearchField,
        query: &str,
        mode: SearchMatch,
        limit: usize,
    ) -> Result<Vec<Item>, SourceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SourceError::InvalidQuery("empty query".into()));
        }
        let url = match field {
            SearchField::LineCount => {
                let n: usize = query
                    .parse()
                    .map_err(|_| SourceError::InvalidQuery(format!("not a line count: {}", query)))?;
                self.endpoint(&["linecount", &n.to_string()])
            }
            _ => {
                let segment = match mode {
                    SearchMatch::Exact => format!("{}:abs", query),
                    SearchMatch::Partial => query.to_string(),
                };
                self.endpoint(&[remote_field(field), &segment])
            }
        };
        let poems = self.get_poems(url).await?;
        Ok(poems.into_iter().take(limit).map(|p| self.mint(p)).collect())
    }
}

fn remote_field(field: SearchField) -> &'static str {
    match field {
        SearchField::Author => "author",
        SearchField::Title => "title",
        SearchField::Body => "lines",
        SearchField::LineCount => "linecount",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(base: &str) -> RemoteCorpus {
        RemoteCorpus::new(&RemoteConfig {
            base_url: base.to_string(),
            ..RemoteConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let c = corpus("https://poetrydb.org");
        assert_eq!(
            c.endpoint(&["random", "20"]).as_str(),
            "https://poetrydb.org/random/20"
        );
        let c = corpus("https://example.com/api/");
        assert_eq!(
            c.endpoint(&["title", "Ode to a Nightingale:abs"]).as_str(),
            "https://example.com/api/title/Ode%20to%20a%20Nightingale:abs"
        );
    }

    #[test]
    fn test_decode_poems_and_status() {
        let poems: PoetryResponse = serde_json::from_str(
            r#"[{"title":"Ozymandias","author":"Percy Bysshe Shelley","lines":["I met a traveller"],"linecount":"14"}]"#,
        )
        .unwrap();
        assert!(matches!(poems, PoetryResponse::Poems(ref p) if p.len() == 1));

        let miss: PoetryResponse =
            serde_json::from_str(r#"{"status":404,"reason":"Not found"}"#).unwrap();
        assert!(matches!(miss, PoetryResponse::Status { ref reason, .. } if reason == "Not found"));
    }

    #[test]
    fn test_minted_ids_are_monotonic() {
        let c = corpus("https://poetrydb.org");
        let a = c.mint(RemotePoem {
            title: "a".into(),
            author: String::new(),
            lines: vec![],
        });
        let b = c.mint(RemotePoem {
            title: "a".into(),
            author: String::new(),
            lines: vec![],
        });
        assert_eq!(a.id, ItemId::Remote(1));
        assert_eq!(b.id, ItemId::Remote(2));
    }

    #[test]
    fn test_rejects_non_base_url() {
        let bad = RemoteCorpus::new(&RemoteConfig {
            base_url: "mailto:poems@example.com".into(),
            ..RemoteConfig::default()
        });
        assert!(bad.is_err());
    }
}
