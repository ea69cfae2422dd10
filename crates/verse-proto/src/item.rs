use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which corpus an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Remote,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pool-unique identifier of an item.
///
/// Local ids are the stable integer keys of the local store. Remote ids are
/// minted from a monotonic counter as poems arrive; the two variants never
/// compare equal, so the id-spaces are disjoint by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "origin", content = "n", rename_all = "lowercase")]
pub enum ItemId {
    Local(u64),
    Remote(u64),
}

impl ItemId {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Local(_) => SourceKind::Local,
            Self::Remote(_) => SourceKind::Remote,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(n) => write!(f, "local:{}", n),
            Self::Remote(n) => write!(f, "remote:{}", n),
        }
    }
}

/// One poem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub author: String,
    /// Newline-separated lines of the poem.
    pub body: String,
}

impl Item {
    pub fn new(
        id: ItemId,
        title: impl Into<String>,
        author: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            author: author.into(),
            body: body.into(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.body.lines()
    }

    pub fn line_count(&self) -> usize {
        self.body.lines().count()
    }

    /// Content key used to spot the same poem arriving under different ids
    /// (e.g. once from each corpus in hybrid mode). The opening line keeps
    /// apart poems that share a stock title such as "Sonnet".
    pub fn fingerprint(&self) -> String {
        let opening = self.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        format!(
            "{}\u{1f}{}\u{1f}{}",
            normalize(&self.title),
            normalize(&self.author),
            normalize(opening)
        )
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Field a discovery search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchField {
    Author,
    Title,
    Body,
    LineCount,
}

impl SearchField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Title => "title",
            Self::Body => "body",
            Self::LineCount => "line-count",
        }
    }
}

impl FromStr for SearchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "author" => Ok(Self::Author),
            "title" => Ok(Self::Title),
            "body" | "lines" => Ok(Self::Body),
            "line-count" | "linecount" | "lines-count" => Ok(Self::LineCount),
            other => Err(format!("unknown search field: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMatch {
    Exact,
    #[default]
    Partial,
}
