//! Shared types for the verse feed: the item model, the corpus source
//! contract with its local and remote implementations, configuration and the
//! command/broadcast protocol spoken between the feed core and its clients.

pub mod config;
pub mod item;
pub mod local;
pub mod platform;
pub mod protocol;
pub mod remote;
pub mod retry;
pub mod source;

pub use item::{Item, ItemId, SearchField, SearchMatch, SourceKind};
pub use source::{CorpusSource, SourceError};
