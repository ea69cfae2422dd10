//! The verse feed engine: a duplicate-free poem stream over a large virtual
//! slot array, fed from a local and a remote corpus, plus a bounded sliding
//! window for ordered browsing of the local corpus.

pub mod controller;
pub mod core;
pub mod http;
pub mod logging;
pub mod pool;
pub mod router;
pub mod slots;
pub mod switch;
pub mod window;

pub use controller::{FeedError, WindowController};
pub use crate::core::{FeedCore, FeedEvent};
pub use pool::PoemPool;
pub use router::SourceRouter;
pub use window::{BoundedWindow, Direction, WindowError, WindowStart};
