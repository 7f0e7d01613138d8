//! I/O Module
//!
//! Scoped, bounds-checked access windows over a [`BlockFile`].
//!
//! ## Responsibilities
//! - Bind a caller to exactly one window (location + length + writability)
//! - Check every access against the window
//! - Return the handle state to a fixed pool on every exit path
//!
//! ```text
//!   FileStore::access(key)
//!          │
//!          ▼
//!   ┌─────────────┐  acquire   ┌─────────────┐
//!   │   IoProxy   │◄───────────│  ProxyPool  │  (ArrayQueue, 16 slots)
//!   │ window over │            └─────────────┘
//!   │  BlockFile  │───────────────────▲
//!   └─────────────┘   release on Drop │
//! ```
//!
//! [`BlockFile`]: crate::storage::BlockFile

mod pool;
mod proxy;

pub use pool::{ProxyPool, ProxySlot, DEFAULT_POOL_CAPACITY};
pub use proxy::IoProxy;
