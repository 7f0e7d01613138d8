//! Nodes Module
//!
//! Interning of graph node values on top of the storage layer.
//!
//! ## Responsibilities
//! - Deduplicate strings by content (hash bucket + chain walk)
//! - Deduplicate literals by (lexical, datatype, language tag)
//! - Keep reference counts on interned entries
//! - Hand out one live handle per key and kind
//!
//! ```text
//!   get_iri_node("http://a")
//!          │ crc32
//!          ▼
//!   ┌──────────────┐ head ┌────────┐ next ┌────────┐
//!   │ string map   │─────►│ "http…"│─────►│ "xyz"  │──► null
//!   │ (index file) │      └────────┘      └────────┘
//!   └──────────────┘         data files (FileStore)
//! ```

mod cache;
mod node;
mod store;

pub use node::{AnonNode, BlankNode, IriNode, LiteralNode, LiteralValue, Node, NodeKind};
pub use store::{NodeStore, NodeStoreStats, INDEX_MAGIC, INDEX_VERSION, STRING_MAX_INLINE};
