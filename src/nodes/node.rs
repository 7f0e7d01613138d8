//! Node handles
//!
//! A handle pairs an entry key with the store it lives in. Values are read
//! from the store on first use and kept for the life of the handle.
//!
//! Two handles are equal when they carry the same key and come from the
//! same store.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::storage::EntryKey;

use super::store::NodeStoreInner;

/// Weak link from a handle back to its store
pub(crate) type StoreRef = Weak<Mutex<NodeStoreInner>>;

/// Run `f` against the store behind `store`
fn with_store<T>(store: &StoreRef, f: impl FnOnce(&mut NodeStoreInner) -> Result<T>) -> Result<T> {
    let store = store.upgrade().ok_or(StoreError::Closed)?;
    let mut inner = store.lock();
    f(&mut inner)
}

/// Kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Iri,
    Blank,
    Anonymous,
    Literal,
}

// =============================================================================
// IRI Nodes
// =============================================================================

/// Node named by an IRI
#[derive(Debug)]
pub struct IriNode {
    key: EntryKey,
    store: StoreRef,
    value: OnceLock<String>,
}

impl IriNode {
    pub(crate) fn new(key: EntryKey, store: StoreRef) -> Self {
        Self {
            key,
            store,
            value: OnceLock::new(),
        }
    }

    /// Key of the interned IRI string
    pub fn key(&self) -> EntryKey {
        self.key
    }

    /// The IRI, read from the store on first call
    pub fn value(&self) -> Result<&str> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let value = with_store(&self.store, |inner| inner.retrieve_string(self.key))?;
        Ok(self.value.get_or_init(|| value))
    }

    pub(crate) fn store(&self) -> &StoreRef {
        &self.store
    }
}

impl PartialEq for IriNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.store, &other.store)
    }
}

impl Eq for IriNode {}

impl Hash for IriNode {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.key.hash(state);
    }
}

// =============================================================================
// Anonymous Nodes
// =============================================================================

/// Node standing for an anonymous individual
#[derive(Debug)]
pub struct AnonNode {
    key: EntryKey,
    store: StoreRef,
    id: OnceLock<String>,
}

impl AnonNode {
    pub(crate) fn new(key: EntryKey, store: StoreRef) -> Self {
        Self {
            key,
            store,
            id: OnceLock::new(),
        }
    }

    pub fn key(&self) -> EntryKey {
        self.key
    }

    /// Identifier of the individual, read from the store on first call
    pub fn id(&self) -> Result<&str> {
        if let Some(id) = self.id.get() {
            return Ok(id);
        }
        let id = with_store(&self.store, |inner| inner.retrieve_string(self.key))?;
        Ok(self.id.get_or_init(|| id))
    }

    pub(crate) fn store(&self) -> &StoreRef {
        &self.store
    }
}

impl PartialEq for AnonNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.store, &other.store)
    }
}

impl Eq for AnonNode {}

impl Hash for AnonNode {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.key.hash(state);
    }
}

// =============================================================================
// Literal Nodes
// =============================================================================

/// Resolved content of a literal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiteralValue {
    pub lexical: String,
    pub datatype: Option<String>,
    pub lang: Option<String>,
}

/// Node holding a literal value
#[derive(Debug)]
pub struct LiteralNode {
    key: EntryKey,
    store: StoreRef,
    value: OnceLock<LiteralValue>,
}

impl LiteralNode {
    pub(crate) fn new(key: EntryKey, store: StoreRef) -> Self {
        Self {
            key,
            store,
            value: OnceLock::new(),
        }
    }

    /// Key of the literal entry
    pub fn key(&self) -> EntryKey {
        self.key
    }

    /// Lexical value, datatype and language tag, read on first call
    pub fn value(&self) -> Result<&LiteralValue> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let value = with_store(&self.store, |inner| inner.retrieve_literal(self.key))?;
        Ok(self.value.get_or_init(|| value))
    }

    pub fn lexical(&self) -> Result<&str> {
        Ok(&self.value()?.lexical)
    }

    pub fn datatype(&self) -> Result<Option<&str>> {
        Ok(self.value()?.datatype.as_deref())
    }

    pub fn lang(&self) -> Result<Option<&str>> {
        Ok(self.value()?.lang.as_deref())
    }

    pub(crate) fn store(&self) -> &StoreRef {
        &self.store
    }
}

impl PartialEq for LiteralNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.store, &other.store)
    }
}

impl Eq for LiteralNode {}

impl Hash for LiteralNode {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.key.hash(state);
    }
}

// =============================================================================
// Blank Nodes
// =============================================================================

/// Blank node, identified by a number from the store's counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlankNode {
    id: u64,
}

impl BlankNode {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:n{}", self.id)
    }
}

// =============================================================================
// Any Node
// =============================================================================

/// Any node a store can hand out
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Iri(Arc<IriNode>),
    Blank(BlankNode),
    Anonymous(Arc<AnonNode>),
    Literal(Arc<LiteralNode>),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Iri(_) => NodeKind::Iri,
            Node::Blank(_) => NodeKind::Blank,
            Node::Anonymous(_) => NodeKind::Anonymous,
            Node::Literal(_) => NodeKind::Literal,
        }
    }

    /// Entry key of the node; blank nodes have none
    pub fn key(&self) -> Option<EntryKey> {
        match self {
            Node::Iri(node) => Some(node.key()),
            Node::Blank(_) => None,
            Node::Anonymous(node) => Some(node.key()),
            Node::Literal(node) => Some(node.key()),
        }
    }

    /// Store owning the node; blank nodes belong to every store
    pub(crate) fn store(&self) -> Option<&StoreRef> {
        match self {
            Node::Iri(node) => Some(node.store()),
            Node::Blank(_) => None,
            Node::Anonymous(node) => Some(node.store()),
            Node::Literal(node) => Some(node.store()),
        }
    }
}

impl From<Arc<IriNode>> for Node {
    fn from(node: Arc<IriNode>) -> Self {
        Node::Iri(node)
    }
}

impl From<BlankNode> for Node {
    fn from(node: BlankNode) -> Self {
        Node::Blank(node)
    }
}

impl From<Arc<AnonNode>> for Node {
    fn from(node: Arc<AnonNode>) -> Self {
        Node::Anonymous(node)
    }
}

impl From<Arc<LiteralNode>> for Node {
    fn from(node: Arc<LiteralNode>) -> Self {
        Node::Literal(node)
    }
}
