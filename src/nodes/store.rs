//! Node Store
//!
//! Interns strings and literals into a [`FileStore`] and hands out node
//! handles for them.
//!
//! ## Files
//! - `{name}_data000..`: string and literal entries
//! - `{name}_index`: blank counter and the two bucket maps
//!
//! ## Entries
//! ```text
//! String:       Next (8) | RefCount (8) | Length (4) | Bytes
//! Long string:  Next (8) | RefCount (8) | Length (4) | Continuation (8) | Bytes
//! Continuation: Next (8) | ChunkLength (4) | Bytes
//! Literal:      Next (8) | RefCount (8) | Lexical (8) | Datatype (8) | Lang (8)
//! ```
//!
//! Strings sharing a content hash are chained through `Next`, starting at
//! the head found in the string map. Literals sharing a lexical value are
//! chained the same way from the literal map. Reference counts are
//! maintained but entries are never reclaimed.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index::DiskHashMap;
use crate::storage::{
    BlockFile, EntryKey, FileStats, FileStore, NoHooks, PageFailure, KEY_NULL, MAX_ENTRY_SIZE,
};

use super::cache::NodeCache;
use super::node::{AnonNode, BlankNode, IriNode, LiteralNode, LiteralValue, Node};

/// Magic number of the index file
pub const INDEX_MAGIC: u32 = 0x0000_FF01;

/// Layout version of the index file
pub const INDEX_VERSION: u32 = 1;

const INDEX_OFFSET_MAGIC: u64 = 0;
const INDEX_OFFSET_VERSION: u64 = 4;
const INDEX_OFFSET_NEXT_BLANK: u64 = 8;
const INDEX_OFFSET_STRINGS: u64 = 16;
const INDEX_OFFSET_LITERALS: u64 = 24;

const ENTRY_OFFSET_NEXT: u64 = 0;
const ENTRY_OFFSET_REFCOUNT: u64 = 8;
const STRING_OFFSET_LENGTH: u64 = 16;
const LITERAL_OFFSET_LEXICAL: u64 = 16;

/// Fixed part of a string entry
const STRING_OVERHEAD: usize = 8 + 8 + 4;

/// Longest string held in a single entry
pub const STRING_MAX_INLINE: usize = MAX_ENTRY_SIZE - STRING_OVERHEAD;

/// Bytes of a long string held by its head entry
const STRING_HEAD_CHUNK: usize = STRING_MAX_INLINE - 8;

/// Fixed part of a continuation entry
const CHUNK_OVERHEAD: usize = 8 + 4;

/// Largest chunk in a continuation entry
const STRING_MAX_CHUNK: usize = MAX_ENTRY_SIZE - CHUNK_OVERHEAD;

const LITERAL_ENTRY_SIZE: usize = 8 + 8 + 8 + 8 + 8;

/// Summary of a node store
#[derive(Debug, Clone)]
pub struct NodeStoreStats {
    pub files: Vec<FileStats>,
    /// Records in the string bucket map
    pub string_buckets: u32,
    /// Records in the literal bucket map
    pub literal_buckets: u32,
    /// Next blank node id
    pub next_blank: u64,
    /// Live cached handles over every kind
    pub cached_nodes: usize,
}

// =============================================================================
// Backing Files
// =============================================================================

/// Open files of a store
struct Backend {
    config: Config,
    data: FileStore,
    index: BlockFile<NoHooks>,
    strings: DiskHashMap<u32, u64>,
    literals: DiskHashMap<u64, u64>,
    next_blank: u64,
}

type IndexState = (DiskHashMap<u32, u64>, DiskHashMap<u64, u64>, u64);

impl Backend {
    fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let directory = &config.data_dir;
        let data = FileStore::open(directory, &format!("{}_data", config.store_name), config)?;

        let index_path = directory.join(format!("{}_index", config.store_name));
        if config.read_only && !index_path.is_file() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no index file {} found", index_path.display()),
            )));
        }
        let mut index = BlockFile::open(
            &index_path,
            config.read_only,
            config.block_cache_capacity,
            config.proxy_pool_capacity,
            NoHooks,
        )?;

        let (strings, literals, next_blank) = if index.size() == 0 {
            if index.is_read_only() {
                return Err(StoreError::Corrupted(format!(
                    "{} is empty and cannot be initialized read-only",
                    index_path.display()
                )));
            }
            Self::initialize_index(&mut index, config)?
        } else {
            Self::load_index(&mut index)?
        };

        Ok(Self {
            config: config.clone(),
            data,
            index,
            strings,
            literals,
            next_blank,
        })
    }

    fn initialize_index(index: &mut BlockFile<NoHooks>, config: &Config) -> Result<IndexState> {
        index.write_u32(INDEX_OFFSET_MAGIC, INDEX_MAGIC)?;
        index.write_u32(INDEX_OFFSET_VERSION, INDEX_VERSION)?;
        index.write_u64(INDEX_OFFSET_NEXT_BLANK, 0)?;
        let strings = DiskHashMap::create(index, config.hash_table_size, config.hash_load_factor)?;
        let literals = DiskHashMap::create(index, config.hash_table_size, config.hash_load_factor)?;
        index.write_u64(INDEX_OFFSET_STRINGS, strings.location())?;
        index.write_u64(INDEX_OFFSET_LITERALS, literals.location())?;
        Ok((strings, literals, 0))
    }

    fn load_index(index: &mut BlockFile<NoHooks>) -> Result<IndexState> {
        let magic = index.read_u32(INDEX_OFFSET_MAGIC)?;
        if magic != INDEX_MAGIC {
            return Err(StoreError::BadMagic {
                found: magic,
                expected: INDEX_MAGIC,
            });
        }
        let version = index.read_u32(INDEX_OFFSET_VERSION)?;
        if version != INDEX_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: version,
                expected: INDEX_VERSION,
            });
        }
        let next_blank = index.read_u64(INDEX_OFFSET_NEXT_BLANK)?;
        let strings_location = index.read_u64(INDEX_OFFSET_STRINGS)?;
        let literals_location = index.read_u64(INDEX_OFFSET_LITERALS)?;
        let strings = DiskHashMap::open(index, strings_location)?;
        let literals = DiskHashMap::open(index, literals_location)?;
        Ok((strings, literals, next_blank))
    }

    fn reload_index(&mut self) -> Result<()> {
        let (strings, literals, next_blank) = if self.index.disk_size() == 0 {
            Self::initialize_index(&mut self.index, &self.config)?
        } else {
            Self::load_index(&mut self.index)?
        };
        self.strings = strings;
        self.literals = literals;
        self.next_blank = next_blank;
        Ok(())
    }

    fn take_blank_id(&mut self) -> Result<u64> {
        let id = self.next_blank;
        self.index.write_u64(INDEX_OFFSET_NEXT_BLANK, id + 1)?;
        self.next_blank = id + 1;
        Ok(id)
    }

    // =========================================================================
    // Strings
    // =========================================================================

    fn next_in_chain(&mut self, key: EntryKey) -> Result<Option<EntryKey>> {
        let mut entry = self.data.read(key)?;
        entry.seek(ENTRY_OFFSET_NEXT)?;
        EntryKey::from_stored(entry.read_u64()?)
    }

    fn link_after(&mut self, tail: EntryKey, key: EntryKey) -> Result<()> {
        let mut entry = self.data.access(tail)?;
        entry.seek(ENTRY_OFFSET_NEXT)?;
        entry.write_u64(key.raw())
    }

    fn string_length(&mut self, key: EntryKey) -> Result<usize> {
        let mut entry = self.data.read(key)?;
        entry.seek(STRING_OFFSET_LENGTH)?;
        Ok(entry.read_u32()? as usize)
    }

    fn string_bytes(&mut self, key: EntryKey) -> Result<Vec<u8>> {
        let (length, mut next, mut bytes) = {
            let mut entry = self.data.read(key)?;
            entry.seek(STRING_OFFSET_LENGTH)?;
            let length = entry.read_u32()? as usize;
            if length <= STRING_MAX_INLINE {
                return entry.read_bytes(length);
            }
            let next = EntryKey::from_stored(entry.read_u64()?)?;
            let mut bytes = Vec::with_capacity(length);
            bytes.extend_from_slice(&entry.read_bytes(STRING_HEAD_CHUNK)?);
            (length, next, bytes)
        };
        while let Some(key) = next {
            let mut entry = self.data.read(key)?;
            next = EntryKey::from_stored(entry.read_u64()?)?;
            let chunk = entry.read_u32()? as usize;
            bytes.extend_from_slice(&entry.read_bytes(chunk)?);
        }
        if bytes.len() != length {
            return Err(StoreError::Corrupted(format!(
                "string {} holds {} bytes, expected {}",
                key,
                bytes.len(),
                length
            )));
        }
        Ok(bytes)
    }

    fn retrieve_string(&mut self, key: EntryKey) -> Result<String> {
        let bytes = self.string_bytes(key)?;
        String::from_utf8(bytes)
            .map_err(|e| StoreError::Corrupted(format!("string {} is not UTF-8: {}", key, e)))
    }

    fn allocate_string(&mut self, bytes: &[u8]) -> Result<EntryKey> {
        if bytes.len() <= STRING_MAX_INLINE {
            let key = self.data.add(bytes.len() + STRING_OVERHEAD)?;
            let mut entry = self.data.access(key)?;
            entry.write_u64(KEY_NULL)?;
            entry.write_i64(0)?;
            entry.write_u32(bytes.len() as u32)?;
            entry.write_bytes(bytes)?;
            return Ok(key);
        }

        // continuations first, from the last one, so each knows its successor
        let (head, rest) = bytes.split_at(STRING_HEAD_CHUNK);
        let mut next = None;
        for chunk in rest.chunks(STRING_MAX_CHUNK).rev() {
            let key = self.data.add(chunk.len() + CHUNK_OVERHEAD)?;
            let mut entry = self.data.access(key)?;
            entry.write_u64(EntryKey::to_stored(next))?;
            entry.write_u32(chunk.len() as u32)?;
            entry.write_bytes(chunk)?;
            next = Some(key);
        }
        let key = self.data.add(MAX_ENTRY_SIZE)?;
        let mut entry = self.data.access(key)?;
        entry.write_u64(KEY_NULL)?;
        entry.write_i64(0)?;
        entry.write_u32(bytes.len() as u32)?;
        entry.write_u64(EntryKey::to_stored(next))?;
        entry.write_bytes(head)?;
        Ok(key)
    }

    fn string_bucket(&mut self, hash: u32) -> Result<Option<EntryKey>> {
        match self.strings.get(&mut self.index, &hash)? {
            Some(raw) => EntryKey::new(raw).map(Some),
            None => Ok(None),
        }
    }

    fn get_key_for_string(&mut self, value: &str, insert: bool) -> Result<Option<EntryKey>> {
        let bytes = value.as_bytes();
        let hash = crc32fast::hash(bytes);

        let Some(mut current) = self.string_bucket(hash)? else {
            if !insert {
                return Ok(None);
            }
            let key = self.allocate_string(bytes)?;
            self.strings.try_put(&mut self.index, &hash, &key.raw())?;
            return Ok(Some(key));
        };

        loop {
            if self.string_length(current)? == bytes.len() && self.string_bytes(current)? == bytes {
                return Ok(Some(current));
            }
            match self.next_in_chain(current)? {
                Some(next) => current = next,
                None => break,
            }
        }
        if !insert {
            return Ok(None);
        }
        let key = self.allocate_string(bytes)?;
        self.link_after(current, key)?;
        Ok(Some(key))
    }

    fn bucket_len(&mut self, value: &str) -> Result<usize> {
        let hash = crc32fast::hash(value.as_bytes());
        let mut current = self.string_bucket(hash)?;
        let mut length = 0;
        while let Some(key) = current {
            length += 1;
            current = self.next_in_chain(key)?;
        }
        Ok(length)
    }

    // =========================================================================
    // Literals
    // =========================================================================

    fn allocate_literal(
        &mut self,
        lexical: EntryKey,
        datatype: Option<EntryKey>,
        lang: Option<EntryKey>,
    ) -> Result<EntryKey> {
        let key = self.data.add(LITERAL_ENTRY_SIZE)?;
        let mut entry = self.data.access(key)?;
        entry.write_u64(KEY_NULL)?;
        entry.write_i64(0)?;
        entry.write_u64(lexical.raw())?;
        entry.write_u64(EntryKey::to_stored(datatype))?;
        entry.write_u64(EntryKey::to_stored(lang))?;
        Ok(key)
    }

    /// Stored (lexical, datatype, lang) keys of a literal entry
    fn literal_parts(&mut self, key: EntryKey) -> Result<(u64, u64, u64)> {
        let mut entry = self.data.read(key)?;
        entry.seek(LITERAL_OFFSET_LEXICAL)?;
        Ok((entry.read_u64()?, entry.read_u64()?, entry.read_u64()?))
    }

    /// Key of an optional sub-string; the outer `None` means "not found"
    fn optional_string_key(
        &mut self,
        value: Option<&str>,
        insert: bool,
    ) -> Result<Option<Option<EntryKey>>> {
        match value {
            None => Ok(Some(None)),
            Some(value) => Ok(self.get_key_for_string(value, insert)?.map(Some)),
        }
    }

    fn get_key_for_literal(
        &mut self,
        lexical: Option<&str>,
        datatype: Option<&str>,
        lang: Option<&str>,
        insert: bool,
    ) -> Result<Option<EntryKey>> {
        let Some(lexical_key) = self.get_key_for_string(lexical.unwrap_or(""), insert)? else {
            return Ok(None);
        };
        let Some(datatype_key) = self.optional_string_key(datatype, insert)? else {
            return Ok(None);
        };
        let Some(lang_key) = self.optional_string_key(lang, insert)? else {
            return Ok(None);
        };
        let stored_datatype = EntryKey::to_stored(datatype_key);
        let stored_lang = EntryKey::to_stored(lang_key);

        let head = match self.literals.get(&mut self.index, &lexical_key.raw())? {
            Some(raw) => EntryKey::new(raw)?,
            None => {
                if !insert {
                    return Ok(None);
                }
                let key = self.allocate_literal(lexical_key, datatype_key, lang_key)?;
                self.literals
                    .try_put(&mut self.index, &lexical_key.raw(), &key.raw())?;
                return Ok(Some(key));
            }
        };

        let mut current = head;
        loop {
            let (_, found_datatype, found_lang) = self.literal_parts(current)?;
            if found_datatype == stored_datatype && found_lang == stored_lang {
                return Ok(Some(current));
            }
            match self.next_in_chain(current)? {
                Some(next) => current = next,
                None => break,
            }
        }
        if !insert {
            return Ok(None);
        }
        let key = self.allocate_literal(lexical_key, datatype_key, lang_key)?;
        self.link_after(current, key)?;
        Ok(Some(key))
    }

    fn retrieve_literal(&mut self, key: EntryKey) -> Result<LiteralValue> {
        let (lexical, datatype, lang) = self.literal_parts(key)?;
        let lexical = match EntryKey::from_stored(lexical)? {
            Some(key) => self.retrieve_string(key)?,
            None => String::new(),
        };
        let datatype = match EntryKey::from_stored(datatype)? {
            Some(key) => Some(self.retrieve_string(key)?),
            None => None,
        };
        let lang = match EntryKey::from_stored(lang)? {
            Some(key) => Some(self.retrieve_string(key)?),
            None => None,
        };
        Ok(LiteralValue {
            lexical,
            datatype,
            lang,
        })
    }

    // =========================================================================
    // Reference Counts
    // =========================================================================

    fn ref_count(&mut self, key: EntryKey) -> Result<i64> {
        let mut entry = self.data.read(key)?;
        entry.seek(ENTRY_OFFSET_REFCOUNT)?;
        entry.read_i64()
    }

    fn add_ref_count(&mut self, key: EntryKey, delta: i64) -> Result<i64> {
        let mut entry = self.data.access(key)?;
        entry.seek(ENTRY_OFFSET_REFCOUNT)?;
        let count = entry.read_i64()? + delta;
        entry.seek(ENTRY_OFFSET_REFCOUNT)?;
        entry.write_i64(count)?;
        Ok(count)
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// State behind the lock of a [`NodeStore`]
pub(crate) struct NodeStoreInner {
    /// Link handed to new node handles
    this: Weak<Mutex<NodeStoreInner>>,
    /// `None` once closed
    backend: Option<Backend>,
    iris: NodeCache<IriNode>,
    anons: NodeCache<AnonNode>,
    literals: NodeCache<LiteralNode>,
}

impl NodeStoreInner {
    fn backend(&mut self) -> Result<&mut Backend> {
        self.backend.as_mut().ok_or(StoreError::Closed)
    }

    pub(crate) fn retrieve_string(&mut self, key: EntryKey) -> Result<String> {
        self.backend()?.retrieve_string(key)
    }

    pub(crate) fn retrieve_literal(&mut self, key: EntryKey) -> Result<LiteralValue> {
        self.backend()?.retrieve_literal(key)
    }

    fn iri_node_for(&mut self, key: EntryKey) -> Arc<IriNode> {
        if let Some(node) = self.iris.get(key.raw()) {
            return node;
        }
        let node = Arc::new(IriNode::new(key, self.this.clone()));
        self.iris.insert(key.raw(), &node);
        node
    }

    fn anon_node_for(&mut self, key: EntryKey) -> Arc<AnonNode> {
        if let Some(node) = self.anons.get(key.raw()) {
            return node;
        }
        let node = Arc::new(AnonNode::new(key, self.this.clone()));
        self.anons.insert(key.raw(), &node);
        node
    }

    fn literal_node_for(&mut self, key: EntryKey) -> Arc<LiteralNode> {
        if let Some(node) = self.literals.get(key.raw()) {
            return node;
        }
        let node = Arc::new(LiteralNode::new(key, self.this.clone()));
        self.literals.insert(key.raw(), &node);
        node
    }

    fn clear_caches(&mut self) {
        self.iris.clear();
        self.anons.clear();
        self.literals.clear();
    }
}

/// Owned values of a node, for re-resolving it in another store
enum NodeValue {
    Iri(String),
    Blank(u64),
    Anonymous(String),
    Literal(LiteralValue),
}

// =============================================================================
// Public Handle
// =============================================================================

/// Interning store for graph nodes
///
/// Cloning gives another handle to the same store. Every operation takes
/// the store lock, including the lazy value resolution of node handles.
///
/// ## Example
/// ```no_run
/// use pagestore::{Config, NodeStore};
///
/// let config = Config::builder().data_dir("/tmp/nodes").build();
/// let store = NodeStore::open(&config)?;
/// let node = store.get_iri_node("http://example.org/a")?;
/// assert_eq!(node.value()?, "http://example.org/a");
/// store.commit()?;
/// # Ok::<(), pagestore::StoreError>(())
/// ```
#[derive(Clone)]
pub struct NodeStore {
    inner: Arc<Mutex<NodeStoreInner>>,
}

impl NodeStore {
    /// Open or create the store described by `config`
    pub fn open(config: &Config) -> Result<Self> {
        let backend = Backend::open(config)?;
        let inner = Arc::new_cyclic(|this| {
            Mutex::new(NodeStoreInner {
                this: this.clone(),
                backend: Some(backend),
                iris: NodeCache::new(),
                anons: NodeCache::new(),
                literals: NodeCache::new(),
            })
        });
        tracing::info!(
            directory = %config.data_dir.display(),
            name = %config.store_name,
            read_only = config.read_only,
            "opened node store"
        );
        Ok(Self { inner })
    }

    pub fn is_read_only(&self) -> Result<bool> {
        Ok(self.inner.lock().backend()?.config.read_only)
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Node for an IRI, interning it if needed
    pub fn get_iri_node(&self, iri: &str) -> Result<Arc<IriNode>> {
        let mut inner = self.inner.lock();
        let key = inner
            .backend()?
            .get_key_for_string(iri, true)?
            .ok_or_else(|| StoreError::Corrupted(format!("failed to intern {}", iri)))?;
        Ok(inner.iri_node_for(key))
    }

    /// Node for an IRI already in the store
    pub fn get_existing_iri_node(&self, iri: &str) -> Result<Option<Arc<IriNode>>> {
        let mut inner = self.inner.lock();
        let key = inner.backend()?.get_key_for_string(iri, false)?;
        Ok(key.map(|key| inner.iri_node_for(key)))
    }

    /// A fresh blank node
    pub fn get_blank_node(&self) -> Result<BlankNode> {
        let mut inner = self.inner.lock();
        let id = inner.backend()?.take_blank_id()?;
        Ok(BlankNode::new(id))
    }

    /// Node for a literal, interning it if needed
    ///
    /// A missing lexical value is stored as the empty string.
    pub fn get_literal_node(
        &self,
        lexical: Option<&str>,
        datatype: Option<&str>,
        lang: Option<&str>,
    ) -> Result<Arc<LiteralNode>> {
        let mut inner = self.inner.lock();
        let key = inner
            .backend()?
            .get_key_for_literal(lexical, datatype, lang, true)?
            .ok_or_else(|| StoreError::Corrupted("failed to intern literal".to_string()))?;
        Ok(inner.literal_node_for(key))
    }

    /// Node for a literal already in the store
    pub fn get_existing_literal_node(
        &self,
        lexical: Option<&str>,
        datatype: Option<&str>,
        lang: Option<&str>,
    ) -> Result<Option<Arc<LiteralNode>>> {
        let mut inner = self.inner.lock();
        let key = inner
            .backend()?
            .get_key_for_literal(lexical, datatype, lang, false)?;
        Ok(key.map(|key| inner.literal_node_for(key)))
    }

    /// Node for an anonymous individual, interning its id if needed
    pub fn get_anon_node(&self, id: &str) -> Result<Arc<AnonNode>> {
        let mut inner = self.inner.lock();
        let key = inner
            .backend()?
            .get_key_for_string(id, true)?
            .ok_or_else(|| StoreError::Corrupted(format!("failed to intern {}", id)))?;
        Ok(inner.anon_node_for(key))
    }

    /// Node for an anonymous individual already in the store
    pub fn get_existing_anon_node(&self, id: &str) -> Result<Option<Arc<AnonNode>>> {
        let mut inner = self.inner.lock();
        let key = inner.backend()?.get_key_for_string(id, false)?;
        Ok(key.map(|key| inner.anon_node_for(key)))
    }

    /// Handle for an IRI node from its key
    pub fn iri_node_for(&self, key: EntryKey) -> Arc<IriNode> {
        self.inner.lock().iri_node_for(key)
    }

    /// Handle for an anonymous node from its key
    pub fn anon_node_for(&self, key: EntryKey) -> Arc<AnonNode> {
        self.inner.lock().anon_node_for(key)
    }

    /// Handle for a literal node from its key
    pub fn literal_node_for(&self, key: EntryKey) -> Arc<LiteralNode> {
        self.inner.lock().literal_node_for(key)
    }

    /// Blank node for an id
    pub fn blank_node_for(&self, id: u64) -> BlankNode {
        BlankNode::new(id)
    }

    /// Same node expressed in this store
    ///
    /// Nodes of this store are returned as is. Others are looked up by
    /// value, and interned when `create` is set; `None` when absent.
    pub fn get_persistent(&self, node: &Node, create: bool) -> Result<Option<Node>> {
        let this = Arc::downgrade(&self.inner);
        match node.store() {
            None => return Ok(Some(node.clone())),
            Some(store) if Weak::ptr_eq(store, &this) => return Ok(Some(node.clone())),
            Some(_) => {}
        }

        // resolve the value before taking our own lock
        let value = match node {
            Node::Iri(node) => NodeValue::Iri(node.value()?.to_string()),
            Node::Blank(node) => NodeValue::Blank(node.id()),
            Node::Anonymous(node) => NodeValue::Anonymous(node.id()?.to_string()),
            Node::Literal(node) => NodeValue::Literal(node.value()?.clone()),
        };

        Ok(match value {
            NodeValue::Iri(iri) if create => Some(self.get_iri_node(&iri)?.into()),
            NodeValue::Iri(iri) => self.get_existing_iri_node(&iri)?.map(Node::from),
            NodeValue::Blank(id) => Some(self.blank_node_for(id).into()),
            NodeValue::Anonymous(id) if create => Some(self.get_anon_node(&id)?.into()),
            NodeValue::Anonymous(id) => self.get_existing_anon_node(&id)?.map(Node::from),
            NodeValue::Literal(literal) => {
                let lexical = Some(literal.lexical.as_str());
                let datatype = literal.datatype.as_deref();
                let lang = literal.lang.as_deref();
                if create {
                    Some(self.get_literal_node(lexical, datatype, lang)?.into())
                } else {
                    self.get_existing_literal_node(lexical, datatype, lang)?
                        .map(Node::from)
                }
            }
        })
    }

    // =========================================================================
    // Keys & Values
    // =========================================================================

    /// Key of an interned string; `insert` adds it when absent
    pub fn get_key_for_string(&self, value: &str, insert: bool) -> Result<Option<EntryKey>> {
        self.inner.lock().backend()?.get_key_for_string(value, insert)
    }

    /// Key of an interned literal; `insert` adds it when absent
    pub fn get_key_for_literal(
        &self,
        lexical: Option<&str>,
        datatype: Option<&str>,
        lang: Option<&str>,
        insert: bool,
    ) -> Result<Option<EntryKey>> {
        self.inner
            .lock()
            .backend()?
            .get_key_for_literal(lexical, datatype, lang, insert)
    }

    pub fn retrieve_string(&self, key: EntryKey) -> Result<String> {
        self.inner.lock().retrieve_string(key)
    }

    pub fn retrieve_literal(&self, key: EntryKey) -> Result<LiteralValue> {
        self.inner.lock().retrieve_literal(key)
    }

    /// Adjust the reference count of a string entry, returning the new count
    pub fn on_ref_count_string(&self, key: EntryKey, delta: i64) -> Result<i64> {
        self.inner.lock().backend()?.add_ref_count(key, delta)
    }

    /// Adjust the reference count of a literal entry, returning the new count
    pub fn on_ref_count_literal(&self, key: EntryKey, delta: i64) -> Result<i64> {
        self.inner.lock().backend()?.add_ref_count(key, delta)
    }

    /// Reference count of a string or literal entry
    pub fn ref_count(&self, key: EntryKey) -> Result<i64> {
        self.inner.lock().backend()?.ref_count(key)
    }

    /// Number of strings chained in the bucket `value` hashes to
    pub fn bucket_len(&self, value: &str) -> Result<usize> {
        self.inner.lock().backend()?.bucket_len(value)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Make every change durable, returning the number of blocks written
    pub fn commit(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let backend = inner.backend()?;
        let written = backend.data.commit()? + backend.index.commit()?;
        tracing::debug!(blocks = written, "committed node store");
        Ok(written)
    }

    /// Discard every uncommitted change, returning the number of blocks dropped
    ///
    /// Cached handles are forgotten since their keys may no longer exist.
    pub fn rollback(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let backend = inner.backend()?;
        let discarded = backend.data.rollback()? + backend.index.rollback()?;
        backend.reload_index()?;
        inner.clear_caches();
        tracing::debug!(blocks = discarded, "rolled back node store");
        Ok(discarded)
    }

    /// Remove every string, literal and blank id, committing the empty store
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let backend = inner.backend()?;
        if backend.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        backend.data.clear()?;
        backend.index.truncate()?;
        backend.reload_index()?;
        backend.data.commit()?;
        backend.index.commit()?;
        inner.clear_caches();
        tracing::info!("cleared node store");
        Ok(())
    }

    /// Close the store for every handle
    ///
    /// Uncommitted changes are discarded. Later calls, from this or any
    /// other clone, fail with [`StoreError::Closed`].
    pub fn close(self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.clear_caches();
        let Some(backend) = inner.backend.take() else {
            return Ok(());
        };
        backend.data.close()?;
        backend.index.close()?;
        tracing::debug!("closed node store");
        Ok(())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn stats(&self) -> Result<NodeStoreStats> {
        let mut inner = self.inner.lock();
        let cached_nodes = inner.iris.live() + inner.anons.live() + inner.literals.live();
        let backend = inner.backend()?;
        Ok(NodeStoreStats {
            files: backend.data.stats()?,
            string_buckets: backend.strings.len(),
            literal_buckets: backend.literals.len(),
            next_blank: backend.next_blank,
            cached_nodes,
        })
    }

    /// Load every data page, collecting verification failures
    pub fn verify(&self) -> Result<Vec<PageFailure>> {
        self.inner.lock().backend()?.data.verify()
    }
}
