use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::Stream;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use vec_collections::radix_tree::{AbstractRadixTree, AbstractRadixTreeMut, ArcRadixTree};

/// Default key size limit, in bytes.
pub const DEFAULT_MAX_KEY_SIZE: usize = 10_000;
/// Default value size limit, in bytes.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 100_000;

/// How many recent writes the memory store keeps for conflict detection
/// before old transactions are failed conservatively.
const WRITE_LOG_CAP: usize = 4096;

/// A store level failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transaction read state another commit has since overwritten.
    /// Retryable.
    #[error("transaction conflict on key {}", hex::encode(.0))]
    Conflict(Vec<u8>),
    /// The transaction's read version fell behind the store's write log.
    /// Retryable.
    #[error("transaction too old, read version {read} behind {oldest}")]
    TooOld {
        /// The transaction's read version.
        read: u64,
        /// The oldest version the store can still check against.
        oldest: u64,
    },
    /// A key exceeds the store's limit.
    #[error("key of {len} bytes exceeds the store limit of {limit}: {}", hex::encode(.key))]
    KeyTooLarge {
        /// Size of the offending key.
        len: usize,
        /// The store's limit.
        limit: usize,
        /// A prefix of the offending key, for the diagnostic.
        key: Vec<u8>,
    },
    /// A value exceeds the store's limit.
    #[error("value of {len} bytes exceeds the store limit of {limit}")]
    ValueTooLarge {
        /// Size of the offending value.
        len: usize,
        /// The store's limit.
        limit: usize,
    },
    /// The retry loop gave up.
    #[error("transaction retry budget exhausted after {0} conflicts")]
    RetriesExhausted(usize),
    /// A non retryable store failure.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl StoreError {
    /// Returns true if retrying the transaction can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::TooOld { .. })
    }
}

/// A decoded key value pair.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// One transaction against a [`Store`].
///
/// Writes are buffered until commit. Reads merge the buffer over the
/// transaction's snapshot, so a transaction sees its own writes. A read
/// with `snapshot = true` does not register a conflict range.
pub trait StoreTransaction {
    /// Reads one key.
    fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, StoreError>;

    /// Streams the key value pairs in `[begin, end)` in key order.
    fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        snapshot: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<KeyValue, StoreError>> + '_>, StoreError>;

    /// Buffers a write.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Buffers a single key clear.
    fn clear(&mut self, key: &[u8]);

    /// Buffers a range clear over `[begin, end)`.
    fn clear_range(&mut self, begin: &[u8], end: &[u8]);
}

/// An ordered, transactional key value store.
pub trait Store: Send + Sync + 'static {
    /// The transaction type.
    type Transaction: StoreTransaction;

    /// Opens a transaction at the current version.
    fn begin(&self) -> Self::Transaction;

    /// Commits a transaction, failing with a retryable
    /// [`StoreError::Conflict`] when its reads went stale.
    fn commit(&self, tx: Self::Transaction) -> Result<(), StoreError>;

    /// The key size limit.
    fn max_key_size(&self) -> usize;

    /// The value size limit.
    fn max_value_size(&self) -> usize;

    /// Validates a key against the size limit.
    fn validate_key(&self, key: &[u8]) -> Result<(), StoreError> {
        if key.len() > self.max_key_size() {
            return Err(StoreError::KeyTooLarge {
                len: key.len(),
                limit: self.max_key_size(),
                key: key[..key.len().min(64)].to_vec(),
            });
        }
        Ok(())
    }
}

/// Retry policy for [`with_transaction`].
#[derive(Clone, Copy, Debug)]
pub struct TransactionConfig {
    /// Conflicts tolerated before giving up.
    pub max_retries: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self { max_retries: 16 }
    }
}

/// Runs `body` in a transaction, retrying it on commit conflicts.
///
/// The body can run multiple times, so its effects outside the
/// transaction must be idempotent. Errors returned by the body are
/// surfaced as is; only commit conflicts retry.
pub fn with_transaction<S, T, F>(
    store: &S,
    config: &TransactionConfig,
    mut body: F,
) -> Result<T, StoreError>
where
    S: Store,
    F: FnMut(&mut S::Transaction) -> Result<T, StoreError>,
{
    let mut attempts = 0;
    loop {
        let mut tx = store.begin();
        let out = body(&mut tx)?;
        match store.commit(tx) {
            Ok(()) => return Ok(out),
            Err(err) if err.is_retryable() => {
                attempts += 1;
                tracing::debug!(attempts, %err, "transaction conflict, retrying");
                if attempts >= config.max_retries {
                    return Err(StoreError::RetriesExhausted(attempts));
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// A change seen by a prefix watcher.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreEvent {
    /// The key was set to the value.
    Set(Vec<u8>, Vec<u8>),
    /// The key was cleared.
    Cleared(Vec<u8>),
}

struct MemInner {
    tree: ArcRadixTree<u8, Arc<[u8]>>,
    version: u64,
    oldest_logged: u64,
    write_log: VecDeque<(u64, Vec<u8>)>,
    watchers: Vec<(Vec<u8>, UnboundedSender<StoreEvent>)>,
}

impl MemInner {
    fn log_write(&mut self, version: u64, key: Vec<u8>) {
        self.write_log.push_back((version, key));
        while self.write_log.len() > WRITE_LOG_CAP {
            let (v, _) = self.write_log.pop_front().unwrap();
            self.oldest_logged = v + 1;
        }
    }

    fn notify(&mut self, event: &StoreEvent) {
        let key = match event {
            StoreEvent::Set(key, _) | StoreEvent::Cleared(key) => key.clone(),
        };
        self.watchers.retain(|(prefix, sender)| {
            !key.starts_with(prefix.as_slice()) || sender.unbounded_send(event.clone()).is_ok()
        });
    }
}

/// The bundled in memory [`Store`].
///
/// Keys live in a shared radix tree, so a transaction's snapshot is one
/// tree clone. Commits are serialized behind a lock and validated
/// optimistically: a serializable read conflicts when a later commit
/// wrote into its range.
#[derive(Clone)]
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
    max_key_size: usize,
    max_value_size: usize,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Creates an empty store with the default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE)
    }

    /// Creates an empty store with explicit size limits.
    pub fn with_limits(max_key_size: usize, max_value_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemInner {
                tree: Default::default(),
                version: 0,
                oldest_logged: 0,
                write_log: VecDeque::new(),
                watchers: Vec::new(),
            })),
            max_key_size,
            max_value_size,
        }
    }

    /// Subscribes to every committed change under a key prefix.
    pub fn watch_prefix(&self, prefix: impl AsRef<[u8]>) -> Watcher {
        let (sender, receiver) = unbounded();
        self.inner
            .lock()
            .watchers
            .push((prefix.as_ref().to_vec(), sender));
        Watcher(receiver)
    }

    /// The number of live keys, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.inner.lock().tree.iter().count()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let inner = self.inner.lock();
        let mut m = f.debug_map();
        for (k, v) in inner.tree.iter() {
            m.entry(&hex::encode(k), &hex::encode(v));
        }
        m.finish()
    }
}

/// Stream of [`StoreEvent`]s delivered to a prefix watcher.
pub struct Watcher(UnboundedReceiver<StoreEvent>);

impl Stream for Watcher {
    type Item = StoreEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context,
    ) -> std::task::Poll<Option<StoreEvent>> {
        std::pin::Pin::new(&mut self.0).poll_next(cx)
    }
}

impl Store for MemStore {
    type Transaction = MemTransaction;

    fn begin(&self) -> MemTransaction {
        let inner = self.inner.lock();
        MemTransaction {
            snapshot: inner.tree.clone(),
            read_version: inner.version,
            writes: BTreeMap::new(),
            cleared: Vec::new(),
            reads: Mutex::new(Vec::new()),
            max_key_size: self.max_key_size,
            max_value_size: self.max_value_size,
        }
    }

    fn commit(&self, tx: MemTransaction) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if tx.read_version < inner.oldest_logged {
            return Err(StoreError::TooOld {
                read: tx.read_version,
                oldest: inner.oldest_logged,
            });
        }
        // serializable reads conflict with any newer write in their range
        let reads = tx.reads.into_inner();
        for (version, key) in inner.write_log.iter() {
            if *version <= tx.read_version {
                continue;
            }
            for (begin, end) in &reads {
                if key.as_slice() >= begin.as_slice() && key.as_slice() < end.as_slice() {
                    return Err(StoreError::Conflict(key.clone()));
                }
            }
        }

        let version = inner.version + 1;
        inner.version = version;
        let mut events = Vec::new();
        for (begin, end) in &tx.cleared {
            let doomed: Vec<Vec<u8>> = inner
                .tree
                .iter()
                .map(|(k, _)| k.as_ref().to_vec())
                .filter(|k| k.as_slice() >= begin.as_slice() && k.as_slice() < end.as_slice())
                .collect();
            for key in doomed {
                inner.tree.difference_with(&ArcRadixTree::single(key.as_slice(), ()));
                inner.log_write(version, key.clone());
                events.push(StoreEvent::Cleared(key));
            }
        }
        for (key, value) in tx.writes {
            match value {
                Some(value) => {
                    inner
                        .tree
                        .outer_combine_with(&ArcRadixTree::single(key.as_slice(), value.clone()), |a, b| {
                            *a = b.clone();
                            true
                        });
                    inner.log_write(version, key.clone());
                    events.push(StoreEvent::Set(key, value.to_vec()));
                }
                None => {
                    inner.tree.difference_with(&ArcRadixTree::single(key.as_slice(), ()));
                    inner.log_write(version, key.clone());
                    events.push(StoreEvent::Cleared(key));
                }
            }
        }
        for event in &events {
            inner.notify(event);
        }
        Ok(())
    }

    fn max_key_size(&self) -> usize {
        self.max_key_size
    }

    fn max_value_size(&self) -> usize {
        self.max_value_size
    }
}

/// A [`MemStore`] transaction.
pub struct MemTransaction {
    snapshot: ArcRadixTree<u8, Arc<[u8]>>,
    read_version: u64,
    writes: BTreeMap<Vec<u8>, Option<Arc<[u8]>>>,
    cleared: Vec<(Vec<u8>, Vec<u8>)>,
    reads: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    max_key_size: usize,
    max_value_size: usize,
}

impl MemTransaction {
    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared
            .iter()
            .any(|(begin, end)| key >= begin.as_slice() && key < end.as_slice())
    }

    fn record_read(&self, begin: &[u8], end: &[u8]) {
        self.reads.lock().push((begin.to_vec(), end.to_vec()));
    }
}

impl StoreTransaction for MemTransaction {
    fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, StoreError> {
        if !snapshot {
            let mut end = key.to_vec();
            end.push(0);
            self.record_read(key, &end);
        }
        if let Some(value) = self.writes.get(key) {
            return Ok(value.as_ref().map(|v| v.to_vec()));
        }
        if self.is_cleared(key) {
            return Ok(None);
        }
        Ok(self.snapshot.get(key).map(|v| v.to_vec()))
    }

    fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        snapshot: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<KeyValue, StoreError>> + '_>, StoreError> {
        if begin >= end {
            return Ok(Box::new(std::iter::empty()));
        }
        if !snapshot {
            self.record_read(begin, end);
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .snapshot
            .iter()
            .filter(|(k, _)| {
                let k: &[u8] = k.as_ref();
                k >= begin && k < end && !self.is_cleared(k)
            })
            .map(|(k, v)| (k.as_ref().to_vec(), v.to_vec()))
            .collect();
        for (key, value) in self.writes.range(begin.to_vec()..end.to_vec()) {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.to_vec());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(Box::new(merged.into_iter().map(Ok)))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if key.len() > self.max_key_size {
            return Err(StoreError::KeyTooLarge {
                len: key.len(),
                limit: self.max_key_size,
                key: key[..key.len().min(64)].to_vec(),
            });
        }
        if value.len() > self.max_value_size {
            return Err(StoreError::ValueTooLarge {
                len: value.len(),
                limit: self.max_value_size,
            });
        }
        self.writes.insert(key.to_vec(), Some(value.into()));
        Ok(())
    }

    fn clear(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn clear_range(&mut self, begin: &[u8], end: &[u8]) {
        self.cleared.push((begin.to_vec(), end.to_vec()));
        let doomed: Vec<Vec<u8>> = self
            .writes
            .range(begin.to_vec()..end.to_vec())
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.writes.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn commit_one(store: &MemStore, key: &[u8], value: &[u8]) {
        let mut tx = store.begin();
        tx.set(key, value).unwrap();
        store.commit(tx).unwrap();
    }

    #[test]
    fn read_your_writes() {
        let store = MemStore::new();
        let mut tx = store.begin();
        tx.set(b"a", b"1").unwrap();
        assert_eq!(tx.get(b"a", false).unwrap(), Some(b"1".to_vec()));
        tx.clear(b"a");
        assert_eq!(tx.get(b"a", false).unwrap(), None);
    }

    #[test]
    fn range_merges_snapshot_and_buffer() {
        let store = MemStore::new();
        commit_one(&store, b"k1", b"old");
        commit_one(&store, b"k3", b"three");
        let mut tx = store.begin();
        tx.set(b"k1", b"new").unwrap();
        tx.set(b"k2", b"two").unwrap();
        tx.clear(b"k3");
        let rows: Vec<KeyValue> = tx
            .get_range(b"k", b"l", false)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                (b"k1".to_vec(), b"new".to_vec()),
                (b"k2".to_vec(), b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn serializable_reads_conflict() {
        let store = MemStore::new();
        commit_one(&store, b"a", b"0");

        let tx1 = store.begin();
        tx1.get(b"a", false).unwrap();
        commit_one(&store, b"a", b"1");
        let err = store.commit(tx1).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn snapshot_reads_do_not_conflict() {
        let store = MemStore::new();
        commit_one(&store, b"a", b"0");

        let tx1 = store.begin();
        assert_eq!(tx1.get(b"a", true).unwrap(), Some(b"0".to_vec()));
        commit_one(&store, b"a", b"1");
        store.commit(tx1).unwrap();
    }

    #[test]
    fn snapshot_isolation_in_ranges() {
        let store = MemStore::new();
        commit_one(&store, b"a", b"0");
        let tx = store.begin();
        commit_one(&store, b"b", b"late");
        let rows: Vec<KeyValue> = tx
            .get_range(b"a", b"c", true)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![(b"a".to_vec(), b"0".to_vec())]);
    }

    #[test]
    fn clear_range_hits_snapshot_keys() {
        let store = MemStore::new();
        commit_one(&store, b"p1", b"1");
        commit_one(&store, b"p2", b"2");
        commit_one(&store, b"q1", b"3");
        let mut tx = store.begin();
        tx.clear_range(b"p", b"q");
        store.commit(tx).unwrap();

        let tx = store.begin();
        let rows: Vec<KeyValue> = tx
            .get_range(b"p", b"r", false)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![(b"q1".to_vec(), b"3".to_vec())]);
    }

    #[test]
    fn key_size_limit_is_enforced() {
        let store = MemStore::with_limits(8, 64);
        let mut tx = store.begin();
        let err = tx.set(&[0u8; 9], b"v").unwrap_err();
        assert!(matches!(
            err,
            StoreError::KeyTooLarge { len: 9, limit: 8, .. }
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn with_transaction_retries_conflicts() {
        let store = MemStore::new();
        commit_one(&store, b"counter", &[0]);
        let mut interfered = false;
        with_transaction(&store, &TransactionConfig::default(), |tx| {
            let current = tx.get(b"counter", false)?.unwrap_or_default();
            if !interfered {
                interfered = true;
                commit_one(&store, b"counter", &[9]);
            }
            tx.set(b"counter", &[current[0] + 1])?;
            Ok(())
        })
        .unwrap();
        let tx = store.begin();
        assert_eq!(tx.get(b"counter", false).unwrap(), Some(vec![10]));
    }

    #[async_std::test]
    async fn watchers_see_committed_changes() {
        let store = MemStore::new();
        let mut watcher = store.watch_prefix(b"edge/");
        commit_one(&store, b"edge/a", b"1");
        commit_one(&store, b"other", b"x");
        let mut tx = store.begin();
        tx.clear(b"edge/a");
        store.commit(tx).unwrap();

        assert_eq!(
            watcher.next().await,
            Some(StoreEvent::Set(b"edge/a".to_vec(), b"1".to_vec()))
        );
        assert_eq!(
            watcher.next().await,
            Some(StoreEvent::Cleared(b"edge/a".to_vec()))
        );
    }
}
