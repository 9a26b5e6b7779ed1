//! # hexad
//!
//! A graph index and reasoning layer for ordered, transactional key value
//! stores.
//!
//! ## Edges as keys
//! An edge `(from, edge, to)` is materialized as a handful of keys, one
//! per *ordering* of its three slots, under a [`Subspace`] owned by the
//! index. The [`Strategy`] decides which orderings exist: adjacency
//! writes two rows, a triple store three, a hexastore all six. Keys are
//! tuple encoded so that binding a prefix of an ordering's slots turns a
//! query into one range read, and the
//! [`ScanPlan`] makes it visible when a pattern cannot be served by
//! prefix and degrades to a filtered full scan (the adjacency layout has
//! such shapes; nothing hides it).
//!
//! ## Reading
//! The [`EdgeScanner`] picks the ordering for a pattern from a fixed
//! table, builds the longest bound prefix, and decodes rows lazily in the
//! store's key order. The [`PropertyScanner`] additionally decodes
//! *covering values*, a presence bitmap plus the tuple encoded subset of
//! the record's fields stored next to the key, and applies property
//! filters before yielding, so point filters never fetch base records.
//! The [`Traverser`] runs breadth first searches in per-batch
//! transactions with hard depth and node bounds, caller cancellation and
//! opaque resumption cursors.
//!
//! ## Writing
//! The [`GraphIndex`] maintainer is the single owner of the key format.
//! It turns a record mutation into the exact row set of the chosen
//! strategy, inside the caller's transaction, validating fields and key
//! sizes before the first write so a failure never leaves partial rows.
//! `compute_keys` exposes the expected key set for scrub verification.
//!
//! ## Reasoning
//! OWL DL reasoning lives in the [`hexad-owl`](hexad_owl) crate: a
//! tableaux reasoner over completion graphs, plus a forward chaining
//! materializer. This crate adds the persistent half: the
//! [`IncrementalReasoner`] applies the materializer on triple insert,
//! stores every inference with its provenance (antecedents in both
//! directions plus a validity flag) and repairs the materialization on
//! delete with Delete-and-Rederive: tentatively invalidate the cascade of
//! dependents, re-validate everything that still has a complete
//! derivation, purge the rest.
//!
//! ## Stores
//! Everything runs against the [`Store`] contract: lexicographically
//! ordered byte keys, transactions with buffered writes, snapshot or
//! serializable reads, and conflict-or-fatal commits retried by
//! [`with_transaction`]. The bundled [`MemStore`] implements the contract
//! over a shared radix tree (a snapshot is one tree clone) and adds
//! prefix watching for tests and tooling.
#![warn(missing_docs)]
mod cover;
mod dred;
mod index;
#[cfg(test)]
mod props;
mod record;
mod scan;
mod store;
mod traverse;
mod tuple;

pub use crate::cover::{
    decode_covering, encode_covering, CoverError, FilterOp, Properties, PropertyFilter,
    PropertyRow, PropertyScanner,
};
pub use crate::dred::{
    DeleteReport, DredError, IncrementalReasoner, IndexTripleSource, Provenance,
    DEFAULT_MAX_CASCADE_DEPTH,
};
pub use crate::index::{Edge, GraphIndex, IndexError, Ordering, Strategy};
pub use crate::record::{MapRecord, Record};
pub use crate::scan::{
    Direction, EdgeScanner, Pattern, ScanPlan, BATCH_FULL_SCAN_THRESHOLD,
};
pub use crate::store::{
    with_transaction, KeyValue, MemStore, MemTransaction, Store, StoreError, StoreEvent,
    StoreTransaction, TransactionConfig, Watcher, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE,
};
pub use crate::traverse::{
    BfsOptions, BfsResult, BoundedPage, CancellationToken, TraverseError, Traverser, Visit,
    DEFAULT_BATCH_SIZE,
};
pub use crate::tuple::{pack, strinc, unpack, Element, Subspace, Tuple, TupleBuf, TupleError};

pub use hexad_owl as owl;
