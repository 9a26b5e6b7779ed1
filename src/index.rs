use crate::cover;
use crate::record::Record;
use crate::store::{StoreError, StoreTransaction, DEFAULT_MAX_KEY_SIZE};
use crate::tuple::{Element, Subspace, TupleError};
use smallvec::SmallVec;
use thiserror::Error;

/// How many rows an edge is materialized into.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Strategy {
    /// Two rows, outgoing and incoming adjacency.
    Adjacency,
    /// Three rows, enough for any single-bound pattern.
    TripleStore,
    /// All six permutations, every pattern is a prefix scan.
    Hexastore,
}

impl Strategy {
    /// The orderings written per edge, in write order.
    pub fn orderings(&self) -> &'static [Ordering] {
        match self {
            Strategy::Adjacency => &[Ordering::Out, Ordering::In],
            Strategy::TripleStore => &[Ordering::Spo, Ordering::Pos, Ordering::Osp],
            Strategy::Hexastore => &[
                Ordering::Spo,
                Ordering::Pos,
                Ordering::Osp,
                Ordering::Sop,
                Ordering::Pso,
                Ordering::Ops,
            ],
        }
    }
}

/// One key ordering of the triple `(from, edge, to)`.
///
/// Every ordering owns a fixed small-integer prefix under the index's
/// subspace; the integer is part of the storage format and must never be
/// renumbered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Ordering {
    /// `(edge, from, to)`, outgoing adjacency.
    Out = 0,
    /// `(edge, to, from)`, incoming adjacency.
    In = 1,
    /// `(from, edge, to)`.
    Spo = 2,
    /// `(edge, to, from)`.
    Pos = 3,
    /// `(to, from, edge)`.
    Osp = 4,
    /// `(from, to, edge)`.
    Sop = 5,
    /// `(edge, from, to)`.
    Pso = 6,
    /// `(to, edge, from)`.
    Ops = 7,
}

impl Ordering {
    /// The ordering's key prefix integer.
    pub fn id(&self) -> i64 {
        *self as i64
    }

    /// Resolves a key prefix integer back to the ordering.
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Ordering::Out),
            1 => Some(Ordering::In),
            2 => Some(Ordering::Spo),
            3 => Some(Ordering::Pos),
            4 => Some(Ordering::Osp),
            5 => Some(Ordering::Sop),
            6 => Some(Ordering::Pso),
            7 => Some(Ordering::Ops),
            _ => None,
        }
    }

    /// Arranges `(from, edge, to)` into this ordering's key slots.
    pub fn permute<'a>(
        &self,
        from: &'a Element,
        edge: &'a Element,
        to: &'a Element,
    ) -> [&'a Element; 3] {
        match self {
            Ordering::Out | Ordering::Pso => [edge, from, to],
            Ordering::In | Ordering::Pos => [edge, to, from],
            Ordering::Spo => [from, edge, to],
            Ordering::Osp => [to, from, edge],
            Ordering::Sop => [from, to, edge],
            Ordering::Ops => [to, edge, from],
        }
    }

    /// Restores `(from, edge, to)` from this ordering's key slots.
    pub fn restore(&self, slots: [Element; 3]) -> (Element, Element, Element) {
        let [a, b, c] = slots;
        match self {
            Ordering::Out | Ordering::Pso => (b, a, c),
            Ordering::In | Ordering::Pos => (c, a, b),
            Ordering::Spo => (a, b, c),
            Ordering::Osp => (b, c, a),
            Ordering::Sop => (a, c, b),
            Ordering::Ops => (c, b, a),
        }
    }
}

/// A decoded edge, optionally qualified by a named graph.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Edge {
    /// The source node.
    pub from: Element,
    /// The edge label. Empty string for unlabeled graphs.
    pub edge: Element,
    /// The target node.
    pub to: Element,
    /// The named graph, when the index is a quad index.
    pub graph: Option<Element>,
}

impl Edge {
    /// Creates a triple edge.
    pub fn new(
        from: impl Into<Element>,
        edge: impl Into<Element>,
        to: impl Into<Element>,
    ) -> Self {
        Self {
            from: from.into(),
            edge: edge.into(),
            to: to.into(),
            graph: None,
        }
    }

    /// Qualifies the edge with a named graph.
    pub fn in_graph(mut self, graph: impl Into<Element>) -> Self {
        self.graph = Some(graph.into());
        self
    }
}

/// An index maintenance failure. All of these abort the whole mutation;
/// no partial rows are ever written.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A required field is absent from the record.
    #[error("field {field} not found on {item}")]
    FieldNotFound {
        /// The record type name.
        item: String,
        /// The missing field.
        field: String,
    },
    /// A field value cannot be tuple packed.
    #[error("field {field} on {item} is not tuple packable")]
    InvalidFieldType {
        /// The record type name.
        item: String,
        /// The offending field.
        field: String,
    },
    /// A decoded index row has the wrong number of elements.
    #[error("index {index} row has arity {arity}, expected {expected}")]
    UnexpectedArity {
        /// The index name.
        index: String,
        /// Elements found in the row.
        arity: usize,
        /// Elements the ordering dictates.
        expected: usize,
    },
    /// A row carries an ordering id outside the strategy.
    #[error("index {index} row has unknown ordering id {id}")]
    UnknownOrdering {
        /// The index name.
        index: String,
        /// The id found in the key.
        id: i64,
    },
    /// A store failure, including key size violations.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A malformed key.
    #[error(transparent)]
    Tuple(#[from] TupleError),
    /// A malformed covering value.
    #[error(transparent)]
    Cover(#[from] crate::cover::CoverError),
}

/// A graph edge index: field bindings, strategy and key layout.
///
/// This is the single owner of the key format. Everything that reads the
/// index (the scanners, the traverser, the incremental reasoner) decodes
/// exactly what [`GraphIndex::update`] writes.
#[derive(Clone, Debug)]
pub struct GraphIndex {
    name: String,
    subspace: Subspace,
    strategy: Strategy,
    from_field: String,
    edge_field: Option<String>,
    to_field: String,
    graph_field: Option<String>,
    stored_fields: Vec<String>,
    max_key_size: usize,
}

impl GraphIndex {
    /// Creates an index over `(from_field, edge_field, to_field)`.
    pub fn new(
        name: impl Into<String>,
        subspace: Subspace,
        strategy: Strategy,
        from_field: impl Into<String>,
        edge_field: Option<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            subspace,
            strategy,
            from_field: from_field.into(),
            edge_field,
            to_field: to_field.into(),
            graph_field: None,
            stored_fields: Vec::new(),
            max_key_size: DEFAULT_MAX_KEY_SIZE,
        }
    }

    /// Adds a named-graph field, making this a quad index.
    pub fn with_graph_field(mut self, field: impl Into<String>) -> Self {
        self.graph_field = Some(field.into());
        self
    }

    /// Declares covering fields stored in the row value.
    pub fn with_stored_fields(mut self, fields: Vec<String>) -> Self {
        self.stored_fields = fields;
        self
    }

    /// Overrides the key size limit.
    pub fn with_max_key_size(mut self, limit: usize) -> Self {
        self.max_key_size = limit;
        self
    }

    /// The index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The index strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The index subspace.
    pub fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    /// The covering fields, in declaration order.
    pub fn stored_fields(&self) -> &[String] {
        &self.stored_fields
    }

    /// Whether rows carry a named-graph slot.
    pub fn is_quad(&self) -> bool {
        self.graph_field.is_some()
    }

    fn required_field(&self, record: &dyn Record, field: &str) -> Result<Element, IndexError> {
        let value = record
            .field(field)
            .ok_or_else(|| IndexError::FieldNotFound {
                item: record.type_name().to_owned(),
                field: field.to_owned(),
            })?;
        let packable = match &value {
            Element::Str(s) => s.len() <= u16::MAX as usize,
            Element::Bytes(b) => b.len() <= u16::MAX as usize,
            Element::I64(_) | Element::Null => true,
        };
        if !packable {
            return Err(IndexError::InvalidFieldType {
                item: record.type_name().to_owned(),
                field: field.to_owned(),
            });
        }
        Ok(value)
    }

    /// Extracts the edge the record describes.
    pub fn extract(&self, record: &dyn Record) -> Result<Edge, IndexError> {
        let from = self.required_field(record, &self.from_field)?;
        let edge = match &self.edge_field {
            Some(field) => self.required_field(record, field)?,
            // unlabeled graphs store the canonical empty-string sentinel
            None => Element::from(""),
        };
        let to = self.required_field(record, &self.to_field)?;
        let graph = match &self.graph_field {
            Some(field) => Some(self.required_field(record, field)?),
            None => None,
        };
        Ok(Edge {
            from,
            edge,
            to,
            graph,
        })
    }

    /// The exact key set the record's edge occupies, in deterministic
    /// write order. This is what a scrubber compares the store against.
    pub fn compute_keys(&self, record: &dyn Record) -> Result<Vec<Vec<u8>>, IndexError> {
        let edge = self.extract(record)?;
        self.keys_for(&edge)
    }

    /// The key set for an already extracted edge.
    pub fn keys_for(&self, edge: &Edge) -> Result<Vec<Vec<u8>>, IndexError> {
        let mut keys = Vec::with_capacity(self.strategy.orderings().len());
        for ordering in self.strategy.orderings() {
            let slots = ordering.permute(&edge.from, &edge.edge, &edge.to);
            let mut elements: SmallVec<[Element; 5]> = SmallVec::new();
            elements.push(Element::I64(ordering.id()));
            elements.extend(slots.iter().map(|e| (*e).clone()));
            if let Some(graph) = &edge.graph {
                elements.push(graph.clone());
            }
            let key = self.subspace.pack(&elements);
            if key.len() > self.max_key_size {
                return Err(StoreError::KeyTooLarge {
                    len: key.len(),
                    limit: self.max_key_size,
                    key: key[..key.len().min(64)].to_vec(),
                }
                .into());
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Applies a record mutation to the index inside the caller's
    /// transaction: clears the rows of `old`, writes the rows of `new`.
    /// Keys and the covering value are computed and validated before the
    /// first write is issued, so a failure leaves the buffer untouched.
    pub fn update<T: StoreTransaction>(
        &self,
        old: Option<&dyn Record>,
        new: Option<&dyn Record>,
        tx: &mut T,
    ) -> Result<(), IndexError> {
        let old_keys = old.map(|record| self.compute_keys(record)).transpose()?;
        let new_write = new
            .map(|record| -> Result<_, IndexError> {
                let keys = self.compute_keys(record)?;
                let value = if self.stored_fields.is_empty() {
                    Vec::new()
                } else {
                    cover::encode_covering(record, &self.stored_fields)?
                };
                Ok((keys, value))
            })
            .transpose()?;

        if let Some(keys) = old_keys {
            for key in keys {
                tx.clear(&key);
            }
        }
        if let Some((keys, value)) = new_write {
            for key in keys {
                tx.set(&key, &value)?;
            }
        }
        Ok(())
    }

    /// Rewrites a record's rows idempotently, the repair half of a
    /// scrubber pass.
    pub fn repair<T: StoreTransaction>(
        &self,
        record: &dyn Record,
        tx: &mut T,
    ) -> Result<(), IndexError> {
        self.update(None, Some(record), tx)
    }

    /// Decodes one raw row back to its edge.
    pub fn decode_key(&self, key: &[u8]) -> Result<(Ordering, Edge), IndexError> {
        let elements = self.subspace.unpack(key)?;
        let expected = if self.is_quad() { 5 } else { 4 };
        if elements.len() != expected {
            return Err(IndexError::UnexpectedArity {
                index: self.name.clone(),
                arity: elements.len(),
                expected,
            });
        }
        let mut elements = elements.into_iter();
        let id = elements
            .next()
            .and_then(|e| e.as_i64())
            .ok_or_else(|| IndexError::UnknownOrdering {
                index: self.name.clone(),
                id: -1,
            })?;
        let ordering = Ordering::from_id(id).ok_or(IndexError::UnknownOrdering {
            index: self.name.clone(),
            id,
        })?;
        let slots = [
            elements.next().unwrap(),
            elements.next().unwrap(),
            elements.next().unwrap(),
        ];
        let (from, edge, to) = ordering.restore(slots);
        Ok((
            ordering,
            Edge {
                from,
                edge,
                to,
                graph: elements.next(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MapRecord;
    use crate::store::{MemStore, Store};

    fn edge_record(from: &str, label: &str, to: &str) -> MapRecord {
        MapRecord::new("Edge")
            .with("from", from)
            .with("label", label)
            .with("to", to)
    }

    fn index(strategy: Strategy) -> GraphIndex {
        GraphIndex::new(
            "knows",
            Subspace::from_elements(&[Element::from("g")]),
            strategy,
            "from",
            Some("label".into()),
            "to",
        )
    }

    #[test]
    fn strategies_write_their_row_counts() {
        for (strategy, rows) in [
            (Strategy::Adjacency, 2),
            (Strategy::TripleStore, 3),
            (Strategy::Hexastore, 6),
        ] {
            let store = MemStore::new();
            let index = index(strategy);
            let record = edge_record("a", "knows", "b");
            let mut tx = store.begin();
            index.update(None, Some(&record), &mut tx).unwrap();
            store.commit(tx).unwrap();
            assert_eq!(store.len(), rows);
        }
    }

    #[test]
    fn keys_decode_back_to_the_edge() {
        let index = index(Strategy::Hexastore);
        let record = edge_record("a", "knows", "b");
        for key in index.compute_keys(&record).unwrap() {
            let (_, edge) = index.decode_key(&key).unwrap();
            assert_eq!(edge, Edge::new("a", "knows", "b"));
        }
    }

    #[test]
    fn update_replaces_old_rows() {
        let store = MemStore::new();
        let index = index(Strategy::TripleStore);
        let old = edge_record("a", "knows", "b");
        let new = edge_record("a", "knows", "c");

        let mut tx = store.begin();
        index.update(None, Some(&old), &mut tx).unwrap();
        store.commit(tx).unwrap();

        let mut tx = store.begin();
        index.update(Some(&old), Some(&new), &mut tx).unwrap();
        store.commit(tx).unwrap();

        assert_eq!(store.len(), 3);
        for key in index.compute_keys(&new).unwrap() {
            let tx = store.begin();
            assert!(tx.get(&key, false).unwrap().is_some());
        }
        for key in index.compute_keys(&old).unwrap() {
            let tx = store.begin();
            assert!(tx.get(&key, false).unwrap().is_none());
        }
    }

    #[test]
    fn written_keys_equal_computed_keys() {
        let store = MemStore::new();
        let index = index(Strategy::Hexastore);
        let record = edge_record("a", "knows", "b");
        let mut tx = store.begin();
        index.update(None, Some(&record), &mut tx).unwrap();
        store.commit(tx).unwrap();

        let expected: std::collections::BTreeSet<Vec<u8>> =
            index.compute_keys(&record).unwrap().into_iter().collect();
        let tx = store.begin();
        let (begin, end) = index.subspace().range();
        let written: std::collections::BTreeSet<Vec<u8>> = tx
            .get_range(&begin, &end, false)
            .unwrap()
            .map(|row| row.unwrap().0)
            .collect();
        assert_eq!(written, expected);
    }

    #[test]
    fn missing_field_aborts_without_writes() {
        let store = MemStore::new();
        let index = index(Strategy::TripleStore);
        let record = MapRecord::new("Edge").with("from", "a").with("label", "x");
        let mut tx = store.begin();
        let err = index.update(None, Some(&record), &mut tx).unwrap_err();
        assert!(matches!(
            err,
            IndexError::FieldNotFound { ref field, .. } if field == "to"
        ));
        store.commit(tx).unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn oversized_key_aborts_whole_mutation() {
        let store = MemStore::new();
        let index = index(Strategy::TripleStore).with_max_key_size(32);
        let record = edge_record(&"x".repeat(100), "knows", "b");
        let mut tx = store.begin();
        let err = index.update(None, Some(&record), &mut tx).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Store(StoreError::KeyTooLarge { .. })
        ));
        store.commit(tx).unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn missing_edge_field_uses_empty_sentinel() {
        let index = GraphIndex::new(
            "flat",
            Subspace::from_elements(&[Element::from("g")]),
            Strategy::Adjacency,
            "from",
            None,
            "to",
        );
        let record = MapRecord::new("Edge").with("from", "a").with("to", "b");
        let edge = index.extract(&record).unwrap();
        assert_eq!(edge.edge, Element::from(""));
    }

    #[test]
    fn quad_rows_carry_the_graph_slot() {
        let index = index(Strategy::TripleStore).with_graph_field("graph");
        let record = edge_record("a", "knows", "b").with("graph", "g1");
        for key in index.compute_keys(&record).unwrap() {
            let (_, edge) = index.decode_key(&key).unwrap();
            assert_eq!(edge.graph, Some(Element::from("g1")));
        }
    }

    #[test]
    fn ordering_permute_restore_round_trip() {
        let from = Element::from("s");
        let edge = Element::from("p");
        let to = Element::from("o");
        for ordering in Strategy::Hexastore.orderings() {
            let slots = ordering.permute(&from, &edge, &to);
            let restored = ordering.restore([
                slots[0].clone(),
                slots[1].clone(),
                slots[2].clone(),
            ]);
            assert_eq!(restored, (from.clone(), edge.clone(), to.clone()));
        }
    }
}
