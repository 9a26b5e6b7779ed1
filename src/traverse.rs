use crate::index::{GraphIndex, IndexError};
use crate::scan::{Direction, EdgeScanner, Pattern};
use crate::store::Store;
use crate::tuple::{self, Element};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use thiserror::Error;

/// Nodes looked up per traversal transaction. Keeps each transaction
/// comfortably under the store's per-transaction time cap.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// A traversal failure.
#[derive(Debug, Error)]
pub enum TraverseError {
    /// The resumption cursor does not decode or does not match the
    /// traversal it claims to resume.
    #[error("invalid traversal cursor")]
    InvalidCursor,
    /// A scan failure.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Caller side cancellation for a running traversal.
///
/// Cancelling between batches takes effect immediately; a batch that is
/// mid-transaction finishes first, then the traversal returns its
/// partial progress.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// One emitted node with its BFS depth.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Visit {
    /// Distance from the start node.
    pub depth: u32,
    /// The node id.
    pub node: Element,
}

/// Options for a breadth first traversal.
#[derive(Clone, Debug)]
pub struct BfsOptions {
    /// Levels to expand beyond the start node.
    pub max_depth: u32,
    /// Upper bound on visited nodes, the start included.
    pub max_nodes: usize,
    /// Follow only edges with this label.
    pub label: Option<Element>,
    /// Edge direction to follow.
    pub direction: Direction,
    /// Read through the transaction buffer instead of snapshot reads.
    /// Snapshot is the default: traversal batches span transactions, so
    /// inter-level consistency is not guaranteed either way, and
    /// snapshot reads avoid spurious conflicts with concurrent writers.
    pub read_your_writes: bool,
}

impl Default for BfsOptions {
    fn default() -> Self {
        Self {
            max_depth: u32::MAX,
            max_nodes: usize::MAX,
            label: None,
            direction: Direction::Outgoing,
            read_your_writes: false,
        }
    }
}

/// The outcome of a traversal: what was emitted and whether the
/// traversal ran to exhaustion. Errors carry the partial progress made
/// before they hit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BfsResult {
    /// Emitted nodes in level order.
    pub visits: Vec<Visit>,
    /// True if the traversal exhausted every reachable node within its
    /// depth bound; false when truncated by `max_nodes`, cancellation or
    /// an error.
    pub complete: bool,
}

/// A page of a bounded traversal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoundedPage {
    /// The page of emitted nodes.
    pub visits: Vec<Visit>,
    /// Opaque resumption cursor, present when more nodes remain.
    pub cursor: Option<String>,
    /// True when the traversal is exhausted.
    pub complete: bool,
}

/// Breadth first traversal over a graph index.
///
/// Each frontier batch runs in its own transaction; visited bookkeeping
/// folds in between. Splitting levels across transactions trades
/// inter-level consistency for bounded transaction sizes, which is the
/// only workable shape under a store with per-transaction caps.
pub struct Traverser<'a, S: Store> {
    store: &'a S,
    index: &'a GraphIndex,
    batch_size: usize,
}

impl<'a, S: Store> Traverser<'a, S> {
    /// Creates a traverser over a store and an index.
    pub fn new(store: &'a S, index: &'a GraphIndex) -> Self {
        Self {
            store,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides the per-transaction batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The neighbors of one node, one hop away.
    pub fn neighbors(
        &self,
        node: &Element,
        label: Option<&Element>,
        direction: Direction,
    ) -> Result<Vec<Element>, IndexError> {
        let scanner = EdgeScanner::new(self.index);
        let tx = self.store.begin();
        let mut pattern = Pattern::any();
        match direction {
            Direction::Outgoing => pattern.from = Some(node.clone()),
            Direction::Incoming => pattern.to = Some(node.clone()),
        }
        pattern.edge = label.cloned();
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for edge in scanner.scan(&pattern, &tx, true)? {
            let edge = edge?;
            let neighbor = match direction {
                Direction::Outgoing => edge.to,
                Direction::Incoming => edge.from,
            };
            if seen.insert(neighbor.clone()) {
                out.push(neighbor);
            }
        }
        Ok(out)
    }

    /// Runs a bounded breadth first traversal from `start`.
    pub fn bfs(
        &self,
        start: Element,
        options: &BfsOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<BfsResult, TraverseError> {
        let mut visits = vec![Visit {
            depth: 0,
            node: start.clone(),
        }];
        let mut visited: BTreeSet<Element> = BTreeSet::new();
        visited.insert(start.clone());
        let mut frontier = vec![start];
        let mut depth = 0;

        while depth < options.max_depth
            && !frontier.is_empty()
            && visited.len() < options.max_nodes
        {
            let mut next_frontier = Vec::new();
            for batch in frontier.chunks(self.batch_size) {
                if cancel.map_or(false, CancellationToken::is_cancelled) {
                    tracing::debug!(depth, visited = visited.len(), "traversal cancelled");
                    return Ok(BfsResult {
                        visits,
                        complete: false,
                    });
                }
                // one transaction per batch, abandoned after the reads
                let tx = self.store.begin();
                let scanner = EdgeScanner::new(self.index);
                let edges = scanner.scan_batch(
                    batch,
                    options.label.as_ref(),
                    options.direction,
                    &tx,
                    !options.read_your_writes,
                )?;
                drop(tx);

                let mut accumulated = Vec::new();
                let mut in_batch = BTreeSet::new();
                for edge in edges {
                    let target = match options.direction {
                        Direction::Outgoing => edge.to,
                        Direction::Incoming => edge.from,
                    };
                    if !visited.contains(&target) && in_batch.insert(target.clone()) {
                        accumulated.push(target);
                    }
                }
                // fold outside the transaction
                for node in accumulated {
                    visited.insert(node.clone());
                    next_frontier.push(node.clone());
                    visits.push(Visit {
                        depth: depth + 1,
                        node,
                    });
                    if visited.len() >= options.max_nodes {
                        return Ok(BfsResult {
                            visits,
                            complete: false,
                        });
                    }
                }
            }
            frontier = next_frontier;
            depth += 1;
        }

        Ok(BfsResult {
            visits,
            complete: frontier.is_empty() || depth >= options.max_depth,
        })
    }

    /// Runs a resumable traversal page: at most `limit` nodes are
    /// returned together with an opaque cursor for the next page.
    ///
    /// Resumption replays the (deterministic) traversal and verifies the
    /// cursor's last-key checkpoint, so a cursor from a different
    /// traversal or a tampered one fails instead of silently returning
    /// wrong nodes.
    pub fn traverse_bounded(
        &self,
        start: Element,
        max_depth: u32,
        label: Option<&Element>,
        direction: Direction,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<BoundedPage, TraverseError> {
        let skip = match cursor {
            Some(cursor) => Some(decode_cursor(cursor)?),
            None => None,
        };

        let options = BfsOptions {
            max_depth,
            label: label.cloned(),
            direction,
            ..BfsOptions::default()
        };
        let full = self.bfs(start, &options, None)?;

        let offset = match skip {
            Some((depth, count, last_key)) => {
                let checkpoint = full
                    .visits
                    .get(count.checked_sub(1).ok_or(TraverseError::InvalidCursor)?)
                    .ok_or(TraverseError::InvalidCursor)?;
                if checkpoint.depth != depth || tuple::pack(std::slice::from_ref(&checkpoint.node)) != last_key {
                    return Err(TraverseError::InvalidCursor);
                }
                count
            }
            None => 0,
        };

        let page: Vec<Visit> = full.visits.iter().skip(offset).take(limit).cloned().collect();
        let consumed = offset + page.len();
        let complete = consumed >= full.visits.len();
        let cursor = if complete {
            None
        } else {
            let last = page.last().ok_or(TraverseError::InvalidCursor)?;
            Some(encode_cursor(last.depth, consumed, &last.node))
        };
        Ok(BoundedPage {
            visits: page,
            cursor,
            complete,
        })
    }
}

fn encode_cursor(depth: u32, visited: usize, node: &Element) -> String {
    let packed = tuple::pack(&[
        Element::I64(depth as i64),
        Element::I64(visited as i64),
        Element::Bytes(tuple::pack(std::slice::from_ref(node))),
    ]);
    base64::encode_config(packed, base64::URL_SAFE_NO_PAD)
}

fn decode_cursor(cursor: &str) -> Result<(u32, usize, Vec<u8>), TraverseError> {
    let bytes = base64::decode_config(cursor, base64::URL_SAFE_NO_PAD)
        .map_err(|_| TraverseError::InvalidCursor)?;
    let elements = tuple::unpack(&bytes).map_err(|_| TraverseError::InvalidCursor)?;
    match elements.as_slice() {
        [Element::I64(depth), Element::I64(visited), Element::Bytes(last_key)]
            if *depth >= 0 && *visited > 0 =>
        {
            Ok((*depth as u32, *visited as usize, last_key.clone()))
        }
        _ => Err(TraverseError::InvalidCursor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Strategy;
    use crate::record::MapRecord;
    use crate::store::MemStore;
    use crate::tuple::Subspace;

    fn chain_index() -> GraphIndex {
        GraphIndex::new(
            "chain",
            Subspace::from_elements(&[Element::from("g")]),
            Strategy::Hexastore,
            "from",
            Some("label".into()),
            "to",
        )
    }

    fn seed(store: &MemStore, index: &GraphIndex, edges: &[(&str, &str)]) {
        let mut tx = store.begin();
        for (from, to) in edges {
            let record = MapRecord::new("Edge")
                .with("from", *from)
                .with("label", "next")
                .with("to", *to);
            index.update(None, Some(&record), &mut tx).unwrap();
        }
        store.commit(tx).unwrap();
    }

    fn visit(depth: u32, node: &str) -> Visit {
        Visit {
            depth,
            node: Element::from(node),
        }
    }

    #[test]
    fn bfs_emits_level_order_within_depth() {
        let store = MemStore::new();
        let index = chain_index();
        seed(
            &store,
            &index,
            &[("A", "B"), ("B", "C"), ("C", "D"), ("D", "E")],
        );
        let traverser = Traverser::new(&store, &index);
        let result = traverser
            .bfs(
                Element::from("A"),
                &BfsOptions {
                    max_depth: 2,
                    max_nodes: 100,
                    ..BfsOptions::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(
            result.visits,
            vec![visit(0, "A"), visit(1, "B"), visit(2, "C")]
        );
        assert!(result.complete);
    }

    #[test]
    fn bfs_respects_the_node_budget() {
        let store = MemStore::new();
        let index = chain_index();
        seed(
            &store,
            &index,
            &[("A", "B"), ("A", "C"), ("A", "D"), ("A", "E")],
        );
        let traverser = Traverser::new(&store, &index);
        let result = traverser
            .bfs(
                Element::from("A"),
                &BfsOptions {
                    max_depth: 10,
                    max_nodes: 3,
                    ..BfsOptions::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(result.visits.len(), 3);
        assert!(!result.complete);
    }

    #[test]
    fn bfs_handles_cycles_and_small_batches() {
        let store = MemStore::new();
        let index = chain_index();
        seed(
            &store,
            &index,
            &[("A", "B"), ("B", "C"), ("C", "A"), ("B", "D")],
        );
        // batch size 1 forces several transactions per level
        let traverser = Traverser::new(&store, &index).with_batch_size(1);
        let result = traverser
            .bfs(Element::from("A"), &BfsOptions::default(), None)
            .unwrap();
        let nodes: Vec<&Element> = result.visits.iter().map(|v| &v.node).collect();
        assert_eq!(nodes.len(), 4);
        assert!(result.complete);
    }

    #[test]
    fn bfs_follows_incoming_edges() {
        let store = MemStore::new();
        let index = chain_index();
        seed(&store, &index, &[("A", "B"), ("C", "B")]);
        let traverser = Traverser::new(&store, &index);
        let result = traverser
            .bfs(
                Element::from("B"),
                &BfsOptions {
                    direction: Direction::Incoming,
                    ..BfsOptions::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(result.visits.len(), 3);
        assert_eq!(result.visits[0], visit(0, "B"));
    }

    #[test]
    fn cancellation_returns_partial_progress() {
        let store = MemStore::new();
        let index = chain_index();
        seed(&store, &index, &[("A", "B"), ("B", "C")]);
        let traverser = Traverser::new(&store, &index);
        let token = CancellationToken::new();
        token.cancel();
        let result = traverser
            .bfs(Element::from("A"), &BfsOptions::default(), Some(&token))
            .unwrap();
        assert_eq!(result.visits, vec![visit(0, "A")]);
        assert!(!result.complete);
    }

    #[test]
    fn bounded_traversal_resumes_from_its_cursor() {
        let store = MemStore::new();
        let index = chain_index();
        seed(
            &store,
            &index,
            &[("A", "B"), ("B", "C"), ("C", "D"), ("D", "E")],
        );
        let traverser = Traverser::new(&store, &index);

        let first = traverser
            .traverse_bounded(
                Element::from("A"),
                10,
                None,
                Direction::Outgoing,
                2,
                None,
            )
            .unwrap();
        assert_eq!(first.visits, vec![visit(0, "A"), visit(1, "B")]);
        assert!(!first.complete);
        let cursor = first.cursor.unwrap();

        let second = traverser
            .traverse_bounded(
                Element::from("A"),
                10,
                None,
                Direction::Outgoing,
                10,
                Some(&cursor),
            )
            .unwrap();
        assert_eq!(
            second.visits,
            vec![visit(2, "C"), visit(3, "D"), visit(4, "E")]
        );
        assert!(second.complete);
        assert!(second.cursor.is_none());
    }

    #[test]
    fn tampered_cursors_are_rejected() {
        let store = MemStore::new();
        let index = chain_index();
        seed(&store, &index, &[("A", "B")]);
        let traverser = Traverser::new(&store, &index);
        let err = traverser
            .traverse_bounded(
                Element::from("A"),
                10,
                None,
                Direction::Outgoing,
                2,
                Some("bm90LWEtY3Vyc29y"),
            )
            .unwrap_err();
        assert!(matches!(err, TraverseError::InvalidCursor));

        // a cursor from a different traversal shape fails the checkpoint
        let foreign = encode_cursor(3, 1, &Element::from("Z"));
        let err = traverser
            .traverse_bounded(
                Element::from("A"),
                10,
                None,
                Direction::Outgoing,
                2,
                Some(&foreign),
            )
            .unwrap_err();
        assert!(matches!(err, TraverseError::InvalidCursor));
    }
}
