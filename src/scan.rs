use crate::index::{Edge, GraphIndex, IndexError, Ordering, Strategy};
use crate::store::StoreTransaction;
use crate::tuple::Element;
use fnv::FnvHashSet;
use std::collections::BTreeMap;

/// Which side of an edge a node id is matched against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Follow edges away from the node.
    Outgoing,
    /// Follow edges into the node.
    Incoming,
}

/// Batch size at which a wildcard-label batch scan switches from per-id
/// prefix scans to one full subspace scan with a hash set filter.
pub const BATCH_FULL_SCAN_THRESHOLD: usize = 64;

/// A partial edge pattern. `None` is a wildcard; a bound value matches
/// exactly, the empty string included.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Pattern {
    /// The source slot.
    pub from: Option<Element>,
    /// The label slot.
    pub edge: Option<Element>,
    /// The target slot.
    pub to: Option<Element>,
}

impl Pattern {
    /// A fully wildcarded pattern.
    pub fn any() -> Self {
        Self::default()
    }

    /// Creates a pattern from optional slots.
    pub fn new(from: Option<Element>, edge: Option<Element>, to: Option<Element>) -> Self {
        Self { from, edge, to }
    }

    /// Binds the source slot.
    pub fn from(mut self, from: impl Into<Element>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Binds the label slot.
    pub fn edge(mut self, edge: impl Into<Element>) -> Self {
        self.edge = Some(edge.into());
        self
    }

    /// Binds the target slot.
    pub fn to(mut self, to: impl Into<Element>) -> Self {
        self.to = Some(to.into());
        self
    }

    fn slot(&self, role: SlotRole) -> Option<&Element> {
        match role {
            SlotRole::From => self.from.as_ref(),
            SlotRole::Edge => self.edge.as_ref(),
            SlotRole::To => self.to.as_ref(),
        }
    }

    /// Returns true if the edge matches every bound slot.
    pub fn matches(&self, edge: &Edge) -> bool {
        self.from.as_ref().map_or(true, |v| *v == edge.from)
            && self.edge.as_ref().map_or(true, |v| *v == edge.edge)
            && self.to.as_ref().map_or(true, |v| *v == edge.to)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SlotRole {
    From,
    Edge,
    To,
}

fn slot_roles(ordering: Ordering) -> [SlotRole; 3] {
    match ordering {
        Ordering::Out | Ordering::Pso => [SlotRole::Edge, SlotRole::From, SlotRole::To],
        Ordering::In | Ordering::Pos => [SlotRole::Edge, SlotRole::To, SlotRole::From],
        Ordering::Spo => [SlotRole::From, SlotRole::Edge, SlotRole::To],
        Ordering::Osp => [SlotRole::To, SlotRole::From, SlotRole::Edge],
        Ordering::Sop => [SlotRole::From, SlotRole::To, SlotRole::Edge],
        Ordering::Ops => [SlotRole::To, SlotRole::Edge, SlotRole::From],
    }
}

/// How a pattern will be executed: which ordering, how much of the key is
/// a range prefix, and whether bound slots are left to post-filtering.
///
/// `post_filter` is the explicit marker of the known slow path: the
/// adjacency layout cannot serve some shapes by prefix and degrades to
/// scanning the ordering's whole subspace. Callers that care can inspect
/// the plan before scanning; nothing degrades silently.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanPlan {
    /// The ordering whose subspace is scanned.
    pub ordering: Ordering,
    /// Bound key slots usable as the range prefix.
    pub bound_prefix: usize,
    /// Bound slots that must be checked row by row after decoding.
    pub post_filter: bool,
}

impl ScanPlan {
    /// Picks the ordering for a pattern under a strategy. The mapping is
    /// fixed; it is part of the read path contract.
    pub fn select(pattern: &Pattern, strategy: Strategy) -> ScanPlan {
        let shape = (
            pattern.from.is_some(),
            pattern.edge.is_some(),
            pattern.to.is_some(),
        );
        let ordering = match strategy {
            Strategy::Adjacency => match shape {
                (false, true, true) | (false, false, true) => Ordering::In,
                _ => Ordering::Out,
            },
            Strategy::TripleStore => match shape {
                (true, false, true) | (false, false, true) => Ordering::Osp,
                (false, true, _) => Ordering::Pos,
                _ => Ordering::Spo,
            },
            Strategy::Hexastore => match shape {
                (true, false, true) => Ordering::Sop,
                (false, true, true) => Ordering::Pos,
                (false, true, false) => Ordering::Pso,
                (false, false, true) => Ordering::Osp,
                _ => Ordering::Spo,
            },
        };
        let roles = slot_roles(ordering);
        let mut bound_prefix = 0;
        for role in roles {
            if pattern.slot(role).is_some() {
                bound_prefix += 1;
            } else {
                break;
            }
        }
        let post_filter = roles[bound_prefix..]
            .iter()
            .any(|role| pattern.slot(*role).is_some());
        ScanPlan {
            ordering,
            bound_prefix,
            post_filter,
        }
    }
}

/// Streams the edges matching a pattern out of a [`GraphIndex`].
#[derive(Clone, Copy, Debug)]
pub struct EdgeScanner<'a> {
    index: &'a GraphIndex,
}

impl<'a> EdgeScanner<'a> {
    /// Creates a scanner over an index.
    pub fn new(index: &'a GraphIndex) -> Self {
        Self { index }
    }

    /// The plan a pattern would execute with.
    pub fn plan(&self, pattern: &Pattern) -> ScanPlan {
        ScanPlan::select(pattern, self.index.strategy())
    }

    /// Scans the edges matching the pattern, in the store's key order for
    /// the chosen ordering. The stream is lazy; the consumer drives the
    /// underlying range read.
    pub fn scan<'t, T: StoreTransaction>(
        &self,
        pattern: &Pattern,
        tx: &'t T,
        snapshot: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<Edge, IndexError>> + 't>, IndexError>
    where
        'a: 't,
    {
        let plan = self.plan(pattern);
        let roles = slot_roles(plan.ordering);
        let mut prefix = vec![Element::I64(plan.ordering.id())];
        for role in &roles[..plan.bound_prefix] {
            prefix.push(pattern.slot(*role).expect("bound slot").clone());
        }
        let (begin, end) = self.index.subspace().range_of(&prefix);
        let index = self.index;
        let pattern = pattern.clone();
        let rows = tx.get_range(&begin, &end, snapshot)?;
        Ok(Box::new(rows.filter_map(move |row| {
            let (key, _) = match row {
                Ok(row) => row,
                Err(err) => return Some(Err(err.into())),
            };
            let (_, edge) = match index.decode_key(&key) {
                Ok(decoded) => decoded,
                Err(err) => return Some(Err(err)),
            };
            pattern.matches(&edge).then(|| Ok(edge))
        })))
    }

    /// Collects the matching edges, a convenience over [`scan`].
    ///
    /// [`scan`]: EdgeScanner::scan
    pub fn collect<T: StoreTransaction>(
        &self,
        pattern: &Pattern,
        tx: &T,
        snapshot: bool,
    ) -> Result<Vec<Edge>, IndexError> {
        self.scan(pattern, tx, snapshot)?.collect()
    }

    /// Scans the edges of many nodes at once.
    ///
    /// With a bound label this issues one prefix scan per id and
    /// concatenates the outputs in the caller's id order. With a wildcard
    /// label and at least [`BATCH_FULL_SCAN_THRESHOLD`] ids one full
    /// subspace scan with a hash set filter is cheaper; results are still
    /// grouped deterministically by the caller's id order.
    pub fn scan_batch<T: StoreTransaction>(
        &self,
        ids: &[Element],
        label: Option<&Element>,
        direction: Direction,
        tx: &T,
        snapshot: bool,
    ) -> Result<Vec<Edge>, IndexError> {
        let pattern_for = |id: &Element| {
            let mut pattern = Pattern::any();
            match direction {
                Direction::Outgoing => pattern.from = Some(id.clone()),
                Direction::Incoming => pattern.to = Some(id.clone()),
            }
            pattern.edge = label.cloned();
            pattern
        };

        if label.is_none() && ids.len() >= BATCH_FULL_SCAN_THRESHOLD {
            let wanted: FnvHashSet<&Element> = ids.iter().collect();
            let mut by_id: BTreeMap<usize, Vec<Edge>> = BTreeMap::new();
            let positions: BTreeMap<&Element, usize> = ids
                .iter()
                .enumerate()
                .map(|(position, id)| (id, position))
                .collect();
            for row in self.scan(&Pattern::any(), tx, snapshot)? {
                let edge = row?;
                let node = match direction {
                    Direction::Outgoing => &edge.from,
                    Direction::Incoming => &edge.to,
                };
                if wanted.contains(node) {
                    by_id
                        .entry(positions[node])
                        .or_default()
                        .push(edge);
                }
            }
            return Ok(by_id.into_values().flatten().collect());
        }

        let mut out = Vec::new();
        for id in ids {
            out.extend(self.collect(&pattern_for(id), tx, snapshot)?);
        }
        Ok(out)
    }
}
