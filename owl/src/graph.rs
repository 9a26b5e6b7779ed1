use crate::expr::{ClassExpression, Literal};
use crate::hierarchy::RoleHierarchy;
use crate::iri::Iri;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Identifier of a completion graph node.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of a choice point.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChoicePointId(u32);

/// Which of the four processed sets a flag belongs to.
///
/// Processed flags only suppress re-firing of rules on a monotonically
/// growing label set. They are hints, never soundness critical, and they
/// are cleared wholesale when labels stop growing monotonically (merge).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ProcessedKind {
    /// The ⊓ rule fired on the concept.
    Intersections,
    /// The ⊔ rule fired on the concept.
    Unions,
    /// A generating rule fired on the concept.
    Existentials,
    /// The ∀ rule fired on the concept.
    Universals,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ProcessedSets {
    intersections: BTreeSet<ClassExpression>,
    unions: BTreeSet<ClassExpression>,
    existentials: BTreeSet<ClassExpression>,
    universals: BTreeSet<ClassExpression>,
}

impl ProcessedSets {
    fn set(&mut self, kind: ProcessedKind) -> &mut BTreeSet<ClassExpression> {
        match kind {
            ProcessedKind::Intersections => &mut self.intersections,
            ProcessedKind::Unions => &mut self.unions,
            ProcessedKind::Existentials => &mut self.existentials,
            ProcessedKind::Universals => &mut self.universals,
        }
    }

    fn get(&self, kind: ProcessedKind) -> &BTreeSet<ClassExpression> {
        match kind {
            ProcessedKind::Intersections => &self.intersections,
            ProcessedKind::Unions => &self.unions,
            ProcessedKind::Existentials => &self.existentials,
            ProcessedKind::Universals => &self.universals,
        }
    }

    fn clear(&mut self) {
        self.intersections.clear();
        self.unions.clear();
        self.existentials.clear();
        self.universals.clear();
    }
}

/// A node of the completion graph.
///
/// Nodes hold ids only, never references to other nodes; the graph owns
/// the arena and all adjacency is resolved through it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    id: NodeId,
    concepts: BTreeSet<ClassExpression>,
    out_edges: BTreeMap<Iri, BTreeSet<NodeId>>,
    in_edges: BTreeMap<Iri, BTreeSet<NodeId>>,
    data_values: BTreeMap<Iri, BTreeSet<Literal>>,
    parent: Option<NodeId>,
    depth: u32,
    blocked_by: Option<NodeId>,
    nominal: Option<Iri>,
    processed: ProcessedSets,
}

impl Node {
    /// The node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The label set `L(x)`.
    pub fn concepts(&self) -> &BTreeSet<ClassExpression> {
        &self.concepts
    }

    /// Outgoing edges by role.
    pub fn out_edges(&self) -> &BTreeMap<Iri, BTreeSet<NodeId>> {
        &self.out_edges
    }

    /// Incoming edges by role.
    pub fn in_edges(&self) -> &BTreeMap<Iri, BTreeSet<NodeId>> {
        &self.in_edges
    }

    /// Data values by data property.
    pub fn data_values(&self) -> &BTreeMap<Iri, BTreeSet<Literal>> {
        &self.data_values
    }

    /// The parent node, if the node was generated.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Distance from the root of the node's tree.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The blocking ancestor, if the node is blocked.
    pub fn blocked_by(&self) -> Option<NodeId> {
        self.blocked_by
    }

    /// Returns true if the node is blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked_by.is_some()
    }

    /// The individual this node stands for, if it is a nominal node.
    pub fn nominal(&self) -> Option<&Iri> {
        self.nominal.as_ref()
    }

    /// Returns true if the concept is in the label.
    pub fn has_concept(&self, concept: &ClassExpression) -> bool {
        self.concepts.contains(concept)
    }

    /// Returns true if the concept was marked processed in the given set.
    pub fn is_processed(&self, kind: ProcessedKind, concept: &ClassExpression) -> bool {
        self.processed.get(kind).contains(concept)
    }

    fn out_roles(&self) -> BTreeSet<&Iri> {
        self.out_edges
            .iter()
            .filter(|(_, targets)| !targets.is_empty())
            .map(|(role, _)| role)
            .collect()
    }
}

/// One alternative of a choice point.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Alternative {
    /// Add a concept to the node (⊔ rule).
    Concept(ClassExpression),
    /// Merge the node into the nominal of the individual (oneOf rule).
    MergeInto(Iri),
}

/// A backtracking point with its remaining alternatives.
#[derive(Clone, Debug)]
pub struct ChoicePoint {
    id: ChoicePointId,
    trail_position: usize,
    node: NodeId,
    expression: ClassExpression,
    alternatives: Vec<Alternative>,
    current: usize,
}

impl ChoicePoint {
    /// The node the choice applies to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The expression that forced the choice.
    pub fn expression(&self) -> &ClassExpression {
        &self.expression
    }
}

/// State to recreate a merged-away node and roll the survivor back.
#[derive(Debug)]
struct MergeUndo {
    survivor: NodeId,
    merged_node: Node,
    added_concepts: Vec<ClassExpression>,
    added_out_edges: Vec<(Iri, NodeId)>,
    added_in_edges: Vec<(Iri, NodeId)>,
    added_data: Vec<(Iri, Literal)>,
    survivor_processed: ProcessedSets,
}

/// One undoable mutation.
#[derive(Debug)]
enum TrailEntry {
    ConceptAdded(NodeId, ClassExpression),
    EdgeAdded(NodeId, Iri, NodeId),
    NodeCreated(NodeId),
    Merged(Box<MergeUndo>),
    Blocked(NodeId, NodeId),
    Unblocked(NodeId, NodeId),
    DataValueAdded(NodeId, Iri, Literal),
    ProcessedAdded(NodeId, ProcessedKind, ClassExpression),
    ChoiceMarker(ChoicePointId),
}

/// The completion graph of one tableaux run.
///
/// A forest of labeled nodes plus the machinery that makes the
/// nondeterministic procedure work: an append-only trail of every
/// backtrackable mutation and a LIFO stack of choice points. The graph is
/// exclusive to one tableaux invocation and is never shared across
/// threads.
pub struct CompletionGraph {
    nodes: Vec<Option<Node>>,
    nominals: BTreeMap<Iri, NodeId>,
    trail: Vec<TrailEntry>,
    choice_points: Vec<ChoicePoint>,
    next_choice_id: u32,
    roles: Arc<RoleHierarchy>,
}

impl std::fmt::Debug for CompletionGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut m = f.debug_map();
        for node in self.iter() {
            m.entry(&node.id, &node.concepts);
        }
        m.finish()
    }
}

impl CompletionGraph {
    /// Creates an empty graph over the given role hierarchy.
    pub fn new(roles: Arc<RoleHierarchy>) -> Self {
        Self {
            nodes: Vec::new(),
            nominals: BTreeMap::new(),
            trail: Vec::new(),
            choice_points: Vec::new(),
            next_choice_id: 0,
            roles,
        }
    }

    /// The role hierarchy the graph resolves edges against.
    pub fn roles(&self) -> &Arc<RoleHierarchy> {
        &self.roles
    }

    /// Live nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(|slot| slot.as_ref())
    }

    /// Ids of live nodes in id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.iter().map(|n| n.id).collect()
    }

    /// Looks up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.index()].as_mut().expect("live node")
    }

    /// Current trail length, usable as a restore position.
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    /// Number of open choice points.
    pub fn choice_point_count(&self) -> usize {
        self.choice_points.len()
    }

    /// The nominal node registered for an individual, if any.
    pub fn nominal_node(&self, individual: &Iri) -> Option<NodeId> {
        self.nominals.get(individual).copied()
    }

    /// Creates a fresh anonymous node, optionally as a child of `parent`.
    pub fn create_node(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let depth = parent
            .and_then(|p| self.node(p))
            .map(|p| p.depth + 1)
            .unwrap_or(0);
        self.nodes.push(Some(Node {
            id,
            concepts: BTreeSet::new(),
            out_edges: BTreeMap::new(),
            in_edges: BTreeMap::new(),
            data_values: BTreeMap::new(),
            parent,
            depth,
            blocked_by: None,
            nominal: None,
            processed: ProcessedSets::default(),
        }));
        self.trail.push(TrailEntry::NodeCreated(id));
        id
    }

    /// Returns the nominal node for an individual, creating it on first
    /// use. Nominal nodes are roots and are never blocked.
    pub fn get_or_create_nominal(&mut self, individual: &Iri) -> NodeId {
        if let Some(id) = self.nominals.get(individual) {
            return *id;
        }
        let id = self.create_node(None);
        self.node_mut(id).nominal = Some(individual.clone());
        self.nominals.insert(individual.clone(), id);
        id
    }

    /// Adds a concept to a node's label. Returns true if it was new.
    pub fn add_concept(&mut self, node: NodeId, concept: ClassExpression) -> bool {
        if self.node_mut(node).concepts.insert(concept.clone()) {
            self.trail.push(TrailEntry::ConceptAdded(node, concept));
            true
        } else {
            false
        }
    }

    /// Adds a data value to a node. Returns true if it was new.
    pub fn add_data_value(&mut self, node: NodeId, property: Iri, value: Literal) -> bool {
        let inserted = self
            .node_mut(node)
            .data_values
            .entry(property.clone())
            .or_default()
            .insert(value.clone());
        if inserted {
            self.trail
                .push(TrailEntry::DataValueAdded(node, property, value));
        }
        inserted
    }

    /// Marks a concept processed at a node. Returns true if it was new.
    pub fn mark_processed(
        &mut self,
        node: NodeId,
        kind: ProcessedKind,
        concept: ClassExpression,
    ) -> bool {
        if self
            .node_mut(node)
            .processed
            .set(kind)
            .insert(concept.clone())
        {
            self.trail
                .push(TrailEntry::ProcessedAdded(node, kind, concept));
            true
        } else {
            false
        }
    }

    /// Adds an edge `(from, role, to)` and the edges the role's
    /// characteristics force: the symmetric reverse edge, the declared
    /// inverse, and self loops for reflexive roles. Every added edge gets
    /// its own trail entry. Returns true if the primary edge was new.
    pub fn add_edge(&mut self, from: NodeId, role: &Iri, to: NodeId) -> bool {
        if self.has_edge(from, role, to) {
            return false;
        }
        self.insert_edge_halves(from, role, to);
        self.trail
            .push(TrailEntry::EdgeAdded(from, role.clone(), to));

        let characteristics = self.roles.characteristics(role);
        let inverse = self.roles.inverse(role).cloned();
        if characteristics.symmetric {
            self.add_edge(to, role, from);
        }
        if let Some(inverse) = inverse {
            self.add_edge(to, &inverse, from);
        }
        if characteristics.reflexive {
            self.add_edge(from, role, from);
            self.add_edge(to, role, to);
        }
        true
    }

    /// Returns true if the exact edge is present.
    pub fn has_edge(&self, from: NodeId, role: &Iri, to: NodeId) -> bool {
        self.node(from)
            .and_then(|n| n.out_edges.get(role))
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    fn insert_edge_halves(&mut self, from: NodeId, role: &Iri, to: NodeId) -> bool {
        let inserted = self
            .node_mut(from)
            .out_edges
            .entry(role.clone())
            .or_default()
            .insert(to);
        if inserted {
            self.node_mut(to)
                .in_edges
                .entry(role.clone())
                .or_default()
                .insert(from);
        }
        inserted
    }

    fn remove_edge_halves(&mut self, from: NodeId, role: &Iri, to: NodeId) {
        if let Some(node) = self.nodes[from.index()].as_mut() {
            if let Some(targets) = node.out_edges.get_mut(role) {
                targets.remove(&to);
                if targets.is_empty() {
                    node.out_edges.remove(role);
                }
            }
        }
        if let Some(node) = self.nodes[to.index()].as_mut() {
            if let Some(sources) = node.in_edges.get_mut(role) {
                sources.remove(&from);
                if sources.is_empty() {
                    node.in_edges.remove(role);
                }
            }
        }
    }

    /// All `role` successors of a node, reached through sub roles or
    /// through incoming edges of a declared inverse.
    pub fn successors(&self, node: NodeId, role: &Iri) -> BTreeSet<NodeId> {
        let mut out = BTreeSet::new();
        let Some(n) = self.node(node) else {
            return out;
        };
        for sub in self.roles.sub_roles(role) {
            if let Some(targets) = n.out_edges.get(&sub) {
                out.extend(targets.iter().copied());
            }
            if let Some(inverse) = self.roles.inverse(&sub) {
                if let Some(sources) = n.in_edges.get(inverse) {
                    out.extend(sources.iter().copied());
                }
            }
        }
        out
    }

    /// All `role` predecessors of a node, the mirror of [`successors`].
    ///
    /// [`successors`]: CompletionGraph::successors
    pub fn predecessors(&self, node: NodeId, role: &Iri) -> BTreeSet<NodeId> {
        let mut out = BTreeSet::new();
        let Some(n) = self.node(node) else {
            return out;
        };
        for sub in self.roles.sub_roles(role) {
            if let Some(sources) = n.in_edges.get(&sub) {
                out.extend(sources.iter().copied());
            }
            if let Some(inverse) = self.roles.inverse(&sub) {
                if let Some(targets) = n.out_edges.get(inverse) {
                    out.extend(targets.iter().copied());
                }
            }
        }
        out
    }

    /// Merges `merged` into `survivor`.
    ///
    /// Concepts, edges and data values move to the survivor; the merged
    /// node leaves the node set (and the nominal set when it was a
    /// nominal). The survivor's processed flags are cleared because the
    /// merged-in concepts can re-enable rules that were already marked
    /// done. A single trail entry carries everything needed to restore
    /// both nodes.
    pub fn merge_nodes(&mut self, survivor: NodeId, merged: NodeId) {
        assert_ne!(survivor, merged, "cannot merge a node into itself");
        let merged_node = self.nodes[merged.index()]
            .as_ref()
            .expect("live node")
            .clone();
        let survivor_processed = self.node(survivor).expect("live node").processed.clone();

        let mut added_concepts = Vec::new();
        for concept in &merged_node.concepts {
            if self.node_mut(survivor).concepts.insert(concept.clone()) {
                added_concepts.push(concept.clone());
            }
        }

        // detach merged from its neighbors before rewriting
        for (role, targets) in &merged_node.out_edges {
            for target in targets {
                if *target != merged {
                    self.remove_edge_halves(merged, role, *target);
                }
            }
        }
        for (role, sources) in &merged_node.in_edges {
            for source in sources {
                if *source != merged {
                    self.remove_edge_halves(*source, role, merged);
                }
            }
        }

        // rewrite every incident edge onto the survivor
        let mut added_out_edges = Vec::new();
        for (role, targets) in &merged_node.out_edges {
            for target in targets {
                let target = if *target == merged { survivor } else { *target };
                if self.insert_edge_halves(survivor, role, target) {
                    added_out_edges.push((role.clone(), target));
                }
            }
        }
        let mut added_in_edges = Vec::new();
        for (role, sources) in &merged_node.in_edges {
            for source in sources {
                if *source == merged {
                    // the self loop was rewritten by the pass above
                    continue;
                }
                if self.insert_edge_halves(*source, role, survivor) {
                    added_in_edges.push((role.clone(), *source));
                }
            }
        }

        let mut added_data = Vec::new();
        for (property, values) in &merged_node.data_values {
            for value in values {
                if self
                    .node_mut(survivor)
                    .data_values
                    .entry(property.clone())
                    .or_default()
                    .insert(value.clone())
                {
                    added_data.push((property.clone(), value.clone()));
                }
            }
        }

        if let Some(individual) = &merged_node.nominal {
            self.nominals.remove(individual);
        }
        self.nodes[merged.index()] = None;
        self.node_mut(survivor).processed.clear();

        self.trail.push(TrailEntry::Merged(Box::new(MergeUndo {
            survivor,
            merged_node,
            added_concepts,
            added_out_edges,
            added_in_edges,
            added_data,
            survivor_processed,
        })));
    }

    /// Recomputes blocking from scratch: every node is unblocked, then
    /// non-nominal nodes are checked deepest first against their
    /// ancestors. `x` is blocked by ancestor `y` when `L(x) ⊆ L(y)` and
    /// every role with an outgoing edge at `x` also has one at `y`
    /// (pairwise blocking). Both the unblock and block actions are
    /// trailed so backtracking restores the earlier blocking state.
    pub fn update_blocking(&mut self) {
        let ids = self.node_ids();
        for id in &ids {
            if let Some(blocker) = self.node(*id).and_then(|n| n.blocked_by) {
                self.node_mut(*id).blocked_by = None;
                self.trail.push(TrailEntry::Unblocked(*id, blocker));
            }
        }

        let mut by_depth = ids;
        by_depth.sort_by_key(|id| std::cmp::Reverse(self.node(*id).map(|n| n.depth).unwrap_or(0)));

        for id in by_depth {
            let Some(node) = self.node(id) else { continue };
            if node.nominal.is_some() {
                continue;
            }
            let concepts = node.concepts.clone();
            let out_roles: BTreeSet<Iri> =
                node.out_roles().into_iter().cloned().collect();
            let mut ancestor = node.parent;
            while let Some(candidate_id) = ancestor {
                let Some(candidate) = self.node(candidate_id) else {
                    break;
                };
                let label_subset = concepts.is_subset(&candidate.concepts);
                let roles_subset = out_roles
                    .iter()
                    .all(|role| candidate.out_edges.get(role).map_or(false, |t| !t.is_empty()));
                if label_subset && roles_subset {
                    self.node_mut(id).blocked_by = Some(candidate_id);
                    self.trail.push(TrailEntry::Blocked(id, candidate_id));
                    break;
                }
                ancestor = candidate.parent;
            }
        }
    }

    /// Opens a choice point over the given alternatives and returns its
    /// id. The first alternative is applied by the caller; the rest are
    /// reached through [`backtrack`].
    ///
    /// [`backtrack`]: CompletionGraph::backtrack
    pub fn create_choice_point(
        &mut self,
        node: NodeId,
        expression: ClassExpression,
        alternatives: Vec<Alternative>,
    ) -> ChoicePointId {
        let id = ChoicePointId(self.next_choice_id);
        self.next_choice_id += 1;
        let trail_position = self.trail.len();
        self.trail.push(TrailEntry::ChoiceMarker(id));
        self.choice_points.push(ChoicePoint {
            id,
            trail_position,
            node,
            expression,
            alternatives,
            current: 0,
        });
        id
    }

    /// Pops choice points until one with an untried alternative is found,
    /// undoes the trail back to it, re-opens it advanced by one and
    /// returns the node together with the next alternative to apply.
    /// Returns `None` when no choice remains.
    pub fn backtrack(&mut self) -> Option<(NodeId, Alternative)> {
        while let Some(cp) = self.choice_points.pop() {
            let next = cp.current + 1;
            if next < cp.alternatives.len() {
                self.undo_to(cp.trail_position);
                let alternative = cp.alternatives[next].clone();
                let trail_position = self.trail.len();
                self.trail.push(TrailEntry::ChoiceMarker(cp.id));
                self.choice_points.push(ChoicePoint {
                    trail_position,
                    current: next,
                    ..cp
                });
                return Some((self.choice_points.last().unwrap().node, alternative));
            }
            tracing::trace!(choice = ?cp.id, "choice point exhausted");
        }
        None
    }

    /// Undoes trail entries until the trail is `position` long.
    pub fn undo_to(&mut self, position: usize) {
        while self.trail.len() > position {
            let entry = self.trail.pop().unwrap();
            self.undo(entry);
        }
    }

    fn undo(&mut self, entry: TrailEntry) {
        match entry {
            TrailEntry::ConceptAdded(node, concept) => {
                self.node_mut(node).concepts.remove(&concept);
            }
            TrailEntry::EdgeAdded(from, role, to) => {
                self.remove_edge_halves(from, &role, to);
            }
            TrailEntry::NodeCreated(id) => {
                if let Some(node) = self.nodes[id.index()].take() {
                    if let Some(individual) = node.nominal {
                        self.nominals.remove(&individual);
                    }
                }
            }
            TrailEntry::Merged(undo) => self.undo_merge(*undo),
            TrailEntry::Blocked(node, _) => {
                self.node_mut(node).blocked_by = None;
            }
            TrailEntry::Unblocked(node, blocker) => {
                self.node_mut(node).blocked_by = Some(blocker);
            }
            TrailEntry::DataValueAdded(node, property, value) => {
                let n = self.node_mut(node);
                if let Some(values) = n.data_values.get_mut(&property) {
                    values.remove(&value);
                    if values.is_empty() {
                        n.data_values.remove(&property);
                    }
                }
            }
            TrailEntry::ProcessedAdded(node, kind, concept) => {
                self.node_mut(node).processed.set(kind).remove(&concept);
            }
            TrailEntry::ChoiceMarker(_) => {}
        }
    }

    fn undo_merge(&mut self, undo: MergeUndo) {
        let MergeUndo {
            survivor,
            merged_node,
            added_concepts,
            added_out_edges,
            added_in_edges,
            added_data,
            survivor_processed,
        } = undo;
        let merged = merged_node.id;

        for concept in added_concepts {
            self.node_mut(survivor).concepts.remove(&concept);
        }
        for (role, target) in added_out_edges {
            self.remove_edge_halves(survivor, &role, target);
        }
        for (role, source) in added_in_edges {
            self.remove_edge_halves(source, &role, survivor);
        }
        for (property, value) in added_data {
            let n = self.node_mut(survivor);
            if let Some(values) = n.data_values.get_mut(&property) {
                values.remove(&value);
                if values.is_empty() {
                    n.data_values.remove(&property);
                }
            }
        }
        self.node_mut(survivor).processed = survivor_processed;

        // put the merged node back and reconnect its neighbors
        if let Some(individual) = &merged_node.nominal {
            self.nominals.insert(individual.clone(), merged);
        }
        let out_edges = merged_node.out_edges.clone();
        let in_edges = merged_node.in_edges.clone();
        self.nodes[merged.index()] = Some(merged_node);
        for (role, targets) in out_edges {
            for target in targets {
                if target != merged {
                    self.node_mut(target)
                        .in_edges
                        .entry(role.clone())
                        .or_default()
                        .insert(merged);
                }
            }
        }
        for (role, sources) in in_edges {
            for source in sources {
                if source != merged {
                    self.node_mut(source)
                        .out_edges
                        .entry(role.clone())
                        .or_default()
                        .insert(merged);
                }
            }
        }
    }

    /// Adds the missing closure edge for every `(x,r,y),(y,r,z)` pair of a
    /// transitive role. Returns true if any edge was added.
    pub fn expand_transitive_role(&mut self, role: &Iri) -> bool {
        let mut changed = false;
        loop {
            let mut missing = Vec::new();
            for node in self.iter() {
                let Some(targets) = node.out_edges.get(role) else {
                    continue;
                };
                for y in targets {
                    let Some(beyond) = self.node(*y).and_then(|n| n.out_edges.get(role)) else {
                        continue;
                    };
                    for z in beyond {
                        if *z != node.id && !self.has_edge(node.id, role, *z) {
                            missing.push((node.id, *z));
                        }
                    }
                }
            }
            if missing.is_empty() {
                break;
            }
            for (x, z) in missing {
                changed |= self.add_edge(x, role, z);
            }
        }
        changed
    }

    /// Enumerates every path matching the role chain and adds the implied
    /// edge from each path's start to its end. Returns true if any edge
    /// was added.
    pub fn apply_property_chain(&mut self, chain: &[Iri], implies: &Iri) -> bool {
        if chain.is_empty() {
            return false;
        }
        let mut missing = Vec::new();
        for start in self.node_ids() {
            let mut frontier = BTreeSet::new();
            frontier.insert(start);
            for role in chain {
                let mut next = BTreeSet::new();
                for node in &frontier {
                    next.extend(self.successors(*node, role));
                }
                frontier = next;
                if frontier.is_empty() {
                    break;
                }
            }
            for end in frontier {
                if !self.has_edge(start, implies, end) {
                    missing.push((start, end));
                }
            }
        }
        let mut changed = false;
        for (start, end) in missing {
            changed |= self.add_edge(start, implies, end);
        }
        changed
    }

    /// Snapshot of the live nodes, for equality checks in tests.
    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> (Vec<Node>, BTreeMap<Iri, NodeId>) {
        (self.iter().cloned().collect(), self.nominals.clone())
    }
}
