use crate::expr::ClassExpression;
use crate::graph::{Alternative, CompletionGraph, NodeId, ProcessedKind};
use crate::hierarchy::{ClassHierarchy, RoleHierarchy};
use crate::iri::Iri;
use std::collections::BTreeSet;

/// A contradiction found in the completion graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Clash {
    /// `owl:Nothing` or an empty enumeration in a label.
    Bottom(NodeId),
    /// A concept and its complement in one label.
    Complement(NodeId, ClassExpression),
    /// Two named classes the hierarchy marks disjoint.
    Disjoint(NodeId, Iri, Iri),
    /// `≥n` and `≤m` on the same role with `n > m`.
    Cardinality(NodeId, Iri),
    /// A functional role with more than one successor.
    Functional(NodeId, Iri),
    /// An irreflexive role with a self edge.
    Irreflexive(NodeId, Iri),
    /// An asymmetric role with edges both ways.
    Asymmetric(NodeId, Iri),
}

/// The expansion rules of the tableaux procedure.
///
/// Rules read the TBox constraints (already lowered to NNF disjunctions),
/// the class hierarchy for disjointness and the role hierarchy for role
/// resolution. All rules skip blocked nodes, and rules that would
/// otherwise refire forever on a growing label are guarded by the graph's
/// processed sets.
pub struct Rules<'a> {
    tbox: &'a [ClassExpression],
    classes: &'a ClassHierarchy,
    roles: &'a RoleHierarchy,
}

impl<'a> Rules<'a> {
    /// Creates the rule engine for one tableaux run.
    pub fn new(
        tbox: &'a [ClassExpression],
        classes: &'a ClassHierarchy,
        roles: &'a RoleHierarchy,
    ) -> Self {
        Self {
            tbox,
            classes,
            roles,
        }
    }

    /// Seeds a node with every TBox constraint.
    pub fn init_node(&self, graph: &mut CompletionGraph, node: NodeId) {
        for constraint in self.tbox {
            graph.add_concept(node, constraint.clone());
        }
    }

    /// Scans every node for a contradiction.
    pub fn detect_clash(&self, graph: &CompletionGraph) -> Option<Clash> {
        for node in graph.iter() {
            let id = node.id();
            let mut min_bounds: Vec<(u32, &Iri, &ClassExpression)> = Vec::new();
            let mut max_bounds: Vec<(u32, &Iri, &ClassExpression)> = Vec::new();

            for concept in node.concepts() {
                match concept {
                    ClassExpression::Nothing => return Some(Clash::Bottom(id)),
                    ClassExpression::OneOf(names) if names.is_empty() => {
                        return Some(Clash::Bottom(id))
                    }
                    ClassExpression::Not(inner) => {
                        if node.has_concept(inner) {
                            return Some(Clash::Complement(id, (**inner).clone()));
                        }
                    }
                    ClassExpression::MinCardinality(n, role, filler) => {
                        min_bounds.push((*n, role, filler));
                    }
                    ClassExpression::MaxCardinality(n, role, filler) => {
                        max_bounds.push((*n, role, filler));
                    }
                    _ => {}
                }
            }

            let named: Vec<&Iri> = node
                .concepts()
                .iter()
                .filter_map(|c| match c {
                    ClassExpression::Class(iri) => Some(iri),
                    _ => None,
                })
                .collect();
            for (i, a) in named.iter().enumerate() {
                for b in &named[i + 1..] {
                    if self.classes.are_disjoint(a, b) {
                        return Some(Clash::Disjoint(id, (*a).clone(), (*b).clone()));
                    }
                }
            }

            for (n, role, filler) in &min_bounds {
                for (m, max_role, max_filler) in &max_bounds {
                    let same_role = role == max_role;
                    let compatible = filler == max_filler
                        || **max_filler == ClassExpression::Thing;
                    if same_role && compatible && n > m {
                        return Some(Clash::Cardinality(id, (*role).clone()));
                    }
                }
            }

            for role in node.out_edges().keys() {
                let characteristics = self.roles.characteristics(role);
                if characteristics.irreflexive && graph.has_edge(id, role, id) {
                    return Some(Clash::Irreflexive(id, role.clone()));
                }
                if characteristics.asymmetric {
                    // a self edge clashes on its own, asymmetry entails
                    // irreflexivity
                    for target in &node.out_edges()[role] {
                        if graph.has_edge(*target, role, id) {
                            return Some(Clash::Asymmetric(id, role.clone()));
                        }
                    }
                }
                if characteristics.functional && graph.successors(id, role).len() > 1 {
                    return Some(Clash::Functional(id, role.clone()));
                }
            }
            for role in node.in_edges().keys() {
                // more than one subject pointing at one object is the
                // functional clash of the inverse direction
                if self.roles.characteristics(role).inverse_functional
                    && graph.predecessors(id, role).len() > 1
                {
                    return Some(Clash::Functional(id, role.clone()));
                }
            }
        }
        None
    }

    /// One pass of the deterministic rules: ⊓, ∀, domain and range, Self,
    /// ≤ merging and the data witness rule. Returns true if anything
    /// changed; callers run the pass to a fixed point.
    pub fn apply_deterministic(&self, graph: &mut CompletionGraph) -> bool {
        let mut changed = false;
        for id in graph.node_ids() {
            let Some(node) = graph.node(id) else { continue };
            if node.is_blocked() {
                continue;
            }
            let concepts: Vec<ClassExpression> = node.concepts().iter().cloned().collect();
            for concept in concepts {
                match &concept {
                    ClassExpression::And(conjuncts) => {
                        if node_processed(graph, id, ProcessedKind::Intersections, &concept) {
                            continue;
                        }
                        for conjunct in conjuncts {
                            changed |= graph.add_concept(id, conjunct.clone());
                        }
                        graph.mark_processed(id, ProcessedKind::Intersections, concept.clone());
                    }
                    ClassExpression::AllValues(role, filler) => {
                        // the flag records the firing; new successors still
                        // get the filler on later passes
                        graph.mark_processed(id, ProcessedKind::Universals, concept.clone());
                        for successor in graph.successors(id, role) {
                            changed |= graph.add_concept(successor, (**filler).clone());
                        }
                    }
                    ClassExpression::HasSelf(role) => {
                        changed |= graph.add_edge(id, role, id);
                    }
                    ClassExpression::MaxCardinality(n, role, filler) => {
                        let qualifying = self.qualifying_successors(graph, id, role, filler);
                        if qualifying.len() > *n as usize {
                            self.merge_excess(graph, &qualifying);
                            changed = true;
                            // a self successor can merge this node away
                            if graph.node(id).is_none() {
                                break;
                            }
                        }
                    }
                    ClassExpression::DataHasValue(property, value) => {
                        changed |= graph.add_data_value(id, property.clone(), value.clone());
                    }
                    ClassExpression::DataSomeValues(property, range) => {
                        let has_value = graph
                            .node(id)
                            .map(|n| n.data_values().contains_key(property))
                            .unwrap_or(false);
                        if !has_value {
                            match range.witness() {
                                Some(value) => {
                                    changed |=
                                        graph.add_data_value(id, property.clone(), value);
                                }
                                None => {
                                    // an empty range is unsatisfiable
                                    changed |= graph.add_concept(id, ClassExpression::Nothing);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }

            if graph.node(id).is_none() {
                continue;
            }
            // domain and range constraints of every role with an edge
            let out_roles: Vec<Iri> = graph
                .node(id)
                .map(|n| n.out_edges().keys().cloned().collect())
                .unwrap_or_default();
            for role in out_roles {
                let targets = graph
                    .node(id)
                    .and_then(|n| n.out_edges().get(&role).cloned())
                    .unwrap_or_default();
                for domain in self.roles.all_domains(&role) {
                    changed |= graph.add_concept(id, domain.nnf());
                }
                for range in self.roles.all_ranges(&role) {
                    for target in &targets {
                        changed |= graph.add_concept(*target, range.nnf());
                    }
                }
            }
        }
        changed
    }

    /// One pass of the generating rules: ∃, hasValue and ≥. Returns true
    /// if anything changed.
    pub fn apply_generating(&self, graph: &mut CompletionGraph) -> bool {
        let mut changed = false;
        for id in graph.node_ids() {
            let Some(node) = graph.node(id) else { continue };
            if node.is_blocked() {
                continue;
            }
            let concepts: Vec<ClassExpression> = node.concepts().iter().cloned().collect();
            for concept in concepts {
                match &concept {
                    ClassExpression::SomeValues(role, filler) => {
                        if node_processed(graph, id, ProcessedKind::Existentials, &concept) {
                            continue;
                        }
                        let satisfied = !self
                            .qualifying_successors(graph, id, role, filler)
                            .is_empty();
                        if !satisfied {
                            let fresh = graph.create_node(Some(id));
                            graph.add_concept(fresh, (**filler).clone());
                            self.init_node(graph, fresh);
                            graph.add_edge(id, role, fresh);
                            changed = true;
                        }
                        graph.mark_processed(id, ProcessedKind::Existentials, concept.clone());
                    }
                    ClassExpression::HasValue(role, individual) => {
                        let nominal = graph.get_or_create_nominal(individual);
                        self.init_node(graph, nominal);
                        changed |= graph.add_edge(id, role, nominal);
                    }
                    ClassExpression::MinCardinality(n, role, filler) => {
                        let qualifying = self.qualifying_successors(graph, id, role, filler);
                        let missing = (*n as usize).saturating_sub(qualifying.len());
                        for _ in 0..missing {
                            let fresh = graph.create_node(Some(id));
                            if **filler != ClassExpression::Thing {
                                graph.add_concept(fresh, (**filler).clone());
                            }
                            self.init_node(graph, fresh);
                            graph.add_edge(id, role, fresh);
                            changed = true;
                        }
                    }
                    _ => {}
                }
            }
        }
        changed
    }

    /// Applies at most one non-deterministic rule (⊔ or oneOf), opening a
    /// choice point. Returns true if a rule fired.
    pub fn apply_nondeterministic(&self, graph: &mut CompletionGraph) -> bool {
        for id in graph.node_ids() {
            let Some(node) = graph.node(id) else { continue };
            if node.is_blocked() {
                continue;
            }
            let concepts: Vec<ClassExpression> = node.concepts().iter().cloned().collect();
            for concept in concepts {
                match &concept {
                    ClassExpression::Or(disjuncts) => {
                        if node_processed(graph, id, ProcessedKind::Unions, &concept) {
                            continue;
                        }
                        if disjuncts.iter().any(|d| {
                            graph.node(id).map(|n| n.has_concept(d)).unwrap_or(false)
                        }) {
                            continue;
                        }
                        // the processed mark lands before the choice marker
                        // so it survives backtracking into this choice
                        graph.mark_processed(id, ProcessedKind::Unions, concept.clone());
                        let alternatives = disjuncts
                            .iter()
                            .map(|d| Alternative::Concept(d.clone()))
                            .collect::<Vec<_>>();
                        let first = alternatives[0].clone();
                        graph.create_choice_point(id, concept.clone(), alternatives);
                        self.apply_alternative(graph, id, first);
                        return true;
                    }
                    ClassExpression::OneOf(names) => {
                        if names.is_empty() || graph.node(id).unwrap().nominal().is_some() {
                            continue;
                        }
                        if names.len() == 1 {
                            self.apply_alternative(
                                graph,
                                id,
                                Alternative::MergeInto(names[0].clone()),
                            );
                            return true;
                        }
                        let alternatives = names
                            .iter()
                            .map(|name| Alternative::MergeInto(name.clone()))
                            .collect::<Vec<_>>();
                        let first = alternatives[0].clone();
                        graph.create_choice_point(id, concept.clone(), alternatives);
                        self.apply_alternative(graph, id, first);
                        return true;
                    }
                    _ => {}
                }
            }
        }
        false
    }

    /// Applies one alternative of a choice point, either the initial one
    /// or the one returned by backtracking.
    pub fn apply_alternative(
        &self,
        graph: &mut CompletionGraph,
        node: NodeId,
        alternative: Alternative,
    ) {
        match alternative {
            Alternative::Concept(concept) => {
                graph.add_concept(node, concept);
            }
            Alternative::MergeInto(individual) => {
                let nominal = graph.get_or_create_nominal(&individual);
                self.init_node(graph, nominal);
                if nominal != node {
                    graph.merge_nodes(nominal, node);
                }
            }
        }
    }

    fn qualifying_successors(
        &self,
        graph: &CompletionGraph,
        node: NodeId,
        role: &Iri,
        filler: &ClassExpression,
    ) -> BTreeSet<NodeId> {
        graph
            .successors(node, role)
            .into_iter()
            .filter(|y| {
                *filler == ClassExpression::Thing
                    || graph.node(*y).map(|n| n.has_concept(filler)).unwrap_or(false)
            })
            .collect()
    }

    /// Merges one excess successor pair, keeping nominals alive the
    /// longest: the survivor is the first candidate in nominal-first
    /// order, the merged node the last anonymous one.
    fn merge_excess(&self, graph: &mut CompletionGraph, qualifying: &BTreeSet<NodeId>) {
        let mut ordered: Vec<NodeId> = qualifying.iter().copied().collect();
        ordered.sort_by_key(|id| {
            let is_nominal = graph
                .node(*id)
                .map(|n| n.nominal().is_some())
                .unwrap_or(false);
            (!is_nominal, *id)
        });
        let survivor = ordered[0];
        let merged = *ordered.last().unwrap();
        if survivor != merged {
            tracing::trace!(?survivor, ?merged, "merging excess successors");
            graph.merge_nodes(survivor, merged);
        }
    }
}

fn node_processed(
    graph: &CompletionGraph,
    node: NodeId,
    kind: ProcessedKind,
    concept: &ClassExpression,
) -> bool {
    graph
        .node(node)
        .map(|n| n.is_processed(kind, concept))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::{Axiom, Ontology};
    use std::sync::Arc;

    fn iri(s: &str) -> Iri {
        Iri::new(s)
    }

    fn class(s: &str) -> ClassExpression {
        ClassExpression::class(s)
    }

    fn setup(onto: &Ontology) -> (ClassHierarchy, Arc<RoleHierarchy>) {
        (
            ClassHierarchy::from_ontology(onto),
            Arc::new(RoleHierarchy::from_ontology(onto)),
        )
    }

    #[test]
    fn intersection_rule_adds_conjuncts_once() {
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        g.add_concept(root, ClassExpression::And(vec![class("A"), class("B")]));

        assert!(rules.apply_deterministic(&mut g));
        let node = g.node(root).unwrap();
        assert!(node.has_concept(&class("A")));
        assert!(node.has_concept(&class("B")));
        assert!(!rules.apply_deterministic(&mut g));
    }

    #[test]
    fn universal_rule_reaches_new_successors() {
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        g.add_concept(
            root,
            ClassExpression::AllValues(iri("r"), Box::new(class("C"))),
        );
        let first = g.create_node(Some(root));
        g.add_edge(root, &iri("r"), first);
        assert!(rules.apply_deterministic(&mut g));
        assert!(g.node(first).unwrap().has_concept(&class("C")));

        // a successor added after the first firing still gets the filler
        let second = g.create_node(Some(root));
        g.add_edge(root, &iri("r"), second);
        assert!(rules.apply_deterministic(&mut g));
        assert!(g.node(second).unwrap().has_concept(&class("C")));
    }

    #[test]
    fn existential_rule_generates_once() {
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        g.add_concept(
            root,
            ClassExpression::SomeValues(iri("r"), Box::new(class("C"))),
        );
        assert!(rules.apply_generating(&mut g));
        assert_eq!(g.successors(root, &iri("r")).len(), 1);
        assert!(!rules.apply_generating(&mut g));
        assert_eq!(g.iter().count(), 2);
    }

    #[test]
    fn has_value_targets_the_nominal() {
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        g.add_concept(root, ClassExpression::HasValue(iri("r"), iri("alice")));
        assert!(rules.apply_generating(&mut g));
        let nominal = g.nominal_node(&iri("alice")).unwrap();
        assert!(g.has_edge(root, &iri("r"), nominal));
    }

    #[test]
    fn min_rule_fills_up_and_max_rule_merges_down() {
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        g.add_concept(
            root,
            ClassExpression::MinCardinality(3, iri("r"), Box::new(ClassExpression::Thing)),
        );
        assert!(rules.apply_generating(&mut g));
        assert_eq!(g.successors(root, &iri("r")).len(), 3);

        g.add_concept(
            root,
            ClassExpression::MaxCardinality(1, iri("r"), Box::new(ClassExpression::Thing)),
        );
        while rules.apply_deterministic(&mut g) {}
        assert_eq!(g.successors(root, &iri("r")).len(), 1);
    }

    #[test]
    fn max_rule_prefers_nominal_survivors() {
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        let anon = g.create_node(Some(root));
        g.add_edge(root, &iri("r"), anon);
        let nominal = g.get_or_create_nominal(&iri("alice"));
        g.add_edge(root, &iri("r"), nominal);
        g.add_concept(
            root,
            ClassExpression::MaxCardinality(1, iri("r"), Box::new(ClassExpression::Thing)),
        );
        while rules.apply_deterministic(&mut g) {}
        let survivors = g.successors(root, &iri("r"));
        assert_eq!(survivors, BTreeSet::from([nominal]));
        assert!(g.node(anon).is_none());
    }

    #[test]
    fn domain_and_range_constrain_endpoints() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::ObjectPropertyDomain(iri("teaches"), class("Teacher")));
        onto.add_axiom(Axiom::ObjectPropertyRange(iri("teaches"), class("Course")));
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let a = g.create_node(None);
        let b = g.create_node(None);
        g.add_edge(a, &iri("teaches"), b);
        assert!(rules.apply_deterministic(&mut g));
        assert!(g.node(a).unwrap().has_concept(&class("Teacher")));
        assert!(g.node(b).unwrap().has_concept(&class("Course")));
    }

    #[test]
    fn data_witness_rule_picks_range_value() {
        use crate::expr::{DataRange, Datatype, Literal};
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        g.add_concept(
            root,
            ClassExpression::DataSomeValues(iri("age"), DataRange::Datatype(Datatype::Int)),
        );
        g.add_concept(
            root,
            ClassExpression::DataSomeValues(
                iri("status"),
                DataRange::OneOf(vec![Literal::Str("active".into())]),
            ),
        );
        assert!(rules.apply_deterministic(&mut g));
        let node = g.node(root).unwrap();
        assert!(node.data_values()[&iri("age")].contains(&Literal::Int(0)));
        assert!(node.data_values()[&iri("status")].contains(&Literal::Str("active".into())));
    }

    #[test]
    fn union_rule_opens_a_choice_point() {
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        g.add_concept(root, ClassExpression::Or(vec![class("A"), class("B")]));

        assert!(rules.apply_nondeterministic(&mut g));
        assert_eq!(g.choice_point_count(), 1);
        assert!(g.node(root).unwrap().has_concept(&class("A")));
        // with a disjunct present the rule does not fire again
        assert!(!rules.apply_nondeterministic(&mut g));

        let (node, alternative) = g.backtrack().unwrap();
        rules.apply_alternative(&mut g, node, alternative);
        assert!(g.node(root).unwrap().has_concept(&class("B")));
        assert!(!g.node(root).unwrap().has_concept(&class("A")));
    }

    #[test]
    fn one_of_rule_merges_into_nominal() {
        let onto = Ontology::new();
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);
        let mut g = CompletionGraph::new(roles.clone());
        let root = g.create_node(None);
        let anon = g.create_node(Some(root));
        g.add_edge(root, &iri("r"), anon);
        g.add_concept(anon, ClassExpression::OneOf(vec![iri("alice")]));

        assert!(rules.apply_nondeterministic(&mut g));
        let nominal = g.nominal_node(&iri("alice")).unwrap();
        assert!(g.node(anon).is_none());
        assert!(g.has_edge(root, &iri("r"), nominal));
    }

    #[test]
    fn clash_detection_catches_each_category() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::DisjointClasses(vec![class("Dog"), class("Cat")]));
        onto.add_axiom(Axiom::IrreflexiveProperty(iri("properPart")));
        onto.add_axiom(Axiom::AsymmetricProperty(iri("larger")));
        onto.add_axiom(Axiom::FunctionalProperty(iri("mother")));
        let (classes, roles) = setup(&onto);
        let rules = Rules::new(&[], &classes, &roles);

        let mut g = CompletionGraph::new(roles.clone());
        let n = g.create_node(None);
        g.add_concept(n, ClassExpression::Nothing);
        assert_eq!(rules.detect_clash(&g), Some(Clash::Bottom(n)));

        let mut g = CompletionGraph::new(roles.clone());
        let n = g.create_node(None);
        g.add_concept(n, class("A"));
        g.add_concept(n, ClassExpression::Not(Box::new(class("A"))));
        assert!(matches!(rules.detect_clash(&g), Some(Clash::Complement(..))));

        let mut g = CompletionGraph::new(roles.clone());
        let n = g.create_node(None);
        g.add_concept(n, class("Dog"));
        g.add_concept(n, class("Cat"));
        assert!(matches!(rules.detect_clash(&g), Some(Clash::Disjoint(..))));

        let mut g = CompletionGraph::new(roles.clone());
        let n = g.create_node(None);
        g.add_concept(
            n,
            ClassExpression::MinCardinality(2, iri("r"), Box::new(ClassExpression::Thing)),
        );
        g.add_concept(
            n,
            ClassExpression::MaxCardinality(1, iri("r"), Box::new(ClassExpression::Thing)),
        );
        assert!(matches!(
            rules.detect_clash(&g),
            Some(Clash::Cardinality(..))
        ));

        let mut g = CompletionGraph::new(roles.clone());
        let n = g.create_node(None);
        let a = g.create_node(None);
        let b = g.create_node(None);
        g.add_edge(n, &iri("mother"), a);
        g.add_edge(n, &iri("mother"), b);
        assert!(matches!(rules.detect_clash(&g), Some(Clash::Functional(..))));

        let mut g = CompletionGraph::new(roles.clone());
        let n = g.create_node(None);
        g.add_edge(n, &iri("properPart"), n);
        assert!(matches!(
            rules.detect_clash(&g),
            Some(Clash::Irreflexive(..))
        ));

        let mut g = CompletionGraph::new(roles.clone());
        let a = g.create_node(None);
        let b = g.create_node(None);
        g.add_edge(a, &iri("larger"), b);
        g.add_edge(b, &iri("larger"), a);
        assert!(matches!(rules.detect_clash(&g), Some(Clash::Asymmetric(..))));

        // a self edge on an asymmetric role clashes by itself
        let mut g = CompletionGraph::new(roles.clone());
        let a = g.create_node(None);
        g.add_edge(a, &iri("larger"), a);
        assert!(matches!(rules.detect_clash(&g), Some(Clash::Asymmetric(..))));
    }
}
