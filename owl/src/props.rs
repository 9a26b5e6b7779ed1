use crate::expr::{ClassExpression, DataRange, Datatype, Literal};
use crate::graph::{CompletionGraph, NodeId, ProcessedKind};
use crate::hierarchy::RoleHierarchy;
use crate::iri::Iri;
use crate::ontology::{Axiom, Ontology};
use proptest::prelude::*;
use std::sync::Arc;

pub fn arb_class_iri() -> impl Strategy<Value = Iri> {
    "[A-D]".prop_map(Iri::new)
}

pub fn arb_role_iri() -> impl Strategy<Value = Iri> {
    "[r-t]".prop_map(Iri::new)
}

pub fn arb_individual_iri() -> impl Strategy<Value = Iri> {
    "[a-c]".prop_map(Iri::new)
}

pub fn arb_literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        "[a-z]{0,3}".prop_map(Literal::Str),
        any::<i64>().prop_map(Literal::Int),
        any::<bool>().prop_map(Literal::Bool),
    ]
}

pub fn arb_class_expr() -> impl Strategy<Value = ClassExpression> {
    let leaf = prop_oneof![
        Just(ClassExpression::Thing),
        Just(ClassExpression::Nothing),
        arb_class_iri().prop_map(ClassExpression::Class),
        (arb_role_iri(), arb_individual_iri())
            .prop_map(|(r, a)| ClassExpression::HasValue(r, a)),
        arb_role_iri().prop_map(ClassExpression::HasSelf),
        prop::collection::vec(arb_individual_iri(), 0..3).prop_map(ClassExpression::OneOf),
        (arb_role_iri(), arb_literal())
            .prop_map(|(p, v)| ClassExpression::DataHasValue(p, v)),
        arb_role_iri().prop_map(|p| {
            ClassExpression::DataSomeValues(p, DataRange::Datatype(Datatype::Int))
        }),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            inner
                .clone()
                .prop_map(|c| ClassExpression::Not(Box::new(c))),
            prop::collection::vec(inner.clone(), 0..4).prop_map(ClassExpression::And),
            prop::collection::vec(inner.clone(), 0..4).prop_map(ClassExpression::Or),
            (arb_role_iri(), inner.clone())
                .prop_map(|(r, c)| ClassExpression::SomeValues(r, Box::new(c))),
            (arb_role_iri(), inner.clone())
                .prop_map(|(r, c)| ClassExpression::AllValues(r, Box::new(c))),
            (0u32..4, arb_role_iri(), inner.clone())
                .prop_map(|(n, r, c)| ClassExpression::MinCardinality(n, r, Box::new(c))),
            (0u32..4, arb_role_iri(), inner)
                .prop_map(|(n, r, c)| ClassExpression::MaxCardinality(n, r, Box::new(c))),
        ]
    })
}

/// One scripted completion graph mutation. Node references are indices
/// into the list of live nodes at application time, wrapped around, so
/// every script is applicable to every graph state.
#[derive(Clone, Debug)]
pub enum Mutation {
    CreateNode(usize),
    CreateNominal(Iri),
    AddConcept(usize, ClassExpression),
    AddEdge(usize, Iri, usize),
    AddDataValue(usize, Iri, Literal),
    MarkProcessed(usize, ProcessedKind, ClassExpression),
    Merge(usize, usize),
    UpdateBlocking,
}

pub fn arb_mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        any::<usize>().prop_map(Mutation::CreateNode),
        arb_individual_iri().prop_map(Mutation::CreateNominal),
        (any::<usize>(), arb_class_expr()).prop_map(|(n, c)| Mutation::AddConcept(n, c)),
        (any::<usize>(), arb_role_iri(), any::<usize>())
            .prop_map(|(a, r, b)| Mutation::AddEdge(a, r, b)),
        (any::<usize>(), arb_role_iri(), arb_literal())
            .prop_map(|(n, p, v)| Mutation::AddDataValue(n, p, v)),
        (
            any::<usize>(),
            prop_oneof![
                Just(ProcessedKind::Intersections),
                Just(ProcessedKind::Unions),
                Just(ProcessedKind::Existentials),
                Just(ProcessedKind::Universals),
            ],
            arb_class_expr()
        )
            .prop_map(|(n, k, c)| Mutation::MarkProcessed(n, k, c)),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Mutation::Merge(a, b)),
        Just(Mutation::UpdateBlocking),
    ]
}

pub fn arb_mutations() -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(arb_mutation(), 0..24)
}

pub fn roles_with_characteristics() -> Arc<RoleHierarchy> {
    let mut onto = Ontology::new();
    onto.add_axiom(Axiom::SymmetricProperty(Iri::new("s")));
    onto.add_axiom(Axiom::InverseObjectProperties(Iri::new("r"), Iri::new("t")));
    Arc::new(RoleHierarchy::from_ontology(&onto))
}

fn pick(graph: &CompletionGraph, index: usize) -> Option<NodeId> {
    let ids = graph.node_ids();
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

pub fn apply_mutation(graph: &mut CompletionGraph, mutation: &Mutation) {
    match mutation {
        Mutation::CreateNode(parent) => {
            let parent = pick(graph, *parent);
            graph.create_node(parent);
        }
        Mutation::CreateNominal(individual) => {
            graph.get_or_create_nominal(individual);
        }
        Mutation::AddConcept(node, concept) => {
            if let Some(node) = pick(graph, *node) {
                graph.add_concept(node, concept.clone());
            }
        }
        Mutation::AddEdge(from, role, to) => {
            if let (Some(from), Some(to)) = (pick(graph, *from), pick(graph, *to)) {
                graph.add_edge(from, role, to);
            }
        }
        Mutation::AddDataValue(node, property, value) => {
            if let Some(node) = pick(graph, *node) {
                graph.add_data_value(node, property.clone(), value.clone());
            }
        }
        Mutation::MarkProcessed(node, kind, concept) => {
            if let Some(node) = pick(graph, *node) {
                graph.mark_processed(node, *kind, concept.clone());
            }
        }
        Mutation::Merge(survivor, merged) => {
            if let (Some(survivor), Some(merged)) = (pick(graph, *survivor), pick(graph, *merged))
            {
                if survivor != merged {
                    graph.merge_nodes(survivor, merged);
                }
            }
        }
        Mutation::UpdateBlocking => graph.update_blocking(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn nnf_is_a_fixed_point(expr in arb_class_expr()) {
            let nnf = expr.nnf();
            prop_assert_eq!(nnf.nnf(), nnf);
        }

        #[test]
        fn canonical_is_idempotent(expr in arb_class_expr()) {
            let canonical = expr.canonical();
            prop_assert_eq!(canonical.canonical(), canonical);
        }

        #[test]
        fn cache_key_ignores_operand_order(
            a in arb_class_expr(),
            b in arb_class_expr(),
        ) {
            let ab = ClassExpression::And(vec![a.clone(), b.clone()]);
            let ba = ClassExpression::And(vec![b, a]);
            prop_assert_eq!(ab.cache_key(), ba.cache_key());
        }

        #[test]
        fn double_complement_preserves_canonical_form(expr in arb_class_expr()) {
            prop_assert_eq!(
                expr.complement().complement().canonical(),
                expr.canonical()
            );
        }

        /// Undoing every scripted mutation restores the graph exactly:
        /// node set, labels, edges, data values, nominals and processed
        /// flags.
        #[test]
        fn trail_round_trip(
            prefix in arb_mutations(),
            script in arb_mutations(),
        ) {
            let mut graph = CompletionGraph::new(roles_with_characteristics());
            graph.create_node(None);
            for mutation in &prefix {
                apply_mutation(&mut graph, mutation);
            }
            let snapshot = graph.snapshot();
            let position = graph.trail_len();
            for mutation in &script {
                apply_mutation(&mut graph, mutation);
            }
            graph.undo_to(position);
            prop_assert_eq!(graph.snapshot(), snapshot);
        }
    }
}
