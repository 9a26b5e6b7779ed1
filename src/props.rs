use crate::index::{Edge, GraphIndex, Strategy};
use crate::record::MapRecord;
use crate::scan::Pattern;
use crate::store::{MemStore, Store};
use crate::tuple::{Element, Subspace};
use proptest::prelude::*;
use proptest::strategy::Strategy as PropStrategy;

pub fn arb_name() -> impl PropStrategy<Value = String> {
    // a tiny alphabet so patterns actually collide with edges
    "[a-c]{1,2}".prop_map(String::from)
}

pub fn arb_element() -> impl PropStrategy<Value = Element> {
    prop_oneof![
        arb_name().prop_map(Element::Str),
        any::<i64>().prop_map(Element::I64),
        prop::collection::vec(any::<u8>(), 0..4).prop_map(Element::Bytes),
        Just(Element::Null),
    ]
}

pub fn arb_elements() -> impl PropStrategy<Value = Vec<Element>> {
    prop::collection::vec(arb_element(), 0..6)
}

pub fn arb_strategy() -> impl PropStrategy<Value = Strategy> {
    prop_oneof![
        Just(Strategy::Adjacency),
        Just(Strategy::TripleStore),
        Just(Strategy::Hexastore),
    ]
}

pub fn arb_edge() -> impl PropStrategy<Value = Edge> {
    (arb_name(), arb_name(), arb_name()).prop_map(|(from, label, to)| Edge::new(from, label, to))
}

pub fn arb_edges() -> impl PropStrategy<Value = Vec<Edge>> {
    prop::collection::vec(arb_edge(), 0..12)
}

fn arb_slot() -> impl PropStrategy<Value = Option<Element>> {
    prop::option::of(arb_name().prop_map(Element::Str))
}

pub fn arb_pattern() -> impl PropStrategy<Value = Pattern> {
    (arb_slot(), arb_slot(), arb_slot())
        .prop_map(|(from, edge, to)| Pattern::new(from, edge, to))
}

pub fn edge_index(strategy: Strategy) -> GraphIndex {
    GraphIndex::new(
        "edges",
        Subspace::from_elements(&[Element::from("g")]),
        strategy,
        "from",
        Some("label".into()),
        "to",
    )
}

pub fn seed_edges(store: &MemStore, index: &GraphIndex, edges: &[Edge]) {
    let mut tx = store.begin();
    for edge in edges {
        let record = MapRecord::new("Edge")
            .with("from", edge.from.clone())
            .with("label", edge.edge.clone())
            .with("to", edge.to.clone());
        index.update(None, Some(&record), &mut tx).unwrap();
    }
    store.commit(tx).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::EdgeScanner;
    use crate::store::StoreTransaction;
    use crate::tuple;
    use std::collections::BTreeSet;

    proptest! {
        #[test]
        fn tuples_round_trip(elements in arb_elements()) {
            let packed = tuple::pack(&elements);
            prop_assert_eq!(tuple::unpack(&packed).unwrap(), elements);
        }

        #[test]
        fn packed_prefixes_extend(
            base in arb_elements(),
            extension in arb_elements(),
        ) {
            let mut extended = base.clone();
            extended.extend(extension);
            prop_assert!(tuple::pack(&extended).starts_with(&tuple::pack(&base)));
        }

        /// Every strategy returns exactly the edges whose slots match the
        /// pattern, which makes the strategies interchangeable as sets.
        #[test]
        fn scanners_agree_with_brute_force(
            strategy in arb_strategy(),
            edges in arb_edges(),
            pattern in arb_pattern(),
        ) {
            let store = MemStore::new();
            let index = edge_index(strategy);
            seed_edges(&store, &index, &edges);
            let scanner = EdgeScanner::new(&index);
            let tx = store.begin();
            let found: BTreeSet<Edge> = scanner
                .collect(&pattern, &tx, false)
                .unwrap()
                .into_iter()
                .collect();
            let expected: BTreeSet<Edge> = edges
                .iter()
                .filter(|edge| pattern.matches(edge))
                .cloned()
                .collect();
            prop_assert_eq!(found, expected);
        }

        /// The maintainer's computed key set is exactly what lands in the
        /// store, for every strategy.
        #[test]
        fn computed_keys_match_written_keys(
            strategy in arb_strategy(),
            edges in arb_edges(),
        ) {
            let store = MemStore::new();
            let index = edge_index(strategy);
            seed_edges(&store, &index, &edges);

            let mut expected = BTreeSet::new();
            for edge in &edges {
                expected.extend(index.keys_for(edge).unwrap());
            }
            let tx = store.begin();
            let (begin, end) = index.subspace().range();
            let written: BTreeSet<Vec<u8>> = tx
                .get_range(&begin, &end, false)
                .unwrap()
                .map(|row| row.unwrap().0)
                .collect();
            prop_assert_eq!(written, expected);
        }

        /// Each written row decodes back to the edge it was written for.
        #[test]
        fn rows_decode_to_their_edge(edge in arb_edge()) {
            let index = edge_index(Strategy::Hexastore);
            for key in index.keys_for(&edge).unwrap() {
                let (_, decoded) = index.decode_key(&key).unwrap();
                prop_assert_eq!(&decoded, &edge);
            }
        }
    }
}
