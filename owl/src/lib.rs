//! # OWL DL reasoning for hexad
//!
//! ## The decision procedure
//! The core of this crate is a Tableaux procedure for the SHOIN(D)
//! description logic. A satisfiability question about a class expression is
//! answered by trying to construct a model: a completion graph is seeded
//! with one root node labeled by the expression (in negation normal form)
//! and by every TBox constraint, and expansion rules are applied until
//! either every rule is satisfied (a model exists) or every nondeterministic
//! branch ends in a contradiction (no model exists).
//!
//! ## Backtracking without copies
//! Nondeterministic rules (disjunction and enumeration) pick one
//! alternative and record a choice point. Instead of copying the graph per
//! branch, every mutation is appended to a trail; abandoning a branch pops
//! trail entries back to the choice point and applies the next alternative.
//! The only mutation that is not a monotone addition is node merging, so
//! its trail entry carries the merged node, its incident edges and the
//! survivor's processed flags.
//!
//! ## Termination
//! Cyclic TBoxes generate infinite trees unless expansion is stopped.
//! Pairwise blocking does that: a node whose label is contained in an
//! ancestor's label, and whose outgoing roles all occur at that ancestor,
//! is blocked and exempt from rule application. Blocking is recomputed
//! before every expansion step because merges and backtracking both
//! invalidate it. Nominal nodes stand for named individuals and are never
//! blocked.
//!
//! ## Three valued answers
//! Expansion is budgeted by a step limit and a wall clock deadline, so
//! satisfiability is three valued: `Satisfiable`, `Unsatisfiable` or
//! `Unknown`. Boolean surfaces (`subsumes`, `are_disjoint`) project
//! `Unknown` to `false`, never to `true`. The same conservatism applies to
//! ontologies that violate the OWL DL regularity restrictions: the
//! reasoner reports the violations and answers `Unknown`.
//!
//! ## Forward chaining
//! Next to the model construction procedure sits a [`Materializer`] that
//! forward chains schema rules (class and property subsumption, inverses,
//! symmetry, transitivity, domains, ranges, property chains) over asserted
//! triples. Every inference carries its antecedents, which is what the
//! incremental maintenance layer in the `hexad` crate stores as provenance
//! and repairs on deletion.
#![warn(missing_docs)]
mod expr;
mod graph;
mod hierarchy;
mod index;
mod iri;
mod materialize;
mod ontology;
#[cfg(test)]
mod props;
mod rules;
mod tableaux;

pub use crate::expr::{ClassExpression, DataRange, Datatype, Literal};
pub use crate::graph::{
    Alternative, ChoicePoint, ChoicePointId, CompletionGraph, Node, NodeId, ProcessedKind,
};
pub use crate::hierarchy::{ClassHierarchy, RoleHierarchy};
pub use crate::index::OntologyIndex;
pub use crate::iri::{Iri, OWL_NOTHING, OWL_THING, RDF_TYPE};
pub use crate::materialize::{Inference, Materializer, NoTriples, Triple, TripleSource};
pub use crate::ontology::{
    Axiom, Characteristics, DataProperty, ObjectProperty, Ontology, RegularityViolation,
};
pub use crate::rules::{Clash, Rules};
pub use crate::tableaux::{Reasoner, ReasonerConfig, ReasonerStats, Satisfiability};
