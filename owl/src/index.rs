use crate::expr::{ClassExpression, Literal};
use crate::iri::Iri;
use crate::ontology::{Axiom, Ontology};
use fnv::FnvHashMap;
use std::collections::BTreeSet;

/// Constant time lookup tables derived from an [`Ontology`].
///
/// Built once per ontology and shared read only. The index holds clones of
/// the relevant axiom parts keyed the way the reasoners ask for them:
/// assertions by individual, axioms by box, and the class signature.
/// Rebuilding after an ontology change is the caller's responsibility.
#[derive(Clone, Debug, Default)]
pub struct OntologyIndex {
    class_assertions: FnvHashMap<Iri, Vec<ClassExpression>>,
    object_assertions_by_subject: FnvHashMap<Iri, Vec<(Iri, Iri)>>,
    object_assertions_by_object: FnvHashMap<Iri, Vec<(Iri, Iri)>>,
    data_assertions: FnvHashMap<Iri, Vec<(Iri, Literal)>>,
    tbox: Vec<Axiom>,
    rbox: Vec<Axiom>,
    class_signature: BTreeSet<Iri>,
}

impl OntologyIndex {
    /// Builds the index from an ontology.
    pub fn build(ontology: &Ontology) -> Self {
        let mut index = Self {
            class_signature: ontology.classes.clone(),
            ..Default::default()
        };
        for axiom in &ontology.axioms {
            match axiom {
                Axiom::ClassAssertion(expr, individual) => {
                    index
                        .class_assertions
                        .entry(individual.clone())
                        .or_default()
                        .push(expr.clone());
                }
                Axiom::ObjectPropertyAssertion(property, subject, object) => {
                    index
                        .object_assertions_by_subject
                        .entry(subject.clone())
                        .or_default()
                        .push((property.clone(), object.clone()));
                    index
                        .object_assertions_by_object
                        .entry(object.clone())
                        .or_default()
                        .push((property.clone(), subject.clone()));
                }
                Axiom::DataPropertyAssertion(property, subject, value) => {
                    index
                        .data_assertions
                        .entry(subject.clone())
                        .or_default()
                        .push((property.clone(), value.clone()));
                }
                axiom if axiom.is_tbox() => index.tbox.push(axiom.clone()),
                axiom if axiom.is_rbox() => index.rbox.push(axiom.clone()),
                _ => {}
            }
        }
        index
    }

    /// Class assertions on an individual.
    pub fn class_assertions(&self, individual: &Iri) -> &[ClassExpression] {
        self.class_assertions
            .get(individual)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Object property assertions with the individual as subject, as
    /// `(property, object)` pairs.
    pub fn object_assertions_from(&self, individual: &Iri) -> &[(Iri, Iri)] {
        self.object_assertions_by_subject
            .get(individual)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Object property assertions with the individual as object, as
    /// `(property, subject)` pairs.
    pub fn object_assertions_to(&self, individual: &Iri) -> &[(Iri, Iri)] {
        self.object_assertions_by_object
            .get(individual)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Data property assertions on an individual, as `(property, value)`
    /// pairs.
    pub fn data_assertions(&self, individual: &Iri) -> &[(Iri, Literal)] {
        self.data_assertions
            .get(individual)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The TBox axioms.
    pub fn tbox(&self) -> &[Axiom] {
        &self.tbox
    }

    /// The RBox axioms.
    pub fn rbox(&self) -> &[Axiom] {
        &self.rbox
    }

    /// The named classes in the signature.
    pub fn class_signature(&self) -> &BTreeSet<Iri> {
        &self.class_signature
    }

    /// Returns true if the exact object property assertion is present.
    pub fn has_object_assertion(&self, property: &Iri, subject: &Iri, object: &Iri) -> bool {
        self.object_assertions_from(subject)
            .iter()
            .any(|(p, o)| p == property && o == object)
    }
}
