use crate::expr::ClassExpression;
use crate::hierarchy::{ClassHierarchy, RoleHierarchy};
use crate::iri::Iri;
use crate::ontology::Ontology;
use anyhow::Result;
use smallvec::SmallVec;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// An RDF style triple. Class membership uses `rdf:type` as the
/// predicate; data values ride in the object slot as their lexical form.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Triple {
    /// The subject.
    pub subject: Iri,
    /// The predicate.
    pub predicate: Iri,
    /// The object.
    pub object: Iri,
}

impl Triple {
    /// Creates a triple.
    pub fn new(subject: impl Into<Iri>, predicate: impl Into<Iri>, object: impl Into<Iri>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// A `rdf:type` triple.
    pub fn class_assertion(individual: impl Into<Iri>, class: impl Into<Iri>) -> Self {
        Self::new(individual, Iri::rdf_type(), class)
    }

    /// Returns true if this is a `rdf:type` triple.
    pub fn is_class_assertion(&self) -> bool {
        self.predicate.as_str() == crate::iri::RDF_TYPE
    }
}

impl std::fmt::Debug for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({:?} {:?} {:?})", self.subject, self.predicate, self.object)
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A derived triple together with the triples that justify it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Inference {
    /// The derived triple.
    pub consequent: Triple,
    /// The antecedent triples, in rule order.
    pub antecedents: SmallVec<[Triple; 2]>,
}

/// Read access to the currently materialized triples, provided by the
/// caller. Lookups must see asserted triples and valid inferred triples.
pub trait TripleSource {
    /// Returns true if the triple is present.
    fn contains(&self, triple: &Triple) -> Result<bool>;
    /// All objects `o` with `(subject, predicate, o)` present.
    fn objects(&self, subject: &Iri, predicate: &Iri) -> Result<Vec<Iri>>;
    /// All subjects `s` with `(s, predicate, object)` present.
    fn subjects(&self, predicate: &Iri, object: &Iri) -> Result<Vec<Iri>>;
}

/// An empty triple source, for inference over a single triple.
pub struct NoTriples;

impl TripleSource for NoTriples {
    fn contains(&self, _: &Triple) -> Result<bool> {
        Ok(false)
    }

    fn objects(&self, _: &Iri, _: &Iri) -> Result<Vec<Iri>> {
        Ok(Vec::new())
    }

    fn subjects(&self, _: &Iri, _: &Iri) -> Result<Vec<Iri>> {
        Ok(Vec::new())
    }
}

/// Forward chaining materializer.
///
/// Applies the schema level inference rules of an ontology to asserted
/// triples: class and property subsumption, inverses, symmetry,
/// transitivity, domains and ranges, and property chains. Every inference
/// carries its antecedents so a provenance store can maintain it
/// incrementally.
pub struct Materializer {
    classes: Arc<ClassHierarchy>,
    roles: Arc<RoleHierarchy>,
}

impl Materializer {
    /// Builds a materializer from an ontology.
    pub fn new(ontology: &Ontology) -> Self {
        Self {
            classes: Arc::new(ClassHierarchy::from_ontology(ontology)),
            roles: Arc::new(RoleHierarchy::from_ontology(ontology)),
        }
    }

    /// Builds a materializer over prebuilt hierarchies.
    pub fn with_hierarchies(classes: Arc<ClassHierarchy>, roles: Arc<RoleHierarchy>) -> Self {
        Self { classes, roles }
    }

    /// One inference step: everything directly derivable from `triple`.
    pub fn infer(&self, triple: &Triple, source: &dyn TripleSource) -> Result<Vec<Inference>> {
        let mut out = Vec::new();
        let mut emit = |consequent: Triple, antecedents: SmallVec<[Triple; 2]>| {
            if consequent != *triple && !antecedents.contains(&consequent) {
                out.push(Inference {
                    consequent,
                    antecedents,
                });
            }
        };

        if triple.is_class_assertion() {
            for sup in self.classes.ancestors(&triple.object) {
                emit(
                    Triple::class_assertion(triple.subject.clone(), sup),
                    smallvec::smallvec![triple.clone()],
                );
            }
            return Ok(out);
        }

        let subject = &triple.subject;
        let predicate = &triple.predicate;
        let object = &triple.object;

        // property subsumption
        for sup in self.roles.super_roles(predicate) {
            if &sup != predicate {
                emit(
                    Triple::new(subject.clone(), sup, object.clone()),
                    smallvec::smallvec![triple.clone()],
                );
            }
        }

        // declared inverse
        if let Some(inverse) = self.roles.inverse(predicate) {
            emit(
                Triple::new(object.clone(), inverse.clone(), subject.clone()),
                smallvec::smallvec![triple.clone()],
            );
        }

        let characteristics = self.roles.characteristics(predicate);
        if characteristics.symmetric {
            emit(
                Triple::new(object.clone(), predicate.clone(), subject.clone()),
                smallvec::smallvec![triple.clone()],
            );
        }

        // domain and range typing, named classes only
        for domain in self.roles.all_domains(predicate) {
            if let ClassExpression::Class(class) = domain {
                emit(
                    Triple::class_assertion(subject.clone(), class),
                    smallvec::smallvec![triple.clone()],
                );
            }
        }
        for range in self.roles.all_ranges(predicate) {
            if let ClassExpression::Class(class) = range {
                emit(
                    Triple::class_assertion(object.clone(), class),
                    smallvec::smallvec![triple.clone()],
                );
            }
        }

        // transitive closure against the existing triples
        if characteristics.transitive {
            for beyond in source.objects(object, predicate)? {
                let witness = Triple::new(object.clone(), predicate.clone(), beyond.clone());
                emit(
                    Triple::new(subject.clone(), predicate.clone(), beyond),
                    smallvec::smallvec![triple.clone(), witness],
                );
            }
            for before in source.subjects(predicate, subject)? {
                let witness = Triple::new(before.clone(), predicate.clone(), subject.clone());
                emit(
                    Triple::new(before, predicate.clone(), object.clone()),
                    smallvec::smallvec![witness, triple.clone()],
                );
            }
        }

        // property chains through this edge
        for (chain, implied) in self.roles.chains() {
            for (position, role) in chain.iter().enumerate() {
                if role != predicate {
                    continue;
                }
                let lefts = walk_back(source, subject, &chain[..position])?;
                let rights = walk_forward(source, object, &chain[position + 1..])?;
                for (start, left_path) in &lefts {
                    for (end, right_path) in &rights {
                        let mut antecedents = SmallVec::new();
                        antecedents.extend(left_path.iter().cloned());
                        antecedents.push(triple.clone());
                        antecedents.extend(right_path.iter().cloned());
                        emit(
                            Triple::new(start.clone(), implied.clone(), end.clone()),
                            antecedents,
                        );
                    }
                }
            }
        }

        Ok(out)
    }

    /// The full forward chaining closure of one inserted triple: repeats
    /// [`infer`] on every fresh consequent until nothing new appears.
    /// Inferences are deduplicated by consequent and antecedent list and
    /// returned in derivation order.
    ///
    /// [`infer`]: Materializer::infer
    pub fn close_over(&self, triple: &Triple, source: &dyn TripleSource) -> Result<Vec<Inference>> {
        let mut out: Vec<Inference> = Vec::new();
        let mut seen: BTreeSet<(Triple, Vec<Triple>)> = BTreeSet::new();
        let mut queued: BTreeSet<Triple> = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(triple.clone());
        queued.insert(triple.clone());

        while let Some(next) = queue.pop_front() {
            for inference in self.infer(&next, source)? {
                let key = (
                    inference.consequent.clone(),
                    inference.antecedents.to_vec(),
                );
                if inference.consequent == *triple || !seen.insert(key) {
                    continue;
                }
                if queued.insert(inference.consequent.clone()) {
                    queue.push_back(inference.consequent.clone());
                }
                out.push(inference);
            }
        }
        Ok(out)
    }
}

fn walk_back(
    source: &dyn TripleSource,
    from: &Iri,
    roles: &[Iri],
) -> Result<Vec<(Iri, Vec<Triple>)>> {
    let mut paths = vec![(from.clone(), Vec::new())];
    for role in roles.iter().rev() {
        let mut next = Vec::new();
        for (node, path) in paths {
            for subject in source.subjects(role, &node)? {
                let mut extended = vec![Triple::new(subject.clone(), role.clone(), node.clone())];
                extended.extend(path.iter().cloned());
                next.push((subject, extended));
            }
        }
        paths = next;
    }
    Ok(paths)
}

fn walk_forward(
    source: &dyn TripleSource,
    from: &Iri,
    roles: &[Iri],
) -> Result<Vec<(Iri, Vec<Triple>)>> {
    let mut paths = vec![(from.clone(), Vec::new())];
    for role in roles {
        let mut next = Vec::new();
        for (node, path) in paths {
            for object in source.objects(&node, role)? {
                let mut extended = path.clone();
                extended.push(Triple::new(node.clone(), role.clone(), object.clone()));
                next.push((object, extended));
            }
        }
        paths = next;
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Axiom;
    use std::collections::BTreeSet as Set;

    struct MemSource(Set<Triple>);

    impl TripleSource for MemSource {
        fn contains(&self, triple: &Triple) -> Result<bool> {
            Ok(self.0.contains(triple))
        }

        fn objects(&self, subject: &Iri, predicate: &Iri) -> Result<Vec<Iri>> {
            Ok(self
                .0
                .iter()
                .filter(|t| &t.subject == subject && &t.predicate == predicate)
                .map(|t| t.object.clone())
                .collect())
        }

        fn subjects(&self, predicate: &Iri, object: &Iri) -> Result<Vec<Iri>> {
            Ok(self
                .0
                .iter()
                .filter(|t| &t.predicate == predicate && &t.object == object)
                .map(|t| t.subject.clone())
                .collect())
        }
    }

    fn iri(s: &str) -> Iri {
        Iri::new(s)
    }

    fn class(s: &str) -> ClassExpression {
        ClassExpression::class(s)
    }

    #[test]
    fn class_assertion_closes_over_ancestors() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::SubClassOf(class("Manager"), class("Employee")));
        onto.add_axiom(Axiom::SubClassOf(class("Employee"), class("Person")));
        let materializer = Materializer::new(&onto);
        let t = Triple::class_assertion(iri("alice"), iri("Manager"));
        let inferences = materializer.infer(&t, &NoTriples).unwrap();
        let consequents: Set<&Triple> = inferences.iter().map(|i| &i.consequent).collect();
        assert!(consequents.contains(&Triple::class_assertion(iri("alice"), iri("Employee"))));
        assert!(consequents.contains(&Triple::class_assertion(iri("alice"), iri("Person"))));
        assert!(inferences
            .iter()
            .all(|i| i.antecedents.as_slice() == [t.clone()]));
    }

    #[test]
    fn property_rules_fire_together() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::SubObjectProperty(iri("manages"), iri("worksWith")));
        onto.add_axiom(Axiom::InverseObjectProperties(iri("manages"), iri("managedBy")));
        onto.add_axiom(Axiom::ObjectPropertyDomain(iri("manages"), class("Manager")));
        onto.add_axiom(Axiom::ObjectPropertyRange(iri("manages"), class("Employee")));
        let materializer = Materializer::new(&onto);
        let t = Triple::new(iri("alice"), iri("manages"), iri("bob"));
        let inferences = materializer.infer(&t, &NoTriples).unwrap();
        let consequents: Set<&Triple> = inferences.iter().map(|i| &i.consequent).collect();
        assert!(consequents.contains(&Triple::new(iri("alice"), iri("worksWith"), iri("bob"))));
        assert!(consequents.contains(&Triple::new(iri("bob"), iri("managedBy"), iri("alice"))));
        assert!(consequents.contains(&Triple::class_assertion(iri("alice"), iri("Manager"))));
        assert!(consequents.contains(&Triple::class_assertion(iri("bob"), iri("Employee"))));
    }

    #[test]
    fn transitive_rule_uses_existing_edges() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::TransitiveProperty(iri("ancestor")));
        let materializer = Materializer::new(&onto);
        let existing = MemSource(Set::from([
            Triple::new(iri("b"), iri("ancestor"), iri("c")),
            Triple::new(iri("z"), iri("ancestor"), iri("a")),
        ]));
        let t = Triple::new(iri("a"), iri("ancestor"), iri("b"));
        let inferences = materializer.infer(&t, &existing).unwrap();
        let forward = inferences
            .iter()
            .find(|i| i.consequent == Triple::new(iri("a"), iri("ancestor"), iri("c")))
            .unwrap();
        assert_eq!(forward.antecedents.len(), 2);
        assert!(inferences
            .iter()
            .any(|i| i.consequent == Triple::new(iri("z"), iri("ancestor"), iri("b"))));
    }

    #[test]
    fn chains_walk_both_sides_of_the_edge() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::SubPropertyChain(
            vec![iri("hasParent"), iri("hasBrother")],
            iri("hasUncle"),
        ));
        let materializer = Materializer::new(&onto);
        let existing = MemSource(Set::from([Triple::new(
            iri("bob"),
            iri("hasBrother"),
            iri("carl"),
        )]));
        let t = Triple::new(iri("alice"), iri("hasParent"), iri("bob"));
        let inferences = materializer.infer(&t, &existing).unwrap();
        let uncle = inferences
            .iter()
            .find(|i| i.consequent == Triple::new(iri("alice"), iri("hasUncle"), iri("carl")))
            .unwrap();
        assert_eq!(
            uncle.antecedents.to_vec(),
            vec![
                t.clone(),
                Triple::new(iri("bob"), iri("hasBrother"), iri("carl")),
            ]
        );
    }

    #[test]
    fn closure_chains_through_fresh_consequents() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::SymmetricProperty(iri("spouse")));
        onto.add_axiom(Axiom::ObjectPropertyDomain(iri("spouse"), class("Married")));
        onto.add_axiom(Axiom::SubClassOf(class("Married"), class("Person")));
        let materializer = Materializer::new(&onto);
        let t = Triple::new(iri("alice"), iri("spouse"), iri("bob"));
        let inferences = materializer.close_over(&t, &NoTriples).unwrap();
        let consequents: Set<&Triple> = inferences.iter().map(|i| &i.consequent).collect();
        // the symmetric edge types bob through its own domain constraint
        assert!(consequents.contains(&Triple::new(iri("bob"), iri("spouse"), iri("alice"))));
        assert!(consequents.contains(&Triple::class_assertion(iri("bob"), iri("Married"))));
        assert!(consequents.contains(&Triple::class_assertion(iri("bob"), iri("Person"))));
        assert!(consequents.contains(&Triple::class_assertion(iri("alice"), iri("Person"))));
    }
}
