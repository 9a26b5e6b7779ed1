use crate::expr::{ClassExpression, DataRange, Literal};
use crate::iri::Iri;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Role characteristics as declared on an object property.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Characteristics {
    /// `R(x,y) ∧ R(y,z) ⇒ R(x,z)`.
    pub transitive: bool,
    /// `R(x,y) ⇒ R(y,x)`.
    pub symmetric: bool,
    /// `R(x,y) ⇒ ¬R(y,x)`.
    pub asymmetric: bool,
    /// `R(x,x)` for every `x`.
    pub reflexive: bool,
    /// `¬R(x,x)` for every `x`.
    pub irreflexive: bool,
    /// At most one `R` successor per subject.
    pub functional: bool,
    /// At most one `R` predecessor per object.
    pub inverse_functional: bool,
}

/// An object property declaration.
#[derive(Clone, Debug, Default)]
pub struct ObjectProperty {
    /// Declared characteristics.
    pub characteristics: Characteristics,
    /// The declared inverse property, if any.
    pub inverse: Option<Iri>,
    /// Domain class expressions.
    pub domains: Vec<ClassExpression>,
    /// Range class expressions.
    pub ranges: Vec<ClassExpression>,
    /// Direct super properties.
    pub super_properties: BTreeSet<Iri>,
    /// Property chains implying this property.
    pub chains: Vec<Vec<Iri>>,
}

/// A data property declaration.
#[derive(Clone, Debug, Default)]
pub struct DataProperty {
    /// At most one value per subject.
    pub functional: bool,
    /// Domain class expressions.
    pub domains: Vec<ClassExpression>,
    /// Range data ranges.
    pub ranges: Vec<DataRange>,
}

/// An ontology axiom.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Axiom {
    /// `C ⊑ D`.
    SubClassOf(ClassExpression, ClassExpression),
    /// `C₁ ≡ C₂ ≡ …`.
    EquivalentClasses(Vec<ClassExpression>),
    /// Pairwise disjointness of the listed expressions.
    DisjointClasses(Vec<ClassExpression>),
    /// A named class is the disjoint union of the listed expressions.
    DisjointUnion(Iri, Vec<ClassExpression>),
    /// `C(a)`.
    ClassAssertion(ClassExpression, Iri),
    /// `R(a, b)`.
    ObjectPropertyAssertion(Iri, Iri, Iri),
    /// `P(a, v)`.
    DataPropertyAssertion(Iri, Iri, Literal),
    /// `R ⊑ S`.
    SubObjectProperty(Iri, Iri),
    /// `R ≡ S`.
    EquivalentObjectProperties(Iri, Iri),
    /// `R ≡ S⁻`.
    InverseObjectProperties(Iri, Iri),
    /// `S₁ ∘ … ∘ Sₙ ⊑ R`.
    SubPropertyChain(Vec<Iri>, Iri),
    /// Transitivity of a property.
    TransitiveProperty(Iri),
    /// Symmetry of a property.
    SymmetricProperty(Iri),
    /// Asymmetry of a property.
    AsymmetricProperty(Iri),
    /// Reflexivity of a property.
    ReflexiveProperty(Iri),
    /// Irreflexivity of a property.
    IrreflexiveProperty(Iri),
    /// Functionality of a property.
    FunctionalProperty(Iri),
    /// Inverse functionality of a property.
    InverseFunctionalProperty(Iri),
    /// Domain of an object property.
    ObjectPropertyDomain(Iri, ClassExpression),
    /// Range of an object property.
    ObjectPropertyRange(Iri, ClassExpression),
}

impl Axiom {
    /// Returns true for axioms about classes (TBox).
    pub fn is_tbox(&self) -> bool {
        matches!(
            self,
            Axiom::SubClassOf(..)
                | Axiom::EquivalentClasses(..)
                | Axiom::DisjointClasses(..)
                | Axiom::DisjointUnion(..)
        )
    }

    /// Returns true for axioms about roles (RBox).
    pub fn is_rbox(&self) -> bool {
        matches!(
            self,
            Axiom::SubObjectProperty(..)
                | Axiom::EquivalentObjectProperties(..)
                | Axiom::InverseObjectProperties(..)
                | Axiom::SubPropertyChain(..)
                | Axiom::TransitiveProperty(..)
                | Axiom::SymmetricProperty(..)
                | Axiom::AsymmetricProperty(..)
                | Axiom::ReflexiveProperty(..)
                | Axiom::IrreflexiveProperty(..)
                | Axiom::FunctionalProperty(..)
                | Axiom::InverseFunctionalProperty(..)
                | Axiom::ObjectPropertyDomain(..)
                | Axiom::ObjectPropertyRange(..)
        )
    }

    /// Returns true for assertions about individuals (ABox).
    pub fn is_abox(&self) -> bool {
        matches!(
            self,
            Axiom::ClassAssertion(..)
                | Axiom::ObjectPropertyAssertion(..)
                | Axiom::DataPropertyAssertion(..)
        )
    }
}

/// A structured OWL DL regularity violation.
///
/// Regularity is the set of syntactic restrictions that keep the tableaux
/// procedure a decision procedure. The reasoner refuses to answer
/// definitively on ontologies that violate them.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RegularityViolation {
    /// A transitive role is used inside a cardinality restriction.
    #[error("transitive role {role} used in a cardinality restriction")]
    TransitiveInCardinality {
        /// The offending role.
        role: Iri,
    },
    /// A non simple role (one with a chain or a non simple sub role) is
    /// used inside a cardinality restriction.
    #[error("non-simple role {role} used in a cardinality restriction")]
    NonSimpleRoleInCardinality {
        /// The offending role.
        role: Iri,
    },
    /// The sub property graph contains a cycle that is not an equivalence.
    #[error("role hierarchy contains an irregular cycle through {role}")]
    IrregularRoleHierarchy {
        /// A role on the cycle.
        role: Iri,
    },
    /// A property chain mentions the implied property at a position other
    /// than its ends.
    #[error("irregular property chain implying {role}")]
    IrregularPropertyChain {
        /// The implied role.
        role: Iri,
    },
    /// Two declared characteristics contradict each other.
    #[error("role {role} declared both {first} and {second}")]
    IncompatibleCharacteristics {
        /// The offending role.
        role: Iri,
        /// The first characteristic.
        first: &'static str,
        /// The second characteristic.
        second: &'static str,
    },
}

/// An in memory ontology: declarations plus axioms.
///
/// Ontologies arrive fully built. Derived structures (the ontology index
/// and the hierarchies) are computed from this bundle and become stale if
/// it is mutated afterwards, so mutation is only expected between reasoner
/// constructions.
#[derive(Clone, Debug, Default)]
pub struct Ontology {
    /// Declared named classes.
    pub classes: BTreeSet<Iri>,
    /// Declared object properties.
    pub object_properties: BTreeMap<Iri, ObjectProperty>,
    /// Declared data properties.
    pub data_properties: BTreeMap<Iri, DataProperty>,
    /// Declared named individuals.
    pub individuals: BTreeSet<Iri>,
    /// All axioms in insertion order.
    pub axioms: Vec<Axiom>,
}

impl Ontology {
    /// Creates an empty ontology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a named class.
    pub fn declare_class(&mut self, iri: impl Into<Iri>) {
        self.classes.insert(iri.into());
    }

    /// Declares a named individual.
    pub fn declare_individual(&mut self, iri: impl Into<Iri>) {
        self.individuals.insert(iri.into());
    }

    /// Declares an object property, returning its record for further setup.
    pub fn object_property_mut(&mut self, iri: impl Into<Iri>) -> &mut ObjectProperty {
        self.object_properties.entry(iri.into()).or_default()
    }

    /// Declares a data property, returning its record for further setup.
    pub fn data_property_mut(&mut self, iri: impl Into<Iri>) -> &mut DataProperty {
        self.data_properties.entry(iri.into()).or_default()
    }

    /// Adds an axiom, folding role axioms into the property records so the
    /// role hierarchy sees a single source of truth.
    pub fn add_axiom(&mut self, axiom: Axiom) {
        match &axiom {
            Axiom::SubClassOf(sub, sup) => {
                self.note_classes(sub);
                self.note_classes(sup);
            }
            Axiom::EquivalentClasses(cs) | Axiom::DisjointClasses(cs) => {
                for c in cs {
                    self.note_classes(c);
                }
            }
            Axiom::DisjointUnion(name, cs) => {
                self.classes.insert(name.clone());
                for c in cs {
                    self.note_classes(c);
                }
            }
            Axiom::ClassAssertion(c, individual) => {
                self.note_classes(c);
                self.individuals.insert(individual.clone());
            }
            Axiom::ObjectPropertyAssertion(p, s, o) => {
                self.object_property_mut(p.clone());
                self.individuals.insert(s.clone());
                self.individuals.insert(o.clone());
            }
            Axiom::DataPropertyAssertion(p, s, _) => {
                self.data_property_mut(p.clone());
                self.individuals.insert(s.clone());
            }
            Axiom::SubObjectProperty(sub, sup) => {
                self.object_property_mut(sup.clone());
                self.object_property_mut(sub.clone())
                    .super_properties
                    .insert(sup.clone());
            }
            Axiom::EquivalentObjectProperties(a, b) => {
                self.object_property_mut(a.clone())
                    .super_properties
                    .insert(b.clone());
                self.object_property_mut(b.clone())
                    .super_properties
                    .insert(a.clone());
            }
            Axiom::InverseObjectProperties(a, b) => {
                self.object_property_mut(a.clone()).inverse = Some(b.clone());
                self.object_property_mut(b.clone()).inverse = Some(a.clone());
            }
            Axiom::SubPropertyChain(chain, implied) => {
                for role in chain {
                    self.object_property_mut(role.clone());
                }
                self.object_property_mut(implied.clone())
                    .chains
                    .push(chain.clone());
            }
            Axiom::TransitiveProperty(p) => {
                self.object_property_mut(p.clone()).characteristics.transitive = true;
            }
            Axiom::SymmetricProperty(p) => {
                self.object_property_mut(p.clone()).characteristics.symmetric = true;
            }
            Axiom::AsymmetricProperty(p) => {
                self.object_property_mut(p.clone()).characteristics.asymmetric = true;
            }
            Axiom::ReflexiveProperty(p) => {
                self.object_property_mut(p.clone()).characteristics.reflexive = true;
            }
            Axiom::IrreflexiveProperty(p) => {
                self.object_property_mut(p.clone()).characteristics.irreflexive = true;
            }
            Axiom::FunctionalProperty(p) => {
                self.object_property_mut(p.clone()).characteristics.functional = true;
            }
            Axiom::InverseFunctionalProperty(p) => {
                self.object_property_mut(p.clone())
                    .characteristics
                    .inverse_functional = true;
            }
            Axiom::ObjectPropertyDomain(p, c) => {
                self.note_classes(c);
                self.object_property_mut(p.clone()).domains.push(c.clone());
            }
            Axiom::ObjectPropertyRange(p, c) => {
                self.note_classes(c);
                self.object_property_mut(p.clone()).ranges.push(c.clone());
            }
        }
        self.axioms.push(axiom);
    }

    fn note_classes(&mut self, expr: &ClassExpression) {
        use ClassExpression::*;
        match expr {
            Class(iri) => {
                self.classes.insert(iri.clone());
            }
            Not(c) => self.note_classes(c),
            And(cs) | Or(cs) => {
                for c in cs {
                    self.note_classes(c);
                }
            }
            SomeValues(_, c) | AllValues(_, c) | MinCardinality(_, _, c)
            | MaxCardinality(_, _, c) => self.note_classes(c),
            _ => {}
        }
    }

    /// Roles that are *simple*: no chain implies them and no transitive or
    /// chained role sits below them in the hierarchy.
    pub fn simple_roles(&self) -> BTreeSet<Iri> {
        // sub role edges, super -> subs
        let mut subs: BTreeMap<&Iri, Vec<&Iri>> = BTreeMap::new();
        for (iri, prop) in &self.object_properties {
            for sup in &prop.super_properties {
                subs.entry(sup).or_default().push(iri);
            }
        }
        let mut simple = BTreeSet::new();
        'roles: for iri in self.object_properties.keys() {
            // walk everything at or below the role
            let mut stack = vec![iri];
            let mut seen = BTreeSet::new();
            while let Some(role) = stack.pop() {
                if !seen.insert(role) {
                    continue;
                }
                if let Some(prop) = self.object_properties.get(role) {
                    if prop.characteristics.transitive || !prop.chains.is_empty() {
                        continue 'roles;
                    }
                }
                if let Some(below) = subs.get(role) {
                    stack.extend(below.iter().copied());
                }
            }
            simple.insert(iri.clone());
        }
        simple
    }

    /// Checks the OWL DL regularity conditions, returning every violation.
    pub fn check_owl_dl_regularity(&self) -> Vec<RegularityViolation> {
        let mut violations = Vec::new();
        let simple = self.simple_roles();

        // roles used in cardinality restrictions
        let mut cardinality_roles = BTreeSet::new();
        for axiom in &self.axioms {
            match axiom {
                Axiom::SubClassOf(a, b) => {
                    collect_cardinality_roles(a, &mut cardinality_roles);
                    collect_cardinality_roles(b, &mut cardinality_roles);
                }
                Axiom::EquivalentClasses(cs)
                | Axiom::DisjointClasses(cs)
                | Axiom::DisjointUnion(_, cs) => {
                    for c in cs {
                        collect_cardinality_roles(c, &mut cardinality_roles);
                    }
                }
                Axiom::ClassAssertion(c, _) => collect_cardinality_roles(c, &mut cardinality_roles),
                _ => {}
            }
        }
        for role in &cardinality_roles {
            let transitive = self
                .object_properties
                .get(role)
                .map(|p| p.characteristics.transitive)
                .unwrap_or(false);
            if transitive {
                violations.push(RegularityViolation::TransitiveInCardinality {
                    role: role.clone(),
                });
            } else if self.object_properties.contains_key(role) && !simple.contains(role) {
                violations.push(RegularityViolation::NonSimpleRoleInCardinality {
                    role: role.clone(),
                });
            }
        }

        // strict sub property cycles that are not two way equivalences
        for (iri, prop) in &self.object_properties {
            for sup in &prop.super_properties {
                if sup == iri {
                    continue;
                }
                if self.reaches(sup, iri) && !self.reaches_directly_back(iri, sup) {
                    violations.push(RegularityViolation::IrregularRoleHierarchy {
                        role: iri.clone(),
                    });
                    break;
                }
            }
        }

        // chains may mention the implied role only at the ends
        for (iri, prop) in &self.object_properties {
            for chain in &prop.chains {
                if chain.len() < 3 {
                    continue;
                }
                let bad_interior = chain[1..chain.len() - 1].contains(iri);
                let both_ends = chain.first() == Some(iri) && chain.last() == Some(iri);
                if bad_interior || both_ends {
                    violations.push(RegularityViolation::IrregularPropertyChain {
                        role: iri.clone(),
                    });
                }
            }
        }

        // contradictory characteristics
        for (iri, prop) in &self.object_properties {
            let c = prop.characteristics;
            for (cond, first, second) in [
                (c.symmetric && c.asymmetric, "symmetric", "asymmetric"),
                (c.asymmetric && c.reflexive, "asymmetric", "reflexive"),
                (c.irreflexive && c.reflexive, "irreflexive", "reflexive"),
            ] {
                if cond {
                    violations.push(RegularityViolation::IncompatibleCharacteristics {
                        role: iri.clone(),
                        first,
                        second,
                    });
                }
            }
        }

        violations
    }

    fn reaches(&self, from: &Iri, to: &Iri) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(role) = stack.pop() {
            if role == to {
                return true;
            }
            if !seen.insert(role.clone()) {
                continue;
            }
            if let Some(prop) = self.object_properties.get(role) {
                stack.extend(prop.super_properties.iter());
            }
        }
        false
    }

    fn reaches_directly_back(&self, a: &Iri, b: &Iri) -> bool {
        // an equivalence pair is stored as mutual direct super property edges
        let a_to_b = self
            .object_properties
            .get(a)
            .map(|p| p.super_properties.contains(b))
            .unwrap_or(false);
        let b_to_a = self
            .object_properties
            .get(b)
            .map(|p| p.super_properties.contains(a))
            .unwrap_or(false);
        a_to_b && b_to_a
    }
}

fn collect_cardinality_roles(expr: &ClassExpression, out: &mut BTreeSet<Iri>) {
    use ClassExpression::*;
    match expr {
        MinCardinality(_, role, c) | MaxCardinality(_, role, c) => {
            out.insert(role.clone());
            collect_cardinality_roles(c, out);
        }
        Not(c) => collect_cardinality_roles(c, out),
        And(cs) | Or(cs) => {
            for c in cs {
                collect_cardinality_roles(c, out);
            }
        }
        SomeValues(_, c) | AllValues(_, c) => collect_cardinality_roles(c, out),
        _ => {}
    }
}
