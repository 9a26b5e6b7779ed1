use crate::expr::ClassExpression;
use crate::iri::Iri;
use crate::ontology::{Axiom, Characteristics, Ontology};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Transitive closure of a direct-edge map.
///
/// Kahn style: peel nodes whose out edges all lead to finished nodes, so
/// roots of the super graph are folded first. Equivalence cycles survive
/// the peeling and are finished by fixpoint iteration over the residue.
fn transitive_closure(direct: &FnvHashMap<Iri, BTreeSet<Iri>>) -> FnvHashMap<Iri, BTreeSet<Iri>> {
    let mut closure: FnvHashMap<Iri, BTreeSet<Iri>> = FnvHashMap::default();
    let mut pending: BTreeSet<Iri> = direct.keys().cloned().collect();

    let mut progress = true;
    while progress {
        progress = false;
        let ready: Vec<Iri> = pending
            .iter()
            .filter(|node| {
                direct[*node]
                    .iter()
                    .all(|next| !pending.contains(next) || next == *node)
            })
            .cloned()
            .collect();
        for node in ready {
            let mut set = BTreeSet::new();
            for next in &direct[&node] {
                if next == &node {
                    continue;
                }
                set.insert(next.clone());
                if let Some(beyond) = closure.get(next) {
                    set.extend(beyond.iter().cloned());
                }
            }
            closure.insert(node.clone(), set);
            pending.remove(&node);
            progress = true;
        }
    }

    // residue: cycles induced by equivalences, iterate to fixpoint
    while {
        let mut changed = false;
        for node in &pending {
            let mut set = closure.get(node).cloned().unwrap_or_default();
            let before = set.len();
            for next in &direct[node] {
                if next == node {
                    continue;
                }
                set.insert(next.clone());
                if let Some(beyond) = closure.get(next) {
                    set.extend(beyond.iter().cloned());
                }
            }
            if set.len() != before || !closure.contains_key(node) {
                closure.insert(node.clone(), set);
                changed = true;
            }
        }
        changed
    } {}

    closure
}

fn invert(direct: &FnvHashMap<Iri, BTreeSet<Iri>>) -> FnvHashMap<Iri, BTreeSet<Iri>> {
    let mut inverted: FnvHashMap<Iri, BTreeSet<Iri>> = FnvHashMap::default();
    for (from, tos) in direct {
        inverted.entry(from.clone()).or_default();
        for to in tos {
            inverted.entry(to.clone()).or_default().insert(from.clone());
        }
    }
    inverted
}

#[derive(Debug, Default)]
struct Closures {
    up: FnvHashMap<Iri, BTreeSet<Iri>>,
    down: FnvHashMap<Iri, BTreeSet<Iri>>,
}

/// The named class hierarchy.
///
/// Direct edges are authoritative. The transitive closures are cached and
/// recomputed lazily; any mutation invalidates them.
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    supers: FnvHashMap<Iri, BTreeSet<Iri>>,
    subs: FnvHashMap<Iri, BTreeSet<Iri>>,
    equivalents: FnvHashMap<Iri, BTreeSet<Iri>>,
    disjoints: FnvHashMap<Iri, BTreeSet<Iri>>,
    defined: FnvHashMap<Iri, ClassExpression>,
    closures: RwLock<Option<Closures>>,
}

impl Clone for ClassHierarchy {
    fn clone(&self) -> Self {
        Self {
            supers: self.supers.clone(),
            subs: self.subs.clone(),
            equivalents: self.equivalents.clone(),
            disjoints: self.disjoints.clone(),
            defined: self.defined.clone(),
            closures: RwLock::new(None),
        }
    }
}

impl ClassHierarchy {
    /// Creates an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the hierarchy from the named-class fragment of an ontology's
    /// TBox.
    pub fn from_ontology(ontology: &Ontology) -> Self {
        let mut hierarchy = Self::new();
        for axiom in &ontology.axioms {
            match axiom {
                Axiom::SubClassOf(ClassExpression::Class(sub), ClassExpression::Class(sup)) => {
                    hierarchy.add_subsumption(sub.clone(), sup.clone());
                }
                Axiom::EquivalentClasses(exprs) => {
                    let named: Vec<&Iri> = exprs
                        .iter()
                        .filter_map(|e| match e {
                            ClassExpression::Class(iri) => Some(iri),
                            _ => None,
                        })
                        .collect();
                    for pair in named.windows(2) {
                        hierarchy.add_equivalence(pair[0].clone(), pair[1].clone());
                    }
                    // a named class equivalent to a single complex expression
                    // is recorded as defined by it
                    if let [ClassExpression::Class(name), expr] = exprs.as_slice() {
                        if !matches!(expr, ClassExpression::Class(_)) {
                            hierarchy.set_defined(name.clone(), expr.clone());
                        }
                    }
                }
                Axiom::DisjointClasses(exprs) => {
                    let named: Vec<&Iri> = exprs
                        .iter()
                        .filter_map(|e| match e {
                            ClassExpression::Class(iri) => Some(iri),
                            _ => None,
                        })
                        .collect();
                    for (i, a) in named.iter().enumerate() {
                        for b in &named[i + 1..] {
                            hierarchy.add_disjoint((*a).clone(), (*b).clone());
                        }
                    }
                }
                Axiom::DisjointUnion(name, parts) => {
                    let named: Vec<&Iri> = parts
                        .iter()
                        .filter_map(|e| match e {
                            ClassExpression::Class(iri) => Some(iri),
                            _ => None,
                        })
                        .collect();
                    for (i, part) in named.iter().enumerate() {
                        hierarchy.add_subsumption((*part).clone(), name.clone());
                        for other in &named[i + 1..] {
                            hierarchy.add_disjoint((*part).clone(), (*other).clone());
                        }
                    }
                }
                _ => {}
            }
        }
        hierarchy
    }

    /// Adds `sub ⊑ sup` and invalidates the closures.
    pub fn add_subsumption(&mut self, sub: Iri, sup: Iri) {
        self.supers.entry(sub.clone()).or_default().insert(sup.clone());
        self.subs.entry(sup.clone()).or_default().insert(sub.clone());
        self.supers.entry(sup).or_default();
        self.subs.entry(sub).or_default();
        self.invalidate();
    }

    /// Adds `a ≡ b` and invalidates the closures.
    pub fn add_equivalence(&mut self, a: Iri, b: Iri) {
        self.equivalents.entry(a.clone()).or_default().insert(b.clone());
        self.equivalents.entry(b.clone()).or_default().insert(a.clone());
        // equivalence subsumes both ways for closure purposes
        self.supers.entry(a.clone()).or_default().insert(b.clone());
        self.supers.entry(b.clone()).or_default().insert(a.clone());
        self.subs.entry(a.clone()).or_default().insert(b.clone());
        self.subs.entry(b).or_default().insert(a);
        self.invalidate();
    }

    /// Adds a pairwise disjointness and invalidates the closures.
    pub fn add_disjoint(&mut self, a: Iri, b: Iri) {
        self.disjoints.entry(a.clone()).or_default().insert(b.clone());
        self.disjoints.entry(b).or_default().insert(a);
        self.invalidate();
    }

    /// Records that a named class is defined by an expression.
    pub fn set_defined(&mut self, class: Iri, expr: ClassExpression) {
        self.defined.insert(class, expr);
        self.invalidate();
    }

    /// The defining expression of a named class, if one was recorded.
    pub fn defined_as(&self, class: &Iri) -> Option<&ClassExpression> {
        self.defined.get(class)
    }

    /// Direct super classes.
    pub fn direct_supers(&self, class: &Iri) -> BTreeSet<Iri> {
        self.supers.get(class).cloned().unwrap_or_default()
    }

    /// Direct sub classes.
    pub fn direct_subs(&self, class: &Iri) -> BTreeSet<Iri> {
        self.subs.get(class).cloned().unwrap_or_default()
    }

    /// Declared equivalents.
    pub fn equivalents(&self, class: &Iri) -> BTreeSet<Iri> {
        self.equivalents.get(class).cloned().unwrap_or_default()
    }

    /// All strict ancestors, from the cached closure.
    pub fn ancestors(&self, class: &Iri) -> BTreeSet<Iri> {
        self.ensure_closures();
        let guard = self.closures.read();
        guard
            .as_ref()
            .and_then(|c| c.up.get(class))
            .cloned()
            .unwrap_or_default()
    }

    /// All strict descendants, from the cached closure.
    pub fn descendants(&self, class: &Iri) -> BTreeSet<Iri> {
        self.ensure_closures();
        let guard = self.closures.read();
        guard
            .as_ref()
            .and_then(|c| c.down.get(class))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true if `sub ⊑ sup` holds in the closure. Reflexive, and
    /// `owl:Thing`/`owl:Nothing` behave as top and bottom.
    pub fn is_subclass_of(&self, sub: &Iri, sup: &Iri) -> bool {
        if sub == sup || sup.as_str() == crate::iri::OWL_THING || sub.as_str() == crate::iri::OWL_NOTHING
        {
            return true;
        }
        self.ancestors(sub).contains(sup)
    }

    /// Returns true if the hierarchy marks the two classes disjoint,
    /// directly or through any pair of ancestors.
    pub fn are_disjoint(&self, a: &Iri, b: &Iri) -> bool {
        let mut up_a = self.ancestors(a);
        up_a.insert(a.clone());
        let mut up_b = self.ancestors(b);
        up_b.insert(b.clone());
        for x in &up_a {
            if let Some(disjoint) = self.disjoints.get(x) {
                if up_b.iter().any(|y| disjoint.contains(y)) {
                    return true;
                }
            }
        }
        false
    }

    fn invalidate(&mut self) {
        *self.closures.get_mut() = None;
    }

    fn ensure_closures(&self) {
        if self.closures.read().is_some() {
            return;
        }
        let up = transitive_closure(&self.supers);
        let down = transitive_closure(&invert(&self.supers));
        *self.closures.write() = Some(Closures { up, down });
    }
}

/// The role hierarchy for object properties: super and sub role edges,
/// inverses, characteristics, chains, domains and ranges.
#[derive(Debug, Default)]
pub struct RoleHierarchy {
    supers: FnvHashMap<Iri, BTreeSet<Iri>>,
    inverses: FnvHashMap<Iri, Iri>,
    characteristics: FnvHashMap<Iri, Characteristics>,
    chains: Vec<(Vec<Iri>, Iri)>,
    domains: FnvHashMap<Iri, Vec<ClassExpression>>,
    ranges: FnvHashMap<Iri, Vec<ClassExpression>>,
    closures: RwLock<Option<Closures>>,
}

impl Clone for RoleHierarchy {
    fn clone(&self) -> Self {
        Self {
            supers: self.supers.clone(),
            inverses: self.inverses.clone(),
            characteristics: self.characteristics.clone(),
            chains: self.chains.clone(),
            domains: self.domains.clone(),
            ranges: self.ranges.clone(),
            closures: RwLock::new(None),
        }
    }
}

impl RoleHierarchy {
    /// Creates an empty role hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the role hierarchy from an ontology's property records.
    pub fn from_ontology(ontology: &Ontology) -> Self {
        let mut roles = Self::new();
        for (iri, prop) in &ontology.object_properties {
            roles.supers.entry(iri.clone()).or_default();
            for sup in &prop.super_properties {
                roles.add_sub_role(iri.clone(), sup.clone());
            }
            if let Some(inverse) = &prop.inverse {
                roles.set_inverse(iri.clone(), inverse.clone());
            }
            roles.characteristics.insert(iri.clone(), prop.characteristics);
            for chain in &prop.chains {
                roles.chains.push((chain.clone(), iri.clone()));
            }
            roles.domains.insert(iri.clone(), prop.domains.clone());
            roles.ranges.insert(iri.clone(), prop.ranges.clone());
        }
        roles
    }

    /// Adds `sub ⊑ sup` and invalidates the closures.
    pub fn add_sub_role(&mut self, sub: Iri, sup: Iri) {
        self.supers.entry(sub.clone()).or_default().insert(sup.clone());
        self.supers.entry(sup).or_default();
        *self.closures.get_mut() = None;
    }

    /// Declares two roles as inverses of each other.
    pub fn set_inverse(&mut self, a: Iri, b: Iri) {
        self.inverses.insert(a.clone(), b.clone());
        self.inverses.insert(b, a);
    }

    /// The declared inverse of a role.
    pub fn inverse(&self, role: &Iri) -> Option<&Iri> {
        self.inverses.get(role)
    }

    /// Declared characteristics, defaulting to none.
    pub fn characteristics(&self, role: &Iri) -> Characteristics {
        self.characteristics.get(role).copied().unwrap_or_default()
    }

    /// All super roles of `role`, the role itself included.
    pub fn super_roles(&self, role: &Iri) -> BTreeSet<Iri> {
        self.ensure_closures();
        let guard = self.closures.read();
        let mut set = guard
            .as_ref()
            .and_then(|c| c.up.get(role))
            .cloned()
            .unwrap_or_default();
        set.insert(role.clone());
        set
    }

    /// All sub roles of `role`, the role itself included.
    pub fn sub_roles(&self, role: &Iri) -> BTreeSet<Iri> {
        self.ensure_closures();
        let guard = self.closures.read();
        let mut set = guard
            .as_ref()
            .and_then(|c| c.down.get(role))
            .cloned()
            .unwrap_or_default();
        set.insert(role.clone());
        set
    }

    /// Domain expressions applying to edges of `role`, super role domains
    /// included.
    pub fn all_domains(&self, role: &Iri) -> Vec<ClassExpression> {
        let mut out = Vec::new();
        for sup in self.super_roles(role) {
            if let Some(domains) = self.domains.get(&sup) {
                out.extend(domains.iter().cloned());
            }
        }
        out
    }

    /// Range expressions applying to edges of `role`, super role ranges
    /// included.
    pub fn all_ranges(&self, role: &Iri) -> Vec<ClassExpression> {
        let mut out = Vec::new();
        for sup in self.super_roles(role) {
            if let Some(ranges) = self.ranges.get(&sup) {
                out.extend(ranges.iter().cloned());
            }
        }
        out
    }

    /// The declared property chains as `(chain, implied role)` pairs.
    pub fn chains(&self) -> &[(Vec<Iri>, Iri)] {
        &self.chains
    }

    /// Roles declared transitive.
    pub fn transitive_roles(&self) -> impl Iterator<Item = &Iri> {
        self.characteristics
            .iter()
            .filter(|(_, c)| c.transitive)
            .map(|(iri, _)| iri)
    }

    fn ensure_closures(&self) {
        if self.closures.read().is_some() {
            return;
        }
        let up = transitive_closure(&self.supers);
        let down = transitive_closure(&invert(&self.supers));
        *self.closures.write() = Some(Closures { up, down });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> Iri {
        Iri::new(s)
    }

    #[test]
    fn ancestors_follow_chains() {
        let mut h = ClassHierarchy::new();
        h.add_subsumption(iri("Dog"), iri("Mammal"));
        h.add_subsumption(iri("Mammal"), iri("Animal"));
        let up = h.ancestors(&iri("Dog"));
        assert!(up.contains(&iri("Mammal")));
        assert!(up.contains(&iri("Animal")));
        assert!(h.is_subclass_of(&iri("Dog"), &iri("Animal")));
        assert!(!h.is_subclass_of(&iri("Animal"), &iri("Dog")));
        assert!(h.descendants(&iri("Animal")).contains(&iri("Dog")));
    }

    #[test]
    fn mutation_invalidates_closures() {
        let mut h = ClassHierarchy::new();
        h.add_subsumption(iri("Dog"), iri("Mammal"));
        assert!(!h.is_subclass_of(&iri("Dog"), &iri("Animal")));
        h.add_subsumption(iri("Mammal"), iri("Animal"));
        assert!(h.is_subclass_of(&iri("Dog"), &iri("Animal")));
    }

    #[test]
    fn equivalence_cycles_close() {
        let mut h = ClassHierarchy::new();
        h.add_equivalence(iri("Person"), iri("Human"));
        h.add_subsumption(iri("Human"), iri("Animal"));
        assert!(h.is_subclass_of(&iri("Person"), &iri("Animal")));
        assert!(h.is_subclass_of(&iri("Person"), &iri("Human")));
        assert!(h.is_subclass_of(&iri("Human"), &iri("Person")));
    }

    #[test]
    fn disjointness_is_inherited() {
        let mut h = ClassHierarchy::new();
        h.add_subsumption(iri("Dog"), iri("Mammal"));
        h.add_subsumption(iri("Trout"), iri("Fish"));
        h.add_disjoint(iri("Mammal"), iri("Fish"));
        assert!(h.are_disjoint(&iri("Dog"), &iri("Trout")));
        assert!(!h.are_disjoint(&iri("Dog"), &iri("Mammal")));
    }

    #[test]
    fn role_closure_and_characteristics() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::SubObjectProperty(iri("parent"), iri("ancestor")));
        onto.add_axiom(Axiom::TransitiveProperty(iri("ancestor")));
        onto.add_axiom(Axiom::InverseObjectProperties(iri("parent"), iri("child")));
        let roles = RoleHierarchy::from_ontology(&onto);
        assert!(roles.super_roles(&iri("parent")).contains(&iri("ancestor")));
        assert!(roles.sub_roles(&iri("ancestor")).contains(&iri("parent")));
        assert!(roles.characteristics(&iri("ancestor")).transitive);
        assert_eq!(roles.inverse(&iri("parent")), Some(&iri("child")));
        assert_eq!(roles.transitive_roles().count(), 1);
    }
}
