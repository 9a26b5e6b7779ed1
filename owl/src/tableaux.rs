use crate::expr::ClassExpression;
use crate::graph::CompletionGraph;
use crate::hierarchy::{ClassHierarchy, RoleHierarchy};
use crate::index::OntologyIndex;
use crate::iri::Iri;
use crate::ontology::{Axiom, Ontology, RegularityViolation};
use crate::rules::Rules;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The three valued result of a satisfiability check.
///
/// `Unknown` is not an error: it is what a budgeted decision procedure
/// returns when it runs out of steps or time, and callers that need a
/// boolean must project it conservatively.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Satisfiability {
    /// A model was found.
    Satisfiable,
    /// Every branch closed with a clash.
    Unsatisfiable,
    /// The procedure gave up before deciding.
    Unknown,
}

/// Budgets and toggles for a [`Reasoner`].
#[derive(Clone, Copy, Debug)]
pub struct ReasonerConfig {
    /// Outer expansion steps before giving up.
    pub max_expansion_steps: usize,
    /// Wall clock budget per satisfiability call. The deadline is computed
    /// when the call starts, not when the reasoner is built.
    pub timeout: Duration,
    /// Refuse definitive answers on ontologies with OWL DL regularity
    /// violations.
    pub check_regularity: bool,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            max_expansion_steps: 10_000,
            timeout: Duration::from_secs(30),
            check_regularity: true,
        }
    }
}

/// Counters kept across reasoner calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReasonerStats {
    /// Satisfiability checks that ran a tableaux expansion.
    pub satisfiability_checks: u64,
    /// Calls answered from a cache.
    pub cache_hits: u64,
    /// Outer expansion steps across all runs.
    pub expansion_steps: u64,
    /// Choice points revisited.
    pub backtracks: u64,
    /// Clashes found.
    pub clashes: u64,
    /// Runs that ended in `Unknown` from a budget.
    pub budget_exhaustions: u64,
}

struct State {
    classes: ClassHierarchy,
    sat_cache: FnvHashMap<[u8; 32], Satisfiability>,
    subsumption_cache: FnvHashMap<([u8; 32], [u8; 32]), bool>,
    individual_types: FnvHashMap<Iri, ClassExpression>,
    stats: ReasonerStats,
}

/// An OWL DL tableaux reasoner over one ontology.
///
/// The reasoner is safe to share across threads: the caches, the class
/// hierarchy and the statistics live behind a single lock, and every
/// satisfiability call expands a private scratch completion graph.
pub struct Reasoner {
    index: Arc<OntologyIndex>,
    roles: Arc<RoleHierarchy>,
    tbox_nnf: Vec<ClassExpression>,
    violations: Vec<RegularityViolation>,
    config: ReasonerConfig,
    state: Mutex<State>,
}

impl Reasoner {
    /// Builds a reasoner with the default configuration.
    pub fn new(ontology: &Ontology) -> Self {
        Self::with_config(ontology, ReasonerConfig::default())
    }

    /// Builds a reasoner with an explicit configuration.
    pub fn with_config(ontology: &Ontology, config: ReasonerConfig) -> Self {
        let index = Arc::new(OntologyIndex::build(ontology));
        let roles = Arc::new(RoleHierarchy::from_ontology(ontology));
        let classes = ClassHierarchy::from_ontology(ontology);
        let tbox_nnf = lower_tbox(index.tbox());
        let violations = ontology.check_owl_dl_regularity();
        Self {
            index,
            roles,
            tbox_nnf,
            violations,
            config,
            state: Mutex::new(State {
                classes,
                sat_cache: FnvHashMap::default(),
                subsumption_cache: FnvHashMap::default(),
                individual_types: FnvHashMap::default(),
                stats: ReasonerStats::default(),
            }),
        }
    }

    /// The regularity violations found at construction.
    pub fn regularity_violations(&self) -> &[RegularityViolation] {
        &self.violations
    }

    /// A snapshot of the statistics.
    pub fn stats(&self) -> ReasonerStats {
        self.state.lock().stats
    }

    /// Checks whether a class expression is satisfiable with respect to
    /// the TBox.
    pub fn check_satisfiability(&self, expr: &ClassExpression) -> Satisfiability {
        if self.config.check_regularity && !self.violations.is_empty() {
            tracing::debug!(
                violations = self.violations.len(),
                "refusing to decide over an irregular ontology"
            );
            return Satisfiability::Unknown;
        }
        let key = expr.cache_key();
        let classes = {
            let mut state = self.state.lock();
            if let Some(cached) = state.sat_cache.get(&key).copied() {
                state.stats.cache_hits += 1;
                return cached;
            }
            state.stats.satisfiability_checks += 1;
            state.classes.clone()
        };

        let deadline = Instant::now() + self.config.timeout;
        let rules = Rules::new(&self.tbox_nnf, &classes, &self.roles);
        let mut graph = CompletionGraph::new(self.roles.clone());
        let root = graph.create_node(None);
        graph.add_concept(root, expr.nnf());
        rules.init_node(&mut graph, root);

        let mut stats = ReasonerStats::default();
        let result = self.expand(&mut graph, &rules, deadline, &mut stats);

        let mut state = self.state.lock();
        state.stats.expansion_steps += stats.expansion_steps;
        state.stats.backtracks += stats.backtracks;
        state.stats.clashes += stats.clashes;
        state.stats.budget_exhaustions += stats.budget_exhaustions;
        if result != Satisfiability::Unknown {
            // `Unknown` depends on the budget of this call, caching it
            // would poison calls with a larger budget
            state.sat_cache.insert(key, result);
        }
        result
    }

    fn expand(
        &self,
        graph: &mut CompletionGraph,
        rules: &Rules,
        deadline: Instant,
        stats: &mut ReasonerStats,
    ) -> Satisfiability {
        let mut steps = 0usize;
        loop {
            if steps >= self.config.max_expansion_steps || Instant::now() >= deadline {
                stats.budget_exhaustions += 1;
                return Satisfiability::Unknown;
            }
            steps += 1;
            stats.expansion_steps += 1;

            graph.update_blocking();

            if let Some(clash) = rules.detect_clash(graph) {
                stats.clashes += 1;
                tracing::trace!(?clash, "clash");
                match graph.backtrack() {
                    Some((node, alternative)) => {
                        stats.backtracks += 1;
                        rules.apply_alternative(graph, node, alternative);
                        continue;
                    }
                    None => return Satisfiability::Unsatisfiable,
                }
            }

            let mut fired = false;
            while rules.apply_deterministic(graph) {
                fired = true;
                if Instant::now() >= deadline {
                    stats.budget_exhaustions += 1;
                    return Satisfiability::Unknown;
                }
            }
            if rules.detect_clash(graph).is_some() {
                // handled at the top of the loop, with backtracking
                continue;
            }

            fired |= rules.apply_generating(graph);
            fired |= rules.apply_nondeterministic(graph);
            for (chain, implied) in self.roles.chains() {
                fired |= graph.apply_property_chain(chain, implied);
            }
            let transitive: Vec<Iri> = self.roles.transitive_roles().cloned().collect();
            for role in &transitive {
                fired |= graph.expand_transitive_role(role);
            }

            if !fired {
                return Satisfiability::Satisfiable;
            }
        }
    }

    /// `sub ⊑ sup`, answered conservatively: only a definite
    /// unsatisfiability of `sub ⊓ ¬sup` counts as `true`.
    pub fn subsumes(&self, sup: &ClassExpression, sub: &ClassExpression) -> bool {
        let key = (sup.cache_key(), sub.cache_key());
        if let Some(cached) = {
            let mut state = self.state.lock();
            let cached = state.subsumption_cache.get(&key).copied();
            if cached.is_some() {
                state.stats.cache_hits += 1;
            }
            cached
        } {
            return cached;
        }
        let test = ClassExpression::And(vec![sub.clone(), sup.complement()]);
        let result = self.check_satisfiability(&test) == Satisfiability::Unsatisfiable;
        self.state.lock().subsumption_cache.insert(key, result);
        result
    }

    /// Two expressions subsume each other.
    pub fn are_equivalent(&self, a: &ClassExpression, b: &ClassExpression) -> bool {
        self.subsumes(a, b) && self.subsumes(b, a)
    }

    /// The intersection of the two expressions is definitely empty.
    pub fn are_disjoint(&self, a: &ClassExpression, b: &ClassExpression) -> bool {
        let test = ClassExpression::And(vec![a.clone(), b.clone()]);
        self.check_satisfiability(&test) == Satisfiability::Unsatisfiable
    }

    /// The TBox admits a model at all.
    pub fn is_consistent(&self) -> bool {
        self.check_satisfiability(&ClassExpression::Thing) == Satisfiability::Satisfiable
    }

    /// Tests every ordered pair of named classes and folds the discovered
    /// subsumptions into the class hierarchy. Returns the updated
    /// hierarchy.
    pub fn classify(&self) -> ClassHierarchy {
        let signature: Vec<Iri> = self.index.class_signature().iter().cloned().collect();
        let mut discovered = Vec::new();
        for sup in &signature {
            for sub in &signature {
                if sup == sub {
                    continue;
                }
                let sup_expr = ClassExpression::Class(sup.clone());
                let sub_expr = ClassExpression::Class(sub.clone());
                if self.subsumes(&sup_expr, &sub_expr) {
                    discovered.push((sub.clone(), sup.clone()));
                }
            }
        }
        let mut state = self.state.lock();
        for (sub, sup) in discovered {
            state.classes.add_subsumption(sub, sup);
        }
        state.classes.clone()
    }

    /// Checks whether an individual is an instance of an expression, by
    /// subsumption over the conjunction of every ABox fact about the
    /// individual.
    pub fn is_instance_of(&self, individual: &Iri, expr: &ClassExpression) -> bool {
        let individual_type = {
            let mut state = self.state.lock();
            if let Some(cached) = state.individual_types.get(individual) {
                cached.clone()
            } else {
                let built = self.individual_type(individual);
                state
                    .individual_types
                    .insert(individual.clone(), built.clone());
                built
            }
        };
        self.subsumes(expr, &individual_type)
    }

    /// Every named individual that is an instance of the expression.
    pub fn instances_of<'a>(
        &self,
        individuals: impl IntoIterator<Item = &'a Iri>,
        expr: &ClassExpression,
    ) -> Vec<Iri> {
        individuals
            .into_iter()
            .filter(|individual| self.is_instance_of(individual, expr))
            .cloned()
            .collect()
    }

    fn individual_type(&self, individual: &Iri) -> ClassExpression {
        let mut parts: Vec<ClassExpression> =
            self.index.class_assertions(individual).to_vec();
        for (property, object) in self.index.object_assertions_from(individual) {
            parts.push(ClassExpression::HasValue(property.clone(), object.clone()));
        }
        for (property, value) in self.index.data_assertions(individual) {
            parts.push(ClassExpression::DataHasValue(
                property.clone(),
                value.clone(),
            ));
        }
        match parts.len() {
            0 => ClassExpression::Thing,
            1 => parts.pop().unwrap(),
            _ => ClassExpression::And(parts),
        }
    }
}

/// Lowers TBox axioms to the NNF constraint disjunctions every node must
/// satisfy: `C ⊑ D` becomes `¬C ⊔ D`, an equivalence becomes both
/// directions.
fn lower_tbox(tbox: &[Axiom]) -> Vec<ClassExpression> {
    let mut constraints = Vec::new();
    let subsumption = |sub: &ClassExpression, sup: &ClassExpression| {
        ClassExpression::Or(vec![sub.complement(), sup.nnf()]).canonical()
    };
    for axiom in tbox {
        match axiom {
            Axiom::SubClassOf(sub, sup) => constraints.push(subsumption(sub, sup)),
            Axiom::EquivalentClasses(exprs) => {
                for pair in exprs.windows(2) {
                    constraints.push(subsumption(&pair[0], &pair[1]));
                    constraints.push(subsumption(&pair[1], &pair[0]));
                }
            }
            Axiom::DisjointClasses(exprs) => {
                for (i, a) in exprs.iter().enumerate() {
                    for b in &exprs[i + 1..] {
                        constraints
                            .push(ClassExpression::Or(vec![a.complement(), b.complement()])
                                .canonical());
                    }
                }
            }
            Axiom::DisjointUnion(name, parts) => {
                let name_expr = ClassExpression::Class(name.clone());
                let union = ClassExpression::Or(parts.clone());
                constraints.push(subsumption(&name_expr, &union));
                constraints.push(subsumption(&union, &name_expr));
                for (i, a) in parts.iter().enumerate() {
                    for b in &parts[i + 1..] {
                        constraints
                            .push(ClassExpression::Or(vec![a.complement(), b.complement()])
                                .canonical());
                    }
                }
            }
            _ => {}
        }
    }
    constraints.retain(|c| *c != ClassExpression::Thing);
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Literal;

    fn iri(s: &str) -> Iri {
        Iri::new(s)
    }

    fn class(s: &str) -> ClassExpression {
        ClassExpression::class(s)
    }

    fn animals() -> Ontology {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::SubClassOf(class("Dog"), class("Mammal")));
        onto.add_axiom(Axiom::SubClassOf(class("Mammal"), class("Animal")));
        onto
    }

    #[test]
    fn named_class_is_satisfiable() {
        let reasoner = Reasoner::new(&animals());
        assert_eq!(
            reasoner.check_satisfiability(&class("Dog")),
            Satisfiability::Satisfiable
        );
        assert_eq!(
            reasoner.check_satisfiability(&ClassExpression::Nothing),
            Satisfiability::Unsatisfiable
        );
        assert!(reasoner.is_consistent());
    }

    #[test]
    fn subsumption_follows_the_chain() {
        let reasoner = Reasoner::new(&animals());
        assert!(reasoner.subsumes(&class("Animal"), &class("Dog")));
        assert!(reasoner.subsumes(&class("Mammal"), &class("Dog")));
        assert!(!reasoner.subsumes(&class("Dog"), &class("Animal")));
        // reflexive
        assert!(reasoner.subsumes(&class("Dog"), &class("Dog")));
    }

    #[test]
    fn disjointness_closes_the_intersection() {
        let mut onto = animals();
        onto.add_axiom(Axiom::DisjointClasses(vec![class("Dog"), class("Cat")]));
        let reasoner = Reasoner::new(&onto);
        assert_eq!(
            reasoner.check_satisfiability(&ClassExpression::And(vec![
                class("Dog"),
                class("Cat"),
            ])),
            Satisfiability::Unsatisfiable
        );
        assert!(reasoner.are_disjoint(&class("Dog"), &class("Cat")));
        assert!(!reasoner.are_disjoint(&class("Dog"), &class("Mammal")));
    }

    #[test]
    fn exhausted_budget_is_unknown_and_conservative() {
        let reasoner = Reasoner::with_config(
            &animals(),
            ReasonerConfig {
                timeout: Duration::ZERO,
                ..ReasonerConfig::default()
            },
        );
        assert_eq!(
            reasoner.check_satisfiability(&class("Dog")),
            Satisfiability::Unknown
        );
        assert!(!reasoner.subsumes(&class("Animal"), &class("Dog")));
        assert!(!reasoner.are_disjoint(&class("Dog"), &class("Cat")));
        assert!(reasoner.stats().budget_exhaustions > 0);
    }

    #[test]
    fn irregular_ontology_is_unknown() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::TransitiveProperty(iri("r")));
        onto.add_axiom(Axiom::SubClassOf(
            class("A"),
            ClassExpression::MaxCardinality(1, iri("r"), Box::new(ClassExpression::Thing)),
        ));
        let reasoner = Reasoner::new(&onto);
        assert!(!reasoner.regularity_violations().is_empty());
        assert_eq!(
            reasoner.check_satisfiability(&class("A")),
            Satisfiability::Unknown
        );
        assert!(!reasoner.subsumes(&class("A"), &class("A")));
    }

    #[test]
    fn equivalence_and_complex_subsumers() {
        let mut onto = Ontology::new();
        onto.add_axiom(Axiom::EquivalentClasses(vec![
            class("Parent"),
            ClassExpression::SomeValues(iri("hasChild"), Box::new(ClassExpression::Thing)),
        ]));
        let reasoner = Reasoner::new(&onto);
        let some_child =
            ClassExpression::SomeValues(iri("hasChild"), Box::new(ClassExpression::Thing));
        assert!(reasoner.are_equivalent(&class("Parent"), &some_child));
    }

    #[test]
    fn universal_restriction_conflicts_with_existential() {
        let onto = Ontology::new();
        let reasoner = Reasoner::new(&onto);
        // ∃r.A ⊓ ∀r.¬A is unsatisfiable
        let expr = ClassExpression::And(vec![
            ClassExpression::SomeValues(iri("r"), Box::new(class("A"))),
            ClassExpression::AllValues(iri("r"), Box::new(class("A").complement())),
        ]);
        assert_eq!(
            reasoner.check_satisfiability(&expr),
            Satisfiability::Unsatisfiable
        );
    }

    #[test]
    fn cyclic_tbox_terminates_through_blocking() {
        let mut onto = Ontology::new();
        // every Person has a Person parent, satisfiable only via blocking
        onto.add_axiom(Axiom::SubClassOf(
            class("Person"),
            ClassExpression::SomeValues(iri("hasParent"), Box::new(class("Person"))),
        ));
        let reasoner = Reasoner::new(&onto);
        assert_eq!(
            reasoner.check_satisfiability(&class("Person")),
            Satisfiability::Satisfiable
        );
    }

    #[test]
    fn classification_discovers_the_hierarchy() {
        let mut onto = animals();
        onto.add_axiom(Axiom::EquivalentClasses(vec![
            class("Canine"),
            class("Dog"),
        ]));
        let reasoner = Reasoner::new(&onto);
        let hierarchy = reasoner.classify();
        assert!(hierarchy.is_subclass_of(&iri("Dog"), &iri("Animal")));
        assert!(hierarchy.is_subclass_of(&iri("Canine"), &iri("Animal")));
        assert!(!hierarchy.is_subclass_of(&iri("Animal"), &iri("Dog")));
    }

    #[test]
    fn instance_checking_uses_abox_facts() {
        let mut onto = animals();
        onto.add_axiom(Axiom::ClassAssertion(class("Dog"), iri("rex")));
        onto.add_axiom(Axiom::ObjectPropertyAssertion(
            iri("owns"),
            iri("alice"),
            iri("rex"),
        ));
        onto.add_axiom(Axiom::DataPropertyAssertion(
            iri("age"),
            iri("alice"),
            Literal::Int(30),
        ));
        let reasoner = Reasoner::new(&onto);
        assert!(reasoner.is_instance_of(&iri("rex"), &class("Animal")));
        assert!(!reasoner.is_instance_of(&iri("alice"), &class("Animal")));
        assert!(reasoner.is_instance_of(
            &iri("alice"),
            &ClassExpression::SomeValues(iri("owns"), Box::new(ClassExpression::Thing)),
        ));
        let instances = reasoner.instances_of(
            [iri("rex"), iri("alice")].iter(),
            &class("Animal"),
        );
        assert_eq!(instances, vec![iri("rex")]);
    }

    #[test]
    fn satisfiability_results_are_cached() {
        let reasoner = Reasoner::new(&animals());
        let expr = ClassExpression::And(vec![class("Dog"), class("Mammal")]);
        let same = ClassExpression::And(vec![class("Mammal"), class("Dog")]);
        reasoner.check_satisfiability(&expr);
        let before = reasoner.stats();
        reasoner.check_satisfiability(&same);
        let after = reasoner.stats();
        assert_eq!(after.cache_hits, before.cache_hits + 1);
        assert_eq!(
            after.satisfiability_checks,
            before.satisfiability_checks
        );
    }
}
