use crate::index::{GraphIndex, IndexError};
use crate::scan::{EdgeScanner, Pattern};
use crate::store::{StoreError, StoreTransaction};
use crate::tuple::{Element, Subspace, TupleError};
use anyhow::Result;
use bytecheck::CheckBytes;
use hexad_owl::{Materializer, Ontology, Triple, TripleSource};
use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Key prefix of the `dependents[antecedent][consequent]` direction.
const PREFIX_DEPENDENTS: i64 = 0;
/// Key prefix of the `dependencies[consequent][antecedent]` direction.
const PREFIX_DEPENDENCIES: i64 = 1;
/// Key prefix of the inferred-triple records.
const PREFIX_INFERRED: i64 = 2;

/// Default bound on the dependents cascade of one deletion.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 64;

/// An incremental maintenance failure.
#[derive(Debug, Error)]
pub enum DredError {
    /// A stored provenance record does not validate.
    #[error("malformed provenance record for triple {triple}")]
    BadProvenance {
        /// The inferred triple whose record is damaged.
        triple: String,
    },
    /// A store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A malformed key.
    #[error(transparent)]
    Tuple(#[from] TupleError),
    /// A scan failure.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// A materializer failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The persisted provenance of one inferred triple.
///
/// Each derivation is a complete antecedent set; the triple holds as
/// long as one derivation's antecedents all exist. The flat
/// dependents/dependencies links store the union of all derivations.
#[derive(Archive, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[archive_attr(derive(CheckBytes))]
pub struct Provenance {
    /// Derivations of the triple, each an antecedent list of
    /// `(subject, predicate, object)` triples.
    pub derivations: Vec<Vec<(String, String, String)>>,
    /// False while the inference is tentatively invalidated by a
    /// deletion in flight.
    pub is_valid: bool,
}

/// What a deletion did to the materialization.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeleteReport {
    /// Inferences that survived through an alternative derivation.
    pub rederived: Vec<Triple>,
    /// Inferences that lost their last derivation and were removed.
    pub purged: Vec<Triple>,
}

/// Incremental forward-chaining maintenance with Delete-and-Rederive.
///
/// Inferences and their provenance live under a dedicated subspace in
/// the caller's store: the antecedent-to-consequent direction drives the
/// deletion cascade, the reverse direction drives re-derivation, and the
/// inferred record itself carries the tentative validity flag. All
/// mutations ride in the caller's transaction; the reasoner keeps no
/// state of its own and concurrent callers are arbitrated by the store's
/// conflict detection.
pub struct IncrementalReasoner {
    materializer: Materializer,
    subspace: Subspace,
    max_cascade_depth: usize,
}

impl IncrementalReasoner {
    /// Creates a reasoner for an ontology, persisting under `subspace`.
    pub fn new(ontology: &Ontology, subspace: Subspace) -> Self {
        Self {
            materializer: Materializer::new(ontology),
            subspace,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }

    /// Bounds the deletion cascade.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Forward chains an inserted triple and records every new inference
    /// with its provenance. Returns the inferred triples.
    pub fn add_triple<T: StoreTransaction>(
        &self,
        triple: &Triple,
        asserted: &dyn TripleSource,
        tx: &mut T,
    ) -> Result<Vec<Triple>, DredError> {
        let inferences = {
            let view = MaterializedView {
                subspace: &self.subspace,
                asserted,
                tx,
            };
            self.materializer.close_over(triple, &view)?
        };

        let mut consequents = Vec::new();
        for inference in &inferences {
            let consequent = &inference.consequent;
            let mut record = self
                .read_provenance(tx, consequent)?
                .unwrap_or(Provenance {
                    derivations: Vec::new(),
                    is_valid: true,
                });
            record.is_valid = true;
            let derivation: Vec<(String, String, String)> =
                inference.antecedents.iter().map(as_strings).collect();
            if !record.derivations.contains(&derivation) {
                record.derivations.push(derivation);
            }
            for antecedent in &inference.antecedents {
                tx.set(&self.dependents_key(antecedent, consequent), b"")?;
                tx.set(&self.dependencies_key(consequent, antecedent), b"")?;
            }
            tx.set(&self.inferred_key(consequent), &archive(&record))?;
            if !consequents.contains(consequent) {
                consequents.push(consequent.clone());
            }
        }
        tracing::debug!(triple = %triple, inferred = consequents.len(), "materialized insert");
        Ok(consequents)
    }

    /// Deletes a triple's consequences: cascades over dependents, marks
    /// them tentatively invalid, re-derives the ones with a surviving
    /// derivation and purges the rest.
    pub fn delete_triple<T: StoreTransaction>(
        &self,
        triple: &Triple,
        asserted: &dyn TripleSource,
        tx: &mut T,
    ) -> Result<DeleteReport, DredError> {
        // 1. transitive closure of dependents, in cascade order
        let mut doomed: Vec<Triple> = Vec::new();
        let mut seen: BTreeSet<Triple> = BTreeSet::new();
        seen.insert(triple.clone());
        let mut frontier = vec![triple.clone()];
        let mut depth = 0;
        while !frontier.is_empty() && depth < self.max_cascade_depth {
            let mut next = Vec::new();
            for antecedent in &frontier {
                for consequent in self.dependents_of(tx, antecedent)? {
                    if seen.insert(consequent.clone()) {
                        doomed.push(consequent.clone());
                        next.push(consequent);
                    }
                }
            }
            frontier = next;
            depth += 1;
        }

        // 2. tentative invalidation
        for tentative in &doomed {
            if let Some(mut record) = self.read_provenance(tx, tentative)? {
                record.is_valid = false;
                tx.set(&self.inferred_key(tentative), &archive(&record))?;
            }
        }

        // 3./4. re-derivation or purge, antecedents before dependents
        let deleted = as_strings(triple);
        let mut report = DeleteReport::default();
        for tentative in &doomed {
            let dependencies = self.dependencies_of(tx, tentative)?;
            let Some(mut record) = self.read_provenance(tx, tentative)? else {
                continue;
            };
            // a derivation mentioning the deleted triple is gone for
            // good; any other derivation whose antecedents all still
            // exist re-establishes the inference
            record.derivations.retain(|d| !d.contains(&deleted));
            let mut alive = false;
            for derivation in &record.derivations {
                let mut holds = true;
                for antecedent in derivation {
                    if !self.triple_exists(&from_strings(antecedent), asserted, tx)? {
                        holds = false;
                        break;
                    }
                }
                if holds {
                    alive = true;
                    break;
                }
            }
            if alive {
                record.is_valid = true;
                tx.set(&self.inferred_key(tentative), &archive(&record))?;
                tracing::debug!(triple = %tentative, "rederived");
                report.rederived.push(tentative.clone());
            } else {
                self.purge(tx, tentative, &dependencies)?;
                tracing::debug!(triple = %tentative, "purged");
                report.purged.push(tentative.clone());
            }
        }

        // 5. the deleted triple's own provenance links
        for consequent in self.dependents_of(tx, triple)? {
            tx.clear(&self.dependents_key(triple, &consequent));
            tx.clear(&self.dependencies_key(&consequent, triple));
        }
        Ok(report)
    }

    /// The provenance of an inferred triple, if one is recorded.
    pub fn read_provenance<T: StoreTransaction>(
        &self,
        tx: &T,
        triple: &Triple,
    ) -> Result<Option<Provenance>, DredError> {
        let Some(bytes) = tx.get(&self.inferred_key(triple), false)? else {
            return Ok(None);
        };
        let archived = rkyv::check_archived_root::<Provenance>(&bytes).map_err(|_| {
            DredError::BadProvenance {
                triple: triple.to_string(),
            }
        })?;
        let record: Provenance =
            archived
                .deserialize(&mut rkyv::Infallible)
                .map_err(|_| DredError::BadProvenance {
                    triple: triple.to_string(),
                })?;
        Ok(Some(record))
    }

    /// Returns true if the triple is asserted or is a valid inference.
    pub fn triple_exists<T: StoreTransaction>(
        &self,
        triple: &Triple,
        asserted: &dyn TripleSource,
        tx: &T,
    ) -> Result<bool, DredError> {
        if asserted.contains(triple)? {
            return Ok(true);
        }
        Ok(self
            .read_provenance(tx, triple)?
            .map_or(false, |record| record.is_valid))
    }

    /// Every inferred triple with its provenance, valid and tentative.
    pub fn inferred<T: StoreTransaction>(
        &self,
        tx: &T,
    ) -> Result<Vec<(Triple, Provenance)>, DredError> {
        let (begin, end) = self.subspace.range_of(&[Element::I64(PREFIX_INFERRED)]);
        let mut out = Vec::new();
        for row in tx.get_range(&begin, &end, false)? {
            let (key, _) = row?;
            let elements = self.subspace.unpack(&key)?;
            let Some(triple) = elements.get(1..).and_then(triple_from_elements) else {
                continue;
            };
            if let Some(record) = self.read_provenance(tx, &triple)? {
                out.push((triple, record));
            }
        }
        Ok(out)
    }

    fn purge<T: StoreTransaction>(
        &self,
        tx: &mut T,
        triple: &Triple,
        dependencies: &[Triple],
    ) -> Result<(), DredError> {
        tx.clear(&self.inferred_key(triple));
        for antecedent in dependencies {
            tx.clear(&self.dependencies_key(triple, antecedent));
            tx.clear(&self.dependents_key(antecedent, triple));
        }
        // links where the purged triple was itself an antecedent
        for consequent in self.dependents_of(tx, triple)? {
            tx.clear(&self.dependents_key(triple, &consequent));
            tx.clear(&self.dependencies_key(&consequent, triple));
        }
        Ok(())
    }

    fn dependents_of<T: StoreTransaction>(
        &self,
        tx: &T,
        antecedent: &Triple,
    ) -> Result<Vec<Triple>, DredError> {
        self.scan_links(tx, PREFIX_DEPENDENTS, antecedent)
    }

    fn dependencies_of<T: StoreTransaction>(
        &self,
        tx: &T,
        consequent: &Triple,
    ) -> Result<Vec<Triple>, DredError> {
        self.scan_links(tx, PREFIX_DEPENDENCIES, consequent)
    }

    fn scan_links<T: StoreTransaction>(
        &self,
        tx: &T,
        prefix: i64,
        triple: &Triple,
    ) -> Result<Vec<Triple>, DredError> {
        let mut elements = vec![Element::I64(prefix)];
        elements.extend(triple_elements(triple));
        let (begin, end) = self.subspace.range_of(&elements);
        let mut out = Vec::new();
        for row in tx.get_range(&begin, &end, false)? {
            let (key, _) = row?;
            let decoded = self.subspace.unpack(&key)?;
            let Some(rest) = decoded.get(4..) else { continue };
            if let Some(linked) = triple_from_elements(rest) {
                out.push(linked);
            }
        }
        Ok(out)
    }

    fn inferred_key(&self, triple: &Triple) -> Vec<u8> {
        let mut elements = vec![Element::I64(PREFIX_INFERRED)];
        elements.extend(triple_elements(triple));
        self.subspace.pack(&elements)
    }

    fn dependents_key(&self, antecedent: &Triple, consequent: &Triple) -> Vec<u8> {
        let mut elements = vec![Element::I64(PREFIX_DEPENDENTS)];
        elements.extend(triple_elements(antecedent));
        elements.extend(triple_elements(consequent));
        self.subspace.pack(&elements)
    }

    fn dependencies_key(&self, consequent: &Triple, antecedent: &Triple) -> Vec<u8> {
        let mut elements = vec![Element::I64(PREFIX_DEPENDENCIES)];
        elements.extend(triple_elements(consequent));
        elements.extend(triple_elements(antecedent));
        self.subspace.pack(&elements)
    }
}

/// What the materializer reads while chaining: asserted triples plus the
/// valid inferences already in the store.
struct MaterializedView<'a, T: StoreTransaction> {
    subspace: &'a Subspace,
    asserted: &'a dyn TripleSource,
    tx: &'a T,
}

impl<'a, T: StoreTransaction> MaterializedView<'a, T> {
    fn inferred_valid(&self, triple: &Triple) -> Result<bool> {
        let mut elements = vec![Element::I64(PREFIX_INFERRED)];
        elements.extend(triple_elements(triple));
        let Some(bytes) = self
            .tx
            .get(&self.subspace.pack(&elements), false)
            .map_err(anyhow::Error::new)?
        else {
            return Ok(false);
        };
        let archived = rkyv::check_archived_root::<Provenance>(&bytes)
            .map_err(|e| anyhow::anyhow!("malformed provenance: {}", e))?;
        Ok(archived.is_valid)
    }

    fn inferred_rows(&self) -> Result<Vec<Triple>> {
        let (begin, end) = self.subspace.range_of(&[Element::I64(PREFIX_INFERRED)]);
        let mut out = Vec::new();
        for row in self
            .tx
            .get_range(&begin, &end, false)
            .map_err(anyhow::Error::new)?
        {
            let (key, bytes) = row.map_err(anyhow::Error::new)?;
            let archived = rkyv::check_archived_root::<Provenance>(&bytes)
                .map_err(|e| anyhow::anyhow!("malformed provenance: {}", e))?;
            if !archived.is_valid {
                continue;
            }
            let elements = self.subspace.unpack(&key)?;
            if let Some(triple) = elements.get(1..).and_then(triple_from_elements) {
                out.push(triple);
            }
        }
        Ok(out)
    }
}

impl<'a, T: StoreTransaction> TripleSource for MaterializedView<'a, T> {
    fn contains(&self, triple: &Triple) -> Result<bool> {
        Ok(self.asserted.contains(triple)? || self.inferred_valid(triple)?)
    }

    fn objects(&self, subject: &hexad_owl::Iri, predicate: &hexad_owl::Iri) -> Result<Vec<hexad_owl::Iri>> {
        let mut out = self.asserted.objects(subject, predicate)?;
        for triple in self.inferred_rows()? {
            if triple.subject == *subject && triple.predicate == *predicate {
                out.push(triple.object);
            }
        }
        Ok(out)
    }

    fn subjects(&self, predicate: &hexad_owl::Iri, object: &hexad_owl::Iri) -> Result<Vec<hexad_owl::Iri>> {
        let mut out = self.asserted.subjects(predicate, object)?;
        for triple in self.inferred_rows()? {
            if triple.predicate == *predicate && triple.object == *object {
                out.push(triple.subject);
            }
        }
        Ok(out)
    }
}

/// A [`TripleSource`] over a graph index, exposing asserted edges as
/// triples.
pub struct IndexTripleSource<'a, T: StoreTransaction> {
    index: &'a GraphIndex,
    tx: &'a T,
}

impl<'a, T: StoreTransaction> IndexTripleSource<'a, T> {
    /// Creates a source reading through the given transaction.
    pub fn new(index: &'a GraphIndex, tx: &'a T) -> Self {
        Self { index, tx }
    }

    fn scan(&self, pattern: &Pattern) -> Result<Vec<Triple>> {
        let scanner = EdgeScanner::new(self.index);
        let mut out = Vec::new();
        for edge in scanner
            .scan(pattern, self.tx, false)
            .map_err(anyhow::Error::new)?
        {
            let edge = edge.map_err(anyhow::Error::new)?;
            if let (Some(s), Some(p), Some(o)) =
                (edge.from.as_str(), edge.edge.as_str(), edge.to.as_str())
            {
                out.push(Triple::new(s, p, o));
            }
        }
        Ok(out)
    }
}

impl<'a, T: StoreTransaction> TripleSource for IndexTripleSource<'a, T> {
    fn contains(&self, triple: &Triple) -> Result<bool> {
        let pattern = Pattern::any()
            .from(triple.subject.as_str())
            .edge(triple.predicate.as_str())
            .to(triple.object.as_str());
        Ok(!self.scan(&pattern)?.is_empty())
    }

    fn objects(&self, subject: &hexad_owl::Iri, predicate: &hexad_owl::Iri) -> Result<Vec<hexad_owl::Iri>> {
        let pattern = Pattern::any()
            .from(subject.as_str())
            .edge(predicate.as_str());
        Ok(self
            .scan(&pattern)?
            .into_iter()
            .map(|t| t.object)
            .collect())
    }

    fn subjects(&self, predicate: &hexad_owl::Iri, object: &hexad_owl::Iri) -> Result<Vec<hexad_owl::Iri>> {
        let pattern = Pattern::any()
            .edge(predicate.as_str())
            .to(object.as_str());
        Ok(self
            .scan(&pattern)?
            .into_iter()
            .map(|t| t.subject)
            .collect())
    }
}

fn archive<T>(t: &T) -> Vec<u8>
where
    T: rkyv::Serialize<AllocSerializer<256>>,
{
    let mut serializer = AllocSerializer::<256>::default();
    serializer.serialize_value(t).expect("infallible serializer");
    serializer.into_serializer().into_inner().to_vec()
}

fn triple_elements(triple: &Triple) -> [Element; 3] {
    [
        Element::from(triple.subject.as_str()),
        Element::from(triple.predicate.as_str()),
        Element::from(triple.object.as_str()),
    ]
}

fn triple_from_elements(elements: &[Element]) -> Option<Triple> {
    match elements {
        [Element::Str(s), Element::Str(p), Element::Str(o)] => {
            Some(Triple::new(s.as_str(), p.as_str(), o.as_str()))
        }
        _ => None,
    }
}

fn as_strings(triple: &Triple) -> (String, String, String) {
    (
        triple.subject.to_string(),
        triple.predicate.to_string(),
        triple.object.to_string(),
    )
}

fn from_strings(strings: &(String, String, String)) -> Triple {
    Triple::new(
        strings.0.as_str(),
        strings.1.as_str(),
        strings.2.as_str(),
    )
}
