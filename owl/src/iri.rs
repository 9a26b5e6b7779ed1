use std::borrow::Borrow;
use std::sync::Arc;

/// `owl:Thing`, the top class.
pub const OWL_THING: &str = "http://www.w3.org/2002/07/owl#Thing";
/// `owl:Nothing`, the bottom class.
pub const OWL_NOTHING: &str = "http://www.w3.org/2002/07/owl#Nothing";
/// `rdf:type`, the predicate linking an individual to its class.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// A cheaply clonable interned IRI.
///
/// Labels in a completion graph are copied on every rule application and
/// every trail entry, so the representation is a shared string.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Iri(Arc<str>);

impl Iri {
    /// Creates an IRI from anything string like.
    pub fn new(iri: impl Into<Arc<str>>) -> Self {
        Self(iri.into())
    }

    /// Returns the IRI as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `owl:Thing`.
    pub fn thing() -> Self {
        Self::new(OWL_THING)
    }

    /// Returns `owl:Nothing`.
    pub fn nothing() -> Self {
        Self::new(OWL_NOTHING)
    }

    /// Returns `rdf:type`.
    pub fn rdf_type() -> Self {
        Self::new(RDF_TYPE)
    }
}

impl From<&str> for Iri {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Iri {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for Iri {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Iri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Iri {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // Render the fragment or the last path segment, the full IRI is noise
        // in completion graph dumps.
        let s = self
            .0
            .rsplit_once('#')
            .or_else(|| self.0.rsplit_once('/'))
            .map(|(_, frag)| frag)
            .unwrap_or(&self.0);
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for Iri {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_renders_fragment() {
        let iri = Iri::new("http://example.com/onto#Dog");
        assert_eq!(format!("{:?}", iri), "Dog");
        let iri = Iri::new("Dog");
        assert_eq!(format!("{:?}", iri), "Dog");
    }

    #[test]
    fn borrow_lookup() {
        use std::collections::BTreeSet;
        let mut set = BTreeSet::new();
        set.insert(Iri::new("a"));
        assert!(set.contains("a"));
    }
}
