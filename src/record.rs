use crate::tuple::Element;

/// The slice of the persistence layer the graph index maintainer needs:
/// reflective access to a stored object's fields.
///
/// The full schema layer (object mapping, diffing, index registration)
/// lives with the caller. The maintainer only ever asks a record for its
/// type name, its declared fields and one field value at a time; a field
/// can be *absent*, which is distinct from any packable value.
pub trait Record {
    /// The stable name of the record type.
    fn type_name(&self) -> &str;

    /// The declared field names, in declaration order.
    fn field_names(&self) -> Vec<&str>;

    /// The value of a field, or `None` when the field is absent.
    fn field(&self, name: &str) -> Option<Element>;

    /// The primary key elements of the record.
    fn primary_key(&self) -> Vec<Element>;

    /// The names of the indexes declared on the record type.
    fn index_names(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// A map backed [`Record`], for tests and ad hoc callers.
#[derive(Clone, Debug, Default)]
pub struct MapRecord {
    type_name: String,
    fields: Vec<(String, Option<Element>)>,
    primary_key: Vec<Element>,
}

impl MapRecord {
    /// Creates an empty record of the given type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Adds a field with a value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Element>) -> Self {
        self.fields.push((name.into(), Some(value.into())));
        self
    }

    /// Declares a field without a value.
    pub fn with_absent(mut self, name: impl Into<String>) -> Self {
        self.fields.push((name.into(), None));
        self
    }

    /// Sets the primary key.
    pub fn keyed(mut self, key: Vec<Element>) -> Self {
        self.primary_key = key;
        self
    }
}

impl Record for MapRecord {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn field(&self, name: &str) -> Option<Element> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, value)| value.clone())
    }

    fn primary_key(&self) -> Vec<Element> {
        self.primary_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_none() {
        let record = MapRecord::new("Edge")
            .with("from", "a")
            .with("to", "b")
            .with_absent("since");
        assert_eq!(record.type_name(), "Edge");
        assert_eq!(record.field_names(), vec!["from", "to", "since"]);
        assert_eq!(record.field("from"), Some(Element::from("a")));
        assert_eq!(record.field("since"), None);
        assert_eq!(record.field("missing"), None);
    }
}
