use crate::index::{Edge, GraphIndex, IndexError};
use crate::record::Record;
use crate::scan::{Pattern, ScanPlan};
use crate::store::StoreTransaction;
use crate::tuple::{Element, Tuple, TupleBuf};
use std::collections::BTreeMap;
use thiserror::Error;

/// A malformed covering value.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CoverError {
    /// The value ends inside the presence bitmap.
    #[error("covering value shorter than its presence bitmap: {}", hex::encode(.0))]
    Truncated(Vec<u8>),
    /// The field bytes decode to a different count than the bitmap says.
    #[error("covering value carries {found} fields, presence bitmap says {expected}")]
    FieldCountMismatch {
        /// Fields decoded from the value bytes.
        found: usize,
        /// Bits set in the presence bitmap.
        expected: usize,
    },
}

/// Decoded covering fields of one row. Absent fields are not in the map;
/// an explicit null is [`Element::Null`]. The distinction round-trips.
pub type Properties = BTreeMap<String, Element>;

/// Encodes the stored-field subset of a record: a presence bitmap (one
/// bit per declared field, LSB first, whole bytes) followed by the
/// present field values, tuple encoded in declaration order.
pub fn encode_covering(record: &dyn Record, fields: &[String]) -> Result<Vec<u8>, IndexError> {
    let mut bitmap = vec![0u8; fields.len().div_ceil(8)];
    let mut values = TupleBuf::new();
    for (position, field) in fields.iter().enumerate() {
        let Some(value) = record.field(field) else {
            continue;
        };
        let packable = match &value {
            Element::Str(s) => s.len() <= u16::MAX as usize,
            Element::Bytes(b) => b.len() <= u16::MAX as usize,
            Element::I64(_) | Element::Null => true,
        };
        if !packable {
            return Err(IndexError::InvalidFieldType {
                item: record.type_name().to_owned(),
                field: field.clone(),
            });
        }
        bitmap[position / 8] |= 1 << (position % 8);
        values.element(&value);
    }
    let mut out = bitmap;
    out.extend(values.into_bytes());
    Ok(out)
}

/// Decodes a covering value against the declared field list.
pub fn decode_covering(bytes: &[u8], fields: &[String]) -> Result<Properties, IndexError> {
    let bitmap_len = fields.len().div_ceil(8);
    if bytes.len() < bitmap_len {
        return Err(CoverError::Truncated(bytes.to_vec()).into());
    }
    let (bitmap, values) = bytes.split_at(bitmap_len);
    let present: Vec<&String> = fields
        .iter()
        .enumerate()
        .filter(|(position, _)| bitmap[position / 8] & (1 << (position % 8)) != 0)
        .map(|(_, field)| field)
        .collect();
    let decoded = Tuple::new(values).elements()?;
    if decoded.len() != present.len() {
        return Err(CoverError::FieldCountMismatch {
            found: decoded.len(),
            expected: present.len(),
        }
        .into());
    }
    Ok(present
        .into_iter()
        .cloned()
        .zip(decoded)
        .collect())
}

/// A comparison applied to one covering field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// String or byte prefix.
    HasPrefix,
    /// String or byte suffix.
    HasSuffix,
    /// String or byte containment.
    Contains,
    /// Membership in a value set.
    In,
    /// The field is absent or explicitly null.
    IsNil,
    /// The field is present and not null.
    IsNotNil,
}

/// One predicate over a covering field. Filters on a row form a
/// conjunction; the first failing predicate discards the row.
#[derive(Clone, Debug)]
pub struct PropertyFilter {
    /// The covering field the predicate reads.
    pub field: String,
    /// The comparison.
    pub op: FilterOp,
    /// The operands. Empty for the nil checks, one value for the
    /// comparisons, any number for `In`.
    pub operands: Vec<Element>,
}

impl PropertyFilter {
    /// Creates a predicate with one operand.
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Element>) -> Self {
        Self {
            field: field.into(),
            op,
            operands: vec![value.into()],
        }
    }

    /// `field = value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Element>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// `field ≥ value`.
    pub fn ge(field: impl Into<String>, value: impl Into<Element>) -> Self {
        Self::new(field, FilterOp::Ge, value)
    }

    /// `field ∈ values`.
    pub fn in_set(field: impl Into<String>, values: Vec<Element>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::In,
            operands: values,
        }
    }

    /// `isNil(field)`.
    pub fn is_nil(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::IsNil,
            operands: Vec::new(),
        }
    }

    /// `isNotNil(field)`.
    pub fn is_not_nil(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::IsNotNil,
            operands: Vec::new(),
        }
    }

    /// Evaluates the predicate against a row's decoded properties.
    pub fn matches(&self, properties: &Properties) -> bool {
        let value = properties.get(&self.field);
        match self.op {
            FilterOp::IsNil => value.map_or(true, Element::is_null),
            FilterOp::IsNotNil => value.map_or(false, |v| !v.is_null()),
            _ => {
                // every other op fails on absent and on null
                let Some(value) = value else { return false };
                if value.is_null() {
                    return false;
                }
                let operand = self.operands.first();
                match self.op {
                    FilterOp::Eq => operand == Some(value),
                    FilterOp::Ne => operand.map_or(false, |o| o != value),
                    FilterOp::Lt => compare(value, operand).map_or(false, |o| o.is_lt()),
                    FilterOp::Le => compare(value, operand).map_or(false, |o| o.is_le()),
                    FilterOp::Gt => compare(value, operand).map_or(false, |o| o.is_gt()),
                    FilterOp::Ge => compare(value, operand).map_or(false, |o| o.is_ge()),
                    FilterOp::HasPrefix => bytes_op(value, operand, <[u8]>::starts_with),
                    FilterOp::HasSuffix => bytes_op(value, operand, <[u8]>::ends_with),
                    FilterOp::Contains => bytes_op(value, operand, contains_subslice),
                    FilterOp::In => self.operands.contains(value),
                    FilterOp::IsNil | FilterOp::IsNotNil => unreachable!(),
                }
            }
        }
    }
}

/// Same-type comparison. Values of different types do not compare.
fn compare(value: &Element, operand: Option<&Element>) -> Option<std::cmp::Ordering> {
    match (value, operand?) {
        (Element::Str(a), Element::Str(b)) => Some(a.cmp(b)),
        (Element::I64(a), Element::I64(b)) => Some(a.cmp(b)),
        (Element::Bytes(a), Element::Bytes(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn bytes_op(
    value: &Element,
    operand: Option<&Element>,
    op: impl Fn(&[u8], &[u8]) -> bool,
) -> bool {
    let value = match value {
        Element::Str(s) => s.as_bytes(),
        Element::Bytes(b) => b.as_slice(),
        _ => return false,
    };
    let operand = match operand {
        Some(Element::Str(s)) => s.as_bytes(),
        Some(Element::Bytes(b)) => b.as_slice(),
        _ => return false,
    };
    op(value, operand)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// An edge together with its decoded covering fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertyRow {
    /// The decoded edge.
    pub edge: Edge,
    /// The covering fields.
    pub properties: Properties,
}

/// Scans an index with covering values: decodes stored fields, applies
/// property filters before yielding, and understands the optional
/// named-graph slot.
#[derive(Clone, Copy, Debug)]
pub struct PropertyScanner<'a> {
    index: &'a GraphIndex,
}

impl<'a> PropertyScanner<'a> {
    /// Creates a property scanner over an index.
    pub fn new(index: &'a GraphIndex) -> Self {
        Self { index }
    }

    /// Scans rows matching the pattern, the optional named graph and
    /// every property filter.
    ///
    /// The graph slot joins the range prefix only when all three triple
    /// slots are bound (the key stores it after them); otherwise it is
    /// post-filtered like any other unreachable slot.
    pub fn scan<'t, T: StoreTransaction>(
        &self,
        pattern: &Pattern,
        graph: Option<&Element>,
        filters: &[PropertyFilter],
        tx: &'t T,
        snapshot: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<PropertyRow, IndexError>> + 't>, IndexError>
    where
        'a: 't,
    {
        let plan = self.plan(pattern);
        let mut prefix = vec![Element::I64(plan.ordering.id())];
        let roles = [
            pattern.from.as_ref(),
            pattern.edge.as_ref(),
            pattern.to.as_ref(),
        ];
        // re-derive the bound prefix in the ordering's slot order
        if let Some(bound) = ordered_bound_prefix(plan, pattern) {
            prefix.extend(bound);
        }
        if self.index.is_quad() && plan.bound_prefix == 3 && roles.iter().all(Option::is_some) {
            if let Some(graph) = graph {
                prefix.push(graph.clone());
            }
        }

        let (begin, end) = self.index.subspace().range_of(&prefix);
        let rows = tx.get_range(&begin, &end, snapshot)?;
        let index = self.index;
        let pattern = pattern.clone();
        let graph = graph.cloned();
        let filters = filters.to_vec();
        Ok(Box::new(rows.filter_map(move |row| {
            let (key, value) = match row {
                Ok(row) => row,
                Err(err) => return Some(Err(err.into())),
            };
            let (_, edge) = match index.decode_key(&key) {
                Ok(decoded) => decoded,
                Err(err) => return Some(Err(err)),
            };
            if !pattern.matches(&edge) {
                return None;
            }
            if let Some(graph) = &graph {
                if edge.graph.as_ref() != Some(graph) {
                    return None;
                }
            }
            let properties = if index.stored_fields().is_empty() {
                Properties::new()
            } else {
                match decode_covering(&value, index.stored_fields()) {
                    Ok(properties) => properties,
                    Err(err) => return Some(Err(err)),
                }
            };
            if !filters.iter().all(|filter| filter.matches(&properties)) {
                return None;
            }
            Some(Ok(PropertyRow { edge, properties }))
        })))
    }

    /// Collects the matching rows.
    pub fn collect<T: StoreTransaction>(
        &self,
        pattern: &Pattern,
        graph: Option<&Element>,
        filters: &[PropertyFilter],
        tx: &T,
        snapshot: bool,
    ) -> Result<Vec<PropertyRow>, IndexError> {
        self.scan(pattern, graph, filters, tx, snapshot)?.collect()
    }

    /// The plan a pattern would execute with.
    pub fn plan(&self, pattern: &Pattern) -> ScanPlan {
        ScanPlan::select(pattern, self.index.strategy())
    }
}

fn ordered_bound_prefix(plan: ScanPlan, pattern: &Pattern) -> Option<Vec<Element>> {
    use crate::index::Ordering;
    if plan.bound_prefix == 0 {
        return None;
    }
    let in_key_order: [Option<&Element>; 3] = match plan.ordering {
        Ordering::Out | Ordering::Pso => [
            pattern.edge.as_ref(),
            pattern.from.as_ref(),
            pattern.to.as_ref(),
        ],
        Ordering::In | Ordering::Pos => [
            pattern.edge.as_ref(),
            pattern.to.as_ref(),
            pattern.from.as_ref(),
        ],
        Ordering::Spo => [
            pattern.from.as_ref(),
            pattern.edge.as_ref(),
            pattern.to.as_ref(),
        ],
        Ordering::Osp => [
            pattern.to.as_ref(),
            pattern.from.as_ref(),
            pattern.edge.as_ref(),
        ],
        Ordering::Sop => [
            pattern.from.as_ref(),
            pattern.to.as_ref(),
            pattern.edge.as_ref(),
        ],
        Ordering::Ops => [
            pattern.to.as_ref(),
            pattern.edge.as_ref(),
            pattern.from.as_ref(),
        ],
    };
    Some(
        in_key_order[..plan.bound_prefix]
            .iter()
            .map(|slot| (*slot).expect("bound slot").clone())
            .collect(),
    )
}
