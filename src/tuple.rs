use thiserror::Error;

/// A malformed tuple encoding.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TupleError {
    /// The trailing tag byte names no element type.
    #[error("unknown element tag {tag} in key {key}", key = hex::encode(.bytes))]
    UnknownTag {
        /// The offending tag byte.
        tag: u8,
        /// The full encoded tuple, for the diagnostic.
        bytes: Vec<u8>,
    },
    /// The encoding ends inside an element.
    #[error("truncated tuple encoding {key}", key = hex::encode(.bytes))]
    Truncated {
        /// The full encoded tuple, for the diagnostic.
        bytes: Vec<u8>,
    },
    /// The key does not start with the expected subspace prefix.
    #[error("key {key} is outside subspace {prefix}", key = hex::encode(.bytes), prefix = hex::encode(.subspace))]
    OutsideSubspace {
        /// The offending key.
        bytes: Vec<u8>,
        /// The subspace prefix.
        subspace: Vec<u8>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
enum ElementType {
    Str,
    I64,
    Bytes,
    Null,
}

impl ElementType {
    fn new(tag: u8) -> Option<Self> {
        match tag {
            t if t == ElementType::Str as u8 => Some(ElementType::Str),
            t if t == ElementType::I64 as u8 => Some(ElementType::I64),
            t if t == ElementType::Bytes as u8 => Some(ElementType::Bytes),
            t if t == ElementType::Null as u8 => Some(ElementType::Null),
            _ => None,
        }
    }

    fn is_variable_length(&self) -> bool {
        matches!(self, ElementType::Str | ElementType::Bytes)
    }

    /// Splits off the last element of an encoding: its type, its total
    /// encoded length and its content bytes.
    fn last_element(data: &[u8]) -> Result<Option<(ElementType, usize, &[u8])>, TupleError> {
        let Some(tag) = data.last() else {
            return Ok(None);
        };
        let ty = ElementType::new(*tag).ok_or_else(|| TupleError::UnknownTag {
            tag: *tag,
            bytes: data.to_vec(),
        })?;
        let len = 1 + match ty {
            ElementType::Null => 0,
            ElementType::I64 => std::mem::size_of::<i64>(),
            ElementType::Str | ElementType::Bytes => {
                if data.len() < 3 {
                    return Err(TupleError::Truncated {
                        bytes: data.to_vec(),
                    });
                }
                let size =
                    u16::from_be_bytes(data[data.len() - 3..data.len() - 1].try_into().unwrap());
                2 + (size as usize)
            }
        };
        if data.len() < len {
            return Err(TupleError::Truncated {
                bytes: data.to_vec(),
            });
        }
        let content = if ty.is_variable_length() {
            &data[data.len() - len..data.len() - 3]
        } else {
            &data[data.len() - len..data.len() - 1]
        };
        Ok(Some((ty, len, content)))
    }

    fn first_element(mut data: &[u8]) -> Result<Option<(ElementType, usize, &[u8])>, TupleError> {
        while let Some((ty, len, content)) = Self::last_element(data)? {
            if len == data.len() {
                return Ok(Some((ty, len, content)));
            }
            data = &data[..data.len() - len];
        }
        Ok(None)
    }
}

/// One tuple element. Anything a key slot can hold.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Element {
    /// A utf8 string. The empty string is a valid, distinct value.
    Str(String),
    /// A signed 64 bit integer.
    I64(i64),
    /// An opaque byte string.
    Bytes(Vec<u8>),
    /// An explicit null, distinct from an absent field.
    Null,
}

impl Element {
    fn new(ty: ElementType, data: &[u8]) -> Self {
        match ty {
            ElementType::Str => Self::Str(String::from_utf8_lossy(data).into_owned()),
            ElementType::I64 => Self::I64(i64::from_be_bytes(data.try_into().unwrap())),
            ElementType::Bytes => Self::Bytes(data.to_vec()),
            ElementType::Null => Self::Null,
        }
    }

    /// Returns true for the explicit null element.
    pub fn is_null(&self) -> bool {
        matches!(self, Element::Null)
    }

    /// Returns the `&str`, if this is a string element.
    pub fn as_str(&self) -> Option<&str> {
        if let Element::Str(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Returns the `i64`, if this is an integer element.
    pub fn as_i64(&self) -> Option<i64> {
        if let Element::I64(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Returns the bytes, if this is a byte string element.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Element::Bytes(b) = self {
            Some(b)
        } else {
            None
        }
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Element::Str(s.to_owned())
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        Element::Str(s)
    }
}

impl From<i64> for Element {
    fn from(i: i64) -> Self {
        Element::I64(i)
    }
}

impl From<Vec<u8>> for Element {
    fn from(b: Vec<u8>) -> Self {
        Element::Bytes(b)
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{:?}", s),
            Self::I64(i) => write!(f, "{}", i),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Self::Null => write!(f, "null"),
        }
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An owned concatenation of binary encoded elements.
///
/// The encoding is append only: the packing of a tuple is a byte prefix
/// of the packing of any extension of it, which is what makes bound-slot
/// prefix scans work.
#[derive(Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TupleBuf(Vec<u8>);

impl TupleBuf {
    /// Creates an empty tuple buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_len(&mut self, len: usize) {
        assert!(len <= u16::MAX as usize, "element exceeds 64KiB");
        self.0.extend((len as u16).to_be_bytes());
    }

    fn push(&mut self, ty: ElementType, bytes: &[u8]) {
        self.0.extend(bytes);
        if ty.is_variable_length() {
            self.push_len(bytes.len());
        }
        self.0.push(ty as u8);
    }

    /// Appends a string element.
    pub fn string(&mut self, s: &str) {
        self.push(ElementType::Str, s.as_bytes());
    }

    /// Appends an integer element.
    pub fn i64(&mut self, i: i64) {
        self.push(ElementType::I64, i.to_be_bytes().as_ref());
    }

    /// Appends a byte string element.
    pub fn bytes(&mut self, b: &[u8]) {
        self.push(ElementType::Bytes, b);
    }

    /// Appends a null element.
    pub fn null(&mut self) {
        self.push(ElementType::Null, &[]);
    }

    /// Appends an [`Element`].
    pub fn element(&mut self, element: &Element) {
        match element {
            Element::Str(s) => self.string(s),
            Element::I64(i) => self.i64(*i),
            Element::Bytes(b) => self.bytes(b),
            Element::Null => self.null(),
        }
    }

    /// Pops the last element.
    pub fn pop(&mut self) {
        let len = match self.as_tuple().parent() {
            Ok(Some(tuple)) => tuple.0.len(),
            _ => return,
        };
        self.0.truncate(len);
    }

    /// Returns a borrowed tuple view.
    pub fn as_tuple(&self) -> Tuple<'_> {
        Tuple(&self.0)
    }

    /// Appends all elements of a tuple.
    pub fn extend(&mut self, tuple: Tuple) {
        self.0.extend_from_slice(tuple.as_ref());
    }

    /// Consumes the buffer, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Debug for TupleBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.as_tuple().fmt(f)
    }
}

impl AsRef<[u8]> for TupleBuf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromIterator<Element> for TupleBuf {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Element>,
    {
        let mut buf = TupleBuf::new();
        for element in iter {
            buf.element(&element);
        }
        buf
    }
}

/// A borrowed binary encoded tuple.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Tuple<'a>(&'a [u8]);

impl<'a> Tuple<'a> {
    /// Creates a tuple view over encoded bytes.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    /// Returns true if the tuple has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `self` is a prefix of `other`.
    pub fn is_prefix_of(&self, other: Tuple) -> bool {
        other.as_ref().starts_with(self.as_ref())
    }

    /// Returns an owned `TupleBuf`.
    pub fn to_owned(&self) -> TupleBuf {
        TupleBuf(self.0.to_vec())
    }

    /// Returns the first element.
    pub fn first(&self) -> Result<Option<Element>, TupleError> {
        Ok(ElementType::first_element(self.0)?.map(|(ty, _, data)| Element::new(ty, data)))
    }

    /// Returns the last element.
    pub fn last(&self) -> Result<Option<Element>, TupleError> {
        Ok(ElementType::last_element(self.0)?.map(|(ty, _, data)| Element::new(ty, data)))
    }

    /// Returns the tuple without its first element.
    pub fn child(&self) -> Result<Option<Tuple<'a>>, TupleError> {
        Ok(ElementType::first_element(self.0)?.map(|(_, len, _)| Tuple(&self.0[len..])))
    }

    /// Returns the tuple without its last element.
    pub fn parent(&self) -> Result<Option<Tuple<'a>>, TupleError> {
        Ok(ElementType::last_element(self.0)?
            .map(|(_, len, _)| Tuple(&self.0[..self.0.len() - len])))
    }

    /// Decodes every element.
    pub fn elements(&self) -> Result<Vec<Element>, TupleError> {
        let mut out = Vec::new();
        let mut rest = *self;
        while let Some((element, child)) = rest.split_first()? {
            out.push(element);
            rest = child;
        }
        Ok(out)
    }

    /// Returns the first element and the rest of the tuple.
    pub fn split_first(&self) -> Result<Option<(Element, Tuple<'a>)>, TupleError> {
        let Some(first) = self.first()? else {
            return Ok(None);
        };
        let child = self.child()?.expect("tuple with a first has a child");
        Ok(Some((first, child)))
    }
}

impl<'a> std::fmt::Debug for Tuple<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut list = f.debug_list();
        let mut rest = *self;
        loop {
            match rest.split_first() {
                Ok(Some((element, child))) => {
                    list.entry(&element);
                    rest = child;
                }
                Ok(None) => break,
                Err(_) => {
                    list.entry(&format_args!("<{}>", hex::encode(rest.as_ref())));
                    break;
                }
            }
        }
        list.finish()
    }
}

impl<'a> AsRef<[u8]> for Tuple<'a> {
    fn as_ref(&self) -> &[u8] {
        self.0
    }
}

/// Packs a slice of elements.
pub fn pack(elements: &[Element]) -> Vec<u8> {
    let mut buf = TupleBuf::new();
    for element in elements {
        buf.element(element);
    }
    buf.into_bytes()
}

/// Unpacks an encoded tuple into its elements.
pub fn unpack(bytes: &[u8]) -> Result<Vec<Element>, TupleError> {
    Tuple::new(bytes).elements()
}

/// The exclusive upper bound of the set of keys starting with `prefix`:
/// the prefix with its last non-`0xFF` byte incremented.
pub fn strinc(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xff {
            *last += 1;
            return end;
        }
        end.pop();
    }
    // tuple encodings always contain a tag byte below 0xff, an empty or
    // all-0xff prefix means the whole keyspace
    vec![0xff]
}

/// A byte prefix under which a logical namespace of keys lives.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    /// Creates a subspace over a raw byte prefix.
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Creates a subspace whose prefix is a packed tuple.
    pub fn from_elements(elements: &[Element]) -> Self {
        Self::new(pack(elements))
    }

    /// The raw prefix bytes.
    pub fn raw(&self) -> &[u8] {
        &self.prefix
    }

    /// A nested subspace extending the prefix with packed elements.
    pub fn subspace(&self, elements: &[Element]) -> Subspace {
        let mut prefix = self.prefix.clone();
        prefix.extend(pack(elements));
        Self { prefix }
    }

    /// Packs elements under the prefix.
    pub fn pack(&self, elements: &[Element]) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend(pack(elements));
        key
    }

    /// Strips the prefix and unpacks the remainder.
    pub fn unpack(&self, key: &[u8]) -> Result<Vec<Element>, TupleError> {
        let rest = key
            .strip_prefix(self.prefix.as_slice())
            .ok_or_else(|| TupleError::OutsideSubspace {
                bytes: key.to_vec(),
                subspace: self.prefix.clone(),
            })?;
        unpack(rest)
    }

    /// Returns true if the key lives under the prefix.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// The `[begin, end)` key range covering the whole subspace.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        (self.prefix.clone(), strinc(&self.prefix))
    }

    /// The `[begin, end)` key range covering keys extending the packed
    /// elements.
    pub fn range_of(&self, elements: &[Element]) -> (Vec<u8>, Vec<u8>) {
        let begin = self.pack(elements);
        let end = strinc(&begin);
        (begin, end)
    }
}
