use crate::iri::Iri;

/// A data value as it appears in data property assertions and ranges.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Literal {
    /// A utf8 string value.
    Str(String),
    /// A signed integer value.
    Int(i64),
    /// A boolean value.
    Bool(bool),
}

impl Literal {
    fn tag(&self) -> u8 {
        match self {
            Literal::Str(_) => 0,
            Literal::Int(_) => 1,
            Literal::Bool(_) => 2,
        }
    }

    /// The lexical form of the literal, used when a literal rides in a
    /// triple slot.
    pub fn lexical(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            Literal::Int(i) => i.to_string(),
            Literal::Bool(b) => b.to_string(),
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// The built in datatypes a data range can name.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Datatype {
    /// `xsd:string`.
    Str,
    /// `xsd:integer`.
    Int,
    /// `xsd:boolean`.
    Bool,
}

impl Datatype {
    /// A witness value inhabiting the datatype.
    pub fn witness(&self) -> Literal {
        match self {
            Datatype::Str => Literal::Str(String::new()),
            Datatype::Int => Literal::Int(0),
            Datatype::Bool => Literal::Bool(false),
        }
    }
}

/// A data range: a datatype or an enumeration of literals.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum DataRange {
    /// All values of a datatype.
    Datatype(Datatype),
    /// An enumerated set of literals.
    OneOf(Vec<Literal>),
}

impl DataRange {
    /// A witness value from the range, if the range is inhabited.
    pub fn witness(&self) -> Option<Literal> {
        match self {
            DataRange::Datatype(d) => Some(d.witness()),
            DataRange::OneOf(vs) => vs.first().cloned(),
        }
    }

    /// Returns true if the literal belongs to the range.
    pub fn contains(&self, lit: &Literal) -> bool {
        match self {
            DataRange::Datatype(d) => {
                matches!(
                    (d, lit),
                    (Datatype::Str, Literal::Str(_))
                        | (Datatype::Int, Literal::Int(_))
                        | (Datatype::Bool, Literal::Bool(_))
                )
            }
            DataRange::OneOf(vs) => vs.contains(lit),
        }
    }
}

/// A SHOIN(D) class expression.
///
/// The algebra is closed under negation via [`ClassExpression::nnf`], which
/// pushes complements to the atoms. Expressions are ordered so that label
/// sets and caches iterate deterministically.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ClassExpression {
    /// The top class, `owl:Thing`.
    Thing,
    /// The bottom class, `owl:Nothing`.
    Nothing,
    /// A named class.
    Class(Iri),
    /// Complement, `¬C`.
    Not(Box<ClassExpression>),
    /// Intersection, `C ⊓ D ⊓ …`.
    And(Vec<ClassExpression>),
    /// Union, `C ⊔ D ⊔ …`.
    Or(Vec<ClassExpression>),
    /// Existential restriction, `∃R.C`.
    SomeValues(Iri, Box<ClassExpression>),
    /// Universal restriction, `∀R.C`.
    AllValues(Iri, Box<ClassExpression>),
    /// Individual value restriction, `∃R.{a}`.
    HasValue(Iri, Iri),
    /// Local reflexivity, `∃R.Self`.
    HasSelf(Iri),
    /// Qualified minimum cardinality, `≥n R.C`.
    MinCardinality(u32, Iri, Box<ClassExpression>),
    /// Qualified maximum cardinality, `≤n R.C`.
    MaxCardinality(u32, Iri, Box<ClassExpression>),
    /// Nominal enumeration, `{a₁, …, aₙ}`.
    OneOf(Vec<Iri>),
    /// Data existential restriction, `∃P.D`.
    DataSomeValues(Iri, DataRange),
    /// Data value restriction, `∃P.{v}`.
    DataHasValue(Iri, Literal),
}

impl ClassExpression {
    /// A named class expression.
    pub fn class(iri: impl Into<Iri>) -> Self {
        ClassExpression::Class(iri.into())
    }

    /// The complement of `self`, already in negation normal form.
    pub fn complement(&self) -> Self {
        ClassExpression::Not(Box::new(self.clone())).nnf()
    }

    /// Rewrites the expression into negation normal form: negation occurs
    /// only directly above atoms (named classes, nominals, self
    /// restrictions and data atoms).
    pub fn nnf(&self) -> Self {
        use ClassExpression::*;
        match self {
            Thing | Nothing | Class(_) | HasValue(..) | HasSelf(_) | OneOf(_)
            | DataSomeValues(..) | DataHasValue(..) => self.clone(),
            Not(inner) => match &**inner {
                Thing => Nothing,
                Nothing => Thing,
                Class(_) | HasSelf(_) | OneOf(_) | DataSomeValues(..) | DataHasValue(..) => {
                    self.clone()
                }
                Not(c) => c.nnf(),
                And(cs) => Or(cs.iter().map(|c| Not(Box::new(c.clone())).nnf()).collect()),
                Or(cs) => And(cs.iter().map(|c| Not(Box::new(c.clone())).nnf()).collect()),
                SomeValues(r, c) => {
                    AllValues(r.clone(), Box::new(Not(Box::new((**c).clone())).nnf()))
                }
                AllValues(r, c) => {
                    SomeValues(r.clone(), Box::new(Not(Box::new((**c).clone())).nnf()))
                }
                HasValue(r, a) => AllValues(
                    r.clone(),
                    Box::new(Not(Box::new(OneOf(vec![a.clone()])))),
                ),
                MinCardinality(n, r, c) => {
                    if *n == 0 {
                        // ≥0 is ⊤
                        Nothing
                    } else {
                        MaxCardinality(n - 1, r.clone(), Box::new(c.nnf()))
                    }
                }
                MaxCardinality(n, r, c) => MinCardinality(n + 1, r.clone(), Box::new(c.nnf())),
            },
            And(cs) => And(cs.iter().map(|c| c.nnf()).collect()),
            Or(cs) => Or(cs.iter().map(|c| c.nnf()).collect()),
            SomeValues(r, c) => SomeValues(r.clone(), Box::new(c.nnf())),
            AllValues(r, c) => AllValues(r.clone(), Box::new(c.nnf())),
            MinCardinality(n, r, c) => MinCardinality(*n, r.clone(), Box::new(c.nnf())),
            MaxCardinality(n, r, c) => MaxCardinality(*n, r.clone(), Box::new(c.nnf())),
        }
    }

    /// Canonical form: NNF with nested intersections and unions flattened,
    /// operands sorted and deduplicated, and trivial wrappers collapsed.
    /// Two semantically written variants of the same expression share one
    /// canonical form, which is what the reasoner caches key on.
    pub fn canonical(&self) -> Self {
        use ClassExpression::*;
        match self.nnf() {
            And(cs) => {
                let mut flat = Vec::new();
                for c in cs {
                    match c.canonical() {
                        Thing => {}
                        And(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                flat.sort();
                flat.dedup();
                if flat.iter().any(|c| *c == Nothing) {
                    return Nothing;
                }
                match flat.len() {
                    0 => Thing,
                    1 => flat.pop().unwrap(),
                    _ => And(flat),
                }
            }
            Or(cs) => {
                let mut flat = Vec::new();
                for c in cs {
                    match c.canonical() {
                        Nothing => {}
                        Or(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                flat.sort();
                flat.dedup();
                if flat.iter().any(|c| *c == Thing) {
                    return Thing;
                }
                match flat.len() {
                    0 => Nothing,
                    1 => flat.pop().unwrap(),
                    _ => Or(flat),
                }
            }
            Not(c) => Not(Box::new(c.canonical())),
            SomeValues(r, c) => {
                let filler = c.canonical();
                // ∃R.{a} is the canonical spelling of hasValue
                if let OneOf(names) = &filler {
                    if let [name] = names.as_slice() {
                        return HasValue(r, name.clone());
                    }
                }
                SomeValues(r, Box::new(filler))
            }
            AllValues(r, c) => AllValues(r, Box::new(c.canonical())),
            // ≥0 is no restriction at all
            MinCardinality(0, _, _) => Thing,
            MinCardinality(n, r, c) => MinCardinality(n, r, Box::new(c.canonical())),
            MaxCardinality(n, r, c) => MaxCardinality(n, r, Box::new(c.canonical())),
            OneOf(mut names) => {
                names.sort();
                names.dedup();
                OneOf(names)
            }
            other => other,
        }
    }

    /// A stable 32 byte key for the canonical form of the expression.
    pub fn cache_key(&self) -> [u8; 32] {
        let mut bytes = Vec::new();
        self.canonical().encode(&mut bytes);
        blake3::hash(&bytes).into()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        use ClassExpression::*;
        fn put_str(out: &mut Vec<u8>, s: &str) {
            out.extend((s.len() as u32).to_be_bytes());
            out.extend(s.as_bytes());
        }
        match self {
            Thing => out.push(0),
            Nothing => out.push(1),
            Class(iri) => {
                out.push(2);
                put_str(out, iri.as_str());
            }
            Not(c) => {
                out.push(3);
                c.encode(out);
            }
            And(cs) => {
                out.push(4);
                out.extend((cs.len() as u32).to_be_bytes());
                for c in cs {
                    c.encode(out);
                }
            }
            Or(cs) => {
                out.push(5);
                out.extend((cs.len() as u32).to_be_bytes());
                for c in cs {
                    c.encode(out);
                }
            }
            SomeValues(r, c) => {
                out.push(6);
                put_str(out, r.as_str());
                c.encode(out);
            }
            AllValues(r, c) => {
                out.push(7);
                put_str(out, r.as_str());
                c.encode(out);
            }
            HasValue(r, a) => {
                out.push(8);
                put_str(out, r.as_str());
                put_str(out, a.as_str());
            }
            HasSelf(r) => {
                out.push(9);
                put_str(out, r.as_str());
            }
            MinCardinality(n, r, c) => {
                out.push(10);
                out.extend(n.to_be_bytes());
                put_str(out, r.as_str());
                c.encode(out);
            }
            MaxCardinality(n, r, c) => {
                out.push(11);
                out.extend(n.to_be_bytes());
                put_str(out, r.as_str());
                c.encode(out);
            }
            OneOf(names) => {
                out.push(12);
                out.extend((names.len() as u32).to_be_bytes());
                for name in names {
                    put_str(out, name.as_str());
                }
            }
            DataSomeValues(p, range) => {
                out.push(13);
                put_str(out, p.as_str());
                match range {
                    DataRange::Datatype(d) => out.extend([0, *d as u8]),
                    DataRange::OneOf(vs) => {
                        out.push(1);
                        out.extend((vs.len() as u32).to_be_bytes());
                        for v in vs {
                            out.push(v.tag());
                            put_str(out, &v.lexical());
                        }
                    }
                }
            }
            DataHasValue(p, v) => {
                out.push(14);
                put_str(out, p.as_str());
                out.push(v.tag());
                put_str(out, &v.lexical());
            }
        }
    }
}

impl std::fmt::Debug for ClassExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ClassExpression::*;
        match self {
            Thing => write!(f, "⊤"),
            Nothing => write!(f, "⊥"),
            Class(iri) => write!(f, "{:?}", iri),
            Not(c) => write!(f, "¬{:?}", c),
            And(cs) => {
                write!(f, "(")?;
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ⊓ ")?;
                    }
                    write!(f, "{:?}", c)?;
                }
                write!(f, ")")
            }
            Or(cs) => {
                write!(f, "(")?;
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ⊔ ")?;
                    }
                    write!(f, "{:?}", c)?;
                }
                write!(f, ")")
            }
            SomeValues(r, c) => write!(f, "∃{:?}.{:?}", r, c),
            AllValues(r, c) => write!(f, "∀{:?}.{:?}", r, c),
            HasValue(r, a) => write!(f, "∃{:?}.{{{:?}}}", r, a),
            HasSelf(r) => write!(f, "∃{:?}.Self", r),
            MinCardinality(n, r, c) => write!(f, "≥{} {:?}.{:?}", n, r, c),
            MaxCardinality(n, r, c) => write!(f, "≤{} {:?}.{:?}", n, r, c),
            OneOf(names) => {
                write!(f, "{{")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", name)?;
                }
                write!(f, "}}")
            }
            DataSomeValues(p, range) => write!(f, "∃{:?}.{:?}", p, range),
            DataHasValue(p, v) => write!(f, "∃{:?}.{{{}}}", p, v),
        }
    }
}

impl std::fmt::Display for ClassExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(s: &str) -> ClassExpression {
        ClassExpression::class(s)
    }

    #[test]
    fn nnf_pushes_negation_to_atoms() {
        let expr = ClassExpression::Not(Box::new(ClassExpression::And(vec![
            class("A"),
            ClassExpression::SomeValues(Iri::new("r"), Box::new(class("B"))),
        ])));
        let nnf = expr.nnf();
        assert_eq!(
            nnf,
            ClassExpression::Or(vec![
                ClassExpression::Not(Box::new(class("A"))),
                ClassExpression::AllValues(
                    Iri::new("r"),
                    Box::new(ClassExpression::Not(Box::new(class("B")))),
                ),
            ])
        );
    }

    #[test]
    fn nnf_double_negation() {
        let expr = ClassExpression::Not(Box::new(ClassExpression::Not(Box::new(class("A")))));
        assert_eq!(expr.nnf(), class("A"));
    }

    #[test]
    fn nnf_cardinality_duals() {
        let min = ClassExpression::MinCardinality(2, Iri::new("r"), Box::new(class("A")));
        assert_eq!(
            ClassExpression::Not(Box::new(min)).nnf(),
            ClassExpression::MaxCardinality(1, Iri::new("r"), Box::new(class("A")))
        );
        let max = ClassExpression::MaxCardinality(2, Iri::new("r"), Box::new(class("A")));
        assert_eq!(
            ClassExpression::Not(Box::new(max)).nnf(),
            ClassExpression::MinCardinality(3, Iri::new("r"), Box::new(class("A")))
        );
    }

    #[test]
    fn canonical_flattens_and_sorts() {
        let a = ClassExpression::And(vec![
            class("B"),
            ClassExpression::And(vec![class("A"), class("B")]),
        ]);
        let b = ClassExpression::And(vec![class("A"), class("B")]);
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn canonical_collapses_trivial() {
        let a = ClassExpression::And(vec![class("A")]);
        assert_eq!(a.canonical(), class("A"));
        let empty = ClassExpression::And(vec![]);
        assert_eq!(empty.canonical(), ClassExpression::Thing);
        let bottom = ClassExpression::And(vec![class("A"), ClassExpression::Nothing]);
        assert_eq!(bottom.canonical(), ClassExpression::Nothing);
    }

    #[test]
    fn distinct_expressions_distinct_keys() {
        assert_ne!(class("A").cache_key(), class("B").cache_key());
        let some = ClassExpression::SomeValues(Iri::new("r"), Box::new(class("A")));
        let all = ClassExpression::AllValues(Iri::new("r"), Box::new(class("A")));
        assert_ne!(some.cache_key(), all.cache_key());
    }
}
