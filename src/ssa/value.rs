//! Node identifiers, constants and immediates.
//!
//! Nodes of a [`crate::Program`] are addressed by [`ValueId`], a plain index into the
//! program's arena. Rewriting replaces the contents stored at an index but never moves a
//! node, so a [`ValueId`] stays valid for the lifetime of its program.
//!
//! Constants are modelled by [`Datum`], which is what literal nodes carry and what the
//! encoding service serializes. Operator-specific constant payloads are carried as an
//! [`Immediate`].

use std::{
    fmt,
    hash::{Hash, Hasher},
    net::Ipv4Addr,
    sync::Arc,
};

use crate::{
    encoding::Symbol,
    ssa::{
        radix::HashTable,
        types::{SsaType, TypeSet, TypeTag},
    },
};

/// A unique identifier for a node within a [`crate::Program`].
///
/// # Examples
///
/// ```rust
/// use vexc::ValueId;
///
/// let id = ValueId::new(7);
/// assert_eq!(id.index(), 7);
/// assert_eq!(id.to_string(), "v7");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(usize);

impl ValueId {
    /// Creates a new node identifier.
    ///
    /// # Arguments
    ///
    /// * `index` - The index into the node arena
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An explicit (value, mask) pair.
///
/// `mask` is the boolean node whose true lanes are exactly the lanes where `value` holds
/// a defined result. For a boolean node the pair is `(v, v)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskedValue {
    /// The node producing the lane values
    pub value: ValueId,
    /// The node producing the validity mask of `value`
    pub mask: ValueId,
}

impl MaskedValue {
    /// Pairs `value` with `mask`.
    #[must_use]
    pub const fn new(value: ValueId, mask: ValueId) -> Self {
        Self { value, mask }
    }
}

/// Smallest float that converts to an `i64` without saturating.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
/// Exclusive upper bound of floats that convert to an `i64`.
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// A constant value.
///
/// Floats compare and hash by their bit pattern so that constants can key the
/// deduplication table.
#[derive(Debug, Clone)]
pub enum Datum {
    /// SQL `NULL`
    Null,
    /// Boolean constant
    Bool(bool),
    /// Signed integer constant
    Int(i64),
    /// Floating point constant
    Float(f64),
    /// String constant
    String(String),
    /// Timestamp constant, microseconds since the Unix epoch
    Timestamp(i64),
    /// List constant
    List(Vec<Datum>),
    /// Struct constant; fields keep their declared order
    Struct(Vec<(String, Datum)>),
}

impl Datum {
    /// Runtime tag this constant carries once boxed.
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Datum::Null => TypeTag::Null,
            Datum::Bool(_) => TypeTag::Bool,
            Datum::Int(i) if *i >= 0 => TypeTag::UInt,
            Datum::Int(_) => TypeTag::Int,
            Datum::Float(_) => TypeTag::Float,
            Datum::String(_) => TypeTag::String,
            Datum::Timestamp(_) => TypeTag::Timestamp,
            Datum::List(_) => TypeTag::List,
            Datum::Struct(_) => TypeTag::Struct,
        }
    }

    /// Static type of a literal node carrying this constant.
    #[must_use]
    pub fn ssa_type(&self) -> SsaType {
        match self {
            Datum::Int(_) => SsaType::INT,
            Datum::Float(_) => SsaType::FLOAT,
            Datum::String(_) => SsaType::STRING,
            Datum::Timestamp(_) => SsaType::TIME,
            Datum::List(_) => SsaType::VALUE | SsaType::LIST,
            Datum::Null | Datum::Bool(_) | Datum::Struct(_) => SsaType::VALUE,
        }
    }

    /// Returns true for integer and float constants.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Datum::Int(_) | Datum::Float(_))
    }

    /// Numeric value as a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int(i) => Some(*i as f64),
            Datum::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric value as an integer, rounding floats to the nearest integer.
    ///
    /// Floats that round outside the `i64` range have no integer value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(*i),
            Datum::Float(f) if f.is_finite() => {
                let rounded = f.round();
                (I64_LOWER..I64_UPPER)
                    .contains(&rounded)
                    .then_some(rounded as i64)
            }
            _ => None,
        }
    }

    /// Integer value of an int, or of a float with no fractional part that fits an `i64`.
    #[must_use]
    pub fn as_exact_i64(&self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(*i),
            Datum::Float(f) if f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(f) => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    /// Equality under which numbers compare by value, so `Int(11)` matches `Float(11.0)`.
    #[must_use]
    pub fn same_value(&self, other: &Datum) -> bool {
        match (self.as_exact_i64(), other.as_exact_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// The string payload of a string constant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => true,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Int(a), Datum::Int(b)) => a == b,
            (Datum::Float(a), Datum::Float(b)) => a.to_bits() == b.to_bits(),
            (Datum::String(a), Datum::String(b)) => a == b,
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a == b,
            (Datum::List(a), Datum::List(b)) => a == b,
            (Datum::Struct(a), Datum::Struct(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Datum::Null => {}
            Datum::Bool(b) => b.hash(state),
            Datum::Int(i) | Datum::Timestamp(i) => i.hash(state),
            Datum::Float(f) => f.to_bits().hash(state),
            Datum::String(s) => s.hash(state),
            Datum::List(items) => items.hash(state),
            Datum::Struct(fields) => fields.hash(state),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Bool(true) => f.write_str("TRUE"),
            Datum::Bool(false) => f.write_str("FALSE"),
            Datum::Int(i) => write!(f, "{i}"),
            Datum::Float(x) => write!(f, "{x:?}"),
            Datum::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Datum::Timestamp(us) => write!(f, "`{us}us`"),
            Datum::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Datum::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// A field reference resolved through the encoding service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Field name as written in the expression
    pub name: String,
    /// Interned symbol of the name
    pub symbol: Symbol,
}

/// A LIKE/ILIKE pattern with its optional escape character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LikePattern {
    /// Pattern text with `%` and `_` wildcards
    pub pattern: String,
    /// Escape character, if any
    pub escape: Option<char>,
}

/// A compiled regular expression carried by a match opcode.
#[derive(Debug, Clone)]
pub struct RegexPattern(pub Arc<regex::Regex>);

impl RegexPattern {
    /// The anchored source text of the compiled expression.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for RegexPattern {}

impl Hash for RegexPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

/// Operator-specific constant payload of a node.
#[derive(Debug, Clone)]
pub enum Immediate {
    /// Integer immediate (broadcast constants, shift counts, time units)
    Int(i64),
    /// Float immediate
    Float(f64),
    /// A constant carried by a literal node or compared against a boxed value
    Datum(Datum),
    /// Tag set of a tag check
    Types(TypeSet),
    /// Field resolved by symbol
    Field(Field),
    /// Free text: diagnostics of invalid nodes, needles and trim sets
    Text(String),
    /// LIKE pattern
    Like(LikePattern),
    /// Regular expression
    Regex(RegexPattern),
    /// Inclusive IPv4 range
    Ip4(Ipv4Addr, Ipv4Addr),
    /// Radix hash table of a membership test or lookup
    Table(Arc<HashTable>),
}

impl Immediate {
    /// Integer payload.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Immediate::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Immediate::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Constant payload.
    #[must_use]
    pub fn as_datum(&self) -> Option<&Datum> {
        match self {
            Immediate::Datum(d) => Some(d),
            _ => None,
        }
    }

    /// Text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Immediate::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Radix table payload.
    #[must_use]
    pub fn as_table(&self) -> Option<&Arc<HashTable>> {
        match self {
            Immediate::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Numeric payload of an int or float immediate, as a float.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Immediate::Int(i) => Some(*i as f64),
            Immediate::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl PartialEq for Immediate {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Immediate::Int(a), Immediate::Int(b)) => a == b,
            (Immediate::Float(a), Immediate::Float(b)) => a.to_bits() == b.to_bits(),
            (Immediate::Datum(a), Immediate::Datum(b)) => a == b,
            (Immediate::Types(a), Immediate::Types(b)) => a == b,
            (Immediate::Field(a), Immediate::Field(b)) => a == b,
            (Immediate::Text(a), Immediate::Text(b)) => a == b,
            (Immediate::Like(a), Immediate::Like(b)) => a == b,
            (Immediate::Regex(a), Immediate::Regex(b)) => a == b,
            (Immediate::Ip4(a0, a1), Immediate::Ip4(b0, b1)) => a0 == b0 && a1 == b1,
            (Immediate::Table(a), Immediate::Table(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Immediate {}

impl Hash for Immediate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Immediate::Int(i) => i.hash(state),
            Immediate::Float(f) => f.to_bits().hash(state),
            Immediate::Datum(d) => d.hash(state),
            Immediate::Types(t) => t.hash(state),
            Immediate::Field(field) => field.hash(state),
            Immediate::Text(s) => s.hash(state),
            Immediate::Like(p) => p.hash(state),
            Immediate::Regex(r) => r.hash(state),
            Immediate::Ip4(lo, hi) => {
                lo.hash(state);
                hi.hash(state);
            }
            Immediate::Table(t) => std::ptr::hash(Arc::as_ptr(t), state),
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int(i) => write!(f, "{i}"),
            Immediate::Float(x) => write!(f, "{x:?}"),
            Immediate::Datum(d) => write!(f, "{d}"),
            Immediate::Types(t) => write!(f, "{t}"),
            Immediate::Field(field) => write!(f, "{}#{}", field.name, field.symbol),
            Immediate::Text(s) => write!(f, "{s:?}"),
            Immediate::Like(p) => match p.escape {
                Some(esc) => write!(f, "{:?} escape {esc:?}", p.pattern),
                None => write!(f, "{:?}", p.pattern),
            },
            Immediate::Regex(r) => write!(f, "/{}/", r.as_str()),
            Immediate::Ip4(lo, hi) => write!(f, "{lo}..={hi}"),
            Immediate::Table(t) => write!(f, "<table {} entries>", t.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datum_tags() {
        assert_eq!(Datum::Int(3).type_tag(), TypeTag::UInt);
        assert_eq!(Datum::Int(-3).type_tag(), TypeTag::Int);
        assert_eq!(Datum::Float(1.5).type_tag(), TypeTag::Float);
        assert_eq!(Datum::List(vec![]).ssa_type(), SsaType::VALUE | SsaType::LIST);
    }

    #[test]
    fn test_datum_rounding() {
        assert_eq!(Datum::Float(3.7).as_i64(), Some(4));
        assert_eq!(Datum::Float(-2.5).as_i64(), Some(-3));
        assert_eq!(Datum::Float(f64::NAN).as_i64(), None);
        assert_eq!(Datum::String("x".into()).as_i64(), None);
        assert_eq!(Datum::Float(1e300).as_i64(), None);
        assert_eq!(Datum::Float(-1e19).as_i64(), None);
        assert_eq!(Datum::Float(-9.223_372_036_854_775_808e18).as_i64(), Some(i64::MIN));
    }

    #[test]
    fn test_same_value_compares_numbers() {
        assert!(Datum::Int(11).same_value(&Datum::Float(11.0)));
        assert!(Datum::Float(-0.0).same_value(&Datum::Int(0)));
        assert!(!Datum::Int(1).same_value(&Datum::Float(1.5)));
        assert!(Datum::Float(1.5).same_value(&Datum::Float(1.5)));
        assert!(!Datum::Int(1).same_value(&Datum::String("1".into())));
        assert_eq!(Datum::Float(2.5).as_exact_i64(), None);
        assert_eq!(Datum::Float(1e300).as_exact_i64(), None);
    }

    #[test]
    fn test_float_identity_by_bits() {
        assert_eq!(Datum::Float(f64::NAN), Datum::Float(f64::NAN));
        assert_ne!(Datum::Float(0.0), Datum::Float(-0.0));
        assert_eq!(Immediate::Float(1.0), Immediate::Float(1.0));
        assert_ne!(Immediate::Float(1.0), Immediate::Int(1));
    }

    #[test]
    fn test_datum_display() {
        let d = Datum::Struct(vec![
            ("a".into(), Datum::Int(1)),
            ("b".into(), Datum::List(vec![Datum::String("it's".into()), Datum::Null])),
        ]);
        assert_eq!(d.to_string(), "{a: 1, b: ['it''s', NULL]}");
        assert_eq!(Datum::Float(2.0).to_string(), "2.0");
    }
}
