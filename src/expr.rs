//! The expression tree consumed by the compiler.
//!
//! [`Expr`] is the closed set of scalar and logical expressions the planner hands to
//! [`crate::compile_logical`] and [`crate::compile_value`]. Parsing and name resolution
//! happen upstream; the tree carries field names as written and constants as [`Datum`]s.
//!
//! Every node renders as SQL-like text, which is what compile errors quote.
//!
//! # Examples
//!
//! ```rust
//! use vexc::{CmpOp, Expr};
//!
//! let e = Expr::and(
//!     Expr::compare(CmpOp::Gt, Expr::path("price"), Expr::Integer(5)),
//!     Expr::not(Expr::path("deleted")),
//! );
//! assert_eq!(e.to_string(), "(price > 5 AND NOT deleted)");
//! ```

use std::fmt;

use strum::{EnumIter, IntoStaticStr};

use crate::ssa::{Datum, TypeTag};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// The operator with its operands swapped: `a < b` is `b > a`.
    #[must_use]
    pub const fn flip(self) -> CmpOp {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            op => op,
        }
    }

    /// SQL spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// String matching operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    /// `LIKE`
    Like,
    /// `ILIKE`
    ILike,
    /// `~`
    RegexMatch,
    /// `~*`
    RegexMatchCi,
    /// `SIMILAR TO`
    SimilarTo,
    /// Case-insensitive `SIMILAR TO`
    SimilarToCi,
}

impl MatchOp {
    const fn symbol(self) -> &'static str {
        match self {
            MatchOp::Like => "LIKE",
            MatchOp::ILike => "ILIKE",
            MatchOp::RegexMatch => "~",
            MatchOp::RegexMatchCi => "~*",
            MatchOp::SimilarTo => "SIMILAR TO",
            MatchOp::SimilarToCi => "SIMILAR TO CI",
        }
    }
}

/// Unary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `~x`
    BitNot,
}

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>` (arithmetic)
    Sra,
    /// `>>>` (logical)
    Srl,
}

impl ArithOp {
    /// Returns true for operators only defined on integers.
    #[must_use]
    pub const fn is_bitwise(self) -> bool {
        matches!(
            self,
            ArithOp::BitAnd
                | ArithOp::BitOr
                | ArithOp::BitXor
                | ArithOp::Shl
                | ArithOp::Sra
                | ArithOp::Srl
        )
    }

    /// SQL spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::BitAnd => "&",
            ArithOp::BitOr => "|",
            ArithOp::BitXor => "^",
            ArithOp::Shl => "<<",
            ArithOp::Sra => ">>",
            ArithOp::Srl => ">>>",
        }
    }
}

/// Binary logical operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    /// `AND`
    And,
    /// `OR`
    Or,
    /// Boolean inequality
    Xor,
    /// Boolean equality
    Xnor,
}

/// The `IS` predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsKey {
    /// `IS NULL`
    Null,
    /// `IS NOT NULL`
    NotNull,
    /// `IS MISSING`
    Missing,
    /// `IS NOT MISSING`
    NotMissing,
    /// `IS TRUE`
    True,
    /// `IS FALSE`
    False,
    /// `IS NOT TRUE`
    NotTrue,
    /// `IS NOT FALSE`
    NotFalse,
}

impl IsKey {
    const fn text(self) -> &'static str {
        match self {
            IsKey::Null => "IS NULL",
            IsKey::NotNull => "IS NOT NULL",
            IsKey::Missing => "IS MISSING",
            IsKey::NotMissing => "IS NOT MISSING",
            IsKey::True => "IS TRUE",
            IsKey::False => "IS FALSE",
            IsKey::NotTrue => "IS NOT TRUE",
            IsKey::NotFalse => "IS NOT FALSE",
        }
    }
}

/// One step of a path after its first field.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// `.name`
    Field(String),
    /// `[n]`
    Index(i64),
}

/// Target type of a `CAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum CastType {
    /// `MISSING`
    Missing,
    /// `NULL`
    Null,
    /// `BOOLEAN`
    #[strum(serialize = "BOOLEAN")]
    Bool,
    /// `INTEGER`
    Integer,
    /// `FLOAT`
    Float,
    /// `STRING`
    String,
    /// `TIMESTAMP`
    Timestamp,
    /// `LIST`
    List,
    /// `STRUCT`
    Struct,
    /// `DECIMAL`
    Decimal,
    /// `SYMBOL`
    Symbol,
}

/// Unit of a date/time builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TimePart {
    /// Microseconds
    Microsecond,
    /// Milliseconds
    Millisecond,
    /// Seconds
    Second,
    /// Minutes
    Minute,
    /// Hours
    Hour,
    /// Days
    Day,
    /// Day of the week (0 = Sunday)
    #[strum(serialize = "DOW")]
    Dow,
    /// Day of the year
    #[strum(serialize = "DOY")]
    Doy,
    /// Weeks
    Week,
    /// Months
    Month,
    /// Quarters
    Quarter,
    /// Years
    Year,
}

impl TimePart {
    /// Length of the unit in microseconds, for fixed-length units.
    #[must_use]
    pub const fn micros(self) -> Option<i64> {
        match self {
            TimePart::Microsecond => Some(1),
            TimePart::Millisecond => Some(1_000),
            TimePart::Second => Some(1_000_000),
            TimePart::Minute => Some(60_000_000),
            TimePart::Hour => Some(3_600_000_000),
            TimePart::Day => Some(86_400_000_000),
            TimePart::Week => Some(7 * 86_400_000_000),
            _ => None,
        }
    }

    /// Length of the unit in months, for calendar units.
    #[must_use]
    pub const fn months(self) -> Option<i64> {
        match self {
            TimePart::Month => Some(1),
            TimePart::Quarter => Some(3),
            TimePart::Year => Some(12),
            _ => None,
        }
    }
}

impl fmt::Display for TimePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

/// Builtin functions.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Builtin {
    DateAdd(TimePart),
    DateDiff(TimePart),
    DateExtract(TimePart),
    DateTrunc(TimePart),
    ToUnixEpoch,
    ToUnixMicro,
    TimeBucket,

    Pi,
    Log,
    Degrees,
    Radians,
    Round,
    RoundEven,
    Trunc,
    Floor,
    Ceil,
    Sqrt,
    Cbrt,
    Exp,
    #[strum(serialize = "EXP2")]
    Exp2,
    #[strum(serialize = "EXP10")]
    Exp10,
    #[strum(serialize = "EXPM1")]
    ExpM1,
    Ln,
    #[strum(serialize = "LN1P")]
    Ln1p,
    #[strum(serialize = "LOG2")]
    Log2,
    #[strum(serialize = "LOG10")]
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Abs,
    Sign,
    BitCount,
    Hypot,
    Pow,
    #[strum(serialize = "ATAN2")]
    Atan2,
    Least,
    Greatest,
    WidthBucket,

    Concat,
    Trim,
    Ltrim,
    Rtrim,
    Contains,
    ContainsCi,
    EqualsCi,
    EqualsFuzzy,
    EqualsFuzzyUnicode,
    ContainsFuzzy,
    ContainsFuzzyUnicode,
    IsSubnetOf,
    CharLength,
    Substring,
    SplitPart,
    Lower,
    Upper,

    GeoHash,
    GeoTileX,
    GeoTileY,
    GeoTileEs,
    GeoDistance,

    ObjectSize,
    HashLookup,
    MakeList,
    MakeStruct,
    TypeBit,
    AssertIonType,

    /// A function name with no lowering rule.
    Unknown(String),
}

impl Builtin {
    /// The function name as written in SQL.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Builtin::Unknown(name) => name,
            other => other.into(),
        }
    }

    /// The name of a known builtin, for error wrapping.
    #[must_use]
    pub fn static_name(&self) -> &'static str {
        match self {
            Builtin::Unknown(_) => "UNKNOWN",
            other => other.into(),
        }
    }

    /// The unit of a date/time builtin.
    #[must_use]
    pub fn time_part(&self) -> Option<TimePart> {
        match self {
            Builtin::DateAdd(part)
            | Builtin::DateDiff(part)
            | Builtin::DateExtract(part)
            | Builtin::DateTrunc(part) => Some(*part),
            _ => None,
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One `WHEN ... THEN ...` arm of a CASE.
#[derive(Debug, Clone, PartialEq)]
pub struct Limb {
    /// Condition
    pub when: Expr,
    /// Result when the condition holds
    pub then: Expr,
}

impl Limb {
    /// Creates a limb.
    #[must_use]
    pub fn new(when: Expr, then: Expr) -> Self {
        Self { when, then }
    }
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `TRUE` / `FALSE`
    Bool(bool),
    /// Integer literal
    Integer(i64),
    /// Float literal
    Float(f64),
    /// String literal
    String(String),
    /// Timestamp literal, microseconds since the Unix epoch
    Timestamp(i64),
    /// `NULL`
    Null,
    /// `MISSING`
    Missing,
    /// A structured constant (list or struct)
    Datum(Datum),
    /// `left op right`
    Comparison {
        /// Operator
        op: CmpOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `expr LIKE pattern` and friends
    StringMatch {
        /// Operator
        op: MatchOp,
        /// Matched expression
        expr: Box<Expr>,
        /// Pattern text
        pattern: String,
        /// LIKE escape character
        escape: Option<char>,
    },
    /// `-child`, `~child`
    UnaryArith {
        /// Operator
        op: UnaryOp,
        /// Operand
        child: Box<Expr>,
    },
    /// `left op right`
    Arithmetic {
        /// Operator
        op: ArithOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `left AND right` and friends
    Logical {
        /// Operator
        op: LogicOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `NOT expr`
    Not(Box<Expr>),
    /// `first.rest...`
    Path {
        /// Top-level field
        first: String,
        /// Further steps
        rest: Vec<PathStep>,
    },
    /// `expr IS ...`
    IsKey {
        /// Predicate
        key: IsKey,
        /// Tested expression
        expr: Box<Expr>,
    },
    /// `FUNC(args...)`
    Builtin {
        /// Function
        func: Builtin,
        /// Arguments
        args: Vec<Expr>,
    },
    /// `CASE WHEN ... END`
    Case {
        /// Arms, in evaluation order
        limbs: Vec<Limb>,
        /// `ELSE` result; `NULL` when absent
        otherwise: Option<Box<Expr>>,
        /// Set by the planner when the result is only consumed as a condition
        logical: bool,
    },
    /// `CAST(from AS to)`
    Cast {
        /// Converted expression
        from: Box<Expr>,
        /// Target type
        to: CastType,
    },
    /// `arg IN (values...)`
    Member {
        /// Tested expression
        arg: Box<Expr>,
        /// Constant set
        values: Vec<Datum>,
    },
}

impl Expr {
    /// A path consisting of a single field.
    #[must_use]
    pub fn path(first: impl Into<String>) -> Expr {
        Expr::Path {
            first: first.into(),
            rest: Vec::new(),
        }
    }

    /// Extends a path with `.name`. Other expressions are returned unchanged.
    #[must_use]
    pub fn dot(self, name: impl Into<String>) -> Expr {
        self.step(PathStep::Field(name.into()))
    }

    /// Extends a path with `[index]`. Other expressions are returned unchanged.
    #[must_use]
    pub fn at(self, index: i64) -> Expr {
        self.step(PathStep::Index(index))
    }

    fn step(self, step: PathStep) -> Expr {
        match self {
            Expr::Path { first, mut rest } => {
                rest.push(step);
                Expr::Path { first, rest }
            }
            other => other,
        }
    }

    /// A string literal.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Expr {
        Expr::String(s.into())
    }

    /// `left op right`.
    #[must_use]
    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Expr {
        Expr::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left op right`.
    #[must_use]
    pub fn arith(op: ArithOp, left: Expr, right: Expr) -> Expr {
        Expr::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `-child` or `~child`.
    #[must_use]
    pub fn unary(op: UnaryOp, child: Expr) -> Expr {
        Expr::UnaryArith {
            op,
            child: Box::new(child),
        }
    }

    /// `left op right`.
    #[must_use]
    pub fn logical(op: LogicOp, left: Expr, right: Expr) -> Expr {
        Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left AND right`.
    #[must_use]
    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::logical(LogicOp::And, left, right)
    }

    /// `left OR right`.
    #[must_use]
    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::logical(LogicOp::Or, left, right)
    }

    /// `NOT inner`.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(inner: Expr) -> Expr {
        Expr::Not(Box::new(inner))
    }

    /// `expr IS ...`.
    #[must_use]
    pub fn is(key: IsKey, expr: Expr) -> Expr {
        Expr::IsKey {
            key,
            expr: Box::new(expr),
        }
    }

    /// `expr op 'pattern'`.
    #[must_use]
    pub fn string_match(op: MatchOp, expr: Expr, pattern: impl Into<String>) -> Expr {
        Expr::StringMatch {
            op,
            expr: Box::new(expr),
            pattern: pattern.into(),
            escape: None,
        }
    }

    /// `func(args...)`.
    #[must_use]
    pub fn call(func: Builtin, args: Vec<Expr>) -> Expr {
        Expr::Builtin { func, args }
    }

    /// `CASE limbs ELSE otherwise END`.
    #[must_use]
    pub fn case(limbs: Vec<Limb>, otherwise: Option<Expr>) -> Expr {
        Expr::Case {
            limbs,
            otherwise: otherwise.map(Box::new),
            logical: false,
        }
    }

    /// A CASE the planner marked as only ever consumed as a condition.
    #[must_use]
    pub fn logical_case(limbs: Vec<Limb>, otherwise: Option<Expr>) -> Expr {
        Expr::Case {
            limbs,
            otherwise: otherwise.map(Box::new),
            logical: true,
        }
    }

    /// `CAST(from AS to)`.
    #[must_use]
    pub fn cast(from: Expr, to: CastType) -> Expr {
        Expr::Cast {
            from: Box::new(from),
            to,
        }
    }

    /// `arg IN (values...)`.
    #[must_use]
    pub fn member(arg: Expr, values: Vec<Datum>) -> Expr {
        Expr::Member {
            arg: Box::new(arg),
            values,
        }
    }

    /// The constant this expression denotes, if it is a literal.
    #[must_use]
    pub fn as_datum(&self) -> Option<Datum> {
        match self {
            Expr::Bool(b) => Some(Datum::Bool(*b)),
            Expr::Integer(i) => Some(Datum::Int(*i)),
            Expr::Float(f) => Some(Datum::Float(*f)),
            Expr::String(s) => Some(Datum::String(s.clone())),
            Expr::Timestamp(t) => Some(Datum::Timestamp(*t)),
            Expr::Null => Some(Datum::Null),
            Expr::Datum(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Returns true for path expressions.
    #[must_use]
    pub fn is_path(&self) -> bool {
        matches!(self, Expr::Path { .. })
    }

    /// Short name of the node kind, used by unsupported-construct errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Bool(_) => "bool",
            Expr::Integer(_) => "integer",
            Expr::Float(_) => "float",
            Expr::String(_) => "string",
            Expr::Timestamp(_) => "timestamp",
            Expr::Null => "null",
            Expr::Missing => "missing",
            Expr::Datum(_) => "constant",
            Expr::Comparison { .. } => "comparison",
            Expr::StringMatch { .. } => "string match",
            Expr::UnaryArith { .. } => "unary arithmetic",
            Expr::Arithmetic { .. } => "arithmetic",
            Expr::Logical { .. } => "logical",
            Expr::Not(_) => "not",
            Expr::Path { .. } => "path",
            Expr::IsKey { .. } => "is",
            Expr::Builtin { .. } => "builtin",
            Expr::Case { .. } => "case",
            Expr::Cast { .. } => "cast",
            Expr::Member { .. } => "member",
        }
    }
}

impl From<Datum> for Expr {
    fn from(d: Datum) -> Self {
        match d {
            Datum::Null => Expr::Null,
            Datum::Bool(b) => Expr::Bool(b),
            Datum::Int(i) => Expr::Integer(i),
            Datum::Float(f) => Expr::Float(f),
            Datum::String(s) => Expr::String(s),
            Datum::Timestamp(t) => Expr::Timestamp(t),
            other => Expr::Datum(other),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(true) => f.write_str("TRUE"),
            Expr::Bool(false) => f.write_str("FALSE"),
            Expr::Integer(i) => write!(f, "{i}"),
            Expr::Float(x) => write!(f, "{x:?}"),
            Expr::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Expr::Timestamp(t) => write!(f, "{}", Datum::Timestamp(*t)),
            Expr::Null => f.write_str("NULL"),
            Expr::Missing => f.write_str("MISSING"),
            Expr::Datum(d) => write!(f, "{d}"),
            Expr::Comparison { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Expr::StringMatch {
                op,
                expr,
                pattern,
                escape,
            } => {
                write!(f, "{expr} {} '{}'", op.symbol(), pattern.replace('\'', "''"))?;
                if let Some(esc) = escape {
                    write!(f, " ESCAPE '{esc}'")?;
                }
                Ok(())
            }
            Expr::UnaryArith { op, child } => match op {
                UnaryOp::Neg => write!(f, "-{child}"),
                UnaryOp::BitNot => write!(f, "~{child}"),
            },
            Expr::Arithmetic { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expr::Logical { op, left, right } => match op {
                LogicOp::And => write!(f, "({left} AND {right})"),
                LogicOp::Or => write!(f, "({left} OR {right})"),
                LogicOp::Xor => write!(f, "({left} <> {right})"),
                LogicOp::Xnor => write!(f, "({left} = {right})"),
            },
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::Path { first, rest } => {
                f.write_str(first)?;
                for step in rest {
                    match step {
                        PathStep::Field(name) => write!(f, ".{name}")?,
                        PathStep::Index(i) => write!(f, "[{i}]")?,
                    }
                }
                Ok(())
            }
            Expr::IsKey { key, expr } => write!(f, "{expr} {}", key.text()),
            Expr::Builtin { func, args } => {
                write!(f, "{func}(")?;
                let mut first = true;
                if let Some(part) = func.time_part() {
                    write!(f, "{part}")?;
                    first = false;
                }
                for arg in args {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Case {
                limbs, otherwise, ..
            } => {
                f.write_str("CASE")?;
                for limb in limbs {
                    write!(f, " WHEN {} THEN {}", limb.when, limb.then)?;
                }
                if let Some(e) = otherwise {
                    write!(f, " ELSE {e}")?;
                }
                f.write_str(" END")
            }
            Expr::Cast { from, to } => {
                let name: &'static str = to.into();
                write!(f, "CAST({from} AS {name})")
            }
            Expr::Member { arg, values } => {
                write!(f, "{arg} IN (")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Tag named by an `ASSERT_ION_TYPE` argument.
pub(crate) fn tag_argument(e: &Expr) -> Option<TypeTag> {
    match e {
        Expr::Integer(i) => TypeTag::from_index(*i),
        _ => None,
    }
}
