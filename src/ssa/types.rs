//! The SSA type lattice and runtime tag sets.
//!
//! Every node in a [`crate::Program`] declares an [`SsaType`]: a small bitset naming the
//! register kind(s) the node produces. Most nodes produce exactly one kind. Boxed values
//! may additionally carry the [`SsaType::BOOL`] qualifier, meaning the node is its own
//! validity mask, and the [`SsaType::LIST`] qualifier when the boxed value is statically
//! known to be a list.
//!
//! [`TypeSet`] is the runtime counterpart: a set of boxed value tags, used as the
//! immediate of tag checks (`checktag`) and type assertions.

use std::fmt;

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

bitflags! {
    /// Register kinds a node may produce or an operand slot may accept.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct SsaType: u16 {
        /// Memory/state token threaded through returns.
        const MEM = 1 << 0;
        /// One bit per lane. Either a validity mask or a truth mask.
        const BOOL = 1 << 1;
        /// Signed 64-bit integer register.
        const INT = 1 << 2;
        /// 64-bit floating point register.
        const FLOAT = 1 << 3;
        /// Unboxed string slice register.
        const STRING = 1 << 4;
        /// Unboxed timestamp register, microseconds since the Unix epoch.
        const TIME = 1 << 5;
        /// Boxed, self-describing encoded value.
        const VALUE = 1 << 6;
        /// Qualifier: the boxed value is known to be a list.
        const LIST = 1 << 7;
        /// Per-lane 128-bit hash register.
        const HASH = 1 << 8;

        /// Any operand kind except the memory token. Used by pass-through pseudo-ops.
        const ANY = Self::BOOL.bits() | Self::INT.bits() | Self::FLOAT.bits()
            | Self::STRING.bits() | Self::TIME.bits() | Self::VALUE.bits()
            | Self::LIST.bits() | Self::HASH.bits();
        /// Operand slot accepting either int register kind.
        const INTEGRAL = Self::INT.bits() | Self::TIME.bits();
    }
}

impl SsaType {
    /// Returns the primary type: the return type with the mask and list qualifiers
    /// cleared, unless the type is exactly [`SsaType::BOOL`].
    #[must_use]
    pub fn primary(self) -> SsaType {
        if self == SsaType::BOOL {
            return self;
        }
        self.difference(SsaType::BOOL | SsaType::LIST)
    }

    /// Returns true if a node returning `self` may be passed where `slot` is expected.
    #[must_use]
    pub fn satisfies(self, slot: SsaType) -> bool {
        if slot == SsaType::BOOL {
            return self.contains(SsaType::BOOL);
        }
        self.primary().intersects(slot)
    }

    /// Short lowercase name of the primary type, used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        let primary = self.primary();
        if primary == SsaType::BOOL {
            "logical"
        } else if primary == SsaType::INT {
            "integer"
        } else if primary == SsaType::FLOAT {
            "float"
        } else if primary == SsaType::STRING {
            "string"
        } else if primary == SsaType::TIME {
            "timestamp"
        } else if primary == SsaType::VALUE {
            if self.contains(SsaType::LIST) {
                "list"
            } else {
                "value"
            }
        } else if primary == SsaType::MEM {
            "memory"
        } else if primary == SsaType::HASH {
            "hash"
        } else if primary.is_empty() {
            "nothing"
        } else {
            "mixed"
        }
    }
}

impl fmt::Display for SsaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime tag of a boxed value.
///
/// The discriminant is the tag's bit position in a [`TypeSet`] and is also the integer
/// accepted by the `ASSERT_ION_TYPE` builtin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumCount, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum TypeTag {
    /// The null value
    Null = 0,
    /// Boolean
    Bool = 1,
    /// Non-negative integer
    UInt = 2,
    /// Negative integer
    Int = 3,
    /// Binary float
    Float = 4,
    /// Decimal
    Decimal = 5,
    /// Timestamp
    Timestamp = 6,
    /// Interned symbol
    Symbol = 7,
    /// String
    String = 8,
    /// List
    List = 9,
    /// Struct
    Struct = 10,
}

impl TypeTag {
    /// Maps an integer tag to a [`TypeTag`].
    #[must_use]
    pub fn from_index(index: i64) -> Option<TypeTag> {
        TypeTag::iter().find(|tag| *tag as i64 == index)
    }

    /// The JSON-style type bit reported by `TYPE_BIT`.
    ///
    /// Integer, float and decimal tags all report the single "number" bit and symbols
    /// report the "string" bit.
    #[must_use]
    pub const fn json_bit(self) -> i64 {
        match self {
            TypeTag::Null => 1 << 0,
            TypeTag::Bool => 1 << 1,
            TypeTag::UInt | TypeTag::Int | TypeTag::Float | TypeTag::Decimal => 1 << 2,
            TypeTag::Timestamp => 1 << 3,
            TypeTag::String | TypeTag::Symbol => 1 << 4,
            TypeTag::List => 1 << 5,
            TypeTag::Struct => 1 << 6,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

bitflags! {
    /// A set of boxed value tags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct TypeSet: u16 {
        /// `null`
        const NULL = 1 << TypeTag::Null as u16;
        /// `true` / `false`
        const BOOL = 1 << TypeTag::Bool as u16;
        /// Non-negative integer
        const UINT = 1 << TypeTag::UInt as u16;
        /// Negative integer
        const INT = 1 << TypeTag::Int as u16;
        /// Binary float
        const FLOAT = 1 << TypeTag::Float as u16;
        /// Decimal
        const DECIMAL = 1 << TypeTag::Decimal as u16;
        /// Timestamp
        const TIMESTAMP = 1 << TypeTag::Timestamp as u16;
        /// Interned symbol
        const SYMBOL = 1 << TypeTag::Symbol as u16;
        /// String
        const STRING = 1 << TypeTag::String as u16;
        /// List
        const LIST = 1 << TypeTag::List as u16;
        /// Struct
        const STRUCT = 1 << TypeTag::Struct as u16;

        /// Any number representation.
        const NUMERIC = Self::UINT.bits() | Self::INT.bits() | Self::FLOAT.bits() | Self::DECIMAL.bits();
        /// Any string representation, including dictionary-encoded symbols.
        const TEXT = Self::STRING.bits() | Self::SYMBOL.bits();
    }
}

impl TypeSet {
    /// Returns the set holding exactly `tag`.
    #[must_use]
    pub const fn of(tag: TypeTag) -> TypeSet {
        TypeSet::from_bits_truncate(1 << tag as u16)
    }

    /// Returns true if `tag` is a member of the set.
    #[must_use]
    pub const fn has(self, tag: TypeTag) -> bool {
        self.contains(TypeSet::of(tag))
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = TypeTag::iter()
            .filter(|tag| self.has(*tag))
            .map(Into::into)
            .collect();
        write!(f, "{{{}}}", names.join("|"))
    }
}
