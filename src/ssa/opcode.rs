//! The closed opcode space shared by the compiler and the executor.
//!
//! Every [`Opcode`] is a specialized machine operation with a fixed operand contract
//! ([`Signature`]): the register kinds of its operands, its return kind, and the kind of
//! immediate it carries. The discriminants are dense, start at zero and are
//! append-only: executors address operations positionally, so an existing entry must
//! never be renumbered. New operations go at the end.
//!
//! Operand order follows one convention throughout: value operands first, then the
//! validity mask as the last boolean operand. Operations producing a boolean treat their
//! boolean inputs as truth masks (`and.k`) or as the validity mask of the compared values
//! (`cmplt.f`). Operations whose return type carries [`SsaType::BOOL`] in addition to a
//! value kind are self-masked: the node itself is its validity mask.
//!
//! [`Op`] adds the compiler-internal pseudo-ops that never reach the executor as such.
#![allow(missing_docs)]

use std::fmt;

use strum::{EnumCount, EnumIter, FromRepr, IntoStaticStr};

use crate::ssa::types::SsaType;

const B: SsaType = SsaType::BOOL;
const I: SsaType = SsaType::INT;
const F: SsaType = SsaType::FLOAT;
const S: SsaType = SsaType::STRING;
const T: SsaType = SsaType::TIME;
const V: SsaType = SsaType::VALUE;
const M: SsaType = SsaType::MEM;
const H: SsaType = SsaType::HASH;
const IT: SsaType = SsaType::INTEGRAL;
const VB: SsaType = SsaType::VALUE.union(SsaType::BOOL);
const VL: SsaType = SsaType::VALUE.union(SsaType::LIST);

/// Kind of immediate an operator carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmKind {
    None,
    Int,
    Float,
    Datum,
    Types,
    Field,
    Text,
    Like,
    Regex,
    Ip4,
    Table,
}

/// Operand contract of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Operand kinds, or the repeated operand group when `variadic` is set
    pub args: &'static [SsaType],
    /// Return kind
    pub ret: SsaType,
    /// Immediate kind
    pub imm: ImmKind,
    /// When set, `args` repeats one or more times and is followed by one mask operand
    pub variadic: bool,
}

impl Signature {
    const fn new(args: &'static [SsaType], ret: SsaType) -> Self {
        Self {
            args,
            ret,
            imm: ImmKind::None,
            variadic: false,
        }
    }

    const fn imm(args: &'static [SsaType], ret: SsaType, imm: ImmKind) -> Self {
        Self {
            args,
            ret,
            imm,
            variadic: false,
        }
    }

    const fn repeated(group: &'static [SsaType], ret: SsaType) -> Self {
        Self {
            args: group,
            ret,
            imm: ImmKind::None,
            variadic: true,
        }
    }

    /// Expected kind of operand `index` of a node with `count` operands, if the count
    /// is admissible.
    #[must_use]
    pub fn operand(&self, index: usize, count: usize) -> Option<SsaType> {
        if !self.variadic {
            return (count == self.args.len())
                .then(|| self.args.get(index).copied())
                .flatten();
        }
        let group = self.args.len();
        if count < group + 1 || (count - 1) % group != 0 {
            return None;
        }
        if index == count - 1 {
            Some(SsaType::BOOL)
        } else {
            self.args.get(index % group).copied()
        }
    }

    /// Returns true if `count` operands satisfy the arity contract.
    #[must_use]
    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.variadic {
            count > self.args.len() && (count - 1) % self.args.len() == 0
        } else {
            count == self.args.len()
        }
    }
}

/// Machine operations, densely numbered and append-only.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumCount,
    EnumIter,
    IntoStaticStr,
    FromRepr,
)]
#[repr(u16)]
pub enum Opcode {
    // Returns
    #[strum(serialize = "ret.k")]
    RetK = 0,
    #[strum(serialize = "ret.v")]
    RetV = 1,

    // Mask algebra
    #[strum(serialize = "and.k")]
    AndK = 2,
    #[strum(serialize = "or.k")]
    OrK = 3,
    /// `(!a) & b`
    #[strum(serialize = "andn.k")]
    AndNotK = 4,
    #[strum(serialize = "xor.k")]
    XorK = 5,
    #[strum(serialize = "xnor.k")]
    XnorK = 6,

    // Broadcasts
    #[strum(serialize = "broadcast.f")]
    BroadcastF = 7,
    #[strum(serialize = "broadcast.i")]
    BroadcastI = 8,
    #[strum(serialize = "broadcast.ts")]
    BroadcastTs = 9,

    // Unary float
    #[strum(serialize = "abs.f")]
    AbsF = 10,
    #[strum(serialize = "neg.f")]
    NegF = 11,
    #[strum(serialize = "sign.f")]
    SignF = 12,
    #[strum(serialize = "round.f")]
    RoundF = 13,
    #[strum(serialize = "roundeven.f")]
    RoundEvenF = 14,
    #[strum(serialize = "trunc.f")]
    TruncF = 15,
    #[strum(serialize = "floor.f")]
    FloorF = 16,
    #[strum(serialize = "ceil.f")]
    CeilF = 17,
    #[strum(serialize = "sqrt.f")]
    SqrtF = 18,
    #[strum(serialize = "cbrt.f")]
    CbrtF = 19,
    #[strum(serialize = "exp.f")]
    ExpF = 20,
    #[strum(serialize = "exp2.f")]
    Exp2F = 21,
    #[strum(serialize = "exp10.f")]
    Exp10F = 22,
    #[strum(serialize = "expm1.f")]
    ExpM1F = 23,
    #[strum(serialize = "ln.f")]
    LnF = 24,
    #[strum(serialize = "ln1p.f")]
    Ln1pF = 25,
    #[strum(serialize = "log2.f")]
    Log2F = 26,
    #[strum(serialize = "log10.f")]
    Log10F = 27,
    #[strum(serialize = "sin.f")]
    SinF = 28,
    #[strum(serialize = "cos.f")]
    CosF = 29,
    #[strum(serialize = "tan.f")]
    TanF = 30,
    #[strum(serialize = "asin.f")]
    AsinF = 31,
    #[strum(serialize = "acos.f")]
    AcosF = 32,
    #[strum(serialize = "atan.f")]
    AtanF = 33,

    // Unary int
    #[strum(serialize = "abs.i")]
    AbsI = 34,
    #[strum(serialize = "neg.i")]
    NegI = 35,
    #[strum(serialize = "sign.i")]
    SignI = 36,
    #[strum(serialize = "not.i")]
    NotI = 37,
    #[strum(serialize = "bitcount.i")]
    BitCountI = 38,

    // Binary float
    #[strum(serialize = "add.f")]
    AddF = 39,
    #[strum(serialize = "sub.f")]
    SubF = 40,
    #[strum(serialize = "mul.f")]
    MulF = 41,
    #[strum(serialize = "div.f")]
    DivF = 42,
    #[strum(serialize = "mod.f")]
    ModF = 43,
    #[strum(serialize = "min.f")]
    MinF = 44,
    #[strum(serialize = "max.f")]
    MaxF = 45,
    #[strum(serialize = "atan2.f")]
    Atan2F = 46,
    #[strum(serialize = "hypot.f")]
    HypotF = 47,
    #[strum(serialize = "pow.f")]
    PowF = 48,

    // Float with immediate
    #[strum(serialize = "add.imm.f")]
    AddImmF = 49,
    #[strum(serialize = "sub.imm.f")]
    SubImmF = 50,
    #[strum(serialize = "rsub.imm.f")]
    RsubImmF = 51,
    #[strum(serialize = "mul.imm.f")]
    MulImmF = 52,
    #[strum(serialize = "div.imm.f")]
    DivImmF = 53,
    #[strum(serialize = "rdiv.imm.f")]
    RdivImmF = 54,
    #[strum(serialize = "mod.imm.f")]
    ModImmF = 55,

    // Binary int
    #[strum(serialize = "add.i")]
    AddI = 56,
    #[strum(serialize = "sub.i")]
    SubI = 57,
    #[strum(serialize = "mul.i")]
    MulI = 58,
    #[strum(serialize = "div.i")]
    DivI = 59,
    #[strum(serialize = "mod.i")]
    ModI = 60,
    #[strum(serialize = "min.i")]
    MinI = 61,
    #[strum(serialize = "max.i")]
    MaxI = 62,
    #[strum(serialize = "and.i")]
    AndI = 63,
    #[strum(serialize = "or.i")]
    OrI = 64,
    #[strum(serialize = "xor.i")]
    XorI = 65,
    #[strum(serialize = "sll.i")]
    SllI = 66,
    #[strum(serialize = "sra.i")]
    SraI = 67,
    #[strum(serialize = "srl.i")]
    SrlI = 68,

    // Int with immediate
    #[strum(serialize = "add.imm.i")]
    AddImmI = 69,
    #[strum(serialize = "sub.imm.i")]
    SubImmI = 70,
    #[strum(serialize = "rsub.imm.i")]
    RsubImmI = 71,
    #[strum(serialize = "mul.imm.i")]
    MulImmI = 72,
    #[strum(serialize = "div.imm.i")]
    DivImmI = 73,
    #[strum(serialize = "rdiv.imm.i")]
    RdivImmI = 74,
    #[strum(serialize = "mod.imm.i")]
    ModImmI = 75,
    #[strum(serialize = "and.imm.i")]
    AndImmI = 76,
    #[strum(serialize = "or.imm.i")]
    OrImmI = 77,
    #[strum(serialize = "xor.imm.i")]
    XorImmI = 78,
    #[strum(serialize = "sll.imm.i")]
    SllImmI = 79,
    #[strum(serialize = "sra.imm.i")]
    SraImmI = 80,
    #[strum(serialize = "srl.imm.i")]
    SrlImmI = 81,

    // Conversions
    #[strum(serialize = "cvt.k@i")]
    CvtKToI = 82,
    #[strum(serialize = "cvt.k@f")]
    CvtKToF = 83,
    #[strum(serialize = "cvt.i@k")]
    CvtIToK = 84,
    #[strum(serialize = "cvt.f@k")]
    CvtFToK = 85,
    #[strum(serialize = "cvt.i@f")]
    CvtIToF = 86,
    /// Rounds to the nearest integer, ties away from zero.
    #[strum(serialize = "cvt.f@i")]
    CvtFToI = 87,
    #[strum(serialize = "cvt.i@str")]
    CvtIToStr = 88,
    #[strum(serialize = "cvt.ts@i")]
    CvtTsToI = 89,

    // Float comparisons
    #[strum(serialize = "cmpeq.f")]
    CmpEqF = 90,
    #[strum(serialize = "cmplt.f")]
    CmpLtF = 91,
    #[strum(serialize = "cmple.f")]
    CmpLeF = 92,
    #[strum(serialize = "cmpgt.f")]
    CmpGtF = 93,
    #[strum(serialize = "cmpge.f")]
    CmpGeF = 94,
    #[strum(serialize = "cmpeq.imm.f")]
    CmpEqImmF = 95,
    #[strum(serialize = "cmplt.imm.f")]
    CmpLtImmF = 96,
    #[strum(serialize = "cmple.imm.f")]
    CmpLeImmF = 97,
    #[strum(serialize = "cmpgt.imm.f")]
    CmpGtImmF = 98,
    #[strum(serialize = "cmpge.imm.f")]
    CmpGeImmF = 99,

    // Int and timestamp comparisons
    #[strum(serialize = "cmpeq.i")]
    CmpEqI = 100,
    #[strum(serialize = "cmplt.i")]
    CmpLtI = 101,
    #[strum(serialize = "cmple.i")]
    CmpLeI = 102,
    #[strum(serialize = "cmpgt.i")]
    CmpGtI = 103,
    #[strum(serialize = "cmpge.i")]
    CmpGeI = 104,
    #[strum(serialize = "cmpeq.imm.i")]
    CmpEqImmI = 105,
    #[strum(serialize = "cmplt.imm.i")]
    CmpLtImmI = 106,
    #[strum(serialize = "cmple.imm.i")]
    CmpLeImmI = 107,
    #[strum(serialize = "cmpgt.imm.i")]
    CmpGtImmI = 108,
    #[strum(serialize = "cmpge.imm.i")]
    CmpGeImmI = 109,

    // String comparisons
    #[strum(serialize = "cmpeq.str")]
    CmpEqStr = 110,
    #[strum(serialize = "cmplt.str")]
    CmpLtStr = 111,
    #[strum(serialize = "cmple.str")]
    CmpLeStr = 112,
    #[strum(serialize = "cmpgt.str")]
    CmpGtStr = 113,
    #[strum(serialize = "cmpge.str")]
    CmpGeStr = 114,
    #[strum(serialize = "cmpeq.imm.str")]
    CmpEqImmStr = 115,
    #[strum(serialize = "cmpeq.ci.str")]
    CmpEqCiStr = 116,
    #[strum(serialize = "cmpeq.utf8ci.str")]
    CmpEqUtf8CiStr = 117,

    // Boxed comparisons
    /// Three-way comparison producing -1, 0 or 1. Lanes whose values do not order are invalid.
    #[strum(serialize = "cmp.v")]
    CmpV = 118,
    /// Equality; numbers compare by value across representations.
    #[strum(serialize = "cmpeq.v")]
    CmpEqV = 119,
    #[strum(serialize = "cmpeq.imm.v")]
    CmpEqImmV = 120,

    // Predicates
    #[strum(serialize = "isnan.f")]
    IsNanF = 121,
    /// Restricts a boxed value to the lanes whose tag is in the immediate set.
    #[strum(serialize = "checktag")]
    CheckTag = 122,
    #[strum(serialize = "typebits")]
    TypeBits = 123,
    #[strum(serialize = "isnull")]
    IsNull = 124,
    #[strum(serialize = "isnotnull")]
    IsNotNull = 125,
    #[strum(serialize = "istrue")]
    IsTrue = 126,
    #[strum(serialize = "isfalse")]
    IsFalse = 127,

    // Date and time
    /// `t + n * imm` microseconds.
    #[strum(serialize = "dateadd.imm")]
    DateAddImm = 128,
    #[strum(serialize = "dateadd.month")]
    DateAddMonth = 129,
    /// `(t2 - t1) / imm` microseconds.
    #[strum(serialize = "datediff.imm")]
    DateDiffImm = 130,
    /// Whole months between two timestamps, divided by the immediate.
    #[strum(serialize = "datediff.month")]
    DateDiffMonth = 131,
    #[strum(serialize = "extract.microsecond")]
    ExtractMicrosecond = 132,
    #[strum(serialize = "extract.millisecond")]
    ExtractMillisecond = 133,
    #[strum(serialize = "extract.second")]
    ExtractSecond = 134,
    #[strum(serialize = "extract.minute")]
    ExtractMinute = 135,
    #[strum(serialize = "extract.hour")]
    ExtractHour = 136,
    #[strum(serialize = "extract.day")]
    ExtractDay = 137,
    #[strum(serialize = "extract.dow")]
    ExtractDow = 138,
    #[strum(serialize = "extract.doy")]
    ExtractDoy = 139,
    #[strum(serialize = "extract.month")]
    ExtractMonth = 140,
    #[strum(serialize = "extract.quarter")]
    ExtractQuarter = 141,
    #[strum(serialize = "extract.year")]
    ExtractYear = 142,
    #[strum(serialize = "trunc.millisecond")]
    TruncMillisecond = 143,
    #[strum(serialize = "trunc.second")]
    TruncSecond = 144,
    #[strum(serialize = "trunc.minute")]
    TruncMinute = 145,
    #[strum(serialize = "trunc.hour")]
    TruncHour = 146,
    #[strum(serialize = "trunc.day")]
    TruncDay = 147,
    /// Truncates to the most recent weekday given by the immediate (0 = Sunday).
    #[strum(serialize = "trunc.dow")]
    TruncDow = 148,
    #[strum(serialize = "trunc.month")]
    TruncMonth = 149,
    #[strum(serialize = "trunc.quarter")]
    TruncQuarter = 150,
    #[strum(serialize = "trunc.year")]
    TruncYear = 151,
    #[strum(serialize = "ts.epoch")]
    UnixEpoch = 152,
    #[strum(serialize = "timebucket.ts")]
    TimeBucket = 153,
    #[strum(serialize = "widthbucket.f")]
    WidthBucketF = 154,
    #[strum(serialize = "widthbucket.i")]
    WidthBucketI = 155,

    // Strings
    #[strum(serialize = "concat2.str")]
    Concat2 = 156,
    #[strum(serialize = "concat3.str")]
    Concat3 = 157,
    #[strum(serialize = "concat4.str")]
    Concat4 = 158,
    #[strum(serialize = "trimws.left")]
    TrimWsLeft = 159,
    #[strum(serialize = "trimws.right")]
    TrimWsRight = 160,
    #[strum(serialize = "trimchar.left")]
    TrimCharLeft = 161,
    #[strum(serialize = "trimchar.right")]
    TrimCharRight = 162,
    #[strum(serialize = "charlength")]
    CharLength = 163,
    #[strum(serialize = "substr")]
    Substr = 164,
    #[strum(serialize = "splitpart")]
    SplitPart = 165,
    #[strum(serialize = "lower")]
    Lower = 166,
    #[strum(serialize = "upper")]
    Upper = 167,
    #[strum(serialize = "contains.cs")]
    ContainsCs = 168,
    #[strum(serialize = "contains.ci")]
    ContainsCi = 169,
    #[strum(serialize = "like.cs")]
    LikeCs = 170,
    #[strum(serialize = "like.ci")]
    LikeCi = 171,
    #[strum(serialize = "regexmatch")]
    RegexMatch = 172,
    #[strum(serialize = "cmpeq.fuzzy")]
    EqFuzzy = 173,
    #[strum(serialize = "cmpeq.fuzzy.utf8")]
    EqFuzzyUnicode = 174,
    #[strum(serialize = "contains.fuzzy")]
    ContainsFuzzy = 175,
    #[strum(serialize = "contains.fuzzy.utf8")]
    ContainsFuzzyUnicode = 176,
    #[strum(serialize = "issubnetof.ip4")]
    IsSubnetOfIp4 = 177,

    // Geo
    #[strum(serialize = "geohash")]
    GeoHash = 178,
    #[strum(serialize = "geohash.imm")]
    GeoHashImm = 179,
    #[strum(serialize = "geotilex")]
    GeoTileX = 180,
    #[strum(serialize = "geotiley")]
    GeoTileY = 181,
    #[strum(serialize = "geotilees")]
    GeoTileEs = 182,
    #[strum(serialize = "geodistance")]
    GeoDistance = 183,

    // Boxing and unboxing
    #[strum(serialize = "unsymbolize")]
    Unsymbolize = 184,
    /// Numeric value as a float; operand lanes must hold numbers.
    #[strum(serialize = "unbox.f")]
    UnboxF = 185,
    /// Numeric value as an int, rounding floats; operand lanes must hold numbers.
    #[strum(serialize = "unbox.i")]
    UnboxI = 186,
    /// Bool or numeric value as an int.
    #[strum(serialize = "unboxcvt.i")]
    UnboxCvtI = 187,
    /// Bool or numeric value as a float.
    #[strum(serialize = "unboxcvt.f")]
    UnboxCvtF = 188,
    #[strum(serialize = "unbox.ts")]
    UnboxTs = 189,
    /// String payload of a string value; operand lanes must hold unsymbolized strings.
    #[strum(serialize = "tostr")]
    UnboxStr = 190,
    #[strum(serialize = "box.k")]
    BoxK = 191,
    #[strum(serialize = "box.i")]
    BoxI = 192,
    #[strum(serialize = "box.f")]
    BoxF = 193,
    #[strum(serialize = "box.str")]
    BoxStr = 194,
    #[strum(serialize = "box.ts")]
    BoxTs = 195,

    // Blends: (a, b, select, mask) picks b where select is set.
    #[strum(serialize = "blend.v")]
    BlendV = 196,
    #[strum(serialize = "blend.f")]
    BlendF = 197,
    #[strum(serialize = "blend.i")]
    BlendI = 198,
    #[strum(serialize = "blend.str")]
    BlendStr = 199,

    // Structure access and construction
    #[strum(serialize = "findsym")]
    FindSym = 200,
    #[strum(serialize = "findsym2")]
    FindSymIn = 201,
    #[strum(serialize = "index.list")]
    ListIndex = 202,
    #[strum(serialize = "objectsize")]
    ObjectSize = 203,
    #[strum(serialize = "makelist")]
    MakeList = 204,
    #[strum(serialize = "makestruct")]
    MakeStruct = 205,

    // Hashing
    #[strum(serialize = "hashvalue")]
    HashValue = 206,
    #[strum(serialize = "hashmember")]
    HashMember = 207,
    #[strum(serialize = "hashlookup")]
    HashLookup = 208,
}

impl Opcode {
    /// Positional index of the opcode.
    #[must_use]
    pub const fn index(self) -> u16 {
        self as u16
    }

    /// Looks up an opcode by positional index.
    #[must_use]
    pub fn from_index(index: u16) -> Option<Opcode> {
        Opcode::from_repr(index)
    }

    /// Textual mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// The operand contract of this opcode.
    #[must_use]
    pub const fn signature(self) -> Signature {
        use Opcode::*;
        match self {
            RetK => Signature::new(&[M, B], M),
            RetV => Signature::new(&[M, V, B], M),

            AndK | OrK | AndNotK | XorK | XnorK => Signature::new(&[B, B], B),

            BroadcastF => Signature::imm(&[], F, ImmKind::Float),
            BroadcastI => Signature::imm(&[], I, ImmKind::Int),
            BroadcastTs => Signature::imm(&[], T, ImmKind::Int),

            AbsF | NegF | SignF | RoundF | RoundEvenF | TruncF | FloorF | CeilF | SqrtF
            | CbrtF | ExpF | Exp2F | Exp10F | ExpM1F | LnF | Ln1pF | Log2F | Log10F | SinF
            | CosF | TanF | AsinF | AcosF | AtanF => Signature::new(&[F, B], F),

            AbsI | NegI | SignI | NotI | BitCountI => Signature::new(&[I, B], I),

            AddF | SubF | MulF | DivF | ModF | MinF | MaxF | Atan2F | HypotF | PowF => {
                Signature::new(&[F, F, B], F)
            }
            AddImmF | SubImmF | RsubImmF | MulImmF | DivImmF | RdivImmF | ModImmF => {
                Signature::imm(&[F, B], F, ImmKind::Float)
            }

            AddI | SubI | MulI | DivI | ModI | MinI | MaxI | AndI | OrI | XorI | SllI | SraI
            | SrlI => Signature::new(&[I, I, B], I),
            AddImmI | SubImmI | RsubImmI | MulImmI | DivImmI | RdivImmI | ModImmI | AndImmI
            | OrImmI | XorImmI | SllImmI | SraImmI | SrlImmI => {
                Signature::imm(&[I, B], I, ImmKind::Int)
            }

            CvtKToI => Signature::new(&[B, B], I),
            CvtKToF => Signature::new(&[B, B], F),
            CvtIToK => Signature::new(&[I, B], B),
            CvtFToK => Signature::new(&[F, B], B),
            CvtIToF => Signature::new(&[I, B], F),
            CvtFToI => Signature::new(&[F, B], I),
            CvtIToStr => Signature::new(&[I, B], S),
            CvtTsToI => Signature::new(&[T, B], I),

            CmpEqF | CmpLtF | CmpLeF | CmpGtF | CmpGeF => Signature::new(&[F, F, B], B),
            CmpEqImmF | CmpLtImmF | CmpLeImmF | CmpGtImmF | CmpGeImmF => {
                Signature::imm(&[F, B], B, ImmKind::Float)
            }
            CmpEqI | CmpLtI | CmpLeI | CmpGtI | CmpGeI => Signature::new(&[IT, IT, B], B),
            CmpEqImmI | CmpLtImmI | CmpLeImmI | CmpGtImmI | CmpGeImmI => {
                Signature::imm(&[IT, B], B, ImmKind::Int)
            }
            CmpEqStr | CmpLtStr | CmpLeStr | CmpGtStr | CmpGeStr => Signature::new(&[S, S, B], B),
            CmpEqImmStr | CmpEqCiStr | CmpEqUtf8CiStr => Signature::imm(&[S, B], B, ImmKind::Text),

            CmpV => Signature::new(&[V, V, B], I),
            CmpEqV => Signature::new(&[V, V, B], B),
            CmpEqImmV => Signature::imm(&[V, B], B, ImmKind::Datum),

            IsNanF => Signature::new(&[F, B], B),
            CheckTag => Signature::imm(&[V, B], VB, ImmKind::Types),
            TypeBits => Signature::new(&[V, B], I),
            IsNull | IsNotNull | IsTrue | IsFalse => Signature::new(&[V, B], B),

            DateAddImm => Signature::imm(&[T, I, B], T, ImmKind::Int),
            DateAddMonth => Signature::new(&[T, I, B], T),
            DateDiffImm | DateDiffMonth => Signature::imm(&[T, T, B], I, ImmKind::Int),
            ExtractMicrosecond | ExtractMillisecond | ExtractSecond | ExtractMinute
            | ExtractHour | ExtractDay | ExtractDow | ExtractDoy | ExtractMonth
            | ExtractQuarter | ExtractYear => Signature::new(&[T, B], I),
            TruncMillisecond | TruncSecond | TruncMinute | TruncHour | TruncDay | TruncMonth
            | TruncQuarter | TruncYear => Signature::new(&[T, B], T),
            TruncDow => Signature::imm(&[T, B], T, ImmKind::Int),
            UnixEpoch => Signature::new(&[T, B], I),
            TimeBucket => Signature::new(&[T, I, B], T),
            WidthBucketF => Signature::new(&[F, F, F, F, B], F),
            WidthBucketI => Signature::new(&[I, I, I, I, B], I),

            Concat2 => Signature::new(&[S, S, B], S),
            Concat3 => Signature::new(&[S, S, S, B], S),
            Concat4 => Signature::new(&[S, S, S, S, B], S),
            TrimWsLeft | TrimWsRight | Lower | Upper => Signature::new(&[S, B], S),
            TrimCharLeft | TrimCharRight => Signature::imm(&[S, B], S, ImmKind::Text),
            CharLength => Signature::new(&[S, B], I),
            Substr => Signature::new(&[S, I, I, B], S),
            SplitPart => Signature::imm(&[S, I, B], S, ImmKind::Text),
            ContainsCs | ContainsCi => Signature::imm(&[S, B], B, ImmKind::Text),
            LikeCs | LikeCi => Signature::imm(&[S, B], B, ImmKind::Like),
            RegexMatch => Signature::imm(&[S, B], B, ImmKind::Regex),
            EqFuzzy | EqFuzzyUnicode | ContainsFuzzy | ContainsFuzzyUnicode => {
                Signature::imm(&[S, I, B], B, ImmKind::Text)
            }
            IsSubnetOfIp4 => Signature::imm(&[S, B], B, ImmKind::Ip4),

            GeoHash => Signature::new(&[F, F, I, B], S),
            GeoHashImm => Signature::imm(&[F, F, B], S, ImmKind::Int),
            GeoTileX | GeoTileY => Signature::new(&[F, I, B], I),
            GeoTileEs => Signature::new(&[F, F, I, B], S),
            GeoDistance => Signature::new(&[F, F, F, F, B], F),

            Unsymbolize => Signature::new(&[V, B], V),
            UnboxF | UnboxCvtF => Signature::new(&[V, B], F),
            UnboxI | UnboxCvtI => Signature::new(&[V, B], I),
            UnboxTs => Signature::new(&[V, B], T),
            UnboxStr => Signature::new(&[V, B], S),
            BoxK => Signature::new(&[B, B], V),
            BoxI => Signature::new(&[I, B], V),
            BoxF => Signature::new(&[F, B], V),
            BoxStr => Signature::new(&[S, B], V),
            BoxTs => Signature::new(&[T, B], V),

            BlendV => Signature::new(&[V, V, B, B], V),
            BlendF => Signature::new(&[F, F, B, B], F),
            BlendI => Signature::new(&[I, I, B, B], I),
            BlendStr => Signature::new(&[S, S, B, B], S),

            FindSym => Signature::imm(&[B], VB, ImmKind::Field),
            FindSymIn => Signature::imm(&[V, B], VB, ImmKind::Field),
            ListIndex => Signature::imm(&[V, B], VB, ImmKind::Int),
            ObjectSize => Signature::new(&[V, B], I),
            MakeList => Signature::repeated(&[V, B], VL),
            MakeStruct => Signature::repeated(&[S, V, B], V),

            HashValue => Signature::new(&[V, B], H),
            HashMember => Signature::imm(&[H, B], B, ImmKind::Table),
            HashLookup => Signature::imm(&[H, B], VB, ImmKind::Table),
        }
    }

    /// Returns true for comparisons that yield true when both operands are the same
    /// integer register.
    #[must_use]
    pub const fn is_reflexive_int_compare(self) -> bool {
        matches!(self, Opcode::CmpEqI | Opcode::CmpLeI | Opcode::CmpGeI)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Operator of a node: a machine [`Opcode`] or a compiler-internal pseudo-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// The all-valid mask; node 0 of every program.
    Init,
    /// The all-false mask; node 1 of every program.
    False,
    /// The initial memory token; node 2 of every program.
    Mem,
    /// A constant; its static type follows the immediate.
    Literal,
    /// A placeholder carrying a diagnostic in its immediate.
    Invalid,
    /// Re-masks a value: `(value, mask)` where `mask` is a subset of the value's lanes.
    Vk,
    /// A machine operation.
    Machine(Opcode),
}

impl Op {
    /// The operand contract. Pseudo-ops whose return type depends on their operands or
    /// immediate report [`SsaType::ANY`].
    #[must_use]
    pub const fn signature(self) -> Signature {
        match self {
            Op::Init | Op::False => Signature::new(&[], B),
            Op::Mem => Signature::new(&[], M),
            Op::Literal => Signature::imm(&[], SsaType::ANY, ImmKind::Datum),
            Op::Invalid => Signature::imm(&[], SsaType::ANY, ImmKind::Text),
            Op::Vk => Signature::new(&[SsaType::ANY, B], SsaType::ANY),
            Op::Machine(op) => op.signature(),
        }
    }

    /// Textual name.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Init => "init",
            Op::False => "false",
            Op::Mem => "mem",
            Op::Literal => "literal",
            Op::Invalid => "invalid",
            Op::Vk => "vk",
            Op::Machine(op) => op.mnemonic(),
        }
    }

    /// The machine opcode, if this is not a pseudo-op.
    #[must_use]
    pub const fn opcode(self) -> Option<Opcode> {
        match self {
            Op::Machine(op) => Some(op),
            _ => None,
        }
    }

    /// Returns true for boolean operators whose boolean operands are truth masks.
    #[must_use]
    pub const fn is_mask_logic(self) -> bool {
        matches!(
            self,
            Op::Machine(
                Opcode::AndK | Opcode::OrK | Opcode::AndNotK | Opcode::XorK | Opcode::XnorK
            )
        )
    }
}

impl From<Opcode> for Op {
    fn from(op: Opcode) -> Self {
        Op::Machine(op)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_dense_numbering() {
        for (i, op) in Opcode::iter().enumerate() {
            assert_eq!(op.index() as usize, i, "{op} is out of order");
            assert_eq!(Opcode::from_index(i as u16), Some(op));
        }
        assert_eq!(Opcode::from_index(Opcode::COUNT as u16), None);
    }

    #[test]
    fn test_pinned_indices() {
        // Executors address opcodes positionally; these must never move.
        assert_eq!(Opcode::RetK.index(), 0);
        assert_eq!(Opcode::AndK.index(), 2);
        assert_eq!(Opcode::AddF.index(), 39);
        assert_eq!(Opcode::CvtFToI.index(), 87);
        assert_eq!(Opcode::CheckTag.index(), 122);
        assert_eq!(Opcode::Concat2.index(), 156);
        assert_eq!(Opcode::HashLookup.index(), 208);
        assert_eq!(Opcode::COUNT, 209);
    }

    #[test]
    fn test_mnemonics_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in Opcode::iter() {
            assert!(seen.insert(op.mnemonic()), "duplicate mnemonic {op}");
        }
    }

    #[test]
    fn test_signatures_end_in_mask() {
        for op in Opcode::iter() {
            let sig = op.signature();
            if sig.variadic || sig.args.is_empty() || op == Opcode::RetK {
                continue;
            }
            assert_eq!(
                sig.args.last().copied(),
                Some(SsaType::BOOL),
                "{op} must take its mask last"
            );
        }
    }

    #[test]
    fn test_variadic_arity() {
        let sig = Opcode::MakeStruct.signature();
        assert!(sig.accepts_arity(4));
        assert!(sig.accepts_arity(7));
        assert!(!sig.accepts_arity(3));
        assert!(!sig.accepts_arity(5));
        assert_eq!(sig.operand(3, 7), Some(SsaType::STRING));
        assert_eq!(sig.operand(6, 7), Some(SsaType::BOOL));
        assert_eq!(sig.operand(0, 5), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Opcode::AddImmF.to_string(), "add.imm.f");
        assert_eq!(Op::Vk.to_string(), "vk");
        assert_eq!(Op::from(Opcode::CvtIToK).to_string(), "cvt.i@k");
    }
}
