//! Builtin function calls.
//!
//! Every builtin declares the kind of each argument ([`ArgKind`]). The arguments are
//! lowered under that contract first, so the per-function code only deals with
//! registers of the expected representation. A NULL or MISSING typed argument makes
//! the whole call MISSING.

use std::{f64::consts, net::Ipv4Addr};

use crate::{
    compiler::{coerce::mismatch, Compiler},
    events::EventKind,
    expr::{tag_argument, Builtin, Expr, TimePart},
    ssa::{Datum, Immediate, MaskedValue, Opcode, Program, SsaType, TypeSet, TypeTag, ValueId},
    Error, Result,
};

/// How one argument of a builtin is lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    /// Any value, lowered as is
    Expression,
    /// A number
    Number,
    /// A string
    String,
    /// A timestamp
    Time,
    /// A string constant
    LiteralString,
    /// Not lowered; the builtin inspects the expression itself
    Omit,
}

use ArgKind::{Expression, LiteralString, Number, Omit, String as Str, Time};

const WEEKDAYS: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Lowers the arguments of a call or returns FALSE from the enclosing function when a
/// typed argument is absent.
macro_rules! arguments {
    ($self:ident, $args:expr, $kinds:expr) => {
        match $self.arguments($args, $kinds)? {
            Some(values) => values,
            None => return Ok(Program::FALSE),
        }
    };
}

impl Compiler<'_> {
    pub(crate) fn builtin(&mut self, e: &Expr, func: &Builtin, args: &[Expr]) -> Result<ValueId> {
        let v = match func {
            Builtin::DateAdd(part) => self.date_add(*part, args)?,
            Builtin::DateDiff(part) => self.date_diff(*part, args)?,
            Builtin::DateExtract(part) => self.date_extract(*part, args)?,
            Builtin::DateTrunc(part) => self.date_trunc(*part, args)?,
            Builtin::ToUnixEpoch => self.time_op(Opcode::UnixEpoch, args)?,
            Builtin::ToUnixMicro => self.time_op(Opcode::CvtTsToI, args)?,
            Builtin::TimeBucket => {
                let a = arguments!(self, args, &[Time, Number]);
                let t = self.program.coerce_time(a[0]);
                let width = self.program.coerce_int(a[1]);
                let k = self.program.and(t.mask, width.mask);
                self.program
                    .ssa(Opcode::TimeBucket, &[t.value, width.value, k], None)
            }

            Builtin::Pi => {
                arity(args, 0)?;
                self.program.literal(Datum::Float(consts::PI))
            }
            Builtin::Log => self.log(args)?,
            Builtin::Degrees => self.scale(args, 180.0 / consts::PI)?,
            Builtin::Radians => self.scale(args, consts::PI / 180.0)?,
            Builtin::Abs => {
                let a = arguments!(self, args, &[Number]);
                self.program.abs(a[0])
            }
            Builtin::Sign => {
                let a = arguments!(self, args, &[Number]);
                self.program.sign(a[0])
            }
            Builtin::BitCount => {
                let a = arguments!(self, args, &[Number]);
                self.program.unary_int(Opcode::BitCountI, a[0])
            }
            Builtin::Hypot | Builtin::Pow | Builtin::Atan2 => {
                let op = match func {
                    Builtin::Hypot => Opcode::HypotF,
                    Builtin::Pow => Opcode::PowF,
                    _ => Opcode::Atan2F,
                };
                let a = arguments!(self, args, &[Number, Number]);
                self.program.binary_float(op, a[0], a[1])
            }
            Builtin::Least | Builtin::Greatest => {
                at_least(args, 1)?;
                let a = arguments!(self, args, &vec![Number; args.len()]);
                let least = *func == Builtin::Least;
                a[1..]
                    .iter()
                    .fold(a[0], |acc, next| self.program.min_max(least, acc, *next))
            }
            Builtin::WidthBucket => self.width_bucket(args)?,

            Builtin::Concat => self.concat(args)?,
            Builtin::Trim | Builtin::Ltrim | Builtin::Rtrim => self.trim(func, args)?,
            Builtin::Contains | Builtin::ContainsCi => {
                let op = if *func == Builtin::Contains {
                    Opcode::ContainsCs
                } else {
                    Opcode::ContainsCi
                };
                self.string_test(op, args)?
            }
            Builtin::EqualsCi => {
                let ascii = match args.get(1) {
                    Some(Expr::String(s)) => s.is_ascii(),
                    _ => true,
                };
                let op = if ascii {
                    Opcode::CmpEqCiStr
                } else {
                    Opcode::CmpEqUtf8CiStr
                };
                self.string_test(op, args)?
            }
            Builtin::EqualsFuzzy
            | Builtin::EqualsFuzzyUnicode
            | Builtin::ContainsFuzzy
            | Builtin::ContainsFuzzyUnicode => {
                let op = match func {
                    Builtin::EqualsFuzzy => Opcode::EqFuzzy,
                    Builtin::EqualsFuzzyUnicode => Opcode::EqFuzzyUnicode,
                    Builtin::ContainsFuzzy => Opcode::ContainsFuzzy,
                    _ => Opcode::ContainsFuzzyUnicode,
                };
                let a = arguments!(self, args, &[Str, LiteralString, Number]);
                let text = self.literal_text(a[1]);
                let threshold = self.program.coerce_int(a[2]);
                let ks = self.program.mask(a[0]);
                let k = self.program.and(ks, threshold.mask);
                self.program
                    .ssa(op, &[a[0], threshold.value, k], Some(Immediate::Text(text)))
            }
            Builtin::IsSubnetOf => self.is_subnet_of(args)?,
            Builtin::CharLength => self.string_op(Opcode::CharLength, args)?,
            Builtin::Lower => self.string_op(Opcode::Lower, args)?,
            Builtin::Upper => self.string_op(Opcode::Upper, args)?,
            Builtin::Substring => self.substring(args)?,
            Builtin::SplitPart => {
                let a = arguments!(self, args, &[Str, LiteralString, Number]);
                let delimiter = self.literal_text(a[1]);
                let part = self.program.coerce_int(a[2]);
                let ks = self.program.mask(a[0]);
                let k = self.program.and(ks, part.mask);
                self.program.ssa(
                    Opcode::SplitPart,
                    &[a[0], part.value, k],
                    Some(Immediate::Text(delimiter)),
                )
            }

            Builtin::GeoHash => self.geo_hash(args)?,
            Builtin::GeoTileX | Builtin::GeoTileY => {
                let op = if *func == Builtin::GeoTileX {
                    Opcode::GeoTileX
                } else {
                    Opcode::GeoTileY
                };
                let a = arguments!(self, args, &[Number, Number]);
                let coord = self.program.coerce_float(a[0]);
                let precision = self.program.coerce_int(a[1]);
                let k = self.program.and(coord.mask, precision.mask);
                self.program.ssa(op, &[coord.value, precision.value, k], None)
            }
            Builtin::GeoTileEs => {
                let a = arguments!(self, args, &[Number, Number, Number]);
                let (coords, k) = self.floats(&a[..2]);
                let precision = self.program.coerce_int(a[2]);
                let k = self.program.and(k, precision.mask);
                self.program.ssa(
                    Opcode::GeoTileEs,
                    &[coords[0], coords[1], precision.value, k],
                    None,
                )
            }
            Builtin::GeoDistance => {
                let a = arguments!(self, args, &[Number; 4]);
                let (coords, k) = self.floats(&a);
                self.program.ssa(
                    Opcode::GeoDistance,
                    &[coords[0], coords[1], coords[2], coords[3], k],
                    None,
                )
            }

            Builtin::ObjectSize => {
                let a = arguments!(self, args, &[Expression]);
                if self.is_absent(a[0]) {
                    return Ok(Program::FALSE);
                }
                let boxed = self.program.serialized(a[0]);
                let k = self.program.mask(boxed);
                self.program.ssa(Opcode::ObjectSize, &[boxed, k], None)
            }
            Builtin::HashLookup => self.hash_lookup(args)?,
            Builtin::MakeList => self.make_list(args)?,
            Builtin::MakeStruct => self.make_struct(args)?,
            Builtin::TypeBit => self.type_bit(args)?,
            Builtin::AssertIonType => self.assert_ion_type(args)?,

            Builtin::Round => self.float_op(Opcode::RoundF, args)?,
            Builtin::RoundEven => self.float_op(Opcode::RoundEvenF, args)?,
            Builtin::Trunc => self.float_op(Opcode::TruncF, args)?,
            Builtin::Floor => self.float_op(Opcode::FloorF, args)?,
            Builtin::Ceil => self.float_op(Opcode::CeilF, args)?,
            Builtin::Sqrt => self.float_op(Opcode::SqrtF, args)?,
            Builtin::Cbrt => self.float_op(Opcode::CbrtF, args)?,
            Builtin::Exp => self.float_op(Opcode::ExpF, args)?,
            Builtin::Exp2 => self.float_op(Opcode::Exp2F, args)?,
            Builtin::Exp10 => self.float_op(Opcode::Exp10F, args)?,
            Builtin::ExpM1 => self.float_op(Opcode::ExpM1F, args)?,
            Builtin::Ln => self.float_op(Opcode::LnF, args)?,
            Builtin::Ln1p => self.float_op(Opcode::Ln1pF, args)?,
            Builtin::Log2 => self.float_op(Opcode::Log2F, args)?,
            Builtin::Log10 => self.float_op(Opcode::Log10F, args)?,
            Builtin::Sin => self.float_op(Opcode::SinF, args)?,
            Builtin::Cos => self.float_op(Opcode::CosF, args)?,
            Builtin::Tan => self.float_op(Opcode::TanF, args)?,
            Builtin::Asin => self.float_op(Opcode::AsinF, args)?,
            Builtin::Acos => self.float_op(Opcode::AcosF, args)?,
            Builtin::Atan => self.float_op(Opcode::AtanF, args)?,

            Builtin::Unknown(name) => {
                return Err(Error::Unsupported {
                    kind: format!("function {name}"),
                })
            }
        };
        self.check(e, v)
    }

    /// Lowers `args` under `kinds`. Returns `None` if a typed argument is NULL or
    /// MISSING.
    fn arguments(&mut self, args: &[Expr], kinds: &[ArgKind]) -> Result<Option<Vec<ValueId>>> {
        arity(args, kinds.len())?;
        let mut values = Vec::with_capacity(args.len());
        let mut absent = false;
        for (i, (arg, kind)) in args.iter().zip(kinds).enumerate() {
            let v = self.argument(arg, *kind).map_err(|err| err.at_argument(i + 1))?;
            if !matches!(kind, Expression | Omit) && self.is_absent(v) {
                absent = true;
            }
            values.push(v);
        }
        Ok((!absent).then_some(values))
    }

    fn argument(&mut self, arg: &Expr, kind: ArgKind) -> Result<ValueId> {
        match kind {
            Expression => self.value(arg),
            Number => self.as_number(arg),
            Str => self.as_string(arg),
            Time => self.as_time(arg),
            LiteralString => match arg {
                Expr::String(s) => Ok(self.program.literal(Datum::String(s.clone()))),
                other => Err(mismatch(other, "a literal string", other.kind())),
            },
            Omit => Ok(Program::FALSE),
        }
    }

    fn literal_text(&self, v: ValueId) -> String {
        self.program
            .literal_value(v)
            .and_then(Datum::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Converts every value to a float register and returns them with their joint mask.
    fn floats(&mut self, values: &[ValueId]) -> (Vec<ValueId>, ValueId) {
        let mut out = Vec::with_capacity(values.len());
        let mut k = Program::INIT;
        for (i, v) in values.iter().enumerate() {
            let f = self.program.coerce_float(*v);
            k = if i == 0 { f.mask } else { self.program.and(k, f.mask) };
            out.push(f.value);
        }
        (out, k)
    }

    /// Integer counterpart of [`Compiler::floats`].
    fn ints(&mut self, values: &[ValueId]) -> (Vec<ValueId>, ValueId) {
        let mut out = Vec::with_capacity(values.len());
        let mut k = Program::INIT;
        for (i, v) in values.iter().enumerate() {
            let n = self.program.coerce_int(*v);
            k = if i == 0 { n.mask } else { self.program.and(k, n.mask) };
            out.push(n.value);
        }
        (out, k)
    }

    // =========================================================================
    // Date and time
    // =========================================================================

    fn date_add(&mut self, part: TimePart, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Number, Time]);
        let n = self.program.coerce_int(a[0]);
        let t = self.program.coerce_time(a[1]);
        let k = self.program.and(n.mask, t.mask);
        if let Some(us) = part.micros() {
            return Ok(self.program.ssa(
                Opcode::DateAddImm,
                &[t.value, n.value, k],
                Some(Immediate::Int(us)),
            ));
        }
        let Some(months) = part.months() else {
            return Err(unsupported_part("DATE_ADD", part));
        };
        let n = if months == 1 {
            n.value
        } else {
            self.program
                .ssa(Opcode::MulImmI, &[n.value, k], Some(Immediate::Int(months)))
        };
        Ok(self.program.ssa(Opcode::DateAddMonth, &[t.value, n, k], None))
    }

    fn date_diff(&mut self, part: TimePart, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Time, Time]);
        let from = self.program.coerce_time(a[0]);
        let to = self.program.coerce_time(a[1]);
        let k = self.program.and(from.mask, to.mask);
        let (op, unit) = match (part.micros(), part.months()) {
            (Some(us), _) => (Opcode::DateDiffImm, us),
            (None, Some(months)) => (Opcode::DateDiffMonth, months),
            (None, None) => return Err(unsupported_part("DATE_DIFF", part)),
        };
        Ok(self
            .program
            .ssa(op, &[from.value, to.value, k], Some(Immediate::Int(unit))))
    }

    fn date_extract(&mut self, part: TimePart, args: &[Expr]) -> Result<ValueId> {
        let op = match part {
            TimePart::Microsecond => Opcode::ExtractMicrosecond,
            TimePart::Millisecond => Opcode::ExtractMillisecond,
            TimePart::Second => Opcode::ExtractSecond,
            TimePart::Minute => Opcode::ExtractMinute,
            TimePart::Hour => Opcode::ExtractHour,
            TimePart::Day => Opcode::ExtractDay,
            TimePart::Dow => Opcode::ExtractDow,
            TimePart::Doy => Opcode::ExtractDoy,
            TimePart::Month => Opcode::ExtractMonth,
            TimePart::Quarter => Opcode::ExtractQuarter,
            TimePart::Year => Opcode::ExtractYear,
            TimePart::Week => return Err(unsupported_part("DATE_EXTRACT", part)),
        };
        self.time_op(op, args)
    }

    fn date_trunc(&mut self, part: TimePart, args: &[Expr]) -> Result<ValueId> {
        let op = match part {
            TimePart::Microsecond => {
                let a = arguments!(self, args, &[Time]);
                return Ok(self.program.coerce_time(a[0]).value);
            }
            TimePart::Dow => {
                let a = arguments!(self, args, &[Time, Omit]);
                let day = weekday(&args[1]).map_err(|err| err.at_argument(2))?;
                let t = self.program.coerce_time(a[0]);
                return Ok(self.program.ssa(
                    Opcode::TruncDow,
                    &[t.value, t.mask],
                    Some(Immediate::Int(day)),
                ));
            }
            TimePart::Millisecond => Opcode::TruncMillisecond,
            TimePart::Second => Opcode::TruncSecond,
            TimePart::Minute => Opcode::TruncMinute,
            TimePart::Hour => Opcode::TruncHour,
            TimePart::Day => Opcode::TruncDay,
            TimePart::Month => Opcode::TruncMonth,
            TimePart::Quarter => Opcode::TruncQuarter,
            TimePart::Year => Opcode::TruncYear,
            TimePart::Week | TimePart::Doy => return Err(unsupported_part("DATE_TRUNC", part)),
        };
        self.time_op(op, args)
    }

    /// A one-argument operation on a timestamp register.
    fn time_op(&mut self, op: Opcode, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Time]);
        let t = self.program.coerce_time(a[0]);
        Ok(self.program.ssa(op, &[t.value, t.mask], None))
    }

    // =========================================================================
    // Math
    // =========================================================================

    fn float_op(&mut self, op: Opcode, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Number]);
        Ok(self.program.unary_float(op, a[0]))
    }

    /// `LOG(n)` is the decimal logarithm; `LOG(base, n)` is `log2(n) / log2(base)`.
    fn log(&mut self, args: &[Expr]) -> Result<ValueId> {
        if args.len() == 1 {
            return self.float_op(Opcode::Log10F, args);
        }
        let a = arguments!(self, args, &[Number, Number]);
        let base = self.program.unary_float(Opcode::Log2F, a[0]);
        let n = self.program.unary_float(Opcode::Log2F, a[1]);
        Ok(self.program.binary_float(Opcode::DivF, n, base))
    }

    fn scale(&mut self, args: &[Expr], factor: f64) -> Result<ValueId> {
        let a = arguments!(self, args, &[Number]);
        let f = self.program.coerce_float(a[0]);
        Ok(self
            .program
            .ssa(Opcode::MulImmF, &[f.value, f.mask], Some(Immediate::Float(factor))))
    }

    fn width_bucket(&mut self, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Number; 4]);
        let all_ints = a.iter().all(|v| self.program.is_int_like(*v));
        let (op, (v, k)) = if all_ints {
            (Opcode::WidthBucketI, self.ints(&a))
        } else {
            (Opcode::WidthBucketF, self.floats(&a))
        };
        Ok(self.program.ssa(op, &[v[0], v[1], v[2], v[3], k], None))
    }

    // =========================================================================
    // Strings
    // =========================================================================

    fn string_op(&mut self, op: Opcode, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Str]);
        let k = self.program.mask(a[0]);
        Ok(self.program.ssa(op, &[a[0], k], None))
    }

    /// A test of a string register against a string constant.
    fn string_test(&mut self, op: Opcode, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Str, LiteralString]);
        let text = self.literal_text(a[1]);
        let k = self.program.mask(a[0]);
        Ok(self.program.ssa(op, &[a[0], k], Some(Immediate::Text(text))))
    }

    fn concat(&mut self, args: &[Expr]) -> Result<ValueId> {
        at_least(args, 1)?;
        let parts = arguments!(self, args, &vec![Str; args.len()]);

        let texts: Option<Vec<String>> = parts
            .iter()
            .map(|p| self.program.literal_value(*p).and_then(Datum::as_str).map(str::to_string))
            .collect();
        if let Some(texts) = texts {
            let joined = texts.concat();
            let folded = self.program.literal(Datum::String(joined));
            self.program.record(
                EventKind::ConstantFolded,
                folded,
                format!("CONCAT of {} constants", texts.len()),
            );
            return Ok(folded);
        }

        let mut k = Program::INIT;
        for (i, p) in parts.iter().enumerate() {
            let m = self.program.mask(*p);
            k = if i == 0 { m } else { self.program.and(k, m) };
        }
        let mut acc = parts[0];
        for chunk in parts[1..].chunks(3) {
            let op = match chunk.len() {
                1 => Opcode::Concat2,
                2 => Opcode::Concat3,
                _ => Opcode::Concat4,
            };
            let mut operands = Vec::with_capacity(chunk.len() + 2);
            operands.push(acc);
            operands.extend_from_slice(chunk);
            operands.push(k);
            acc = self.program.ssa(op, &operands, None);
        }
        Ok(acc)
    }

    fn trim(&mut self, func: &Builtin, args: &[Expr]) -> Result<ValueId> {
        let (left, right) = match func {
            Builtin::Ltrim => (true, false),
            Builtin::Rtrim => (false, true),
            _ => (true, true),
        };
        if args.len() == 1 {
            let a = arguments!(self, args, &[Str]);
            let k = self.program.mask(a[0]);
            let mut s = a[0];
            if left {
                s = self.program.ssa(Opcode::TrimWsLeft, &[s, k], None);
            }
            if right {
                s = self.program.ssa(Opcode::TrimWsRight, &[s, k], None);
            }
            return Ok(s);
        }

        let a = arguments!(self, args, &[Str, LiteralString]);
        let chars = self.literal_text(a[1]);
        let k = self.program.mask(a[0]);
        let mut s = a[0];
        if left {
            s = self.program.ssa(
                Opcode::TrimCharLeft,
                &[s, k],
                Some(Immediate::Text(chars.clone())),
            );
        }
        if right {
            s = self
                .program
                .ssa(Opcode::TrimCharRight, &[s, k], Some(Immediate::Text(chars)));
        }
        Ok(s)
    }

    fn is_subnet_of(&mut self, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[LiteralString, LiteralString, Str]);
        let mut bounds = [Ipv4Addr::UNSPECIFIED; 2];
        for (i, bound) in bounds.iter_mut().enumerate() {
            let text = self.literal_text(a[i]);
            *bound = text.parse().map_err(|_| Error::Argument {
                position: i + 1,
                message: format!("{text:?} is not an IPv4 address"),
            })?;
        }
        let [lo, hi] = bounds;
        if lo > hi {
            return Err(Error::Argument {
                position: 2,
                message: format!("upper bound {hi} is below lower bound {lo}"),
            });
        }
        let k = self.program.mask(a[2]);
        Ok(self
            .program
            .ssa(Opcode::IsSubnetOfIp4, &[a[2], k], Some(Immediate::Ip4(lo, hi))))
    }

    fn substring(&mut self, args: &[Expr]) -> Result<ValueId> {
        let a = match args.len() {
            2 => arguments!(self, args, &[Str, Number]),
            _ => arguments!(self, args, &[Str, Number, Number]),
        };
        let start = self.program.coerce_int(a[1]);
        let length = match a.get(2) {
            Some(v) => self.program.coerce_int(*v),
            None => MaskedValue::new(self.program.broadcast_i(i64::MAX), Program::INIT),
        };
        let ks = self.program.mask(a[0]);
        let k = self.program.and(ks, start.mask);
        let k = self.program.and(k, length.mask);
        Ok(self
            .program
            .ssa(Opcode::Substr, &[a[0], start.value, length.value, k], None))
    }

    // =========================================================================
    // Geo
    // =========================================================================

    fn geo_hash(&mut self, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Number, Number, Number]);
        let (coords, k) = self.floats(&a[..2]);
        if let Some(Datum::Int(chars)) = self.program.literal_value(a[2]) {
            let chars = *chars;
            return Ok(self.program.ssa(
                Opcode::GeoHashImm,
                &[coords[0], coords[1], k],
                Some(Immediate::Int(chars)),
            ));
        }
        let precision = self.program.coerce_int(a[2]);
        let k = self.program.and(k, precision.mask);
        Ok(self.program.ssa(
            Opcode::GeoHash,
            &[coords[0], coords[1], precision.value, k],
            None,
        ))
    }

    // =========================================================================
    // Values
    // =========================================================================

    fn make_list(&mut self, args: &[Expr]) -> Result<ValueId> {
        at_least(args, 1)?;
        let items = arguments!(self, args, &vec![Expression; args.len()]);
        let mut operands = Vec::with_capacity(items.len() * 2 + 1);
        for item in items {
            let boxed = self.program.serialized(item);
            operands.push(boxed);
            operands.push(self.program.mask(boxed));
        }
        operands.push(Program::INIT);
        Ok(self.program.ssa(Opcode::MakeList, &operands, None))
    }

    fn make_struct(&mut self, args: &[Expr]) -> Result<ValueId> {
        if args.len() % 2 != 0 {
            return Err(Error::Arity {
                expected: args.len() + 1,
                got: args.len(),
            });
        }
        let kinds: Vec<ArgKind> = (0..args.len())
            .map(|i| if i % 2 == 0 { LiteralString } else { Expression })
            .collect();
        let a = arguments!(self, args, &kinds);
        let mut operands = Vec::with_capacity(a.len() / 2 * 3 + 1);
        for pair in a.chunks_exact(2) {
            let boxed = self.program.serialized(pair[1]);
            operands.push(pair[0]);
            operands.push(boxed);
            operands.push(self.program.mask(boxed));
        }
        operands.push(Program::INIT);
        Ok(self.program.ssa(Opcode::MakeStruct, &operands, None))
    }

    /// `TYPE_BIT(v)`: the JSON-style type bit of `v`, 0 when MISSING.
    fn type_bit(&mut self, args: &[Expr]) -> Result<ValueId> {
        let a = arguments!(self, args, &[Expression]);
        let v = a[0];
        if let Some(d) = self.program.literal_value(v) {
            let bit = d.type_tag().json_bit();
            return Ok(self.program.literal(Datum::Int(bit)));
        }
        if self.is_absent(v) {
            return Ok(self.program.literal(Datum::Int(0)));
        }
        let primary = self.program.primary(v);
        let tag = match primary {
            SsaType::VALUE => {
                let k = self.program.mask(v);
                return Ok(self.program.ssa(Opcode::TypeBits, &[v, k], None));
            }
            SsaType::BOOL => TypeTag::Bool,
            SsaType::INT | SsaType::FLOAT => TypeTag::Float,
            SsaType::STRING => TypeTag::String,
            SsaType::TIME => TypeTag::Timestamp,
            other => {
                return Err(Error::Invalid {
                    expr: args[0].to_string(),
                    message: format!("no type bit for {other}"),
                })
            }
        };
        let k = if primary == SsaType::BOOL {
            self.program.not_missing(v)
        } else {
            self.program.mask(v)
        };
        let bit = self.program.broadcast_i(tag.json_bit());
        Ok(if self.program.is_init(k) {
            bit
        } else {
            self.program.vk(bit, k)
        })
    }

    /// `ASSERT_ION_TYPE(v, tag, ...)`: `v` restricted to the lanes whose runtime tag is
    /// one of the listed tags.
    fn assert_ion_type(&mut self, args: &[Expr]) -> Result<ValueId> {
        at_least(args, 2)?;
        let mut set = TypeSet::empty();
        for (i, arg) in args.iter().enumerate().skip(1) {
            let tag = tag_argument(arg).ok_or_else(|| Error::Argument {
                position: i + 1,
                message: format!("{arg} is not a type tag"),
            })?;
            set |= TypeSet::of(tag);
        }

        let v = self.value(&args[0]).map_err(|err| err.at_argument(1))?;
        if let Some(d) = self.program.literal_value(v) {
            return Ok(if set.has(d.type_tag()) {
                v
            } else {
                Program::FALSE
            });
        }
        if self.is_absent(v) {
            return Ok(Program::FALSE);
        }
        let stored = match self.program.primary(v) {
            SsaType::VALUE => return Ok(self.program.check_tag(v, set)),
            SsaType::BOOL => TypeSet::BOOL,
            SsaType::INT => TypeSet::INT | TypeSet::UINT,
            SsaType::FLOAT => TypeSet::FLOAT,
            SsaType::STRING => TypeSet::STRING,
            SsaType::TIME => TypeSet::TIMESTAMP,
            _ => TypeSet::empty(),
        };
        Ok(if !stored.is_empty() && set.contains(stored) {
            v
        } else {
            Program::FALSE
        })
    }
}

fn arity(args: &[Expr], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::Arity {
            expected,
            got: args.len(),
        })
    }
}

fn at_least(args: &[Expr], expected: usize) -> Result<()> {
    if args.len() >= expected {
        Ok(())
    } else {
        Err(Error::Arity {
            expected,
            got: args.len(),
        })
    }
}

fn unsupported_part(func: &str, part: TimePart) -> Error {
    Error::Unsupported {
        kind: format!("{func} with {part}"),
    }
}

/// Day named by the second argument of `DATE_TRUNC(DOW, ...)`: 0 to 6 or a weekday name.
fn weekday(arg: &Expr) -> Result<i64> {
    match arg {
        Expr::Integer(day) if (0..7).contains(day) => Ok(*day),
        Expr::String(name) => WEEKDAYS
            .iter()
            .position(|d| d.eq_ignore_ascii_case(name))
            .map(|i| i as i64)
            .ok_or_else(|| Error::Invalid {
                expr: arg.to_string(),
                message: "not a weekday".to_string(),
            }),
        other => Err(Error::Invalid {
            expr: other.to_string(),
            message: "expected a weekday from 0 to 6 or a weekday name".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        compile_logical, compile_value,
        config::CompileConfig,
        encoding::SymbolTable,
        expr::{Builtin, Expr, TimePart},
        ssa::{Datum, Immediate, Opcode, Program},
        Error,
    };

    fn value_of(func: Builtin, args: Vec<Expr>) -> crate::Result<Program> {
        compile_value(
            &Expr::call(func, args),
            &SymbolTable::new(),
            &CompileConfig::default(),
        )
    }

    fn imm_of(p: &Program, op: Opcode) -> Option<Immediate> {
        p.reachable()
            .into_iter()
            .find(|id| p.op(*id).opcode() == Some(op))
            .and_then(|id| p.imm(id).cloned())
    }

    #[test]
    fn test_arity_error_is_wrapped() {
        let err = value_of(Builtin::Sqrt, vec![]).unwrap_err();
        assert_eq!(err.to_string(), "compiling SQRT: expects 1 arguments, got 0");
    }

    #[test]
    fn test_argument_error_names_position() {
        let err = value_of(Builtin::Upper, vec![Expr::Integer(3)]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("compiling UPPER: argument 1: "), "{msg}");
    }

    #[test]
    fn test_null_argument_is_missing() {
        let p = value_of(Builtin::Sqrt, vec![Expr::Null]).unwrap();
        assert_eq!(p.count_op(Opcode::SqrtF), 0);
        let root = p.root().unwrap();
        assert_eq!(p.args(root)[2], Program::FALSE);
    }

    #[test]
    fn test_date_add_units() {
        let p = value_of(
            Builtin::DateAdd(TimePart::Hour),
            vec![Expr::Integer(2), Expr::path("ts")],
        )
        .unwrap();
        assert_eq!(imm_of(&p, Opcode::DateAddImm), Some(Immediate::Int(3_600_000_000)));

        let p = value_of(
            Builtin::DateAdd(TimePart::Quarter),
            vec![Expr::path("n"), Expr::path("ts")],
        )
        .unwrap();
        assert_eq!(p.count_op(Opcode::DateAddMonth), 1);
        assert_eq!(imm_of(&p, Opcode::MulImmI), Some(Immediate::Int(3)));

        let err = value_of(
            Builtin::DateAdd(TimePart::Dow),
            vec![Expr::Integer(1), Expr::path("ts")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported construct"));
    }

    #[test]
    fn test_date_trunc_dow() {
        let p = value_of(
            Builtin::DateTrunc(TimePart::Dow),
            vec![Expr::path("ts"), Expr::string("Monday")],
        )
        .unwrap();
        assert_eq!(imm_of(&p, Opcode::TruncDow), Some(Immediate::Int(1)));

        let err = value_of(
            Builtin::DateTrunc(TimePart::Dow),
            vec![Expr::path("ts"), Expr::Integer(9)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("argument 2"));
    }

    #[test]
    fn test_log_with_base() {
        let p = value_of(Builtin::Log, vec![Expr::Integer(2), Expr::path("x")]).unwrap();
        assert_eq!(p.count_op(Opcode::Log2F), 2);
        assert_eq!(p.count_op(Opcode::DivF), 1);

        let p = value_of(Builtin::Log, vec![Expr::path("x")]).unwrap();
        assert_eq!(p.count_op(Opcode::Log10F), 1);
    }

    #[test]
    fn test_concat() {
        let p = value_of(
            Builtin::Concat,
            vec![Expr::string("a"), Expr::string("b"), Expr::string("c")],
        )
        .unwrap();
        let root = p.root().unwrap();
        assert_eq!(
            p.literal_value(p.args(root)[1]),
            Some(&Datum::String("abc".into()))
        );

        let parts = (0..5).map(|i| Expr::path(format!("s{i}"))).collect();
        let p = value_of(Builtin::Concat, parts).unwrap();
        assert_eq!(p.count_op(Opcode::Concat4) + p.count_op(Opcode::Concat2), 2);
    }

    #[test]
    fn test_trim_forms() {
        let p = value_of(Builtin::Trim, vec![Expr::path("s")]).unwrap();
        assert_eq!(p.count_op(Opcode::TrimWsLeft), 1);
        assert_eq!(p.count_op(Opcode::TrimWsRight), 1);

        let p = value_of(Builtin::Rtrim, vec![Expr::path("s"), Expr::string("xy")]).unwrap();
        assert_eq!(imm_of(&p, Opcode::TrimCharRight), Some(Immediate::Text("xy".into())));
        assert_eq!(p.count_op(Opcode::TrimCharLeft), 0);

        let err = value_of(Builtin::Ltrim, vec![Expr::path("s"), Expr::path("t")]).unwrap_err();
        assert!(err.to_string().contains("argument 2"));
    }

    #[test]
    fn test_equals_ci_picks_unicode_form() {
        let e = Expr::call(Builtin::EqualsCi, vec![Expr::path("s"), Expr::string("straße")]);
        let p = compile_logical(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap();
        assert_eq!(p.count_op(Opcode::CmpEqUtf8CiStr), 1);
    }

    #[test]
    fn test_is_subnet_of() {
        let e = Expr::call(
            Builtin::IsSubnetOf,
            vec![
                Expr::string("10.0.0.0"),
                Expr::string("10.0.0.255"),
                Expr::path("ip"),
            ],
        );
        let p = compile_logical(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap();
        assert_eq!(p.count_op(Opcode::IsSubnetOfIp4), 1);

        let bad = Expr::call(
            Builtin::IsSubnetOf,
            vec![Expr::string("10.0.0"), Expr::string("10.0.0.255"), Expr::path("ip")],
        );
        let err = compile_logical(&bad, &SymbolTable::new(), &CompileConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Builtin { ref source, .. } if matches!(**source, Error::Argument { position: 1, .. })
        ));
    }

    #[test]
    fn test_substring_default_length() {
        let p = value_of(Builtin::Substring, vec![Expr::path("s"), Expr::Integer(2)]).unwrap();
        let substr = p
            .reachable()
            .into_iter()
            .find(|id| p.op(*id).opcode() == Some(Opcode::Substr))
            .unwrap();
        let length = p.args(substr)[2];
        assert_eq!(p.imm(length), Some(&Immediate::Int(i64::MAX)));

        let err = value_of(Builtin::Substring, vec![Expr::path("s")]).unwrap_err();
        assert!(err.to_string().contains("expects 3 arguments, got 1"));
    }

    #[test]
    fn test_geo_hash_immediate_precision() {
        let p = value_of(
            Builtin::GeoHash,
            vec![Expr::path("lat"), Expr::path("lon"), Expr::Integer(6)],
        )
        .unwrap();
        assert_eq!(imm_of(&p, Opcode::GeoHashImm), Some(Immediate::Int(6)));
        assert_eq!(p.count_op(Opcode::GeoHash), 0);
    }

    #[test]
    fn test_make_struct_needs_literal_keys() {
        let p = value_of(
            Builtin::MakeStruct,
            vec![Expr::string("a"), Expr::path("x"), Expr::string("b"), Expr::Integer(1)],
        )
        .unwrap();
        assert_eq!(p.count_op(Opcode::MakeStruct), 1);

        assert!(value_of(Builtin::MakeStruct, vec![Expr::string("a")]).is_err());
        let err = value_of(Builtin::MakeStruct, vec![Expr::path("k"), Expr::Integer(1)]).unwrap_err();
        assert!(err.to_string().contains("argument 1"));
    }

    #[test]
    fn test_type_bit() {
        let p = value_of(Builtin::TypeBit, vec![Expr::path("x")]).unwrap();
        assert_eq!(p.count_op(Opcode::TypeBits), 1);

        let p = value_of(Builtin::TypeBit, vec![Expr::string("s")]).unwrap();
        let root = p.root().unwrap();
        assert_eq!(p.literal_value(p.args(root)[1]), Some(&Datum::Int(1 << 4)));

        let p = value_of(Builtin::TypeBit, vec![Expr::Missing]).unwrap();
        let root = p.root().unwrap();
        assert_eq!(p.literal_value(p.args(root)[1]), Some(&Datum::Int(0)));
    }

    #[test]
    fn test_assert_ion_type() {
        let p = value_of(
            Builtin::AssertIonType,
            vec![Expr::path("x"), Expr::Integer(8), Expr::Integer(7)],
        )
        .unwrap();
        assert_eq!(p.count_op(Opcode::CheckTag), 1);

        let err = value_of(
            Builtin::AssertIonType,
            vec![Expr::path("x"), Expr::Integer(99)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("argument 2"));
    }
}
