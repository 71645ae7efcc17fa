//! CAST lowering.
//!
//! The conversion is chosen from the primary type of the input and the declared target.
//! Pairs that can never succeed fold to the all-false mask instead of emitting a
//! runtime check. Boxed inputs always go through a tag check first.

use crate::{
    compiler::Compiler,
    events::EventKind,
    expr::{CastType, Expr},
    ssa::{Datum, Immediate, Opcode, Program, SsaType, TypeSet, ValueId},
    Result,
};

impl Compiler<'_> {
    pub(crate) fn cast(&mut self, from: &Expr, to: CastType) -> Result<ValueId> {
        match to {
            CastType::Missing => return Ok(Program::FALSE),
            CastType::Null => return Ok(self.program.literal(Datum::Null)),
            _ => {}
        }

        let v = self.value(from)?;
        if let Some(d) = self.program.literal_value(v).cloned() {
            return Ok(self.cast_literal(&d, to));
        }
        if self.is_absent(v) {
            return Ok(Program::FALSE);
        }

        let k = self.program.mask(v);
        let ty = self.program.ret_type(v);
        let primary = ty.primary();
        let out = match (to, primary) {
            (CastType::Bool, SsaType::BOOL) => v,
            (CastType::Bool, SsaType::INT) => self.program.ssa(Opcode::CvtIToK, &[v, k], None),
            (CastType::Bool, SsaType::FLOAT) => self.program.ssa(Opcode::CvtFToK, &[v, k], None),
            (CastType::Bool, SsaType::VALUE) => self.boxed_to_bool(v),

            (CastType::Integer, SsaType::INT) => v,
            (CastType::Integer, SsaType::FLOAT) => {
                self.program.ssa(Opcode::CvtFToI, &[v, k], None)
            }
            (CastType::Integer, SsaType::BOOL) => self.program.coerce_int(v).value,
            (CastType::Integer, SsaType::TIME) => {
                self.program.ssa(Opcode::CvtTsToI, &[v, k], None)
            }
            (CastType::Integer, SsaType::VALUE) => {
                let ck = self.program.check_tag(v, TypeSet::BOOL | TypeSet::NUMERIC);
                self.program.ssa(Opcode::UnboxCvtI, &[ck, ck], None)
            }

            (CastType::Float, SsaType::FLOAT) => v,
            (CastType::Float, SsaType::INT) => self.program.ssa(Opcode::CvtIToF, &[v, k], None),
            (CastType::Float, SsaType::BOOL) => self.program.coerce_float(v).value,
            (CastType::Float, SsaType::VALUE) => {
                let ck = self.program.check_tag(v, TypeSet::BOOL | TypeSet::NUMERIC);
                self.program.ssa(Opcode::UnboxCvtF, &[ck, ck], None)
            }

            (CastType::String, SsaType::STRING) => v,
            (CastType::String, SsaType::INT) => {
                self.program.ssa(Opcode::CvtIToStr, &[v, k], None)
            }
            (CastType::String, SsaType::VALUE) => {
                let ck = self.program.check_tag(v, TypeSet::TEXT);
                self.program.unsymbolize(ck)
            }

            (CastType::Timestamp, SsaType::TIME) => v,
            (CastType::Timestamp, SsaType::VALUE) => {
                self.program.check_tag(v, TypeSet::TIMESTAMP)
            }

            (CastType::List, _) if ty.contains(SsaType::LIST) => v,
            (CastType::List, SsaType::VALUE) => self.program.check_tag(v, TypeSet::LIST),
            (CastType::Struct, SsaType::VALUE) => self.program.check_tag(v, TypeSet::STRUCT),
            (CastType::Decimal, SsaType::VALUE) => self.program.check_tag(v, TypeSet::NUMERIC),
            (CastType::Symbol, SsaType::VALUE) => self.program.check_tag(v, TypeSet::TEXT),

            _ => {
                let target: &'static str = to.into();
                self.program
                    .events()
                    .record(EventKind::CastFolded)
                    .message(format!("{primary} never casts to {target}"));
                Program::FALSE
            }
        };
        self.check(from, out)
    }

    /// `CAST(v AS BOOLEAN)` for a boxed `v`: NOT (v = 0 OR v IS FALSE) on the lanes
    /// holding a bool or a number.
    fn boxed_to_bool(&mut self, v: ValueId) -> ValueId {
        let ck = self.program.check_tag(v, TypeSet::BOOL | TypeSet::NUMERIC);
        let zero = self.program.ssa(
            Opcode::CmpEqImmV,
            &[ck, ck],
            Some(Immediate::Datum(Datum::Int(0))),
        );
        let is_false = self.program.ssa(Opcode::IsFalse, &[ck, ck], None);
        let either = self.program.or(zero, is_false);
        self.program
            .ssa_not_missing(Opcode::AndNotK, &[either, ck], None, ck)
    }

    fn cast_literal(&mut self, d: &Datum, to: CastType) -> ValueId {
        let folded = match (to, d) {
            (_, Datum::Null) => Some(Datum::Null),
            (CastType::Bool, Datum::Bool(b)) => Some(Datum::Bool(*b)),
            (CastType::Bool, Datum::Int(i)) => Some(Datum::Bool(*i != 0)),
            (CastType::Bool, Datum::Float(x)) => Some(Datum::Bool(*x != 0.0)),
            (CastType::Integer, Datum::Bool(b)) => Some(Datum::Int(i64::from(*b))),
            (CastType::Integer, Datum::Timestamp(us)) => Some(Datum::Int(*us)),
            (CastType::Integer, Datum::String(s)) => s.trim().parse().ok().map(Datum::Int),
            (CastType::Integer, n) => n.as_i64().map(Datum::Int),
            (CastType::Float, Datum::Bool(b)) => Some(Datum::Float(f64::from(u8::from(*b)))),
            (CastType::Float, Datum::String(s)) => s.trim().parse().ok().map(Datum::Float),
            (CastType::Float, n) => n.as_f64().map(Datum::Float),
            (CastType::String | CastType::Symbol, Datum::String(s)) => {
                Some(Datum::String(s.clone()))
            }
            (CastType::String, Datum::Int(i)) => Some(Datum::String(i.to_string())),
            (CastType::Timestamp, Datum::Timestamp(us)) => Some(Datum::Timestamp(*us)),
            (CastType::List, Datum::List(_))
            | (CastType::Struct, Datum::Struct(_))
            | (CastType::Decimal, Datum::Int(_) | Datum::Float(_)) => Some(d.clone()),
            _ => None,
        };

        let target: &'static str = to.into();
        let (result, message) = match folded {
            Some(datum) => {
                let message = format!("CAST({d} AS {target}) -> {datum}");
                (self.program.literal(datum), message)
            }
            None => (Program::FALSE, format!("CAST({d} AS {target}) is missing")),
        };
        self.program
            .events()
            .record(EventKind::CastFolded)
            .location(result.index())
            .message(message);
        result
    }
}
