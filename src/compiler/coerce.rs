//! Context contracts: lowering a sub-expression where a condition, a number, a
//! timestamp or a string is required.

use std::fmt;

use crate::{
    compiler::Compiler,
    expr::Expr,
    ssa::{Datum, Opcode, Program, SsaType, TypeSet, ValueId},
    Error, Result,
};

/// Builds the error for a sub-expression whose static type does not fit its context.
pub(crate) fn mismatch(e: &Expr, expected: &'static str, found: impl fmt::Display) -> Error {
    Error::TypeMismatch {
        expr: e.to_string(),
        expected,
        found: found.to_string(),
    }
}

impl Compiler<'_> {
    /// Returns true if `v` is NULL or MISSING on every lane.
    pub(crate) fn is_absent(&self, v: ValueId) -> bool {
        self.program.is_null_or_missing(v)
    }

    /// Lowers `e` as a condition and returns its truth mask.
    ///
    /// Literal TRUE, FALSE, NULL and MISSING fold to the constant masks. A boxed value is
    /// tested with `istrue.v` and is MISSING on lanes that do not hold a boolean. Raw
    /// numbers convert with `!= 0`.
    pub(crate) fn as_bool(&mut self, e: &Expr) -> Result<ValueId> {
        match e {
            Expr::Case {
                limbs, otherwise, ..
            } => return self.logical_case(limbs, otherwise.as_deref()),
            Expr::Bool(true) => return Ok(Program::INIT),
            Expr::Bool(false) => return Ok(self.program.known_false()),
            Expr::Null | Expr::Missing => return Ok(Program::FALSE),
            _ => {}
        }
        if let Some(d) = e.as_datum() {
            return Err(mismatch(e, "logical", d.type_tag()));
        }

        let v = self.value(e)?;
        if let Some(d) = self.program.literal_value(v).cloned() {
            return match d {
                Datum::Bool(true) => Ok(Program::INIT),
                Datum::Bool(false) => Ok(self.program.known_false()),
                Datum::Null => Ok(Program::FALSE),
                other => Err(mismatch(e, "logical", other.type_tag())),
            };
        }

        let k = self.program.mask(v);
        match self.program.primary(v) {
            SsaType::BOOL => Ok(v),
            SsaType::VALUE => {
                let nm = self.program.check_tag(v, TypeSet::BOOL);
                Ok(self.program.ssa_not_missing(Opcode::IsTrue, &[v, k], None, nm))
            }
            SsaType::INT => Ok(self.program.ssa(Opcode::CvtIToK, &[v, k], None)),
            SsaType::FLOAT => Ok(self.program.ssa(Opcode::CvtFToK, &[v, k], None)),
            other => Err(mismatch(e, "logical", other)),
        }
    }

    /// Lowers `e` where a number is required.
    ///
    /// Literals and boxed values pass through unchanged; the consumer converts them.
    pub(crate) fn as_number(&mut self, e: &Expr) -> Result<ValueId> {
        if let Expr::Case {
            limbs,
            otherwise,
            logical: false,
        } = e
        {
            return self.numeric_case(limbs, otherwise.as_deref());
        }
        let v = self.value(e)?;
        if self.is_absent(v) {
            return Ok(v);
        }
        if let Some(d) = self.program.literal_value(v) {
            return if d.is_numeric() {
                Ok(v)
            } else {
                Err(mismatch(e, "number", d.type_tag()))
            };
        }
        match self.program.primary(v) {
            SsaType::INT | SsaType::FLOAT | SsaType::VALUE => Ok(v),
            other => Err(mismatch(e, "number", other)),
        }
    }

    /// Lowers `e` where a timestamp is required.
    pub(crate) fn as_time(&mut self, e: &Expr) -> Result<ValueId> {
        let v = self.value(e)?;
        if self.is_absent(v) {
            return Ok(v);
        }
        if let Some(d) = self.program.literal_value(v) {
            return match d {
                Datum::Timestamp(_) => Ok(v),
                other => Err(mismatch(e, "timestamp", other.type_tag())),
            };
        }
        match self.program.primary(v) {
            SsaType::TIME | SsaType::VALUE => Ok(v),
            other => Err(mismatch(e, "timestamp", other)),
        }
    }

    /// Lowers `e` where a string is required. Boxed values are unsymbolized and
    /// unboxed.
    pub(crate) fn as_string(&mut self, e: &Expr) -> Result<ValueId> {
        let v = self.value(e)?;
        if self.is_absent(v) {
            return Ok(v);
        }
        if let Some(d) = self.program.literal_value(v) {
            return match d {
                Datum::String(_) => Ok(v),
                other => Err(mismatch(e, "string", other.type_tag())),
            };
        }
        match self.program.primary(v) {
            SsaType::STRING => Ok(v),
            SsaType::VALUE => {
                let s = self.program.coerce_str(v);
                Ok(s.value)
            }
            other => Err(mismatch(e, "string", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CompileConfig,
        encoding::SymbolTable,
        expr::{ArithOp, CmpOp},
        ssa::Op,
    };

    #[test]
    fn test_as_bool_literals() {
        let symbols = SymbolTable::new();
        let mut c = Compiler::new(&symbols, CompileConfig::default());
        assert_eq!(c.as_bool(&Expr::Bool(true)).unwrap(), Program::INIT);
        let f = c.as_bool(&Expr::Bool(false)).unwrap();
        assert!(c.program.is_known_false(f));
        assert_eq!(c.as_bool(&Expr::Null).unwrap(), Program::FALSE);
        assert!(matches!(
            c.as_bool(&Expr::string("yes")),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_as_bool_path_checks_tag() {
        let symbols = SymbolTable::new();
        let mut c = Compiler::new(&symbols, CompileConfig::default());
        let k = c.as_bool(&Expr::path("flag")).unwrap();
        assert_eq!(c.program.op(k), Op::Machine(Opcode::IsTrue));
        let nm = c.program.not_missing(k);
        assert_eq!(c.program.op(nm), Op::Machine(Opcode::CheckTag));
    }

    #[test]
    fn test_as_bool_of_arithmetic_converts() {
        let symbols = SymbolTable::new();
        let mut c = Compiler::new(&symbols, CompileConfig::default());
        let e = Expr::arith(ArithOp::BitAnd, Expr::path("bits"), Expr::Integer(4));
        let k = c.as_bool(&e).unwrap();
        assert_eq!(c.program.op(k), Op::Machine(Opcode::CvtIToK));
    }

    #[test]
    fn test_as_number() {
        let symbols = SymbolTable::new();
        let mut c = Compiler::new(&symbols, CompileConfig::default());
        assert!(c.as_number(&Expr::Integer(1)).is_ok());
        assert!(c.as_number(&Expr::path("x")).is_ok());
        assert!(c.as_number(&Expr::Null).is_ok());
        let cmp = Expr::compare(CmpOp::Lt, Expr::path("x"), Expr::Integer(1));
        let err = c.as_number(&cmp).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot compile x < 1 as number (found logical)"
        );
    }

    #[test]
    fn test_as_string_unboxes() {
        let symbols = SymbolTable::new();
        let mut c = Compiler::new(&symbols, CompileConfig::default());
        let s = c.as_string(&Expr::path("name")).unwrap();
        assert_eq!(c.program.op(s), Op::Machine(Opcode::UnboxStr));
        assert!(c.as_string(&Expr::string("lit")).is_ok());
        assert!(c.as_string(&Expr::Integer(2)).is_err());
    }

    #[test]
    fn test_as_time() {
        let symbols = SymbolTable::new();
        let mut c = Compiler::new(&symbols, CompileConfig::default());
        assert!(c.as_time(&Expr::Timestamp(0)).is_ok());
        assert!(c.as_time(&Expr::path("ts")).is_ok());
        assert!(c.as_time(&Expr::Float(1.0)).is_err());
    }
}
