//! Lowering of expression trees into SSA programs.
//!
//! The [`Compiler`] walks an [`Expr`] bottom-up and emits [`Program`] nodes through the
//! typed construction helpers of [`crate::ssa`]. Every sub-expression yields exactly one
//! node; its validity mask is derived from the node ([`Program::mask`]).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Expression Compiler                       │
//! ├────────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │  Compiler::lower            One exhaustive match per Expr kind │
//! │    ├─ coerce                as_bool / as_number / as_time /    │
//! │    │                        as_string context contracts        │
//! │    ├─ builtins              Argument-kind table per function   │
//! │    ├─ case                  Logical, numeric and generic CASE  │
//! │    ├─ cast                  CAST table, literal folding        │
//! │    └─ membership            IN sets and HASH_LOOKUP tables     │
//! │                                                                │
//! │  Entry points               compile_logical -> ret.k           │
//! │                             compile_value   -> ret.v           │
//! │                             compile_batch   -> rayon fan-out   │
//! │                                                                │
//! │  RewritePass                One operand-first sweep at the end │
//! │                                                                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust
//! use vexc::{compile_logical, CmpOp, CompileConfig, Expr, SymbolTable};
//! use vexc::ssa::Opcode;
//!
//! let symbols = SymbolTable::new();
//! let expr = Expr::compare(CmpOp::Gt, Expr::path("price"), Expr::Integer(5));
//! let program = compile_logical(&expr, &symbols, &CompileConfig::default())?;
//!
//! let root = program.root().unwrap();
//! assert_eq!(program.op(root).opcode(), Some(Opcode::RetK));
//! assert_eq!(program.count_op(Opcode::CmpGtImmF), 1);
//! # Ok::<(), vexc::Error>(())
//! ```

mod builtins;
mod case;
mod cast;
mod coerce;
mod membership;

use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    config::CompileConfig,
    encoding::Encoding,
    expr::{Builtin, Expr, IsKey, LogicOp, MatchOp, PathStep, UnaryOp},
    rewrite::{ProgramPass, RewritePass},
    ssa::{Field, Immediate, LikePattern, Opcode, Program, RegexPattern, ValueId},
    Error, Result,
};

/// What a compiled program returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Output {
    /// A truth mask, rooted at `ret.k`
    Logical,
    /// A boxed value, rooted at `ret.v`
    Value,
}

/// Builds one [`Program`] from one or more expressions.
///
/// The compiler owns the program under construction. A compile error leaves the program
/// in an unspecified state; callers discard it.
pub struct Compiler<'a> {
    program: Program,
    encoding: &'a dyn Encoding,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler emitting into a fresh program.
    #[must_use]
    pub fn new(encoding: &'a dyn Encoding, config: CompileConfig) -> Self {
        Self {
            program: Program::new(config),
            encoding,
        }
    }

    /// The program built so far.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Consumes the compiler and returns its program as built, without a sweep.
    #[must_use]
    pub fn into_program(self) -> Program {
        self.program
    }

    /// Lowers `expr` and returns the node standing for its value.
    ///
    /// # Errors
    ///
    /// Returns an error if `expr` or one of its sub-expressions cannot be lowered.
    pub fn compile(&mut self, expr: &Expr) -> Result<ValueId> {
        self.value(expr)
    }

    /// Lowers `expr` in boolean context and returns its truth mask.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `expr` cannot be used as a condition.
    pub fn compile_condition(&mut self, expr: &Expr) -> Result<ValueId> {
        self.as_bool(expr)
    }

    /// Lowers `e` and surfaces a stored diagnostic if the result is invalid.
    pub(crate) fn value(&mut self, e: &Expr) -> Result<ValueId> {
        let v = self.lower(e)?;
        self.check(e, v)
    }

    pub(crate) fn check(&self, e: &Expr, v: ValueId) -> Result<ValueId> {
        match self.program.invalid_message(v) {
            Some(message) => Err(Error::Invalid {
                expr: e.to_string(),
                message: message.to_string(),
            }),
            None => Ok(v),
        }
    }

    fn lower(&mut self, e: &Expr) -> Result<ValueId> {
        match e {
            Expr::Missing => Ok(Program::FALSE),
            Expr::Bool(_)
            | Expr::Integer(_)
            | Expr::Float(_)
            | Expr::String(_)
            | Expr::Timestamp(_)
            | Expr::Null
            | Expr::Datum(_) => match e.as_datum() {
                Some(d) => Ok(self.program.literal(d)),
                None => Err(Error::Unsupported {
                    kind: e.kind().to_string(),
                }),
            },
            Expr::Comparison { op, left, right } => {
                let a = self.value(left)?;
                let b = self.value(right)?;
                Ok(self.program.compare(*op, a, b))
            }
            Expr::StringMatch {
                op,
                expr,
                pattern,
                escape,
            } => self.string_match(*op, expr, pattern, *escape),
            Expr::UnaryArith { op, child } => {
                let v = self.as_number(child)?;
                if self.is_absent(v) {
                    return Ok(Program::FALSE);
                }
                Ok(match op {
                    UnaryOp::Neg => self.program.neg(v),
                    UnaryOp::BitNot => self.program.bit_not(v),
                })
            }
            Expr::Arithmetic { op, left, right } => {
                let a = self.as_number(left)?;
                let b = self.as_number(right)?;
                Ok(self.program.arith(*op, a, b))
            }
            Expr::Logical { op, left, right } => {
                let a = self.as_bool(left)?;
                let b = self.as_bool(right)?;
                Ok(match op {
                    LogicOp::And => self.program.logic_and(a, b),
                    LogicOp::Or => self.program.logic_or(a, b),
                    LogicOp::Xor => self.program.logic_xor(a, b),
                    LogicOp::Xnor => self.program.logic_xnor(a, b),
                })
            }
            Expr::Not(inner) => {
                let v = self.as_bool(inner)?;
                Ok(self.program.not(v))
            }
            Expr::Path { first, rest } => {
                let field = self.resolve(first);
                let mut v = self.program.field(field);
                for step in rest {
                    v = match step {
                        PathStep::Field(name) => {
                            let field = self.resolve(name);
                            self.program.field_in(v, field)
                        }
                        PathStep::Index(i) => self.program.index(v, *i),
                    };
                }
                Ok(v)
            }
            Expr::IsKey { key, expr } => {
                let v = self.value(expr)?;
                Ok(match key {
                    IsKey::Null => self.program.pred_is_null(v),
                    IsKey::NotNull => self.program.pred_is_not_null(v),
                    IsKey::Missing => self.program.pred_is_missing(v),
                    IsKey::NotMissing => self.program.pred_is_not_missing(v),
                    IsKey::True => self.program.pred_is_true(v),
                    IsKey::False => self.program.pred_is_false(v),
                    IsKey::NotTrue => self.program.pred_is_not_true(v),
                    IsKey::NotFalse => self.program.pred_is_not_false(v),
                })
            }
            Expr::Builtin {
                func: Builtin::Unknown(name),
                ..
            } => Err(Error::Unsupported {
                kind: format!("function {name}"),
            }),
            Expr::Builtin { func, args } => self
                .builtin(e, func, args)
                .map_err(|err| err.in_builtin(func.static_name())),
            Expr::Case {
                limbs,
                otherwise,
                logical,
            } => {
                if *logical {
                    self.logical_case(limbs, otherwise.as_deref())
                } else {
                    self.generic_case(limbs, otherwise.as_deref())
                }
            }
            Expr::Cast { from, to } => self.cast(from, *to),
            Expr::Member { arg, values } => self.member(arg, values),
        }
    }

    fn resolve(&self, name: &str) -> Field {
        Field {
            name: name.to_string(),
            symbol: self.encoding.symbolize(name),
        }
    }

    fn string_match(
        &mut self,
        op: MatchOp,
        expr: &Expr,
        pattern: &str,
        escape: Option<char>,
    ) -> Result<ValueId> {
        let s = self.as_string(expr)?;
        if self.is_absent(s) {
            return Ok(Program::FALSE);
        }
        let k = self.program.mask(s);
        let (opcode, imm) = match op {
            MatchOp::Like | MatchOp::ILike => {
                check_like(pattern, escape)?;
                let like = LikePattern {
                    pattern: pattern.to_string(),
                    escape,
                };
                let opcode = if op == MatchOp::Like {
                    Opcode::LikeCs
                } else {
                    Opcode::LikeCi
                };
                (opcode, Immediate::Like(like))
            }
            MatchOp::RegexMatch => (Opcode::RegexMatch, regex_imm(pattern, pattern)?),
            MatchOp::RegexMatchCi => {
                (Opcode::RegexMatch, regex_imm(pattern, &format!("(?i){pattern}"))?)
            }
            MatchOp::SimilarTo => {
                let source = format!("^(?:{})$", similar_to_regex(pattern));
                (Opcode::RegexMatch, regex_imm(pattern, &source)?)
            }
            MatchOp::SimilarToCi => {
                let source = format!("(?i)^(?:{})$", similar_to_regex(pattern));
                (Opcode::RegexMatch, regex_imm(pattern, &source)?)
            }
        };
        Ok(self.program.ssa(opcode, &[s, k], Some(imm)))
    }

    /// Runs the final sweep if configured and validates the result.
    fn finish(self) -> Result<Program> {
        let mut program = self.program;
        if program.config().rewrite_sweep {
            let pass = RewritePass::new();
            if pass.should_run(&program) {
                pass.run(&mut program)?;
            }
        }
        program.validate()?;
        Ok(program)
    }
}

/// A LIKE pattern may not end in a lone escape character.
fn check_like(pattern: &str, escape: Option<char>) -> Result<()> {
    let Some(esc) = escape else {
        return Ok(());
    };
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == esc && chars.next().is_none() {
            return Err(Error::Pattern {
                pattern: pattern.to_string(),
                message: format!("pattern ends with escape character {esc:?}"),
            });
        }
    }
    Ok(())
}

fn regex_imm(pattern: &str, source: &str) -> Result<Immediate> {
    regex::Regex::new(source)
        .map(|re| Immediate::Regex(RegexPattern(Arc::new(re))))
        .map_err(|e| Error::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Translates the wildcards of a SIMILAR TO pattern into regex syntax.
fn similar_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '.' => out.push_str("\\."),
            other => out.push(other),
        }
    }
    out
}

/// Compiles `expr` as a condition into a program rooted at `ret.k`.
///
/// # Errors
///
/// Returns an error if `expr` is not usable as a condition or one of its
/// sub-expressions cannot be lowered.
pub fn compile_logical(
    expr: &Expr,
    encoding: &dyn Encoding,
    config: &CompileConfig,
) -> Result<Program> {
    let mut compiler = Compiler::new(encoding, config.clone());
    let k = compiler.as_bool(expr)?;
    compiler.program.return_mask(k);
    compiler.finish()
}

/// Compiles `expr` into a program rooted at `ret.v`, returning its boxed value.
///
/// # Errors
///
/// Returns an error if `expr` or one of its sub-expressions cannot be lowered.
pub fn compile_value(expr: &Expr, encoding: &dyn Encoding, config: &CompileConfig) -> Result<Program> {
    let mut compiler = Compiler::new(encoding, config.clone());
    let v = compiler.value(expr)?;
    let boxed = compiler.program.serialized(v);
    let boxed = compiler.check(expr, boxed)?;
    let k = compiler.program.mask(boxed);
    compiler.program.return_value(boxed, k);
    compiler.finish()
}

/// Compiles independent expressions in parallel, one program each.
///
/// Results are returned in input order.
#[must_use]
pub fn compile_batch(
    exprs: &[Expr],
    encoding: &dyn Encoding,
    config: &CompileConfig,
    output: Output,
) -> Vec<Result<Program>> {
    exprs
        .par_iter()
        .map(|expr| match output {
            Output::Logical => compile_logical(expr, encoding, config),
            Output::Value => compile_value(expr, encoding, config),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encoding::SymbolTable,
        events::EventKind,
        expr::{ArithOp, CmpOp},
        ssa::{Datum, Op},
    };

    fn logical(e: &Expr) -> Result<Program> {
        compile_logical(e, &SymbolTable::new(), &CompileConfig::default())
    }

    #[test]
    fn test_comparison_against_path() {
        let e = Expr::compare(CmpOp::Le, Expr::path("x"), Expr::Float(2.5));
        let p = logical(&e).unwrap();
        assert_eq!(p.count_op(Opcode::CmpLeImmF), 1);
        assert_eq!(p.count_op(Opcode::UnboxF), 1);
        assert_eq!(p.count_op(Opcode::FindSym), 1);
    }

    #[test]
    fn test_path_steps() {
        let symbols = SymbolTable::new();
        let e = Expr::path("a").dot("b").at(3);
        let p = compile_value(&e, &symbols, &CompileConfig::default()).unwrap();
        assert_eq!(p.count_op(Opcode::FindSymIn), 1);
        assert_eq!(p.count_op(Opcode::ListIndex), 1);
        assert!(symbols.lookup("b").is_some());
    }

    #[test]
    fn test_missing_is_false() {
        let p = logical(&Expr::Missing).unwrap();
        let root = p.root().unwrap();
        assert_eq!(p.args(root)[1], Program::FALSE);
    }

    #[test]
    fn test_not_of_integer_is_type_error() {
        let err = logical(&Expr::not(Expr::Integer(3))).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { expected: "logical", .. }));
    }

    #[test]
    fn test_arithmetic_on_string_is_type_error() {
        let e = Expr::arith(ArithOp::Add, Expr::string("a"), Expr::Integer(1));
        let err = compile_value(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("'a'"), "{err}");
    }

    #[test]
    fn test_like_and_regex() {
        let e = Expr::string_match(MatchOp::ILike, Expr::path("name"), "%bob%");
        let p = logical(&e).unwrap();
        assert_eq!(p.count_op(Opcode::LikeCi), 1);

        let e = Expr::string_match(MatchOp::SimilarTo, Expr::path("name"), "a.c%");
        let p = logical(&e).unwrap();
        let root = p.root().unwrap();
        let m = p.args(root)[1];
        match p.imm(m) {
            Some(Immediate::Regex(re)) => assert_eq!(re.as_str(), "^(?:a\\.c.*)$"),
            other => panic!("unexpected immediate {other:?}"),
        }

        let bad = Expr::string_match(MatchOp::RegexMatch, Expr::path("name"), "(");
        assert!(matches!(logical(&bad), Err(Error::Pattern { .. })));
    }

    #[test]
    fn test_like_trailing_escape() {
        let e = Expr::StringMatch {
            op: MatchOp::Like,
            expr: Box::new(Expr::path("s")),
            pattern: "abc\\".to_string(),
            escape: Some('\\'),
        };
        assert!(matches!(logical(&e), Err(Error::Pattern { .. })));
    }

    #[test]
    fn test_unknown_function() {
        let e = Expr::call(Builtin::Unknown("FROB".into()), vec![]);
        let err = compile_value(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "unsupported construct: function FROB");
    }

    #[test]
    fn test_value_of_condition_is_boxed() {
        let e = Expr::compare(CmpOp::Eq, Expr::path("a"), Expr::string("x"));
        let p = compile_value(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap();
        assert_eq!(p.count_op(Opcode::BoxK), 1);
        assert_eq!(p.count_op(Opcode::CmpEqImmV), 1);
    }

    #[test]
    fn test_literal_value_has_no_runtime_nodes() {
        let e = Expr::arith(ArithOp::Mul, Expr::Integer(6), Expr::Integer(7));
        let p = compile_value(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap();
        let root = p.root().unwrap();
        assert_eq!(p.literal_value(p.args(root)[1]), Some(&Datum::Int(42)));
        assert_eq!(p.reachable().len(), 4);
        assert!(p.events().has(EventKind::ConstantFolded));
    }

    #[test]
    fn test_unoptimized_keeps_redundancy() {
        let x = Expr::compare(CmpOp::Gt, Expr::path("x"), Expr::Integer(1));
        let e = Expr::and(x.clone(), x);
        let symbols = SymbolTable::new();
        let raw = compile_logical(&e, &symbols, &CompileConfig::unoptimized()).unwrap();
        let opt = compile_logical(&e, &symbols, &CompileConfig::default()).unwrap();
        assert!(raw.count_op(Opcode::AndK) >= 1);
        assert_eq!(opt.count_op(Opcode::AndK), 0);
        assert!(opt.events().has(EventKind::PassCompleted));
    }

    #[test]
    fn test_batch_preserves_order() {
        let exprs = vec![
            Expr::compare(CmpOp::Gt, Expr::path("a"), Expr::Integer(1)),
            Expr::not(Expr::Integer(3)),
            Expr::path("b"),
        ];
        let symbols = SymbolTable::new();
        let results = compile_batch(&exprs, &symbols, &CompileConfig::default(), Output::Logical);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        let p = results[2].as_ref().unwrap();
        assert_eq!(p.count_op(Opcode::IsTrue), 1);

        let values = compile_batch(&exprs[..1], &symbols, &CompileConfig::default(), Output::Value);
        let p = values[0].as_ref().unwrap();
        assert_eq!(p.op(p.root().unwrap()), Op::Machine(Opcode::RetV));
    }
}
