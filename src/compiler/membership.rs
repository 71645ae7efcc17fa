//! Constant-set membership and HASH_LOOKUP.
//!
//! Both build a [`HashTable`] at compile time: every constant is encoded through the
//! active [`crate::Encoding`] and keyed by its radix hash. At run time the boxed operand
//! is hashed once per lane and looked up in the table.

use std::sync::Arc;

use crate::{
    compiler::Compiler,
    events::EventKind,
    expr::Expr,
    ssa::{Datum, HashTable, Opcode, Program, ValueId},
    Error, Result,
};

impl Compiler<'_> {
    /// `arg IN (values...)`.
    pub(crate) fn member(&mut self, arg: &Expr, values: &[Datum]) -> Result<ValueId> {
        let v = self.value(arg)?;
        if let Some(d) = self.program.literal_value(v).cloned() {
            let hit = d != Datum::Null && values.iter().any(|c| c.same_value(&d));
            self.program.record(
                EventKind::ConstantFolded,
                v,
                format!("{d} IN {} constants -> {hit}", values.len()),
            );
            return Ok(if hit {
                Program::INIT
            } else if d == Datum::Null {
                Program::FALSE
            } else {
                self.program.known_false()
            });
        }
        if self.is_absent(v) {
            return Ok(Program::FALSE);
        }

        let boxed = self.program.serialized(v);
        let boxed = self.check(arg, boxed)?;
        let k = self.program.mask(boxed);
        if values.is_empty() {
            return Ok(self.program.with_not_missing(Program::FALSE, k));
        }

        let table = Arc::new(HashTable::membership(self.encoding, values));
        let h = self.program.hash_value(boxed);
        let found = self.program.hash_member(h, Arc::clone(&table));
        self.program.record(
            EventKind::HashTableBuilt,
            found,
            format!("membership table with {} keys", table.len()),
        );
        Ok(found)
    }

    /// `HASH_LOOKUP(key, k1, r1, k2, r2, ..., [else])`.
    pub(crate) fn hash_lookup(&mut self, args: &[Expr]) -> Result<ValueId> {
        if args.len() < 3 {
            return Err(Error::Arity {
                expected: 3,
                got: args.len(),
            });
        }
        let mut constants = Vec::with_capacity(args.len() - 1);
        for (i, e) in args[1..].iter().enumerate() {
            let d = e.as_datum().ok_or_else(|| Error::Argument {
                position: i + 2,
                message: format!("expected a constant, found {}", e.kind()),
            })?;
            constants.push(d);
        }
        let otherwise = if constants.len() % 2 == 1 {
            constants.pop()
        } else {
            None
        };
        let pairs: Vec<(Datum, Datum)> = constants
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        let key = self.value(&args[0])?;
        if let Some(d) = self.program.literal_value(key).cloned() {
            let found = pairs
                .iter()
                .find(|(k, _)| k.same_value(&d))
                .map(|(_, r)| r.clone())
                .or(otherwise);
            return Ok(match found {
                Some(r) => self.program.literal(r),
                None => Program::FALSE,
            });
        }
        if self.is_absent(key) {
            return Ok(match otherwise {
                Some(r) => self.program.literal(r),
                None => Program::FALSE,
            });
        }

        let boxed = self.program.serialized(key);
        let boxed = self.check(&args[0], boxed)?;
        let table = Arc::new(HashTable::lookup(self.encoding, &pairs));
        let h = self.program.hash_value(boxed);
        let found = self.program.hash_lookup(h, Arc::clone(&table));
        self.program.record(
            EventKind::HashTableBuilt,
            found,
            format!("lookup table with {} keys", table.len()),
        );

        Ok(match otherwise {
            Some(r) => {
                let fallback = self.program.literal(r);
                let k = self.program.mask(h);
                self.program
                    .blend(Opcode::BlendV, fallback, found, found, k)
            }
            None => found,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        compile_logical, compile_value,
        config::CompileConfig,
        encoding::SymbolTable,
        events::EventKind,
        expr::{Builtin, Expr},
        ssa::{Datum, Immediate, Opcode, Program},
        Error,
    };

    fn ints(values: &[i64]) -> Vec<Datum> {
        values.iter().map(|i| Datum::Int(*i)).collect()
    }

    #[test]
    fn test_member_builds_table() {
        let e = Expr::member(Expr::path("x"), ints(&[1, 2, 3]));
        let p = compile_logical(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap();
        assert_eq!(p.count_op(Opcode::HashValue), 1);
        assert_eq!(p.count_op(Opcode::HashMember), 1);
        assert!(p.events().has(EventKind::HashTableBuilt));
    }

    #[test]
    fn test_member_literal_folds() {
        let symbols = SymbolTable::new();
        let config = CompileConfig::default();
        let hit = compile_logical(&Expr::member(Expr::Integer(2), ints(&[1, 2])), &symbols, &config)
            .unwrap();
        let root = hit.root().unwrap();
        assert_eq!(hit.args(root)[1], Program::INIT);

        let null = compile_logical(&Expr::member(Expr::Null, ints(&[1])), &symbols, &config).unwrap();
        let root = null.root().unwrap();
        assert_eq!(null.args(root)[1], Program::FALSE);
    }

    #[test]
    fn test_member_literal_folds_numbers_by_value() {
        let symbols = SymbolTable::new();
        let config = CompileConfig::default();
        let e = Expr::member(Expr::Float(2.0), ints(&[1, 2]));
        let p = compile_logical(&e, &symbols, &config).unwrap();
        assert_eq!(p.args(p.root().unwrap())[1], Program::INIT);

        let e = Expr::member(Expr::Float(2.5), ints(&[2, 3]));
        let p = compile_logical(&e, &symbols, &config).unwrap();
        assert_ne!(p.args(p.root().unwrap())[1], Program::INIT);
    }

    #[test]
    fn test_hash_lookup_literal_key_matches_by_value() {
        let e = Expr::call(
            Builtin::HashLookup,
            vec![
                Expr::Float(2.0),
                Expr::Integer(1),
                Expr::string("one"),
                Expr::Integer(2),
                Expr::string("two"),
            ],
        );
        let p = compile_value(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap();
        let root = p.root().unwrap();
        assert_eq!(
            p.literal_value(p.args(root)[1]),
            Some(&Datum::String("two".into()))
        );
    }

    #[test]
    fn test_member_of_empty_set() {
        let e = Expr::member(Expr::path("x"), Vec::new());
        let p = compile_logical(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap();
        assert_eq!(p.count_op(Opcode::HashMember), 0);
    }

    #[test]
    fn test_hash_lookup_with_else() {
        let e = Expr::call(
            Builtin::HashLookup,
            vec![
                Expr::path("code"),
                Expr::string("a"),
                Expr::Integer(1),
                Expr::string("b"),
                Expr::Integer(2),
                Expr::Integer(0),
            ],
        );
        let p = compile_value(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap();
        assert_eq!(p.count_op(Opcode::HashLookup), 1);
        assert_eq!(p.count_op(Opcode::BlendV), 1);

        let lookup = p
            .reachable()
            .into_iter()
            .find(|id| p.op(*id).opcode() == Some(Opcode::HashLookup))
            .unwrap();
        let Some(Immediate::Table(table)) = p.imm(lookup) else {
            panic!("lookup without table");
        };
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_hash_lookup_needs_constants() {
        let e = Expr::call(
            Builtin::HashLookup,
            vec![Expr::path("code"), Expr::path("other"), Expr::Integer(1)],
        );
        let err = compile_value(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("argument 2"));

        let e = Expr::call(Builtin::HashLookup, vec![Expr::path("code")]);
        let err = compile_value(&e, &SymbolTable::new(), &CompileConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Builtin { ref source, .. } if matches!(**source, Error::Arity { expected: 3, got: 1 })
        ));
    }
}
