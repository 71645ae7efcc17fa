//! Shared functionality used by unit tests.
//!
//! [`eval`] runs compiled programs row by row so that lowering and rewriting can be
//! checked against what an expression means rather than against the nodes it produces.

pub(crate) mod eval;

mod semantics {
    use super::eval::{eval_logical, eval_value, row};
    use crate::{
        compile_logical, compile_value,
        config::CompileConfig,
        encoding::SymbolTable,
        expr::{ArithOp, Builtin, CastType, CmpOp, Expr, IsKey, Limb},
        ssa::Datum,
    };

    fn a_rows() -> Vec<Datum> {
        vec![
            row(&[("a", Datum::Int(10))]),
            row(&[("a", Datum::Int(3))]),
            row(&[("a", Datum::Int(-1))]),
            row(&[("b", Datum::Int(7))]),
        ]
    }

    fn gt(field: &str, n: i64) -> Expr {
        Expr::compare(CmpOp::Gt, Expr::path(field), Expr::Integer(n))
    }

    fn logical(e: &Expr, rows: &[Datum]) -> Vec<bool> {
        let symbols = SymbolTable::new();
        let p = compile_logical(e, &symbols, &CompileConfig::default()).unwrap();
        eval_logical(&p, &symbols, rows)
    }

    fn values(e: &Expr, config: &CompileConfig, rows: &[Datum]) -> Vec<Option<Datum>> {
        let symbols = SymbolTable::new();
        let p = compile_value(e, &symbols, config).unwrap();
        eval_value(&p, &symbols, rows)
    }

    #[test]
    fn test_case_first_match_wins() {
        let e = Expr::case(
            vec![
                Limb::new(gt("a", 5), Expr::string("big")),
                Limb::new(gt("a", 0), Expr::string("small")),
            ],
            Some(Expr::string("neg")),
        );
        let got = values(&e, &CompileConfig::default(), &a_rows());
        let text = |s: &str| Some(Datum::String(s.to_string()));
        assert_eq!(got, vec![text("big"), text("small"), text("neg"), text("neg")]);
    }

    #[test]
    fn test_case_without_else_is_missing() {
        let e = Expr::case(vec![Limb::new(gt("a", 5), Expr::path("a"))], None);
        let got = values(&e, &CompileConfig::default(), &a_rows());
        assert_eq!(got, vec![Some(Datum::Int(10)), None, None, None]);
    }

    #[test]
    fn test_not_over_missing() {
        let e = Expr::not(gt("a", 5));
        assert_eq!(logical(&e, &a_rows()), vec![false, true, true, false]);

        let e = Expr::is(IsKey::Missing, Expr::path("a"));
        assert_eq!(logical(&e, &a_rows()), vec![false, false, false, true]);
    }

    #[test]
    fn test_or_with_missing_side() {
        let e = Expr::or(gt("a", 5), gt("b", 5));
        assert_eq!(logical(&e, &a_rows()), vec![true, false, false, true]);

        let e = Expr::and(gt("a", 0), Expr::not(gt("a", 5)));
        assert_eq!(logical(&e, &a_rows()), vec![false, true, false, false]);
    }

    #[test]
    fn test_member_lanes() {
        let e = Expr::member(Expr::path("a"), vec![Datum::Int(3), Datum::Int(-1)]);
        assert_eq!(logical(&e, &a_rows()), vec![false, true, true, false]);
    }

    #[test]
    fn test_member_of_computed_number() {
        let plus_one = Expr::arith(ArithOp::Add, Expr::path("a"), Expr::Integer(1));
        let e = Expr::member(plus_one.clone(), vec![Datum::Int(11), Datum::Int(4)]);
        assert_eq!(logical(&e, &a_rows()), vec![true, true, false, false]);

        let e = Expr::compare(CmpOp::Eq, plus_one, Expr::Integer(11));
        assert_eq!(logical(&e, &a_rows()), vec![true, false, false, false]);
    }

    #[test]
    fn test_hash_lookup_of_computed_number() {
        let e = Expr::call(
            Builtin::HashLookup,
            vec![
                Expr::arith(ArithOp::Mul, Expr::path("a"), Expr::Integer(2)),
                Expr::Integer(20),
                Expr::string("twenty"),
                Expr::Integer(6),
                Expr::string("six"),
            ],
        );
        let got = values(&e, &CompileConfig::default(), &a_rows());
        let text = |s: &str| Some(Datum::String(s.to_string()));
        assert_eq!(got, vec![text("twenty"), text("six"), None, None]);
    }

    #[test]
    fn test_ordering_boxed_strings() {
        let text = |s: &str| Datum::String(s.to_string());
        let rows = vec![
            row(&[("a", text("x")), ("b", text("y"))]),
            row(&[("a", text("z")), ("b", text("y"))]),
            row(&[("a", Datum::Int(1)), ("b", text("y"))]),
        ];
        let lt = Expr::compare(CmpOp::Lt, Expr::path("a"), Expr::path("b"));
        assert_eq!(logical(&lt, &rows), vec![true, false, false]);
        // mixed kinds stay MISSING under NOT
        assert_eq!(logical(&Expr::not(lt), &rows), vec![false, true, false]);

        let ge = Expr::compare(CmpOp::Ge, Expr::path("a"), Expr::path("b"));
        assert_eq!(logical(&ge, &rows), vec![false, true, false]);
    }

    #[test]
    fn test_ordering_boxed_timestamps() {
        let rows = vec![
            row(&[("a", Datum::Timestamp(100)), ("b", Datum::Timestamp(200))]),
            row(&[("a", Datum::Timestamp(300)), ("b", Datum::Timestamp(200))]),
            row(&[("a", Datum::Timestamp(200)), ("b", Datum::Timestamp(200))]),
        ];
        let lt = Expr::compare(CmpOp::Lt, Expr::path("a"), Expr::path("b"));
        assert_eq!(logical(&lt, &rows), vec![true, false, false]);
        let le = Expr::compare(CmpOp::Le, Expr::path("a"), Expr::path("b"));
        assert_eq!(logical(&le, &rows), vec![true, false, true]);
    }

    #[test]
    fn test_ordering_boxed_numbers() {
        let rows = vec![
            row(&[("a", Datum::Int(1)), ("b", Datum::Float(1.5))]),
            row(&[("a", Datum::Int(2)), ("b", Datum::Int(-4))]),
        ];
        let gt = Expr::compare(CmpOp::Gt, Expr::path("a"), Expr::path("b"));
        assert_eq!(logical(&gt, &rows), vec![false, true]);
    }

    #[test]
    fn test_case_returns_field_strings() {
        let text = |s: &str| Datum::String(s.to_string());
        let rows = vec![
            row(&[("a", text("x")), ("b", text("q"))]),
            row(&[("a", text("z")), ("b", text("q"))]),
        ];
        let e = Expr::case(
            vec![Limb::new(
                Expr::compare(CmpOp::Eq, Expr::path("a"), Expr::string("x")),
                Expr::path("a"),
            )],
            Some(Expr::path("b")),
        );
        let got = values(&e, &CompileConfig::default(), &rows);
        assert_eq!(got, vec![Some(text("x")), Some(text("q"))]);
    }

    #[test]
    fn test_hash_lookup_lanes() {
        let e = Expr::call(
            Builtin::HashLookup,
            vec![
                Expr::path("a"),
                Expr::Integer(10),
                Expr::string("ten"),
                Expr::Integer(3),
                Expr::string("three"),
                Expr::string("other"),
            ],
        );
        let got = values(&e, &CompileConfig::default(), &a_rows());
        let text = |s: &str| Some(Datum::String(s.to_string()));
        assert_eq!(got, vec![text("ten"), text("three"), text("other"), None]);
    }

    #[test]
    fn test_arithmetic_lanes() {
        let e = Expr::arith(ArithOp::Add, Expr::path("a"), Expr::Integer(1));
        let got = values(&e, &CompileConfig::default(), &a_rows());
        let numbers: Vec<Option<f64>> = got.iter().map(|d| d.as_ref().and_then(Datum::as_f64)).collect();
        assert_eq!(numbers, vec![Some(11.0), Some(4.0), Some(0.0), None]);
    }

    #[test]
    fn test_cast_boxed_to_integer() {
        let rows = vec![
            row(&[("a", Datum::Float(3.7))]),
            row(&[("a", Datum::Bool(true))]),
            row(&[("a", Datum::String("x".to_string()))]),
        ];
        let e = Expr::cast(Expr::path("a"), CastType::Integer);
        let got = values(&e, &CompileConfig::default(), &rows);
        assert_eq!(got, vec![Some(Datum::Int(4)), Some(Datum::Int(1)), None]);
    }

    #[test]
    fn test_rewriting_preserves_lanes() {
        let e = Expr::case(
            vec![
                Limb::new(Expr::and(gt("a", 0), gt("a", 0)), Expr::path("a")),
                Limb::new(Expr::or(gt("b", 0), Expr::Bool(false)), Expr::Integer(0)),
            ],
            None,
        );
        let rows = a_rows();
        let optimized = values(&e, &CompileConfig::default(), &rows);
        let plain = values(&e, &CompileConfig::unoptimized(), &rows);
        assert_eq!(optimized, plain);
        assert_eq!(optimized[0], Some(Datum::Int(10)));
        assert_eq!(optimized[2], None);
    }
}
