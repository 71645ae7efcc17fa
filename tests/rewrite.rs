//! Rewrite pass integration tests.
//!
//! Programs are compiled through the public entry points and the peephole sweep is
//! checked for its observable effects: redundant mask logic disappears, a second sweep
//! is a no-op, and disabled rules stay silent.

use vexc::prelude::*;

fn gt(field: &str, n: i64) -> Expr {
    Expr::compare(CmpOp::Gt, Expr::path(field), Expr::Integer(n))
}

fn logical(expr: &Expr, config: &CompileConfig) -> Result<Program> {
    compile_logical(expr, &SymbolTable::new(), config)
}

#[test]
fn test_and_of_same_condition_collapses() -> Result<()> {
    let expr = Expr::and(gt("x", 1), gt("x", 1));
    let program = logical(&expr, &CompileConfig::default())?;
    assert_eq!(program.count_op(Opcode::AndK), 0);
    assert_eq!(program.count_op(Opcode::CmpGtImmF), 1);
    Ok(())
}

#[test]
fn test_sweep_is_idempotent() -> Result<()> {
    let expr = Expr::case(
        vec![
            Limb::new(Expr::or(gt("a", 0), gt("a", 0)), Expr::path("a")),
            Limb::new(Expr::Bool(true), Expr::Integer(0)),
        ],
        None,
    );
    let once = compile_value(&expr, &SymbolTable::new(), &CompileConfig::default())?;
    let mut twice = once.clone();

    let changed = RewritePass::new().run(&mut twice)?;
    assert!(!changed);
    assert_eq!(once.to_string(), twice.to_string());
    Ok(())
}

#[test]
fn test_sweep_only_matches_build_time_rewriting() -> Result<()> {
    let expr = Expr::or(
        Expr::and(gt("a", 3), Expr::Bool(true)),
        Expr::and(gt("b", 3), Expr::Bool(false)),
    );
    let eager = logical(&expr, &CompileConfig::default())?;
    let swept = logical(&expr, &CompileConfig::sweep_only())?;
    let plain = logical(&expr, &CompileConfig::unoptimized())?;

    assert_eq!(eager.count_op(Opcode::AndK), 0);
    assert_eq!(swept.count_op(Opcode::AndK), 0);
    assert!(plain.count_op(Opcode::AndK) > 0);
    Ok(())
}

#[test]
fn test_integer_compare_with_itself() -> Result<()> {
    let bits = Expr::arith(ArithOp::BitAnd, Expr::path("flags"), Expr::Integer(6));
    let expr = Expr::compare(CmpOp::Le, bits.clone(), bits);
    let program = logical(&expr, &CompileConfig::default())?;

    assert_eq!(program.count_op(Opcode::CmpLeI), 0);
    assert!(program.events().has(EventKind::RuleApplied));
    Ok(())
}

#[test]
fn test_disabled_rule_stays_silent() -> Result<()> {
    let expr = Expr::and(gt("x", 1), gt("x", 1));
    let config = CompileConfig::default().without_rule("and.k/self");
    let program = logical(&expr, &config)?;

    assert_eq!(program.count_op(Opcode::AndK), 1);
    assert_eq!(program.events().filter_rule("and.k/self").count(), 0);
    Ok(())
}
