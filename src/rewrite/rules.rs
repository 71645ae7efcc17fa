//! The peephole rule table.
//!
//! Every rule is a plain function from a node to an optional [`Rewrite`]. Rules only
//! point operands at nodes that already exist or at freshly created leaves (literals and
//! broadcasts), so they cannot introduce cycles.
//!
//! Operand order matters: a rule that matches one operand position of a non-commutative
//! operator never matches the other, and commutative cases are spelled out for both
//! positions.

use std::{collections::HashMap, sync::OnceLock};

use crate::{
    rewrite::Rewrite,
    ssa::{Datum, Immediate, Op, Opcode, Program, ValueId},
};

/// A peephole rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Operator of the nodes the rule inspects
    pub op: Op,
    /// Operand count of the nodes the rule inspects
    pub arity: usize,
    /// Name used by events and [`crate::CompileConfig::disabled_rules`]
    pub name: &'static str,
    /// The rule body
    pub apply: fn(&mut Program, ValueId) -> Option<Rewrite>,
}

impl Rule {
    const fn new(
        op: Opcode,
        arity: usize,
        name: &'static str,
        apply: fn(&mut Program, ValueId) -> Option<Rewrite>,
    ) -> Self {
        Self {
            op: Op::Machine(op),
            arity,
            name,
            apply,
        }
    }
}

/// The rules keyed by `(op, arity)`, in application order.
#[must_use]
pub fn rules_for(op: Op, arity: usize) -> &'static [Rule] {
    static TABLE: OnceLock<HashMap<(Op, usize), Vec<Rule>>> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut map: HashMap<(Op, usize), Vec<Rule>> = HashMap::new();
        for rule in all_rules() {
            map.entry((rule.op, rule.arity)).or_default().push(rule);
        }
        map
    });
    table
        .get(&(op, arity))
        .map_or(&[] as &[Rule], Vec::as_slice)
}

fn all_rules() -> Vec<Rule> {
    use Opcode::*;

    let mut rules = vec![
        Rule::new(AndK, 2, "and.k/self", and_self),
        Rule::new(AndK, 2, "and.k/init", and_init),
        Rule::new(AndK, 2, "and.k/false", and_false),
        Rule::new(OrK, 2, "or.k/self", or_self),
        Rule::new(OrK, 2, "or.k/init", or_init),
        Rule::new(OrK, 2, "or.k/false", or_false),
        Rule::new(OrK, 2, "or.k/absorb", or_absorb),
        Rule::new(AndNotK, 2, "andn.k/self", andn_self),
        Rule::new(AndNotK, 2, "andn.k/init", andn_init),
        Rule::new(AndNotK, 2, "andn.k/false", andn_false),
        Rule::new(XorK, 2, "xor.k/self", xor_self),
        Rule::new(XorK, 2, "xor.k/false", xor_false),
        Rule::new(XnorK, 2, "xnor.k/self", xnor_self),
        Rule::new(XnorK, 2, "xnor.k/init", xnor_init),
        Rule::new(CvtKToI, 2, "cvt.k@i/const", cvt_mask_const),
        Rule::new(CvtKToF, 2, "cvt.k@f/const", cvt_mask_const),
        Rule::new(CvtIToK, 2, "cvt.i@k/broadcast", cvt_broadcast_mask),
        Rule::new(CvtFToK, 2, "cvt.f@k/broadcast", cvt_broadcast_mask),
        Rule::new(BoxK, 2, "box.k/const", box_mask_const),
    ];

    for op in [CmpEqI, CmpLeI, CmpGeI] {
        rules.push(Rule::new(op, 3, "cmp.i/reflexive", cmp_reflexive));
    }
    for op in [CmpLtI, CmpGtI] {
        rules.push(Rule::new(op, 3, "cmp.i/irreflexive", cmp_irreflexive));
    }
    for (op, arity) in [(Concat2, 3), (Concat3, 4), (Concat4, 5)] {
        rules.push(Rule::new(op, arity, "concat/flatten", concat_flatten));
        rules.push(Rule::new(op, arity, "concat/empty", concat_empty));
    }
    for op in [BlendV, BlendF, BlendI, BlendStr] {
        rules.push(Rule::new(op, 4, "blend/const", blend_const));
    }
    for op in [
        AddI, SubI, MulI, DivI, ModI, AndI, OrI, XorI, SllI, SraI, SrlI, AddF, SubF, MulF, DivF,
        ModF,
    ] {
        rules.push(Rule::new(op, 3, "arith/imm", arith_imm));
    }
    for op in [
        AddImmI, SubImmI, MulImmI, DivImmI, OrImmI, XorImmI, SllImmI, SraImmI, SrlImmI, SubImmF,
        MulImmF, DivImmF,
    ] {
        rules.push(Rule::new(op, 2, "imm/identity", imm_identity));
    }
    rules.push(Rule::new(RsubImmI, 2, "rsub.imm.i/zero", rsub_zero));
    for op in [BoxI, BoxF, BoxTs] {
        rules.push(Rule::new(op, 2, "box/broadcast", box_broadcast));
    }

    // vk is a pseudo-op and is keyed directly
    for (name, apply) in [
        ("vk/masked", vk_masked as fn(&mut Program, ValueId) -> Option<Rewrite>),
        ("vk/nested", vk_nested),
    ] {
        rules.push(Rule {
            op: Op::Vk,
            arity: 2,
            name,
            apply,
        });
    }
    rules
}

fn pair(p: &Program, id: ValueId) -> (ValueId, ValueId) {
    let args = p.args(id);
    (args[0], args[1])
}

/// `x` valid on `k`: `x` itself when its mask already is `k`.
fn restrict(p: &Program, x: ValueId, k: ValueId) -> Rewrite {
    if p.mask(x) == k {
        Rewrite::Replace(x)
    } else {
        Rewrite::Clobber(Op::Vk, vec![x, k], None)
    }
}

fn broadcast_imm(p: &Program, id: ValueId) -> Option<Immediate> {
    match p.op(id) {
        Op::Machine(Opcode::BroadcastI | Opcode::BroadcastF | Opcode::BroadcastTs) => {
            p.imm(id).cloned()
        }
        _ => None,
    }
}

// =========================================================================
// Mask algebra
// =========================================================================

fn and_self(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    (a == b).then_some(Rewrite::Replace(a))
}

fn and_init(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    if p.is_init(a) {
        Some(Rewrite::Replace(b))
    } else if p.is_init(b) {
        Some(Rewrite::Replace(a))
    } else {
        None
    }
}

fn and_false(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    if p.is_false(a) {
        Some(Rewrite::Replace(a))
    } else if p.is_false(b) {
        Some(Rewrite::Replace(b))
    } else {
        None
    }
}

fn or_self(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    (a == b).then_some(Rewrite::Replace(a))
}

fn or_init(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    if p.is_init(a) {
        Some(Rewrite::Replace(a))
    } else if p.is_init(b) {
        Some(Rewrite::Replace(b))
    } else {
        None
    }
}

fn or_false(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    if p.is_false(a) {
        Some(Rewrite::Replace(b))
    } else if p.is_false(b) {
        Some(Rewrite::Replace(a))
    } else {
        None
    }
}

/// Returns true if the lanes of `x` are a subset of the lanes of `a` by construction.
fn covered_by(p: &Program, x: ValueId, a: ValueId) -> bool {
    if p.args(x).len() != 2 {
        return false;
    }
    let (l, r) = pair(p, x);
    match p.op(x) {
        Op::Machine(Opcode::AndK) => l == a || r == a,
        Op::Machine(Opcode::AndNotK) => r == a,
        _ => false,
    }
}

fn or_absorb(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    if covered_by(p, b, a) {
        Some(Rewrite::Replace(a))
    } else if covered_by(p, a, b) {
        Some(Rewrite::Replace(b))
    } else {
        None
    }
}

fn andn_self(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    (a == b).then_some(Rewrite::Replace(Program::FALSE))
}

fn andn_init(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, _) = pair(p, id);
    p.is_init(a).then_some(Rewrite::Replace(Program::FALSE))
}

fn andn_false(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    (p.is_false(a) || p.is_false(b)).then_some(Rewrite::Replace(b))
}

fn xor_self(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    (a == b).then_some(Rewrite::Replace(Program::FALSE))
}

fn xor_false(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    if p.is_false(a) {
        Some(Rewrite::Replace(b))
    } else if p.is_false(b) {
        Some(Rewrite::Replace(a))
    } else {
        None
    }
}

fn xnor_self(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    (a == b).then_some(Rewrite::Replace(Program::INIT))
}

fn xnor_init(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (a, b) = pair(p, id);
    if p.is_init(a) {
        Some(Rewrite::Replace(b))
    } else if p.is_init(b) {
        Some(Rewrite::Replace(a))
    } else {
        None
    }
}

// =========================================================================
// Comparisons and conversions
// =========================================================================

// Float compares are left alone: x == x is false for NaN.

fn cmp_reflexive(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let args = p.args(id);
    (args[0] == args[1]).then_some(Rewrite::Replace(args[2]))
}

fn cmp_irreflexive(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let args = p.args(id);
    (args[0] == args[1]).then_some(Rewrite::Replace(Program::FALSE))
}

/// `cvt.k@i` / `cvt.k@f` of a constant mask under the all-valid mask.
fn cvt_mask_const(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (v, k) = pair(p, id);
    if !p.is_init(k) {
        return None;
    }
    let bit = if p.is_init(v) {
        1
    } else if p.is_false(v) {
        0
    } else {
        return None;
    };
    let leaf = match p.op(id) {
        Op::Machine(Opcode::CvtKToI) => p.broadcast_i(bit),
        _ => p.broadcast_f(bit as f64),
    };
    Some(Rewrite::Replace(leaf))
}

/// `cvt.i@k` / `cvt.f@k` of a broadcast: all of the mask or nothing.
fn cvt_broadcast_mask(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (v, k) = pair(p, id);
    let nonzero = match broadcast_imm(p, v)? {
        Immediate::Int(i) => i != 0,
        Immediate::Float(x) => x != 0.0,
        _ => return None,
    };
    Some(Rewrite::Replace(if nonzero { k } else { Program::FALSE }))
}

// =========================================================================
// Strings
// =========================================================================

fn is_empty_string(p: &Program, id: ValueId) -> bool {
    matches!(p.literal_value(id), Some(Datum::String(s)) if s.is_empty())
}

fn concat_opcode(count: usize) -> Option<Opcode> {
    match count {
        2 => Some(Opcode::Concat2),
        3 => Some(Opcode::Concat3),
        4 => Some(Opcode::Concat4),
        _ => None,
    }
}

fn is_concat(p: &Program, id: ValueId) -> bool {
    matches!(
        p.op(id),
        Op::Machine(Opcode::Concat2 | Opcode::Concat3 | Opcode::Concat4)
    )
}

/// Rebuilds a concatenation of `parts` valid on `k`.
fn concat_of(p: &mut Program, parts: Vec<ValueId>, k: ValueId) -> Option<Rewrite> {
    match parts.len() {
        0 => {
            let empty = p.literal(Datum::String(String::new()));
            Some(Rewrite::Clobber(Op::Vk, vec![empty, k], None))
        }
        1 => Some(restrict(p, parts[0], k)),
        n => {
            let op = concat_opcode(n)?;
            let mut args = parts;
            args.push(k);
            Some(Rewrite::Clobber(Op::Machine(op), args, None))
        }
    }
}

fn concat_flatten(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let args = p.args(id).to_vec();
    let (k, operands) = args.split_last()?;
    if !operands.iter().any(|s| is_concat(p, *s)) {
        return None;
    }
    let mut parts = Vec::new();
    for s in operands {
        if is_concat(p, *s) {
            let inner = p.args(*s);
            parts.extend_from_slice(&inner[..inner.len() - 1]);
        } else {
            parts.push(*s);
        }
    }
    parts.retain(|s| !is_empty_string(p, *s));
    if parts.len() > 4 {
        return None;
    }
    concat_of(p, parts, *k)
}

fn concat_empty(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let args = p.args(id).to_vec();
    let (k, operands) = args.split_last()?;
    if !operands.iter().any(|s| is_empty_string(p, *s)) {
        return None;
    }
    let parts: Vec<ValueId> = operands
        .iter()
        .copied()
        .filter(|s| !is_empty_string(p, *s))
        .collect();
    concat_of(p, parts, *k)
}

// =========================================================================
// Masked values and blends
// =========================================================================

fn vk_masked(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (v, k) = pair(p, id);
    (p.mask(v) == k).then_some(Rewrite::Replace(v))
}

fn vk_nested(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (v, k) = pair(p, id);
    if p.op(v) != Op::Vk {
        return None;
    }
    let (inner, _) = pair(p, v);
    Some(Rewrite::Clobber(Op::Vk, vec![inner, k], None))
}

fn blend_const(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let args = p.args(id);
    let (a, b, select, k) = (args[0], args[1], args[2], args[3]);
    let picked = if a == b || p.is_false(select) {
        a
    } else if p.is_init(select) {
        b
    } else {
        return None;
    };
    Some(restrict(p, picked, k))
}

// =========================================================================
// Arithmetic
// =========================================================================

/// Immediate form and reversed immediate form of a register operation.
fn imm_forms(op: Opcode) -> Option<(Opcode, Option<Opcode>)> {
    use Opcode::*;
    Some(match op {
        AddI => (AddImmI, Some(AddImmI)),
        SubI => (SubImmI, Some(RsubImmI)),
        MulI => (MulImmI, Some(MulImmI)),
        DivI => (DivImmI, Some(RdivImmI)),
        ModI => (ModImmI, None),
        AndI => (AndImmI, Some(AndImmI)),
        OrI => (OrImmI, Some(OrImmI)),
        XorI => (XorImmI, Some(XorImmI)),
        SllI => (SllImmI, None),
        SraI => (SraImmI, None),
        SrlI => (SrlImmI, None),
        AddF => (AddImmF, Some(AddImmF)),
        SubF => (SubImmF, Some(RsubImmF)),
        MulF => (MulImmF, Some(MulImmF)),
        DivF => (DivImmF, Some(RdivImmF)),
        ModF => (ModImmF, None),
        _ => return None,
    })
}

fn arith_imm(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let op = p.op(id).opcode()?;
    let (direct, reversed) = imm_forms(op)?;
    let args = p.args(id);
    let (x, y, k) = (args[0], args[1], args[2]);
    if let Some(imm) = broadcast_imm(p, y) {
        return Some(Rewrite::Clobber(Op::Machine(direct), vec![x, k], Some(imm)));
    }
    let reversed = reversed?;
    let imm = broadcast_imm(p, x)?;
    Some(Rewrite::Clobber(Op::Machine(reversed), vec![y, k], Some(imm)))
}

fn imm_identity(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    use Opcode::*;
    let op = p.op(id).opcode()?;
    let imm = p.imm(id)?.clone();
    let identity = match (op, imm) {
        (AddImmI | SubImmI | OrImmI | XorImmI | SllImmI | SraImmI | SrlImmI, Immediate::Int(0)) => {
            true
        }
        (MulImmI | DivImmI, Immediate::Int(1)) => true,
        // x - 0.0 keeps the sign of zero; x + 0.0 does not
        (SubImmF, Immediate::Float(z)) => z.to_bits() == 0.0f64.to_bits(),
        (MulImmF | DivImmF, Immediate::Float(one)) => one == 1.0,
        _ => false,
    };
    if !identity {
        return None;
    }
    let (x, k) = pair(p, id);
    Some(restrict(p, x, k))
}

fn rsub_zero(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    if p.imm(id) != Some(&Immediate::Int(0)) {
        return None;
    }
    let (x, k) = pair(p, id);
    Some(Rewrite::Clobber(Op::Machine(Opcode::NegI), vec![x, k], None))
}

// =========================================================================
// Boxing
// =========================================================================

fn box_broadcast(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (v, k) = pair(p, id);
    let datum = match (p.op(v), broadcast_imm(p, v)?) {
        (Op::Machine(Opcode::BroadcastI), Immediate::Int(i)) => Datum::Int(i),
        (Op::Machine(Opcode::BroadcastTs), Immediate::Int(us)) => Datum::Timestamp(us),
        (Op::Machine(Opcode::BroadcastF), Immediate::Float(x)) => Datum::Float(x),
        _ => return None,
    };
    let lit = p.literal(datum);
    Some(restrict(p, lit, k))
}

fn box_mask_const(p: &mut Program, id: ValueId) -> Option<Rewrite> {
    let (v, k) = pair(p, id);
    if !p.is_init(k) {
        return None;
    }
    let truth = if p.is_init(v) {
        true
    } else if p.is_false(v) {
        false
    } else {
        return None;
    };
    Some(Rewrite::Replace(p.literal(Datum::Bool(truth))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CompileConfig,
        encoding::Symbol,
        events::EventKind,
        ssa::{Field, TypeSet},
    };

    fn field(p: &mut Program, name: &str) -> ValueId {
        p.field(Field {
            name: name.to_string(),
            symbol: Symbol(10),
        })
    }

    fn int_field(p: &mut Program, name: &str) -> (ValueId, ValueId) {
        let a = field(p, name);
        let i = p.coerce_int(a);
        (i.value, i.mask)
    }

    #[test]
    fn test_table_lookup() {
        let and_rules = rules_for(Op::Machine(Opcode::AndK), 2);
        assert_eq!(and_rules.len(), 3);
        assert_eq!(and_rules[0].name, "and.k/self");
        assert!(rules_for(Op::Machine(Opcode::AndK), 3).is_empty());
        assert!(rules_for(Op::Literal, 0).is_empty());
    }

    #[test]
    fn test_and_self() {
        let mut p = Program::default();
        let a = field(&mut p, "a");
        assert_eq!(p.and(a, a), a);
        assert!(p.events().filter_rule("and.k/self").count() >= 1);
    }

    #[test]
    fn test_mask_constants() {
        let mut p = Program::default();
        let a = field(&mut p, "a");
        assert_eq!(p.and(a, Program::INIT), a);
        assert_eq!(p.and(Program::FALSE, a), Program::FALSE);
        assert_eq!(p.or(Program::FALSE, a), a);
        assert_eq!(p.or(a, Program::INIT), Program::INIT);
        assert_eq!(p.and_not(a, a), Program::FALSE);
        assert_eq!(p.and_not(Program::FALSE, a), a);
        assert_eq!(p.xor(a, a), Program::FALSE);
        assert_eq!(p.xnor(Program::INIT, a), a);
    }

    #[test]
    fn test_or_absorb() {
        let mut p = Program::default();
        let a = field(&mut p, "a");
        let b = field(&mut p, "b");
        let ab = p.and(a, b);
        assert_eq!(p.or(a, ab), a);
        assert_eq!(p.or(ab, b), b);
        let only_b = p.and_not(a, b);
        assert_eq!(p.or(b, only_b), b);
        // !b & a is not covered by b
        let only_a = p.and_not(b, a);
        assert_ne!(p.or(b, only_a), b);
    }

    #[test]
    fn test_disabled_rule_does_not_fire() {
        let mut p = Program::new(CompileConfig::default().without_rule("and.k/self"));
        let a = field(&mut p, "a");
        let r = p.and(a, a);
        assert_ne!(r, a);
        assert_eq!(p.op(r), Op::Machine(Opcode::AndK));
    }

    #[test]
    fn test_int_compare_self() {
        let mut p = Program::default();
        let (i, k) = int_field(&mut p, "a");
        let eq = p.ssa(Opcode::CmpEqI, &[i, i, k], None);
        assert_eq!(eq, k);
        let lt = p.ssa(Opcode::CmpLtI, &[i, i, k], None);
        assert!(p.is_false(lt));
        // FALSE where the operand is present, MISSING elsewhere
        assert_eq!(p.not_missing(lt), k);
    }

    #[test]
    fn test_float_compare_self_is_kept() {
        let mut p = Program::default();
        let a = field(&mut p, "a");
        let f = p.coerce_float(a);
        let eq = p.ssa(Opcode::CmpEqF, &[f.value, f.value, f.mask], None);
        assert_eq!(p.op(eq), Op::Machine(Opcode::CmpEqF));
    }

    #[test]
    fn test_broadcast_to_immediate() {
        let mut p = Program::default();
        let (i, k) = int_field(&mut p, "a");
        let three = p.broadcast_i(3);
        let add = p.ssa(Opcode::AddI, &[three, i, k], None);
        assert_eq!(p.op(add), Op::Machine(Opcode::AddImmI));
        assert_eq!(p.args(add), &[i, k]);

        let sub = p.ssa(Opcode::SubI, &[three, i, k], None);
        assert_eq!(p.op(sub), Op::Machine(Opcode::RsubImmI));

        let m = p.ssa(Opcode::ModI, &[three, i, k], None);
        assert_eq!(p.op(m), Op::Machine(Opcode::ModI));
    }

    #[test]
    fn test_immediate_identities() {
        let mut p = Program::default();
        let (i, k) = int_field(&mut p, "a");
        let zero = p.broadcast_i(0);
        assert_eq!(p.ssa(Opcode::AddI, &[i, zero, k], None), i);
        let neg = p.ssa(Opcode::SubI, &[zero, i, k], None);
        assert_eq!(p.op(neg), Op::Machine(Opcode::NegI));

        let a = field(&mut p, "b");
        let f = p.coerce_float(a);
        let fzero = p.broadcast_f(0.0);
        let plus = p.ssa(Opcode::AddF, &[f.value, fzero, f.mask], None);
        assert_eq!(p.op(plus), Op::Machine(Opcode::AddImmF));
        assert_eq!(p.ssa(Opcode::SubF, &[f.value, fzero, f.mask], None), f.value);
    }

    #[test]
    fn test_concat_flattening() {
        let mut p = Program::default();
        let a = field(&mut p, "a");
        let s = p.coerce_str(a);
        let x = p.literal(Datum::String("x".into()));
        let empty = p.literal(Datum::String(String::new()));
        let inner = p.ssa(Opcode::Concat2, &[s.value, x], Some(Immediate::Int(0)));
        // malformed nodes are rejected before any rule sees them
        assert!(p.invalid_message(inner).is_some());

        let inner = p.ssa(Opcode::Concat2, &[s.value, x, s.mask], None);
        let outer = p.ssa(Opcode::Concat3, &[inner, empty, s.value, s.mask], None);
        assert_eq!(p.op(outer), Op::Machine(Opcode::Concat3));
        assert_eq!(p.args(outer), &[s.value, x, s.value, s.mask]);

        let only = p.ssa(Opcode::Concat2, &[empty, s.value, s.mask], None);
        assert_eq!(only, s.value);
    }

    #[test]
    fn test_blend_constant_selector() {
        let mut p = Program::default();
        let a = field(&mut p, "a");
        let b = field(&mut p, "b");
        let k = p.and(a, b);
        let picked = p.ssa(Opcode::BlendV, &[a, b, Program::FALSE, k], None);
        assert_eq!(p.op(picked), Op::Vk);
        assert_eq!(p.args(picked), &[a, k]);
        let same = p.ssa(Opcode::BlendV, &[b, b, a, b], None);
        assert_eq!(same, b);
    }

    #[test]
    fn test_box_broadcast_becomes_literal() {
        let mut p = Program::default();
        let seven = p.broadcast_i(7);
        let boxed = p.ssa(Opcode::BoxI, &[seven, Program::INIT], None);
        assert_eq!(p.literal_value(boxed), Some(&Datum::Int(7)));

        let a = field(&mut p, "a");
        let tag = p.check_tag(a, TypeSet::NUMERIC);
        let restricted = p.ssa(Opcode::BoxI, &[seven, tag], None);
        assert_eq!(p.op(restricted), Op::Vk);

        let t = p.ssa(Opcode::BoxK, &[Program::INIT, Program::INIT], None);
        assert_eq!(p.literal_value(t), Some(&Datum::Bool(true)));
    }

    #[test]
    fn test_cvt_constants() {
        let mut p = Program::default();
        let one = p.ssa(Opcode::CvtKToI, &[Program::INIT, Program::INIT], None);
        assert_eq!(p.imm(one), Some(&Immediate::Int(1)));
        let a = field(&mut p, "a");
        let guarded = p.ssa(Opcode::CvtKToF, &[Program::INIT, a], None);
        assert_eq!(p.op(guarded), Op::Machine(Opcode::CvtKToF));

        let zero = p.broadcast_i(0);
        let never = p.ssa(Opcode::CvtIToK, &[zero, a], None);
        assert!(p.is_false(never));
        assert!(p.events().has(EventKind::RuleApplied));
    }
}
