//! Typed construction helpers on top of [`Program::ssa`].
//!
//! The compiler never picks opcodes by hand for the common operations. It goes through
//! these helpers, which choose the representation-specific opcode from the static types
//! of the operands, insert the conversions and tag checks a representation change needs,
//! and fold literal-only operations.
//!
//! # Three-valued logic
//!
//! A boolean node is a truth mask: lanes where it is set are TRUE. Lanes outside its
//! not-missing set ([`Program::not_missing`]) are MISSING, the rest are FALSE. The plain
//! mask algebra ([`Program::and`], [`Program::or`], ...) works on truth lanes only. The
//! `logic_*` helpers and [`Program::not`] implement SQL semantics by attaching the
//! correct not-missing set to their result.

use std::{cmp::Ordering, sync::Arc};

use crate::{
    events::EventKind,
    expr::{ArithOp, CmpOp},
    ssa::{
        opcode::{Op, Opcode},
        radix::HashTable,
        types::{SsaType, TypeSet},
        value::{Datum, Field, Immediate, MaskedValue, ValueId},
        Program,
    },
};

impl Program {
    // =========================================================================
    // Mask algebra
    // =========================================================================

    /// Lanes set in both `a` and `b`.
    pub fn and(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.ssa(Opcode::AndK, &[a, b], None)
    }

    /// Lanes set in `a` or `b`.
    pub fn or(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.ssa(Opcode::OrK, &[a, b], None)
    }

    /// Lanes set in `b` but not in `a`.
    pub fn and_not(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.ssa(Opcode::AndNotK, &[a, b], None)
    }

    /// Lanes set in exactly one of `a` and `b`.
    pub fn xor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.ssa(Opcode::XorK, &[a, b], None)
    }

    /// Lanes set in both or neither of `a` and `b`.
    pub fn xnor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.ssa(Opcode::XnorK, &[a, b], None)
    }

    /// Not-missing set of the mask-logic node `op(a, b)`.
    pub(crate) fn derive_not_missing(&mut self, op: Opcode, a: ValueId, b: ValueId) -> ValueId {
        if a == b {
            return self.not_missing(a);
        }
        let nma = self.not_missing(a);
        let nmb = self.not_missing(b);
        let both = self.and(nma, nmb);
        match op {
            // FALSE on either side decides AND
            Opcode::AndK => {
                let fa = self.and_not(a, nma);
                let fb = self.and_not(b, nmb);
                let decided = self.or(fa, fb);
                self.or(both, decided)
            }
            // TRUE on either side decides OR
            Opcode::OrK => {
                let decided = self.or(a, b);
                self.or(both, decided)
            }
            Opcode::AndNotK => {
                let fb = self.and_not(b, nmb);
                let decided = self.or(a, fb);
                self.or(both, decided)
            }
            _ => both,
        }
    }

    // =========================================================================
    // Three-valued logic
    // =========================================================================

    /// The constant FALSE: no lane set, no lane missing.
    pub fn known_false(&mut self) -> ValueId {
        self.with_not_missing(Self::FALSE, Self::INIT)
    }

    /// Returns true if `id` is FALSE on every lane, as opposed to MISSING.
    #[must_use]
    pub fn is_known_false(&self, id: ValueId) -> bool {
        self.is_false(id) && self.node(id).not_missing_override() == Some(Self::INIT)
    }

    /// SQL `a AND b`.
    pub fn logic_and(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let nm = self.derive_not_missing(Opcode::AndK, a, b);
        self.ssa_not_missing(Opcode::AndK, &[a, b], None, nm)
    }

    /// SQL `a OR b`.
    pub fn logic_or(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let nm = self.derive_not_missing(Opcode::OrK, a, b);
        self.ssa_not_missing(Opcode::OrK, &[a, b], None, nm)
    }

    /// Boolean inequality; MISSING if either side is.
    pub fn logic_xor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.logic_parity(Opcode::XorK, a, b)
    }

    /// Boolean equality; MISSING if either side is.
    pub fn logic_xnor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.logic_parity(Opcode::XnorK, a, b)
    }

    fn logic_parity(&mut self, op: Opcode, a: ValueId, b: ValueId) -> ValueId {
        let nma = self.not_missing(a);
        let nmb = self.not_missing(b);
        let nm = self.and(nma, nmb);
        let raw = self.ssa(op, &[a, b], None);
        self.ssa_not_missing(Opcode::AndK, &[raw, nm], None, nm)
    }

    /// SQL `NOT v`: TRUE exactly where `v` is FALSE.
    pub fn not(&mut self, v: ValueId) -> ValueId {
        let nm = self.not_missing(v);
        if self.is_init(v) {
            return self.with_not_missing(Self::FALSE, nm);
        }
        if self.is_false(v) {
            return self.with_not_missing(nm, nm);
        }
        self.ssa_not_missing(Opcode::AndNotK, &[v, nm], None, nm)
    }

    // =========================================================================
    // IS predicates (never missing)
    // =========================================================================

    /// `v IS TRUE`.
    pub fn pred_is_true(&mut self, v: ValueId) -> ValueId {
        if let Some(d) = self.literal_value(v) {
            let hit = matches!(d, Datum::Bool(true));
            return self.fold_predicate(hit);
        }
        match self.primary(v) {
            SsaType::BOOL => self.with_not_missing(v, Self::INIT),
            SsaType::VALUE => self.value_predicate(Opcode::IsTrue, v),
            _ => self.known_false(),
        }
    }

    /// `v IS FALSE`.
    pub fn pred_is_false(&mut self, v: ValueId) -> ValueId {
        if let Some(d) = self.literal_value(v) {
            let hit = matches!(d, Datum::Bool(false));
            return self.fold_predicate(hit);
        }
        match self.primary(v) {
            SsaType::BOOL => {
                let nm = self.not_missing(v);
                self.ssa_not_missing(Opcode::AndNotK, &[v, nm], None, Self::INIT)
            }
            SsaType::VALUE => self.value_predicate(Opcode::IsFalse, v),
            _ => self.known_false(),
        }
    }

    /// `v IS NOT TRUE`.
    pub fn pred_is_not_true(&mut self, v: ValueId) -> ValueId {
        let t = self.pred_is_true(v);
        self.not(t)
    }

    /// `v IS NOT FALSE`.
    pub fn pred_is_not_false(&mut self, v: ValueId) -> ValueId {
        let f = self.pred_is_false(v);
        self.not(f)
    }

    /// `v IS NULL`.
    pub fn pred_is_null(&mut self, v: ValueId) -> ValueId {
        if let Some(d) = self.literal_value(v) {
            let hit = matches!(d, Datum::Null);
            return self.fold_predicate(hit);
        }
        match self.primary(v) {
            SsaType::VALUE => self.value_predicate(Opcode::IsNull, v),
            _ => self.known_false(),
        }
    }

    /// `v IS NOT NULL`.
    pub fn pred_is_not_null(&mut self, v: ValueId) -> ValueId {
        if let Some(d) = self.literal_value(v) {
            let hit = !matches!(d, Datum::Null);
            return self.fold_predicate(hit);
        }
        match self.primary(v) {
            SsaType::BOOL => {
                let nm = self.not_missing(v);
                self.with_not_missing(nm, Self::INIT)
            }
            SsaType::VALUE => self.value_predicate(Opcode::IsNotNull, v),
            _ => {
                let k = self.mask(v);
                self.with_not_missing(k, Self::INIT)
            }
        }
    }

    /// `v IS NOT MISSING`.
    pub fn pred_is_not_missing(&mut self, v: ValueId) -> ValueId {
        let nm = self.not_missing(v);
        self.with_not_missing(nm, Self::INIT)
    }

    /// `v IS MISSING`.
    pub fn pred_is_missing(&mut self, v: ValueId) -> ValueId {
        let present = self.pred_is_not_missing(v);
        self.not(present)
    }

    fn fold_predicate(&mut self, hit: bool) -> ValueId {
        if hit {
            Self::INIT
        } else {
            self.known_false()
        }
    }

    fn value_predicate(&mut self, op: Opcode, v: ValueId) -> ValueId {
        let k = self.mask(v);
        self.ssa_not_missing(op, &[v, k], None, Self::INIT)
    }

    // =========================================================================
    // Representation changes
    // =========================================================================

    /// Restricts the boxed `v` to lanes whose tag is in `types`.
    pub fn check_tag(&mut self, v: ValueId, types: TypeSet) -> ValueId {
        let k = self.mask(v);
        self.ssa(Opcode::CheckTag, &[v, k], Some(Immediate::Types(types)))
    }

    /// Replaces symbol references in the boxed `v` by their string payloads.
    pub fn unsymbolize(&mut self, v: ValueId) -> ValueId {
        let k = self.mask(v);
        self.ssa(Opcode::Unsymbolize, &[v, k], None)
    }

    /// A float register holding `x` on every lane.
    pub fn broadcast_f(&mut self, x: f64) -> ValueId {
        self.ssa(Opcode::BroadcastF, &[], Some(Immediate::Float(x)))
    }

    /// An int register holding `i` on every lane.
    pub fn broadcast_i(&mut self, i: i64) -> ValueId {
        self.ssa(Opcode::BroadcastI, &[], Some(Immediate::Int(i)))
    }

    /// A timestamp register holding `us` on every lane.
    pub fn broadcast_ts(&mut self, us: i64) -> ValueId {
        self.ssa(Opcode::BroadcastTs, &[], Some(Immediate::Int(us)))
    }

    /// `v` as a float register.
    pub fn coerce_float(&mut self, v: ValueId) -> MaskedValue {
        if let Some(d) = self.literal_value(v) {
            return match d.as_f64() {
                Some(x) => MaskedValue::new(self.broadcast_f(x), Self::INIT),
                None => {
                    let msg = format!("{d} is not a number");
                    MaskedValue::new(self.invalid(msg), Self::INIT)
                }
            };
        }
        let k = self.mask(v);
        match self.primary(v) {
            SsaType::FLOAT => MaskedValue::new(v, k),
            SsaType::INT => MaskedValue::new(self.ssa(Opcode::CvtIToF, &[v, k], None), k),
            SsaType::BOOL => {
                let nm = self.not_missing(v);
                MaskedValue::new(self.ssa(Opcode::CvtKToF, &[v, nm], None), nm)
            }
            SsaType::VALUE => {
                let ck = self.check_tag(v, TypeSet::NUMERIC);
                MaskedValue::new(self.ssa(Opcode::UnboxF, &[ck, ck], None), ck)
            }
            other => {
                let msg = format!("cannot use {other} as float");
                MaskedValue::new(self.invalid(msg), Self::INIT)
            }
        }
    }

    /// `v` as an int register; floats round to the nearest integer.
    pub fn coerce_int(&mut self, v: ValueId) -> MaskedValue {
        if let Some(d) = self.literal_value(v) {
            let i = match d {
                Datum::Timestamp(us) => Some(*us),
                other => other.as_i64(),
            };
            return match i {
                Some(i) => MaskedValue::new(self.broadcast_i(i), Self::INIT),
                None => {
                    let msg = format!("{d} is not an integer");
                    MaskedValue::new(self.invalid(msg), Self::INIT)
                }
            };
        }
        let k = self.mask(v);
        match self.primary(v) {
            SsaType::INT => MaskedValue::new(v, k),
            SsaType::FLOAT => MaskedValue::new(self.ssa(Opcode::CvtFToI, &[v, k], None), k),
            SsaType::TIME => MaskedValue::new(self.ssa(Opcode::CvtTsToI, &[v, k], None), k),
            SsaType::BOOL => {
                let nm = self.not_missing(v);
                MaskedValue::new(self.ssa(Opcode::CvtKToI, &[v, nm], None), nm)
            }
            SsaType::VALUE => {
                let ck = self.check_tag(v, TypeSet::NUMERIC);
                MaskedValue::new(self.ssa(Opcode::UnboxI, &[ck, ck], None), ck)
            }
            other => {
                let msg = format!("cannot use {other} as integer");
                MaskedValue::new(self.invalid(msg), Self::INIT)
            }
        }
    }

    /// `v` as a timestamp register.
    pub fn coerce_time(&mut self, v: ValueId) -> MaskedValue {
        if let Some(d) = self.literal_value(v) {
            return match d {
                Datum::Timestamp(us) => {
                    let us = *us;
                    MaskedValue::new(self.broadcast_ts(us), Self::INIT)
                }
                other => {
                    let msg = format!("{other} is not a timestamp");
                    MaskedValue::new(self.invalid(msg), Self::INIT)
                }
            };
        }
        let k = self.mask(v);
        match self.primary(v) {
            SsaType::TIME => MaskedValue::new(v, k),
            SsaType::VALUE => {
                let ck = self.check_tag(v, TypeSet::TIMESTAMP);
                MaskedValue::new(self.ssa(Opcode::UnboxTs, &[ck, ck], None), ck)
            }
            other => {
                let msg = format!("cannot use {other} as timestamp");
                MaskedValue::new(self.invalid(msg), Self::INIT)
            }
        }
    }

    /// `v` as a string register. String literals are usable as string operands directly.
    pub fn coerce_str(&mut self, v: ValueId) -> MaskedValue {
        if let Some(d) = self.literal_value(v) {
            return match d {
                Datum::String(_) => MaskedValue::new(v, Self::INIT),
                other => {
                    let msg = format!("{other} is not a string");
                    MaskedValue::new(self.invalid(msg), Self::INIT)
                }
            };
        }
        let k = self.mask(v);
        match self.primary(v) {
            SsaType::STRING => MaskedValue::new(v, k),
            SsaType::VALUE => {
                let ck = self.check_tag(v, TypeSet::TEXT);
                let plain = self.ssa(Opcode::Unsymbolize, &[ck, ck], None);
                MaskedValue::new(self.ssa(Opcode::UnboxStr, &[plain, ck], None), ck)
            }
            other => {
                let msg = format!("cannot use {other} as string");
                MaskedValue::new(self.invalid(msg), Self::INIT)
            }
        }
    }

    /// The boxed form of `v`, valid on the lanes where `v` is not missing.
    pub fn serialized(&mut self, v: ValueId) -> ValueId {
        if self.is_literal(v) {
            return v;
        }
        let k = self.mask(v);
        match self.primary(v) {
            SsaType::VALUE => v,
            SsaType::BOOL => {
                let nm = self.not_missing(v);
                self.ssa(Opcode::BoxK, &[v, nm], None)
            }
            SsaType::INT => self.ssa(Opcode::BoxI, &[v, k], None),
            SsaType::FLOAT => self.ssa(Opcode::BoxF, &[v, k], None),
            SsaType::STRING => self.ssa(Opcode::BoxStr, &[v, k], None),
            SsaType::TIME => self.ssa(Opcode::BoxTs, &[v, k], None),
            other => self.invalid(format!("cannot box {other}")),
        }
    }

    /// `v` restricted to the lanes of `k`, which must be a subset of its mask.
    pub fn vk(&mut self, v: ValueId, k: ValueId) -> ValueId {
        if self.mask(v) == k {
            return v;
        }
        self.ssa(Op::Vk, &[v, k], None)
    }

    /// `op(a, b, select, k)`: `b` where `select` is set, `a` elsewhere, valid on `k`.
    pub fn blend(
        &mut self,
        op: Opcode,
        a: ValueId,
        b: ValueId,
        select: ValueId,
        k: ValueId,
    ) -> ValueId {
        self.ssa(op, &[a, b, select, k], None)
    }

    // =========================================================================
    // Comparisons
    // =========================================================================

    /// `a op b` with SQL semantics: MISSING where either side is.
    pub fn compare(&mut self, op: CmpOp, a: ValueId, b: ValueId) -> ValueId {
        if op == CmpOp::Ne {
            let eq = self.compare(CmpOp::Eq, a, b);
            return self.not(eq);
        }
        if self.is_null_or_missing(a) || self.is_null_or_missing(b) {
            return Self::FALSE;
        }

        match (self.literal_value(a).cloned(), self.literal_value(b).cloned()) {
            (Some(x), Some(y)) => self.fold_compare(op, &x, &y),
            (Some(x), None) => self.compare_imm(op.flip(), b, x),
            (None, Some(y)) => self.compare_imm(op, a, y),
            (None, None) => self.compare_regs(op, a, b),
        }
    }

    pub(crate) fn is_null_or_missing(&self, v: ValueId) -> bool {
        matches!(self.literal_value(v), Some(Datum::Null))
            || (self.is_false(v) && self.node(v).not_missing_override().is_none())
    }

    fn fold_compare(&mut self, op: CmpOp, x: &Datum, y: &Datum) -> ValueId {
        let ordering = match (x, y) {
            (Datum::Int(a), Datum::Int(b)) | (Datum::Timestamp(a), Datum::Timestamp(b)) => {
                Some(a.cmp(b))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(a, b)| a.partial_cmp(&b)),
            (Datum::String(a), Datum::String(b)) => Some(a.cmp(b)),
            (Datum::Bool(a), Datum::Bool(b)) => Some(a.cmp(b)),
            (a, b) if op == CmpOp::Eq => Some(if a == b {
                Ordering::Equal
            } else {
                Ordering::Less
            }),
            _ => None,
        };
        let result = match ordering {
            Some(ord) => {
                let hit = match op {
                    CmpOp::Eq => ord == Ordering::Equal,
                    CmpOp::Ne => ord != Ordering::Equal,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Ge => ord != Ordering::Less,
                };
                self.fold_predicate(hit)
            }
            None => Self::FALSE,
        };
        self.record(
            EventKind::ConstantFolded,
            result,
            format!("{x} {} {y}", op.symbol()),
        );
        result
    }

    fn compare_imm(&mut self, op: CmpOp, a: ValueId, lit: Datum) -> ValueId {
        let k = self.mask(a);
        match (self.primary(a), &lit) {
            (SsaType::INT, Datum::Int(i)) => {
                self.ssa(cmp_imm_i(op), &[a, k], Some(Immediate::Int(*i)))
            }
            (SsaType::INT | SsaType::FLOAT, d) if d.is_numeric() => {
                let f = self.coerce_float(a);
                let x = d.as_f64().unwrap_or_default();
                self.ssa(cmp_imm_f(op), &[f.value, f.mask], Some(Immediate::Float(x)))
            }
            (SsaType::TIME, Datum::Timestamp(us)) => {
                self.ssa(cmp_imm_i(op), &[a, k], Some(Immediate::Int(*us)))
            }
            (SsaType::STRING, Datum::String(s)) => {
                if op == CmpOp::Eq {
                    self.ssa(Opcode::CmpEqImmStr, &[a, k], Some(Immediate::Text(s.clone())))
                } else {
                    let s = self.literal(lit.clone());
                    self.ssa(cmp_str(op), &[a, s, k], None)
                }
            }
            (SsaType::VALUE, _) if op == CmpOp::Eq => {
                self.ssa(Opcode::CmpEqImmV, &[a, k], Some(Immediate::Datum(lit.clone())))
            }
            (SsaType::VALUE, d) if d.is_numeric() => {
                let f = self.coerce_float(a);
                let x = d.as_f64().unwrap_or_default();
                self.ssa(cmp_imm_f(op), &[f.value, f.mask], Some(Immediate::Float(x)))
            }
            (SsaType::VALUE, Datum::String(_)) => {
                let s = self.coerce_str(a);
                let l = self.literal(lit.clone());
                self.ssa(cmp_str(op), &[s.value, l, s.mask], None)
            }
            (SsaType::VALUE, Datum::Timestamp(us)) => {
                let t = self.coerce_time(a);
                self.ssa(cmp_imm_i(op), &[t.value, t.mask], Some(Immediate::Int(*us)))
            }
            (SsaType::BOOL, Datum::Bool(t)) if op == CmpOp::Eq => {
                if *t {
                    a
                } else {
                    self.not(a)
                }
            }
            _ => self.never_comparable(op, k),
        }
    }

    fn compare_regs(&mut self, op: CmpOp, a: ValueId, b: ValueId) -> ValueId {
        let (ta, tb) = (self.primary(a), self.primary(b));
        let numeric = SsaType::INT | SsaType::FLOAT;
        match (ta, tb) {
            (SsaType::INT, SsaType::INT) | (SsaType::TIME, SsaType::TIME) => {
                let k = self.joint_mask(a, b);
                self.ssa(cmp_i(op), &[a, b, k], None)
            }
            (SsaType::VALUE, SsaType::VALUE) if op == CmpOp::Eq => {
                let k = self.joint_mask(a, b);
                self.ssa(Opcode::CmpEqV, &[a, b, k], None)
            }
            // Two boxed values may hold strings or timestamps; order them without unboxing.
            (SsaType::VALUE, SsaType::VALUE) => {
                let k = self.ordered_mask(a, b);
                let order = self.ssa(Opcode::CmpV, &[a, b, k], None);
                let valid = self.mask(order);
                self.ssa(cmp_imm_i(op), &[order, valid], Some(Immediate::Int(0)))
            }
            (x, y) if (numeric | SsaType::VALUE).contains(x | y) => {
                let fa = self.coerce_float(a);
                let fb = self.coerce_float(b);
                let k = self.and(fa.mask, fb.mask);
                self.ssa(cmp_f(op), &[fa.value, fb.value, k], None)
            }
            (x, y) if (SsaType::STRING | SsaType::VALUE).contains(x | y) => {
                let sa = self.coerce_str(a);
                let sb = self.coerce_str(b);
                let k = self.and(sa.mask, sb.mask);
                self.ssa(cmp_str(op), &[sa.value, sb.value, k], None)
            }
            (x, y) if (SsaType::TIME | SsaType::VALUE).contains(x | y) => {
                let ta = self.coerce_time(a);
                let tb = self.coerce_time(b);
                let k = self.and(ta.mask, tb.mask);
                self.ssa(cmp_i(op), &[ta.value, tb.value, k], None)
            }
            (SsaType::BOOL, SsaType::BOOL) if op == CmpOp::Eq => self.logic_xnor(a, b),
            _ => {
                let k = self.joint_mask(a, b);
                self.never_comparable(op, k)
            }
        }
    }

    /// Result of comparing values of kinds that never compare: FALSE for equality where
    /// both sides are present, MISSING otherwise.
    fn never_comparable(&mut self, op: CmpOp, k: ValueId) -> ValueId {
        if op == CmpOp::Eq {
            self.with_not_missing(Self::FALSE, k)
        } else {
            Self::FALSE
        }
    }

    /// Lanes where the boxed `a` and `b` hold values of the same ordered kind.
    fn ordered_mask(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let kinds = [TypeSet::NUMERIC, TypeSet::TEXT, TypeSet::TIMESTAMP, TypeSet::BOOL];
        let mut k = None;
        for types in kinds {
            let ka = self.check_tag(a, types);
            let kb = self.check_tag(b, types);
            let both = self.and(ka, kb);
            k = Some(match k {
                Some(acc) => self.or(acc, both),
                None => both,
            });
        }
        k.unwrap_or(Self::FALSE)
    }

    fn joint_mask(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ka = self.mask(a);
        let kb = self.mask(b);
        self.and(ka, kb)
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    /// `a op b`. Integer operands use the int opcodes; anything else is computed as
    /// float. Bitwise operators always work on ints.
    pub fn arith(&mut self, op: ArithOp, a: ValueId, b: ValueId) -> ValueId {
        if self.is_null_or_missing(a) || self.is_null_or_missing(b) {
            return Self::FALSE;
        }
        if let (Some(x), Some(y)) = (self.literal_value(a), self.literal_value(b)) {
            if let Some(folded) = fold_arith(op, x, y) {
                let msg = format!("{x} {} {y} -> {folded}", op.symbol());
                let result = self.literal(folded);
                self.record(EventKind::ConstantFolded, result, msg);
                return result;
            }
        }

        if op.is_bitwise() || (self.is_int_like(a) && self.is_int_like(b)) {
            let ia = self.coerce_int(a);
            let ib = self.coerce_int(b);
            let k = self.and(ia.mask, ib.mask);
            self.ssa(arith_i(op), &[ia.value, ib.value, k], None)
        } else {
            let fa = self.coerce_float(a);
            let fb = self.coerce_float(b);
            let k = self.and(fa.mask, fb.mask);
            self.ssa(arith_f(op), &[fa.value, fb.value, k], None)
        }
    }

    pub(crate) fn is_int_like(&self, v: ValueId) -> bool {
        match self.literal_value(v) {
            Some(d) => matches!(d, Datum::Int(_)),
            None => self.primary(v) == SsaType::INT,
        }
    }

    /// `-v`.
    pub fn neg(&mut self, v: ValueId) -> ValueId {
        match self.literal_value(v) {
            Some(Datum::Int(i)) if *i != i64::MIN => {
                let i = *i;
                return self.literal(Datum::Int(-i));
            }
            Some(Datum::Float(x)) => {
                let x = *x;
                return self.literal(Datum::Float(-x));
            }
            _ => {}
        }
        if self.is_int_like(v) {
            let i = self.coerce_int(v);
            self.ssa(Opcode::NegI, &[i.value, i.mask], None)
        } else {
            self.unary_float(Opcode::NegF, v)
        }
    }

    /// `~v`.
    pub fn bit_not(&mut self, v: ValueId) -> ValueId {
        if let Some(Datum::Int(i)) = self.literal_value(v) {
            let i = *i;
            return self.literal(Datum::Int(!i));
        }
        self.unary_int(Opcode::NotI, v)
    }

    /// A float-to-float operation such as `sqrt.f`.
    pub fn unary_float(&mut self, op: Opcode, v: ValueId) -> ValueId {
        let f = self.coerce_float(v);
        self.ssa(op, &[f.value, f.mask], None)
    }

    /// An int-to-int operation such as `bitcount.i`.
    pub fn unary_int(&mut self, op: Opcode, v: ValueId) -> ValueId {
        let i = self.coerce_int(v);
        self.ssa(op, &[i.value, i.mask], None)
    }

    /// `ABS(v)`, staying in the int domain for int operands.
    pub fn abs(&mut self, v: ValueId) -> ValueId {
        if self.is_int_like(v) {
            self.unary_int(Opcode::AbsI, v)
        } else {
            self.unary_float(Opcode::AbsF, v)
        }
    }

    /// `SIGN(v)`, staying in the int domain for int operands.
    pub fn sign(&mut self, v: ValueId) -> ValueId {
        if self.is_int_like(v) {
            self.unary_int(Opcode::SignI, v)
        } else {
            self.unary_float(Opcode::SignF, v)
        }
    }

    /// `LEAST(a, b)` or `GREATEST(a, b)`.
    pub fn min_max(&mut self, least: bool, a: ValueId, b: ValueId) -> ValueId {
        if self.is_int_like(a) && self.is_int_like(b) {
            let op = if least { Opcode::MinI } else { Opcode::MaxI };
            let ia = self.coerce_int(a);
            let ib = self.coerce_int(b);
            let k = self.and(ia.mask, ib.mask);
            self.ssa(op, &[ia.value, ib.value, k], None)
        } else {
            let op = if least { Opcode::MinF } else { Opcode::MaxF };
            self.binary_float(op, a, b)
        }
    }

    /// A float-by-float operation such as `pow.f`.
    pub fn binary_float(&mut self, op: Opcode, a: ValueId, b: ValueId) -> ValueId {
        let fa = self.coerce_float(a);
        let fb = self.coerce_float(b);
        let k = self.and(fa.mask, fb.mask);
        self.ssa(op, &[fa.value, fb.value, k], None)
    }

    // =========================================================================
    // Structure access and hashing
    // =========================================================================

    /// Top-level field lookup.
    pub fn field(&mut self, field: Field) -> ValueId {
        self.ssa(Opcode::FindSym, &[Self::INIT], Some(Immediate::Field(field)))
    }

    /// Field lookup inside the struct `v`.
    pub fn field_in(&mut self, v: ValueId, field: Field) -> ValueId {
        let k = self.mask(v);
        self.ssa(Opcode::FindSymIn, &[v, k], Some(Immediate::Field(field)))
    }

    /// Element `index` of the list `v`.
    pub fn index(&mut self, v: ValueId, index: i64) -> ValueId {
        let k = self.mask(v);
        self.ssa(Opcode::ListIndex, &[v, k], Some(Immediate::Int(index)))
    }

    /// Per-lane hash of the boxed `v`.
    pub fn hash_value(&mut self, v: ValueId) -> ValueId {
        let k = self.mask(v);
        self.ssa(Opcode::HashValue, &[v, k], None)
    }

    /// Lanes whose hash `h` is a key of `table`.
    pub fn hash_member(&mut self, h: ValueId, table: Arc<HashTable>) -> ValueId {
        let k = self.mask(h);
        self.ssa(Opcode::HashMember, &[h, k], Some(Immediate::Table(table)))
    }

    /// The result stored in `table` for hash `h`; self-masked to the found lanes.
    pub fn hash_lookup(&mut self, h: ValueId, table: Arc<HashTable>) -> ValueId {
        let k = self.mask(h);
        self.ssa(Opcode::HashLookup, &[h, k], Some(Immediate::Table(table)))
    }
}

fn fold_arith(op: ArithOp, x: &Datum, y: &Datum) -> Option<Datum> {
    if let (Datum::Int(a), Datum::Int(b)) = (x, y) {
        let (a, b) = (*a, *b);
        let shift = u32::try_from(b).ok();
        let r = match op {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div => a.checked_div(b),
            ArithOp::Mod => a.checked_rem(b),
            ArithOp::BitAnd => Some(a & b),
            ArithOp::BitOr => Some(a | b),
            ArithOp::BitXor => Some(a ^ b),
            ArithOp::Shl => shift.and_then(|s| a.checked_shl(s)),
            ArithOp::Sra => shift.and_then(|s| a.checked_shr(s)),
            ArithOp::Srl => shift.and_then(|s| (a as u64).checked_shr(s)).map(|v| v as i64),
        };
        return r.map(Datum::Int);
    }
    if op.is_bitwise() {
        return None;
    }
    let (a, b) = (x.as_f64()?, y.as_f64()?);
    if matches!(op, ArithOp::Div | ArithOp::Mod) && b == 0.0 {
        return None;
    }
    let r = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        _ => a % b,
    };
    Some(Datum::Float(r))
}

fn arith_i(op: ArithOp) -> Opcode {
    match op {
        ArithOp::Add => Opcode::AddI,
        ArithOp::Sub => Opcode::SubI,
        ArithOp::Mul => Opcode::MulI,
        ArithOp::Div => Opcode::DivI,
        ArithOp::Mod => Opcode::ModI,
        ArithOp::BitAnd => Opcode::AndI,
        ArithOp::BitOr => Opcode::OrI,
        ArithOp::BitXor => Opcode::XorI,
        ArithOp::Shl => Opcode::SllI,
        ArithOp::Sra => Opcode::SraI,
        ArithOp::Srl => Opcode::SrlI,
    }
}

fn arith_f(op: ArithOp) -> Opcode {
    match op {
        ArithOp::Add => Opcode::AddF,
        ArithOp::Sub => Opcode::SubF,
        ArithOp::Mul => Opcode::MulF,
        ArithOp::Div => Opcode::DivF,
        _ => Opcode::ModF,
    }
}

// Ne is lowered as NOT Eq before any of these are consulted.

fn cmp_f(op: CmpOp) -> Opcode {
    match op {
        CmpOp::Lt => Opcode::CmpLtF,
        CmpOp::Le => Opcode::CmpLeF,
        CmpOp::Gt => Opcode::CmpGtF,
        CmpOp::Ge => Opcode::CmpGeF,
        CmpOp::Eq | CmpOp::Ne => Opcode::CmpEqF,
    }
}

fn cmp_imm_f(op: CmpOp) -> Opcode {
    match op {
        CmpOp::Lt => Opcode::CmpLtImmF,
        CmpOp::Le => Opcode::CmpLeImmF,
        CmpOp::Gt => Opcode::CmpGtImmF,
        CmpOp::Ge => Opcode::CmpGeImmF,
        CmpOp::Eq | CmpOp::Ne => Opcode::CmpEqImmF,
    }
}

fn cmp_i(op: CmpOp) -> Opcode {
    match op {
        CmpOp::Lt => Opcode::CmpLtI,
        CmpOp::Le => Opcode::CmpLeI,
        CmpOp::Gt => Opcode::CmpGtI,
        CmpOp::Ge => Opcode::CmpGeI,
        CmpOp::Eq | CmpOp::Ne => Opcode::CmpEqI,
    }
}

fn cmp_imm_i(op: CmpOp) -> Opcode {
    match op {
        CmpOp::Lt => Opcode::CmpLtImmI,
        CmpOp::Le => Opcode::CmpLeImmI,
        CmpOp::Gt => Opcode::CmpGtImmI,
        CmpOp::Ge => Opcode::CmpGeImmI,
        CmpOp::Eq | CmpOp::Ne => Opcode::CmpEqImmI,
    }
}

fn cmp_str(op: CmpOp) -> Opcode {
    match op {
        CmpOp::Lt => Opcode::CmpLtStr,
        CmpOp::Le => Opcode::CmpLeStr,
        CmpOp::Gt => Opcode::CmpGtStr,
        CmpOp::Ge => Opcode::CmpGeStr,
        CmpOp::Eq | CmpOp::Ne => Opcode::CmpEqStr,
    }
}
