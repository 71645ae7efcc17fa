//! CASE lowering.
//!
//! All three strategies share one discipline: a running `merged` mask holds the lanes
//! some earlier limb already claimed, so limb `i` only acts on `when_i AND NOT merged`.
//! The first matching limb wins and the ELSE arm (NULL when absent) takes whatever is
//! left. A limb whose condition folds to FALSE is dropped.
//!
//! - **logical**: every THEN is a condition; the result is a truth mask with its own
//!   not-missing set.
//! - **numeric**: every THEN is a number, converted to float and blended with `blend.f`.
//! - **generic**: every THEN is boxed and blended with `blend.v`.

use std::iter;

use crate::{
    compiler::Compiler,
    events::EventKind,
    expr::{Expr, Limb},
    ssa::{Datum, MaskedValue, Opcode, Program, SsaType, ValueId},
    Result,
};

const NULL: Expr = Expr::Null;

impl Compiler<'_> {
    /// CASE consumed as a condition.
    pub(crate) fn logical_case(&mut self, limbs: &[Limb], otherwise: Option<&Expr>) -> Result<ValueId> {
        let mut merged = Program::FALSE;
        let mut out = Program::FALSE;
        let mut out_nm = Program::FALSE;

        for (when, then) in arms(limbs, otherwise) {
            let Some((fresh, claimed)) = self.claim(when, merged)? else {
                continue;
            };
            merged = claimed;

            let t = self.as_bool(then)?;
            let t_nm = self.program.not_missing(t);
            let hit = self.program.and(fresh, t);
            let decided = self.program.and(fresh, t_nm);
            out = self.program.or(out, hit);
            out_nm = self.program.or(out_nm, decided);
        }
        Ok(self.program.with_not_missing(out, out_nm))
    }

    /// CASE in numeric context: a float register.
    pub(crate) fn numeric_case(&mut self, limbs: &[Limb], otherwise: Option<&Expr>) -> Result<ValueId> {
        let all_paths =
            limbs.iter().all(|l| l.then.is_path()) && otherwise.is_some_and(Expr::is_path);
        if all_paths {
            let v = self.generic_case(limbs, otherwise)?;
            if self.program.is_false(v) {
                return Ok(v);
            }
            return Ok(self.program.coerce_float(v).value);
        }

        let mut merged = Program::FALSE;
        let mut acc: Option<MaskedValue> = None;
        for (when, then) in arms(limbs, otherwise) {
            let Some((fresh, claimed)) = self.claim(when, merged)? else {
                continue;
            };
            merged = claimed;

            let t = self.as_number(then)?;
            if self.is_absent(t) {
                // the limb matches but yields no value
                continue;
            }
            let f = self.program.coerce_float(t);
            let f = MaskedValue::new(self.check(then, f.value)?, f.mask);
            acc = Some(self.accumulate(Opcode::BlendF, acc, f, fresh));
        }
        Ok(acc.map_or(Program::FALSE, |a| a.value))
    }

    /// CASE with mixed or unknown result types: a boxed value.
    pub(crate) fn generic_case(&mut self, limbs: &[Limb], otherwise: Option<&Expr>) -> Result<ValueId> {
        let mut merged = Program::FALSE;
        let mut acc: Option<MaskedValue> = None;
        for (when, then) in arms(limbs, otherwise) {
            let Some((fresh, claimed)) = self.claim(when, merged)? else {
                continue;
            };
            merged = claimed;

            let t = self.value(then)?;
            if self.is_absent(t) {
                continue;
            }
            let boxed = self.program.serialized(t);
            let mut boxed = self.check(then, boxed)?;
            if self.program.primary(t) == SsaType::VALUE && !self.program.is_literal(boxed) {
                // field values may be symbol references into the input's dictionary
                boxed = self.program.unsymbolize(boxed);
            }
            let v = self.program.masked(boxed);
            acc = Some(self.accumulate(Opcode::BlendV, acc, v, fresh));
        }
        Ok(acc.map_or(Program::FALSE, |a| a.value))
    }

    /// Lowers a limb condition and returns the lanes it newly claims together with the
    /// updated `merged` mask, or `None` if the limb can never match.
    fn claim(&mut self, when: Option<&Expr>, merged: ValueId) -> Result<Option<(ValueId, ValueId)>> {
        let w = match when {
            Some(cond) => {
                let w = self.as_bool(cond)?;
                if self.program.is_false(w) {
                    self.program
                        .events()
                        .record(EventKind::LimbEliminated)
                        .message(format!("WHEN {cond} never matches"));
                    return Ok(None);
                }
                w
            }
            None => Program::INIT,
        };
        let fresh = self.program.and_not(merged, w);
        let claimed = self.program.or(merged, w);
        Ok(Some((fresh, claimed)))
    }

    /// Folds one contributing limb into the accumulator.
    fn accumulate(
        &mut self,
        blend: Opcode,
        acc: Option<MaskedValue>,
        v: MaskedValue,
        select: ValueId,
    ) -> MaskedValue {
        let contrib = self.program.and(select, v.mask);
        match acc {
            None => {
                let seeded = if self.program.is_literal(v.value) {
                    // a literal has no lanes of its own to restrict
                    let null = self.program.literal(Datum::Null);
                    self.program.blend(blend, null, v.value, select, contrib)
                } else {
                    self.program.vk(v.value, contrib)
                };
                MaskedValue::new(seeded, contrib)
            }
            Some(prev) => {
                let k = self.program.or(prev.mask, contrib);
                let blended = self.program.blend(blend, prev.value, v.value, select, k);
                MaskedValue::new(blended, k)
            }
        }
    }
}

/// The limbs followed by the ELSE arm, which has no condition.
fn arms<'e>(
    limbs: &'e [Limb],
    otherwise: Option<&'e Expr>,
) -> impl Iterator<Item = (Option<&'e Expr>, &'e Expr)> {
    limbs
        .iter()
        .map(|l| (Some(&l.when), &l.then))
        .chain(iter::once((None, otherwise.unwrap_or(&NULL))))
}
