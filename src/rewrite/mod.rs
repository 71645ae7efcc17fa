//! Peephole rewriting of SSA programs.
//!
//! Rules are local: each one looks at a single node, keyed by its operator and operand
//! count, and either points its users at an existing node ([`Rewrite::Replace`]) or
//! rewrites the node in place ([`Rewrite::Clobber`]). Clobbering keeps the node's index,
//! so operand references elsewhere in the program stay valid.
//!
//! Rules run in two places:
//!
//! - at construction time, on every node [`Program::ssa`] creates (when
//!   [`crate::CompileConfig::rewrite_on_build`] is set), and
//! - in one post-construction sweep, [`RewritePass`].
//!
//! At a given site rules are re-applied until none matches. There is no global fixpoint
//! iteration: a rewrite at one node never revisits its users except through the sweep's
//! operand-first traversal.
//!
//! # Replacement and three-valued logic
//!
//! A boolean node may carry a not-missing set that differs from what its replacement
//! would derive. When a rule replaces such a node, the replacement is a copy of the
//! target carrying the original not-missing set, so MISSING lanes never turn into FALSE
//! ones or the reverse.

mod pass;
mod rules;

use crate::{
    events::EventKind,
    ssa::{Immediate, Op, Program, ValueId},
};

pub use pass::{ProgramPass, RewritePass};
pub use rules::{rules_for, Rule};

/// Upper bound on rule applications at one site.
const MAX_STEPS: usize = 32;

/// Outcome of a matching rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// Users of the node should use this existing node instead.
    Replace(ValueId),
    /// Rewrite the node in place with a new operator, operands and immediate.
    Clobber(Op, Vec<ValueId>, Option<Immediate>),
}

/// Applies the rules at `id` until none matches and returns the node that stands for
/// `id` afterwards: `id` itself (possibly clobbered) or a replacement.
pub(crate) fn simplify_site(p: &mut Program, id: ValueId) -> ValueId {
    let current = id;
    for _ in 0..MAX_STEPS {
        let Some((name, rewrite)) = first_match(p, current) else {
            return current;
        };
        let before = p
            .config()
            .record_events
            .then(|| p.display_node(current));

        match rewrite {
            Rewrite::Replace(target) => {
                let target = match p.pinned_not_missing(current) {
                    Some(nm) if p.not_missing(target) != nm => p.with_not_missing(target, nm),
                    _ => target,
                };
                if let Some(before) = before {
                    let msg = format!("{before} -> {target}");
                    p.events()
                        .record(EventKind::RuleApplied)
                        .location(current.index())
                        .rule(name)
                        .message(msg);
                }
                return target;
            }
            Rewrite::Clobber(op, args, imm) => {
                p.clobber(current, op, args, imm);
                if let Some(before) = before {
                    let msg = format!("{before} -> {}", p.display_node(current));
                    p.events()
                        .record(EventKind::RuleApplied)
                        .location(current.index())
                        .rule(name)
                        .message(msg);
                }
            }
        }
    }
    p.events()
        .warn(format!("rewriting {current} stopped after {MAX_STEPS} steps"));
    current
}

fn first_match(p: &mut Program, id: ValueId) -> Option<(&'static str, Rewrite)> {
    let rules = rules_for(p.op(id), p.args(id).len());
    for rule in rules {
        if !p.config().rule_enabled(rule.name) {
            continue;
        }
        if let Some(rewrite) = (rule.apply)(p, id) {
            return Some((rule.name, rewrite));
        }
    }
    None
}
