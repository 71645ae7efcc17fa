//! Whole-program passes.

use std::collections::HashMap;

use crate::{
    events::EventKind,
    rewrite::simplify_site,
    ssa::{Program, ValueId},
    Result,
};

/// Upper bound on re-simplifying the fresh nodes a rewrite creates at one site.
const MAX_FRESH: usize = 4;

/// A transformation over a finished [`Program`].
///
/// Passes must be thread-safe (Send + Sync) so one pass instance can serve programs
/// compiled in parallel.
pub trait ProgramPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on `program`?
    ///
    /// Called before [`ProgramPass::run`]. Override to skip programs the pass cannot
    /// improve.
    fn should_run(&self, _program: &Program) -> bool {
        true
    }

    /// Runs the pass.
    ///
    /// Returns `true` if any node changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot process the program.
    fn run(&self, program: &mut Program) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// One operand-first sweep of the peephole rules over every reachable node.
///
/// Each node first has its operands redirected to their simplified replacements and is
/// then simplified itself, so a rewrite that a lowering decision hid from construction
/// time (an operand that only became constant later) still fires. A second run over
/// the result changes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct RewritePass;

impl RewritePass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ProgramPass for RewritePass {
    fn name(&self) -> &'static str {
        "rewrite"
    }

    fn should_run(&self, program: &Program) -> bool {
        program.root().is_some()
    }

    fn run(&self, program: &mut Program) -> Result<bool> {
        let Some(root) = program.root() else {
            return Ok(false);
        };
        program
            .events()
            .record(EventKind::PassStarted)
            .rule(self.name())
            .message(format!("sweeping {} nodes", program.len()));

        let order = program.reachable();
        let mut memo: HashMap<ValueId, ValueId> = HashMap::with_capacity(order.len());
        let mut sites_changed = 0usize;

        for id in order {
            let before = program.node(id).clone();
            let args: Vec<ValueId> = before
                .args()
                .iter()
                .map(|a| memo.get(a).copied().unwrap_or(*a))
                .collect();
            program.set_args(id, args);

            let fresh_from = program.len();
            let mut result = simplify_site(program, id);
            for _ in 0..MAX_FRESH {
                if result == id || result.index() < fresh_from {
                    break;
                }
                let next = simplify_site(program, result);
                if next == result {
                    break;
                }
                result = next;
            }

            if result != id || *program.node(id) != before {
                sites_changed += 1;
            }
            memo.insert(id, result);
        }

        let new_root = memo.get(&root).copied().unwrap_or(root);
        program.set_root(new_root);

        program
            .events()
            .record(EventKind::PassCompleted)
            .rule(self.name())
            .message(format!("{sites_changed} sites rewritten"));
        Ok(sites_changed > 0)
    }

    fn description(&self) -> &'static str {
        "Applies the peephole rules to every reachable node, operands first"
    }
}
