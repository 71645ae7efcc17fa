//! Configuration for compilation and rewriting.
//!
//! Controls when the peephole rules run, which rules are allowed to fire, and whether
//! the program records events.

/// Configuration for compiling an expression into a [`crate::Program`].
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Apply peephole rules to each node as it is constructed (default: true).
    pub rewrite_on_build: bool,

    /// Run one rewrite sweep over the finished program (default: true).
    pub rewrite_sweep: bool,

    /// Names of rules that must not fire (default: none).
    pub disabled_rules: Vec<&'static str>,

    /// Record events into the program's log (default: true).
    pub record_events: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            rewrite_on_build: true,
            rewrite_sweep: true,
            disabled_rules: Vec::new(),
            record_events: true,
        }
    }
}

impl CompileConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with every rewrite disabled.
    ///
    /// Programs compiled this way contain exactly the nodes the lowering emitted, which
    /// is what tests of the rewrite pass start from.
    #[must_use]
    pub fn unoptimized() -> Self {
        Self {
            rewrite_on_build: false,
            rewrite_sweep: false,
            ..Self::default()
        }
    }

    /// Rewrite only in the final sweep, not during construction.
    #[must_use]
    pub fn sweep_only() -> Self {
        Self {
            rewrite_on_build: false,
            ..Self::default()
        }
    }

    /// Prevents the rule named `rule` from firing.
    #[must_use]
    pub fn without_rule(mut self, rule: &'static str) -> Self {
        self.disabled_rules.push(rule);
        self
    }

    /// Enables or disables event recording.
    #[must_use]
    pub fn with_events(mut self, record: bool) -> Self {
        self.record_events = record;
        self
    }

    /// Returns true if `rule` may fire.
    #[must_use]
    pub fn rule_enabled(&self, rule: &str) -> bool {
        !self.disabled_rules.iter().any(|r| *r == rule)
    }
}
