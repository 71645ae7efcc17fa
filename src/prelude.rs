//! # vexc Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the vexc library. Import this module to get quick access to the essential types
//! for compiling expressions.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all vexc operations
pub use crate::Error;

/// The result type used throughout vexc
pub use crate::Result;

/// Compiler configuration
pub use crate::CompileConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Compile a condition into a `ret.k` program
pub use crate::compile_logical;

/// Compile a value into a `ret.v` program
pub use crate::compile_value;

/// Compile many expressions in parallel
pub use crate::{compile_batch, Output};

/// Incremental compiler over one program
pub use crate::Compiler;

// ================================================================================================
// Expressions
// ================================================================================================

/// The expression tree and its operator enums
pub use crate::expr::{
    ArithOp, Builtin, CastType, CmpOp, Expr, IsKey, Limb, LogicOp, MatchOp, PathStep, TimePart,
    UnaryOp,
};

// ================================================================================================
// Programs
// ================================================================================================

/// The SSA program and its node types
pub use crate::ssa::{Datum, MaskedValue, Op, Opcode, Program, SsaType, ValueId};

/// Runtime type tags
pub use crate::ssa::{TypeSet, TypeTag};

/// Rewriting
pub use crate::rewrite::{ProgramPass, RewritePass};

// ================================================================================================
// Services
// ================================================================================================

/// Field interning and constant encoding
pub use crate::encoding::{Encoding, Symbol, SymbolTable};

/// Compiler events
pub use crate::events::{EventKind, EventLog};
