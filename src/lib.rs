// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # vexc
//!
//! An expression compiler for lane-parallel query engines. `vexc` turns a typed scalar or
//! logical expression tree into a graph of single-assignment operations (SSA values),
//! each tagged with a semantic type and a lane-validity mask, ready to be lowered to the
//! bytecode of a fixed-width vectorized machine.
//!
//! ## Features
//!
//! - **Three-valued logic** - TRUE/FALSE/MISSING semantics preserved on two-state lane masks
//! - **Representation choice** - raw int, float, string and timestamp registers versus
//!   self-describing boxed values, with conversions inserted only where needed
//! - **CASE, CAST and membership lowering** - first-match-wins blends, static cast folding,
//!   radix hash tables for constant sets
//! - **Peephole rewriting** - a table of local rules applied at construction time and in
//!   one final sweep
//! - **Closed opcode space** - a dense, append-only enumeration with per-opcode operand
//!   contracts
//!
//! ## Quick Start
//!
//! ```rust
//! use vexc::prelude::*;
//!
//! let symbols = SymbolTable::new();
//! let expr = Expr::and(
//!     Expr::compare(CmpOp::Gt, Expr::path("price"), Expr::Integer(5)),
//!     Expr::string_match(MatchOp::Like, Expr::path("name"), "a%"),
//! );
//!
//! let program = compile_logical(&expr, &symbols, &CompileConfig::default())?;
//! program.validate()?;
//! println!("{program}");
//! # Ok::<(), vexc::Error>(())
//! ```
//!
//! ### Value programs
//!
//! ```rust
//! use vexc::prelude::*;
//!
//! let symbols = SymbolTable::new();
//! let expr = Expr::case(
//!     vec![Limb::new(
//!         Expr::compare(CmpOp::Gt, Expr::path("a"), Expr::Integer(5)),
//!         Expr::string("big"),
//!     )],
//!     Some(Expr::string("small")),
//! );
//!
//! let program = compile_value(&expr, &symbols, &CompileConfig::default())?;
//! assert_eq!(program.count_op(Opcode::BlendV), 2);
//! # Ok::<(), vexc::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`expr`] - The input expression tree
//! - [`ssa`] - Value and type model, the program container and the opcode space
//! - [`compiler`] - Lowering of expressions into programs
//! - [`rewrite`] - Peephole rules and the rewrite sweep
//! - [`encoding`] - Symbol interning and constant serialization
//! - [`events`] - A log of what the compiler and the rewriter did
//!
//! ## Thread safety
//!
//! A [`Program`] is built by one thread. Independent expressions compile in parallel
//! through [`compile_batch`]; the [`Encoding`] they share is `Send + Sync`.

#[macro_use]
pub(crate) mod error;

/// Shared functionality used by unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use vexc::prelude::*;
///
/// let program = compile_logical(&Expr::Bool(true), &SymbolTable::new(), &CompileConfig::default())?;
/// assert!(program.root().is_some());
/// # Ok::<(), vexc::Error>(())
/// ```
pub mod prelude;

/// Compiler configuration.
pub mod config;

/// The field interning and constant encoding service.
pub mod encoding;

/// Compiler event log.
pub mod events;

/// The expression tree accepted by the compiler.
pub mod expr;

/// SSA value/type model, program container and opcode space.
///
/// # Key Types
///
/// - [`ssa::Program`] - The node arena with its typed construction helpers
/// - [`ssa::Opcode`] - The closed enumeration of machine operations
/// - [`ssa::SsaType`] - Register kinds of the static type system
/// - [`ssa::Datum`] - Constants
/// - [`ssa::HashTable`] - Radix hash tables for membership tests and lookups
pub mod ssa;

/// Peephole rewriting of programs.
pub mod rewrite;

/// Expression lowering.
pub mod compiler;

pub use compiler::{compile_batch, compile_logical, compile_value, Compiler, Output};
pub use config::CompileConfig;
pub use encoding::{Encoding, Symbol, SymbolTable};
pub use error::Error;
pub use events::{Event, EventKind, EventLog};
pub use expr::{
    ArithOp, Builtin, CastType, CmpOp, Expr, IsKey, Limb, LogicOp, MatchOp, PathStep, TimePart,
    UnaryOp,
};
pub use ssa::{Datum, Program, ValueId};

/// `vexc` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust
/// use vexc::{Expr, Result};
///
/// fn fold(expr: &Expr) -> Result<Option<vexc::Datum>> {
///     Ok(expr.as_datum())
/// }
/// assert_eq!(fold(&Expr::Integer(1)).unwrap(), Some(vexc::Datum::Int(1)));
/// ```
pub type Result<T> = std::result::Result<T, Error>;
