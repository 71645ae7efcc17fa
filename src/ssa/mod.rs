//! The SSA program model.
//!
//! A compiled expression is a [`Program`]: a DAG of single-assignment nodes, each with an
//! operator, ordered operands, an optional immediate and a declared return type. Every
//! non-boolean node is paired with a validity mask, a boolean node whose set lanes are
//! exactly the lanes where the node holds a defined value.
//!
//! # Architecture
//!
//! - [`types`] - The register-kind lattice ([`SsaType`]) and runtime tag sets ([`TypeSet`])
//! - [`value`] - Node identifiers, constants and immediates
//! - [`opcode`] - The closed, append-only machine operation space
//! - [`program`] - The arena, construction with deduplication, masks and validation
//! - `builder` - Typed construction helpers: mask logic, coercions, comparisons, arithmetic
//! - [`radix`] - Radix hash tables for membership tests and lookups
//!
//! # Example
//!
//! ```rust
//! use vexc::{CompileConfig, Datum, Program};
//! use vexc::ssa::Opcode;
//!
//! let mut program = Program::new(CompileConfig::default());
//! let two = program.literal(Datum::Int(2));
//! let three = program.literal(Datum::Int(3));
//! let lt = program.compare(vexc::CmpOp::Lt, two, three);
//! assert_eq!(lt, Program::INIT);
//!
//! let ret = program.return_mask(lt);
//! assert_eq!(program.op(ret).opcode(), Some(Opcode::RetK));
//! assert!(program.validate().is_ok());
//! ```

mod builder;
pub mod opcode;
pub mod program;
pub mod radix;
pub mod types;
pub mod value;

// Re-export primary types at module level
pub use opcode::{ImmKind, Op, Opcode, Signature};
pub use program::{Node, Program};
pub use radix::{radix_key, HashTable, RadixTree64};
pub use types::{SsaType, TypeSet, TypeTag};
pub use value::{Datum, Field, Immediate, LikePattern, MaskedValue, RegexPattern, ValueId};
