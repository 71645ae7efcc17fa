use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every error is fatal to the compilation that produced it: the partially built
/// [`crate::Program`] is dropped and the error is handed back to the caller, which decides
/// whether the surrounding query compilation should be abandoned.
///
/// # Error Categories
///
/// ## Coercion Errors
/// - [`Error::TypeMismatch`] - A sub-expression's static type cannot satisfy its context
/// - [`Error::Invalid`] - A diagnostic stored on an `invalid` node, resurfaced verbatim
///
/// ## Shape Errors
/// - [`Error::Arity`] - Wrong number of arguments for a builtin
/// - [`Error::Argument`] - A positional argument failed its contract (e.g. non-literal pattern)
/// - [`Error::Builtin`] - Wraps any failure while lowering a builtin call
/// - [`Error::Pattern`] - A LIKE or regular-expression pattern could not be compiled
///
/// ## Unsupported Constructs
/// - [`Error::Unsupported`] - An expression or builtin kind with no lowering rule
///
/// ## Internal Errors
/// - [`Error::Malformed`] - The SSA graph failed validation
///
/// # Examples
///
/// ```rust
/// use vexc::{compile_logical, CompileConfig, Error, Expr, SymbolTable};
///
/// let symbols = SymbolTable::new();
/// let expr = Expr::not(Expr::Integer(3));
///
/// match compile_logical(&expr, &symbols, &CompileConfig::default()) {
///     Err(Error::TypeMismatch { expr, expected, .. }) => {
///         eprintln!("{expr} is not usable as {expected}");
///     }
///     Err(e) => eprintln!("other error: {e}"),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A sub-expression's statically-known type cannot satisfy the context's contract.
    ///
    /// Raised by the coercion helpers, for example when a raw string is used where a
    /// number is required or an integer is used as a logical expression.
    ///
    /// # Fields
    ///
    /// * `expr` - The offending sub-expression rendered as text
    /// * `expected` - What the context requires
    /// * `found` - The static type that was found instead
    #[error("cannot compile {expr} as {expected} (found {found})")]
    TypeMismatch {
        /// The offending sub-expression rendered as text
        expr: String,
        /// The kind of value the context requires
        expected: &'static str,
        /// The static type that was found instead
        found: String,
    },

    /// A stored diagnostic from an `invalid` placeholder node.
    ///
    /// Construction helpers that cannot produce a node return an `invalid` node carrying
    /// a message. When a coercion helper encounters such a node, it reports the stored
    /// message instead of a second, generic type error.
    #[error("compiling {expr}: {message}")]
    Invalid {
        /// The sub-expression whose compilation produced the invalid node
        expr: String,
        /// The diagnostic stored on the node
        message: String,
    },

    /// A builtin was called with the wrong number of arguments.
    #[error("expects {expected} arguments, got {got}")]
    Arity {
        /// Number of arguments the builtin accepts
        expected: usize,
        /// Number of arguments supplied
        got: usize,
    },

    /// A positional argument did not satisfy its contract.
    ///
    /// Positions are one-based, matching the order in the call.
    #[error("argument {position}: {message}")]
    Argument {
        /// One-based argument position
        position: usize,
        /// What went wrong with the argument
        message: String,
    },

    /// Failure while lowering a builtin function call.
    #[error("compiling {func}: {source}")]
    Builtin {
        /// Name of the builtin
        func: &'static str,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// An expression or builtin kind that has no lowering rule.
    #[error("unsupported construct: {kind}")]
    Unsupported {
        /// Kind of the unsupported node
        kind: String,
    },

    /// A match pattern that could not be compiled.
    #[error("invalid pattern {pattern:?}: {message}")]
    Pattern {
        /// The pattern text as written
        pattern: String,
        /// Reason reported by the pattern compiler
        message: String,
    },

    /// The SSA graph is internally inconsistent.
    ///
    /// This indicates a bug in a lowering rule or a rewrite rule rather than a problem
    /// with the input expression. The error includes the source location where the
    /// inconsistency was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the inconsistency
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },
}

impl Error {
    /// Wraps this error as the failure of builtin `func`.
    #[must_use]
    pub fn in_builtin(self, func: &'static str) -> Self {
        Error::Builtin {
            func,
            source: Box::new(self),
        }
    }

    /// Attaches a one-based argument position to this error.
    #[must_use]
    pub fn at_argument(self, position: usize) -> Self {
        Error::Argument {
            position,
            message: self.to_string(),
        }
    }
}
