use std::path::PathBuf;

use itertools::Itertools;
use thiserror::Error;

/// What kind of name failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    Variable,
    Function,
}

/// Scalar kind of a lowered value as seen by operator dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Int,
    Float,
    Bool,
}

#[derive(Debug, Error)]
pub enum LoweringError {
    #[error("undefined {kind} '{name}'")]
    UndefinedSymbol { kind: SymbolKind, name: String },

    #[error("operator '{operator}' is not supported on {kind} operands")]
    UnsupportedOperation { operator: String, kind: ValueKind },

    #[error("too many live bindings (limit is {limit})")]
    CapacityExceeded { limit: usize },

    #[error("module failed verification:\n{}", indented(.diagnostics))]
    VerificationFailed { diagnostics: Vec<String> },

    #[error("could not write IR to '{}': {source}", .path.display())]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error(transparent)]
    Lowering(#[from] LoweringError),
}

/// Abnormal termination of an interpreted program
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Trap {
    #[error("integer division by zero")]
    DivisionByZero,

    #[error("integer overflow in signed division")]
    IntegerOverflow,

    #[error("call depth exceeded {limit}")]
    CallDepthExceeded { limit: usize },

    #[error("call to unknown external function @{name}")]
    UnknownExternal { name: String },

    #[error("module has no @main to run")]
    UndefinedEntry,

    #[error("load from a slot that was never stored to")]
    UninitializedLoad,

    #[error("malformed module: {0}")]
    Malformed(String),
}

fn indented(diagnostics: &[String]) -> String {
    diagnostics.iter().map(|d| format!("  {d}")).join("\n")
}
