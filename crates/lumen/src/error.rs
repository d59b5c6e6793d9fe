//! Fatal compile diagnostics.
//!
//! Every error the front-end can produce is a [`CompileError`]: a source
//! location, a coarse [`ErrorKind`] discriminant, and a preformatted message.
//! There is no recovery; the driver prints the first error as
//! `path:row:col: message` and the process exits non-zero.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::ast::SourceLoc;

/// Result alias for operations that can produce a compile error.
pub type CompileResult<T> = Result<T, CompileError>;

/// Classification of fatal diagnostics.
///
/// The kind is carried for tests and tooling; the user-facing text lives in
/// the error's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum ErrorKind {
    /// Unexpected byte in the source text.
    Lex,
    /// Unexpected token, with the expected token where available.
    Parse,
    /// Name not found in any scope nor in the internal prelude.
    UnresolvedIdentifier,
    /// Expected one type, got another.
    TypeMismatch,
    /// Wrong number of arguments to a call.
    Arity,
    /// Generic inference could not bind every inferred name, bindings
    /// contradicted, or a `where` constraint failed.
    PatternMatch,
    /// Array index, method, or operator on a type that does not define it.
    OperatorNotFound,
    /// Non-static switch without an else case misses enum items.
    Exhaustiveness,
    /// `break` outside `while`, unused value in statement position, and
    /// similar placement errors.
    ControlFlow,
    /// Wrong arity or argument kind for a compiler built-in, including
    /// `@compile_error` itself.
    Intrinsic,
    /// A source file could not be opened or read.
    Io,
}

/// A fatal diagnostic with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Resolved path of the file the error points into. Empty for errors with
    /// no position (e.g. a missing input file).
    pub path: String,
    /// 1-based row; 0 when the error has no position.
    pub row: u32,
    /// 1-based column.
    pub column: u32,
    pub kind: ErrorKind,
    pub message: String,
}

impl CompileError {
    pub(crate) fn new(path: &str, loc: SourceLoc, kind: ErrorKind, message: String) -> Self {
        Self {
            path: path.to_owned(),
            row: loc.row,
            column: loc.column,
            kind,
            message,
        }
    }

    /// An error with no source position (file-level failures).
    pub(crate) fn positionless(kind: ErrorKind, message: String) -> Self {
        Self {
            path: String::new(),
            row: 0,
            column: 0,
            kind,
            message,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}:{}:{}: {}", self.path, self.row, self.column, self.message)
        }
    }
}

impl std::error::Error for CompileError {}
