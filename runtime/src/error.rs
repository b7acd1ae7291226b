//! Error types surfaced to embedders.
//!
//! Compile-phase failures carry a kind, a human message, and the best
//! available 1-based source line.  The facade-level [`Error`] folds the
//! per-stage errors into one enum so `run_source`/`run_bundle` have a single
//! error channel.

use std::fmt;

use thiserror::Error;

use crate::bundle::BundleError;
use crate::interpreter::RuntimeError;

/// Classification of compile failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    UnsupportedConstruct,
    InvalidLet,
    UnsupportedOperator,
    MalformedIf,
}

/// A compile error with a human message and an optional source line.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub line: Option<u32>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>, line: u32) -> Self {
        Self::new(CompileErrorKind::UnsupportedConstruct, message, Some(line))
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Top-level error returned by the runtime facade.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
}
