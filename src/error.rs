//! Error types shared across the synthesis core.
//!
//! Every fallible operation in the core returns `Result<_, SynthesisError>`.
//! The theory DSL parser has its own positioned error type
//! (`theory_parser::TheoryParseError`); everything downstream of parsing
//! reports one of the kinds below.
//!
//! Template exhaustion is deliberately *not* an error: when a solver returns
//! `Unsat` on a template's well-formedness constraint combined with the
//! caller's assertions, the search loop simply stops.

use std::fmt;

/// Errors surfaced by the template/constraint layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisError {
    /// A symbol was applied at the wrong arity or sort, a language extension
    /// collided, or a lookup failed against the signature.
    SignatureMismatch(String),

    /// Interpretation reached a free variable absent from the valuation.
    /// This is a programmer error in the caller, not a solver condition.
    UnboundVariable(String),

    /// A solver model was inconsistent with the constraint it is supposed to
    /// satisfy (e.g. a null node tag at a template root). Indicates solver
    /// misuse or a backend bug.
    InvalidModel(String),

    /// Failure at the solver level (unknown result, missing model, ...).
    Backend(String),
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisError::SignatureMismatch(msg) => write!(f, "signature mismatch: {}", msg),
            SynthesisError::UnboundVariable(msg) => write!(f, "unbound variable: {}", msg),
            SynthesisError::InvalidModel(msg) => write!(f, "invalid model: {}", msg),
            SynthesisError::Backend(msg) => write!(f, "solver backend: {}", msg),
        }
    }
}

impl std::error::Error for SynthesisError {}
