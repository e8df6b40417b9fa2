//! Counterexample-guided synthesis of modal-logic axiomatizations.
//!
//! Given a first-order goal theory describing a class of Kripke frames and
//! a depth bound on modal formulas, the synthesizer enumerates every modal
//! formula in the template that is valid on the goal class, using Z3 as the
//! decision engine, and finishes with a completeness check relative to a
//! finite frame-size bound.

pub mod config; // Shared configuration loader
pub mod error;
pub mod finite_model; // Symbolic finite structures (structure templates)
pub mod language;
pub mod logging; // Search-trace logging (keeps CLI output clean)
pub mod modal; // Modal formulas, frames, modal formula templates
pub mod smt; // Session and fresh-symbol facade over Z3
pub mod structure;
pub mod synthesis; // The two-session search loop and completeness check
pub mod syntax;
pub mod template; // Template protocol and control variables
pub mod templates; // Symbolic first-order terms and formulas
pub mod theory;
pub mod theory_parser;

pub use error::SynthesisError;
pub use theory::Theory;

/// Convenience function: parse a `theory ... end` block.
pub fn parse_theory(text: &str) -> Result<Theory, theory_parser::TheoryParseError> {
    theory_parser::parse_theory(text)
}
