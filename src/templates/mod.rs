//! Symbolic templates for first-order terms and formulas.
//!
//! Each template owns a tree of *node tags* (bounded integer control
//! variables). A tag of `0` marks an absent subtree; positive tags select a
//! free variable, a symbol, or a connective. The well-formedness constraint
//! pins the tags to shapes that decode to syntactically valid objects, and
//! interpretation builds one backend term covering every shape the tags can
//! take, keyed by `ite` on the tags.

pub mod formula;
pub mod term;

pub use formula::{AtomicFormulaTemplate, QuantifierFreeFormulaTemplate};
pub use term::TermTemplate;
