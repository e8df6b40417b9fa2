//! SMT façade over the Z3 bindings.
//!
//! The rest of the crate builds terms with the `z3::ast` types directly, but
//! all *solver* interaction (sessions, assertions, sat checks, model
//! queries) goes through this module. Keeping the session surface small is
//! what makes the two-solver search loop auditable: a `Session` supports
//! exactly `assert`, `push`/`pop`, `check`, and `model`.
//!
//! **Key Design Decisions:**
//! - The Z3 Rust bindings use a thread-local context internally, so no
//!   lifetime threading is needed; two `Session`s are logically independent
//!   as long as each asserts only its own constraints.
//! - Timeouts are configured per session (milliseconds), not globally, so
//!   the candidate solver and the countermodel solver can differ.
//! - Fresh symbols come from `fresh_*` helpers; Z3 guarantees uniqueness of
//!   `fresh_const` names. Control variables are allocated once, at template
//!   construction, and never re-minted by interpretation.

use crate::logging;
use std::time::Instant;
use z3::ast::{Ast, Bool, Dynamic, Int};
use z3::{Model, Params, SatResult, Solver};

pub use z3::Sort as SmtSort;

/// A scoped solver session.
///
/// Acquired once per search phase and dropped when the phase ends; `push`
/// and `pop` bracket exploratory assertions inside it. The core never pops
/// deeper than it pushed.
pub struct Session {
    solver: Solver,
}

impl Session {
    /// Create a session with the given query timeout in milliseconds.
    pub fn new(timeout_ms: u64) -> Self {
        let solver = Solver::new();

        let mut params = Params::new();
        params.set_u32("timeout", timeout_ms as u32);
        solver.set_params(&params);

        Session { solver }
    }

    /// Assert a boolean constraint.
    pub fn assert(&self, constraint: &Bool) {
        self.solver.assert(constraint);
    }

    /// Push a backtracking point.
    pub fn push(&self) {
        self.solver.push();
    }

    /// Pop `levels` backtracking points.
    pub fn pop(&self, levels: u32) {
        self.solver.pop(levels);
    }

    /// Run a satisfiability check over everything asserted so far.
    pub fn check(&self) -> SatResult {
        let started = Instant::now();
        let result = self.solver.check();

        let verdict = match result {
            SatResult::Sat => "Sat",
            SatResult::Unsat => "Unsat",
            SatResult::Unknown => "Unknown",
        };
        logging::solver_check(verdict, started.elapsed());

        result
    }

    /// The model of the last `Sat` check, if the solver produced one.
    pub fn model(&self) -> Option<Model> {
        self.solver.get_model()
    }
}

/// Fresh boolean symbol. The prefix is only a debugging aid.
pub fn fresh_bool(prefix: &str) -> Bool {
    Bool::fresh_const(prefix)
}

/// Fresh integer symbol.
pub fn fresh_int(prefix: &str) -> Int {
    Int::fresh_const(prefix)
}

/// Fresh symbol of an arbitrary backend sort.
pub fn fresh_const(prefix: &str, sort: &SmtSort) -> Dynamic {
    Dynamic::fresh_const(prefix, sort)
}

/// Conjunction of arbitrarily many booleans; empty input is `true`.
pub fn and_all(conjuncts: &[Bool]) -> Bool {
    match conjuncts.len() {
        0 => Bool::from_bool(true),
        1 => conjuncts[0].clone(),
        _ => Bool::and(conjuncts),
    }
}

/// Disjunction of arbitrarily many booleans; empty input is `false`.
pub fn or_any(disjuncts: &[Bool]) -> Bool {
    match disjuncts.len() {
        0 => Bool::from_bool(false),
        1 => disjuncts[0].clone(),
        _ => Bool::or(disjuncts),
    }
}

/// Backend universal quantification over explicit bound constants.
///
/// Used where finite unrolling is impossible or deliberately avoided: opaque
/// carriers, and the generalization of an accepted candidate over every
/// valuation of a free finite relation.
pub fn forall(bound: &[Dynamic], body: &Bool) -> Bool {
    let refs: Vec<&dyn Ast> = bound.iter().map(|v| v as &dyn Ast).collect();
    z3::ast::forall_const(&refs, &[], body)
}

/// Backend existential quantification over explicit bound constants.
pub fn exists(bound: &[Dynamic], body: &Bool) -> Bool {
    let refs: Vec<&dyn Ast> = bound.iter().map(|v| v as &dyn Ast).collect();
    z3::ast::exists_const(&refs, &[], body)
}

/// Universal quantification over boolean constants (relation-valuation
/// abstraction).
pub fn forall_bools(bound: &[Bool], body: &Bool) -> Bool {
    let refs: Vec<&dyn Ast> = bound.iter().map(|v| v as &dyn Ast).collect();
    z3::ast::forall_const(&refs, &[], body)
}

/// Evaluate an integer term in a model, with model completion.
pub fn eval_i64(model: &Model, term: &Int) -> Option<i64> {
    model.eval(term, true).and_then(|v| v.as_i64())
}

/// Evaluate a boolean term in a model, with model completion.
pub fn eval_bool(model: &Model, term: &Bool) -> Option<bool> {
    model.eval(term, true).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_push_pop() {
        let session = Session::new(5_000);
        let x = fresh_int("x");

        session.assert(&x.gt(&Int::from_i64(0)));
        assert_eq!(session.check(), SatResult::Sat);

        session.push();
        session.assert(&x.lt(&Int::from_i64(0)));
        assert_eq!(session.check(), SatResult::Unsat);
        session.pop(1);

        assert_eq!(session.check(), SatResult::Sat);
    }

    #[test]
    fn test_empty_connectives() {
        let session = Session::new(5_000);
        session.assert(&and_all(&[]));
        session.assert(&or_any(&[]).not());
        assert_eq!(session.check(), SatResult::Sat);
    }

    #[test]
    fn test_eval_helpers() {
        let session = Session::new(5_000);
        let x = fresh_int("x");
        session.assert(&x._eq(&Int::from_i64(42)));
        assert_eq!(session.check(), SatResult::Sat);

        let model = session.model().expect("sat check must produce a model");
        assert_eq!(eval_i64(&model, &x), Some(42));
    }
}
