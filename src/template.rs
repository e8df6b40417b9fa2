//! The template protocol.
//!
//! A template is a symbolic stand-in for a syntactic or semantic object
//! whose shape is selected by solver-controlled variables. Every template
//! satisfies one contract:
//!
//! - `constraint()` is satisfiable exactly when the control variables encode
//!   a structurally valid value of the template's domain;
//! - `from_model(m)` decodes the concrete value from a model of that
//!   constraint;
//! - `equals(v)` is a backend term that is true in a model precisely when
//!   the template decodes to `v` there.
//!
//! The round-trip law ties these together: for any model `m` satisfying
//! `constraint()`, `equals(from_model(m))` must hold in `m`.

use crate::error::SynthesisError;
use crate::smt;
use z3::ast::{Ast, Bool, Int};
use z3::Model;

/// Uniform contract satisfied by every symbolic object in the crate:
/// term, formula, and modal-formula templates as well as symbolic finite
/// structures.
pub trait Template {
    /// The concrete domain this template decodes into.
    type Value;

    /// Well-formedness constraint over the template's control variables.
    /// Fallible because structure templates interpret their theory's axioms
    /// while building it.
    fn constraint(&self) -> Result<Bool, SynthesisError>;

    /// Decode the concrete value encoded by a model of `constraint()`.
    fn from_model(&self, model: &Model) -> Result<Self::Value, SynthesisError>;

    /// Backend term: "this template decodes to `value`".
    fn equals(&self, value: &Self::Value) -> Bool;
}

/// An integer control variable constrained to `lower ..= upper`.
///
/// The building block under every node tag and size variable. Cloning
/// shares the underlying backend symbol, which is what lets `substitute`
/// hand out a new template without letting the solver forget the shape it
/// already committed to.
#[derive(Debug, Clone)]
pub struct BoundedIntegerVariable {
    lower: i64,
    upper: i64,
    symbol: Int,
}

impl BoundedIntegerVariable {
    pub fn new(lower: i64, upper: i64) -> Self {
        BoundedIntegerVariable {
            lower,
            upper,
            symbol: smt::fresh_int("node"),
        }
    }

    /// The backend symbol holding the value.
    pub fn symbol(&self) -> &Int {
        &self.symbol
    }

    /// Inclusive value range.
    pub fn range(&self) -> std::ops::RangeInclusive<i64> {
        self.lower..=self.upper
    }

    /// `lower <= symbol <= upper`.
    pub fn constraint(&self) -> Bool {
        Bool::and(&[
            Int::from_i64(self.lower).le(&self.symbol),
            self.symbol.le(&Int::from_i64(self.upper)),
        ])
    }

    /// `symbol == value`.
    pub fn equals(&self, value: i64) -> Bool {
        self.symbol._eq(&Int::from_i64(value))
    }

    /// Extract the value from a model; rejects out-of-range values.
    pub fn from_model(&self, model: &Model) -> Result<i64, SynthesisError> {
        let value = smt::eval_i64(model, &self.symbol).ok_or_else(|| {
            SynthesisError::InvalidModel("model has no value for control variable".to_string())
        })?;

        if value < self.lower || value > self.upper {
            return Err(SynthesisError::InvalidModel(format!(
                "control variable value {} outside {}..={}",
                value, self.lower, self.upper
            )));
        }

        Ok(value)
    }
}

/// Tagged choice over alternative templates of the same domain.
///
/// The constraint picks one child and requires its constraint, leaving the
/// other children unconstrained. There is a single parametric union; term
/// and formula unions are instances, not separate types.
pub struct UnionTemplate<T> {
    node: BoundedIntegerVariable,
    templates: Vec<T>,
}

impl<T> UnionTemplate<T> {
    pub fn new(templates: Vec<T>) -> Self {
        let node = BoundedIntegerVariable::new(1, templates.len() as i64);
        UnionTemplate { node, templates }
    }

    pub fn alternatives(&self) -> &[T] {
        &self.templates
    }

    /// Interpretation of the union: each child's interpretation, gated by
    /// the chosen tag. `interpret` is supplied by the caller because the
    /// interpretation signatures differ across template families.
    pub fn interpret_with(
        &self,
        mut interpret: impl FnMut(&T) -> Result<Bool, SynthesisError>,
    ) -> Result<Bool, SynthesisError> {
        let mut cases = Vec::with_capacity(self.templates.len());

        for (index, template) in self.templates.iter().enumerate() {
            let tag = self.node.equals(index as i64 + 1);
            cases.push(tag.ite(&interpret(template)?, &Bool::from_bool(false)));
        }

        Ok(smt::or_any(&cases))
    }
}

impl<T: Template> Template for UnionTemplate<T> {
    type Value = T::Value;

    fn constraint(&self) -> Result<Bool, SynthesisError> {
        let mut cases = Vec::with_capacity(self.templates.len());

        for (index, template) in self.templates.iter().enumerate() {
            cases.push(Bool::and(&[
                self.node.equals(index as i64 + 1),
                template.constraint()?,
            ]));
        }

        Ok(smt::or_any(&cases))
    }

    fn from_model(&self, model: &Model) -> Result<Self::Value, SynthesisError> {
        let tag = self.node.from_model(model)?;
        let index = (tag - 1) as usize;

        if index >= self.templates.len() {
            return Err(SynthesisError::InvalidModel(format!(
                "union tag {} has no alternative",
                tag
            )));
        }

        self.templates[index].from_model(model)
    }

    fn equals(&self, value: &Self::Value) -> Bool {
        let mut cases = Vec::with_capacity(self.templates.len());

        for (index, template) in self.templates.iter().enumerate() {
            cases.push(Bool::and(&[
                self.node.equals(index as i64 + 1),
                template.equals(value),
            ]));
        }

        smt::or_any(&cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::Session;
    use z3::SatResult;

    #[test]
    fn test_bounded_integer_round_trip() {
        let session = Session::new(5_000);
        let variable = BoundedIntegerVariable::new(0, 5);

        session.assert(&variable.constraint());
        session.assert(&variable.equals(3));
        assert_eq!(session.check(), SatResult::Sat);

        let model = session.model().expect("model after sat");
        assert_eq!(variable.from_model(&model).unwrap(), 3);
    }

    #[test]
    fn test_bounded_integer_range_enforced() {
        let session = Session::new(5_000);
        let variable = BoundedIntegerVariable::new(1, 4);

        session.assert(&variable.constraint());
        session.assert(&variable.equals(7));
        assert_eq!(session.check(), SatResult::Unsat);
    }
}
