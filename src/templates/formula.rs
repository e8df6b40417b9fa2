//! Templates for unknown atomic and quantifier-free formulas.

use crate::error::SynthesisError;
use crate::language::Language;
use crate::smt;
use crate::structure::Structure;
use crate::syntax::{Formula, Substitution, ValuationMap, Variable};
use crate::template::{BoundedIntegerVariable, Template};
use crate::templates::term::TermTemplate;
use std::collections::HashSet;
use z3::ast::{Ast, Bool};
use z3::Model;

/// Template for an atomic formula: `⊥`, `⊤` (when constants are allowed),
/// or a relation applied to term templates of bounded depth.
///
/// Tags: `0` absent, `1` falsum, `2` verum, `3..` one per relation symbol.
pub struct AtomicFormulaTemplate<'a> {
    language: &'a Language,
    term_depth: usize,
    /// Allow bottom and top as candidates.
    allow_constant: bool,
    node: BoundedIntegerVariable,
    subterms: Vec<TermTemplate<'a>>,
}

impl<'a> AtomicFormulaTemplate<'a> {
    pub fn new(
        language: &'a Language,
        free_vars: &[Variable],
        term_depth: usize,
        allow_constant: bool,
    ) -> Self {
        let tags = 2 + language.relation_symbols.len();
        AtomicFormulaTemplate {
            language,
            term_depth,
            allow_constant,
            node: BoundedIntegerVariable::new(0, tags as i64),
            subterms: (0..language.max_relation_arity())
                .map(|_| TermTemplate::new(language, free_vars, term_depth, None))
                .collect(),
        }
    }

    pub fn free_variables(&self) -> HashSet<Variable> {
        self.subterms
            .iter()
            .flat_map(TermTemplate::free_variables)
            .collect()
    }

    /// Substitute through the argument templates; the node tag is shared
    /// with `self`.
    pub fn substitute(&self, substitution: &Substitution) -> AtomicFormulaTemplate<'a> {
        AtomicFormulaTemplate {
            language: self.language,
            term_depth: self.term_depth,
            allow_constant: self.allow_constant,
            node: self.node.clone(),
            subterms: self
                .subterms
                .iter()
                .map(|subterm| subterm.substitute(substitution))
                .collect(),
        }
    }

    pub fn is_null_constraint(&self) -> Bool {
        let mut conjuncts = vec![self.node.equals(0)];
        for subterm in &self.subterms {
            conjuncts.push(subterm.is_null_constraint());
        }
        smt::and_all(&conjuncts)
    }

    fn well_formedness_constraint(&self) -> Bool {
        let mut cases = Vec::new();

        for tag in 1..=self.tag_count() {
            if tag <= 2 {
                if !self.allow_constant {
                    continue;
                }

                let mut conjuncts = vec![self.node.equals(tag as i64)];
                for subterm in &self.subterms {
                    conjuncts.push(subterm.is_null_constraint());
                }
                cases.push(smt::and_all(&conjuncts));
            } else {
                let symbol = &self.language.relation_symbols[tag - 3];
                let arity = symbol.arity();

                let mut conjuncts = vec![self.node.equals(tag as i64)];
                for (input_sort, subterm) in symbol.input_sorts.iter().zip(&self.subterms) {
                    conjuncts.push(subterm.well_formedness_constraint(input_sort));
                }
                for subterm in &self.subterms[arity..] {
                    conjuncts.push(subterm.is_null_constraint());
                }
                cases.push(smt::and_all(&conjuncts));
            }
        }

        Bool::and(&[smt::or_any(&cases), self.node.constraint()])
    }

    pub fn interpret(
        &self,
        structure: &dyn Structure,
        valuation: &ValuationMap,
    ) -> Result<Bool, SynthesisError> {
        let mut interpretation = Bool::from_bool(false);

        for tag in 1..=self.tag_count() {
            let case = match tag {
                1 => Bool::from_bool(false),
                2 => Bool::from_bool(true),
                _ => {
                    let symbol = &self.language.relation_symbols[tag - 3];
                    let arity = symbol.arity();

                    let mut arguments = Vec::with_capacity(arity);
                    for (input_sort, subterm) in symbol.input_sorts.iter().zip(&self.subterms) {
                        arguments.push(subterm.interpret_as_sort(
                            input_sort,
                            structure,
                            valuation,
                        )?);
                    }

                    structure.interpret_relation(symbol, &arguments)?
                }
            };

            interpretation = self.node.equals(tag as i64).ite(&case, &interpretation);
        }

        Ok(interpretation)
    }

    fn tag_count(&self) -> usize {
        2 + self.language.relation_symbols.len()
    }
}

impl Template for AtomicFormulaTemplate<'_> {
    type Value = Formula;

    fn constraint(&self) -> Result<Bool, SynthesisError> {
        Ok(self.well_formedness_constraint())
    }

    fn from_model(&self, model: &Model) -> Result<Formula, SynthesisError> {
        let tag = self.node.from_model(model)?;

        match tag {
            0 => Err(SynthesisError::InvalidModel(
                "null node tag at an atomic formula that must exist".to_string(),
            )),
            1 => Ok(Formula::Falsum),
            2 => Ok(Formula::Verum),
            _ => {
                let symbol = self.language.relation_symbols[tag as usize - 3].clone();
                let arguments: Result<Vec<_>, SynthesisError> = self.subterms
                    [..symbol.arity()]
                    .iter()
                    .map(|subterm| subterm.from_model(model))
                    .collect();
                Ok(Formula::RelationApplication(symbol, arguments?))
            }
        }
    }

    fn equals(&self, value: &Formula) -> Bool {
        match value {
            Formula::Falsum => self.node.equals(1),
            Formula::Verum => self.node.equals(2),
            Formula::RelationApplication(symbol, arguments) => {
                let Some(index) = self
                    .language
                    .relation_symbols
                    .iter()
                    .position(|candidate| candidate == symbol)
                else {
                    return Bool::from_bool(false);
                };

                let mut conjuncts = vec![self.node.equals(index as i64 + 3)];
                for (argument, subterm) in arguments.iter().zip(&self.subterms) {
                    conjuncts.push(subterm.equals(argument));
                }
                smt::and_all(&conjuncts)
            }
            _ => Bool::from_bool(false),
        }
    }
}

/// Template for a quantifier-free formula of bounded connective depth.
///
/// Tags: `0` absent, `1` atomic (delegating to an owned
/// `AtomicFormulaTemplate`), `2` conjunction, `3` disjunction, `4` negation,
/// `5` implication, `6` equivalence. At formula depth `0` only the atomic
/// tag is permitted.
pub struct QuantifierFreeFormulaTemplate<'a> {
    language: &'a Language,
    term_depth: usize,
    formula_depth: usize,
    allow_constant: bool,
    node: BoundedIntegerVariable,
    atom: AtomicFormulaTemplate<'a>,
    subformulas: Vec<QuantifierFreeFormulaTemplate<'a>>,
}

impl<'a> QuantifierFreeFormulaTemplate<'a> {
    pub fn new(
        language: &'a Language,
        free_vars: &[Variable],
        term_depth: usize,
        formula_depth: usize,
        allow_constant: bool,
    ) -> Self {
        let subformulas = if formula_depth == 0 {
            Vec::new()
        } else {
            (0..2)
                .map(|_| {
                    QuantifierFreeFormulaTemplate::new(
                        language,
                        free_vars,
                        term_depth,
                        formula_depth - 1,
                        allow_constant,
                    )
                })
                .collect()
        };

        QuantifierFreeFormulaTemplate {
            language,
            term_depth,
            formula_depth,
            allow_constant,
            node: BoundedIntegerVariable::new(0, 6),
            atom: AtomicFormulaTemplate::new(language, free_vars, term_depth, allow_constant),
            subformulas,
        }
    }

    pub fn free_variables(&self) -> HashSet<Variable> {
        let mut free = self.atom.free_variables();
        for subformula in &self.subformulas {
            free.extend(subformula.free_variables());
        }
        free
    }

    pub fn substitute(&self, substitution: &Substitution) -> QuantifierFreeFormulaTemplate<'a> {
        QuantifierFreeFormulaTemplate {
            language: self.language,
            term_depth: self.term_depth,
            formula_depth: self.formula_depth,
            allow_constant: self.allow_constant,
            node: self.node.clone(),
            atom: self.atom.substitute(substitution),
            subformulas: self
                .subformulas
                .iter()
                .map(|subformula| subformula.substitute(substitution))
                .collect(),
        }
    }

    pub fn is_null_constraint(&self) -> Bool {
        let mut conjuncts = vec![self.node.equals(0), self.atom.is_null_constraint()];
        for subformula in &self.subformulas {
            conjuncts.push(subformula.is_null_constraint());
        }
        smt::and_all(&conjuncts)
    }

    /// Arity of the connective selected by a tag in `2..=6`.
    fn connective_arity(tag: usize) -> usize {
        match tag {
            4 => 1,
            _ => 2,
        }
    }

    fn apply_connective(tag: usize, mut children: Vec<Formula>) -> Formula {
        match tag {
            2 => {
                let right = children.pop().unwrap_or(Formula::Falsum);
                let left = children.pop().unwrap_or(Formula::Falsum);
                Formula::conjunction(left, right)
            }
            3 => {
                let right = children.pop().unwrap_or(Formula::Falsum);
                let left = children.pop().unwrap_or(Formula::Falsum);
                Formula::disjunction(left, right)
            }
            4 => Formula::negation(children.pop().unwrap_or(Formula::Falsum)),
            5 => {
                let right = children.pop().unwrap_or(Formula::Falsum);
                let left = children.pop().unwrap_or(Formula::Falsum);
                Formula::implication(left, right)
            }
            _ => {
                let right = children.pop().unwrap_or(Formula::Falsum);
                let left = children.pop().unwrap_or(Formula::Falsum);
                Formula::equivalence(left, right)
            }
        }
    }

    pub fn interpret(
        &self,
        structure: &dyn Structure,
        valuation: &ValuationMap,
    ) -> Result<Bool, SynthesisError> {
        let mut interpretation = Bool::from_bool(false);

        for tag in self.node.range() {
            let tag = tag as usize;

            if tag == 1 {
                let case = self.atom.interpret(structure, valuation)?;
                interpretation = self.node.equals(1).ite(&case, &interpretation);
            } else if tag >= 2 && self.formula_depth != 0 {
                let left = self.subformulas[0].interpret(structure, valuation)?;
                let case = match tag {
                    2 => Bool::and(&[
                        left,
                        self.subformulas[1].interpret(structure, valuation)?,
                    ]),
                    3 => Bool::or(&[
                        left,
                        self.subformulas[1].interpret(structure, valuation)?,
                    ]),
                    4 => left.not(),
                    5 => left.implies(&self.subformulas[1].interpret(structure, valuation)?),
                    _ => left._eq(&self.subformulas[1].interpret(structure, valuation)?),
                };
                interpretation = self.node.equals(tag as i64).ite(&case, &interpretation);
            }
        }

        Ok(interpretation)
    }
}

impl Template for QuantifierFreeFormulaTemplate<'_> {
    type Value = Formula;

    fn constraint(&self) -> Result<Bool, SynthesisError> {
        let mut cases = Vec::new();

        for tag in self.node.range() {
            let tag = tag as usize;

            if tag == 1 {
                let mut conjuncts = vec![self.node.equals(1), self.atom.constraint()?];
                for subformula in &self.subformulas {
                    conjuncts.push(subformula.is_null_constraint());
                }
                cases.push(smt::and_all(&conjuncts));
            } else if tag >= 2 && self.formula_depth != 0 {
                let arity = Self::connective_arity(tag);

                let mut conjuncts =
                    vec![self.node.equals(tag as i64), self.atom.is_null_constraint()];
                for subformula in &self.subformulas[..arity] {
                    conjuncts.push(subformula.constraint()?);
                }
                for subformula in &self.subformulas[arity..] {
                    conjuncts.push(subformula.is_null_constraint());
                }
                cases.push(smt::and_all(&conjuncts));
            }
        }

        Ok(smt::or_any(&cases))
    }

    fn from_model(&self, model: &Model) -> Result<Formula, SynthesisError> {
        let tag = self.node.from_model(model)?;

        match tag {
            0 => Err(SynthesisError::InvalidModel(
                "null node tag at a formula that must exist".to_string(),
            )),
            1 => self.atom.from_model(model),
            _ if self.formula_depth != 0 => {
                let tag = tag as usize;
                let arity = Self::connective_arity(tag);
                let children: Result<Vec<Formula>, SynthesisError> = self.subformulas[..arity]
                    .iter()
                    .map(|subformula| subformula.from_model(model))
                    .collect();
                Ok(Self::apply_connective(tag, children?))
            }
            tag => Err(SynthesisError::InvalidModel(format!(
                "connective tag {} at formula depth 0",
                tag
            ))),
        }
    }

    fn equals(&self, value: &Formula) -> Bool {
        match value {
            Formula::Verum
            | Formula::Falsum
            | Formula::RelationApplication(_, _)
            | Formula::Equality(_, _) => self.atom.equals(value),
            _ if self.formula_depth == 0 => Bool::from_bool(false),
            Formula::Conjunction(left, right) => Bool::and(&[
                self.node.equals(2),
                self.subformulas[0].equals(left),
                self.subformulas[1].equals(right),
            ]),
            Formula::Disjunction(left, right) => Bool::and(&[
                self.node.equals(3),
                self.subformulas[0].equals(left),
                self.subformulas[1].equals(right),
            ]),
            Formula::Negation(inner) => Bool::and(&[
                self.node.equals(4),
                self.subformulas[0].equals(inner),
            ]),
            Formula::Implication(left, right) => Bool::and(&[
                self.node.equals(5),
                self.subformulas[0].equals(left),
                self.subformulas[1].equals(right),
            ]),
            Formula::Equivalence(left, right) => Bool::and(&[
                self.node.equals(6),
                self.subformulas[0].equals(left),
                self.subformulas[1].equals(right),
            ]),
            _ => Bool::from_bool(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{RelationSymbol, Sort};

    fn frame_language() -> Language {
        let world = Sort::new("W");
        Language::new(
            vec![world.clone()],
            vec![],
            vec![RelationSymbol::new("R", vec![world.clone(), world])],
        )
    }

    #[test]
    fn test_atomic_equals_dispatch() {
        let language = frame_language();
        let x = Variable::new("x", Sort::new("W"));
        let template = AtomicFormulaTemplate::new(&language, &[x.clone()], 0, false);

        // verum is not admitted without allow_constant, but equals still
        // builds the tag constraint; cross-domain values collapse to false
        let equality = Formula::Equality(
            crate::syntax::Term::Variable(x.clone()),
            crate::syntax::Term::Variable(x),
        );
        assert_eq!(template.equals(&equality), Bool::from_bool(false));
    }

    #[test]
    fn test_connective_arity() {
        assert_eq!(QuantifierFreeFormulaTemplate::connective_arity(2), 2);
        assert_eq!(QuantifierFreeFormulaTemplate::connective_arity(4), 1);
        assert_eq!(QuantifierFreeFormulaTemplate::connective_arity(6), 2);
    }
}
