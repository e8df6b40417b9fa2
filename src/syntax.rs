//! Syntax of many-sorted first-order logic.
//!
//! Terms and formulas are immutable trees. Each supports capture-avoiding
//! substitution, free-variable computation, and interpretation in a
//! `Structure` under a valuation of free variables to backend terms.
//!
//! Interpretation is compositional: interpreting `f(t1, ..., tn)` depends
//! only on the interpretations of each `ti` and on the structure's
//! assignment for `f`.

use crate::error::SynthesisError;
use crate::language::{FunctionSymbol, RelationSymbol, Sort};
use crate::smt;
use crate::structure::Structure;
use std::collections::{HashMap, HashSet};
use std::fmt;
use z3::ast::{Ast, Bool, Dynamic};

/// A sorted variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    pub sort: Sort,
}

impl Variable {
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        Variable {
            name: name.into(),
            sort,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.sort)
    }
}

/// A substitution of terms for variables.
pub type Substitution = HashMap<Variable, Term>;

/// A valuation of free variables to backend terms.
pub type ValuationMap = HashMap<Variable, Dynamic>;

/// First-order terms.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Variable(Variable),
    Application(FunctionSymbol, Vec<Term>),
}

impl Term {
    /// The term's sort, derived from its shape.
    pub fn sort(&self) -> &Sort {
        match self {
            Term::Variable(variable) => &variable.sort,
            Term::Application(symbol, _) => &symbol.output_sort,
        }
    }

    pub fn substitute(&self, substitution: &Substitution) -> Term {
        match self {
            Term::Variable(variable) => substitution
                .get(variable)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Term::Application(symbol, arguments) => Term::Application(
                symbol.clone(),
                arguments
                    .iter()
                    .map(|argument| argument.substitute(substitution))
                    .collect(),
            ),
        }
    }

    pub fn free_variables(&self) -> HashSet<Variable> {
        match self {
            Term::Variable(variable) => HashSet::from([variable.clone()]),
            Term::Application(_, arguments) => arguments
                .iter()
                .flat_map(Term::free_variables)
                .collect(),
        }
    }

    pub fn interpret(
        &self,
        structure: &dyn Structure,
        valuation: &ValuationMap,
    ) -> Result<Dynamic, SynthesisError> {
        match self {
            Term::Variable(variable) => valuation.get(variable).cloned().ok_or_else(|| {
                SynthesisError::UnboundVariable(format!("unable to interpret {}", variable))
            }),
            Term::Application(symbol, arguments) => {
                let interpreted: Result<Vec<Dynamic>, SynthesisError> = arguments
                    .iter()
                    .map(|argument| argument.interpret(structure, valuation))
                    .collect();
                structure.interpret_function(symbol, &interpreted?)
            }
        }
    }

    /// Structural equality against another concrete term, as a backend
    /// constant. Cross-domain comparisons are `false`, never an error.
    pub fn equals(&self, value: &Term) -> Bool {
        Bool::from_bool(self == value)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(variable) => write!(f, "{}", variable.name),
            Term::Application(symbol, arguments) => {
                if arguments.is_empty() {
                    return write!(f, "{}", symbol.name);
                }
                let rendered: Vec<String> =
                    arguments.iter().map(|argument| argument.to_string()).collect();
                write!(f, "{}({})", symbol.name, rendered.join(", "))
            }
        }
    }
}

/// First-order formulas.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Verum,
    Falsum,
    RelationApplication(RelationSymbol, Vec<Term>),
    Equality(Term, Term),
    Conjunction(Box<Formula>, Box<Formula>),
    Disjunction(Box<Formula>, Box<Formula>),
    Negation(Box<Formula>),
    Implication(Box<Formula>, Box<Formula>),
    Equivalence(Box<Formula>, Box<Formula>),
    UniversalQuantification(Variable, Box<Formula>),
    ExistentialQuantification(Variable, Box<Formula>),
}

impl Formula {
    pub fn conjunction(left: Formula, right: Formula) -> Formula {
        Formula::Conjunction(Box::new(left), Box::new(right))
    }

    pub fn disjunction(left: Formula, right: Formula) -> Formula {
        Formula::Disjunction(Box::new(left), Box::new(right))
    }

    pub fn negation(formula: Formula) -> Formula {
        Formula::Negation(Box::new(formula))
    }

    pub fn implication(left: Formula, right: Formula) -> Formula {
        Formula::Implication(Box::new(left), Box::new(right))
    }

    pub fn equivalence(left: Formula, right: Formula) -> Formula {
        Formula::Equivalence(Box::new(left), Box::new(right))
    }

    pub fn universal(variable: Variable, body: Formula) -> Formula {
        Formula::UniversalQuantification(variable, Box::new(body))
    }

    pub fn existential(variable: Variable, body: Formula) -> Formula {
        Formula::ExistentialQuantification(variable, Box::new(body))
    }

    /// Capture-avoiding substitution: quantifiers drop their bound variable
    /// from the substitution before recursing.
    pub fn substitute(&self, substitution: &Substitution) -> Formula {
        match self {
            Formula::Verum | Formula::Falsum => self.clone(),
            Formula::RelationApplication(symbol, arguments) => Formula::RelationApplication(
                symbol.clone(),
                arguments
                    .iter()
                    .map(|argument| argument.substitute(substitution))
                    .collect(),
            ),
            Formula::Equality(left, right) => Formula::Equality(
                left.substitute(substitution),
                right.substitute(substitution),
            ),
            Formula::Conjunction(left, right) => Formula::conjunction(
                left.substitute(substitution),
                right.substitute(substitution),
            ),
            Formula::Disjunction(left, right) => Formula::disjunction(
                left.substitute(substitution),
                right.substitute(substitution),
            ),
            Formula::Negation(formula) => Formula::negation(formula.substitute(substitution)),
            Formula::Implication(left, right) => Formula::implication(
                left.substitute(substitution),
                right.substitute(substitution),
            ),
            Formula::Equivalence(left, right) => Formula::equivalence(
                left.substitute(substitution),
                right.substitute(substitution),
            ),
            Formula::UniversalQuantification(variable, body) => {
                let body = body.substitute(&without(substitution, variable));
                Formula::universal(variable.clone(), body)
            }
            Formula::ExistentialQuantification(variable, body) => {
                let body = body.substitute(&without(substitution, variable));
                Formula::existential(variable.clone(), body)
            }
        }
    }

    pub fn free_variables(&self) -> HashSet<Variable> {
        match self {
            Formula::Verum | Formula::Falsum => HashSet::new(),
            Formula::RelationApplication(_, arguments) => arguments
                .iter()
                .flat_map(Term::free_variables)
                .collect(),
            Formula::Equality(left, right) => {
                let mut free = left.free_variables();
                free.extend(right.free_variables());
                free
            }
            Formula::Conjunction(left, right)
            | Formula::Disjunction(left, right)
            | Formula::Implication(left, right)
            | Formula::Equivalence(left, right) => {
                let mut free = left.free_variables();
                free.extend(right.free_variables());
                free
            }
            Formula::Negation(formula) => formula.free_variables(),
            Formula::UniversalQuantification(variable, body)
            | Formula::ExistentialQuantification(variable, body) => {
                let mut free = body.free_variables();
                free.remove(variable);
                free
            }
        }
    }

    pub fn interpret(
        &self,
        structure: &dyn Structure,
        valuation: &ValuationMap,
    ) -> Result<Bool, SynthesisError> {
        match self {
            Formula::Verum => Ok(Bool::from_bool(true)),
            Formula::Falsum => Ok(Bool::from_bool(false)),
            Formula::RelationApplication(symbol, arguments) => {
                let interpreted: Result<Vec<Dynamic>, SynthesisError> = arguments
                    .iter()
                    .map(|argument| argument.interpret(structure, valuation))
                    .collect();
                structure.interpret_relation(symbol, &interpreted?)
            }
            Formula::Equality(left, right) => {
                let left = left.interpret(structure, valuation)?;
                let right = right.interpret(structure, valuation)?;
                Ok(left._eq(&right))
            }
            Formula::Conjunction(left, right) => Ok(Bool::and(&[
                left.interpret(structure, valuation)?,
                right.interpret(structure, valuation)?,
            ])),
            Formula::Disjunction(left, right) => Ok(Bool::or(&[
                left.interpret(structure, valuation)?,
                right.interpret(structure, valuation)?,
            ])),
            Formula::Negation(formula) => Ok(formula.interpret(structure, valuation)?.not()),
            Formula::Implication(left, right) => Ok(left
                .interpret(structure, valuation)?
                .implies(&right.interpret(structure, valuation)?)),
            Formula::Equivalence(left, right) => Ok(left
                .interpret(structure, valuation)?
                ._eq(&right.interpret(structure, valuation)?)),
            Formula::UniversalQuantification(variable, body) => {
                let carrier = structure.interpret_sort(&variable.sort)?;
                let symbol = smt::fresh_const(&variable.name, &carrier.smt_sort());
                let mut extended = valuation.clone();
                extended.insert(variable.clone(), symbol.clone());
                let body = body.interpret(structure, &extended)?;
                carrier.universally_quantify(&symbol, &body)
            }
            Formula::ExistentialQuantification(variable, body) => {
                let carrier = structure.interpret_sort(&variable.sort)?;
                let symbol = smt::fresh_const(&variable.name, &carrier.smt_sort());
                let mut extended = valuation.clone();
                extended.insert(variable.clone(), symbol.clone());
                let body = body.interpret(structure, &extended)?;
                carrier.existentially_quantify(&symbol, &body)
            }
        }
    }

    /// Universal closure over all free variables.
    pub fn quantify_all_free_variables(&self) -> Formula {
        let mut free: Vec<Variable> = self.free_variables().into_iter().collect();
        free.sort_by(|a, b| a.name.cmp(&b.name));

        let mut formula = self.clone();
        for variable in free {
            formula = Formula::universal(variable, formula);
        }
        formula
    }

    /// Structural equality against another concrete formula, as a backend
    /// constant.
    pub fn equals(&self, value: &Formula) -> Bool {
        Bool::from_bool(self == value)
    }
}

fn without(substitution: &Substitution, variable: &Variable) -> Substitution {
    let mut restricted = substitution.clone();
    restricted.remove(variable);
    restricted
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Verum => write!(f, "true"),
            Formula::Falsum => write!(f, "false"),
            Formula::RelationApplication(symbol, arguments) => {
                let rendered: Vec<String> =
                    arguments.iter().map(|argument| argument.to_string()).collect();
                write!(f, "{}({})", symbol.name, rendered.join(", "))
            }
            Formula::Equality(left, right) => write!(f, "{} = {}", left, right),
            Formula::Conjunction(left, right) => write!(f, "({} /\\ {})", left, right),
            Formula::Disjunction(left, right) => write!(f, "({} \\/ {})", left, right),
            Formula::Negation(formula) => write!(f, "not {}", formula),
            Formula::Implication(left, right) => write!(f, "({} -> {})", left, right),
            Formula::Equivalence(left, right) => write!(f, "({} <-> {})", left, right),
            Formula::UniversalQuantification(variable, body) => {
                write!(f, "(forall {}. {})", variable, body)
            }
            Formula::ExistentialQuantification(variable, body) => {
                write!(f, "(exists {}. {})", variable, body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn world() -> Sort {
        Sort::new("W")
    }

    fn language_with_function() -> Language {
        Language::new(
            vec![world()],
            vec![FunctionSymbol::new("f", vec![world()], world())],
            vec![RelationSymbol::new("R", vec![world(), world()])],
        )
    }

    fn var(name: &str) -> Variable {
        Variable::new(name, world())
    }

    #[test]
    fn test_substitution_replaces_free_occurrences() {
        let language = language_with_function();
        let f = language.get_function_symbol("f").unwrap().clone();
        let r = language.get_relation_symbol("R").unwrap().clone();

        let x = var("x");
        let y = var("y");
        let formula = Formula::RelationApplication(
            r,
            vec![Term::Variable(x.clone()), Term::Variable(y.clone())],
        );

        let mut substitution = Substitution::new();
        substitution.insert(
            x.clone(),
            Term::Application(f.clone(), vec![Term::Variable(y.clone())]),
        );

        let substituted = formula.substitute(&substitution);
        let free = substituted.free_variables();
        assert!(!free.contains(&x));
        assert!(free.contains(&y));
        assert_eq!(substituted.to_string(), "R(f(y), y)");
    }

    #[test]
    fn test_quantifier_shields_bound_variable() {
        let language = language_with_function();
        let r = language.get_relation_symbol("R").unwrap().clone();

        let x = var("x");
        let y = var("y");
        let formula = Formula::universal(
            x.clone(),
            Formula::RelationApplication(
                r,
                vec![Term::Variable(x.clone()), Term::Variable(y.clone())],
            ),
        );

        // substituting for the bound variable is a no-op under the binder
        let mut substitution = Substitution::new();
        substitution.insert(x.clone(), Term::Variable(y.clone()));

        let substituted = formula.substitute(&substitution);
        assert_eq!(substituted, formula);
        assert_eq!(
            formula.free_variables(),
            HashSet::from([y.clone()])
        );
    }

    #[test]
    fn test_free_variable_equation_under_substitution() {
        let language = language_with_function();
        let f = language.get_function_symbol("f").unwrap().clone();
        let r = language.get_relation_symbol("R").unwrap().clone();

        let x = var("x");
        let y = var("y");
        let z = var("z");
        let formula = Formula::RelationApplication(
            r,
            vec![Term::Variable(x.clone()), Term::Variable(y.clone())],
        );

        // x maps to f(z): free variables become (free \ {x}) ∪ {z}
        let mut substitution = Substitution::new();
        substitution.insert(
            x.clone(),
            Term::Application(f, vec![Term::Variable(z.clone())]),
        );

        let substituted = formula.substitute(&substitution);
        assert_eq!(substituted.free_variables(), HashSet::from([y, z]));
    }

    #[test]
    fn test_universal_closure() {
        let language = language_with_function();
        let r = language.get_relation_symbol("R").unwrap().clone();

        let formula = Formula::RelationApplication(
            r,
            vec![Term::Variable(var("x")), Term::Variable(var("y"))],
        );

        let closed = formula.quantify_all_free_variables();
        assert!(closed.free_variables().is_empty());
        // outermost binder is the lexicographically last variable
        assert_eq!(closed.to_string(), "(forall y:W. (forall x:W. R(x, y)))");
    }

    #[test]
    fn test_cross_domain_equals_is_false() {
        let x = Term::Variable(var("x"));
        let y = Term::Variable(var("y"));
        assert_eq!(x.equals(&y), Bool::from_bool(false));
        assert_eq!(x.equals(&x), Bool::from_bool(true));
    }
}
