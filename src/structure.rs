//! Interpretations of a language: carriers and structures.
//!
//! A `Structure` assigns every sort a `Carrier` and every symbol a function
//! or relation over carriers, producing backend terms. Structures come in
//! three flavors behind one trait: the symbolic finite structure template
//! (`finite_model::FiniteModelTemplate`), the concrete finite structure
//! extracted from a counterexample (`FiniteStructure` here), and anything a
//! caller supplies. Interpretation code never cares which one it holds.
//!
//! Quantifier encoding policy: finite carriers (symbolic or concrete)
//! unroll quantifiers into guarded conjunctions/disjunctions over their
//! element range, keeping candidate-extraction models quantifier-free.
//! Only opaque carriers emit backend quantifiers.

use crate::error::SynthesisError;
use crate::language::{FunctionSymbol, RelationSymbol, Sort};
use crate::smt::{self, SmtSort};
use crate::template::BoundedIntegerVariable;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use z3::ast::{Ast, Bool, Dynamic, Int};

/// The universe of values a sort ranges over in a particular structure.
#[derive(Debug, Clone)]
pub enum Carrier {
    /// `{0, ..., size-1}` where `size` is a solver-controlled variable with
    /// a static upper bound.
    FiniteSymbolic { size: BoundedIntegerVariable },

    /// `{0, ..., size-1}` with a known size.
    FiniteConcrete { size: usize },

    /// A hooked backend sort; membership is trivially true and
    /// quantification falls back to backend quantifiers.
    Unbounded { smt_sort: SmtSort },
}

impl Carrier {
    /// Backend sort of the carrier's elements.
    pub fn smt_sort(&self) -> SmtSort {
        match self {
            Carrier::FiniteSymbolic { .. } | Carrier::FiniteConcrete { .. } => SmtSort::int(),
            Carrier::Unbounded { smt_sort } => smt_sort.clone(),
        }
    }

    /// Static bound on the element range, when one exists.
    pub fn static_bound(&self) -> Option<usize> {
        match self {
            Carrier::FiniteSymbolic { size } => Some(*size.range().end() as usize),
            Carrier::FiniteConcrete { size } => Some(*size),
            Carrier::Unbounded { .. } => None,
        }
    }

    /// Membership predicate `in_carrier(element)`.
    pub fn contains(&self, element: &Dynamic) -> Result<Bool, SynthesisError> {
        match self {
            Carrier::FiniteSymbolic { size } => {
                let element = as_integer(element)?;
                Ok(Bool::and(&[
                    Int::from_i64(0).le(&element),
                    element.lt(size.symbol()),
                ]))
            }
            Carrier::FiniteConcrete { size } => {
                let element = as_integer(element)?;
                Ok(Bool::and(&[
                    Int::from_i64(0).le(&element),
                    element.lt(&Int::from_i64(*size as i64)),
                ]))
            }
            Carrier::Unbounded { .. } => Ok(Bool::from_bool(true)),
        }
    }

    /// Close `body` universally over `variable` ranging over this carrier.
    pub fn universally_quantify(
        &self,
        variable: &Dynamic,
        body: &Bool,
    ) -> Result<Bool, SynthesisError> {
        match self {
            Carrier::FiniteSymbolic { size } => {
                let mut instances = Vec::new();
                for element in 0..=*size.range().end() - 1 {
                    let guard = Int::from_i64(element).lt(size.symbol());
                    instances.push(guard.implies(&instantiate(body, variable, element)));
                }
                Ok(smt::and_all(&instances))
            }
            Carrier::FiniteConcrete { size } => {
                let mut instances = Vec::new();
                for element in 0..*size as i64 {
                    instances.push(instantiate(body, variable, element));
                }
                Ok(smt::and_all(&instances))
            }
            Carrier::Unbounded { .. } => Ok(smt::forall(&[variable.clone()], body)),
        }
    }

    /// Close `body` existentially over `variable` ranging over this carrier.
    pub fn existentially_quantify(
        &self,
        variable: &Dynamic,
        body: &Bool,
    ) -> Result<Bool, SynthesisError> {
        match self {
            Carrier::FiniteSymbolic { size } => {
                let mut instances = Vec::new();
                for element in 0..=*size.range().end() - 1 {
                    let guard = Int::from_i64(element).lt(size.symbol());
                    instances.push(Bool::and(&[guard, instantiate(body, variable, element)]));
                }
                Ok(smt::or_any(&instances))
            }
            Carrier::FiniteConcrete { size } => {
                let mut instances = Vec::new();
                for element in 0..*size as i64 {
                    instances.push(instantiate(body, variable, element));
                }
                Ok(smt::or_any(&instances))
            }
            Carrier::Unbounded { .. } => Ok(smt::exists(&[variable.clone()], body)),
        }
    }
}

fn instantiate(body: &Bool, variable: &Dynamic, element: i64) -> Bool {
    let value: Dynamic = Int::from_i64(element).into();
    body.substitute(&[(variable, &value)])
}

fn as_integer(element: &Dynamic) -> Result<Int, SynthesisError> {
    element.as_int().ok_or_else(|| {
        SynthesisError::SignatureMismatch(
            "finite carrier element is not integer-sorted".to_string(),
        )
    })
}

/// Interpretation of a language: carriers for sorts, extensions for symbols.
pub trait Structure {
    fn interpret_sort(&self, sort: &Sort) -> Result<&Carrier, SynthesisError>;

    fn interpret_function(
        &self,
        symbol: &FunctionSymbol,
        arguments: &[Dynamic],
    ) -> Result<Dynamic, SynthesisError>;

    fn interpret_relation(
        &self,
        symbol: &RelationSymbol,
        arguments: &[Dynamic],
    ) -> Result<Bool, SynthesisError>;
}

/// A concrete finite structure: explicit sizes, function tables, relation
/// tuple sets. Produced by `FiniteModelTemplate::from_model`, or built by
/// hand in tests.
#[derive(Debug, Clone)]
pub struct FiniteStructure {
    sizes: BTreeMap<String, usize>,
    functions: BTreeMap<String, BTreeMap<Vec<i64>, i64>>,
    relations: BTreeMap<String, BTreeSet<Vec<i64>>>,
    carriers: BTreeMap<String, Carrier>,
}

impl PartialEq for FiniteStructure {
    fn eq(&self, other: &Self) -> bool {
        // Carriers are derived from the sizes; comparing them would only
        // repeat the size comparison.
        self.sizes == other.sizes
            && self.functions == other.functions
            && self.relations == other.relations
    }
}

impl FiniteStructure {
    pub fn new(
        sorts: &[Sort],
        sizes: BTreeMap<String, usize>,
        functions: BTreeMap<String, BTreeMap<Vec<i64>, i64>>,
        relations: BTreeMap<String, BTreeSet<Vec<i64>>>,
    ) -> Result<Self, SynthesisError> {
        let mut carriers = BTreeMap::new();

        for sort in sorts {
            match &sort.smt_hook {
                Some(hook) => {
                    carriers.insert(
                        sort.name.clone(),
                        Carrier::Unbounded {
                            smt_sort: hook.smt_sort(),
                        },
                    );
                }
                None => {
                    let size = *sizes.get(&sort.name).ok_or_else(|| {
                        SynthesisError::SignatureMismatch(format!(
                            "no carrier size for sort {}",
                            sort
                        ))
                    })?;
                    if size == 0 {
                        return Err(SynthesisError::SignatureMismatch(format!(
                            "sort {} has an empty carrier",
                            sort
                        )));
                    }
                    carriers.insert(sort.name.clone(), Carrier::FiniteConcrete { size });
                }
            }
        }

        Ok(FiniteStructure {
            sizes,
            functions,
            relations,
            carriers,
        })
    }

    pub fn size_of(&self, sort: &Sort) -> Option<usize> {
        self.sizes.get(&sort.name).copied()
    }

    pub fn function_table(&self, name: &str) -> Option<&BTreeMap<Vec<i64>, i64>> {
        self.functions.get(name)
    }

    pub fn relation_table(&self, name: &str) -> Option<&BTreeSet<Vec<i64>>> {
        self.relations.get(name)
    }
}

impl Structure for FiniteStructure {
    fn interpret_sort(&self, sort: &Sort) -> Result<&Carrier, SynthesisError> {
        self.carriers.get(&sort.name).ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!("sort {} not interpreted", sort))
        })
    }

    fn interpret_function(
        &self,
        symbol: &FunctionSymbol,
        arguments: &[Dynamic],
    ) -> Result<Dynamic, SynthesisError> {
        if arguments.len() != symbol.arity() {
            return Err(SynthesisError::SignatureMismatch(format!(
                "function {} applied to {} arguments, expects {}",
                symbol.name,
                arguments.len(),
                symbol.arity()
            )));
        }

        if let Some(hook) = symbol.smt_hook {
            return Ok(hook(arguments));
        }

        let table = self.functions.get(&symbol.name).ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!("function {} not interpreted", symbol.name))
        })?;

        // Nested ite over the table; the fallback is unreachable for
        // in-carrier arguments of a total table.
        let mut interpretation: Dynamic = Int::from_i64(0).into();
        for (tuple, output) in table {
            let output: Dynamic = Int::from_i64(*output).into();
            interpretation = matches_tuple(arguments, tuple).ite(&output, &interpretation);
        }

        Ok(interpretation)
    }

    fn interpret_relation(
        &self,
        symbol: &RelationSymbol,
        arguments: &[Dynamic],
    ) -> Result<Bool, SynthesisError> {
        if arguments.len() != symbol.arity() {
            return Err(SynthesisError::SignatureMismatch(format!(
                "relation {} applied to {} arguments, expects {}",
                symbol.name,
                arguments.len(),
                symbol.arity()
            )));
        }

        if let Some(hook) = symbol.smt_hook {
            return Ok(hook(arguments));
        }

        let table = self.relations.get(&symbol.name).ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!("relation {} not interpreted", symbol.name))
        })?;

        let cases: Vec<Bool> = table
            .iter()
            .map(|tuple| matches_tuple(arguments, tuple))
            .collect();
        Ok(smt::or_any(&cases))
    }
}

pub(crate) fn matches_tuple(arguments: &[Dynamic], tuple: &[i64]) -> Bool {
    let conjuncts: Vec<Bool> = arguments
        .iter()
        .zip(tuple)
        .map(|(argument, value)| {
            let value: Dynamic = Int::from_i64(*value).into();
            argument._eq(&value)
        })
        .collect();
    smt::and_all(&conjuncts)
}

impl fmt::Display for FiniteStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (sort, size) in &self.sizes {
            writeln!(f, "sort {} = {{0..{}}}", sort, size - 1)?;
        }
        for (name, table) in &self.relations {
            let tuples: Vec<String> = table
                .iter()
                .map(|tuple| {
                    let elements: Vec<String> =
                        tuple.iter().map(|value| value.to_string()).collect();
                    format!("({})", elements.join(", "))
                })
                .collect();
            writeln!(f, "relation {} = {{{}}}", name, tuples.join(", "))?;
        }
        for (name, table) in &self.functions {
            for (tuple, output) in table {
                let elements: Vec<String> = tuple.iter().map(|value| value.to_string()).collect();
                writeln!(f, "function {}({}) = {}", name, elements.join(", "), output)?;
            }
        }
        Ok(())
    }
}

/// All tuples over the given per-position bounds, in lexicographic order.
/// An empty bound list yields the single empty tuple (nullary case).
pub(crate) fn tuple_space(bounds: &[usize]) -> Vec<Vec<i64>> {
    let mut tuples: Vec<Vec<i64>> = vec![Vec::new()];

    for &bound in bounds {
        let mut extended = Vec::with_capacity(tuples.len() * bound);
        for tuple in &tuples {
            for value in 0..bound as i64 {
                let mut next = tuple.clone();
                next.push(value);
                extended.push(next);
            }
        }
        tuples = extended;
    }

    tuples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::Session;
    use z3::SatResult;

    fn singleton_reflexive() -> FiniteStructure {
        let world = Sort::new("W");
        let mut sizes = BTreeMap::new();
        sizes.insert("W".to_string(), 2);

        let mut relations = BTreeMap::new();
        relations.insert(
            "R".to_string(),
            [vec![0, 0], vec![1, 1]].into_iter().collect(),
        );

        FiniteStructure::new(&[world], sizes, BTreeMap::new(), relations).unwrap()
    }

    #[test]
    fn test_relation_membership() {
        let structure = singleton_reflexive();
        let symbol = RelationSymbol::new("R", vec![Sort::new("W"), Sort::new("W")]);

        let zero: Dynamic = Int::from_i64(0).into();
        let one: Dynamic = Int::from_i64(1).into();

        let session = Session::new(5_000);
        session.assert(
            &structure
                .interpret_relation(&symbol, &[zero.clone(), zero.clone()])
                .unwrap(),
        );
        session.assert(
            &structure
                .interpret_relation(&symbol, &[zero, one])
                .unwrap()
                .not(),
        );
        assert_eq!(session.check(), SatResult::Sat);
    }

    #[test]
    fn test_concrete_quantifier_unrolling() {
        let structure = singleton_reflexive();
        let symbol = RelationSymbol::new("R", vec![Sort::new("W"), Sort::new("W")]);
        let carrier = structure.interpret_sort(&Sort::new("W")).unwrap();

        // forall x. R(x, x) holds in the reflexive structure
        let x = smt::fresh_const("x", &carrier.smt_sort());
        let body = structure
            .interpret_relation(&symbol, &[x.clone(), x.clone()])
            .unwrap();
        let closed = carrier.universally_quantify(&x, &body).unwrap();

        let session = Session::new(5_000);
        session.assert(&closed.not());
        assert_eq!(session.check(), SatResult::Unsat);
    }

    #[test]
    fn test_tuple_space() {
        assert_eq!(tuple_space(&[]), vec![Vec::<i64>::new()]);
        assert_eq!(tuple_space(&[2, 2]).len(), 4);
        assert_eq!(tuple_space(&[3, 2, 1]).len(), 6);
    }

    #[test]
    fn test_empty_carrier_rejected() {
        let world = Sort::new("W");
        let mut sizes = BTreeMap::new();
        sizes.insert("W".to_string(), 0);

        let result = FiniteStructure::new(&[world], sizes, BTreeMap::new(), BTreeMap::new());
        assert!(matches!(result, Err(SynthesisError::SignatureMismatch(_))));
    }
}
