//! Template for an unknown term of bounded depth.

use crate::error::SynthesisError;
use crate::language::{Language, Sort};
use crate::smt;
use crate::structure::Structure;
use crate::syntax::{Substitution, Term, ValuationMap, Variable};
use crate::template::{BoundedIntegerVariable, Template};
use std::collections::{HashMap, HashSet, VecDeque};
use z3::ast::{Bool, Dynamic};
use z3::Model;

/// A symbolic term over a language and a tuple of free variables.
///
/// The root tag ranges over `0 ..= V + F` where `V` is the number of free
/// variables and `F` the number of function symbols: `0` means the subtree
/// is absent, `1..=V` selects a free variable, and higher tags select a
/// function symbol. A template of depth `d > 0` owns `max_function_arity`
/// child templates of depth `d - 1`.
///
/// Substitution does not touch the node tags: the substituted template
/// shares its control variables with the original, so solver commitments
/// about the term's shape carry over.
pub struct TermTemplate<'a> {
    language: &'a Language,
    free_vars: Vec<Variable>,
    /// What each free variable currently stands for; identity until
    /// `substitute` rewrites it.
    substitution: Vec<Term>,
    depth: usize,
    sort: Option<Sort>,
    node: BoundedIntegerVariable,
    subterms: Vec<TermTemplate<'a>>,
}

impl<'a> TermTemplate<'a> {
    pub fn new(
        language: &'a Language,
        free_vars: &[Variable],
        depth: usize,
        sort: Option<Sort>,
    ) -> Self {
        let tags = free_vars.len() + language.function_symbols.len();
        let node = BoundedIntegerVariable::new(0, tags as i64);

        let subterms = if depth != 0 {
            (0..language.max_function_arity())
                .map(|_| TermTemplate::new(language, free_vars, depth - 1, None))
                .collect()
        } else {
            Vec::new()
        };

        TermTemplate {
            language,
            free_vars: free_vars.to_vec(),
            substitution: free_vars
                .iter()
                .map(|variable| Term::Variable(variable.clone()))
                .collect(),
            depth,
            sort,
            node,
            subterms,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn free_variables(&self) -> HashSet<Variable> {
        self.substitution
            .iter()
            .flat_map(Term::free_variables)
            .collect()
    }

    /// Substitute through the template, sharing the node tags of `self`.
    pub fn substitute(&self, substitution: &Substitution) -> TermTemplate<'a> {
        TermTemplate {
            language: self.language,
            free_vars: self.free_vars.clone(),
            substitution: self
                .substitution
                .iter()
                .map(|term| term.substitute(substitution))
                .collect(),
            depth: self.depth,
            sort: self.sort.clone(),
            node: self.node.clone(),
            subterms: self
                .subterms
                .iter()
                .map(|subterm| subterm.substitute(substitution))
                .collect(),
        }
    }

    /// The subtree rooted here does not exist.
    pub fn is_null_constraint(&self) -> Bool {
        let mut conjuncts = vec![self.node.equals(0)];
        for subterm in &self.subterms {
            conjuncts.push(subterm.is_null_constraint());
        }
        smt::and_all(&conjuncts)
    }

    /// The subtree rooted here is a well-formed term of sort `sort`.
    pub fn well_formedness_constraint(&self, sort: &Sort) -> Bool {
        let mut cases = Vec::new();

        for tag in 1..=self.tag_count() {
            if let Some(variable_index) = self.variable_index(tag) {
                if self.free_vars[variable_index].sort != *sort {
                    continue;
                }

                let mut conjuncts = vec![self.node.equals(tag as i64)];
                for subterm in &self.subterms {
                    conjuncts.push(subterm.is_null_constraint());
                }
                cases.push(smt::and_all(&conjuncts));
            } else {
                let symbol = &self.language.function_symbols[self.symbol_index(tag)];
                let arity = symbol.arity();

                if symbol.output_sort != *sort || (self.depth == 0 && arity != 0) {
                    continue;
                }

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

    /// Interpret the undetermined term at a specific sort: a nested `ite`
    /// keyed on the node tag, defaulting through a fresh symbol on the
    /// branches the well-formedness constraint rules out.
    pub fn interpret_as_sort(
        &self,
        sort: &Sort,
        structure: &dyn Structure,
        valuation: &ValuationMap,
    ) -> Result<Dynamic, SynthesisError> {
        let carrier = structure.interpret_sort(sort)?;
        let mut interpretation = smt::fresh_const("term", &carrier.smt_sort());

        for tag in 1..=self.tag_count() {
            if let Some(variable_index) = self.variable_index(tag) {
                if self.free_vars[variable_index].sort != *sort {
                    continue;
                }

                let value = self.substitution[variable_index].interpret(structure, valuation)?;
                interpretation = self.node.equals(tag as i64).ite(&value, &interpretation);
            } else {
                let symbol = &self.language.function_symbols[self.symbol_index(tag)];
                let arity = symbol.arity();

                if symbol.output_sort != *sort || (self.depth == 0 && arity != 0) {
                    continue;
                }

                let mut arguments = Vec::with_capacity(arity);
                for (input_sort, subterm) in symbol.input_sorts.iter().zip(&self.subterms) {
                    arguments.push(subterm.interpret_as_sort(input_sort, structure, valuation)?);
                }

                let value = structure.interpret_function(symbol, &arguments)?;
                interpretation = self.node.equals(tag as i64).ite(&value, &interpretation);
            }
        }

        Ok(interpretation)
    }

    /// Interpret at the template's fixed sort.
    pub fn interpret(
        &self,
        structure: &dyn Structure,
        valuation: &ValuationMap,
    ) -> Result<Dynamic, SynthesisError> {
        let sort = self.sort.as_ref().ok_or_else(|| {
            SynthesisError::SignatureMismatch("term template has no target sort".to_string())
        })?;
        self.interpret_as_sort(sort, structure, valuation)
    }

    /// Lazily enumerate all concrete terms within the template's bounds,
    /// grouped by depth. Bypasses the solver entirely.
    pub fn enumerate(&self) -> TermEnumeration<'a> {
        TermEnumeration {
            language: self.language,
            free_vars: self.free_vars.clone(),
            target_sort: self.sort.clone(),
            max_depth: self.depth,
            next_depth: 0,
            layers: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    fn tag_count(&self) -> usize {
        self.free_vars.len() + self.language.function_symbols.len()
    }

    fn variable_index(&self, tag: usize) -> Option<usize> {
        (tag <= self.free_vars.len()).then(|| tag - 1)
    }

    fn symbol_index(&self, tag: usize) -> usize {
        tag - self.free_vars.len() - 1
    }
}

impl Template for TermTemplate<'_> {
    type Value = Term;

    /// Without a fixed sort, the term may have any sort of the language.
    fn constraint(&self) -> Result<Bool, SynthesisError> {
        match &self.sort {
            Some(sort) => Ok(self.well_formedness_constraint(sort)),
            None => {
                let cases: Vec<Bool> = self
                    .language
                    .sorts
                    .iter()
                    .map(|sort| self.well_formedness_constraint(sort))
                    .collect();
                Ok(smt::or_any(&cases))
            }
        }
    }

    fn from_model(&self, model: &Model) -> Result<Term, SynthesisError> {
        let tag = self.node.from_model(model)?;

        if tag == 0 {
            return Err(SynthesisError::InvalidModel(
                "null node tag at a term that must exist".to_string(),
            ));
        }

        let tag = tag as usize;
        if let Some(variable_index) = self.variable_index(tag) {
            return Ok(self.substitution[variable_index].clone());
        }

        let symbol = &self.language.function_symbols[self.symbol_index(tag)];
        let arguments: Result<Vec<Term>, SynthesisError> = self.subterms[..symbol.arity()]
            .iter()
            .map(|subterm| subterm.from_model(model))
            .collect();

        Ok(Term::Application(symbol.clone(), arguments?))
    }

    fn equals(&self, value: &Term) -> Bool {
        let mut cases = Vec::new();

        for tag in 1..=self.tag_count() {
            if let Some(variable_index) = self.variable_index(tag) {
                cases.push(Bool::and(&[
                    self.node.equals(tag as i64),
                    self.substitution[variable_index].equals(value),
                ]));
            } else if let Term::Application(value_symbol, value_arguments) = value {
                let symbol = &self.language.function_symbols[self.symbol_index(tag)];
                let arity = symbol.arity();

                if value_symbol != symbol
                    || value_arguments.len() != arity
                    || (self.depth == 0 && arity != 0)
                {
                    continue;
                }

                let mut conjuncts = vec![self.node.equals(tag as i64)];
                for (argument, subterm) in value_arguments.iter().zip(&self.subterms) {
                    conjuncts.push(subterm.equals(argument));
                }
                cases.push(smt::and_all(&conjuncts));
            }
        }

        smt::or_any(&cases)
    }
}

/// Depth-stratified enumeration of the concrete terms a `TermTemplate`
/// ranges over. Layers are memoized per (sort, depth) so shared subterms
/// are computed once.
pub struct TermEnumeration<'a> {
    language: &'a Language,
    free_vars: Vec<Variable>,
    target_sort: Option<Sort>,
    max_depth: usize,
    next_depth: usize,
    layers: HashMap<String, Vec<Vec<Term>>>,
    pending: VecDeque<(Sort, Term)>,
}

impl Iterator for TermEnumeration<'_> {
    type Item = (Sort, Term);

    fn next(&mut self) -> Option<(Sort, Term)> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.next_depth > self.max_depth {
                return None;
            }
            self.build_layer(self.next_depth);
            self.next_depth += 1;
        }
    }
}

impl TermEnumeration<'_> {
    fn record(&mut self, sort: &Sort, depth: usize, term: Term) {
        let layers = self.layers.entry(sort.name.clone()).or_default();
        while layers.len() <= depth {
            layers.push(Vec::new());
        }
        layers[depth].push(term.clone());

        if self.target_sort.is_none() || self.target_sort.as_ref() == Some(sort) {
            self.pending.push_back((sort.clone(), term));
        }
    }

    fn layer(&self, sort: &Sort, depth: usize) -> &[Term] {
        self.layers
            .get(&sort.name)
            .and_then(|layers| layers.get(depth))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn build_layer(&mut self, depth: usize) {
        if depth == 0 {
            for variable in self.free_vars.clone() {
                let sort = variable.sort.clone();
                self.record(&sort, 0, Term::Variable(variable));
            }
            for symbol in self.language.function_symbols.clone() {
                if symbol.arity() == 0 {
                    let sort = symbol.output_sort.clone();
                    self.record(&sort, 0, Term::Application(symbol, Vec::new()));
                }
            }
            return;
        }

        for symbol in self.language.function_symbols.clone() {
            let arity = symbol.arity();
            if arity == 0 {
                continue;
            }

            // Every assignment of depths < depth to the argument positions,
            // provided at least one argument reaches depth - 1.
            for depths in depth_assignments(arity, depth) {
                let candidates: Vec<Vec<Term>> = symbol
                    .input_sorts
                    .iter()
                    .zip(&depths)
                    .map(|(sort, argument_depth)| self.layer(sort, *argument_depth).to_vec())
                    .collect();

                if candidates.iter().any(Vec::is_empty) {
                    continue;
                }

                for arguments in cartesian_product(&candidates) {
                    let sort = symbol.output_sort.clone();
                    self.record(&sort, depth, Term::Application(symbol.clone(), arguments));
                }
            }
        }
    }
}

/// All tuples in `{0..depth}^arity` containing `depth - 1` at least once.
fn depth_assignments(arity: usize, depth: usize) -> Vec<Vec<usize>> {
    let mut assignments = vec![Vec::new()];
    for _ in 0..arity {
        let mut extended = Vec::new();
        for assignment in &assignments {
            for value in 0..depth {
                let mut next = assignment.clone();
                next.push(value);
                extended.push(next);
            }
        }
        assignments = extended;
    }

    assignments
        .into_iter()
        .filter(|assignment| assignment.contains(&(depth - 1)))
        .collect()
}

fn cartesian_product(candidates: &[Vec<Term>]) -> Vec<Vec<Term>> {
    let mut products: Vec<Vec<Term>> = vec![Vec::new()];
    for position in candidates {
        let mut extended = Vec::with_capacity(products.len() * position.len());
        for product in &products {
            for term in position {
                let mut next = product.clone();
                next.push(term.clone());
                extended.push(next);
            }
        }
        products = extended;
    }
    products
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::FunctionSymbol;

    fn world() -> Sort {
        Sort::new("W")
    }

    fn unary_language() -> Language {
        Language::new(
            vec![world()],
            vec![
                FunctionSymbol::new("c", vec![], world()),
                FunctionSymbol::new("f", vec![world()], world()),
            ],
            vec![],
        )
    }

    #[test]
    fn test_enumerate_closed_terms() {
        let language = unary_language();
        let template = TermTemplate::new(&language, &[], 2, None);

        let terms: Vec<String> = template
            .enumerate()
            .map(|(_, term)| term.to_string())
            .collect();
        assert_eq!(terms, vec!["c", "f(c)", "f(f(c))"]);
    }

    #[test]
    fn test_enumerate_with_free_variable() {
        let language = unary_language();
        let x = Variable::new("x", world());
        let template = TermTemplate::new(&language, &[x], 2, None);

        let terms: Vec<String> = template
            .enumerate()
            .map(|(_, term)| term.to_string())
            .collect();
        assert_eq!(
            terms,
            vec!["x", "c", "f(x)", "f(c)", "f(f(x))", "f(f(c))"]
        );
    }

    #[test]
    fn test_substitution_shares_node_tags() {
        let language = unary_language();
        let x = Variable::new("x", world());
        let y = Variable::new("y", world());
        let template = TermTemplate::new(&language, &[x.clone(), y.clone()], 1, None);

        let f = language.get_function_symbol("f").unwrap().clone();
        let mut substitution = Substitution::new();
        substitution.insert(x, Term::Application(f, vec![Term::Variable(y.clone())]));

        let substituted = template.substitute(&substitution);
        assert_eq!(substituted.free_variables(), HashSet::from([y]));
        assert_eq!(substituted.depth(), template.depth());
    }
}
