//! Many-sorted first-order signatures.
//!
//! A `Language` is the triple (sorts, function symbols, relation symbols).
//! Symbols may carry an *SMT hook*: a fixed backend interpretation that
//! every structure over the language uses instead of choosing its own
//! extension. Hookless symbols are uninterpreted and get their meaning from
//! a structure, symbolically or concretely.

use crate::error::SynthesisError;
use crate::smt::SmtSort;
use std::fmt;
use z3::ast::{Bool, Dynamic};

/// Backend sort a `Sort` may be pinned to.
///
/// Sorts without a hook are carried by finite integer carriers chosen per
/// structure; hooked sorts always denote the named backend sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortHook {
    Int,
    Bool,
}

impl SortHook {
    pub fn smt_sort(&self) -> SmtSort {
        match self {
            SortHook::Int => SmtSort::int(),
            SortHook::Bool => SmtSort::bool(),
        }
    }
}

/// A named sort, compared by name + hook.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sort {
    pub name: String,
    pub smt_hook: Option<SortHook>,
}

impl Sort {
    pub fn new(name: impl Into<String>) -> Self {
        Sort {
            name: name.into(),
            smt_hook: None,
        }
    }

    pub fn hooked(name: impl Into<String>, hook: SortHook) -> Self {
        Sort {
            name: name.into(),
            smt_hook: Some(hook),
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Fixed backend interpretation of a function symbol.
pub type FunctionHook = fn(&[Dynamic]) -> Dynamic;

/// Fixed backend interpretation of a relation symbol.
pub type RelationHook = fn(&[Dynamic]) -> Bool;

/// A function symbol `f: s1 ... sn -> s0`. Constants are nullary functions.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSymbol {
    pub name: String,
    pub input_sorts: Vec<Sort>,
    pub output_sort: Sort,
    pub smt_hook: Option<FunctionHook>,
}

impl FunctionSymbol {
    pub fn new(name: impl Into<String>, input_sorts: Vec<Sort>, output_sort: Sort) -> Self {
        FunctionSymbol {
            name: name.into(),
            input_sorts,
            output_sort,
            smt_hook: None,
        }
    }

    pub fn arity(&self) -> usize {
        self.input_sorts.len()
    }
}

/// A relation symbol `R: s1 ... sn`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSymbol {
    pub name: String,
    pub input_sorts: Vec<Sort>,
    pub smt_hook: Option<RelationHook>,
}

impl RelationSymbol {
    pub fn new(name: impl Into<String>, input_sorts: Vec<Sort>) -> Self {
        RelationSymbol {
            name: name.into(),
            input_sorts,
            smt_hook: None,
        }
    }

    pub fn arity(&self) -> usize {
        self.input_sorts.len()
    }
}

/// A many-sorted language.
///
/// Declaration order is preserved; template node tags index into these
/// symbol lists, so the order is part of a template's identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Language {
    pub sorts: Vec<Sort>,
    pub function_symbols: Vec<FunctionSymbol>,
    pub relation_symbols: Vec<RelationSymbol>,
}

impl Language {
    pub fn new(
        sorts: Vec<Sort>,
        function_symbols: Vec<FunctionSymbol>,
        relation_symbols: Vec<RelationSymbol>,
    ) -> Self {
        Language {
            sorts,
            function_symbols,
            relation_symbols,
        }
    }

    pub fn get_sort(&self, name: &str) -> Option<&Sort> {
        self.sorts.iter().find(|sort| sort.name == name)
    }

    pub fn get_function_symbol(&self, name: &str) -> Option<&FunctionSymbol> {
        self.function_symbols.iter().find(|symbol| symbol.name == name)
    }

    pub fn get_relation_symbol(&self, name: &str) -> Option<&RelationSymbol> {
        self.relation_symbols.iter().find(|symbol| symbol.name == name)
    }

    pub fn max_function_arity(&self) -> usize {
        self.function_symbols
            .iter()
            .map(FunctionSymbol::arity)
            .max()
            .unwrap_or(0)
    }

    pub fn max_relation_arity(&self) -> usize {
        self.relation_symbols
            .iter()
            .map(RelationSymbol::arity)
            .max()
            .unwrap_or(0)
    }

    /// Disjoint union of two languages.
    ///
    /// Fails if any sort or symbol of `other` is already declared here.
    pub fn expand(&self, other: &Language) -> Result<Language, SynthesisError> {
        for sort in &other.sorts {
            if self.sorts.contains(sort) {
                return Err(SynthesisError::SignatureMismatch(format!(
                    "duplicate sort {}",
                    sort
                )));
            }
        }

        for symbol in &other.function_symbols {
            if self.function_symbols.contains(symbol) {
                return Err(SynthesisError::SignatureMismatch(format!(
                    "duplicate function symbol {}",
                    symbol.name
                )));
            }
        }

        for symbol in &other.relation_symbols {
            if self.relation_symbols.contains(symbol) {
                return Err(SynthesisError::SignatureMismatch(format!(
                    "duplicate relation symbol {}",
                    symbol.name
                )));
            }
        }

        let mut expanded = self.clone();
        expanded.sorts.extend(other.sorts.iter().cloned());
        expanded
            .function_symbols
            .extend(other.function_symbols.iter().cloned());
        expanded
            .relation_symbols
            .extend(other.relation_symbols.iter().cloned());
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_language() -> Language {
        let world = Sort::new("W");
        Language::new(
            vec![world.clone()],
            vec![],
            vec![
                RelationSymbol::new("R", vec![world.clone(), world.clone()]),
                RelationSymbol::new("P", vec![world]),
            ],
        )
    }

    #[test]
    fn test_lookup() {
        let language = frame_language();
        assert!(language.get_sort("W").is_some());
        assert!(language.get_sort("V").is_none());
        assert_eq!(language.get_relation_symbol("R").unwrap().arity(), 2);
        assert_eq!(language.max_relation_arity(), 2);
        assert_eq!(language.max_function_arity(), 0);
    }

    #[test]
    fn test_expand_disjoint() {
        let language = frame_language();
        let extension = Language::new(
            vec![],
            vec![FunctionSymbol::new("succ", vec![Sort::new("W")], Sort::new("W"))],
            vec![],
        );

        let expanded = language.expand(&extension).unwrap();
        assert!(expanded.get_function_symbol("succ").is_some());
        assert_eq!(expanded.max_function_arity(), 1);
    }

    #[test]
    fn test_expand_duplicate_rejected() {
        let language = frame_language();
        let clash = Language::new(
            vec![],
            vec![],
            vec![RelationSymbol::new("P", vec![Sort::new("W")])],
        );

        let result = language.expand(&clash);
        assert!(matches!(result, Err(SynthesisError::SignatureMismatch(_))));
    }
}
