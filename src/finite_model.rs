//! Symbolic finite structures.
//!
//! A `FiniteModelTemplate` interprets a theory over carriers `{0..size-1}`
//! whose sizes are solver-controlled variables, and gives every
//! uninterpreted symbol a fresh backend function as its extension. The
//! template's constraint pins the carrier bounds, forces function outputs
//! back into their carriers, and asserts every axiom of the theory
//! interpreted on the template itself. A model of the constraint is thus a
//! finite model of the theory, and `from_model` tabulates it into a
//! concrete `FiniteStructure`.

use crate::error::SynthesisError;
use crate::language::{Language, Sort};
use crate::smt;
use crate::structure::{matches_tuple, tuple_space, Carrier, FiniteStructure, Structure};
use crate::syntax::ValuationMap;
use crate::template::{BoundedIntegerVariable, Template};
use crate::theory::Theory;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use z3::ast::{Ast, Bool, Dynamic, Int};
use z3::{FuncDecl, Model};

/// Uninterpreted extensions need globally unique declaration names: the Z3
/// context identifies same-named declarations, and two structure templates
/// over the same theory must not share extensions.
static EXTENSION_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn fresh_declaration_name(symbol: &str) -> String {
    let id = EXTENSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}!{}", symbol, id)
}

/// A symbolic finite structure over a theory's language.
pub struct FiniteModelTemplate<'a> {
    theory: &'a Theory,
    carriers: BTreeMap<String, Carrier>,
    functions: BTreeMap<String, FuncDecl>,
    relations: BTreeMap<String, FuncDecl>,
}

impl<'a> FiniteModelTemplate<'a> {
    /// Allocate a template whose hookless sorts get carriers of size
    /// `1 ..= sort_sizes[sort]`.
    pub fn new(
        theory: &'a Theory,
        sort_sizes: &HashMap<Sort, usize>,
    ) -> Result<Self, SynthesisError> {
        let language = &theory.language;
        let mut carriers = BTreeMap::new();

        for sort in &language.sorts {
            let carrier = match &sort.smt_hook {
                Some(hook) => Carrier::Unbounded {
                    smt_sort: hook.smt_sort(),
                },
                None => {
                    let bound = *sort_sizes.get(sort).ok_or_else(|| {
                        SynthesisError::SignatureMismatch(format!(
                            "no size bound for sort {}",
                            sort
                        ))
                    })?;
                    if bound == 0 {
                        return Err(SynthesisError::SignatureMismatch(format!(
                            "size bound for sort {} must be positive",
                            sort
                        )));
                    }
                    Carrier::FiniteSymbolic {
                        size: BoundedIntegerVariable::new(1, bound as i64),
                    }
                }
            };
            carriers.insert(sort.name.clone(), carrier);
        }

        let mut functions = BTreeMap::new();
        for symbol in &language.function_symbols {
            if symbol.smt_hook.is_some() {
                continue;
            }

            let domain: Vec<_> = symbol
                .input_sorts
                .iter()
                .map(|sort| carrier_smt_sort(&carriers, sort))
                .collect::<Result<_, _>>()?;
            let domain_refs: Vec<&smt::SmtSort> = domain.iter().collect();
            let range = carrier_smt_sort(&carriers, &symbol.output_sort)?;

            functions.insert(
                symbol.name.clone(),
                FuncDecl::new(fresh_declaration_name(&symbol.name), &domain_refs, &range),
            );
        }

        let mut relations = BTreeMap::new();
        for symbol in &language.relation_symbols {
            if symbol.smt_hook.is_some() {
                continue;
            }

            let domain: Vec<_> = symbol
                .input_sorts
                .iter()
                .map(|sort| carrier_smt_sort(&carriers, sort))
                .collect::<Result<_, _>>()?;
            let domain_refs: Vec<&smt::SmtSort> = domain.iter().collect();

            relations.insert(
                symbol.name.clone(),
                FuncDecl::new(
                    fresh_declaration_name(&symbol.name),
                    &domain_refs,
                    &smt::SmtSort::bool(),
                ),
            );
        }

        Ok(FiniteModelTemplate {
            theory,
            carriers,
            functions,
            relations,
        })
    }

    pub fn theory(&self) -> &Theory {
        self.theory
    }

    pub fn language(&self) -> &Language {
        &self.theory.language
    }

    /// A fresh relation over the given sorts, represented by one free
    /// backend boolean per potential tuple, together with those booleans.
    ///
    /// Universally quantifying a claim over the returned booleans abstracts
    /// it over every interpretation the relation could take. This is how an
    /// accepted candidate is generalized beyond the proposition valuation
    /// it was found with.
    pub fn free_finite_relation(
        &self,
        sorts: &[Sort],
    ) -> Result<(FreeFiniteRelation, Vec<Bool>), SynthesisError> {
        let bounds: Vec<usize> = sorts
            .iter()
            .map(|sort| {
                self.interpret_sort(sort)?.static_bound().ok_or_else(|| {
                    SynthesisError::SignatureMismatch(format!(
                        "sort {} has no finite carrier to relate over",
                        sort
                    ))
                })
            })
            .collect::<Result<_, _>>()?;

        let entries: Vec<(Vec<i64>, Bool)> = tuple_space(&bounds)
            .into_iter()
            .map(|tuple| (tuple, smt::fresh_bool("tuple")))
            .collect();
        let values: Vec<Bool> = entries.iter().map(|(_, value)| value.clone()).collect();

        Ok((FreeFiniteRelation { entries }, values))
    }

    fn carrier_of(&self, sort: &Sort) -> Result<&Carrier, SynthesisError> {
        self.carriers.get(&sort.name).ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!("sort {} not interpreted", sort))
        })
    }

    /// Extracted sizes of every symbolic carrier.
    fn sizes_from_model(&self, model: &Model) -> Result<BTreeMap<String, usize>, SynthesisError> {
        let mut sizes = BTreeMap::new();
        for (name, carrier) in &self.carriers {
            if let Carrier::FiniteSymbolic { size } = carrier {
                sizes.insert(name.clone(), size.from_model(model)? as usize);
            }
        }
        Ok(sizes)
    }

    fn tabulation_bounds(
        &self,
        sorts: &[Sort],
        sizes: &BTreeMap<String, usize>,
    ) -> Result<Vec<usize>, SynthesisError> {
        sorts
            .iter()
            .map(|sort| {
                sizes.get(&sort.name).copied().ok_or_else(|| {
                    SynthesisError::InvalidModel(format!(
                        "cannot tabulate over unbounded sort {}",
                        sort
                    ))
                })
            })
            .collect()
    }
}

fn carrier_smt_sort(
    carriers: &BTreeMap<String, Carrier>,
    sort: &Sort,
) -> Result<smt::SmtSort, SynthesisError> {
    carriers
        .get(&sort.name)
        .map(Carrier::smt_sort)
        .ok_or_else(|| SynthesisError::SignatureMismatch(format!("sort {} not interpreted", sort)))
}

fn integer_arguments(tuple: &[i64]) -> Vec<Dynamic> {
    tuple
        .iter()
        .map(|value| Int::from_i64(*value).into())
        .collect()
}

fn apply_declaration(declaration: &FuncDecl, arguments: &[Dynamic]) -> Dynamic {
    let refs: Vec<&dyn Ast> = arguments.iter().map(|argument| argument as &dyn Ast).collect();
    declaration.apply(&refs)
}

impl Structure for FiniteModelTemplate<'_> {
    fn interpret_sort(&self, sort: &Sort) -> Result<&Carrier, SynthesisError> {
        self.carrier_of(sort)
    }

    fn interpret_function(
        &self,
        symbol: &crate::language::FunctionSymbol,
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

        let declaration = self.functions.get(&symbol.name).ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!("function {} not interpreted", symbol.name))
        })?;
        Ok(apply_declaration(declaration, arguments))
    }

    fn interpret_relation(
        &self,
        symbol: &crate::language::RelationSymbol,
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

        let declaration = self.relations.get(&symbol.name).ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!("relation {} not interpreted", symbol.name))
        })?;
        apply_declaration(declaration, arguments).as_bool().ok_or_else(|| {
            SynthesisError::Backend(format!("relation {} did not produce a boolean", symbol.name))
        })
    }
}

impl Template for FiniteModelTemplate<'_> {
    type Value = FiniteStructure;

    /// Carrier bounds, function-output containment for every in-carrier
    /// input tuple, and every theory axiom interpreted on this structure.
    fn constraint(&self) -> Result<Bool, SynthesisError> {
        let mut conjuncts = Vec::new();

        for carrier in self.carriers.values() {
            if let Carrier::FiniteSymbolic { size } = carrier {
                conjuncts.push(size.constraint());
            }
        }

        for symbol in &self.theory.language.function_symbols {
            if symbol.smt_hook.is_some() {
                continue;
            }

            let output_carrier = self.carrier_of(&symbol.output_sort)?;
            let bounds: Option<Vec<usize>> = symbol
                .input_sorts
                .iter()
                .map(|sort| self.carrier_of(sort).ok().and_then(Carrier::static_bound))
                .collect();

            match bounds {
                Some(bounds) => {
                    for tuple in tuple_space(&bounds) {
                        let arguments = integer_arguments(&tuple);

                        let mut guards = Vec::with_capacity(arguments.len());
                        for (sort, argument) in symbol.input_sorts.iter().zip(&arguments) {
                            guards.push(self.carrier_of(sort)?.contains(argument)?);
                        }

                        let output = self.interpret_function(symbol, &arguments)?;
                        let contained = output_carrier.contains(&output)?;
                        conjuncts.push(smt::and_all(&guards).implies(&contained));
                    }
                }
                None => {
                    // Some input sort is opaque: fall back to a backend
                    // quantifier guarded by carrier membership.
                    let mut bound = Vec::with_capacity(symbol.arity());
                    let mut guards = Vec::with_capacity(symbol.arity());
                    for sort in &symbol.input_sorts {
                        let carrier = self.carrier_of(sort)?;
                        let argument = smt::fresh_const("arg", &carrier.smt_sort());
                        guards.push(carrier.contains(&argument)?);
                        bound.push(argument);
                    }

                    let output = self.interpret_function(symbol, &bound)?;
                    let contained = output_carrier.contains(&output)?;
                    let body = smt::and_all(&guards).implies(&contained);
                    conjuncts.push(smt::forall(&bound, &body));
                }
            }
        }

        for axiom in self.theory.axioms() {
            conjuncts.push(axiom.formula.interpret(self, &ValuationMap::new())?);
        }

        Ok(smt::and_all(&conjuncts))
    }

    /// Extract the carrier sizes, then tabulate every uninterpreted symbol
    /// over the in-carrier tuples.
    fn from_model(&self, model: &Model) -> Result<FiniteStructure, SynthesisError> {
        let sizes = self.sizes_from_model(model)?;

        let mut functions = BTreeMap::new();
        for symbol in &self.theory.language.function_symbols {
            if symbol.smt_hook.is_some() {
                continue;
            }

            let declaration = &self.functions[&symbol.name];
            let bounds = self.tabulation_bounds(&symbol.input_sorts, &sizes)?;
            let output_size = *sizes.get(&symbol.output_sort.name).ok_or_else(|| {
                SynthesisError::InvalidModel(format!(
                    "cannot tabulate over unbounded sort {}",
                    symbol.output_sort
                ))
            })?;

            let mut table = BTreeMap::new();
            for tuple in tuple_space(&bounds) {
                let application = apply_declaration(declaration, &integer_arguments(&tuple));
                let value = model
                    .eval(&application, true)
                    .and_then(|value| value.as_int())
                    .and_then(|value| value.as_i64())
                    .ok_or_else(|| {
                        SynthesisError::InvalidModel(format!(
                            "no value for {}({:?})",
                            symbol.name, tuple
                        ))
                    })?;

                if value < 0 || value >= output_size as i64 {
                    return Err(SynthesisError::InvalidModel(format!(
                        "{}({:?}) = {} escapes its carrier of size {}",
                        symbol.name, tuple, value, output_size
                    )));
                }
                table.insert(tuple, value);
            }
            functions.insert(symbol.name.clone(), table);
        }

        let mut relations = BTreeMap::new();
        for symbol in &self.theory.language.relation_symbols {
            if symbol.smt_hook.is_some() {
                continue;
            }

            let declaration = &self.relations[&symbol.name];
            let bounds = self.tabulation_bounds(&symbol.input_sorts, &sizes)?;

            let mut table = BTreeSet::new();
            for tuple in tuple_space(&bounds) {
                let application = apply_declaration(declaration, &integer_arguments(&tuple));
                let holds = model
                    .eval(&application, true)
                    .and_then(|value| value.as_bool())
                    .and_then(|value| value.as_bool())
                    .ok_or_else(|| {
                        SynthesisError::InvalidModel(format!(
                            "no value for {}({:?})",
                            symbol.name, tuple
                        ))
                    })?;
                if holds {
                    table.insert(tuple);
                }
            }
            relations.insert(symbol.name.clone(), table);
        }

        FiniteStructure::new(&self.theory.language.sorts, sizes, functions, relations)
    }

    /// The template denotes exactly the given concrete structure: sizes
    /// match and every in-carrier tuple agrees on membership and outputs.
    fn equals(&self, value: &FiniteStructure) -> Bool {
        let mut conjuncts = Vec::new();
        let mut sizes = BTreeMap::new();

        for (name, carrier) in &self.carriers {
            if let Carrier::FiniteSymbolic { size } = carrier {
                let Some(concrete) = value.size_of(&Sort::new(name.clone())) else {
                    return Bool::from_bool(false);
                };
                sizes.insert(name.clone(), concrete);
                conjuncts.push(size.equals(concrete as i64));
            }
        }

        for symbol in &self.theory.language.relation_symbols {
            if symbol.smt_hook.is_some() {
                continue;
            }
            let Some(table) = value.relation_table(&symbol.name) else {
                return Bool::from_bool(false);
            };
            let Ok(bounds) = self.tabulation_bounds(&symbol.input_sorts, &sizes) else {
                return Bool::from_bool(false);
            };

            let declaration = &self.relations[&symbol.name];
            for tuple in tuple_space(&bounds) {
                let application = apply_declaration(declaration, &integer_arguments(&tuple));
                let Some(membership) = application.as_bool() else {
                    return Bool::from_bool(false);
                };
                conjuncts.push(if table.contains(&tuple) {
                    membership
                } else {
                    membership.not()
                });
            }
        }

        for symbol in &self.theory.language.function_symbols {
            if symbol.smt_hook.is_some() {
                continue;
            }
            let Some(table) = value.function_table(&symbol.name) else {
                return Bool::from_bool(false);
            };
            let Ok(bounds) = self.tabulation_bounds(&symbol.input_sorts, &sizes) else {
                return Bool::from_bool(false);
            };

            let declaration = &self.functions[&symbol.name];
            for tuple in tuple_space(&bounds) {
                let Some(output) = table.get(&tuple) else {
                    return Bool::from_bool(false);
                };
                let application = apply_declaration(declaration, &integer_arguments(&tuple));
                let expected: Dynamic = Int::from_i64(*output).into();
                conjuncts.push(application._eq(&expected));
            }
        }

        smt::and_all(&conjuncts)
    }
}

/// A relation whose extension is a free boolean per potential tuple.
pub struct FreeFiniteRelation {
    entries: Vec<(Vec<i64>, Bool)>,
}

impl FreeFiniteRelation {
    /// Membership of symbolic arguments: the disjunction over tuples of
    /// "arguments equal this tuple and its boolean is set".
    pub fn apply(&self, arguments: &[Dynamic]) -> Bool {
        let cases: Vec<Bool> = self
            .entries
            .iter()
            .map(|(tuple, value)| Bool::and(&[matches_tuple(arguments, tuple), value.clone()]))
            .collect();
        smt::or_any(&cases)
    }
}
