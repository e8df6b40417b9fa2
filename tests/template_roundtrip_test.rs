//! Round-trip properties of the symbolic templates: every model of a
//! template's well-formedness constraint decodes to a concrete object the
//! template provably equals in that model, and the solver's solution set
//! agrees with explicit enumeration.

use modalsynth::language::{FunctionSymbol, Language, RelationSymbol, Sort};
use modalsynth::modal::{Atom, ModalFormula, ModalFormulaTemplate};
use modalsynth::smt::{eval_bool, Session};
use modalsynth::syntax::{Substitution, Term, Variable};
use modalsynth::template::{Template, UnionTemplate};
use modalsynth::templates::{QuantifierFreeFormulaTemplate, TermTemplate};
use modalsynth::structure::Structure;
use std::collections::HashSet;
use z3::ast::Ast;
use z3::SatResult;

fn world() -> Sort {
    Sort::new("W")
}

/// One constant, one unary function: depth-2 closed terms are exactly
/// `c`, `f(c)`, `f(f(c))`.
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

fn frame_language() -> Language {
    Language::new(
        vec![world()],
        vec![],
        vec![
            RelationSymbol::new("R", vec![world(), world()]),
            RelationSymbol::new("P", vec![world()]),
        ],
    )
}

#[test]
fn test_term_template_round_trip() {
    let language = unary_language();
    let x = Variable::new("x", world());
    let template = TermTemplate::new(&language, &[x], 2, None);

    let session = Session::new(10_000);
    session.assert(&template.constraint().unwrap());
    assert_eq!(session.check(), SatResult::Sat);

    let model = session.model().expect("model after sat");
    let term = template.from_model(&model).unwrap();

    // the equality constraint holds in the very model we decoded from
    let holds = eval_bool(&model, &template.equals(&term)).expect("equals evaluates");
    assert!(holds, "template.equals({}) must hold in its own model", term);
}

#[test]
fn test_term_template_solutions_match_enumeration() {
    let language = unary_language();
    let template = TermTemplate::new(&language, &[], 2, None);

    let expected: HashSet<String> = template
        .enumerate()
        .map(|(_, term)| term.to_string())
        .collect();
    assert_eq!(expected.len(), 3);

    let session = Session::new(10_000);
    session.assert(&template.constraint().unwrap());

    // Block each decoded term and count the distinct solutions.
    let mut found = HashSet::new();
    for _ in 0..expected.len() + 1 {
        match session.check() {
            SatResult::Sat => {}
            SatResult::Unsat => break,
            SatResult::Unknown => panic!("solver returned unknown"),
        }

        let model = session.model().expect("model after sat");
        let term = template.from_model(&model).unwrap();
        assert!(
            found.insert(term.to_string()),
            "solver produced {} twice",
            term
        );
        session.assert(&template.equals(&term).not());
    }

    assert_eq!(found, expected);
}

#[test]
fn test_substituted_template_tracks_original_shape() {
    let language = unary_language();
    let x = Variable::new("x", world());
    let y = Variable::new("y", world());
    let template = TermTemplate::new(&language, &[x.clone(), y.clone()], 2, None);

    let f = language.get_function_symbol("f").unwrap().clone();
    let mut substitution = Substitution::new();
    substitution.insert(
        x,
        Term::Application(f, vec![Term::Variable(y.clone())]),
    );
    let substituted = template.substitute(&substitution);

    let session = Session::new(10_000);
    session.assert(&template.constraint().unwrap());

    // Both templates share node tags, so under any model the substituted
    // decode equals the substitution applied to the original decode.
    for _ in 0..4 {
        match session.check() {
            SatResult::Sat => {}
            SatResult::Unsat => break,
            SatResult::Unknown => panic!("solver returned unknown"),
        }

        let model = session.model().expect("model after sat");
        let original = template.from_model(&model).unwrap();
        let derived = substituted.from_model(&model).unwrap();
        assert_eq!(derived, original.substitute(&substitution));

        session.assert(&template.equals(&original).not());
    }
}

#[test]
fn test_formula_template_round_trip() {
    let language = frame_language();
    let x = Variable::new("x", world());
    let template = QuantifierFreeFormulaTemplate::new(&language, &[x], 0, 1, false);

    let session = Session::new(10_000);
    session.assert(&template.constraint().unwrap());
    assert_eq!(session.check(), SatResult::Sat);

    let model = session.model().expect("model after sat");
    let formula = template.from_model(&model).unwrap();

    let holds = eval_bool(&model, &template.equals(&formula)).expect("equals evaluates");
    assert!(holds, "template.equals({}) must hold in its own model", formula);
}

#[test]
fn test_modal_template_admits_named_formula() {
    let p = ModalFormula::atom("p");
    let t_axiom = ModalFormula::implication(ModalFormula::necessity(p.clone()), p);
    let template = ModalFormulaTemplate::new(&[Atom::new("p")], 2);

    let session = Session::new(10_000);
    session.assert(&template.constraint().unwrap());
    session.assert(&template.equals(&t_axiom));
    assert_eq!(session.check(), SatResult::Sat);

    // decoding under the pinned tags gives back exactly the pinned formula
    let model = session.model().expect("model after sat");
    assert_eq!(template.from_model(&model).unwrap(), t_axiom);
}

#[test]
fn test_modal_template_rejects_formula_beyond_depth() {
    let p = ModalFormula::atom("p");
    let four = ModalFormula::implication(
        ModalFormula::necessity(p.clone()),
        ModalFormula::necessity(ModalFormula::necessity(p)),
    );
    let template = ModalFormulaTemplate::new(&[Atom::new("p")], 1);

    let session = Session::new(10_000);
    session.assert(&template.constraint().unwrap());
    session.assert(&template.equals(&four));
    assert_eq!(session.check(), SatResult::Unsat);
}

#[test]
fn test_substitution_commutes_with_interpretation() {
    // interpret(e[x := f(y)], M, V) == interpret(e, M, V[x := ⟦f(y)⟧V])
    let theory = modalsynth::parse_theory(
        r#"
        theory SUCC
            sort W
            function f: W -> W
            relation R: W W
        end
        "#,
    )
    .unwrap();

    let world = Sort::new("W");
    let mut sizes = std::collections::HashMap::new();
    sizes.insert(world.clone(), 3);
    let model =
        modalsynth::finite_model::FiniteModelTemplate::new(&theory, &sizes).unwrap();

    let f = theory.language.get_function_symbol("f").unwrap().clone();
    let r = theory.language.get_relation_symbol("R").unwrap().clone();
    let x = Variable::new("x", world.clone());
    let y = Variable::new("y", world);

    let formula = modalsynth::syntax::Formula::RelationApplication(
        r,
        vec![Term::Variable(x.clone()), Term::Variable(y.clone())],
    );
    let replacement = Term::Application(f, vec![Term::Variable(y.clone())]);
    let mut substitution = Substitution::new();
    substitution.insert(x.clone(), replacement.clone());

    let carrier = model.interpret_sort(&y.sort).unwrap();
    let y_value = modalsynth::smt::fresh_const("y", &carrier.smt_sort());

    let mut valuation = modalsynth::syntax::ValuationMap::new();
    valuation.insert(y.clone(), y_value);
    let substituted_side = formula
        .substitute(&substitution)
        .interpret(&model, &valuation)
        .unwrap();

    let mut composed = valuation.clone();
    composed.insert(x, replacement.interpret(&model, &valuation).unwrap());
    let composed_side = formula.interpret(&model, &composed).unwrap();

    // equivalent for every interpretation of f and R
    let session = Session::new(10_000);
    session.assert(&substituted_side._eq(&composed_side).not());
    assert_eq!(session.check(), SatResult::Unsat);
}

#[test]
fn test_atomic_template_without_alternatives_is_unsatisfiable() {
    // no relations, constants disallowed: no atomic formula exists
    let language = Language::new(vec![world()], vec![], vec![]);
    let x = Variable::new("x", world());
    let template = QuantifierFreeFormulaTemplate::new(&language, &[x], 0, 1, false);

    let session = Session::new(10_000);
    session.assert(&template.constraint().unwrap());
    assert_eq!(session.check(), SatResult::Unsat);
}

#[test]
fn test_union_template_picks_satisfiable_alternative() {
    let atoms = [Atom::new("p")];
    let shallow = ModalFormulaTemplate::new(&atoms, 0);
    let deep = ModalFormulaTemplate::new(&atoms, 1);
    let union = UnionTemplate::new(vec![shallow, deep]);

    let diamond = ModalFormula::possibility(ModalFormula::atom("p"));

    let session = Session::new(10_000);
    session.assert(&union.constraint().unwrap());
    // only the deep alternative can equal a depth-1 formula
    session.assert(&union.equals(&diamond));
    assert_eq!(session.check(), SatResult::Sat);

    let model = session.model().expect("model after sat");
    assert_eq!(union.from_model(&model).unwrap(), diamond);
}
