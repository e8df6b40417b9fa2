//! Symbolic finite structures: extracted structures satisfy their theory's
//! axioms, the structure template round-trips through `equals`, and free
//! finite relations really range over every valuation.

use modalsynth::finite_model::FiniteModelTemplate;
use modalsynth::language::Sort;
use modalsynth::parse_theory;
use modalsynth::smt::{forall_bools, Session};
use modalsynth::structure::FiniteStructure;
use modalsynth::template::Template;
use modalsynth::theory::Theory;
use std::collections::{BTreeMap, HashMap};
use z3::ast::{Dynamic, Int};
use z3::SatResult;

fn reflexive_theory() -> Theory {
    parse_theory(
        r#"
        theory REFLEXIVE
            sort W
            relation R: W W
            relation P: W
            axiom forall x: W. R(x, x)
        end
        "#,
    )
    .unwrap()
}

fn model_of(theory: &Theory, bound: usize) -> (Session, FiniteModelTemplate<'_>) {
    let mut sizes = HashMap::new();
    sizes.insert(theory.language.get_sort("W").unwrap().clone(), bound);
    let template = FiniteModelTemplate::new(theory, &sizes).unwrap();

    let session = Session::new(30_000);
    session.assert(&template.constraint().unwrap());
    (session, template)
}

#[test]
fn test_extracted_structure_satisfies_axiom() {
    let theory = reflexive_theory();
    let (session, template) = model_of(&theory, 3);
    assert_eq!(session.check(), SatResult::Sat);

    let model = session.model().expect("model after sat");
    let structure = template.from_model(&model).unwrap();

    let size = structure.size_of(&Sort::new("W")).unwrap();
    assert!((1..=3).contains(&size));

    let accessibility = structure.relation_table("R").unwrap();
    for world in 0..size as i64 {
        assert!(
            accessibility.contains(&vec![world, world]),
            "extracted structure must be reflexive at {}",
            world
        );
    }
}

#[test]
fn test_existential_axiom_is_witnessed() {
    let theory = parse_theory(
        r#"
        theory MARKED
            sort W
            relation R: W W
            relation P: W
            axiom exists x: W. P(x)
        end
        "#,
    )
    .unwrap();

    let (session, template) = model_of(&theory, 3);
    assert_eq!(session.check(), SatResult::Sat);

    let model = session.model().expect("model after sat");
    let structure = template.from_model(&model).unwrap();
    assert!(
        !structure.relation_table("P").unwrap().is_empty(),
        "existential axiom requires a marked world"
    );
}

#[test]
fn test_contradictory_axioms_have_no_structure() {
    let theory = parse_theory(
        r#"
        theory EMPTY
            sort W
            relation R: W W
            axiom forall x: W. R(x, x)
            axiom forall x: W. not R(x, x)
        end
        "#,
    )
    .unwrap();

    // carriers are nonempty by construction, so the axioms clash
    let (session, _template) = model_of(&theory, 3);
    assert_eq!(session.check(), SatResult::Unsat);
}

#[test]
fn test_structure_template_equals_round_trip() {
    let theory = reflexive_theory();
    let (session, template) = model_of(&theory, 2);
    assert_eq!(session.check(), SatResult::Sat);

    let model = session.model().expect("model after sat");
    let structure = template.from_model(&model).unwrap();

    session.push();
    session.assert(&template.equals(&structure));
    assert_eq!(session.check(), SatResult::Sat);
    session.pop(1);
}

#[test]
fn test_structure_template_rejects_axiom_violating_structure() {
    let theory = reflexive_theory();
    let (session, template) = model_of(&theory, 2);

    // a structure with an empty accessibility relation is not reflexive
    let mut sizes = BTreeMap::new();
    sizes.insert("W".to_string(), 2);
    let mut relations = BTreeMap::new();
    relations.insert("R".to_string(), Default::default());
    relations.insert("P".to_string(), Default::default());
    let irreflexive = FiniteStructure::new(
        &theory.language.sorts,
        sizes,
        BTreeMap::new(),
        relations,
    )
    .unwrap();

    session.assert(&template.equals(&irreflexive));
    assert_eq!(session.check(), SatResult::Unsat);
}

#[test]
fn test_free_finite_relation_ranges_over_all_valuations() {
    let theory = parse_theory(
        r#"
        theory FRAME
            sort W
            relation R: W W
            relation P: W
        end
        "#,
    )
    .unwrap();

    let (session, template) = model_of(&theory, 2);
    let world_sort = theory.language.get_sort("W").unwrap().clone();
    let (relation, values) = template
        .free_finite_relation(std::slice::from_ref(&world_sort))
        .unwrap();

    let zero: Dynamic = Int::from_i64(0).into();

    // for a particular valuation the tuple may hold...
    session.push();
    session.assert(&relation.apply(std::slice::from_ref(&zero)));
    assert_eq!(session.check(), SatResult::Sat);
    session.pop(1);

    // ...but it does not hold under *every* valuation
    session.assert(&forall_bools(
        &values,
        &relation.apply(std::slice::from_ref(&zero)),
    ));
    assert_eq!(session.check(), SatResult::Unsat);
}
