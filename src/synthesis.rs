//! Counterexample-guided synthesis of modal axiomatizations.
//!
//! The search holds two solver sessions:
//!
//! - the *candidate* session carries the formula template's well-formedness
//!   constraint, a symbolic structure over the trivial (unconstrained
//!   frame) theory, the requirement that the candidate is **not** valid on
//!   that structure, and one positive constraint per counterexample seen so
//!   far ("the candidate holds on this frame");
//! - the *countermodel* session carries a symbolic structure over the goal
//!   theory and, per candidate, the assertion that the candidate fails
//!   somewhere on it (under `push`/`pop`).
//!
//! Each satisfiable candidate check yields a concrete modal formula. If the
//! countermodel session finds a goal frame refuting it, that frame is
//! extracted and fed back as a positive constraint; otherwise the candidate
//! is accepted and generalized over *every* proposition valuation via a
//! free finite relation, which prunes all weaker candidates from the
//! search. The loop ends when the candidate session goes unsatisfiable.

use crate::error::SynthesisError;
use crate::finite_model::FiniteModelTemplate;
use crate::language::{RelationSymbol, Sort};
use crate::modal::{Atom, FOStructureFrame, ModalFormula, ModalFormulaTemplate, Valuation};
use crate::logging;
use crate::smt::{self, Session};
use crate::structure::Structure;
use crate::syntax::Formula;
use crate::template::Template;
use crate::theory::Theory;
use std::collections::HashMap;
use z3::SatResult;

/// Names binding a theory's symbols to the frame vocabulary.
#[derive(Debug, Clone)]
pub struct FrameSignature {
    /// Sort whose carrier is the world set.
    pub world_sort: String,
    /// Binary accessibility relation.
    pub accessibility: String,
    /// Unary relation interpreting the proposition letter.
    pub proposition: String,
}

impl Default for FrameSignature {
    fn default() -> Self {
        FrameSignature {
            world_sort: "W".to_string(),
            accessibility: "R".to_string(),
            proposition: "P".to_string(),
        }
    }
}

/// Search bounds and solver policy.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub modal_depth: usize,
    pub model_size: usize,
    pub timeout_ms: u64,
    /// Stop after examining this many candidates; `None` runs the template
    /// to exhaustion.
    pub max_candidates: Option<usize>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        SynthesisOptions {
            modal_depth: 2,
            model_size: 4,
            timeout_ms: 30_000,
            max_candidates: None,
        }
    }
}

impl From<&crate::config::SynthConfig> for SynthesisOptions {
    fn from(config: &crate::config::SynthConfig) -> Self {
        SynthesisOptions {
            modal_depth: config.search.modal_depth,
            model_size: config.search.model_size,
            timeout_ms: config.z3.timeout_ms,
            max_candidates: config.search.max_candidates,
        }
    }
}

/// Outcome of a synthesis run.
#[derive(Debug, Clone)]
pub struct SynthesisReport {
    /// Formulas valid on the goal class, in acceptance order.
    pub accepted: Vec<ModalFormula>,
    /// Candidates examined, accepted or not.
    pub examined: usize,
    /// Whether the template was run to exhaustion (as opposed to hitting
    /// the candidate cap).
    pub exhausted: bool,
}

struct FrameVocabulary {
    world: Sort,
    accessibility: RelationSymbol,
    proposition: RelationSymbol,
}

fn resolve_vocabulary(
    theory: &Theory,
    signature: &FrameSignature,
) -> Result<FrameVocabulary, SynthesisError> {
    let world = theory
        .language
        .get_sort(&signature.world_sort)
        .cloned()
        .ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!(
                "theory {} has no sort {}",
                theory.name, signature.world_sort
            ))
        })?;

    let accessibility = theory
        .language
        .get_relation_symbol(&signature.accessibility)
        .cloned()
        .ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!(
                "theory {} has no relation {}",
                theory.name, signature.accessibility
            ))
        })?;
    if accessibility.arity() != 2 {
        return Err(SynthesisError::SignatureMismatch(format!(
            "accessibility relation {} must be binary",
            accessibility.name
        )));
    }

    let proposition = theory
        .language
        .get_relation_symbol(&signature.proposition)
        .cloned()
        .ok_or_else(|| {
            SynthesisError::SignatureMismatch(format!(
                "theory {} has no relation {}",
                theory.name, signature.proposition
            ))
        })?;
    if proposition.arity() != 1 {
        return Err(SynthesisError::SignatureMismatch(format!(
            "proposition relation {} must be unary",
            proposition.name
        )));
    }

    Ok(FrameVocabulary {
        world,
        accessibility,
        proposition,
    })
}

/// Enumerate every modal formula in the template that is valid on the goal
/// class of frames, reporting each examined candidate through `progress`
/// (formula, accepted).
pub fn axiomatize_frame_class(
    trivial_theory: &Theory,
    goal_theory: &Theory,
    atom: &Atom,
    signature: &FrameSignature,
    options: &SynthesisOptions,
    mut progress: impl FnMut(&ModalFormula, bool),
) -> Result<SynthesisReport, SynthesisError> {
    let trivial = resolve_vocabulary(trivial_theory, signature)?;
    let goal = resolve_vocabulary(goal_theory, signature)?;

    let template = ModalFormulaTemplate::new(std::slice::from_ref(atom), options.modal_depth);

    let mut sizes = HashMap::new();
    sizes.insert(trivial.world.clone(), options.model_size);
    let trivial_model = FiniteModelTemplate::new(trivial_theory, &sizes)?;

    let mut goal_sizes = HashMap::new();
    goal_sizes.insert(goal.world.clone(), options.model_size);
    let goal_model = FiniteModelTemplate::new(goal_theory, &goal_sizes)?;

    let candidate_session = Session::new(options.timeout_ms);
    let countermodel_session = Session::new(options.timeout_ms);

    candidate_session.assert(&template.constraint()?);
    candidate_session.assert(&trivial_model.constraint()?);
    countermodel_session.assert(&goal_model.constraint()?);

    let trivial_frame = FOStructureFrame::new(
        &trivial_model,
        trivial.world.clone(),
        trivial.accessibility.clone(),
    );
    let goal_frame =
        FOStructureFrame::new(&goal_model, goal.world.clone(), goal.accessibility.clone());

    // Candidates must not already hold on every frame whatsoever.
    let mut trivial_valuation = Valuation::new();
    trivial_valuation.assign(atom.clone(), |world| {
        trivial_model.interpret_relation(&trivial.proposition, &[world.clone()])
    });
    candidate_session.assert(
        &template
            .interpret_on_all_worlds(&trivial_frame, &trivial_valuation)?
            .not(),
    );

    let mut accepted = Vec::new();
    let mut examined = 0;
    let mut exhausted = true;

    loop {
        if let Some(limit) = options.max_candidates {
            if examined >= limit {
                exhausted = false;
                break;
            }
        }

        match candidate_session.check() {
            SatResult::Unsat => break,
            SatResult::Unknown => {
                return Err(SynthesisError::Backend(
                    "candidate search returned unknown".to_string(),
                ))
            }
            SatResult::Sat => {}
        }

        let model = candidate_session.model().ok_or_else(|| {
            SynthesisError::Backend("satisfiable candidate check produced no model".to_string())
        })?;
        let candidate = template.from_model(&model)?;
        examined += 1;
        logging::candidate(examined, &candidate);

        // Look for a goal frame on which the candidate fails somewhere.
        countermodel_session.push();
        let mut goal_valuation = Valuation::new();
        goal_valuation.assign(atom.clone(), |world| {
            goal_model.interpret_relation(&goal.proposition, &[world.clone()])
        });
        countermodel_session.assert(
            &candidate
                .interpret_on_all_worlds(&goal_frame, &goal_valuation)?
                .not(),
        );

        let verdict = countermodel_session.check();
        match verdict {
            SatResult::Sat => {
                let countermodel = countermodel_session.model().ok_or_else(|| {
                    SynthesisError::Backend(
                        "satisfiable countermodel check produced no model".to_string(),
                    )
                })?;
                let counterexample = goal_model.from_model(&countermodel)?;
                countermodel_session.pop(1);

                logging::rejected(examined, &counterexample);
                progress(&candidate, false);

                // From now on the template must hold on this frame.
                let frame = FOStructureFrame::new(
                    &counterexample,
                    goal.world.clone(),
                    goal.accessibility.clone(),
                );
                let mut valuation = Valuation::new();
                valuation.assign(atom.clone(), |world| {
                    counterexample.interpret_relation(&goal.proposition, &[world.clone()])
                });
                candidate_session.assert(&template.interpret_on_all_worlds(&frame, &valuation)?);
            }
            SatResult::Unsat => {
                countermodel_session.pop(1);
                logging::accepted(examined);
                progress(&candidate, true);

                // Require future trivial structures to satisfy the accepted
                // candidate under every proposition valuation, so weaker
                // formulas stop being candidates.
                let (relation, values) =
                    trivial_model.free_finite_relation(std::slice::from_ref(&trivial.world))?;
                let mut valuation = Valuation::new();
                valuation.assign(atom.clone(), move |world| {
                    Ok(relation.apply(&[world.clone()]))
                });
                let body = candidate.interpret_on_all_worlds(&trivial_frame, &valuation)?;
                candidate_session.assert(&smt::forall_bools(&values, &body));

                accepted.push(candidate);
            }
            SatResult::Unknown => {
                countermodel_session.pop(1);
                return Err(SynthesisError::Backend(
                    "countermodel search returned unknown".to_string(),
                ));
            }
        }
    }

    Ok(SynthesisReport {
        accepted,
        examined,
        exhausted,
    })
}

/// Conjoin formulas right-associatively, preserving insertion order.
pub fn conjoin_in_order(formulas: &[ModalFormula]) -> Option<ModalFormula> {
    let mut reversed = formulas.iter().rev();
    let mut conjunction = reversed.next()?.clone();
    for formula in reversed {
        conjunction = ModalFormula::conjunction(formula.clone(), conjunction);
    }
    Some(conjunction)
}

/// Check whether the accepted formulas characterize the goal class among
/// finite frames of the bounded size.
///
/// Builds the complement theory (the trivial theory plus "at least one
/// goal axiom fails") and asks whether the conjunction of the accepted
/// formulas can hold universally, over all proposition valuations, on some
/// complement model. Unsatisfiable means no such frame exists: the
/// axiomatization is complete relative to the bound.
pub fn check_completeness(
    trivial_theory: &Theory,
    goal_theory: &Theory,
    accepted: &[ModalFormula],
    atom: &Atom,
    signature: &FrameSignature,
    options: &SynthesisOptions,
) -> Result<bool, SynthesisError> {
    let Some(axiomatization) = conjoin_in_order(accepted) else {
        // Nothing was accepted; the empty axiomatization holds everywhere,
        // so any nonempty goal theory is uncharacterized.
        return Ok(goal_theory.axioms().count() == 0);
    };

    let mut complement_axiom = Formula::Falsum;
    for axiom in goal_theory.axioms() {
        complement_axiom =
            Formula::disjunction(complement_axiom, Formula::negation(axiom.formula.clone()));
    }
    let complement_theory = trivial_theory.extend_axioms([complement_axiom]);

    let vocabulary = resolve_vocabulary(&complement_theory, signature)?;

    let mut sizes = HashMap::new();
    sizes.insert(vocabulary.world.clone(), options.model_size);
    let complement_model = FiniteModelTemplate::new(&complement_theory, &sizes)?;

    let session = Session::new(options.timeout_ms);
    session.assert(&complement_model.constraint()?);

    let (relation, values) =
        complement_model.free_finite_relation(std::slice::from_ref(&vocabulary.world))?;
    let frame = FOStructureFrame::new(
        &complement_model,
        vocabulary.world.clone(),
        vocabulary.accessibility.clone(),
    );
    let mut valuation = Valuation::new();
    valuation.assign(atom.clone(), move |world| {
        Ok(relation.apply(&[world.clone()]))
    });

    let body = axiomatization.interpret_on_all_worlds(&frame, &valuation)?;
    session.assert(&smt::forall_bools(&values, &body));

    let complete = match session.check() {
        SatResult::Unsat => true,
        SatResult::Sat => false,
        SatResult::Unknown => {
            return Err(SynthesisError::Backend(
                "completeness check returned unknown".to_string(),
            ))
        }
    };
    logging::completeness(complete, options.model_size);
    Ok(complete)
}

/// Goal theories for the standard frame classes, in the shared frame
/// vocabulary (`sort W`, `relation R: W W`, `relation P: W`).
pub mod presets {
    use crate::theory::Theory;
    use crate::theory_parser::{parse_theory, TheoryParseError};

    /// Frames with no constraints at all.
    pub fn trivial() -> Result<Theory, TheoryParseError> {
        parse_theory(
            r#"
            theory FRAME
                sort W
                relation R: W W
                relation P: W
            end
            "#,
        )
    }

    pub fn reflexive() -> Result<Theory, TheoryParseError> {
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
    }

    pub fn transitive() -> Result<Theory, TheoryParseError> {
        parse_theory(
            r#"
            theory TRANSITIVE
                sort W
                relation R: W W
                relation P: W
                axiom forall x: W, y: W, z: W. R(x, y) /\ R(y, z) -> R(x, z)
            end
            "#,
        )
    }

    pub fn symmetric() -> Result<Theory, TheoryParseError> {
        parse_theory(
            r#"
            theory SYMMETRIC
                sort W
                relation R: W W
                relation P: W
                axiom forall x: W, y: W. R(x, y) -> R(y, x)
            end
            "#,
        )
    }

    pub fn euclidean() -> Result<Theory, TheoryParseError> {
        parse_theory(
            r#"
            theory EUCLIDEAN
                sort W
                relation R: W W
                relation P: W
                axiom forall x: W, y: W, z: W. R(x, y) /\ R(x, z) -> R(y, z) /\ R(z, y)
            end
            "#,
        )
    }

    /// Reflexive + symmetric + transitive, as one conjoined axiom.
    pub fn rst() -> Result<Theory, TheoryParseError> {
        parse_theory(
            r#"
            theory RST
                sort W
                relation R: W W
                relation P: W
                axiom forall x: W, y: W, z: W. R(x, x) /\ (R(x, y) -> R(y, x)) /\ (R(x, y) /\ R(y, z) -> R(x, z))
            end
            "#,
        )
    }
}
