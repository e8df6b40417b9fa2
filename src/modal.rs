//! Modal formulas and their interpretation on frames.
//!
//! A frame is a pair (worlds, accessibility). `FOStructureFrame` adapts any
//! first-order structure into a frame by re-exposing one of its carriers as
//! the world set and a named binary relation as accessibility. Propositional
//! valuations are passed as callables from a world value to a backend
//! boolean, so the same interpretation code runs against a symbolic
//! structure's relation, a concrete counterexample's table, or a free
//! finite relation used to generalize over every valuation.

use crate::error::SynthesisError;
use crate::language::{RelationSymbol, Sort};
use crate::smt;
use crate::structure::{Carrier, Structure};
use crate::template::{BoundedIntegerVariable, Template};
use std::collections::HashMap;
use std::fmt;
use z3::ast::{Ast, Bool, Dynamic};
use z3::Model;

/// A propositional letter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub name: String,
}

impl Atom {
    pub fn new(name: impl Into<String>) -> Self {
        Atom { name: name.into() }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A function from a world value to the truth of an atom at that world.
pub type WorldFunction<'v> = Box<dyn Fn(&Dynamic) -> Result<Bool, SynthesisError> + 'v>;

/// Assignment of a `WorldFunction` to each atom.
#[derive(Default)]
pub struct Valuation<'v> {
    assignments: HashMap<Atom, WorldFunction<'v>>,
}

impl<'v> Valuation<'v> {
    pub fn new() -> Self {
        Valuation {
            assignments: HashMap::new(),
        }
    }

    pub fn assign(
        &mut self,
        atom: Atom,
        truth: impl Fn(&Dynamic) -> Result<Bool, SynthesisError> + 'v,
    ) {
        self.assignments.insert(atom, Box::new(truth));
    }

    fn truth(&self, atom: &Atom, world: &Dynamic) -> Result<Bool, SynthesisError> {
        let assignment = self.assignments.get(atom).ok_or_else(|| {
            SynthesisError::UnboundVariable(format!("atom {} has no valuation", atom))
        })?;
        assignment(world)
    }
}

/// A frame backed by a first-order structure: the given sort's carrier is
/// the world set, the given binary relation is accessibility.
pub struct FOStructureFrame<'a> {
    structure: &'a dyn Structure,
    world_sort: Sort,
    accessibility: RelationSymbol,
}

impl<'a> FOStructureFrame<'a> {
    pub fn new(
        structure: &'a dyn Structure,
        world_sort: Sort,
        accessibility: RelationSymbol,
    ) -> Self {
        FOStructureFrame {
            structure,
            world_sort,
            accessibility,
        }
    }

    pub fn worlds(&self) -> Result<&Carrier, SynthesisError> {
        self.structure.interpret_sort(&self.world_sort)
    }

    pub fn accessible(&self, source: &Dynamic, target: &Dynamic) -> Result<Bool, SynthesisError> {
        self.structure
            .interpret_relation(&self.accessibility, &[source.clone(), target.clone()])
    }
}

/// Modal formulas over box and diamond; no binders.
#[derive(Debug, Clone, PartialEq)]
pub enum ModalFormula {
    Atom(Atom),
    Verum,
    Falsum,
    Conjunction(Box<ModalFormula>, Box<ModalFormula>),
    Disjunction(Box<ModalFormula>, Box<ModalFormula>),
    Negation(Box<ModalFormula>),
    Implication(Box<ModalFormula>, Box<ModalFormula>),
    Equivalence(Box<ModalFormula>, Box<ModalFormula>),
    Box(Box<ModalFormula>),
    Diamond(Box<ModalFormula>),
}

impl ModalFormula {
    pub fn atom(name: impl Into<String>) -> Self {
        ModalFormula::Atom(Atom::new(name))
    }

    pub fn conjunction(left: ModalFormula, right: ModalFormula) -> Self {
        ModalFormula::Conjunction(left.into(), right.into())
    }

    pub fn disjunction(left: ModalFormula, right: ModalFormula) -> Self {
        ModalFormula::Disjunction(left.into(), right.into())
    }

    pub fn negation(inner: ModalFormula) -> Self {
        ModalFormula::Negation(inner.into())
    }

    pub fn implication(left: ModalFormula, right: ModalFormula) -> Self {
        ModalFormula::Implication(left.into(), right.into())
    }

    pub fn equivalence(left: ModalFormula, right: ModalFormula) -> Self {
        ModalFormula::Equivalence(left.into(), right.into())
    }

    pub fn necessity(inner: ModalFormula) -> Self {
        ModalFormula::Box(inner.into())
    }

    pub fn possibility(inner: ModalFormula) -> Self {
        ModalFormula::Diamond(inner.into())
    }

    /// Maximum nesting of box/diamond.
    pub fn modal_depth(&self) -> usize {
        match self {
            ModalFormula::Atom(_) | ModalFormula::Verum | ModalFormula::Falsum => 0,
            ModalFormula::Negation(inner) => inner.modal_depth(),
            ModalFormula::Conjunction(left, right)
            | ModalFormula::Disjunction(left, right)
            | ModalFormula::Implication(left, right)
            | ModalFormula::Equivalence(left, right) => left.modal_depth().max(right.modal_depth()),
            ModalFormula::Box(inner) | ModalFormula::Diamond(inner) => 1 + inner.modal_depth(),
        }
    }

    /// Truth of the formula at a specific world.
    pub fn interpret_at_world(
        &self,
        frame: &FOStructureFrame<'_>,
        valuation: &Valuation<'_>,
        world: &Dynamic,
    ) -> Result<Bool, SynthesisError> {
        match self {
            ModalFormula::Atom(atom) => valuation.truth(atom, world),
            ModalFormula::Verum => Ok(Bool::from_bool(true)),
            ModalFormula::Falsum => Ok(Bool::from_bool(false)),
            ModalFormula::Conjunction(left, right) => Ok(Bool::and(&[
                left.interpret_at_world(frame, valuation, world)?,
                right.interpret_at_world(frame, valuation, world)?,
            ])),
            ModalFormula::Disjunction(left, right) => Ok(Bool::or(&[
                left.interpret_at_world(frame, valuation, world)?,
                right.interpret_at_world(frame, valuation, world)?,
            ])),
            ModalFormula::Negation(inner) => {
                Ok(inner.interpret_at_world(frame, valuation, world)?.not())
            }
            ModalFormula::Implication(left, right) => Ok(left
                .interpret_at_world(frame, valuation, world)?
                .implies(&right.interpret_at_world(frame, valuation, world)?)),
            ModalFormula::Equivalence(left, right) => Ok(left
                .interpret_at_world(frame, valuation, world)?
                ._eq(&right.interpret_at_world(frame, valuation, world)?)),
            ModalFormula::Box(inner) => {
                let worlds = frame.worlds()?;
                let successor = smt::fresh_const("world", &worlds.smt_sort());
                let body = frame
                    .accessible(world, &successor)?
                    .implies(&inner.interpret_at_world(frame, valuation, &successor)?);
                worlds.universally_quantify(&successor, &body)
            }
            ModalFormula::Diamond(inner) => {
                let worlds = frame.worlds()?;
                let successor = smt::fresh_const("world", &worlds.smt_sort());
                let body = Bool::and(&[
                    frame.accessible(world, &successor)?,
                    inner.interpret_at_world(frame, valuation, &successor)?,
                ]);
                worlds.existentially_quantify(&successor, &body)
            }
        }
    }

    /// Universal closure over the frame's worlds.
    pub fn interpret_on_all_worlds(
        &self,
        frame: &FOStructureFrame<'_>,
        valuation: &Valuation<'_>,
    ) -> Result<Bool, SynthesisError> {
        let worlds = frame.worlds()?;
        let world = smt::fresh_const("world", &worlds.smt_sort());
        let body = self.interpret_at_world(frame, valuation, &world)?;
        worlds.universally_quantify(&world, &body)
    }
}

impl fmt::Display for ModalFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModalFormula::Atom(atom) => write!(f, "{}", atom),
            ModalFormula::Verum => write!(f, "⊤"),
            ModalFormula::Falsum => write!(f, "⊥"),
            ModalFormula::Conjunction(left, right) => write!(f, "({} ∧ {})", left, right),
            ModalFormula::Disjunction(left, right) => write!(f, "({} ∨ {})", left, right),
            ModalFormula::Negation(inner) => write!(f, "¬{}", inner),
            ModalFormula::Implication(left, right) => write!(f, "({} → {})", left, right),
            ModalFormula::Equivalence(left, right) => write!(f, "({} ↔ {})", left, right),
            ModalFormula::Box(inner) => write!(f, "□{}", inner),
            ModalFormula::Diamond(inner) => write!(f, "◇{}", inner),
        }
    }
}

/// Connectives a modal template node can select, in tag order after the
/// atoms. Arity-0 tags stay adjacent to the atoms so the depth-0 case is a
/// contiguous tag range.
const CONNECTIVES: &[(Connective, usize)] = &[
    (Connective::Falsum, 0),
    (Connective::Verum, 0),
    (Connective::Conjunction, 2),
    (Connective::Disjunction, 2),
    (Connective::Negation, 1),
    (Connective::Implication, 2),
    (Connective::Equivalence, 2),
    (Connective::Box, 1),
    (Connective::Diamond, 1),
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Connective {
    Falsum,
    Verum,
    Conjunction,
    Disjunction,
    Negation,
    Implication,
    Equivalence,
    Box,
    Diamond,
}

impl Connective {
    fn apply(self, mut children: Vec<ModalFormula>) -> ModalFormula {
        let mut pop = || children.pop().unwrap_or(ModalFormula::Falsum);
        match self {
            Connective::Falsum => ModalFormula::Falsum,
            Connective::Verum => ModalFormula::Verum,
            Connective::Negation => ModalFormula::negation(pop()),
            Connective::Box => ModalFormula::necessity(pop()),
            Connective::Diamond => ModalFormula::possibility(pop()),
            Connective::Conjunction => {
                let right = pop();
                ModalFormula::conjunction(pop(), right)
            }
            Connective::Disjunction => {
                let right = pop();
                ModalFormula::disjunction(pop(), right)
            }
            Connective::Implication => {
                let right = pop();
                ModalFormula::implication(pop(), right)
            }
            Connective::Equivalence => {
                let right = pop();
                ModalFormula::equivalence(pop(), right)
            }
        }
    }
}

/// Template for an unknown modal formula of bounded depth.
///
/// Tags: `0` absent, `1..=A` one per atom, then the connectives in
/// `CONNECTIVES` order. At depth 0 only arity-0 tags are admitted.
pub struct ModalFormulaTemplate {
    atoms: Vec<Atom>,
    depth: usize,
    node: BoundedIntegerVariable,
    subformulas: Vec<ModalFormulaTemplate>,
}

impl ModalFormulaTemplate {
    pub fn new(atoms: &[Atom], depth: usize) -> Self {
        let tags = atoms.len() + CONNECTIVES.len();
        let subformulas = if depth == 0 {
            Vec::new()
        } else {
            (0..2).map(|_| ModalFormulaTemplate::new(atoms, depth - 1)).collect()
        };

        ModalFormulaTemplate {
            atoms: atoms.to_vec(),
            depth,
            node: BoundedIntegerVariable::new(0, tags as i64),
            subformulas,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn connective(&self, tag: usize) -> Option<(Connective, usize)> {
        CONNECTIVES.get(tag - self.atoms.len() - 1).copied()
    }

    pub fn is_null_constraint(&self) -> Bool {
        let mut conjuncts = vec![self.node.equals(0)];
        for subformula in &self.subformulas {
            conjuncts.push(subformula.is_null_constraint());
        }
        smt::and_all(&conjuncts)
    }

    /// Truth of the undetermined formula at a world: nested `ite` keyed on
    /// the node tag.
    pub fn interpret_at_world(
        &self,
        frame: &FOStructureFrame<'_>,
        valuation: &Valuation<'_>,
        world: &Dynamic,
    ) -> Result<Bool, SynthesisError> {
        let mut interpretation = Bool::from_bool(false);

        for tag in 1..=self.atoms.len() {
            let truth = valuation.truth(&self.atoms[tag - 1], world)?;
            interpretation = self.node.equals(tag as i64).ite(&truth, &interpretation);
        }

        for tag in self.atoms.len() + 1..=self.atoms.len() + CONNECTIVES.len() {
            let (connective, arity) = self.connective(tag).unwrap_or((Connective::Falsum, 0));
            if arity > 0 && self.depth == 0 {
                continue;
            }

            let case = match connective {
                Connective::Falsum => Bool::from_bool(false),
                Connective::Verum => Bool::from_bool(true),
                Connective::Negation => self.subformulas[0]
                    .interpret_at_world(frame, valuation, world)?
                    .not(),
                Connective::Conjunction => Bool::and(&[
                    self.subformulas[0].interpret_at_world(frame, valuation, world)?,
                    self.subformulas[1].interpret_at_world(frame, valuation, world)?,
                ]),
                Connective::Disjunction => Bool::or(&[
                    self.subformulas[0].interpret_at_world(frame, valuation, world)?,
                    self.subformulas[1].interpret_at_world(frame, valuation, world)?,
                ]),
                Connective::Implication => self.subformulas[0]
                    .interpret_at_world(frame, valuation, world)?
                    .implies(&self.subformulas[1].interpret_at_world(frame, valuation, world)?),
                Connective::Equivalence => self.subformulas[0]
                    .interpret_at_world(frame, valuation, world)?
                    ._eq(&self.subformulas[1].interpret_at_world(frame, valuation, world)?),
                Connective::Box => {
                    let worlds = frame.worlds()?;
                    let successor = smt::fresh_const("world", &worlds.smt_sort());
                    let body = frame.accessible(world, &successor)?.implies(
                        &self.subformulas[0].interpret_at_world(frame, valuation, &successor)?,
                    );
                    worlds.universally_quantify(&successor, &body)?
                }
                Connective::Diamond => {
                    let worlds = frame.worlds()?;
                    let successor = smt::fresh_const("world", &worlds.smt_sort());
                    let body = Bool::and(&[
                        frame.accessible(world, &successor)?,
                        self.subformulas[0].interpret_at_world(frame, valuation, &successor)?,
                    ]);
                    worlds.existentially_quantify(&successor, &body)?
                }
            };

            interpretation = self.node.equals(tag as i64).ite(&case, &interpretation);
        }

        Ok(interpretation)
    }

    /// Universal closure of the undetermined formula over the frame's
    /// worlds.
    pub fn interpret_on_all_worlds(
        &self,
        frame: &FOStructureFrame<'_>,
        valuation: &Valuation<'_>,
    ) -> Result<Bool, SynthesisError> {
        let worlds = frame.worlds()?;
        let world = smt::fresh_const("world", &worlds.smt_sort());
        let body = self.interpret_at_world(frame, valuation, &world)?;
        worlds.universally_quantify(&world, &body)
    }
}

impl Template for ModalFormulaTemplate {
    type Value = ModalFormula;

    fn constraint(&self) -> Result<Bool, SynthesisError> {
        let mut cases = Vec::new();

        for tag in 1..=self.atoms.len() {
            let mut conjuncts = vec![self.node.equals(tag as i64)];
            for subformula in &self.subformulas {
                conjuncts.push(subformula.is_null_constraint());
            }
            cases.push(smt::and_all(&conjuncts));
        }

        for tag in self.atoms.len() + 1..=self.atoms.len() + CONNECTIVES.len() {
            let (_, arity) = self.connective(tag).unwrap_or((Connective::Falsum, 0));
            if arity > 0 && self.depth == 0 {
                continue;
            }

            let mut conjuncts = vec![self.node.equals(tag as i64)];
            for subformula in &self.subformulas[..arity] {
                conjuncts.push(subformula.constraint()?);
            }
            for subformula in &self.subformulas[arity..] {
                conjuncts.push(subformula.is_null_constraint());
            }
            cases.push(smt::and_all(&conjuncts));
        }

        Ok(smt::or_any(&cases))
    }

    fn from_model(&self, model: &Model) -> Result<ModalFormula, SynthesisError> {
        let tag = self.node.from_model(model)?;

        if tag == 0 {
            return Err(SynthesisError::InvalidModel(
                "null node tag at a modal formula that must exist".to_string(),
            ));
        }

        let tag = tag as usize;
        if tag <= self.atoms.len() {
            return Ok(ModalFormula::Atom(self.atoms[tag - 1].clone()));
        }

        let (connective, arity) = self.connective(tag).ok_or_else(|| {
            SynthesisError::InvalidModel(format!("node tag {} out of range", tag))
        })?;

        if arity > 0 && self.depth == 0 {
            return Err(SynthesisError::InvalidModel(format!(
                "connective tag {} at modal depth 0",
                tag
            )));
        }

        let children: Result<Vec<ModalFormula>, SynthesisError> = self.subformulas[..arity]
            .iter()
            .map(|subformula| subformula.from_model(model))
            .collect();
        Ok(connective.apply(children?))
    }

    fn equals(&self, value: &ModalFormula) -> Bool {
        match value {
            ModalFormula::Atom(atom) => {
                match self.atoms.iter().position(|candidate| candidate == atom) {
                    Some(index) => self.node.equals(index as i64 + 1),
                    None => Bool::from_bool(false),
                }
            }
            ModalFormula::Falsum => self.connective_equals(Connective::Falsum, &[]),
            ModalFormula::Verum => self.connective_equals(Connective::Verum, &[]),
            ModalFormula::Conjunction(left, right) => {
                self.connective_equals(Connective::Conjunction, &[left, right])
            }
            ModalFormula::Disjunction(left, right) => {
                self.connective_equals(Connective::Disjunction, &[left, right])
            }
            ModalFormula::Negation(inner) => {
                self.connective_equals(Connective::Negation, &[inner])
            }
            ModalFormula::Implication(left, right) => {
                self.connective_equals(Connective::Implication, &[left, right])
            }
            ModalFormula::Equivalence(left, right) => {
                self.connective_equals(Connective::Equivalence, &[left, right])
            }
            ModalFormula::Box(inner) => self.connective_equals(Connective::Box, &[inner]),
            ModalFormula::Diamond(inner) => self.connective_equals(Connective::Diamond, &[inner]),
        }
    }
}

impl ModalFormulaTemplate {
    fn connective_equals(&self, connective: Connective, children: &[&ModalFormula]) -> Bool {
        let offset = CONNECTIVES
            .iter()
            .position(|(candidate, _)| *candidate == connective)
            .unwrap_or(0);
        let arity = CONNECTIVES[offset].1;

        if arity != children.len() || (arity > 0 && self.depth == 0) {
            return Bool::from_bool(false);
        }

        let tag = self.atoms.len() + offset + 1;
        let mut conjuncts = vec![self.node.equals(tag as i64)];
        for (child, subformula) in children.iter().zip(&self.subformulas) {
            conjuncts.push(subformula.equals(child));
        }
        smt::and_all(&conjuncts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modal_depth() {
        let p = ModalFormula::atom("p");
        let t = ModalFormula::implication(ModalFormula::necessity(p.clone()), p.clone());
        assert_eq!(t.modal_depth(), 1);

        let four = ModalFormula::implication(
            ModalFormula::necessity(p.clone()),
            ModalFormula::necessity(ModalFormula::necessity(p)),
        );
        assert_eq!(four.modal_depth(), 2);
    }

    #[test]
    fn test_display() {
        let p = ModalFormula::atom("p");
        let b = ModalFormula::implication(
            p.clone(),
            ModalFormula::necessity(ModalFormula::possibility(p)),
        );
        assert_eq!(b.to_string(), "(p → □◇p)");
    }

    #[test]
    fn test_equals_rejects_unknown_atom() {
        let template = ModalFormulaTemplate::new(&[Atom::new("p")], 1);
        let q = ModalFormula::atom("q");
        assert_eq!(template.equals(&q), Bool::from_bool(false));
    }

    #[test]
    fn test_equals_rejects_connective_beyond_depth() {
        let template = ModalFormulaTemplate::new(&[Atom::new("p")], 0);
        let boxed = ModalFormula::necessity(ModalFormula::atom("p"));
        assert_eq!(template.equals(&boxed), Bool::from_bool(false));
    }
}
