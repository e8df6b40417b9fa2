//! Theories: a language bundled with an ordered list of sentences.

use crate::error::SynthesisError;
use crate::language::{FunctionSymbol, Language, RelationSymbol, Sort};
use crate::syntax::Formula;

/// A closed formula asserted by a theory.
#[derive(Debug, Clone, PartialEq)]
pub struct Axiom {
    pub formula: Formula,
}

/// A sentence of a theory, in declaration order. Declarations are recorded
/// alongside axioms so a theory round-trips the shape of its source block.
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    SortDeclaration(Sort),
    FunctionDeclaration(FunctionSymbol),
    RelationDeclaration(RelationSymbol),
    Axiom(Axiom),
}

/// A named theory over a many-sorted language.
#[derive(Debug, Clone, PartialEq)]
pub struct Theory {
    pub name: String,
    pub language: Language,
    pub sentences: Vec<Sentence>,
}

impl Theory {
    pub fn new(name: impl Into<String>, language: Language, sentences: Vec<Sentence>) -> Self {
        Theory {
            name: name.into(),
            language,
            sentences,
        }
    }

    /// The theory's axioms, in declaration order.
    pub fn axioms(&self) -> impl Iterator<Item = &Axiom> {
        self.sentences.iter().filter_map(|sentence| match sentence {
            Sentence::Axiom(axiom) => Some(axiom),
            _ => None,
        })
    }

    /// A copy of this theory with extra axioms appended.
    pub fn extend_axioms(&self, formulas: impl IntoIterator<Item = Formula>) -> Theory {
        let mut extended = self.clone();
        extended.sentences.extend(
            formulas
                .into_iter()
                .map(|formula| Sentence::Axiom(Axiom { formula })),
        );
        extended
    }

    /// A copy of this theory whose language is expanded by `other`.
    /// Fails on any sort or symbol collision.
    pub fn extend_language(&self, other: &Language) -> Result<Theory, SynthesisError> {
        let mut extended = self.clone();
        extended.language = self.language.expand(other)?;
        Ok(extended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Term, Variable};

    #[test]
    fn test_extend_axioms_preserves_order() {
        let world = Sort::new("W");
        let r = RelationSymbol::new("R", vec![world.clone(), world.clone()]);
        let language = Language::new(vec![world.clone()], vec![], vec![r.clone()]);
        let theory = Theory::new("FRAME", language, vec![]);

        let x = Variable::new("x", world);
        let reflexivity = Formula::universal(
            x.clone(),
            Formula::RelationApplication(
                r,
                vec![Term::Variable(x.clone()), Term::Variable(x)],
            ),
        );

        let extended = theory.extend_axioms([Formula::Verum, reflexivity.clone()]);
        let axioms: Vec<&Axiom> = extended.axioms().collect();
        assert_eq!(axioms.len(), 2);
        assert_eq!(axioms[0].formula, Formula::Verum);
        assert_eq!(axioms[1].formula, reflexivity);

        // the original theory is untouched
        assert_eq!(theory.axioms().count(), 0);
    }
}
