//! Parser for the theory DSL.
//!
//! A theory is a keyword-delimited block of declarations:
//!
//! ```text
//! theory REFLEXIVE
//!     sort W
//!     relation R: W W
//!     relation P: W
//!     axiom forall x: W. R(x, x)
//! end
//! ```
//!
//! **Grammar (simplified):**
//!   theory      := "theory" IDENT declaration* "end"
//!   declaration := "sort" IDENT
//!                | "relation" IDENT ":" IDENT+
//!                | "function" IDENT ":" IDENT* "->" IDENT
//!                | "constant" IDENT ":" IDENT
//!                | "axiom" formula
//!   formula     := implication ("<->" formula)?
//!   implication := disjunction ("->" implication)?
//!   disjunction := conjunction ("\/" conjunction)*
//!   conjunction := unary ("/\" unary)*
//!   unary       := "not" unary | quantifier | atomic
//!   quantifier  := ("forall" | "exists") binder ("," binder)* "." formula
//!   atomic      := "true" | "false" | "(" formula ")"
//!                | IDENT "(" term ("," term)* ")" | term "=" term
//!
//! Line comments start with `//`. Axioms must be closed formulas; sorts of
//! every application are checked against the declared signature as we go.

use crate::language::{FunctionSymbol, Language, RelationSymbol, Sort};
use crate::syntax::{Formula, Term, Variable};
use crate::theory::{Axiom, Sentence, Theory};
use std::fmt;

const KEYWORDS: &[&str] = &[
    "theory", "end", "sort", "relation", "function", "constant", "axiom", "forall", "exists",
    "not", "true", "false",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TheoryParseError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for TheoryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "theory parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TheoryParseError {}

/// Parse a single `theory ... end` block.
pub fn parse_theory(input: &str) -> Result<Theory, TheoryParseError> {
    let mut parser = TheoryParser::new(input);
    let theory = parser.parse_theory()?;

    parser.skip_whitespace();
    if parser.peek().is_some() {
        return Err(parser.error("unexpected input after `end`"));
    }

    Ok(theory)
}

pub struct TheoryParser {
    input: Vec<char>,
    pos: usize,
}

impl TheoryParser {
    pub fn new(input: &str) -> Self {
        TheoryParser {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> TheoryParseError {
        TheoryParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn skip_whitespace(&mut self) {
        loop {
            while self.peek().is_some_and(|ch| ch.is_whitespace()) {
                self.advance();
            }

            // Line comment: skip until newline
            if self.peek() == Some('/') && self.peek_ahead(1) == Some('/') {
                while let Some(ch) = self.advance() {
                    if ch == '\n' {
                        break;
                    }
                }
                continue;
            }

            break;
        }
    }

    fn parse_identifier(&mut self) -> Result<String, TheoryParseError> {
        self.skip_whitespace();

        match self.peek() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            _ => return Err(self.error("expected identifier")),
        }

        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
        {
            self.advance();
        }

        Ok(self.input[start..self.pos].iter().collect())
    }

    /// Parse an identifier if one starts here and it is not a keyword;
    /// otherwise leave the position untouched.
    fn try_parse_plain_identifier(&mut self) -> Option<String> {
        let start = self.pos;
        match self.parse_identifier() {
            Ok(name) if !KEYWORDS.contains(&name.as_str()) => Some(name),
            _ => {
                self.pos = start;
                None
            }
        }
    }

    fn match_symbol(&mut self, symbol: &str) -> bool {
        self.skip_whitespace();

        let chars: Vec<char> = symbol.chars().collect();
        for (offset, expected) in chars.iter().enumerate() {
            if self.peek_ahead(offset) != Some(*expected) {
                return false;
            }
        }

        self.pos += chars.len();
        true
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), TheoryParseError> {
        if self.match_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", symbol)))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), TheoryParseError> {
        let start = self.pos;
        let name = self.parse_identifier()?;
        if name == keyword {
            Ok(())
        } else {
            self.pos = start;
            Err(self.error(format!("expected `{}`", keyword)))
        }
    }

    pub fn parse_theory(&mut self) -> Result<Theory, TheoryParseError> {
        self.expect_keyword("theory")?;
        let name = self.parse_identifier()?;

        let mut language = Language::default();
        let mut sentences = Vec::new();

        loop {
            let start = self.pos;
            let keyword = self.parse_identifier()?;

            match keyword.as_str() {
                "end" => break,
                "sort" => {
                    let sort = self.parse_sort_declaration(&language)?;
                    sentences.push(Sentence::SortDeclaration(sort.clone()));
                    language.sorts.push(sort);
                }
                "relation" => {
                    let symbol = self.parse_relation_declaration(&language)?;
                    sentences.push(Sentence::RelationDeclaration(symbol.clone()));
                    language.relation_symbols.push(symbol);
                }
                "function" => {
                    let symbol = self.parse_function_declaration(&language)?;
                    sentences.push(Sentence::FunctionDeclaration(symbol.clone()));
                    language.function_symbols.push(symbol);
                }
                "constant" => {
                    let symbol = self.parse_constant_declaration(&language)?;
                    sentences.push(Sentence::FunctionDeclaration(symbol.clone()));
                    language.function_symbols.push(symbol);
                }
                "axiom" => {
                    let mut scope = Vec::new();
                    let formula = self.parse_formula(&language, &mut scope)?;

                    if !formula.free_variables().is_empty() {
                        self.pos = start;
                        return Err(self.error("axiom must be a closed formula"));
                    }

                    sentences.push(Sentence::Axiom(Axiom { formula }));
                }
                other => {
                    self.pos = start;
                    return Err(self.error(format!("unexpected declaration `{}`", other)));
                }
            }
        }

        Ok(Theory::new(name, language, sentences))
    }

    fn parse_sort_declaration(&mut self, language: &Language) -> Result<Sort, TheoryParseError> {
        let name = self.parse_identifier()?;
        if language.get_sort(&name).is_some() {
            return Err(self.error(format!("duplicate sort `{}`", name)));
        }
        Ok(Sort::new(name))
    }

    fn parse_sort_reference(&mut self, language: &Language) -> Result<Sort, TheoryParseError> {
        let name = self.parse_identifier()?;
        language
            .get_sort(&name)
            .cloned()
            .ok_or_else(|| self.error(format!("unknown sort `{}`", name)))
    }

    fn parse_relation_declaration(
        &mut self,
        language: &Language,
    ) -> Result<RelationSymbol, TheoryParseError> {
        let name = self.parse_identifier()?;
        if language.get_relation_symbol(&name).is_some() {
            return Err(self.error(format!("duplicate relation symbol `{}`", name)));
        }
        self.expect_symbol(":")?;

        let mut input_sorts = Vec::new();
        while let Some(sort_name) = self.try_parse_plain_identifier() {
            let sort = language
                .get_sort(&sort_name)
                .cloned()
                .ok_or_else(|| self.error(format!("unknown sort `{}`", sort_name)))?;
            input_sorts.push(sort);
        }

        if input_sorts.is_empty() {
            return Err(self.error("relation needs at least one input sort"));
        }

        Ok(RelationSymbol::new(name, input_sorts))
    }

    fn parse_function_declaration(
        &mut self,
        language: &Language,
    ) -> Result<FunctionSymbol, TheoryParseError> {
        let name = self.parse_identifier()?;
        if language.get_function_symbol(&name).is_some() {
            return Err(self.error(format!("duplicate function symbol `{}`", name)));
        }
        self.expect_symbol(":")?;

        let mut input_sorts = Vec::new();
        while let Some(sort_name) = self.try_parse_plain_identifier() {
            let sort = language
                .get_sort(&sort_name)
                .cloned()
                .ok_or_else(|| self.error(format!("unknown sort `{}`", sort_name)))?;
            input_sorts.push(sort);
        }

        self.expect_symbol("->")?;
        let output_sort = self.parse_sort_reference(language)?;

        Ok(FunctionSymbol::new(name, input_sorts, output_sort))
    }

    fn parse_constant_declaration(
        &mut self,
        language: &Language,
    ) -> Result<FunctionSymbol, TheoryParseError> {
        let name = self.parse_identifier()?;
        if language.get_function_symbol(&name).is_some() {
            return Err(self.error(format!("duplicate function symbol `{}`", name)));
        }
        self.expect_symbol(":")?;
        let output_sort = self.parse_sort_reference(language)?;

        Ok(FunctionSymbol::new(name, Vec::new(), output_sort))
    }

    pub fn parse_formula(
        &mut self,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Formula, TheoryParseError> {
        let left = self.parse_implication(language, scope)?;

        if self.match_symbol("<->") {
            let right = self.parse_formula(language, scope)?;
            return Ok(Formula::equivalence(left, right));
        }

        Ok(left)
    }

    fn parse_implication(
        &mut self,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Formula, TheoryParseError> {
        let left = self.parse_disjunction(language, scope)?;

        // `->` is right-associative; make sure we don't eat the arrow of `<->`
        self.skip_whitespace();
        if self.peek() == Some('-') && self.peek_ahead(1) == Some('>') {
            self.pos += 2;
            let right = self.parse_implication(language, scope)?;
            return Ok(Formula::implication(left, right));
        }

        Ok(left)
    }

    fn parse_disjunction(
        &mut self,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Formula, TheoryParseError> {
        let mut formula = self.parse_conjunction(language, scope)?;

        while self.match_symbol("\\/") {
            let right = self.parse_conjunction(language, scope)?;
            formula = Formula::disjunction(formula, right);
        }

        Ok(formula)
    }

    fn parse_conjunction(
        &mut self,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Formula, TheoryParseError> {
        let mut formula = self.parse_unary(language, scope)?;

        while self.match_symbol("/\\") {
            let right = self.parse_unary(language, scope)?;
            formula = Formula::conjunction(formula, right);
        }

        Ok(formula)
    }

    fn parse_unary(
        &mut self,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Formula, TheoryParseError> {
        let start = self.pos;

        if let Ok(keyword) = self.parse_identifier() {
            match keyword.as_str() {
                "not" => {
                    let inner = self.parse_unary(language, scope)?;
                    return Ok(Formula::negation(inner));
                }
                "forall" | "exists" => {
                    return self.parse_quantifier(keyword == "forall", language, scope);
                }
                _ => self.pos = start,
            }
        }

        self.parse_atomic(language, scope)
    }

    fn parse_quantifier(
        &mut self,
        universal: bool,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Formula, TheoryParseError> {
        let mut binders = Vec::new();

        loop {
            let name = self.parse_identifier()?;
            self.expect_symbol(":")?;
            let sort = self.parse_sort_reference(language)?;
            binders.push(Variable::new(name, sort));

            if !self.match_symbol(",") {
                break;
            }
        }

        self.expect_symbol(".")?;

        scope.extend(binders.iter().cloned());
        let body = self.parse_formula(language, scope);
        scope.truncate(scope.len() - binders.len());
        let mut formula = body?;

        for variable in binders.into_iter().rev() {
            formula = if universal {
                Formula::universal(variable, formula)
            } else {
                Formula::existential(variable, formula)
            };
        }

        Ok(formula)
    }

    fn parse_atomic(
        &mut self,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Formula, TheoryParseError> {
        if self.match_symbol("(") {
            let formula = self.parse_formula(language, scope)?;
            self.expect_symbol(")")?;
            return Ok(formula);
        }

        let start = self.pos;
        let name = self.parse_identifier()?;

        match name.as_str() {
            "true" => return Ok(Formula::Verum),
            "false" => return Ok(Formula::Falsum),
            _ => {}
        }

        // Relation application, unless the name resolves to a term that is
        // the left-hand side of an equation.
        self.skip_whitespace();
        if self.peek() == Some('(') {
            if let Some(symbol) = language.get_relation_symbol(&name).cloned() {
                let arguments = self.parse_argument_list(language, scope)?;
                self.check_application(&name, &symbol.input_sorts, &arguments)?;
                return Ok(Formula::RelationApplication(symbol, arguments));
            }
        } else if let Some(symbol) = language.get_relation_symbol(&name) {
            self.pos = start;
            return Err(self.error(format!("relation `{}` expects arguments", symbol.name)));
        }

        // Fall back to an equation: term = term
        let left = self.finish_term(name, language, scope)?;
        self.expect_symbol("=")?;
        let right = self.parse_term(language, scope)?;

        if left.sort() != right.sort() {
            self.pos = start;
            return Err(self.error(format!(
                "equation sides have sorts {} and {}",
                left.sort(),
                right.sort()
            )));
        }

        Ok(Formula::Equality(left, right))
    }

    fn parse_argument_list(
        &mut self,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Vec<Term>, TheoryParseError> {
        self.expect_symbol("(")?;

        let mut arguments = vec![self.parse_term(language, scope)?];
        while self.match_symbol(",") {
            arguments.push(self.parse_term(language, scope)?);
        }

        self.expect_symbol(")")?;
        Ok(arguments)
    }

    fn check_application(
        &self,
        name: &str,
        input_sorts: &[Sort],
        arguments: &[Term],
    ) -> Result<(), TheoryParseError> {
        if input_sorts.len() != arguments.len() {
            return Err(self.error(format!(
                "`{}` expects {} arguments, got {}",
                name,
                input_sorts.len(),
                arguments.len()
            )));
        }

        for (expected, argument) in input_sorts.iter().zip(arguments) {
            if argument.sort() != expected {
                return Err(self.error(format!(
                    "argument `{}` of `{}` has sort {}, expected {}",
                    argument,
                    name,
                    argument.sort(),
                    expected
                )));
            }
        }

        Ok(())
    }

    fn parse_term(
        &mut self,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Term, TheoryParseError> {
        let name = self.parse_identifier()?;
        self.finish_term(name, language, scope)
    }

    /// Resolve a parsed identifier into a term: a function application, a
    /// bound variable (innermost binding wins), or a declared constant.
    fn finish_term(
        &mut self,
        name: String,
        language: &Language,
        scope: &mut Vec<Variable>,
    ) -> Result<Term, TheoryParseError> {
        self.skip_whitespace();

        if self.peek() == Some('(') {
            let symbol = language
                .get_function_symbol(&name)
                .cloned()
                .ok_or_else(|| self.error(format!("unknown function symbol `{}`", name)))?;
            let arguments = self.parse_argument_list(language, scope)?;
            self.check_application(&name, &symbol.input_sorts, &arguments)?;
            return Ok(Term::Application(symbol, arguments));
        }

        if let Some(variable) = scope.iter().rev().find(|variable| variable.name == name) {
            return Ok(Term::Variable(variable.clone()));
        }

        if let Some(symbol) = language.get_function_symbol(&name) {
            if symbol.arity() == 0 {
                return Ok(Term::Application(symbol.clone(), Vec::new()));
            }
        }

        Err(self.error(format!("unknown term `{}`", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFLEXIVE: &str = r#"
        theory REFLEXIVE
            sort W
            relation R: W W
            relation P: W
            axiom forall x: W. R(x, x)
        end
    "#;

    #[test]
    fn test_parse_reflexive_theory() {
        let theory = parse_theory(REFLEXIVE).unwrap();

        assert_eq!(theory.name, "REFLEXIVE");
        assert!(theory.language.get_sort("W").is_some());
        assert_eq!(theory.language.get_relation_symbol("R").unwrap().arity(), 2);
        assert_eq!(theory.axioms().count(), 1);

        let axiom = theory.axioms().next().unwrap();
        assert_eq!(axiom.formula.to_string(), "(forall x:W. R(x, x))");
    }

    #[test]
    fn test_parse_transitivity_axiom() {
        let theory = parse_theory(
            r#"
            theory TRANSITIVE
                sort W
                relation R: W W
                axiom forall x: W, y: W, z: W. R(x, y) /\ R(y, z) -> R(x, z)
            end
            "#,
        )
        .unwrap();

        let axiom = theory.axioms().next().unwrap();
        assert_eq!(
            axiom.formula.to_string(),
            "(forall x:W. (forall y:W. (forall z:W. ((R(x, y) /\\ R(y, z)) -> R(x, z)))))"
        );
    }

    #[test]
    fn test_parse_function_and_equation() {
        let theory = parse_theory(
            r#"
            theory MONOID
                sort M
                constant e: M
                function mul: M M -> M
                axiom forall x: M. mul(x, e) = x
            end
            "#,
        )
        .unwrap();

        assert_eq!(theory.language.get_function_symbol("mul").unwrap().arity(), 2);
        assert_eq!(theory.language.get_function_symbol("e").unwrap().arity(), 0);

        let axiom = theory.axioms().next().unwrap();
        assert_eq!(axiom.formula.to_string(), "(forall x:M. mul(x, e) = x)");
    }

    #[test]
    fn test_precedence_of_connectives() {
        let theory = parse_theory(
            r#"
            theory PREC
                sort W
                relation P: W
                axiom forall x: W. P(x) /\ P(x) \/ P(x) -> P(x)
            end
            "#,
        )
        .unwrap();

        let axiom = theory.axioms().next().unwrap();
        // /\ binds tighter than \/ binds tighter than ->
        assert_eq!(
            axiom.formula.to_string(),
            "(forall x:W. (((P(x) /\\ P(x)) \\/ P(x)) -> P(x)))"
        );
    }

    #[test]
    fn test_open_axiom_rejected() {
        let result = parse_theory(
            r#"
            theory OPEN
                sort W
                relation P: W
                axiom forall x: W. P(y)
            end
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_sort_rejected() {
        let result = parse_theory(
            r#"
            theory BAD
                sort W
                relation R: W V
            end
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let result = parse_theory(
            r#"
            theory BAD
                sort W
                relation R: W W
                axiom forall x: W. R(x)
            end
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_line_comments_skipped() {
        let theory = parse_theory(
            r#"
            // frames with a reflexive accessibility relation
            theory COMMENTED
                sort W
                relation R: W W // accessibility
                axiom forall x: W. R(x, x)
            end
            "#,
        )
        .unwrap();
        assert_eq!(theory.axioms().count(), 1);
    }
}
