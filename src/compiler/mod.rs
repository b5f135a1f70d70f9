//! DSL → bytecode compiler (L2, §4.2).
//!
//! Two surface syntaxes compile to the same [`crate::compiler::ast::Expr`]
//! tree: the canonical short DSL (`parser`) and the legacy fluent form
//! (`legacy`), tried in that order. Neither surface syntax can fail a module
//! load — a malformed expression degrades to the zero expression plus a
//! [`crate::warnings::Warning`] rather than propagating an error (§4.2, §7).
//!
//! Compiled results are memoized by canonical source text in [`Compiler`];
//! the cache is append-only and holds no graph references (§5, §9).

pub mod ast;
mod emit;
mod legacy;
mod lexer;
mod parser;

use std::collections::HashMap;

use crate::bytecode::Expression;
use crate::note::NoteId;
use crate::variable::VariableKind;
use crate::warnings::Warning;

/// Source-text-keyed memoization table plus the compile entry point.
#[derive(Debug, Default)]
pub struct Compiler {
    cache: HashMap<String, Expression>,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler { cache: HashMap::new() }
    }

    /// Clear the memoization table wholesale (§5: "may be cleared
    /// wholesale").
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Compile `dsl` for `(note, kind)`. Never fails: a parse error from
    /// both surface syntaxes yields the zero expression with the original
    /// source text preserved, plus a pushed warning.
    pub fn compile(
        &mut self,
        note: NoteId,
        kind: VariableKind,
        dsl: &str,
        warnings: &mut Vec<Warning>,
    ) -> Expression {
        let trimmed = dsl.trim();
        if trimmed.is_empty() {
            return Expression::zero(trimmed);
        }
        if let Some(cached) = self.cache.get(trimmed) {
            return cached.clone();
        }

        let ast = parser::parse(trimmed).or_else(|short_err| {
            legacy::parse(trimmed).map_err(|legacy_err| format!("{short_err}; legacy: {legacy_err}"))
        });

        let expr = match ast.and_then(|a| emit::emit(&a).map_err(|e| e)) {
            Ok(emitted) => Expression {
                code: emitted.code,
                refs: emitted.refs,
                references_base: emitted.references_base,
                source: trimmed.to_string(),
            },
            Err(message) => {
                warnings.push(Warning::new(note, kind, trimmed, message));
                Expression::zero(trimmed)
            }
        };

        self.cache.insert(trimmed.to_string(), expr.clone());
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_valid_short_dsl() {
        let mut c = Compiler::new();
        let mut warnings = Vec::new();
        let expr = c.compile(1, VariableKind::Frequency, "base.f * 3/2", &mut warnings);
        assert!(warnings.is_empty());
        assert!(expr.references_base);
        assert!(!expr.is_empty());
    }

    #[test]
    fn compiles_legacy_surface() {
        let mut c = Compiler::new();
        let mut warnings = Vec::new();
        let expr = c.compile(
            1,
            VariableKind::Frequency,
            "module.baseNote.getVariable('frequency').mul(new Fraction(3,2))",
            &mut warnings,
        );
        assert!(warnings.is_empty());
        assert!(expr.references_base);
    }

    #[test]
    fn malformed_expression_falls_back_to_zero() {
        let mut c = Compiler::new();
        let mut warnings = Vec::new();
        let expr = c.compile(2, VariableKind::Duration, "@#$not valid", &mut warnings);
        assert!(expr.is_empty());
        assert_eq!(expr.source, "@#$not valid");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].note, 2);
    }

    #[test]
    fn empty_source_is_legal_zero_expression() {
        let mut c = Compiler::new();
        let mut warnings = Vec::new();
        let expr = c.compile(1, VariableKind::StartTime, "", &mut warnings);
        assert!(expr.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn repeated_compiles_hit_the_cache() {
        let mut c = Compiler::new();
        let mut warnings = Vec::new();
        let a = c.compile(1, VariableKind::Frequency, "base.f + 1", &mut warnings);
        let b = c.compile(5, VariableKind::Duration, "base.f + 1", &mut warnings);
        assert_eq!(a.code, b.code);
    }
}
