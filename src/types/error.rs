//! # Type Error Definitions
//!
//! Errors raised while translating a declaration:
//!
//! - A name has no recorded candidate type anywhere (`UndefinedSymbol`)
//! - Two types cannot be made equal (`TypeMismatch`)
//! - A binding would create an infinite type (`InfiniteType`)
//! - An overloaded name was never narrowed by context (`AmbiguousOverload`)
//! - A clause's parameters disagree with its declaration (`PatternArityMismatch`)
//!
//! Every error carries the offending source span. All of them are fatal to
//! the enclosing declaration; sibling declarations are unaffected.

use std::fmt;

use itertools::Itertools;
use lachs::Span;

use super::ty::{Type, TypeVar};
use super::unify::UnifyError;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeError {
    /// Reference to a name with no visible candidate type, in any scope or
    /// the external registry.
    UndefinedSymbol { name: String, span: Span },

    /// Unification between two fully-exposed types failed.
    TypeMismatch {
        expected: Type,
        found: Type,
        span: Span,
        /// Optional additional context for the error
        context: Option<String>,
    },

    /// The occurs check tripped: a type variable would need to contain
    /// itself.
    InfiniteType { var: TypeVar, ty: Type, span: Span },

    /// After translation a reference still has several candidate types and
    /// no context remains to narrow it.
    AmbiguousOverload {
        name: String,
        candidates: Vec<Type>,
        span: Span,
    },

    /// A clause's parameter count disagrees with the earlier clauses or
    /// declared signature of the same name.
    PatternArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
}

impl TypeError {
    pub fn undefined_symbol(name: impl Into<String>, span: Span) -> Self {
        TypeError::UndefinedSymbol {
            name: name.into(),
            span,
        }
    }

    pub fn type_mismatch(expected: Type, found: Type, span: Span) -> Self {
        TypeError::TypeMismatch {
            expected,
            found,
            span,
            context: None,
        }
    }

    /// Add context to this error (only affects `TypeMismatch`).
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        if let TypeError::TypeMismatch { context: ctx, .. } = &mut self {
            *ctx = Some(context.into());
        }
        self
    }

    pub fn ambiguous_overload(name: impl Into<String>, candidates: Vec<Type>, span: Span) -> Self {
        TypeError::AmbiguousOverload {
            name: name.into(),
            candidates,
            span,
        }
    }

    pub fn pattern_arity_mismatch(
        name: impl Into<String>,
        expected: usize,
        found: usize,
        span: Span,
    ) -> Self {
        TypeError::PatternArityMismatch {
            name: name.into(),
            expected,
            found,
            span,
        }
    }

    /// Convert a unification error to a type error at `span`.
    pub fn from_unify_error(err: UnifyError, span: Span) -> Self {
        match err {
            UnifyError::Mismatch { expected, found } => {
                TypeError::type_mismatch(expected, found, span)
            }
            UnifyError::OccursCheck { var, ty } => TypeError::InfiniteType { var, ty, span },
            UnifyError::NoOverload {
                candidates,
                required,
            } => TypeError::type_mismatch(Type::set(candidates), required, span)
                .with_context("none of the overload candidates matches"),
            UnifyError::UnknownType { name } => TypeError::undefined_symbol(name, span),
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            TypeError::UndefinedSymbol { span, .. }
            | TypeError::TypeMismatch { span, .. }
            | TypeError::InfiniteType { span, .. }
            | TypeError::AmbiguousOverload { span, .. }
            | TypeError::PatternArityMismatch { span, .. } => span,
        }
    }
}

fn render(f: &mut fmt::Formatter, span: &Span, msg: &str) -> fmt::Result {
    if span.source.is_empty() {
        write!(f, "Type error: {}", msg)
    } else {
        write!(f, "{}", span.to_string(msg))
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeError::UndefinedSymbol { name, span } => {
                render(f, span, &format!("undefined symbol: {}", name))
            }
            TypeError::TypeMismatch {
                expected,
                found,
                span,
                context,
            } => {
                let msg = format!(
                    "type mismatch: expected {}, found {}",
                    expected.pretty(),
                    found.pretty()
                );
                let full_msg = if let Some(ctx) = context {
                    format!("{}\n  Note: {}", msg, ctx)
                } else {
                    msg
                };
                render(f, span, &full_msg)
            }
            TypeError::InfiniteType { var, ty, span } => {
                let msg = format!(
                    "cannot construct infinite type: {} = {}",
                    var,
                    ty.pretty()
                );
                render(f, span, &msg)
            }
            TypeError::AmbiguousOverload {
                name,
                candidates,
                span,
            } => {
                let msg = format!(
                    "ambiguous overload: {} could be any of {}",
                    name,
                    candidates.iter().map(Type::pretty).join(", ")
                );
                render(f, span, &msg)
            }
            TypeError::PatternArityMismatch {
                name,
                expected,
                found,
                span,
            } => {
                let msg = format!(
                    "clause of {} takes {} parameters, but earlier clauses take {}",
                    name, found, expected
                );
                render(f, span, &msg)
            }
        }
    }
}

impl std::error::Error for TypeError {}
