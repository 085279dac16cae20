//! # Quell Semantic Core
//!
//! The type system and translator of the Quell functional language: the
//! component that turns a parsed, untyped syntax tree into a fully-typed
//! AST, resolving identifier overloads, inferring omitted types, and
//! rejecting programs whose operations are not type-consistent.
//!
//! ## Pipeline Position
//!
//! ```text
//! Source Code
//!     ↓
//! [Lexer / Parser]  (external) → Untyped AST (ast::Program)
//!     ↓
//! [THIS CRATE] → Typed AST (ast::typed::TypedProgram)
//!     ↓
//! [Code Generator]  (external)
//! ```
//!
//! ## Components
//!
//! - [`types::ty`] - The type representation: named operators (functions,
//!   tuples, simple types), mutable bind-once variables, overload sets, and
//!   record/algebraic types with deferred self-reference.
//! - [`types::unify`] - The unification engine: structural equality with
//!   variable binding, occurs checking, existential overload-set matching,
//!   and variant-membership subtyping.
//! - [`types::env`] - The symbol environment: a chain of scope frames with
//!   accumulative overload definition, specialization, and generic copy
//!   (let-polymorphism).
//! - [`types::translate`] - The translator driving the two above over the
//!   syntax tree, one isolated top-level declaration at a time.
//!
//! ## Ad-hoc Polymorphism
//!
//! Operators and functions may have several simultaneously valid
//! signatures. An overloaded name translates to a live candidate set that
//! every unification against it narrows; a set that reaches a single
//! candidate commits, a set that reaches zero is a type error, and a set
//! that survives translation intact is either part of an overloaded
//! declaration's type or an ambiguity error.
//!
//! ## Concurrency
//!
//! Translation of one compilation unit is single-threaded and synchronous:
//! variable bindings are in-place mutations visible through the whole
//! in-flight type graph. Independent units may run in parallel, each with
//! its own [`types::SymbolEnvironment`], sharing one read-only
//! [`registry::DeclarationRegistry`].
//!
//! ## Getting Started
//!
//! ```no_run
//! use quell::{translate, ast::Program};
//!
//! let program = Program::default(); // normally produced by the parser
//! let typed = translate(&program, "main").expect("type checks");
//! for declaration in &typed.declarations {
//!     println!("{} : {}", declaration.name, declaration.ty);
//! }
//! ```

pub mod ast;
pub mod registry;
pub mod types;

use std::sync::Arc;

pub use ast::typed::TypedProgram;
pub use ast::{Locator, Program};
pub use registry::{DeclarationRegistry, EmptyRegistry, MapRegistry};
pub use types::{SymbolEnvironment, Translator, Type, TypeError};

/// Translate one compilation unit against an empty declaration registry.
pub fn translate(program: &Program, module: &str) -> Result<TypedProgram, Vec<TypeError>> {
    Translator::new(module).translate_program(program)
}

/// Translate one compilation unit, seeding the head scope from a registry
/// of previously compiled declarations.
pub fn translate_with_registry(
    program: &Program,
    module: &str,
    registry: Arc<dyn DeclarationRegistry>,
) -> Result<TypedProgram, Vec<TypeError>> {
    Translator::with_registry(module, registry).translate_program(program)
}
