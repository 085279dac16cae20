pub mod arena;
pub mod builtins;
pub mod env;
pub mod error;
pub mod translate;
pub mod ty;
pub mod unify;

pub use arena::{Mark, Snapshot, TypeArena};
pub use env::{ScopeId, SymbolEnvironment, TypeDecls};
pub use error::TypeError;
pub use translate::Translator;
pub use ty::{AlgebraicType, RecordType, Type, TypeOperator, TypeVar};
pub use unify::{Unifier, UnifyError};
