use std::fmt;

use itertools::Itertools;
use log::debug;

use super::arena::TypeArena;
use super::env::TypeDecls;
use super::ty::{Type, TypeVar};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnifyError {
    Mismatch { expected: Type, found: Type },
    OccursCheck { var: TypeVar, ty: Type },
    NoOverload { candidates: Vec<Type>, required: Type },
    UnknownType { name: String },
}

impl fmt::Display for UnifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnifyError::Mismatch { expected, found } => {
                write!(
                    f,
                    "type mismatch: expected {}, found {}",
                    expected.pretty(),
                    found.pretty()
                )
            }
            UnifyError::OccursCheck { var, ty } => {
                write!(
                    f,
                    "occurs check: cannot construct infinite type {} = {}",
                    var,
                    ty.pretty()
                )
            }
            UnifyError::NoOverload {
                candidates,
                required,
            } => {
                write!(
                    f,
                    "no overload candidate matches {}: tried {}",
                    required.pretty(),
                    candidates.iter().map(Type::pretty).join(", ")
                )
            }
            UnifyError::UnknownType { name } => {
                write!(f, "unknown type name: {}", name)
            }
        }
    }
}

/// The unification engine: decides whether two types can be made equal,
/// binding variables and narrowing overload cells as a side effect.
///
/// # Algorithm
///
/// Both sides are exposed first, then dispatch happens on the shapes:
///
/// ```text
/// Unify('t0, 't0)          = ok           // same variable
/// Unify('t0, T)            = bind 't0:=T  // after the occurs check
/// Unify(F(a..), F(b..))    = unify each parameter pair, left to right
/// Unify(F(..), G(..))      = error        // names or arities differ
/// Unify(Op, {m1|m2|..})    = ok iff at least one member unifies
/// Unify(Node, Tree)        = ok iff Node is a declared variant of Tree
/// ```
///
/// # Overload narrowing
///
/// A live overload cell accumulates every requirement unified against it
/// and is immediately re-filtered: each candidate is tried, transactionally,
/// against all requirements so far. Zero survivors is a type error at that
/// point. One survivor commits its bindings and resolves the cell. Several
/// survivors keep the cell alive without committing anyone's bindings, so
/// no candidate's view of the world leaks until context has eliminated the
/// rest. Filtering against the full requirement list at once is what keeps
/// an operator's argument and result positions correlated: `Integer ->
/// Integer` can survive while `Integer -> Double` dies, even though both
/// accept the same argument.
///
/// # Occurs check
///
/// Before binding `'t0 := T` we check that `'t0` does not appear inside
/// `T`; otherwise exposure would never terminate:
///
/// ```text
/// 't0 = 't0 -> Int
///     = ('t0 -> Int) -> Int
///     = ...                    // infinite!
/// ```
pub struct Unifier<'a> {
    arena: &'a mut TypeArena,
    decls: &'a TypeDecls,
}

impl<'a> Unifier<'a> {
    pub fn new(arena: &'a mut TypeArena, decls: &'a TypeDecls) -> Self {
        Self { arena, decls }
    }

    pub fn unify(&mut self, left: &Type, right: &Type) -> Result<(), UnifyError> {
        let l = self.arena.expose(left);
        let r = self.arena.expose(right);
        match (l, r) {
            (Type::Var(a), Type::Var(b)) if a == b => Ok(()),

            (Type::Var(a), r) if self.arena.is_overloaded(a) => self.narrow(a, r),
            (l, Type::Var(b)) if self.arena.is_overloaded(b) => self.narrow(b, l),

            (Type::Var(a), r) => self.bind(a, r),
            (l, Type::Var(b)) => self.bind(b, l),

            (Type::Set(members), r) => self.narrow_value(&members, &r),
            (l, Type::Set(members)) => self.narrow_value(&members, &l),

            (Type::Recur(name), r) => {
                let resolved = self.resolve_recur(&name)?;
                self.unify(&resolved, &r)
            }
            (l, Type::Recur(name)) => {
                let resolved = self.resolve_recur(&name)?;
                self.unify(&l, &resolved)
            }

            (Type::Operator(a), Type::Operator(b)) => {
                if a.name != b.name || a.params.len() != b.params.len() {
                    return Err(self.mismatch(Type::Operator(a), Type::Operator(b)));
                }
                for (pa, pb) in a.params.iter().zip(b.params.iter()) {
                    self.unify(pa, pb)?;
                }
                Ok(())
            }

            (Type::Record(a), Type::Record(b)) => {
                if a.name == b.name {
                    Ok(())
                } else {
                    Err(self.mismatch(Type::Record(a), Type::Record(b)))
                }
            }

            // Structural subtyping by declared membership: a variant record
            // satisfies the algebraic type that declares it.
            (Type::Record(rec), Type::Algebraic(alg))
            | (Type::Algebraic(alg), Type::Record(rec)) => {
                if alg.declares(&rec.name) {
                    Ok(())
                } else {
                    Err(self.mismatch(Type::Algebraic(alg), Type::Record(rec)))
                }
            }

            (Type::Algebraic(a), Type::Algebraic(b)) => {
                if a.name == b.name {
                    Ok(())
                } else {
                    Err(self.mismatch(Type::Algebraic(a), Type::Algebraic(b)))
                }
            }

            (l, r) => Err(self.mismatch(l, r)),
        }
    }

    /// Bind an unbound variable, guarded by the occurs check.
    fn bind(&mut self, var: TypeVar, ty: Type) -> Result<(), UnifyError> {
        if self.arena.occurs(var, &ty) {
            return Err(UnifyError::OccursCheck {
                var,
                ty: self.arena.resolve(&ty),
            });
        }
        self.arena.bind(var, ty);
        Ok(())
    }

    /// Record `required` against a live overload cell and re-filter its
    /// candidates against everything required of it so far.
    fn narrow(&mut self, cell: TypeVar, required: Type) -> Result<(), UnifyError> {
        if self.arena.occurs(cell, &required) {
            return Err(UnifyError::OccursCheck {
                var: cell,
                ty: self.arena.resolve(&required),
            });
        }
        self.arena.constrain(cell, required.clone());
        match self.filter(cell)? {
            Narrowed::Resolved(winner) => {
                debug!("overload cell {} resolved to {}", cell, winner.pretty());
                Ok(())
            }
            Narrowed::Retained(n) => {
                debug!("overload cell {} retained {} candidates", cell, n);
                Ok(())
            }
        }
    }

    /// Re-filter an overload cell against its accumulated requirements,
    /// committing the sole survivor if only one remains. Used both during
    /// unification and by the translator when a declaration is finalized.
    pub fn settle(&mut self, cell: TypeVar) -> Result<(), UnifyError> {
        if !self.arena.is_overloaded(cell) {
            return Ok(());
        }
        self.filter(cell)?;
        Ok(())
    }

    fn filter(&mut self, cell: TypeVar) -> Result<Narrowed, UnifyError> {
        let (members, constraints) = self.arena.overload_parts(cell);
        let mut survivors = Vec::new();
        for m in &members {
            let snap = self.arena.snapshot();
            let ok = constraints.iter().all(|c| self.unify(m, c).is_ok());
            self.arena.rollback(snap);
            if ok {
                survivors.push(m.clone());
            }
        }
        match survivors.as_slice() {
            [] => {
                let required = match constraints.last() {
                    Some(c) => self.arena.resolve(c),
                    None => Type::unit(),
                };
                Err(UnifyError::NoOverload {
                    candidates: members,
                    required,
                })
            }
            [winner] => {
                let winner = winner.clone();
                self.arena.bind(cell, winner.clone());
                for c in &constraints {
                    self.unify(&winner, c)?;
                }
                Ok(Narrowed::Resolved(winner))
            }
            _ => {
                let n = survivors.len();
                self.arena.retain_members(cell, survivors);
                Ok(Narrowed::Retained(n))
            }
        }
    }

    /// Unify against an overload set in value form. The match is
    /// existential: at least one member must unify. With several viable
    /// members nothing is committed; context narrows further downstream.
    fn narrow_value(&mut self, members: &[Type], other: &Type) -> Result<(), UnifyError> {
        let mut survivors = Vec::new();
        for m in members {
            let snap = self.arena.snapshot();
            let ok = self.unify(m, other).is_ok();
            self.arena.rollback(snap);
            if ok {
                survivors.push(m.clone());
            }
        }
        match survivors.as_slice() {
            [] => Err(UnifyError::NoOverload {
                candidates: members.to_vec(),
                required: self.arena.resolve(other),
            }),
            [winner] => {
                let winner = winner.clone();
                self.unify(&winner, other)
            }
            _ => Ok(()),
        }
    }

    /// Resolve a record's deferred self-reference by name lookup.
    fn resolve_recur(&self, name: &str) -> Result<Type, UnifyError> {
        self.decls
            .lookup(name)
            .cloned()
            .ok_or_else(|| UnifyError::UnknownType {
                name: name.to_string(),
            })
    }

    fn mismatch(&self, expected: Type, found: Type) -> UnifyError {
        UnifyError::Mismatch {
            expected: self.arena.resolve(&expected),
            found: self.arena.resolve(&found),
        }
    }
}

enum Narrowed {
    Resolved(Type),
    Retained(usize),
}
