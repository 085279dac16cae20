use std::collections::HashSet;

use super::ty::{RecordType, Type, TypeOperator, TypeVar};

/// Arena of type-variable binding slots.
///
/// A [`TypeVar`] is an index into this arena. A slot starts out unbound and
/// is bound at most once per inference pass; binding an already-bound slot
/// is a checked contract violation. Overload cells are slots too: they hold
/// the live candidate list of an unresolved overload plus the requirement
/// types accumulated against it, and collapse into an ordinary binding once
/// narrowed to a single candidate.
///
/// All mutations are recorded in an undo log so that a trial unification
/// (testing one overload candidate) can be rolled back without leaking
/// bindings.
#[derive(Debug, Default)]
pub struct TypeArena {
    slots: Vec<Slot>,
    undo: Vec<Undo>,
}

#[derive(Debug, Clone)]
pub enum Slot {
    Unbound,
    Bound(Type),
    Overloaded {
        members: Vec<Type>,
        constraints: Vec<Type>,
    },
}

#[derive(Debug)]
enum Undo {
    Created,
    Replaced(TypeVar, Slot),
}

/// A point in the undo log to roll back to.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot(usize);

/// A high-water mark over the slot vector, for finding cells created after
/// a given point.
#[derive(Debug, Clone, Copy)]
pub struct Mark(usize);

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh, unbound variable. Identity is arena-wide unique.
    pub fn fresh(&mut self) -> TypeVar {
        self.slots.push(Slot::Unbound);
        self.undo.push(Undo::Created);
        TypeVar(self.slots.len() - 1)
    }

    /// Build the live form of an overload set: a cell holding the
    /// de-duplicated candidates. A single candidate collapses to itself.
    pub fn overloaded(&mut self, members: Vec<Type>) -> Type {
        let mut unique: Vec<Type> = Vec::with_capacity(members.len());
        for m in members {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        assert!(
            !unique.is_empty(),
            "an overload cell requires at least one candidate"
        );
        if unique.len() == 1 {
            return unique.remove(0);
        }
        self.slots.push(Slot::Overloaded {
            members: unique,
            constraints: Vec::new(),
        });
        self.undo.push(Undo::Created);
        Type::Var(TypeVar(self.slots.len() - 1))
    }

    pub fn is_unbound(&self, var: TypeVar) -> bool {
        matches!(self.slots[var.0], Slot::Unbound)
    }

    pub fn is_overloaded(&self, var: TypeVar) -> bool {
        matches!(self.slots[var.0], Slot::Overloaded { .. })
    }

    /// Current members and constraints of an overload cell.
    pub fn overload_parts(&self, var: TypeVar) -> (Vec<Type>, Vec<Type>) {
        match &self.slots[var.0] {
            Slot::Overloaded {
                members,
                constraints,
            } => (members.clone(), constraints.clone()),
            _ => (Vec::new(), Vec::new()),
        }
    }

    /// Bind a variable or resolve an overload cell. The slot must not
    /// already hold a binding.
    pub fn bind(&mut self, var: TypeVar, ty: Type) {
        let prev = std::mem::replace(&mut self.slots[var.0], Slot::Bound(ty));
        assert!(
            !matches!(prev, Slot::Bound(_)),
            "type variable {} is already bound",
            var
        );
        self.undo.push(Undo::Replaced(var, prev));
    }

    /// Record a requirement type against an overload cell. Structural
    /// duplicates are ignored.
    pub fn constrain(&mut self, var: TypeVar, ty: Type) {
        let prev = self.slots[var.0].clone();
        match &mut self.slots[var.0] {
            Slot::Overloaded { constraints, .. } => {
                if !constraints.contains(&ty) {
                    constraints.push(ty);
                    self.undo.push(Undo::Replaced(var, prev));
                }
            }
            _ => panic!("type variable {} is not an overload cell", var),
        }
    }

    /// Replace an overload cell's members with the surviving subset.
    pub fn retain_members(&mut self, var: TypeVar, survivors: Vec<Type>) {
        let prev = self.slots[var.0].clone();
        match &mut self.slots[var.0] {
            Slot::Overloaded { members, .. } => {
                *members = survivors;
                self.undo.push(Undo::Replaced(var, prev));
            }
            _ => panic!("type variable {} is not an overload cell", var),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.undo.len())
    }

    /// Undo every mutation made since `snap`, newest first.
    pub fn rollback(&mut self, snap: Snapshot) {
        while self.undo.len() > snap.0 {
            match self.undo.pop() {
                Some(Undo::Created) => {
                    self.slots.pop();
                }
                Some(Undo::Replaced(var, prev)) => self.slots[var.0] = prev,
                None => break,
            }
        }
    }

    pub fn mark(&self) -> Mark {
        Mark(self.slots.len())
    }

    /// Overload cells created at or after `mark` that are still unresolved.
    pub fn overloaded_since(&self, mark: Mark) -> Vec<TypeVar> {
        (mark.0..self.slots.len())
            .map(TypeVar)
            .filter(|v| self.is_overloaded(*v))
            .collect()
    }

    /// Follow the binding chain of `ty` to its first non-bound form.
    /// Unbound variables and live overload cells expose as themselves.
    pub fn expose(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        loop {
            match current {
                Type::Var(v) => match &self.slots[v.0] {
                    Slot::Bound(inner) => current = inner.clone(),
                    _ => return Type::Var(v),
                },
                other => return other,
            }
        }
    }

    /// Deep exposure: rebuild `ty` with every binding chain followed and
    /// every parameter resolved. Live overload cells become value sets of
    /// their resolved members. Idempotent. `Recur` placeholders are kept
    /// as-is; they are resolved by name at unification time.
    pub fn resolve(&self, ty: &Type) -> Type {
        match self.expose(ty) {
            Type::Var(v) => match &self.slots[v.0] {
                Slot::Overloaded { members, .. } => {
                    Type::set(members.iter().map(|m| self.resolve(m)).collect())
                }
                _ => Type::Var(v),
            },
            Type::Operator(op) => Type::Operator(TypeOperator {
                name: op.name,
                params: op.params.iter().map(|p| self.resolve(p)).collect(),
            }),
            Type::Set(members) => {
                Type::set(members.iter().map(|m| self.resolve(m)).collect())
            }
            Type::Record(rec) => Type::Record(RecordType {
                name: rec.name,
                parent: rec.parent,
                fields: rec
                    .fields
                    .iter()
                    .map(|(n, t)| (n.clone(), self.resolve(t)))
                    .collect(),
            }),
            other @ (Type::Algebraic(_) | Type::Recur(_)) => other,
        }
    }

    /// Whether `var` appears anywhere inside `ty`, following bindings.
    /// This is the occurs check that keeps binding chains acyclic.
    pub fn occurs(&self, var: TypeVar, ty: &Type) -> bool {
        match self.expose(ty) {
            Type::Var(v) => {
                if v == var {
                    return true;
                }
                match &self.slots[v.0] {
                    Slot::Overloaded { members, .. } => {
                        members.iter().any(|m| self.occurs(var, m))
                    }
                    _ => false,
                }
            }
            Type::Operator(op) => op.params.iter().any(|p| self.occurs(var, p)),
            Type::Set(members) => members.iter().any(|m| self.occurs(var, m)),
            Type::Record(rec) => rec.fields.iter().any(|(_, t)| self.occurs(var, t)),
            Type::Algebraic(_) | Type::Recur(_) => false,
        }
    }

    /// Collect the free (unbound or overloaded) variables of `ty`.
    pub fn free_vars(&self, ty: &Type, acc: &mut HashSet<TypeVar>) {
        match self.expose(ty) {
            Type::Var(v) => {
                acc.insert(v);
                if let Slot::Overloaded { members, .. } = &self.slots[v.0] {
                    for m in members.clone() {
                        self.free_vars(&m, acc);
                    }
                }
            }
            Type::Operator(op) => {
                for p in &op.params {
                    self.free_vars(p, acc);
                }
            }
            Type::Set(members) => {
                for m in &members {
                    self.free_vars(m, acc);
                }
            }
            Type::Record(rec) => {
                for (_, t) in &rec.fields {
                    self.free_vars(t, acc);
                }
            }
            Type::Algebraic(_) | Type::Recur(_) => {}
        }
    }

    /// Candidate list of a type, looking through live overload cells.
    pub fn decompose(&self, ty: &Type) -> Vec<Type> {
        match self.expose(ty) {
            Type::Var(v) => match &self.slots[v.0] {
                Slot::Overloaded { members, .. } => members.clone(),
                _ => vec![Type::Var(v)],
            },
            Type::Set(members) => members,
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_vars_are_unique() {
        let mut arena = TypeArena::new();
        let a = arena.fresh();
        let b = arena.fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expose_unbound() {
        let mut arena = TypeArena::new();
        let v = arena.fresh();
        assert_eq!(arena.expose(&Type::Var(v)), Type::Var(v));
    }

    #[test]
    fn test_expose_follows_chain() {
        let mut arena = TypeArena::new();
        let a = arena.fresh();
        let b = arena.fresh();
        arena.bind(a, Type::Var(b));
        arena.bind(b, Type::integer());
        assert_eq!(arena.expose(&Type::Var(a)), Type::integer());
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn test_rebinding_is_rejected() {
        let mut arena = TypeArena::new();
        let v = arena.fresh();
        arena.bind(v, Type::integer());
        arena.bind(v, Type::string());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut arena = TypeArena::new();
        let a = arena.fresh();
        let b = arena.fresh();
        arena.bind(a, Type::function(Type::Var(b), Type::integer()));
        arena.bind(b, Type::string());

        let once = arena.resolve(&Type::Var(a));
        let twice = arena.resolve(&once);
        assert_eq!(once, twice);
        assert_eq!(once, Type::function(Type::string(), Type::integer()));
    }

    #[test]
    fn test_rollback_restores_bindings() {
        let mut arena = TypeArena::new();
        let v = arena.fresh();
        let snap = arena.snapshot();
        arena.bind(v, Type::integer());
        assert_eq!(arena.expose(&Type::Var(v)), Type::integer());
        arena.rollback(snap);
        assert!(arena.is_unbound(v));
    }

    #[test]
    fn test_rollback_removes_created_slots() {
        let mut arena = TypeArena::new();
        let snap = arena.snapshot();
        arena.fresh();
        arena.fresh();
        arena.rollback(snap);
        let v = arena.fresh();
        assert_eq!(v, TypeVar(0));
    }

    #[test]
    fn test_overloaded_singleton_collapses() {
        let mut arena = TypeArena::new();
        let ty = arena.overloaded(vec![Type::integer()]);
        assert_eq!(ty, Type::integer());
    }

    #[test]
    fn test_overloaded_cell_resolves_to_set() {
        let mut arena = TypeArena::new();
        let ty = arena.overloaded(vec![Type::integer(), Type::string()]);
        assert_eq!(
            arena.resolve(&ty),
            Type::set(vec![Type::integer(), Type::string()])
        );
    }

    #[test]
    fn test_occurs_direct_and_nested() {
        let mut arena = TypeArena::new();
        let v = arena.fresh();
        assert!(arena.occurs(v, &Type::Var(v)));
        assert!(arena.occurs(v, &Type::function(Type::integer(), Type::Var(v))));
        assert!(!arena.occurs(v, &Type::integer()));

        let other = arena.fresh();
        assert!(!arena.occurs(v, &Type::Var(other)));
    }

    #[test]
    fn test_occurs_through_binding() {
        let mut arena = TypeArena::new();
        let v = arena.fresh();
        let w = arena.fresh();
        arena.bind(w, Type::function(Type::Var(v), Type::unit()));
        assert!(arena.occurs(v, &Type::Var(w)));
    }

    #[test]
    fn test_decompose_overloaded_cell() {
        let mut arena = TypeArena::new();
        let ty = arena.overloaded(vec![Type::integer(), Type::string()]);
        assert_eq!(
            arena.decompose(&ty),
            vec![Type::integer(), Type::string()]
        );
        assert_eq!(arena.decompose(&Type::unit()), vec![Type::unit()]);
    }

    #[test]
    fn test_overloaded_since() {
        let mut arena = TypeArena::new();
        arena.overloaded(vec![Type::integer(), Type::string()]);
        let mark = arena.mark();
        let ty = arena.overloaded(vec![Type::double(), Type::unit()]);
        let cells = arena.overloaded_since(mark);
        assert_eq!(cells.len(), 1);
        assert_eq!(Type::Var(cells[0]), ty);
    }
}
