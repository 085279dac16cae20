use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use super::arena::TypeArena;
use super::builtins;
use super::ty::{RecordType, Type, TypeOperator, TypeVar};
use super::unify::Unifier;
use crate::ast::Locator;
use crate::registry::{DeclarationRegistry, EmptyRegistry};

/// Registry of declared record and algebraic types, keyed by name. This is
/// what resolves a record's deferred self-reference (`Type::Recur`) at the
/// point of use.
#[derive(Debug, Clone, Default)]
pub struct TypeDecls {
    entries: HashMap<String, Type>,
}

impl TypeDecls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: Type) {
        self.entries.insert(name.into(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.entries.get(name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Identifies one scope frame in a [`SymbolEnvironment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
struct Frame {
    parent: Option<ScopeId>,
    symbols: HashMap<Locator, Vec<Type>>,
    /// Types whose free variables must stay rigid when copying a type out
    /// of this scope.
    specialized: Vec<Type>,
}

/// A chain of nested scope frames mapping declared names to their candidate
/// types, plus the shared state of one translation pass: the variable
/// arena, the declared-type registry, and the external declaration
/// registry backing the head frame.
///
/// Frames form a tree through parent indices; `extend` is an O(1)
/// allocation and child scopes are simply abandoned when translation
/// leaves them. Fresh variables are always minted by the shared arena so
/// variable identity is unique across the whole pass.
pub struct SymbolEnvironment {
    frames: Vec<Frame>,
    arena: TypeArena,
    decls: TypeDecls,
    registry: Arc<dyn DeclarationRegistry>,
}

impl SymbolEnvironment {
    /// A fresh environment with only the built-in signatures installed.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(EmptyRegistry))
    }

    /// A fresh environment whose head frame is additionally backed by a
    /// read-only registry of previously compiled declarations.
    pub fn with_registry(registry: Arc<dyn DeclarationRegistry>) -> Self {
        let mut env = SymbolEnvironment {
            frames: vec![Frame::default()],
            arena: TypeArena::new(),
            decls: TypeDecls::new(),
            registry,
        };
        builtins::install(&mut env);
        env
    }

    /// The global frame.
    pub fn head(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Push a new child frame of `parent`.
    pub fn extend(&mut self, parent: ScopeId) -> ScopeId {
        self.frames.push(Frame {
            parent: Some(parent),
            ..Frame::default()
        });
        ScopeId(self.frames.len() - 1)
    }

    /// Mint a fresh type variable.
    pub fn create_variable(&mut self) -> Type {
        Type::Var(self.arena.fresh())
    }

    /// Record `ty` as a candidate type for `locator` in `scope`. Repeated
    /// definitions for the same locator accumulate into an overload set;
    /// structural duplicates are ignored.
    pub fn define(&mut self, scope: ScopeId, locator: Locator, ty: Type) {
        let candidates = self.frames[scope.0].symbols.entry(locator).or_default();
        if !candidates.contains(&ty) {
            candidates.push(ty);
        }
    }

    /// Record a candidate in the head frame.
    pub fn define_global(&mut self, locator: Locator, ty: Type) {
        self.define(self.head(), locator, ty);
    }

    pub fn is_defined(&self, scope: ScopeId, locator: &Locator) -> bool {
        let mut current = Some(scope);
        while let Some(s) = current {
            if self.frames[s.0].symbols.contains_key(locator) {
                return true;
            }
            current = self.frames[s.0].parent;
        }
        if let Locator::Declaration { module, name } = locator {
            return self
                .registry
                .type_of(&format!("{}.{}", module, name))
                .is_some();
        }
        false
    }

    /// Look up the recorded type of `locator`, searching `scope` and its
    /// ancestors, then the external registry. The result is a generic copy
    /// of the recorded candidates: free variables are freshened, so every
    /// use site gets its own instance (let-polymorphism).
    pub fn type_of(&mut self, scope: ScopeId, locator: &Locator) -> Option<Type> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(candidates) = self.frames[s.0].symbols.get(locator) {
                let candidates = candidates.clone();
                return Some(self.instantiate(scope, &candidates));
            }
            current = self.frames[s.0].parent;
        }
        if let Locator::Declaration { module, name } = locator {
            let qualified = format!("{}.{}", module, name);
            if let Some(ty) = self.registry.type_of(&qualified) {
                debug!("registry hit for {}", qualified);
                let candidates = match ty {
                    Type::Set(members) => members,
                    other => vec![other],
                };
                for c in &candidates {
                    self.define_global(locator.clone(), c.clone());
                }
                return Some(self.instantiate(scope, &candidates));
            }
        }
        None
    }

    /// Mark `ty` as rigid within `scope`: its variables are bound to a
    /// concrete enclosing-argument type, not free for polymorphism.
    pub fn specialize(&mut self, scope: ScopeId, ty: Type) {
        self.frames[scope.0].specialized.push(ty);
    }

    /// Release a specialization previously made in `scope`.
    pub fn generify(&mut self, scope: ScopeId, ty: &Type) {
        let specialized = &mut self.frames[scope.0].specialized;
        if let Some(pos) = specialized.iter().position(|t| t == ty) {
            specialized.remove(pos);
        }
    }

    /// Generic copy of `ty` as seen from `scope`: every free variable that
    /// is not in the scope's specialized closure is replaced by a fresh
    /// one, reusing the same fresh variable for repeated occurrences.
    /// Value-form sets become live overload cells, ready for narrowing at
    /// this use site.
    pub fn generic_copy(&mut self, scope: ScopeId, ty: &Type) -> Type {
        let rigid = self.specialized_closure(scope);
        let mut mappings = HashMap::new();
        self.copy_with(&rigid, &mut mappings, ty)
    }

    fn instantiate(&mut self, scope: ScopeId, candidates: &[Type]) -> Type {
        let rigid = self.specialized_closure(scope);
        let mut mappings = HashMap::new();
        let copies: Vec<Type> = candidates
            .iter()
            .map(|c| self.copy_with(&rigid, &mut mappings, c))
            .collect();
        self.arena.overloaded(copies)
    }

    fn copy_with(
        &mut self,
        rigid: &HashSet<TypeVar>,
        mappings: &mut HashMap<TypeVar, TypeVar>,
        ty: &Type,
    ) -> Type {
        match self.arena.expose(ty) {
            Type::Var(v) => {
                if rigid.contains(&v) {
                    return Type::Var(v);
                }
                if self.arena.is_overloaded(v) {
                    let (members, _) = self.arena.overload_parts(v);
                    let copies: Vec<Type> = members
                        .iter()
                        .map(|m| self.copy_with(rigid, mappings, m))
                        .collect();
                    return self.arena.overloaded(copies);
                }
                let mapped = match mappings.get(&v) {
                    Some(m) => *m,
                    None => {
                        let fresh = self.arena.fresh();
                        mappings.insert(v, fresh);
                        fresh
                    }
                };
                Type::Var(mapped)
            }
            Type::Operator(op) => Type::Operator(TypeOperator {
                name: op.name,
                params: op
                    .params
                    .iter()
                    .map(|p| self.copy_with(rigid, mappings, p))
                    .collect(),
            }),
            Type::Set(members) => {
                let copies: Vec<Type> = members
                    .iter()
                    .map(|m| self.copy_with(rigid, mappings, m))
                    .collect();
                self.arena.overloaded(copies)
            }
            Type::Record(rec) => Type::Record(RecordType {
                name: rec.name,
                parent: rec.parent,
                fields: rec
                    .fields
                    .iter()
                    .map(|(n, t)| (n.clone(), self.copy_with(rigid, mappings, t)))
                    .collect(),
            }),
            other @ (Type::Algebraic(_) | Type::Recur(_)) => other,
        }
    }

    /// Union over the frame chain of the free variables of the exposed
    /// specialized types.
    fn specialized_closure(&self, scope: ScopeId) -> HashSet<TypeVar> {
        let mut closure = HashSet::new();
        let mut current = Some(scope);
        while let Some(s) = current {
            let frame = &self.frames[s.0];
            for ty in &frame.specialized {
                self.arena.free_vars(ty, &mut closure);
            }
            current = frame.parent;
        }
        closure
    }

    pub fn declare_type(&mut self, name: impl Into<String>, ty: Type) {
        self.decls.declare(name, ty);
    }

    pub fn decls(&self) -> &TypeDecls {
        &self.decls
    }

    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut TypeArena {
        &mut self.arena
    }

    /// A unification engine borrowing this environment's arena and
    /// declared-type table.
    pub fn unifier(&mut self) -> Unifier<'_> {
        Unifier::new(&mut self.arena, &self.decls)
    }
}

impl Default for SymbolEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MapRegistry;

    #[test]
    fn test_undefined_locator() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let locator = Locator::variable("x");
        assert!(!env.is_defined(head, &locator));
        assert!(env.type_of(head, &locator).is_none());
    }

    #[test]
    fn test_define_and_lookup() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let locator = Locator::variable("x");
        env.define(head, locator.clone(), Type::integer());
        assert!(env.is_defined(head, &locator));
        assert_eq!(env.type_of(head, &locator), Some(Type::integer()));
    }

    #[test]
    fn test_child_scope_sees_parent() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let locator = Locator::variable("x");
        env.define(head, locator.clone(), Type::integer());
        let child = env.extend(head);
        assert_eq!(env.type_of(child, &locator), Some(Type::integer()));
    }

    #[test]
    fn test_child_shadows_parent() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let locator = Locator::variable("x");
        env.define(head, locator.clone(), Type::integer());
        let child = env.extend(head);
        env.define(child, locator.clone(), Type::string());
        assert_eq!(env.type_of(child, &locator), Some(Type::string()));
        assert_eq!(env.type_of(head, &locator), Some(Type::integer()));
    }

    #[test]
    fn test_accumulated_definitions_become_a_set() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let locator = Locator::declaration("main", "f");
        env.define(head, locator.clone(), Type::function(Type::integer(), Type::integer()));
        env.define(head, locator.clone(), Type::function(Type::string(), Type::string()));
        let ty = env.type_of(head, &locator);
        let resolved = env.arena().resolve(ty.as_ref().expect("defined"));
        assert_eq!(
            resolved,
            Type::set(vec![
                Type::function(Type::integer(), Type::integer()),
                Type::function(Type::string(), Type::string()),
            ])
        );
    }

    #[test]
    fn test_generic_copy_freshens_free_variables() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let a = env.create_variable();
        let identity = Type::function(a.clone(), a.clone());
        let locator = Locator::declaration("main", "identity");
        env.define(head, locator.clone(), identity);

        let first = env.type_of(head, &locator).expect("defined");
        let second = env.type_of(head, &locator).expect("defined");
        assert_ne!(first, second);

        // Binding one copy must not leak into the other.
        env.unifier()
            .unify(&first, &Type::function(Type::integer(), Type::integer()))
            .expect("unifies");
        let second_resolved = env.arena().resolve(&second);
        assert_ne!(
            second_resolved,
            Type::function(Type::integer(), Type::integer())
        );
    }

    #[test]
    fn test_generic_copy_shares_one_fresh_var_per_source_var() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let a = env.create_variable();
        let ty = Type::function(a.clone(), a.clone());
        let copy = env.generic_copy(head, &ty);
        match copy {
            Type::Operator(op) => assert_eq!(op.params[0], op.params[1]),
            other => panic!("expected function type, got {}", other),
        }
    }

    #[test]
    fn test_specialized_variables_stay_rigid() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let scope = env.extend(head);
        let param = env.create_variable();
        env.specialize(scope, param.clone());

        let copy = env.generic_copy(scope, &param);
        assert_eq!(copy, param);

        env.generify(scope, &param);
        let copy = env.generic_copy(scope, &param);
        assert_ne!(copy, param);
    }

    #[test]
    fn test_registry_backs_the_head_frame() {
        let mut registry = MapRegistry::new();
        registry.insert("lib.origin", Type::integer());
        let mut env = SymbolEnvironment::with_registry(Arc::new(registry));
        let head = env.head();
        let locator = Locator::declaration("lib", "origin");
        assert!(env.is_defined(head, &locator));
        assert_eq!(env.type_of(head, &locator), Some(Type::integer()));
    }

    #[test]
    fn test_builtins_are_installed() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let plus = Locator::declaration("core", "+");
        assert!(env.is_defined(head, &plus));
        let ty = env.type_of(head, &plus).expect("defined");
        assert!(env.arena().decompose(&ty).len() > 1);
    }
}
