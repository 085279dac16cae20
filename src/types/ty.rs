use std::fmt;

use itertools::Itertools;

/// Name of the function type operator.
pub const FUNCTION: &str = "->";
/// Name of the no-argument marker type (also the unit type).
pub const UNIT: &str = "()";

/// Index of a type variable's binding slot in the [`TypeArena`].
///
/// Variables are compared by index, never by structural content.
///
/// [`TypeArena`]: crate::types::arena::TypeArena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeVar(pub usize);

impl fmt::Display for TypeVar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'t{}", self.0)
    }
}

/// The central type value.
///
/// Functions, tuples, and the built-in simple types are all
/// [`Type::Operator`]s; a variable is an index into the arena; a set is a
/// de-duplicated candidate list standing in for an unresolved overload.
/// Record and algebraic types are the named nominal types a program
/// declares, and [`Type::Recur`] is the placeholder a record uses to refer
/// to its own algebraic parent without infinite expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Operator(TypeOperator),
    Var(TypeVar),
    Set(Vec<Type>),
    Record(RecordType),
    Algebraic(AlgebraicType),
    Recur(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeOperator {
    pub name: String,
    pub params: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub name: String,
    /// The algebraic type this record is a declared variant of, if any.
    pub parent: Option<String>,
    pub fields: Vec<(String, Type)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgebraicType {
    pub name: String,
    pub variants: Vec<String>,
}

impl AlgebraicType {
    pub fn declares(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

impl Type {
    pub fn operator(name: impl Into<String>, params: Vec<Type>) -> Self {
        Type::Operator(TypeOperator {
            name: name.into(),
            params,
        })
    }

    pub fn simple(name: impl Into<String>) -> Self {
        Type::operator(name, Vec::new())
    }

    pub fn function(domain: Type, codomain: Type) -> Self {
        Type::operator(FUNCTION, vec![domain, codomain])
    }

    pub fn unit() -> Self {
        Type::simple(UNIT)
    }

    pub fn integer() -> Self {
        Type::simple("Integer")
    }

    pub fn double() -> Self {
        Type::simple("Double")
    }

    pub fn string() -> Self {
        Type::simple("String")
    }

    pub fn boolean() -> Self {
        Type::simple("Boolean")
    }

    pub fn character() -> Self {
        Type::simple("Character")
    }

    pub fn symbol() -> Self {
        Type::simple("Symbol")
    }

    /// The single construction site for overload sets. De-duplicates the
    /// members and collapses a singleton to its only member, so a `Set` is
    /// never observed with fewer than two members.
    pub fn set(members: Vec<Type>) -> Self {
        let mut unique: Vec<Type> = Vec::with_capacity(members.len());
        for m in members {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        assert!(
            !unique.is_empty(),
            "an overload set requires at least one candidate"
        );
        if unique.len() == 1 {
            unique.remove(0)
        } else {
            Type::Set(unique)
        }
    }

    /// The candidate list a type stands for: the members for a set, the
    /// type itself for everything else.
    pub fn decompose(&self) -> Vec<Type> {
        match self {
            Type::Set(members) => members.clone(),
            other => vec![other.clone()],
        }
    }

    /// Every candidate is a function type.
    pub fn is_function_type(&self) -> bool {
        self.decompose().iter().all(|t| match t {
            Type::Operator(op) => op.name == FUNCTION && op.params.len() == 2,
            _ => false,
        })
    }

    /// A function type whose domain is the no-argument marker, i.e. a value
    /// the backend may invoke without supplying arguments.
    pub fn is_instantiable_type(&self) -> bool {
        self.decompose().iter().all(|t| match t {
            Type::Operator(op) => {
                op.name == FUNCTION
                    && op.params.len() == 2
                    && op.params[0] == Type::unit()
            }
            _ => false,
        })
    }

    /// Whether an (already resolved) type still contains an overload set.
    pub fn contains_set(&self) -> bool {
        match self {
            Type::Set(_) => true,
            Type::Operator(op) => op.params.iter().any(Type::contains_set),
            Type::Record(rec) => rec.fields.iter().any(|(_, t)| t.contains_set()),
            Type::Var(_) | Type::Algebraic(_) | Type::Recur(_) => false,
        }
    }

    pub fn pretty(&self) -> String {
        match self {
            Type::Operator(op) if op.name == FUNCTION && op.params.len() == 2 => {
                let domain = if op.params[0].is_function_type() {
                    format!("({})", op.params[0].pretty())
                } else {
                    op.params[0].pretty()
                };
                format!("{} -> {}", domain, op.params[1].pretty())
            }
            Type::Operator(op) if op.params.is_empty() => op.name.clone(),
            Type::Operator(op) => format!(
                "{}({})",
                op.name,
                op.params.iter().map(Type::pretty).join(", ")
            ),
            Type::Var(v) => v.to_string(),
            Type::Set(members) => {
                format!("{{{}}}", members.iter().map(Type::pretty).join(" | "))
            }
            Type::Record(rec) => rec.name.clone(),
            Type::Algebraic(alg) => alg.name.clone(),
            Type::Recur(name) => name.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pretty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_set_collapses() {
        let ty = Type::set(vec![Type::integer()]);
        assert_eq!(ty, Type::integer());
    }

    #[test]
    fn test_set_deduplicates() {
        let ty = Type::set(vec![Type::integer(), Type::integer(), Type::string()]);
        assert_eq!(ty, Type::Set(vec![Type::integer(), Type::string()]));
    }

    #[test]
    fn test_duplicate_only_set_collapses() {
        let ty = Type::set(vec![Type::string(), Type::string()]);
        assert_eq!(ty, Type::string());
    }

    #[test]
    fn test_decompose_non_set() {
        assert_eq!(Type::integer().decompose(), vec![Type::integer()]);
    }

    #[test]
    fn test_decompose_set() {
        let ty = Type::set(vec![Type::integer(), Type::string()]);
        assert_eq!(ty.decompose(), vec![Type::integer(), Type::string()]);
    }

    #[test]
    fn test_is_function_type() {
        assert!(Type::function(Type::integer(), Type::string()).is_function_type());
        assert!(!Type::integer().is_function_type());

        let set = Type::set(vec![
            Type::function(Type::integer(), Type::integer()),
            Type::function(Type::double(), Type::double()),
        ]);
        assert!(set.is_function_type());
    }

    #[test]
    fn test_is_instantiable_type() {
        assert!(Type::function(Type::unit(), Type::integer()).is_instantiable_type());
        assert!(!Type::function(Type::integer(), Type::integer()).is_instantiable_type());
        assert!(!Type::unit().is_instantiable_type());
    }

    #[test]
    fn test_pretty_simple() {
        assert_eq!(Type::integer().pretty(), "Integer");
        assert_eq!(Type::unit().pretty(), "()");
    }

    #[test]
    fn test_pretty_function() {
        let ty = Type::function(Type::integer(), Type::string());
        assert_eq!(ty.pretty(), "Integer -> String");
    }

    #[test]
    fn test_pretty_nested_function() {
        let ty = Type::function(
            Type::function(Type::integer(), Type::integer()),
            Type::string(),
        );
        assert_eq!(ty.pretty(), "(Integer -> Integer) -> String");
    }

    #[test]
    fn test_pretty_set() {
        let ty = Type::set(vec![Type::integer(), Type::double()]);
        assert_eq!(ty.pretty(), "{Integer | Double}");
    }

    #[test]
    fn test_contains_set() {
        let inner = Type::set(vec![Type::integer(), Type::double()]);
        let ty = Type::function(inner, Type::unit());
        assert!(ty.contains_set());
        assert!(!Type::function(Type::integer(), Type::unit()).contains_set());
    }

    #[test]
    fn test_algebraic_declares() {
        let alg = AlgebraicType {
            name: "Tree".to_string(),
            variants: vec!["Leaf".to_string(), "Node".to_string()],
        };
        assert!(alg.declares("Leaf"));
        assert!(!alg.declares("Leaf2"));
    }
}
