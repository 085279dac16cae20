//! Built-in signatures seeded into the head frame of every
//! [`SymbolEnvironment`]. Every numeric widening the language performs is
//! declared here as an explicit overload; unification itself never widens.

use super::env::SymbolEnvironment;
use super::ty::Type;
use crate::ast::Locator;

/// Module name under which the built-ins are defined.
pub const MODULE: &str = "core";

fn binary(a: Type, b: Type, r: Type) -> Type {
    Type::function(a, Type::function(b, r))
}

pub fn install(env: &mut SymbolEnvironment) {
    let int = Type::integer;
    let dbl = Type::double;
    let str_ = Type::string;
    let boo = Type::boolean;
    let chr = Type::character;

    let arithmetic = vec![
        binary(int(), int(), int()),
        binary(int(), dbl(), dbl()),
        binary(dbl(), int(), dbl()),
        binary(dbl(), dbl(), dbl()),
    ];

    let mut plus = arithmetic.clone();
    plus.push(binary(str_(), str_(), str_()));
    define_all(env, "+", plus);

    define_all(env, "-", arithmetic.clone());
    define_all(env, "/", arithmetic.clone());

    let mut times = arithmetic;
    times.push(binary(str_(), int(), str_()));
    define_all(env, "*", times);

    let comparisons = vec![
        binary(int(), int(), boo()),
        binary(dbl(), dbl(), boo()),
        binary(str_(), str_(), boo()),
        binary(chr(), chr(), boo()),
    ];
    for op in ["<", "<=", ">", ">="] {
        define_all(env, op, comparisons.clone());
    }

    let mut equality = comparisons;
    equality.push(binary(boo(), boo(), boo()));
    define_all(env, "==", equality.clone());
    define_all(env, "!=", equality);

    define_all(env, "not", vec![Type::function(boo(), boo())]);

    let a = env.create_variable();
    define_all(env, "say", vec![Type::function(a, Type::unit())]);
}

fn define_all(env: &mut SymbolEnvironment, name: &str, signatures: Vec<Type>) {
    let locator = Locator::declaration(MODULE, name);
    for sig in signatures {
        env.define_global(locator.clone(), sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_has_string_and_numeric_overloads() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let ty = env
            .type_of(head, &Locator::declaration(MODULE, "+"))
            .expect("+ is built in");
        let candidates = env.arena().decompose(&ty);
        assert_eq!(candidates.len(), 5);
        assert!(candidates
            .iter()
            .all(|c| env.arena().resolve(c).is_function_type()));
    }

    #[test]
    fn test_times_accepts_string_repetition() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let ty = env
            .type_of(head, &Locator::declaration(MODULE, "*"))
            .expect("* is built in");
        let repetition = binary(Type::string(), Type::integer(), Type::string());
        assert!(env.arena().decompose(&ty).contains(&repetition));
    }

    #[test]
    fn test_say_is_polymorphic() {
        let mut env = SymbolEnvironment::new();
        let head = env.head();
        let first = env
            .type_of(head, &Locator::declaration(MODULE, "say"))
            .expect("say is built in");
        env.unifier()
            .unify(&first, &Type::function(Type::integer(), Type::unit()))
            .expect("say accepts an Integer");

        let second = env
            .type_of(head, &Locator::declaration(MODULE, "say"))
            .expect("say is built in");
        env.unifier()
            .unify(&second, &Type::function(Type::string(), Type::unit()))
            .expect("say accepts a String at another use site");
    }
}
