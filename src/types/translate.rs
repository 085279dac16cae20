//! # Translator
//!
//! Walks the untyped syntax tree and produces the typed AST, driving the
//! symbol environment (define/lookup/extend) and the unification engine as
//! it descends. Each top-level declaration is translated in isolation: a
//! type error aborts that declaration and leaves its siblings untouched.
//!
//! After a declaration's body is translated, its leftover overload cells
//! are settled against everything the body required of them, every node
//! type is fully exposed, and each identifier is classified as a bound or
//! unbound [`Reference`]. A declaration whose own type stays overloaded
//! (several clauses, or a body valid at several signatures) is recorded as
//! the set of its per-candidate resolutions, ready for call sites to
//! narrow.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use super::arena::Mark;
use super::builtins;
use super::env::{ScopeId, SymbolEnvironment};
use super::error::TypeError;
use super::ty::{AlgebraicType, RecordType, Type};
use crate::ast::typed::{
    Reference, TypedArm, TypedDeclaration, TypedExpr, TypedExprKind, TypedPattern, TypedProgram,
};
use crate::ast::{
    ApplyExpr, Binding, Declaration, Expr, IdentExpr, IfExpr, LambdaExpr, LambdaParam, Literal,
    Locator, MatchExpr, Pattern, Program, TypeAnnotation, TypeDef,
};
use crate::registry::DeclarationRegistry;

pub struct Translator {
    env: SymbolEnvironment,
    module: String,
    next_closure: u32,
    clause_arity: HashMap<Locator, usize>,
}

impl Translator {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            env: SymbolEnvironment::new(),
            module: module.into(),
            next_closure: 0,
            clause_arity: HashMap::new(),
        }
    }

    pub fn with_registry(module: impl Into<String>, registry: Arc<dyn DeclarationRegistry>) -> Self {
        Self {
            env: SymbolEnvironment::with_registry(registry),
            module: module.into(),
            next_closure: 0,
            clause_arity: HashMap::new(),
        }
    }

    pub fn env(&self) -> &SymbolEnvironment {
        &self.env
    }

    /// Translate a whole compilation unit, top to bottom. Type declarations
    /// are registered first so value bindings may mention them freely.
    /// Errors are collected per declaration; a failing declaration does not
    /// stop its siblings from being translated.
    pub fn translate_program(&mut self, program: &Program) -> Result<TypedProgram, Vec<TypeError>> {
        let mut errors = Vec::new();

        for decl in &program.declarations {
            if let Declaration::TypeDef(def) = decl {
                if let Err(err) = self.translate_type_def(def) {
                    errors.push(err);
                }
            }
        }

        let mut declarations = Vec::new();
        for decl in &program.declarations {
            if let Declaration::Binding(binding) = decl {
                match self.translate_binding(binding) {
                    Ok(typed) => declarations.push(typed),
                    Err(err) => errors.push(err),
                }
            }
        }

        if errors.is_empty() {
            Ok(TypedProgram { declarations })
        } else {
            Err(errors)
        }
    }

    /// Register an algebraic type, its variant records, and a constructor
    /// for each variant.
    fn translate_type_def(&mut self, def: &TypeDef) -> Result<(), TypeError> {
        let variants: Vec<String> = def.variants.iter().map(|v| v.name.clone()).collect();
        let algebraic = Type::Algebraic(AlgebraicType {
            name: def.name.clone(),
            variants,
        });
        self.env.declare_type(def.name.clone(), algebraic);

        for variant in &def.variants {
            let mut fields = Vec::new();
            for (index, annotation) in variant.fields.iter().enumerate() {
                let ty = self.resolve_annotation(annotation, Some(&def.name))?;
                fields.push((format!("_{}", index), ty));
            }
            let record = Type::Record(RecordType {
                name: variant.name.clone(),
                parent: Some(def.name.clone()),
                fields: fields.clone(),
            });
            self.env.declare_type(variant.name.clone(), record.clone());

            let constructor = fields
                .iter()
                .rev()
                .fold(record, |acc, (_, field)| Type::function(field.clone(), acc));
            self.env.define_global(
                Locator::declaration(self.module.as_str(), &variant.name),
                constructor,
            );
        }
        debug!("declared type {}", def.name);
        Ok(())
    }

    fn translate_binding(&mut self, binding: &Binding) -> Result<TypedDeclaration, TypeError> {
        let locator = Locator::declaration(self.module.as_str(), &binding.name);

        let known_arity = self.clause_arity.get(&locator).copied();
        match known_arity {
            Some(expected) if expected != binding.params.len() => {
                return Err(TypeError::pattern_arity_mismatch(
                    &binding.name,
                    expected,
                    binding.params.len(),
                    binding.position.clone(),
                ));
            }
            _ => {
                self.clause_arity
                    .insert(locator.clone(), binding.params.len());
            }
        }

        let mark = self.env.arena().mark();
        let head = self.env.head();
        let scope = self.env.extend(head);

        // Pre-bind the name so the body may reference itself; the variable
        // is rigid inside the body and unified with the body's type below.
        let self_ty = self.env.create_variable();
        self.env.define(scope, locator.clone(), self_ty.clone());
        self.env.specialize(scope, self_ty.clone());

        let mut param_tys = Vec::new();
        for pattern in &binding.params {
            param_tys.push(self.bind_pattern(scope, pattern)?);
        }
        let mut body = self.translate_expr(scope, &binding.body)?;

        let mut ty = body.ty.clone();
        for param in param_tys.iter().rev() {
            ty = Type::function(param.clone(), ty);
        }

        if let Some(annotation) = &binding.annotation {
            let declared = self.resolve_annotation(annotation, None)?;
            self.env.unifier().unify(&ty, &declared).map_err(|err| {
                TypeError::from_unify_error(err, binding.position.clone())
                    .with_context(format!("declared signature of {}", binding.name))
            })?;
        }

        self.env
            .unifier()
            .unify(&self_ty, &ty)
            .map_err(|err| TypeError::from_unify_error(err, binding.position.clone()))?;
        self.env.generify(scope, &self_ty);

        for cell in self.env.arena().overloaded_since(mark) {
            self.env
                .unifier()
                .settle(cell)
                .map_err(|err| TypeError::from_unify_error(err, binding.position.clone()))?;
        }

        let presented = self.present(mark, &ty);
        let declaration_overloaded = presented.contains_set();
        self.finalize_expr(&mut body, declaration_overloaded)?;

        let params = binding
            .params
            .iter()
            .zip(param_tys.iter())
            .map(|(pattern, ty)| TypedPattern {
                pattern: pattern.clone(),
                ty: self.env.arena().resolve(ty),
            })
            .collect();

        self.env.define_global(locator.clone(), presented.clone());
        debug!("translated {} : {}", binding.name, presented.pretty());

        Ok(TypedDeclaration {
            name: binding.name.clone(),
            locator,
            params,
            body,
            ty: presented,
            position: binding.position.clone(),
        })
    }

    fn translate_expr(&mut self, scope: ScopeId, expr: &Expr) -> Result<TypedExpr, TypeError> {
        match expr {
            Expr::Literal(lit) => Ok(TypedExpr {
                kind: TypedExprKind::Literal(lit.value.clone()),
                ty: literal_type(&lit.value),
                position: lit.position.clone(),
            }),
            Expr::Ident(ident) => self.translate_ident(scope, ident),
            Expr::Apply(apply) => self.translate_apply(scope, apply),
            Expr::Lambda(lambda) => self.translate_lambda(scope, lambda),
            Expr::If(conditional) => self.translate_if(scope, conditional),
            Expr::Match(matching) => self.translate_match(scope, matching),
        }
    }

    fn translate_ident(
        &mut self,
        scope: ScopeId,
        ident: &IdentExpr,
    ) -> Result<TypedExpr, TypeError> {
        let (locator, ty) = self.lookup_name(scope, &ident.name).ok_or_else(|| {
            TypeError::undefined_symbol(ident.name.clone(), ident.position.clone())
        })?;
        let candidates = self.env.arena().decompose(&ty);
        let reference = match candidates.as_slice() {
            [single] => Reference::Bound(single.clone()),
            _ => Reference::Unbound(candidates),
        };
        Ok(TypedExpr {
            kind: TypedExprKind::Reference {
                name: ident.name.clone(),
                locator,
                reference,
            },
            ty,
            position: ident.position.clone(),
        })
    }

    /// Resolve a bare name to a locator: lexical locals shadow the current
    /// module's declarations, which shadow the built-ins.
    fn lookup_name(&mut self, scope: ScopeId, name: &str) -> Option<(Locator, Type)> {
        let local = Locator::variable(name);
        if self.env.is_defined(scope, &local) {
            let ty = self.env.type_of(scope, &local)?;
            return Some((local, ty));
        }
        for locator in [
            Locator::declaration(self.module.as_str(), name),
            Locator::declaration(builtins::MODULE, name),
        ] {
            if let Some(ty) = self.env.type_of(scope, &locator) {
                return Some((locator, ty));
            }
        }
        None
    }

    fn translate_apply(&mut self, scope: ScopeId, apply: &ApplyExpr) -> Result<TypedExpr, TypeError> {
        let func = self.translate_expr(scope, &apply.func)?;
        let arg = self.translate_expr(scope, &apply.arg)?;

        let result = self.env.create_variable();
        let expected = Type::function(arg.ty.clone(), result.clone());
        let context = match apply.func.as_ref() {
            Expr::Ident(id) => format!("in application of {}", id.name),
            _ => "in function application".to_string(),
        };
        self.env.unifier().unify(&func.ty, &expected).map_err(|err| {
            TypeError::from_unify_error(err, apply.position.clone()).with_context(context)
        })?;

        Ok(TypedExpr {
            kind: TypedExprKind::Apply {
                func: Box::new(func),
                arg: Box::new(arg),
            },
            ty: result,
            position: apply.position.clone(),
        })
    }

    fn translate_lambda(
        &mut self,
        scope: ScopeId,
        lambda: &LambdaExpr,
    ) -> Result<TypedExpr, TypeError> {
        let locator = Locator::closure(self.next_closure);
        self.next_closure += 1;

        let body_scope = self.env.extend(scope);
        let (param_name, param_ty) = match &lambda.param {
            LambdaParam::Unit(_) => (None, Type::unit()),
            LambdaParam::Ident(param) => {
                let ty = match &param.annotation {
                    Some(annotation) => self.resolve_annotation(annotation, None)?,
                    None => self.env.create_variable(),
                };
                self.env
                    .define(body_scope, Locator::variable(&param.name), ty.clone());
                self.env.specialize(body_scope, ty.clone());
                (Some(param.name.clone()), ty)
            }
        };

        let body = self.translate_expr(body_scope, &lambda.body)?;
        if matches!(lambda.param, LambdaParam::Ident(_)) {
            self.env.generify(body_scope, &param_ty);
        }

        let ty = Type::function(param_ty, body.ty.clone());
        Ok(TypedExpr {
            kind: TypedExprKind::Lambda {
                param: param_name,
                locator,
                body: Box::new(body),
            },
            ty,
            position: lambda.position.clone(),
        })
    }

    fn translate_if(&mut self, scope: ScopeId, conditional: &IfExpr) -> Result<TypedExpr, TypeError> {
        let condition = self.translate_expr(scope, &conditional.condition)?;
        self.env
            .unifier()
            .unify(&condition.ty, &Type::boolean())
            .map_err(|err| {
                TypeError::from_unify_error(err, conditional.condition.position())
                    .with_context("condition of if expression")
            })?;

        let then_branch = self.translate_expr(scope, &conditional.then_branch)?;
        let else_branch = self.translate_expr(scope, &conditional.else_branch)?;
        let ty = self.join_branches(&[then_branch.ty.clone(), else_branch.ty.clone()]);

        Ok(TypedExpr {
            kind: TypedExprKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            ty,
            position: conditional.position.clone(),
        })
    }

    fn translate_match(
        &mut self,
        scope: ScopeId,
        matching: &MatchExpr,
    ) -> Result<TypedExpr, TypeError> {
        let scrutinee = self.translate_expr(scope, &matching.scrutinee)?;

        let mut arms = Vec::new();
        let mut branch_tys = Vec::new();
        for arm in &matching.arms {
            let arm_scope = self.env.extend(scope);
            let pattern_ty = self.bind_pattern(arm_scope, &arm.pattern)?;
            self.env
                .unifier()
                .unify(&pattern_ty, &scrutinee.ty)
                .map_err(|err| {
                    TypeError::from_unify_error(err, arm.position.clone())
                        .with_context("pattern does not match the scrutinee")
                })?;
            let body = self.translate_expr(arm_scope, &arm.body)?;
            branch_tys.push(body.ty.clone());
            arms.push(TypedArm {
                pattern: arm.pattern.clone(),
                body,
            });
        }
        let ty = self.join_branches(&branch_tys);

        Ok(TypedExpr {
            kind: TypedExprKind::Match {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            ty,
            position: matching.position.clone(),
        })
    }

    /// Fold branch result types into the node's type: a single unified type
    /// when the branches agree, the shared algebraic parent when they are
    /// sibling variants, or the union set of the distinct branch types.
    fn join_branches(&mut self, branches: &[Type]) -> Type {
        let mut acc = match branches.first() {
            Some(ty) => ty.clone(),
            None => return self.env.create_variable(),
        };
        for ty in &branches[1..] {
            let snap = self.env.arena().snapshot();
            if self.env.unifier().unify(&acc, ty).is_ok() {
                continue;
            }
            self.env.arena_mut().rollback(snap);

            let left = self.env.arena().resolve(&acc);
            let right = self.env.arena().resolve(ty);
            if let (Type::Record(a), Type::Record(b)) = (&left, &right) {
                if a.parent.is_some() && a.parent == b.parent {
                    if let Some(parent) = a.parent.as_deref().and_then(|p| self.env.decls().lookup(p))
                    {
                        acc = parent.clone();
                        continue;
                    }
                }
            }
            acc = Type::set(vec![left, right]);
        }
        acc
    }

    /// Type a pattern, defining its bound names in `scope`. Pattern-bound
    /// names are rigid inside the arm or clause body.
    fn bind_pattern(&mut self, scope: ScopeId, pattern: &Pattern) -> Result<Type, TypeError> {
        match pattern {
            Pattern::Wildcard(_) => Ok(self.env.create_variable()),
            Pattern::Ident(name, _) => {
                let ty = self.env.create_variable();
                self.env.define(scope, Locator::variable(name), ty.clone());
                self.env.specialize(scope, ty.clone());
                Ok(ty)
            }
            Pattern::Literal(literal, _) => Ok(literal_type(literal)),
            Pattern::Constructor {
                name,
                args,
                position,
            } => {
                let record = match self.env.decls().lookup(name) {
                    Some(Type::Record(record)) => record.clone(),
                    _ => {
                        return Err(TypeError::undefined_symbol(
                            name.clone(),
                            position.clone(),
                        ))
                    }
                };
                if args.len() != record.fields.len() {
                    return Err(TypeError::pattern_arity_mismatch(
                        name.clone(),
                        record.fields.len(),
                        args.len(),
                        position.clone(),
                    ));
                }
                for (arg, (_, field_ty)) in args.iter().zip(record.fields.iter()) {
                    let arg_ty = self.bind_pattern(scope, arg)?;
                    self.env.unifier().unify(&arg_ty, field_ty).map_err(|err| {
                        TypeError::from_unify_error(err, arg.position())
                            .with_context(format!("in pattern field of {}", name))
                    })?;
                }
                Ok(Type::Record(record))
            }
        }
    }

    fn resolve_annotation(
        &mut self,
        annotation: &TypeAnnotation,
        recursive: Option<&str>,
    ) -> Result<Type, TypeError> {
        match annotation {
            TypeAnnotation::Named(name, span) => match name.as_str() {
                "Integer" => Ok(Type::integer()),
                "Double" => Ok(Type::double()),
                "String" => Ok(Type::string()),
                "Boolean" => Ok(Type::boolean()),
                "Character" => Ok(Type::character()),
                "Symbol" => Ok(Type::symbol()),
                "()" => Ok(Type::unit()),
                other => {
                    if recursive == Some(other) {
                        return Ok(Type::Recur(name.clone()));
                    }
                    self.env
                        .decls()
                        .lookup(other)
                        .cloned()
                        .ok_or_else(|| TypeError::undefined_symbol(name.clone(), span.clone()))
                }
            },
            TypeAnnotation::Function(domain, codomain, _) => Ok(Type::function(
                self.resolve_annotation(domain, recursive)?,
                self.resolve_annotation(codomain, recursive)?,
            )),
        }
    }

    /// The declaration's final type. If exactly one overload cell is still
    /// live, the type is presented per candidate: each member is tried
    /// against the cell's requirements in turn and the declaration type
    /// resolved under that member's bindings, keeping argument and result
    /// positions correlated in the resulting set.
    fn present(&mut self, mark: Mark, ty: &Type) -> Type {
        let live = self.env.arena().overloaded_since(mark);
        if let [cell] = live.as_slice() {
            let (members, constraints) = self.env.arena().overload_parts(*cell);
            if !constraints.is_empty() {
                let mut shapes = Vec::new();
                for member in &members {
                    let snap = self.env.arena().snapshot();
                    let ok = {
                        let mut unifier = self.env.unifier();
                        constraints.iter().all(|c| unifier.unify(member, c).is_ok())
                    };
                    if ok {
                        shapes.push(self.env.arena().resolve(ty));
                    }
                    self.env.arena_mut().rollback(snap);
                }
                if !shapes.is_empty() {
                    return Type::set(shapes);
                }
            }
        }
        self.env.arena().resolve(ty)
    }

    /// Expose every node type and classify references. A reference that is
    /// still overloaded inside a concretely-typed declaration has no
    /// context left to narrow it: ambiguous, rather than silently picking
    /// a member.
    fn finalize_expr(
        &self,
        expr: &mut TypedExpr,
        declaration_overloaded: bool,
    ) -> Result<(), TypeError> {
        expr.ty = self.env.arena().resolve(&expr.ty);
        match &mut expr.kind {
            TypedExprKind::Literal(_) => {}
            TypedExprKind::Reference {
                name, reference, ..
            } => match &expr.ty {
                Type::Set(members) => {
                    if !declaration_overloaded {
                        return Err(TypeError::ambiguous_overload(
                            name.clone(),
                            members.clone(),
                            expr.position.clone(),
                        ));
                    }
                    *reference = Reference::Unbound(members.clone());
                }
                ty => *reference = Reference::Bound(ty.clone()),
            },
            TypedExprKind::Apply { func, arg } => {
                self.finalize_expr(func, declaration_overloaded)?;
                self.finalize_expr(arg, declaration_overloaded)?;
            }
            TypedExprKind::Lambda { body, .. } => {
                self.finalize_expr(body, declaration_overloaded)?;
            }
            TypedExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.finalize_expr(condition, declaration_overloaded)?;
                self.finalize_expr(then_branch, declaration_overloaded)?;
                self.finalize_expr(else_branch, declaration_overloaded)?;
            }
            TypedExprKind::Match { scrutinee, arms } => {
                self.finalize_expr(scrutinee, declaration_overloaded)?;
                for arm in arms {
                    self.finalize_expr(&mut arm.body, declaration_overloaded)?;
                }
            }
        }
        Ok(())
    }
}

fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Integer(_) => Type::integer(),
        Literal::Double(_) => Type::double(),
        Literal::String(_) => Type::string(),
        Literal::Boolean(_) => Type::boolean(),
        Literal::Character(_) => Type::character(),
        Literal::Symbol(_) => Type::symbol(),
    }
}
