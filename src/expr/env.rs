//! Expression environments.
//!
//! An [`Env`] declares which top-level variables exist, which macros are
//! available, and the evaluation cost ceiling. It is immutable once built
//! and shared by every program compiled against it. Compilation parses the
//! source, expands macros, rejects undeclared references and unknown
//! functions, and applies the static checks that are possible over
//! dynamically typed variables (literal-only type conflicts).

use std::collections::BTreeSet;
use std::sync::Arc;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::eval::Program;
use super::parser::parse_source;
use super::value::Value;
use super::CompileError;

/// Builtin functions available in every environment.
const BUILTIN_FUNCTIONS: &[(&str, usize)] = &[("size", 1)];

/// Macros an environment may enable. Macros rewrite the AST at compile
/// time; a cleared environment rejects them as undeclared.
pub const STANDARD_MACROS: &[&str] = &["has"];

/// An immutable expression environment.
#[derive(Debug, Clone)]
pub struct Env {
    variables: BTreeSet<String>,
    macros: BTreeSet<String>,
    cost_limit: Option<u64>,
}

/// Builder for [`Env`]. Starts with no variables, the standard macros, and
/// no cost ceiling.
#[derive(Debug, Default)]
pub struct EnvBuilder {
    variables: BTreeSet<String>,
    macros: Option<BTreeSet<String>>,
    cost_limit: Option<u64>,
}

/// A compiled, checked expression, ready to be turned into a [`Program`].
#[derive(Debug, Clone)]
pub struct Ast {
    pub(crate) expr: Arc<Expr>,
}

/// Options applied when building a program from an [`Ast`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramOptions {
    /// Record per-node evaluation state so a trace can be returned.
    pub track_state: bool,
    /// Override the environment's cost ceiling; `None` inherits it.
    pub cost_limit: Option<u64>,
}

impl EnvBuilder {
    /// Declare a top-level variable of dynamic type.
    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.variables.insert(name.into());
        self
    }

    /// Remove every macro from the environment.
    pub fn clear_macros(mut self) -> Self {
        self.macros = Some(BTreeSet::new());
        self
    }

    /// Set the evaluation cost ceiling inherited by programs.
    pub fn cost_limit(mut self, limit: u64) -> Self {
        self.cost_limit = Some(limit);
        self
    }

    pub fn build(self) -> Env {
        Env {
            variables: self.variables,
            macros: self.macros.unwrap_or_else(|| {
                STANDARD_MACROS.iter().map(|m| (*m).to_owned()).collect()
            }),
            cost_limit: self.cost_limit,
        }
    }
}

impl Env {
    pub fn builder() -> EnvBuilder {
        EnvBuilder::default()
    }

    /// Declared top-level variable names.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }

    /// The evaluation cost ceiling, if any.
    pub fn cost_limit(&self) -> Option<u64> {
        self.cost_limit
    }

    /// Compile an expression source string against this environment.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] on syntax errors, undeclared references,
    /// unknown functions or macros, bad arity, or literal type conflicts.
    pub fn compile(&self, source: &str) -> Result<Ast, CompileError> {
        let parsed = parse_source(source)?;
        let expanded = self.resolve(parsed)?;
        check_types(&expanded)?;
        Ok(Ast {
            expr: Arc::new(expanded),
        })
    }

    /// Build an executable program from a compiled expression.
    pub fn program(&self, ast: &Ast, opts: ProgramOptions) -> Program {
        Program::new(
            Arc::clone(&ast.expr),
            opts.cost_limit.or(self.cost_limit),
            opts.track_state,
        )
    }

    /// Expand macros and verify every reference resolves.
    fn resolve(&self, expr: Expr) -> Result<Expr, CompileError> {
        match expr {
            Expr::Literal(_) => Ok(expr),
            Expr::Ident(ref name) => {
                if self.variables.contains(name) {
                    Ok(expr)
                } else {
                    Err(CompileError::UndeclaredReference { name: name.clone() })
                }
            }
            Expr::Member(base, field) => {
                Ok(Expr::Member(Box::new(self.resolve(*base)?), field))
            }
            Expr::Unary(op, inner) => Ok(Expr::Unary(op, Box::new(self.resolve(*inner)?))),
            Expr::Binary(op, lhs, rhs) => Ok(Expr::Binary(
                op,
                Box::new(self.resolve(*lhs)?),
                Box::new(self.resolve(*rhs)?),
            )),
            Expr::List(items) => Ok(Expr::List(
                items
                    .into_iter()
                    .map(|item| self.resolve(item))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Call(name, args) => self.resolve_call(name, args),
            Expr::HasField(base, field) => {
                Ok(Expr::HasField(Box::new(self.resolve(*base)?), field))
            }
        }
    }

    fn resolve_call(&self, name: String, args: Vec<Expr>) -> Result<Expr, CompileError> {
        if self.macros.contains(&name) {
            return expand_macro(self, &name, args);
        }

        match BUILTIN_FUNCTIONS.iter().find(|(f, _)| *f == name) {
            Some((_, arity)) => {
                if args.len() != *arity {
                    return Err(CompileError::BadArity {
                        name,
                        expected: *arity,
                        got: args.len(),
                    });
                }
                Ok(Expr::Call(
                    name,
                    args.into_iter()
                        .map(|a| self.resolve(a))
                        .collect::<Result<_, _>>()?,
                ))
            }
            None => Err(CompileError::UndeclaredFunction { name }),
        }
    }
}

/// Expand a macro invocation. `has(x.f)` becomes a field-presence node.
fn expand_macro(env: &Env, name: &str, mut args: Vec<Expr>) -> Result<Expr, CompileError> {
    match name {
        "has" => {
            if args.len() != 1 {
                return Err(CompileError::BadArity {
                    name: name.to_owned(),
                    expected: 1,
                    got: args.len(),
                });
            }
            match args.remove(0) {
                Expr::Member(base, field) => {
                    Ok(Expr::HasField(Box::new(env.resolve(*base)?), field))
                }
                _ => Err(CompileError::BadMacroArgument {
                    name: name.to_owned(),
                    expected: "a field selection",
                }),
            }
        }
        other => Err(CompileError::UndeclaredFunction {
            name: other.to_owned(),
        }),
    }
}

/// Static type lattice. Variables and field selections are `Dyn`; literal
/// subtrees carry concrete types so obvious conflicts fail at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StaticType {
    Bool,
    Int,
    Float,
    Str,
    Null,
    List,
    Dyn,
}

impl StaticType {
    fn name(self) -> &'static str {
        match self {
            StaticType::Bool => "bool",
            StaticType::Int => "int",
            StaticType::Float => "double",
            StaticType::Str => "string",
            StaticType::Null => "null",
            StaticType::List => "list",
            StaticType::Dyn => "dyn",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, StaticType::Int | StaticType::Float | StaticType::Dyn)
    }
}

fn check_types(expr: &Expr) -> Result<StaticType, CompileError> {
    use StaticType as T;

    let overload_err = |op: &'static str, lhs: T, rhs: T| CompileError::NoSuchOverload {
        op,
        lhs: lhs.name(),
        rhs: rhs.name(),
    };

    match expr {
        Expr::Literal(v) => Ok(match v {
            Value::Null => T::Null,
            Value::Bool(_) => T::Bool,
            Value::Int(_) => T::Int,
            Value::Float(_) => T::Float,
            Value::String(_) => T::Str,
            Value::List(_) | Value::Object(_) => T::List,
        }),
        Expr::Ident(_) | Expr::Member(_, _) => {
            if let Expr::Member(base, _) = expr {
                check_types(base)?;
            }
            Ok(T::Dyn)
        }
        Expr::HasField(base, _) => {
            check_types(base)?;
            Ok(T::Bool)
        }
        Expr::List(items) => {
            for item in items {
                check_types(item)?;
            }
            Ok(T::List)
        }
        Expr::Call(name, args) => {
            for arg in args {
                check_types(arg)?;
            }
            match name.as_str() {
                "size" => Ok(T::Int),
                _ => Ok(T::Dyn),
            }
        }
        Expr::Unary(op, inner) => {
            let t = check_types(inner)?;
            match op {
                UnaryOp::Not => match t {
                    T::Bool | T::Dyn => Ok(T::Bool),
                    other => Err(overload_err("!", other, other)),
                },
                UnaryOp::Neg => match t {
                    T::Int | T::Float | T::Dyn => Ok(t),
                    other => Err(overload_err("-", other, other)),
                },
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let lt = check_types(lhs)?;
            let rt = check_types(rhs)?;
            match op {
                BinaryOp::And | BinaryOp::Or => {
                    for t in [lt, rt] {
                        if !matches!(t, T::Bool | T::Dyn) {
                            return Err(overload_err(op.symbol(), lt, rt));
                        }
                    }
                    Ok(T::Bool)
                }
                BinaryOp::Eq | BinaryOp::Ne => {
                    let compatible = lt == T::Dyn
                        || rt == T::Dyn
                        || lt == rt
                        || (lt.is_numeric() && rt.is_numeric());
                    if compatible {
                        Ok(T::Bool)
                    } else {
                        Err(overload_err(op.symbol(), lt, rt))
                    }
                }
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    let ordered = (lt.is_numeric() && rt.is_numeric())
                        || (matches!(lt, T::Str | T::Dyn) && matches!(rt, T::Str | T::Dyn));
                    if ordered {
                        Ok(T::Bool)
                    } else {
                        Err(overload_err(op.symbol(), lt, rt))
                    }
                }
                BinaryOp::In => match rt {
                    T::List | T::Dyn => Ok(T::Bool),
                    other => Err(overload_err("in", lt, other)),
                },
                BinaryOp::Add => match (lt, rt) {
                    (T::Dyn, _) | (_, T::Dyn) => Ok(T::Dyn),
                    (T::Int, T::Int) => Ok(T::Int),
                    (a, b) if a.is_numeric() && b.is_numeric() => Ok(T::Float),
                    (T::Str, T::Str) => Ok(T::Str),
                    (T::List, T::List) => Ok(T::List),
                    _ => Err(overload_err("+", lt, rt)),
                },
                BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                    match (lt, rt) {
                        (T::Dyn, _) | (_, T::Dyn) => Ok(T::Dyn),
                        (T::Int, T::Int) => Ok(T::Int),
                        (a, b) if a.is_numeric() && b.is_numeric() => Ok(T::Float),
                        _ => Err(overload_err(op.symbol(), lt, rt)),
                    }
                }
                BinaryOp::Mod => match (lt, rt) {
                    (T::Dyn, _) | (_, T::Dyn) | (T::Int, T::Int) => Ok(T::Int),
                    _ => Err(overload_err("%", lt, rt)),
                },
            }
        }
    }
}
