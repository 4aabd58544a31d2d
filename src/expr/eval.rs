//! Program evaluation.
//!
//! A [`Program`] is a checked AST plus evaluation options. Evaluation is a
//! synchronous tree walk over the fact payload with deterministic cost
//! accounting: every node costs one unit, and size-proportional operations
//! (string comparison and concatenation, list concatenation, membership)
//! charge additional units, so a runaway expression hits the ceiling instead
//! of monopolizing a worker.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::error::EvalError;
use super::value::{Facts, Value};

/// An executable, immutable compiled rule. Cloning shares the AST.
#[derive(Debug, Clone)]
pub struct Program {
    expr: Arc<Expr>,
    cost_limit: Option<u64>,
    track_state: bool,
}

/// The outcome of one program evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The value the expression produced.
    pub value: Value,
    /// Per-node intermediate results, present when state tracking is on.
    pub trace: Option<Vec<TraceStep>>,
}

/// One recorded intermediate result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    /// The subexpression, rendered back to source form.
    pub expr: String,
    /// The value it evaluated to.
    pub value: serde_json::Value,
}

impl Program {
    pub(crate) fn new(expr: Arc<Expr>, cost_limit: Option<u64>, track_state: bool) -> Self {
        Program {
            expr,
            cost_limit,
            track_state,
        }
    }

    /// The cost ceiling this program evaluates under, if any.
    pub fn cost_limit(&self) -> Option<u64> {
        self.cost_limit
    }

    /// Evaluate against a fact payload.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] on missing attributes or fields, runtime type
    /// mismatches, arithmetic faults, or when the cost ceiling is exceeded.
    pub fn evaluate(&self, facts: &Facts) -> Result<Evaluation, EvalError> {
        let mut evaluator = Evaluator {
            facts,
            cost: 0,
            limit: self.cost_limit,
            trace: if self.track_state {
                Some(Vec::new())
            } else {
                None
            },
        };
        let value = evaluator.eval(&self.expr)?;
        Ok(Evaluation {
            value,
            trace: evaluator.trace,
        })
    }
}

struct Evaluator<'a> {
    facts: &'a Facts,
    cost: u64,
    limit: Option<u64>,
    trace: Option<Vec<TraceStep>>,
}

impl Evaluator<'_> {
    fn charge(&mut self, units: u64) -> Result<(), EvalError> {
        self.cost = self.cost.saturating_add(units);
        if let Some(limit) = self.limit {
            if self.cost > limit {
                return Err(EvalError::CostLimitExceeded { limit });
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        self.charge(1)?;
        let value = self.eval_node(expr)?;
        if let Some(trace) = &mut self.trace {
            trace.push(TraceStep {
                expr: expr.to_string(),
                value: value.to_json(),
            });
        }
        Ok(value)
    }

    fn eval_node(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => self
                .facts
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::MissingAttribute { name: name.clone() }),
            Expr::Member(base, field) => match self.eval(base)? {
                Value::Object(map) => map
                    .get(field)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingField {
                        field: field.clone(),
                    }),
                other => Err(EvalError::NotAnObject {
                    field: field.clone(),
                    type_name: other.type_name(),
                }),
            },
            Expr::HasField(base, field) => match self.eval(base)? {
                Value::Object(map) => Ok(Value::Bool(map.contains_key(field))),
                other => Err(EvalError::NotAnObject {
                    field: field.clone(),
                    type_name: other.type_name(),
                }),
            },
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Unary(op, inner) => {
                let v = self.eval(inner)?;
                self.eval_unary(*op, v)
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => self.eval_logical(lhs, rhs, false),
            Expr::Binary(BinaryOp::Or, lhs, rhs) => self.eval_logical(lhs, rhs, true),
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                self.eval_binary(*op, a, b)
            }
            Expr::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.eval_call(name, values)
            }
        }
    }

    /// Short-circuiting `&&` / `||`. `shortcut` is the value that decides
    /// the result without evaluating the right side.
    fn eval_logical(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        shortcut: bool,
    ) -> Result<Value, EvalError> {
        let op = if shortcut { "||" } else { "&&" };
        match self.eval(lhs)? {
            Value::Bool(b) if b == shortcut => Ok(Value::Bool(shortcut)),
            Value::Bool(_) => match self.eval(rhs)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(EvalError::NoSuchOverload {
                    op,
                    lhs: "bool",
                    rhs: other.type_name(),
                }),
            },
            other => Err(EvalError::NoSuchOverload {
                op,
                lhs: other.type_name(),
                rhs: "...",
            }),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, v: Value) -> Result<Value, EvalError> {
        match (op, v) {
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Neg, Value::Int(i)) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or(EvalError::ArithmeticOverflow { op: "-" }),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Not, other) => Err(EvalError::NoSuchOverload {
                op: "!",
                lhs: other.type_name(),
                rhs: other.type_name(),
            }),
            (UnaryOp::Neg, other) => Err(EvalError::NoSuchOverload {
                op: "-",
                lhs: other.type_name(),
                rhs: other.type_name(),
            }),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, a: Value, b: Value) -> Result<Value, EvalError> {
        let overload_err = |op: BinaryOp, a: &Value, b: &Value| EvalError::NoSuchOverload {
            op: op.symbol(),
            lhs: a.type_name(),
            rhs: b.type_name(),
        };

        match op {
            BinaryOp::Eq => Ok(Value::Bool(self.values_equal(&a, &b)?)),
            BinaryOp::Ne => Ok(Value::Bool(!self.values_equal(&a, &b)?)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ord = self.compare_values(op, &a, &b)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    BinaryOp::Ge => ord != Ordering::Less,
                    _ => unreachable!(),
                }))
            }
            BinaryOp::In => self.eval_membership(a, b),
            BinaryOp::Add => match (a, b) {
                (Value::Int(x), Value::Int(y)) => x
                    .checked_add(y)
                    .map(Value::Int)
                    .ok_or(EvalError::ArithmeticOverflow { op: "+" }),
                (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
                (Value::Int(x), Value::Float(y)) => Ok(Value::Float(x as f64 + y)),
                (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x + y as f64)),
                (Value::String(x), Value::String(y)) => {
                    let mut s = x;
                    s.push_str(&y);
                    self.charge(s.len() as u64)?;
                    Ok(Value::String(s))
                }
                (Value::List(x), Value::List(y)) => {
                    let mut items = x;
                    items.extend(y);
                    self.charge(items.len() as u64)?;
                    Ok(Value::List(items))
                }
                (a, b) => Err(overload_err(op, &a, &b)),
            },
            BinaryOp::Sub | BinaryOp::Mul => match (a, b) {
                (Value::Int(x), Value::Int(y)) => {
                    let result = if op == BinaryOp::Sub {
                        x.checked_sub(y)
                    } else {
                        x.checked_mul(y)
                    };
                    result
                        .map(Value::Int)
                        .ok_or(EvalError::ArithmeticOverflow { op: op.symbol() })
                }
                (Value::Float(x), Value::Float(y)) => Ok(Value::Float(arith_f64(op, x, y))),
                (Value::Int(x), Value::Float(y)) => Ok(Value::Float(arith_f64(op, x as f64, y))),
                (Value::Float(x), Value::Int(y)) => Ok(Value::Float(arith_f64(op, x, y as f64))),
                (a, b) => Err(overload_err(op, &a, &b)),
            },
            BinaryOp::Div => match (a, b) {
                (Value::Int(_), Value::Int(0)) => Err(EvalError::DivisionByZero),
                (Value::Int(x), Value::Int(y)) => x
                    .checked_div(y)
                    .map(Value::Int)
                    .ok_or(EvalError::ArithmeticOverflow { op: "/" }),
                (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x / y)),
                (Value::Int(x), Value::Float(y)) => Ok(Value::Float(x as f64 / y)),
                (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x / y as f64)),
                (a, b) => Err(overload_err(op, &a, &b)),
            },
            BinaryOp::Mod => match (a, b) {
                (Value::Int(_), Value::Int(0)) => Err(EvalError::DivisionByZero),
                (Value::Int(x), Value::Int(y)) => x
                    .checked_rem(y)
                    .map(Value::Int)
                    .ok_or(EvalError::ArithmeticOverflow { op: "%" }),
                (a, b) => Err(overload_err(op, &a, &b)),
            },
            BinaryOp::And | BinaryOp::Or => unreachable!("handled with short-circuit"),
        }
    }

    fn values_equal(&mut self, a: &Value, b: &Value) -> Result<bool, EvalError> {
        match (a, b) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
            (Value::Int(x), Value::Int(y)) => Ok(x == y),
            (Value::Float(x), Value::Float(y)) => Ok(x == y),
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                Ok((*x as f64) == *y)
            }
            (Value::String(x), Value::String(y)) => {
                self.charge(((x.len() + y.len()) / 8) as u64)?;
                Ok(x == y)
            }
            (Value::List(x), Value::List(y)) => {
                self.charge((x.len() + y.len()) as u64)?;
                Ok(x == y)
            }
            (Value::Object(x), Value::Object(y)) => {
                self.charge((x.len() + y.len()) as u64)?;
                Ok(x == y)
            }
            (a, b) => Err(EvalError::NoSuchOverload {
                op: "==",
                lhs: a.type_name(),
                rhs: b.type_name(),
            }),
        }
    }

    fn compare_values(
        &mut self,
        op: BinaryOp,
        a: &Value,
        b: &Value,
    ) -> Result<Ordering, EvalError> {
        let ord = match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.partial_cmp(y),
            (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
            (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
            (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
            (Value::String(x), Value::String(y)) => {
                self.charge(((x.len() + y.len()) / 8) as u64)?;
                Some(x.cmp(y))
            }
            _ => None,
        };
        ord.ok_or_else(|| EvalError::NoSuchOverload {
            op: op.symbol(),
            lhs: a.type_name(),
            rhs: b.type_name(),
        })
    }

    fn eval_membership(&mut self, needle: Value, haystack: Value) -> Result<Value, EvalError> {
        match haystack {
            Value::List(items) => {
                self.charge(items.len() as u64)?;
                // Elements of a different type simply don't match.
                for item in &items {
                    if self.values_equal(&needle, item).unwrap_or(false) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Value::Object(map) => match needle {
                Value::String(key) => Ok(Value::Bool(map.contains_key(&key))),
                other => Err(EvalError::NoSuchOverload {
                    op: "in",
                    lhs: other.type_name(),
                    rhs: "object",
                }),
            },
            other => Err(EvalError::NoSuchOverload {
                op: "in",
                lhs: needle.type_name(),
                rhs: other.type_name(),
            }),
        }
    }

    fn eval_call(&mut self, name: &str, mut args: Vec<Value>) -> Result<Value, EvalError> {
        match name {
            "size" if args.len() == 1 => {
                let arg = args.remove(0);
                self.charge(1)?;
                match arg {
                    Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                    Value::List(items) => Ok(Value::Int(items.len() as i64)),
                    Value::Object(map) => Ok(Value::Int(map.len() as i64)),
                    other => Err(EvalError::NoSuchOverload {
                        op: "size",
                        lhs: other.type_name(),
                        rhs: other.type_name(),
                    }),
                }
            }
            // The checker only admits known functions; reaching this arm
            // would be a compiler bug, surfaced as an overload failure
            // rather than a panic.
            _ => Err(EvalError::NoSuchOverload {
                op: "call",
                lhs: "unknown",
                rhs: "unknown",
            }),
        }
    }
}

fn arith_f64(op: BinaryOp, x: f64, y: f64) -> f64 {
    if op == BinaryOp::Sub {
        x - y
    } else {
        x * y
    }
}
