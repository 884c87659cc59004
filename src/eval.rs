use crate::ast::*;
use crate::context::Resolve;
use crate::error::EvaluationError;
use crate::value::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

/// How missing data is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Undefined variables and dereferences through null are errors.
    Strict,
    /// Undefined variables and dereferences through null are `null`, and
    /// ordering comparisons against `null` are false. Used for tests.
    /// Calling a method on a missing receiver is still an error.
    Lenient,
}

pub struct Evaluator<'a, R: Resolve + ?Sized> {
    vars: &'a R,
    mode: Mode,
}

/// Evaluate a value expression (placeholder, bind, loop source).
pub fn evaluate<R: Resolve + ?Sized>(expr: &Expr, vars: &R) -> Result<Value, EvaluationError> {
    Evaluator::new(vars, Mode::Strict).eval(expr)
}

/// Evaluate a test expression to a boolean. A method called on a missing
/// receiver makes the whole test false.
pub fn evaluate_test<R: Resolve + ?Sized>(expr: &Expr, vars: &R) -> Result<bool, EvaluationError> {
    match Evaluator::new(vars, Mode::Lenient).eval(expr) {
        Ok(value) => Ok(value.is_truthy()),
        Err(EvaluationError::Undefined { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

fn mismatch(op: &'static str, left: &Value, right: &Value) -> EvaluationError {
    EvaluationError::TypeMismatch {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn bad_argument(name: &str, found: &Value) -> EvaluationError {
    EvaluationError::BadArgument {
        name: name.to_string(),
        found: found.type_name(),
    }
}

impl<'a, R: Resolve + ?Sized> Evaluator<'a, R> {
    pub fn new(vars: &'a R, mode: Mode) -> Self {
        Self { vars, mode }
    }

    fn missing(&self, expr: &Expr) -> Result<Value, EvaluationError> {
        match self.mode {
            Mode::Lenient => Ok(Value::Null),
            Mode::Strict => Err(EvaluationError::Undefined { path: expr.path() }),
        }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(_) | Expr::Field(..) | Expr::Index(..) => match self.lookup(expr)? {
                Some(value) => Ok(value.into_owned()),
                None => self.missing(expr),
            },
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            // Every known function builds a list.
            Expr::Call(_, args) => args
                .iter()
                .map(|arg| self.eval(arg))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Method(base, name, args) => {
                let target = self.eval(base)?;
                if target.is_null() {
                    return Err(EvaluationError::Undefined { path: expr.path() });
                }
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call_method(target, name, args)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(i) => i
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| bad_argument("-", &Value::Int(i))),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(bad_argument("-", &other)),
                    },
                }
            }
            Expr::BinOp(lhs, BinOp::And, rhs) => {
                if !self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            Expr::BinOp(lhs, BinOp::Or, rhs) => {
                if self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            Expr::BinOp(lhs, op, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                self.binary(*op, l, r)
            }
            Expr::Ternary(cond, then, otherwise) => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    /// Walk a variable path by reference, cloning nothing along the way.
    /// `None` means the path ends at a missing entry or runs through `null`.
    fn lookup(&self, expr: &Expr) -> Result<Option<Cow<'a, Value>>, EvaluationError> {
        let vars: &'a R = self.vars;
        match expr {
            Expr::Var(name) => Ok(vars.resolve(name).map(Cow::Borrowed)),
            Expr::Field(base, field) => match self.base(base)? {
                Cow::Borrowed(Value::Map(fields)) => Ok(fields.get(field).map(Cow::Borrowed)),
                Cow::Owned(Value::Map(mut fields)) => Ok(fields.remove(field).map(Cow::Owned)),
                other if other.is_null() => Ok(None),
                other => Err(EvaluationError::NoSuchField {
                    field: field.clone(),
                    found: other.type_name(),
                }),
            },
            Expr::Index(base, index) => {
                let container = self.base(base)?;
                let key = self.eval(index)?;
                match (container, &key) {
                    (Cow::Borrowed(Value::List(items)), Value::Int(i)) => {
                        Ok(self.position(items.len(), *i)?.map(|idx| Cow::Borrowed(&items[idx])))
                    }
                    (Cow::Owned(Value::List(mut items)), Value::Int(i)) => {
                        Ok(self.position(items.len(), *i)?.map(|idx| Cow::Owned(items.swap_remove(idx))))
                    }
                    (Cow::Borrowed(Value::Map(fields)), Value::String(name)) => {
                        Ok(fields.get(name).map(Cow::Borrowed))
                    }
                    (Cow::Owned(Value::Map(mut fields)), Value::String(name)) => {
                        Ok(fields.remove(name).map(Cow::Owned))
                    }
                    (container, _) if container.is_null() => Ok(None),
                    (container, key) => Err(mismatch("[]", &container, key)),
                }
            }
            other => self.eval(other).map(|value| Some(Cow::Owned(value))),
        }
    }

    /// The container a field or index step reads from.
    fn base(&self, base: &Expr) -> Result<Cow<'a, Value>, EvaluationError> {
        match self.lookup(base)? {
            Some(value) => Ok(value),
            None => self.missing(base).map(Cow::Owned),
        }
    }

    fn position(&self, len: usize, index: i64) -> Result<Option<usize>, EvaluationError> {
        match usize::try_from(index).ok().filter(|idx| *idx < len) {
            Some(idx) => Ok(Some(idx)),
            None if self.mode == Mode::Lenient => Ok(None),
            None => Err(EvaluationError::IndexOutOfBounds { index, len }),
        }
    }

    fn binary(&self, op: BinOp, l: Value, r: Value) -> Result<Value, EvaluationError> {
        match op {
            BinOp::Eq => Ok(Value::Bool(l.loose_eq(&r))),
            BinOp::Ne => Ok(Value::Bool(!l.loose_eq(&r))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (&l, &r) {
                    (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
                    (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                        l.as_f64().zip(r.as_f64()).and_then(|(a, b)| a.partial_cmp(&b))
                    }
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    (Value::Null, _) | (_, Value::Null) if self.mode == Mode::Lenient => None,
                    _ => return Err(mismatch(op.symbol(), &l, &r)),
                };
                let Some(ordering) = ordering else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(match op {
                    BinOp::Lt => ordering == Ordering::Less,
                    BinOp::Le => ordering != Ordering::Greater,
                    BinOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
            BinOp::In | BinOp::NotIn => {
                let found = match (&l, &r) {
                    (_, Value::List(items)) => items.iter().any(|item| item.loose_eq(&l)),
                    (Value::String(key), Value::Map(fields)) => fields.contains_key(key),
                    (Value::String(needle), Value::String(haystack)) => haystack.contains(needle.as_str()),
                    (_, Value::Null) => false,
                    _ => return Err(mismatch(op.symbol(), &l, &r)),
                };
                Ok(Value::Bool(found == (op == BinOp::In)))
            }
            BinOp::Add => match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => Ok(a
                    .checked_add(*b)
                    .map_or(Value::Float(*a as f64 + *b as f64), Value::Int)),
                (Value::String(_), _) | (_, Value::String(_)) => {
                    Ok(Value::String(format!("{l}{r}")))
                }
                _ => arithmetic(op, &l, &r),
            },
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arithmetic(op, &l, &r),
            // Short-circuit operators are handled in `eval`.
            BinOp::And => Ok(Value::Bool(l.is_truthy() && r.is_truthy())),
            BinOp::Or => Ok(Value::Bool(l.is_truthy() || r.is_truthy())),
        }
    }
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvaluationError> {
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        let (a, b) = (*a, *b);
        if matches!(op, BinOp::Div | BinOp::Rem) && b == 0 {
            return Err(EvaluationError::DivisionByZero);
        }
        let exact = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div => a.checked_div(b),
            _ => a.checked_rem(b),
        };
        if let Some(result) = exact {
            return Ok(Value::Int(result));
        }
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(mismatch(op.symbol(), l, r));
    };
    Ok(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        _ => a % b,
    }))
}

fn call_method(target: Value, name: &str, mut args: Vec<Value>) -> Result<Value, EvaluationError> {
    let arity = match name {
        "contains" | "containsKey" | "startsWith" | "endsWith" | "equals" | "get" => 1,
        _ => 0,
    };
    if args.len() != arity {
        return Err(EvaluationError::BadArgument {
            name: format!("{name}() with {} argument(s)", args.len()),
            found: target.type_name(),
        });
    }
    let arg = args.pop().unwrap_or_default();

    match (name, &target, &arg) {
        ("size" | "length", Value::String(s), _) => Ok(Value::Int(s.chars().count() as i64)),
        ("size" | "length", Value::List(items), _) => Ok(Value::Int(items.len() as i64)),
        ("size" | "length", Value::Map(fields), _) => Ok(Value::Int(fields.len() as i64)),
        ("isEmpty", Value::String(s), _) => Ok(Value::Bool(s.is_empty())),
        ("isEmpty", Value::List(items), _) => Ok(Value::Bool(items.is_empty())),
        ("isEmpty", Value::Map(fields), _) => Ok(Value::Bool(fields.is_empty())),
        ("trim", Value::String(s), _) => Ok(Value::from(s.trim())),
        ("toUpperCase", Value::String(s), _) => Ok(Value::String(s.to_uppercase())),
        ("toLowerCase", Value::String(s), _) => Ok(Value::String(s.to_lowercase())),
        ("contains", Value::String(s), Value::String(needle)) => {
            Ok(Value::Bool(s.contains(needle.as_str())))
        }
        ("contains", Value::List(items), needle) => {
            Ok(Value::Bool(items.iter().any(|item| item.loose_eq(needle))))
        }
        ("containsKey", Value::Map(fields), Value::String(key)) => {
            Ok(Value::Bool(fields.contains_key(key)))
        }
        ("startsWith", Value::String(s), Value::String(prefix)) => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        ("endsWith", Value::String(s), Value::String(suffix)) => {
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        ("equals", _, other) => Ok(Value::Bool(target.loose_eq(other))),
        ("get", Value::List(items), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|idx| items.get(idx))
            .cloned()
            .unwrap_or_default()),
        ("get", Value::Map(fields), Value::String(key)) => {
            Ok(fields.get(key).cloned().unwrap_or_default())
        }
        _ => Err(bad_argument(name, &target)),
    }
}
