//! Tree-walking evaluator
//!
//! Lookups are lenient: a missing variable, attribute or index is *undefined*
//! (`None`) rather than an error, renders as the empty string and reaches
//! filters as `null`. Type errors in operators are reported as eval errors.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::parser::{BinOp, Expr, Node, UnaryOp};
use crate::error::TemplateErrorKind;
use crate::filters::{is_truthy, to_text, type_name, FilterArgs, FilterRegistry};

type EvalResult<T> = Result<T, TemplateErrorKind>;

pub struct Renderer<'a> {
    filters: &'a FilterRegistry,
    ctx: &'a Value,
    frames: Vec<Map<String, Value>>,
}

impl<'a> Renderer<'a> {
    pub fn new(filters: &'a FilterRegistry, ctx: &'a Value) -> Self {
        Self {
            filters,
            ctx,
            frames: vec![Map::new()],
        }
    }

    pub fn render(&mut self, nodes: &[Node]) -> EvalResult<String> {
        let mut out = String::new();
        self.render_into(nodes, &mut out)?;
        Ok(out)
    }

    fn render_into(&mut self, nodes: &[Node], out: &mut String) -> EvalResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => {
                    if let Some(value) = self.eval(expr)? {
                        out.push_str(&to_text(&value));
                    }
                }
                Node::If { branches, otherwise } => {
                    let mut taken = None;
                    for (cond, body) in branches {
                        if truthy(&self.eval(cond)?) {
                            taken = Some(body);
                            break;
                        }
                    }
                    self.render_into(taken.unwrap_or(otherwise), out)?;
                }
                Node::For {
                    targets,
                    iter,
                    body,
                    otherwise,
                } => self.render_for(targets, iter, body, otherwise, out)?,
                Node::Set { name, expr } => {
                    let value = self.eval(expr)?.unwrap_or(Value::Null);
                    if let Some(frame) = self.frames.last_mut() {
                        frame.insert(name.clone(), value);
                    }
                }
            }
        }
        Ok(())
    }

    fn render_for(
        &mut self,
        targets: &[String],
        iter: &Expr,
        body: &[Node],
        otherwise: &[Node],
        out: &mut String,
    ) -> EvalResult<()> {
        let items: Vec<Value> = match self.eval(iter)? {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(Value::Object(map)) if targets.len() == 1 => map.into_iter().map(|(k, _)| Value::String(k)).collect(),
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
                .collect(),
            Some(Value::String(s)) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            Some(other) => return Err(TemplateErrorKind::eval(format!("cannot iterate over {}", type_name(&other)))),
        };

        if items.is_empty() {
            return self.render_into(otherwise, out);
        }

        let length = items.len();
        for (index0, item) in items.into_iter().enumerate() {
            let mut frame = Map::new();
            if let [target] = targets {
                frame.insert(target.clone(), item);
            } else {
                let parts = match item {
                    Value::Array(parts) => parts,
                    other => {
                        return Err(TemplateErrorKind::eval(format!(
                            "cannot unpack {} into {} names",
                            type_name(&other),
                            targets.len()
                        )))
                    }
                };
                let mut parts = parts.into_iter();
                for target in targets {
                    frame.insert(target.clone(), parts.next().unwrap_or(Value::Null));
                }
            }
            frame.insert(
                "loop".to_string(),
                serde_json::json!({
                    "index": index0 + 1,
                    "index0": index0,
                    "first": index0 == 0,
                    "last": index0 + 1 == length,
                    "length": length,
                }),
            );

            self.frames.push(frame);
            let result = self.render_into(body, out);
            self.frames.pop();
            result?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.ctx.get(name))
            .cloned()
    }

    /// Evaluate an expression; `None` is undefined
    pub fn eval(&mut self, expr: &Expr) -> EvalResult<Option<Value>> {
        Ok(match expr {
            Expr::Literal(value) => Some(value.clone()),
            Expr::Var(name) => self.lookup(name),
            Expr::Attr(obj, name) => self.eval(obj)?.and_then(|v| get_attr(&v, name)),
            Expr::Index(obj, index) => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                match (obj, index) {
                    (Some(obj), Some(index)) => get_item(&obj, &index),
                    _ => None,
                }
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?.unwrap_or(Value::Null));
                }
                Some(Value::Array(out))
            }
            Expr::Dict(entries) => {
                let mut out = Map::new();
                for (key, value) in entries {
                    let key = to_text(&self.eval(key)?.unwrap_or(Value::Null));
                    out.insert(key, self.eval(value)?.unwrap_or(Value::Null));
                }
                Some(Value::Object(out))
            }
            Expr::Unary(UnaryOp::Not, inner) => Some(Value::Bool(!truthy(&self.eval(inner)?))),
            Expr::Unary(UnaryOp::Neg, inner) => {
                let value = self.eval(inner)?.unwrap_or(Value::Null);
                Some(negate(&value)?)
            }
            Expr::Binary(BinOp::And, left, right) => {
                let left = self.eval(left)?;
                if truthy(&left) {
                    self.eval(right)?
                } else {
                    left
                }
            }
            Expr::Binary(BinOp::Or, left, right) => {
                let left = self.eval(left)?;
                if truthy(&left) {
                    left
                } else {
                    self.eval(right)?
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?.unwrap_or(Value::Null);
                let right = self.eval(right)?.unwrap_or(Value::Null);
                Some(binary(*op, &left, &right)?)
            }
            Expr::Cond { cond, then, otherwise } => {
                if truthy(&self.eval(cond)?) {
                    self.eval(then)?
                } else {
                    match otherwise {
                        Some(otherwise) => self.eval(otherwise)?,
                        None => None,
                    }
                }
            }
            Expr::Filter {
                expr,
                name,
                args,
                kwargs,
            } => {
                let value = self.eval(expr)?.unwrap_or(Value::Null);
                let mut filter_args = FilterArgs::default();
                for arg in args {
                    filter_args = filter_args.with_arg(self.eval(arg)?.unwrap_or(Value::Null));
                }
                for (key, arg) in kwargs {
                    filter_args = filter_args.with_kwarg(key.clone(), self.eval(arg)?.unwrap_or(Value::Null));
                }
                Some(self.filters.apply(name, &value, &filter_args)?)
            }
            Expr::Test { expr, name, negated } => {
                let value = self.eval(expr)?;
                Some(Value::Bool(run_test(name, value.as_ref())? != *negated))
            }
        })
    }
}

fn truthy(value: &Option<Value>) -> bool {
    value.as_ref().is_some_and(is_truthy)
}

fn run_test(name: &str, value: Option<&Value>) -> EvalResult<bool> {
    Ok(match name {
        "defined" => value.is_some(),
        "undefined" => value.is_none(),
        "none" => matches!(value, Some(Value::Null)),
        "string" => matches!(value, Some(Value::String(_))),
        "number" => matches!(value, Some(Value::Number(_))),
        "boolean" => matches!(value, Some(Value::Bool(_))),
        "mapping" => matches!(value, Some(Value::Object(_))),
        "sequence" => matches!(value, Some(Value::Array(_) | Value::String(_))),
        other => return Err(TemplateErrorKind::eval(format!("unknown test '{other}'"))),
    })
}

fn get_attr(value: &Value, name: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(name).cloned(),
        Value::Array(items) => name.parse::<i64>().ok().and_then(|i| index_array(items, i)),
        _ => None,
    }
}

fn get_item(value: &Value, index: &Value) -> Option<Value> {
    match (value, index) {
        (Value::Object(map), key) => map.get(&to_text(key)).cloned(),
        (Value::Array(items), Value::Number(n)) => n.as_i64().and_then(|i| index_array(items, i)),
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = n.as_i64()?;
            let i = if i < 0 { chars.len() as i64 + i } else { i };
            chars.get(usize::try_from(i).ok()?).map(|c| Value::String(c.to_string()))
        }
        _ => None,
    }
}

/// Negative indexes count from the end
fn index_array(items: &[Value], index: i64) -> Option<Value> {
    let index = if index < 0 { items.len() as i64 + index } else { index };
    items.get(usize::try_from(index).ok()?).cloned()
}

fn negate(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Number(n) => Ok(match n.as_i64().and_then(i64::checked_neg) {
            Some(i) => Value::from(i),
            None => float(-n.as_f64().unwrap_or_default())?,
        }),
        other => Err(TemplateErrorKind::eval(format!("cannot negate {}", type_name(other)))),
    }
}

fn float(f: f64) -> EvalResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| TemplateErrorKind::eval("arithmetic produced a non-finite number"))
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> EvalResult<Ordering> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| {
        TemplateErrorKind::eval(format!("cannot compare {} with {}", type_name(left), type_name(right)))
    })
}

fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    Ok(match container {
        Value::Null => false,
        Value::String(s) => s.contains(&to_text(item)),
        Value::Array(items) => items.iter().any(|v| loose_eq(v, item)),
        Value::Object(map) => map.contains_key(&to_text(item)),
        other => return Err(TemplateErrorKind::eval(format!("'in' is not supported for {}", type_name(other)))),
    })
}

fn binary(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinOp::Lt => Ok(Value::Bool(compare(left, right)? == Ordering::Less)),
        BinOp::Le => Ok(Value::Bool(compare(left, right)? != Ordering::Greater)),
        BinOp::Gt => Ok(Value::Bool(compare(left, right)? == Ordering::Greater)),
        BinOp::Ge => Ok(Value::Bool(compare(left, right)? != Ordering::Less)),
        BinOp::In => Ok(Value::Bool(contains(right, left)?)),
        BinOp::NotIn => Ok(Value::Bool(!contains(right, left)?)),
        BinOp::Concat => Ok(Value::String(to_text(left) + &to_text(right))),
        BinOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Array(a), Value::Array(b)) => Ok(Value::Array(a.iter().chain(b).cloned().collect())),
            _ => arithmetic(op, left, right),
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, left, right),
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators are evaluated lazily"),
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let (Value::Number(a), Value::Number(b)) = (left, right) else {
        return Err(TemplateErrorKind::eval(format!(
            "unsupported operand types for {op:?}: {} and {}",
            type_name(left),
            type_name(right)
        )));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let int = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Mod if y == 0 => return Err(TemplateErrorKind::eval("modulo by zero")),
            // only i64::MIN % -1 wraps, and its remainder is 0
            BinOp::Mod => Some(x.wrapping_rem_euclid(y)),
            _ => None,
        };
        if let Some(int) = int {
            return Ok(Value::from(int));
        }
    }

    let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
    match op {
        BinOp::Add => float(x + y),
        BinOp::Sub => float(x - y),
        BinOp::Mul => float(x * y),
        BinOp::Div if y == 0.0 => Err(TemplateErrorKind::eval("division by zero")),
        BinOp::Div => float(x / y),
        BinOp::Mod if y == 0.0 => Err(TemplateErrorKind::eval("modulo by zero")),
        BinOp::Mod => float(x.rem_euclid(y)),
        _ => unreachable!("not an arithmetic operator"),
    }
}
