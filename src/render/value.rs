//! Runtime values produced while evaluating expressions

use std::cmp::Ordering;

use serde_json::{Map, Value as JsonValue};

use crate::parser::{BinaryOp, Literal};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A name that is not bound anywhere
    Undefined,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Map<String, JsonValue>),
    /// Reference to an image declared under `images`
    Image(String),
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::None,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Str(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::Map(map.clone()),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::String(s) => Value::Str(s.clone()),
            Literal::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                Value::Int(*n as i64)
            }
            Literal::Number(n) => Value::Float(*n),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::None => Value::None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::None => "none",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "object",
            Value::Image(_) => "image",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Undefined, none, or a string with nothing but whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Undefined | Value::None => true,
            Value::Str(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Image(_) => true,
        }
    }

    /// Text as it appears in the document (before XML escaping)
    pub fn to_display(&self) -> String {
        match self {
            Value::Undefined | Value::None => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Map(map) => serde_json::to_string(map).unwrap_or_default(),
            Value::Image(name) => name.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Result of `+ - * / // %`, or `None` when the operands do not support `op`
    ///
    /// Integer operands stay integers except under `/` (and on overflow).
    /// `//` and `%` round towards negative infinity. `+` also joins two
    /// strings or two lists. A zero divisor must be rejected by the caller.
    pub fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
        match (op, left, right) {
            (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
                return Some(Value::Str(format!("{}{}", a, b)))
            }
            (BinaryOp::Add, Value::List(a), Value::List(b)) => {
                return Some(Value::List(a.iter().chain(b).cloned().collect()))
            }
            (_, Value::Int(a), Value::Int(b)) => {
                if let Some(i) = int_arithmetic(op, *a, *b) {
                    return Some(Value::Int(i));
                }
            }
            _ => {}
        }

        let (a, b) = (left.as_number()?, right.as_number()?);
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::FloorDiv => (a / b).floor(),
            BinaryOp::Mod => a - b * (a / b).floor(),
            _ => return None,
        };
        Some(Value::Float(result))
    }

    /// Equality used by `==`, `!=` and `in`
    ///
    /// Integers and floats compare numerically; everything else compares
    /// structurally. Undefined equals none.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::None, Value::Undefined | Value::None) => true,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    /// Ordering used by `<`, `<=`, `>`, `>=`
    ///
    /// Only numbers with numbers and strings with strings are ordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => self.as_number()?.partial_cmp(&other.as_number()?),
        }
    }

    /// Member lookup for `a.b` and `a["b"]`
    pub fn attribute(&self, name: &str) -> Value {
        match self {
            Value::Map(map) => map.get(name).map(Value::from).unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    /// Element lookup for `a[i]`; negative indexes count from the end
    pub fn index(&self, index: &Value) -> Value {
        let position = |len: usize| -> Option<usize> {
            let i = match index {
                Value::Int(i) => *i,
                Value::Float(f) if f.fract() == 0.0 => *f as i64,
                _ => return None,
            };
            let i = if i < 0 { len as i64 + i } else { i };
            usize::try_from(i).ok().filter(|i| *i < len)
        };

        match (self, index) {
            (Value::Map(_), Value::Str(key)) => self.attribute(key),
            (Value::List(items), _) => position(items.len())
                .map(|i| items[i].clone())
                .unwrap_or(Value::Undefined),
            (Value::Str(s), _) => {
                let chars: Vec<char> = s.chars().collect();
                position(chars.len())
                    .map(|i| Value::Str(chars[i].to_string()))
                    .unwrap_or(Value::Undefined)
            }
            _ => Value::Undefined,
        }
    }

    /// Items visited by `{% for %}`, or `None` if the value is not iterable
    ///
    /// Objects yield their keys, strings their characters; undefined and
    /// none yield nothing.
    pub fn iter_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Undefined | Value::None => Some(Vec::new()),
            Value::List(items) => Some(items.clone()),
            Value::Map(map) => Some(map.keys().map(|k| Value::Str(k.clone())).collect()),
            Value::Str(s) => Some(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            _ => None,
        }
    }

    /// Membership test for `in`; `None` if `container` cannot hold members
    pub fn contains(container: &Value, item: &Value) -> Option<bool> {
        match container {
            Value::Undefined | Value::None => Some(false),
            Value::List(items) => Some(items.iter().any(|x| x.loose_eq(item))),
            Value::Str(s) => Some(s.contains(&item.to_display())),
            Value::Map(map) => Some(map.contains_key(&item.to_display())),
            _ => None,
        }
    }
}

/// Checked integer arithmetic; `None` on overflow or for `/`
fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::FloorDiv => {
            let q = a.checked_div(b)?;
            if a % b != 0 && (a < 0) != (b < 0) {
                q.checked_sub(1)
            } else {
                Some(q)
            }
        }
        BinaryOp::Mod => {
            let r = a.checked_rem(b)?;
            if r != 0 && (r < 0) != (b < 0) {
                Some(r + b)
            } else {
                Some(r)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from(&json!(3)), Value::Int(3));
        assert_eq!(Value::from(&json!(2.5)), Value::Float(2.5));
        assert_eq!(Value::from(&Literal::Number(4.0)), Value::Int(4));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Undefined.to_display(), "");
        assert_eq!(Value::None.to_display(), "");
        assert_eq!(Value::Bool(false).to_display(), "false");
        assert_eq!(Value::Float(1.5).to_display(), "1.5");
        assert_eq!(Value::Float(3.0).to_display(), "3");
        assert_eq!(
            Value::from(&json!(["a", 1, null])).to_display(),
            "a, 1, "
        );
        assert_eq!(Value::from(&json!({"k": 1})).to_display(), r#"{"k":1}"#);
    }

    #[test]
    fn test_arithmetic() {
        let int = |op, a, b| Value::arithmetic(op, &Value::Int(a), &Value::Int(b));
        assert_eq!(int(BinaryOp::Add, 2, 3), Some(Value::Int(5)));
        assert_eq!(int(BinaryOp::Div, 7, 2), Some(Value::Float(3.5)));
        assert_eq!(int(BinaryOp::FloorDiv, -7, 2), Some(Value::Int(-4)));
        assert_eq!(int(BinaryOp::FloorDiv, 7, -2), Some(Value::Int(-4)));
        assert_eq!(int(BinaryOp::Mod, -7, 3), Some(Value::Int(2)));
        assert_eq!(
            int(BinaryOp::Add, i64::MAX, 1),
            Some(Value::Float(i64::MAX as f64 + 1.0))
        );
        assert_eq!(
            Value::arithmetic(BinaryOp::Mul, &Value::Float(1.5), &Value::Int(2)),
            Some(Value::Float(3.0))
        );
        assert_eq!(
            Value::arithmetic(BinaryOp::Add, &Value::from("a"), &Value::from("b")),
            Some(Value::from("ab"))
        );
        assert_eq!(
            Value::arithmetic(BinaryOp::Sub, &Value::from("a"), &Value::Int(1)),
            None
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Str("0".into()).is_truthy());
        assert!(Value::Image("logo".into()).is_truthy());
    }

    #[test]
    fn test_blank() {
        assert!(Value::Str("  \t".into()).is_blank());
        assert!(Value::None.is_blank());
        assert!(!Value::Int(0).is_blank());
        assert!(!Value::Bool(false).is_blank());
    }

    #[test]
    fn test_loose_eq_numbers() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loose_eq(&Value::Str("1".into())));
        assert!(Value::Undefined.loose_eq(&Value::None));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Float(2.0)), Some(Ordering::Less));
        assert_eq!(
            Value::from("b").compare(&Value::from("a")),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::from("a")), None);
    }

    #[test]
    fn test_index_and_attribute() {
        let list = Value::from(&json!([10, 20, 30]));
        assert_eq!(list.index(&Value::Int(-1)), Value::Int(30));
        assert_eq!(list.index(&Value::Int(3)), Value::Undefined);
        assert_eq!(list.index(&Value::from("x")), Value::Undefined);

        let map = Value::from(&json!({"name": "A", "n": null}));
        assert_eq!(map.attribute("name"), Value::from("A"));
        assert_eq!(map.index(&Value::from("name")), Value::from("A"));
        assert_eq!(map.attribute("n"), Value::None);
        assert_eq!(map.attribute("missing"), Value::Undefined);
        assert_eq!(Value::from("abc").index(&Value::Int(1)), Value::from("b"));
    }

    #[test]
    fn test_iteration() {
        assert_eq!(Value::None.iter_items(), Some(vec![]));
        assert_eq!(
            Value::from(&json!({"a": 1, "b": 2})).iter_items(),
            Some(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(Value::Int(3).iter_items(), None);
    }

    #[test]
    fn test_contains() {
        let list = Value::from(&json!(["x", 2]));
        assert_eq!(Value::contains(&list, &Value::Float(2.0)), Some(true));
        assert_eq!(Value::contains(&Value::from("hello"), &Value::from("ell")), Some(true));
        assert_eq!(Value::contains(&Value::Undefined, &Value::from("a")), Some(false));
        assert_eq!(Value::contains(&Value::Bool(true), &Value::from("a")), None);
    }
}
