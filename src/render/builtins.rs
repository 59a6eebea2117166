//! Built-in functions and filters

use super::context::Context;
use super::value::Value;
use super::RenderError;
use crate::data::{normalize_choice, resolve_path};
use crate::parser::{Identifier, Spanned};

/// Check the argument count of a function or filter call
fn expect_args(
    name: &Spanned<Identifier>,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), RenderError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("{}", min)
    } else {
        format!("{} to {}", min, max)
    };
    Err(RenderError::Arguments {
        name: name.node.to_string(),
        message: format!("expected {} argument(s), got {}", expected, args.len()),
        span: name.span.clone(),
    })
}

/// `value(item)`: the placeholder for blank items, the item otherwise
fn value_or_placeholder(ctx: &Context<'_>, item: Value) -> Value {
    if item.is_blank() {
        ctx.placeholder()
    } else {
        item
    }
}

pub(super) fn call_function(
    ctx: &Context<'_>,
    name: &Spanned<Identifier>,
    args: Vec<Value>,
) -> Result<Value, RenderError> {
    match name.node.as_str() {
        "checkbox" => {
            expect_args(name, &args, 2, 2)?;
            let group = args[0].to_display();
            let option = args[1].to_display();
            let selected = normalize_choice(
                ctx.data()
                    .get("choices")
                    .and_then(|choices| choices.get(group.as_str())),
            );
            let symbols = &ctx.config().checkbox;
            let symbol = if selected.contains(&option) {
                &symbols.checked
            } else {
                &symbols.unchecked
            };
            Ok(Value::Str(symbol.clone()))
        }
        "value" => {
            expect_args(name, &args, 1, 1)?;
            let mut args = args;
            Ok(value_or_placeholder(ctx, args.remove(0)))
        }
        "field" => {
            expect_args(name, &args, 1, 2)?;
            let path = args[0].to_display();
            match resolve_path(ctx.data(), &path) {
                Some(found) => Ok(value_or_placeholder(ctx, Value::from(found))),
                None => match args.into_iter().nth(1) {
                    Some(default) if !matches!(default, Value::None | Value::Undefined) => {
                        Ok(default)
                    }
                    _ => Ok(ctx.placeholder()),
                },
            }
        }
        _ => Err(RenderError::UnknownFunction {
            name: name.node.to_string(),
            span: name.span.clone(),
        }),
    }
}

fn string_arg(args: &[Value], i: usize) -> String {
    args.get(i).map(Value::to_display).unwrap_or_default()
}

pub(super) fn apply_filter(
    name: &Spanned<Identifier>,
    target: Value,
    args: Vec<Value>,
) -> Result<Value, RenderError> {
    let type_error = || RenderError::Type {
        message: format!(
            "filter '{}' cannot be applied to a value of type {}",
            name.node,
            target.type_name()
        ),
        span: name.span.clone(),
    };

    match name.node.as_str() {
        "default" | "d" => {
            expect_args(name, &args, 0, 2)?;
            let boolean = args.get(1).is_some_and(Value::is_truthy);
            let missing = if boolean {
                !target.is_truthy()
            } else {
                target.is_undefined()
            };
            if missing {
                Ok(args.into_iter().next().unwrap_or(Value::Str(String::new())))
            } else {
                Ok(target)
            }
        }
        "upper" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::Str(target.to_display().to_uppercase()))
        }
        "lower" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::Str(target.to_display().to_lowercase()))
        }
        "capitalize" => {
            expect_args(name, &args, 0, 0)?;
            let text = target.to_display();
            let mut chars = text.chars();
            let capitalized: String = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            };
            Ok(Value::Str(capitalized))
        }
        "trim" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::Str(target.to_display().trim().to_string()))
        }
        "string" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::Str(target.to_display()))
        }
        "length" => {
            expect_args(name, &args, 0, 0)?;
            let len = match &target {
                Value::Undefined | Value::None => 0,
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                _ => return Err(type_error()),
            };
            Ok(Value::Int(len as i64))
        }
        "join" => {
            expect_args(name, &args, 0, 1)?;
            let separator = string_arg(&args, 0);
            match &target {
                Value::List(items) => Ok(Value::Str(
                    items
                        .iter()
                        .map(Value::to_display)
                        .collect::<Vec<_>>()
                        .join(&separator),
                )),
                Value::Undefined | Value::None => Ok(Value::Str(String::new())),
                _ => Err(type_error()),
            }
        }
        "first" | "last" => {
            expect_args(name, &args, 0, 0)?;
            let index = Value::Int(if name.node.as_str() == "first" { 0 } else { -1 });
            match &target {
                Value::List(_) | Value::Str(_) => Ok(target.index(&index)),
                Value::Undefined | Value::None => Ok(Value::Undefined),
                _ => Err(type_error()),
            }
        }
        "replace" => {
            expect_args(name, &args, 2, 2)?;
            let from = string_arg(&args, 0);
            let to = string_arg(&args, 1);
            let text = target.to_display();
            if from.is_empty() {
                return Ok(Value::Str(text));
            }
            Ok(Value::Str(text.replace(&from, &to)))
        }
        _ => Err(RenderError::UnknownFilter {
            name: name.node.to_string(),
            span: name.span.clone(),
        }),
    }
}

/// Evaluate `target is name(args)`
pub(super) fn apply_test(
    name: &Spanned<Identifier>,
    target: &Value,
    args: &[Value],
) -> Result<bool, RenderError> {
    let integer = |value: &Value| match value {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    };

    let arity = if name.node.as_str() == "divisibleby" { 1 } else { 0 };
    expect_args(name, args, arity, arity)?;

    let result = match name.node.as_str() {
        "defined" => !target.is_undefined(),
        "undefined" => target.is_undefined(),
        "none" => matches!(target, Value::None),
        "string" => matches!(target, Value::Str(_)),
        "number" => matches!(target, Value::Int(_) | Value::Float(_)),
        "boolean" => matches!(target, Value::Bool(_)),
        "true" => matches!(target, Value::Bool(true)),
        "false" => matches!(target, Value::Bool(false)),
        "mapping" => matches!(target, Value::Map(_)),
        "sequence" | "iterable" => {
            matches!(target, Value::List(_) | Value::Str(_) | Value::Map(_))
        }
        "even" => integer(target).is_some_and(|i| i % 2 == 0),
        "odd" => integer(target).is_some_and(|i| i % 2 != 0),
        "divisibleby" => match (integer(target), integer(&args[0])) {
            (Some(i), Some(d)) if d != 0 => i % d == 0,
            _ => false,
        },
        _ => {
            return Err(RenderError::UnknownTest {
                name: name.node.to_string(),
                span: name.span.clone(),
            })
        }
    };
    Ok(result)
}
