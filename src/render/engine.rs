//! Tree-walking evaluator

use std::collections::HashMap;

use serde_json::{json, Map};

use super::builtins::{apply_filter, apply_test, call_function};
use super::context::Context;
use super::value::Value;
use super::{MediaSink, RenderError};
use crate::docx::image::ImageError;
use crate::docx::xml::escape_run_text;
use crate::parser::{BinaryOp, Expr, ForBlock, IfBlock, Node, Spanned, Template};

/// Render a template to part XML
pub fn render(
    template: &Template,
    context: &Context<'_>,
    media: &mut dyn MediaSink,
) -> Result<String, RenderError> {
    let mut renderer = Renderer {
        context,
        media,
        scopes: vec![HashMap::new()],
        out: String::new(),
    };
    renderer.render_nodes(&template.nodes)?;
    Ok(renderer.out)
}

struct Renderer<'r, 'c> {
    context: &'r Context<'c>,
    media: &'r mut dyn MediaSink,
    /// Innermost scope last
    scopes: Vec<HashMap<String, Value>>,
    out: String,
}

/// Human-readable name of the value an expression refers to
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Variable(name) => name.to_string(),
        Expr::Attribute { target, name } => format!("{}.{}", describe(&target.node), name),
        Expr::Index { target, .. } => format!("{}[...]", describe(&target.node)),
        _ => "expression".to_string(),
    }
}

impl Renderer<'_, '_> {
    fn render_nodes(&mut self, nodes: &[Spanned<Node>]) -> Result<(), RenderError> {
        for node in nodes {
            match &node.node {
                Node::Text(text) => self.out.push_str(text),
                Node::Output(expr) => {
                    let value = self.eval(expr)?;
                    self.write_value(value, expr)?;
                }
                Node::If(block) => self.render_if(block)?,
                Node::For(block) => self.render_for(block)?,
                Node::Set(decl) => {
                    let value = self.eval(&decl.value)?;
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.insert(decl.name.node.to_string(), value);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_value(&mut self, value: Value, expr: &Spanned<Expr>) -> Result<(), RenderError> {
        match value {
            Value::Undefined => {
                let name = describe(&expr.node);
                if self.context.config().strict {
                    return Err(RenderError::Undefined {
                        name,
                        span: expr.span.clone(),
                    });
                }
                tracing::warn!(variable = %name, "undefined value rendered as empty text");
            }
            Value::Image(name) => {
                let markup = match self.context.image(&name) {
                    Some(spec) => self.media.embed_image(&name, spec),
                    None => Err(ImageError::Undeclared { name: name.clone() }),
                };
                let markup = markup.map_err(|source| RenderError::Image {
                    name,
                    span: expr.span.clone(),
                    source,
                })?;
                self.out.push_str(&markup);
            }
            other => self.out.push_str(&escape_run_text(&other.to_display())),
        }
        Ok(())
    }

    fn render_if(&mut self, block: &IfBlock) -> Result<(), RenderError> {
        for branch in &block.branches {
            if self.eval(&branch.condition)?.is_truthy() {
                return self.render_nodes(&branch.body);
            }
        }
        match &block.otherwise {
            Some(body) => self.render_nodes(body),
            None => Ok(()),
        }
    }

    fn render_for(&mut self, block: &ForBlock) -> Result<(), RenderError> {
        let iterable = self.eval(&block.iterable)?;
        if iterable.is_undefined() && self.context.config().strict {
            return Err(RenderError::Undefined {
                name: describe(&block.iterable.node),
                span: block.iterable.span.clone(),
            });
        }
        let items = iterable.iter_items().ok_or_else(|| RenderError::Type {
            message: format!("cannot loop over a value of type {}", iterable.type_name()),
            span: block.iterable.span.clone(),
        })?;

        if items.is_empty() {
            if let Some(body) = &block.otherwise {
                self.render_nodes(body)?;
            }
            return Ok(());
        }

        let length = items.len();
        for (i, item) in items.into_iter().enumerate() {
            let mut info = Map::new();
            info.insert("index".to_string(), json!(i + 1));
            info.insert("index0".to_string(), json!(i));
            info.insert("revindex".to_string(), json!(length - i));
            info.insert("revindex0".to_string(), json!(length - i - 1));
            info.insert("first".to_string(), json!(i == 0));
            info.insert("last".to_string(), json!(i + 1 == length));
            info.insert("length".to_string(), json!(length));

            let mut scope = HashMap::new();
            scope.insert("loop".to_string(), Value::Map(info));
            scope.insert(block.variable.node.to_string(), item);

            self.scopes.push(scope);
            let result = self.render_nodes(&block.body);
            self.scopes.pop();
            result?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .unwrap_or_else(|| self.context.lookup(name))
    }

    fn eval_all(&mut self, exprs: &[Spanned<Expr>]) -> Result<Vec<Value>, RenderError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval(&mut self, expr: &Spanned<Expr>) -> Result<Value, RenderError> {
        match &expr.node {
            Expr::Literal(literal) => Ok(Value::from(literal)),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Variable(name) => Ok(self.lookup(name.as_str())),
            Expr::Attribute { target, name } => Ok(self.eval(target)?.attribute(name.as_str())),
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(target.index(&index))
            }
            Expr::Call { function, args } => {
                let args = self.eval_all(args)?;
                call_function(self.context, function, args)
            }
            Expr::Filter { target, name, args } => {
                let target = self.eval(target)?;
                let args = self.eval_all(args)?;
                apply_filter(name, target, args)
            }
            Expr::Test {
                target,
                name,
                args,
                negated,
            } => {
                let target = self.eval(target)?;
                let args = self.eval_all(args)?;
                Ok(Value::Bool(apply_test(name, &target, &args)? != *negated))
            }
            Expr::Neg(operand) => match self.eval(operand)? {
                Value::Undefined => Err(RenderError::Undefined {
                    name: describe(&operand.node),
                    span: operand.span.clone(),
                }),
                Value::Int(i) => Ok(i
                    .checked_neg()
                    .map(Value::Int)
                    .unwrap_or(Value::Float(-(i as f64)))),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(RenderError::Type {
                    message: format!("cannot negate a value of type {}", other.type_name()),
                    span: expr.span.clone(),
                }),
            },
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, &expr.span),
            Expr::Conditional {
                then,
                condition,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    match otherwise {
                        Some(otherwise) => self.eval(otherwise),
                        None => Ok(Value::None),
                    }
                }
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
        span: &std::ops::Range<usize>,
    ) -> Result<Value, RenderError> {
        // Short-circuit operators yield one of their operands
        match op {
            BinaryOp::And => {
                let left = self.eval(lhs)?;
                return if left.is_truthy() { self.eval(rhs) } else { Ok(left) };
            }
            BinaryOp::Or => {
                let left = self.eval(lhs)?;
                return if left.is_truthy() { Ok(left) } else { self.eval(rhs) };
            }
            _ => {}
        }

        let left = self.eval(lhs)?;
        let right = self.eval(rhs)?;
        let type_error = |left: &Value, right: &Value| RenderError::Type {
            message: format!(
                "cannot apply '{}' to {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
            span: span.clone(),
        };

        if op.is_arithmetic() {
            // Undefined operands are an error in both modes
            for (value, side) in [(&left, lhs), (&right, rhs)] {
                if value.is_undefined() {
                    return Err(RenderError::Undefined {
                        name: describe(&side.node),
                        span: side.span.clone(),
                    });
                }
            }
            let divides = matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod);
            if divides && right.as_number() == Some(0.0) {
                return Err(RenderError::Type {
                    message: "division by zero".to_string(),
                    span: span.clone(),
                });
            }
            return Value::arithmetic(op, &left, &right).ok_or_else(|| type_error(&left, &right));
        }

        let result = match op {
            BinaryOp::Eq => left.loose_eq(&right),
            BinaryOp::Ne => !left.loose_eq(&right),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = left
                    .compare(&right)
                    .ok_or_else(|| type_error(&left, &right))?;
                match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }
            }
            BinaryOp::In | BinaryOp::NotIn => {
                let found =
                    Value::contains(&right, &left).ok_or_else(|| type_error(&left, &right))?;
                found == (op == BinaryOp::In)
            }
            BinaryOp::Concat => {
                return Ok(Value::Str(left.to_display() + &right.to_display()));
            }
            BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::FloorDiv
            | BinaryOp::Mod => unreachable!("handled above"),
        };
        Ok(Value::Bool(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FillConfig;
    use crate::docx::image::{ImageSource, ImageSpec};
    use crate::parser::parse;
    use serde_json::json;

    /// Records embedded images instead of touching a package
    #[derive(Default)]
    struct RecordingSink {
        embedded: Vec<String>,
    }

    impl MediaSink for RecordingSink {
        fn embed_image(&mut self, name: &str, _spec: &ImageSpec) -> Result<String, ImageError> {
            self.embedded.push(name.to_string());
            Ok(format!("[image:{}]", name))
        }
    }

    fn render_with(
        source: &str,
        data: serde_json::Value,
        config: FillConfig,
    ) -> Result<String, RenderError> {
        let template = parse(source).expect("template should parse");
        let ctx = Context::new(&data, &config);
        render(&template, &ctx, &mut RecordingSink::default())
    }

    fn render_str(source: &str, data: serde_json::Value) -> String {
        render_with(source, data, FillConfig::default()).expect("render should succeed")
    }

    #[test]
    fn test_text_is_copied_verbatim() {
        let xml = r#"<w:p><w:r><w:t xml:space="preserve">a &amp; b</w:t></w:r></w:p>"#;
        assert_eq!(render_str(xml, json!({})), xml);
    }

    #[test]
    fn test_output_is_escaped() {
        assert_eq!(
            render_str("<w:t>{{ name }}</w:t>", json!({"name": "A & <B>"})),
            "<w:t>A &amp; &lt;B&gt;</w:t>"
        );
    }

    #[test]
    fn test_output_newline_becomes_break() {
        assert_eq!(
            render_str("{{ text }}", json!({"text": "a\nb"})),
            "a</w:t><w:br/><w:t xml:space=\"preserve\">b"
        );
    }

    #[test]
    fn test_scalar_rendering() {
        let data = json!({"n": null, "t": true, "i": 42, "f": 2.5, "l": ["x", "y"]});
        assert_eq!(render_str("{{ n }}|{{ t }}|{{ i }}|{{ f }}|{{ l }}", data), "|true|42|2.5|x, y");
    }

    #[test]
    fn test_checkbox_and_field() {
        let data = json!({
            "choices": {"basis": ["charter"]},
            "company": {"name": "Acme"}
        });
        assert_eq!(
            render_str(
                r#"{{ checkbox("basis", "charter") }}{{ checkbox("basis", "proxy") }} {{ field("company.name") }} {{ field("company.inn") }}"#,
                data
            ),
            "☑☐ Acme —"
        );
    }

    #[test]
    fn test_if_elif_else() {
        let source = "{% if kind == 'a' %}A{% elif kind == 'b' %}B{% else %}C{% endif %}";
        assert_eq!(render_str(source, json!({"kind": "a"})), "A");
        assert_eq!(render_str(source, json!({"kind": "b"})), "B");
        assert_eq!(render_str(source, json!({"kind": "z"})), "C");
        assert_eq!(render_str(source, json!({})), "C");
    }

    #[test]
    fn test_for_loop_variables() {
        let source = "{% for x in items %}{{ loop.index }}:{{ x }}{% if not loop.last %},{% endif %}{% endfor %}";
        assert_eq!(render_str(source, json!({"items": ["a", "b", "c"]})), "1:a,2:b,3:c");
    }

    #[test]
    fn test_for_else_on_empty() {
        let source = "{% for x in items %}{{ x }}{% else %}none{% endfor %}";
        assert_eq!(render_str(source, json!({"items": []})), "none");
        assert_eq!(render_str(source, json!({})), "none");
    }

    #[test]
    fn test_for_over_object_keys() {
        let source = "{% for k in obj %}{{ k }}={{ obj[k] }};{% endfor %}";
        assert_eq!(render_str(source, json!({"obj": {"a": 1, "b": 2}})), "a=1;b=2;");
    }

    #[test]
    fn test_for_over_number_is_error() {
        let err = render_with("{% for x in n %}{% endfor %}", json!({"n": 3}), FillConfig::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::Type { .. }));
    }

    #[test]
    fn test_set_and_loop_scope() {
        let source = "{% set greeting = 'Hi ' ~ name %}{{ greeting }}{% for x in [1] %}{% set inner = x %}{% endfor %}{{ inner | default('-') }}";
        assert_eq!(render_str(source, json!({"name": "Ann"})), "Hi Ann-");
    }

    #[test]
    fn test_undefined_lenient_and_strict() {
        assert_eq!(render_str("[{{ missing }}]", json!({})), "[]");
        let err = render_with("{{ a.b }}", json!({"a": {}}), FillConfig::default().with_strict(true))
            .unwrap_err();
        match err {
            RenderError::Undefined { name, span } => {
                assert_eq!(name, "a.b");
                assert_eq!(span, 3..6);
            }
            other => panic!("Expected undefined error, got {:?}", other),
        }
    }

    #[test]
    fn test_strict_allows_default_filter() {
        let result = render_with(
            "{{ missing | default('x') }}{% if missing %}y{% endif %}",
            json!({}),
            FillConfig::default().with_strict(true),
        );
        assert_eq!(result.expect("should render"), "x");
    }

    #[test]
    fn test_operators() {
        let data = json!({"n": 5, "tags": ["vip"], "name": "Bob"});
        assert_eq!(render_str("{{ n > 3 and n <= 5 }}", data.clone()), "true");
        assert_eq!(render_str("{{ 'vip' in tags }}", data.clone()), "true");
        assert_eq!(render_str("{{ 'new' not in tags }}", data.clone()), "true");
        assert_eq!(render_str("{{ name or 'anon' }}", data.clone()), "Bob");
        assert_eq!(render_str("{{ missing or 'anon' }}", data.clone()), "anon");
        assert_eq!(render_str("{{ 'big' if n > 10 else 'small' }}", data.clone()), "small");
        assert_eq!(render_str("{{ name ~ '-' ~ n }}", data), "Bob-5");
    }

    #[test]
    fn test_arithmetic_operators() {
        let data = json!({"n": 7, "price": 2.5, "items": ["a", "b"]});
        assert_eq!(render_str("{{ n + 1 }}|{{ n - 10 }}|{{ n * 2 }}", data.clone()), "8|-3|14");
        assert_eq!(render_str("{{ n / 2 }}|{{ n // 2 }}|{{ n % 3 }}", data.clone()), "3.5|3|1");
        assert_eq!(render_str("{{ price * 2 + 1 }}|{{ -n }}", data.clone()), "6|-7");
        assert_eq!(render_str("{{ 'No. ' ~ (n + 1) }}", data.clone()), "No. 8");
        let source = "{% for x in items %}{{ loop.index0 + 10 }}{% endfor %}";
        assert_eq!(render_str(source, data), "1011");
    }

    #[test]
    fn test_arithmetic_errors() {
        let err = render_with("{{ n / 0 }}", json!({"n": 1}), FillConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "division by zero");

        let err = render_with("{{ missing + 1 }}", json!({}), FillConfig::default()).unwrap_err();
        assert!(matches!(err, RenderError::Undefined { ref name, .. } if name == "missing"));

        let err = render_with("{{ 'a' - 1 }}", json!({}), FillConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply '-' to string and number");
    }

    #[test]
    fn test_is_tests() {
        let source = "{% if x is defined %}D{% endif %}{% if y is not defined %}U{% endif %}{% if z is none %}N{% endif %}{% if x is number and x is odd %}O{% endif %}";
        assert_eq!(render_str(source, json!({"x": 3, "z": null})), "DUNO");
    }

    #[test]
    fn test_is_defined_in_strict_mode() {
        let result = render_with(
            "{% if missing is defined %}yes{% else %}no{% endif %}",
            json!({}),
            FillConfig::default().with_strict(true),
        );
        assert_eq!(result.expect("should render"), "no");
    }

    #[test]
    fn test_unicode_variable() {
        assert_eq!(render_str("{{ фамилия }}", json!({"фамилия": "Иванов"})), "Иванов");
    }

    #[test]
    fn test_compare_mismatched_types_is_error() {
        let err = render_with("{{ 1 < 'a' }}", json!({}), FillConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply '<' to number and string");
    }

    #[test]
    fn test_image_goes_through_sink() {
        let data = json!({});
        let config = FillConfig::default();
        let spec = ImageSpec {
            source: ImageSource::Path("logo.png".into()),
            width_mm: None,
            height_mm: None,
        };
        let ctx = Context::new(&data, &config).with_images([("logo".to_string(), spec)]);
        let template = parse("<w:t>{{ logo }}</w:t>").expect("parse");
        let mut sink = RecordingSink::default();
        let out = render(&template, &ctx, &mut sink).expect("render");
        assert_eq!(out, "<w:t>[image:logo]</w:t>");
        assert_eq!(sink.embedded, vec!["logo"]);
    }

    #[test]
    fn test_unknown_function_span() {
        let err = render_with("ab{{ nope(1) }}", json!({}), FillConfig::default()).unwrap_err();
        assert_eq!(err.span(), &(5..9));
    }
}
