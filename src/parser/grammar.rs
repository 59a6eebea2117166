//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::{lex, Token};

type Extra<'a> = extra::Err<Rich<'a, Token>>;

/// Helper enum for parsing postfix accessors
#[derive(Debug, Clone)]
enum Accessor {
    Attribute(Spanned<Identifier>),
    /// Index expression plus the span up to the closing bracket
    Index(Spanned<Expr>, Span),
}

/// Helper enum for the filter/test chain after an accessed value
#[derive(Debug, Clone)]
enum Suffix {
    Filter {
        name: Spanned<Identifier>,
        args: Vec<Spanned<Expr>>,
        span: Span,
    },
    Test {
        name: Spanned<Identifier>,
        args: Vec<Spanned<Expr>>,
        negated: bool,
        span: Span,
    },
}

/// Parse a (pre-processed) document part into a template tree
pub fn parse(input: &str) -> Result<Template, Vec<crate::ParseError>> {
    let len = input.len();

    let tokens = lex(input).map_err(|e| vec![e])?;
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    template_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

/// Left-fold a chain of binary operations into a single expression
fn fold_binary(first: Spanned<Expr>, rest: Vec<(BinaryOp, Spanned<Expr>)>) -> Spanned<Expr> {
    rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let span = join_spans(&lhs.span, &rhs.span);
        Spanned::new(
            Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    })
}

fn identifier<'a, I>() -> impl Parser<'a, I, Spanned<Identifier>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    select! {
        Token::Ident(s) => Identifier::new(s),
    }
    .map_with(|id, e| Spanned::new(id, span_range(&e.span())))
}

/// `{% keyword` - the start of a statement tag
fn tag_start<'a, I>(keyword: Token) -> impl Parser<'a, I, (), Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    just(Token::StmtOpen).ignore_then(just(keyword)).ignored()
}

/// `{% keyword %}` - a statement tag without arguments
fn bare_tag<'a, I>(keyword: Token) -> impl Parser<'a, I, (), Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    tag_start(keyword).then_ignore(just(Token::StmtClose))
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Spanned<Expr>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = choice((
            select! { Token::String(s) => Literal::String(s) },
            // Negative numbers are folded in by the unary level
            select! { Token::Number(n) => Literal::Number(n) },
            just(Token::True).to(Literal::Bool(true)),
            just(Token::False).to(Literal::Bool(false)),
            just(Token::None).to(Literal::None),
        ))
        .map(Expr::Literal);

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        // Call must be tried before a bare variable
        let call = identifier()
            .then(args.clone())
            .map(|(function, args)| Expr::Call { function, args });

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        let atom = choice((
            literal,
            call,
            identifier().map(|id| Expr::Variable(id.node)),
            list,
        ))
        .map_with(|node, e| Spanned::new(node, span_range(&e.span())))
        .or(expr
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)))
        .boxed();

        // Postfix accessors: a.b, a[0], a["key"]
        let accessor = choice((
            just(Token::Dot)
                .ignore_then(identifier())
                .map(Accessor::Attribute),
            expr.clone()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map_with(|index, e| Accessor::Index(index, span_range(&e.span()))),
        ));

        let accessed = atom
            .then(accessor.repeated().collect::<Vec<_>>())
            .map(|(base, accessors)| {
                accessors
                    .into_iter()
                    .fold(base, |target, accessor| match accessor {
                        Accessor::Attribute(name) => {
                            let span = join_spans(&target.span, &name.span);
                            Spanned::new(
                                Expr::Attribute {
                                    target: Box::new(target),
                                    name: name.node,
                                },
                                span,
                            )
                        }
                        Accessor::Index(index, close) => {
                            let span = join_spans(&target.span, &close);
                            Spanned::new(
                                Expr::Index {
                                    target: Box::new(target),
                                    index: Box::new(index),
                                },
                                span,
                            )
                        }
                    })
            });

        // Filters and tests: value | upper | default("x"), value is not none
        let filter = just(Token::Pipe)
            .ignore_then(identifier())
            .then(args.clone().or_not())
            .map_with(|(name, args), e| Suffix::Filter {
                name,
                args: args.unwrap_or_default(),
                span: span_range(&e.span()),
            });

        // `none`, `true` and `false` lex as keywords but also name tests
        let test_name = identifier().or(select! {
            Token::None => "none",
            Token::True => "true",
            Token::False => "false",
        }
        .map_with(|name, e| Spanned::new(Identifier::new(name), span_range(&e.span()))));

        let test = just(Token::Is)
            .ignore_then(just(Token::Not).or_not())
            .then(test_name)
            .then(args.or_not())
            .map_with(|((not, name), args), e| Suffix::Test {
                name,
                args: args.unwrap_or_default(),
                negated: not.is_some(),
                span: span_range(&e.span()),
            });

        let filtered = accessed
            .then(choice((filter, test)).repeated().collect::<Vec<_>>())
            .map(|(base, suffixes)| {
                suffixes.into_iter().fold(base, |target, suffix| match suffix {
                    Suffix::Filter { name, args, span } => {
                        let span = join_spans(&target.span, &span);
                        Spanned::new(
                            Expr::Filter {
                                target: Box::new(target),
                                name,
                                args,
                            },
                            span,
                        )
                    }
                    Suffix::Test {
                        name,
                        args,
                        negated,
                        span,
                    } => {
                        let span = join_spans(&target.span, &span);
                        Spanned::new(
                            Expr::Test {
                                target: Box::new(target),
                                name,
                                args,
                                negated,
                            },
                            span,
                        )
                    }
                })
            });

        let unary = just(Token::Minus)
            .map_with(|_, e| span_range(&e.span()))
            .repeated()
            .collect::<Vec<_>>()
            .then(filtered)
            .map(|(minuses, operand)| {
                minuses.into_iter().rev().fold(operand, |inner, minus| {
                    let span = join_spans(&minus, &inner.span);
                    match inner.node {
                        Expr::Literal(Literal::Number(n)) => {
                            Spanned::new(Expr::Literal(Literal::Number(-n)), span)
                        }
                        node => Spanned::new(
                            Expr::Neg(Box::new(Spanned::new(node, inner.span))),
                            span,
                        ),
                    }
                })
            })
            .boxed();

        let product = unary
            .clone()
            .then(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::DoubleSlash).to(BinaryOp::FloorDiv),
                    just(Token::Slash).to(BinaryOp::Div),
                    just(Token::Percent).to(BinaryOp::Mod),
                ))
                .then(unary)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest));

        let concat = product
            .clone()
            .then(
                just(Token::Tilde)
                    .to(BinaryOp::Concat)
                    .then(product)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let sum = concat
            .clone()
            .then(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(concat)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest));

        let compare_op = choice((
            just(Token::Eq).to(BinaryOp::Eq),
            just(Token::Ne).to(BinaryOp::Ne),
            just(Token::Le).to(BinaryOp::Le),
            just(Token::Ge).to(BinaryOp::Ge),
            just(Token::Lt).to(BinaryOp::Lt),
            just(Token::Gt).to(BinaryOp::Gt),
            just(Token::Not)
                .then(just(Token::In))
                .to(BinaryOp::NotIn),
            just(Token::In).to(BinaryOp::In),
        ));

        let comparison = sum
            .clone()
            .then(compare_op.then(sum).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let negation = just(Token::Not)
            .map_with(|_, e| span_range(&e.span()))
            .repeated()
            .collect::<Vec<_>>()
            .then(comparison)
            .map(|(nots, operand)| {
                nots.into_iter().rev().fold(operand, |inner, not_span| {
                    let span = join_spans(&not_span, &inner.span);
                    Spanned::new(Expr::Not(Box::new(inner)), span)
                })
            });

        let conjunction = negation
            .clone()
            .then(
                just(Token::And)
                    .to(BinaryOp::And)
                    .then(negation)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest));

        let disjunction = conjunction
            .clone()
            .then(
                just(Token::Or)
                    .to(BinaryOp::Or)
                    .then(conjunction)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        // Inline conditional: "yes" if flag else "no"
        disjunction
            .clone()
            .then(
                just(Token::If)
                    .ignore_then(disjunction.clone())
                    .then(just(Token::Else).ignore_then(disjunction).or_not())
                    .or_not(),
            )
            .map(|(then, conditional)| match conditional {
                None => then,
                Some((condition, otherwise)) => {
                    let end = otherwise
                        .as_ref()
                        .map(|o| o.span.end)
                        .unwrap_or(condition.span.end);
                    let span = then.span.start..end;
                    Spanned::new(
                        Expr::Conditional {
                            then: Box::new(then),
                            condition: Box::new(condition),
                            otherwise: otherwise.map(Box::new),
                        },
                        span,
                    )
                }
            })
            .boxed()
    })
}

fn template_parser<'a, I>() -> impl Parser<'a, I, Template, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let expr = expr_parser();

    let body = recursive(|body| {
        let text = select! { Token::Text(s) => Node::Text(s) };

        let output = expr
            .clone()
            .delimited_by(just(Token::OutputOpen), just(Token::OutputClose))
            .map(Node::Output);

        let elif_branch = tag_start(Token::Elif)
            .ignore_then(expr.clone())
            .then_ignore(just(Token::StmtClose))
            .then(body.clone())
            .map(|(condition, body)| IfBranch { condition, body });

        let if_block = tag_start(Token::If)
            .ignore_then(expr.clone())
            .then_ignore(just(Token::StmtClose))
            .then(body.clone())
            .then(elif_branch.repeated().collect::<Vec<_>>())
            .then(bare_tag(Token::Else).ignore_then(body.clone()).or_not())
            .then_ignore(bare_tag(Token::EndIf))
            .map(|(((condition, body), elifs), otherwise)| {
                let mut branches = vec![IfBranch { condition, body }];
                branches.extend(elifs);
                Node::If(IfBlock {
                    branches,
                    otherwise,
                })
            });

        let for_block = tag_start(Token::For)
            .ignore_then(identifier())
            .then_ignore(just(Token::In))
            .then(expr.clone())
            .then_ignore(just(Token::StmtClose))
            .then(body.clone())
            .then(bare_tag(Token::Else).ignore_then(body.clone()).or_not())
            .then_ignore(bare_tag(Token::EndFor))
            .map(|(((variable, iterable), body), otherwise)| {
                Node::For(ForBlock {
                    variable,
                    iterable,
                    body,
                    otherwise,
                })
            });

        let set_decl = tag_start(Token::Set)
            .ignore_then(identifier())
            .then_ignore(just(Token::Assign))
            .then(expr.clone())
            .then_ignore(just(Token::StmtClose))
            .map(|(name, value)| Node::Set(SetDecl { name, value }));

        choice((text, output, if_block, for_block, set_decl))
            .map_with(|node, e| Spanned::new(node, span_range(&e.span())))
            .repeated()
            .collect::<Vec<_>>()
            .boxed()
    });

    body.then_ignore(end()).map(|nodes| Template { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_expr(source: &str) -> Expr {
        let template = parse(source).expect("Should parse");
        assert_eq!(template.nodes.len(), 1);
        match &template.nodes[0].node {
            Node::Output(expr) => expr.node.clone(),
            other => panic!("Expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_plain_text() {
        let template = parse("<w:t>Hello</w:t>").expect("Should parse");
        assert_eq!(
            template.nodes[0].node,
            Node::Text("<w:t>Hello</w:t>".to_string())
        );
    }

    #[test]
    fn test_parse_empty_source() {
        let template = parse("").expect("Should parse");
        assert!(template.nodes.is_empty());
    }

    #[test]
    fn test_parse_variable() {
        assert_eq!(
            output_expr("{{ full_name }}"),
            Expr::Variable(Identifier::new("full_name"))
        );
    }

    #[test]
    fn test_parse_call() {
        match output_expr(r#"{{ checkbox("basis", "charter") }}"#) {
            Expr::Call { function, args } => {
                assert_eq!(function.node.as_str(), "checkbox");
                assert_eq!(args.len(), 2);
                assert_eq!(
                    args[1].node,
                    Expr::Literal(Literal::String("charter".to_string()))
                );
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_attribute_and_index_chain() {
        match output_expr("{{ company.founders[0].name }}") {
            Expr::Attribute { target, name } => {
                assert_eq!(name.as_str(), "name");
                match target.node {
                    Expr::Index { target, index } => {
                        assert_eq!(index.node, Expr::Literal(Literal::Number(0.0)));
                        assert!(matches!(target.node, Expr::Attribute { .. }));
                    }
                    other => panic!("Expected index, got {:?}", other),
                }
            }
            other => panic!("Expected attribute, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_filter_with_args() {
        match output_expr(r#"{{ name | default("n/a") | upper }}"#) {
            Expr::Filter { target, name, args } => {
                assert_eq!(name.node.as_str(), "upper");
                assert!(args.is_empty());
                assert!(matches!(target.node, Expr::Filter { .. }));
            }
            other => panic!("Expected filter, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        // not binds tighter than and, and tighter than or
        match output_expr("{{ a or not b and c }}") {
            Expr::Binary { op, lhs, rhs } => {
                assert_eq!(op, BinaryOp::Or);
                assert_eq!(lhs.node, Expr::Variable(Identifier::new("a")));
                match rhs.node {
                    Expr::Binary { op, lhs, .. } => {
                        assert_eq!(op, BinaryOp::And);
                        assert!(matches!(lhs.node, Expr::Not(_)));
                    }
                    other => panic!("Expected and, got {:?}", other),
                }
            }
            other => panic!("Expected or, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_in() {
        match output_expr(r#"{{ "x" not in items }}"#) {
            Expr::Binary { op, .. } => assert_eq!(op, BinaryOp::NotIn),
            other => panic!("Expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_number_and_list() {
        assert_eq!(
            output_expr("{{ [1, -2, 'a'] }}"),
            Expr::List(vec![
                Spanned::new(Expr::Literal(Literal::Number(1.0)), 4..5),
                Spanned::new(Expr::Literal(Literal::Number(-2.0)), 7..9),
                Spanned::new(Expr::Literal(Literal::String("a".to_string())), 11..14),
            ])
        );
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        match output_expr("{{ a + b * 2 }}") {
            Expr::Binary { op, lhs, rhs } => {
                assert_eq!(op, BinaryOp::Add);
                assert_eq!(lhs.node, Expr::Variable(Identifier::new("a")));
                assert!(matches!(
                    rhs.node,
                    Expr::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_subtraction_and_loop_index() {
        match output_expr("{{ n - 1 }}") {
            Expr::Binary { op, rhs, .. } => {
                assert_eq!(op, BinaryOp::Sub);
                assert_eq!(rhs.node, Expr::Literal(Literal::Number(1.0)));
            }
            other => panic!("Expected subtraction, got {:?}", other),
        }
        assert!(matches!(
            output_expr("{{ loop.index + 1 }}"),
            Expr::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_comparison_below_arithmetic() {
        match output_expr("{{ n % 2 == 0 }}") {
            Expr::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::Eq);
                assert!(matches!(
                    lhs.node,
                    Expr::Binary {
                        op: BinaryOp::Mod,
                        ..
                    }
                ));
            }
            other => panic!("Expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unary_minus() {
        match output_expr("{{ -total }}") {
            Expr::Neg(inner) => {
                assert_eq!(inner.node, Expr::Variable(Identifier::new("total")));
            }
            other => panic!("Expected negation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tests() {
        let template = parse("{% if x is defined %}y{% endif %}").expect("Should parse");
        match &template.nodes[0].node {
            Node::If(block) => match &block.branches[0].condition.node {
                Expr::Test { name, negated, .. } => {
                    assert_eq!(name.node.as_str(), "defined");
                    assert!(!negated);
                }
                other => panic!("Expected test, got {:?}", other),
            },
            other => panic!("Expected if, got {:?}", other),
        }

        match output_expr("{{ x is not none }}") {
            Expr::Test { name, negated, .. } => {
                assert_eq!(name.node.as_str(), "none");
                assert!(negated);
            }
            other => panic!("Expected test, got {:?}", other),
        }

        match output_expr("{{ n is divisibleby(3) }}") {
            Expr::Test { args, .. } => assert_eq!(args.len(), 1),
            other => panic!("Expected test, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unicode_variable() {
        assert_eq!(
            output_expr("{{ фамилия }}"),
            Expr::Variable(Identifier::new("фамилия"))
        );
    }

    #[test]
    fn test_parse_inline_conditional() {
        match output_expr(r#"{{ "Yes" if resident else "No" }}"#) {
            Expr::Conditional {
                condition,
                otherwise,
                ..
            } => {
                assert_eq!(condition.node, Expr::Variable(Identifier::new("resident")));
                assert!(otherwise.is_some());
            }
            other => panic!("Expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_parenthesized() {
        match output_expr("{{ (a or b) and c }}") {
            Expr::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::And);
                assert!(matches!(
                    lhs.node,
                    Expr::Binary {
                        op: BinaryOp::Or,
                        ..
                    }
                ));
            }
            other => panic!("Expected and, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_elif_else() {
        let template =
            parse("{% if a %}A{% elif b %}B{% elif c %}C{% else %}D{% endif %}").expect("Should parse");
        assert_eq!(template.nodes.len(), 1);
        match &template.nodes[0].node {
            Node::If(block) => {
                assert_eq!(block.branches.len(), 3);
                assert_eq!(
                    block.branches[1].body[0].node,
                    Node::Text("B".to_string())
                );
                let otherwise = block.otherwise.as_ref().expect("else branch");
                assert_eq!(otherwise[0].node, Node::Text("D".to_string()));
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested_blocks() {
        let source = "{% for p in people %}{% if p.active %}{{ p.name }}{% endif %}{% endfor %}";
        let template = parse(source).expect("Should parse");
        match &template.nodes[0].node {
            Node::For(block) => {
                assert_eq!(block.variable.node.as_str(), "p");
                assert!(block.otherwise.is_none());
                assert!(matches!(block.body[0].node, Node::If(_)));
            }
            other => panic!("Expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_else() {
        let template =
            parse("{% for x in xs %}{{ x }}{% else %}none{% endfor %}").expect("Should parse");
        match &template.nodes[0].node {
            Node::For(block) => assert!(block.otherwise.is_some()),
            other => panic!("Expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set() {
        let template = parse("{% set total = 3 %}{{ total }}").expect("Should parse");
        assert_eq!(template.nodes.len(), 2);
        match &template.nodes[0].node {
            Node::Set(decl) => assert_eq!(decl.name.node.as_str(), "total"),
            other => panic!("Expected set, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_node_spans() {
        let template = parse("ab{{ x }}cd").expect("Should parse");
        assert_eq!(template.nodes[0].span, 0..2);
        assert_eq!(template.nodes[1].span, 2..9);
        assert_eq!(template.nodes[2].span, 9..11);
    }

    #[test]
    fn test_parse_missing_endif_fails() {
        let errors = parse("{% if a %}text").unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_parse_stray_endfor_fails() {
        let errors = parse("text{% endfor %}").unwrap_err();
        assert!(!errors.is_empty());
        assert!(errors[0].to_string().contains("Unexpected"));
    }

    #[test]
    fn test_parse_empty_output_fails() {
        assert!(parse("{{ }}").is_err());
    }

    #[test]
    fn test_parse_unclosed_tag_reported() {
        let errors = parse("{{ name").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], crate::ParseError::Unclosed { .. }));
    }
}
