//! Lexer for template tags using logos
//!
//! A template is mostly raw document XML with `{{ ... }}`, `{% ... %}` and
//! `{# ... #}` tags embedded in it. [`lex`] walks the raw text itself and
//! hands the inside of every tag to the logos lexer, so the parser sees one
//! flat token stream.

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Produced by the scanner for raw text between tags
    Text(String),

    // Tag delimiters. Openers are produced by the scanner; closers by logos.
    OutputOpen,
    StmtOpen,
    #[token("}}")]
    OutputClose,
    #[token("-}}")]
    OutputCloseTrim,
    #[token("%}")]
    StmtClose,
    #[token("-%}")]
    StmtCloseTrim,

    // Statement keywords
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("endif")]
    EndIf,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("endfor")]
    EndFor,
    #[token("set")]
    Set,
    #[token("is")]
    Is,

    // Logical operators
    #[token("not")]
    Not,
    #[token("and")]
    And,
    #[token("or")]
    Or,

    // Constants
    #[token("true")]
    #[token("True")]
    True,
    #[token("false")]
    #[token("False")]
    False,
    #[token("none")]
    #[token("None")]
    None,

    // Comparison operators (longer first)
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("|")]
    Pipe,
    #[token("~")]
    Tilde,
    #[token("-")]
    Minus,
    #[token("+")]
    Plus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,

    // Literals - identifiers must come after keywords. Names may be any
    // Unicode identifier.
    #[regex(r"[\p{XID_Start}_][\p{XID_Continue}]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape_string(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape_string(lex.slice()))]
    String(String),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    // Anything logos cannot classify, kept so the parser can point at it
    Invalid(String),
}

/// Strip the quotes from a string literal and resolve backslash escapes
fn unescape_string(slice: &str) -> String {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Output,
    Statement,
    Comment,
}

/// Find the next tag opener at or after `from`
fn next_opener(source: &str, from: usize) -> Option<(usize, TagKind)> {
    let bytes = source.as_bytes();
    let mut pos = from;
    while let Some(offset) = source[pos..].find('{') {
        let at = pos + offset;
        match bytes.get(at + 1) {
            Some(b'{') => return Some((at, TagKind::Output)),
            Some(b'%') => return Some((at, TagKind::Statement)),
            Some(b'#') => return Some((at, TagKind::Comment)),
            _ => pos = at + 1,
        }
    }
    None
}

/// Lex a template into tokens with spans
///
/// Raw text between tags becomes a single [`Token::Text`]. Whitespace
/// control markers (`{{-`, `-}}`, `{%-`, `-%}`) are applied here, so the
/// parser only ever sees plain `OutputClose` / `StmtClose`.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, ParseError> {
    let mut tokens: Vec<(Token, Span)> = Vec::new();
    let mut pos = 0;
    let mut trim_next_text = false;

    loop {
        let opener = next_opener(source, pos);
        let text_end = opener.map(|(at, _)| at).unwrap_or(source.len());

        let mut text = &source[pos..text_end];
        if trim_next_text {
            text = text.trim_start();
        }
        let trim_before = opener
            .map(|(at, _)| source[at + 2..].starts_with('-'))
            .unwrap_or(false);
        if trim_before {
            text = text.trim_end();
        }
        if !text.is_empty() {
            tokens.push((Token::Text(text.to_string()), pos..text_end));
        }

        let Some((at, kind)) = opener else {
            break;
        };
        let body_start = if trim_before { at + 3 } else { at + 2 };

        match kind {
            TagKind::Comment => {
                let Some(offset) = source[body_start..].find("#}") else {
                    return Err(ParseError::Unclosed {
                        span: at..at + 2,
                        closing: "#}",
                    });
                };
                let close = body_start + offset;
                trim_next_text = close > body_start && source[..close].ends_with('-');
                pos = close + 2;
            }
            TagKind::Output | TagKind::Statement => {
                let open = if kind == TagKind::Output {
                    Token::OutputOpen
                } else {
                    Token::StmtOpen
                };
                tokens.push((open, at..body_start));

                let (end, trimmed) = lex_tag(source, body_start, kind, &mut tokens)?
                    .ok_or(ParseError::Unclosed {
                        span: at..body_start,
                        closing: if kind == TagKind::Output { "}}" } else { "%}" },
                    })?;
                trim_next_text = trimmed;
                pos = end;
            }
        }
    }

    Ok(tokens)
}

/// Lex the inside of one tag, pushing tokens until the closing delimiter
///
/// Returns the byte offset just past the closer and whether it asked for
/// trailing whitespace to be trimmed, or `None` when the tag never closes.
fn lex_tag(
    source: &str,
    start: usize,
    kind: TagKind,
    tokens: &mut Vec<(Token, Span)>,
) -> Result<Option<(usize, bool)>, ParseError> {
    let mut lexer = Token::lexer(&source[start..]);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let span = start + span.start..start + span.end;
        let token = match result {
            Ok(tok) => tok,
            Err(()) => Token::Invalid(lexer.slice().to_string()),
        };

        let closer = match (&token, kind) {
            (Token::OutputClose, TagKind::Output) => Some(false),
            (Token::OutputCloseTrim, TagKind::Output) => Some(true),
            (Token::StmtClose, TagKind::Statement) => Some(false),
            (Token::StmtCloseTrim, TagKind::Statement) => Some(true),
            _ => None,
        };

        if let Some(trimmed) = closer {
            let plain = if kind == TagKind::Output {
                Token::OutputClose
            } else {
                Token::StmtClose
            };
            tokens.push((plain, span.clone()));
            return Ok(Some((span.end, trimmed)));
        }
        tokens.push((token, span));
    }

    Ok(None)
}
