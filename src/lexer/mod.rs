use logos::Logos;

use crate::ast::Span;

/// Tab stop used when measuring indentation width. Tabs expand to the
/// next multiple of this many columns; the expansion affects indent
/// width only, never spans.
const TAB_WIDTH: usize = 4;

/// Raw within-line tokens. Indentation structure is layered on top by
/// [`lex`], which runs this lexer line by line.
#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip(r"#[^\n]*", allow_greedy = true))]
enum RawToken {
    // Keywords
    #[token("set")]
    Set,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,

    // Literals
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1])
    })]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Operators
    #[token("==")]
    EqualsEquals,
    #[token("!=")]
    NotEquals,
    #[token("<=")]
    LessEquals,
    #[token(">=")]
    GreaterEquals,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Assign,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
}

/// The token taxonomy the parser consumes: raw tokens plus significant
/// `Newline`/`Indent`/`Dedent` recovered from leading whitespace, and a
/// terminating `Eof`.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Newline,
    Indent,
    Dedent,
    Eof,

    Set,
    Function,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Break,
    Continue,
    And,
    Or,
    Not,

    True,
    False,
    Null,
    Number(f64),
    Str(String),
    Ident(String),

    EqualsEquals,
    NotEquals,
    LessEquals,
    GreaterEquals,
    Less,
    Greater,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
}

impl From<RawToken> for Token {
    fn from(raw: RawToken) -> Token {
        match raw {
            RawToken::Set => Token::Set,
            RawToken::Function => Token::Function,
            RawToken::Return => Token::Return,
            RawToken::If => Token::If,
            RawToken::Elif => Token::Elif,
            RawToken::Else => Token::Else,
            RawToken::While => Token::While,
            RawToken::For => Token::For,
            RawToken::In => Token::In,
            RawToken::Break => Token::Break,
            RawToken::Continue => Token::Continue,
            RawToken::And => Token::And,
            RawToken::Or => Token::Or,
            RawToken::Not => Token::Not,
            RawToken::True => Token::True,
            RawToken::False => Token::False,
            RawToken::Null => Token::Null,
            RawToken::Number(n) => Token::Number(n),
            RawToken::Str(s) => Token::Str(s),
            RawToken::Ident(s) => Token::Ident(s),
            RawToken::EqualsEquals => Token::EqualsEquals,
            RawToken::NotEquals => Token::NotEquals,
            RawToken::LessEquals => Token::LessEquals,
            RawToken::GreaterEquals => Token::GreaterEquals,
            RawToken::Less => Token::Less,
            RawToken::Greater => Token::Greater,
            RawToken::Plus => Token::Plus,
            RawToken::Minus => Token::Minus,
            RawToken::Star => Token::Star,
            RawToken::Slash => Token::Slash,
            RawToken::Percent => Token::Percent,
            RawToken::Assign => Token::Assign,
            RawToken::LParen => Token::LParen,
            RawToken::RParen => Token::RParen,
            RawToken::LBracket => Token::LBracket,
            RawToken::RBracket => Token::RBracket,
            RawToken::LBrace => Token::LBrace,
            RawToken::RBrace => Token::RBrace,
            RawToken::Comma => Token::Comma,
            RawToken::Dot => Token::Dot,
            RawToken::Colon => Token::Colon,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Lex error at position {position}: {message}")]
pub struct LexError {
    pub position: usize,
    pub message: String,
}

fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '0' => out.push('\0'),
            other => {
                // Unknown escapes pass through verbatim.
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// Indentation width of a line: spaces count one column, tabs expand to
/// the next multiple of [`TAB_WIDTH`].
fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += TAB_WIDTH - (width % TAB_WIDTH),
            _ => break,
        }
    }
    width
}

/// Lex source into the token stream of the parser contract. Blank and
/// comment-only lines carry no structure; every significant line ends in
/// a `Newline`, indentation changes appear as `Indent`/`Dedent` pairs,
/// and the stream is terminated by `Eof`.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, LexError> {
    let mut tokens: Vec<(Token, Span)> = Vec::new();
    let mut indent_stack: Vec<usize> = vec![0];
    let mut offset = 0;

    for line in source.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let content = line.strip_suffix('\n').unwrap_or(line);
        let trimmed = content.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let width = indent_width(content);
        let body_start = line_start + (content.len() - trimmed.len());
        let indent_span = Span {
            start: line_start,
            end: body_start,
        };

        let current = *indent_stack.last().unwrap_or(&0);
        if width > current {
            indent_stack.push(width);
            tokens.push((Token::Indent, indent_span));
        } else if width < current {
            while *indent_stack.last().unwrap_or(&0) > width {
                indent_stack.pop();
                tokens.push((Token::Dedent, indent_span));
            }
            if *indent_stack.last().unwrap_or(&0) != width {
                return Err(LexError {
                    position: line_start,
                    message: format!(
                        "inconsistent indentation: width {width} does not match any open block"
                    ),
                });
            }
        }

        let mut lexer = RawToken::lexer(content);
        let mut line_had_tokens = false;
        while let Some(result) = lexer.next() {
            let span = Span {
                start: line_start + lexer.span().start,
                end: line_start + lexer.span().end,
            };
            match result {
                Ok(raw) => {
                    line_had_tokens = true;
                    tokens.push((Token::from(raw), span));
                }
                Err(()) => {
                    return Err(LexError {
                        position: span.start,
                        message: format!("unexpected character(s) '{}'", lexer.slice()),
                    });
                }
            }
        }

        if line_had_tokens {
            let end = line_start + content.len();
            tokens.push((Token::Newline, Span { start: end, end }));
        }
    }

    let end_span = Span {
        start: source.len(),
        end: source.len(),
    };
    while indent_stack.len() > 1 {
        indent_stack.pop();
        tokens.push((Token::Dedent, end_span));
    }
    tokens.push((Token::Eof, end_span));

    Ok(tokens)
}
