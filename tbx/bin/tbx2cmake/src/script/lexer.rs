// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Tokenizer for the build-script dialect.
//!
//! Produces a flat token stream with synthesized `Newline`, `Indent` and
//! `Dedent` tokens, so the parser can treat indentation like ordinary
//! delimiters. Newlines inside brackets are implicit continuations, as are
//! backslash-newline pairs.

use anyhow::{bail, Result};
use nom::bytes::complete::take_while;
use nom::InputTake;
use nom_locate::LocatedSpan;

pub type Span<'a> = LocatedSpan<&'a str>;

#[derive(Clone, Debug, PartialEq)]
pub enum Tok {
    Newline,
    Indent,
    Dedent,
    Name(String),
    Int(i64),
    Str(String),
    If,
    Elif,
    Else,
    For,
    In,
    Def,
    Return,
    Pass,
    Import,
    And,
    Or,
    Not,
    True,
    False,
    NoneLit,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semi,
    Dot,
    Assign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
}

impl Tok {
    pub fn describe(&self) -> String {
        match self {
            Tok::Newline => "end of line".to_string(),
            Tok::Indent => "indent".to_string(),
            Tok::Dedent => "dedent".to_string(),
            Tok::Name(name) => format!("name '{name}'"),
            Tok::Int(value) => format!("integer {value}"),
            Tok::Str(_) => "string literal".to_string(),
            other => format!("{other:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
}

fn spaces(input: Span) -> nom::IResult<Span, Span> {
    take_while(|c| c == ' ')(input)
}

fn inline_ws(input: Span) -> nom::IResult<Span, Span> {
    take_while(|c| c == ' ' || c == '\t' || c == '\r')(input)
}

fn advance(input: Span, bytes: usize) -> Span {
    input.take_split(bytes).0
}

fn keyword(name: &str) -> Option<Tok> {
    Some(match name {
        "if" => Tok::If,
        "elif" => Tok::Elif,
        "else" => Tok::Else,
        "for" => Tok::For,
        "in" => Tok::In,
        "def" => Tok::Def,
        "return" => Tok::Return,
        "pass" => Tok::Pass,
        "import" => Tok::Import,
        "and" => Tok::And,
        "or" => Tok::Or,
        "not" => Tok::Not,
        "True" => Tok::True,
        "False" => Tok::False,
        "None" => Tok::NoneLit,
        _ => return None,
    })
}

/// Lexes one string literal starting at `input` (which must begin with a
/// quote). Handles single, double and triple quotes plus the usual escapes.
fn lex_string(input: Span) -> Result<(Span, String)> {
    let text = input.fragment();
    let line = input.location_line();
    let quote = text.chars().next().expect("caller checked");
    let triple = text.len() >= 3 && text.chars().take(3).all(|c| c == quote);
    let (open_len, terminator) = if triple {
        (3, [quote; 3].iter().collect::<String>())
    } else {
        (1, quote.to_string())
    };

    let body = &text[open_len..];
    let mut value = String::new();
    let mut chars = body.char_indices();
    while let Some((offset, c)) = chars.next() {
        if !triple && c == '\n' {
            bail!("line {line}: unterminated string literal");
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '\'')) => value.push('\''),
                Some((_, '"')) => value.push('"'),
                // Unknown escapes pass through verbatim, the way the legacy
                // scripts expect.
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => bail!("line {line}: unterminated string literal"),
            }
            continue;
        }
        if body[offset..].starts_with(&terminator) {
            let consumed = open_len + offset + terminator.len();
            return Ok((advance(input, consumed), value));
        }
        value.push(c);
    }
    bail!("line {line}: unterminated string literal");
}

/// Tokenizes a whole script source.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut input = Span::new(source);
    let mut tokens: Vec<Token> = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth: usize = 0;
    let mut at_line_start = true;

    while !input.fragment().is_empty() {
        if at_line_start && depth == 0 {
            let (rest, indent) = spaces(input).expect("take_while cannot fail");
            let line = rest.location_line();
            match rest.fragment().chars().next() {
                None => {
                    input = rest;
                    break;
                }
                Some('\t') => bail!("line {line}: tabs are not allowed in indentation"),
                Some('\r') => {
                    input = advance(rest, 1);
                    continue;
                }
                Some('\n') => {
                    input = advance(rest, 1);
                    continue;
                }
                Some('#') => {
                    let (rest, _) = take_while::<_, _, nom::error::Error<Span>>(|c| c != '\n')(
                        rest,
                    )
                    .expect("take_while cannot fail");
                    input = rest;
                    continue;
                }
                Some(_) => {
                    let width = indent.fragment().len();
                    let current = *indents.last().expect("indent stack is never empty");
                    if width > current {
                        indents.push(width);
                        tokens.push(Token {
                            tok: Tok::Indent,
                            line,
                        });
                    } else if width < current {
                        while *indents.last().expect("indent stack is never empty") > width {
                            indents.pop();
                            tokens.push(Token {
                                tok: Tok::Dedent,
                                line,
                            });
                        }
                        if *indents.last().expect("indent stack is never empty") != width {
                            bail!("line {line}: inconsistent indentation");
                        }
                    }
                    input = rest;
                    at_line_start = false;
                }
            }
            continue;
        }

        let (rest, _) = inline_ws(input).expect("take_while cannot fail");
        input = rest;
        let Some(c) = input.fragment().chars().next() else {
            break;
        };
        let line = input.location_line();

        match c {
            '\n' => {
                if depth == 0 {
                    tokens.push(Token {
                        tok: Tok::Newline,
                        line,
                    });
                    at_line_start = true;
                }
                input = advance(input, 1);
            }
            '#' => {
                let (rest, _) = take_while::<_, _, nom::error::Error<Span>>(|ch| ch != '\n')(input)
                    .expect("take_while cannot fail");
                input = rest;
            }
            '\\' if input.fragment()[1..].starts_with('\n') => {
                input = advance(input, 2);
            }
            '"' | '\'' => {
                let (rest, value) = lex_string(input)?;
                tokens.push(Token {
                    tok: Tok::Str(value),
                    line,
                });
                input = rest;
            }
            c if c.is_ascii_digit() => {
                let (rest, digits) =
                    take_while::<_, _, nom::error::Error<Span>>(|ch: char| ch.is_ascii_digit())(
                        input,
                    )
                    .expect("take_while cannot fail");
                let value: i64 = digits
                    .fragment()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("line {line}: integer literal out of range"))?;
                tokens.push(Token {
                    tok: Tok::Int(value),
                    line,
                });
                input = rest;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let (rest, word) = take_while::<_, _, nom::error::Error<Span>>(|ch: char| {
                    ch.is_ascii_alphanumeric() || ch == '_'
                })(input)
                .expect("take_while cannot fail");
                let word = word.fragment();
                let tok = keyword(word).unwrap_or_else(|| Tok::Name(word.to_string()));
                tokens.push(Token { tok, line });
                input = rest;
            }
            _ => {
                let text = input.fragment();
                let (tok, len) = if text.starts_with("==") {
                    (Tok::EqEq, 2)
                } else if text.starts_with("!=") {
                    (Tok::NotEq, 2)
                } else if text.starts_with("<=") {
                    (Tok::LtEq, 2)
                } else if text.starts_with(">=") {
                    (Tok::GtEq, 2)
                } else {
                    let tok = match c {
                        '(' => Tok::LParen,
                        ')' => Tok::RParen,
                        '[' => Tok::LBracket,
                        ']' => Tok::RBracket,
                        '{' => Tok::LBrace,
                        '}' => Tok::RBrace,
                        ',' => Tok::Comma,
                        ':' => Tok::Colon,
                        ';' => Tok::Semi,
                        '.' => Tok::Dot,
                        '=' => Tok::Assign,
                        '<' => Tok::Lt,
                        '>' => Tok::Gt,
                        '+' => Tok::Plus,
                        '-' => Tok::Minus,
                        other => bail!("line {line}: unexpected character {other:?}"),
                    };
                    (tok, 1)
                };
                match tok {
                    Tok::LParen | Tok::LBracket | Tok::LBrace => depth += 1,
                    Tok::RParen | Tok::RBracket | Tok::RBrace => {
                        depth = depth
                            .checked_sub(1)
                            .ok_or_else(|| anyhow::anyhow!("line {line}: unbalanced brackets"))?
                    }
                    _ => {}
                }
                tokens.push(Token { tok, line });
                input = advance(input, len);
            }
        }
    }

    let last_line = input.location_line();
    if !at_line_start {
        tokens.push(Token {
            tok: Tok::Newline,
            line: last_line,
        });
    }
    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token {
            tok: Tok::Dedent,
            line: last_line,
        });
    }

    Ok(tokens)
}
