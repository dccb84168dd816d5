//! Template tokenizer
//!
//! Two passes over the source:
//! 1. [`segments`] splits text from `{{ }}` / `{% %}` / `{# #}` delimiters,
//!    applying `-` whitespace control and dropping comments.
//! 2. [`tokenize_expr`] turns the inside of one delimiter into expression tokens.

use crate::error::TemplateErrorKind;

/// One top-level piece of a template
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    /// Body of `{{ ... }}` and its byte offset in the source
    Output { src: String, pos: usize },
    /// Body of `{% ... %}` and its byte offset in the source
    Tag { src: String, pos: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Delim {
    Output,
    Tag,
    Comment,
}

impl Delim {
    fn close(self) -> &'static str {
        match self {
            Delim::Output => "}}",
            Delim::Tag => "%}",
            Delim::Comment => "#}",
        }
    }
}

/// Split a template into text and delimited segments
pub fn segments(template: &str) -> Result<Vec<Segment>, TemplateErrorKind> {
    let bytes = template.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;
    // `-}}` on the previous delimiter strips leading whitespace of the next text
    let mut trim_next = false;

    while let Some(offset) = template[pos..].find('{') {
        let open = pos + offset;
        let delim = match bytes.get(open + 1) {
            Some(b'{') => Delim::Output,
            Some(b'%') => Delim::Tag,
            Some(b'#') => Delim::Comment,
            _ => {
                pos = open + 1;
                continue;
            }
        };

        let trim_before = bytes.get(open + 2) == Some(&b'-');
        push_text(&mut out, &template[text_start..open], trim_next, trim_before);

        let body_start = open + 2 + usize::from(trim_before);
        let close = find_close(template, body_start, delim).ok_or_else(|| {
            TemplateErrorKind::syntax(open, format!("unclosed '{}'", &template[open..open + 2]))
        })?;

        let trim_after = close > body_start && bytes[close - 1] == b'-';
        let body_end = if trim_after { close - 1 } else { close };
        let body = template[body_start..body_end].trim().to_string();

        match delim {
            Delim::Output => out.push(Segment::Output { src: body, pos: body_start }),
            Delim::Tag => out.push(Segment::Tag { src: body, pos: body_start }),
            Delim::Comment => {}
        }

        trim_next = trim_after;
        pos = close + 2;
        text_start = pos;
    }

    push_text(&mut out, &template[text_start..], trim_next, false);
    Ok(out)
}

fn push_text(out: &mut Vec<Segment>, text: &str, trim_start: bool, trim_end: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    let text = if trim_end { text.trim_end() } else { text };
    if !text.is_empty() {
        out.push(Segment::Text(text.to_string()));
    }
}

/// Byte offset of the closing delimiter, skipping quoted strings and balanced braces in expressions
fn find_close(template: &str, from: usize, delim: Delim) -> Option<usize> {
    let close = delim.close();
    if delim == Delim::Comment {
        return template[from..].find(close).map(|i| from + i);
    }

    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;
    for (i, ch) in template[from..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            _ if template[from + i..].starts_with(close) => return Some(from + i),
            _ => {}
        }
    }
    None
}

/// Expression token
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    /// Operators: `== != <= >= < > + - * / % ~ =`
    Op(&'static str),
    /// Punctuation: `( ) [ ] { } , : . |`
    Punct(char),
}

const TWO_CHAR_OPS: [&str; 4] = ["==", "!=", "<=", ">="];
const ONE_CHAR_OPS: [&str; 9] = ["<", ">", "+", "-", "*", "/", "%", "~", "="];

/// Tokenize one expression; `base` is its byte offset in the template, for error positions
pub fn tokenize_expr(src: &str, base: usize) -> Result<Vec<(Tok, usize)>, TemplateErrorKind> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(i, ch)) = chars.peek() {
        let at = base + i;
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, 'r')) => text.push('\r'),
                            Some((_, other)) => text.push(other),
                            None => break,
                        },
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        c => text.push(c),
                    }
                }
                if !closed {
                    return Err(TemplateErrorKind::syntax(at, "unterminated string"));
                }
                tokens.push((Tok::Str(text), at));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut end = i;
                let mut is_float = false;
                while let Some(&(j, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '_' {
                        end = j + 1;
                        chars.next();
                    } else if c == '.' && !is_float && next_is_digit(src, j) {
                        is_float = true;
                        end = j + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let digits = src[start..end].replace('_', "");
                let tok = if is_float {
                    digits.parse().map(Tok::Float).ok()
                } else {
                    digits.parse().map(Tok::Int).ok()
                };
                let tok = tok.ok_or_else(|| TemplateErrorKind::syntax(at, format!("invalid number '{digits}'")))?;
                tokens.push((tok, at));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut end = i;
                while let Some(&(j, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = j + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Tok::Ident(src[start..end].to_string()), at));
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | ':' | '.' | '|' => {
                chars.next();
                tokens.push((Tok::Punct(ch), at));
            }
            _ => {
                let rest = &src[i..];
                let op = TWO_CHAR_OPS
                    .iter()
                    .chain(ONE_CHAR_OPS.iter())
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| TemplateErrorKind::syntax(at, format!("unexpected character '{ch}'")))?;
                for _ in 0..op.len() {
                    chars.next();
                }
                tokens.push((Tok::Op(*op), at));
            }
        }
    }

    Ok(tokens)
}

fn next_is_digit(src: &str, dot: usize) -> bool {
    src[dot + 1..].chars().next().is_some_and(|c| c.is_ascii_digit())
}
