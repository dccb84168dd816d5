//! Template parser: segments → node tree, tokens → expressions

use serde_json::Value;

use super::lexer::{segments, tokenize_expr, Segment, Tok};
use crate::error::TemplateErrorKind;

type ParseResult<T> = Result<T, TemplateErrorKind>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// `expr | name(args)`, and method sugar `expr.name(args)`
    Filter {
        expr: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Test {
        expr: Box<Expr>,
        name: String,
        negated: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For {
        targets: Vec<String>,
        iter: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Set {
        name: String,
        expr: Expr,
    },
}

/// Parse a whole template source
pub fn parse(source: &str) -> ParseResult<Vec<Node>> {
    let mut parser = BlockParser {
        segments: segments(source)?.into_iter(),
        len: source.len(),
    };
    let (nodes, end) = parser.parse_body(&[])?;
    debug_assert!(end.is_none());
    Ok(nodes)
}

/// A block tag split into keyword and the rest
struct TagHead {
    keyword: String,
    rest: String,
    pos: usize,
}

impl TagHead {
    fn split(src: &str, pos: usize) -> Self {
        let (keyword, rest) = src.split_once(char::is_whitespace).unwrap_or((src, ""));
        Self {
            keyword: keyword.to_string(),
            rest: rest.trim().to_string(),
            pos: pos + keyword.len(),
        }
    }
}

struct BlockParser {
    segments: std::vec::IntoIter<Segment>,
    len: usize,
}

impl BlockParser {
    /// Parse nodes until one of `ends` (returned) or the end of input (only if `ends` is empty)
    fn parse_body(&mut self, ends: &[&str]) -> ParseResult<(Vec<Node>, Option<TagHead>)> {
        let mut nodes = Vec::new();

        while let Some(segment) = self.segments.next() {
            match segment {
                Segment::Text(text) => nodes.push(Node::Text(text)),
                Segment::Output { src, pos } => nodes.push(Node::Output(parse_expr(&src, pos)?)),
                Segment::Tag { src, pos } => {
                    let head = TagHead::split(&src, pos);
                    if ends.contains(&head.keyword.as_str()) {
                        return Ok((nodes, Some(head)));
                    }
                    let node = match head.keyword.as_str() {
                        "if" => self.parse_if(head)?,
                        "for" => self.parse_for(head)?,
                        "set" => parse_set(head)?,
                        other => {
                            return Err(TemplateErrorKind::syntax(pos, format!("unexpected tag '{other}'")))
                        }
                    };
                    nodes.push(node);
                }
            }
        }

        if ends.is_empty() {
            Ok((nodes, None))
        } else {
            Err(TemplateErrorKind::syntax(
                self.len,
                format!("unexpected end of template, expected one of: {}", ends.join(", ")),
            ))
        }
    }

    fn parse_if(&mut self, head: TagHead) -> ParseResult<Node> {
        let mut cond = parse_expr(&head.rest, head.pos)?;
        let mut branches = Vec::new();
        loop {
            let (body, end) = self.parse_body(&["elif", "else", "endif"])?;
            branches.push((cond, body));
            let Some(end) = end else { unreachable!("non-empty ends") };
            match end.keyword.as_str() {
                "elif" => cond = parse_expr(&end.rest, end.pos)?,
                "else" => {
                    let (otherwise, _) = self.parse_body(&["endif"])?;
                    return Ok(Node::If { branches, otherwise });
                }
                _ => return Ok(Node::If { branches, otherwise: Vec::new() }),
            }
        }
    }

    fn parse_for(&mut self, head: TagHead) -> ParseResult<Node> {
        let mut p = ExprParser::new(&head.rest, head.pos)?;
        let mut targets = vec![p.expect_ident()?];
        while p.eat_punct(',') {
            targets.push(p.expect_ident()?);
        }
        if !p.eat_keyword("in") {
            return Err(p.error("expected 'in' in for loop"));
        }
        let iter = p.parse_expr()?;
        p.finish()?;

        let (body, end) = self.parse_body(&["else", "endfor"])?;
        let otherwise = match end {
            Some(end) if end.keyword == "else" => self.parse_body(&["endfor"])?.0,
            _ => Vec::new(),
        };
        Ok(Node::For {
            targets,
            iter,
            body,
            otherwise,
        })
    }
}

fn parse_set(head: TagHead) -> ParseResult<Node> {
    let mut p = ExprParser::new(&head.rest, head.pos)?;
    let name = p.expect_ident()?;
    if !p.eat_op("=") {
        return Err(p.error("expected '=' in set"));
    }
    let expr = p.parse_expr()?;
    p.finish()?;
    Ok(Node::Set { name, expr })
}

/// Parse one complete expression
pub fn parse_expr(src: &str, pos: usize) -> ParseResult<Expr> {
    let mut p = ExprParser::new(src, pos)?;
    let expr = p.parse_expr()?;
    p.finish()?;
    Ok(expr)
}

const KEYWORDS: [&str; 7] = ["and", "or", "not", "in", "is", "if", "else"];

struct ExprParser {
    tokens: Vec<(Tok, usize)>,
    idx: usize,
    end: usize,
}

impl ExprParser {
    fn new(src: &str, pos: usize) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize_expr(src, pos)?,
            idx: 0,
            end: pos + src.len(),
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.idx).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.idx + ahead).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.idx).map(|(_, p)| *p).unwrap_or(self.end)
    }

    fn error(&self, details: impl Into<String>) -> TemplateErrorKind {
        TemplateErrorKind::syntax(self.position(), details)
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.idx).map(|(t, _)| t.clone());
        self.idx += 1;
        tok
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        if self.peek() == Some(&Tok::Punct(ch)) {
            self.idx += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, ch: char) -> ParseResult<()> {
        if self.eat_punct(ch) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{ch}'")))
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Op(o)) if *o == op) {
            self.idx += 1;
            return true;
        }
        false
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(i)) if i == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.idx += 1;
            return true;
        }
        false
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Tok::Ident(name)) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.idx += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn finish(&self) -> ParseResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(self.error(format!("unexpected token {tok:?}"))),
        }
    }

    // expr := or ('if' or ('else' expr)?)?
    fn parse_expr(&mut self) -> ParseResult<Expr> {
        if self.peek().is_none() {
            return Err(self.error("expected an expression"));
        }
        let then = self.parse_or()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let cond = self.parse_or()?;
        let otherwise = if self.eat_keyword("else") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        Ok(Expr::Cond {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise,
        })
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("and") {
            let right = self.parse_not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.eat_keyword("not") {
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_concat()?;
        loop {
            let op = match self.peek().cloned() {
                Some(Tok::Op("==")) => BinOp::Eq,
                Some(Tok::Op("!=")) => BinOp::Ne,
                Some(Tok::Op("<")) => BinOp::Lt,
                Some(Tok::Op("<=")) => BinOp::Le,
                Some(Tok::Op(">")) => BinOp::Gt,
                Some(Tok::Op(">=")) => BinOp::Ge,
                Some(Tok::Ident(kw)) if kw == "in" => BinOp::In,
                Some(Tok::Ident(kw)) if kw == "not" && matches!(self.peek_at(1), Some(Tok::Ident(i)) if i == "in") => {
                    self.idx += 1;
                    BinOp::NotIn
                }
                Some(Tok::Ident(kw)) if kw == "is" => {
                    self.idx += 1;
                    let negated = self.eat_keyword("not");
                    let name = match self.advance() {
                        Some(Tok::Ident(name)) => name,
                        _ => return Err(self.error("expected a test name after 'is'")),
                    };
                    left = Expr::Test {
                        expr: Box::new(left),
                        name,
                        negated,
                    };
                    continue;
                }
                _ => return Ok(left),
            };
            self.idx += 1;
            let right = self.parse_concat()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_concat(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        while self.eat_op("~") {
            let right = self.parse_additive()?;
            left = Expr::Binary(BinOp::Concat, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.eat_op("-") {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_filtered()
    }

    fn parse_filtered(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_postfix()?;
        while self.eat_punct('|') {
            let name = self.expect_ident()?;
            let (args, kwargs) = if self.eat_punct('(') {
                self.parse_call_args()?
            } else {
                (Vec::new(), Vec::new())
            };
            expr = Expr::Filter {
                expr: Box::new(expr),
                name,
                args,
                kwargs,
            };
        }
        Ok(expr)
    }

    /// Arguments after an opening `(`, through the closing `)`
    fn parse_call_args(&mut self) -> ParseResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat_punct(')') {
            let is_kwarg = matches!(self.peek(), Some(Tok::Ident(_))) && self.peek_at(1) == Some(&Tok::Op("="));
            if is_kwarg {
                let name = self.expect_ident()?;
                self.idx += 1;
                kwargs.push((name, self.parse_expr()?));
            } else if kwargs.is_empty() {
                args.push(self.parse_expr()?);
            } else {
                return Err(self.error("positional argument after keyword argument"));
            }
            if !self.eat_punct(',') {
                self.expect_punct(')')?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct('.') {
                let name = match self.advance() {
                    Some(Tok::Ident(name)) => name,
                    Some(Tok::Int(n)) => n.to_string(),
                    _ => return Err(self.error("expected an attribute name after '.'")),
                };
                if self.eat_punct('(') {
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = Expr::Filter {
                        expr: Box::new(expr),
                        name,
                        args,
                        kwargs,
                    };
                } else {
                    expr = Expr::Attr(Box::new(expr), name);
                }
            } else if self.eat_punct('[') {
                let index = self.parse_expr()?;
                self.expect_punct(']')?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let position = self.position();
        let tok = self
            .advance()
            .ok_or_else(|| TemplateErrorKind::syntax(position, "unexpected end of expression"))?;
        match tok {
            Tok::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Tok::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Tok::Float(f) => Ok(Expr::Literal(Value::from(f))),
            Tok::Ident(name) => Ok(match name.as_str() {
                "true" | "True" => Expr::Literal(Value::Bool(true)),
                "false" | "False" => Expr::Literal(Value::Bool(false)),
                "none" | "None" | "null" => Expr::Literal(Value::Null),
                kw if KEYWORDS.contains(&kw) => {
                    return Err(TemplateErrorKind::syntax(position, format!("unexpected keyword '{kw}'")))
                }
                _ => Expr::Var(name),
            }),
            Tok::Punct('(') => {
                let inner = self.parse_expr()?;
                self.expect_punct(')')?;
                Ok(inner)
            }
            Tok::Punct('[') => {
                let mut items = Vec::new();
                while !self.eat_punct(']') {
                    items.push(self.parse_expr()?);
                    if !self.eat_punct(',') {
                        self.expect_punct(']')?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Tok::Punct('{') => {
                let mut entries = Vec::new();
                while !self.eat_punct('}') {
                    let key = self.parse_expr()?;
                    self.expect_punct(':')?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    if !self.eat_punct(',') {
                        self.expect_punct('}')?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            other => Err(TemplateErrorKind::syntax(position, format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    fn attr(e: Expr, name: &str) -> Expr {
        Expr::Attr(Box::new(e), name.to_string())
    }

    #[test]
    fn parses_attribute_chains() {
        assert_eq!(
            parse_expr("data.main.name", 0).unwrap(),
            attr(attr(var("data"), "main"), "name")
        );
    }

    #[test]
    fn parses_filters_with_kwargs() {
        let expr = parse_expr("x | to_json(indent=0) | base64", 0).unwrap();
        let Expr::Filter { name, expr: inner, .. } = expr else { panic!("not a filter") };
        assert_eq!(name, "base64");
        let Expr::Filter { name, kwargs, args, .. } = *inner else { panic!("not a filter") };
        assert_eq!(name, "to_json");
        assert!(args.is_empty());
        assert_eq!(kwargs, vec![("indent".to_string(), Expr::Literal(json!(0)))]);
    }

    #[test]
    fn method_call_is_filter_sugar() {
        let expr = parse_expr("data.items()", 0).unwrap();
        assert!(matches!(expr, Expr::Filter { ref name, .. } if name == "items"));
    }

    #[test]
    fn precedence_not_and_or() {
        let expr = parse_expr("not a and b or c", 0).unwrap();
        let Expr::Binary(BinOp::Or, left, _) = expr else { panic!("or at top") };
        let Expr::Binary(BinOp::And, not_a, _) = *left else { panic!("and below or") };
        assert_eq!(*not_a, Expr::Unary(UnaryOp::Not, Box::new(var("a"))));
    }

    #[test]
    fn parses_tests_and_not_in() {
        assert!(matches!(
            parse_expr("x is not defined", 0).unwrap(),
            Expr::Test { negated: true, ref name, .. } if name == "defined"
        ));
        assert!(matches!(
            parse_expr("'a' not in x", 0).unwrap(),
            Expr::Binary(BinOp::NotIn, _, _)
        ));
    }

    #[test]
    fn parses_literals() {
        assert_eq!(
            parse_expr(r#"{"a": [1, 2.5, none, true]}"#, 0).unwrap(),
            Expr::Dict(vec![(
                Expr::Literal(json!("a")),
                Expr::List(vec![
                    Expr::Literal(json!(1)),
                    Expr::Literal(json!(2.5)),
                    Expr::Literal(Value::Null),
                    Expr::Literal(json!(true)),
                ])
            )])
        );
    }

    #[test]
    fn parses_blocks() {
        let nodes = parse("{% for k, v in x %}{{ k }}{% else %}none{% endfor %}{% set y = 1 %}").unwrap();
        assert_eq!(nodes.len(), 2);
        let Node::For { targets, otherwise, .. } = &nodes[0] else { panic!("for") };
        assert_eq!(targets, &vec!["k".to_string(), "v".to_string()]);
        assert_eq!(otherwise, &vec![Node::Text("none".into())]);
    }

    #[test]
    fn parses_elif_chains() {
        let nodes = parse("{% if a %}1{% elif b %}2{% else %}3{% endif %}").unwrap();
        let Node::If { branches, otherwise } = &nodes[0] else { panic!("if") };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise, &vec![Node::Text("3".into())]);
    }

    #[test]
    fn syntax_errors() {
        assert!(parse("{% if %}x{% endif %}").is_err());
        assert!(parse("{% if a %}x").is_err());
        assert!(parse("{% endif %}").is_err());
        assert!(parse("{% unknown %}").is_err());
        assert!(parse("{{ a b }}").is_err());
        assert!(parse("{{ f(1, x=2, 3) }}").is_err());
    }
}
