// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Recursive-descent parser for the build-script dialect.
//!
//! Anything outside the dialect is a hard parse error naming the line, so an
//! unsupported construct in a legacy script surfaces immediately instead of
//! being half-executed.

use std::rc::Rc;

use anyhow::{bail, Result};

use super::ast::{AssignTarget, BinaryOp, CompareOp, Expr, LogicOp, Param, Stmt, StmtKind, UnaryOp};
use super::lexer::{tokenize, Tok, Token};

/// Parses a whole script.
pub fn parse(source: &str) -> Result<Vec<Stmt>> {
    let mut parser = Parser::new(tokenize(source)?);
    parser.parse_module()
}

/// Parses a single expression, e.g. the dict literal in a module manifest.
pub fn parse_expression(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(tokenize(source)?);
    let expr = parser.parse_expr()?;
    parser.eat(&Tok::Newline);
    if let Some(tok) = parser.peek() {
        bail!(
            "line {}: trailing input after expression: {}",
            parser.line(),
            tok.describe()
        );
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.tokens.get(self.pos + 1).map(|t| &t.tok)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<()> {
        if self.eat(&tok) {
            return Ok(());
        }
        let found = self
            .peek()
            .map(|t| t.describe())
            .unwrap_or_else(|| "end of input".to_string());
        bail!(
            "line {}: expected {}, found {}",
            self.line(),
            tok.describe(),
            found
        );
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.peek() {
            Some(Tok::Name(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            other => {
                let found = other
                    .map(|t| t.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                bail!("line {}: expected a name, found {}", self.line(), found);
            }
        }
    }

    fn parse_module(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            self.parse_statement(&mut stmts)?;
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> Result<()> {
        match self.peek() {
            Some(Tok::If) => {
                let stmt = self.parse_if()?;
                out.push(stmt);
            }
            Some(Tok::For) => {
                let stmt = self.parse_for()?;
                out.push(stmt);
            }
            Some(Tok::Def) => {
                let stmt = self.parse_def()?;
                out.push(stmt);
            }
            Some(_) => self.parse_simple_line(out)?,
            None => {}
        }
        Ok(())
    }

    /// One or more simple statements separated by `;`, ended by a newline.
    fn parse_simple_line(&mut self, out: &mut Vec<Stmt>) -> Result<()> {
        loop {
            out.push(self.parse_simple_stmt()?);
            if !self.eat(&Tok::Semi) {
                break;
            }
            if self.peek() == Some(&Tok::Newline) {
                break;
            }
        }
        self.expect(Tok::Newline)
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            Some(Tok::Import) => {
                self.pos += 1;
                let mut path = vec![self.expect_name()?];
                while self.eat(&Tok::Dot) {
                    path.push(self.expect_name()?);
                }
                StmtKind::Import(path)
            }
            Some(Tok::Return) => {
                self.pos += 1;
                let value = match self.peek() {
                    Some(Tok::Newline) | Some(Tok::Semi) | None => None,
                    _ => Some(self.parse_expr()?),
                };
                StmtKind::Return(value)
            }
            Some(Tok::Pass) => {
                self.pos += 1;
                StmtKind::Pass
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(&Tok::Assign) {
                    let target = match expr {
                        Expr::Name(name) => AssignTarget::Name(name),
                        Expr::Attr(obj, name) => AssignTarget::Attr(*obj, name),
                        Expr::Index(obj, key) => AssignTarget::Index(*obj, *key),
                        _ => bail!("line {line}: cannot assign to this expression"),
                    };
                    let value = self.parse_expr()?;
                    StmtKind::Assign { target, value }
                } else {
                    StmtKind::Expr(expr)
                }
            }
        };
        Ok(Stmt { line, kind })
    }

    /// The statements following a `:`, either an indented block or a single
    /// line of simple statements.
    fn parse_suite(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        if self.eat(&Tok::Newline) {
            self.expect(Tok::Indent)?;
            while !self.eat(&Tok::Dedent) {
                if self.peek().is_none() {
                    bail!("line {}: unexpected end of input in block", self.line());
                }
                self.parse_statement(&mut stmts)?;
            }
        } else {
            self.parse_simple_line(&mut stmts)?;
        }
        Ok(stmts)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect(Tok::If)?;
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(Tok::Colon)?;
        arms.push((cond, self.parse_suite()?));
        let mut orelse = Vec::new();
        loop {
            if self.eat(&Tok::Elif) {
                let cond = self.parse_expr()?;
                self.expect(Tok::Colon)?;
                arms.push((cond, self.parse_suite()?));
            } else if self.eat(&Tok::Else) {
                self.expect(Tok::Colon)?;
                orelse = self.parse_suite()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            line,
            kind: StmtKind::If { arms, orelse },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect(Tok::For)?;
        let var = self.expect_name()?;
        self.expect(Tok::In)?;
        let iter = self.parse_expr()?;
        self.expect(Tok::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt {
            line,
            kind: StmtKind::For { var, iter, body },
        })
    }

    fn parse_def(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect(Tok::Def)?;
        let name = self.expect_name()?;
        self.expect(Tok::LParen)?;
        let mut params = Vec::new();
        while self.peek() != Some(&Tok::RParen) {
            let name = self.expect_name()?;
            let default = if self.eat(&Tok::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen)?;
        self.expect(Tok::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt {
            line,
            kind: StmtKind::Def {
                name,
                params,
                body: Rc::new(body),
            },
        })
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let right = self.parse_and()?;
            left = Expr::Logic(LogicOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&Tok::And) {
            let right = self.parse_not()?;
            left = Expr::Logic(LogicOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat(&Tok::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_arith()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => Some(CompareOp::Eq),
            Some(Tok::NotEq) => Some(CompareOp::Ne),
            Some(Tok::Lt) => Some(CompareOp::Lt),
            Some(Tok::LtEq) => Some(CompareOp::Le),
            Some(Tok::Gt) => Some(CompareOp::Gt),
            Some(Tok::GtEq) => Some(CompareOp::Ge),
            Some(Tok::In) => Some(CompareOp::In),
            Some(Tok::Not) if self.peek2() == Some(&Tok::In) => Some(CompareOp::NotIn),
            _ => None,
        };
        match op {
            None => Ok(left),
            Some(op) => {
                self.pos += 1;
                if op == CompareOp::NotIn {
                    self.pos += 1;
                }
                let right = self.parse_arith()?;
                Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
            }
        }
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Tok::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat(&Tok::Dot) {
                let name = self.expect_name()?;
                expr = Expr::Attr(Box::new(expr), name);
            } else if self.eat(&Tok::LParen) {
                let (args, kwargs) = self.parse_call_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat(&Tok::LBracket) {
                let index = self.parse_expr()?;
                self.expect(Tok::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while self.peek() != Some(&Tok::RParen) {
            if let (Some(Tok::Name(name)), Some(Tok::Assign)) = (self.peek(), self.peek2()) {
                let name = name.clone();
                self.pos += 2;
                let value = self.parse_expr()?;
                kwargs.push((name, value));
            } else {
                if !kwargs.is_empty() {
                    bail!(
                        "line {}: positional argument after keyword argument",
                        self.line()
                    );
                }
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen)?;
        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let line = self.line();
        match self.bump() {
            Some(Tok::Str(first)) => {
                // Adjacent string literals concatenate.
                let mut value = first;
                while let Some(Tok::Str(next)) = self.peek() {
                    value.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Str(value))
            }
            Some(Tok::Int(value)) => Ok(Expr::Int(value)),
            Some(Tok::True) => Ok(Expr::Bool(true)),
            Some(Tok::False) => Ok(Expr::Bool(false)),
            Some(Tok::NoneLit) => Ok(Expr::None),
            Some(Tok::Name(name)) => Ok(Expr::Name(name)),
            Some(Tok::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(Tok::RParen)?;
                Ok(expr)
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                while self.peek() != Some(&Tok::RBracket) {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(Tok::LBrace) => {
                let mut items = Vec::new();
                while self.peek() != Some(&Tok::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(Tok::Colon)?;
                    let value = self.parse_expr()?;
                    items.push((key, value));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RBrace)?;
                Ok(Expr::Dict(items))
            }
            other => {
                let found = other
                    .map(|t| t.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                bail!("line {line}: expected an expression, found {found}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_with_kwargs() {
        let stmts = parse("env.SharedLibrary(target='#lib/x', source=['a.cpp'])\n").unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            StmtKind::Expr(Expr::Call { kwargs, .. }) => {
                assert_eq!(kwargs[0].0, "target");
                assert_eq!(kwargs[1].0, "source");
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_if_elif_else() {
        let stmts = parse("if a:\n  x = 1\nelif b:\n  x = 2\nelse:\n  x = 3\n").unwrap();
        match &stmts[0].kind {
            StmtKind::If { arms, orelse } => {
                assert_eq!(arms.len(), 2);
                assert_eq!(orelse.len(), 1);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_def_and_return() {
        let stmts = parse("def probe(code, label=None):\n  return code\n").unwrap();
        match &stmts[0].kind {
            StmtKind::Def { name, params, body } => {
                assert_eq!(name, "probe");
                assert_eq!(params.len(), 2);
                assert!(params[1].default.is_some());
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_not_in() {
        let stmts = parse("x = 'a' not in names\n").unwrap();
        match &stmts[0].kind {
            StmtKind::Assign { value, .. } => {
                assert!(matches!(value, Expr::Compare(CompareOp::NotIn, _, _)));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_config_dict_expression() {
        let expr = parse_expression(
            "{\n  \"modules_required_for_build\": [\"boost\", \"scitbx\"],\n}\n",
        )
        .unwrap();
        assert!(matches!(expr, Expr::Dict(ref items) if items.len() == 1));
    }

    #[test]
    fn rejects_unsupported_statements() {
        assert!(parse("while x:\n  pass\n").is_err());
        assert!(parse("x = lambda: 1\n").is_err());
    }

    #[test]
    fn single_line_suites_work() {
        let stmts = parse("if flag: y = 2\n").unwrap();
        match &stmts[0].kind {
            StmtKind::If { arms, .. } => assert_eq!(arms[0].1.len(), 1),
            other => panic!("unexpected statement: {other:?}"),
        }
    }
}
