use crate::ast::{
    BinaryOp, Expr, ExprKind, ForInit, Function, LogicalOp, Param, Program,
    Stmt, StmtKind, UnaryOp, UpdateOp, VarDecl,
};
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

/// Infix operators, loosest first.
enum Infix {
    Logical(LogicalOp),
    Binary(BinaryOp),
}

fn infix_precedence(kind: &TokenKind) -> Option<(u8, Infix)> {
    use Infix::*;
    Some(match kind {
        TokenKind::OrOr => (1, Logical(LogicalOp::Or)),
        TokenKind::AndAnd => (2, Logical(LogicalOp::And)),
        TokenKind::EqEq => (3, Binary(BinaryOp::Eq)),
        TokenKind::NotEq => (3, Binary(BinaryOp::Ne)),
        TokenKind::EqEqEq => (3, Binary(BinaryOp::StrictEq)),
        TokenKind::NotEqEq => (3, Binary(BinaryOp::StrictNe)),
        TokenKind::Lt => (4, Binary(BinaryOp::Lt)),
        TokenKind::LtEq => (4, Binary(BinaryOp::Le)),
        TokenKind::Gt => (4, Binary(BinaryOp::Gt)),
        TokenKind::GtEq => (4, Binary(BinaryOp::Ge)),
        TokenKind::Plus => (5, Binary(BinaryOp::Add)),
        TokenKind::Minus => (5, Binary(BinaryOp::Sub)),
        TokenKind::Star => (6, Binary(BinaryOp::Mul)),
        TokenKind::Slash => (6, Binary(BinaryOp::Div)),
        TokenKind::Percent => (6, Binary(BinaryOp::Mod)),
        _ => return None,
    })
}

fn assignment_op(kind: &TokenKind) -> Option<Option<BinaryOp>> {
    Some(match kind {
        TokenKind::Assign => None,
        TokenKind::PlusAssign => Some(BinaryOp::Add),
        TokenKind::MinusAssign => Some(BinaryOp::Sub),
        TokenKind::StarAssign => Some(BinaryOp::Mul),
        TokenKind::SlashAssign => Some(BinaryOp::Div),
        TokenKind::PercentAssign => Some(BinaryOp::Mod),
        _ => return None,
    })
}

/// Recursive-descent parser over a token stream.
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: std::iter::Peekable<I>,
    last_span: Span,
    eof: Token,
    function_depth: usize,
    loop_depth: usize,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: I) -> Self {
        let origin = Span::point(Pos::origin());
        Self {
            tokens: tokens.peekable(),
            last_span: origin,
            eof: Token::new(TokenKind::Eof, origin, ""),
            function_depth: 0,
            loop_depth: 0,
        }
    }

    fn peek(&mut self) -> &Token {
        match self.tokens.peek() {
            Some(tok) => tok,
            None => {
                self.eof.span = Span::point(self.last_span.end);
                &self.eof
            }
        }
    }

    fn peek_kind(&mut self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_span(&mut self) -> Span {
        self.peek().span
    }

    fn advance(&mut self) -> Token {
        match self.tokens.next() {
            Some(tok) => {
                self.last_span = tok.span;
                tok
            }
            None => Token::new(TokenKind::Eof, Span::point(self.last_span.end), ""),
        }
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Token, ParseError> {
        let tok = self.advance();
        if std::mem::discriminant(&tok.kind) == std::mem::discriminant(expected) {
            Ok(tok)
        } else {
            Err(unexpected(&tok, expected.name()))
        }
    }

    fn expect_identifier(&mut self) -> Result<(String, Span), ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Identifier(name) => Ok((name, tok.span)),
            _ => Err(unexpected(&tok, "identifier")),
        }
    }

    /// Statement terminator with automatic insertion before `}`, end of
    /// input, or a line break.
    fn consume_semicolon(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Semicolon) {
            return Ok(());
        }
        let tok = self.peek();
        if tok.newline_before || matches!(tok.kind, TokenKind::RBrace | TokenKind::Eof) {
            return Ok(());
        }
        let tok = tok.clone();
        Err(unexpected(&tok, "`;`"))
    }

    /// `true` when a restricted production (`return`, `yield`, postfix
    /// operators) must stop at the next token.
    fn at_statement_end(&mut self) -> bool {
        let tok = self.peek();
        tok.newline_before
            || matches!(
                tok.kind,
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            )
    }

    // ───────────────────────────────────────────────────────────
    //  Program and statements
    // ───────────────────────────────────────────────────────────

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(self.last_span)
    }

    pub fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::Var => {
                self.advance();
                let decls = self.parse_var_decls()?;
                self.consume_semicolon()?;
                StmtKind::Var(decls)
            }
            TokenKind::Function => {
                let func = self.parse_function(true)?;
                StmtKind::FunctionDecl(Box::new(func))
            }
            TokenKind::If => {
                self.advance();
                let test = self.parse_paren_expression()?;
                let consequent = Box::new(self.parse_statement()?);
                let alternate = if self.eat(&TokenKind::Else) {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                StmtKind::If {
                    test,
                    consequent,
                    alternate,
                }
            }
            TokenKind::While => {
                self.advance();
                let test = self.parse_paren_expression()?;
                let body = Box::new(self.parse_loop_body()?);
                StmtKind::While { test, body }
            }
            TokenKind::Do => {
                self.advance();
                let body = Box::new(self.parse_loop_body()?);
                self.expect(&TokenKind::While)?;
                let test = self.parse_paren_expression()?;
                self.eat(&TokenKind::Semicolon);
                StmtKind::DoWhile { body, test }
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Break | TokenKind::Continue => {
                let tok = self.advance();
                if self.loop_depth == 0 {
                    return Err(ParseError::new(
                        format!("{} outside of a loop", tok.kind.name()),
                        tok.span,
                    ));
                }
                self.consume_semicolon()?;
                if tok.kind == TokenKind::Break {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            TokenKind::Return => {
                let tok = self.advance();
                if self.function_depth == 0 {
                    return Err(ParseError::new("`return` outside of a function", tok.span));
                }
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                StmtKind::Return(value)
            }
            TokenKind::Throw => {
                let tok = self.advance();
                if self.peek().newline_before {
                    return Err(ParseError::new("line break after `throw`", tok.span));
                }
                let value = self.parse_expression()?;
                self.consume_semicolon()?;
                StmtKind::Throw(value)
            }
            TokenKind::Try => self.parse_try()?,
            TokenKind::Finally | TokenKind::Catch | TokenKind::Else => {
                let tok = self.advance();
                return Err(unexpected(&tok, "statement"));
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                let tok = self.advance();
                return Err(unexpected(&tok, "`}`"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_loop_body(&mut self) -> Result<Stmt, ParseError> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        body
    }

    fn parse_paren_expression(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let expr = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_var_decls(&mut self) -> Result<Vec<VarDecl>, ParseError> {
        let mut decls = Vec::new();
        loop {
            let (name, span) = self.expect_identifier()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            let span = span.merge(self.last_span);
            decls.push(VarDecl { name, init, span });
            if !self.eat(&TokenKind::Comma) {
                return Ok(decls);
            }
        }
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else if self.eat(&TokenKind::Var) {
            Some(ForInit::Var(self.parse_var_decls()?))
        } else {
            Some(ForInit::Expr(self.parse_expression()?))
        };
        self.expect(&TokenKind::Semicolon)?;
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let block = self.parse_block()?;
        if self.check(&TokenKind::Finally) {
            let tok = self.advance();
            return Err(ParseError::new("`finally` is not supported", tok.span));
        }
        self.expect(&TokenKind::Catch)?;
        self.expect(&TokenKind::LParen)?;
        let (param, _) = self.expect_identifier()?;
        self.expect(&TokenKind::RParen)?;
        let handler = self.parse_block()?;
        if self.check(&TokenKind::Finally) {
            let tok = self.advance();
            return Err(ParseError::new("`finally` is not supported", tok.span));
        }
        Ok(StmtKind::Try {
            block,
            param,
            handler,
        })
    }

    fn parse_function(&mut self, require_name: bool) -> Result<Function, ParseError> {
        let start = self.expect(&TokenKind::Function)?.span;
        let name = if matches!(self.peek_kind(), TokenKind::Identifier(_)) {
            Some(self.expect_identifier()?.0)
        } else if require_name {
            let tok = self.advance();
            return Err(unexpected(&tok, "function name"));
        } else {
            None
        };

        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (name, span) = self.expect_identifier()?;
                params.push(Param { name, span });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        self.loop_depth = saved_loops;

        Ok(Function {
            name,
            params,
            body: body?,
            span: self.span_from(start),
        })
    }

    // ───────────────────────────────────────────────────────────
    //  Expressions
    // ───────────────────────────────────────────────────────────

    /// Comma-separated sequence.
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_assignment()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_assignment()?);
        }
        Ok(Expr::new(ExprKind::Sequence(items), self.span_from(start)))
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        if self.check(&TokenKind::Yield) {
            return self.parse_yield();
        }
        let target = self.parse_conditional()?;
        let Some(op) = assignment_op(self.peek_kind()) else {
            return Ok(target);
        };
        if !target.kind.is_assignable() {
            return Err(ParseError::new("invalid assignment target", target.span));
        }
        self.advance();
        let value = self.parse_assignment()?;
        let span = target.span.merge(value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_yield(&mut self) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        if self.function_depth == 0 {
            return Err(ParseError::new("`yield` outside of a function", start));
        }
        let ends = self.at_statement_end()
            || matches!(
                self.peek_kind(),
                TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::Comma
                    | TokenKind::Colon
            );
        let value = if ends {
            None
        } else {
            Some(Box::new(self.parse_assignment()?))
        };
        Ok(Expr::new(ExprKind::Yield(value), self.span_from(start)))
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_binary(1)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment()?;
        let span = test.span.merge(alternate.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some((prec, infix)) = infix_precedence(self.peek_kind()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span.merge(right.span);
            let (lhs, rhs) = (Box::new(left), Box::new(right));
            let kind = match infix {
                Infix::Logical(op) => ExprKind::Logical { op, lhs, rhs },
                Infix::Binary(op) => ExprKind::Binary { op, lhs, rhs },
            };
            left = Expr::new(kind, span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Typeof => UnaryOp::TypeOf,
            TokenKind::Delete => UnaryOp::Delete,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let tok = self.advance();
                let target = self.parse_unary()?;
                return self.make_update(tok, target, true);
            }
            _ => return self.parse_postfix(),
        };
        let start = self.advance().span;
        let operand = self.parse_unary()?;
        let span = start.merge(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_call_member()?;
        let tok = self.peek();
        if tok.newline_before
            || !matches!(tok.kind, TokenKind::PlusPlus | TokenKind::MinusMinus)
        {
            return Ok(expr);
        }
        let tok = self.advance();
        self.make_update(tok, expr, false)
    }

    fn make_update(&mut self, tok: Token, target: Expr, prefix: bool) -> Result<Expr, ParseError> {
        if !target.kind.is_assignable() {
            return Err(ParseError::new(
                format!("invalid operand for {}", tok.kind.name()),
                target.span,
            ));
        }
        let op = if tok.kind == TokenKind::PlusPlus {
            UpdateOp::Increment
        } else {
            UpdateOp::Decrement
        };
        let span = tok.span.merge(target.span);
        Ok(Expr::new(
            ExprKind::Update {
                op,
                prefix,
                target: Box::new(target),
            },
            span,
        ))
    }

    fn parse_call_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let tok = self.advance();
                    let property = match tok.kind {
                        TokenKind::Identifier(name) => name,
                        ref kind if TokenKind::keyword(&tok.lexeme).as_ref() == Some(kind) => {
                            tok.lexeme.clone()
                        }
                        _ => return Err(unexpected(&tok, "property name")),
                    };
                    let span = expr.span.merge(tok.span);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let end = self.expect(&TokenKind::RBracket)?.span;
                    let span = expr.span.merge(end);
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_assignment()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let end = self.expect(&TokenKind::RParen)?.span;
                    let span = expr.span.merge(end);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if self.check(&TokenKind::Function) {
            let func = self.parse_function(false)?;
            let span = func.span;
            return Ok(Expr::new(ExprKind::Function(Box::new(func)), span));
        }
        if self.check(&TokenKind::LBrace) {
            return self.parse_object_literal();
        }
        let tok = self.advance();
        let kind = match tok.kind {
            TokenKind::Number(v) => ExprKind::Number(v),
            TokenKind::String(s) => ExprKind::String(s),
            TokenKind::Identifier(name) => ExprKind::Ident(name),
            TokenKind::This => ExprKind::This,
            TokenKind::Null => ExprKind::Null,
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                let end = self.expect(&TokenKind::RParen)?.span;
                return Ok(Expr::new(inner.kind, tok.span.merge(end)));
            }
            TokenKind::Error(message) => return Err(ParseError::new(message, tok.span)),
            _ => return Err(unexpected(&tok, "expression")),
        };
        Ok(Expr::new(kind, tok.span))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(&TokenKind::LBrace)?.span;
        let mut props = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let tok = self.advance();
            let key = match tok.kind {
                TokenKind::Identifier(name) => name,
                TokenKind::String(s) => s,
                TokenKind::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                    format!("{}", n as i64)
                }
                ref kind if TokenKind::keyword(&tok.lexeme).as_ref() == Some(kind) => {
                    tok.lexeme.clone()
                }
                _ => return Err(unexpected(&tok, "property name")),
            };
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_assignment()?;
            props.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace)?.span;
        Ok(Expr::new(ExprKind::Object(props), start.merge(end)))
    }
}

fn unexpected(tok: &Token, expected: &str) -> ParseError {
    if let TokenKind::Error(message) = &tok.kind {
        return ParseError::new(message.clone(), tok.span);
    }
    ParseError::new(
        format!("expected {}, found {}", expected, tok.kind.name()),
        tok.span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Result<Program, ParseError> {
        Parser::new(Lexer::from_str(src)).parse_program()
    }

    fn expr(src: &str) -> ExprKind {
        match parse(src).unwrap().body.remove(0).kind {
            StmtKind::Expr(e) => e.kind,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn function_declaration_with_params() {
        let program = parse("function f(a, b) { arguments[0] = 9; return a; }").unwrap();
        let StmtKind::FunctionDecl(func) = &program.body[0].kind else {
            panic!("expected function declaration");
        };
        assert_eq!(func.name.as_deref(), Some("f"));
        let names: Vec<_> = func.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(func.body.len(), 2);
        assert!(matches!(func.body[1].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn precedence_and_associativity() {
        let ExprKind::Binary { op, lhs, rhs } = expr("1 + 2 * 3 - 4") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert!(matches!(rhs.kind, ExprKind::Number(n) if n == 4.0));
        let ExprKind::Binary { op, rhs: mul, .. } = lhs.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(mul.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn logical_binds_looser_than_equality() {
        let ExprKind::Logical { op, lhs, .. } = expr("a == 1 || b && c") else {
            panic!("expected logical");
        };
        assert_eq!(op, LogicalOp::Or);
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let ExprKind::Assign { op: None, value, .. } = expr("a = b += 1") else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Assign { op: Some(BinaryOp::Add), .. }));
    }

    #[test]
    fn invalid_assignment_target() {
        assert!(parse("f() = 1").is_err());
        assert!(parse("1++").is_err());
    }

    #[test]
    fn member_call_chain() {
        let ExprKind::Call { callee, args } = expr("(0.1).toString(16)") else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert!(matches!(
            callee.kind,
            ExprKind::Member { ref property, .. } if property == "toString"
        ));
    }

    #[test]
    fn semicolon_insertion() {
        let program = parse("var a = 1\nvar b = a\nb").unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(parse("var a = 1 var b").is_err());
    }

    #[test]
    fn return_stops_at_newline() {
        let program = parse("function f() { return\n1 }").unwrap();
        let StmtKind::FunctionDecl(func) = &program.body[0].kind else {
            panic!();
        };
        assert!(matches!(func.body[0].kind, StmtKind::Return(None)));
        assert_eq!(func.body.len(), 2);
    }

    #[test]
    fn postfix_needs_same_line() {
        let program = parse("a\n++b").unwrap();
        assert_eq!(program.body.len(), 2);
        assert!(matches!(
            &program.body[1].kind,
            StmtKind::Expr(Expr { kind: ExprKind::Update { prefix: true, .. }, .. })
        ));
    }

    #[test]
    fn control_flow_statements() {
        let src = "for (var i = 0; i < 3; i++) { if (i) continue; else break; }\n\
                   do { x-- } while (x)\n\
                   while (false) ;\n\
                   try { throw 1 } catch (e) { e }";
        let program = parse(src).unwrap();
        assert!(matches!(program.body[0].kind, StmtKind::For { .. }));
        assert!(matches!(program.body[1].kind, StmtKind::DoWhile { .. }));
        assert!(matches!(program.body[2].kind, StmtKind::While { .. }));
        assert!(matches!(
            &program.body[3].kind,
            StmtKind::Try { param, .. } if param == "e"
        ));
        assert_eq!(program.body[1].line(), 2);
    }

    #[test]
    fn finally_is_rejected() {
        let err = parse("try { } catch (e) { } finally { }").unwrap_err();
        assert!(err.message.contains("finally"));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        assert!(parse("break;").is_err());
        assert!(parse("while (1) { function f() { break; } }").is_err());
        assert!(parse("return 1").is_err());
    }

    #[test]
    fn object_literal_and_function_expression() {
        let ExprKind::Assign { value, .. } = expr("o = { a: 1, 'b': function () { return this }, 2: null, }") else {
            panic!("expected assignment");
        };
        let ExprKind::Object(props) = value.kind else {
            panic!("expected object");
        };
        let keys: Vec<_> = props.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "b", "2"]);
        assert!(matches!(props[1].1.kind, ExprKind::Function(_)));
    }

    #[test]
    fn yield_forms() {
        let program = parse("function g() { var x = yield 1; yield\n return x }").unwrap();
        let StmtKind::FunctionDecl(func) = &program.body[0].kind else {
            panic!();
        };
        let StmtKind::Var(decls) = &func.body[0].kind else {
            panic!();
        };
        assert!(matches!(
            decls[0].init.as_ref().map(|e| &e.kind),
            Some(ExprKind::Yield(Some(_)))
        ));
        assert!(matches!(
            &func.body[1].kind,
            StmtKind::Expr(Expr { kind: ExprKind::Yield(None), .. })
        ));
        assert!(parse("yield 1").is_err());
    }

    #[test]
    fn lexer_errors_surface() {
        let err = parse("var s = \"open").unwrap_err();
        assert_eq!(err.message, "unterminated string");
    }

    #[test]
    fn error_display() {
        let err = parse("var 1").unwrap_err();
        assert_eq!(err.to_string(), "expected identifier, found number at 1:5-1:6");
    }
}
