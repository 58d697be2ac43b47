use crate::ast::{
    BinaryOp, Callee, Expr, FunctionDecl, LogicalOp, Script, Stmt, StmtKind, UnaryOp,
};
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenWithPos};

/// Parse a script source string into a [`Script`].
pub fn parse_script(src: &str) -> Result<Script, ParseError> {
    let tokens = Lexer::new(src).tokenize()?;
    Parser::new(tokens).parse_script()
}

/// Deepest nesting of blocks, parentheses and unary operators.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Most binary operators a single statement may chain.
pub const MAX_OPERATORS: usize = 512;

// ── Parser ────────────────────────────────────────────────────────────────

pub struct Parser {
    tokens: Vec<TokenWithPos>,
    pos: usize,
    depth: usize,
    /// Binary operators seen in the current statement.
    operators: usize,
}

impl Parser {
    pub fn new(tokens: Vec<TokenWithPos>) -> Self {
        Self { tokens, pos: 0, depth: 0, operators: 0 }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.err("nesting too deep"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn count_operator(&mut self) -> Result<(), ParseError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(self.err("expression too long"));
        }
        Ok(())
    }

    fn current_pos(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.col))
            .unwrap_or((1, 1))
    }

    fn line(&self) -> usize {
        self.current_pos().0
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn peek_ahead(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).map(|t| t.token.clone()).unwrap_or(Token::Eof);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        let (line, col) = self.current_pos();
        ParseError::new(msg, line, col)
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(s) => {
                self.advance();
                Ok(s)
            }
            tok => Err(self.err(format!("expected identifier, got {:?}", tok))),
        }
    }

    fn expect_token(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}, got {:?}", expected, self.peek())))
        }
    }

    /// Statements may omit their trailing `;`.
    fn end_statement(&mut self) {
        self.eat(&Token::Semicolon);
    }

    // ── Script ────────────────────────────────────────────────────────────

    pub fn parse_script(&mut self) -> Result<Script, ParseError> {
        let mut body = Vec::new();
        while self.peek() != &Token::Eof {
            body.push(self.parse_statement()?);
        }
        Ok(Script { body })
    }

    // ── Statements ────────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        self.nested(Self::statement)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        self.operators = 0;
        let line = self.line();
        let kind = match self.peek() {
            Token::Var | Token::Let | Token::Const => {
                let decl = self.parse_var_decl()?;
                self.end_statement();
                decl
            }
            Token::If => self.parse_if()?,
            Token::While => {
                self.advance();
                let test = self.parse_paren_expr()?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::While { test, body }
            }
            Token::Do => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                self.expect_token(&Token::While)?;
                let test = self.parse_paren_expr()?;
                self.end_statement();
                StmtKind::DoWhile { body, test }
            }
            Token::For => self.parse_for()?,
            Token::Break => {
                self.advance();
                self.end_statement();
                StmtKind::Break
            }
            Token::Continue => {
                self.advance();
                self.end_statement();
                StmtKind::Continue
            }
            Token::Return => {
                self.advance();
                let value = match self.peek() {
                    Token::Semicolon | Token::RBrace | Token::Eof => None,
                    _ => Some(self.parse_expression()?),
                };
                self.end_statement();
                StmtKind::Return(value)
            }
            Token::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.end_statement();
                StmtKind::Throw(value)
            }
            Token::Function => StmtKind::Function(self.parse_function()?),
            Token::LBrace => StmtKind::Block(self.parse_block()?),
            Token::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            _ => {
                let expr = self.parse_expression()?;
                self.end_statement();
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, line })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_token(&Token::LBrace)?;
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Token::RBrace => {
                    self.advance();
                    return Ok(body);
                }
                Token::Eof => return Err(self.err("unclosed '{' block")),
                _ => body.push(self.parse_statement()?),
            }
        }
    }

    fn parse_var_decl(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // consume `var` / `let` / `const`
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat(&Token::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(StmtKind::VarDecl(decls))
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // consume `if`
        let test = self.parse_paren_expr()?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.eat(&Token::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(StmtKind::If { test, then, otherwise })
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // consume `for`
        self.expect_token(&Token::LParen)?;

        let init = match self.peek() {
            Token::Semicolon => None,
            Token::Var | Token::Let | Token::Const => {
                let line = self.line();
                Some(Box::new(Stmt { kind: self.parse_var_decl()?, line }))
            }
            _ => {
                let line = self.line();
                Some(Box::new(Stmt { kind: StmtKind::Expr(self.parse_expression()?), line }))
            }
        };
        self.expect_token(&Token::Semicolon)?;

        let test = match self.peek() {
            Token::Semicolon => None,
            _ => Some(self.parse_expression()?),
        };
        self.expect_token(&Token::Semicolon)?;

        let update = match self.peek() {
            Token::RParen => None,
            _ => Some(self.parse_expression()?),
        };
        self.expect_token(&Token::RParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::For { init, test, update, body })
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, ParseError> {
        self.advance(); // consume `function`
        let name = self.expect_ident()?;
        self.expect_token(&Token::LParen)?;
        let mut params = Vec::new();
        if self.peek() != &Token::RParen {
            loop {
                params.push(self.expect_ident()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect_token(&Token::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDecl { name, params, body })
    }

    fn parse_paren_expr(&mut self) -> Result<Expr, ParseError> {
        self.expect_token(&Token::LParen)?;
        let expr = self.parse_expression()?;
        self.expect_token(&Token::RParen)?;
        Ok(expr)
    }

    // ── Expressions ───────────────────────────────────────────────────────

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        if let Token::Ident(name) = self.peek().clone() {
            let op = match self.peek_ahead(1) {
                Token::Assign => Some(None),
                Token::PlusAssign => Some(Some(BinaryOp::Add)),
                Token::MinusAssign => Some(Some(BinaryOp::Sub)),
                Token::StarAssign => Some(Some(BinaryOp::Mul)),
                Token::SlashAssign => Some(Some(BinaryOp::Div)),
                Token::PercentAssign => Some(Some(BinaryOp::Rem)),
                _ => None,
            };
            if let Some(op) = op {
                self.advance();
                self.advance();
                let value = Box::new(self.parse_assignment()?);
                return Ok(Expr::Assign { target: name, op, value });
            }
        }
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_logical_or()?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let then = self.parse_assignment()?;
        self.expect_token(&Token::Colon)?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_logical_and()?;
        while self.eat(&Token::OrOr) {
            self.count_operator()?;
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Logical { op: LogicalOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            self.count_operator()?;
            let rhs = self.parse_equality()?;
            lhs = Expr::Logical { op: LogicalOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                Token::EqEqEq => BinaryOp::StrictEq,
                Token::NotEqEq => BinaryOp::StrictNotEq,
                _ => return Ok(lhs),
            };
            self.advance();
            self.count_operator()?;
            let rhs = self.parse_relational()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::LtEq => BinaryOp::LtEq,
                Token::Gt => BinaryOp::Gt,
                Token::GtEq => BinaryOp::GtEq,
                _ => return Ok(lhs),
            };
            self.advance();
            self.count_operator()?;
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            self.count_operator()?;
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            self.count_operator()?;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            Token::PlusPlus | Token::MinusMinus => {
                let increment = self.advance() == Token::PlusPlus;
                let target = self.expect_ident()?;
                return Ok(Expr::Update { target, increment, prefix: true });
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = Box::new(self.nested(Self::parse_unary)?);
        Ok(Expr::Unary { op, operand })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek_ahead(1), Token::PlusPlus | Token::MinusMinus) {
            if let Token::Ident(name) = self.peek().clone() {
                self.advance();
                let increment = self.advance() == Token::PlusPlus;
                return Ok(Expr::Update { target: name, increment, prefix: false });
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::LParen => {
                let expr = self.parse_expression()?;
                self.expect_token(&Token::RParen)?;
                Ok(expr)
            }
            Token::Ident(name) => {
                if self.eat(&Token::Dot) {
                    let property = self.expect_ident()?;
                    if self.peek() == &Token::LParen {
                        let args = self.parse_args()?;
                        let callee = Callee::Member { object: name, property };
                        return Ok(Expr::Call { callee, args });
                    }
                    return Ok(Expr::Member { object: name, property });
                }
                if self.peek() == &Token::LParen {
                    let args = self.parse_args()?;
                    return Ok(Expr::Call { callee: Callee::Name(name), args });
                }
                Ok(Expr::Ident(name))
            }
            tok => {
                // Report the position of the offending token, not the next one.
                self.pos = self.pos.saturating_sub(1);
                Err(self.err(format!("unexpected token {:?}", tok)))
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_token(&Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            loop {
                args.push(self.parse_assignment()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect_token(&Token::RParen)?;
        Ok(args)
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> Expr {
        match parse_script(src).unwrap().body.remove(0).kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            expr("1 + 2 * 3"),
            binary(
                BinaryOp::Add,
                Expr::Number(1.0),
                binary(BinaryOp::Mul, Expr::Number(2.0), Expr::Number(3.0)),
            )
        );
    }

    #[test]
    fn assignment_is_right_associative() {
        let Expr::Assign { target, value, .. } = expr("a = b = 1") else { panic!() };
        assert_eq!(target, "a");
        assert!(matches!(*value, Expr::Assign { .. }));
    }

    #[test]
    fn call_with_trailing_block_id() {
        let Expr::Call { callee, args } = expr("moveForward('block_id_abc');") else { panic!() };
        assert_eq!(callee, Callee::Name("moveForward".into()));
        assert_eq!(args, vec![Expr::Str("block_id_abc".into())]);
    }

    #[test]
    fn member_call() {
        let Expr::Call { callee, .. } = expr("Math.sqrt(4)") else { panic!() };
        assert_eq!(callee, Callee::Member { object: "Math".into(), property: "sqrt".into() });
    }

    #[test]
    fn postfix_and_prefix_updates() {
        assert_eq!(expr("i++"), Expr::Update { target: "i".into(), increment: true, prefix: false });
        assert_eq!(expr("--i"), Expr::Update { target: "i".into(), increment: false, prefix: true });
    }

    #[test]
    fn statement_lines() {
        let script = parse_script("var a = 1;\n\nif (a) {\n  a = 2;\n}").unwrap();
        assert_eq!(script.body[0].line, 1);
        assert_eq!(script.body[1].line, 3);
    }

    #[test]
    fn for_loop_parts_are_optional() {
        let script = parse_script("for (;;) { break; }").unwrap();
        let StmtKind::For { init, test, update, .. } = &script.body[0].kind else { panic!() };
        assert!(init.is_none() && test.is_none() && update.is_none());
    }

    // ── Limits ────────────────────────────────────────────────────────────

    fn too_deep(src: &str) {
        let err = parse_script(src).unwrap_err();
        assert!(err.message.contains("nesting too deep"), "{err}");
    }

    #[test]
    fn deep_parentheses_are_rejected() {
        let n = 50_000;
        too_deep(&format!("var a = {}1{};", "(".repeat(n), ")".repeat(n)));
    }

    #[test]
    fn deep_unary_chains_are_rejected() {
        too_deep(&format!("var a = {}1;", "-".repeat(50_000)));
        too_deep(&format!("var a = {}true;", "!".repeat(50_000)));
    }

    #[test]
    fn deep_blocks_are_rejected() {
        let n = 50_000;
        too_deep(&format!("{}{}", "{".repeat(n), "}".repeat(n)));
        too_deep(&"if (a) ".repeat(n));
    }

    #[test]
    fn nesting_within_the_limit_parses() {
        let n = MAX_NESTING_DEPTH / 4;
        assert!(parse_script(&format!("var a = {}1{};", "(".repeat(n), ")".repeat(n))).is_ok());
        assert!(parse_script(&format!("{}{}", "{".repeat(n), "}".repeat(n))).is_ok());
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        let err = parse_script(&format!("var a = 1{};", " + 1".repeat(50_000))).unwrap_err();
        assert!(err.message.contains("expression too long"), "{err}");
        assert!(parse_script(&format!("var a = 1{};", " + 1".repeat(100))).is_ok());
    }

    #[test]
    fn missing_paren_reports_position() {
        let err = parse_script("if (x {\n}").unwrap_err();
        assert_eq!((err.line, err.col), (1, 7));
    }
}
