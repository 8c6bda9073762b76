//! Pratt parser: token list → `Program` AST (§4.2). The expression-parsing
//! algorithm (prefix dispatch, then a precedence-climbing infix loop) and
//! the statement grammar are grounded directly on `dai_parse.c` and the
//! `dai_parse/*.h` family — same precedence tier names and ordering, same
//! "first syntax error aborts" strategy, same `;`-terminated statement
//! forms including the if/elif/else chain and while loop both ending in an
//! optional trailing `;`.

use crate::ast::{
    AssignOp, ClassDecl, ClassField, Expr, ExprKind, FunctionLiteral, InfixOp, PrefixOp, Program, Stmt, StmtKind,
};
use crate::error::SyntaxError;
use crate::lexer::{Span, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Not,
    Compare,
    BitOr,
    BitXor,
    BitAnd,
    Shift,
    Sum,
    Product,
    Prefix,
    Call,
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        OrOr => Precedence::Or,
        AndAnd => Precedence::And,
        EqEq | Ne | Lt | Le | Gt | Ge => Precedence::Compare,
        Pipe => Precedence::BitOr,
        Caret => Precedence::BitXor,
        Amp => Precedence::BitAnd,
        Shl | Shr => Precedence::Shift,
        Plus | Minus => Precedence::Sum,
        Star | Slash | Percent => Precedence::Product,
        LParen | Dot | LBracket => Precedence::Call,
        _ => Precedence::Lowest,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
}

type PResult<T> = Result<T, SyntaxError>;

impl Parser {
    pub fn new(tokens: Vec<Token>, file: impl Into<String>) -> Self {
        Parser { tokens, pos: 0, file: file.into() }
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn advance(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn cur_is(&self, kind: &TokenKind) -> bool {
        &self.cur().kind == kind
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn err(&self, msg: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.file.clone(), self.cur().span.start, msg)
    }

    /// Advances past `kind` if the *next* token matches, else raises a
    /// syntax error — mirrors `Parser_expectPeek`.
    fn expect_peek(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.peek().kind == kind {
            self.advance();
            Ok(self.cur().clone())
        } else {
            Err(SyntaxError::new(
                self.file.clone(),
                self.peek().span.start,
                format!("expected {:?}, found {:?}", kind, self.peek().kind),
            ))
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(_) => {
                self.advance();
                match &self.cur().kind {
                    TokenKind::Ident(s) => Ok(s.clone()),
                    _ => unreachable!(),
                }
            }
            other => Err(SyntaxError::new(
                self.file.clone(),
                self.peek().span.start,
                format!("expected identifier, found {other:?}"),
            )),
        }
    }

    fn skip_optional_semicolon(&mut self) {
        if self.peek_is(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut statements = Vec::new();
        while !self.cur_is(&TokenKind::Eof) {
            statements.push(self.parse_statement()?);
            self.advance();
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        match &self.cur().kind {
            TokenKind::KwVar | TokenKind::KwCon => self.parse_var_statement(),
            TokenKind::KwReturn => self.parse_return_statement(),
            TokenKind::KwIf => self.parse_if_statement(),
            TokenKind::KwWhile => self.parse_while_statement(),
            TokenKind::KwFor => self.parse_for_statement(),
            TokenKind::KwBreak => {
                let span = self.cur().span;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Stmt { span, kind: StmtKind::Break })
            }
            TokenKind::KwContinue => {
                let span = self.cur().span;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Stmt { span, kind: StmtKind::Continue })
            }
            TokenKind::KwFn => self.parse_function_declaration(),
            TokenKind::KwClass => self.parse_class_declaration(),
            TokenKind::LBrace => self.parse_block_as_stmt(),
            _ => self.parse_expr_or_assign_statement(),
        }
    }

    fn parse_block_as_stmt(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        let body = self.parse_block()?;
        Ok(Stmt { span, kind: StmtKind::Block(body) })
    }

    /// Cursor must be on `{`; leaves cursor on the matching `}`.
    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.advance(); // consume '{'
        while !self.cur_is(&TokenKind::RBrace) && !self.cur_is(&TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
            self.advance();
        }
        if !self.cur_is(&TokenKind::RBrace) {
            return Err(self.err("expected '}'"));
        }
        Ok(stmts)
    }

    fn parse_var_statement(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        let is_const = self.cur_is(&TokenKind::KwCon);
        let name = self.expect_ident()?;
        self.expect_peek(TokenKind::Assign)?;
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Stmt { span, kind: StmtKind::Var { name, is_const, value } })
    }

    fn parse_return_statement(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        if self.peek_is(&TokenKind::Semicolon) {
            self.advance();
            return Ok(Stmt { span, kind: StmtKind::Return(None) });
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Stmt { span, kind: StmtKind::Return(Some(value)) })
    }

    fn parse_if_statement(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        let mut branches = Vec::new();
        branches.push(self.parse_if_branch()?);
        while self.peek_is(&TokenKind::KwElif) {
            self.advance();
            branches.push(self.parse_if_branch()?);
        }
        let else_branch = if self.peek_is(&TokenKind::KwElse) {
            self.advance();
            self.expect_peek(TokenKind::LBrace)?;
            Some(self.parse_block()?)
        } else {
            None
        };
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Stmt { span, kind: StmtKind::If { branches, else_branch } })
    }

    /// Cursor on `if`/`elif`; parses `(cond) { body }`.
    fn parse_if_branch(&mut self) -> PResult<(Expr, Vec<Stmt>)> {
        self.expect_peek(TokenKind::LParen)?;
        self.advance();
        let cond = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RParen)?;
        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        Ok((cond, body))
    }

    fn parse_while_statement(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.expect_peek(TokenKind::LParen)?;
        self.advance();
        let cond = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RParen)?;
        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        self.skip_optional_semicolon();
        Ok(Stmt { span, kind: StmtKind::While { cond, body } })
    }

    /// `for (i, e in iterable) { body }`.
    fn parse_for_statement(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.expect_peek(TokenKind::LParen)?;
        let index_name = self.expect_ident()?;
        self.expect_peek(TokenKind::Comma)?;
        let elem_name = self.expect_ident()?;
        self.expect_peek(TokenKind::KwIn)?;
        self.advance();
        let iterable = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RParen)?;
        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        self.skip_optional_semicolon();
        Ok(Stmt { span, kind: StmtKind::ForIn { index_name, elem_name, iterable, body } })
    }

    fn parse_function_declaration(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        let name = self.expect_ident()?;
        let func = self.parse_function_tail(Some(name))?;
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Stmt { span, kind: StmtKind::FunctionDecl(func) })
    }

    /// Cursor on the function name (or `fn` for anonymous literals); parses
    /// `(params) { body }` and leaves the cursor on the closing `}`.
    fn parse_function_tail(&mut self, name: Option<String>) -> PResult<FunctionLiteral> {
        let span = self.cur().span;
        self.expect_peek(TokenKind::LParen)?;
        let (params, defaults) = self.parse_function_parameters()?;
        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        Ok(FunctionLiteral { name, params, defaults, body, span })
    }

    /// Cursor starts on `(`; each parameter is `ident` or `ident = expr`.
    fn parse_function_parameters(&mut self) -> PResult<(Vec<String>, Vec<Option<Expr>>)> {
        let mut params = Vec::new();
        let mut defaults = Vec::new();
        if self.peek_is(&TokenKind::RParen) {
            self.advance();
            return Ok((params, defaults));
        }
        loop {
            let name = self.expect_ident()?;
            let default = if self.peek_is(&TokenKind::Assign) {
                self.advance();
                self.advance();
                Some(self.parse_expression(Precedence::Lowest)?)
            } else {
                None
            };
            params.push(name);
            defaults.push(default);
            if self.peek_is(&TokenKind::Comma) {
                self.advance();
                if self.peek_is(&TokenKind::RParen) {
                    break; // trailing comma
                }
            } else {
                break;
            }
        }
        self.expect_peek(TokenKind::RParen)?;
        Ok((params, defaults))
    }

    fn parse_class_declaration(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        let name = self.expect_ident()?;
        let parent = if self.peek_is(&TokenKind::Lt) {
            self.advance();
            self.advance();
            let parent_name = match &self.cur().kind {
                TokenKind::Ident(s) => s.clone(),
                _ => return Err(self.err("expected parent class name")),
            };
            Some(Expr::new(self.cur().span, ExprKind::Ident(parent_name)))
        } else {
            None
        };
        self.expect_peek(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        let mut class_fields = Vec::new();
        let mut methods = Vec::new();
        let mut class_methods = Vec::new();

        self.advance(); // consume '{'
        while !self.cur_is(&TokenKind::RBrace) && !self.cur_is(&TokenKind::Eof) {
            match &self.cur().kind {
                TokenKind::KwVar | TokenKind::KwInsVar => {
                    fields.push(self.parse_class_field(false)?);
                }
                TokenKind::KwClassVar => {
                    class_fields.push(self.parse_class_field(true)?);
                }
                TokenKind::KwFn => {
                    let name = self.expect_ident()?;
                    methods.push(self.parse_function_tail(Some(name))?);
                    self.expect_peek(TokenKind::Semicolon)?;
                }
                TokenKind::KwClassFn => {
                    let name = self.expect_ident()?;
                    class_methods.push(self.parse_function_tail(Some(name))?);
                    self.expect_peek(TokenKind::Semicolon)?;
                }
                other => return Err(self.err(format!("invalid statement in class scope: {other:?}"))),
            }
            self.advance();
        }
        if !self.cur_is(&TokenKind::RBrace) {
            return Err(self.err("expected '}'"));
        }
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Stmt {
            span,
            kind: StmtKind::ClassDecl(ClassDecl { name, parent, fields, class_fields, methods, class_methods, span }),
        })
    }

    /// Cursor on `var`/`insvar`/`classvar`; `name;` or `name = expr;`.
    fn parse_class_field(&mut self, _is_class_field: bool) -> PResult<ClassField> {
        let name = self.expect_ident()?;
        if self.peek_is(&TokenKind::Semicolon) {
            self.advance();
            return Ok(ClassField { name, is_const: false, default: None });
        }
        self.expect_peek(TokenKind::Assign)?;
        self.advance();
        let default = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(ClassField { name, is_const: false, default: Some(default) })
    }

    fn parse_expr_or_assign_statement(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        let expr = self.parse_expression(Precedence::Lowest)?;
        let op = match &self.peek().kind {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::Add),
            TokenKind::MinusAssign => Some(AssignOp::Sub),
            TokenKind::StarAssign => Some(AssignOp::Mul),
            TokenKind::SlashAssign => Some(AssignOp::Div),
            _ => None,
        };
        if let Some(op) = op {
            if !is_assignable(&expr) {
                return Err(self.err("invalid assignment target"));
            }
            self.advance();
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            self.expect_peek(TokenKind::Semicolon)?;
            return Ok(Stmt { span, kind: StmtKind::Assign { target: expr, op, value } });
        }
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Stmt { span, kind: StmtKind::Expr(expr) })
    }

    fn parse_expression(&mut self, precedence: Precedence) -> PResult<Expr> {
        let mut left = self.parse_prefix()?;
        while !self.peek_is(&TokenKind::Semicolon) && precedence < precedence_of(&self.peek().kind) {
            self.advance();
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        let tok = self.cur().clone();
        match &tok.kind {
            TokenKind::Int(n) => Ok(Expr::new(tok.span, ExprKind::Int(*n))),
            TokenKind::Float(f) => Ok(Expr::new(tok.span, ExprKind::Float(*f))),
            TokenKind::Str(s) => Ok(Expr::new(tok.span, ExprKind::Str(s.clone()))),
            TokenKind::KwTrue => Ok(Expr::new(tok.span, ExprKind::Bool(true))),
            TokenKind::KwFalse => Ok(Expr::new(tok.span, ExprKind::Bool(false))),
            TokenKind::KwNil => Ok(Expr::new(tok.span, ExprKind::Nil)),
            TokenKind::KwSelf => Ok(Expr::new(tok.span, ExprKind::SelfExpr)),
            TokenKind::KwSuper => {
                self.expect_peek(TokenKind::Dot)?;
                let name = self.expect_ident()?;
                Ok(Expr::new(tok.span, ExprKind::SuperProperty(name)))
            }
            TokenKind::Ident(name) => Ok(Expr::new(tok.span, ExprKind::Ident(name.clone()))),
            TokenKind::Minus => {
                self.advance();
                let expr = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::new(Span::merge(tok.span, expr.span), ExprKind::Prefix { op: PrefixOp::Neg, expr }))
            }
            TokenKind::Bang => {
                self.advance();
                let expr = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::new(Span::merge(tok.span, expr.span), ExprKind::Prefix { op: PrefixOp::Not, expr }))
            }
            TokenKind::Tilde => {
                self.advance();
                let expr = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::new(Span::merge(tok.span, expr.span), ExprKind::Prefix { op: PrefixOp::BitNot, expr }))
            }
            TokenKind::KwNot => {
                self.advance();
                let expr = self.parse_expression(Precedence::Not)?;
                Ok(Expr::new(Span::merge(tok.span, expr.span), ExprKind::Prefix { op: PrefixOp::Not, expr }))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect_peek(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_map_literal(),
            TokenKind::KwFn => {
                let func = self.parse_function_tail(None)?;
                Ok(Expr::new(func.span, ExprKind::Function(func)))
            }
            other => Err(self.err(format!("no prefix parse function for {other:?}"))),
        }
    }

    fn parse_infix(&mut self, left: Expr) -> PResult<Expr> {
        let tok = self.cur().clone();
        match &tok.kind {
            TokenKind::AndAnd => {
                let right = self.parse_expression(Precedence::And)?;
                Ok(Expr::new(Span::merge(left.span, right.span), ExprKind::And { left, right }))
            }
            TokenKind::OrOr => {
                let right = self.parse_expression(Precedence::Or)?;
                Ok(Expr::new(Span::merge(left.span, right.span), ExprKind::Or { left, right }))
            }
            TokenKind::LParen => self.parse_call(left),
            TokenKind::Dot => self.parse_dot(left),
            TokenKind::LBracket => self.parse_subscript(left),
            _ => {
                let op = infix_op(&tok.kind).ok_or_else(|| self.err(format!("not an infix operator: {:?}", tok.kind)))?;
                let prec = precedence_of(&tok.kind);
                self.advance();
                let right = self.parse_expression(prec)?;
                Ok(Expr::new(Span::merge(left.span, right.span), ExprKind::Infix { op, left, right }))
            }
        }
    }

    fn parse_call(&mut self, callee: Expr) -> PResult<Expr> {
        let args = self.parse_expression_list(TokenKind::RParen)?;
        let span = Span::merge(callee.span, self.cur().span);
        Ok(Expr::new(span, ExprKind::Call { callee, args }))
    }

    fn parse_dot(&mut self, object: Expr) -> PResult<Expr> {
        let name = self.expect_ident()?;
        let span = Span::merge(object.span, self.cur().span);
        Ok(Expr::new(span, ExprKind::Dot { object, name }))
    }

    fn parse_subscript(&mut self, object: Expr) -> PResult<Expr> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RBracket)?;
        let span = Span::merge(object.span, self.cur().span);
        Ok(Expr::new(span, ExprKind::Subscript { object, index }))
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        let start = self.cur().span;
        let items = self.parse_expression_list(TokenKind::RBracket)?;
        Ok(Expr::new(Span::merge(start, self.cur().span), ExprKind::Array(items)))
    }

    /// Cursor on the opening delimiter (e.g. `(` or `[`); consumes up to and
    /// including `end`, supporting a trailing comma.
    fn parse_expression_list(&mut self, end: TokenKind) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.peek_is(&end) {
            self.advance();
            return Ok(items);
        }
        self.advance();
        items.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            if self.peek_is(&end) {
                break; // trailing comma
            }
            self.advance();
            items.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_peek(end)?;
        Ok(items)
    }

    fn parse_map_literal(&mut self) -> PResult<Expr> {
        let start = self.cur().span;
        let mut pairs = Vec::new();
        if self.peek_is(&TokenKind::RBrace) {
            self.advance();
            return Ok(Expr::new(Span::merge(start, self.cur().span), ExprKind::Map(pairs)));
        }
        loop {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect_peek(TokenKind::Colon)?;
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if self.peek_is(&TokenKind::Comma) {
                self.advance();
                if self.peek_is(&TokenKind::RBrace) {
                    break;
                }
            } else {
                break;
            }
        }
        self.expect_peek(TokenKind::RBrace)?;
        Ok(Expr::new(Span::merge(start, self.cur().span), ExprKind::Map(pairs)))
    }
}

fn infix_op(kind: &TokenKind) -> Option<InfixOp> {
    use TokenKind::*;
    Some(match kind {
        Plus => InfixOp::Add,
        Minus => InfixOp::Sub,
        Star => InfixOp::Mul,
        Slash => InfixOp::Div,
        Percent => InfixOp::Mod,
        Shl => InfixOp::Shl,
        Shr => InfixOp::Shr,
        Amp => InfixOp::BitAnd,
        Pipe => InfixOp::BitOr,
        Caret => InfixOp::BitXor,
        EqEq => InfixOp::Eq,
        Ne => InfixOp::Ne,
        Lt => InfixOp::Lt,
        Le => InfixOp::Le,
        Gt => InfixOp::Gt,
        Ge => InfixOp::Ge,
        _ => return None,
    })
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        &*expr.kind,
        ExprKind::Ident(_) | ExprKind::Dot { .. } | ExprKind::Subscript { .. }
    )
}

pub fn parse(tokens: Vec<Token>, file: impl Into<String>) -> PResult<Program> {
    Parser::new(tokens, file).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_ok(src: &str) -> Program {
        let toks = tokenize(src, "<test>").unwrap();
        parse(toks, "<test>").unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        let prog = parse_ok("1 + 2 * 3 - 4 / 2;");
        assert_eq!(prog.statements.len(), 1);
        assert!(matches!(prog.statements[0].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn fib_function_and_call() {
        let prog = parse_ok(
            "var fib = fn(n) { if (n < 2) { return n; }; return fib(n-1) + fib(n-2); }; fib(10);",
        );
        assert_eq!(prog.statements.len(), 2);
    }

    #[test]
    fn class_with_inheritance_and_super() {
        let prog = parse_ok(
            "class P { var a = 1; fn get() { return self.a; }; }; class C < P { fn get() { return super.get() + 10; }; }; C().get();",
        );
        assert_eq!(prog.statements.len(), 3);
        match &prog.statements[1].kind {
            StmtKind::ClassDecl(c) => {
                assert_eq!(c.name, "C");
                assert!(c.parent.is_some());
            }
            _ => panic!("expected class decl"),
        }
    }

    #[test]
    fn for_in_loop() {
        let prog = parse_ok("var x = 0; for (i, e in range(5)) { x = x + e; }; x;");
        assert_eq!(prog.statements.len(), 3);
        assert!(matches!(prog.statements[1].kind, StmtKind::ForIn { .. }));
    }

    #[test]
    fn if_elif_else_chain() {
        let prog = parse_ok("if (a) { 1; } elif (b) { 2; } else { 3; };");
        match &prog.statements[0].kind {
            StmtKind::If { branches, else_branch } => {
                assert_eq!(branches.len(), 2);
                assert!(else_branch.is_some());
            }
            _ => panic!("expected if"),
        }
    }

    #[test]
    fn compound_assignment_to_subscript() {
        let prog = parse_ok("var m = {}; m[\"k\"] += 1;");
        assert!(matches!(prog.statements[1].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn function_literal_with_default_argument() {
        let prog = parse_ok("var f = fn(x, y = 2) { return x + y; };");
        match &prog.statements[0].kind {
            StmtKind::Var { value, .. } => match &*value.kind {
                ExprKind::Function(f) => {
                    assert_eq!(f.params, vec!["x", "y"]);
                    assert!(f.defaults[0].is_none());
                    assert!(f.defaults[1].is_some());
                }
                _ => panic!("expected function literal"),
            },
            _ => panic!("expected var"),
        }
    }

    #[test]
    fn invalid_assignment_target_is_a_syntax_error() {
        let toks = tokenize("1 + 1 = 2;", "<test>").unwrap();
        assert!(parse(toks, "<test>").is_err());
    }
}
