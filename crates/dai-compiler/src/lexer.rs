//! Source text → token list.
//!
//! Structurally this follows `vitte_core::runtime::tokenizer`: a lookahead
//! cursor over `CharIndices`, a `Pos`/`Span` pair tracked alongside the byte
//! offset, and a `collect_while` helper for the digit-run reading that every
//! numeric-literal form needs. The token set itself is dai's own —
//! keywords, bases 2/8/10/16 integers with `_` separators, and no
//! bytes/hex-bytes literals (those were a Vitte-only extension).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
    pub offset: usize,
}

impl Pos {
    fn start() -> Self {
        Pos { line: 1, col: 1, offset: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn merge(a: Span, b: Span) -> Span {
        Span { start: a.start, end: b.end }
    }
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub span: Span,
    pub msg: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.msg, self.span.start.line, self.span.start.col)
    }
}

impl std::error::Error for LexError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,

    Ident(String),

    KwVar,
    KwCon,
    KwFn,
    KwReturn,
    KwIf,
    KwElif,
    KwElse,
    KwWhile,
    KwFor,
    KwIn,
    KwBreak,
    KwContinue,
    KwClass,
    KwSelf,
    KwSuper,
    KwTrue,
    KwFalse,
    KwNil,
    KwAnd,
    KwOr,
    KwNot,
    KwExtend,
    KwInsVar,
    KwClassVar,
    KwClassFn,

    Int(i64),
    Float(f64),
    Str(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semicolon,
    Colon,
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: std::str::CharIndices<'a>,
    look: Option<(usize, char)>,
    pos: Pos,
    pub file_name: String,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, file_name: impl Into<String>) -> Self {
        let mut chars = src.char_indices();
        let look = chars.next();
        Lexer { src, chars, look, pos: Pos::start(), file_name: file_name.into() }
    }

    pub fn tokenize_all(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            out.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_ws_and_comments();

        let start = self.pos;
        let (_, ch) = match self.look {
            Some(p) => p,
            None => return Ok(self.mk_token(start, start, TokenKind::Eof)),
        };

        if is_ident_start(ch) {
            return Ok(self.lex_ident_or_keyword());
        }
        if ch.is_ascii_digit() {
            return self.lex_number();
        }
        if ch == '"' {
            return self.lex_string();
        }
        self.lex_punct_or_op()
    }

    fn mk_token(&self, start: Pos, end: Pos, kind: TokenKind) -> Token {
        let lexeme = self.src[start.offset..end.offset].to_string();
        Token { kind, span: Span { start, end }, lexeme }
    }

    fn bump(&mut self) -> Option<char> {
        let (i, ch) = self.look?;
        if ch == '\n' {
            self.pos.line += 1;
            self.pos.col = 1;
        } else {
            self.pos.col += 1;
        }
        self.pos.offset = i + ch.len_utf8();
        self.look = self.chars.next();
        Some(ch)
    }

    fn peek(&self) -> Option<char> {
        self.look.map(|(_, c)| c)
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.chars.clone();
        it.next().map(|(_, c)| c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos.offset..].starts_with(s)
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.bump();
            }
            if self.starts_with("//") {
                while !matches!(self.peek(), None | Some('\n')) {
                    self.bump();
                }
                continue;
            }
            if self.starts_with("/*") {
                self.bump();
                self.bump();
                while !self.starts_with("*/") && self.peek().is_some() {
                    self.bump();
                }
                self.bump();
                self.bump();
                continue;
            }
            break;
        }
    }

    fn err_here(&self, msg: impl Into<String>) -> LexError {
        self.err_at(self.pos, msg)
    }

    fn err_at(&self, start: Pos, msg: impl Into<String>) -> LexError {
        LexError { span: Span { start, end: self.pos }, msg: msg.into() }
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let end = self.pos;
        let kind = match s.as_str() {
            "var" => TokenKind::KwVar,
            "con" => TokenKind::KwCon,
            "fn" => TokenKind::KwFn,
            "return" => TokenKind::KwReturn,
            "if" => TokenKind::KwIf,
            "elif" => TokenKind::KwElif,
            "else" => TokenKind::KwElse,
            "while" => TokenKind::KwWhile,
            "for" => TokenKind::KwFor,
            "in" => TokenKind::KwIn,
            "break" => TokenKind::KwBreak,
            "continue" => TokenKind::KwContinue,
            "class" => TokenKind::KwClass,
            "self" => TokenKind::KwSelf,
            "super" => TokenKind::KwSuper,
            "true" => TokenKind::KwTrue,
            "false" => TokenKind::KwFalse,
            "nil" => TokenKind::KwNil,
            "and" => TokenKind::KwAnd,
            "or" => TokenKind::KwOr,
            "not" => TokenKind::KwNot,
            "extend" => TokenKind::KwExtend,
            "insvar" => TokenKind::KwInsVar,
            "classvar" => TokenKind::KwClassVar,
            "classfn" => TokenKind::KwClassFn,
            _ => TokenKind::Ident(s),
        };
        self.mk_token(start, end, kind)
    }

    /// Reads a run of digits (and `_` separators, tracked separately so
    /// callers can reject leading/trailing/doubled underscores) matching
    /// `pred`. Returns the cooked (underscore-stripped) text and whether any
    /// digit was seen.
    fn collect_digits(&mut self, pred: impl Fn(char) -> bool) -> Result<(String, bool), LexError> {
        let mut raw = String::new();
        let mut any = false;
        let mut last_was_underscore = false;
        let mut first = true;
        while let Some(c) = self.peek() {
            if c == '_' {
                if first || last_was_underscore {
                    return Err(self.err_here("invalid '_' separator in numeric literal"));
                }
                last_was_underscore = true;
                self.bump();
                first = false;
                continue;
            }
            if !pred(c) {
                break;
            }
            any = true;
            raw.push(c);
            last_was_underscore = false;
            first = false;
            self.bump();
        }
        if last_was_underscore {
            return Err(self.err_here("invalid '_' separator in numeric literal"));
        }
        Ok((raw, any))
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;

        if self.peek() == Some('0') {
            let prefix = self.peek2();
            let base = match prefix {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(base) = base {
                self.bump(); // '0'
                self.bump(); // prefix letter
                let pred: fn(char) -> bool = match base {
                    16 => |c: char| c.is_ascii_hexdigit(),
                    8 => |c: char| ('0'..='7').contains(&c),
                    2 => |c: char| c == '0' || c == '1',
                    _ => unreachable!(),
                };
                let (digits, any) = self.collect_digits(pred)?;
                if !any {
                    return Err(self.err_at(start, "expected digit after base prefix"));
                }
                let value = i64::from_str_radix(&digits, base)
                    .map_err(|_| self.err_at(start, "integer literal out of range"))?;
                return Ok(self.mk_token(start, self.pos, TokenKind::Int(value)));
            }
        }

        let (int_digits, had_int) = self.collect_digits(|c| c.is_ascii_digit())?;
        let mut is_float = false;
        let mut text = int_digits;

        if self.peek() == Some('.') && matches!(self.peek2(), Some(d) if d.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.bump();
            let (frac, had_frac) = self.collect_digits(|c| c.is_ascii_digit())?;
            if !had_frac {
                return Err(self.err_at(start, "expected digit after '.'"));
            }
            text.push_str(&frac);
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                text.push(self.bump().unwrap());
            }
            let (exp, had_exp) = self.collect_digits(|c| c.is_ascii_digit())?;
            if !had_exp {
                return Err(self.err_at(start, "expected digit in exponent"));
            }
            text.push_str(&exp);
        }

        if !had_int && !is_float {
            return Err(self.err_here(format!("unexpected character: {:?}", self.peek())));
        }

        if is_float {
            let v: f64 = text.parse().map_err(|_| self.err_at(start, "invalid float literal"))?;
            Ok(self.mk_token(start, self.pos, TokenKind::Float(v)))
        } else {
            let v: i64 = text.parse().map_err(|_| self.err_at(start, "integer literal out of range"))?;
            Ok(self.mk_token(start, self.pos, TokenKind::Int(v)))
        }
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => out.push(self.parse_escape()?),
                Some(c) => out.push(c),
                None => return Err(self.err_at(start, "unterminated string literal")),
            }
        }
        Ok(self.mk_token(start, self.pos, TokenKind::Str(out)))
    }

    fn parse_escape(&mut self) -> Result<char, LexError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('0') => Ok('\0'),
            Some(c) => Err(self.err_here(format!("unknown escape sequence: \\{c}"))),
            None => Err(self.err_here("unterminated escape sequence")),
        }
    }

    fn lex_punct_or_op(&mut self) -> Result<Token, LexError> {
        macro_rules! two {
            ($kind:expr) => {{
                let start = self.pos;
                self.bump();
                self.bump();
                Ok(self.mk_token(start, self.pos, $kind))
            }};
        }

        if self.starts_with("==") {
            return two!(TokenKind::EqEq);
        }
        if self.starts_with("!=") {
            return two!(TokenKind::Ne);
        }
        if self.starts_with("<=") {
            return two!(TokenKind::Le);
        }
        if self.starts_with(">=") {
            return two!(TokenKind::Ge);
        }
        if self.starts_with("&&") {
            return two!(TokenKind::AndAnd);
        }
        if self.starts_with("||") {
            return two!(TokenKind::OrOr);
        }
        if self.starts_with("<<") {
            return two!(TokenKind::Shl);
        }
        if self.starts_with(">>") {
            return two!(TokenKind::Shr);
        }
        if self.starts_with("+=") {
            return two!(TokenKind::PlusAssign);
        }
        if self.starts_with("-=") {
            return two!(TokenKind::MinusAssign);
        }
        if self.starts_with("*=") {
            return two!(TokenKind::StarAssign);
        }
        if self.starts_with("/=") {
            return two!(TokenKind::SlashAssign);
        }

        let start = self.pos;
        let c = self.bump().ok_or_else(|| self.err_here("unexpected end of input"))?;
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '!' => TokenKind::Bang,
            '=' => TokenKind::Assign,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            other => return Err(self.err_at(start, format!("unexpected character: {:?}", other))),
        };
        Ok(self.mk_token(start, self.pos, kind))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

pub fn tokenize(src: &str, file_name: impl Into<String>) -> Result<Vec<Token>, LexError> {
    Lexer::new(src, file_name).tokenize_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, "<test>").unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_idents() {
        let v = kinds("var con fn return if elif else while for in break continue class self super true false nil and or not extend insvar classvar classfn foo");
        assert!(matches!(v[0], TokenKind::KwVar));
        assert!(matches!(v[1], TokenKind::KwCon));
        assert!(matches!(v.last().unwrap(), TokenKind::Ident(_)));
    }

    #[test]
    fn integer_bases() {
        let t = tokenize("10 0x1F 0o17 0b1010 1_000_000", "<test>").unwrap();
        assert_eq!(t[0].kind, TokenKind::Int(10));
        assert_eq!(t[1].kind, TokenKind::Int(0x1F));
        assert_eq!(t[2].kind, TokenKind::Int(0o17));
        assert_eq!(t[3].kind, TokenKind::Int(0b1010));
        assert_eq!(t[4].kind, TokenKind::Int(1_000_000));
    }

    #[test]
    fn underscore_placement_errors() {
        assert!(tokenize("1__000", "<test>").is_err());
        assert!(tokenize("_1000", "<test>").is_err() || matches!(
            tokenize("_1000", "<test>").unwrap()[0].kind,
            TokenKind::Ident(_)
        ));
    }

    #[test]
    fn floats() {
        let t = tokenize("3.14 1.0e10 2e-3", "<test>").unwrap();
        assert!(matches!(t[0].kind, TokenKind::Float(_)));
        assert!(matches!(t[1].kind, TokenKind::Float(_)));
        assert!(matches!(t[2].kind, TokenKind::Float(_)));
    }

    #[test]
    fn strings_with_escapes() {
        let t = tokenize(r#""hi\n\tthere""#, "<test>").unwrap();
        assert_eq!(t[0].kind, TokenKind::Str("hi\n\tthere".to_string()));
    }

    #[test]
    fn comments_skipped() {
        let v = kinds("// line comment\n1 /* block\ncomment */ 2");
        assert_eq!(v[0], TokenKind::Int(1));
        assert_eq!(v[1], TokenKind::Int(2));
    }

    #[test]
    fn operators_and_punct() {
        let v = kinds("+ - * / % << >> & | ^ ~ == != < <= > >= && || ! = += -= *= /= ( ) { } [ ] , . ; :");
        use TokenKind::*;
        assert_eq!(v[0], Plus);
        assert_eq!(v[5], Shl);
        assert_eq!(v[6], Shr);
        assert_eq!(v[17], AndAnd);
        assert_eq!(v[18], OrOr);
        assert_eq!(v.len(), 36);
    }

    #[test]
    fn spans_cover_source() {
        let toks = tokenize("var x = 1;", "<test>").unwrap();
        assert_eq!(toks[0].span.start.offset, 0);
        assert_eq!(toks[0].lexeme, "var");
    }
}
