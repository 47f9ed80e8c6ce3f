/// Streaming lexer for the script language.
///
/// The [`Lexer`] consumes bytes from any [`std::io::Read`] source and
/// implements [`Iterator`] over [`Token`]s. It tracks byte offset, line,
/// and column for every token it produces, and flags tokens that follow a
/// line terminator so the parser can insert semicolons.
///
/// # Comment syntax
///
/// | Syntax         | Kind          |
/// |----------------|---------------|
/// | `// …`         | Line comment  |
/// | `/* … */`      | Block comment |
///
/// Comments are trivia: they never reach the parser. A line terminator
/// inside a block comment still counts as a newline.
use std::io::Read;

use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

// ═══════════════════════════════════════════════════════════════════
// Read buffer: byte-at-a-time access over Read
// ═══════════════════════════════════════════════════════════════════

/// Enough lookahead for two maximum-length UTF-8 characters.
const LOOKAHEAD: usize = 8;

struct ReadBuf<R: Read> {
    reader: R,
    buf: [u8; LOOKAHEAD],
    /// How many valid bytes are in `buf` starting from index 0.
    filled: usize,
    reader_eof: bool,
    /// Byte offset from the start of the stream (0-based).
    offset: usize,
    /// Current line (1-based).
    line: usize,
    /// Current column (1-based, byte-based).
    column: usize,
}

impl<R: Read> ReadBuf<R> {
    fn new(reader: R) -> Self {
        let mut rb = Self {
            reader,
            buf: [0u8; LOOKAHEAD],
            filled: 0,
            reader_eof: false,
            offset: 0,
            line: 1,
            column: 1,
        };
        rb.fill();
        rb
    }

    fn fill(&mut self) {
        while !self.reader_eof && self.filled < LOOKAHEAD {
            let mut one = [0u8; 1];
            match self.reader.read(&mut one) {
                Ok(0) | Err(_) => self.reader_eof = true,
                Ok(_) => {
                    self.buf[self.filled] = one[0];
                    self.filled += 1;
                }
            }
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.offset, self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        (self.filled > 0).then(|| self.buf[0])
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        (n < self.filled).then(|| self.buf[n])
    }

    fn advance(&mut self) -> Option<u8> {
        if self.filled == 0 {
            return None;
        }
        let b = self.buf[0];
        self.buf.copy_within(1..self.filled, 0);
        self.filled -= 1;
        self.fill();

        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    /// Decode the leading UTF-8 character without consuming it. Invalid
    /// sequences decode as U+FFFD with length 1.
    fn peek_char(&self) -> Option<(char, usize)> {
        let b0 = self.peek()?;
        let (expected_len, first_bits) = match b0 {
            0x00..=0x7F => return Some((b0 as char, 1)),
            0xC0..=0xDF => (2, (b0 & 0x1F) as u32),
            0xE0..=0xEF => (3, (b0 & 0x0F) as u32),
            0xF0..=0xF7 => (4, (b0 & 0x07) as u32),
            _ => return Some(('\u{FFFD}', 1)),
        };
        if expected_len > self.filled {
            return Some(('\u{FFFD}', 1));
        }
        let mut codepoint = first_bits;
        for &cont in &self.buf[1..expected_len] {
            if cont & 0xC0 != 0x80 {
                return Some(('\u{FFFD}', 1));
            }
            codepoint = (codepoint << 6) | (cont & 0x3F) as u32;
        }
        match char::from_u32(codepoint) {
            Some(ch) => Some((ch, expected_len)),
            None => Some(('\u{FFFD}', 1)),
        }
    }

    fn advance_char(&mut self) -> Option<char> {
        let (ch, len) = self.peek_char()?;
        for _ in 0..len {
            self.advance();
        }
        Some(ch)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphabetic()
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphanumeric()
}

/// A streaming lexer.
///
/// ```rust
/// use parser::{Lexer, TokenKind};
///
/// let kinds: Vec<_> = Lexer::from_str("x = 1").map(|t| t.kind).collect();
/// assert_eq!(kinds.len(), 4);
/// assert_eq!(kinds[2], TokenKind::Number(1.0));
/// ```
pub struct Lexer<R: Read> {
    rb: ReadBuf<R>,
    emitted_eof: bool,
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            rb: ReadBuf::new(reader),
            emitted_eof: false,
        }
    }
}

impl<'a> Lexer<&'a [u8]> {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(source: &'a str) -> Self {
        Self::new(source.as_bytes())
    }
}

impl<R: Read> Lexer<R> {
    fn pos(&self) -> Pos {
        self.rb.pos()
    }

    fn peek(&self) -> Option<u8> {
        self.rb.peek()
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.rb.peek_ahead(n)
    }

    fn advance(&mut self) -> Option<u8> {
        self.rb.advance()
    }

    // ───────────────────────────────────────────────────────────
    //  Trivia
    // ───────────────────────────────────────────────────────────

    /// Skip whitespace and comments. Returns whether a line terminator was
    /// crossed, or an error token for an unterminated block comment.
    fn skip_trivia(&mut self) -> Result<bool, Token> {
        let mut newline = false;
        loop {
            match self.peek() {
                Some(b'\n') => {
                    newline = true;
                    self.advance();
                }
                Some(b' ' | b'\t' | b'\r' | 0x0B | 0x0C) => {
                    self.advance();
                }
                Some(b'/') if self.peek_ahead(1) == Some(b'/') => {
                    while !matches!(self.peek(), Some(b'\n') | None) {
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_ahead(1) == Some(b'*') => {
                    let start = self.pos();
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => {
                                return Err(Token::new(
                                    TokenKind::Error(
                                        "unterminated block comment".into(),
                                    ),
                                    Span::new(start, self.pos()),
                                    "/*",
                                ));
                            }
                            Some(b'*') if self.peek_ahead(1) == Some(b'/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(b) => {
                                newline |= b == b'\n';
                                self.advance();
                            }
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    // ───────────────────────────────────────────────────────────
    //  String literals:  "..."  or  '...'
    // ───────────────────────────────────────────────────────────

    fn lex_string(&mut self, quote: u8) -> Token {
        let start = self.pos();
        self.advance();
        let mut value: Vec<u8> = Vec::new();
        let mut raw: Vec<u8> = vec![quote];
        loop {
            match self.advance() {
                Some(b) if b == quote => {
                    raw.push(b);
                    break;
                }
                Some(b'\\') => {
                    raw.push(b'\\');
                    let Some(esc) = self.advance() else {
                        return self.error_token(
                            "unterminated string escape",
                            start,
                            &raw,
                        );
                    };
                    raw.push(esc);
                    match esc {
                        b'n' => value.push(b'\n'),
                        b't' => value.push(b'\t'),
                        b'r' => value.push(b'\r'),
                        b'b' => value.push(0x08),
                        b'f' => value.push(0x0C),
                        b'v' => value.push(0x0B),
                        b'0' => value.push(0),
                        b'\n' => {}
                        b'x' => match self.hex_escape(2, &mut raw) {
                            Some(c) => push_char(&mut value, c),
                            None => {
                                return self.error_token(
                                    "malformed \\x escape",
                                    start,
                                    &raw,
                                );
                            }
                        },
                        b'u' => match self.hex_escape(4, &mut raw) {
                            Some(c) => push_char(&mut value, c),
                            None => {
                                return self.error_token(
                                    "malformed \\u escape",
                                    start,
                                    &raw,
                                );
                            }
                        },
                        other => value.push(other),
                    }
                }
                Some(b'\n') | None => {
                    return self.error_token("unterminated string", start, &raw);
                }
                Some(b) => {
                    raw.push(b);
                    value.push(b);
                }
            }
        }
        let span = Span::new(start, self.pos());
        Token::new(
            TokenKind::String(String::from_utf8_lossy(&value).into_owned()),
            span,
            String::from_utf8_lossy(&raw),
        )
    }

    fn hex_escape(&mut self, digits: usize, raw: &mut Vec<u8>) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            let b = self.peek()?;
            let d = (b as char).to_digit(16)?;
            raw.push(b);
            self.advance();
            code = code * 16 + d;
        }
        Some(char::from_u32(code).unwrap_or('\u{FFFD}'))
    }

    fn error_token(&self, message: &str, start: Pos, raw: &[u8]) -> Token {
        Token::new(
            TokenKind::Error(message.into()),
            Span::new(start, self.pos()),
            String::from_utf8_lossy(raw),
        )
    }

    // ───────────────────────────────────────────────────────────
    //  Numbers
    // ───────────────────────────────────────────────────────────

    fn take_digits(&mut self, raw: &mut String, radix: u32) -> usize {
        let mut n = 0;
        while let Some(b) = self.peek() {
            if !(b as char).is_digit(radix) {
                break;
            }
            raw.push(b as char);
            self.advance();
            n += 1;
        }
        n
    }

    /// Decimal integer/fraction/exponent literals and `0x` hex integers.
    fn lex_number(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();

        if self.peek() == Some(b'0')
            && matches!(self.peek_ahead(1), Some(b'x' | b'X'))
        {
            self.advance();
            self.advance();
            raw.push_str("0x");
            let mut digits = String::new();
            if self.take_digits(&mut digits, 16) == 0 {
                return self.error_token("missing hex digits", start, raw.as_bytes());
            }
            raw.push_str(&digits);
            let value = digits
                .chars()
                .filter_map(|c| c.to_digit(16))
                .fold(0f64, |acc, d| acc * 16.0 + d as f64);
            return self.finish_number(value, start, raw);
        }

        self.take_digits(&mut raw, 10);
        if self.peek() == Some(b'.') {
            raw.push('.');
            self.advance();
            self.take_digits(&mut raw, 10);
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let sign_ahead = matches!(self.peek_ahead(1), Some(b'+' | b'-'));
            let digit_at = if sign_ahead { 2 } else { 1 };
            if matches!(self.peek_ahead(digit_at), Some(d) if d.is_ascii_digit()) {
                raw.push('e');
                self.advance();
                if sign_ahead {
                    raw.push(self.advance().unwrap_or(b'+') as char);
                }
                self.take_digits(&mut raw, 10);
            }
        }

        match raw.parse::<f64>() {
            Ok(v) => self.finish_number(v, start, raw),
            Err(e) => self.error_token(&format!("invalid number: {e}"), start, raw.as_bytes()),
        }
    }

    fn finish_number(&mut self, value: f64, start: Pos, mut raw: String) -> Token {
        if let Some((ch, _)) = self.rb.peek_char() {
            if is_ident_continue(ch) {
                self.rb.advance_char();
                raw.push(ch);
                return self.error_token(
                    "identifier starts immediately after number",
                    start,
                    raw.as_bytes(),
                );
            }
        }
        Token::new(TokenKind::Number(value), Span::new(start, self.pos()), raw)
    }

    // ───────────────────────────────────────────────────────────
    //  Identifiers and reserved words
    // ───────────────────────────────────────────────────────────

    fn lex_identifier(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();
        while let Some((ch, _)) = self.rb.peek_char() {
            if !is_ident_continue(ch) {
                break;
            }
            self.rb.advance_char();
            raw.push(ch);
        }
        let span = Span::new(start, self.pos());
        let kind = TokenKind::keyword(&raw)
            .unwrap_or_else(|| TokenKind::Identifier(raw.clone()));
        Token::new(kind, span, raw)
    }

    // ───────────────────────────────────────────────────────────
    //  Punctuators and operators
    // ───────────────────────────────────────────────────────────

    /// Longest match over a fixed operator table.
    fn lex_punctuator(&mut self) -> Option<Token> {
        const TABLE: [(&str, TokenKind); 35] = [
            ("===", TokenKind::EqEqEq),
            ("!==", TokenKind::NotEqEq),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::NotEq),
            ("<=", TokenKind::LtEq),
            (">=", TokenKind::GtEq),
            ("&&", TokenKind::AndAnd),
            ("||", TokenKind::OrOr),
            ("++", TokenKind::PlusPlus),
            ("--", TokenKind::MinusMinus),
            ("+=", TokenKind::PlusAssign),
            ("-=", TokenKind::MinusAssign),
            ("*=", TokenKind::StarAssign),
            ("/=", TokenKind::SlashAssign),
            ("%=", TokenKind::PercentAssign),
            ("(", TokenKind::LParen),
            (")", TokenKind::RParen),
            ("{", TokenKind::LBrace),
            ("}", TokenKind::RBrace),
            ("[", TokenKind::LBracket),
            ("]", TokenKind::RBracket),
            (";", TokenKind::Semicolon),
            (",", TokenKind::Comma),
            (".", TokenKind::Dot),
            (":", TokenKind::Colon),
            ("?", TokenKind::Question),
            ("+", TokenKind::Plus),
            ("-", TokenKind::Minus),
            ("*", TokenKind::Star),
            ("/", TokenKind::Slash),
            ("%", TokenKind::Percent),
            ("!", TokenKind::Bang),
            ("=", TokenKind::Assign),
            ("<", TokenKind::Lt),
            (">", TokenKind::Gt),
        ];
        let start = self.pos();
        for (text, kind) in TABLE {
            let matches = text
                .bytes()
                .enumerate()
                .all(|(i, b)| self.peek_ahead(i) == Some(b));
            if matches {
                for _ in 0..text.len() {
                    self.advance();
                }
                return Some(Token::new(
                    kind,
                    Span::new(start, self.pos()),
                    text,
                ));
            }
        }
        None
    }

    // ───────────────────────────────────────────────────────────
    //  Main dispatch
    // ───────────────────────────────────────────────────────────

    /// Produce the next token from the stream.
    pub fn next_token(&mut self) -> Token {
        let newline = match self.skip_trivia() {
            Ok(newline) => newline,
            Err(error) => return error,
        };
        let mut token = self.dispatch();
        token.newline_before = newline;
        token
    }

    fn dispatch(&mut self) -> Token {
        let start = self.pos();
        let Some(b) = self.peek() else {
            return Token::new(TokenKind::Eof, Span::point(start), "");
        };

        match b {
            b'"' | b'\'' => self.lex_string(b),
            b'0'..=b'9' => self.lex_number(),
            b'.' if matches!(self.peek_ahead(1), Some(d) if d.is_ascii_digit()) => {
                self.lex_number()
            }
            _ => {
                if let Some(tok) = self.lex_punctuator() {
                    return tok;
                }
                match self.rb.peek_char() {
                    Some((ch, _)) if is_ident_start(ch) => self.lex_identifier(),
                    _ => {
                        let ch = self.rb.advance_char().unwrap_or('\u{FFFD}');
                        Token::new(
                            TokenKind::Error(format!("unexpected character: {ch:?}")),
                            Span::new(start, self.pos()),
                            ch.to_string(),
                        )
                    }
                }
            }
        }
    }
}

fn push_char(buf: &mut Vec<u8>, c: char) {
    let mut tmp = [0u8; 4];
    buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
}

impl<R: Read> Iterator for Lexer<R> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.emitted_eof {
            return None;
        }
        let tok = self.next_token();
        if tok.is_eof() {
            self.emitted_eof = true;
        }
        Some(tok)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::from_str(src).collect()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokens(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(kinds("42"), vec![TokenKind::Number(42.0), TokenKind::Eof]);
        assert_eq!(kinds("0.1"), vec![TokenKind::Number(0.1), TokenKind::Eof]);
        assert_eq!(kinds(".5"), vec![TokenKind::Number(0.5), TokenKind::Eof]);
        assert_eq!(kinds("1e21"), vec![TokenKind::Number(1e21), TokenKind::Eof]);
        assert_eq!(kinds("2.5E-3"), vec![TokenKind::Number(2.5e-3), TokenKind::Eof]);
        assert_eq!(kinds("0xff"), vec![TokenKind::Number(255.0), TokenKind::Eof]);
    }

    #[test]
    fn number_followed_by_identifier_is_error() {
        assert!(matches!(kinds("3in")[0], TokenKind::Error(_)));
    }

    #[test]
    fn member_access_on_number_in_parens() {
        assert_eq!(kinds("(0.1).toString"), vec![
            TokenKind::LParen,
            TokenKind::Number(0.1),
            TokenKind::RParen,
            TokenKind::Dot,
            TokenKind::Identifier("toString".into()),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn lex_strings() {
        assert_eq!(kinds(r#""a\nb""#), vec![
            TokenKind::String("a\nb".into()),
            TokenKind::Eof
        ]);
        assert_eq!(kinds(r"'it\'s'"), vec![
            TokenKind::String("it's".into()),
            TokenKind::Eof
        ]);
        assert_eq!(kinds(r#""é\x41""#), vec![
            TokenKind::String("éA".into()),
            TokenKind::Eof
        ]);
        assert_eq!(kinds("\"héllo\""), vec![
            TokenKind::String("héllo".into()),
            TokenKind::Eof
        ]);
        assert!(matches!(kinds("\"open")[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_reserved_words() {
        assert_eq!(kinds("function f yield"), vec![
            TokenKind::Function,
            TokenKind::Identifier("f".into()),
            TokenKind::Yield,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(kinds("a !== b === c += 1"), vec![
            TokenKind::Identifier("a".into()),
            TokenKind::NotEqEq,
            TokenKind::Identifier("b".into()),
            TokenKind::EqEqEq,
            TokenKind::Identifier("c".into()),
            TokenKind::PlusAssign,
            TokenKind::Number(1.0),
            TokenKind::Eof,
        ]);
        assert_eq!(kinds("i++ + ++j"), vec![
            TokenKind::Identifier("i".into()),
            TokenKind::PlusPlus,
            TokenKind::Plus,
            TokenKind::PlusPlus,
            TokenKind::Identifier("j".into()),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn comments_are_skipped_and_newlines_flagged() {
        let toks = tokens("a // one\n/* two\n */ b /* c */ d");
        let kinds: Vec<_> = toks.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(kinds, vec![
            TokenKind::Identifier("a".into()),
            TokenKind::Identifier("b".into()),
            TokenKind::Identifier("d".into()),
            TokenKind::Eof,
        ]);
        assert!(!toks[0].newline_before);
        assert!(toks[1].newline_before);
        assert!(!toks[2].newline_before);
    }

    #[test]
    fn unterminated_block_comment() {
        assert!(matches!(kinds("/* open")[0], TokenKind::Error(_)));
    }

    #[test]
    fn span_tracking() {
        let toks = tokens("var x\n  = 1");
        assert_eq!(toks[0].span.start, Pos::new(0, 1, 1));
        assert_eq!(toks[1].span.start, Pos::new(4, 1, 5));
        assert_eq!(toks[2].span.start, Pos::new(8, 2, 3));
        assert_eq!(toks[2].span.end, Pos::new(9, 2, 4));
    }

    #[test]
    fn lex_from_cursor() {
        let lexer = Lexer::new(Cursor::new(b"x.y[0]".to_vec()));
        let kinds: Vec<_> = lexer.map(|t| t.kind).collect();
        assert_eq!(kinds, vec![
            TokenKind::Identifier("x".into()),
            TokenKind::Dot,
            TokenKind::Identifier("y".into()),
            TokenKind::LBracket,
            TokenKind::Number(0.0),
            TokenKind::RBracket,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn unicode_identifiers() {
        assert_eq!(kinds("größe $x _y"), vec![
            TokenKind::Identifier("größe".into()),
            TokenKind::Identifier("$x".into()),
            TokenKind::Identifier("_y".into()),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn unexpected_character() {
        assert!(matches!(kinds("#")[0], TokenKind::Error(_)));
    }
}
