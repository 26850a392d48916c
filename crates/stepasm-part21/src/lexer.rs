//! Part 21 (STEP physical file format) lexer.
//!
//! Tokenizes exchange-structure text according to ISO 10303-21. Handles:
//! - Keywords (e.g., `PRODUCT_DEFINITION`, `DATA`, `END-ISO-10303-21`)
//! - Entity instance names (e.g., `#123`)
//! - Strings (e.g., `'it''s'`) and binaries (e.g., `"0FF"`)
//! - Real numbers (e.g., `1.5E-10`, `-3.`), integers
//! - Enumerations (e.g., `.T.`, `.MILLI.`)
//! - Punctuation (parentheses, comma, semicolon, equals, asterisk, dollar)
//!
//! Every token carries its byte offset so callers can slice the original
//! text back out verbatim.

use crate::error::StepError;

/// A token in a Part 21 file.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Keyword (e.g., `CARTESIAN_POINT`, `DATA`). Case is preserved.
    Keyword(String),
    /// Entity reference (e.g., `#123` becomes `EntityRef(123)`).
    EntityRef(u64),
    /// String literal (contents without quotes, `''` collapsed).
    String(String),
    /// Binary literal (hex digits without quotes).
    Binary(String),
    /// Real number.
    Real(f64),
    /// Integer number.
    Integer(i64),
    /// Enumeration (e.g., `.T.` becomes `Enum("T")`).
    Enum(String),
    /// Left parenthesis `(`.
    LParen,
    /// Right parenthesis `)`.
    RParen,
    /// Comma `,`.
    Comma,
    /// Semicolon `;`.
    Semicolon,
    /// Equals `=`.
    Equals,
    /// Asterisk `*` (derived value marker).
    Asterisk,
    /// Dollar `$` (null/unset value marker).
    Dollar,
}

/// Position in the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub col: usize,
    /// Byte offset from the start of the input.
    pub offset: usize,
}

/// A token with its position in the source.
#[derive(Debug, Clone)]
pub struct SpannedToken {
    /// The token.
    pub token: Token,
    /// Position where the token starts.
    pub pos: Position,
    /// Byte offset one past the token's last byte.
    pub end: usize,
}

/// Lexer for Part 21 text.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire input.
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, StepError> {
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token()? {
            tokens.push(tok);
        }
        Ok(tokens)
    }

    /// Current position (after skipped whitespace, if any was consumed).
    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            col: self.col,
            offset: self.pos,
        }
    }

    /// Get the next token, or `None` if at end of input.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken>, StepError> {
        self.skip_whitespace_and_comments()?;

        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };
        let start_pos = self.position();

        let token = match ch {
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b',' => self.single(Token::Comma),
            b';' => self.single(Token::Semicolon),
            b'=' => self.single(Token::Equals),
            b'*' => self.single(Token::Asterisk),
            b'$' => self.single(Token::Dollar),
            b'#' => self.read_entity_ref()?,
            b'\'' => self.read_string()?,
            b'"' => self.read_binary()?,
            b'.' => self.read_enum()?,
            b'-' | b'+' => {
                if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.read_number()?
                } else {
                    return Err(self.unexpected(ch));
                }
            }
            b'0'..=b'9' => self.read_number()?,
            b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'!' => self.read_keyword(),
            _ => return Err(self.unexpected(ch)),
        };

        Ok(Some(SpannedToken {
            token,
            pos: start_pos,
            end: self.pos,
        }))
    }

    fn unexpected(&self, ch: u8) -> StepError {
        StepError::format(
            self.line,
            self.col,
            format!("unexpected character: '{}'", ch as char),
        )
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn peek_char(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.input.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), StepError> {
        loop {
            while self.peek_char().is_some_and(|c| c.is_ascii_whitespace()) {
                self.advance();
            }

            if self.peek_char() == Some(b'/') && self.peek_at(1) == Some(b'*') {
                let (line, col) = (self.line, self.col);
                self.advance();
                self.advance();
                loop {
                    match self.peek_char() {
                        None => return Err(StepError::format(line, col, "unterminated comment")),
                        Some(b'*') if self.peek_at(1) == Some(b'/') => {
                            self.advance();
                            self.advance();
                            break;
                        }
                        Some(_) => {
                            self.advance();
                        }
                    }
                }
                continue;
            }

            return Ok(());
        }
    }

    /// Consume bytes while `pred` holds and return them as a string.
    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.peek_char().is_some_and(&pred) {
            self.advance();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_entity_ref(&mut self) -> Result<Token, StepError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // '#'

        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(StepError::format(line, col, "expected digits after '#'"));
        }
        let id: u64 = digits
            .parse()
            .map_err(|_| StepError::format(line, col, format!("invalid entity ID: {digits}")))?;
        Ok(Token::EntityRef(id))
    }

    fn read_string(&mut self) -> Result<Token, StepError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // opening quote

        let mut content = Vec::new();
        loop {
            match self.advance() {
                None => return Err(StepError::format(line, col, "unterminated string")),
                Some(b'\'') => {
                    if self.peek_char() == Some(b'\'') {
                        content.push(b'\'');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(ch) => content.push(ch),
            }
        }

        Ok(Token::String(String::from_utf8_lossy(&content).into_owned()))
    }

    fn read_binary(&mut self) -> Result<Token, StepError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // opening '"'
        let hex = self.take_while(|c| c != b'"');
        if self.advance() != Some(b'"') {
            return Err(StepError::format(line, col, "unterminated binary"));
        }
        Ok(Token::Binary(hex))
    }

    fn read_enum(&mut self) -> Result<Token, StepError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // opening '.'

        let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        match self.advance() {
            Some(b'.') if !name.is_empty() => Ok(Token::Enum(name)),
            Some(b'.') => Err(StepError::format(line, col, "empty enumeration")),
            Some(ch) => Err(StepError::format(
                line,
                col,
                format!("invalid character in enumeration: '{}'", ch as char),
            )),
            None => Err(StepError::format(line, col, "unterminated enumeration")),
        }
    }

    fn read_number(&mut self) -> Result<Token, StepError> {
        let (line, col) = (self.line, self.col);
        let start = self.pos;
        let mut is_real = false;

        if matches!(self.peek_char(), Some(b'-' | b'+')) {
            self.advance();
        }
        self.take_while(|c| c.is_ascii_digit());

        // Part 21 reals may end at the decimal point ("5.").
        if self.peek_char() == Some(b'.') {
            is_real = true;
            self.advance();
            self.take_while(|c| c.is_ascii_digit());
        }

        if matches!(self.peek_char(), Some(b'E' | b'e')) {
            is_real = true;
            self.advance();
            if matches!(self.peek_char(), Some(b'-' | b'+')) {
                self.advance();
            }
            self.take_while(|c| c.is_ascii_digit());
        }

        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if is_real {
            // Rust's float parser rejects "5." and "1.E3"; insert the zero.
            let normalized = text.replacen(".E", ".0E", 1).replacen(".e", ".0e", 1);
            let normalized = if normalized.ends_with('.') {
                format!("{normalized}0")
            } else {
                normalized
            };
            let val: f64 = normalized
                .parse()
                .map_err(|_| StepError::format(line, col, format!("invalid real number: {text}")))?;
            Ok(Token::Real(val))
        } else {
            let val: i64 = text
                .parse()
                .map_err(|_| StepError::format(line, col, format!("invalid integer: {text}")))?;
            Ok(Token::Integer(val))
        }
    }

    fn read_keyword(&mut self) -> Token {
        let start = self.pos;
        if self.peek_char() == Some(b'!') {
            self.advance();
        }
        // Hyphens appear in the section keywords ISO-10303-21 / END-ISO-10303-21.
        self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'-');
        Token::Keyword(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }
}
