//! On-demand decoding of raw parameter text into structured values.
//!
//! The instance table keeps parameters as opaque text. Callers that need a
//! specific field (a usage occurrence's parent, a product's name, a
//! placement's coordinates) decode just that instance with [`parse_params`].

use crate::error::StepError;
use crate::lexer::{Lexer, SpannedToken, Token};

/// A single argument value in a STEP entity.
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    /// Entity reference (e.g., `#123`).
    EntityRef(u64),
    /// String literal.
    String(String),
    /// Binary literal (hex digits).
    Binary(String),
    /// Real number.
    Real(f64),
    /// Integer number.
    Integer(i64),
    /// Enumeration (e.g., `.T.`).
    Enum(String),
    /// List of values (nested in parentheses).
    List(Vec<StepValue>),
    /// Derived/computed value (`*`).
    Derived,
    /// Null/unset value (`$`).
    Null,
    /// Typed value: `TYPE_NAME(args)`, e.g. `LENGTH_MEASURE(2.)`.
    Typed {
        /// The type name.
        type_name: String,
        /// Arguments.
        args: Vec<StepValue>,
    },
}

impl StepValue {
    /// The referenced id, if this is `#id`.
    pub fn as_entity_ref(&self) -> Option<u64> {
        match self {
            StepValue::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Numeric value; integers widen to `f64`.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            StepValue::Real(v) => Some(*v),
            StepValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String contents without quotes.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            StepValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Items of a parenthesized list.
    pub fn as_list(&self) -> Option<&[StepValue]> {
        match self {
            StepValue::List(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is `$`.
    pub fn is_null(&self) -> bool {
        matches!(self, StepValue::Null)
    }
}

/// Decode a parameter list body (the text between the outer parentheses).
pub fn parse_params(raw: &str) -> Result<Vec<StepValue>, StepError> {
    let tokens = Lexer::new(raw.as_bytes()).tokenize()?;
    let mut parser = ValueParser { tokens, pos: 0 };
    let mut args = Vec::new();
    if !parser.is_at_end() {
        args.push(parser.parse_value()?);
        while parser.check_token(&Token::Comma) {
            parser.advance();
            args.push(parser.parse_value()?);
        }
    }
    if let Some(tok) = parser.peek() {
        return Err(StepError::parser(
            None,
            format!("trailing token in parameter list: {:?}", tok.token),
        ));
    }
    Ok(args)
}

struct ValueParser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl ValueParser {
    fn parse_args(&mut self) -> Result<Vec<StepValue>, StepError> {
        self.expect_token(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.check_token(&Token::RParen) {
            args.push(self.parse_value()?);
            while self.check_token(&Token::Comma) {
                self.advance();
                args.push(self.parse_value()?);
            }
        }
        self.expect_token(&Token::RParen)?;
        Ok(args)
    }

    fn parse_value(&mut self) -> Result<StepValue, StepError> {
        let Some(tok) = self.advance().map(|t| t.token.clone()) else {
            return Err(StepError::parser(None, "unexpected end of parameters"));
        };
        match tok {
            Token::EntityRef(id) => Ok(StepValue::EntityRef(id)),
            Token::String(s) => Ok(StepValue::String(s)),
            Token::Binary(s) => Ok(StepValue::Binary(s)),
            Token::Real(v) => Ok(StepValue::Real(v)),
            Token::Integer(v) => Ok(StepValue::Integer(v)),
            Token::Enum(s) => Ok(StepValue::Enum(s)),
            Token::Asterisk => Ok(StepValue::Derived),
            Token::Dollar => Ok(StepValue::Null),
            Token::LParen => {
                self.pos -= 1;
                Ok(StepValue::List(self.parse_args()?))
            }
            Token::Keyword(type_name) => {
                let args = self.parse_args()?;
                Ok(StepValue::Typed { type_name, args })
            }
            other => Err(StepError::parser(None, format!("unexpected value: {other:?}"))),
        }
    }

    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&SpannedToken> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check_token(&self, expected: &Token) -> bool {
        self.peek().is_some_and(|t| &t.token == expected)
    }

    fn expect_token(&mut self, expected: &Token) -> Result<(), StepError> {
        if self.check_token(expected) {
            self.advance();
            Ok(())
        } else {
            let actual = self.peek().map(|t| t.token.clone());
            Err(StepError::parser(
                None,
                format!("expected {expected:?}, got {actual:?}"),
            ))
        }
    }
}

/// Typed access to decoded arguments by position.
pub trait ParamsExt {
    /// Argument at `index`, or a parser error naming the missing position.
    fn arg(&self, index: usize) -> Result<&StepValue, StepError>;

    /// Entity reference at `index`.
    fn entity_ref(&self, index: usize) -> Result<u64, StepError> {
        self.arg(index)?
            .as_entity_ref()
            .ok_or_else(|| StepError::parser(None, format!("argument {index} is not a reference")))
    }

    /// String at `index`; `$` decodes as the empty string.
    fn string(&self, index: usize) -> Result<&str, StepError> {
        let value = self.arg(index)?;
        if value.is_null() {
            return Ok("");
        }
        value
            .as_string()
            .ok_or_else(|| StepError::parser(None, format!("argument {index} is not a string")))
    }

    /// List of reals at `index` (e.g. point coordinates).
    fn reals(&self, index: usize) -> Result<Vec<f64>, StepError> {
        let list = self
            .arg(index)?
            .as_list()
            .ok_or_else(|| StepError::parser(None, format!("argument {index} is not a list")))?;
        list.iter()
            .map(|v| {
                v.as_real().ok_or_else(|| {
                    StepError::parser(None, format!("argument {index} holds a non-numeric item"))
                })
            })
            .collect()
    }
}

impl ParamsExt for [StepValue] {
    fn arg(&self, index: usize) -> Result<&StepValue, StepError> {
        self.get(index).ok_or_else(|| {
            StepError::parser(
                None,
                format!("expected at least {} arguments, got {}", index + 1, self.len()),
            )
        })
    }
}
