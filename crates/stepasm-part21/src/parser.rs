//! Part 21 exchange-structure parser: builds an [`InstanceTable`] from text.
//!
//! The parser checks the file skeleton and the shape of every instance,
//! but treats parameter lists as opaque: it only balances parentheses to
//! find where a list ends and keeps the text in between verbatim.

use crate::error::StepError;
use crate::lexer::{Lexer, Position, SpannedToken, Token};
use crate::table::{Instance, InstanceKind, InstanceTable, Record};
use std::path::Path;

/// Parse Part 21 text.
pub fn parse(text: &str) -> Result<InstanceTable, StepError> {
    parse_bytes(text.as_bytes())
}

/// Parse Part 21 bytes. Non-UTF-8 bytes inside strings are replaced.
pub fn parse_bytes(input: &[u8]) -> Result<InstanceTable, StepError> {
    Parser::new(input).parse_file()
}

/// Read and parse a Part 21 file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<InstanceTable, StepError> {
    let data = std::fs::read(path)?;
    parse_bytes(&data)
}

struct Parser<'a> {
    input: &'a [u8],
    lexer: Lexer<'a>,
    peeked: Option<SpannedToken>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            lexer: Lexer::new(input),
            peeked: None,
        }
    }

    fn parse_file(&mut self) -> Result<InstanceTable, StepError> {
        self.expect_keyword("ISO-10303-21")?;
        self.expect_token(&Token::Semicolon)?;

        self.expect_keyword("HEADER")?;
        let header_start = self.expect_token(&Token::Semicolon)?.end;
        let mut header_records = Vec::new();
        let header_end = loop {
            let tok = self.peek_required("ENDSEC")?;
            match &tok.token {
                Token::Keyword(k) if k == "ENDSEC" => break tok.pos.offset,
                Token::Keyword(k) => {
                    let keyword = k.clone();
                    self.next()?;
                    let params = self.raw_params()?;
                    self.expect_token(&Token::Semicolon)?;
                    header_records.push(Record::new(keyword, params));
                }
                other => {
                    let msg = format!("expected header entity or ENDSEC, got {other:?}");
                    return Err(Self::error_at(tok.pos, msg));
                }
            }
        };
        self.expect_keyword("ENDSEC")?;
        self.expect_token(&Token::Semicolon)?;

        let header = String::from_utf8_lossy(&self.input[header_start..header_end]);
        let mut table = InstanceTable::new(header.trim());
        for record in header_records {
            table.push_header_record(record);
        }

        let mut data_sections = 0;
        while self.check_keyword("DATA")? {
            self.next()?;
            if self.check_token(&Token::LParen)? {
                // Edition 3 section parameters: name and schema, not needed.
                self.raw_params()?;
            }
            self.expect_token(&Token::Semicolon)?;
            while !self.check_keyword("ENDSEC")? {
                self.parse_instance(&mut table)?;
            }
            self.expect_keyword("ENDSEC")?;
            self.expect_token(&Token::Semicolon)?;
            data_sections += 1;
        }
        if data_sections == 0 {
            let pos = self.current_position()?;
            return Err(Self::error_at(pos, "expected at least one DATA section"));
        }

        self.expect_keyword("END-ISO-10303-21")?;
        self.expect_token(&Token::Semicolon)?;
        if let Some(tok) = self.next()? {
            return Err(Self::error_at(
                tok.pos,
                "unexpected content after END-ISO-10303-21",
            ));
        }

        Ok(table)
    }

    fn parse_instance(&mut self, table: &mut InstanceTable) -> Result<(), StepError> {
        let name = self.next_required("entity instance name")?;
        let Token::EntityRef(id) = name.token else {
            let msg = format!("expected entity instance name, got {:?}", name.token);
            return Err(Self::error_at(name.pos, msg));
        };
        self.expect_token(&Token::Equals)?;

        let head = self.next_required("entity keyword")?;
        let kind = match head.token {
            Token::Keyword(keyword) => {
                check_entity_keyword(&keyword, head.pos)?;
                InstanceKind::Simple(Record::new(keyword, self.raw_params()?))
            }
            Token::LParen => {
                let mut records = Vec::new();
                loop {
                    let tok = self.next_required("')'")?;
                    match tok.token {
                        Token::RParen => break,
                        Token::Keyword(keyword) => {
                            check_entity_keyword(&keyword, tok.pos)?;
                            records.push(Record::new(keyword, self.raw_params()?));
                        }
                        other => {
                            let msg = format!("expected keyword in complex instance, got {other:?}");
                            return Err(Self::error_at(tok.pos, msg));
                        }
                    }
                }
                if records.is_empty() {
                    return Err(Self::error_at(head.pos, format!("empty complex instance #{id}")));
                }
                InstanceKind::Complex(records)
            }
            other => {
                let msg = format!("expected keyword or '(' after #{id} =, got {other:?}");
                return Err(Self::error_at(head.pos, msg));
            }
        };
        self.expect_token(&Token::Semicolon)?;

        table
            .insert(Instance { id, kind })
            .map_err(|dup| Self::error_at(name.pos, format!("duplicate instance id #{}", dup.id)))
    }

    /// Consume `( ... )` and return the text between the parentheses.
    fn raw_params(&mut self) -> Result<String, StepError> {
        let open = self.expect_token(&Token::LParen)?;
        let start = open.end;
        let mut depth = 1usize;
        loop {
            let Some(tok) = self.next()? else {
                return Err(Self::error_at(open.pos, "unterminated parameter list"));
            };
            match tok.token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let raw = &self.input[start..tok.pos.offset];
                        return Ok(String::from_utf8_lossy(raw).into_owned());
                    }
                }
                // A semicolon can only appear inside a string literal, which
                // the lexer already consumed whole.
                Token::Semicolon => {
                    return Err(Self::error_at(tok.pos, "';' inside parameter list"));
                }
                _ => {}
            }
        }
    }

    fn peek(&mut self) -> Result<Option<&SpannedToken>, StepError> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn peek_required(&mut self, expected: &str) -> Result<SpannedToken, StepError> {
        match self.peek()? {
            Some(tok) => Ok(tok.clone()),
            None => {
                let pos = self.lexer.position();
                Err(Self::error_at(pos, format!("unexpected end of file, expected {expected}")))
            }
        }
    }

    fn next(&mut self) -> Result<Option<SpannedToken>, StepError> {
        match self.peeked.take() {
            Some(tok) => Ok(Some(tok)),
            None => self.lexer.next_token(),
        }
    }

    fn next_required(&mut self, expected: &str) -> Result<SpannedToken, StepError> {
        match self.next()? {
            Some(tok) => Ok(tok),
            None => {
                let pos = self.lexer.position();
                Err(Self::error_at(pos, format!("unexpected end of file, expected {expected}")))
            }
        }
    }

    fn current_position(&mut self) -> Result<Position, StepError> {
        let fallback = self.lexer.position();
        Ok(self.peek()?.map(|t| t.pos).unwrap_or(fallback))
    }

    fn check_token(&mut self, expected: &Token) -> Result<bool, StepError> {
        Ok(self.peek()?.is_some_and(|t| &t.token == expected))
    }

    fn check_keyword(&mut self, name: &str) -> Result<bool, StepError> {
        Ok(matches!(
            self.peek()?,
            Some(SpannedToken { token: Token::Keyword(k), .. }) if k == name
        ))
    }

    fn expect_token(&mut self, expected: &Token) -> Result<SpannedToken, StepError> {
        let tok = self.next_required(&format!("{expected:?}"))?;
        if &tok.token == expected {
            Ok(tok)
        } else {
            let msg = format!("expected {expected:?}, got {:?}", tok.token);
            Err(Self::error_at(tok.pos, msg))
        }
    }

    fn expect_keyword(&mut self, name: &str) -> Result<SpannedToken, StepError> {
        let tok = self.next_required(name)?;
        match &tok.token {
            Token::Keyword(k) if k == name => Ok(tok),
            other => {
                let msg = format!("expected keyword '{name}', got {other:?}");
                Err(Self::error_at(tok.pos, msg))
            }
        }
    }

    fn error_at(pos: Position, message: impl Into<String>) -> StepError {
        StepError::format(pos.line, pos.col, message)
    }
}

/// Entity keywords are upper case: `[A-Z][A-Z0-9_]*`, optionally prefixed
/// with `!` for user-defined entities.
fn check_entity_keyword(keyword: &str, pos: Position) -> Result<(), StepError> {
    let body = keyword.strip_prefix('!').unwrap_or(keyword);
    let mut chars = body.bytes();
    let valid = chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == b'_');
    if valid {
        Ok(())
    } else {
        Err(StepError::format(
            pos.line,
            pos.col,
            format!("invalid entity keyword '{keyword}'"),
        ))
    }
}
