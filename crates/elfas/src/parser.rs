//! Recursive-descent parser producing a statement stream.
//!
//! On construction the parser drains the lexer into an ordered token
//! buffer (cheap — sources are small), then exposes a pull interface:
//! [`Parser::next_statement`] returns one [`Statement`] per call and
//! `None` once the input is exhausted.
//!
//! Stray close brackets are skipped silently.  Other unexpected top-level
//! tokens do not abort the parse: a diagnostic is recorded (see
//! [`Parser::diagnostics`]) and scanning continues.  `ILLEGAL` tokens from
//! the lexer become [`Statement::Error`], which terminates compilation
//! once the driver consumes it.

use crate::inst;
use crate::ir::{parse_number, Operand, Statement};
use crate::lexer::{Lexer, Token, TokenKind};

/// Statement producer over a buffered token stream.
pub struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
    diagnostics: Vec<String>,
}

impl<'src> Parser<'src> {
    /// Lex `source` to completion and return a parser over the tokens.
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token();
            if tok.kind == TokenKind::Eof {
                break;
            }
            tokens.push(tok);
        }
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Non-fatal diagnostics recorded while scanning (stray tokens that
    /// were skipped).
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Consume the parser, keeping only its diagnostics.
    pub fn into_diagnostics(self) -> Vec<String> {
        self.diagnostics
    }

    #[inline]
    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    #[inline]
    fn advance(&mut self) -> Option<&Token<'src>> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Produce the next statement, or `None` at end of input.
    pub fn next_statement(&mut self) -> Option<Statement> {
        loop {
            let tok = self.peek()?;
            match tok.kind {
                TokenKind::Data => return Some(self.parse_data()),
                TokenKind::Label => {
                    let name = tok.text.to_string();
                    self.pos += 1;
                    return Some(Statement::Label { name });
                }
                TokenKind::Instruction => return Some(self.parse_instruction()),
                TokenKind::CloseBracket => {
                    // Tolerate a stray `]`.
                    self.pos += 1;
                }
                TokenKind::Illegal => {
                    let message = tok.text.to_string();
                    self.pos += 1;
                    return Some(Statement::Error { message });
                }
                _ => {
                    let msg = format!("unexpected token {} '{}'", tok.kind, tok.text);
                    self.diagnostics.push(msg);
                    self.pos += 1;
                }
            }
        }
    }

    /// Parse `.NAME DB <payload>` where the payload is a single string or a
    /// comma-separated byte list (trailing comma tolerated).
    fn parse_data(&mut self) -> Statement {
        let name = self.tokens[self.pos].text.to_string();
        self.pos += 1;

        let Some(db) = self.advance() else {
            return error("unexpected EOF parsing data");
        };
        if db.kind != TokenKind::Db {
            return error(format!("expected DB, got {} '{}'", db.kind, db.text));
        }

        let Some(payload) = self.peek() else {
            return error("unexpected EOF parsing data");
        };

        if payload.kind == TokenKind::Str {
            let contents = payload.text.as_bytes().to_vec();
            self.pos += 1;
            return Statement::Data { name, contents };
        }

        if payload.kind != TokenKind::Number {
            return error(format!(
                "expected string|number-array, got {} '{}'",
                payload.kind, payload.text
            ));
        }

        let mut contents = Vec::new();
        while let Some(tok) = self.peek() {
            if tok.kind != TokenKind::Number {
                break;
            }
            let Some(num) = parse_number(&tok.text) else {
                return error(format!("failed to convert '{}' to number", tok.text));
            };
            contents.push(num as u8);
            self.pos += 1;

            match self.peek() {
                Some(tok) if tok.kind == TokenKind::Comma => {
                    self.pos += 1;
                }
                _ => break,
            }
        }

        Statement::Data { name, contents }
    }

    /// Parse an instruction with the arity registered for its mnemonic.
    fn parse_instruction(&mut self) -> Statement {
        let mnemonic = self.tokens[self.pos].text.to_string();
        self.pos += 1;

        // The lexer only classifies registered mnemonics as instructions,
        // so the lookup can fail only if the two tables fall out of sync.
        let Some(count) = inst::arity(&mnemonic) else {
            return error(format!("unknown instruction '{}'", mnemonic));
        };

        let mut operands = Vec::with_capacity(count as usize);
        for i in 0..count {
            if i > 0 {
                match self.advance() {
                    Some(tok) if tok.kind == TokenKind::Comma => {}
                    Some(tok) => {
                        return error(format!("expected ',', got {} '{}'", tok.kind, tok.text));
                    }
                    None => return error("unexpected EOF"),
                }
            }
            match self.read_operand() {
                Ok(op) => operands.push(op),
                Err(message) => return Statement::Error { message },
            }
        }

        Statement::Instruction { mnemonic, operands }
    }

    /// Read one operand: a bare register/number/identifier, or a sized
    /// memory form `byte|word|dword|qword ptr [reg]` (brackets optional —
    /// without them the operand stays direct).
    fn read_operand(&mut self) -> Result<Operand, String> {
        let Some(tok) = self.peek() else {
            return Err("unexpected EOF".into());
        };

        match tok.kind {
            TokenKind::Identifier => {
                if let Some(size) = size_keyword(&tok.text) {
                    self.pos += 1;
                    return self.read_sized_operand(size);
                }
                let literal = tok.text.to_string();
                self.pos += 1;
                Ok(Operand::plain(TokenKind::Identifier, literal))
            }
            TokenKind::Register | TokenKind::Number => {
                let kind = tok.kind;
                let literal = tok.text.to_string();
                self.pos += 1;
                Ok(Operand::plain(kind, literal))
            }
            _ => Err(format!(
                "expected REGISTER|NUMBER|IDENTIFIER, got {} '{}'",
                tok.kind, tok.text
            )),
        }
    }

    /// Continuation of `read_operand` after a size keyword: expect `ptr`,
    /// then `[reg]` or `reg`.
    fn read_sized_operand(&mut self, size: u8) -> Result<Operand, String> {
        match self.advance() {
            Some(tok) if tok.kind == TokenKind::Identifier && tok.text == "ptr" => {}
            Some(tok) => {
                return Err(format!(
                    "expected 'ptr' after size keyword, got {} '{}'",
                    tok.kind, tok.text
                ));
            }
            None => return Err("unexpected EOF".into()),
        }

        let indirection = matches!(self.peek(), Some(tok) if tok.kind == TokenKind::OpenBracket);
        if indirection {
            self.pos += 1;
        }

        let literal = match self.advance() {
            Some(tok) if tok.kind == TokenKind::Register => tok.text.to_string(),
            Some(tok) => {
                return Err(format!("expected REGISTER, got {} '{}'", tok.kind, tok.text));
            }
            None => return Err("unexpected EOF".into()),
        };

        if indirection {
            if let Some(tok) = self.peek() {
                if tok.kind == TokenKind::CloseBracket {
                    self.pos += 1;
                }
            }
        }

        Ok(Operand {
            kind: TokenKind::Register,
            literal,
            size,
            indirection,
        })
    }
}

/// Map the size keywords to their width in bits.
fn size_keyword(text: &str) -> Option<u8> {
    match text {
        "byte" => Some(8),
        "word" => Some(16),
        "dword" => Some(32),
        "qword" => Some(64),
        _ => None,
    }
}

fn error(message: impl Into<String>) -> Statement {
    Statement::Error {
        message: message.into(),
    }
}
