//! Recognizes the statements the in-memory backend understands.
//!
//! Only stored-procedure invocations and transaction control are supported:
//! `SELECT * FROM name(args)`, `CALL name(args)`, `BEGIN`, `COMMIT`, `ROLLBACK`.

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use crate::core::{DbError, Result, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Placeholder,
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryStatement {
    Call { function: String, args: Vec<Argument> },
    Begin,
    Commit,
    Rollback,
}

impl MemoryStatement {
    pub fn parse(sql: &str) -> Result<Self> {
        let dialect = GenericDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| DbError::ParseError(e.to_string()))?;

        let tokens = tokens
            .into_iter()
            .filter(|token| !matches!(token, Token::Whitespace(_) | Token::EOF))
            .collect();

        StatementParser { tokens, pos: 0, sql }.parse_statement()
    }

    pub fn placeholder_count(&self) -> usize {
        match self {
            Self::Call { args, .. } => args
                .iter()
                .filter(|arg| matches!(arg, Argument::Placeholder))
                .count(),
            _ => 0,
        }
    }

    /// Substitutes bound parameters for placeholders, in order.
    pub fn bind(&self, params: &[Value]) -> Result<Vec<Value>> {
        let expected = self.placeholder_count();
        if expected != params.len() {
            return Err(DbError::ExecutionError(format!(
                "statement has {} placeholder(s) but {} parameter(s) were bound",
                expected,
                params.len()
            )));
        }

        let Self::Call { args, .. } = self else {
            return Ok(Vec::new());
        };

        let mut bound = params.iter();
        Ok(args
            .iter()
            .map(|arg| match arg {
                Argument::Literal(value) => value.clone(),
                Argument::Placeholder => bound.next().cloned().unwrap_or(Value::Null),
            })
            .collect())
    }
}

struct StatementParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    sql: &'a str,
}

impl StatementParser<'_> {
    fn parse_statement(mut self) -> Result<MemoryStatement> {
        let statement = match self.next_word().as_deref() {
            Some("BEGIN") => {
                self.skip_words(&["TRANSACTION", "WORK"]);
                MemoryStatement::Begin
            }
            Some("START") => {
                self.expect_word("TRANSACTION")?;
                MemoryStatement::Begin
            }
            Some("COMMIT") => {
                self.skip_words(&["TRANSACTION", "WORK"]);
                MemoryStatement::Commit
            }
            Some("ROLLBACK") => {
                self.skip_words(&["TRANSACTION", "WORK"]);
                MemoryStatement::Rollback
            }
            Some("SELECT") => {
                self.expect(&Token::Mul, "*")?;
                self.expect_word("FROM")?;
                self.parse_call()?
            }
            Some("CALL") => self.parse_call()?,
            _ => return Err(self.unsupported()),
        };

        if matches!(self.peek(), Some(Token::SemiColon)) {
            self.pos += 1;
        }
        if self.pos < self.tokens.len() {
            return Err(self.unsupported());
        }
        Ok(statement)
    }

    fn parse_call(&mut self) -> Result<MemoryStatement> {
        let mut function = self.identifier()?;
        while matches!(self.peek(), Some(Token::Period)) {
            self.pos += 1;
            function.push('.');
            function.push_str(&self.identifier()?);
        }

        self.expect(&Token::LParen, "(")?;
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(MemoryStatement::Call { function, args });
        }

        loop {
            args.push(self.argument()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => return Err(self.unsupported()),
            }
        }

        Ok(MemoryStatement::Call { function, args })
    }

    fn argument(&mut self) -> Result<Argument> {
        match self.advance() {
            Some(Token::Placeholder(p)) if p == "?" => Ok(Argument::Placeholder),
            Some(Token::Number(n, _)) => number(&n).map(Argument::Literal),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Number(n, _)) => number(&format!("-{}", n)).map(Argument::Literal),
                _ => Err(self.unsupported()),
            },
            Some(Token::SingleQuotedString(s)) => Ok(Argument::Literal(Value::Text(s))),
            Some(Token::Word(w)) => match w.value.to_ascii_uppercase().as_str() {
                "NULL" => Ok(Argument::Literal(Value::Null)),
                "TRUE" => Ok(Argument::Literal(Value::Boolean(true))),
                "FALSE" => Ok(Argument::Literal(Value::Boolean(false))),
                _ => Err(self.unsupported()),
            },
            _ => Err(self.unsupported()),
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Word(w)) => Ok(w.value),
            _ => Err(DbError::ParseError(format!(
                "expected a function name in '{}'",
                self.sql
            ))),
        }
    }

    fn next_word(&mut self) -> Option<String> {
        match self.advance() {
            Some(Token::Word(w)) => Some(w.value.to_ascii_uppercase()),
            _ => None,
        }
    }

    fn expect_word(&mut self, keyword: &str) -> Result<()> {
        match self.next_word() {
            Some(word) if word == keyword => Ok(()),
            _ => Err(DbError::ParseError(format!(
                "expected {} in '{}'",
                keyword, self.sql
            ))),
        }
    }

    fn skip_words(&mut self, optional: &[&str]) {
        let matched = match self.peek() {
            Some(Token::Word(w)) => optional.iter().any(|k| w.value.eq_ignore_ascii_case(k)),
            _ => false,
        };
        if matched {
            self.pos += 1;
        }
    }

    fn expect(&mut self, token: &Token, text: &str) -> Result<()> {
        match self.advance() {
            Some(ref actual) if actual == token => Ok(()),
            _ => Err(DbError::ParseError(format!("expected '{}' in '{}'", text, self.sql))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn unsupported(&self) -> DbError {
        DbError::ParseError(format!(
            "unsupported statement for the in-memory backend: '{}'",
            self.sql
        ))
    }
}

fn number(text: &str) -> Result<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Integer(i));
    }
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| DbError::ParseError(format!("invalid numeric literal '{}'", text)))
}
