//! FILENAME: formula-parser/src/classify.rs
//! PURPOSE: Flat, classified token list for formula editing surfaces.
//! CONTEXT: A formula builder shows the formula as chips (field, metric,
//! number, operator, function). This gives it the same classification the
//! parser uses, without building a tree.

use crate::lexer::Lexer;
use crate::parser::{ParseError, ParseResult};
use crate::symbols::{SymbolKind, Symbols};
use crate::token::Token;
use crate::ast::Reducer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Field,
    Metric,
    Number,
    Operator,
    Function,
    Paren,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormulaToken {
    pub kind: TokenKind,
    pub value: String,
}

impl FormulaToken {
    fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        FormulaToken {
            kind,
            value: value.into(),
        }
    }
}

/// Splits a formula into classified tokens.
pub fn tokenize(formula: &str, symbols: &Symbols) -> ParseResult<Vec<FormulaToken>> {
    let raw = Lexer::with_vocabulary(formula, symbols.names()).tokenize();
    let mut tokens = Vec::with_capacity(raw.len());

    for (i, token) in raw.iter().enumerate() {
        let classified = match token {
            Token::EOF => break,
            Token::Illegal(ch) => {
                return Err(ParseError::new(format!("Illegal character: {}", ch)));
            }
            Token::Number(n) => FormulaToken::new(TokenKind::Number, n.to_string()),
            Token::Name(name) | Token::Identifier(name) => {
                let is_call = raw.get(i + 1) == Some(&Token::LParen);
                if is_call {
                    let func = Reducer::from_name(name).ok_or_else(|| {
                        ParseError::new(format!("Unknown function: {}", name))
                    })?;
                    FormulaToken::new(TokenKind::Function, func.name())
                } else {
                    let kind = match symbols.resolve(name) {
                        Some(SymbolKind::Metric) => TokenKind::Metric,
                        _ => TokenKind::Field,
                    };
                    FormulaToken::new(kind, name.as_str())
                }
            }
            Token::Plus | Token::Minus | Token::Asterisk | Token::Slash | Token::Caret => {
                FormulaToken::new(TokenKind::Operator, token.to_string())
            }
            Token::LParen | Token::RParen => FormulaToken::new(TokenKind::Paren, token.to_string()),
            Token::Comma => FormulaToken::new(TokenKind::Comma, ","),
        };
        tokens.push(classified);
    }

    Ok(tokens)
}
