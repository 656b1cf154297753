//! FILENAME: formula-parser/src/lexer.rs
//! PURPOSE: Scans a raw formula string and produces a stream of Tokens.
//! CONTEXT: This is the first stage of the parsing pipeline. It handles
//! whitespace skipping, number parsing, bracketed names and vocabulary
//! matching for field and slot names that contain spaces or punctuation.
//!
//! VOCABULARY MATCHING:
//! - Names are tried longest-first at every token start, so `price` never
//!   shadows `price_total`.
//! - A match must end on an identifier boundary.
//! - A match directly followed by `(` is left to the function-call path.

use crate::token::Token;

pub struct Lexer<'a> {
    input: &'a str,
    /// Byte offset of the next unread character.
    pos: usize,
    /// Known names, longest first.
    vocabulary: Vec<String>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            pos: 0,
            vocabulary: Vec::new(),
        }
    }

    /// Creates a lexer that recognises the given names as single `Name` tokens.
    pub fn with_vocabulary<I, S>(input: &'a str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocabulary: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty())
            .collect();
        vocabulary.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        vocabulary.dedup();

        Lexer {
            input,
            pos: 0,
            vocabulary,
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        if let Some(name) = self.match_vocabulary() {
            return Token::Name(name);
        }

        let Some(ch) = self.peek() else {
            return Token::EOF;
        };
        self.bump(ch);

        match ch {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Asterisk,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '[' => self.read_bracketed_name(),
            ch if ch.is_ascii_digit() || ch == '.' => self.read_number(ch),
            ch if is_letter(ch) => self.read_identifier(ch),
            ch => Token::Illegal(ch),
        }
    }

    /// Collects every token up to and including `EOF`.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token == Token::EOF;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self, ch: char) {
        self.pos += ch.len_utf8();
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.bump(ch);
        }
    }

    fn match_vocabulary(&mut self) -> Option<String> {
        let rest = &self.input[self.pos..];

        let hit = self.vocabulary.iter().find(|name| {
            if !rest.starts_with(name.as_str()) {
                return false;
            }
            let after = &rest[name.len()..];
            let on_boundary = !after.chars().next().is_some_and(is_identifier_char);
            on_boundary && !after.trim_start().starts_with('(')
        })?;

        let hit = hit.clone();
        self.pos += hit.len();
        Some(hit)
    }

    /// Reads `[Some Name]`. The opening bracket is already consumed.
    fn read_bracketed_name(&mut self) -> Token {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch == ']' {
                let name = self.input[start..self.pos].trim().to_string();
                self.bump(ch);
                if name.is_empty() {
                    return Token::Illegal('[');
                }
                return Token::Name(name);
            }
            self.bump(ch);
        }
        // Unterminated bracket
        Token::Illegal('[')
    }

    fn read_number(&mut self, first_char: char) -> Token {
        let mut number_str = String::from(first_char);
        let mut has_dot = first_char == '.';

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.bump(ch);
            } else if ch == '.' && !has_dot {
                has_dot = true;
                number_str.push(ch);
                self.bump(ch);
            } else {
                break;
            }
        }

        if let Ok(n) = number_str.parse::<f64>() {
            Token::Number(n)
        } else {
            // Fallback if parsing fails (e.g. just ".")
            Token::Illegal(first_char)
        }
    }

    fn read_identifier(&mut self, first_char: char) -> Token {
        let mut ident = String::from(first_char);

        while let Some(ch) = self.peek() {
            if is_identifier_char(ch) {
                ident.push(ch);
                self.bump(ch);
            } else {
                break;
            }
        }

        Token::Identifier(ident)
    }
}

/// Returns true if `ch` can start an identifier.
fn is_letter(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

/// Returns true if `ch` can continue an identifier.
/// '.' is allowed so column names like "q1.sales" stay whole.
fn is_identifier_char(ch: char) -> bool {
    is_letter(ch) || ch.is_ascii_digit() || ch == '.'
}
