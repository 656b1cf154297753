//! FILENAME: formula-parser/src/lib.rs
//! PURPOSE: Library root for the metric formula parser.
//! CONTEXT: Metric templates carry formulas such as `SUM(revenue) / orders`.
//! This crate turns those strings into a typed expression tree whose names
//! are already classified as fields (per-row vectors) or metrics (scalars).
//!
//! PIPELINE: Formula String --> Lexer --> Tokens --> Parser --> AST --> Evaluator
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: +, -, *, /, ^ (power)
//! - Unary negation and unary plus
//! - Parentheses for grouping
//! - Reducers: SUM, AVG (alias AVERAGE), COUNT, MIN, MAX
//! - Names with spaces, matched against a vocabulary or written as [Unit Price]

pub mod ast;
pub mod classify;
pub mod lexer;
pub mod parser;
pub mod symbols;
pub mod token;
pub mod visit;


pub use ast::{BinaryOperator, Expression, Reducer, UnaryOperator};
pub use classify::{tokenize, FormulaToken, TokenKind};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, ParseResult, Parser};
pub use symbols::{SymbolKind, Symbols};
pub use token::Token;
pub use visit::{referenced_fields, referenced_metrics};
