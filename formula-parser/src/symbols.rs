//! FILENAME: formula-parser/src/symbols.rs
//! PURPOSE: The name table consulted while parsing.
//! CONTEXT: A formula can mention template slot names (bound to a column or
//! to another metric) and raw column names. The parser asks this table what
//! each name is, once, and records the answer in the AST.

use std::collections::HashSet;

/// What a name in a formula stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Resolves to a numeric vector built from the rows.
    Field,
    /// Resolves to the scalar result of another metric.
    Metric,
}

/// Known field and metric names for one formula.
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    fields: Vec<String>,
    metrics: Vec<String>,
    metric_set: HashSet<String>,
}

impl Symbols {
    pub fn new() -> Self {
        Symbols::default()
    }

    pub fn with_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_metrics<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if self.metric_set.insert(name.clone()) {
                self.metrics.push(name);
            }
        }
        self
    }

    /// Classifies a name. Metric slots win over fields of the same name.
    pub fn resolve(&self, name: &str) -> Option<SymbolKind> {
        if self.metric_set.contains(name) {
            Some(SymbolKind::Metric)
        } else if self.fields.iter().any(|f| f == name) {
            Some(SymbolKind::Field)
        } else {
            None
        }
    }

    /// Every known name, for the lexer vocabulary.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .chain(self.metrics.iter())
            .map(String::as_str)
    }
}
