use std::fmt;

use thiserror::Error;

use crate::stream::Position;

/// An error raised while building a [`Grammar`] from xbnf text.
///
/// Construction is all-or-nothing: the first malformed definition or
/// unresolved reference aborts the build with one of these.
///
/// [`Grammar`]: crate::Grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A rule definition that does not parse, with the line it was
    /// declared on and the rule name (empty for anonymous bodies parsed
    /// through [`Grammar::parse_rule`]).
    ///
    /// [`Grammar::parse_rule`]: crate::Grammar::parse_rule
    #[error("L#{line}: rule [{name}] - {message}")]
    Syntax {
        line: usize,
        name: String,
        message: String,
    },

    /// A non-blank, non-comment line without a `=` separator.
    #[error("L#{line}: invalid rule (missing =): {text}")]
    MissingEquals { line: usize, text: String },

    /// A rule was referenced somewhere in the grammar but never defined.
    #[error("rule name '{0}' referenced but not defined")]
    UndefinedReference(String),

    /// The same rule name was defined twice; `line` is the earlier
    /// declaration.
    #[error("rule '{name}' already defined at line {line}")]
    DuplicateRule { name: String, line: usize },

    /// The grammar text contained no rules at all.
    #[error("grammar contains no rules")]
    NoRules,
}

/// An error produced while evaluating input text against a grammar.
///
/// Mismatches inside rule evaluation are not fatal; they travel inside
/// [`EvalResult`] so enclosing rules can backtrack. An `EvalError` only
/// surfaces to the caller when the top-level driver runs out of options:
/// no root rule matches, an ambiguity cannot be resolved, or a block is
/// left unterminated.
///
/// The `index` is the 0-based codepoint index of the furthest failure;
/// `position` is its line/column when the stream has visited it.
///
/// [`EvalResult`]: crate::EvalResult
#[derive(Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EvalError {
    message: String,
    index: usize,
    position: Option<Position>,
}

impl EvalError {
    pub(crate) fn new(message: impl Into<String>, index: usize) -> Self {
        Self {
            message: message.into(),
            index,
            position: None,
        }
    }

    pub(crate) fn with_position(
        message: impl Into<String>,
        index: usize,
        position: Option<Position>,
    ) -> Self {
        Self {
            message: message.into(),
            index,
            position,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        self.message.as_ref()
    }

    /// The 0-based codepoint index where the failure occurred.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Line/column of the failure, when known.
    pub fn position(&self) -> Option<Position> {
        self.position
    }
}

impl fmt::Debug for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR@{} {}", self.index, self.message)
    }
}
