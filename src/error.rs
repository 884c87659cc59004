//! Error taxonomy.
//!
//! Compile-time problems are [`TemplateSyntaxError`]s and carry a position
//! in the template source. Render-time problems are [`EvaluationError`]s,
//! wrapped in [`Error::Evaluation`] together with the offending expression.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Location inside a template source. `line` and `column` are 1-based,
/// `column` counts characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Resolve a byte offset in `source` to line/column.
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let mut line = 1;
        let mut column = 1;
        for (idx, c) in source.char_indices() {
            if idx >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self {
            offset,
            line,
            column,
        }
    }
}

/// A template (or one of its expressions) could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {}, column {})", position.line, position.column)]
pub struct TemplateSyntaxError {
    pub message: String,
    pub position: Position,
}

impl TemplateSyntaxError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// An expression failed while rendering.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("undefined variable path `{path}`")]
    Undefined { path: String },

    #[error("operator `{op}` cannot be applied to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("`{name}` cannot be applied to {found}")]
    BadArgument { name: String, found: &'static str },

    #[error("{found} has no field `{field}`")]
    NoSuchField { field: String, found: &'static str },

    #[error("index {index} is out of bounds for a list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("loop source is not iterable (found {found})")]
    NotIterable { found: &'static str },

    #[error("loop source evaluated to null")]
    NullCollection,
}

/// Crate-level error returned by compile and render entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] TemplateSyntaxError),

    #[error("failed to evaluate `{expression}`: {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: EvaluationError,
    },
}

impl Error {
    pub(crate) fn evaluation(expression: &str, source: EvaluationError) -> Self {
        Error::Evaluation {
            expression: expression.to_string(),
            source,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Syntax(_) => "TEMPLATE_SYNTAX_ERROR",
            Error::Evaluation { source, .. } => match source {
                EvaluationError::Undefined { .. } => "UNDEFINED_VARIABLE",
                EvaluationError::TypeMismatch { .. } => "TYPE_MISMATCH",
                EvaluationError::BadArgument { .. } => "BAD_ARGUMENT",
                EvaluationError::NoSuchField { .. } => "NO_SUCH_FIELD",
                EvaluationError::IndexOutOfBounds { .. } => "INDEX_OUT_OF_BOUNDS",
                EvaluationError::DivisionByZero => "DIVISION_BY_ZERO",
                EvaluationError::NotIterable { .. } => "NOT_ITERABLE",
                EvaluationError::NullCollection => "NULL_COLLECTION",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_counts_lines_and_columns() {
        let src = "ab\ncd\nef";
        assert_eq!(
            Position::locate(src, 4),
            Position {
                offset: 4,
                line: 2,
                column: 2
            }
        );
        assert_eq!(Position::locate(src, 0).line, 1);
        assert_eq!(Position::locate(src, 100).offset, src.len());
    }

    #[test]
    fn syntax_error_display_includes_position() {
        let err = TemplateSyntaxError::new("unknown directive `foo`", Position::locate("x\n<foo>", 2));
        assert_eq!(err.to_string(), "unknown directive `foo` (line 2, column 1)");
    }
}
