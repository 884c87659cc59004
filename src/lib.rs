//! dynsql: dynamic SQL templates in the MyBatis mapper-script dialect.
//!
//! A template is SQL text with XML-style directives. Compiling it yields an
//! immutable node tree; rendering the tree against a parameter context
//! yields the statement text plus its ordered bindings.
//!
//! Supported directives:
//! - `<if test="...">` and `<choose>` / `<when test>` / `<otherwise>`.
//! - `<foreach collection item index open close separator nullable>`.
//! - `<bind name value/>`.
//! - `<where>`, `<set>` and `<trim prefix prefixOverrides suffix
//!   suffixOverrides>`.
//! - `#{expr, key=value}` placeholders and `${expr}` text substitution.
//!
//! Whitespace semantics:
//! - Each text fragment keeps its interior whitespace; its leading and
//!   trailing runs collapse to one space.
//! - Fragments appended at statement level are joined by one space.
//! - The engine never escapes values; that belongs to whatever binds the
//!   returned values to a prepared statement.
//!
//! ```
//! use dynsql::{ParameterContext, SqlEngine};
//!
//! let engine = SqlEngine::new();
//! let params = ParameterContext::new().with("name", "ann");
//! let bound = engine
//!     .render(r#"select * from user <where><if test="name != null">name = #{name}</if></where>"#, &params)
//!     .unwrap();
//! assert_eq!(bound.sql, "select * from user  WHERE name = ?");
//! ```

pub mod ast;
pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod eval;
pub mod expr;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod render;
pub mod trim;
pub mod value;

pub use ast::Template;
pub use cache::TemplateCache;
pub use config::{EngineConfig, PlaceholderStyle};
pub use context::ParameterContext;
pub use engine::SqlEngine;
pub use error::{Error, EvaluationError, Position, Result, TemplateSyntaxError};
pub use normalize::{normalize_fragment, shrink_whitespace};
pub use render::{Binding, BoundSql};
pub use trim::TrimRule;
pub use value::Value;

/// Compile and render `template` once with the default configuration,
/// bypassing any cache.
pub fn render(template: &str, params: &ParameterContext) -> Result<BoundSql> {
    Template::compile(template)?.render(params, &EngineConfig::default())
}
