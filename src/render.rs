//! Node interpreter: walks a compiled [`Template`] against a parameter
//! context and assembles the statement.
//!
//! Output goes through sinks:
//! - at statement level every append is joined to the previous one with a
//!   single space, even when the appended text is empty;
//! - inside `<where>`/`<set>`/`<trim>` appends are concatenated, and the
//!   trimmed result is appended to the parent as one fragment;
//! - each loop element writes through a sink that emits the separator once,
//!   before the element's first non-blank append.

use crate::ast::*;
use crate::config::{EngineConfig, PlaceholderStyle};
use crate::context::{ParameterContext, Scope, DATABASE_ID_KEY};
use crate::error::{EvaluationError, Error, Result};
use crate::eval::{evaluate, evaluate_test, Evaluator, Mode};
use crate::normalize::shrink_whitespace;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One placeholder occurrence, in statement order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Source text of the placeholder expression.
    pub property: String,
    pub value: Value,
    /// `key=value` options written after the expression, verbatim.
    pub options: Vec<(String, String)>,
}

/// Final statement text and its bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundSql {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

impl BoundSql {
    pub fn values(&self) -> Vec<&Value> {
        self.bindings.iter().map(|b| &b.value).collect()
    }
}

trait SqlSink {
    fn append(&mut self, sql: &str);
}

#[derive(Default)]
struct JoinedSql {
    sql: String,
    started: bool,
}

impl SqlSink for JoinedSql {
    fn append(&mut self, sql: &str) {
        if self.started {
            self.sql.push(' ');
        }
        self.started = true;
        self.sql.push_str(sql);
    }
}

#[derive(Default)]
struct ClauseBuffer {
    sql: String,
}

impl SqlSink for ClauseBuffer {
    fn append(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }
}

struct SeparatedSink<'s> {
    parent: &'s mut dyn SqlSink,
    prefix: &'s str,
    prefix_applied: bool,
}

impl SqlSink for SeparatedSink<'_> {
    fn append(&mut self, sql: &str) {
        if !self.prefix_applied && !sql.trim().is_empty() {
            self.parent.append(self.prefix);
            self.prefix_applied = true;
        }
        self.parent.append(sql);
    }
}

fn java_trim(s: &str) -> &str {
    s.trim_matches(|c: char| c <= ' ')
}

struct Renderer<'a> {
    scope: Scope<'a>,
    config: &'a EngineConfig,
    bindings: Vec<Binding>,
}

impl<'a> Renderer<'a> {
    fn new(params: &'a ParameterContext, config: &'a EngineConfig) -> Self {
        let mut scope = Scope::new(params);
        let database_id = config.database_id.clone().map_or(Value::Null, Value::String);
        scope.bind(DATABASE_ID_KEY, database_id);
        Self {
            scope,
            config,
            bindings: Vec::new(),
        }
    }

    fn value(&self, expr: &Expression) -> Result<Value> {
        evaluate(&expr.ast, &self.scope).map_err(|e| Error::evaluation(&expr.source, e))
    }

    fn test(&self, expr: &Expression) -> Result<bool> {
        evaluate_test(&expr.ast, &self.scope).map_err(|e| Error::evaluation(&expr.source, e))
    }

    fn render_nodes(&mut self, nodes: &[Node], sink: &mut dyn SqlSink) -> Result<()> {
        for node in nodes {
            self.render_node(node, sink)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node, sink: &mut dyn SqlSink) -> Result<()> {
        match node {
            Node::Text(fragment) => {
                let text = self.fragment(fragment)?;
                sink.append(&text);
            }
            Node::Conditional(branch) => {
                if self.test(&branch.test)? {
                    self.render_nodes(&branch.body, sink)?;
                }
            }
            Node::Choice { branches, otherwise } => {
                let mut chosen = None;
                for branch in branches {
                    if self.test(&branch.test)? {
                        chosen = Some(&branch.body);
                        break;
                    }
                }
                if let Some(body) = chosen.or(otherwise.as_ref()) {
                    self.render_nodes(body, sink)?;
                }
            }
            Node::Loop(each) => self.render_loop(each, sink)?,
            Node::Bind { name, value } => {
                let value = self.value(value)?;
                self.scope.bind(name.as_str(), value);
            }
            Node::TrimWrapper { rule, body } => {
                let mut clause = ClauseBuffer::default();
                self.render_nodes(body, &mut clause)?;
                sink.append(&rule.apply(&clause.sql));
            }
        }
        Ok(())
    }

    fn fragment(&mut self, fragment: &Fragment) -> Result<String> {
        let mut out = String::new();
        for segment in &fragment.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(placeholder) => {
                    let value = self.value(&placeholder.expression)?;
                    self.bindings.push(Binding {
                        property: placeholder.expression.source.clone(),
                        value,
                        options: placeholder.options.clone(),
                    });
                    match self.config.placeholder_style {
                        PlaceholderStyle::Question => out.push('?'),
                        PlaceholderStyle::Numbered => {
                            out.push('$');
                            out.push_str(&self.bindings.len().to_string());
                        }
                    }
                }
                Segment::Substitution(expr) => {
                    out.push_str(&self.value(expr)?.to_string());
                }
            }
        }
        Ok(out)
    }

    fn render_loop(&mut self, each: &Loop, sink: &mut dyn SqlSink) -> Result<()> {
        let nullable = each.nullable.unwrap_or(self.config.nullable_on_foreach);
        let source = &each.collection;
        // A nullable loop tolerates a missing source as well as a null one.
        let mode = if nullable { Mode::Lenient } else { Mode::Strict };
        let collection = Evaluator::new(&self.scope, mode)
            .eval(&source.ast)
            .map_err(|e| Error::evaluation(&source.source, e))?;

        let entries: Vec<(Value, Value)> = match collection {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i64), item))
                .collect(),
            Value::Map(fields) => fields
                .into_iter()
                .map(|(key, item)| (Value::String(key), item))
                .collect(),
            Value::Null if nullable => return Ok(()),
            Value::Null => {
                return Err(Error::evaluation(&source.source, EvaluationError::NullCollection))
            }
            other => {
                return Err(Error::evaluation(
                    &source.source,
                    EvaluationError::NotIterable {
                        found: other.type_name(),
                    },
                ))
            }
        };
        if entries.is_empty() {
            return Ok(());
        }

        if let Some(open) = &each.open {
            sink.append(open);
        }
        let mut first = true;
        for (index, item) in entries {
            let prefix = match (&each.separator, first) {
                (Some(separator), false) => separator.as_str(),
                _ => "",
            };
            self.scope.push();
            if let Some(name) = &each.index {
                self.scope.bind(name.as_str(), index);
            }
            if let Some(name) = &each.item {
                self.scope.bind(name.as_str(), item);
            }
            let mut element = SeparatedSink {
                parent: &mut *sink,
                prefix,
                prefix_applied: false,
            };
            let rendered = self.render_nodes(&each.body, &mut element);
            let applied = element.prefix_applied;
            self.scope.pop();
            rendered?;
            if first {
                first = !applied;
            }
        }
        if let Some(close) = &each.close {
            sink.append(close);
        }
        Ok(())
    }
}

impl Template {
    /// Render against `params`. Errors abort the whole call; no partial
    /// statement is returned.
    pub fn render(&self, params: &ParameterContext, config: &EngineConfig) -> Result<BoundSql> {
        let mut renderer = Renderer::new(params, config);
        let mut statement = JoinedSql::default();
        renderer.render_nodes(&self.nodes, &mut statement)?;

        let sql = if config.shrink_whitespaces {
            shrink_whitespace(&statement.sql)
        } else {
            java_trim(&statement.sql).to_string()
        };
        debug!(
            sql_len = sql.len(),
            bindings = renderer.bindings.len(),
            "rendered statement"
        );
        Ok(BoundSql {
            sql,
            bindings: renderer.bindings,
        })
    }
}
