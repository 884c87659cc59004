//! Parameter contexts: the caller-owned root mapping and the scoped view
//! used while rendering.

use crate::value::Value;
use std::collections::HashMap;

/// Name under which the whole parameter object is always reachable.
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";
/// Name under which the configured database id is bound.
pub const DATABASE_ID_KEY: &str = "_databaseId";

/// Read access to variables by name.
pub trait Resolve {
    fn resolve(&self, name: &str) -> Option<&Value>;
}

/// Root variables for one render call.
///
/// Rendering never mutates the context: `<bind>` and loop variables live in
/// scopes layered on top of it for the duration of the call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterContext {
    vars: HashMap<String, Value>,
}

impl ParameterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapt a parameter object. Map entries become variables and the whole
    /// object stays reachable as `_parameter`; any other value is reachable
    /// as `_parameter` and `value`, `null` included.
    pub fn from_value(parameter: Value) -> Self {
        let mut ctx = Self::new();
        match &parameter {
            Value::Map(fields) => {
                for (name, value) in fields {
                    ctx.vars.insert(name.clone(), value.clone());
                }
            }
            other => {
                ctx.vars.insert("value".to_string(), other.clone());
            }
        }
        ctx.vars.insert(PARAMETER_OBJECT_KEY.to_string(), parameter);
        ctx
    }

    pub fn from_json(parameter: serde_json::Value) -> Self {
        Self::from_value(Value::from(parameter))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl Resolve for ParameterContext {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Render-time view: a stack of binding frames over the root context.
/// Frame 0 holds bindings made outside any loop.
pub(crate) struct Scope<'a> {
    root: &'a ParameterContext,
    frames: Vec<HashMap<String, Value>>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(root: &'a ParameterContext) -> Self {
        Self {
            root,
            frames: vec![HashMap::new()],
        }
    }

    pub(crate) fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub(crate) fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub(crate) fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }
}

impl Resolve for Scope<'_> {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.root.get(name))
    }
}
