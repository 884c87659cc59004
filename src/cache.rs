//! Content-addressed template cache.

use crate::ast::Template;
use crate::error::TemplateSyntaxError;
use crate::parser::compile;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Compiled templates keyed by their exact source text.
///
/// Entries are only added, never replaced or expired; [`clear`](Self::clear)
/// is the one way to drop them. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct TemplateCache {
    templates: Arc<DashMap<String, Arc<Template>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached tree for `source`, compiling it on first use.
    ///
    /// Compilation runs outside any shard lock. When two threads compile
    /// the same source at once, the first insert wins and the other tree
    /// is dropped, so every caller gets the same `Arc`. Syntax errors are
    /// returned and nothing is stored.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<Template>, TemplateSyntaxError> {
        if let Some(hit) = self.templates.get(source) {
            trace!(len = source.len(), "template cache hit");
            return Ok(Arc::clone(hit.value()));
        }

        let compiled = Arc::new(compile(source)?);
        debug!(
            len = source.len(),
            nodes = compiled.nodes.len(),
            dynamic = compiled.is_dynamic(),
            "compiled template"
        );
        let entry = self
            .templates
            .entry(source.to_string())
            .or_insert_with(|| Arc::clone(&compiled));
        let cached = Arc::clone(entry.value());
        drop(entry);
        if !Arc::ptr_eq(&cached, &compiled) {
            trace!(len = source.len(), "discarded concurrently compiled template");
        }
        Ok(cached)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.templates.contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn clear(&self) {
        self.templates.clear();
    }
}
