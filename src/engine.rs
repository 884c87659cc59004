use crate::ast::Template;
use crate::cache::TemplateCache;
use crate::config::EngineConfig;
use crate::context::ParameterContext;
use crate::error::Result;
use crate::render::BoundSql;
use std::sync::Arc;

/// Configuration plus a template cache: the entry point a data-access
/// layer keeps for its lifetime.
#[derive(Debug, Clone, Default)]
pub struct SqlEngine {
    config: EngineConfig,
    cache: TemplateCache,
}

impl SqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            cache: TemplateCache::new(),
        }
    }

    /// Share an existing cache, e.g. between engines with different
    /// placeholder styles.
    pub fn with_cache(config: EngineConfig, cache: TemplateCache) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Compile `source`, or fetch the tree compiled earlier for it.
    pub fn compile(&self, source: &str) -> Result<Arc<Template>> {
        Ok(self.cache.get_or_compile(source)?)
    }

    pub fn render(&self, source: &str, params: &ParameterContext) -> Result<BoundSql> {
        self.compile(source)?.render(params, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaceholderStyle;
    use serde_json::json;

    #[test]
    fn render_compiles_through_the_cache() {
        let engine = SqlEngine::new();
        let params = ParameterContext::from_json(json!({"id": 7}));
        let src = "select * from t where id = #{id}";
        let first = engine.render(src, &params).unwrap();
        let second = engine.render(src, &params).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.sql, "select * from t where id = ?");
        assert_eq!(engine.cache().len(), 1);
    }

    #[test]
    fn engines_can_share_a_cache() {
        let cache = TemplateCache::new();
        let numbered = SqlEngine::with_cache(
            EngineConfig {
                placeholder_style: PlaceholderStyle::Numbered,
                ..EngineConfig::default()
            },
            cache.clone(),
        );
        let question = SqlEngine::with_cache(EngineConfig::default(), cache.clone());
        let params = ParameterContext::new().with("a", 1);
        assert_eq!(numbered.render("a = #{a}", &params).unwrap().sql, "a = $1");
        assert_eq!(question.render("a = #{a}", &params).unwrap().sql, "a = ?");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn syntax_error_surfaces_with_code() {
        let err = SqlEngine::new()
            .render("<loop/>", &ParameterContext::new())
            .unwrap_err();
        assert_eq!(err.code(), "TEMPLATE_SYNTAX_ERROR");
        assert_eq!(err.to_string(), "unknown directive `<loop>` (line 1, column 1)");
    }
}
