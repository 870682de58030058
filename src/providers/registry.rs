//! Model-to-provider resolution
//!
//! A routing table such as `gpt-4=openai,gpt-*=vllm,local-*=stub` maps model
//! names to provider names. Resolution tries an exact key first, then the
//! first `*`-suffixed key (in table order) whose prefix matches, then the
//! configured default.
//!
//! Provider instances are built lazily, one per normalized provider name,
//! and reused for the life of the registry.

use super::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
use super::stub::StubProvider;
use super::{Provider, ProviderKind, ProviderResult};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Provider used when neither the table nor the default names one
pub const FALLBACK_PROVIDER: &str = "stub";

/// Trim and lower-case a provider name; blank means [`FALLBACK_PROVIDER`]
pub fn normalize_provider_name(name: &str) -> String {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        FALLBACK_PROVIDER.to_string()
    } else {
        name
    }
}

/// Ordered model-key to provider-name table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelProviderMap {
    entries: Vec<(String, String)>,
}

impl ModelProviderMap {
    /// Parse `pattern=provider[,pattern=provider]*`
    ///
    /// Segments that are blank or lack `=` are skipped. Keys are trimmed;
    /// provider names are trimmed and lower-cased. A repeated key keeps its
    /// first position and takes the last value.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_proxy::providers::ModelProviderMap;
    ///
    /// let map = ModelProviderMap::parse("gpt-4=a, gpt-*=B ,junk,");
    /// assert_eq!(map.resolve("gpt-4"), Some("a"));
    /// assert_eq!(map.resolve("gpt-4-turbo"), Some("b"));
    /// assert_eq!(map.resolve("claude"), None);
    /// ```
    pub fn parse(raw: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();

        for part in raw.split(',') {
            let part = part.trim();
            let Some((key, provider)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim().to_string();
            let provider = provider.trim().to_lowercase();

            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = provider,
                None => entries.push((key, provider)),
            }
        }

        Self { entries }
    }

    /// Provider name for `model`, if any entry matches
    pub fn resolve(&self, model: &str) -> Option<&str> {
        if let Some((_, provider)) = self.entries.iter().find(|(key, _)| key == model) {
            return Some(provider);
        }

        self.entries
            .iter()
            .find(|(key, _)| {
                key.strip_suffix('*')
                    .is_some_and(|prefix| model.starts_with(prefix))
            })
            .map(|(_, provider)| provider.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A provider together with the normalized name it was resolved under
#[derive(Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub provider: Arc<dyn Provider>,
}

impl ResolvedProvider {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("name", &self.name)
            .field("kind", &self.provider.kind())
            .finish()
    }
}

/// Strategy for picking a provider for a model
///
/// [`ProviderRegistry`] is the production implementation. Any
/// `Fn(&str) -> ProviderResult<ResolvedProvider>` also works, which is how
/// tests substitute a provider.
pub trait ProviderSelector: Send + Sync {
    fn select(&self, model: &str) -> ProviderResult<ResolvedProvider>;
}

impl<F> ProviderSelector for F
where
    F: Fn(&str) -> ProviderResult<ResolvedProvider> + Send + Sync,
{
    fn select(&self, model: &str) -> ProviderResult<ResolvedProvider> {
        self(model)
    }
}

/// Routing table plus a cache of constructed providers
pub struct ProviderRegistry {
    map: ModelProviderMap,
    default_provider: String,
    backend: OpenAiCompatConfig,
    cache: DashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// `backend` configures every OpenAI-compatible instance the registry builds
    pub fn new(
        map: ModelProviderMap,
        default_provider: &str,
        backend: OpenAiCompatConfig,
    ) -> Self {
        let default_provider = normalize_provider_name(default_provider);
        tracing::info!(
            routes = map.len(),
            default_provider = %default_provider,
            "Provider registry initialized"
        );
        Self {
            map,
            default_provider,
            backend,
            cache: DashMap::new(),
        }
    }

    pub fn map(&self) -> &ModelProviderMap {
        &self.map
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Number of distinct provider instances built so far
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Provider name `model` routes to
    pub fn resolve_name(&self, model: &str) -> &str {
        self.map
            .resolve(model)
            .unwrap_or(self.default_provider.as_str())
    }

    /// Shared instance for a provider name, built on first use
    pub fn provider(&self, name: &str) -> ProviderResult<Arc<dyn Provider>> {
        let name = normalize_provider_name(name);

        if let Some(cached) = self.cache.get(&name) {
            return Ok(Arc::clone(cached.value()));
        }

        // Entry API holds the shard lock across check-then-insert, so
        // concurrent first requests build exactly one instance.
        let entry = self
            .cache
            .entry(name.clone())
            .or_try_insert_with(|| self.build(&name))?;
        Ok(Arc::clone(entry.value()))
    }

    /// Resolve `model` to a shared provider instance
    pub fn resolve(&self, model: &str) -> ProviderResult<ResolvedProvider> {
        let name = normalize_provider_name(self.resolve_name(model));
        let provider = self.provider(&name)?;
        tracing::debug!(model = %model, provider = %name, "Resolved provider");
        Ok(ResolvedProvider { name, provider })
    }

    fn build(&self, name: &str) -> ProviderResult<Arc<dyn Provider>> {
        let kind = ProviderKind::from_name(name);
        if kind == ProviderKind::Stub && name != FALLBACK_PROVIDER {
            tracing::warn!(
                provider = %name,
                "Unknown provider name, using stub provider"
            );
        }

        let provider: Arc<dyn Provider> = match kind {
            ProviderKind::Stub => Arc::new(StubProvider::new()),
            ProviderKind::OpenAiCompatible => {
                Arc::new(OpenAiCompatProvider::new(self.backend.clone())?)
            }
        };
        tracing::debug!(provider = %name, kind = %kind, "Constructed provider instance");
        Ok(provider)
    }
}

impl ProviderSelector for ProviderRegistry {
    fn select(&self, model: &str) -> ProviderResult<ResolvedProvider> {
        self.resolve(model)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("map", &self.map)
            .field("default_provider", &self.default_provider)
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(raw: &str, default_provider: &str) -> ProviderRegistry {
        ProviderRegistry::new(
            ModelProviderMap::parse(raw),
            default_provider,
            OpenAiCompatConfig::default(),
        )
    }

    #[test]
    fn test_exact_match_beats_wildcard() {
        let registry = registry("gpt-4=a,gpt-*=b", "stub");
        assert_eq!(registry.resolve_name("gpt-4"), "a");
        assert_eq!(registry.resolve_name("gpt-4-turbo"), "b");
    }

    #[test]
    fn test_exact_match_wins_even_when_wildcard_listed_first() {
        let registry = registry("gpt-*=b,gpt-4=a", "stub");
        assert_eq!(registry.resolve_name("gpt-4"), "a");
    }

    #[test]
    fn test_first_matching_wildcard_wins() {
        let map = ModelProviderMap::parse("llama*=ollama,llama-3*=vllm");
        assert_eq!(map.resolve("llama-3-8b"), Some("ollama"));
    }

    #[test]
    fn test_bare_star_matches_everything() {
        let map = ModelProviderMap::parse("*=vllm");
        assert_eq!(map.resolve("anything"), Some("vllm"));
        assert_eq!(map.resolve(""), Some("vllm"));
    }

    #[test]
    fn test_unconfigured_model_uses_default() {
        let registry = registry("gpt-4=a", " VLLM ");
        assert_eq!(registry.resolve_name("mistral"), "vllm");
    }

    #[test]
    fn test_blank_default_uses_fallback() {
        let registry = registry("", "  ");
        assert_eq!(registry.resolve_name("m"), FALLBACK_PROVIDER);
    }

    #[test]
    fn test_parse_skips_malformed_segments() {
        let map = ModelProviderMap::parse(" , novalue ,a=OLLAMA,, b = Stub ");
        assert_eq!(
            map.entries(),
            &[
                ("a".to_string(), "ollama".to_string()),
                ("b".to_string(), "stub".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_splits_on_first_equals_only() {
        let map = ModelProviderMap::parse("a=b=c");
        assert_eq!(map.resolve("a"), Some("b=c"));
    }

    #[test]
    fn test_duplicate_keys_keep_position_take_last_value() {
        let map = ModelProviderMap::parse("x*=one,y=two,x*=three");
        assert_eq!(
            map.entries(),
            &[
                ("x*".to_string(), "three".to_string()),
                ("y".to_string(), "two".to_string())
            ]
        );
    }

    #[test]
    fn test_instances_are_reused_per_name() {
        let registry = registry("a=ollama,b=ollama,c=vllm", "stub");

        let a = registry.resolve("a").unwrap();
        let b = registry.resolve("b").unwrap();
        let c = registry.resolve("c").unwrap();

        assert!(Arc::ptr_eq(&a.provider, &b.provider));
        assert!(!Arc::ptr_eq(&a.provider, &c.provider));
        assert_eq!(a.provider.kind(), ProviderKind::OpenAiCompatible);
        assert_eq!(registry.cached_count(), 2);
    }

    #[test]
    fn test_unknown_provider_name_is_stub() {
        let registry = registry("m=mystery", "stub");
        let resolved = registry.resolve("m").unwrap();
        assert_eq!(resolved.name, "mystery");
        assert_eq!(resolved.provider.kind(), ProviderKind::Stub);
    }

    #[test]
    fn test_provider_lookup_normalizes_name() {
        let registry = registry("", "stub");
        let a = registry.provider(" Ollama").unwrap();
        let b = registry.provider("ollama").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_concurrent_first_resolution_builds_one_instance() {
        let registry = Arc::new(registry("", "vllm"));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve("m").unwrap().provider)
            })
            .collect();
        let providers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.cached_count(), 1);
        assert!(providers.iter().all(|p| Arc::ptr_eq(p, &providers[0])));
    }

    #[test]
    fn test_closure_is_a_selector() {
        let selector = |_: &str| -> ProviderResult<ResolvedProvider> {
            Ok(ResolvedProvider::new("fixed", Arc::new(StubProvider::new())))
        };
        let resolved = selector.select("anything").unwrap();
        assert_eq!(resolved.name, "fixed");
    }
}
