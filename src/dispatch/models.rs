//! Model catalog
//!
//! Maps the model keys callers select (`chatgptFree35`, `bingFree4`, ...) to
//! the provider that serves them and the model identifier sent upstream.

use serde::Serialize;

use crate::provider::names;

/// One selectable model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub key: String,
    pub provider: String,
    /// Identifier sent upstream; `None` means the user's configured custom model name
    pub upstream_model: Option<String>,
    pub desc: String,
}

impl ModelSpec {
    pub fn new(key: &str, provider: &str, upstream_model: Option<&str>, desc: &str) -> Self {
        Self {
            key: key.to_string(),
            provider: provider.to_string(),
            upstream_model: upstream_model.map(str::to_string),
            desc: desc.to_string(),
        }
    }
}

/// Ordered list of models; the first entry of a provider is its default
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Vec<ModelSpec>,
    /// Providers that accept model names outside the catalog
    open_providers: Vec<String>,
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog of the built-in providers
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog
            .add(ModelSpec::new(
                "chatgptFree35",
                names::CHATGPT_WEB,
                Some("text-davinci-002-render-sha"),
                "ChatGPT (Web)",
            ))
            .add(ModelSpec::new(
                "chatgptPlus4",
                names::CHATGPT_WEB,
                Some("gpt-4"),
                "ChatGPT (Web, GPT-4)",
            ))
            .add(ModelSpec::new(
                "chatgptApi35",
                names::CHATGPT_API,
                Some("gpt-3.5-turbo"),
                "ChatGPT (GPT-3.5-turbo)",
            ))
            .add(ModelSpec::new(
                "chatgptApi4_8k",
                names::CHATGPT_API,
                Some("gpt-4"),
                "ChatGPT (GPT-4-8k)",
            ))
            .add(ModelSpec::new(
                "chatgptApi4_32k",
                names::CHATGPT_API,
                Some("gpt-4-32k"),
                "ChatGPT (GPT-4-32k)",
            ))
            .add(ModelSpec::new("bingFree4", names::BING_WEB, Some("bing"), "Bing (Web, GPT-4)"))
            .add(ModelSpec::new("customModel", names::CUSTOM_API, None, "Custom Model"));
        catalog.open_provider(names::CUSTOM_API);
        catalog
    }

    /// Add a model; an existing entry with the same key is replaced
    pub fn add(&mut self, spec: ModelSpec) -> &mut Self {
        match self.models.iter_mut().find(|m| m.key == spec.key) {
            Some(existing) => *existing = spec,
            None => self.models.push(spec),
        }
        self
    }

    /// Let a provider accept model names that are not in the catalog
    pub fn open_provider(&mut self, provider: &str) -> &mut Self {
        if !self.accepts_any(provider) {
            self.open_providers.push(provider.to_string());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.key == key)
    }

    pub fn default_for(&self, provider: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.provider == provider)
    }

    pub fn accepts_any(&self, provider: &str) -> bool {
        self.open_providers.iter().any(|p| p == provider)
    }

    pub fn all(&self) -> &[ModelSpec] {
        &self.models
    }
}
