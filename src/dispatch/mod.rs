//! Dispatch router
//!
//! Resolves a `(provider, model)` selection to a concrete
//! [`ProviderAdapter`](crate::provider::ProviderAdapter).
//! Providers are looked up in a registry of constructors keyed by provider
//! name, so new backends can be registered without touching the router.

pub mod models;

pub use models::{ModelCatalog, ModelSpec};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    config::UserConfig,
    error::{AppError, AppResult},
    provider::{names, BingWebClient, BoxedAdapter, ChatGptWebClient, OpenAiClient},
};

/// Caller's model selection; either half may be omitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RouteTarget {
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl RouteTarget {
    pub fn new(provider: Option<&str>, model: Option<&str>) -> Self {
        Self {
            provider: provider.map(str::to_string),
            model: model.map(str::to_string),
        }
    }
}

/// Inputs handed to an adapter constructor
pub struct AdapterContext<'a> {
    /// Model identifier to send upstream
    pub model: &'a str,
    /// Opaque caller credential, passed through unvalidated
    pub access_token: Option<String>,
    pub user: &'a UserConfig,
    pub http_client: reqwest::Client,
    pub bing_api_url: &'a str,
}

/// Builds an adapter for one request
pub type AdapterFactory = Arc<dyn Fn(AdapterContext<'_>) -> AppResult<BoxedAdapter> + Send + Sync>;

/// Registry-backed adapter resolution
pub struct DispatchRouter {
    factories: RwLock<HashMap<String, AdapterFactory>>,
    catalog: RwLock<ModelCatalog>,
    http_client: reqwest::Client,
    bing_api_url: String,
}

impl DispatchRouter {
    /// Router with no providers registered
    pub fn empty(http_client: reqwest::Client, bing_api_url: &str) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            catalog: RwLock::new(ModelCatalog::empty()),
            http_client,
            bing_api_url: bing_api_url.to_string(),
        }
    }

    /// Router with the built-in providers and model catalog
    pub fn with_builtin(http_client: reqwest::Client, bing_api_url: &str) -> Self {
        let router = Self::empty(http_client, bing_api_url);
        *router.catalog_mut() = ModelCatalog::builtin();

        router.register(
            names::BING_WEB,
            Arc::new(|ctx: AdapterContext<'_>| -> AppResult<BoxedAdapter> {
                Ok(Arc::new(BingWebClient::new(
                    ctx.http_client,
                    ctx.bing_api_url,
                    ctx.access_token,
                )) as BoxedAdapter)
            }),
        );
        router.register(
            names::CHATGPT_API,
            Arc::new(|ctx: AdapterContext<'_>| -> AppResult<BoxedAdapter> {
                Ok(Arc::new(OpenAiClient::api(
                    ctx.http_client,
                    ctx.user,
                    ctx.access_token,
                    ctx.model,
                )) as BoxedAdapter)
            }),
        );
        router.register(
            names::CUSTOM_API,
            Arc::new(|ctx: AdapterContext<'_>| -> AppResult<BoxedAdapter> {
                Ok(Arc::new(OpenAiClient::custom(
                    ctx.http_client,
                    ctx.user,
                    ctx.access_token,
                    ctx.model,
                )) as BoxedAdapter)
            }),
        );
        router.register(
            names::CHATGPT_WEB,
            Arc::new(|ctx: AdapterContext<'_>| -> AppResult<BoxedAdapter> {
                Ok(Arc::new(ChatGptWebClient::new(
                    ctx.http_client,
                    ctx.user,
                    ctx.access_token,
                    ctx.model,
                )) as BoxedAdapter)
            }),
        );
        router
    }

    /// Register (or replace) the constructor for a provider
    pub fn register(&self, provider: &str, factory: AdapterFactory) {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(provider.to_string(), factory);
        debug!(provider = %provider, "Registered provider");
    }

    /// Add a model to the catalog
    pub fn register_model(&self, spec: ModelSpec) {
        self.catalog_mut().add(spec);
    }

    fn catalog_mut(&self) -> std::sync::RwLockWriteGuard<'_, ModelCatalog> {
        self.catalog.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the model catalog
    pub fn catalog(&self) -> ModelCatalog {
        self.catalog.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(provider)
    }

    /// Resolve the provider name and upstream model for a selection
    pub fn resolve(&self, target: &RouteTarget, user: &UserConfig) -> AppResult<(String, String)> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());

        let upstream = |spec: &ModelSpec| {
            spec.upstream_model
                .clone()
                .unwrap_or_else(|| user.custom_model_name.clone())
        };

        match (target.provider.as_deref(), target.model.as_deref()) {
            (Some(provider), Some(model)) => match catalog.get(model) {
                Some(spec) if spec.provider == provider => {
                    Ok((provider.to_string(), upstream(spec)))
                }
                Some(spec) => Err(AppError::Configuration(format!(
                    "Model {} belongs to provider {}, not {}",
                    model, spec.provider, provider
                ))),
                None if catalog.accepts_any(provider) => {
                    Ok((provider.to_string(), model.to_string()))
                }
                None => Err(AppError::Configuration(format!("Unknown model: {}", model))),
            },
            (Some(provider), None) => match catalog.default_for(provider) {
                Some(spec) => Ok((provider.to_string(), upstream(spec))),
                None => Err(AppError::Configuration(format!("Unknown provider: {}", provider))),
            },
            (None, model) => {
                let key = model.unwrap_or(user.model_name.as_str());
                catalog
                    .get(key)
                    .map(|spec| (spec.provider.clone(), upstream(spec)))
                    .ok_or_else(|| AppError::Configuration(format!("Unknown model: {}", key)))
            }
        }
    }

    /// Build the adapter for a selection.
    ///
    /// Credentials are not checked here; adapters report authentication
    /// failures when they first talk to their backend.
    #[instrument(
        skip(self, access_token, user),
        fields(provider = ?target.provider, model = ?target.model)
    )]
    pub fn route(
        &self,
        target: &RouteTarget,
        access_token: Option<String>,
        user: &UserConfig,
    ) -> AppResult<BoxedAdapter> {
        let (provider, model) = self.resolve(target, user)?;

        let factory = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&provider)
            .cloned()
            .ok_or_else(|| AppError::Configuration(format!("Unknown provider: {}", provider)))?;

        debug!(provider = %provider, upstream_model = %model, "Routed generation");
        factory(AdapterContext {
            model: &model,
            access_token,
            user,
            http_client: self.http_client.clone(),
            bing_api_url: &self.bing_api_url,
        })
    }
}
