//! LLM provider abstraction and registry.
//!
//! Providers are a closed set registered by name at startup; templates may
//! pin one, otherwise the configured default is used.

use crate::config::ProviderSettings;
use crate::error::{NotesError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A completion with its cost.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Raw response text.
    pub text: String,
    /// Cost of this call in USD.
    pub cost: f64,
}

/// Trait for LLM completion providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name used in cost records and results.
    fn name(&self) -> &str;

    /// Run a completion. Transport errors surface as provider errors;
    /// retry policy belongs to the transport layer, not here.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion>;
}

/// OpenAI chat-completions provider with token-based cost computation.
pub struct OpenAiProvider {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    name: String,
    model: String,
    prompt_price_per_1k: f64,
    completion_price_per_1k: f64,
}

impl OpenAiProvider {
    /// Create a provider from its configured settings.
    pub fn new(name: &str, settings: &ProviderSettings) -> Self {
        Self {
            client: create_client(),
            name: name.to_string(),
            model: settings.model.clone(),
            prompt_price_per_1k: settings.prompt_price_per_1k,
            completion_price_per_1k: settings.completion_price_per_1k,
        }
    }

    fn cost_for(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        prompt_tokens as f64 / 1000.0 * self.prompt_price_per_1k
            + completion_tokens as f64 / 1000.0 * self.completion_price_per_1k
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system: &str, user: &str) -> Result<Completion> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| NotesError::OpenAI(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| NotesError::OpenAI(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .build()
            .map_err(|e| NotesError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| NotesError::OpenAI(format!("Completion failed: {}", e)))?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| NotesError::OpenAI("Empty response from model".to_string()))?;

        let cost = response
            .usage
            .as_ref()
            .map(|u| self.cost_for(u.prompt_tokens, u.completion_tokens))
            .unwrap_or(0.0);

        debug!("Completion from {} cost ${:.5}", self.model, cost);

        Ok(Completion { text, cost })
    }
}

/// Registry of named providers with a configured default.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_name: String,
}

impl ProviderRegistry {
    /// Create a registry with the given default provider name.
    pub fn new(default_name: &str) -> Self {
        Self {
            providers: HashMap::new(),
            default_name: default_name.to_string(),
        }
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Resolve a provider: the pinned name if given, else the default.
    pub fn resolve(&self, pinned: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let name = pinned.unwrap_or(&self.default_name);
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| NotesError::UnknownProvider(name.to_string()))
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        name: String,
    }

    #[async_trait]
    impl LlmProvider for StaticProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<Completion> {
            Ok(Completion {
                text: "{}".to_string(),
                cost: 0.0,
            })
        }
    }

    #[test]
    fn test_registry_resolution() {
        let mut registry = ProviderRegistry::new("openai");
        registry.register(Arc::new(StaticProvider {
            name: "openai".to_string(),
        }));
        registry.register(Arc::new(StaticProvider {
            name: "fast".to_string(),
        }));

        assert_eq!(registry.resolve(None).unwrap().name(), "openai");
        assert_eq!(registry.resolve(Some("fast")).unwrap().name(), "fast");
        assert!(matches!(
            registry.resolve(Some("missing")),
            Err(NotesError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_openai_cost_computation() {
        let provider = OpenAiProvider::new("openai", &ProviderSettings {
            model: "gpt-4o-mini".to_string(),
            prompt_price_per_1k: 0.001,
            completion_price_per_1k: 0.002,
        });

        let cost = provider.cost_for(1000, 500);
        assert!((cost - 0.002).abs() < 1e-9);
    }
}
