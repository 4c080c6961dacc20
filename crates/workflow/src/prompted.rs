//! A prompt definition bound to an LLM client and model.

use ragent_core::AppResult;
use ragent_llm::{ChatMessage, LlmClient, LlmRequest};
use ragent_prompt::{build_prompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Renders one prompt and sends it as a chat completion.
///
/// Shared by every LLM-backed workflow collaborator; sampling is always at
/// temperature 0. Errors are returned as the prompt or LLM layer reports
/// them; callers map them to their step.
#[derive(Clone)]
pub struct PromptedLlm {
    client: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
}

impl PromptedLlm {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, prompt: PromptDefinition) -> Self {
        Self {
            client,
            model: model.into(),
            prompt,
        }
    }

    pub async fn complete(
        &self,
        variables: &[(&str, &str)],
        history: Vec<ChatMessage>,
    ) -> AppResult<String> {
        let variables: HashMap<String, String> = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let built = build_prompt(&self.prompt, variables)?;

        let mut request = LlmRequest::new(built.user, self.model.clone())
            .with_temperature(0.0)
            .with_history(history);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        tracing::debug!(
            prompt = %self.prompt.id,
            provider = self.client.provider_name(),
            model = %self.model,
            "Sending prompt"
        );

        let response = self.client.complete(&request).await?;
        Ok(response.content)
    }
}
