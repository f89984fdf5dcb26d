use crate::config::EffectiveAiConfig;
use crate::index::IndexRecord;
use crate::prompt::{build_system_prompt, build_user_prompt, PreviousAttempt};
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout for one chat-completions round trip.
pub const GENERATOR_TIMEOUT_SECS: u64 = 30;

/// External command-generation service. Output is untrusted text; callers
/// receive one cleaned command line.
pub trait CommandGenerator {
    fn generate(
        &self,
        ai: &EffectiveAiConfig,
        request: &str,
        record: &IndexRecord,
        rendered: &str,
        previous: Option<&PreviousAttempt>,
    ) -> Result<String>;
}

pub struct HttpCommandGenerator {
    client: Client,
}

impl HttpCommandGenerator {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(GENERATOR_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl CommandGenerator for HttpCommandGenerator {
    fn generate(
        &self,
        ai: &EffectiveAiConfig,
        request: &str,
        record: &IndexRecord,
        rendered: &str,
        previous: Option<&PreviousAttempt>,
    ) -> Result<String> {
        let messages = vec![
            Message {
                role: "system".to_string(),
                content: build_system_prompt(),
            },
            Message {
                role: "user".to_string(),
                content: build_user_prompt(request, record, rendered, previous),
            },
        ];

        let content = self.chat(ai, messages, 0.0)?;
        clean_command(&content)
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: Option<String>,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl HttpCommandGenerator {
    fn chat(
        &self,
        ai: &EffectiveAiConfig,
        messages: Vec<Message>,
        temperature: f32,
    ) -> Result<String> {
        let resp: ChatResponse = match ai {
            EffectiveAiConfig::OpenAI {
                api_key,
                base_url,
                model,
            } => {
                let req = ChatRequest {
                    model: Some(model.clone()),
                    messages,
                    temperature,
                };
                let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
                self.client
                    .post(&url)
                    .bearer_auth(api_key)
                    .json(&req)
                    .send()
                    .context("HTTP error calling OpenAI")?
                    .error_for_status()
                    .context("Non-success status from OpenAI")?
                    .json()
                    .context("Failed to parse OpenAI response JSON")?
            }
            EffectiveAiConfig::Azure {
                api_key,
                endpoint,
                deployment,
                api_version,
            } => {
                let req = ChatRequest {
                    model: None,
                    messages,
                    temperature,
                };
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint.trim_end_matches('/'),
                    deployment,
                    api_version
                );
                self.client
                    .post(&url)
                    .header("api-key", api_key)
                    .json(&req)
                    .send()
                    .context("HTTP error calling Azure OpenAI")?
                    .error_for_status()
                    .context("Non-success status from Azure OpenAI")?
                    .json()
                    .context("Failed to parse Azure OpenAI response JSON")?
            }
        };

        let content = resp
            .choices
            .first()
            .ok_or_else(|| anyhow!("No choices in LLM response"))?
            .message
            .content
            .trim()
            .to_string();

        Ok(content)
    }
}

/// Reduces a raw generator reply to one command line: drops markdown fences
/// and shell prompt prefixes, then takes the first line starting with
/// `gcloud`, or the first non-empty line when none does.
pub fn clean_command(text: &str) -> Result<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        let without_prompt = trimmed
            .strip_prefix("$ ")
            .or_else(|| trimmed.strip_prefix("# "))
            .unwrap_or(trimmed);
        if !without_prompt.is_empty() {
            lines.push(without_prompt.to_string());
        }
    }

    if let Some(command) = lines.iter().find(|l| l.starts_with("gcloud")) {
        return Ok(command.clone());
    }
    lines
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("Generator returned no usable command line"))
}
