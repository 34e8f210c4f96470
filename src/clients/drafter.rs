//! AI text generation for outbound correspondence.
//!
//! The drafting service takes a system prompt (role plus claim context) and a
//! user prompt (what to write) and returns plain prose. Subjects are composed
//! by the engine; only the body comes from the model.

use serde::{Deserialize, Serialize};

use super::{ensure_success, http_client, send_with_retry, CollabError, RetryPolicy};

/// A system/user prompt pair for one generation call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPrompt {
    pub system: String,
    pub user: String,
}

/// Seam between the engine and the drafting model.
pub trait Drafter: Send + Sync {
    /// Generate a message body. Implementations return non-blank prose or an
    /// error; the engine never sends an empty body.
    fn draft(&self, prompt: &DraftPrompt) -> Result<String, CollabError>;
}

#[derive(Deserialize)]
struct DraftResponse {
    text: String,
}

/// Live implementation posting to the drafting service.
pub struct HttpDrafter {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpDrafter {
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> Result<Self, CollabError> {
        if endpoint.trim().is_empty() {
            return Err(CollabError::Misconfigured("drafter endpoint not set".into()));
        }
        Ok(Self {
            client: http_client(timeout_secs)?,
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.to_string(),
            retry: RetryPolicy::default(),
        })
    }
}

impl Drafter for HttpDrafter {
    fn draft(&self, prompt: &DraftPrompt) -> Result<String, CollabError> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(prompt);
        let response = ensure_success(send_with_retry(request, &self.retry)?)?;
        let parsed: DraftResponse = response
            .json()
            .map_err(|e| CollabError::InvalidResponse(e.to_string()))?;
        let text = parsed.text.trim().to_string();
        if text.is_empty() {
            return Err(CollabError::InvalidResponse(
                "drafting service returned an empty body".into(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_serializes_camel_case() {
        let prompt = DraftPrompt {
            system: "You are a claims advocate.".into(),
            user: "Write a follow-up.".into(),
        };
        let wire = serde_json::to_value(&prompt).expect("serialize");
        assert_eq!(wire["system"], "You are a claims advocate.");
        assert_eq!(wire["user"], "Write a follow-up.");
    }

    #[test]
    fn test_response_parses_text_field() {
        let parsed: DraftResponse =
            serde_json::from_str(r#"{"text":"We are still waiting on the carrier."}"#)
                .expect("parse");
        assert_eq!(parsed.text, "We are still waiting on the carrier.");
    }
}
