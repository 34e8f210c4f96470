//! Document classification.

use serde::{Deserialize, Serialize};

use super::{ensure_success, http_client, send_with_retry, CollabError, RetryPolicy};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

impl Classification {
    pub fn validate(self) -> Result<Self, CollabError> {
        if self.label.trim().is_empty() {
            return Err(CollabError::InvalidResponse("empty label".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(CollabError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(self)
    }
}

/// Seam between the engine and the classification service.
pub trait DocumentClassifier: Send + Sync {
    fn classify(&self, claim_number: &str, file_name: &str) -> Result<Classification, CollabError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyRequest<'a> {
    claim_number: &'a str,
    file_name: &'a str,
}

pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpClassifier {
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> Result<Self, CollabError> {
        if endpoint.trim().is_empty() {
            return Err(CollabError::Misconfigured(
                "classifier endpoint not set".into(),
            ));
        }
        Ok(Self {
            client: http_client(timeout_secs)?,
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.to_string(),
            retry: RetryPolicy::default(),
        })
    }
}

impl DocumentClassifier for HttpClassifier {
    fn classify(&self, claim_number: &str, file_name: &str) -> Result<Classification, CollabError> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ClassifyRequest {
                claim_number,
                file_name,
            });
        let response = ensure_success(send_with_retry(request, &self.retry)?)?;
        let result: Classification = response
            .json()
            .map_err(|e| CollabError::InvalidResponse(e.to_string()))?;
        result.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_validation() {
        let ok = Classification {
            label: "estimate".into(),
            confidence: 0.91,
        };
        assert!(ok.validate().is_ok());

        let empty = Classification {
            label: " ".into(),
            confidence: 0.5,
        };
        assert!(empty.validate().is_err());

        let out_of_range = Classification {
            label: "estimate".into(),
            confidence: 1.3,
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_classification_parses_from_wire() {
        let parsed: Classification =
            serde_json::from_str(r#"{"label":"denial_letter","confidence":0.84}"#).expect("parse");
        assert_eq!(parsed.label, "denial_letter");
        assert!((parsed.confidence - 0.84).abs() < 1e-9);
    }
}
