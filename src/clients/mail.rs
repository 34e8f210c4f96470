//! Transactional email delivery.

use serde::Serialize;

use super::{ensure_success, http_client, send_with_retry, CollabError, RetryPolicy};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    To,
    Cc,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: RecipientKind,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub body: String,
    pub claim_id: String,
    /// Inbound alias the mail service copies so replies land back on the
    /// claim's correspondence feed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_email_cc: Option<String>,
}

impl OutboundEmail {
    pub fn new(
        claim_id: &str,
        email: &str,
        name: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Self {
        Self {
            recipients: vec![Recipient {
                email: email.to_string(),
                name: name.map(str::to_string),
                kind: RecipientKind::To,
            }],
            subject: subject.to_string(),
            body: body.to_string(),
            claim_id: claim_id.to_string(),
            claim_email_cc: None,
        }
    }

    pub fn with_intake_cc(mut self, cc: Option<String>) -> Self {
        self.claim_email_cc = cc;
        self
    }
}

/// Seam between the engine and the mail provider.
pub trait MailSender: Send + Sync {
    fn send(&self, email: &OutboundEmail) -> Result<(), CollabError>;
}

/// Live implementation posting to the mail service's send endpoint.
#[derive(Debug)]
pub struct HttpMailer {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpMailer {
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> Result<Self, CollabError> {
        if endpoint.trim().is_empty() {
            return Err(CollabError::Misconfigured("mail endpoint not set".into()));
        }
        Ok(Self {
            client: http_client(timeout_secs)?,
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.to_string(),
            retry: RetryPolicy::default(),
        })
    }
}

impl MailSender for HttpMailer {
    fn send(&self, email: &OutboundEmail) -> Result<(), CollabError> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(email);
        let response = send_with_retry(request, &self.retry)?;
        ensure_success(response)?;
        Ok(())
    }
}

/// CC address that routes replies back into the claim's correspondence feed.
///
/// The alias is the policy number reduced to lowercase alphanumerics; claims
/// without a usable policy number fall back to the claim id.
pub fn intake_cc_address(policy_number: Option<&str>, claim_id: &str, domain: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    };
    let alias = policy_number
        .map(sanitize)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| sanitize(claim_id));
    format!("claims+{alias}@{domain}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_cc_sanitizes_policy_number() {
        assert_eq!(
            intake_cc_address(Some("HO-3 449/221A"), "clm-1", "firm.example"),
            "claims+ho3449221a@firm.example"
        );
    }

    #[test]
    fn test_intake_cc_falls_back_to_claim_id() {
        assert_eq!(
            intake_cc_address(None, "clm-17", "firm.example"),
            "claims+clm17@firm.example"
        );
        // A policy number with no usable characters also falls back
        assert_eq!(
            intake_cc_address(Some("---"), "clm-17", "firm.example"),
            "claims+clm17@firm.example"
        );
    }

    #[test]
    fn test_outbound_email_wire_shape() {
        let email = OutboundEmail::new(
            "clm-1",
            "dana@carrier.example",
            Some("Dana Reyes"),
            "Claim CLM-100 status",
            "Checking in.",
        );
        let value = serde_json::to_value(&email).expect("serialize");
        assert_eq!(value["recipients"][0]["email"], "dana@carrier.example");
        assert_eq!(value["recipients"][0]["name"], "Dana Reyes");
        assert_eq!(value["recipients"][0]["type"], "to");
        assert_eq!(value["claimId"], "clm-1");
        assert!(
            value.get("claimEmailCc").is_none(),
            "unset intake cc is omitted"
        );

        let with_cc = email.with_intake_cc(Some("claims+pol1@firm.example".into()));
        let value = serde_json::to_value(&with_cc).expect("serialize");
        assert_eq!(value["claimEmailCc"], "claims+pol1@firm.example");
    }

    #[test]
    fn test_mailer_rejects_blank_endpoint() {
        let err = HttpMailer::new("  ", "key", 10).expect_err("misconfigured");
        assert!(!err.is_retryable());
    }
}
