//! Message under inspection

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spamblock_common::types::TicketVars;

use crate::extract;

/// Everything the providers need to know about one inbound message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailContext {
    /// Message-ID
    pub mid: String,
    /// Envelope / From address
    pub from_email: String,
    pub subject: String,
    /// Raw header block
    pub header: String,
    /// Message body
    pub message: String,
    /// Resolved sending IP, empty when unknown
    pub ip: String,
}

/// Text form of a ticket var: strings as-is, anything else JSON-encoded
fn var_text(vars: &TicketVars, key: &str) -> String {
    match vars.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl EmailContext {
    pub fn new(
        mid: impl Into<String>,
        from_email: impl Into<String>,
        subject: impl Into<String>,
        header: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            mid: mid.into(),
            from_email: from_email.into(),
            subject: subject.into(),
            header: header.into(),
            message: message.into(),
            ip: String::new(),
        }
    }

    /// Set the sending IP
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    /// Build from the host's ticket vars, resolving the sending IP
    pub fn from_ticket_vars(vars: &TicketVars) -> Self {
        let header = var_text(vars, "header");
        let ip = extract::extract_ip(vars, &header)
            .map(|ip| ip.to_string())
            .unwrap_or_default();

        Self {
            mid: var_text(vars, "mid"),
            from_email: var_text(vars, "email"),
            subject: var_text(vars, "subject"),
            header,
            message: var_text(vars, "message"),
            ip,
        }
    }

    /// Whether the host supplied a header block at all
    pub fn has_header(&self) -> bool {
        !self.header.trim().is_empty()
    }

    /// Lowercased sender domain, if the address is usable
    pub fn sender_domain(&self) -> Option<String> {
        extract::sender_domain(&self.from_email)
    }

    /// Full RFC 822 text: header block, one blank line, body
    pub fn raw_email(&self) -> String {
        if self.header.is_empty() {
            return self.message.clone();
        }

        let separator = if self.header.ends_with("\r\n\r\n") || self.header.ends_with("\n\n") {
            ""
        } else if self.header.ends_with("\r\n") {
            "\r\n"
        } else if self.header.ends_with('\n') {
            "\n"
        } else {
            "\r\n\r\n"
        };

        format!("{}{}{}", self.header, separator, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn vars(value: Value) -> TicketVars {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_from_ticket_vars_normalizes_ip_field() {
        let ctx = EmailContext::from_ticket_vars(&vars(json!({
            "mid": "<m1@example.com>",
            "email": "sender@example.com",
            "subject": "subj",
            "header": "From: sender@example.com\r\n",
            "message": "hello",
            "ip": " [1.2.3.4]:25 ",
        })));

        assert_eq!(ctx.ip, "1.2.3.4");
        assert_eq!(ctx.mid, "<m1@example.com>");
        assert_eq!(ctx.sender_domain().as_deref(), Some("example.com"));
    }

    #[test]
    fn test_from_ticket_vars_prefers_public_header_ip() {
        let ctx = EmailContext::from_ticket_vars(&vars(json!({
            "mid": "<m2@example.com>",
            "email": "sender@example.com",
            "header": "X-Originating-IP: [10.0.0.1]\r\nX-Forwarded-For: 8.8.8.8, 10.0.0.1\r\n\r\n",
            "message": "hello",
        })));

        assert_eq!(ctx.ip, "8.8.8.8");
    }

    #[test]
    fn test_raw_email_adds_separator() {
        let ctx = EmailContext::new("<m3@example.com>", "a@example.com", "s", "Header: x", "BODY");
        assert_eq!(ctx.raw_email(), "Header: x\r\n\r\nBODY");

        let ctx = EmailContext::new("<m3@example.com>", "a@example.com", "s", "Header: x\r\n", "BODY");
        assert_eq!(ctx.raw_email(), "Header: x\r\n\r\nBODY");
    }

    #[test]
    fn test_raw_email_keeps_existing_separator() {
        let ctx = EmailContext::new("<m4@example.com>", "a@example.com", "s", "Header: x\r\n\r\n", "BODY");
        assert_eq!(ctx.raw_email(), "Header: x\r\n\r\nBODY");

        let ctx = EmailContext::new("<m4@example.com>", "a@example.com", "s", "Header: x\n\n", "BODY");
        assert_eq!(ctx.raw_email(), "Header: x\n\nBODY");
    }

    #[test]
    fn test_raw_email_without_header_is_body() {
        let ctx = EmailContext::new("<m5@example.com>", "a@example.com", "s", "", "BODY");
        assert_eq!(ctx.raw_email(), "BODY");
        assert!(!ctx.has_header());
    }

    #[test]
    fn test_non_string_message_is_json_encoded() {
        let ctx = EmailContext::from_ticket_vars(&vars(json!({
            "mid": "<m6@example.com>",
            "email": "sender@example.com",
            "header": "From: sender@example.com\r\n",
            "message": ["not", "a", "string"],
        })));

        assert_eq!(
            ctx.raw_email(),
            "From: sender@example.com\r\n\r\n[\"not\",\"a\",\"string\"]"
        );
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let ctx = EmailContext::from_ticket_vars(&TicketVars::new());
        assert_eq!(ctx, EmailContext::default());
    }
}
