use std::fmt;

use regex::Regex;

/// Redacts credentials from worker and test output before it is logged,
/// journaled, or quoted back to the worker.
#[derive(Clone)]
pub struct SecretScrubber {
    api_key_pattern: Regex,
    token_pattern: Regex,
    bearer_pattern: Regex,
    password_pattern: Regex,
    private_key_pattern: Regex,
}

impl SecretScrubber {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            // Provider keys: sk-..., sk-ant-..., ghp_..., xoxb-...
            api_key_pattern: Regex::new(
                r"\b(?:sk-(?:ant-)?[a-zA-Z0-9_-]{20,}|gh[pousr]_[A-Za-z0-9]{20,}|xox[abpr]-[A-Za-z0-9-]{10,})",
            )?,
            token_pattern: Regex::new(
                r#"["']?(?:api_key|apikey|access_token|token|secret)["']?\s*[:=]\s*["']?[a-zA-Z0-9_.\-]{12,}["']?"#,
            )?,
            bearer_pattern: Regex::new(r"Bearer\s+[a-zA-Z0-9_.\-]+")?,
            password_pattern: Regex::new(r#"["']?password["']?\s*[:=]\s*["']?[^"'\s,}]+["']?"#)?,
            private_key_pattern: Regex::new(
                r"(?s)-----BEGIN [A-Z ]*PRIVATE KEY-----.*?-----END [A-Z ]*PRIVATE KEY-----",
            )?,
        })
    }

    /// Scrub a message of sensitive data
    pub fn scrub_message(&self, message: &str) -> String {
        let mut scrubbed = self
            .private_key_pattern
            .replace_all(message, "[PRIVATE_KEY_REDACTED]")
            .to_string();
        scrubbed = self
            .api_key_pattern
            .replace_all(&scrubbed, "[API_KEY_REDACTED]")
            .to_string();
        scrubbed = self
            .bearer_pattern
            .replace_all(&scrubbed, "Bearer [TOKEN_REDACTED]")
            .to_string();
        scrubbed = self
            .token_pattern
            .replace_all(&scrubbed, |caps: &regex::Captures| {
                let full_match = &caps[0];
                if let Some(colon_pos) = full_match.find(':') {
                    format!("{}:[REDACTED]", &full_match[..colon_pos])
                } else if let Some(eq_pos) = full_match.find('=') {
                    format!("{}=[REDACTED]", &full_match[..eq_pos])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        self.password_pattern
            .replace_all(&scrubbed, "password=[REDACTED]")
            .to_string()
    }
}

impl fmt::Debug for SecretScrubber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretScrubber").finish()
    }
}
