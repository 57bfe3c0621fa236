//! PII redaction applied to user-authored text before it leaves the trust
//! boundary. Six pattern classes with fixed replacements and a whitelist
//! for known-safe matches.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiClass {
    Email,
    Phone,
    Ssn,
    IpAddress,
    CreditCard,
    UrlWithParams,
}

impl PiiClass {
    pub fn replacement(&self) -> &'static str {
        match self {
            Self::Email => "[EMAIL_REDACTED]",
            Self::Phone => "[PHONE_REDACTED]",
            Self::Ssn => "[SSN_REDACTED]",
            Self::IpAddress => "[IP_REDACTED]",
            Self::CreditCard => "[CARD_REDACTED]",
            Self::UrlWithParams => "[URL_REDACTED]",
        }
    }
}

// Order matters: classes are applied sequentially over the running text, so
// email/phone fire before the broader card and URL patterns.
static PATTERNS: LazyLock<Vec<(PiiClass, Regex)>> = LazyLock::new(|| {
    vec![
        (
            PiiClass::Email,
            Regex::new(r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
        ),
        (
            PiiClass::Phone,
            Regex::new(r"\b(?:\+?1[-.]?)?\(?[0-9]{3}\)?[-.]?[0-9]{3}[-.]?[0-9]{4}\b").unwrap(),
        ),
        (PiiClass::Ssn, Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
        (
            PiiClass::IpAddress,
            Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap(),
        ),
        (
            PiiClass::CreditCard,
            Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap(),
        ),
        (
            PiiClass::UrlWithParams,
            Regex::new(r"https?://[^\s]+\?[^\s]+").unwrap(),
        ),
    ]
});

static WHITELIST: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"example\.com",
        r"test@test\.com",
        r"127\.0\.0\.1",
        r"localhost",
        r"0\.0\.0\.0",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

/// Detects and redacts personally identifiable information from free text.
#[derive(Debug, Clone)]
pub struct PiiRedactor {
    enabled: bool,
}

impl PiiRedactor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Redact all PII occurrences, returning the transformed text and the
    /// number of replacements. Whitelisted matches pass through untouched.
    /// When disabled, text passes through with a zero count; the pipeline
    /// emits the per-report warning.
    pub fn redact(&self, text: &str) -> (String, u32) {
        if !self.enabled || text.is_empty() {
            return (text.to_string(), 0);
        }

        let mut redacted = text.to_string();
        let mut count = 0u32;

        for (class, pattern) in PATTERNS.iter() {
            loop {
                let Some(m) = pattern
                    .find_iter(&redacted)
                    .find(|m| !is_whitelisted(m.as_str()))
                else {
                    break;
                };
                let (start, end) = (m.start(), m.end());
                redacted.replace_range(start..end, class.replacement());
                count += 1;
            }
        }

        (redacted, count)
    }

    /// Convenience for optional fields: `None` stays `None`.
    pub fn redact_opt(&self, text: Option<&str>) -> (Option<String>, u32) {
        match text {
            Some(t) => {
                let (out, n) = self.redact(t);
                (Some(out), n)
            }
            None => (None, 0),
        }
    }
}

fn is_whitelisted(candidate: &str) -> bool {
    WHITELIST.iter().any(|w| w.is_match(candidate))
}
