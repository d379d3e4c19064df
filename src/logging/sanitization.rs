use regex::Regex;
use std::sync::OnceLock;

/// Number of leading token characters kept visible in logs
const VISIBLE_TOKEN_PREFIX: usize = 4;

/// Sanitization patterns for removing credentials from log output
pub struct SanitizationPatterns {
    bearer_token: Regex,
    api_key: Regex,
    token_field: Regex,
    password_field: Regex,
}

static PATTERNS: OnceLock<SanitizationPatterns> = OnceLock::new();

/// Get compiled regex patterns for sanitization
pub fn get_patterns() -> &'static SanitizationPatterns {
    PATTERNS.get_or_init(|| SanitizationPatterns {
        // Authorization header values
        bearer_token: Regex::new(r"(?i)bearer\s+[a-zA-Z0-9\-_\.~\+/=]+").unwrap(),

        // API keys - common patterns
        api_key: Regex::new(r"\b(sk_|pk_|api_|key_)[a-zA-Z0-9_]{15,}\b").unwrap(),

        // token=..., token: ...
        token_field: Regex::new(r"(?i)\b(token|access_token|api_key)\s*[:=]\s*\S+").unwrap(),

        // Password fields in various formats
        password_field: Regex::new(r"(?i)(password|passwd|pwd)\s*[:=]\s*\S+").unwrap(),
    })
}

/// Sanitize a log message by removing credentials
///
/// Used on messages that originate outside this crate, such as errors
/// raised by a fallback resolver, which may echo the token they failed on.
pub fn sanitize_log_message(message: &str) -> String {
    let patterns = get_patterns();
    let mut result = message.to_string();

    result = patterns.bearer_token.replace_all(&result, "Bearer [REDACTED]").to_string();
    result = patterns.api_key.replace_all(&result, "[REDACTED]").to_string();
    result = patterns.token_field.replace_all(&result, "$1=[REDACTED]").to_string();
    result = patterns.password_field.replace_all(&result, "$1=[REDACTED]").to_string();

    result
}

/// Shorten a bearer token to a loggable prefix
///
/// Short tokens are fully masked so that the prefix never reveals most of
/// the secret.
pub fn redact_token(token: &str) -> String {
    let chars = token.chars().count();
    if chars <= VISIBLE_TOKEN_PREFIX * 2 {
        return "****".to_string();
    }

    let prefix: String = token.chars().take(VISIBLE_TOKEN_PREFIX).collect();
    format!("{}****", prefix)
}
