// ABOUTME: Redaction of sensitive configuration values before persistence.
// ABOUTME: Key names decide sensitivity; the manifest is scrubbed of the same values.

use serde_json::Value;

use crate::recipe::{ConfigValues, value_to_string};

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "key",
    "credential",
    "private",
];

/// Values shorter than this are left in the manifest; replacing them would
/// mangle unrelated text.
const MIN_MANIFEST_REDACTION_LEN: usize = 4;

pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// Copy of `config` with every sensitive key's value replaced by [`REDACTED`].
pub fn sanitize_config(config: &ConfigValues) -> ConfigValues {
    config
        .iter()
        .map(|(k, v)| {
            let value = if is_sensitive_key(k) {
                Value::String(REDACTED.to_string())
            } else {
                v.clone()
            };
            (k.clone(), value)
        })
        .collect()
}

/// Replace every occurrence of a sensitive value in `manifest`.
pub fn redact_manifest(manifest: &str, config: &ConfigValues) -> String {
    let mut secrets: Vec<String> = config
        .iter()
        .filter(|(k, _)| is_sensitive_key(k))
        .map(|(_, v)| value_to_string(v))
        .filter(|s| s.len() >= MIN_MANIFEST_REDACTION_LEN)
        .collect();
    // Longest first so a secret containing another is replaced whole.
    secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

    let mut redacted = manifest.to_string();
    for secret in secrets {
        redacted = redacted.replace(&secret, REDACTED);
    }
    redacted
}
