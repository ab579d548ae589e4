//! Masking for API keys and endpoint URLs before they leave the process,
//! e.g. in the `GET /api/config` payload or in log lines.

use url::Url;

/// Keeps the first 2 and last 4 characters visible, with at least four
/// asterisks in between. Short values are masked almost entirely.
pub fn mask_api_key(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();

    if len <= 8 {
        if len <= 2 {
            return "*".repeat(len);
        }
        let mut masked = String::with_capacity(len);
        masked.push(chars[0]);
        masked.push_str(&"*".repeat(len - 2));
        masked.push(chars[len - 1]);
        return masked;
    }

    let start: String = chars[..2].iter().collect();
    let end: String = chars[len - 4..].iter().collect();
    let middle = "*".repeat(std::cmp::max(4, len - 6));
    format!("{start}{middle}{end}")
}

/// Keeps scheme and host visible and masks the path/query/fragment. Values
/// that do not parse as URLs fall back to `mask_api_key`.
pub fn mask_url(value: &str) -> String {
    if value.is_empty() {
        return value.to_string();
    }

    let Ok(url) = Url::parse(value) else {
        return mask_api_key(value);
    };
    let Some(host) = url.host_str() else {
        return mask_api_key(value);
    };

    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        // Just a domain, nothing worth hiding.
        return value.to_string();
    }

    let mut rest = url.path().to_string();
    if let Some(query) = url.query() {
        rest.push('?');
        rest.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        rest.push('#');
        rest.push_str(fragment);
    }

    if rest.chars().count() <= 4 {
        return value.to_string();
    }

    let chars: Vec<char> = rest.chars().collect();
    let len = chars.len();
    let masked_rest = if len > 8 {
        let start: String = chars[..2].iter().collect();
        let end: String = chars[len - 2..].iter().collect();
        format!("{start}{}{end}", "*".repeat(std::cmp::max(4, len - 4)))
    } else {
        "*".repeat(len)
    };

    format!("{}://{}{}", url.scheme(), host, masked_rest)
}

/// Picks the masking strategy from the field name: URL-ish fields keep their
/// host visible, everything else is treated as a secret.
pub fn mask_field_value(value: &str, field_name: &str) -> String {
    if value.is_empty() {
        return value.to_string();
    }
    let lower = field_name.to_lowercase();
    if lower.contains("url") || lower.contains("endpoint") {
        mask_url(value)
    } else {
        mask_api_key(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_keys_keep_prefix_and_suffix() {
        let masked = mask_api_key("sk-abcdefghijklmnop");
        assert!(masked.starts_with("sk"));
        assert!(masked.ends_with("mnop"));
        assert!(masked.contains("****"));
        assert!(!masked.contains("abcdef"));
    }

    #[test]
    fn short_keys_are_almost_fully_masked() {
        assert_eq!(mask_api_key(""), "");
        assert_eq!(mask_api_key("a"), "*");
        assert_eq!(mask_api_key("ab"), "**");
        assert_eq!(mask_api_key("abc"), "a*c");
        assert_eq!(mask_api_key("abcdefgh"), "a******h");
    }

    #[test]
    fn middle_has_at_least_four_asterisks() {
        assert_eq!(mask_api_key("abcdefghi"), "ab****fghi");
    }

    #[test]
    fn bare_domain_urls_stay_visible() {
        assert_eq!(mask_url("http://localhost:11434/"), "http://localhost:11434/");
        assert_eq!(mask_url("https://ollama.com"), "https://ollama.com");
    }

    #[test]
    fn url_paths_are_masked_but_host_remains() {
        let masked = mask_url("https://api.example.com/v1/secret/path?token=abc");
        assert!(masked.starts_with("https://api.example.com"));
        assert!(!masked.contains("secret"));
        assert!(!masked.contains("token=abc"));
        assert!(masked.contains("****"));
    }

    #[test]
    fn non_urls_fall_back_to_key_masking() {
        let masked = mask_url("not a url at all");
        assert!(masked.contains('*'));
        assert!(!masked.contains("url"));
    }

    #[test]
    fn field_name_selects_strategy() {
        let url_masked = mask_field_value("https://api.example.com/v1/models", "ollamaApiUrl");
        assert!(url_masked.starts_with("https://api.example.com"));

        let key_masked = mask_field_value("sk-abcdefghijklmnop", "openaiApiKey");
        assert!(key_masked.starts_with("sk"));
        assert!(key_masked.contains("****"));
    }
}
