//! Publisher registry
//!
//! Static mapping from a publisher token to a [`SourceConfig`]: which
//! adapter ingests it, its feed URLs or crawler collection, the credential
//! it needs, and its default language. Token resolution reports unknown
//! tokens and deprecation warnings instead of dropping them silently.

use crate::models::AdapterKind;

/// Immutable per-publisher configuration, cloned per crawl invocation
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub publisher_id: String,
    pub display_name: String,
    pub adapter: AdapterKind,
    pub feed_urls: Vec<String>,
    /// Collection identifier for the generic crawler adapter
    pub collection: Option<String>,
    /// Environment variable holding the credential, when one is required
    pub credential_env: Option<String>,
    pub default_language: Option<String>,
    /// Deprecated token this config also answers to
    pub legacy_alias: Option<String>,
}

impl SourceConfig {
    fn crawler(code: &str, display_name: &str, language: &str) -> Self {
        Self {
            publisher_id: code.to_string(),
            display_name: display_name.to_string(),
            adapter: AdapterKind::GenericCrawler,
            feed_urls: Vec::new(),
            collection: Some(code.to_string()),
            credential_env: None,
            default_language: Some(language.to_string()),
            legacy_alias: None,
        }
    }

    fn rss(id: &str, display_name: &str, feeds: &[&str]) -> Self {
        Self {
            publisher_id: id.to_string(),
            display_name: display_name.to_string(),
            adapter: AdapterKind::Rss,
            feed_urls: feeds.iter().map(|f| f.to_string()).collect(),
            collection: None,
            credential_env: None,
            default_language: Some("en".to_string()),
            legacy_alias: None,
        }
    }

    fn gated(id: &str, display_name: &str, adapter: AdapterKind, credential_env: &str) -> Self {
        Self {
            publisher_id: id.to_string(),
            display_name: display_name.to_string(),
            adapter,
            feed_urls: Vec::new(),
            collection: None,
            credential_env: Some(credential_env.to_string()),
            default_language: None,
            legacy_alias: None,
        }
    }
}

/// Country and region collections served by the generic crawler.
/// `(token, display name, default language)`
const CRAWLER_COLLECTIONS: &[(&str, &str, &str)] = &[
    ("at", "Austria", "de"),
    ("au", "Australia", "en"),
    ("ca", "Canada", "en"),
    ("ch", "Switzerland", "de"),
    ("de", "Germany", "de"),
    ("es", "Spain", "es"),
    ("fr", "France", "fr"),
    ("ie", "Ireland", "en"),
    ("intl", "International", "en"),
    ("it", "Italy", "it"),
    ("jp", "Japan", "ja"),
    ("kr", "South Korea", "ko"),
    ("nl", "Netherlands", "nl"),
    ("nz", "New Zealand", "en"),
    ("pt", "Portugal", "pt"),
    ("uk", "United Kingdom", "en"),
    ("us", "United States", "en"),
];

/// Look a single normalized token up in the builtin registry
fn lookup(key: &str) -> Option<SourceConfig> {
    if let Some((code, name, lang)) = CRAWLER_COLLECTIONS.iter().find(|(code, _, _)| *code == key) {
        return Some(SourceConfig::crawler(code, name, lang));
    }

    let config = match key {
        "reuters" => SourceConfig::gated(
            "reuters",
            "Reuters",
            AdapterKind::LicensedFeed,
            "REUTERS_LICENSED_FEED_URL",
        ),
        "nyt" => SourceConfig::gated(
            "nyt",
            "New York Times",
            AdapterKind::OfficialApi,
            "NYT_API_KEY",
        ),
        "washington-post" | "wapo" => SourceConfig {
            legacy_alias: Some("wapo".to_string()),
            ..SourceConfig::rss(
                "washington-post",
                "Washington Post",
                &[
                    "https://feeds.washingtonpost.com/rss/world",
                    "https://feeds.washingtonpost.com/rss/national",
                ],
            )
        },
        "cnn" => SourceConfig::rss("cnn", "CNN", &["http://rss.cnn.com/rss/edition.rss"]),
        "bloomberg" => SourceConfig::gated(
            "bloomberg",
            "Bloomberg",
            AdapterKind::LicensedFeed,
            "BLOOMBERG_LICENSED_FEED_URL",
        ),
        "npr" => SourceConfig::rss("npr", "NPR", &["https://feeds.npr.org/1001/rss.xml"]),
        "wsj" => SourceConfig::gated(
            "wsj",
            "Wall Street Journal",
            AdapterKind::LicensedFeed,
            "WSJ_LICENSED_FEED_URL",
        ),
        "axios" => SourceConfig::gated(
            "axios",
            "Axios",
            AdapterKind::LicensedFeed,
            "AXIOS_LICENSED_FEED_URL",
        ),
        "propublica" => SourceConfig::rss(
            "propublica",
            "ProPublica",
            &["https://www.propublica.org/feeds/propublica/main"],
        ),
        "politico" => SourceConfig::gated(
            "politico",
            "Politico",
            AdapterKind::LicensedFeed,
            "POLITICO_LICENSED_FEED_URL",
        ),
        "the-atlantic" => SourceConfig::rss(
            "the-atlantic",
            "The Atlantic",
            &["https://www.theatlantic.com/feed/all/"],
        ),
        _ => return None,
    };
    Some(config)
}

/// Default crawl set: every generic-crawler collection
pub fn default_tokens() -> Vec<String> {
    CRAWLER_COLLECTIONS
        .iter()
        .map(|(code, _, _)| code.to_string())
        .collect()
}

/// Resolve one token; returns the config and an optional deprecation warning
pub fn resolve_token(token: &str) -> (Option<SourceConfig>, Option<String>) {
    let key = token.trim().to_lowercase();
    if key.is_empty() {
        return (None, None);
    }

    match lookup(&key) {
        Some(config) => {
            let warning = match &config.legacy_alias {
                Some(alias) if *alias == key => Some(format!(
                    "publisher token '{key}' is deprecated, use '{}'",
                    config.publisher_id
                )),
                _ => None,
            };
            (Some(config), warning)
        }
        None => (None, None),
    }
}

/// Resolve a token list into `(configs, warnings, unknown_tokens)`
pub fn resolve_tokens(tokens: &[String]) -> (Vec<SourceConfig>, Vec<String>, Vec<String>) {
    let mut configs = Vec::new();
    let mut warnings = Vec::new();
    let mut unknown = Vec::new();

    for token in tokens {
        let (config, warning) = resolve_token(token);
        match config {
            Some(config) => {
                configs.push(config);
                if let Some(warning) = warning {
                    warnings.push(warning);
                }
            }
            None => unknown.push(token.clone()),
        }
    }

    (configs, warnings, unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_token_resolves_to_crawler() {
        let (config, warning) = resolve_token("us");
        let config = config.unwrap();
        assert_eq!(config.adapter, AdapterKind::GenericCrawler);
        assert_eq!(config.collection.as_deref(), Some("us"));
        assert_eq!(config.default_language.as_deref(), Some("en"));
        assert!(warning.is_none());
    }

    #[test]
    fn test_token_normalization() {
        let (config, _) = resolve_token("  NPR ");
        assert_eq!(config.unwrap().publisher_id, "npr");
    }

    #[test]
    fn test_legacy_alias_warns() {
        let (config, warning) = resolve_token("wapo");
        assert_eq!(config.unwrap().publisher_id, "washington-post");
        assert!(warning.unwrap().contains("deprecated"));

        // The canonical token resolves without a warning
        let (_, warning) = resolve_token("washington-post");
        assert!(warning.is_none());
    }

    #[test]
    fn test_credential_gated_publishers() {
        let (config, _) = resolve_token("reuters");
        let config = config.unwrap();
        assert_eq!(config.adapter, AdapterKind::LicensedFeed);
        assert!(config.credential_env.is_some());

        let (config, _) = resolve_token("nyt");
        assert_eq!(config.unwrap().adapter, AdapterKind::OfficialApi);
    }

    #[test]
    fn test_unknown_tokens_reported() {
        let tokens = vec!["us".to_string(), "nope".to_string(), "cnn".to_string()];
        let (configs, warnings, unknown) = resolve_tokens(&tokens);
        assert_eq!(configs.len(), 2);
        assert!(warnings.is_empty());
        assert_eq!(unknown, vec!["nope".to_string()]);
    }

    #[test]
    fn test_default_tokens_all_resolve() {
        let (configs, warnings, unknown) = resolve_tokens(&default_tokens());
        assert_eq!(configs.len(), CRAWLER_COLLECTIONS.len());
        assert!(warnings.is_empty());
        assert!(unknown.is_empty());
    }
}
