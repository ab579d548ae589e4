use crate::search::{search_searxng, SearchOptions};
use crate::types::SearchResult;
use crate::AppState;
use anyhow::{anyhow, Result};
use futures::future::join_all;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DISCOVER_CACHE_TTL: Duration = Duration::from_secs(15 * 60);
pub const DISCOVER_CACHE_MAX_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverMode {
    Normal,
    Preview,
}

impl DiscoverMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "normal" => Some(DiscoverMode::Normal),
            "preview" => Some(DiscoverMode::Preview),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            DiscoverMode::Normal => "normal",
            DiscoverMode::Preview => "preview",
        }
    }
}

pub struct TopicSources {
    pub queries: &'static [&'static str],
    pub sites: &'static [&'static str],
}

/// Curated news queries and sites per language and topic.
pub fn topic_sources(language: &str, topic: &str) -> Option<TopicSources> {
    let (queries, sites): (&[&str], &[&str]) = match (language, topic) {
        ("de", "tech") => (&["Technologie Nachrichten", "KI"], &["heise.de", "t3n.de"]),
        ("de", "finance") => (
            &["Wirtschaft Nachrichten", "Börse"],
            &["handelsblatt.com", "wiwo.de"],
        ),
        ("de", "entertainment") => (
            &["Unterhaltung", "Filme"],
            &["spiegel.de/kultur", "stern.de"],
        ),
        ("de", "sports") => (
            &["Sport Nachrichten", "Fußball"],
            &["kicker.de", "sport1.de"],
        ),
        ("de", "health") => (
            &["Gesundheit", "Medizin"],
            &["apotheken-umschau.de", "netdoktor.de"],
        ),
        ("de", "games") => (
            &["Gaming News", "Videospiele"],
            &["gamestar.de", "pcgames.de"],
        ),
        ("en", "tech") => (
            &["technology news", "latest tech"],
            &["techcrunch.com", "wired.com"],
        ),
        ("en", "finance") => (&["finance news", "economy"], &["bloomberg.com", "cnbc.com"]),
        ("en", "entertainment") => (
            &["entertainment news", "movies"],
            &["hollywoodreporter.com", "variety.com"],
        ),
        ("en", "sports") => (
            &["sports news", "latest sports"],
            &["espn.com", "bbc.com/sport"],
        ),
        ("en", "health") => (
            &["health news", "medical research"],
            &["healthline.com", "medicalnewstoday.com"],
        ),
        ("en", "games") => (&["gaming news", "video games"], &["ign.com", "gamespot.com"]),
        _ => return None,
    };
    Some(TopicSources { queries, sites })
}

pub fn cache_key(language: &str, topic: &str, mode: DiscoverMode) -> String {
    format!("{}-{}-{}", language, topic, mode.as_str())
}

/// Fetches news articles for a topic, serving a fresh cache entry when one
/// exists and refreshing it otherwise.
pub async fn discover(
    state: &Arc<AppState>,
    language: &str,
    topic: &str,
    mode: DiscoverMode,
) -> Result<Vec<SearchResult>> {
    let sources =
        topic_sources(language, topic).ok_or_else(|| anyhow!("unknown language or topic"))?;

    let key = cache_key(language, topic, mode);
    if let Some(entry) = state.discover_cache.get(&key) {
        if state.discover_cache.is_fresh(&entry) {
            debug!("discover cache hit for {}", key);
            return Ok(entry.data);
        }
    }

    state.discover_cache.maybe_sweep();

    let articles = match mode {
        DiscoverMode::Normal => fetch_all(state, language, &sources).await?,
        DiscoverMode::Preview => fetch_preview(state, language, &sources).await?,
    };

    state.discover_cache.insert(key, articles.clone());
    Ok(articles)
}

/// Full fan-out: every site paired with every query, deduplicated by URL and
/// shuffled so repeat visitors see a varied feed.
async fn fetch_all(
    state: &Arc<AppState>,
    language: &str,
    sources: &TopicSources,
) -> Result<Vec<SearchResult>> {
    let mut searches = Vec::new();
    for site in sources.sites {
        for query in sources.queries {
            let q = format!("site:{} {}", site, query);
            searches.push(async move {
                search_searxng(state, &q, news_options(language)).await
            });
        }
    }

    let mut articles = Vec::new();
    for output in join_all(searches).await {
        articles.extend(output?.results);
    }

    let mut seen: HashSet<String> = HashSet::new();
    articles.retain(|article| seen.insert(article.url.trim().to_lowercase()));
    articles.shuffle(&mut rand::thread_rng());
    Ok(articles)
}

/// Preview mode keeps it cheap: one random site, one random query.
async fn fetch_preview(
    state: &Arc<AppState>,
    language: &str,
    sources: &TopicSources,
) -> Result<Vec<SearchResult>> {
    let (site, query) = {
        let mut rng = rand::thread_rng();
        let site = sources.sites.choose(&mut rng).expect("sites non-empty");
        let query = sources.queries.choose(&mut rng).expect("queries non-empty");
        (*site, *query)
    };
    let output = search_searxng(
        state,
        &format!("site:{} {}", site, query),
        news_options(language),
    )
    .await?;
    Ok(output.results)
}

fn news_options(language: &str) -> SearchOptions {
    SearchOptions {
        engines: Some(vec!["bing news".to_string()]),
        pageno: Some(1),
        language: Some(language.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_matches_fingerprint_format() {
        assert_eq!(
            cache_key("en", "tech", DiscoverMode::Normal),
            "en-tech-normal"
        );
        assert_eq!(
            cache_key("de", "sports", DiscoverMode::Preview),
            "de-sports-preview"
        );
    }

    #[test]
    fn every_topic_exists_in_both_languages() {
        for language in ["en", "de"] {
            for topic in [
                "tech",
                "finance",
                "entertainment",
                "sports",
                "health",
                "games",
            ] {
                let sources = topic_sources(language, topic)
                    .unwrap_or_else(|| panic!("missing {language}/{topic}"));
                assert!(!sources.queries.is_empty());
                assert!(!sources.sites.is_empty());
            }
        }
    }

    #[test]
    fn unknown_language_or_topic_is_rejected() {
        assert!(topic_sources("fr", "tech").is_none());
        assert!(topic_sources("en", "politics").is_none());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(DiscoverMode::parse("normal"), Some(DiscoverMode::Normal));
        assert_eq!(DiscoverMode::parse("preview"), Some(DiscoverMode::Preview));
        assert!(DiscoverMode::parse("full").is_none());
    }
}
