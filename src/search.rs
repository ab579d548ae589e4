use crate::types::*;
use crate::AppState;
use anyhow::{anyhow, Result};
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default, Clone)]
pub struct SearchOptions {
    pub engines: Option<Vec<String>>,
    pub pageno: Option<u32>,
    pub language: Option<String>,
}

#[derive(Debug)]
pub struct SearchOutput {
    pub results: Vec<SearchResult>,
    pub suggestions: Vec<String>,
}

/// Queries the configured SearxNG instance and normalizes its results.
pub async fn search_searxng(
    state: &Arc<AppState>,
    query: &str,
    options: SearchOptions,
) -> Result<SearchOutput> {
    debug!("Searching SearxNG for: {}", query);

    let mut params: HashMap<String, String> = HashMap::new();
    params.insert("q".into(), query.to_string());
    params.insert("format".into(), "json".into());
    if let Some(engines) = options.engines {
        if !engines.is_empty() {
            params.insert("engines".into(), engines.join(","));
        }
    }
    params.insert(
        "pageno".into(),
        options.pageno.unwrap_or(1).to_string(),
    );
    if let Some(language) = options.language {
        if !language.is_empty() {
            params.insert("language".into(), language);
        }
    }

    // Bound concurrent upstream calls
    let _permit = state
        .outbound_limit
        .acquire()
        .await
        .expect("semaphore closed");

    // Resolved per request so endpoint changes saved via the API apply
    // without a restart.
    let endpoint = state.config.searxng_endpoint();
    let search_url = format!("{}/search", endpoint.trim_end_matches('/'));

    // Retry transient failures; 4xx responses are permanent
    let client = state.http_client.clone();
    let search_url_owned = search_url.clone();
    let params_cloned = params.clone();
    let response: SearxngResponse = retry(
        ExponentialBackoffBuilder::new()
            .with_initial_interval(std::time::Duration::from_millis(200))
            .with_max_interval(std::time::Duration::from_secs(2))
            .with_max_elapsed_time(Some(std::time::Duration::from_secs(4)))
            .build(),
        || async {
            let resp = client
                .get(&search_url_owned)
                .query(&params_cloned)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(anyhow!("Failed to send request to SearxNG: {}", e))
                })?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_else(|_| "".into());
                let err = anyhow!("SearxNG request failed with status {}: {}", status, text);
                if status.is_server_error() {
                    return Err(backoff::Error::transient(err));
                } else {
                    return Err(backoff::Error::permanent(err));
                }
            }
            match resp.json::<SearxngResponse>().await {
                Ok(parsed) => Ok(parsed),
                Err(e) => Err(backoff::Error::transient(anyhow!(
                    "Failed to parse SearxNG response: {}",
                    e
                ))),
            }
        },
    )
    .await?;

    info!("SearxNG returned {} results", response.results.len());

    let results = response
        .results
        .into_iter()
        .map(|result| SearchResult {
            url: result.url,
            title: result.title,
            content: result.content,
            thumbnail: result.thumbnail.or(result.img_src),
        })
        .collect();

    Ok(SearchOutput {
        results,
        suggestions: response.suggestions,
    })
}
