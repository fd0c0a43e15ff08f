//! Client for the MediaWiki action API.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sibyl_core::Context;
use tracing::debug;

use crate::error::WikiError;
use crate::text::{extract_text, Page};

/// Namespaces searched when the config leaves them empty (main articles).
pub const DEFAULT_NAMESPACES: &str = "0";

/// Where the wiki lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiConfig {
    /// Full URL of the wiki's `api.php` endpoint.
    pub url: String,
    /// `|`-separated namespace ids to search.
    #[serde(default)]
    pub namespaces: String,
}

impl WikiConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespaces: String::new(),
        }
    }
}

/// Which part of a page a search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Title,
    Text,
}

impl SearchKind {
    fn as_param(self) -> &'static str {
        match self {
            SearchKind::Title => "title",
            SearchKind::Text => "text",
        }
    }
}

/// A search hit: enough to fetch and label the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageId {
    #[serde(rename = "pageid")]
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    query: SearchQuery,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    search: Vec<PageId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParseResponse {
    parse: ParseResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParseResult {
    text: ParseText,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParseText {
    #[serde(rename = "*")]
    content: String,
}

/// MediaWiki API client.
pub struct WikiClient {
    client: reqwest::Client,
    endpoint: String,
    namespaces: String,
}

impl WikiClient {
    pub fn new(config: &WikiConfig) -> Self {
        let namespaces = if config.namespaces.is_empty() {
            DEFAULT_NAMESPACES.to_string()
        } else {
            config.namespaces.clone()
        };
        Self {
            client: reqwest::Client::new(),
            endpoint: config.url.clone(),
            namespaces,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Search for pages matching `query`, best matches first.
    pub async fn search(
        &self,
        ctx: &Context,
        query: &str,
        kind: SearchKind,
        max_results: usize,
    ) -> Result<Vec<PageId>, WikiError> {
        let args = [
            ("action", "query".to_string()),
            ("list", "search".to_string()),
            ("srsearch", query.to_string()),
            ("srnamespace", self.namespaces.clone()),
            ("srlimit", max_results.to_string()),
            ("srwhat", kind.as_param().to_string()),
            ("srprop", String::new()),
        ];
        let resp: SearchResponse = self.api_call(ctx, &args).await?;
        debug!(
            "wiki {} search for {:?}: {} results",
            kind.as_param(),
            query,
            resp.query.search.len()
        );
        Ok(resp.query.search)
    }

    /// Fetch a page's rendered text.
    pub async fn get(&self, ctx: &Context, page_id: i64) -> Result<Page, WikiError> {
        let args = [
            ("action", "parse".to_string()),
            ("pageid", page_id.to_string()),
            ("prop", "text".to_string()),
            ("disablelimitreport", String::new()),
            ("disableeditsection", String::new()),
            ("disabletoc", String::new()),
        ];
        let resp: ParseResponse = self.api_call(ctx, &args).await?;
        extract_text(&resp.parse.text.content)
    }

    async fn api_call<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        args: &[(&str, String)],
    ) -> Result<T, WikiError> {
        tokio::select! {
            biased;
            done = ctx.done() => Err(done.into()),
            result = self.fetch(args) => result,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, args: &[(&str, String)]) -> Result<T, WikiError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(args)
            .query(&[("utf8", ""), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WikiError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use sibyl_core::Done;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Params = HashMap<String, String>;

    #[derive(Clone, Default)]
    struct FakeWiki {
        seen: Arc<Mutex<Vec<Params>>>,
    }

    async fn api(State(wiki): State<FakeWiki>, Query(params): Query<Params>) -> (StatusCode, String) {
        wiki.seen.lock().unwrap().push(params.clone());
        let param = |k: &str| params.get(k).map(String::as_str).unwrap_or_default();
        let body = match (param("action"), param("srwhat"), param("pageid")) {
            ("query", "title", _) => {
                r#"{"query":{"search":[{"ns":0,"title":"Befunge","pageid":1005},{"ns":0,"title":"Befunge-93","pageid":2459}]}}"#
            }
            ("query", "text", _) => "{}",
            ("parse", _, "1003") => {
                r#"{"parse":{"title":"Iota","pageid":1003,"text":{"*":"<div class=\"mw-parser-output\"><p>Iota is small.</p><h2>Syntax</h2><p>Just i and *.</p></div>"}}}"#
            }
            ("parse", _, "7") => "not json",
            ("parse", _, "8") => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "{}"
            }
            _ => return (StatusCode::NOT_FOUND, "unknown request".to_string()),
        };
        (StatusCode::OK, body.to_string())
    }

    async fn serve(wiki: FakeWiki) -> WikiClient {
        let app = Router::new().route("/api.php", get(api)).with_state(wiki);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        WikiClient::new(&WikiConfig::new(format!("http://{addr}/api.php")))
    }

    #[tokio::test]
    async fn test_search_title() {
        let wiki = FakeWiki::default();
        let client = serve(wiki.clone()).await;
        let ctx = Context::background();

        let pages = client
            .search(&ctx, "befunge", SearchKind::Title, 3)
            .await
            .unwrap();
        assert_eq!(
            pages,
            vec![
                PageId {
                    id: 1005,
                    title: "Befunge".to_string()
                },
                PageId {
                    id: 2459,
                    title: "Befunge-93".to_string()
                },
            ]
        );

        let seen = wiki.seen.lock().unwrap();
        let params = &seen[0];
        assert_eq!(params["srsearch"], "befunge");
        assert_eq!(params["srlimit"], "3");
        assert_eq!(params["srnamespace"], "0");
        assert_eq!(params["srprop"], "");
        assert_eq!(params["format"], "json");
    }

    #[tokio::test]
    async fn test_search_without_results() {
        let client = serve(FakeWiki::default()).await;
        let pages = client
            .search(&Context::background(), "befunge", SearchKind::Text, 2)
            .await
            .unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_get() {
        let client = serve(FakeWiki::default()).await;
        let page = client.get(&Context::background(), 1003).await.unwrap();
        assert_eq!(page.content(), "Iota is small.\n# Syntax\nJust i and *.\n");
    }

    #[tokio::test]
    async fn test_errors() {
        let client = serve(FakeWiki::default()).await;
        let ctx = Context::background();
        assert!(matches!(
            client.get(&ctx, 404).await,
            Err(WikiError::Status { status: 404 })
        ));
        assert!(matches!(client.get(&ctx, 7).await, Err(WikiError::Json(_))));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let client = serve(FakeWiki::default()).await;
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let err = client.get(&ctx, 8).await.unwrap_err();
        assert!(matches!(err, WikiError::Done(Done::DeadlineExceeded)));
        assert!(err.is_cancellation());
    }
}
