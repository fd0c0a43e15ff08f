//! HTTP API.
//!
//! A single endpoint, `POST /ask`, takes the question as the raw request
//! body and answers with plain text. Every request is assigned an id (its
//! arrival time in microseconds, made unique), returned in the
//! `x-sibyl-request-id` header and used as the log entry's timestamp.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures_util::StreamExt;
use sibyl_core::{Context, LogEntry};
use sibyl_flow::{Flow, FlowConfig, FlowError, KnowledgeSource, Model};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Limits;
use crate::log_writer::{LogError, LogWriter};

pub const REQUEST_ID_HEADER: &str = "x-sibyl-request-id";

/// Why a request was not answered.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("too many concurrent requests")]
    Busy,

    #[error("failed to read request")]
    Read,

    #[error("request must not be empty")]
    Empty,

    #[error("request too large")]
    TooLarge,

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Read | ApiError::Empty => StatusCode::BAD_REQUEST,
            ApiError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Shared state behind the router.
#[derive(Clone)]
pub struct Api {
    shared: Arc<Shared>,
}

struct Shared {
    model: Arc<dyn Model>,
    source: Arc<dyn KnowledgeSource>,
    flow: FlowConfig,
    limits: Limits,
    /// One permit per request allowed in flight.
    in_flight: Arc<Semaphore>,
    ids: IdGenerator,
    log: Option<LogWriter>,
}

impl Api {
    pub fn new(
        model: Arc<dyn Model>,
        source: Arc<dyn KnowledgeSource>,
        flow: FlowConfig,
        limits: Limits,
        log: Option<LogWriter>,
    ) -> Self {
        let in_flight = Arc::new(Semaphore::new(limits.max_concurrent_requests));
        Self {
            shared: Arc::new(Shared {
                model,
                source,
                flow,
                limits,
                in_flight,
                ids: IdGenerator::default(),
                log,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ask", post(ask))
            .fallback(not_found)
            .with_state(self.shared.clone())
    }

    /// Flush and close the request log, if there is one.
    pub async fn close_log(&self) -> Result<(), LogError> {
        match &self.shared.log {
            Some(log) => log.close().await,
            None => Ok(()),
        }
    }
}

async fn ask(State(shared): State<Arc<Shared>>, method: Method, uri: Uri, body: Body) -> Response {
    let ctx = Context::background().with_timeout(shared.limits.request_timeout());
    // The handler is dropped when the client goes away; stop the work with it.
    let _cancel = CancelOnDrop(ctx.clone());
    let task = tokio::spawn(Shared::serve(shared, ctx, format!("{method} {uri}"), body));
    match task.await {
        Ok(response) => response,
        Err(e) => {
            error!("request task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

impl Shared {
    async fn serve(self: Arc<Self>, ctx: Context, request: String, body: Body) -> Response {
        let mut entry = LogEntry::new(self.ids.next(), request);
        let result = match self.in_flight.clone().try_acquire_owned() {
            Ok(_permit) => self.answer(&ctx, body, &mut entry).await,
            Err(_) => Err(ApiError::Busy),
        };

        let id = format!("{:x}", entry.time_usec);
        let response = match result {
            Ok(answer) => {
                info!("{} {}: answered {:?}", id, entry.request, entry.question);
                (StatusCode::OK, [(REQUEST_ID_HEADER, id)], answer).into_response()
            }
            Err(e) => {
                warn!("{} {}: {}", id, entry.request, e);
                let message = e.to_string();
                entry.error = Some(message.clone());
                (e.status(), [(REQUEST_ID_HEADER, id)], message).into_response()
            }
        };

        if let Some(log) = &self.log {
            log.write(entry).await;
        }
        response
    }

    async fn answer(
        &self,
        ctx: &Context,
        body: Body,
        entry: &mut LogEntry,
    ) -> Result<String, ApiError> {
        let question = read_question(body, self.limits.max_request_bytes).await?;
        entry.question = question.clone();
        let flow = Flow::new(
            self.model.as_ref(),
            self.source.as_ref(),
            &self.flow,
            &question,
        );
        Ok(flow.respond(ctx, entry).await?)
    }
}

/// Read the body, giving up as soon as it exceeds `max_bytes`.
async fn read_question(body: Body, max_bytes: usize) -> Result<String, ApiError> {
    let mut chunks = body.into_data_stream();
    let mut data = Vec::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|_| ApiError::Read)?;
        data.extend_from_slice(&chunk);
        if data.len() > max_bytes {
            return Err(ApiError::TooLarge);
        }
    }
    if data.is_empty() {
        return Err(ApiError::Empty);
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

struct CancelOnDrop(Context);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Hands out request ids: the current time in microseconds, bumped as
/// needed so that ids are strictly increasing.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last_usec: AtomicI64,
}

impl IdGenerator {
    pub fn next(&self) -> i64 {
        let mut last = self.last_usec.load(Ordering::Relaxed);
        loop {
            let now = chrono::Utc::now().timestamp_micros().max(last + 1);
            match self
                .last_usec
                .compare_exchange_weak(last, now, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return now,
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sibyl_model_host::HostError;
    use sibyl_wiki::{Page, PageId, SearchKind, WikiError};
    use tokio::sync::Notify;

    /// Answers every generation with the same text, optionally parking the
    /// final answer until released.
    #[derive(Default)]
    struct StubModel {
        answer: String,
        fail: bool,
        entered: Notify,
        release: Option<Notify>,
    }

    #[async_trait]
    impl Model for StubModel {
        async fn count_tokens(&self, ctx: &Context, _prompt: &str) -> Result<usize, HostError> {
            if let Some(done) = ctx.err() {
                return Err(done.into());
            }
            Ok(10)
        }

        async fn generate(
            &self,
            ctx: &Context,
            prompt: &str,
            log: &mut LogEntry,
        ) -> Result<String, HostError> {
            if let Some(done) = ctx.err() {
                return Err(done.into());
            }
            if self.fail {
                return Err(HostError::Model("out of cheese".to_string()));
            }
            if let Some(release) = &self.release {
                if prompt.contains("Answer the following question") {
                    self.entered.notify_one();
                    release.notified().await;
                }
            }
            log.record_generation(prompt, self.answer.as_str());
            Ok(self.answer.clone())
        }
    }

    struct EmptyWiki;

    #[async_trait]
    impl KnowledgeSource for EmptyWiki {
        async fn search(
            &self,
            _ctx: &Context,
            _query: &str,
            _kind: SearchKind,
            _max_results: usize,
        ) -> Result<Vec<PageId>, WikiError> {
            Ok(Vec::new())
        }

        async fn get(&self, _ctx: &Context, _page_id: i64) -> Result<Page, WikiError> {
            Err(WikiError::Status { status: 404 })
        }
    }

    fn stub(answer: &str) -> StubModel {
        StubModel {
            answer: answer.to_string(),
            ..Default::default()
        }
    }

    fn api(model: Arc<StubModel>, limits: Limits, log: Option<LogWriter>) -> Api {
        Api::new(model, Arc::new(EmptyWiki), FlowConfig::default(), limits, log)
    }

    async fn start(api: &Api) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = api.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn post(base: &str, body: impl Into<reqwest::Body>) -> (u16, Option<String>, String) {
        let resp = reqwest::Client::new()
            .post(format!("{base}/ask"))
            .body(body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        let id = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        (status, id, resp.text().await.unwrap())
    }

    #[test]
    fn test_ids_increase() {
        let ids = IdGenerator::default();
        let mut last = 0;
        for _ in 0..1000 {
            let id = ids.next();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let ids = Arc::new(IdGenerator::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..500).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 2000);
    }

    #[tokio::test]
    async fn test_answer() {
        let api = api(Arc::new(stub("Forty-two.")), Limits::default(), None);
        let base = start(&api).await;

        let (status, id, body) = post(&base, "What is the answer?").await;
        assert_eq!(status, 200);
        assert_eq!(body, "Forty-two.");
        let id = i64::from_str_radix(&id.unwrap(), 16).unwrap();
        assert!(id > 0);
    }

    #[tokio::test]
    async fn test_rejected_bodies() {
        let limits = Limits {
            max_request_bytes: 16,
            ..Limits::default()
        };
        let api = api(Arc::new(stub("unused")), limits, None);
        let base = start(&api).await;

        let (status, id, body) = post(&base, "").await;
        assert_eq!((status, body.as_str()), (400, "request must not be empty"));
        assert!(id.is_some());

        let (status, _, body) = post(&base, "x".repeat(17)).await;
        assert_eq!((status, body.as_str()), (413, "request too large"));

        let (status, _, _) = post(&base, "x".repeat(16)).await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let api = api(Arc::new(stub("unused")), Limits::default(), None);
        let base = start(&api).await;
        let resp = reqwest::get(format!("{base}/nope")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let model = Arc::new(StubModel {
            answer: "done".to_string(),
            release: Some(Notify::new()),
            ..Default::default()
        });
        let limits = Limits {
            max_concurrent_requests: 1,
            ..Limits::default()
        };
        let api = api(model.clone(), limits, None);
        let base = start(&api).await;

        let first = tokio::spawn({
            let base = base.clone();
            async move { post(&base, "first").await }
        });
        model.entered.notified().await;

        let (status, _, body) = post(&base, "second").await;
        assert_eq!((status, body.as_str()), (503, "too many concurrent requests"));

        model.release.as_ref().unwrap().notify_one();
        let (status, _, body) = first.await.unwrap();
        assert_eq!((status, body.as_str()), (200, "done"));

        // The permit is back once the first request is answered.
        let third = tokio::spawn({
            let base = base.clone();
            async move { post(&base, "third").await }
        });
        model.entered.notified().await;
        model.release.as_ref().unwrap().notify_one();
        let (status, _, body) = third.await.unwrap();
        assert_eq!((status, body.as_str()), (200, "done"));
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejects_everything() {
        let limits = Limits {
            max_concurrent_requests: 0,
            ..Limits::default()
        };
        let api = api(Arc::new(stub("unused")), limits, None);
        let base = start(&api).await;

        let (status, id, body) = post(&base, "hello?").await;
        assert_eq!((status, body.as_str()), (503, "too many concurrent requests"));
        assert!(id.is_some());
    }

    #[tokio::test]
    async fn test_failure_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let log = LogWriter::open(&path, 1 << 20, 4).await.unwrap();
        let model = Arc::new(StubModel {
            fail: true,
            ..Default::default()
        });
        let api = api(model, Limits::default(), Some(log));
        let base = start(&api).await;

        let (status, id, body) = post(&base, "Why?").await;
        assert_eq!(status, 500);
        assert!(body.contains("out of cheese"), "{body}");
        api.close_log().await.unwrap();

        let mut reader = sibyl_core::DelimReader::open(&path).await.unwrap();
        let entry: LogEntry = reader.read().await.unwrap().unwrap();
        assert_eq!(format!("{:x}", entry.time_usec), id.unwrap());
        assert_eq!(entry.request, "POST /ask");
        assert_eq!(entry.question, "Why?");
        assert!(entry.error.unwrap().contains("out of cheese"));
        assert_eq!(reader.read::<LogEntry>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let limits = Limits {
            request_timeout_secs: 0,
            ..Limits::default()
        };
        let api = api(Arc::new(stub("too late")), limits, None);
        let base = start(&api).await;

        let (status, _, body) = post(&base, "Anyone there?").await;
        assert_eq!(status, 500);
        assert!(body.contains("deadline exceeded"), "{body}");
    }
}
