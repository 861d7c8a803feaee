//! In-process marketplace and file server for tests

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use url::Url;

#[derive(Clone)]
struct MockState {
    catalog: Arc<Vec<Value>>,
    queries: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: MockState,
}

impl MockServer {
    /// Search term answered with a 500
    pub const FAILING_TERM: &'static str = "explode";
    /// Search term answered with a body that is not JSON
    pub const GARBAGE_TERM: &'static str = "garbage";
    /// The only version the package endpoint knows besides the catalog's
    pub const PUBLISHED_VERSION: &'static str = "0.9.0";
    pub const FILE_LEN: usize = 10 * 1024 + 17;

    /// Size of the `slow` file, sent in 1 KiB pieces
    pub const SLOW_LEN: usize = Self::SLOW_CHUNKS * 1024;

    const SLOW_CHUNKS: usize = 200;
    const SLOW_DELAY: Duration = Duration::from_millis(20);

    pub async fn start(catalog: Vec<Value>) -> Self {
        let state = MockState {
            catalog: Arc::new(catalog),
            queries: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(0)),
        };

        let app = Router::new()
            .route("/_apis/public/gallery/extensionquery", post(query))
            .route(
                "/_apis/public/gallery/publishers/:publisher/vsextensions/:name/:version/vspackage",
                get(package),
            )
            .route("/files/:name", get(file))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// An address nothing listens on
    pub async fn unused_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    /// `complete`, `gated`, `slow`, `broken`, `truncated`; anything else is a 404
    pub fn file_url(&self, name: &str) -> String {
        format!("http://{}/files/{}", self.addr, name)
    }

    pub fn query_count(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }

    /// Let `count` requests for the gated file through
    pub fn open_gate(&self, count: usize) {
        self.state.gate.add_permits(count);
    }

    pub fn file_content() -> Vec<u8> {
        (0..Self::FILE_LEN).map(|i| (i % 251) as u8).collect()
    }
}

async fn query(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.queries.fetch_add(1, Ordering::SeqCst);

    let filter = &body["filters"][0];
    let term = filter["criteria"][0]["value"].as_str().unwrap_or_default();
    if term == MockServer::FAILING_TERM {
        return (StatusCode::INTERNAL_SERVER_ERROR, "gallery exploded").into_response();
    }
    if term == MockServer::GARBAGE_TERM {
        return (StatusCode::OK, "<html>maintenance</html>").into_response();
    }

    let page_number = filter["pageNumber"].as_u64().unwrap_or(1).max(1) as usize;
    let page_size = filter["pageSize"].as_u64().unwrap_or(10) as usize;
    let page: Vec<Value> = state.catalog
        .iter()
        .skip((page_number - 1) * page_size)
        .take(page_size)
        .cloned()
        .collect();

    Json(json!({
        "results": [{
            "extensions": page,
            "pagingToken": null,
            "resultMetadata": [{
                "metadataType": "ResultCount",
                "metadataItems": [{ "name": "TotalCount", "count": state.catalog.len() }]
            }]
        }]
    }))
    .into_response()
}

async fn package(Path((_publisher, _name, version)): Path<(String, String, String)>) -> Response {
    if version == MockServer::PUBLISHED_VERSION {
        MockServer::file_content().into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn file(State(state): State<MockState>, Path(name): Path<String>) -> Response {
    match name.as_str() {
        "complete" => MockServer::file_content().into_response(),
        "gated" => {
            if let Ok(permit) = state.gate.acquire().await {
                permit.forget();
            }
            MockServer::file_content().into_response()
        }
        "slow" => {
            let stream = async_stream::stream! {
                for _ in 0..MockServer::SLOW_CHUNKS {
                    tokio::time::sleep(MockServer::SLOW_DELAY).await;
                    yield Ok::<_, std::io::Error>(Bytes::from(vec![1u8; 1024]));
                }
            };
            Body::from_stream(stream).into_response()
        }
        "broken" => {
            let stream = async_stream::stream! {
                yield Ok(Bytes::from(vec![2u8; 2048]));
                tokio::time::sleep(Duration::from_millis(20)).await;
                yield Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "upstream went away"));
            };
            Body::from_stream(stream).into_response()
        }
        "truncated" => {
            // announces the whole file, then ends after half of it
            let stream = async_stream::stream! {
                let content = MockServer::file_content();
                yield Ok::<_, std::io::Error>(Bytes::from(content[..MockServer::FILE_LEN / 2].to_vec()));
            };
            Response::builder()
                .header(header::CONTENT_LENGTH, MockServer::FILE_LEN)
                .body(Body::from_stream(stream))
                .unwrap()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
