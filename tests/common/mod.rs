#![allow(dead_code)]

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use conda_tos::channel::Channel;
use conda_tos::path::SearchPath;
use conda_tos::remote::HttpRemote;
use conda_tos::tos::TosClient;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Routes = Arc<Mutex<HashMap<String, (StatusCode, String)>>>;

#[derive(Clone)]
struct ServerState {
    routes: Routes,
    hits: Arc<AtomicUsize>,
}

/// Local server answering `/<channel>/tos.json` requests
pub struct TosServer {
    base: String,
    routes: Routes,
    hits: Arc<AtomicUsize>,
}

impl TosServer {
    /// Start on an ephemeral port; the server lives until the test process exits
    pub fn start() -> Self {
        let routes: Routes = Arc::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let state = ServerState {
            routes: routes.clone(),
            hits: hits.clone(),
        };

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let app = Router::new().fallback(serve_tos).with_state(state);
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self {
            base: format!("http://{addr}"),
            routes,
            hits,
        }
    }

    pub fn channel(&self, name: &str) -> Channel {
        Channel::from_url(&format!("{}/{name}", self.base)).unwrap()
    }

    /// Serve `document` as the ToS of channel `name`
    pub fn publish(&self, name: &str, document: Value) {
        self.respond(name, StatusCode::OK, document.to_string());
    }

    pub fn respond(&self, name: &str, status: StatusCode, body: impl Into<String>) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("/{name}/tos.json"), (status, body.into()));
    }

    pub fn unpublish(&self, name: &str) {
        self.routes
            .lock()
            .unwrap()
            .remove(&format!("/{name}/tos.json"));
    }

    /// Requests received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn serve_tos(State(state): State<ServerState>, uri: Uri) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let route = state.routes.lock().unwrap().get(uri.path()).cloned();
    match route {
        Some((status, body)) => {
            (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Temporary ToS root, secondary search root and cache directory
pub struct Workspace {
    pub root: TempDir,
    pub search: TempDir,
    pub cache: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            search: TempDir::new().unwrap(),
            cache: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn search_path(&self) -> SearchPath {
        SearchPath::from_roots([self.search.path()])
    }

    pub fn client(&self) -> TosClient<HttpRemote> {
        let remote = HttpRemote::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        TosClient::new(self.search_path(), self.cache.path(), remote)
    }
}
