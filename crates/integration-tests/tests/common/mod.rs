//! In-process fake of the Latitude `/servers` endpoint (axum on an ephemeral port)

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{serve, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Request as seen by the fake API (query and header values decoded)
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn page(&self) -> u32 {
        self.query_param("page[number]")
            .and_then(|p| p.parse().ok())
            .unwrap_or(1)
    }
}

type Responder = dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync;

#[derive(Clone)]
struct FakeState {
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn list_servers(
    State(state): State<FakeState>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
    };

    let (status, body) = (state.responder)(&request);
    state.requests.lock().unwrap().push(request);

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

pub struct FakeLatitudeApi {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl FakeLatitudeApi {
    /// Serve every `/servers` request with `responder`
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            responder: Arc::new(responder),
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/servers", get(list_servers))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            handle,
        }
    }

    /// Paginated listing guarded by `token`
    ///
    /// Page N serves `pages[N - 1]` as its `data`; later pages are empty.
    pub async fn with_pages(token: &str, pages: Vec<Vec<Value>>) -> Self {
        let token = token.to_string();
        Self::start(move |request| {
            if request.header("authorization") != Some(token.as_str()) {
                let body = json!({"errors": [{"status": "401", "title": "Unauthorized", "detail": "Invalid API token"}]});
                return (401, body.to_string());
            }
            let index = request.page().saturating_sub(1) as usize;
            let data = pages.get(index).cloned().unwrap_or_default();
            (200, json!({"data": data, "meta": {}}).to_string())
        })
        .await
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeLatitudeApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Server record in the Latitude API shape
pub fn server_json(id: &str, hostname: &str, ip: &str) -> Value {
    json!({
        "id": id,
        "type": "servers",
        "attributes": {
            "hostname": hostname,
            "primary_ipv4": ip,
            "status": "on",
            "role": "Bare Metal",
            "plan": {"id": "plan_1", "name": "c2.small.x86", "billing": "hourly", "slug": "c2-small-x86"},
            "region": {"city": "Dallas", "country": "United States", "site": {"slug": "DAL"}},
            "operating_system": {"slug": "ubuntu_22_04_x64_lts", "distro": {"name": "ubuntu"}},
            "project": {"id": "proj_1"}
        }
    })
}
