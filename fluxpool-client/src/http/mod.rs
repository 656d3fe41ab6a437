//! HTTP transport.
//!
//! Uses [`reqwest`] internally.

mod config;

use std::time::{Duration, Instant};

use reqwest::{header::CONTENT_TYPE, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::trace;
use url::Url;

pub use self::config::{HttpConfig, HttpTcpConfig};
use crate::{
    client::{Client, Pong},
    error::ClientError,
    point::BatchPoints,
    query::{Query, Response},
};

const VERSION_HEADER: &str = "X-Influxdb-Version";

/// Error body returned by the server.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client.
#[derive(Clone, Debug)]
pub struct HttpClient {
    base: Url,
    username: Option<String>,
    password: Option<String>,
    inner: reqwest::Client,
}

impl HttpClient {
    /// Create new client from configuration.
    ///
    /// No requests are sent to the server.
    ///
    /// # Errors
    ///
    /// Returns `Err` if configuration is invalid or HTTP client cannot be initialized.
    pub fn new(config: &HttpConfig) -> Result<Self, ClientError> {
        let inner = config.to_client_builder()?.build()?;
        Ok(Self {
            base: config.addr.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            inner,
        })
    }

    /// Server URL.
    #[must_use]
    pub fn addr(&self) -> &Url {
        &self.base
    }

    /// Build endpoint URL, keeping any base path.
    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(name);
        }
        url
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => req.basic_auth(username, self.password.as_ref()),
            None => req,
        }
    }
}

/// Convert unsuccessful response into an error, preferring server-provided message.
async fn error_from(resp: reqwest::Response) -> ClientError {
    let status = resp.status().as_u16();
    match resp.bytes().await {
        Ok(body) => match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(err) => ClientError::server(status, err.error),
            Err(_) => ClientError::server(status, String::from_utf8_lossy(&body).trim()),
        },
        Err(err) => err.into(),
    }
}

#[async_trait::async_trait]
impl Client for HttpClient {
    type Error = ClientError;

    async fn ping(&self, timeout: Duration) -> Result<Pong, ClientError> {
        let started = Instant::now();
        let mut req = self.inner.get(self.endpoint("ping"));
        if !timeout.is_zero() {
            req = req
                .query(&[("wait_for_leader", format!("{}ms", timeout.as_millis()))])
                .timeout(timeout);
        }
        let resp = self.authorize(req).send().await?;
        if resp.status() != StatusCode::NO_CONTENT {
            return Err(error_from(resp).await);
        }
        let version = resp
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(Pong {
            rtt: started.elapsed(),
            version,
        })
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), ClientError> {
        let mut params = vec![
            ("db", batch.database()),
            ("precision", batch.precision().as_str()),
        ];
        if let Some(rp) = batch.retention_policy() {
            params.push(("rp", rp));
        }
        if let Some(consistency) = batch.consistency() {
            params.push(("consistency", consistency.as_str()));
        }
        let body = batch.to_line_protocol();
        trace!(bytes = body.len(), points = batch.points().len(), "sending write request");
        let req = self
            .inner
            .post(self.endpoint("write"))
            .query(&params)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        let resp = self.authorize(req).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(error_from(resp).await)
        }
    }

    async fn query(&self, query: &Query) -> Result<Response, ClientError> {
        let mut params = vec![("q", query.command.clone())];
        if !query.database.is_empty() {
            params.push(("db", query.database.clone()));
        }
        if let Some(rp) = &query.retention_policy {
            params.push(("rp", rp.clone()));
        }
        if let Some(epoch) = query.epoch {
            params.push(("epoch", epoch.as_str().into()));
        }
        if !query.parameters.is_empty() {
            params.push(("params", serde_json::to_string(&query.parameters)?));
        }
        let req = self.inner.post(self.endpoint("query")).query(&params);
        let resp = self.authorize(req).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        match serde_json::from_slice::<Response>(&body) {
            Ok(response) if status.is_success() || response.error().is_some() => Ok(response),
            Ok(_) => Err(ClientError::server(
                status.as_u16(),
                format!("received status code {} from server", status.as_u16()),
            )),
            Err(err) if status.is_success() => Err(err.into()),
            Err(_) => Err(ClientError::server(
                status.as_u16(),
                String::from_utf8_lossy(&body).trim(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use axum::{
        extract::{Query as QueryParams, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::point::{Consistency, Point, Precision};

    #[derive(Clone, Default)]
    struct Recorded {
        params: Arc<Mutex<Vec<HashMap<String, String>>>>,
        bodies: Arc<Mutex<Vec<String>>>,
        auth: Arc<Mutex<Vec<Option<String>>>>,
    }

    async fn ping(
        State(rec): State<Recorded>,
        QueryParams(params): QueryParams<HashMap<String, String>>,
    ) -> impl IntoResponse {
        rec.params.lock().unwrap().push(params);
        (StatusCode::NO_CONTENT, [(VERSION_HEADER, "1.8.10")])
    }

    async fn write(
        State(rec): State<Recorded>,
        headers: HeaderMap,
        QueryParams(params): QueryParams<HashMap<String, String>>,
        body: String,
    ) -> impl IntoResponse {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        rec.auth.lock().unwrap().push(auth);
        let missing_db = params.get("db").map_or(true, |db| db != "telemetry");
        rec.params.lock().unwrap().push(params);
        rec.bodies.lock().unwrap().push(body);
        if missing_db {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "database not found"})),
            )
                .into_response()
        } else {
            StatusCode::NO_CONTENT.into_response()
        }
    }

    async fn query(
        State(rec): State<Recorded>,
        QueryParams(params): QueryParams<HashMap<String, String>>,
    ) -> impl IntoResponse {
        let is_bad = params.get("q").is_some_and(|q| q.starts_with("BAD"));
        rec.params.lock().unwrap().push(params);
        if is_bad {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "error parsing query"})),
            )
        } else {
            (
                StatusCode::OK,
                Json(json!({
                    "results": [{
                        "statement_id": 0,
                        "series": [{"name": "cpu", "columns": ["time", "v"], "values": [[1, 2]]}]
                    }]
                })),
            )
        }
    }

    async fn spawn_server() -> (SocketAddr, Recorded) {
        let rec = Recorded::default();
        let app = Router::new()
            .route("/ping", get(ping))
            .route("/write", post(write))
            .route("/query", post(query))
            .with_state(rec.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, rec)
    }

    fn client_for(addr: SocketAddr) -> HttpClient {
        let url = Url::parse(&format!("http://{addr}")).unwrap();
        HttpClient::new(&HttpConfig::new(url).with_credentials("writer", "secret")).unwrap()
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let cfg = HttpConfig::new(Url::parse("http://db.local:8086/influx/").unwrap());
        let client = HttpClient::new(&cfg).unwrap();
        assert_eq!(
            client.endpoint("write").as_str(),
            "http://db.local:8086/influx/write"
        );
    }

    #[tokio::test]
    async fn ping_reports_version() {
        let (addr, rec) = spawn_server().await;
        let client = client_for(addr);
        let pong = client.ping(Duration::from_millis(500)).await.unwrap();
        assert_eq!(pong.version, "1.8.10");
        let params = rec.params.lock().unwrap();
        assert_eq!(params[0]["wait_for_leader"], "500ms");
    }

    #[tokio::test]
    async fn ping_unreachable_server_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(addr);
        assert!(client.ping(Duration::from_millis(100)).await.is_err());
    }

    #[tokio::test]
    async fn write_sends_line_protocol() {
        let (addr, rec) = spawn_server().await;
        let client = client_for(addr);
        let mut batch = BatchPoints::new("telemetry")
            .with_precision(Precision::Seconds)
            .with_retention_policy("weekly")
            .with_consistency(Consistency::One);
        batch.push(Point::builder("cpu").field("v", 1i64).build().unwrap());
        client.write(&batch).await.unwrap();

        let params = rec.params.lock().unwrap();
        assert_eq!(params[0]["db"], "telemetry");
        assert_eq!(params[0]["precision"], "s");
        assert_eq!(params[0]["rp"], "weekly");
        assert_eq!(params[0]["consistency"], "one");
        assert_eq!(rec.bodies.lock().unwrap()[0], "cpu v=1i\n");
        let auth = rec.auth.lock().unwrap();
        assert!(auth[0].as_deref().is_some_and(|a| a.starts_with("Basic ")));
    }

    #[tokio::test]
    async fn write_error_carries_server_message() {
        let (addr, _rec) = spawn_server().await;
        let client = client_for(addr);
        let mut batch = BatchPoints::new("nope");
        batch.push(Point::builder("cpu").field("v", 1i64).build().unwrap());
        match client.write(&batch).await {
            Err(ClientError::Server { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "database not found");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_decodes_results() {
        let (addr, rec) = spawn_server().await;
        let client = client_for(addr);
        let query = Query::new("SELECT v FROM cpu WHERE host = $host", "telemetry")
            .with_epoch(Precision::Milliseconds)
            .bind("host", "a1");
        let resp = client.query(&query).await.unwrap();
        assert_eq!(resp.results[0].series[0].name, "cpu");

        let params = rec.params.lock().unwrap();
        assert_eq!(params[0]["db"], "telemetry");
        assert_eq!(params[0]["epoch"], "ms");
        assert_eq!(params[0]["params"], r#"{"host":"a1"}"#);
    }

    #[tokio::test]
    async fn query_error_is_kept_in_response() {
        let (addr, _rec) = spawn_server().await;
        let client = client_for(addr);
        let resp = client.query(&Query::new("BAD QUERY", "telemetry")).await.unwrap();
        assert_eq!(resp.error(), Some("error parsing query"));
    }
}
