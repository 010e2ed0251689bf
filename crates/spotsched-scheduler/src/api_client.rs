use crate::cluster::{ClusterClient, PodEventStream};
use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use k8s_openapi::api::core::v1::{Binding, Node, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use spotsched_core::{WatchEvent, WatchEventType};
use tracing::{debug, warn};

/// Lightweight HTTP client for the Kubernetes API server
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct ItemList<T> {
    items: Vec<T>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client: Client::new(),
        }
    }

    /// Authenticate every request with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into().trim().to_string();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    /// Trust an additional CA certificate (PEM), e.g. the in-cluster service account CA
    pub fn with_ca_certificate(mut self, pem: &[u8]) -> Result<Self> {
        let cert = reqwest::Certificate::from_pem(pem).map_err(|e| {
            SchedulerError::invalid_input(
                format!("Invalid CA certificate: {}", e),
                "Pass a PEM encoded certificate",
            )
        })?;
        self.client = Client::builder()
            .add_root_certificate(cert)
            .build()
            .map_err(|e| SchedulerError::internal_error(format!("Failed to build client: {}", e)))?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.client.request(method, &url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| SchedulerError::source_unavailable(format!("HTTP request failed: {}", e)))
    }
}

#[async_trait]
impl ClusterClient for ApiClient {
    /// GET /api/v1/nodes
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let resp = self.send(self.request(Method::GET, "/api/v1/nodes")).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SchedulerError::source_unavailable(format!(
                "GET nodes failed with status {}: {}",
                status, body
            )));
        }

        let list = resp.json::<ItemList<Node>>().await.map_err(|e| {
            SchedulerError::source_unavailable(format!("Failed to parse node list: {}", e))
        })?;
        Ok(list.items)
    }

    /// GET /api/v1/namespaces/{namespace}/pods/{name}
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let path = format!("/api/v1/namespaces/{}/pods/{}", namespace, name);
        let resp = self.send(self.request(Method::GET, &path)).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SchedulerError::source_unavailable(format!(
                "GET pod failed with status {}: {}",
                status, body
            )));
        }

        resp.json::<Pod>()
            .await
            .map_err(|e| SchedulerError::source_unavailable(format!("Failed to parse pod: {}", e)))
    }

    /// GET /api/v1/namespaces/{namespace}/pods?watch=true
    async fn watch_pods(&self, namespace: &str) -> Result<PodEventStream> {
        let path = format!("/api/v1/namespaces/{}/pods?watch=true", namespace);
        let resp = self.send(self.request(Method::GET, &path)).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SchedulerError::source_unavailable(format!(
                "Pod watch failed with status {}: {}",
                status, body
            )));
        }

        Ok(decode_watch_stream(Box::pin(resp.bytes_stream())).boxed())
    }

    /// POST /api/v1/namespaces/{namespace}/pods/{name}/binding
    async fn create_binding(
        &self,
        namespace: &str,
        pod_name: &str,
        node_name: &str,
    ) -> Result<()> {
        let binding = Binding {
            metadata: ObjectMeta {
                name: Some(pod_name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            target: ObjectReference {
                api_version: Some("v1".to_string()),
                kind: Some("Node".to_string()),
                name: Some(node_name.to_string()),
                ..Default::default()
            },
        };

        let path = format!("/api/v1/namespaces/{}/pods/{}/binding", namespace, pod_name);
        let resp = self
            .send(self.request(Method::POST, &path).json(&binding))
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(SchedulerError::bind_conflict(
                    format!("{}/{}", namespace, pod_name),
                    node_name,
                    format!("API server answered {}: {}", status, body),
                ))
            }
            _ => Err(SchedulerError::source_unavailable(format!(
                "POST binding failed with status {}: {}",
                status, body
            ))),
        }
    }
}

/// Split a chunked watch response into newline-delimited JSON events
pub fn decode_watch_stream<S, E>(chunks: S) -> impl Stream<Item = Result<WatchEvent<Pod>>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    stream::unfold(
        (chunks, Vec::<u8>::new(), false),
        |(mut chunks, mut buf, mut done)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line);
                    if text.trim().is_empty() {
                        continue;
                    }
                    let event = parse_watch_line(text.trim());
                    return Some((event, (chunks, buf, done)));
                }

                if done {
                    if buf.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    let text = String::from_utf8_lossy(&buf).trim().to_string();
                    buf.clear();
                    return Some((parse_watch_line(&text), (chunks, buf, done)));
                }

                match chunks.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        buf.clear();
                        let err = SchedulerError::watch_failed(format!("stream read failed: {}", e));
                        return Some((Err(err), (chunks, buf, true)));
                    }
                    None => done = true,
                }
            }
        },
    )
}

/// Decode one watch line. An ERROR event ends the subscription.
fn parse_watch_line(line: &str) -> Result<WatchEvent<Pod>> {
    let raw: WatchEvent<serde_json::Value> = serde_json::from_str(line)
        .map_err(|e| SchedulerError::watch_failed(format!("undecodable watch line: {}", e)))?;

    if raw.event_type == WatchEventType::Error {
        let message = raw.object["message"]
            .as_str()
            .unwrap_or("watch error without message")
            .to_string();
        warn!("API server sent watch error: {}", message);
        return Err(SchedulerError::watch_failed(message));
    }

    let pod: Pod = serde_json::from_value(raw.object)
        .map_err(|e| SchedulerError::source_unavailable(format!("Failed to parse pod: {}", e)))?;

    Ok(WatchEvent {
        event_type: raw.event_type,
        object: pod,
    })
}
