use crate::{ClientConfig, RegistryClient};
use async_trait::async_trait;
use delayline_cluster::api::*;
use delayline_cluster::*;
use delayline_common::duration::format_delay;
use delayline_common::{BrokerError, Result};
use delayline_gateway::RegistrySource;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What a request addresses, used to build `NotFound` / `AlreadyExists`
struct Target<'a> {
    entity: &'static str,
    id: &'a str,
}

impl<'a> Target<'a> {
    fn new(entity: &'static str, id: &'a str) -> Self {
        Self { entity, id }
    }

    fn family(entity: &'static str) -> Self {
        Self { entity, id: "" }
    }
}

/// HTTP client for the registry API
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
}

impl RestClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| BrokerError::invalid_input(format!("failed to build HTTP client: {}", e)))?;

        let base_url = format!("{}{}", config.endpoint.trim_end_matches('/'), API_PREFIX);
        let base_url = Url::parse(&base_url)
            .map_err(|e| BrokerError::invalid_input(format!("invalid endpoint '{}': {}", base_url, e)))?;
        info!("Registry client targeting {}", base_url);

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resource URL under the API prefix. Each segment is percent-encoded,
    /// so ids containing `/`, `#` or `?` address exactly one record.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BrokerError::invalid_input(format!("endpoint {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Execute with retry logic
    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Registry request failed, retrying (attempt {}/{}): {}",
                        attempt, self.config.max_retries, e
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One HTTP exchange. Returns the body of a 2xx response.
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        target: &Target<'_>,
    ) -> Result<String> {
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BrokerError::unavailable(format!("request to {} failed: {}", url, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BrokerError::unavailable(format!("reading response from {} failed: {}", url, e)))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(status_error(status, &text, target))
        }
    }

    /// POSTs are sent once: a lost response to a create must not turn into
    /// a second record or a spurious conflict.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        target: Target<'_>,
    ) -> Result<String> {
        if method == Method::POST {
            return self.send(method, &url, body.as_ref(), &target).await;
        }
        self.with_retry(|| self.send(method.clone(), &url, body.as_ref(), &target))
            .await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        target: Target<'_>,
    ) -> Result<T> {
        let path = url.path().to_string();
        let text = self.execute(method, url, body, target).await?;
        let envelope: ApiResponse<T> = serde_json::from_str(&text)?;
        envelope.data.ok_or_else(|| BrokerError::Serialization {
            message: format!("response to {} carried no data", path),
        })
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str], target: Target<'_>) -> Result<T> {
        self.fetch(Method::GET, self.url(segments)?, None, target)
            .await
    }

    async fn no_content(&self, method: Method, segments: &[&str], target: Target<'_>) -> Result<()> {
        self.execute(method, self.url(segments)?, None, target)
            .await
            .map(|_| ())
    }
}

fn status_error(status: StatusCode, body: &str, target: &Target<'_>) -> BrokerError {
    let message = serde_json::from_str::<ApiResponse<Value>>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::NOT_FOUND => BrokerError::not_found(target.entity, target.id),
        StatusCode::CONFLICT => BrokerError::already_exists(target.entity, target.id),
        StatusCode::BAD_REQUEST => BrokerError::invalid_input(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            BrokerError::unavailable(format!("coordinator returned {}: {}", status, message))
        }
        s if s.is_server_error() => {
            BrokerError::unavailable(format!("coordinator returned {}: {}", s, message))
        }
        s => BrokerError::invalid_input(format!("coordinator returned {}: {}", s, message)),
    }
}

#[async_trait]
impl RegistryClient for RestClient {
    #[instrument(skip(self))]
    async fn create_node(&self, address: &str) -> Result<ClusterNode> {
        let body = serde_json::to_value(CreateNodeRequest {
            address: address.to_string(),
        })?;
        self.fetch(Method::POST, self.url(&["nodes"])?, Some(body), Target::family("node"))
            .await
    }

    async fn get_node(&self, id: &NodeId) -> Result<ClusterNode> {
        let id = id.to_string();
        self.get(&["nodes", &id], Target::new("node", &id)).await
    }

    async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        self.get(&["nodes"], Target::family("node")).await
    }

    async fn node_heartbeat(&self, id: &NodeId) -> Result<()> {
        let id = id.to_string();
        self.no_content(
            Method::PUT,
            &["nodes", &id, "heartbeat"],
            Target::new("node", &id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        let id = id.to_string();
        self.no_content(Method::DELETE, &["nodes", &id], Target::new("node", &id))
            .await
    }

    #[instrument(skip(self))]
    async fn register_gateway(&self, id: &str, address: &str) -> Result<GatewayInfo> {
        let body = serde_json::to_value(RegisterGatewayRequest {
            id: id.to_string(),
            address: address.to_string(),
        })?;
        self.fetch(Method::POST, self.url(&["gateways"])?, Some(body), Target::new("gateway", id))
            .await
    }

    async fn get_gateway(&self, id: &str) -> Result<GatewayInfo> {
        self.get(&["gateways", id], Target::new("gateway", id))
            .await
    }

    async fn list_gateways(&self) -> Result<Vec<GatewayInfo>> {
        self.get(&["gateways"], Target::family("gateway")).await
    }

    async fn gateway_heartbeat(&self, id: &str) -> Result<()> {
        self.no_content(
            Method::PUT,
            &["gateways", id, "heartbeat"],
            Target::new("gateway", id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn unregister_gateway(&self, id: &str) -> Result<()> {
        self.no_content(
            Method::DELETE,
            &["gateways", id],
            Target::new("gateway", id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn register_storage(&self, request: &RegisterStorageRequest) -> Result<StorageInfo> {
        let body = serde_json::to_value(request)?;
        let response: StorageResponse = self
            .fetch(
                Method::POST,
                self.url(&["storages"])?,
                Some(body),
                Target::new("storage", &request.id),
            )
            .await?;
        StorageInfo::try_from(response)
    }

    async fn get_storage(&self, id: &str) -> Result<StorageInfo> {
        let response: StorageResponse = self
            .get(&["storages", id], Target::new("storage", id))
            .await?;
        StorageInfo::try_from(response)
    }

    async fn list_storages(&self) -> Result<Vec<StorageInfo>> {
        let responses: Vec<StorageResponse> =
            self.get(&["storages"], Target::family("storage")).await?;
        responses.into_iter().map(StorageInfo::try_from).collect()
    }

    async fn storage_heartbeat(&self, id: &str) -> Result<()> {
        self.no_content(
            Method::PUT,
            &["storages", id, "heartbeat"],
            Target::new("storage", id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn unregister_storage(&self, id: &str) -> Result<()> {
        self.no_content(
            Method::DELETE,
            &["storages", id],
            Target::new("storage", id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn register_pusher(&self, id: &str, kind: &str, address: &str) -> Result<PusherInfo> {
        let body = serde_json::to_value(RegisterPusherRequest {
            id: id.to_string(),
            kind: kind.to_string(),
            address: address.to_string(),
        })?;
        self.fetch(Method::POST, self.url(&["pushers"])?, Some(body), Target::new("pusher", id))
            .await
    }

    async fn get_pusher(&self, id: &str) -> Result<PusherInfo> {
        self.get(&["pushers", id], Target::new("pusher", id))
            .await
    }

    async fn list_pushers(&self) -> Result<Vec<PusherInfo>> {
        self.get(&["pushers"], Target::family("pusher")).await
    }

    async fn pusher_heartbeat(&self, id: &str) -> Result<()> {
        self.no_content(
            Method::PUT,
            &["pushers", id, "heartbeat"],
            Target::new("pusher", id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn unregister_pusher(&self, id: &str) -> Result<()> {
        self.no_content(
            Method::DELETE,
            &["pushers", id],
            Target::new("pusher", id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn create_routing_rule(&self, rule: &RoutingRule) -> Result<RoutingRule> {
        let body = serde_json::to_value(rule)?;
        self.fetch(
            Method::POST,
            self.url(&["routing-rules"])?,
            Some(body),
            Target::new("routing rule", &rule.id),
        )
        .await
    }

    async fn get_routing_rule(&self, id: &str) -> Result<RoutingRule> {
        self.get(&["routing-rules", id], Target::new("routing rule", id))
            .await
    }

    async fn list_routing_rules(&self) -> Result<Vec<RoutingRule>> {
        self.get(&["routing-rules"], Target::family("routing rule"))
            .await
    }

    #[instrument(skip(self))]
    async fn update_routing_rule(&self, rule: &RoutingRule) -> Result<RoutingRule> {
        let body = serde_json::to_value(rule)?;
        self.fetch(
            Method::PUT,
            self.url(&["routing-rules", &rule.id])?,
            Some(body),
            Target::new("routing rule", &rule.id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_routing_rule(&self, id: &str) -> Result<()> {
        self.no_content(
            Method::DELETE,
            &["routing-rules", id],
            Target::new("routing rule", id),
        )
        .await
    }

    async fn cluster_config(&self) -> Result<ClusterConfig> {
        self.get(&["cluster-config"], Target::family("cluster config"))
            .await
    }

    async fn coordinator_config(&self) -> Result<CoordinatorConfig> {
        self.get(&["coordinator-config"], Target::family("coordinator config"))
            .await
    }

    async fn liveness(&self, timeout: Duration) -> Result<LivenessReport> {
        let mut url = self.url(&["liveness"])?;
        url.query_pairs_mut()
            .append_pair("timeout", &format_delay(timeout).replace(' ', ""));
        self.fetch(Method::GET, url, None, Target::family("liveness report"))
            .await
    }
}

/// Lets an ingestion node run against a remote coordinator
#[async_trait]
impl RegistrySource for RestClient {
    async fn list_storages(&self) -> Result<Vec<StorageInfo>> {
        RegistryClient::list_storages(self).await
    }

    async fn list_pushers(&self) -> Result<Vec<PusherInfo>> {
        RegistryClient::list_pushers(self).await
    }

    async fn list_routing_rules(&self) -> Result<Vec<RoutingRule>> {
        RegistryClient::list_routing_rules(self).await
    }

    async fn register_gateway(&self, id: &str, address: &str) -> Result<()> {
        RegistryClient::register_gateway(self, id, address)
            .await
            .map(|_| ())
    }

    async fn heartbeat_gateway(&self, id: &str) -> Result<()> {
        self.gateway_heartbeat(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        let target = Target::new("storage", "redis");

        let err = status_error(StatusCode::NOT_FOUND, "", &target);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "storage 'redis' not found");

        let err = status_error(StatusCode::CONFLICT, "", &target);
        assert!(err.is_already_exists());

        let body = r#"{"success":false,"data":null,"error":"Invalid input: bad delay"}"#;
        match status_error(StatusCode::BAD_REQUEST, body, &target) {
            BrokerError::InvalidInput { message } => {
                assert_eq!(message, "Invalid input: bad delay")
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom", &target).is_retryable());
        assert!(status_error(StatusCode::REQUEST_TIMEOUT, "", &target).is_retryable());
        assert!(!status_error(StatusCode::UNPROCESSABLE_ENTITY, "", &target).is_retryable());
    }

    #[test]
    fn test_base_url_normalisation() {
        let client = RestClient::new(ClientConfig::new("http://coordinator:8080/")).unwrap();
        assert_eq!(client.base_url.as_str(), "http://coordinator:8080/api/v1");
    }

    #[test]
    fn test_ids_are_encoded_as_single_segments() {
        let client = RestClient::new(ClientConfig::new("http://coordinator:8080")).unwrap();

        let url = client.url(&["storages", "eu/fast", "heartbeat"]).unwrap();
        assert_eq!(url.path(), "/api/v1/storages/eu%2Ffast/heartbeat");

        let url = client.url(&["gateways", "gw#1"]).unwrap();
        assert_eq!(url.path(), "/api/v1/gateways/gw%231");
        assert_eq!(url.fragment(), None);

        let url = client.url(&["pushers", "p?x=1"]).unwrap();
        assert_eq!(url.path(), "/api/v1/pushers/p%3Fx=1");
        assert_eq!(url.query(), None);
    }
}
