//! Data source strategies
//!
//! Two interchangeable strategies produce raw records for the field mapper:
//! a snapshot-file loader for local development and a tabular-API client for
//! hosted contexts. The API strategy also performs the authenticated write
//! operations (read-flag update, reply creation). Every remote call obtains
//! a fresh credential from the host-provided token source first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use crate::config::InboxConfig;
use crate::environment::Environment;
use crate::errors::{AppError, AppResult};
use crate::models::{Direction, ReplyPayload};

/// Header carrying the CSRF-style credential on every API call
pub const CREDENTIAL_HEADER: &str = "__RequestVerificationToken";

/// Host-provided credential source
///
/// Returns a CSRF-style token required on every read and write call to the
/// tabular API. Implementations fail with `AuthUnavailable` when no token
/// can be obtained.
pub trait TokenProvider: Send + Sync {
    /// Fetch a credential for the next call
    fn fetch_token(&self) -> BoxFuture<'_, AppResult<SecretString>>;
}

/// Token provider returning a fixed credential
///
/// Suitable for hosts whose token does not rotate within a session, and for
/// tests.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    /// Wrap a fixed credential
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into().into()),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn fetch_token(&self) -> BoxFuture<'_, AppResult<SecretString>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

/// Snapshot-file strategy
///
/// Reads a fixed resource location holding either the legacy `messages`
/// wrapper or the tabular `value` wrapper. An artificial delay emulates
/// network latency so hosts can exercise loading states.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    path: PathBuf,
    latency: Duration,
}

impl SnapshotSource {
    /// Latency applied by [`SnapshotSource::new`]
    pub const DEFAULT_LATENCY: Duration = Duration::from_secs(2);

    /// Snapshot source with the default artificial latency
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_latency(path, Self::DEFAULT_LATENCY)
    }

    /// Snapshot source with explicit latency (zero for tests)
    pub fn with_latency(path: impl Into<PathBuf>, latency: Duration) -> Self {
        Self {
            path: path.into(),
            latency,
        }
    }

    /// Read and unwrap the snapshot payload
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` on read failure or malformed payload.
    pub async fn fetch_records(&self) -> AppResult<Vec<Value>> {
        tokio::time::sleep(self.latency).await;
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::SourceUnavailable(format!(
                "cannot read snapshot '{}': {e}",
                self.path.display()
            ))
        })?;
        parse_snapshot(&raw)
    }
}

/// Unwrap a snapshot payload into its row sequence
///
/// Accepts the legacy `messages` wrapper or the tabular `value` wrapper.
pub fn parse_snapshot(raw: &str) -> AppResult<Vec<Value>> {
    let payload: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::SourceUnavailable(format!("snapshot payload is not JSON: {e}")))?;
    payload
        .get("messages")
        .or_else(|| payload.get("value"))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| {
            AppError::SourceUnavailable(
                "snapshot payload carries neither a 'messages' nor a 'value' array".to_owned(),
            )
        })
}

/// Tabular-API strategy
///
/// Queries the configured collection endpoint and performs the write
/// operations. The mandatory inbound-direction predicate is always injected;
/// caller-supplied query shaping passes through verbatim.
pub struct TabularApiSource {
    config: Arc<InboxConfig>,
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl TabularApiSource {
    /// Build an API source from configuration and a token provider
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configuration carries no API section.
    pub fn new(config: Arc<InboxConfig>, tokens: Arc<dyn TokenProvider>) -> AppResult<Self> {
        let base_url = config
            .api
            .as_ref()
            .map(|api| api.base_url.trim_end_matches('/').to_owned())
            .ok_or_else(|| AppError::invalid("tabular API source requires an API configuration"))?;
        Ok(Self {
            config,
            base_url,
            client: reqwest::Client::new(),
            tokens,
        })
    }

    /// Fetch raw records from the collection endpoint
    ///
    /// # Errors
    ///
    /// - `OperationDisabled` if the read operation is not enabled
    /// - `AuthUnavailable` if no credential could be obtained
    /// - `SourceUnavailable` on transport failure or a malformed response
    /// - `RemoteError` on a non-success response status
    pub async fn fetch_records(&self) -> AppResult<Vec<Value>> {
        if !self.config.operations.read.enabled {
            return Err(AppError::OperationDisabled(
                "read operation is not enabled in configuration".to_owned(),
            ));
        }

        let url = format!(
            "{}/{}?{}",
            self.base_url,
            self.config.relationship.collection_name,
            read_query_string(&self.config)
        );
        debug!(%url, "fetching records from tabular API");

        let token = self.tokens.fetch_token().await?;
        let response = self
            .client
            .get(&url)
            .header(CREDENTIAL_HEADER, token.expose_secret())
            .header("Accept", "application/json")
            .header("Prefer", "odata.include-annotations=\"*\"")
            .send()
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("record fetch failed: {e}")))?;

        let payload = into_json(response).await?;
        payload
            .get("value")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                AppError::SourceUnavailable("tabular response carries no 'value' array".to_owned())
            })
    }

    /// PATCH the read flag (and completed lifecycle state) onto a record
    ///
    /// # Errors
    ///
    /// - `OperationDisabled` if the update operation is not enabled
    /// - `AuthUnavailable` if no credential could be obtained
    /// - `RemoteError` on a non-success response status
    pub async fn update_read_flag(&self, id: &str, value: bool) -> AppResult<()> {
        if !self.config.operations.update.enabled {
            return Err(AppError::OperationDisabled(
                "update operation is not enabled in configuration".to_owned(),
            ));
        }

        let url = format!(
            "{}/{}({id})",
            self.base_url, self.config.relationship.collection_name
        );
        let body = read_flag_patch(&self.config, value);
        debug!(%url, value, "updating remote read flag");

        let token = self.tokens.fetch_token().await?;
        let response = self
            .client
            .patch(&url)
            .header(CREDENTIAL_HEADER, token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("read-flag update failed: {e}")))?;

        ensure_success(response).await
    }

    /// POST an outgoing reply record to the collection endpoint
    ///
    /// # Errors
    ///
    /// - `OperationDisabled` if the create operation is not enabled
    /// - `AuthUnavailable` if no credential could be obtained
    /// - `RemoteError` on a non-success response status
    pub async fn create_reply(&self, payload: &ReplyPayload) -> AppResult<()> {
        if !self.config.operations.create.enabled {
            return Err(AppError::OperationDisabled(
                "create operation is not enabled in configuration".to_owned(),
            ));
        }

        let url = format!(
            "{}/{}",
            self.base_url, self.config.relationship.collection_name
        );
        debug!(%url, subject = %payload.subject, "creating reply record");

        let token = self.tokens.fetch_token().await?;
        let response = self
            .client
            .post(&url)
            .header(CREDENTIAL_HEADER, token.expose_secret())
            .json(&payload.to_wire())
            .send()
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("reply creation failed: {e}")))?;

        ensure_success(response).await
    }
}

/// Build the read query string from configuration
///
/// The inbound-direction predicate is always present; a caller-supplied
/// filter is ANDed with it, never replacing it. Select, sort, and expansion
/// options pass through verbatim (percent-encoded).
pub fn read_query_string(config: &InboxConfig) -> String {
    let query = &config.operations.read.query;
    let mut params: Vec<(&str, String)> = Vec::new();

    if let Some(select) = &query.select {
        params.push(("$select", select.clone()));
    }
    params.push(("$filter", inbound_filter(query.filter.as_deref())));
    if let Some(order_by) = &query.order_by {
        params.push(("$orderby", order_by.clone()));
    }
    if let Some(expand) = &query.expand {
        params.push(("$expand", expand.clone()));
    }

    params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Combine an optional caller filter with the mandatory direction predicate
fn inbound_filter(extra: Option<&str>) -> String {
    let mandatory = format!("directioncode eq {}", Direction::ToContact.code());
    match extra {
        Some(filter) if !filter.trim().is_empty() => format!("({filter}) and ({mandatory})"),
        _ => mandatory,
    }
}

/// Build the partial-update body for a read-flag change
///
/// Marking a record read also transitions it to the completed lifecycle
/// state in the same request.
pub fn read_flag_patch(config: &InboxConfig, value: bool) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(config.resolved_field("hasread"), Value::from(value));
    if value {
        body.insert("statecode".to_owned(), Value::from(1));
        body.insert("statuscode".to_owned(), Value::from(2));
    }
    Value::Object(body)
}

/// Convert a non-success response into `RemoteError`
async fn ensure_success(response: reqwest::Response) -> AppResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::RemoteError {
        status: status.as_u16(),
        body,
    })
}

/// Parse a successful response body as JSON, or surface `RemoteError`
async fn into_json(response: reqwest::Response) -> AppResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::RemoteError {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| AppError::SourceUnavailable(format!("response body is not JSON: {e}")))
}

/// The two interchangeable strategies behind one contract
pub enum MessageSource {
    /// Snapshot-file loader (local contexts, or fallback)
    Snapshot(SnapshotSource),
    /// Tabular-API client (hosted contexts)
    Api(TabularApiSource),
}

impl MessageSource {
    /// Fetch raw records from whichever strategy is active
    pub async fn fetch_records(&self) -> AppResult<Vec<Value>> {
        match self {
            Self::Snapshot(source) => source.fetch_records().await,
            Self::Api(source) => source.fetch_records().await,
        }
    }

    /// Whether the active strategy performs remote writes
    pub fn is_api(&self) -> bool {
        matches!(self, Self::Api(_))
    }

    /// Propagate a read-flag change to the remote store
    ///
    /// The snapshot strategy has no remote store; the change is a local
    /// no-op there.
    pub async fn update_read_flag(&self, id: &str, value: bool) -> AppResult<()> {
        match self {
            Self::Snapshot(_) => {
                debug!(id, value, "snapshot source: read-flag change kept local");
                Ok(())
            }
            Self::Api(source) => source.update_read_flag(id, value).await,
        }
    }

    /// Create an outgoing reply record
    ///
    /// # Errors
    ///
    /// The snapshot strategy cannot create records and fails with
    /// `OperationDisabled`.
    pub async fn create_reply(&self, payload: &ReplyPayload) -> AppResult<()> {
        match self {
            Self::Snapshot(_) => Err(AppError::OperationDisabled(
                "reply creation requires the tabular API source".to_owned(),
            )),
            Self::Api(source) => source.create_reply(payload).await,
        }
    }
}

/// Pick a strategy for the current context
///
/// Local contexts use the snapshot source unless `force_api` asks for the
/// API path (testing). Hosted contexts use the API source, falling back to
/// the snapshot source when no API configuration was supplied.
pub fn select_source(
    environment: Environment,
    config: &Arc<InboxConfig>,
    tokens: Arc<dyn TokenProvider>,
    snapshot_path: impl Into<PathBuf>,
    force_api: bool,
) -> AppResult<MessageSource> {
    if environment.is_local() && !force_api {
        return Ok(MessageSource::Snapshot(SnapshotSource::new(snapshot_path)));
    }
    if config.has_api() {
        return Ok(MessageSource::Api(TabularApiSource::new(
            Arc::clone(config),
            tokens,
        )?));
    }
    debug!("no API configuration supplied; falling back to snapshot source");
    Ok(MessageSource::Snapshot(SnapshotSource::new(snapshot_path)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{
        SnapshotSource, StaticTokenProvider, TabularApiSource, parse_snapshot, read_flag_patch,
        read_query_string, select_source,
    };
    use crate::config::tests::test_config;
    use crate::config::{OperationConfig, QueryOptions};
    use crate::environment::Environment;
    use crate::errors::AppError;

    fn tokens() -> Arc<StaticTokenProvider> {
        Arc::new(StaticTokenProvider::new("csrf-token"))
    }

    #[test]
    fn parse_snapshot_accepts_both_wrapper_keys() {
        let legacy = parse_snapshot(r#"{"messages": [{"id": "m1"}]}"#).expect("legacy wrapper");
        assert_eq!(legacy.len(), 1);

        let tabular = parse_snapshot(r#"{"value": [{"activityid": "a1"}, {"activityid": "a2"}]}"#)
            .expect("tabular wrapper");
        assert_eq!(tabular.len(), 2);
    }

    #[test]
    fn parse_snapshot_rejects_malformed_payloads() {
        assert!(matches!(
            parse_snapshot("not json"),
            Err(AppError::SourceUnavailable(_))
        ));
        assert!(matches!(
            parse_snapshot(r#"{"rows": []}"#),
            Err(AppError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn read_query_always_carries_the_inbound_predicate() {
        let config = test_config();
        let query = read_query_string(&config);
        assert_eq!(query, "$filter=directioncode%20eq%202");
    }

    #[test]
    fn caller_filter_is_anded_never_replacing() {
        let mut config = test_config();
        config.operations.read = OperationConfig::enabled_with(QueryOptions {
            select: Some("subject,createdon".to_owned()),
            filter: Some("statecode eq 0".to_owned()),
            order_by: Some("createdon desc".to_owned()),
            expand: Some("adx_portalcomment_activity_parties".to_owned()),
        });

        let query = read_query_string(&config);
        assert!(query.contains("%28statecode%20eq%200%29%20and%20%28directioncode%20eq%202%29"));
        assert!(query.contains("$select=subject%2Ccreatedon"));
        assert!(query.contains("$orderby=createdon%20desc"));
        assert!(query.contains("$expand=adx_portalcomment_activity_parties"));
    }

    #[test]
    fn read_flag_patch_includes_lifecycle_transition_when_marking_read() {
        let config = test_config();
        let body = read_flag_patch(&config, true);
        assert_eq!(body["adx_hasread"], true);
        assert_eq!(body["statecode"], 1);
        assert_eq!(body["statuscode"], 2);

        let unread = read_flag_patch(&config, false);
        assert_eq!(unread["adx_hasread"], false);
        assert!(unread.get("statecode").is_none());
    }

    #[tokio::test]
    async fn disabled_write_operations_fail_before_any_network_call() {
        let mut config = test_config();
        config.operations.update.enabled = false;
        config.operations.create.enabled = false;
        let source =
            TabularApiSource::new(Arc::new(config), tokens()).expect("api config present");

        assert!(matches!(
            source.update_read_flag("a1", true).await,
            Err(AppError::OperationDisabled(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_source_reports_missing_file_as_unavailable() {
        let source = SnapshotSource::with_latency("/nonexistent/messages.json", Duration::ZERO);
        assert!(matches!(
            source.fetch_records().await,
            Err(AppError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn strategy_selection_follows_context_and_fallback_rules() {
        let config = Arc::new(test_config());

        let local = select_source(Environment::Local, &config, tokens(), "/tmp/m.json", false)
            .expect("selects");
        assert!(!local.is_api());

        let forced = select_source(Environment::Local, &config, tokens(), "/tmp/m.json", true)
            .expect("selects");
        assert!(forced.is_api());

        let hosted = select_source(Environment::Hosted, &config, tokens(), "/tmp/m.json", false)
            .expect("selects");
        assert!(hosted.is_api());

        let mut no_api = test_config();
        no_api.api = None;
        let fallback = select_source(
            Environment::Hosted,
            &Arc::new(no_api),
            tokens(),
            "/tmp/m.json",
            false,
        )
        .expect("selects");
        assert!(!fallback.is_api());
    }
}
