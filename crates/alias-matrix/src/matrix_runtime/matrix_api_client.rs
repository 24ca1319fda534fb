//! Matrix client-server API client backing the provisioner's room store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alias_provisioner::{DirectoryVisibility, RoomMessage, RoomStore, RoomStoreError};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::matrix_sync_events::MatrixSyncResponse;
use crate::matrix_helpers::{
    current_unix_timestamp_ms, parse_retry_after, retry_delay, truncate_for_error, RetryScope,
};

const CLIENT_API_PREFIX: [&str; 3] = ["_matrix", "client", "v3"];
const RETRY_ATTEMPT_HEADER: &str = "x-alias-bot-retry-attempt";

#[derive(Debug, Clone)]
/// Connection settings for [`MatrixApiClient`].
pub struct MatrixClientSettings {
    pub homeserver_url: String,
    pub access_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
struct MatrixErrorBody {
    #[serde(default)]
    errcode: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    retry_after_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct JoinedMembersResponse {
    #[serde(default)]
    joined: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DirectoryVisibilityResponse {
    visibility: DirectoryVisibility,
}

#[derive(Debug, Deserialize)]
struct EventIdResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct JoinRoomResponse {
    room_id: String,
}

/// Builds the `m.room.message` content for an outbound notice.
pub(super) fn room_message_content(message: &RoomMessage) -> Value {
    let mut content = json!({
        "msgtype": "m.notice",
        "body": message.body,
    });
    if let Some(formatted_body) = &message.formatted_body {
        content["format"] = Value::String("org.matrix.custom.html".to_string());
        content["formatted_body"] = Value::String(formatted_body.clone());
    }
    if let Some(status) = message.status {
        content["status"] = Value::String(status.as_str().to_string());
    }
    if let Some(event_id) = &message.in_reply_to {
        content["m.relates_to"] = json!({
            "m.in_reply_to": { "event_id": event_id }
        });
    }
    content
}

/// Matrix homeserver client authenticated as the bot.
pub struct MatrixApiClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
    bot_user_id: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
    request_timeout_ms: u64,
    txn_counter: AtomicU64,
}

impl MatrixApiClient {
    /// Builds a client and resolves the bot's user id via `whoami`.
    pub async fn connect(settings: MatrixClientSettings) -> Result<Self> {
        let mut client = Self::with_user_id(settings, String::new())?;
        let user_id = client
            .whoami()
            .await
            .context("failed to resolve bot user id via whoami")?;
        client.bot_user_id = user_id;
        Ok(client)
    }

    pub fn with_user_id(settings: MatrixClientSettings, bot_user_id: String) -> Result<Self> {
        let base_url = Url::parse(settings.homeserver_url.trim())
            .with_context(|| format!("invalid homeserver url '{}'", settings.homeserver_url))?;
        if base_url.cannot_be_a_base() {
            bail!("homeserver url '{}' cannot be used as a base", base_url);
        }
        if settings.access_token.trim().is_empty() {
            bail!("matrix access token cannot be empty");
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("alias-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let request_timeout_ms = settings.request_timeout_ms.max(1);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()
            .context("failed to create matrix api client")?;

        Ok(Self {
            http,
            base_url,
            access_token: settings.access_token.trim().to_string(),
            bot_user_id,
            retry_max_attempts: settings.retry_max_attempts.max(1),
            retry_base_delay_ms: settings.retry_base_delay_ms.max(1),
            request_timeout_ms,
            txn_counter: AtomicU64::new(0),
        })
    }

    pub async fn whoami(&self) -> Result<String, RoomStoreError> {
        let url = self.endpoint(&["account", "whoami"])?;
        let response: WhoamiResponse = self
            .request_json("whoami", || self.http.get(url.clone()))
            .await?;
        Ok(response.user_id)
    }

    /// Joins a room by id or alias and returns the joined room id.
    pub async fn join_room(&self, room_id_or_alias: &str) -> Result<String, RoomStoreError> {
        let url = self.endpoint(&["join", room_id_or_alias])?;
        let response: JoinRoomResponse = self
            .request_json("join", || self.http.post(url.clone()).json(&json!({})))
            .await?;
        Ok(response.room_id)
    }

    pub(super) async fn sync(
        &self,
        since: Option<&str>,
        timeout_ms: u64,
    ) -> Result<MatrixSyncResponse, RoomStoreError> {
        let url = self.endpoint(&["sync"])?;
        let mut query = vec![("timeout", timeout_ms.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }
        let request_timeout = Duration::from_millis(timeout_ms.saturating_add(self.request_timeout_ms));
        self.request_json("sync", || {
            self.http
                .get(url.clone())
                .query(&query)
                .timeout(request_timeout)
        })
        .await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RoomStoreError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                RoomStoreError::InvalidResponse("homeserver url cannot be a base".to_string())
            })?;
            path.pop_if_empty()
                .extend(CLIENT_API_PREFIX)
                .extend(segments);
        }
        Ok(url)
    }

    fn next_txn_id(&self) -> String {
        let counter = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        format!("alias-bot-{}-{counter}", current_unix_timestamp_ms())
    }

    async fn request_empty<F>(
        &self,
        operation: &str,
        scope: RetryScope,
        builder: F,
    ) -> Result<(), RoomStoreError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let _: Value = self.request_json_scoped(operation, scope, builder).await?;
        Ok(())
    }

    async fn request_json<T, F>(&self, operation: &str, builder: F) -> Result<T, RoomStoreError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        self.request_json_scoped(operation, RetryScope::Transient, builder)
            .await
    }

    async fn request_json_scoped<T, F>(
        &self,
        operation: &str,
        scope: RetryScope,
        mut builder: F,
    ) -> Result<T, RoomStoreError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .bearer_auth(&self.access_token)
                .header(RETRY_ATTEMPT_HEADER, attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|error| {
                            RoomStoreError::InvalidResponse(format!(
                                "failed to decode matrix {operation}: {error}"
                            ))
                        });
                    }

                    let header_retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    let error_body = serde_json::from_str::<MatrixErrorBody>(&body).ok();
                    if attempt < self.retry_max_attempts && scope.retries_status(status.as_u16()) {
                        let retry_after = error_body
                            .as_ref()
                            .and_then(|error| error.retry_after_ms)
                            .map(Duration::from_millis)
                            .or(header_retry_after);
                        debug!(operation, status = status.as_u16(), attempt, "retrying matrix request");
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, retry_after))
                            .await;
                        continue;
                    }

                    let (errcode, error) = match error_body {
                        Some(error_body) => (
                            error_body.errcode.unwrap_or_else(|| "M_UNKNOWN".to_string()),
                            error_body
                                .error
                                .unwrap_or_else(|| truncate_for_error(&body, 800)),
                        ),
                        None => ("M_UNKNOWN".to_string(), truncate_for_error(&body, 800)),
                    };
                    return Err(RoomStoreError::api(status.as_u16(), errcode, error));
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && scope.retries_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(RoomStoreError::Transport(format!(
                        "matrix api {operation} request failed: {error}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl RoomStore for MatrixApiClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn get_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<Value>, RoomStoreError> {
        let url = self.endpoint(&["rooms", room_id, "state", event_type, state_key])?;
        match self
            .request_json::<Value, _>("room state", || self.http.get(url.clone()))
            .await
        {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn joined_members(&self, room_id: &str) -> Result<Vec<String>, RoomStoreError> {
        let url = self.endpoint(&["rooms", room_id, "joined_members"])?;
        let response: JoinedMembersResponse = self
            .request_json("joined members", || self.http.get(url.clone()))
            .await?;
        Ok(response.joined.into_iter().map(|(user_id, _)| user_id).collect())
    }

    async fn create_alias(&self, alias: &str, room_id: &str) -> Result<(), RoomStoreError> {
        let url = self.endpoint(&["directory", "room", alias])?;
        let payload = json!({ "room_id": room_id });
        // Alias writes are not idempotent: a re-sent PUT that already landed reads as M_ROOM_IN_USE.
        self.request_empty("create alias", RetryScope::RateLimited, || {
            self.http.request(Method::PUT, url.clone()).json(&payload)
        })
        .await
    }

    async fn delete_alias(&self, alias: &str) -> Result<(), RoomStoreError> {
        let url = self.endpoint(&["directory", "room", alias])?;
        self.request_empty("delete alias", RetryScope::RateLimited, || {
            self.http.request(Method::DELETE, url.clone())
        })
        .await
    }

    async fn directory_visibility(
        &self,
        room_id: &str,
    ) -> Result<DirectoryVisibility, RoomStoreError> {
        let url = self.endpoint(&["directory", "list", "room", room_id])?;
        let response: DirectoryVisibilityResponse = self
            .request_json("directory visibility", || self.http.get(url.clone()))
            .await?;
        Ok(response.visibility)
    }

    async fn set_directory_visibility(
        &self,
        room_id: &str,
        visibility: DirectoryVisibility,
    ) -> Result<(), RoomStoreError> {
        let url = self.endpoint(&["directory", "list", "room", room_id])?;
        let payload = json!({ "visibility": visibility.as_str() });
        self.request_empty("set directory visibility", RetryScope::Transient, || {
            self.http.request(Method::PUT, url.clone()).json(&payload)
        })
        .await
    }

    async fn send_message(
        &self,
        room_id: &str,
        message: RoomMessage,
    ) -> Result<String, RoomStoreError> {
        // One transaction id per logical send so retries stay idempotent.
        let txn_id = self.next_txn_id();
        let url = self.endpoint(&["rooms", room_id, "send", "m.room.message", &txn_id])?;
        let content = room_message_content(&message);
        let response: EventIdResponse = self
            .request_json("send message", || {
                self.http.request(Method::PUT, url.clone()).json(&content)
            })
            .await?;
        Ok(response.event_id)
    }
}
