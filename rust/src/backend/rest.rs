use std::time::Duration;

use agora_storage_traits::chats::types::Chat;
use agora_storage_traits::messages::types::{MediaRef, Message, ScheduledMessage};
use agora_storage_traits::objects::types::{Post, Profile};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Backend, FeedTab, MessageRecord};
use crate::error::BackendError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// PostgREST-style client for the hosted backend.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keys and tokens stay out of logs.
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "msg", alias = "error_description")]
    message: Option<String>,
}

#[derive(Serialize)]
struct NewMessageRow<'a> {
    id: &'a str,
    chat_id: &'a str,
    sender_id: &'a str,
    content: &'a str,
    media: &'a [MediaRef],
    created_at: i64,
    expires_at: Option<i64>,
    forwarded_from: Option<&'a str>,
}

impl<'a> From<&'a Message> for NewMessageRow<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            id: &m.id,
            chat_id: &m.chat_id,
            sender_id: &m.sender_id,
            content: &m.content,
            media: &m.media,
            created_at: m.created_at,
            expires_at: m.expires_at,
            forwarded_from: m.forwarded_from.as_deref(),
        }
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            anon_key: anon_key.into(),
            access_token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{function}", self.base_url)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .timeout(REQUEST_TIMEOUT)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let resp = self.authed(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::network("request timed out")
            } else {
                BackendError::network(format!("request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.code, body.message),
            Err(_) => (None, None),
        };
        let message = message
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| status.to_string());
        Err(BackendError::http(status.as_u16(), code, message))
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let resp = self
            .send(self.client.get(self.table_url(table)).query(query))
            .await?;
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| BackendError::new("invalid_response", format!("decode {table}: {e}")))
    }

    /// PATCH/DELETE that must touch at least one row. Row-level security and missing ids both
    /// answer with an empty result, which is reported as not found.
    async fn mutate_rows(
        &self,
        builder: reqwest::RequestBuilder,
        table: &str,
    ) -> Result<(), BackendError> {
        let resp = self
            .send(
                builder
                    .query(&[("select", "id")])
                    .header("Prefer", "return=representation"),
            )
            .await?;
        let rows = resp
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| BackendError::new("invalid_response", format!("decode {table}: {e}")))?;
        if rows.is_empty() {
            return Err(BackendError::http(
                404,
                Some("PGRST116".into()),
                format!("no {table} row matched"),
            ));
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, args: serde_json::Value) -> Result<(), BackendError> {
        self.send(self.client.post(self.rpc_url(function)).json(&args))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for RestBackend {
    fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    async fn fetch_chats(&self, user_id: &str) -> Result<Vec<Chat>, BackendError> {
        self.get_rows(
            "user_chats",
            &[
                ("user_id", eq(user_id)),
                ("order", "last_message_at.desc.nullslast".to_string()),
            ],
        )
        .await
    }

    async fn fetch_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<Message>, BackendError> {
        let rows: Vec<MessageRecord> = self
            .get_rows(
                "messages",
                &[
                    ("chat_id", eq(chat_id)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), BackendError> {
        let row = NewMessageRow::from(message);
        self.send(
            self.client
                .post(self.table_url("messages"))
                .header("Prefer", "return=minimal")
                .json(&row),
        )
        .await?;
        Ok(())
    }

    async fn schedule_message(&self, message: &ScheduledMessage) -> Result<(), BackendError> {
        self.send(
            self.client
                .post(self.table_url("scheduled_messages"))
                .header("Prefer", "return=minimal")
                .json(message),
        )
        .await?;
        Ok(())
    }

    async fn update_message_content(
        &self,
        message_id: &str,
        content: &str,
        edited_at: i64,
    ) -> Result<(), BackendError> {
        self.mutate_rows(
            self.client
                .patch(self.table_url("messages"))
                .query(&[("id", eq(message_id))])
                .json(&json!({ "content": content, "edited_at": edited_at })),
            "messages",
        )
        .await
    }

    async fn hide_message_for(&self, message_id: &str, user_id: &str) -> Result<(), BackendError> {
        self.rpc(
            "hide_message",
            json!({ "message_id": message_id, "user_id": user_id }),
        )
        .await
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), BackendError> {
        self.mutate_rows(
            self.client
                .delete(self.table_url("messages"))
                .query(&[("id", eq(message_id))]),
            "messages",
        )
        .await
    }

    async fn set_starred(
        &self,
        message_id: &str,
        user_id: &str,
        starred: bool,
    ) -> Result<(), BackendError> {
        self.rpc(
            "set_message_star",
            json!({ "message_id": message_id, "user_id": user_id, "starred": starred }),
        )
        .await
    }

    async fn mark_read(&self, message_id: &str, user_id: &str) -> Result<(), BackendError> {
        self.rpc(
            "mark_message_read",
            json!({ "message_id": message_id, "user_id": user_id }),
        )
        .await
    }

    async fn forward_messages(
        &self,
        target_chat_id: &str,
        messages: &[Message],
    ) -> Result<(), BackendError> {
        let rows: Vec<NewMessageRow<'_>> = messages.iter().map(NewMessageRow::from).collect();
        self.rpc(
            "forward_messages",
            json!({ "target_chat_id": target_chat_id, "messages": rows }),
        )
        .await
    }

    async fn fetch_feed(&self, tab: FeedTab, limit: u32) -> Result<Vec<Post>, BackendError> {
        let order = match tab {
            FeedTab::Trending => "like_count.desc,created_at.desc",
            FeedTab::ForYou | FeedTab::Following => "created_at.desc",
        };
        let table = match tab {
            FeedTab::Following => "following_posts",
            FeedTab::ForYou | FeedTab::Trending => "posts",
        };
        self.get_rows(
            table,
            &[("order", order.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        let rows: Vec<Profile> = self
            .get_rows(
                "profiles",
                &[("id", eq(user_id)), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use agora_storage_traits::messages::types::DeliveryState;
    use agora_storage_traits::test_utils::sample_message;
    use agora_test_utils::{spawn_one_shot_server, spawn_scripted_server};

    use super::*;
    use crate::error::{classify_backend, ErrorKind};

    #[tokio::test]
    async fn fetch_messages_sends_filters_and_auth() {
        let body = r#"[{"id":"m1","chat_id":"c1","sender_id":"bob","content":"hi","created_at":5}]"#;
        let (base, rx) = spawn_one_shot_server("200 OK", body);
        let backend = RestBackend::new(format!("{base}/"), "anon");
        backend.set_access_token(Some("user-jwt".into()));

        let messages = backend.fetch_messages("c1", 50).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].delivery, DeliveryState::Sent);
        assert!(messages[0].receipts.is_empty());

        let req = rx.recv().unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.route(), "/rest/v1/messages");
        let query = req.query_pairs();
        assert!(query.contains(&("chat_id".into(), "eq.c1".into())));
        assert!(query.contains(&("limit".into(), "50".into())));
        assert_eq!(req.header("apikey"), Some("anon"));
        assert_eq!(req.header("authorization"), Some("Bearer user-jwt"));
    }

    #[tokio::test]
    async fn anon_key_is_bearer_when_signed_out() {
        let (base, rx) = spawn_one_shot_server("200 OK", "[]");
        let backend = RestBackend::new(base, "anon");
        assert!(backend.fetch_profile("u1").await.unwrap().is_none());
        let req = rx.recv().unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer anon"));
    }

    #[tokio::test]
    async fn insert_sends_client_id_without_local_fields() {
        let (base, rx) = spawn_one_shot_server("201 Created", "");
        let backend = RestBackend::new(base, "anon");
        let mut message = sample_message("m-42", "c1", "alice", 1_000);
        message.failure_reason = Some("old".into());
        backend.insert_message(&message).await.unwrap();

        let req = rx.recv().unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.route(), "/rest/v1/messages");
        let body = req.json_body();
        assert_eq!(body["id"], "m-42");
        assert!(body.get("failure_reason").is_none());
        assert!(body.get("delivery").is_none());
    }

    #[tokio::test]
    async fn error_body_is_parsed() {
        let (base, _rx) = spawn_one_shot_server(
            "409 Conflict",
            r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#,
        );
        let backend = RestBackend::new(base, "anon");
        let err = backend
            .insert_message(&sample_message("m1", "c1", "alice", 1))
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(409));
        assert!(err.is_duplicate_key());
        assert_eq!(classify_backend(&err, true).kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn rpc_calls_hit_rpc_paths() {
        let (base, rx) = spawn_scripted_server(vec![("204 No Content", ""), ("204 No Content", "")]);
        let backend = RestBackend::new(base, "anon");
        backend.hide_message_for("m1", "alice").await.unwrap();
        backend.set_starred("m1", "alice", true).await.unwrap();

        let hide = rx.recv().unwrap();
        assert_eq!(hide.route(), "/rest/v1/rpc/hide_message");
        assert_eq!(hide.json_body()["user_id"], "alice");
        let star = rx.recv().unwrap();
        assert_eq!(star.route(), "/rest/v1/rpc/set_message_star");
        assert_eq!(star.json_body()["starred"], true);
    }

    #[tokio::test]
    async fn edit_returns_the_touched_row() {
        let (base, rx) = spawn_one_shot_server("200 OK", r#"[{"id":"m1"}]"#);
        let backend = RestBackend::new(base, "anon");
        backend
            .update_message_content("m1", "fixed", 2_000)
            .await
            .unwrap();

        let req = rx.recv().unwrap();
        assert_eq!(req.method, "PATCH");
        assert_eq!(req.header("prefer"), Some("return=representation"));
        let query = req.query_pairs();
        assert!(query.contains(&("id".into(), "eq.m1".into())));
        assert!(query.contains(&("select".into(), "id".into())));
        assert_eq!(req.json_body()["content"], "fixed");
    }

    #[tokio::test]
    async fn edit_touching_no_rows_is_not_found() {
        let (base, _rx) = spawn_one_shot_server("200 OK", "[]");
        let backend = RestBackend::new(base, "anon");
        let err = backend
            .update_message_content("someone-elses", "hijack", 2_000)
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("PGRST116"));
        assert_eq!(classify_backend(&err, true).kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_touching_no_rows_is_not_found() {
        let (base, rx) = spawn_one_shot_server("200 OK", "[]");
        let backend = RestBackend::new(base, "anon");
        let err = backend.delete_message("gone").await.unwrap_err();
        assert_eq!(err.status, Some(404));
        assert_eq!(classify_backend(&err, true).kind, ErrorKind::NotFound);
        assert_eq!(rx.recv().unwrap().method, "DELETE");
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        // Port 9 on localhost is not listening in test environments.
        let backend = RestBackend::new("http://127.0.0.1:9", "anon");
        let err = backend.delete_message("m1").await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("network"));
    }
}
