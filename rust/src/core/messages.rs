// Message lifecycle: optimistic sends, mutations and forwarding.

use std::collections::{BTreeMap, BTreeSet};

use agora_storage_traits::messages::types::{
    DeleteScope, DeliveryState, MediaRef, ScheduledMessage,
};

use super::*;
use crate::error::classify_backend;
use crate::state::{ForwardOutcome, ForwardReport};
use crate::updates::ForwardAttempt;

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `created_at` plus `secs` seconds, or `None` when that doesn't fit in Unix millis.
fn expiry_deadline(created_at: i64, secs: u64) -> Option<i64> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| s.checked_mul(1_000))
        .and_then(|ms| created_at.checked_add(ms))
}

/// A chat's auto-delete setting, ignored when it can't produce a deadline from `now`.
fn chat_auto_delete(chat: &Chat, now: i64) -> Option<u64> {
    let secs = chat.auto_delete()?.as_secs();
    if expiry_deadline(now, secs).is_none() {
        tracing::warn!(chat_id = %chat.id, secs, "ignoring out of range auto-delete setting");
        return None;
    }
    Some(secs)
}

impl AppCore {
    fn session_ref(&self) -> Result<&Session, CoreError> {
        self.session.as_ref().ok_or(CoreError::NotSignedIn)
    }

    fn known_message(&self, message_id: &str) -> Result<&Message, CoreError> {
        self.session_ref()?
            .messages
            .get(message_id)
            .ok_or_else(|| CoreError::NotFound(format!("message {message_id}")))
    }

    pub(super) fn send_message(
        &mut self,
        chat_id: String,
        content: String,
        attachments: Vec<MediaRef>,
        scheduled_for: Option<i64>,
        auto_delete_secs: Option<u64>,
    ) -> Result<(), CoreError> {
        let sess = self.session_ref()?;
        let me = sess.user_id.clone();
        let content = content.trim().to_string();
        if content.is_empty() && attachments.is_empty() {
            return Err(CoreError::Validation("Message is empty".into()));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(CoreError::Validation(format!(
                "Message is longer than {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let chat = sess
            .chats
            .get(&chat_id)
            .ok_or_else(|| CoreError::NotFound(format!("chat {chat_id}")))?;
        if !chat.has_participant(&me) {
            return Err(CoreError::Forbidden("You are not a member of this chat".into()));
        }
        let now = self.clock.now_ms();
        let auto_delete_secs = match auto_delete_secs {
            Some(secs) => {
                let base = scheduled_for.unwrap_or(now).max(now);
                if secs > 0 && expiry_deadline(base, secs).is_none() {
                    return Err(CoreError::Validation(
                        "Auto-delete duration is too long".into(),
                    ));
                }
                Some(secs)
            }
            None => chat_auto_delete(chat, now),
        }
        .filter(|secs| *secs > 0);

        if let Some(at) = scheduled_for {
            if at <= now {
                return Err(CoreError::Validation(
                    "Scheduled time must be in the future".into(),
                ));
            }
            let scheduled = ScheduledMessage {
                id: new_message_id(),
                chat_id,
                sender_id: me,
                content,
                media: attachments,
                scheduled_for: at,
                auto_delete_secs,
                created_at: now,
            };
            tracing::info!(message_id = %scheduled.id, scheduled_for = at, "schedule message");
            let backend = self.backend.clone();
            let connectivity = self.connectivity.clone();
            self.spawn_internal(async move {
                let result =
                    when_online(connectivity, backend.schedule_message(&scheduled)).await;
                InternalEvent::ScheduleResult {
                    message: scheduled,
                    result,
                }
            });
            return Ok(());
        }

        let created_at = self.next_outgoing_ts();
        let message = Message {
            id: new_message_id(),
            chat_id,
            sender_id: me,
            content,
            media: attachments,
            created_at,
            edited_at: None,
            deleted_for: BTreeSet::new(),
            starred_by: BTreeSet::new(),
            // Deadline is fixed at send time; later chat setting changes don't move it.
            expires_at: auto_delete_secs.and_then(|secs| expiry_deadline(created_at, secs)),
            forwarded_from: None,
            delivery: DeliveryState::Sending,
            receipts: BTreeMap::new(),
            failure_reason: None,
        };
        tracing::info!(message_id = %message.id, chat_id = %message.chat_id, "send message");

        let chat_id = message.chat_id.clone();
        if let Some(sess) = self.session.as_mut() {
            sess.messages.insert(message.id.clone(), message.clone());
        }
        self.cache_chat_messages(&chat_id);
        self.publish();
        self.spawn_insert(message);
        Ok(())
    }

    fn spawn_insert(&self, message: Message) {
        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        self.spawn_internal(async move {
            let result = when_online(connectivity, backend.insert_message(&message)).await;
            InternalEvent::SendResult {
                message_id: message.id,
                result,
            }
        });
    }

    pub(super) fn on_send_result(&mut self, message_id: &str, result: Result<(), BackendError>) {
        let online = self.connectivity.is_online();
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let Some(m) = sess.messages.get_mut(message_id) else {
            // Deleted or the session changed while the insert was in flight.
            return;
        };

        let failure = match result {
            Ok(()) => None,
            // The row already exists, so an earlier attempt landed.
            Err(e) if e.is_duplicate_key() => None,
            Err(e) => Some(e),
        };

        match failure {
            None => {
                m.delivery.advance(DeliveryState::Sent);
                m.failure_reason = None;
                tracing::info!(message_id, "send confirmed");
                let chat_id = m.chat_id.clone();
                self.cache_chat_messages(&chat_id);
                self.publish();
            }
            Some(e) => {
                let classified = classify_backend(&e, online);
                tracing::warn!(message_id, code = classified.code, %e, "send failed");
                if !m.delivery.advance(DeliveryState::Failed) {
                    // Already confirmed through realtime.
                    return;
                }
                m.failure_reason = Some(classified.user_message.clone());
                let chat_id = m.chat_id.clone();
                self.cache_chat_messages(&chat_id);
                self.refresh_views();
                self.toast(classified.user_message);
            }
        }
    }

    pub(super) fn on_schedule_result(
        &mut self,
        message: ScheduledMessage,
        result: Result<(), BackendError>,
    ) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        if sess.user_id != message.sender_id {
            return;
        }
        match result {
            Ok(()) => {
                // A realtime insert may already have materialized it.
                if !sess.messages.contains_key(&message.id)
                    && !self.state.scheduled.iter().any(|s| s.id == message.id)
                {
                    self.state.scheduled.push(message);
                    self.state.scheduled.sort_by_key(|s| s.scheduled_for);
                }
                self.emit_state();
            }
            Err(e) => self.report_backend(e),
        }
    }

    pub(super) fn retry_message(&mut self, chat_id: &str, message_id: &str) -> Result<(), CoreError> {
        let sess = self.session.as_mut().ok_or(CoreError::NotSignedIn)?;
        let m = sess
            .messages
            .get_mut(message_id)
            .filter(|m| m.chat_id == chat_id)
            .ok_or_else(|| CoreError::NotFound(format!("message {message_id}")))?;
        if !m.delivery.retry() {
            return Err(CoreError::Validation(
                "Only failed messages can be retried".into(),
            ));
        }
        m.failure_reason = None;
        let message = m.clone();
        tracing::info!(message_id, "retry send");
        self.publish();
        self.spawn_insert(message);
        Ok(())
    }

    pub(super) fn edit_message(&mut self, message_id: String, content: String) -> Result<(), CoreError> {
        let me = self.user_id()?;
        let m = self.known_message(&message_id)?;
        if m.sender_id != me {
            return Err(CoreError::Forbidden(
                "You can only edit your own messages".into(),
            ));
        }
        if matches!(m.delivery, DeliveryState::Sending | DeliveryState::Failed) {
            return Err(CoreError::Validation(
                "Wait until the message is sent before editing it".into(),
            ));
        }
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(CoreError::Validation("Message is empty".into()));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(CoreError::Validation(format!(
                "Message is longer than {MAX_MESSAGE_CHARS} characters"
            )));
        }
        if content == m.content {
            return Ok(());
        }

        let edited_at = self.clock.now_ms();
        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        self.spawn_internal(async move {
            let result = when_online(
                connectivity,
                backend.update_message_content(&message_id, &content, edited_at),
            )
            .await;
            InternalEvent::EditResult {
                message_id,
                content,
                edited_at,
                result,
            }
        });
        Ok(())
    }

    pub(super) fn on_edit_result(
        &mut self,
        message_id: &str,
        content: String,
        edited_at: i64,
        result: Result<(), BackendError>,
    ) {
        if let Err(e) = result {
            self.report_backend(e);
            return;
        }
        let Some(m) = self
            .session
            .as_mut()
            .and_then(|s| s.messages.get_mut(message_id))
        else {
            return;
        };
        m.content = content;
        m.edited_at = Some(edited_at);
        let chat_id = m.chat_id.clone();
        self.cache_chat_messages(&chat_id);
        self.publish();
    }

    pub(super) fn delete_message(
        &mut self,
        message_id: String,
        scope: DeleteScope,
    ) -> Result<(), CoreError> {
        let me = self.user_id()?;
        let m = self.known_message(&message_id)?;

        let delivery = m.delivery;
        match delivery {
            DeliveryState::Failed => {
                // Never reached the backend; nothing to delete remotely.
                let chat_id = m.chat_id.clone();
                if let Some(sess) = self.session.as_mut() {
                    sess.messages.remove(&message_id);
                }
                self.cache_chat_messages(&chat_id);
                self.publish();
                return Ok(());
            }
            DeliveryState::Sending => {
                return Err(CoreError::Validation(
                    "Wait until the message is sent before deleting it".into(),
                ));
            }
            _ => {}
        }
        if scope == DeleteScope::ForEveryone && m.sender_id != me {
            return Err(CoreError::Forbidden(
                "Only the sender can delete a message for everyone".into(),
            ));
        }
        if scope == DeleteScope::ForMe && m.deleted_for.contains(&me) {
            return Ok(());
        }

        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        self.spawn_internal(async move {
            let call = async {
                match scope {
                    DeleteScope::ForMe => backend.hide_message_for(&message_id, &me).await,
                    DeleteScope::ForEveryone => backend.delete_message(&message_id).await,
                }
            };
            let result = when_online(connectivity, call).await;
            InternalEvent::DeleteResult {
                message_id,
                scope,
                result,
            }
        });
        Ok(())
    }

    pub(super) fn on_delete_result(
        &mut self,
        message_id: &str,
        scope: DeleteScope,
        result: Result<(), BackendError>,
    ) {
        if let Err(e) = result {
            self.report_backend(e);
            return;
        }
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let me = sess.user_id.clone();
        let chat_id = match scope {
            DeleteScope::ForMe => sess.messages.get_mut(message_id).map(|m| {
                m.deleted_for.insert(me);
                m.chat_id.clone()
            }),
            DeleteScope::ForEveryone => sess.messages.remove(message_id).map(|m| m.chat_id),
        };
        if let Some(chat_id) = chat_id {
            self.cache_chat_messages(&chat_id);
            self.publish();
        }
    }

    pub(super) fn set_starred(&mut self, message_id: String, starred: bool) -> Result<(), CoreError> {
        let me = self.user_id()?;
        let m = self.known_message(&message_id)?;
        if m.is_starred_by(&me) == starred {
            return Ok(());
        }

        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        self.spawn_internal(async move {
            let result =
                when_online(connectivity, backend.set_starred(&message_id, &me, starred)).await;
            InternalEvent::StarResult {
                message_id,
                starred,
                result,
            }
        });
        Ok(())
    }

    pub(super) fn on_star_result(
        &mut self,
        message_id: &str,
        starred: bool,
        result: Result<(), BackendError>,
    ) {
        if let Err(e) = result {
            self.report_backend(e);
            return;
        }
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let Some(m) = sess.messages.get_mut(message_id) else {
            return;
        };
        let changed = if starred {
            m.starred_by.insert(sess.user_id.clone())
        } else {
            m.starred_by.remove(&sess.user_id)
        };
        if changed {
            let chat_id = m.chat_id.clone();
            self.cache_chat_messages(&chat_id);
            self.publish();
        }
    }

    pub(super) fn forward_messages(
        &mut self,
        message_ids: Vec<String>,
        target_chat_ids: Vec<String>,
    ) -> Result<(), CoreError> {
        let sess = self.session_ref()?;
        if message_ids.is_empty() {
            return Err(CoreError::Validation("Select messages to forward".into()));
        }
        if target_chat_ids.is_empty() {
            return Err(CoreError::Validation("Select at least one chat".into()));
        }
        let now = self.clock.now_ms();

        let mut originals = Vec::with_capacity(message_ids.len());
        for id in &message_ids {
            let m = sess
                .messages
                .get(id)
                .filter(|m| m.is_visible_to(&sess.user_id, now))
                .ok_or_else(|| CoreError::NotFound(format!("message {id}")))?;
            if matches!(m.delivery, DeliveryState::Sending | DeliveryState::Failed) {
                return Err(CoreError::Validation(
                    "Only sent messages can be forwarded".into(),
                ));
            }
            originals.push(m.clone());
        }
        originals.sort_by(|a, b| a.display_order_cmp(b));

        let mut targets: Vec<&Chat> = Vec::new();
        for chat_id in &target_chat_ids {
            if targets.iter().any(|c| &c.id == chat_id) {
                continue;
            }
            let chat = sess
                .chats
                .get(chat_id)
                .ok_or_else(|| CoreError::NotFound(format!("chat {chat_id}")))?;
            targets.push(chat);
        }

        let me = sess.user_id.clone();
        let mut plan: Vec<(String, Vec<Message>)> = Vec::with_capacity(targets.len());
        for chat in targets {
            let expiry_secs = chat_auto_delete(chat, now);
            let copies = originals
                .iter()
                .enumerate()
                .map(|(i, orig)| {
                    // Offset by position so copies keep their original order.
                    let created_at = now.saturating_add(i as i64);
                    Message {
                        id: new_message_id(),
                        chat_id: chat.id.clone(),
                        sender_id: me.clone(),
                        content: orig.content.clone(),
                        media: orig.media.clone(),
                        created_at,
                        edited_at: None,
                        deleted_for: BTreeSet::new(),
                        starred_by: BTreeSet::new(),
                        expires_at: expiry_secs.and_then(|secs| expiry_deadline(created_at, secs)),
                        forwarded_from: Some(orig.id.clone()),
                        delivery: DeliveryState::Sending,
                        receipts: BTreeMap::new(),
                        failure_reason: None,
                    }
                })
                .collect();
            plan.push((chat.id.clone(), copies));
        }

        tracing::info!(
            messages = message_ids.len(),
            targets = plan.len(),
            "forward messages"
        );
        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        self.spawn_internal(async move {
            let mut attempts = Vec::with_capacity(plan.len());
            for (chat_id, messages) in plan {
                let result = when_online(
                    connectivity.clone(),
                    backend.forward_messages(&chat_id, &messages),
                )
                .await;
                attempts.push(ForwardAttempt {
                    chat_id,
                    messages,
                    result,
                });
            }
            InternalEvent::ForwardFinished {
                message_ids,
                attempts,
            }
        });
        Ok(())
    }

    pub(super) fn on_forward_finished(
        &mut self,
        message_ids: Vec<String>,
        attempts: Vec<ForwardAttempt>,
    ) {
        let online = self.connectivity.is_online();
        let Some(sess) = self.session.as_mut() else {
            return;
        };

        let total = attempts.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut touched = Vec::new();
        let mut first_error = None;
        for attempt in attempts {
            match attempt.result {
                Ok(()) => {
                    for mut copy in attempt.messages {
                        copy.delivery = DeliveryState::Sent;
                        sess.messages.entry(copy.id.clone()).or_insert(copy);
                    }
                    touched.push(attempt.chat_id.clone());
                    outcomes.push(ForwardOutcome {
                        chat_id: attempt.chat_id,
                        ok: true,
                        error: None,
                    });
                }
                Err(e) => {
                    let classified = classify_backend(&e, online);
                    tracing::warn!(chat_id = %attempt.chat_id, code = classified.code, "forward failed");
                    first_error.get_or_insert_with(|| classified.user_message.clone());
                    outcomes.push(ForwardOutcome {
                        chat_id: attempt.chat_id,
                        ok: false,
                        error: Some(classified.user_message),
                    });
                }
            }
        }

        let report = ForwardReport {
            message_ids,
            outcomes,
        };
        let succeeded = report.success_count();
        self.state.last_forward = Some(report);
        for chat_id in &touched {
            self.cache_chat_messages(chat_id);
        }
        self.refresh_views();

        match first_error {
            None => self.emit_state(),
            Some(_) if succeeded > 0 => {
                self.toast(format!("Forwarded to {succeeded} of {total} chats"))
            }
            Some(reason) => self.toast(reason),
        }
    }

    pub(super) fn mark_read(&mut self, message_id: String) -> Result<(), CoreError> {
        let sess = self.session.as_mut().ok_or(CoreError::NotSignedIn)?;
        let Some(m) = sess.messages.get(&message_id) else {
            return Ok(());
        };
        // Only incoming messages that haven't been read yet.
        if m.sender_id == sess.user_id
            || !matches!(m.delivery, DeliveryState::Sent | DeliveryState::Delivered)
            || !sess.pending_reads.insert(message_id.clone())
        {
            return Ok(());
        }

        let me = sess.user_id.clone();
        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        self.spawn_internal(async move {
            let result = when_online(connectivity, backend.mark_read(&message_id, &me)).await;
            InternalEvent::MarkReadResult { message_id, result }
        });
        Ok(())
    }

    pub(super) fn on_mark_read_result(&mut self, message_id: &str, result: Result<(), BackendError>) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        sess.pending_reads.remove(message_id);
        match result {
            Ok(()) => {
                let Some(m) = sess.messages.get_mut(message_id) else {
                    return;
                };
                if m.delivery.advance(DeliveryState::Read) {
                    let chat_id = m.chat_id.clone();
                    self.cache_chat_messages(&chat_id);
                    self.publish();
                }
            }
            // Read receipts are best effort; the next MarkRead retries.
            Err(e) => tracing::debug!(%e, message_id, "mark read failed"),
        }
    }

    /// Fold a server-side row into the local copy without ever moving delivery backwards.
    pub(super) fn merge_remote(&mut self, remote: Message) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };

        // A published scheduled message leaves the queue.
        self.state.scheduled.retain(|s| s.id != remote.id);

        match sess.messages.get_mut(&remote.id) {
            Some(local) => {
                // The backend has the row, so an earlier failure was a lost response.
                if local.delivery.retry() {
                    local.failure_reason = None;
                }
                local.delivery.advance(remote.delivery);
                local.delivery.advance(DeliveryState::Sent);
                local.content = remote.content;
                local.edited_at = remote.edited_at;
                local.deleted_for = remote.deleted_for;
                local.starred_by = remote.starred_by;
                local.expires_at = remote.expires_at;
                local.forwarded_from = remote.forwarded_from;
                local.media = remote.media;
                for (recipient, state) in remote.receipts {
                    local
                        .receipts
                        .entry(recipient)
                        .and_modify(|s| {
                            s.advance(state);
                        })
                        .or_insert(state);
                }
            }
            None => {
                let mut remote = remote;
                remote.failure_reason = None;
                if matches!(remote.delivery, DeliveryState::Sending | DeliveryState::Failed) {
                    remote.delivery = DeliveryState::Sent;
                }
                sess.messages.insert(remote.id.clone(), remote);
            }
        }
    }
}
