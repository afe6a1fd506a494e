use agora_storage_traits::messages::types::{DeleteScope, MediaRef};

use crate::backend::FeedTab;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    // Session
    StartSession {
        user_id: String,
        access_token: String,
    },
    EndSession,

    // Chats
    RefreshChats,
    OpenChat {
        chat_id: String,
    },
    CloseChat,

    // Messages
    SendMessage {
        chat_id: String,
        content: String,
        attachments: Vec<MediaRef>,
        /// Unix ms. Queues the message instead of sending it now.
        scheduled_for: Option<i64>,
        /// Overrides the chat's disappearing duration for this message.
        auto_delete_secs: Option<u64>,
    },
    RetryMessage {
        chat_id: String,
        message_id: String,
    },
    EditMessage {
        message_id: String,
        content: String,
    },
    DeleteMessage {
        message_id: String,
        scope: DeleteScope,
    },
    StarMessage {
        message_id: String,
    },
    UnstarMessage {
        message_id: String,
    },
    ForwardMessages {
        message_ids: Vec<String>,
        target_chat_ids: Vec<String>,
    },
    MarkRead {
        message_id: String,
    },

    // Feed
    RefreshFeed {
        tab: FeedTab,
    },

    // Lifecycle
    NetworkChanged {
        online: bool,
    },
    Foregrounded,
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag. Never log `?action`: it carries tokens and message content.
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::StartSession { .. } => "StartSession",
            AppAction::EndSession => "EndSession",

            // Chats
            AppAction::RefreshChats => "RefreshChats",
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::CloseChat => "CloseChat",

            // Messages
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::EditMessage { .. } => "EditMessage",
            AppAction::DeleteMessage { .. } => "DeleteMessage",
            AppAction::StarMessage { .. } => "StarMessage",
            AppAction::UnstarMessage { .. } => "UnstarMessage",
            AppAction::ForwardMessages { .. } => "ForwardMessages",
            AppAction::MarkRead { .. } => "MarkRead",

            // Feed
            AppAction::RefreshFeed { .. } => "RefreshFeed",

            // Lifecycle
            AppAction::NetworkChanged { .. } => "NetworkChanged",
            AppAction::Foregrounded => "Foregrounded",
            AppAction::ClearToast => "ClearToast",
        }
    }
}
