use agora_storage_traits::chats::types::Chat;
use agora_storage_traits::messages::types::{DeleteScope, Message, ScheduledMessage};
use agora_storage_traits::objects::types::{Post, Profile};

use crate::backend::FeedTab;
use crate::error::BackendError;
use crate::realtime::RealtimeEvent;
use crate::state::AppState;
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
    Shutdown,
}

/// One target of a forward request after the backend answered.
#[derive(Debug)]
pub struct ForwardAttempt {
    pub chat_id: String,
    pub messages: Vec<Message>,
    pub result: Result<(), BackendError>,
}

#[derive(Debug)]
pub enum InternalEvent {
    // Fetch results, tagged with the request generation that issued them.
    ChatsFetched {
        token: u64,
        user_id: String,
        result: Result<Vec<Chat>, BackendError>,
    },
    MessagesFetched {
        token: u64,
        chat_id: String,
        result: Result<Vec<Message>, BackendError>,
    },
    FeedFetched {
        token: u64,
        tab: FeedTab,
        result: Result<Vec<Post>, BackendError>,
    },
    ProfileFetched {
        token: u64,
        user_id: String,
        result: Result<Option<Profile>, BackendError>,
    },

    // Mutation results
    SendResult {
        message_id: String,
        result: Result<(), BackendError>,
    },
    ScheduleResult {
        message: ScheduledMessage,
        result: Result<(), BackendError>,
    },
    EditResult {
        message_id: String,
        content: String,
        edited_at: i64,
        result: Result<(), BackendError>,
    },
    DeleteResult {
        message_id: String,
        scope: DeleteScope,
        result: Result<(), BackendError>,
    },
    StarResult {
        message_id: String,
        starred: bool,
        result: Result<(), BackendError>,
    },
    MarkReadResult {
        message_id: String,
        result: Result<(), BackendError>,
    },
    ForwardFinished {
        message_ids: Vec<String>,
        attempts: Vec<ForwardAttempt>,
    },

    // Realtime push
    Realtime(RealtimeEvent),

    // Disappearing-message timer fired
    ExpiryTick {
        deadline: i64,
    },
}
