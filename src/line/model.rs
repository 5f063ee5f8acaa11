use serde::{Deserialize, Serialize};

use crate::model::{InboundEvent, Payload, Postback, PostbackError, SourceKind};

#[derive(Deserialize, Debug)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    Message(MessageEvent),
    Postback(PostbackEvent),
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub reply_token: String,
    pub source: Source,
    pub message: MessageContent,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostbackEvent {
    pub reply_token: String,
    pub source: Source,
    pub postback: PostbackContent,
}

#[derive(Deserialize, Debug)]
pub struct PostbackContent {
    pub data: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    User {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    Room {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl Source {
    fn split(self) -> (SourceKind, String, Option<String>) {
        match self {
            Source::User { user_id } => (SourceKind::User, user_id.clone(), Some(user_id)),
            Source::Group { group_id, user_id } => (SourceKind::Group, group_id, user_id),
            Source::Room { room_id, user_id } => (SourceKind::Room, room_id, user_id),
        }
    }
}

impl WebhookEvent {
    /// `Ok(None)` for events the bot does not act on (follows, stickers, ...).
    pub fn into_inbound(self) -> Result<Option<InboundEvent>, PostbackError> {
        let (reply_token, source, payload) = match self {
            WebhookEvent::Message(ev) => match ev.message {
                MessageContent::Text { text } => (ev.reply_token, ev.source, Payload::Text(text)),
                MessageContent::Other => return Ok(None),
            },
            WebhookEvent::Postback(ev) => {
                let postback = Postback::parse(&ev.postback.data)?;
                (ev.reply_token, ev.source, Payload::Postback(postback))
            }
            WebhookEvent::Unsupported => return Ok(None),
        };
        let (source_kind, source_id, user_id) = source.split();
        Ok(Some(InboundEvent {
            reply_token,
            source_kind,
            source_id,
            user_id,
            payload,
        }))
    }
}

/// Outgoing message object.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text {
        text: String,
    },
    Sticker {
        #[serde(rename = "packageId")]
        package_id: String,
        #[serde(rename = "stickerId")]
        sticker_id: String,
    },
    Template {
        #[serde(rename = "altText")]
        alt_text: String,
        template: Template,
    },
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text { text: text.into() }
    }

    pub fn sticker(package_id: u32, sticker_id: u32) -> Self {
        Message::Sticker {
            package_id: package_id.to_string(),
            sticker_id: sticker_id.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Template {
    Buttons { text: String, actions: Vec<Action> },
    Confirm { text: String, actions: Vec<Action> },
}

impl Template {
    pub fn actions(&self) -> &[Action] {
        match self {
            Template::Buttons { actions, .. } | Template::Confirm { actions, .. } => actions,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Postback { label: String, data: String },
}

impl Action {
    pub fn postback(label: impl Into<String>, postback: &Postback) -> Self {
        Action::Postback {
            label: label.into(),
            data: postback.to_data(),
        }
    }

    pub fn data(&self) -> &str {
        match self {
            Action::Postback { data, .. } => data,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReplyRequest<'a> {
    pub reply_token: &'a str,
    pub messages: &'a [Message],
}

#[derive(Serialize, Debug)]
pub(crate) struct PushRequest<'a> {
    pub to: &'a str,
    pub messages: &'a [Message],
}
