#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tw_airbot::line::{LineApi, Message, Profile};
use tw_airbot::model::{InboundEvent, Payload, Postback, SourceKind, StationRecord};
use tw_airbot::snapshot::{SnapshotStore, AIR_FILE};

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[derive(Debug, Clone)]
pub struct ReplyCall {
    pub reply_token: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct PushCall {
    pub to: String,
    pub messages: Vec<Message>,
}

#[derive(Clone, Default)]
pub struct RecordingLine {
    reply_results: Arc<Mutex<VecDeque<Result<()>>>>,
    replies: Arc<Mutex<Vec<ReplyCall>>>,
    pushes: Arc<Mutex<Vec<PushCall>>>,
    profile_lookups: Arc<Mutex<Vec<String>>>,
}

impl RecordingLine {
    pub fn failing_replies(n: usize) -> Self {
        let line = Self::default();
        {
            let mut q = line.reply_results.try_lock().unwrap();
            for _ in 0..n {
                q.push_back(Err(anyhow!("platform unavailable")));
            }
        }
        line
    }

    pub async fn replies(&self) -> Vec<ReplyCall> {
        self.replies.lock().await.clone()
    }

    pub async fn pushes(&self) -> Vec<PushCall> {
        self.pushes.lock().await.clone()
    }

    pub async fn profile_lookups(&self) -> Vec<String> {
        self.profile_lookups.lock().await.clone()
    }

    pub async fn last_reply(&self) -> Option<Vec<Message>> {
        self.replies.lock().await.last().map(|c| c.messages.clone())
    }
}

#[async_trait::async_trait]
impl LineApi for RecordingLine {
    async fn reply(&self, reply_token: &str, messages: &[Message]) -> Result<()> {
        self.replies.lock().await.push(ReplyCall {
            reply_token: reply_token.to_string(),
            messages: messages.to_vec(),
        });
        self.reply_results
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn push(&self, to: &str, messages: &[Message]) -> Result<()> {
        self.pushes.lock().await.push(PushCall {
            to: to.to_string(),
            messages: messages.to_vec(),
        });
        Ok(())
    }

    async fn profile(&self, user_id: &str) -> Result<Profile> {
        self.profile_lookups.lock().await.push(user_id.to_string());
        if user_id.starts_with('R') {
            return Err(anyhow!("rooms have no profile"));
        }
        Ok(Profile {
            user_id: user_id.to_string(),
            display_name: format!("name-{}", user_id),
            picture_url: None,
            status_message: Some("hello".into()),
        })
    }
}

pub fn station(county: &str, site: &str) -> StationRecord {
    StationRecord {
        county: county.into(),
        site_name: site.into(),
        publish_time: "2017-03-28 10:00".into(),
        major_pollutant: "".into(),
        status: "良好".into(),
        pm25: "12".into(),
        ..Default::default()
    }
}

/// Five stations in 臺南市 and two in 高雄市.
pub async fn seed_air(dir: &Path) -> SnapshotStore {
    let store = SnapshotStore::new(dir);
    let rows = vec![
        station("臺南市", "安南"),
        station("臺南市", "臺南"),
        station("臺南市", "善化"),
        station("臺南市", "新營"),
        station("臺南市", "麻豆"),
        station("高雄市", "前鎮"),
        station("高雄市", "小港"),
    ];
    store.write_all(AIR_FILE, &rows).await.unwrap();
    store
}

pub fn text_event(source_id: &str, text: &str) -> InboundEvent {
    InboundEvent {
        reply_token: format!("rt-{}", text),
        source_kind: SourceKind::User,
        source_id: source_id.to_string(),
        user_id: Some(source_id.to_string()),
        payload: Payload::Text(text.to_string()),
    }
}

pub fn postback_event(source_id: &str, postback: Postback) -> InboundEvent {
    InboundEvent {
        reply_token: "rt-postback".into(),
        source_kind: SourceKind::User,
        source_id: source_id.to_string(),
        user_id: Some(source_id.to_string()),
        payload: Payload::Postback(postback),
    }
}
