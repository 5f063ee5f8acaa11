use crate::db::{self, Pool};
use crate::formatter;
use crate::line::model::WebhookBody;
use crate::line::{LineApi, Message};
use crate::lookup::{self, LookupService};
use crate::model::{InboundEvent, Payload, Postback, RegisteredUser};
use crate::registry::{Registration, Registry};
use crate::reply;
use crate::snapshot::SnapshotStore;
use crate::state::BotState;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const DEBUG_PHRASE: &str = "*_DEBUG_*";
pub const REGISTER_PHRASE: &str = "選我選我";

/// A text message reduced to what the bot should do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Debug,
    ConfirmRegistration,
    AirList(Option<&'a str>),
    ShortId,
    Mute,
    Unmute,
    Query { county: &'a str, town: Option<&'a str> },
    Empty,
}

pub fn parse_command(text: &str) -> Command<'_> {
    let trimmed = text.trim();
    if trimmed == DEBUG_PHRASE {
        return Command::Debug;
    }
    if trimmed == REGISTER_PHRASE {
        return Command::ConfirmRegistration;
    }

    let mut tokens = trimmed.split_whitespace();
    let Some(first) = tokens.next() else {
        return Command::Empty;
    };
    let second = tokens.next();

    if first.eq_ignore_ascii_case("air") || first == "空氣" {
        return Command::AirList(second);
    }
    if second.is_none() {
        match first {
            "id" | "ID" => return Command::ShortId,
            "mute" | "靜音" => return Command::Mute,
            "unmute" | "取消靜音" => return Command::Unmute,
            _ => {}
        }
    }
    Command::Query {
        county: first,
        town: second,
    }
}

pub struct Dispatcher {
    line: Arc<dyn LineApi>,
    lookup: LookupService,
    registry: Registry,
    pool: Pool,
    state: Arc<BotState>,
}

impl Dispatcher {
    pub fn new(
        line: Arc<dyn LineApi>,
        store: SnapshotStore,
        pool: Pool,
        state: Arc<BotState>,
    ) -> Self {
        Self {
            line,
            lookup: LookupService::new(store.clone()),
            registry: Registry::new(store),
            pool,
            state,
        }
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    /// Handle every event in a webhook delivery, one after another.
    pub async fn handle_webhook(&self, body: WebhookBody) {
        for event in body.events {
            match event.into_inbound() {
                Ok(Some(inbound)) => self.handle_event(inbound).await,
                Ok(None) => {}
                Err(err) => warn!(%err, "ignoring malformed postback"),
            }
        }
    }

    /// Dispatch and reply. Errors end in an apology, never in detail.
    pub async fn handle_event(&self, event: InboundEvent) {
        let messages = match self.dispatch(&event).await {
            Ok(messages) => messages,
            Err(err) => {
                error!(?err, source_id = %event.source_id, "failed to handle event");
                vec![Message::text(formatter::APOLOGY)]
            }
        };
        reply::reply_to_event(self.line.as_ref(), &event, &messages).await;
    }

    /// Returns the reply; an empty list means stay silent.
    #[instrument(skip_all, fields(source_id = %event.source_id))]
    pub async fn dispatch(&self, event: &InboundEvent) -> Result<Vec<Message>> {
        match &event.payload {
            Payload::Postback(postback) => self.on_postback(event, postback).await,
            Payload::Text(text) => self.on_text(event, text).await,
        }
    }

    async fn on_postback(&self, event: &InboundEvent, postback: &Postback) -> Result<Vec<Message>> {
        match postback {
            Postback::NextSet { offset, county } => {
                let stations = self.lookup.stations_in_county(county).await;
                Ok(vec![formatter::air_list(&stations, *offset)])
            }
            Postback::GetAirData { county, site } => {
                let stations = self.lookup.stations_at(county, site).await;
                Ok(stations
                    .iter()
                    .map(|s| Message::text(formatter::air_info(s)))
                    .collect())
            }
            Postback::Registration { answer: false } => Ok(formatter::registration_declined()),
            Postback::Registration { answer: true } => self.register(event).await,
        }
    }

    async fn register(&self, event: &InboundEvent) -> Result<Vec<Message>> {
        if self.registry.is_registered(&event.source_id).await? {
            return Ok(vec![Message::text(formatter::ALREADY_REGISTERED)]);
        }

        let profile_id = event.user_id.as_deref().unwrap_or(&event.source_id);
        let mut user = RegisteredUser {
            user_id: event.source_id.clone(),
            display_name: String::new(),
            picture_url: None,
            status_message: None,
            registered_at: Some(Utc::now()),
        };
        match self.line.profile(profile_id).await {
            Ok(profile) => {
                user.display_name = profile.display_name;
                user.picture_url = profile.picture_url;
                user.status_message = profile.status_message;
            }
            Err(err) => warn!(?err, "profile unavailable; registering without it"),
        }

        Ok(match self.registry.register(user).await? {
            Registration::Registered => formatter::registration_done(),
            Registration::AlreadyRegistered => vec![Message::text(formatter::ALREADY_REGISTERED)],
        })
    }

    async fn on_text(&self, event: &InboundEvent, text: &str) -> Result<Vec<Message>> {
        match parse_command(text) {
            Command::Empty => Ok(Vec::new()),
            Command::Debug => {
                let profile_id = event.user_id.as_deref().unwrap_or(&event.source_id);
                match self.line.profile(profile_id).await {
                    Ok(profile) => info!(?profile, "debug profile"),
                    Err(err) => warn!(?err, "debug profile unavailable"),
                }
                Ok(vec![Message::text(formatter::DEBUG_ACK)])
            }
            Command::ConfirmRegistration => Ok(vec![formatter::registration_confirm()]),
            Command::AirList(None) => Ok(vec![formatter::air_usage_hint()]),
            Command::AirList(Some(county)) => {
                let stations = self.lookup.stations_in_county(county).await;
                Ok(vec![formatter::air_list(&stations, 0)])
            }
            Command::ShortId => {
                let id = db::get_or_create_short_id(&self.pool, &event.source_id).await?;
                Ok(vec![formatter::short_id(&id)])
            }
            Command::Mute => {
                self.state.mute(&event.source_id).await;
                Ok(vec![Message::text(formatter::MUTED)])
            }
            Command::Unmute => {
                self.state.unmute(&event.source_id).await;
                Ok(vec![Message::text(formatter::UNMUTED)])
            }
            Command::Query { county, town } => {
                if self.state.is_muted(&event.source_id).await {
                    return Ok(Vec::new());
                }
                // An unreadable list reads as unregistered.
                match self.registry.is_registered(&event.source_id).await {
                    Ok(true) => {}
                    Ok(false) => return Ok(Vec::new()),
                    Err(err) => {
                        warn!(%err, "registration list unreadable; treating source as unregistered");
                        return Ok(Vec::new());
                    }
                }
                match town {
                    None => Ok(vec![formatter::usage_hint()]),
                    Some(_) if !lookup::is_known_county(county) => {
                        Ok(vec![Message::text(formatter::NO_SUCH_CITY)])
                    }
                    Some(town) => {
                        let (weather, air) = self.lookup.town_conditions(county, town).await;
                        Ok(formatter::town_report(town, weather.as_ref(), air.as_ref()))
                    }
                }
            }
        }
    }
}
