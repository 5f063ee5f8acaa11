mod common;

use common::{postback_event, seed_air, setup_pool, text_event, RecordingLine};
use std::sync::Arc;
use tw_airbot::formatter;
use tw_airbot::handlers::Dispatcher;
use tw_airbot::line::{Message, Template};
use tw_airbot::model::{Postback, RegisteredUser, WeatherRecord};
use tw_airbot::snapshot::{SnapshotStore, REGISTRATION_FILE, WEATHER_FILE};
use tw_airbot::state::BotState;

async fn dispatcher(store: SnapshotStore, line: RecordingLine) -> Dispatcher {
    Dispatcher::new(
        Arc::new(line),
        store,
        setup_pool().await,
        Arc::new(BotState::new()),
    )
}

fn postbacks(msg: &Message) -> Vec<Postback> {
    match msg {
        Message::Template {
            template: Template::Buttons { actions, .. },
            ..
        } => actions
            .iter()
            .map(|a| Postback::parse(a.data()).unwrap())
            .collect(),
        other => panic!("expected buttons template, got {:?}", other),
    }
}

fn texts(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn air_listing_pages_through_county() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;
    let line = RecordingLine::default();
    let bot = dispatcher(store, line.clone()).await;

    bot.handle_event(text_event("U1", "空氣 臺南市")).await;
    let reply = line.last_reply().await.unwrap();
    assert_eq!(reply.len(), 1);
    let first = postbacks(&reply[0]);
    assert_eq!(first.len(), 4);
    assert!(first[..3]
        .iter()
        .all(|p| matches!(p, Postback::GetAirData { county, .. } if county == "臺南市")));
    assert_eq!(
        first[3],
        Postback::NextSet {
            offset: 3,
            county: "臺南市".into()
        }
    );

    bot.handle_event(postback_event("U1", first[3].clone())).await;
    let second = postbacks(&line.last_reply().await.unwrap()[0]);
    assert_eq!(
        second,
        vec![
            Postback::GetAirData {
                county: "臺南市".into(),
                site: "新營".into()
            },
            Postback::GetAirData {
                county: "臺南市".into(),
                site: "麻豆".into()
            },
        ]
    );

    bot.handle_event(text_event("U1", "空氣 台南")).await;
    assert_eq!(
        line.last_reply().await.unwrap(),
        vec![Message::text(formatter::NO_SUCH_CITY)]
    );
}

#[tokio::test]
async fn air_data_postback_renders_station() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;
    let line = RecordingLine::default();
    let bot = dispatcher(store, line.clone()).await;

    bot.handle_event(postback_event(
        "U1",
        Postback::GetAirData {
            county: "高雄市".into(),
            site: "前鎮".into(),
        },
    ))
    .await;
    let reply = line.last_reply().await.unwrap();
    assert_eq!(
        texts(&reply),
        vec!["2017-03-28 10:00 發布\n\n- 指標污染物：N/A\n- 空氣品質指標：良好\n- PM2.5：12 μg/m³".to_string()]
    );

    let before = line.replies().await.len();
    bot.handle_event(postback_event(
        "U1",
        Postback::GetAirData {
            county: "高雄市".into(),
            site: "前鎮區".into(),
        },
    ))
    .await;
    assert_eq!(line.replies().await.len(), before, "no match means no reply");
}

#[tokio::test]
async fn registration_is_idempotent() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;
    let line = RecordingLine::default();
    let bot = dispatcher(store.clone(), line.clone()).await;

    bot.handle_event(text_event("U1", "選我選我")).await;
    assert!(matches!(
        &line.last_reply().await.unwrap()[0],
        Message::Template {
            template: Template::Confirm { .. },
            ..
        }
    ));

    let yes = Postback::Registration { answer: true };
    bot.handle_event(postback_event("U1", yes.clone())).await;
    assert_eq!(line.last_reply().await.unwrap(), formatter::registration_done());

    bot.handle_event(postback_event("U1", yes)).await;
    assert_eq!(
        line.last_reply().await.unwrap(),
        vec![Message::text(formatter::ALREADY_REGISTERED)]
    );

    let users: Vec<RegisteredUser> = store.read_all(REGISTRATION_FILE).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, "U1");
    assert_eq!(users[0].display_name, "name-U1");
    assert!(users[0].registered_at.is_some());

    bot.handle_event(postback_event("U2", Postback::Registration { answer: false }))
        .await;
    assert_eq!(
        line.last_reply().await.unwrap(),
        formatter::registration_declined()
    );
    let users: Vec<RegisteredUser> = store.read_all(REGISTRATION_FILE).await.unwrap();
    assert_eq!(users.len(), 1);
}

#[tokio::test]
async fn town_query_requires_registration() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;
    store
        .write_all(
            WEATHER_FILE,
            &[WeatherRecord {
                station_id: "467440".into(),
                station_name: "高雄".into(),
                county: "高雄市".into(),
                town: "前鎮區".into(),
                observed_at: None,
                description: "晴".into(),
                temperature: Some(28.1),
                humidity: Some(70.0),
                wind_speed: None,
            }],
        )
        .await
        .unwrap();
    let line = RecordingLine::default();
    let bot = dispatcher(store, line.clone()).await;

    bot.handle_event(text_event("U9", "高雄市 前鎮區")).await;
    assert!(line.replies().await.is_empty());

    bot.handle_event(postback_event("U9", Postback::Registration { answer: true }))
        .await;

    bot.handle_event(text_event("U9", "高雄市 前鎮區")).await;
    let reply = texts(&line.last_reply().await.unwrap());
    assert_eq!(reply.len(), 2);
    assert!(reply[0].contains("晴\n- 溫度：28.1℃\n- 濕度：70%\n- 風速：N/A"));
    assert!(reply[1].contains("PM2.5：12 μg/m³"));

    bot.handle_event(text_event("U9", "高雄市 左營區")).await;
    let reply = texts(&line.last_reply().await.unwrap());
    assert_eq!(
        reply,
        vec![
            "目前沒有左營區的天氣資訊".to_string(),
            "目前沒有左營區的空氣資訊".to_string()
        ]
    );

    bot.handle_event(text_event("U9", "台南 安南區")).await;
    assert_eq!(
        line.last_reply().await.unwrap(),
        vec![Message::text(formatter::NO_SUCH_CITY)]
    );

    bot.handle_event(text_event("U9", "高雄市")).await;
    assert_eq!(line.last_reply().await.unwrap(), vec![formatter::usage_hint()]);
}

#[tokio::test]
async fn mute_silences_town_queries() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;
    let line = RecordingLine::default();
    let bot = dispatcher(store, line.clone()).await;
    bot.handle_event(postback_event("U3", Postback::Registration { answer: true }))
        .await;

    bot.handle_event(text_event("U3", "靜音")).await;
    assert_eq!(
        line.last_reply().await.unwrap(),
        vec![Message::text(formatter::MUTED)]
    );
    assert!(bot.state().is_muted("U3").await);

    let before = line.replies().await.len();
    bot.handle_event(text_event("U3", "高雄市")).await;
    assert_eq!(line.replies().await.len(), before);

    bot.handle_event(text_event("U3", "unmute")).await;
    bot.handle_event(text_event("U3", "高雄市")).await;
    assert_eq!(line.last_reply().await.unwrap(), vec![formatter::usage_hint()]);
}

#[tokio::test]
async fn short_id_is_reused() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;
    let line = RecordingLine::default();
    let bot = dispatcher(store, line.clone()).await;

    bot.handle_event(text_event("U4", "id")).await;
    let first = texts(&line.last_reply().await.unwrap());
    bot.handle_event(text_event("U4", "id")).await;
    let second = texts(&line.last_reply().await.unwrap());
    assert_eq!(first, second);
    assert!(first[0].starts_with("你的代碼："));
}

#[tokio::test]
async fn failures_never_escape() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;

    // Reply delivery failure is swallowed.
    let line = RecordingLine::failing_replies(1);
    let bot = dispatcher(store.clone(), line.clone()).await;
    bot.handle_event(text_event("U5", "*_DEBUG_*")).await;
    assert_eq!(line.replies().await.len(), 1);
    assert_eq!(line.profile_lookups().await, vec!["U5".to_string()]);

    // A corrupt registration file turns into an apology.
    tokio::fs::write(store.path_of(REGISTRATION_FILE), "{broken")
        .await
        .unwrap();
    bot.handle_event(postback_event("U5", Postback::Registration { answer: true }))
        .await;
    assert_eq!(
        line.last_reply().await.unwrap(),
        vec![Message::text(formatter::APOLOGY)]
    );
}

#[tokio::test]
async fn corrupt_registration_file_keeps_chatter_silent() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;
    tokio::fs::write(store.path_of(REGISTRATION_FILE), "{broken")
        .await
        .unwrap();
    let line = RecordingLine::default();
    let bot = dispatcher(store, line.clone()).await;

    bot.handle_event(text_event("G1", "哈囉大家")).await;
    bot.handle_event(text_event("G1", "高雄市 前鎮區")).await;
    assert!(line.replies().await.is_empty());

    // Explicit commands are unaffected.
    bot.handle_event(text_event("G1", "空氣 高雄市")).await;
    assert_eq!(line.replies().await.len(), 1);
}

#[tokio::test]
async fn room_registration_uses_room_id() {
    let td = tempfile::tempdir().unwrap();
    let store = seed_air(td.path()).await;
    let line = RecordingLine::default();
    let bot = dispatcher(store.clone(), line.clone()).await;

    let mut event = postback_event("R1", Postback::Registration { answer: true });
    event.source_kind = tw_airbot::model::SourceKind::Room;
    event.user_id = None;
    bot.handle_event(event).await;

    let users: Vec<RegisteredUser> = store.read_all(REGISTRATION_FILE).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, "R1");
    assert_eq!(users[0].display_name, "");
}
