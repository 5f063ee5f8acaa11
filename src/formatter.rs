//! Renders lookup results into outgoing messages.

use crate::line::{Action, Message, Template};
use crate::model::{Postback, StationRecord, WeatherRecord};

pub const NOT_AVAILABLE: &str = "N/A";
pub const PAGE_SIZE: usize = 3;
/// Platform limit on a template's alternative text.
const ALT_TEXT_MAX_CHARS: usize = 400;

pub const NO_SUCH_CITY: &str = "哎呀！沒有這個城市\n\n小提醒：\n如果要查詢\"台南\"，請輸入正體全名\"臺南市\"";
pub const NO_MORE_STATIONS: &str = "沒有更多測站了";
pub const ALREADY_REGISTERED: &str = "你已經註冊囉";
pub const REGISTERED: &str = "收到了";
pub const REGISTRATION_DECLINED: &str = "都是我不好";
pub const APOLOGY: &str = "抱歉，系統忙碌中，請稍後再試";
pub const DEBUG_ACK: &str = "🐞🐞🐞";
pub const MUTED: &str = "好的，我先安靜";
pub const UNMUTED: &str = "我回來了";

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        NOT_AVAILABLE
    } else {
        value
    }
}

fn num_or_na(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{}{}", v, unit),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn air_info(record: &StationRecord) -> String {
    let pm25 = if record.pm25.trim().is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        format!("{} μg/m³", record.pm25)
    };
    format!(
        "{} 發布\n\n- 指標污染物：{}\n- 空氣品質指標：{}\n- PM2.5：{}",
        or_na(&record.publish_time),
        or_na(&record.major_pollutant),
        or_na(&record.status),
        pm25
    )
}

pub fn weather_info(record: &WeatherRecord) -> String {
    let mut lines = Vec::with_capacity(6);
    let published = record
        .observed_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    lines.push(format!("{} 發布\n", published));
    if !record.description.trim().is_empty() {
        lines.push(record.description.clone());
    }
    lines.push(format!("- 溫度：{}", num_or_na(record.temperature, "℃")));
    lines.push(format!("- 濕度：{}", num_or_na(record.humidity, "%")));
    lines.push(format!("- 風速：{}", num_or_na(record.wind_speed, " m/s")));
    lines.join("\n")
}

/// One page of a county's stations as a buttons template.
///
/// `records` must already be filtered to a single county.
pub fn air_list(records: &[StationRecord], offset: usize) -> Message {
    if records.is_empty() {
        return Message::text(NO_SUCH_CITY);
    }
    if offset >= records.len() {
        return Message::text(NO_MORE_STATIONS);
    }

    let end = (offset + PAGE_SIZE).min(records.len());
    let mut actions: Vec<Action> = records[offset..end]
        .iter()
        .map(|site| {
            Action::postback(
                format!("{}{}", site.county, site.site_name),
                &Postback::GetAirData {
                    county: site.county.clone(),
                    site: site.site_name.clone(),
                },
            )
        })
        .collect();
    if end < records.len() {
        actions.push(Action::postback(
            "其他測站...",
            &Postback::NextSet {
                offset: end,
                county: records[0].county.clone(),
            },
        ));
    }

    let mut alt_text = String::from("有下列測站：\n\n");
    for site in records {
        alt_text.push_str(&format!("{} {}\n", site.county, site.site_name));
    }

    Message::Template {
        alt_text: truncate_chars(&alt_text, ALT_TEXT_MAX_CHARS),
        template: Template::Buttons {
            text: "選擇測站".into(),
            actions,
        },
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

pub fn registration_confirm() -> Message {
    Message::Template {
        alt_text: "登記搶先體驗確認".into(),
        template: Template::Confirm {
            text: "確定登記搶先體驗嗎？".into(),
            actions: vec![
                Action::postback("沒錯！", &Postback::Registration { answer: true }),
                Action::postback("後悔了", &Postback::Registration { answer: false }),
            ],
        },
    }
}

pub fn registration_done() -> Vec<Message> {
    vec![Message::text(REGISTERED), Message::sticker(2, 179)]
}

pub fn registration_declined() -> Vec<Message> {
    vec![Message::text(REGISTRATION_DECLINED), Message::sticker(1, 9)]
}

pub fn usage_hint() -> Message {
    Message::text("輸入\"<城市名稱> <鄉鎮區名稱>\"查詢氣象及空氣資訊\n如：高雄市 前鎮區")
}

pub fn air_usage_hint() -> Message {
    Message::text("輸入\"空氣 <城市名稱>\"列出測站\n如：空氣 臺南市")
}

pub fn short_id(id: &str) -> Message {
    Message::text(format!("你的代碼：{}", id))
}

/// Weather first, then air, each falling back to a "no data" line.
pub fn town_report(
    town: &str,
    weather: Option<&WeatherRecord>,
    air: Option<&StationRecord>,
) -> Vec<Message> {
    let weather_text = weather
        .map(weather_info)
        .unwrap_or_else(|| format!("目前沒有{}的天氣資訊", town));
    let air_text = air
        .map(air_info)
        .unwrap_or_else(|| format!("目前沒有{}的空氣資訊", town));
    vec![Message::text(weather_text), Message::text(air_text)]
}
