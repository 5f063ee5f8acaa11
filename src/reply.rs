use crate::line::{LineApi, Message};
use crate::model::InboundEvent;
use tracing::{info, instrument, warn};

/// Platform cap on messages per reply.
const MAX_MESSAGES_PER_REPLY: usize = 5;

/// Send `messages` as the reply to `event`. Failures are logged and
/// swallowed; returns whether the platform accepted the reply.
#[instrument(skip_all, fields(source_id = %event.source_id, source = event.source_kind.as_str()))]
pub async fn reply_to_event(line: &dyn LineApi, event: &InboundEvent, messages: &[Message]) -> bool {
    if messages.is_empty() {
        return false;
    }
    let messages = if messages.len() > MAX_MESSAGES_PER_REPLY {
        warn!(count = messages.len(), "dropping messages over the reply limit");
        &messages[..MAX_MESSAGES_PER_REPLY]
    } else {
        messages
    };

    if let Err(err) = line.reply(&event.reply_token, messages).await {
        warn!(?err, "reply failed");
        return false;
    }

    let display_name = match event.user_id.as_deref() {
        Some(uid) => match line.profile(uid).await {
            Ok(profile) => profile.display_name,
            Err(err) => {
                warn!(?err, "profile lookup after reply failed");
                "unknown".to_string()
            }
        },
        None => "unknown".to_string(),
    };
    info!(%display_name, messages = messages.len(), "replied");
    true
}
