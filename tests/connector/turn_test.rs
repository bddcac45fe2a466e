//! Turn context addressing tests.

use msagents_bridge::activity::{Activity, ActivityType};

use crate::support::{bot_account, inbound_message, recording_turn, user_account, SERVICE_URL};

#[tokio::test]
async fn send_addresses_reply_to_inbound_conversation() {
    let (turn, channel) = recording_turn(inbound_message("hi"));

    turn.send_activity(Activity::message("hello"))
        .await
        .expect("send");

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    let reply = &sent[0];
    assert_eq!(reply.service_url.as_deref(), Some(SERVICE_URL));
    assert_eq!(reply.channel_id.as_deref(), Some("msteams"));
    assert_eq!(reply.from.as_ref(), Some(&bot_account()));
    assert_eq!(reply.recipient.as_ref(), Some(&user_account()));
    assert_eq!(reply.reply_to_id.as_deref(), Some("inbound-1"));
    assert_eq!(reply.conversation, turn.activity().conversation);
}

#[tokio::test]
async fn typing_is_not_threaded_as_a_reply() {
    let (turn, channel) = recording_turn(inbound_message("hi"));

    turn.send_activity(Activity::typing(None, None, None))
        .await
        .expect("send");

    let sent = channel.sent();
    assert_eq!(sent[0].kind, ActivityType::Typing);
    assert!(sent[0].reply_to_id.is_none());
    assert!(sent[0].conversation.is_some());
}

#[tokio::test]
async fn update_fills_conversation_and_keeps_target_id() {
    let (turn, channel) = recording_turn(inbound_message("like"));

    let mut update = Activity::message("x");
    update.id = Some("original".to_owned());
    turn.update_activity(update).await.expect("update");

    let updated = channel.updated();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].id.as_deref(), Some("original"));
    assert_eq!(updated[0].conversation, turn.activity().conversation);
    assert_eq!(updated[0].service_url.as_deref(), Some(SERVICE_URL));
    assert!(channel.sent().is_empty());
}
