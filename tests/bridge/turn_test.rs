//! End-to-end message turn tests through the session bridge.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde_json::json;

use msagents_bridge::activity::{
    Activity, ActivityType, Attachment, FILE_DOWNLOAD_INFO_CONTENT_TYPE, HERO_CARD_CONTENT_TYPE,
};
use msagents_bridge::adapter::{Bot, TurnError};
use msagents_bridge::bridge::{derive_thread_id, AttachmentDownloader, MsAgentsBot};
use msagents_bridge::host::{DataLayer, Element};

use crate::support::{
    bot_account, inbound_message, recording_turn, serve_bytes, user_account, RecordingDataLayer,
    RecordingHooks, CONVERSATION_ID,
};

fn bot(
    hooks: Arc<RecordingHooks>,
    data_layer: Option<Arc<RecordingDataLayer>>,
    root: &std::path::Path,
) -> MsAgentsBot {
    MsAgentsBot::new(
        hooks,
        data_layer.map(|d| d as Arc<dyn DataLayer>),
        AttachmentDownloader::new(Duration::from_secs(2), Duration::from_secs(5)),
        root.to_path_buf(),
    )
}

#[tokio::test]
async fn hooks_run_in_order_after_typing_indicator() {
    let root = tempfile::tempdir().expect("tempdir");
    let hooks = Arc::new(RecordingHooks::replying("hi Ada"));
    let bot = bot(hooks.clone(), None, root.path());

    let (turn, channel) = recording_turn(inbound_message("  hello  "));
    bot.on_turn(&turn).await.expect("turn");

    assert_eq!(
        hooks.events(),
        vec!["start", "message:Ada Lovelace:hello:0", "end"]
    );

    let sent = channel.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].kind, ActivityType::Typing);
    assert_eq!(sent[0].from.as_ref(), Some(&bot_account()));
    assert_eq!(sent[0].recipient.as_ref(), Some(&user_account()));
    assert_eq!(sent[1].text.as_deref(), Some("hi Ada"));
    assert!(sent[1].attachments.is_none());
}

#[tokio::test]
async fn assistant_reply_gets_feedback_card_with_data_layer() {
    let root = tempfile::tempdir().expect("tempdir");
    let hooks = Arc::new(RecordingHooks::replying_in_run("answer"));
    let bot = bot(
        hooks,
        Some(Arc::new(RecordingDataLayer::default())),
        root.path(),
    );

    let (turn, channel) = recording_turn(inbound_message("question"));
    bot.on_turn(&turn).await.expect("turn");

    let sent = channel.sent();
    let reply = sent.last().expect("reply");
    assert_eq!(reply.text.as_deref(), Some("answer"));
    let attachments = reply.attachments.as_ref().expect("feedback card");
    assert_eq!(
        attachments[0].content_type.as_deref(),
        Some(HERO_CARD_CONTENT_TYPE)
    );
}

#[tokio::test]
async fn assistant_reply_elements_follow_the_message() {
    let root = tempfile::tempdir().expect("tempdir");
    let hooks = Arc::new(
        RecordingHooks::replying("see chart").with_reply_elements(vec![Element::from_url(
            "chart",
            "https://files.example/chart",
            Some("image/png".to_owned()),
        )]),
    );
    let bot = bot(hooks, None, root.path());

    let (turn, channel) = recording_turn(inbound_message("plot it"));
    bot.on_turn(&turn).await.expect("turn");

    let sent = channel.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].text.as_deref(), Some("see chart"));
    let attachment = &sent[2].attachments.as_ref().expect("element attachment")[0];
    assert_eq!(
        attachment.content_url.as_deref(),
        Some("https://files.example/chart")
    );
    assert_eq!(attachment.name.as_deref(), Some("chart.png"));
}

#[tokio::test]
async fn edited_reply_is_sent_again() {
    let root = tempfile::tempdir().expect("tempdir");
    let hooks = Arc::new(RecordingHooks::replying("draft").with_edited_reply("final answer"));
    let bot = bot(hooks, None, root.path());

    let (turn, channel) = recording_turn(inbound_message("question"));
    bot.on_turn(&turn).await.expect("turn");

    let texts: Vec<Option<String>> = channel
        .sent()
        .iter()
        .skip(1)
        .map(|a| a.text.clone())
        .collect();
    assert_eq!(
        texts,
        vec![Some("draft".to_owned()), Some("final answer".to_owned())]
    );
    assert!(channel.updated().is_empty());
}

#[tokio::test]
async fn thread_is_named_and_stored_for_persisted_user() {
    let root = tempfile::tempdir().expect("tempdir");
    let data_layer = Arc::new(RecordingDataLayer::default());
    let bot = bot(
        Arc::new(RecordingHooks::default()),
        Some(data_layer.clone()),
        root.path(),
    );

    let (turn, _channel) = recording_turn(inbound_message("hello"));
    bot.on_turn(&turn).await.expect("turn");

    let today = Local::now().date_naive();
    let threads = data_layer.threads();
    assert_eq!(threads.len(), 1);
    let thread = &threads[0];
    assert_eq!(
        thread.thread_id,
        derive_thread_id(CONVERSATION_ID, today).to_string()
    );
    assert_eq!(
        thread.name,
        format!("Ada Lovelace Teams DM {}", today.format("%Y-%m-%d"))
    );
    assert_eq!(thread.user_id, "db-msagents_Ada Lovelace");
    assert_eq!(thread.metadata["client_type"], "msagents");
    assert_eq!(thread.metadata["thread_id"], json!(thread.thread_id));
    assert_eq!(
        thread.metadata["user_session"]["conversation_id"],
        CONVERSATION_ID
    );
}

#[tokio::test]
async fn same_conversation_same_day_shares_thread() {
    let root = tempfile::tempdir().expect("tempdir");
    let data_layer = Arc::new(RecordingDataLayer::default());
    let bot = bot(
        Arc::new(RecordingHooks::default()),
        Some(data_layer.clone()),
        root.path(),
    );

    for text in ["one", "two"] {
        let (turn, _channel) = recording_turn(inbound_message(text));
        bot.on_turn(&turn).await.expect("turn");
    }

    let threads = data_layer.threads();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].thread_id, threads[1].thread_id);
    assert_eq!(data_layer.user_calls(), 1);
}

#[tokio::test]
async fn anonymous_user_thread_is_not_stored() {
    let root = tempfile::tempdir().expect("tempdir");
    let data_layer = Arc::new(RecordingDataLayer::default());
    data_layer.anonymous_users.store(true, Ordering::SeqCst);
    let hooks = Arc::new(RecordingHooks::default());
    let bot = bot(hooks.clone(), Some(data_layer.clone()), root.path());

    let (turn, _channel) = recording_turn(inbound_message("hello"));
    bot.on_turn(&turn).await.expect("turn");

    assert_eq!(hooks.events().len(), 3);
    assert!(data_layer.threads().is_empty());
}

#[tokio::test]
async fn thread_update_failure_does_not_fail_turn() {
    let root = tempfile::tempdir().expect("tempdir");
    let data_layer = Arc::new(RecordingDataLayer::default());
    data_layer.fail_threads.store(true, Ordering::SeqCst);
    let bot = bot(
        Arc::new(RecordingHooks::replying("ok")),
        Some(data_layer),
        root.path(),
    );

    let (turn, channel) = recording_turn(inbound_message("hello"));
    bot.on_turn(&turn).await.expect("turn");
    assert_eq!(channel.sent().len(), 2);
}

#[tokio::test]
async fn attachments_reach_hook_and_session_files_are_removed() {
    let root = tempfile::tempdir().expect("tempdir");
    let hooks = Arc::new(RecordingHooks::default());
    let bot = bot(hooks.clone(), None, root.path());

    let url = serve_bytes("200 OK", "application/pdf", b"%PDF-1.7 body".to_vec()).await;
    let inbound = Activity {
        attachments: Some(vec![Attachment {
            content_type: Some(FILE_DOWNLOAD_INFO_CONTENT_TYPE.to_owned()),
            content: Some(json!({ "downloadUrl": url })),
            name: Some("minutes.pdf".to_owned()),
            ..Attachment::default()
        }]),
        ..inbound_message("see attached")
    };

    let (turn, _channel) = recording_turn(inbound);
    bot.on_turn(&turn).await.expect("turn");

    assert_eq!(
        hooks.events(),
        vec!["start", "message:Ada Lovelace:see attached:1", "end"]
    );
    let files_dir = hooks
        .seen_files_dir
        .lock()
        .ok()
        .and_then(|dir| dir.clone())
        .expect("files dir recorded");
    assert!(files_dir.starts_with(root.path()));
    assert!(!files_dir.exists());
}

#[tokio::test]
async fn hook_failure_propagates_and_session_is_torn_down() {
    let root = tempfile::tempdir().expect("tempdir");
    let hooks = Arc::new(RecordingHooks::failing());
    let data_layer = Arc::new(RecordingDataLayer::default());
    let bot = bot(hooks.clone(), Some(data_layer.clone()), root.path());

    let url = serve_bytes("200 OK", "text/plain", b"notes".to_vec()).await;
    let inbound = Activity {
        attachments: Some(vec![Attachment {
            content_type: Some(FILE_DOWNLOAD_INFO_CONTENT_TYPE.to_owned()),
            content: Some(json!({ "downloadUrl": url })),
            name: Some("notes.txt".to_owned()),
            ..Attachment::default()
        }]),
        ..inbound_message("boom")
    };

    let (turn, _channel) = recording_turn(inbound);
    match bot.on_turn(&turn).await {
        Err(TurnError::Hook(e)) => assert!(e.to_string().contains("handler exploded")),
        other => panic!("expected hook error, got {other:?}"),
    }

    assert_eq!(hooks.events(), vec!["start", "message:Ada Lovelace:boom:1"]);
    assert!(data_layer.threads().is_empty());
    let files_dir = hooks
        .seen_files_dir
        .lock()
        .ok()
        .and_then(|dir| dir.clone())
        .expect("files dir recorded");
    assert!(!files_dir.exists());
}

#[tokio::test]
async fn non_message_activity_is_ignored() {
    let root = tempfile::tempdir().expect("tempdir");
    let hooks = Arc::new(RecordingHooks::default());
    let data_layer = Arc::new(RecordingDataLayer::default());
    let bot = bot(hooks.clone(), Some(data_layer.clone()), root.path());

    let update = Activity {
        kind: ActivityType::ConversationUpdate,
        text: None,
        ..inbound_message("")
    };
    let (turn, channel) = recording_turn(update);
    bot.on_turn(&turn).await.expect("turn");

    assert!(channel.calls().is_empty());
    assert!(hooks.events().is_empty());
    assert_eq!(data_layer.user_calls(), 0);
}
