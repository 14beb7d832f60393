//! Message orchestrator integration tests
//!
//! Drives full sends through the scripted in-process transport and checks
//! the resulting store state.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_core::config::SessionConfig;
use chat_core::model::MessagePayload;
use chat_core::{
    ChatError, ChatUpdate, CompletePayload, ConversationId, ConversationRepository,
    ConversationStore, InMemoryRepository, MessageId, MessageOrchestrator, MessageRole,
    MessageStatus, NewConversation, ScriptedResponse, ScriptedTransport, Settings,
};

type TestOrchestrator = MessageOrchestrator<ScriptedTransport, InMemoryRepository>;

fn orchestrator(responses: Vec<ScriptedResponse>) -> TestOrchestrator {
    orchestrator_with(responses, SessionConfig::default())
}

fn orchestrator_with(responses: Vec<ScriptedResponse>, session: SessionConfig) -> TestOrchestrator {
    MessageOrchestrator::new(
        ScriptedTransport::new(responses),
        InMemoryRepository::new(),
        ConversationStore::new().shared(),
        session,
    )
}

fn content(text: &str) -> String {
    format!("data: {{\"type\":\"content\",\"content\":\"{text}\"}}\n")
}

fn complete(id: &str, text: &str) -> String {
    format!(
        "data: {{\"type\":\"complete\",\"data\":{{\"message\":{{\"id\":\"{id}\",\"content\":\"{text}\"}}}}}}\n"
    )
}

const DONE: &str = "data: [DONE]\n";

fn current_id(orch: &TestOrchestrator) -> ConversationId {
    orch.store().lock().current_id().cloned().unwrap()
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_scenario_a_single_completed_message() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([
        content("Hel"),
        content("lo"),
        complete("m1", "Hello"),
        DONE.to_string(),
    ])]);

    let reply = orch.send("hi", None).await.unwrap();
    assert_eq!(reply.id, MessageId::from("m1"));
    assert_eq!(reply.content, "Hello");
    assert_eq!(reply.status, MessageStatus::Completed);

    let store = orch.store().lock();
    let conv = store.current().unwrap();
    let assistants: Vec<_> = conv
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .collect();
    assert_eq!(assistants.len(), 1);
    assert_eq!(assistants[0].id, MessageId::from("m1"));
    assert_eq!(assistants[0].content, "Hello");
    assert_eq!(conv.message_count, 2);
    assert!(store.error().is_none());
    assert!(!store.is_sending());
}

#[tokio::test]
async fn test_scenario_d_creates_conversation_first() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([
        complete("m1", "ok"),
        DONE.to_string(),
    ])]);
    assert!(orch.store().lock().current_id().is_none());

    orch.send("hi", None).await.unwrap();

    let id = current_id(&orch);
    let store = orch.store().lock();
    let conv = store.current().unwrap();
    assert_eq!(conv.title, "hi");
    assert_eq!(conv.messages[0].role, MessageRole::User);
    assert_eq!(conv.messages[0].content, "hi");
    assert!(conv.messages.iter().all(|m| m.conversation_id == id));

    let requests = orch.transport().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].conversation_id, id);
    assert_eq!(requests[0].message, "hi");
    assert!(requests[0].stream);
}

#[tokio::test]
async fn test_second_send_reuses_current_conversation() {
    let orch = orchestrator(vec![
        ScriptedResponse::chunks([complete("m1", "one")]),
        ScriptedResponse::chunks([complete("m2", "two")]),
    ]);

    orch.send("first", None).await.unwrap();
    orch.send("second", None).await.unwrap();

    let store = orch.store().lock();
    assert_eq!(store.conversations().len(), 1);
    let contents: Vec<&str> = store
        .current()
        .unwrap()
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["first", "one", "second", "two"]);
}

#[tokio::test]
async fn test_explicit_conversation_from_repository() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([complete("m1", "ok")])]);
    let existing = orch
        .repository()
        .create(NewConversation {
            title: "Stored".to_string(),
            model: "m".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    orch.send("hi", Some(existing.id.clone())).await.unwrap();

    let store = orch.store().lock();
    let conv = store.conversation(&existing.id).unwrap();
    assert_eq!(conv.title, "Stored");
    assert_eq!(conv.messages.len(), 2);
}

#[tokio::test]
async fn test_complete_without_sentinel_is_success() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([
        content("a"),
        complete("m1", "a"),
    ])]);

    let reply = orch.send("hi", None).await.unwrap();
    assert_eq!(reply.status, MessageStatus::Completed);
}

#[tokio::test]
async fn test_usage_and_conversation_aggregates() {
    let line = concat!(
        "data: {\"type\":\"complete\",\"data\":{",
        "\"message\":{\"id\":\"m1\",\"content\":\"ok\"},",
        "\"conversation\":{\"title\":\"Server Title\",\"messageCount\":2,\"totalTokens\":30,\"totalCost\":0.5},",
        "\"usage\":{\"promptTokens\":10,\"completionTokens\":20,\"totalTokens\":30}",
        "}}\n"
    );
    let orch = orchestrator(vec![ScriptedResponse::chunks([line])]);

    let reply = orch.send("hi", None).await.unwrap();
    assert_eq!(reply.tokens(), 30);

    let store = orch.store().lock();
    let conv = store.current().unwrap();
    assert_eq!(conv.title, "Server Title");
    assert_eq!(conv.message_count, 2);
    assert_eq!(conv.total_tokens, 30);
}

#[tokio::test]
async fn test_usage_without_conversation_recomputes_totals() {
    let line = concat!(
        "data: {\"type\":\"complete\",\"data\":{",
        "\"message\":{\"id\":\"m1\",\"content\":\"ok\"},",
        "\"usage\":{\"totalTokens\":12}",
        "}}\n"
    );
    let orch = orchestrator(vec![ScriptedResponse::chunks([line])]);
    orch.send("hi", None).await.unwrap();

    let store = orch.store().lock();
    assert_eq!(store.current().unwrap().total_tokens, 12);
}

// =============================================================================
// Concatenation law
// =============================================================================

#[tokio::test]
async fn test_placeholder_holds_running_total() {
    let (tx, mut rx) = mpsc::channel(64);
    let orch = orchestrator(vec![ScriptedResponse::hanging([
        content("d1"),
        content("d2"),
        content("d3"),
    ])])
    .with_updates(tx);
    let orch = Arc::new(orch);

    let sender = Arc::clone(&orch);
    let task = tokio::spawn(async move { sender.send("hi", None).await });

    let mut deltas = Vec::new();
    while deltas.len() < 3 {
        if let Some(ChatUpdate::ContentDelta { delta, .. }) = rx.recv().await {
            deltas.push(delta);
        }
    }
    assert_eq!(deltas, vec!["d1", "d2", "d3"]);

    {
        let store = orch.store().lock();
        let placeholder = &store.current().unwrap().messages[1];
        assert_eq!(placeholder.content, "d1d2d3");
        assert_eq!(placeholder.status, MessageStatus::Processing);
    }

    let id = current_id(&orch);
    assert!(orch.cancel(&id));
    let result = task.await.unwrap();
    assert!(matches!(result, Err(ChatError::Cancelled)));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_scenario_c_status_500() {
    let orch = orchestrator(vec![ScriptedResponse::Status(500)]);

    let result = orch.send("hi", None).await;
    assert!(matches!(result, Err(ChatError::Status { status: 500, .. })));

    let store = orch.store().lock();
    let conv = store.current().unwrap();
    assert_eq!(conv.messages.len(), 2);
    assert_eq!(conv.messages[0].content, "hi");
    assert_eq!(conv.messages[0].status, MessageStatus::Sent);
    assert_eq!(conv.messages[1].status, MessageStatus::Failed);
    assert_eq!(
        store.error(),
        Some("request failed with status 500 Internal Server Error")
    );
}

#[tokio::test]
async fn test_error_frame_keeps_partial_content() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([
        content("partial"),
        "data: {\"type\":\"error\",\"error\":\"model overloaded\"}\n".to_string(),
        DONE.to_string(),
    ])]);

    let result = orch.send("hi", None).await;
    assert!(matches!(result, Err(ChatError::Protocol(ref r)) if r == "model overloaded"));

    let store = orch.store().lock();
    let conv = store.current().unwrap();
    assert_eq!(conv.messages[0].content, "hi");
    assert_eq!(conv.messages[1].content, "partial");
    assert_eq!(conv.messages[1].status, MessageStatus::Failed);
    assert_eq!(store.error(), Some("model overloaded"));
}

#[tokio::test]
async fn test_unexpected_end_fails_placeholder() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([content("half")])]);

    let result = orch.send("hi", None).await;
    assert!(matches!(result, Err(ChatError::UnexpectedEnd)));

    let store = orch.store().lock();
    let placeholder = &store.current().unwrap().messages[1];
    assert_eq!(placeholder.status, MessageStatus::Failed);
    assert_eq!(placeholder.content, "half");
}

#[tokio::test]
async fn test_bare_sentinel_is_unexpected_end() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([DONE])]);
    let result = orch.send("hi", None).await;
    assert!(matches!(result, Err(ChatError::UnexpectedEnd)));
}

#[tokio::test]
async fn test_connection_drop_mid_stream() {
    let orch = orchestrator(vec![ScriptedResponse::dropping([content("so far")])]);

    let result = orch.send("hi", None).await;
    assert!(matches!(result, Err(ChatError::Interrupted(_))));

    let store = orch.store().lock();
    assert_eq!(
        store.current().unwrap().messages[1].status,
        MessageStatus::Failed
    );
    assert!(store.error().unwrap().contains("connection interrupted"));
}

#[tokio::test]
async fn test_malformed_frame_does_not_fail_send() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([
        content("a"),
        "data: {broken\n".to_string(),
        complete("m1", "a"),
    ])]);

    let reply = orch.send("hi", None).await.unwrap();
    assert_eq!(reply.content, "a");
    assert!(orch.store().lock().error().is_none());
}

#[tokio::test]
async fn test_new_send_clears_previous_error() {
    let orch = orchestrator(vec![
        ScriptedResponse::Status(502),
        ScriptedResponse::chunks([complete("m2", "ok")]),
    ]);

    assert!(orch.send("one", None).await.is_err());
    assert!(orch.store().lock().error().is_some());

    orch.send("two", None).await.unwrap();
    let store = orch.store().lock();
    assert!(store.error().is_none());
    // The failed exchange stays visible
    assert_eq!(store.current().unwrap().messages.len(), 4);
}

// =============================================================================
// Concurrency and cancellation
// =============================================================================

#[tokio::test]
async fn test_second_send_rejected_while_in_flight() {
    let (tx, mut rx) = mpsc::channel(64);
    let orch = Arc::new(
        orchestrator(vec![ScriptedResponse::hanging([content("x")])]).with_updates(tx),
    );

    let sender = Arc::clone(&orch);
    let first = tokio::spawn(async move { sender.send("first", None).await });

    // Wait until the first stream is delivering
    loop {
        if let Some(ChatUpdate::ContentDelta { .. }) = rx.recv().await {
            break;
        }
    }

    let id = current_id(&orch);
    assert!(orch.is_in_flight(&id));
    let second = orch.send("second", Some(id.clone())).await;
    assert!(matches!(second, Err(ChatError::SendInFlight(ref c)) if *c == id));

    // The rejected send left no trace
    assert_eq!(orch.store().lock().current().unwrap().messages.len(), 2);
    assert_eq!(orch.transport().requests().len(), 1);

    orch.cancel(&id);
    assert!(matches!(first.await.unwrap(), Err(ChatError::Cancelled)));
    assert!(!orch.is_in_flight(&id));
}

#[tokio::test]
async fn test_caller_token_cancels_send() {
    let orch = Arc::new(orchestrator(vec![ScriptedResponse::hanging([content(
        "partial",
    )])]));
    let cancel = CancellationToken::new();

    let sender = Arc::clone(&orch);
    let token = cancel.clone();
    let task = tokio::spawn(async move { sender.send_with_cancel("hi", None, token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ChatError::Cancelled)));

    let store = orch.store().lock();
    assert_eq!(
        store.current().unwrap().messages[1].status,
        MessageStatus::Failed
    );
    assert_eq!(store.error(), Some("send cancelled"));
    assert!(!store.is_sending());
}

#[tokio::test]
async fn test_cancelled_before_open() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([complete("m1", "never")])]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orch.send_with_cancel("hi", None, cancel).await;
    assert!(matches!(result, Err(ChatError::Cancelled)));
    assert!(orch.transport().requests().is_empty());
}

#[tokio::test]
async fn test_delete_cancels_in_flight_send() {
    let (tx, mut rx) = mpsc::channel(64);
    let orch = Arc::new(
        orchestrator(vec![ScriptedResponse::hanging([content("x")])]).with_updates(tx),
    );

    let sender = Arc::clone(&orch);
    let task = tokio::spawn(async move { sender.send("hi", None).await });
    loop {
        if let Some(ChatUpdate::ContentDelta { .. }) = rx.recv().await {
            break;
        }
    }

    let id = current_id(&orch);
    orch.delete_conversation(&id).await.unwrap();

    assert!(matches!(task.await.unwrap(), Err(ChatError::Cancelled)));
    let store = orch.store().lock();
    assert!(store.conversations().is_empty());
    assert!(store.current_id().is_none());
}

#[tokio::test]
async fn test_dropped_send_fails_placeholder() {
    let (tx, mut rx) = mpsc::channel(64);
    let orch = orchestrator(vec![ScriptedResponse::hanging([content("par")])]).with_updates(tx);

    // Abandoned without touching any cancellation token
    let outcome = tokio::time::timeout(Duration::from_millis(50), orch.send("hi", None)).await;
    assert!(outcome.is_err());

    let id = current_id(&orch);
    assert!(!orch.is_in_flight(&id));
    {
        let store = orch.store().lock();
        let conv = store.current().unwrap();
        assert_eq!(conv.messages[0].status, MessageStatus::Sent);
        assert_eq!(conv.messages[0].content, "hi");
        assert_eq!(conv.messages[1].status, MessageStatus::Failed);
        assert_eq!(conv.messages[1].content, "par");
        assert_eq!(store.error(), Some("send cancelled"));
        assert!(!store.is_sending());
    }

    let mut failed = None;
    while let Ok(update) = rx.try_recv() {
        if let ChatUpdate::MessageFailed { reason, .. } = update {
            failed = Some(reason);
        }
    }
    assert_eq!(failed.as_deref(), Some("send cancelled"));
}

#[tokio::test]
async fn test_slot_reusable_after_dropped_send() {
    let orch = orchestrator(vec![
        ScriptedResponse::hanging([content("par")]),
        ScriptedResponse::chunks([complete("m2", "again"), DONE.to_string()]),
    ]);

    let outcome = tokio::time::timeout(Duration::from_millis(50), orch.send("hi", None)).await;
    assert!(outcome.is_err());

    let reply = orch.send("retry", None).await.unwrap();
    assert_eq!(reply.id, MessageId::from("m2"));
    assert!(orch.store().lock().error().is_none());
}

// =============================================================================
// Completion payload edge cases
// =============================================================================

fn complete_with(message_json: &str) -> String {
    format!("data: {{\"type\":\"complete\",\"data\":{{\"message\":{message_json}}}}}\n")
}

#[tokio::test]
async fn test_complete_with_non_final_status_is_completed() {
    for status in ["sent", "sending", "processing"] {
        let orch = orchestrator(vec![ScriptedResponse::chunks([complete_with(&format!(
            r#"{{"id":"m1","content":"ok","status":"{status}"}}"#
        ))])]);

        let reply = orch.send("hi", None).await.unwrap();
        assert_eq!(reply.status, MessageStatus::Completed, "status {status}");

        let store = orch.store().lock();
        let conv = store.current().unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[1].status, MessageStatus::Completed);
        assert!(store.error().is_none());
    }
}

#[tokio::test]
async fn test_complete_with_failed_status_is_success() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([complete_with(
        r#"{"id":"m1","content":"ok","status":"failed"}"#,
    )])]);

    let reply = orch.send("hi", None).await.unwrap();
    assert_eq!(reply.status, MessageStatus::Completed);

    let store = orch.store().lock();
    assert_eq!(
        store.current().unwrap().messages[1].status,
        MessageStatus::Completed
    );
    assert!(store.error().is_none());
}

#[tokio::test]
async fn test_complete_with_user_role_fails_placeholder() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([
        content("part"),
        complete_with(r#"{"id":"m1","content":"ok","role":"user"}"#),
    ])]);

    let result = orch.send("hi", None).await;
    assert!(matches!(result, Err(ChatError::RoleChanged(_))));

    let id = current_id(&orch);
    assert!(!orch.is_in_flight(&id));
    let store = orch.store().lock();
    let conv = store.current().unwrap();
    assert_eq!(conv.messages.len(), 2);
    assert_eq!(conv.messages[0].role, MessageRole::User);
    assert_eq!(conv.messages[0].status, MessageStatus::Sent);
    assert_eq!(conv.messages[1].role, MessageRole::Assistant);
    assert_eq!(conv.messages[1].status, MessageStatus::Failed);
    assert_eq!(conv.messages[1].content, "part");
    assert!(store.error().is_some());
}

// =============================================================================
// Non-streaming variant
// =============================================================================

#[tokio::test]
async fn test_non_streaming_send() {
    let session = SessionConfig {
        stream: false,
        ..Default::default()
    };
    let payload = CompletePayload {
        message: MessagePayload {
            id: Some(MessageId::from("m1")),
            content: Some("whole reply".to_string()),
            ..Default::default()
        },
        conversation: None,
        usage: None,
    };
    let orch = orchestrator_with(vec![ScriptedResponse::Complete(payload)], session);

    let reply = orch.send("hi", None).await.unwrap();
    assert_eq!(reply.content, "whole reply");
    assert_eq!(reply.status, MessageStatus::Completed);
    assert!(!orch.transport().requests()[0].stream);
}

#[tokio::test]
async fn test_non_streaming_status_error() {
    let session = SessionConfig {
        stream: false,
        ..Default::default()
    };
    let orch = orchestrator_with(vec![ScriptedResponse::Status(401)], session);

    let result = orch.send("hi", None).await;
    assert!(matches!(result, Err(ChatError::Status { status: 401, .. })));
    let store = orch.store().lock();
    assert_eq!(
        store.current().unwrap().messages[1].status,
        MessageStatus::Failed
    );
}

// =============================================================================
// Conversation operations
// =============================================================================

#[tokio::test]
async fn test_load_select_rename() {
    let orch = orchestrator(vec![]);
    let a = orch
        .repository()
        .create(NewConversation {
            title: "A".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(orch.load_conversations().await.unwrap(), 1);
    assert!(!orch.store().lock().is_loading());

    orch.select_conversation(&a.id).await.unwrap();
    orch.rename_conversation(&a.id, "Renamed").await.unwrap();

    assert_eq!(orch.store().lock().current().unwrap().title, "Renamed");
    let stored = orch.repository().get(&a.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Renamed");
}

#[tokio::test]
async fn test_select_unknown_conversation() {
    let orch = orchestrator(vec![]);
    let result = orch.select_conversation(&ConversationId::from("ghost")).await;
    assert!(matches!(result, Err(ChatError::ConversationNotFound(_))));
}

#[tokio::test]
async fn test_update_settings_merges_and_persists() {
    let orch = orchestrator(vec![ScriptedResponse::chunks([complete("m1", "ok")])]);
    orch.send("hi", None).await.unwrap();

    let mut settings = Settings::new();
    settings.insert("temperature".to_string(), serde_json::json!(0.2));
    orch.update_settings(settings).await.unwrap();

    let id = current_id(&orch);
    let stored = orch.repository().get(&id).await.unwrap().unwrap();
    assert_eq!(stored.settings["temperature"], serde_json::json!(0.2));
}

#[tokio::test]
async fn test_update_settings_without_current() {
    let orch = orchestrator(vec![]);
    let result = orch.update_settings(Settings::new()).await;
    assert!(matches!(result, Err(ChatError::NoActiveConversation)));
}

#[tokio::test]
async fn test_update_feed_order() {
    let (tx, mut rx) = mpsc::channel(64);
    let orch = orchestrator(vec![ScriptedResponse::chunks([
        content("Hi"),
        complete("m1", "Hi"),
    ])])
    .with_updates(tx);

    orch.send("hello", None).await.unwrap();
    drop(orch);

    let mut kinds = Vec::new();
    while let Some(update) = rx.recv().await {
        kinds.push(match update {
            ChatUpdate::MessageAdded { .. } => "added",
            ChatUpdate::ContentDelta { .. } => "delta",
            ChatUpdate::MessageCompleted { .. } => "completed",
            ChatUpdate::MessageFailed { .. } => "failed",
        });
    }
    assert_eq!(kinds, vec!["added", "added", "delta", "completed"]);
}
