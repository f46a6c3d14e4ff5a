mod common;

use common::*;
use services::conversations::{ConversationId, ConversationRepository, Message};

#[tokio::test]
async fn test_health_and_openapi_are_public() {
    let ctx = setup_test_server().await;

    let health = ctx.server.get("/health").await;
    assert_eq!(health.status_code(), 200);
    assert_eq!(health.json::<serde_json::Value>()["status"], "ok");

    let spec = ctx.server.get("/openapi.json").await;
    assert_eq!(spec.status_code(), 200);
    let spec = spec.json::<serde_json::Value>();
    for path in ["/chat", "/chats", "/chats/{chat_id}", "/health"] {
        assert!(spec["paths"].get(path).is_some(), "missing {path}");
    }
}

#[tokio::test]
async fn test_list_chats_requires_auth() {
    let ctx = setup_test_server().await;
    let response = ctx.server.get("/chats").await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_list_chats_returns_only_own_most_recent_first() {
    let ctx = setup_test_server().await;
    let other = ctx.add_user("other-token", false).await;

    let older = ConversationId::new();
    let newer = ConversationId::new();
    ctx.conversations
        .create(older, ctx.user.id, "Older".to_string(), vec![])
        .await
        .unwrap();
    ctx.conversations
        .create(newer, ctx.user.id, "Newer".to_string(), vec![])
        .await
        .unwrap();
    ctx.conversations
        .create(ConversationId::new(), other.id, "Theirs".to_string(), vec![])
        .await
        .unwrap();

    let response = ctx
        .server
        .get("/chats")
        .add_header("Authorization", bearer(SESSION_TOKEN))
        .await;
    assert_eq!(response.status_code(), 200);

    let body = response.json::<serde_json::Value>();
    assert_eq!(body["object"], "list");
    let titles: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|chat| chat["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Newer", "Older"]);

    // Touching the older chat moves it to the front
    ctx.conversations
        .replace_all(
            older,
            ctx.user.id,
            "Older, updated".to_string(),
            vec![Message::user_text("again")],
        )
        .await
        .unwrap();
    let body = ctx
        .server
        .get("/chats")
        .add_header("Authorization", bearer(SESSION_TOKEN))
        .await
        .json::<serde_json::Value>();
    assert_eq!(body["data"][0]["id"], older.to_string());
}

#[tokio::test]
async fn test_get_chat_returns_messages_in_order() {
    let ctx = setup_test_server().await;
    let chat_id = ConversationId::new();
    ctx.conversations
        .create(
            chat_id,
            ctx.user.id,
            "Pinned".to_string(),
            vec![Message::user_text("first"), Message::user_text("second")],
        )
        .await
        .unwrap();

    let response = ctx
        .server
        .get(&format!("/chats/{chat_id}"))
        .add_header("Authorization", bearer(SESSION_TOKEN))
        .await;
    assert_eq!(response.status_code(), 200);

    let body = response.json::<serde_json::Value>();
    assert_eq!(body["id"], chat_id.to_string());
    assert_eq!(body["title"], "Pinned");
    let texts: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|message| message["parts"][0]["text"].as_str())
        .collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn test_get_chat_hides_foreign_and_unknown_chats() {
    let ctx = setup_test_server().await;
    let other = ctx.add_user("other-token", false).await;
    let theirs = ConversationId::new();
    ctx.conversations
        .create(theirs, other.id, "Theirs".to_string(), vec![])
        .await
        .unwrap();

    for id in [theirs, ConversationId::new()] {
        let response = ctx
            .server
            .get(&format!("/chats/{id}"))
            .add_header("Authorization", bearer(SESSION_TOKEN))
            .await;
        assert_eq!(response.status_code(), 404);
    }

    let owner_view = ctx
        .server
        .get(&format!("/chats/{theirs}"))
        .add_header("Authorization", bearer("other-token"))
        .await;
    assert_eq!(owner_view.status_code(), 200);
}

#[tokio::test]
async fn test_get_chat_rejects_malformed_id() {
    let ctx = setup_test_server().await;
    let response = ctx
        .server
        .get("/chats/not-a-uuid")
        .add_header("Authorization", bearer(SESSION_TOKEN))
        .await;
    assert_eq!(response.status_code(), 400);
}
