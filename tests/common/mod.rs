use clover::auth::{AuthSession, AuthUser};
use clover::config::Config;
use clover::SessionContext;
use serde_json::{json, Value};

/// Configuration pointing every service at the mock server
#[allow(dead_code)]
pub fn config_for(server_uri: &str) -> Config {
    let mut config = Config::default();
    config.supabase.url = server_uri.to_string();
    config.supabase.anon_key = "test-anon-key".to_string();
    config.backend.base_url = format!("{}/api", server_uri);
    config.backend.timeout_seconds = 5;
    config
}

/// A session for user `u-1` holding token `jwt-1`
#[allow(dead_code)]
pub fn session() -> AuthSession {
    AuthSession {
        access_token: "jwt-1".to_string(),
        refresh_token: None,
        expires_at: None,
        user: AuthUser {
            id: "u-1".to_string(),
            email: Some("sam@example.com".to_string()),
        },
    }
}

#[allow(dead_code)]
pub fn context() -> SessionContext {
    SessionContext::new(session())
}

/// Conversation record as the store returns it
#[allow(dead_code)]
pub fn conversation_json(id: &str, name: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": updated_at,
        "agent_config": {"system_prompt": "You are a helpful assistant.", "temperature": 0.4}
    })
}

/// Turn record as the store returns it
#[allow(dead_code)]
pub fn turn_json(user: &str, assistant: Option<&str>) -> Value {
    json!({
        "id": 1,
        "conversation_id": "c-1",
        "created_at": "2025-01-01T00:00:05Z",
        "user_message": user,
        "assistant_response": assistant
    })
}
