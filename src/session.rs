//! Caller-owned state of one signed-in user

use crate::auth::AuthSession;
use crate::models::{Conversation, Message};

/// Per-user session state
///
/// Holds the auth session, the currently selected conversation, and the
/// message log shown for it. Every client operation takes the context
/// explicitly; nothing is kept in globals.
///
/// # Examples
///
/// ```
/// use clover::auth::{AuthSession, AuthUser};
/// use clover::session::SessionContext;
///
/// let auth = AuthSession {
///     access_token: "jwt".to_string(),
///     refresh_token: None,
///     expires_at: None,
///     user: AuthUser { id: "u-1".to_string(), email: None },
/// };
/// let ctx = SessionContext::new(auth);
/// assert!(ctx.selected().is_none());
/// assert!(ctx.messages().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct SessionContext {
    auth: AuthSession,
    selected: Option<Conversation>,
    messages: Vec<Message>,
}

impl SessionContext {
    /// Start a session with nothing selected
    pub fn new(auth: AuthSession) -> Self {
        Self {
            auth,
            selected: None,
            messages: Vec::new(),
        }
    }

    /// The auth session this context was created from
    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// Bearer token for remote calls
    pub fn token(&self) -> &str {
        &self.auth.access_token
    }

    /// Identifier of the signed-in user
    pub fn user_id(&self) -> &str {
        &self.auth.user.id
    }

    /// Currently selected conversation
    pub fn selected(&self) -> Option<&Conversation> {
        self.selected.as_ref()
    }

    /// Identifier of the selected conversation
    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|c| c.id.as_str())
    }

    /// Returns `true` when `conversation_id` is the selected conversation
    pub fn is_selected(&self, conversation_id: &str) -> bool {
        self.selected_id() == Some(conversation_id)
    }

    /// Message log of the selected conversation
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn selected_mut(&mut self) -> Option<&mut Conversation> {
        self.selected.as_mut()
    }

    pub(crate) fn select(&mut self, conversation: Conversation, messages: Vec<Message>) {
        self.selected = Some(conversation);
        self.messages = messages;
    }

    /// Drop the selection and empty the log
    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.messages.clear();
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use chrono::Utc;

    fn ctx() -> SessionContext {
        SessionContext::new(AuthSession {
            access_token: "jwt-1".to_string(),
            refresh_token: None,
            expires_at: None,
            user: AuthUser {
                id: "u-1".to_string(),
                email: Some("a@example.com".to_string()),
            },
        })
    }

    fn convo(id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            name: "n".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            agent_config: Default::default(),
        }
    }

    #[test]
    fn test_accessors() {
        let ctx = ctx();
        assert_eq!(ctx.token(), "jwt-1");
        assert_eq!(ctx.user_id(), "u-1");
        assert_eq!(ctx.auth().user_label(), "a@example.com");
    }

    #[test]
    fn test_select_and_clear() {
        let mut ctx = ctx();
        ctx.select(convo("c-1"), vec![Message::user("hi")]);
        assert!(ctx.is_selected("c-1"));
        assert!(!ctx.is_selected("c-2"));
        assert_eq!(ctx.messages().len(), 1);

        ctx.push_message(Message::assistant("hello"));
        assert_eq!(ctx.messages().len(), 2);

        ctx.clear_selection();
        assert!(ctx.selected().is_none());
        assert!(ctx.messages().is_empty());
    }
}
