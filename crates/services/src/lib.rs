pub mod auth;
pub mod chat;
pub mod common;
pub mod conversations;
pub mod quota;
pub mod tools;

#[cfg(any(test, feature = "test-mocks"))]
pub mod test_utils;

pub use auth::{User, UserId};
pub use chat::ChatServiceImpl as ChatService;
pub use conversations::service::ConversationServiceImpl as ConversationService;
pub use quota::QuotaServiceImpl as QuotaService;
