pub mod conversation;
pub mod retry;
pub mod session;
pub mod usage;
pub mod user;
pub mod utils;

pub use conversation::PgConversationRepository;
pub use session::PgSessionRepository;
pub use usage::PgUsageRepository;
pub use user::PgUserRepository;
