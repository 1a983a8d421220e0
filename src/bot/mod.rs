//! The bot: per-user sessions, command handlers, and the Telegram adapter.

pub mod audio;
pub mod command;
pub mod handlers;
pub mod keyboard;
pub mod rate_limit;
pub mod reply;
pub mod resources;
pub mod router;
pub mod session;
pub mod telegram;

#[cfg(any(test, feature = "integ_test"))]
pub mod testing;

pub use command::Command;
pub use handlers::Context;
pub use reply::{Outbound, Reply};
pub use router::{Event, dispatch};
pub use session::{Session, SessionStore};
pub use telegram::TelegramClient;
