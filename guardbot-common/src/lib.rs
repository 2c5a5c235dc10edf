pub mod bot_commands;
pub mod guard;
pub mod scheduler;
pub mod tgbot;
pub mod utils;

pub use rusqlite;
pub use teloxide;
