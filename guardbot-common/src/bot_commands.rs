use serde::{Deserialize, Serialize};

/// Payloads of inline keyboard buttons.
///
/// Serialized with `serde_json` straight into the callback data, so every
/// variant must stay within Telegram's 64-byte callback data limit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum TgCommand {
    OpenMainMenu,
    RaidHelp,
    AboutBot,
    TopCryptos,
    ListRaids,
    JoinRaid(i64),
    ConfirmDeleteAllRaids,
    CancelDeleteAllRaids,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum MessageCommand {
    None,
    Start(String),
}
