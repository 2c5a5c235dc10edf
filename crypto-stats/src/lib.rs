use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cached::proc_macro::cached;
use guardbot_common::bot_commands::{MessageCommand, TgCommand};
use guardbot_common::guard::{GuardBotModule, GuardState};
use guardbot_common::scheduler::{JobKey, StartOutcome};
use guardbot_common::teloxide::prelude::{ChatId, UserId};
use guardbot_common::teloxide::types::{InlineKeyboardMarkup, Message};
use guardbot_common::teloxide::utils::markdown;
use guardbot_common::tgbot::{BotData, MustAnswerCallbackQuery, TgCallbackContext};
use guardbot_common::utils::chat::check_admin_permission_in_chat;
use guardbot_common::utils::requests::get_reqwest_client;
use rand::seq::SliceRandom;
use serde::Deserialize;

const AUTO_POSTS_INTERVAL: Duration = Duration::from_secs(600);
const AUTO_POSTS_FIRST_DELAY: Duration = Duration::from_secs(10);
const TOP_CRYPTOS_LIMIT: usize = 5;

const CRYPTO_PHRASES: &[&str] = &[
    "🚀 The future is decentralized.",
    "💡 Knowledge is your best investment in the crypto world.",
    "🔐 Never share your private keys. Security comes first!",
    "🌍 Blockchain knows no borders.",
    "📈 Bitcoin is not just money; it's a revolution.",
    "⏳ Patience pays more than leverage.",
    "🔍 DYOR: do your own research, always.",
    "🛑 Never invest more than you can afford to lose.",
    "🌞 Innovation never sleeps in the crypto world.",
    "🌱 Start small, grow with wisdom.",
    "🚀 Crypto: More than a market, it's a movement.",
];

pub struct CryptoStatsModule {
    state: Arc<GuardState>,
    cmc_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CmcListings {
    data: Vec<CmcCrypto>,
}

#[derive(Debug, Clone, Deserialize)]
struct CmcCrypto {
    name: String,
    symbol: String,
    quote: CmcQuote,
}

#[derive(Debug, Clone, Deserialize)]
struct CmcQuote {
    #[serde(rename = "USD")]
    usd: CmcUsdQuote,
}

#[derive(Debug, Clone, Deserialize)]
struct CmcUsdQuote {
    price: f64,
}

#[cached(time = 60, result = true)]
async fn get_top_cryptos(api_key: String, limit: usize) -> Result<Vec<CmcCrypto>, anyhow::Error> {
    let response = get_reqwest_client()
        .get("https://pro-api.coinmarketcap.com/v1/cryptocurrency/listings/latest")
        .header("X-CMC_PRO_API_KEY", api_key)
        .query(&[
            ("start", "1".to_string()),
            ("limit", limit.to_string()),
            ("convert", "USD".to_string()),
        ])
        .send()
        .await?
        .error_for_status()?;
    let listings: CmcListings = response.json().await?;
    Ok(listings.data)
}

fn format_top_cryptos(cryptos: &[CmcCrypto]) -> String {
    let mut message = format!("*📊 Top {} Cryptocurrencies:*\n\n", cryptos.len());
    for crypto in cryptos {
        message.push_str(&format!(
            "• *{} \\({}\\)*: {}\n",
            markdown::escape(&crypto.name),
            markdown::escape(&crypto.symbol),
            markdown::escape(&format!("${:.2}", crypto.quote.usd.price)),
        ));
    }
    message
}

impl CryptoStatsModule {
    pub fn new(state: Arc<GuardState>, cmc_api_key: Option<String>) -> Self {
        Self { state, cmc_api_key }
    }

    async fn send_top_cryptos(&self, bot: &BotData, chat_id: ChatId) -> Result<(), anyhow::Error> {
        let Some(api_key) = self.cmc_api_key.clone() else {
            bot.send_text_message(
                chat_id,
                "❌ Cryptocurrency data is not configured\\.".to_string(),
                InlineKeyboardMarkup::default(),
            )
            .await?;
            return Ok(());
        };
        match get_top_cryptos(api_key, TOP_CRYPTOS_LIMIT).await {
            Ok(cryptos) if !cryptos.is_empty() => {
                bot.send_text_message(
                    chat_id,
                    format_top_cryptos(&cryptos),
                    InlineKeyboardMarkup::default(),
                )
                .await?;
            }
            Ok(_) => {
                bot.send_text_message(
                    chat_id,
                    "❌ No cryptocurrency data found\\.".to_string(),
                    InlineKeyboardMarkup::default(),
                )
                .await?;
            }
            Err(err) => {
                log::warn!("Failed to fetch cryptocurrency data: {err:?}");
                bot.send_text_message(
                    chat_id,
                    "❌ Failed to fetch cryptocurrency data\\. Please try again later\\."
                        .to_string(),
                    InlineKeyboardMarkup::default(),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn handle_start_auto_posts(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !check_admin_permission_in_chat(bot, chat_id, user_id).await {
            bot.send_text_message(
                chat_id,
                "❌ This command is restricted to administrators\\.".to_string(),
                InlineKeyboardMarkup::default(),
            )
            .await?;
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        let bot_id = bot.id();
        let outcome = self.state.scheduler().start(
            JobKey::PhraseBroadcast(chat_id),
            AUTO_POSTS_FIRST_DELAY,
            AUTO_POSTS_INTERVAL,
            move || {
                let state = Arc::clone(&state);
                async move {
                    let phrase = {
                        let mut rng = rand::thread_rng();
                        CRYPTO_PHRASES.choose(&mut rng).copied().unwrap_or_default()
                    };
                    let Some(bot) = state.bot(&bot_id) else {
                        return;
                    };
                    if let Err(err) = bot
                        .send_text_message(
                            chat_id,
                            markdown::escape(phrase),
                            InlineKeyboardMarkup::default(),
                        )
                        .await
                    {
                        log::warn!("Error sending random crypto phrase: {err:?}");
                    }
                }
            },
        );
        let message = match outcome {
            StartOutcome::AlreadyRunning => "🔔 Auto\\-posting is already running\\!",
            StartOutcome::Started => "🔔 Auto\\-posting of crypto phrases has been started\\!",
        };
        bot.send_text_message(chat_id, message.to_string(), InlineKeyboardMarkup::default())
            .await?;
        Ok(())
    }

    async fn handle_stop_auto_posts(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !check_admin_permission_in_chat(bot, chat_id, user_id).await {
            bot.send_text_message(
                chat_id,
                "❌ This command is restricted to administrators\\.".to_string(),
                InlineKeyboardMarkup::default(),
            )
            .await?;
            return Ok(());
        }
        let message = if self
            .state
            .scheduler()
            .stop(&JobKey::PhraseBroadcast(chat_id))
        {
            "🔕 Auto\\-posting has been stopped\\!"
        } else {
            "❌ No auto\\-posting is currently running\\!"
        };
        bot.send_text_message(chat_id, message.to_string(), InlineKeyboardMarkup::default())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GuardBotModule for CryptoStatsModule {
    fn name(&self) -> &'static str {
        "CryptoStats"
    }

    async fn handle_message(
        &self,
        bot: &BotData,
        user_id: Option<UserId>,
        chat_id: ChatId,
        command: MessageCommand,
        text: &str,
        _message: &Message,
    ) -> Result<(), anyhow::Error> {
        let Some(user_id) = user_id else {
            return Ok(());
        };
        if !matches!(command, MessageCommand::None) {
            return Ok(());
        }
        match text.split_whitespace().next() {
            Some("/top_cryptos") => self.send_top_cryptos(bot, chat_id).await?,
            Some("/start_auto_posts") => {
                self.handle_start_auto_posts(bot, chat_id, user_id).await?
            }
            Some("/stop_auto_posts") => self.handle_stop_auto_posts(bot, chat_id, user_id).await?,
            _ => {}
        }
        Ok(())
    }

    async fn handle_callback<'a>(
        &'a self,
        ctx: TgCallbackContext<'a>,
        _query: &mut Option<MustAnswerCallbackQuery>,
    ) -> Result<(), anyhow::Error> {
        let Ok(command) = ctx.parse_command() else {
            return Ok(());
        };
        if command == TgCommand::TopCryptos {
            self.send_top_cryptos(ctx.bot(), ctx.chat_id()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_are_rendered_with_two_decimals() {
        let cryptos = vec![CmcCrypto {
            name: "Bitcoin".to_string(),
            symbol: "BTC".to_string(),
            quote: CmcQuote {
                usd: CmcUsdQuote { price: 64123.4567 },
            },
        }];
        let message = format_top_cryptos(&cryptos);
        assert!(message.contains("Bitcoin"));
        assert!(message.contains("64123\\.46"));
    }
}
