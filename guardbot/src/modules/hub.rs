use async_trait::async_trait;
use guardbot_common::bot_commands::{MessageCommand, TgCommand};
use guardbot_common::guard::GuardBotModule;
use guardbot_common::teloxide::prelude::{ChatId, UserId};
use guardbot_common::teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageKind,
};
use guardbot_common::teloxide::utils::markdown;
use guardbot_common::tgbot::{BotData, MustAnswerCallbackQuery, TgCallbackContext};

/// The start menu, the welcome message for new members, and the help/about
/// buttons. Everything else lives in the feature modules.
pub struct HubModule;

fn menu_buttons(bot: &BotData) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("🎯 Raid Help", bot.to_callback_data(&TgCommand::RaidHelp)),
            InlineKeyboardButton::callback(
                "📊 Top Cryptos",
                bot.to_callback_data(&TgCommand::TopCryptos),
            ),
        ],
        vec![InlineKeyboardButton::callback(
            "ℹ️ About the Bot",
            bot.to_callback_data(&TgCommand::AboutBot),
        )],
    ])
}

async fn welcome_new_members(
    bot: &BotData,
    chat_id: ChatId,
    message: &Message,
) -> Result<(), anyhow::Error> {
    let MessageKind::NewChatMembers(new_members) = &message.kind else {
        return Ok(());
    };
    for new_member in &new_members.new_chat_members {
        if new_member.is_bot {
            continue;
        }
        let text = format!(
            "👋 Welcome, {}\\!\n\nExplore the bot's features using the options below\\.",
            markdown::escape(&new_member.full_name()),
        );
        if let Err(err) = bot
            .send_text_message(chat_id, text, menu_buttons(bot))
            .await
        {
            log::warn!("Failed to welcome user {}: {err:?}", new_member.id);
        }
    }
    Ok(())
}

#[async_trait]
impl GuardBotModule for HubModule {
    fn name(&self) -> &'static str {
        "Hub"
    }

    async fn handle_message(
        &self,
        bot: &BotData,
        _user_id: Option<UserId>,
        chat_id: ChatId,
        command: MessageCommand,
        _text: &str,
        message: &Message,
    ) -> Result<(), anyhow::Error> {
        match command {
            MessageCommand::Start(_) => {
                let text = "👋 Welcome to *GuardBot*\\!\n\n\
                            Explore the features using the menu below\\."
                    .to_string();
                bot.send_text_message(chat_id, text, menu_buttons(bot))
                    .await?;
            }
            MessageCommand::None => {
                welcome_new_members(bot, chat_id, message).await?;
            }
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
        match command {
            TgCommand::RaidHelp => {
                let reply_markup =
                    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
                        "📋 List Raids",
                        ctx.bot().to_callback_data(&TgCommand::ListRaids),
                    )]]);
                ctx.send(
                    "🎯 *Raid Help:*\n\n\
                     1️⃣ Click the *List Raids* button\\.\n\
                     2️⃣ Select *Join Raid* on any listed raid\\.\n\
                     3️⃣ To participate, use the same username on Telegram and X\\.\n\n\
                     Enjoy participating and tracking your progress\\!",
                    reply_markup,
                )
                .await?;
            }
            TgCommand::AboutBot => {
                let reply_markup =
                    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
                        "⬅️ Back",
                        ctx.bot().to_callback_data(&TgCommand::OpenMainMenu),
                    )]]);
                ctx.send(
                    "ℹ️ *About the Bot:*\n\n\
                     This bot helps you:\n\
                     • Track cryptocurrency stats\\.\n\
                     • Manage and participate in exclusive raids on X\\.\n\n\
                     Use /start to explore all features\\.",
                    reply_markup,
                )
                .await?;
            }
            TgCommand::OpenMainMenu => {
                ctx.send(
                    "👋 Welcome to *GuardBot*\\!\n\n\
                     Explore the features using the menu below\\.",
                    menu_buttons(ctx.bot()),
                )
                .await?;
            }
            _ => {}
        }
        Ok(())
    }
}
