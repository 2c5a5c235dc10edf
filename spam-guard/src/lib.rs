pub mod flood;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use guardbot_common::bot_commands::MessageCommand;
use guardbot_common::guard::GuardBotModule;
use guardbot_common::teloxide::prelude::{ChatId, Requester, UserId};
use guardbot_common::teloxide::types::{InlineKeyboardMarkup, Message};
use guardbot_common::teloxide::utils::markdown;
use guardbot_common::tgbot::{BotData, MustAnswerCallbackQuery, TgCallbackContext};
use guardbot_common::utils::chat::check_admin_permission_in_chat;
use guardbot_common::utils::format_duration;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use crate::flood::{long_token_mute_duration, AbuseTracker, ChatUser};

lazy_static! {
    static ref LINK_RE: Regex = Regex::new(r"(?i)(https?://|www\.)\S+").unwrap();
    static ref LONG_TOKEN_RE: Regex = Regex::new(r"\b\w{15,}\b").unwrap();
}

/// Classifies every group-chat text message and applies escalating
/// restrictions: links are deleted and muted, floods are muted, long
/// alphanumeric tokens get progressively longer mutes.
pub struct SpamGuardModule {
    tracker: AbuseTracker,
}

impl Default for SpamGuardModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SpamGuardModule {
    pub fn new() -> Self {
        Self {
            tracker: AbuseTracker::new(),
        }
    }

    /// Mutes the sender unless they were already actioned within the last 30
    /// seconds. Nothing here is allowed to fail the message pipeline; every
    /// error is logged and dropped.
    async fn mute_member(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
        username: &str,
        duration: Duration,
        reason: &str,
    ) {
        let now = Utc::now();
        if !self.tracker.try_begin_mute(user_id, now) {
            log::debug!("User {user_id} in {chat_id} was actioned recently, skipping mute");
            return;
        }
        if let Err(err) = bot
            .restrict_member_until(chat_id, user_id, now + duration)
            .await
        {
            log::warn!("Failed to mute @{username} in {chat_id}: {err:?}");
            return;
        }
        let formatted_duration = format_duration(duration.to_std().unwrap_or_default());
        log::info!("User @{username} muted for {formatted_duration} ({reason})");
        let text = format!(
            "❌ @{} has been muted for {}\\.\nReason: {}\\.",
            markdown::escape(username),
            markdown::escape(&formatted_duration),
            markdown::escape(reason),
        );
        if let Err(err) = bot
            .send_text_message(chat_id, text, InlineKeyboardMarkup::default())
            .await
        {
            log::warn!("Failed to send mute notification in {chat_id}: {err:?}");
        }
    }
}

#[async_trait]
impl GuardBotModule for SpamGuardModule {
    fn name(&self) -> &'static str {
        "SpamGuard"
    }

    async fn handle_message(
        &self,
        bot: &BotData,
        user_id: Option<UserId>,
        chat_id: ChatId,
        command: MessageCommand,
        text: &str,
        message: &Message,
    ) -> Result<(), anyhow::Error> {
        if !matches!(command, MessageCommand::None) {
            return Ok(());
        }
        if chat_id.is_user() {
            return Ok(());
        }
        let Some(user_id) = user_id else {
            return Ok(());
        };
        if text.is_empty() || text.starts_with('/') {
            return Ok(());
        }

        let username = message
            .from
            .as_ref()
            .and_then(|user| user.username.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        if LINK_RE.is_match(text) {
            if let Err(err) = bot.bot().delete_message(chat_id, message.id).await {
                log::warn!("Failed to delete link message from {user_id}: {err:?}");
            }
            self.mute_member(
                bot,
                chat_id,
                user_id,
                &username,
                Duration::minutes(60),
                "posting links",
            )
            .await;
            // The message is gone; it doesn't count toward the flood window.
            return Ok(());
        }

        let chat_user = ChatUser { chat_id, user_id };
        if self.tracker.record_message(chat_user, Utc::now()) {
            self.mute_member(
                bot,
                chat_id,
                user_id,
                &username,
                Duration::minutes(60),
                "spamming",
            )
            .await;
        }

        let long_tokens: Vec<&str> = LONG_TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect();
        if !long_tokens.is_empty() && !is_exempt_from_long_token_rule(bot, chat_id, user_id).await {
            let warnings = self.tracker.add_long_token_warning(chat_user);
            let duration = long_token_mute_duration(warnings);
            let reason = format!("using long words: {}", long_tokens.iter().join(", "));
            self.mute_member(bot, chat_id, user_id, &username, duration, &reason)
                .await;
        }

        Ok(())
    }

    async fn handle_callback<'a>(
        &'a self,
        _ctx: TgCallbackContext<'a>,
        _query: &mut Option<MustAnswerCallbackQuery>,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Administrators and the chat owner are exempt from the long-token rule
/// only, not from the link or flood rules.
async fn is_exempt_from_long_token_rule(bot: &BotData, chat_id: ChatId, user_id: UserId) -> bool {
    check_admin_permission_in_chat(bot, chat_id, user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_pattern_matches_urls_only() {
        for spam in [
            "check https://example.com/promo",
            "HTTP://EXAMPLE.COM",
            "visit www.example.com now",
        ] {
            assert!(LINK_RE.is_match(spam), "{spam:?}");
        }
        for fine in ["no links here", "www. com", "https:// nothing"] {
            assert!(!LINK_RE.is_match(fine), "{fine:?}");
        }
    }

    #[test]
    fn long_token_pattern_needs_fifteen_chars() {
        assert!(LONG_TOKEN_RE.is_match("0x4bf5122f344554c53bde2ebb8cd2b7e3"));
        assert!(LONG_TOKEN_RE.is_match("wordoffifteench exactly"));
        assert!(!LONG_TOKEN_RE.is_match("fourteencharsx is fine"));
        assert!(!LONG_TOKEN_RE.is_match("all short words in this one"));
    }

    #[test]
    fn long_tokens_are_collected_for_the_reason() {
        let text = "buy gorillamansioncoin at definitelynotascamtoken now";
        let tokens: Vec<&str> = LONG_TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect();
        assert_eq!(tokens, vec!["gorillamansioncoin", "definitelynotascamtoken"]);
    }
}
