pub mod store;
pub mod verification;
pub mod x_api;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use guardbot_common::bot_commands::{MessageCommand, TgCommand};
use guardbot_common::guard::{GuardBotModule, GuardState};
use guardbot_common::scheduler::{JobKey, StartOutcome};
use guardbot_common::teloxide::prelude::{ChatId, UserId};
use guardbot_common::teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Message};
use guardbot_common::teloxide::utils::markdown;
use guardbot_common::tgbot::{BotData, MustAnswerCallbackQuery, TgCallbackContext};
use guardbot_common::utils::chat::check_admin_permission_in_chat;

use crate::store::{
    ActionKind, CampaignStore, CampaignSummary, NewCampaign, ParticipantStatus, StoreError,
};
use crate::verification::{run_verification_pass, CAMPAIGN_PACING};
use crate::x_api::XApiClient;

const VERIFICATION_INTERVAL: Duration = Duration::from_secs(900);
const VERIFICATION_FIRST_DELAY: Duration = Duration::from_secs(10);
const RAID_POSTS_INTERVAL: Duration = Duration::from_secs(3600);
const RAID_POSTS_FIRST_DELAY: Duration = Duration::from_secs(10);

const MAX_MESSAGE_LEN: usize = 4000;

pub struct RaidCampaignsModule {
    state: Arc<GuardState>,
    store: CampaignStore,
    x_client: Arc<XApiClient>,
}

impl RaidCampaignsModule {
    pub async fn new(state: Arc<GuardState>, x_bearer_token: String) -> Result<Self, anyhow::Error> {
        let store = CampaignStore::new(state.db()).await?;
        Ok(Self {
            state,
            store,
            x_client: Arc::new(XApiClient::new(x_bearer_token)),
        })
    }

    async fn ensure_admin(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
        action: &str,
    ) -> Result<bool, anyhow::Error> {
        if check_admin_permission_in_chat(bot, chat_id, user_id).await {
            return Ok(true);
        }
        bot.send_text_message(
            chat_id,
            format!("❌ Only administrators can {action}\\."),
            InlineKeyboardMarkup::default(),
        )
        .await?;
        Ok(false)
    }

    async fn report_store_error(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        err: StoreError,
    ) -> Result<(), anyhow::Error> {
        let message = match &err {
            StoreError::Validation(reason) => format!("❌ {}\\.", markdown::escape(reason)),
            StoreError::CampaignNotFound(_) => {
                "❌ Invalid raid ID\\. Please check the available raids\\.".to_string()
            }
            StoreError::AlreadyJoined => {
                "❌ You are already a participant in this raid\\.".to_string()
            }
            StoreError::Db(_) => {
                log::error!("Database error: {err}");
                "❌ Something went wrong\\. Please try again later\\.".to_string()
            }
        };
        bot.send_text_message(chat_id, message, InlineKeyboardMarkup::default())
            .await?;
        Ok(())
    }

    async fn handle_new_raid(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
        args: &[&str],
    ) -> Result<(), anyhow::Error> {
        if !self.ensure_admin(bot, chat_id, user_id, "create raids").await? {
            return Ok(());
        }

        let usage =
            "Usage: `/new_raid <name> <description> <username> <action_type> [<tweet_url>]`";
        if args.len() < 4 {
            bot.send_text_message(chat_id, usage.to_string(), InlineKeyboardMarkup::default())
                .await?;
            return Ok(());
        }

        // The action keyword is either the last argument, or second to last
        // with a tweet URL after it.
        let (action, handle_pos, tweet_url) =
            if let Some(action) = ActionKind::parse(args[args.len() - 1]) {
                (action, args.len() - 2, None)
            } else if let Some(action) = ActionKind::parse(args[args.len() - 2]) {
                (action, args.len() - 3, Some(args[args.len() - 1]))
            } else {
                bot.send_text_message(
                    chat_id,
                    "❌ Invalid action type\\. Use 'retweet', 'like', or 'follow'\\.".to_string(),
                    InlineKeyboardMarkup::default(),
                )
                .await?;
                return Ok(());
            };
        if handle_pos < 2 {
            bot.send_text_message(chat_id, usage.to_string(), InlineKeyboardMarkup::default())
                .await?;
            return Ok(());
        }

        let name = args[0];
        let description = args[1..handle_pos].join(" ");
        let handle = args[handle_pos].trim_start_matches('@');
        let tweet_id = match (action, tweet_url) {
            (ActionKind::Follow, _) | (_, None) => None,
            (_, Some(url)) => Some(extract_tweet_id(url)),
        };

        let new = NewCampaign {
            name: name.to_string(),
            description: description.clone(),
            handle: handle.to_string(),
            tweet_id: tweet_id.clone(),
            action,
            created_by: user_id.0,
        };
        match self.store.create_campaign(new).await {
            Ok(raid_id) => {
                let target_url = match &tweet_id {
                    Some(tweet_id) => format!("https://x.com/{handle}/status/{tweet_id}"),
                    None => format!("https://x.com/{handle}"),
                };
                let message = format!(
                    "✅ New raid '{}' created successfully\\!\n\
                     📛 Description: {}\n\
                     🔗 Target: {}\n\
                     ✔️ Action Required: {}\n\
                     📌 Raid ID: {raid_id}\\. Participants can join with the Join Raid button\\.",
                    markdown::escape(name),
                    markdown::escape(&description),
                    markdown::escape(&target_url),
                    action_title(action),
                );
                bot.send_text_message(chat_id, message, InlineKeyboardMarkup::default())
                    .await?;
            }
            Err(err) => self.report_store_error(bot, chat_id, err).await?,
        }
        Ok(())
    }

    async fn handle_raid_status(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
        args: &[&str],
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "view raid status")
            .await?
        {
            return Ok(());
        }
        let Some(raid_id) = args.first().and_then(|arg| arg.parse::<i64>().ok()) else {
            bot.send_text_message(
                chat_id,
                "Usage: `/raid_status <raid_id>`".to_string(),
                InlineKeyboardMarkup::default(),
            )
            .await?;
            return Ok(());
        };

        match self.store.campaign_status(raid_id).await {
            Ok((campaign, participants)) => {
                let completed = participants
                    .iter()
                    .filter(|p| p.status == ParticipantStatus::Completed)
                    .count();
                let mut message = format!(
                    "🎯 *Raid Status:*\n\n\
                     🆔 *Raid ID:* {}\n\
                     📛 *Name:* {}\n\
                     📖 *Description:* {}\n\
                     🔗 [View Target]({})\n\
                     ✔️ *Action Required:* {}\n\n\
                     👥 *Total Participants:* {}\n\
                     ✅ *Completed:* {}\n\
                     ⌛ *Pending:* {}\n\n\
                     *Participants:*\n",
                    campaign.id,
                    markdown::escape(&campaign.name),
                    markdown::escape(&campaign.description),
                    markdown::escape_link_url(&campaign.target_url()),
                    action_title(campaign.action),
                    participants.len(),
                    completed,
                    participants.len() - completed,
                );
                for participant in &participants {
                    let status_icon = match participant.status {
                        ParticipantStatus::Completed => "✅",
                        ParticipantStatus::Pending => "⌛",
                    };
                    message.push_str(&format!(
                        "  • @{}: {status_icon}\n",
                        markdown::escape(&participant.handle)
                    ));
                }
                bot.send_text_message(
                    chat_id,
                    truncate_message(message),
                    InlineKeyboardMarkup::default(),
                )
                .await?;
            }
            Err(err) => self.report_store_error(bot, chat_id, err).await?,
        }
        Ok(())
    }

    async fn handle_list_raids_detailed(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "list detailed raids")
            .await?
        {
            return Ok(());
        }
        let summaries = match self.store.list_campaigns().await {
            Ok(summaries) => summaries,
            Err(err) => return self.report_store_error(bot, chat_id, err).await,
        };
        if summaries.is_empty() {
            bot.send_text_message(
                chat_id,
                "No active raids to display\\.".to_string(),
                InlineKeyboardMarkup::default(),
            )
            .await?;
            return Ok(());
        }

        let mut message = "📋 *Detailed Active Raids:*\n\n".to_string();
        for summary in &summaries {
            let campaign = &summary.campaign;
            message.push_str(&format!(
                "🆔 *Raid ID:* {}\n\
                 📛 *Name:* {}\n\
                 📖 *Description:* {}\n\
                 🔗 [View Target]({})\n\
                 ✔️ *Action Required:* {}\n\
                 👥 *Participants:* {}\n\
                 ✅ *Completed:* {}\n\
                 ⌛ *Pending:* {}\n",
                campaign.id,
                markdown::escape(&campaign.name),
                markdown::escape(&campaign.description),
                markdown::escape_link_url(&campaign.target_url()),
                action_title(campaign.action),
                summary.participants,
                summary.completed,
                summary.pending(),
            ));

            let (_, participants) = self.store.campaign_status(campaign.id).await?;
            if participants.is_empty() {
                message.push_str("👤 No participants yet\\.\n");
            } else {
                message.push_str("*Participants:*\n");
                for participant in &participants {
                    let status_icon = match participant.status {
                        ParticipantStatus::Completed => "✅",
                        ParticipantStatus::Pending => "⌛",
                    };
                    message.push_str(&format!(
                        "  • @{}: {status_icon}\n",
                        markdown::escape(&participant.handle)
                    ));
                }
            }

            let (_, proofs) = self.store.proofs(campaign.id).await?;
            if proofs.is_empty() {
                message.push_str("*Proofs:* None\n\n");
            } else {
                message.push_str("*Proofs:*\n");
                for proof in &proofs {
                    message.push_str(&format!(
                        "  • @{}: {} at {}\n",
                        markdown::escape(&proof.handle),
                        markdown::escape(&proof.proof),
                        markdown::escape(&proof.submitted_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
                    ));
                }
                message.push('\n');
            }
        }
        bot.send_text_message(
            chat_id,
            truncate_message(message),
            InlineKeyboardMarkup::default(),
        )
        .await?;
        Ok(())
    }

    async fn handle_show_proofs(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
        args: &[&str],
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "view raid proofs")
            .await?
        {
            return Ok(());
        }
        let Some(raid_id) = args.first().and_then(|arg| arg.parse::<i64>().ok()) else {
            bot.send_text_message(
                chat_id,
                "Usage: `/show_proofs <raid_id>`".to_string(),
                InlineKeyboardMarkup::default(),
            )
            .await?;
            return Ok(());
        };

        match self.store.proofs(raid_id).await {
            Ok((campaign, proofs)) => {
                if proofs.is_empty() {
                    bot.send_text_message(
                        chat_id,
                        format!(
                            "No proofs have been submitted for the raid '{}'\\.",
                            markdown::escape(&campaign.name)
                        ),
                        InlineKeyboardMarkup::default(),
                    )
                    .await?;
                    return Ok(());
                }
                let mut message = format!(
                    "📋 *Proofs for Raid:*\n\n\
                     🆔 *Raid ID:* {}\n\
                     📛 *Name:* {}\n\
                     📖 *Description:* {}\n\n\
                     *Submitted Proofs:*\n",
                    campaign.id,
                    markdown::escape(&campaign.name),
                    markdown::escape(&campaign.description),
                );
                for proof in &proofs {
                    message.push_str(&format!(
                        "  • @{}\n    ✔️ {}\n    🕒 {}\n",
                        markdown::escape(&proof.handle),
                        markdown::escape(&proof.proof),
                        markdown::escape(&proof.submitted_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
                    ));
                }
                bot.send_text_message(
                    chat_id,
                    truncate_message(message),
                    InlineKeyboardMarkup::default(),
                )
                .await?;
            }
            Err(err) => self.report_store_error(bot, chat_id, err).await?,
        }
        Ok(())
    }

    async fn handle_delete_all_raids(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "delete all raids")
            .await?
        {
            return Ok(());
        }
        let reply_markup = InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback(
                "✅ Confirm Delete",
                bot.to_callback_data(&TgCommand::ConfirmDeleteAllRaids),
            ),
            InlineKeyboardButton::callback(
                "❌ Cancel",
                bot.to_callback_data(&TgCommand::CancelDeleteAllRaids),
            ),
        ]]);
        bot.send_text_message(
            chat_id,
            "⚠️ Are you sure you want to delete all raids and associated data?\n\n\
             This action cannot be undone\\."
                .to_string(),
            reply_markup,
        )
        .await?;
        Ok(())
    }

    async fn handle_reset_database(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "reset the database")
            .await?
        {
            return Ok(());
        }
        match self.store.delete_all().await {
            Ok(()) => {
                bot.send_text_message(
                    chat_id,
                    "✅ Database has been reset successfully\\!".to_string(),
                    InlineKeyboardMarkup::default(),
                )
                .await?;
            }
            Err(err) => self.report_store_error(bot, chat_id, err).await?,
        }
        Ok(())
    }

    async fn handle_start_verification(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "manage proof verification")
            .await?
        {
            return Ok(());
        }
        let store = self.store.clone();
        let client = Arc::clone(&self.x_client);
        let outcome = self.state.scheduler().start(
            JobKey::ProofVerification,
            VERIFICATION_FIRST_DELAY,
            VERIFICATION_INTERVAL,
            move || {
                let store = store.clone();
                let client = Arc::clone(&client);
                async move {
                    log::info!("Running periodic proof verification");
                    if let Err(err) =
                        run_verification_pass(&store, client.as_ref(), CAMPAIGN_PACING).await
                    {
                        log::error!("Proof verification pass failed: {err}");
                    }
                }
            },
        );
        let message = match outcome {
            StartOutcome::AlreadyRunning => "🔄 Proof verification is already running\\.",
            StartOutcome::Started => "✅ Proof verification has been started\\!",
        };
        bot.send_text_message(chat_id, message.to_string(), InlineKeyboardMarkup::default())
            .await?;
        Ok(())
    }

    async fn handle_stop_verification(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "manage proof verification")
            .await?
        {
            return Ok(());
        }
        self.state.scheduler().stop(&JobKey::ProofVerification);
        bot.send_text_message(
            chat_id,
            "✅ Proof verification has been stopped\\!".to_string(),
            InlineKeyboardMarkup::default(),
        )
        .await?;
        Ok(())
    }

    async fn handle_start_raid_posts(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "manage raid auto\\-posting")
            .await?
        {
            return Ok(());
        }
        let state = Arc::clone(&self.state);
        let store = self.store.clone();
        let bot_id = bot.id();
        let outcome = self.state.scheduler().start(
            JobKey::RaidBroadcast(chat_id),
            RAID_POSTS_FIRST_DELAY,
            RAID_POSTS_INTERVAL,
            move || {
                let state = Arc::clone(&state);
                let store = store.clone();
                async move {
                    if let Err(err) = broadcast_raids(&state, bot_id, chat_id, &store).await {
                        log::warn!("Failed to broadcast raids in {chat_id}: {err:?}");
                    }
                }
            },
        );
        let message = match outcome {
            StartOutcome::AlreadyRunning => "🔔 Auto\\-posting of raids is already running\\!",
            StartOutcome::Started => "🔔 Auto\\-posting of raids has been started\\!",
        };
        bot.send_text_message(chat_id, message.to_string(), InlineKeyboardMarkup::default())
            .await?;
        Ok(())
    }

    async fn handle_stop_raid_posts(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if !self
            .ensure_admin(bot, chat_id, user_id, "manage raid auto\\-posting")
            .await?
        {
            return Ok(());
        }
        self.state.scheduler().stop(&JobKey::RaidBroadcast(chat_id));
        bot.send_text_message(
            chat_id,
            "✅ Auto\\-posting of raids has been stopped\\!".to_string(),
            InlineKeyboardMarkup::default(),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl GuardBotModule for RaidCampaignsModule {
    fn name(&self) -> &'static str {
        "RaidCampaigns"
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

        let mut parts = text.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(());
        };
        let args: Vec<&str> = parts.collect();

        match cmd {
            "/new_raid" => self.handle_new_raid(bot, chat_id, user_id, &args).await?,
            "/raid_status" => self.handle_raid_status(bot, chat_id, user_id, &args).await?,
            "/list_raids_detailed" => {
                self.handle_list_raids_detailed(bot, chat_id, user_id).await?
            }
            "/show_proofs" => self.handle_show_proofs(bot, chat_id, user_id, &args).await?,
            "/delete_all_raids" => self.handle_delete_all_raids(bot, chat_id, user_id).await?,
            "/reset_database" => self.handle_reset_database(bot, chat_id, user_id).await?,
            "/start_proof_verification" => {
                self.handle_start_verification(bot, chat_id, user_id).await?
            }
            "/stop_proof_verification" => {
                self.handle_stop_verification(bot, chat_id, user_id).await?
            }
            "/start_raid_posts" => self.handle_start_raid_posts(bot, chat_id, user_id).await?,
            "/stop_raid_posts" => self.handle_stop_raid_posts(bot, chat_id, user_id).await?,
            _ => {}
        }
        Ok(())
    }

    async fn handle_callback<'a>(
        &'a self,
        mut ctx: TgCallbackContext<'a>,
        _query: &mut Option<MustAnswerCallbackQuery>,
    ) -> Result<(), anyhow::Error> {
        let Ok(command) = ctx.parse_command() else {
            return Ok(());
        };
        match command {
            TgCommand::ListRaids => {
                let summaries = match self.store.list_campaigns().await {
                    Ok(summaries) => summaries,
                    Err(err) => {
                        log::error!("Failed to list raids: {err}");
                        ctx.send(
                            "❌ Failed to retrieve raids\\. Please try again later\\.",
                            InlineKeyboardMarkup::default(),
                        )
                        .await?;
                        return Ok(());
                    }
                };
                if summaries.is_empty() {
                    ctx.edit_or_send(
                        "📋 *Active Raids:*\n\nNo active raids to display\\.",
                        InlineKeyboardMarkup::default(),
                    )
                    .await?;
                    return Ok(());
                }
                for summary in &summaries {
                    send_campaign_card(ctx.bot(), ctx.chat_id(), summary).await?;
                }
            }
            TgCommand::JoinRaid(raid_id) => {
                let username = ctx.username().unwrap_or("Anonymous").to_string();
                match self
                    .store
                    .join(raid_id, ctx.user_id().0, &username)
                    .await
                {
                    Ok(name) => {
                        ctx.send(
                            format!(
                                "✅ @{}, you have successfully joined the raid '{}'\\!",
                                markdown::escape(&username),
                                markdown::escape(&name)
                            ),
                            InlineKeyboardMarkup::default(),
                        )
                        .await?;
                    }
                    Err(StoreError::CampaignNotFound(_)) => {
                        ctx.send(
                            "❌ This raid no longer exists\\.",
                            InlineKeyboardMarkup::default(),
                        )
                        .await?;
                    }
                    Err(StoreError::AlreadyJoined) => {
                        ctx.send(
                            format!(
                                "❌ @{}, you are already a participant in this raid\\.",
                                markdown::escape(&username)
                            ),
                            InlineKeyboardMarkup::default(),
                        )
                        .await?;
                    }
                    Err(err) => {
                        log::error!("Failed to join raid {raid_id}: {err}");
                        ctx.send(
                            "❌ Failed to join the raid\\. Please try again later\\.",
                            InlineKeyboardMarkup::default(),
                        )
                        .await?;
                    }
                }
            }
            TgCommand::ConfirmDeleteAllRaids => {
                if !check_admin_permission_in_chat(ctx.bot(), ctx.chat_id(), ctx.user_id()).await {
                    return Ok(());
                }
                match self.store.delete_all().await {
                    Ok(()) => {
                        ctx.edit_or_send(
                            "✅ All raids and associated data have been successfully deleted\\.",
                            InlineKeyboardMarkup::default(),
                        )
                        .await?;
                    }
                    Err(err) => {
                        log::error!("Failed to delete raids: {err}");
                        ctx.edit_or_send(
                            "❌ Failed to delete raids\\. Please try again later\\.",
                            InlineKeyboardMarkup::default(),
                        )
                        .await?;
                    }
                }
            }
            TgCommand::CancelDeleteAllRaids => {
                ctx.edit_or_send(
                    "❌ Raid deletion has been canceled\\.",
                    InlineKeyboardMarkup::default(),
                )
                .await?;
            }
            _ => {}
        }
        Ok(())
    }
}

async fn broadcast_raids(
    state: &GuardState,
    bot_id: UserId,
    chat_id: ChatId,
    store: &CampaignStore,
) -> Result<(), anyhow::Error> {
    let Some(bot) = state.bot(&bot_id) else {
        return Ok(());
    };
    let summaries = store.list_campaigns().await?;
    if summaries.is_empty() {
        bot.send_text_message(
            chat_id,
            "No active raids to display\\.".to_string(),
            InlineKeyboardMarkup::default(),
        )
        .await?;
        return Ok(());
    }
    for summary in &summaries {
        send_campaign_card(&bot, chat_id, summary).await?;
    }
    Ok(())
}

async fn send_campaign_card(
    bot: &BotData,
    chat_id: ChatId,
    summary: &CampaignSummary,
) -> Result<(), anyhow::Error> {
    let campaign = &summary.campaign;
    let message = format!(
        "🎯 *Active Raid:*\n\n\
         🆔 *Raid ID:* {}\n\
         📛 *Name:* {}\n\
         📖 *Description:* {}\n\
         🔗 [View Target]({})\n\
         ✔️ *Action Required:* {}\n\
         👥 *Participants:* {}\n\
         ✅ *Completed:* {}\n\
         ⌛ *Pending:* {}\n\n\
         Click the button below to join this raid\\!",
        campaign.id,
        markdown::escape(&campaign.name),
        markdown::escape(&campaign.description),
        markdown::escape_link_url(&campaign.target_url()),
        action_title(campaign.action),
        summary.participants,
        summary.completed,
        summary.pending(),
    );
    let reply_markup = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Join Raid",
        bot.to_callback_data(&TgCommand::JoinRaid(campaign.id)),
    )]]);
    bot.send_text_message(chat_id, message, reply_markup)
        .await?;
    Ok(())
}

fn action_title(action: ActionKind) -> &'static str {
    match action {
        ActionKind::Retweet => "Retweet",
        ActionKind::Like => "Like",
        ActionKind::Follow => "Follow",
    }
}

fn extract_tweet_id(tweet_url: &str) -> String {
    tweet_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn truncate_message(message: String) -> String {
    if message.len() <= MAX_MESSAGE_LEN {
        return message;
    }
    let mut end = MAX_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tweet_id_comes_from_the_last_path_segment() {
        assert_eq!(
            extract_tweet_id("https://x.com/acct/status/1234567890"),
            "1234567890"
        );
        assert_eq!(
            extract_tweet_id("https://x.com/acct/status/1234567890/"),
            "1234567890"
        );
        assert_eq!(
            extract_tweet_id("https://x.com/acct/status/1234567890?s=20"),
            "1234567890"
        );
    }

    #[test]
    fn long_messages_are_truncated_on_char_boundaries() {
        let message = "⌛".repeat(3000);
        let truncated = truncate_message(message);
        assert!(truncated.len() <= MAX_MESSAGE_LEN + '…'.len_utf8());
        assert!(truncated.ends_with('…'));
    }
}
