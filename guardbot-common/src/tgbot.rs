use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use teloxide::adaptors::throttle::Throttle;
use teloxide::adaptors::CacheMe;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::payloads::{EditMessageTextSetters, RestrictChatMemberSetters, SendMessageSetters};
use teloxide::prelude::{
    dptree, CallbackQuery, ChatId, Dispatcher, Message, Requester, Update, UserId,
};
use teloxide::types::{
    ChatPermissions, InlineKeyboardMarkup, LinkPreviewOptions, MessageId, ParseMode, ReplyMarkup,
};
use teloxide::{ApiError, Bot, RequestError};

use crate::bot_commands::{MessageCommand, TgCommand};
use crate::guard::GuardState;

pub type TgBot = CacheMe<Throttle<Bot>>;

pub struct BotData {
    bot: TgBot,
    bot_id: UserId,
    state: Arc<GuardState>,
}

impl BotData {
    pub async fn new(bot: TgBot, state: Arc<GuardState>) -> Result<Self, anyhow::Error> {
        let bot_id = bot.get_me().await?.id;
        Ok(Self {
            bot,
            bot_id,
            state,
        })
    }

    pub fn bot(&self) -> &TgBot {
        &self.bot
    }

    pub fn id(&self) -> UserId {
        self.bot_id
    }

    pub fn state(&self) -> &Arc<GuardState> {
        &self.state
    }

    pub async fn start_polling(&self) -> Result<(), anyhow::Error> {
        let bot = self.bot.clone();
        let (msg_sender, mut msg_receiver) = tokio::sync::mpsc::channel(1000);
        let (callback_query_sender, mut callback_query_receiver) = tokio::sync::mpsc::channel(1000);

        tokio::spawn(async move {
            let handler = dptree::entry()
                .branch(Update::filter_message().endpoint(move |msg: Message| {
                    let msg_sender = msg_sender.clone();
                    async move {
                        msg_sender.send(msg).await.unwrap();
                        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                    }
                }))
                .branch(Update::filter_callback_query().endpoint(
                    move |callback_query: CallbackQuery| {
                        let callback_query_sender = callback_query_sender.clone();
                        async move {
                            callback_query_sender.send(callback_query).await.unwrap();
                            Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                        }
                    },
                ));
            Dispatcher::builder(bot, handler).build().dispatch().await;
        });

        let me = self.id();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(msg) = msg_receiver.recv().await {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let text = msg.text().or(msg.caption()).unwrap_or_default();
                    let user_id = msg.from.as_ref().map(|u| u.id);
                    let command = if text == "/start" {
                        MessageCommand::Start(String::new())
                    } else if let Some(data) = text.strip_prefix("/start ") {
                        MessageCommand::Start(data.to_string())
                    } else {
                        MessageCommand::None
                    };
                    for module in state.bot_modules().await.iter() {
                        let bot = state.bot(&me).unwrap();
                        if let Err(err) = module
                            .handle_message(&bot, user_id, msg.chat.id, command.clone(), text, &msg)
                            .await
                        {
                            warn!(
                                "Error handling message {} in module {}: {:?}",
                                text,
                                module.name(),
                                err
                            );
                        }
                    }
                });
            }
        });

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(callback_query) = callback_query_receiver.recv().await {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let (Some(data), Some(message)) =
                        (callback_query.data, callback_query.message)
                    {
                        for module in state.bot_modules().await.iter() {
                            let bot = state.bot(&me).unwrap();
                            let context = TgCallbackContext::new(
                                bot.value(),
                                callback_query.from.id,
                                callback_query.from.username.clone(),
                                message.chat().id,
                                Some(message.id()),
                                &data,
                            );
                            let mut query = Some(MustAnswerCallbackQuery {
                                bot_id: me,
                                callback_query: callback_query.id.clone(),
                                callback_query_answered: false,
                            });
                            if let Err(err) = module.handle_callback(context, &mut query).await {
                                warn!(
                                    "Error handling callback data {} in module {}: {:?}",
                                    data,
                                    module.name(),
                                    err
                                );
                            }
                            if let Some(query) = query {
                                query.answer_callback_query(&state).await;
                            }
                        }
                    }
                });
            }
        });
        Ok(())
    }

    pub async fn send_text_message(
        &self,
        chat_id: ChatId,
        message: String,
        reply_markup: impl Into<ReplyMarkup>,
    ) -> Result<Message, anyhow::Error> {
        Ok(self
            .bot
            .send_message(chat_id, &message)
            .parse_mode(ParseMode::MarkdownV2)
            .reply_markup(reply_markup)
            .link_preview_options(disabled_link_preview())
            .await
            .inspect_err(log_parse_error(message))?)
    }

    pub fn to_callback_data(&self, data: &TgCommand) -> String {
        serde_json::to_string(data).expect("Error serializing callback data")
    }

    pub fn parse_callback_data(&self, data: &str) -> Result<TgCommand, anyhow::Error> {
        Ok(serde_json::from_str(data)?)
    }

    /// Revokes the member's permission to send messages until `until`.
    /// Telegram-side rate limits are respected by sleeping exactly the
    /// indicated amount, with a ceiling on retries; any other error is
    /// returned to the caller.
    pub async fn restrict_member_until(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        const MAX_ATTEMPTS: usize = 5;

        let mut attempt = 0;
        loop {
            match self
                .bot
                .restrict_chat_member(chat_id, user_id, ChatPermissions::empty())
                .until_date(until)
                .await
            {
                Ok(_) => return Ok(()),
                Err(RequestError::RetryAfter(seconds)) if attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    warn!(
                        "Rate limited while restricting {user_id} in {chat_id}, retrying in {}s",
                        seconds.seconds()
                    );
                    tokio::time::sleep(seconds.duration()).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

pub struct TgCallbackContext<'a> {
    bot: &'a BotData,
    user_id: UserId,
    username: Option<String>,
    chat_id: ChatId,
    last_message: Option<MessageId>,
    data: &'a str,
}

impl<'a> TgCallbackContext<'a> {
    pub fn new(
        bot: &'a BotData,
        user_id: UserId,
        username: Option<String>,
        chat_id: ChatId,
        last_message: Option<MessageId>,
        data: &'a str,
    ) -> Self {
        Self {
            bot,
            user_id,
            username,
            chat_id,
            last_message,
            data,
        }
    }

    pub fn bot(&self) -> &BotData {
        self.bot
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.last_message
    }

    pub fn parse_command(&self) -> Result<TgCommand, anyhow::Error> {
        self.bot.parse_callback_data(self.data)
    }

    pub async fn edit_or_send(
        &mut self,
        text: impl Into<String>,
        reply_markup: InlineKeyboardMarkup,
    ) -> Result<(), anyhow::Error> {
        let text = text.into();
        if let Some(message_id) = self.last_message {
            let edit_result = self
                .bot
                .bot()
                .edit_message_text(self.chat_id, message_id, text.clone())
                .parse_mode(ParseMode::MarkdownV2)
                .link_preview_options(disabled_link_preview())
                .reply_markup(reply_markup)
                .await;
            match edit_result {
                Ok(_) => {}
                Err(RequestError::Api(ApiError::MessageNotModified)) => {}
                Err(err) => {
                    return Err(anyhow::anyhow!("Error editing message: {err:?}"));
                }
            }
        } else {
            let message = self
                .bot
                .send_text_message(self.chat_id, text, reply_markup)
                .await?;
            self.last_message = Some(message.id);
        }
        Ok(())
    }

    pub async fn send(
        &self,
        text: impl Into<String>,
        reply_markup: impl Into<ReplyMarkup>,
    ) -> Result<Message, anyhow::Error> {
        self.bot
            .send_text_message(self.chat_id, text.into(), reply_markup)
            .await
    }
}

pub struct MustAnswerCallbackQuery {
    bot_id: UserId,
    callback_query: String,
    callback_query_answered: bool,
}

impl MustAnswerCallbackQuery {
    pub async fn answer_callback_query(mut self, state: &GuardState) {
        let bot = state
            .bot(&self.bot_id)
            .expect("Bot not found while answering a callback query");
        if let Err(err) = bot.bot().answer_callback_query(&self.callback_query).await {
            warn!(
                "Error answering callback query {}: {:?}",
                self.callback_query, err
            );
        }
        self.callback_query_answered = true;
    }
}

impl Drop for MustAnswerCallbackQuery {
    fn drop(&mut self) {
        if !self.callback_query_answered {
            panic!("Callback query {} was not answered", self.callback_query);
        }
    }
}

fn disabled_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

fn log_parse_error(text: impl Into<String>) -> impl FnOnce(&RequestError) {
    let text = text.into();
    move |err| {
        if let RequestError::Api(ApiError::CantParseEntities(s)) = err {
            warn!("Can't parse entities in message: {s}\n{text:?}");
        }
    }
}
