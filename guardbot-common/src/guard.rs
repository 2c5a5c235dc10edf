use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{
    mapref::{multiple::RefMulti, one::Ref},
    DashMap,
};
use teloxide::prelude::{ChatId, Message, UserId};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::{
    bot_commands::MessageCommand,
    scheduler::JobScheduler,
    tgbot::{BotData, MustAnswerCallbackQuery, TgCallbackContext},
    utils::store::Database,
};

pub struct Guard {
    state: Arc<GuardState>,
}

impl Guard {
    pub fn new(db: Database) -> Self {
        Self {
            state: Arc::new(GuardState::new(db)),
        }
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    pub fn arc_clone_state(&self) -> Arc<GuardState> {
        Arc::clone(&self.state)
    }

    pub async fn start_tg_bots(&self) -> Result<(), anyhow::Error> {
        for module in self.state.bot_modules().await.iter() {
            module.start().await?;
        }

        for bot in self.state.bots() {
            bot.start_polling().await?;
        }

        Ok(())
    }
}

pub struct GuardState {
    bots: DashMap<UserId, BotData>,
    bot_modules: RwLock<Vec<Arc<dyn GuardBotModule>>>,
    scheduler: JobScheduler,
    db: Database,
}

impl GuardState {
    pub fn new(db: Database) -> Self {
        Self {
            bots: DashMap::new(),
            bot_modules: RwLock::new(Vec::new()),
            scheduler: JobScheduler::new(),
            db,
        }
    }

    pub async fn add_bot(&self, bot: BotData) -> Result<(), anyhow::Error> {
        let user_id = bot.id();
        self.bots.insert(user_id, bot);
        Ok(())
    }

    pub fn bot(&self, user_id: &UserId) -> Option<Ref<UserId, BotData>> {
        self.bots.get(user_id)
    }

    pub fn bots(&self) -> Vec<RefMulti<UserId, BotData>> {
        self.bots.iter().collect()
    }

    pub async fn add_bot_module<M: GuardBotModule>(&self, module: impl Into<Arc<M>>) {
        self.bot_modules.write().await.push(module.into());
    }

    pub async fn bot_modules(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn GuardBotModule>>> {
        self.bot_modules.read().await
    }

    pub fn db(&self) -> Database {
        self.db.clone()
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }
}

#[async_trait]
pub trait GuardBotModule: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn start(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn handle_message(
        &self,
        bot: &BotData,
        user_id: Option<UserId>,
        chat_id: ChatId,
        command: MessageCommand,
        text: &str,
        message: &Message,
    ) -> Result<(), anyhow::Error>;

    async fn handle_callback<'a>(
        &'a self,
        ctx: TgCallbackContext<'a>,
        query: &mut Option<MustAnswerCallbackQuery>,
    ) -> Result<(), anyhow::Error>;
}
