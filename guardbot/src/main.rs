mod modules;

use std::time::Duration;

use crypto_stats::CryptoStatsModule;
use guardbot_common::guard::Guard;
use guardbot_common::teloxide::adaptors::throttle::Limits;
use guardbot_common::teloxide::adaptors::CacheMe;
use guardbot_common::teloxide::prelude::{Bot, RequesterExt};
use guardbot_common::tgbot::BotData;
use guardbot_common::utils::store::Database;
use log::info;
use modules::hub::HubModule;
use raid_campaigns::RaidCampaignsModule;
use reqwest::Url;
use spam_guard::SpamGuardModule;

fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level(
            "guardbot_common",
            if std::env::var("DEBUG").is_ok() {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .with_module_level(
            "spam_guard",
            if std::env::var("DEBUG").is_ok() {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .env()
        .init()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async {
            let db = get_db()?;
            let guard = Guard::new(db);

            let base: Url = if let Ok(url) = std::env::var("TELEGRAM_API_URL") {
                url.parse().expect("Invalid TELEGRAM_API_URL")
            } else {
                "https://api.telegram.org".parse().unwrap()
            };

            let main_bot_token = std::env::var("MAIN_TOKEN").expect("MAIN_TOKEN not set");
            let x_bearer_token = std::env::var("X_BEARER_TOKEN").expect("X_BEARER_TOKEN not set");
            let cmc_api_key = std::env::var("COINMARKETCAP_API_KEY").ok();
            if cmc_api_key.is_none() {
                log::warn!(
                    "COINMARKETCAP_API_KEY not set, cryptocurrency commands will not work"
                );
            }

            let main_bot = BotData::new(
                CacheMe::new(
                    Bot::with_client(
                        main_bot_token,
                        reqwest::Client::builder()
                            .timeout(Duration::from_secs(30))
                            .build()
                            .unwrap(),
                    )
                    .set_api_url(base)
                    .throttle(Limits::default()),
                ),
                guard.arc_clone_state(),
            )
            .await?;
            guard.state().add_bot(main_bot).await?;

            guard.state().add_bot_module(HubModule).await;
            guard.state().add_bot_module(SpamGuardModule::new()).await;
            guard
                .state()
                .add_bot_module(
                    RaidCampaignsModule::new(guard.arc_clone_state(), x_bearer_token).await?,
                )
                .await;
            guard
                .state()
                .add_bot_module(CryptoStatsModule::new(guard.arc_clone_state(), cmc_api_key))
                .await;

            guard.start_tg_bots().await?;

            info!("GuardBot is running");

            tokio::time::sleep(Duration::from_secs(u64::MAX)).await;

            Ok(())
        })
}

fn get_db() -> Result<Database, anyhow::Error> {
    let path = std::env::var("GUARD_DB").unwrap_or_else(|_| "guardbot.db".to_string());
    Ok(Database::open(path)?)
}
