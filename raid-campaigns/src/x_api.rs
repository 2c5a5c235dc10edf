use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use guardbot_common::utils::requests::get_reqwest_client;
use serde::Deserialize;
use thiserror::Error;

use crate::store::{ActionKind, Campaign};

const X_API_BASE: &str = "https://api.twitter.com/2/";
const MAX_RATE_LIMIT_WAITS: usize = 5;
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum VerificationSourceError {
    #[error("campaign has no usable verification target")]
    NoTarget,
    #[error("verification source request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("verification source returned no usable data")]
    NoData,
    #[error("verification source rate limit did not clear after {0} attempts")]
    RateLimitExhausted(usize),
}

/// Read-only source of "who performed the campaign's action". Implemented by
/// [`XApiClient`]; tests substitute stubs.
#[async_trait]
pub trait InteractionSource: Send + Sync {
    /// The case-folded handles that performed the campaign's action.
    async fn interacting_handles(
        &self,
        campaign: &Campaign,
    ) -> Result<HashSet<String>, VerificationSourceError>;
}

pub struct XApiClient {
    bearer_token: String,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    data: Option<Vec<ApiUser>>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    username: String,
}

impl XApiClient {
    pub fn new(bearer_token: String) -> Self {
        Self { bearer_token }
    }

    fn endpoint_for(campaign: &Campaign) -> Result<String, VerificationSourceError> {
        match (campaign.action, campaign.tweet_id.as_deref()) {
            (ActionKind::Retweet, Some(tweet_id)) => Ok(format!("tweets/{tweet_id}/retweeted_by")),
            (ActionKind::Like, Some(tweet_id)) => Ok(format!("tweets/{tweet_id}/liking_users")),
            (ActionKind::Follow, _) if !campaign.handle.is_empty() => {
                Ok(format!("users/by/username/{}/followers", campaign.handle))
            }
            _ => Err(VerificationSourceError::NoTarget),
        }
    }

    async fn get(&self, endpoint: &str) -> Result<UsersResponse, VerificationSourceError> {
        let url = format!("{X_API_BASE}{endpoint}");
        for _ in 0..MAX_RATE_LIMIT_WAITS {
            let response = get_reqwest_client()
                .get(&url)
                .bearer_auth(&self.bearer_token)
                .timeout(Duration::from_secs(60))
                .send()
                .await?;
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let wait = rate_limit_wait(&response);
                log::warn!(
                    "X API rate limit exceeded on {endpoint}, waiting {}s",
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
                continue;
            }
            let response = response.error_for_status()?;
            return Ok(response.json().await?);
        }
        Err(VerificationSourceError::RateLimitExhausted(
            MAX_RATE_LIMIT_WAITS,
        ))
    }
}

/// Time until the window communicated in the 429 response resets; zero if it
/// is already in the past, a fixed fallback if the header is unusable.
fn rate_limit_wait(response: &reqwest::Response) -> Duration {
    let reset = response
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    match reset {
        Some(reset) => {
            let wait = reset - Utc::now().timestamp();
            if wait > 0 {
                Duration::from_secs(wait as u64)
            } else {
                Duration::ZERO
            }
        }
        None => DEFAULT_RATE_LIMIT_WAIT,
    }
}

#[async_trait]
impl InteractionSource for XApiClient {
    async fn interacting_handles(
        &self,
        campaign: &Campaign,
    ) -> Result<HashSet<String>, VerificationSourceError> {
        let endpoint = Self::endpoint_for(campaign)?;
        let response = self.get(&endpoint).await?;
        let users = response.data.ok_or(VerificationSourceError::NoData)?;
        Ok(users
            .into_iter()
            .map(|user| user.username.to_lowercase())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(action: ActionKind, tweet_id: Option<&str>) -> Campaign {
        Campaign {
            id: 1,
            name: "R1".to_string(),
            description: "desc".to_string(),
            handle: "acct".to_string(),
            tweet_id: tweet_id.map(str::to_string),
            action,
            created_by: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn each_action_maps_to_its_endpoint() {
        assert_eq!(
            XApiClient::endpoint_for(&campaign(ActionKind::Retweet, Some("123"))).unwrap(),
            "tweets/123/retweeted_by"
        );
        assert_eq!(
            XApiClient::endpoint_for(&campaign(ActionKind::Like, Some("123"))).unwrap(),
            "tweets/123/liking_users"
        );
        assert_eq!(
            XApiClient::endpoint_for(&campaign(ActionKind::Follow, None)).unwrap(),
            "users/by/username/acct/followers"
        );
    }

    #[test]
    fn unresolvable_targets_are_rejected() {
        assert!(matches!(
            XApiClient::endpoint_for(&campaign(ActionKind::Retweet, None)),
            Err(VerificationSourceError::NoTarget)
        ));
        let mut no_handle = campaign(ActionKind::Follow, None);
        no_handle.handle = String::new();
        assert!(matches!(
            XApiClient::endpoint_for(&no_handle),
            Err(VerificationSourceError::NoTarget)
        ));
    }
}
