use chrono::{DateTime, Utc};
use guardbot_common::rusqlite::{self, params, OptionalExtension, Row};
use guardbot_common::utils::store::Database;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS campaigns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    handle TEXT NOT NULL,
    tweet_id TEXT,
    action TEXT NOT NULL,
    created_by INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS participants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id INTEGER NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL,
    handle TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    UNIQUE (campaign_id, user_id)
);

CREATE TABLE IF NOT EXISTS proofs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id INTEGER NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL,
    handle TEXT NOT NULL,
    proof TEXT NOT NULL,
    submitted_at TEXT NOT NULL
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("raid {0} does not exist")]
    CampaignNotFound(i64),
    #[error("user is already a participant of this raid")]
    AlreadyJoined,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Retweet,
    Like,
    Follow,
}

impl ActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "retweet" => Some(Self::Retweet),
            "like" => Some(Self::Like),
            "follow" => Some(Self::Follow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retweet => "retweet",
            Self::Like => "like",
            Self::Follow => "follow",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub description: String,
    pub handle: String,
    pub tweet_id: Option<String>,
    pub action: ActionKind,
    pub created_by: u64,
}

#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub handle: String,
    pub tweet_id: Option<String>,
    pub action: ActionKind,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn target_url(&self) -> String {
        match self.tweet_id.as_deref() {
            Some(tweet_id) if self.action != ActionKind::Follow => {
                format!("https://x.com/{}/status/{}", self.handle, tweet_id)
            }
            _ => format!("https://x.com/{}", self.handle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Pending,
    Completed,
}

impl ParticipantStatus {
    fn from_str(s: &str) -> Self {
        if s == "completed" {
            Self::Completed
        } else {
            Self::Pending
        }
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: i64,
    pub campaign_id: i64,
    pub user_id: u64,
    pub handle: String,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone)]
pub struct Proof {
    pub id: i64,
    pub campaign_id: i64,
    pub user_id: u64,
    pub handle: String,
    pub proof: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CampaignSummary {
    pub campaign: Campaign,
    pub participants: usize,
    pub completed: usize,
}

impl CampaignSummary {
    pub fn pending(&self) -> usize {
        self.participants - self.completed
    }
}

/// The relational store backing campaigns, participants and proofs. All
/// mutations run through the shared single-writer [`Database`] handle.
#[derive(Clone)]
pub struct CampaignStore {
    db: Database,
}

impl CampaignStore {
    pub async fn new(db: Database) -> Result<Self, StoreError> {
        {
            let conn = db.lock().await;
            conn.execute_batch(SCHEMA)?;
        }
        Ok(Self { db })
    }

    pub async fn create_campaign(&self, new: NewCampaign) -> Result<i64, StoreError> {
        validate_campaign(&new)?;
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO campaigns (name, description, handle, tweet_id, action, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.name,
                new.description,
                new.handle,
                new.tweet_id,
                new.action.as_str(),
                new.created_by as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Registers `user_id` as a participant. Joining the same campaign twice
    /// is an error, not a merge. Returns the campaign name on success.
    pub async fn join(
        &self,
        campaign_id: i64,
        user_id: u64,
        handle: &str,
    ) -> Result<String, StoreError> {
        let conn = self.db.lock().await;
        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM campaigns WHERE id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(name) = name else {
            return Err(StoreError::CampaignNotFound(campaign_id));
        };
        match conn.execute(
            "INSERT INTO participants (campaign_id, user_id, handle, status) VALUES (?1, ?2, ?3, 'pending')",
            params![campaign_id, user_id as i64, handle],
        ) {
            Ok(_) => Ok(name),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyJoined),
            Err(err) => Err(err.into()),
        }
    }

    /// All campaigns, newest first.
    pub async fn all_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, handle, tweet_id, action, created_by, created_at
             FROM campaigns ORDER BY created_at DESC, id DESC",
        )?;
        let campaigns = stmt
            .query_map([], row_to_campaign)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(campaigns)
    }

    /// All campaigns with participant counts, newest first.
    pub async fn list_campaigns(&self) -> Result<Vec<CampaignSummary>, StoreError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.name, c.description, c.handle, c.tweet_id, c.action, c.created_by, c.created_at,
                    (SELECT COUNT(*) FROM participants p WHERE p.campaign_id = c.id),
                    (SELECT COUNT(*) FROM participants p WHERE p.campaign_id = c.id AND p.status = 'completed')
             FROM campaigns c ORDER BY c.created_at DESC, c.id DESC",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(CampaignSummary {
                    campaign: row_to_campaign(row)?,
                    participants: row.get::<_, i64>(8)? as usize,
                    completed: row.get::<_, i64>(9)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    pub async fn campaign_status(
        &self,
        campaign_id: i64,
    ) -> Result<(Campaign, Vec<Participant>), StoreError> {
        let conn = self.db.lock().await;
        let campaign = conn
            .query_row(
                "SELECT id, name, description, handle, tweet_id, action, created_by, created_at
                 FROM campaigns WHERE id = ?1",
                params![campaign_id],
                row_to_campaign,
            )
            .optional()?
            .ok_or(StoreError::CampaignNotFound(campaign_id))?;
        let mut stmt = conn.prepare(
            "SELECT id, campaign_id, user_id, handle, status FROM participants
             WHERE campaign_id = ?1 ORDER BY status DESC, handle ASC",
        )?;
        let participants = stmt
            .query_map(params![campaign_id], row_to_participant)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((campaign, participants))
    }

    pub async fn pending_participants(
        &self,
        campaign_id: i64,
    ) -> Result<Vec<Participant>, StoreError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, campaign_id, user_id, handle, status FROM participants
             WHERE campaign_id = ?1 AND status = 'pending'",
        )?;
        let participants = stmt
            .query_map(params![campaign_id], row_to_participant)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(participants)
    }

    /// Flips the participant to completed. A participant that is already
    /// completed is left untouched; returns whether a transition happened.
    pub async fn mark_completed(&self, participant_id: i64) -> Result<bool, StoreError> {
        let conn = self.db.lock().await;
        let changed = conn.execute(
            "UPDATE participants SET status = 'completed' WHERE id = ?1 AND status = 'pending'",
            params![participant_id],
        )?;
        Ok(changed > 0)
    }

    pub async fn record_proof(
        &self,
        campaign_id: i64,
        user_id: u64,
        handle: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO proofs (campaign_id, user_id, handle, proof, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                campaign_id,
                user_id as i64,
                handle,
                description,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Proofs of one campaign, oldest first. `CampaignNotFound` if the
    /// campaign does not exist.
    pub async fn proofs(&self, campaign_id: i64) -> Result<(Campaign, Vec<Proof>), StoreError> {
        let conn = self.db.lock().await;
        let campaign = conn
            .query_row(
                "SELECT id, name, description, handle, tweet_id, action, created_by, created_at
                 FROM campaigns WHERE id = ?1",
                params![campaign_id],
                row_to_campaign,
            )
            .optional()?
            .ok_or(StoreError::CampaignNotFound(campaign_id))?;
        let mut stmt = conn.prepare(
            "SELECT id, campaign_id, user_id, handle, proof, submitted_at FROM proofs
             WHERE campaign_id = ?1 ORDER BY submitted_at ASC, id ASC",
        )?;
        let proofs = stmt
            .query_map(params![campaign_id], row_to_proof)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((campaign, proofs))
    }

    pub async fn proof_count(&self, campaign_id: i64) -> Result<usize, StoreError> {
        let conn = self.db.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM proofs WHERE campaign_id = ?1",
            params![campaign_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Deletes every campaign, cascading participants and proofs, and resets
    /// the identity counters so the next campaign gets id 1 again.
    pub async fn delete_all(&self) -> Result<(), StoreError> {
        let conn = self.db.lock().await;
        conn.execute_batch(
            "DELETE FROM participants;
             DELETE FROM proofs;
             DELETE FROM campaigns;
             DELETE FROM sqlite_sequence WHERE name IN ('campaigns', 'participants', 'proofs');",
        )?;
        Ok(())
    }
}

fn validate_campaign(new: &NewCampaign) -> Result<(), StoreError> {
    match new.action {
        ActionKind::Follow => {
            if new.handle.is_empty()
                || new.handle.contains(char::is_whitespace)
                || new.handle.contains('/')
            {
                return Err(StoreError::Validation(
                    "A valid username is required for 'follow' raids".to_string(),
                ));
            }
            if new.tweet_id.is_some() {
                return Err(StoreError::Validation(
                    "'follow' raids don't have a target tweet".to_string(),
                ));
            }
        }
        ActionKind::Retweet | ActionKind::Like => {
            let Some(tweet_id) = new.tweet_id.as_deref() else {
                return Err(StoreError::Validation(
                    "A tweet link is required for 'retweet' and 'like' raids".to_string(),
                ));
            };
            if tweet_id.is_empty() || !tweet_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(StoreError::Validation(
                    "Invalid tweet URL. Please provide a valid link".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn row_to_campaign(row: &Row<'_>) -> Result<Campaign, rusqlite::Error> {
    let action: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        handle: row.get(3)?,
        tweet_id: row.get(4)?,
        action: ActionKind::parse(&action).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("unknown action kind {action:?}").into(),
            )
        })?,
        created_by: row.get::<_, i64>(6)? as u64,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?
            .with_timezone(&Utc),
    })
}

fn row_to_participant(row: &Row<'_>) -> Result<Participant, rusqlite::Error> {
    let status: String = row.get(4)?;
    Ok(Participant {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        user_id: row.get::<_, i64>(2)? as u64,
        handle: row.get(3)?,
        status: ParticipantStatus::from_str(&status),
    })
}

fn row_to_proof(row: &Row<'_>) -> Result<Proof, rusqlite::Error> {
    let submitted_at: String = row.get(5)?;
    Ok(Proof {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        user_id: row.get::<_, i64>(2)? as u64,
        handle: row.get(3)?,
        proof: row.get(4)?,
        submitted_at: DateTime::parse_from_rfc3339(&submitted_at)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> CampaignStore {
        CampaignStore::new(Database::in_memory().unwrap())
            .await
            .unwrap()
    }

    fn follow_campaign(handle: &str) -> NewCampaign {
        NewCampaign {
            name: "R1".to_string(),
            description: "desc".to_string(),
            handle: handle.to_string(),
            tweet_id: None,
            action: ActionKind::Follow,
            created_by: 1,
        }
    }

    fn retweet_campaign(tweet_id: Option<&str>) -> NewCampaign {
        NewCampaign {
            name: "R2".to_string(),
            description: "desc".to_string(),
            handle: "acct".to_string(),
            tweet_id: tweet_id.map(str::to_string),
            action: ActionKind::Retweet,
            created_by: 1,
        }
    }

    #[tokio::test]
    async fn follow_campaign_requires_clean_handle() {
        let store = test_store().await;
        assert!(store.create_campaign(follow_campaign("acct")).await.is_ok());
        for bad in ["", "two words", "a/b"] {
            let err = store.create_campaign(follow_campaign(bad)).await;
            assert!(matches!(err, Err(StoreError::Validation(_))), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn retweet_campaign_requires_numeric_tweet_id() {
        let store = test_store().await;
        assert!(store
            .create_campaign(retweet_campaign(Some("12345")))
            .await
            .is_ok());
        for bad in [None, Some(""), Some("12a45"), Some("x.com/a/status/1")] {
            let err = store.create_campaign(retweet_campaign(bad)).await;
            assert!(matches!(err, Err(StoreError::Validation(_))), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn duplicate_join_is_a_conflict() {
        let store = test_store().await;
        let id = store
            .create_campaign(follow_campaign("acct"))
            .await
            .unwrap();

        assert_eq!(store.join(id, 42, "alice").await.unwrap(), "R1");
        assert!(matches!(
            store.join(id, 42, "alice").await,
            Err(StoreError::AlreadyJoined)
        ));

        let (_, participants) = store.campaign_status(id).await.unwrap();
        assert_eq!(participants.len(), 1);
    }

    #[tokio::test]
    async fn joining_a_missing_campaign_fails() {
        let store = test_store().await;
        assert!(matches!(
            store.join(7, 42, "alice").await,
            Err(StoreError::CampaignNotFound(7))
        ));
    }

    #[tokio::test]
    async fn mark_completed_is_idempotent() {
        let store = test_store().await;
        let id = store
            .create_campaign(follow_campaign("acct"))
            .await
            .unwrap();
        store.join(id, 42, "alice").await.unwrap();
        let participant = store.pending_participants(id).await.unwrap()[0].id;

        assert!(store.mark_completed(participant).await.unwrap());
        assert!(!store.mark_completed(participant).await.unwrap());
        assert!(store.pending_participants(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn campaigns_are_listed_newest_first() {
        let store = test_store().await;
        let first = store
            .create_campaign(follow_campaign("acct"))
            .await
            .unwrap();
        let second = store
            .create_campaign(retweet_campaign(Some("12345")))
            .await
            .unwrap();

        let listed = store.list_campaigns().await.unwrap();
        assert_eq!(
            listed.iter().map(|s| s.campaign.id).collect::<Vec<_>>(),
            vec![second, first]
        );
    }

    #[tokio::test]
    async fn delete_all_resets_identity_counters() {
        let store = test_store().await;
        let id = store
            .create_campaign(follow_campaign("acct"))
            .await
            .unwrap();
        assert_eq!(id, 1);
        store.join(id, 42, "alice").await.unwrap();
        store
            .record_proof(id, 42, "alice", "Completed follow")
            .await
            .unwrap();

        store.delete_all().await.unwrap();

        assert!(store.list_campaigns().await.unwrap().is_empty());
        assert!(matches!(
            store.proofs(id).await,
            Err(StoreError::CampaignNotFound(1))
        ));
        let id = store
            .create_campaign(follow_campaign("acct"))
            .await
            .unwrap();
        assert_eq!(id, 1);
        assert!(store.pending_participants(id).await.unwrap().is_empty());
    }
}
