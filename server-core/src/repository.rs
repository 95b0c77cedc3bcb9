//! Capability-record repositories (§9: "capability-record repositories
//! replace the inheritance-based repository hierarchy"). Each repository is
//! a small trait describing exactly the reads/writes the core needs; a real
//! deployment plugs in a Mongo-backed implementation, and this crate ships
//! the in-memory one used by tests and by running the server without a
//! database configured.
//!
//! Schemas belong to the repository, not the core — these records are the
//! core's view of that data, not a storage format.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ServerError;
use crate::password::PasswordHash;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub email: String,
    pub password_hash: PasswordHash,
    pub username: String,
    pub created_at: u64,
}

#[derive(Debug, Clone)]
pub struct UserSettingsRecord {
    pub email: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub email: String,
    pub display_name: String,
    pub score: u64,
    pub kills: u32,
    pub deaths: u32,
    pub best_combo: u32,
    pub updated_at: u64,
}

pub type AchievementBitmask = u64;

#[derive(Debug, Clone)]
pub struct PlayerCumulativeStats {
    pub email: String,
    pub total_score: u64,
    pub total_kills: u32,
    pub total_deaths: u32,
    pub games_played: u32,
    pub achievements: AchievementBitmask,
}

#[derive(Debug, Clone)]
pub struct ChatMessageRecord {
    pub room_code: String,
    pub display_name: String,
    pub text: String,
    pub sent_at: u64,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, ServerError>;

    /// Login authenticates by username (§4.6), which is distinct from the
    /// email a record is keyed by — the two only coincide by accident.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, ServerError>;

    async fn insert(&self, record: UserRecord) -> Result<(), ServerError>;
}

#[async_trait]
pub trait UserSettingsRepository: Send + Sync {
    async fn get(&self, email: &str) -> Result<Option<UserSettingsRecord>, ServerError>;
    async fn save(&self, record: UserSettingsRecord) -> Result<(), ServerError>;
}

#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// Upsert of the live session's stats; called from the ~1s auto-save
    /// timer and on player death, never a cumulative merge.
    async fn upsert_session(&self, entry: LeaderboardEntry) -> Result<(), ServerError>;

    /// Transfers a finished session's stats into the cumulative store and
    /// deletes the live session row, per §4.7's `finalizeGameSession`.
    async fn finalize_session(&self, email: &str) -> Result<(), ServerError>;

    async fn cumulative_stats(&self, email: &str) -> Result<Option<PlayerCumulativeStats>, ServerError>;

    async fn top_entries(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ServerError>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn append(&self, message: ChatMessageRecord) -> Result<(), ServerError>;
    async fn recent(&self, room_code: &str, limit: usize) -> Result<Vec<ChatMessageRecord>, ServerError>;
}

#[async_trait]
pub trait AchievementRepository: Send + Sync {
    async fn grant(&self, email: &str, bit: u8) -> Result<(), ServerError>;
    async fn bitmask(&self, email: &str) -> Result<AchievementBitmask, ServerError>;
}

#[derive(Default)]
struct UserIndexes {
    by_email: HashMap<String, UserRecord>,
    email_by_username: HashMap<String, String>,
}

/// In-memory `UserRepository`, keyed by email with a secondary
/// username→email index for login lookups.
#[derive(Default)]
pub struct InMemoryUserRepository {
    inner: Mutex<UserIndexes>,
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, ServerError> {
        Ok(self.inner.lock().await.by_email.get(email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, ServerError> {
        let indexes = self.inner.lock().await;
        let Some(email) = indexes.email_by_username.get(username) else { return Ok(None) };
        Ok(indexes.by_email.get(email).cloned())
    }

    async fn insert(&self, record: UserRecord) -> Result<(), ServerError> {
        let mut indexes = self.inner.lock().await;
        if indexes.by_email.contains_key(&record.email) {
            return Err(ServerError::Conflict("email already registered"));
        }
        if indexes.email_by_username.contains_key(&record.username) {
            return Err(ServerError::Conflict("username already registered"));
        }
        indexes.email_by_username.insert(record.username.clone(), record.email.clone());
        indexes.by_email.insert(record.email.clone(), record);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserSettingsRepository {
    settings: Mutex<HashMap<String, UserSettingsRecord>>,
}

#[async_trait]
impl UserSettingsRepository for InMemoryUserSettingsRepository {
    async fn get(&self, email: &str) -> Result<Option<UserSettingsRecord>, ServerError> {
        Ok(self.settings.lock().await.get(email).cloned())
    }

    async fn save(&self, record: UserSettingsRecord) -> Result<(), ServerError> {
        self.settings.lock().await.insert(record.email.clone(), record);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLeaderboardRepository {
    sessions: Mutex<HashMap<String, LeaderboardEntry>>,
    cumulative: Mutex<HashMap<String, PlayerCumulativeStats>>,
}

#[async_trait]
impl LeaderboardRepository for InMemoryLeaderboardRepository {
    async fn upsert_session(&self, entry: LeaderboardEntry) -> Result<(), ServerError> {
        self.sessions.lock().await.insert(entry.email.clone(), entry);
        Ok(())
    }

    async fn finalize_session(&self, email: &str) -> Result<(), ServerError> {
        let Some(session) = self.sessions.lock().await.remove(email) else { return Ok(()) };
        let mut cumulative = self.cumulative.lock().await;
        let entry = cumulative.entry(email.to_string()).or_insert_with(|| PlayerCumulativeStats {
            email: email.to_string(),
            total_score: 0,
            total_kills: 0,
            total_deaths: 0,
            games_played: 0,
            achievements: 0,
        });
        entry.total_score += session.score;
        entry.total_kills += session.kills;
        entry.total_deaths += session.deaths;
        entry.games_played += 1;
        Ok(())
    }

    async fn cumulative_stats(&self, email: &str) -> Result<Option<PlayerCumulativeStats>, ServerError> {
        Ok(self.cumulative.lock().await.get(email).cloned())
    }

    async fn top_entries(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ServerError> {
        let sessions = self.sessions.lock().await;
        let mut entries: Vec<LeaderboardEntry> = sessions.values().cloned().collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[derive(Default)]
pub struct InMemoryChatRepository {
    messages: Mutex<HashMap<String, Vec<ChatMessageRecord>>>,
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn append(&self, message: ChatMessageRecord) -> Result<(), ServerError> {
        self.messages.lock().await.entry(message.room_code.clone()).or_default().push(message);
        Ok(())
    }

    async fn recent(&self, room_code: &str, limit: usize) -> Result<Vec<ChatMessageRecord>, ServerError> {
        let messages = self.messages.lock().await;
        let Some(history) = messages.get(room_code) else { return Ok(Vec::new()) };
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}

#[derive(Default)]
pub struct InMemoryAchievementRepository {
    bitmasks: Mutex<HashMap<String, AchievementBitmask>>,
}

#[async_trait]
impl AchievementRepository for InMemoryAchievementRepository {
    async fn grant(&self, email: &str, bit: u8) -> Result<(), ServerError> {
        let mut bitmasks = self.bitmasks.lock().await;
        let mask = bitmasks.entry(email.to_string()).or_insert(0);
        *mask |= 1u64 << (bit as u64 % 64);
        Ok(())
    }

    async fn bitmask(&self, email: &str) -> Result<AchievementBitmask, ServerError> {
        Ok(*self.bitmasks.lock().await.get(email).unwrap_or(&0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_email_insert_is_a_conflict() {
        let repo = InMemoryUserRepository::default();
        let record = UserRecord { email: "a@example.com".into(), password_hash: PasswordHash::new("secret1"), username: "alice".into(), created_at: 0 };
        repo.insert(record.clone()).await.unwrap();
        assert!(repo.insert(record).await.is_err());
    }

    #[tokio::test]
    async fn find_by_username_resolves_an_email_that_differs_from_it() {
        let repo = InMemoryUserRepository::default();
        let record = UserRecord { email: "alice@example.com".into(), password_hash: PasswordHash::new("secret123"), username: "alice_user".into(), created_at: 0 };
        repo.insert(record).await.unwrap();
        let found = repo.find_by_username("alice_user").await.unwrap().expect("username lookup succeeds");
        assert_eq!(found.email, "alice@example.com");
        assert!(repo.find_by_username("bob_user").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finalize_session_merges_into_cumulative_and_clears_live_row() {
        let repo = InMemoryLeaderboardRepository::default();
        let entry = LeaderboardEntry { email: "a@example.com".into(), display_name: "alice".into(), score: 500, kills: 10, deaths: 2, best_combo: 30, updated_at: 0 };
        repo.upsert_session(entry).await.unwrap();
        repo.finalize_session("a@example.com").await.unwrap();
        let stats = repo.cumulative_stats("a@example.com").await.unwrap().unwrap();
        assert_eq!(stats.total_score, 500);
        assert_eq!(stats.games_played, 1);
        assert!(repo.top_entries(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_recent_is_capped_and_ordered() {
        let repo = InMemoryChatRepository::default();
        for i in 0..5 {
            repo.append(ChatMessageRecord { room_code: "ABCDEF".into(), display_name: "alice".into(), text: format!("msg{i}"), sent_at: i as u64 }).await.unwrap();
        }
        let recent = repo.recent("ABCDEF", 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[2].text, "msg4");
    }
}
