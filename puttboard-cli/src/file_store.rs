//! JSON-file document store.
//!
//! The whole document set is read once on open. Each committed group is
//! applied to a staged copy, written to a sibling temp file and renamed over
//! the data file, so a crash mid-write leaves the previous group boundary.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use puttboard_engine::batch::Mutation;
use puttboard_engine::model::{
    GameType, LeaderboardEntry, PlayerIdentity, RankEvent, RawSession, ResultRecord, SeasonStats,
};
use puttboard_engine::store::{EventFilter, RejectedDocument, Snapshot, Store, StoreError};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    snapshot: Mutex<Snapshot>,
}

impl FileStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        debug!(
            "opened {}: {} sessions, {} entries, {} events, {} unreadable",
            path.display(),
            snapshot.sessions.len(),
            snapshot.leaderboard_entries.len(),
            snapshot.rank_events.len(),
            snapshot.rejected.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            snapshot: Mutex::new(snapshot),
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, payload).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn load_sessions(&self, game_types: &[GameType]) -> Result<Vec<RawSession>, StoreError> {
        Ok(self.snapshot.lock().await.sessions_of(game_types))
    }

    async fn load_identities(&self) -> Result<Vec<PlayerIdentity>, StoreError> {
        Ok(self.snapshot.lock().await.identities.clone())
    }

    async fn load_entries(
        &self,
        leaderboard_type: &str,
        game_types: &[GameType],
    ) -> Result<Vec<LeaderboardEntry>, StoreError> {
        Ok(self
            .snapshot
            .lock()
            .await
            .entries_of(leaderboard_type, game_types))
    }

    async fn load_events(&self, filter: &EventFilter) -> Result<Vec<RankEvent>, StoreError> {
        Ok(self.snapshot.lock().await.events_matching(filter))
    }

    async fn load_results(&self, event_ids: &[String]) -> Result<Vec<ResultRecord>, StoreError> {
        Ok(self.snapshot.lock().await.results_for(event_ids))
    }

    async fn load_season_stats(&self, ids: &[String]) -> Result<Vec<SeasonStats>, StoreError> {
        Ok(self.snapshot.lock().await.season_stats_for(ids))
    }

    async fn load_rejected(
        &self,
        collections: &[&str],
    ) -> Result<Vec<RejectedDocument>, StoreError> {
        Ok(self.snapshot.lock().await.rejected_in(collections))
    }

    async fn commit_group(&self, group: &[Mutation]) -> Result<(), StoreError> {
        let mut current = self.snapshot.lock().await;
        let mut staged = current.clone();
        staged.apply_group(group)?;
        self.persist(&staged).await?;
        *current = staged;
        Ok(())
    }
}
