//! Durable state for the chat server: accounts, blocks, groups, group
//! messages with per-user read cursors, and gato match statistics.
//!
//! The synchronous SQLite core lives in `db.rs`; `ChatStore` is the async
//! facade the server uses, running every query on `spawn_blocking`.

mod db;

use anyhow::{Result, anyhow};
use db::Db;
use std::path::Path;
use std::sync::Arc;

/// One group with its creator and current member count.
#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub name: String,
    pub creator: String,
    pub member_count: i64,
}

/// A persisted group message, as replayed to a late reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    pub sender: String,
    pub body: String,
}

/// One leaderboard row. `points` is wins*2 + draws, maintained
/// incrementally at result-recording time.
#[derive(Debug, Clone)]
pub struct StatsRow {
    pub player: String,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    pub points: i64,
    pub total: i64,
}

/// Aggregate record between two named players.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadToHead {
    pub wins1: i64,
    pub wins2: i64,
    pub draws: i64,
}

impl HeadToHead {
    pub fn total(&self) -> i64 {
        self.wins1 + self.wins2 + self.draws
    }
}

/// Handle to the chat database. Cheap to clone; all clones share one
/// connection.
#[derive(Clone)]
pub struct ChatStore {
    db: Arc<Db>,
}

impl ChatStore {
    /// Open (and migrate) the database at `path`, or an in-memory one
    /// when `path` is `None`. Seeds the default group.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            db: Arc::new(Db::open(path)?),
        })
    }

    /// Run one synchronous query on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Db) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow!("store task failed: {e}"))?
    }

    // ---- accounts ----

    pub async fn authenticate(&self, name: &str, password: &str) -> Result<bool> {
        let (name, password) = (name.to_owned(), password.to_owned());
        self.run(move |db| db.authenticate(&name, &password)).await
    }

    pub async fn name_taken(&self, name: &str) -> Result<bool> {
        let name = name.to_owned();
        self.run(move |db| db.name_taken(&name)).await
    }

    pub async fn list_users(&self) -> Result<Vec<String>> {
        self.run(|db| db.list_users()).await
    }

    pub async fn register_account(&self, name: &str, password: &str) -> Result<()> {
        let (name, password) = (name.to_owned(), password.to_owned());
        self.run(move |db| db.register_account(&name, &password))
            .await
    }

    // ---- blocks ----

    pub async fn block(&self, blocker: &str, blocked: &str) -> Result<bool> {
        let (blocker, blocked) = (blocker.to_owned(), blocked.to_owned());
        self.run(move |db| db.block(&blocker, &blocked)).await
    }

    pub async fn unblock(&self, blocker: &str, blocked: &str) -> Result<bool> {
        let (blocker, blocked) = (blocker.to_owned(), blocked.to_owned());
        self.run(move |db| db.unblock(&blocker, &blocked)).await
    }

    pub async fn block_exists(&self, blocker: &str, blocked: &str) -> Result<bool> {
        let (blocker, blocked) = (blocker.to_owned(), blocked.to_owned());
        self.run(move |db| db.block_exists(&blocker, &blocked)).await
    }

    pub async fn blocked_by(&self, blocker: &str) -> Result<Vec<String>> {
        let blocker = blocker.to_owned();
        self.run(move |db| db.blocked_by(&blocker)).await
    }

    // ---- groups ----

    pub async fn group_exists(&self, group: &str) -> Result<bool> {
        let group = group.to_owned();
        self.run(move |db| db.group_exists(&group)).await
    }

    pub async fn group_creator(&self, group: &str) -> Result<Option<String>> {
        let group = group.to_owned();
        self.run(move |db| db.group_creator(&group)).await
    }

    pub async fn is_member(&self, user: &str, group: &str) -> Result<bool> {
        let (user, group) = (user.to_owned(), group.to_owned());
        self.run(move |db| db.is_member(&user, &group)).await
    }

    pub async fn members_of(&self, group: &str) -> Result<Vec<String>> {
        let group = group.to_owned();
        self.run(move |db| db.members_of(&group)).await
    }

    pub async fn groups_of(&self, user: &str) -> Result<Vec<String>> {
        let user = user.to_owned();
        self.run(move |db| db.groups_of(&user)).await
    }

    pub async fn create_group(&self, group: &str, creator: &str) -> Result<()> {
        let (group, creator) = (group.to_owned(), creator.to_owned());
        self.run(move |db| db.create_group(&group, &creator)).await
    }

    pub async fn delete_group(&self, group: &str) -> Result<()> {
        let group = group.to_owned();
        self.run(move |db| db.delete_group(&group)).await
    }

    pub async fn join_group(&self, user: &str, group: &str) -> Result<bool> {
        let (user, group) = (user.to_owned(), group.to_owned());
        self.run(move |db| db.join_group(&user, &group)).await
    }

    pub async fn leave_group(&self, user: &str, group: &str) -> Result<bool> {
        let (user, group) = (user.to_owned(), group.to_owned());
        self.run(move |db| db.leave_group(&user, &group)).await
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        self.run(|db| db.list_groups()).await
    }

    // ---- messages & cursors ----

    pub async fn append_message(&self, group: &str, sender: &str, body: &str) -> Result<i64> {
        let (group, sender, body) = (group.to_owned(), sender.to_owned(), body.to_owned());
        self.run(move |db| db.append_message(&group, &sender, &body))
            .await
    }

    pub async fn cursor(&self, user: &str, group: &str) -> Result<i64> {
        let (user, group) = (user.to_owned(), group.to_owned());
        self.run(move |db| db.cursor(&user, &group)).await
    }

    pub async fn set_cursor(&self, user: &str, group: &str, id: i64) -> Result<()> {
        let (user, group) = (user.to_owned(), group.to_owned());
        self.run(move |db| db.set_cursor(&user, &group, id)).await
    }

    pub async fn unread_since(&self, user: &str, group: &str) -> Result<Vec<StoredMessage>> {
        let (user, group) = (user.to_owned(), group.to_owned());
        self.run(move |db| db.unread_since(&user, &group)).await
    }

    pub async fn unread_count(&self, user: &str, group: &str) -> Result<i64> {
        let (user, group) = (user.to_owned(), group.to_owned());
        self.run(move |db| db.unread_count(&user, &group)).await
    }

    // ---- match results ----

    pub async fn record_result(
        &self,
        player1: &str,
        player2: &str,
        winner: Option<&str>,
    ) -> Result<()> {
        let (player1, player2) = (player1.to_owned(), player2.to_owned());
        let winner = winner.map(str::to_owned);
        self.run(move |db| db.record_result(&player1, &player2, winner.as_deref()))
            .await
    }

    pub async fn leaderboard(&self) -> Result<Vec<StatsRow>> {
        self.run(|db| db.leaderboard()).await
    }

    pub async fn head_to_head(&self, player1: &str, player2: &str) -> Result<HeadToHead> {
        let (player1, player2) = (player1.to_owned(), player2.to_owned());
        self.run(move |db| db.head_to_head(&player1, &player2)).await
    }
}
