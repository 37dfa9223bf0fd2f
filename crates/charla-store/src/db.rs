use anyhow::{Context, Result, anyhow};
use charla::DEFAULT_GROUP;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::{GroupInfo, HeadToHead, StatsRow, StoredMessage};

/// Synchronous SQLite core. A single connection behind a `std::sync::Mutex`;
/// callers reach it through the `spawn_blocking` facade in `lib.rs` so the
/// tokio runtime never blocks on SQLite I/O.
pub(crate) struct Db {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    name        TEXT PRIMARY KEY NOT NULL,
    password    TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS blocks (
    blocker     TEXT NOT NULL,
    blocked     TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(blocker, blocked)
);
CREATE TABLE IF NOT EXISTS groups (
    name        TEXT PRIMARY KEY NOT NULL,
    creator     TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS group_members (
    group_name  TEXT NOT NULL,
    user        TEXT NOT NULL,
    joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(group_name, user)
);
CREATE TABLE IF NOT EXISTS group_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    group_name  TEXT NOT NULL,
    sender      TEXT NOT NULL,
    body        TEXT NOT NULL,
    sent_at     TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_group_messages ON group_messages(group_name, id);
CREATE TABLE IF NOT EXISTS read_cursors (
    user          TEXT NOT NULL,
    group_name    TEXT NOT NULL,
    last_read_id  INTEGER NOT NULL DEFAULT 0,
    UNIQUE(user, group_name)
);
CREATE TABLE IF NOT EXISTS match_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    player1     TEXT NOT NULL,
    player2     TEXT NOT NULL,
    winner      TEXT,
    played_at   TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS player_stats (
    player  TEXT PRIMARY KEY NOT NULL,
    wins    INTEGER NOT NULL DEFAULT 0,
    draws   INTEGER NOT NULL DEFAULT 0,
    losses  INTEGER NOT NULL DEFAULT 0,
    points  INTEGER NOT NULL DEFAULT 0
);
";

impl Db {
    pub(crate) fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .with_context(|| format!("failed to open database {}", p.display()))?,
            None => Connection::open_in_memory().context("failed to open in-memory database")?,
        };

        // WAL only matters on disk; pragma failures are non-fatal.
        if path.is_some() {
            conn.pragma_update(None, "journal_mode", "WAL").ok();
            conn.pragma_update(None, "synchronous", "NORMAL").ok();
        }

        conn.execute_batch(SCHEMA).context("failed to create schema")?;
        conn.execute(
            "INSERT OR IGNORE INTO groups (name, creator) VALUES (?1, 'SISTEMA')",
            [DEFAULT_GROUP],
        )
        .context("failed to seed default group")?;
        tracing::debug!(on_disk = path.is_some(), "database ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Recover the connection if a panicking thread poisoned the lock.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- accounts ----

    pub(crate) fn authenticate(&self, name: &str, password: &str) -> Result<bool> {
        let conn = self.lock();
        let stored: Option<String> = conn
            .query_row("SELECT password FROM users WHERE name = ?1", [name], |r| {
                r.get(0)
            })
            .optional()
            .context("failed to look up credentials")?;
        Ok(stored.is_some_and(|pw| pw == password))
    }

    pub(crate) fn name_taken(&self, name: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users WHERE name = ?1", [name], |r| {
                r.get(0)
            })
            .context("failed to check name")?;
        Ok(count > 0)
    }

    pub(crate) fn list_users(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name FROM users ORDER BY name")?;
        let names = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("failed to list users")?;
        Ok(names)
    }

    /// Create the account, seed its stats row, and auto-join the default
    /// group, all in one transaction. Fails if the name is taken.
    pub(crate) fn register_account(&self, name: &str, password: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute(
            "INSERT INTO users (name, password) VALUES (?1, ?2)",
            params![name, password],
        )
        .map_err(|_| anyhow!("el nombre '{name}' ya está registrado"))?;
        tx.execute(
            "INSERT OR IGNORE INTO player_stats (player) VALUES (?1)",
            [name],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO group_members (group_name, user) VALUES (?1, ?2)",
            params![DEFAULT_GROUP, name],
        )?;
        tx.commit().context("failed to commit registration")
    }

    // ---- blocks ----

    pub(crate) fn block(&self, blocker: &str, blocked: &str) -> Result<bool> {
        let conn = self.lock();
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO blocks (blocker, blocked) VALUES (?1, ?2)",
                params![blocker, blocked],
            )
            .context("failed to insert block")?;
        Ok(rows > 0)
    }

    pub(crate) fn unblock(&self, blocker: &str, blocked: &str) -> Result<bool> {
        let conn = self.lock();
        let rows = conn
            .execute(
                "DELETE FROM blocks WHERE blocker = ?1 AND blocked = ?2",
                params![blocker, blocked],
            )
            .context("failed to delete block")?;
        Ok(rows > 0)
    }

    pub(crate) fn block_exists(&self, blocker: &str, blocked: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM blocks WHERE blocker = ?1 AND blocked = ?2",
                params![blocker, blocked],
                |r| r.get(0),
            )
            .context("failed to check block")?;
        Ok(count > 0)
    }

    pub(crate) fn blocked_by(&self, blocker: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT blocked FROM blocks WHERE blocker = ?1 ORDER BY rowid DESC")?;
        let names = stmt
            .query_map([blocker], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("failed to list blocked users")?;
        Ok(names)
    }

    // ---- groups ----

    pub(crate) fn group_exists(&self, group: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM groups WHERE name = ?1", [group], |r| {
                r.get(0)
            })
            .context("failed to check group")?;
        Ok(count > 0)
    }

    pub(crate) fn group_creator(&self, group: &str) -> Result<Option<String>> {
        let conn = self.lock();
        conn.query_row("SELECT creator FROM groups WHERE name = ?1", [group], |r| {
            r.get(0)
        })
        .optional()
        .context("failed to look up group creator")
    }

    pub(crate) fn is_member(&self, user: &str, group: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM group_members WHERE group_name = ?1 AND user = ?2",
                params![group, user],
                |r| r.get(0),
            )
            .context("failed to check membership")?;
        Ok(count > 0)
    }

    pub(crate) fn members_of(&self, group: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT user FROM group_members WHERE group_name = ?1 ORDER BY user")?;
        let members = stmt
            .query_map([group], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("failed to list members")?;
        Ok(members)
    }

    pub(crate) fn groups_of(&self, user: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT group_name FROM group_members WHERE user = ?1 ORDER BY group_name")?;
        let groups = stmt
            .query_map([user], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("failed to list user groups")?;
        Ok(groups)
    }

    pub(crate) fn create_group(&self, group: &str, creator: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO groups (name, creator) VALUES (?1, ?2)",
            params![group, creator],
        )
        .map_err(|_| anyhow!("el grupo '{group}' ya existe"))?;
        tx.execute(
            "INSERT INTO group_members (group_name, user) VALUES (?1, ?2)",
            params![group, creator],
        )?;
        tx.commit().context("failed to commit group creation")
    }

    /// Cascade delete: messages, cursors, memberships, then the group row.
    /// The caller rejects deleting the default group before getting here.
    pub(crate) fn delete_group(&self, group: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM group_messages WHERE group_name = ?1", [group])?;
        tx.execute("DELETE FROM read_cursors WHERE group_name = ?1", [group])?;
        tx.execute("DELETE FROM group_members WHERE group_name = ?1", [group])?;
        tx.execute("DELETE FROM groups WHERE name = ?1", [group])?;
        tx.commit().context("failed to commit group deletion")
    }

    pub(crate) fn join_group(&self, user: &str, group: &str) -> Result<bool> {
        let conn = self.lock();
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO group_members (group_name, user) VALUES (?1, ?2)",
                params![group, user],
            )
            .context("failed to join group")?;
        Ok(rows > 0)
    }

    pub(crate) fn leave_group(&self, user: &str, group: &str) -> Result<bool> {
        let conn = self.lock();
        let rows = conn
            .execute(
                "DELETE FROM group_members WHERE group_name = ?1 AND user = ?2",
                params![group, user],
            )
            .context("failed to leave group")?;
        Ok(rows > 0)
    }

    pub(crate) fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name, creator,
                    (SELECT COUNT(*) FROM group_members WHERE group_name = groups.name)
             FROM groups ORDER BY name",
        )?;
        let groups = stmt
            .query_map([], |r| {
                Ok(GroupInfo {
                    name: r.get(0)?,
                    creator: r.get(1)?,
                    member_count: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list groups")?;
        Ok(groups)
    }

    // ---- messages & cursors ----

    pub(crate) fn append_message(&self, group: &str, sender: &str, body: &str) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO group_messages (group_name, sender, body) VALUES (?1, ?2, ?3)",
            params![group, sender, body],
        )
        .context("failed to store message")?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn cursor(&self, user: &str, group: &str) -> Result<i64> {
        let conn = self.lock();
        let id: Option<i64> = conn
            .query_row(
                "SELECT last_read_id FROM read_cursors WHERE user = ?1 AND group_name = ?2",
                params![user, group],
                |r| r.get(0),
            )
            .optional()
            .context("failed to read cursor")?;
        Ok(id.unwrap_or(0))
    }

    pub(crate) fn set_cursor(&self, user: &str, group: &str, id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO read_cursors (user, group_name, last_read_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(user, group_name) DO UPDATE SET last_read_id = excluded.last_read_id",
            params![user, group, id],
        )
        .context("failed to advance cursor")?;
        Ok(())
    }

    pub(crate) fn unread_since(&self, user: &str, group: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, sender, body FROM group_messages
             WHERE group_name = ?1
               AND id > COALESCE((SELECT last_read_id FROM read_cursors
                                  WHERE user = ?2 AND group_name = ?1), 0)
             ORDER BY id",
        )?;
        let messages = stmt
            .query_map(params![group, user], |r| {
                Ok(StoredMessage {
                    id: r.get(0)?,
                    sender: r.get(1)?,
                    body: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to fetch unread messages")?;
        Ok(messages)
    }

    pub(crate) fn unread_count(&self, user: &str, group: &str) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM group_messages
             WHERE group_name = ?1
               AND id > COALESCE((SELECT last_read_id FROM read_cursors
                                  WHERE user = ?2 AND group_name = ?1), 0)",
            params![group, user],
            |r| r.get(0),
        )
        .context("failed to count unread messages")
    }

    // ---- match results ----

    /// Record one finished match. `winner` is `None` for a draw. Wins are
    /// worth two points, draws one.
    pub(crate) fn record_result(
        &self,
        player1: &str,
        player2: &str,
        winner: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO match_history (player1, player2, winner) VALUES (?1, ?2, ?3)",
            params![player1, player2, winner],
        )?;
        match winner {
            None => {
                for p in [player1, player2] {
                    tx.execute(
                        "UPDATE player_stats SET draws = draws + 1, points = points + 1
                         WHERE player = ?1",
                        [p],
                    )?;
                }
            }
            Some(w) => {
                let loser = if w == player1 { player2 } else { player1 };
                tx.execute(
                    "UPDATE player_stats SET wins = wins + 1, points = points + 2
                     WHERE player = ?1",
                    [w],
                )?;
                tx.execute(
                    "UPDATE player_stats SET losses = losses + 1 WHERE player = ?1",
                    [loser],
                )?;
            }
        }
        tx.commit().context("failed to commit match result")
    }

    pub(crate) fn leaderboard(&self) -> Result<Vec<StatsRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT player, wins, draws, losses, points, wins + draws + losses AS total
             FROM player_stats WHERE wins + draws + losses > 0
             ORDER BY points DESC, wins DESC, player ASC",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(StatsRow {
                    player: r.get(0)?,
                    wins: r.get(1)?,
                    draws: r.get(2)?,
                    losses: r.get(3)?,
                    points: r.get(4)?,
                    total: r.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to build leaderboard")?;
        Ok(rows)
    }

    pub(crate) fn head_to_head(&self, player1: &str, player2: &str) -> Result<HeadToHead> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT winner FROM match_history
             WHERE (player1 = ?1 AND player2 = ?2) OR (player1 = ?2 AND player2 = ?1)",
        )?;
        let winners = stmt
            .query_map(params![player1, player2], |r| r.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to fetch head-to-head history")?;

        let mut stats = HeadToHead::default();
        for winner in winners {
            match winner.as_deref() {
                None => stats.draws += 1,
                Some(w) if w == player1 => stats.wins1 += 1,
                Some(w) if w == player2 => stats.wins2 += 1,
                Some(_) => {}
            }
        }
        Ok(stats)
    }
}
