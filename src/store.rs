//! Durable Store
//!
//! Boundary to persistence. Commits are fire-and-forget: the engine submits
//! work and consumes completion events on a later tick, so no quest operation
//! ever blocks on I/O. A single worker task serializes writes, which keeps
//! later commits for the same quest from landing before earlier ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::object::ObjectGuid;
use crate::quest::definition::QuestId;
use crate::quest::log::QuestLogEntry;
use crate::reward::{ItemDelivery, RewardTransaction};

pub type CommitId = u64;
pub type CompletionSender = mpsc::UnboundedSender<StoreEvent>;

/// Asynchronous completion signals, consumed by `QuestEngine::tick`
#[derive(Debug)]
pub enum StoreEvent {
    RewardCommitted {
        commit_id: CommitId,
        player: ObjectGuid,
        result: Result<(), String>,
    },
    LogPersisted {
        player: ObjectGuid,
        quest_id: QuestId,
        result: Result<(), String>,
    },
}

/// The persistence boundary the engine talks to
pub trait DurableStore: Send + Sync {
    /// Durably write one reward commit unit. Completion arrives later as a
    /// `RewardCommitted` event.
    fn commit_reward(
        &self,
        commit_id: CommitId,
        player: ObjectGuid,
        tx: &RewardTransaction,
        completion: CompletionSender,
    );

    /// Upsert one quest log entry.
    fn persist_log(
        &self,
        player: ObjectGuid,
        slot: usize,
        entry: &QuestLogEntry,
        completion: CompletionSender,
    );

    /// Delete one quest log entry.
    fn remove_log(&self, player: ObjectGuid, quest_id: QuestId, completion: CompletionSender);

    /// Quest tracker rows; best-effort, no completion signal.
    fn track_complete(&self, player: ObjectGuid, quest_id: QuestId);
    fn track_abandon(&self, player: ObjectGuid, quest_id: QuestId);
}

// ============================================================================
// In-memory store (tests, tools)
// ============================================================================

/// Store that completes synchronously and can inject commit failures.
#[derive(Default)]
pub struct MemoryStore {
    fail_commits: AtomicBool,
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    log: HashMap<(ObjectGuid, QuestId), (usize, QuestLogEntry)>,
    rewards: Vec<(ObjectGuid, RewardTransaction)>,
    tracker: Vec<(ObjectGuid, QuestId, &'static str)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail until switched off again.
    pub fn fail_commits(&self, on: bool) {
        self.fail_commits.store(on, Ordering::SeqCst);
    }

    pub fn committed_reward_count(&self) -> usize {
        self.inner.lock().map(|i| i.rewards.len()).unwrap_or(0)
    }

    pub fn persisted_log_len(&self) -> usize {
        self.inner.lock().map(|i| i.log.len()).unwrap_or(0)
    }

    pub fn tracker_rows(&self) -> Vec<(ObjectGuid, QuestId, &'static str)> {
        self.inner.lock().map(|i| i.tracker.clone()).unwrap_or_default()
    }
}

impl DurableStore for MemoryStore {
    fn commit_reward(
        &self,
        commit_id: CommitId,
        player: ObjectGuid,
        tx: &RewardTransaction,
        completion: CompletionSender,
    ) {
        let result = if self.fail_commits.load(Ordering::SeqCst) {
            Err("injected commit failure".to_string())
        } else {
            if let Ok(mut inner) = self.inner.lock() {
                inner.log.remove(&(player, tx.quest_id));
                inner.rewards.push((player, tx.clone()));
            }
            Ok(())
        };
        let _ = completion.send(StoreEvent::RewardCommitted {
            commit_id,
            player,
            result,
        });
    }

    fn persist_log(
        &self,
        player: ObjectGuid,
        slot: usize,
        entry: &QuestLogEntry,
        completion: CompletionSender,
    ) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .log
                .insert((player, entry.quest_id), (slot, entry.clone()));
        }
        let _ = completion.send(StoreEvent::LogPersisted {
            player,
            quest_id: entry.quest_id,
            result: Ok(()),
        });
    }

    fn remove_log(&self, player: ObjectGuid, quest_id: QuestId, completion: CompletionSender) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.log.remove(&(player, quest_id));
        }
        let _ = completion.send(StoreEvent::LogPersisted {
            player,
            quest_id,
            result: Ok(()),
        });
    }

    fn track_complete(&self, player: ObjectGuid, quest_id: QuestId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.tracker.push((player, quest_id, "complete"));
        }
    }

    fn track_abandon(&self, player: ObjectGuid, quest_id: QuestId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.tracker.push((player, quest_id, "abandon"));
        }
    }
}

// ============================================================================
// SQLite store
// ============================================================================

enum StoreJob {
    CommitReward {
        commit_id: CommitId,
        player: ObjectGuid,
        tx: RewardTransaction,
        completion: CompletionSender,
    },
    PersistLog {
        player: ObjectGuid,
        slot: usize,
        entry: QuestLogEntry,
        completion: CompletionSender,
    },
    RemoveLog {
        player: ObjectGuid,
        quest_id: QuestId,
        completion: CompletionSender,
    },
    TrackComplete {
        player: ObjectGuid,
        quest_id: QuestId,
    },
    TrackAbandon {
        player: ObjectGuid,
        quest_id: QuestId,
    },
}

/// SQLite-backed store. One worker task owns the pool and applies jobs in
/// submission order.
pub struct SqliteStore {
    jobs: mpsc::UnboundedSender<StoreJob>,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Self::migrate(&pool).await?;

        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker(pool, rx));
        info!("quest store ready at {}", database_url);
        Ok(Self { jobs })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quest_log (
                player TEXT NOT NULL,
                quest INTEGER NOT NULL,
                slot INTEGER NOT NULL,
                status TEXT NOT NULL,
                counters TEXT NOT NULL DEFAULT '[]',
                explored INTEGER NOT NULL DEFAULT 0,
                expires_at TEXT,
                PRIMARY KEY (player, quest)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quest_rewarded (
                player TEXT NOT NULL,
                quest INTEGER NOT NULL,
                PRIMARY KEY (player, quest)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mail_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player TEXT NOT NULL,
                item INTEGER NOT NULL,
                count INTEGER NOT NULL,
                quest INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reward_ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player TEXT NOT NULL,
                quest INTEGER NOT NULL,
                money_delta INTEGER NOT NULL,
                detail TEXT NOT NULL,
                committed_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quest_tracker (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player TEXT NOT NULL,
                quest INTEGER NOT NULL,
                event TEXT NOT NULL,
                at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

impl DurableStore for SqliteStore {
    fn commit_reward(
        &self,
        commit_id: CommitId,
        player: ObjectGuid,
        tx: &RewardTransaction,
        completion: CompletionSender,
    ) {
        let _ = self.jobs.send(StoreJob::CommitReward {
            commit_id,
            player,
            tx: tx.clone(),
            completion,
        });
    }

    fn persist_log(
        &self,
        player: ObjectGuid,
        slot: usize,
        entry: &QuestLogEntry,
        completion: CompletionSender,
    ) {
        let _ = self.jobs.send(StoreJob::PersistLog {
            player,
            slot,
            entry: entry.clone(),
            completion,
        });
    }

    fn remove_log(&self, player: ObjectGuid, quest_id: QuestId, completion: CompletionSender) {
        let _ = self.jobs.send(StoreJob::RemoveLog {
            player,
            quest_id,
            completion,
        });
    }

    fn track_complete(&self, player: ObjectGuid, quest_id: QuestId) {
        let _ = self.jobs.send(StoreJob::TrackComplete { player, quest_id });
    }

    fn track_abandon(&self, player: ObjectGuid, quest_id: QuestId) {
        let _ = self.jobs.send(StoreJob::TrackAbandon { player, quest_id });
    }
}

async fn worker(pool: SqlitePool, mut rx: mpsc::UnboundedReceiver<StoreJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            StoreJob::CommitReward {
                commit_id,
                player,
                tx,
                completion,
            } => {
                let result = run_commit(&pool, player, &tx)
                    .await
                    .map_err(|e| e.to_string());
                if let Err(e) = &result {
                    error!("reward commit {} failed: {}", commit_id, e);
                }
                let _ = completion.send(StoreEvent::RewardCommitted {
                    commit_id,
                    player,
                    result,
                });
            }
            StoreJob::PersistLog {
                player,
                slot,
                entry,
                completion,
            } => {
                let result = run_persist_log(&pool, player, slot, &entry)
                    .await
                    .map_err(|e| e.to_string());
                let _ = completion.send(StoreEvent::LogPersisted {
                    player,
                    quest_id: entry.quest_id,
                    result,
                });
            }
            StoreJob::RemoveLog {
                player,
                quest_id,
                completion,
            } => {
                let result = sqlx::query("DELETE FROM quest_log WHERE player = ? AND quest = ?")
                    .bind(player.to_string())
                    .bind(quest_id as i64)
                    .execute(&pool)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string());
                let _ = completion.send(StoreEvent::LogPersisted {
                    player,
                    quest_id,
                    result,
                });
            }
            StoreJob::TrackComplete { player, quest_id } => {
                track(&pool, player, quest_id, "complete").await;
            }
            StoreJob::TrackAbandon { player, quest_id } => {
                track(&pool, player, quest_id, "abandon").await;
            }
        }
    }
}

async fn run_commit(
    pool: &SqlitePool,
    player: ObjectGuid,
    tx: &RewardTransaction,
) -> Result<(), sqlx::Error> {
    let detail = serde_json::to_string(tx).unwrap_or_else(|_| "{}".to_string());
    let mut dbtx = pool.begin().await?;

    sqlx::query("DELETE FROM quest_log WHERE player = ? AND quest = ?")
        .bind(player.to_string())
        .bind(tx.quest_id as i64)
        .execute(&mut *dbtx)
        .await?;

    sqlx::query("INSERT OR IGNORE INTO quest_rewarded (player, quest) VALUES (?, ?)")
        .bind(player.to_string())
        .bind(tx.quest_id as i64)
        .execute(&mut *dbtx)
        .await?;

    for (item, delivery) in &tx.grant_items {
        if *delivery == ItemDelivery::Mail {
            sqlx::query("INSERT INTO mail_items (player, item, count, quest) VALUES (?, ?, ?, ?)")
                .bind(player.to_string())
                .bind(item.item_id as i64)
                .bind(item.count as i64)
                .bind(tx.quest_id as i64)
                .execute(&mut *dbtx)
                .await?;
        }
    }

    sqlx::query("INSERT INTO reward_ledger (player, quest, money_delta, detail) VALUES (?, ?, ?, ?)")
        .bind(player.to_string())
        .bind(tx.quest_id as i64)
        .bind(tx.money_delta)
        .bind(detail)
        .execute(&mut *dbtx)
        .await?;

    dbtx.commit().await
}

async fn run_persist_log(
    pool: &SqlitePool,
    player: ObjectGuid,
    slot: usize,
    entry: &QuestLogEntry,
) -> Result<(), sqlx::Error> {
    let counters = serde_json::to_string(&entry.counters).unwrap_or_else(|_| "[]".to_string());
    let status = serde_json::to_string(&entry.status).unwrap_or_else(|_| "\"incomplete\"".to_string());
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO quest_log (player, quest, slot, status, counters, explored, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(player.to_string())
    .bind(entry.quest_id as i64)
    .bind(slot as i64)
    .bind(status)
    .bind(counters)
    .bind(entry.explored as i64)
    .bind(entry.expires_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await
    .map(|_| ())
}

async fn track(pool: &SqlitePool, player: ObjectGuid, quest_id: QuestId, event: &str) {
    let result = sqlx::query("INSERT INTO quest_tracker (player, quest, event) VALUES (?, ?, ?)")
        .bind(player.to_string())
        .bind(quest_id as i64)
        .bind(event)
        .execute(pool)
        .await;
    if let Err(e) = result {
        error!("quest tracker write failed: {}", e);
    }
}
