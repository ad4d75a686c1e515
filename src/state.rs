use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

pub struct BotRuntimeState {
    owner_id: Option<u64>,
    servers: AtomicU64,
    commands_executed: AtomicU64,
    command_stats: RwLock<BTreeMap<String, u64>>,
    locked: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub servers: u64,
    pub commands_executed: u64,
    pub command_stats: BTreeMap<String, u64>,
    pub locked: bool,
}

impl BotRuntimeState {
    pub fn new(owner_id: Option<u64>) -> Self {
        Self {
            owner_id,
            servers: AtomicU64::new(0),
            commands_executed: AtomicU64::new(0),
            command_stats: RwLock::new(BTreeMap::new()),
            locked: AtomicBool::new(false),
        }
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_id == Some(user_id)
    }

    pub fn set_servers(&self, count: u64) {
        self.servers.store(count, Ordering::Relaxed);
    }

    pub async fn record_command(&self, name: &str) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        *self
            .command_stats
            .write()
            .await
            .entry(name.to_string())
            .or_insert(0) += 1;
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Flip the lock and return the new value.
    pub fn toggle_lock(&self) -> bool {
        !self.locked.fetch_xor(true, Ordering::AcqRel)
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            servers: self.servers.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            command_stats: self.command_stats.read().await.clone(),
            locked: self.is_locked(),
        }
    }

    /// Clear counters and release the lock. The owner is kept.
    pub async fn reset(&self) {
        self.servers.store(0, Ordering::Relaxed);
        self.commands_executed.store(0, Ordering::Relaxed);
        self.command_stats.write().await.clear();
        self.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn counts_commands_by_name() {
        let state = BotRuntimeState::new(None);
        state.record_command("ping").await;
        state.record_command("help").await;
        state.record_command("ping").await;

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.commands_executed, 3);
        assert_eq!(snapshot.command_stats.get("ping"), Some(&2));
        assert_eq!(snapshot.command_stats.get("help"), Some(&1));
    }

    #[tokio::test]
    async fn concurrent_records_are_not_lost() {
        let state = Arc::new(BotRuntimeState::new(None));
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { state.record_command("snippet").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.commands_executed, 50);
        assert_eq!(snapshot.command_stats["snippet"], 50);
    }

    #[test]
    fn lock_toggles() {
        let state = BotRuntimeState::new(Some(7));
        assert!(!state.is_locked());
        assert!(state.toggle_lock());
        assert!(state.is_locked());
        assert!(!state.toggle_lock());
        assert!(!state.is_locked());
    }

    #[test]
    fn owner_is_optional() {
        assert!(BotRuntimeState::new(Some(7)).is_owner(7));
        assert!(!BotRuntimeState::new(Some(7)).is_owner(8));
        assert!(!BotRuntimeState::new(None).is_owner(7));
    }

    #[tokio::test]
    async fn reset_clears_everything_but_owner() {
        let state = BotRuntimeState::new(Some(7));
        state.set_servers(4);
        state.record_command("ping").await;
        state.toggle_lock();

        state.reset().await;

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.servers, 0);
        assert_eq!(snapshot.commands_executed, 0);
        assert!(snapshot.command_stats.is_empty());
        assert!(!snapshot.locked);
        assert!(state.is_owner(7));
    }

    #[tokio::test]
    async fn snapshot_serializes_for_the_dashboard() {
        let state = BotRuntimeState::new(None);
        state.set_servers(2);
        state.record_command("ping").await;

        let json = serde_json::to_value(state.snapshot().await).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "servers": 2,
                "commands_executed": 1,
                "command_stats": {"ping": 1},
                "locked": false
            })
        );
    }
}
