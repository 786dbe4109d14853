//! # In-Memory Store
//!
//! A transactional key-row store that implements every store trait.
//!
//! ## Guarantees
//!
//! 1. **Row locks**: `select_for_update` takes an exclusive, commit-duration
//!    lock on one player row. A second transaction blocks until the first
//!    ends, or fails with [`StoreError::LockTimeout`].
//! 2. **Atomicity**: writes are buffered in the transaction and applied under
//!    one table lock on commit. Rollback (or drop) discards them.
//! 3. **Isolation**: plain reads see committed state only. A transaction sees
//!    its own buffered writes through the locking read.
//!
//! ## Test Hooks
//!
//! - [`MemoryStore::fail_at`] arms a one-shot failure at a [`FailPoint`].
//! - [`MemoryStore::set_pre_lock_hook`] runs a callback right before a
//!   locking read starts waiting, so tests can line up racing transactions.
//!
//! ## Lock Table
//!
//! ```text
//! locks: HashMap<PlayerId, TxId>   guarded by Mutex
//! released: Condvar                notified whenever a tx drops its locks
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::GachaSettings;
use crate::error::{FailPoint, StoreError, StoreResult};
use crate::model::{CatalogItem, ItemId, OwnedItem, Player, PlayerId, ProbabilityEntry};
use crate::store::{
    Database, InventoryStore, ItemCatalog, PlayerStore, ProbabilityTable, Stores, Transaction,
};

/// Callback invoked with the player id before a locking read.
pub type PreLockHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Committed rows.
#[derive(Default)]
struct Tables {
    players: HashMap<PlayerId, Player>,
    tokens: HashMap<String, PlayerId>,
    owned: HashMap<PlayerId, BTreeSet<ItemId>>,
}

impl Tables {
    fn owns(&self, item: &OwnedItem) -> bool {
        self.owned
            .get(&item.player_id)
            .is_some_and(|items| items.contains(&item.item_id))
    }
}

/// A buffered write.
#[derive(Clone, Debug)]
enum PendingWrite {
    Coin {
        player_id: PlayerId,
        coin: u64,
    },
    CoinAndHighScore {
        player_id: PlayerId,
        coin: u64,
        high_score: u64,
    },
    Own(OwnedItem),
}

struct Inner {
    tables: RwLock<Tables>,
    probabilities: RwLock<Vec<ProbabilityEntry>>,
    catalog: RwLock<Vec<CatalogItem>>,
    locks: Mutex<HashMap<PlayerId, u64>>,
    released: Condvar,
    next_tx: AtomicU64,
    lock_timeout: Duration,
    fail_point: Mutex<Option<FailPoint>>,
    pre_lock_hook: RwLock<Option<PreLockHook>>,
}

impl Inner {
    /// Consumes the armed failure if it matches `point`.
    fn trip(&self, point: FailPoint) -> StoreResult<()> {
        let mut armed = self.fail_point.lock();
        if *armed == Some(point) {
            *armed = None;
            return Err(StoreError::InjectedFailure(point));
        }
        Ok(())
    }

    fn release(&self, tx_id: u64, rows: &[PlayerId]) {
        if rows.is_empty() {
            return;
        }
        let mut locks = self.locks.lock();
        for row in rows {
            if locks.get(row) == Some(&tx_id) {
                locks.remove(row);
            }
        }
        drop(locks);
        self.released.notify_all();
    }
}

/// In-memory implementation of every store trait.
///
/// Cloning shares the same underlying tables.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store with the given lock wait timeout.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                probabilities: RwLock::new(Vec::new()),
                catalog: RwLock::new(Vec::new()),
                locks: Mutex::new(HashMap::new()),
                released: Condvar::new(),
                next_tx: AtomicU64::new(1),
                lock_timeout,
                fail_point: Mutex::new(None),
                pre_lock_hook: RwLock::new(None),
            }),
        }
    }

    /// Creates a store seeded with the catalog and drop table of `settings`.
    #[must_use]
    pub fn from_settings(settings: &GachaSettings) -> Self {
        let store = Self::new(settings.economy.lock_wait_timeout());
        store.set_catalog(settings.items.clone());
        store.set_probabilities(settings.probabilities.clone());
        store
    }

    /// Replaces the item catalog.
    pub fn set_catalog(&self, items: Vec<CatalogItem>) {
        *self.inner.catalog.write() = items;
    }

    /// Replaces the drop table.
    pub fn set_probabilities(&self, entries: Vec<ProbabilityEntry>) {
        *self.inner.probabilities.write() = entries;
    }

    /// Arms a one-shot failure at `point`.
    pub fn fail_at(&self, point: FailPoint) {
        *self.inner.fail_point.lock() = Some(point);
    }

    /// Installs a callback that runs before every locking read.
    pub fn set_pre_lock_hook(&self, hook: PreLockHook) {
        *self.inner.pre_lock_hook.write() = Some(hook);
    }

    /// Removes the pre-lock callback.
    pub fn clear_pre_lock_hook(&self) {
        *self.inner.pre_lock_hook.write() = None;
    }

    /// Number of row locks currently held by open transactions.
    #[must_use]
    pub fn held_locks(&self) -> usize {
        self.inner.locks.lock().len()
    }

    /// Wraps this store into the handle set the services are built from.
    #[must_use]
    pub fn stores(&self) -> Stores<Self> {
        let shared = Arc::new(self.clone());
        Stores {
            db: Arc::clone(&shared),
            players: Arc::clone(&shared) as Arc<dyn PlayerStore<MemoryTx>>,
            inventory: Arc::clone(&shared) as Arc<dyn InventoryStore<MemoryTx>>,
            probabilities: Arc::clone(&shared) as Arc<dyn ProbabilityTable>,
            catalog: shared as Arc<dyn ItemCatalog>,
        }
    }

    /// Takes the row lock on `player_id` for `tx`, waiting up to the timeout.
    fn lock_row(&self, tx: &mut MemoryTx, player_id: &str) -> StoreResult<()> {
        if tx.locked.iter().any(|row| row == player_id) {
            return Ok(());
        }

        let hook = self.inner.pre_lock_hook.read().clone();
        if let Some(hook) = hook {
            hook(player_id);
        }

        let start = Instant::now();
        let deadline = start + self.inner.lock_timeout;
        let mut locks = self.inner.locks.lock();
        loop {
            match locks.get(player_id) {
                None => {
                    locks.insert(player_id.to_string(), tx.id);
                    break;
                }
                Some(owner) if *owner == tx.id => break,
                Some(_) => {
                    if self.inner.released.wait_until(&mut locks, deadline).timed_out()
                        && locks.contains_key(player_id)
                    {
                        tracing::warn!(player_id, "row lock wait timed out");
                        return Err(StoreError::LockTimeout {
                            player_id: player_id.to_string(),
                            waited_ms: u64::try_from(start.elapsed().as_millis())
                                .unwrap_or(u64::MAX),
                        });
                    }
                }
            }
        }
        drop(locks);

        tx.locked.push(player_id.to_string());
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Transaction handle of a [`MemoryStore`].
pub struct MemoryTx {
    id: u64,
    inner: Arc<Inner>,
    locked: Vec<PlayerId>,
    writes: Vec<PendingWrite>,
}

impl MemoryTx {
    /// Applies this transaction's own coin writes on top of a committed row.
    fn overlay(&self, mut player: Player) -> Player {
        for write in &self.writes {
            match write {
                PendingWrite::Coin { player_id, coin } if *player_id == player.id => {
                    player.coin = *coin;
                }
                PendingWrite::CoinAndHighScore {
                    player_id,
                    coin,
                    high_score,
                } if *player_id == player.id => {
                    player.coin = *coin;
                    player.high_score = *high_score;
                }
                _ => {}
            }
        }
        player
    }

    fn pending_owns(&self, item: &OwnedItem) -> bool {
        self.writes
            .iter()
            .any(|write| matches!(write, PendingWrite::Own(owned) if owned == item))
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.inner.release(self.id, &self.locked);
        self.locked.clear();
    }
}

impl Transaction for MemoryTx {
    fn commit(mut self) -> StoreResult<()> {
        self.inner.trip(FailPoint::Commit)?;

        let writes = std::mem::take(&mut self.writes);
        let mut tables = self.inner.tables.write();
        for write in writes {
            match write {
                PendingWrite::Coin { player_id, coin } => {
                    if let Some(player) = tables.players.get_mut(&player_id) {
                        player.coin = coin;
                    }
                }
                PendingWrite::CoinAndHighScore {
                    player_id,
                    coin,
                    high_score,
                } => {
                    if let Some(player) = tables.players.get_mut(&player_id) {
                        player.coin = coin;
                        player.high_score = high_score;
                    }
                }
                PendingWrite::Own(item) => {
                    tables
                        .owned
                        .entry(item.player_id)
                        .or_default()
                        .insert(item.item_id);
                }
            }
        }
        Ok(())
    }

    fn rollback(mut self) -> StoreResult<()> {
        self.writes.clear();
        Ok(())
    }
}

impl Database for MemoryStore {
    type Tx = MemoryTx;

    fn begin(&self) -> StoreResult<MemoryTx> {
        Ok(MemoryTx {
            id: self.inner.next_tx.fetch_add(1, Ordering::Relaxed),
            inner: Arc::clone(&self.inner),
            locked: Vec::new(),
            writes: Vec::new(),
        })
    }
}

impl PlayerStore<MemoryTx> for MemoryStore {
    fn insert(&self, player: Player) -> StoreResult<()> {
        let mut tables = self.inner.tables.write();
        if tables.players.contains_key(&player.id) {
            return Err(StoreError::DuplicateKey(format!("player {}", player.id)));
        }
        if tables.tokens.contains_key(&player.auth_token) {
            return Err(StoreError::DuplicateKey("auth token".to_string()));
        }
        tables
            .tokens
            .insert(player.auth_token.clone(), player.id.clone());
        tables.players.insert(player.id.clone(), player);
        Ok(())
    }

    fn get(&self, player_id: &str) -> StoreResult<Option<Player>> {
        Ok(self.inner.tables.read().players.get(player_id).cloned())
    }

    fn find_by_token(&self, token: &str) -> StoreResult<Option<Player>> {
        let tables = self.inner.tables.read();
        Ok(tables
            .tokens
            .get(token)
            .and_then(|id| tables.players.get(id))
            .cloned())
    }

    fn update_name(&self, player_id: &str, name: &str) -> StoreResult<bool> {
        let mut tables = self.inner.tables.write();
        let Some(player) = tables.players.get_mut(player_id) else {
            return Ok(false);
        };
        player.name = name.to_string();
        Ok(true)
    }

    fn select_for_update(&self, tx: &mut MemoryTx, player_id: &str) -> StoreResult<Option<Player>> {
        self.lock_row(tx, player_id)?;
        let committed = self.inner.tables.read().players.get(player_id).cloned();
        Ok(committed.map(|player| tx.overlay(player)))
    }

    fn update_coin(&self, tx: &mut MemoryTx, player_id: &str, coin: u64) -> StoreResult<()> {
        self.inner.trip(FailPoint::UpdateCoin)?;
        self.lock_row(tx, player_id)?;
        tx.writes.push(PendingWrite::Coin {
            player_id: player_id.to_string(),
            coin,
        });
        Ok(())
    }

    fn update_coin_and_high_score(
        &self,
        tx: &mut MemoryTx,
        player_id: &str,
        coin: u64,
        high_score: u64,
    ) -> StoreResult<()> {
        self.inner.trip(FailPoint::UpdateCoin)?;
        self.lock_row(tx, player_id)?;
        tx.writes.push(PendingWrite::CoinAndHighScore {
            player_id: player_id.to_string(),
            coin,
            high_score,
        });
        Ok(())
    }

    fn select_by_high_score_desc(&self, skip: usize, limit: usize) -> StoreResult<Vec<Player>> {
        self.inner.trip(FailPoint::ScoreScan)?;
        let tables = self.inner.tables.read();
        let mut players: Vec<&Player> = tables.players.values().collect();
        players.sort_by(|a, b| b.high_score.cmp(&a.high_score).then_with(|| a.id.cmp(&b.id)));
        Ok(players.into_iter().skip(skip).take(limit).cloned().collect())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.inner.tables.read().players.len())
    }
}

impl InventoryStore<MemoryTx> for MemoryStore {
    fn owned_item_ids(&self, player_id: &str) -> StoreResult<Vec<ItemId>> {
        Ok(self
            .inner
            .tables
            .read()
            .owned
            .get(player_id)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn bulk_insert(&self, tx: &mut MemoryTx, rows: &[OwnedItem]) -> StoreResult<usize> {
        self.inner.trip(FailPoint::BulkInsert)?;

        let tables = self.inner.tables.read();
        let mut fresh = Vec::with_capacity(rows.len());
        for row in rows {
            if tables.owns(row) || tx.pending_owns(row) || fresh.contains(row) {
                continue;
            }
            fresh.push(row.clone());
        }
        drop(tables);

        let inserted = fresh.len();
        tx.writes.extend(fresh.into_iter().map(PendingWrite::Own));
        Ok(inserted)
    }
}

impl ProbabilityTable for MemoryStore {
    fn entries(&self) -> StoreResult<Vec<ProbabilityEntry>> {
        Ok(self.inner.probabilities.read().clone())
    }
}

impl ItemCatalog for MemoryStore {
    fn items(&self) -> StoreResult<Vec<CatalogItem>> {
        Ok(self.inner.catalog.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn store_with_player(coin: u64) -> MemoryStore {
        let store = MemoryStore::new(Duration::from_millis(200));
        store
            .insert(Player::new("p1", "token-1", "alice").with_coin(coin))
            .unwrap();
        store
    }

    fn owned(player: &str, item: &str) -> OwnedItem {
        OwnedItem {
            player_id: player.to_string(),
            item_id: item.to_string(),
        }
    }

    #[test]
    fn test_commit_applies_all_writes() {
        let store = store_with_player(500);
        let mut tx = store.begin().unwrap();
        store.select_for_update(&mut tx, "p1").unwrap().unwrap();
        store
            .bulk_insert(&mut tx, &[owned("p1", "a"), owned("p1", "b")])
            .unwrap();
        store.update_coin(&mut tx, "p1", 300).unwrap();

        // Not visible before commit
        assert_eq!(store.get("p1").unwrap().unwrap().coin, 500);
        assert!(store.owned_item_ids("p1").unwrap().is_empty());

        tx.commit().unwrap();
        assert_eq!(store.get("p1").unwrap().unwrap().coin, 300);
        assert_eq!(store.owned_item_ids("p1").unwrap(), vec!["a", "b"]);
        assert_eq!(store.held_locks(), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let store = store_with_player(500);
        {
            let mut tx = store.begin().unwrap();
            store.update_coin(&mut tx, "p1", 0).unwrap();
            store.bulk_insert(&mut tx, &[owned("p1", "a")]).unwrap();
        }
        assert_eq!(store.get("p1").unwrap().unwrap().coin, 500);
        assert!(store.owned_item_ids("p1").unwrap().is_empty());
        assert_eq!(store.held_locks(), 0);
    }

    #[test]
    fn test_locking_read_sees_own_writes() {
        let store = store_with_player(500);
        let mut tx = store.begin().unwrap();
        store.update_coin(&mut tx, "p1", 123).unwrap();
        let player = store.select_for_update(&mut tx, "p1").unwrap().unwrap();
        assert_eq!(player.coin, 123);
        tx.rollback().unwrap();
    }

    #[test]
    fn test_lock_timeout() {
        let store = store_with_player(500);
        let mut holder = store.begin().unwrap();
        store.select_for_update(&mut holder, "p1").unwrap();

        let mut waiter = store.begin().unwrap();
        let err = store.select_for_update(&mut waiter, "p1").unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        holder.rollback().unwrap();
        assert!(store.select_for_update(&mut waiter, "p1").unwrap().is_some());
    }

    #[test]
    fn test_lock_blocks_until_release() {
        let store = MemoryStore::new(Duration::from_secs(5));
        store
            .insert(Player::new("p1", "t", "alice").with_coin(100))
            .unwrap();

        let mut holder = store.begin().unwrap();
        store.select_for_update(&mut holder, "p1").unwrap();

        let (tx_done, rx_done) = mpsc::channel();
        let other = store.clone();
        let handle = thread::spawn(move || {
            let mut tx = other.begin().unwrap();
            let player = other.select_for_update(&mut tx, "p1").unwrap().unwrap();
            tx_done.send(player.coin).unwrap();
            tx.commit().unwrap();
        });

        // The waiter must not get through while the lock is held
        assert!(rx_done.recv_timeout(Duration::from_millis(100)).is_err());

        store.update_coin(&mut holder, "p1", 40).unwrap();
        holder.commit().unwrap();

        // After commit the waiter sees the new balance
        assert_eq!(rx_done.recv_timeout(Duration::from_secs(5)).unwrap(), 40);
        handle.join().unwrap();
    }

    #[test]
    fn test_bulk_insert_skips_owned_rows() {
        let store = store_with_player(0);
        let mut tx = store.begin().unwrap();
        assert_eq!(store.bulk_insert(&mut tx, &[owned("p1", "a")]).unwrap(), 1);
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        let inserted = store
            .bulk_insert(&mut tx, &[owned("p1", "a"), owned("p1", "b"), owned("p1", "b")])
            .unwrap();
        assert_eq!(inserted, 1);
        tx.commit().unwrap();
        assert_eq!(store.owned_item_ids("p1").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_fail_point_is_one_shot() {
        let store = store_with_player(100);
        store.fail_at(FailPoint::UpdateCoin);

        let mut tx = store.begin().unwrap();
        let err = store.update_coin(&mut tx, "p1", 0).unwrap_err();
        assert_eq!(err, StoreError::InjectedFailure(FailPoint::UpdateCoin));
        store.update_coin(&mut tx, "p1", 0).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.get("p1").unwrap().unwrap().coin, 0);
    }

    #[test]
    fn test_failed_commit_leaves_state_untouched() {
        let store = store_with_player(100);
        store.fail_at(FailPoint::Commit);

        let mut tx = store.begin().unwrap();
        store.update_coin(&mut tx, "p1", 0).unwrap();
        assert!(tx.commit().is_err());
        assert_eq!(store.get("p1").unwrap().unwrap().coin, 100);
        assert_eq!(store.held_locks(), 0);
    }

    #[test]
    fn test_duplicate_player_rejected() {
        let store = store_with_player(0);
        let err = store.insert(Player::new("p1", "other", "bob")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
        let err = store.insert(Player::new("p2", "token-1", "bob")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[test]
    fn test_score_order_breaks_ties_by_id() {
        let store = MemoryStore::default();
        store.insert(Player::new("b", "tb", "b").with_high_score(10)).unwrap();
        store.insert(Player::new("a", "ta", "a").with_high_score(10)).unwrap();
        store.insert(Player::new("c", "tc", "c").with_high_score(50)).unwrap();

        let ids: Vec<_> = store
            .select_by_high_score_desc(0, 10)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(store.select_by_high_score_desc(1, 1).unwrap()[0].id, "a");
        assert!(store.select_by_high_score_desc(3, 10).unwrap().is_empty());
    }
}
