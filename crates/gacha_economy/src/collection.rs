//! # Collection Bookkeeping
//!
//! Which drawn items are first-time acquisitions, and the per-player
//! completion view over the whole catalog.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{GachaError, GachaResult};
use crate::model::{ItemId, OwnedItem};
use crate::store::{Database, Stores};

/// Result of comparing a batch of selections against what a player owns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewItemPlan {
    /// `is_new[i]` belongs to the i-th selection.
    pub is_new: Vec<bool>,
    /// Rows to insert, in first-seen order, without duplicates.
    pub to_insert: Vec<OwnedItem>,
}

/// Marks first-time acquisitions in draw order.
///
/// A running `seen` set starts from `owned`. An item is new only the first
/// time it appears in `selections`; later repeats in the same batch are not.
#[must_use]
pub fn plan_new_items<S: AsRef<str>>(
    player_id: &str,
    owned: &[S],
    selections: &[ItemId],
) -> NewItemPlan {
    let mut seen: HashSet<&str> = owned.iter().map(|item| item.as_ref()).collect();
    let mut plan = NewItemPlan {
        is_new: Vec::with_capacity(selections.len()),
        to_insert: Vec::new(),
    };

    for item_id in selections {
        let is_new = seen.insert(item_id.as_str());
        if is_new {
            plan.to_insert.push(OwnedItem {
                player_id: player_id.to_string(),
                item_id: item_id.clone(),
            });
        }
        plan.is_new.push(is_new);
    }

    plan
}

/// One line of the collection view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CollectionEntry {
    /// Catalog item id.
    pub item_id: ItemId,
    /// Display name.
    pub name: String,
    /// Rarity tier.
    pub rarity: u8,
    /// Whether the player owns it.
    pub has_item: bool,
}

/// Read-only collection queries.
pub struct CollectionService<D: Database> {
    stores: Stores<D>,
}

impl<D: Database> CollectionService<D> {
    /// Creates a collection service over `stores`.
    #[must_use]
    pub const fn new(stores: Stores<D>) -> Self {
        Self { stores }
    }

    /// Lists every catalog item, in catalog order, flagged with ownership.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::NotFound`] for an unknown player and
    /// [`GachaError::Storage`] on read failure.
    pub fn collection_list(&self, player_id: &str) -> GachaResult<Vec<CollectionEntry>> {
        if self.stores.players.get(player_id)?.is_none() {
            return Err(GachaError::NotFound(format!("player {player_id}")));
        }

        let owned: HashSet<ItemId> = self
            .stores
            .inventory
            .owned_item_ids(player_id)?
            .into_iter()
            .collect();

        Ok(self
            .stores
            .catalog
            .items()?
            .into_iter()
            .map(|item| CollectionEntry {
                has_item: owned.contains(&item.id),
                item_id: item.id,
                name: item.name,
                rarity: item.rarity,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::{CatalogItem, Player};
    use crate::store::{Database, InventoryStore, PlayerStore, Transaction};

    fn ids(items: &[&str]) -> Vec<ItemId> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_repeat_in_batch_is_new_once() {
        let plan = plan_new_items::<&str>("p1", &[], &ids(&["a", "b", "a", "c", "b"]));
        assert_eq!(plan.is_new, vec![true, true, false, true, false]);
        let inserted: Vec<_> = plan.to_insert.iter().map(|o| o.item_id.as_str()).collect();
        assert_eq!(inserted, vec!["a", "b", "c"]);
        assert!(plan.to_insert.iter().all(|o| o.player_id == "p1"));
    }

    #[test]
    fn test_owned_items_are_never_new() {
        let owned = ids(&["a", "b"]);
        let plan = plan_new_items("p1", &owned, &ids(&["a", "b", "a"]));
        assert_eq!(plan.is_new, vec![false, false, false]);
        assert!(plan.to_insert.is_empty());
    }

    #[test]
    fn test_mixed_owned_and_new() {
        let plan = plan_new_items("p1", &["a"], &ids(&["a", "z", "z"]));
        assert_eq!(plan.is_new, vec![false, true, false]);
        assert_eq!(plan.to_insert.len(), 1);
    }

    #[test]
    fn test_collection_list_flags_owned_items() {
        let store = MemoryStore::default();
        store.set_catalog(vec![
            CatalogItem::new("1", "Slime", 1),
            CatalogItem::new("2", "Golem", 2),
            CatalogItem::new("3", "Dragon", 3),
        ]);
        store.insert(Player::new("p1", "t1", "alice")).unwrap();

        let mut tx = store.begin().unwrap();
        store
            .bulk_insert(
                &mut tx,
                &[OwnedItem {
                    player_id: "p1".into(),
                    item_id: "2".into(),
                }],
            )
            .unwrap();
        tx.commit().unwrap();

        let service = CollectionService::new(store.stores());
        let list = service.collection_list("p1").unwrap();
        let flags: Vec<_> = list.iter().map(|e| (e.item_id.as_str(), e.has_item)).collect();
        assert_eq!(flags, vec![("1", false), ("2", true), ("3", false)]);
        assert_eq!(list[2].name, "Dragon");
    }

    #[test]
    fn test_collection_list_unknown_player() {
        let service = CollectionService::new(MemoryStore::default().stores());
        assert!(matches!(
            service.collection_list("ghost"),
            Err(GachaError::NotFound(_))
        ));
    }
}
