//! Reconciliation of stored rows with a desired-state snapshot.
//!
//! This is the deterministic half of table synchronization. Given every row
//! currently stored and the full list of entities the caller wants, it
//! produces the plan of inserts, updates and deletes that makes the table
//! match. The store crate executes the plan.
//!
//! # Algorithm
//!
//! 1. Index stored rows by their internal key
//! 2. For each desired entity, look up its external key:
//!    - absent: insert
//!    - present and changed by merge: update
//!    - present and unchanged: no-op
//! 3. Every stored row whose key was not claimed is a delete
//!
//! Inserts and updates keep desired-state order; deletes keep stored order.

use crate::error::{Error, Result};
use crate::mapper::SyncMapper;
use crate::mutation::Mutation;
use crate::row::ToRow;
use std::collections::{HashMap, HashSet};

/// Result of diffing stored rows against desired state.
pub struct SyncPlan<M: SyncMapper> {
    /// Rows to insert
    pub inserts: Vec<M::Stored>,
    /// Merged rows whose contents changed
    pub updates: Vec<M::Stored>,
    /// Stored rows with no desired counterpart
    pub deletes: Vec<M::Stored>,
    /// Desired entities that matched a stored row without changes
    pub unchanged: usize,
}

impl<M: SyncMapper> SyncPlan<M> {
    /// Insert and update mutations, inserts first.
    pub fn upsert_mutations(&self) -> Vec<Mutation> {
        let table = M::table();
        let mut mutations = Vec::with_capacity(self.inserts.len() + self.updates.len());
        mutations.extend(
            self.inserts
                .iter()
                .map(|stored| Mutation::insert(table, stored.to_row())),
        );
        mutations.extend(self.updates.iter().map(|stored| {
            Mutation::insert_or_update(table, M::key_columns(), stored.to_row())
        }));
        mutations
    }

    /// Delete mutations for the parent table.
    pub fn delete_mutations(&self) -> Vec<Mutation> {
        self.deletes
            .iter()
            .map(|stored| Mutation::delete(M::table(), M::delete_key(&M::key_from_stored(stored))))
            .collect()
    }

    /// Number of insert and update mutations.
    pub fn upsert_count(&self) -> usize {
        self.inserts.len() + self.updates.len()
    }

    /// Check whether the plan changes nothing.
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

impl<M: SyncMapper> std::fmt::Debug for SyncPlan<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPlan")
            .field("table", &M::table())
            .field("inserts", &self.inserts)
            .field("updates", &self.updates)
            .field("deletes", &self.deletes)
            .field("unchanged", &self.unchanged)
            .finish()
    }
}

/// Diff stored rows against the desired state.
///
/// Desired state naming the same key twice is rejected with
/// [`Error::DuplicateKey`].
pub fn plan_sync<M: SyncMapper>(
    stored: Vec<M::Stored>,
    desired: &[M::External],
) -> Result<SyncPlan<M>> {
    let mut existing: HashMap<M::Key, M::Stored> = HashMap::with_capacity(stored.len());
    let mut stored_order: Vec<M::Key> = Vec::with_capacity(stored.len());
    for row in stored {
        let key = M::key_from_stored(&row);
        if !existing.contains_key(&key) {
            stored_order.push(key.clone());
            existing.insert(key, row);
        }
    }

    let mut claimed: HashSet<M::Key> = HashSet::with_capacity(desired.len());
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    let mut unchanged = 0;

    for entity in desired {
        let key = M::key_from_external(entity);
        if !claimed.insert(key.clone()) {
            return Err(Error::DuplicateKey(format!("{:?}", key)));
        }

        match existing.remove(&key) {
            Some(current) => {
                let (merged, changed) = M::merge_and_check_changed(entity, current);
                if changed {
                    updates.push(merged);
                } else {
                    unchanged += 1;
                }
            }
            None => inserts.push(M::to_stored(entity)),
        }
    }

    let deletes = stored_order
        .into_iter()
        .filter_map(|key| existing.remove(&key))
        .collect();

    Ok(SyncPlan {
        inserts,
        updates,
        deletes,
        unchanged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{
        DeleteKeyMapper, ExternalKeyMapper, InternalKeyMapper, MergeAndCheckChangedMapper,
        SelectAllMapper, SelectOneMapper, StoredMapper, TableMapper,
    };
    use crate::mutation::MutationKind;
    use crate::row::{FromRow, Row};
    use crate::statement::{Select, Statement};

    #[derive(Debug, Clone, PartialEq)]
    struct Gadget {
        name: String,
        size: i64,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct StoredGadget {
        id: String,
        gadget: Gadget,
    }

    impl FromRow for StoredGadget {
        fn from_row(row: &Row) -> crate::Result<Self> {
            Ok(StoredGadget {
                id: row.try_get("ID")?,
                gadget: Gadget {
                    name: row.try_get("Name")?,
                    size: row.try_get("Size")?,
                },
            })
        }
    }

    impl ToRow for StoredGadget {
        fn to_row(&self) -> Row {
            Row::new()
                .with("ID", &self.id)
                .with("Name", &self.gadget.name)
                .with("Size", self.gadget.size)
        }
    }

    struct GadgetMapper;

    impl TableMapper for GadgetMapper {
        fn table() -> &'static str {
            "Gadgets"
        }
    }

    impl SelectOneMapper for GadgetMapper {
        type Key = String;
        fn select_one(key: &String) -> Statement {
            Select::from_table("Gadgets").filter_eq("Name", key).into()
        }
    }

    impl ExternalKeyMapper for GadgetMapper {
        type External = Gadget;
        fn key_from_external(external: &Gadget) -> String {
            external.name.clone()
        }
    }

    impl StoredMapper for GadgetMapper {
        type Stored = StoredGadget;
        fn key_columns() -> &'static [&'static str] {
            &["ID"]
        }
        fn to_stored(external: &Gadget) -> StoredGadget {
            StoredGadget {
                id: format!("id-{}", external.name),
                gadget: external.clone(),
            }
        }
    }

    impl MergeAndCheckChangedMapper for GadgetMapper {
        fn merge_and_check_changed(external: &Gadget, existing: StoredGadget) -> (StoredGadget, bool) {
            let changed = existing.gadget != *external;
            (
                StoredGadget {
                    id: existing.id,
                    gadget: external.clone(),
                },
                changed,
            )
        }
    }

    impl InternalKeyMapper for GadgetMapper {
        fn key_from_stored(stored: &StoredGadget) -> String {
            stored.gadget.name.clone()
        }
    }

    impl SelectAllMapper for GadgetMapper {
        fn select_all() -> Statement {
            Select::from_table("Gadgets").into()
        }
    }

    impl DeleteKeyMapper for GadgetMapper {
        fn delete_key(key: &String) -> Row {
            Row::new().with("ID", format!("id-{}", key))
        }
    }

    fn gadget(name: &str, size: i64) -> Gadget {
        Gadget {
            name: name.into(),
            size,
        }
    }

    fn stored(name: &str, size: i64) -> StoredGadget {
        GadgetMapper::to_stored(&gadget(name, size))
    }

    #[test]
    fn plan_partitions_desired_state() {
        // Stored {A, D}; desired {A', B, C}
        let plan = plan_sync::<GadgetMapper>(
            vec![stored("a", 1), stored("d", 4)],
            &[gadget("a", 10), gadget("b", 2), gadget("c", 3)],
        )
        .unwrap();

        assert_eq!(plan.inserts, vec![stored("b", 2), stored("c", 3)]);
        assert_eq!(plan.updates, vec![stored("a", 10)]);
        assert_eq!(plan.deletes, vec![stored("d", 4)]);
        assert_eq!(plan.unchanged, 0);
    }

    #[test]
    fn unchanged_rows_produce_no_mutations() {
        let plan = plan_sync::<GadgetMapper>(
            vec![stored("a", 1), stored("b", 2)],
            &[gadget("a", 1), gadget("b", 2)],
        )
        .unwrap();

        assert!(plan.is_noop());
        assert_eq!(plan.unchanged, 2);
        assert!(plan.upsert_mutations().is_empty());
    }

    #[test]
    fn empty_desired_state_deletes_everything() {
        let plan = plan_sync::<GadgetMapper>(vec![stored("a", 1), stored("b", 2)], &[]).unwrap();

        let deletes = plan.delete_mutations();
        assert_eq!(deletes.len(), 2);
        assert!(deletes.iter().all(|m| m.kind() == MutationKind::Delete));
        assert_eq!(deletes[0].row(), &Row::new().with("ID", "id-a"));
    }

    #[test]
    fn duplicate_desired_keys_rejected() {
        let err =
            plan_sync::<GadgetMapper>(vec![], &[gadget("a", 1), gadget("a", 2)]).unwrap_err();
        assert_eq!(err, Error::DuplicateKey("\"a\"".into()));
    }

    #[test]
    fn upsert_mutations_put_inserts_first() {
        let plan = plan_sync::<GadgetMapper>(
            vec![stored("a", 1)],
            &[gadget("a", 5), gadget("z", 26)],
        )
        .unwrap();

        let kinds: Vec<_> = plan.upsert_mutations().iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec![MutationKind::Insert, MutationKind::InsertOrUpdate]);
        assert_eq!(plan.upsert_count(), 2);
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        fn arb_table() -> impl Strategy<Value = BTreeMap<String, i64>> {
            prop::collection::btree_map("[a-f]", 0i64..4, 0..6)
        }

        proptest! {
            #[test]
            fn prop_plan_converges(stored_state in arb_table(), desired_state in arb_table()) {
                let stored_rows: Vec<StoredGadget> =
                    stored_state.iter().map(|(k, v)| stored(k, *v)).collect();
                let desired: Vec<Gadget> =
                    desired_state.iter().map(|(k, v)| gadget(k, *v)).collect();

                let plan = plan_sync::<GadgetMapper>(stored_rows, &desired).unwrap();

                // Every desired entity lands in exactly one bucket
                prop_assert_eq!(
                    plan.inserts.len() + plan.updates.len() + plan.unchanged,
                    desired.len()
                );

                let mut table = stored_state.clone();
                for row in plan.deletes.iter() {
                    table.remove(&row.gadget.name);
                }
                for row in plan.inserts.iter().chain(plan.updates.iter()) {
                    table.insert(row.gadget.name.clone(), row.gadget.size);
                }
                prop_assert_eq!(table, desired_state);
            }

            #[test]
            fn prop_second_plan_is_noop(stored_state in arb_table(), desired_state in arb_table()) {
                let stored_rows: Vec<StoredGadget> =
                    stored_state.iter().map(|(k, v)| stored(k, *v)).collect();
                let desired: Vec<Gadget> =
                    desired_state.iter().map(|(k, v)| gadget(k, *v)).collect();
                let first = plan_sync::<GadgetMapper>(stored_rows, &desired).unwrap();

                let after: Vec<StoredGadget> = desired.iter().map(GadgetMapper::to_stored).collect();
                let second = plan_sync::<GadgetMapper>(after, &desired).unwrap();

                prop_assert!(second.is_noop());
                prop_assert_eq!(second.unchanged, desired.len());
                prop_assert!(first.deletes.iter().all(|d| !desired_state.contains_key(&d.gadget.name)));
            }
        }
    }
}
