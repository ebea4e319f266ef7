//! Mapper contracts.
//!
//! A mapper is a stateless, per-entity strategy type. It supplies the table
//! name, key extraction, the statements used to find rows, and the merge
//! logic between what a caller asks for (the *external* struct) and what is
//! persisted (the *stored* struct). The generic readers, writers, removers
//! and synchronizers are written once against these traits.
//!
//! All functions are associated functions without a receiver: mappers are
//! unit structs used only at the type level.

use crate::cursor::Cursor;
use crate::row::{FromRow, Row, ToRow};
use crate::statement::Statement;
use crate::value::FromValue;
use std::fmt::Debug;
use std::hash::Hash;

/// Names the table an entity lives in.
pub trait TableMapper: Send + Sync + 'static {
    fn table() -> &'static str;
}

/// Selects a single row by key.
pub trait SelectOneMapper: TableMapper {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn select_one(key: &Self::Key) -> Statement;
}

/// Derives the key from a caller-supplied struct.
pub trait ExternalKeyMapper: SelectOneMapper {
    type External: Clone + Send + Sync + 'static;

    fn key_from_external(external: &Self::External) -> Self::Key;
}

/// Describes the persisted shape of an entity.
pub trait StoredMapper: ExternalKeyMapper {
    type Stored: FromRow + ToRow + Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Primary key columns of the table.
    fn key_columns() -> &'static [&'static str];

    /// Build the row to insert when no row exists for the key.
    fn to_stored(external: &Self::External) -> Self::Stored;

    /// Primary key of a stored row.
    fn primary_key_of(stored: &Self::Stored) -> Row {
        stored.to_row().project(Self::key_columns())
    }
}

/// Combines a caller's update with the stored row.
///
/// Must be pure and must only overwrite fields the caller set.
pub trait MergeMapper: StoredMapper {
    fn merge(external: &Self::External, existing: Self::Stored) -> Self::Stored;
}

/// Like [`MergeMapper`], but also reports whether anything changed.
pub trait MergeAndCheckChangedMapper: StoredMapper {
    fn merge_and_check_changed(
        external: &Self::External,
        existing: Self::Stored,
    ) -> (Self::Stored, bool);
}

/// Produces the primary key row used by delete mutations.
pub trait DeleteKeyMapper: SelectOneMapper {
    fn delete_key(key: &Self::Key) -> Row;
}

/// Selects every row of the table.
pub trait SelectAllMapper: TableMapper {
    fn select_all() -> Statement;
}

/// Derives the key from a stored row.
pub trait InternalKeyMapper: StoredMapper {
    fn key_from_stored(stored: &Self::Stored) -> Self::Key;
}

/// Looks up the generated identifier for a key.
pub trait GetIdMapper: SelectOneMapper {
    type Id: FromValue + Clone + Debug + Send + Sync + 'static;

    fn id_column() -> &'static str;

    fn select_id(key: &Self::Key) -> Statement;
}

/// Builds rows for entities whose identifier is generated on creation.
pub trait CreateMapper: TableMapper {
    type Input: Clone + Send + Sync + 'static;
    type Stored: ToRow + Send + Sync + 'static;

    fn new_entity(
        id: &str,
        input: &Self::Input,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self::Stored;
}

/// Builds paged list queries.
pub trait ListMapper: TableMapper {
    type Params: Send + Sync;
    type Cursor: Cursor + Send + Sync;
    type Item: FromRow + Send;

    /// Statement for one page; `limit` already includes the look-ahead row.
    fn select_page(params: &Self::Params, cursor: Option<&Self::Cursor>, limit: i64) -> Statement;

    /// Cursor pointing after `page`, the items being returned to the caller.
    fn next_cursor(
        params: &Self::Params,
        previous: Option<&Self::Cursor>,
        page: &[Self::Item],
    ) -> Option<Self::Cursor>;
}

/// Everything the synchronizer needs from a mapper.
pub trait SyncMapper:
    MergeAndCheckChangedMapper + InternalKeyMapper + SelectAllMapper + DeleteKeyMapper
{
}

impl<T> SyncMapper for T where
    T: MergeAndCheckChangedMapper + InternalKeyMapper + SelectAllMapper + DeleteKeyMapper
{
}
