//! Generic entity operations.
//!
//! Each operation is written once against the mapper traits from
//! `featuredb_engine::mapper` and works for any table whose mapper
//! implements them. Operations that read and then write run inside a
//! serializable transaction; the `*_in` variants compose into a caller's
//! transaction instead of opening their own.

mod batch;
mod creator;
mod lister;
mod reader;
mod remover;
mod synchronizer;
mod unique_writer;
mod writer;

pub use batch::BatchWriter;
pub use creator::{create, create_in};
pub use lister::{list, Page};
pub use reader::{
    decode_rows, read_all, read_all_in, read_one, read_one_in, read_optional, read_optional_in,
    read_row_by_key, read_row_by_key_in,
};
pub use remover::{remove, remove_by_key, remove_by_key_in};
pub use synchronizer::{sync, sync_until, ChildDeleteMapper, ChildDeletes, SyncReport};
pub use unique_writer::{upsert_unique, upsert_unique_in};
pub use writer::{update, update_in, upsert, upsert_and_get_id, upsert_in};
