//! # featuredb engine
//!
//! Deterministic core of the featuredb data-access layer.
//!
//! This crate holds everything about reading and writing feature-tracking
//! data that does not need a database connection: the row model, mutations,
//! statements and their PostgreSQL rendering, page tokens, the mapper
//! contracts implemented per table, and the planner that diffs stored rows
//! against a desired-state snapshot.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never talks to a database
//! - **Deterministic**: same inputs always produce the same plans and SQL
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Rows and mutations
//!
//! A [`Row`] maps column names to [`Value`]s. Stored structs convert with
//! [`FromRow`] and [`ToRow`]. Writes are expressed as [`Mutation`]s
//! (insert, update, insert-or-update, delete) that a backend applies
//! atomically.
//!
//! ### Statements
//!
//! A [`Statement`] is either a structured [`Select`] that any backend can
//! evaluate or a raw SQL template with `@name` parameters. [`sql`] renders
//! both for PostgreSQL.
//!
//! ### Mappers
//!
//! Each table gets a unit struct implementing the traits in [`mapper`].
//! Generic readers, writers and synchronizers are written against them.
//!
//! ### Sync planning
//!
//! [`plan_sync`] partitions desired entities into inserts, updates and
//! no-ops, and marks every unclaimed stored row for deletion.
//!
//! ## Quick Start
//!
//! ```rust
//! use featuredb_engine::{decode_cursor, encode_cursor, OffsetCursor};
//!
//! let token = encode_cursor(&OffsetCursor { offset: 50 }).unwrap();
//! let cursor: OffsetCursor = decode_cursor(&token).unwrap();
//! assert_eq!(cursor.offset, 50);
//!
//! assert!(decode_cursor::<OffsetCursor>("garbage!").is_err());
//! ```

pub mod cursor;
pub mod error;
pub mod mapper;
pub mod mutation;
pub mod optional;
pub mod queries;
pub mod reconcile;
pub mod row;
pub mod sql;
pub mod statement;
pub mod value;

// Re-export main types at crate root
pub use cursor::{
    decode_cursor, decode_optional_cursor, encode_cursor, Cursor, DayCursor, OffsetCursor,
    ReleaseCountCursor, ReleaseDateCursor, ReleaseKeyCursor, TimestampKeyCursor,
};
pub use error::{Error, Result};
pub use mapper::{
    CreateMapper, DeleteKeyMapper, ExternalKeyMapper, GetIdMapper, InternalKeyMapper,
    ListMapper, MergeAndCheckChangedMapper, MergeMapper, SelectAllMapper, SelectOneMapper,
    StoredMapper, SyncMapper, TableMapper,
};
pub use mutation::{Mutation, MutationKind};
pub use optional::OptionallySet;
pub use reconcile::{plan_sync, SyncPlan};
pub use row::{FromRow, Row, ToRow};
pub use statement::{CmpOp, Direction, Predicate, Select, Statement};
pub use value::{FromValue, Value};
