//! Declarative schema synchronization for SQLite.
//!
//! Describe the tables a database should have, then [`sync`] a live
//! connection to that description: the engine introspects the current
//! catalog, computes the minimal ordered statement list (plain
//! `ALTER TABLE` where SQLite allows it, a full create-copy-drop-rename
//! rebuild where it does not), and executes everything inside one
//! transaction. Running the same description twice executes nothing the
//! second time.
//!
//! ```
//! use sqlite_schema_sync::{sync, ColumnDef, DataType, Schema, SyncOptions, TableDef};
//!
//! let schema = Schema::new().table(
//!     TableDef::new("users")
//!         .column(ColumnDef::new("id", DataType::Increments))
//!         .column(ColumnDef::new("email", DataType::String).not_null())
//!         .unique(["email"])
//!         .timestamps(),
//! );
//!
//! let mut conn = rusqlite::Connection::open_in_memory().unwrap();
//! let outcome = sync(&mut conn, &schema, &SyncOptions::default());
//! assert!(outcome.is_ready());
//! ```

pub mod diff;
pub mod error;
pub mod introspect;
pub mod schema;
pub mod statements;
pub mod sync;

pub use diff::{FallbackFn, FallbackInfo, default_fallback};
pub use error::{SyncError, SyncResult};
pub use introspect::{ParsedColumn, ParsedIndex, ParsedSchema, ParsedTable, introspect};
pub use schema::{
    ColumnDef, ColumnKind, DataType, DefaultValue, PhysicalType, Schema, TableDef,
};
pub use sync::{
    FailureReport, SyncOptions, SyncOutcome, SyncReport, Truncate, VersionCheck, plan, sync,
};
