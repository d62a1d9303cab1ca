//! Synchronization orchestrator
//!
//! Drives one run end to end: optional integrity pre-flight, version gate,
//! introspection, planning, and transactional execution. [`sync`] never
//! returns a bare error; every failure is wrapped in [`SyncOutcome`] so a
//! caller can treat synchronization as a readiness check.

use crate::diff::{self, FallbackFn, FallbackInfo};
use crate::error::{SyncError, SyncResult};
use crate::introspect::{self, ParsedSchema};
use crate::schema::Schema;
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// Which existing tables should be dropped and recreated empty instead of
/// diffed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Truncate {
    #[default]
    No,
    All,
    Tables(Vec<String>),
}

impl Truncate {
    fn applies_to(&self, table: &str) -> bool {
        match self {
            Self::No => false,
            Self::All => true,
            Self::Tables(names) => names.iter().any(|n| n == table),
        }
    }
}

/// Version gate settings. The current version is written immediately after
/// the check and before any diffing, so an interrupted or failed run leaves
/// a visible version/schema mismatch instead of a stale match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionCheck {
    /// Version to record in `PRAGMA user_version`
    pub current: i32,
    /// Skip the run entirely when the stored version already matches
    pub skip_when_same: bool,
}

impl VersionCheck {
    pub fn new(current: i32) -> Self {
        Self {
            current,
            skip_when_same: true,
        }
    }

    /// Record the version but run the full diff even when the stored
    /// version already matches
    #[must_use]
    pub fn always_run(mut self) -> Self {
        self.skip_when_same = false;
        self
    }
}

/// Options for one synchronization run
pub struct SyncOptions {
    /// Schema version gate. The new version is written before diffing;
    /// `skip_when_same` controls whether a matching stored version skips
    /// the run entirely.
    pub version: Option<VersionCheck>,
    /// Table-name prefixes hidden from introspection and never touched
    pub exclude_prefixes: Vec<String>,
    /// Tables to drop and recreate empty regardless of their diff
    pub truncate: Truncate,
    /// Run `PRAGMA integrity_check` before doing anything else
    pub integrity_check: bool,
    /// Emit each executed statement at debug level
    pub log: bool,
    /// Override for the literal used to fill NOT NULL columns that have no
    /// source value during a rebuild
    pub fallback: Option<Box<FallbackFn>>,
    /// Invoked after a successful run (including a version skip)
    pub on_success: Option<Box<dyn Fn(&SyncReport) + Send + Sync>>,
    /// Invoked after a failed run, before the error is returned
    pub on_fail: Option<Box<dyn Fn(&FailureReport<'_>) + Send + Sync>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            version: None,
            exclude_prefixes: vec!["sqlite_".to_string()],
            truncate: Truncate::No,
            integrity_check: false,
            log: false,
            fallback: None,
            on_success: None,
            on_fail: None,
        }
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate on `version`, skipping the run when the stored version matches
    #[must_use]
    pub fn version(mut self, version: i32) -> Self {
        self.version = Some(VersionCheck::new(version));
        self
    }

    #[must_use]
    pub fn version_check(mut self, check: VersionCheck) -> Self {
        self.version = Some(check);
        self
    }

    #[must_use]
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_prefixes.push(prefix.into());
        self
    }

    #[must_use]
    pub fn truncate(mut self, truncate: Truncate) -> Self {
        self.truncate = truncate;
        self
    }

    #[must_use]
    pub fn integrity_check(mut self) -> Self {
        self.integrity_check = true;
        self
    }

    #[must_use]
    pub fn log_statements(mut self) -> Self {
        self.log = true;
        self
    }

    #[must_use]
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&FallbackInfo<'_>) -> String + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    #[must_use]
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SyncReport) + Send + Sync + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_fail<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FailureReport<'_>) + Send + Sync + 'static,
    {
        self.on_fail = Some(Box::new(callback));
        self
    }
}

/// What a successful run did
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    /// The run was skipped because the stored version already matched
    pub skipped: bool,
    /// `PRAGMA user_version` before the run
    pub previous_version: i32,
    /// The catalog as introspected before any statement executed
    pub previous_schema: ParsedSchema,
    /// Every statement executed, in order
    pub statements: Vec<String>,
}

/// Context handed to the failure callback
pub struct FailureReport<'a> {
    pub error: &'a SyncError,
    /// The statement that failed, when execution had begun
    pub statement: Option<&'a str>,
    /// The catalog as introspected before the failure; `None` when the
    /// failure preceded introspection
    pub previous_schema: Option<&'a ParsedSchema>,
    /// The schema the run was converging to
    pub target: &'a Schema,
}

/// Result of a synchronization run. A failed run leaves the database
/// untouched: every statement executes inside one transaction that is
/// rolled back on the first error.
#[derive(Debug)]
pub enum SyncOutcome {
    Ready(SyncReport),
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Ready(report) => Some(report),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Ready(_) => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// Synchronize the database behind `conn` to `schema`
pub fn sync(conn: &mut Connection, schema: &Schema, options: &SyncOptions) -> SyncOutcome {
    let mut snapshot = None;
    match run(conn, schema, options, &mut snapshot) {
        Ok(report) => {
            if let Some(callback) = &options.on_success {
                callback(&report);
            }
            SyncOutcome::Ready(report)
        }
        Err(error) => {
            warn!(error = %error, "schema synchronization failed");
            if let Some(callback) = &options.on_fail {
                callback(&FailureReport {
                    statement: error.failed_statement(),
                    error: &error,
                    previous_schema: snapshot.as_ref(),
                    target: schema,
                });
            }
            SyncOutcome::Failed(error)
        }
    }
}

/// Compute the statements a run would execute, without executing them.
/// Ignores the version gate.
pub fn plan(conn: &Connection, schema: &Schema, options: &SyncOptions) -> SyncResult<Vec<String>> {
    let existing = introspect::introspect(conn, &options.exclude_prefixes)?;
    diff::plan_schema(&existing, schema, options.fallback.as_deref(), &|table| {
        options.truncate.applies_to(table)
    })
}

fn run(
    conn: &mut Connection,
    schema: &Schema,
    options: &SyncOptions,
    snapshot: &mut Option<ParsedSchema>,
) -> SyncResult<SyncReport> {
    if options.integrity_check {
        check_integrity(conn)?;
    }

    let previous_version = read_version(conn)?;
    if let Some(check) = options.version {
        if check.skip_when_same && check.current == previous_version {
            debug!(version = check.current, "stored schema version matches, skipping");
            return Ok(SyncReport {
                skipped: true,
                previous_version,
                ..SyncReport::default()
            });
        }
        // Written before diffing and outside the statement transaction: a
        // run that fails or is interrupted past this point leaves a
        // version/schema mismatch rather than a stale match.
        conn.pragma_update(None, "user_version", check.current)?;
    }

    let previous_schema = introspect::introspect(conn, &options.exclude_prefixes)?;
    *snapshot = Some(previous_schema.clone());
    let statements = diff::plan_schema(
        &previous_schema,
        schema,
        options.fallback.as_deref(),
        &|table| options.truncate.applies_to(table),
    )?;
    debug!(count = statements.len(), "planned statements");

    let tx = conn.transaction()?;
    for statement in &statements {
        if options.log {
            debug!(statement = %statement, "executing");
        }
        tx.execute_batch(statement)
            .map_err(|source| SyncError::Execution {
                statement: statement.clone(),
                source,
            })?;
    }
    tx.commit()?;

    info!(
        executed = statements.len(),
        from_version = previous_version,
        "schema synchronized"
    );
    Ok(SyncReport {
        skipped: false,
        previous_version,
        previous_schema,
        statements,
    })
}

fn read_version(conn: &Connection) -> SyncResult<i32> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn check_integrity(conn: &Connection) -> SyncResult<()> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result == "ok" {
        Ok(())
    } else {
        Err(SyncError::Integrity(result))
    }
}
