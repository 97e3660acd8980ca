//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for catalogue, loans
//!   and the member roster.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes must run model validation before SQL mutations.
//! - Guard operations translate storage constraint violations into domain
//!   errors; raw SQLite errors never escape as availability answers.
//! - Repository APIs return semantic errors (`BookNotFound`,
//!   `AlreadyReturned`, ...) in addition to DB transport errors.

use crate::db::DbError;
use crate::model::book::{BookId, BookValidationError};
use crate::model::loan::LoanId;
use crate::model::member::{MemberId, MemberValidationError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod book_repo;
pub mod loan_repo;
pub mod member_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for catalogue, loan and roster operations.
///
/// Every variant except `Db` and the connection-readiness ones is a
/// recoverable, user-facing outcome.
#[derive(Debug)]
pub enum RepoError {
    BookValidation(BookValidationError),
    MemberValidation(MemberValidationError),
    Db(DbError),
    BookNotFound(BookId),
    MemberNotFound(MemberId),
    LoanNotFound(LoanId),
    /// Checkout race lost or no copies left.
    BookUnavailable(BookId),
    /// The member already holds an active loan for this book.
    AlreadyBorrowed {
        book_id: BookId,
        member_id: MemberId,
    },
    /// Idempotence guard: the loan was returned earlier.
    AlreadyReturned(LoanId),
    /// Caller is neither the resource owner nor staff.
    NotAuthorized {
        member_id: MemberId,
        action: &'static str,
    },
    /// Book deletion refused while copies are checked out.
    HasActiveLoans {
        book_id: BookId,
        active_loans: u32,
    },
    /// Copy-count resize refused below the number currently checked out.
    CopiesBelowActiveLoans {
        book_id: BookId,
        active_loans: u32,
    },
    DuplicateIsbn(String),
    DuplicateMemberName(String),
    /// Persisted state failed row-level decoding.
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BookValidation(err) => write!(f, "{err}"),
            Self::MemberValidation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::BookNotFound(id) => write!(f, "book not found: {id}"),
            Self::MemberNotFound(id) => write!(f, "member not found: {id}"),
            Self::LoanNotFound(id) => write!(f, "loan not found: {id}"),
            Self::BookUnavailable(id) => {
                write!(f, "no copies of book {id} are currently available")
            }
            Self::AlreadyBorrowed { book_id, member_id } => write!(
                f,
                "member {member_id} already has an active loan for book {book_id}"
            ),
            Self::AlreadyReturned(id) => write!(f, "loan {id} has already been returned"),
            Self::NotAuthorized { member_id, action } => {
                write!(f, "member {member_id} is not allowed to {action}")
            }
            Self::HasActiveLoans {
                book_id,
                active_loans,
            } => write!(
                f,
                "cannot delete book {book_id}: {active_loans} active loan(s) exist"
            ),
            Self::CopiesBelowActiveLoans {
                book_id,
                active_loans,
            } => write!(
                f,
                "cannot reduce copies of book {book_id} below the {active_loans} currently checked out"
            ),
            Self::DuplicateIsbn(isbn) => {
                write!(f, "a book with ISBN {isbn} already exists")
            }
            Self::DuplicateMemberName(name) => {
                write!(f, "a member named `{name}` already exists")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it via db::open_db"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BookValidation(err) => Some(err),
            Self::MemberValidation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BookValidationError> for RepoError {
    fn from(value: BookValidationError) -> Self {
        Self::BookValidation(value)
    }
}

impl From<MemberValidationError> for RepoError {
    fn from(value: MemberValidationError) -> Self {
        Self::MemberValidation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Returns whether an error is a SQLite constraint violation.
///
/// The loan guard uses this to translate commit-time arbiter failures into
/// domain errors at the call site where the violated constraint is known.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

pub(crate) fn ensure_schema_current(conn: &Connection) -> RepoResult<()> {
    let expected = crate::db::migrations::latest_version();
    let actual: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual != expected {
        return Err(RepoError::UninitializedConnection {
            expected_version: expected,
            actual_version: actual,
        });
    }
    Ok(())
}

pub(crate) fn ensure_tables_ready(
    conn: &Connection,
    required: &[(&'static str, &[&'static str])],
) -> RepoResult<()> {
    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for column in *columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
