//! Loan ledger contract and the SQLite checkout/return guard.
//!
//! # Responsibility
//! - Provide the transactional checkout and return operations.
//! - Keep the loan ledger append-only (returns flip state, never delete).
//!
//! # Invariants
//! - `available_copies = total_copies - count(active loans)` for every book
//!   after every committed transaction.
//! - At most one active loan per (member, book) pair, enforced by a partial
//!   unique index.
//! - The in-transaction pre-checks only fail fast with a friendly error;
//!   final arbitration is the conditional counter update plus the storage
//!   constraints, whose violations are translated into domain errors.
//! - Any early return rolls the transaction back fully: no partial loan, no
//!   partial counter change.

use crate::model::book::BookId;
use crate::model::loan::{Loan, LoanFilter, LoanId, LoanStatus};
use crate::model::member::{Actor, MemberId};
use crate::repo::{
    ensure_schema_current, ensure_tables_ready, is_constraint_violation, RepoError, RepoResult,
};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use std::time::Instant;
use uuid::Uuid;

const LOANS_DEFAULT_LIMIT: u32 = 50;
const LOANS_LIMIT_MAX: u32 = 200;

const LOAN_SELECT_SQL: &str = "SELECT
    uuid,
    book_uuid,
    member_uuid,
    checked_out_at,
    returned_at,
    status
FROM loans";

/// Query options for loan listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanListQuery {
    pub filter: LoanFilter,
    /// Restrict to one member's loans. Scope policy lives in the service
    /// layer; the repository just applies the filter it is given.
    pub member: Option<MemberId>,
    /// Restrict to one book's lending history.
    pub book: Option<BookId>,
    /// Maximum rows to return. Defaults to 50 and clamps to 200.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for the loan ledger.
pub trait LoanRepository {
    /// Atomically checks a book out to a member.
    fn checkout(&mut self, book_id: BookId, member_id: MemberId) -> RepoResult<Loan>;
    /// Atomically returns a loan on behalf of `actor` (owner or staff).
    fn return_loan(&mut self, loan_id: LoanId, actor: &Actor) -> RepoResult<Loan>;
    /// Gets one loan by id.
    fn find_loan(&self, loan_id: LoanId) -> RepoResult<Option<Loan>>;
    /// Lists loans newest-first using status/member/book filters.
    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<Loan>>;
    /// Counts active loans for a book.
    fn active_loan_count(&self, book_id: BookId) -> RepoResult<u32>;
}

/// SQLite-backed loan ledger and guard.
pub struct SqliteLoanRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteLoanRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_schema_current(conn)?;
        ensure_tables_ready(
            conn,
            &[
                (
                    "loans",
                    &[
                        "uuid",
                        "book_uuid",
                        "member_uuid",
                        "checked_out_at",
                        "returned_at",
                        "status",
                    ],
                ),
                ("books", &["uuid", "available_copies"]),
                ("members", &["uuid", "role"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl LoanRepository for SqliteLoanRepository<'_> {
    fn checkout(&mut self, book_id: BookId, member_id: MemberId) -> RepoResult<Loan> {
        let started_at = Instant::now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(available) = available_copies_in_tx(&tx, book_id)? else {
            return Err(RepoError::BookNotFound(book_id));
        };
        if !member_exists_in_tx(&tx, member_id)? {
            return Err(RepoError::MemberNotFound(member_id));
        }

        // Fail-fast pre-checks. Correctness does not depend on them: the
        // conditional decrement and the partial unique index arbitrate at
        // commit time.
        if available == 0 {
            info!(
                "event=checkout module=loans status=denied reason=book_unavailable book={book_id} member={member_id}"
            );
            return Err(RepoError::BookUnavailable(book_id));
        }
        if has_active_loan_in_tx(&tx, book_id, member_id)? {
            info!(
                "event=checkout module=loans status=denied reason=already_borrowed book={book_id} member={member_id}"
            );
            return Err(RepoError::AlreadyBorrowed { book_id, member_id });
        }

        let loan_id: LoanId = Uuid::new_v4();
        tx.execute(
            "INSERT INTO loans (
                uuid,
                book_uuid,
                member_uuid,
                checked_out_at,
                returned_at,
                status
            ) VALUES (?1, ?2, ?3, (strftime('%s', 'now') * 1000), NULL, 'active');",
            params![
                loan_id.to_string(),
                book_id.to_string(),
                member_id.to_string(),
            ],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                RepoError::AlreadyBorrowed { book_id, member_id }
            } else {
                err.into()
            }
        })?;

        let changed = tx
            .execute(
                "UPDATE books
                 SET available_copies = available_copies - 1
                 WHERE uuid = ?1
                   AND available_copies > 0;",
                [book_id.to_string()],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    RepoError::BookUnavailable(book_id)
                } else {
                    err.into()
                }
            })?;
        if changed == 0 {
            info!(
                "event=checkout module=loans status=denied reason=race_lost book={book_id} member={member_id}"
            );
            return Err(RepoError::BookUnavailable(book_id));
        }

        let loan = load_loan_required(&tx, loan_id)?;
        tx.commit()?;

        info!(
            "event=checkout module=loans status=ok book={book_id} member={member_id} loan={loan_id} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(loan)
    }

    fn return_loan(&mut self, loan_id: LoanId, actor: &Actor) -> RepoResult<Loan> {
        let started_at = Instant::now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(loan) = load_loan_in_tx(&tx, loan_id)? else {
            return Err(RepoError::LoanNotFound(loan_id));
        };

        // Owner-or-staff check before any mutation.
        if !actor.is_staff() && actor.member_id != loan.member_id {
            info!(
                "event=return_loan module=loans status=denied reason=not_authorized loan={loan_id} actor={}",
                actor.member_id
            );
            return Err(RepoError::NotAuthorized {
                member_id: actor.member_id,
                action: "return this loan",
            });
        }

        if loan.status == LoanStatus::Returned {
            return Err(RepoError::AlreadyReturned(loan_id));
        }

        // The status condition is the atomic idempotence arbiter; the
        // counter below moves only when this row actually flips.
        let changed = tx.execute(
            "UPDATE loans
             SET
                returned_at = (strftime('%s', 'now') * 1000),
                status = 'returned'
             WHERE uuid = ?1
               AND status = 'active';",
            [loan_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::AlreadyReturned(loan_id));
        }

        tx.execute(
            "UPDATE books
             SET available_copies = available_copies + 1
             WHERE uuid = ?1;",
            [loan.book_id.to_string()],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                RepoError::InvalidData(format!(
                    "returning loan {loan_id} would push book {} above its total copies",
                    loan.book_id
                ))
            } else {
                err.into()
            }
        })?;

        let returned = load_loan_required(&tx, loan_id)?;
        tx.commit()?;

        info!(
            "event=return_loan module=loans status=ok loan={loan_id} book={} actor={} duration_ms={}",
            loan.book_id,
            actor.member_id,
            started_at.elapsed().as_millis()
        );
        Ok(returned)
    }

    fn find_loan(&self, loan_id: LoanId) -> RepoResult<Option<Loan>> {
        let sql = format!("{LOAN_SELECT_SQL} WHERE uuid = ?1;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([loan_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_loan_row(row)?));
        }
        Ok(None)
    }

    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<Loan>> {
        let mut sql = format!("{LOAN_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        match query.filter {
            LoanFilter::All => {}
            LoanFilter::Active => sql.push_str(" AND status = 'active'"),
            LoanFilter::Returned => sql.push_str(" AND status = 'returned'"),
        }

        if let Some(member_id) = query.member {
            sql.push_str(" AND member_uuid = ?");
            bind_values.push(Value::Text(member_id.to_string()));
        }

        if let Some(book_id) = query.book {
            sql.push_str(" AND book_uuid = ?");
            bind_values.push(Value::Text(book_id.to_string()));
        }

        sql.push_str(" ORDER BY checked_out_at DESC, uuid ASC");
        let limit = normalize_loan_limit(query.limit);
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut loans = Vec::new();
        while let Some(row) = rows.next()? {
            loans.push(parse_loan_row(row)?);
        }

        Ok(loans)
    }

    fn active_loan_count(&self, book_id: BookId) -> RepoResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM loans
             WHERE book_uuid = ?1
               AND status = 'active';",
            [book_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Normalizes list limit according to the loan listing contract.
pub fn normalize_loan_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) => LOANS_DEFAULT_LIMIT,
        Some(value) if value > LOANS_LIMIT_MAX => LOANS_LIMIT_MAX,
        Some(value) => value,
        None => LOANS_DEFAULT_LIMIT,
    }
}

fn available_copies_in_tx(tx: &Transaction<'_>, book_id: BookId) -> RepoResult<Option<u32>> {
    let mut stmt = tx.prepare("SELECT available_copies FROM books WHERE uuid = ?1;")?;
    let mut rows = stmt.query([book_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(row.get(0)?));
    }
    Ok(None)
}

fn member_exists_in_tx(tx: &Transaction<'_>, member_id: MemberId) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM members WHERE uuid = ?1);",
        [member_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn has_active_loan_in_tx(
    tx: &Transaction<'_>,
    book_id: BookId,
    member_id: MemberId,
) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM loans
            WHERE book_uuid = ?1
              AND member_uuid = ?2
              AND status = 'active'
        );",
        params![book_id.to_string(), member_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn load_loan_in_tx(tx: &Transaction<'_>, loan_id: LoanId) -> RepoResult<Option<Loan>> {
    let sql = format!("{LOAN_SELECT_SQL} WHERE uuid = ?1;");
    let mut stmt = tx.prepare(&sql)?;
    let mut rows = stmt.query([loan_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_loan_row(row)?));
    }
    Ok(None)
}

fn load_loan_required(tx: &Transaction<'_>, loan_id: LoanId) -> RepoResult<Loan> {
    load_loan_in_tx(tx, loan_id)?.ok_or(RepoError::LoanNotFound(loan_id))
}

fn parse_loan_row(row: &rusqlite::Row<'_>) -> RepoResult<Loan> {
    let uuid = parse_uuid_column(row, "uuid")?;
    let book_id = parse_uuid_column(row, "book_uuid")?;
    let member_id = parse_uuid_column(row, "member_uuid")?;

    let status_text: String = row.get("status")?;
    let status = match status_text.as_str() {
        "active" => LoanStatus::Active,
        "returned" => LoanStatus::Returned,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid loan status `{other}` in loans.status"
            )));
        }
    };

    let returned_at: Option<i64> = row.get("returned_at")?;
    if (status == LoanStatus::Active) != returned_at.is_none() {
        return Err(RepoError::InvalidData(format!(
            "loan {uuid} status `{status_text}` conflicts with its return timestamp"
        )));
    }

    Ok(Loan {
        uuid,
        book_id,
        member_id,
        checked_out_at: row.get("checked_out_at")?,
        returned_at,
        status,
    })
}

fn parse_uuid_column(row: &rusqlite::Row<'_>, column: &'static str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{text}` in loans.{column}"))
    })
}
