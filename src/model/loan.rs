//! Loan domain model.
//!
//! # Responsibility
//! - Represent a single lending transaction between a member and a book.
//! - Keep the active/returned state machine explicit.
//!
//! # Invariants
//! - A loan is `Active` exactly when `returned_at` is `None`.
//! - Loans transition `Active -> Returned` once and are never reopened.
//! - Loans are never deleted, except when their book is removed from the
//!   catalogue (historical cascade).

use crate::model::book::BookId;
use crate::model::member::MemberId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a lending transaction.
pub type LoanId = Uuid;

/// Lifecycle state of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Book is currently checked out.
    Active,
    /// Book has been returned; `returned_at` is set.
    Returned,
}

/// One lending transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Stable global ID.
    pub uuid: LoanId,
    pub book_id: BookId,
    pub member_id: MemberId,
    /// Checkout timestamp in epoch milliseconds, assigned by the store.
    pub checked_out_at: i64,
    /// Return timestamp in epoch milliseconds; `None` while active.
    pub returned_at: Option<i64>,
    pub status: LoanStatus,
}

impl Loan {
    /// Returns whether this loan still holds a copy.
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

/// Status filter for loan listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoanFilter {
    #[default]
    All,
    Active,
    Returned,
}

/// Visibility scope for loan listings.
///
/// `All` is a staff-only scope; services reject it for regular members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoanScope {
    /// Only the calling member's own loans.
    #[default]
    Own,
    /// Every member's loans.
    All,
}
