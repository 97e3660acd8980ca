//! Checkout/return use-case service.
//!
//! # Responsibility
//! - Expose member self-service checkout/return and staff loan management.
//! - Resolve listing scope (`Own` vs `All`) against the actor's role.
//!
//! # Invariants
//! - `LoanScope::All` and loan assignment are staff-only.
//! - Return authorization (owner or staff) is enforced inside the guard
//!   transaction, before any mutation.

use crate::model::book::BookId;
use crate::model::loan::{Loan, LoanFilter, LoanId, LoanScope};
use crate::model::member::{Actor, MemberId};
use crate::repo::loan_repo::{LoanListQuery, LoanRepository};
use crate::repo::{RepoError, RepoResult};

/// Use-case service wrapper for the loan ledger.
pub struct CirculationService<R: LoanRepository> {
    repo: R,
}

impl<R: LoanRepository> CirculationService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Checks a book out to the acting member.
    ///
    /// # Contract
    /// - Any authenticated member may borrow for themselves.
    /// - Fails with `BookUnavailable` when no copy is on the shelf or the
    ///   checkout race was lost; with `AlreadyBorrowed` when the member
    ///   already holds this title.
    pub fn checkout(&mut self, actor: &Actor, book_id: BookId) -> RepoResult<Loan> {
        self.repo.checkout(book_id, actor.member_id)
    }

    /// Checks a book out on behalf of another member (staff only).
    pub fn assign_loan(
        &mut self,
        actor: &Actor,
        member_id: MemberId,
        book_id: BookId,
    ) -> RepoResult<Loan> {
        if !actor.is_staff() {
            return Err(RepoError::NotAuthorized {
                member_id: actor.member_id,
                action: "assign loans to other members",
            });
        }
        self.repo.checkout(book_id, member_id)
    }

    /// Returns a loan on behalf of the actor.
    ///
    /// Members may return their own loans; staff may force-return any loan.
    /// Returning twice yields `AlreadyReturned` and moves no counter.
    pub fn return_loan(&mut self, actor: &Actor, loan_id: LoanId) -> RepoResult<Loan> {
        self.repo.return_loan(loan_id, actor)
    }

    /// Lists loans newest-first.
    ///
    /// `LoanScope::Own` restricts to the actor's loans; `LoanScope::All`
    /// requires staff rights.
    pub fn list_loans(
        &self,
        actor: &Actor,
        filter: LoanFilter,
        scope: LoanScope,
    ) -> RepoResult<Vec<Loan>> {
        let member = match scope {
            LoanScope::Own => Some(actor.member_id),
            LoanScope::All => {
                if !actor.is_staff() {
                    return Err(RepoError::NotAuthorized {
                        member_id: actor.member_id,
                        action: "list other members' loans",
                    });
                }
                None
            }
        };

        self.repo.list_loans(&LoanListQuery {
            filter,
            member,
            ..LoanListQuery::default()
        })
    }

    /// Full lending history of one book, returned loans included
    /// (staff only).
    pub fn book_history(&self, actor: &Actor, book_id: BookId) -> RepoResult<Vec<Loan>> {
        if !actor.is_staff() {
            return Err(RepoError::NotAuthorized {
                member_id: actor.member_id,
                action: "view a book's lending history",
            });
        }

        self.repo.list_loans(&LoanListQuery {
            filter: LoanFilter::All,
            book: Some(book_id),
            ..LoanListQuery::default()
        })
    }
}
