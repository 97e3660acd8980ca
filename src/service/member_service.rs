//! Member roster use-case service.
//!
//! # Responsibility
//! - Register members and read identity back for callers.
//! - Provide the staff borrower roster.
//!
//! # Invariants
//! - Registration is open; roster visibility is staff-only.

use crate::model::member::{Actor, Member, MemberId, Role};
use crate::repo::member_repo::{MemberRepository, MemberSummary};
use crate::repo::{RepoError, RepoResult};

/// Use-case service wrapper for the member roster.
pub struct MemberService<R: MemberRepository> {
    repo: R,
}

impl<R: MemberRepository> MemberService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Registers a member and returns the stored record.
    pub fn register_member(&self, name: impl Into<String>, role: Role) -> RepoResult<Member> {
        let member = Member::new(name, role);
        self.repo.create_member(&member)?;
        Ok(member)
    }

    /// Gets one member by id.
    pub fn get_member(&self, member_id: MemberId) -> RepoResult<Option<Member>> {
        self.repo.get_member(member_id)
    }

    /// Lists borrowers with their active-loan counts (staff only).
    pub fn roster(&self, actor: &Actor) -> RepoResult<Vec<MemberSummary>> {
        if !actor.is_staff() {
            return Err(RepoError::NotAuthorized {
                member_id: actor.member_id,
                action: "view the borrower roster",
            });
        }
        self.repo.list_borrowers()
    }
}
