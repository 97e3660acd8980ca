//! Member roster contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist registered members and read identity/role back for the guard.
//! - Provide the staff borrower roster with active-loan counts.
//!
//! # Invariants
//! - Member names are unique across the roster.
//! - The core never stores credentials; authentication is external.

use crate::model::member::{Member, MemberId, Role};
use crate::repo::{
    ensure_schema_current, ensure_tables_ready, is_constraint_violation, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const MEMBER_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    role
FROM members";

/// One borrower with their current lending load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSummary {
    pub member: Member,
    pub active_loans: u32,
}

/// Repository interface for the member roster.
pub trait MemberRepository {
    /// Registers one member and returns their stable id.
    fn create_member(&self, member: &Member) -> RepoResult<MemberId>;
    /// Gets one member by id.
    fn get_member(&self, member_id: MemberId) -> RepoResult<Option<Member>>;
    /// Lists non-staff members with their active-loan counts, by name.
    fn list_borrowers(&self) -> RepoResult<Vec<MemberSummary>>;
}

/// SQLite-backed member roster.
pub struct SqliteMemberRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMemberRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_current(conn)?;
        ensure_tables_ready(
            conn,
            &[
                ("members", &["uuid", "name", "role"]),
                ("loans", &["member_uuid", "status"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl MemberRepository for SqliteMemberRepository<'_> {
    fn create_member(&self, member: &Member) -> RepoResult<MemberId> {
        member.validate()?;

        self.conn
            .execute(
                "INSERT INTO members (uuid, name, role) VALUES (?1, ?2, ?3);",
                params![
                    member.uuid.to_string(),
                    member.name.as_str(),
                    role_to_db(member.role),
                ],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    RepoError::DuplicateMemberName(member.name.clone())
                } else {
                    err.into()
                }
            })?;

        Ok(member.uuid)
    }

    fn get_member(&self, member_id: MemberId) -> RepoResult<Option<Member>> {
        let sql = format!("{MEMBER_SELECT_SQL} WHERE uuid = ?1;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([member_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_member_row(row)?));
        }
        Ok(None)
    }

    fn list_borrowers(&self) -> RepoResult<Vec<MemberSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                m.uuid,
                m.name,
                m.role,
                (
                    SELECT COUNT(*)
                    FROM loans l
                    WHERE l.member_uuid = m.uuid
                      AND l.status = 'active'
                ) AS active_loans
             FROM members m
             WHERE m.role = 'member'
             ORDER BY m.name COLLATE NOCASE ASC;",
        )?;

        let mut rows = stmt.query([])?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            summaries.push(MemberSummary {
                member: parse_member_row(row)?,
                active_loans: row.get("active_loans")?,
            });
        }

        Ok(summaries)
    }
}

fn role_to_db(role: Role) -> &'static str {
    match role {
        Role::Member => "member",
        Role::Staff => "staff",
    }
}

fn parse_role(value: &str) -> Option<Role> {
    match value {
        "member" => Some(Role::Member),
        "staff" => Some(Role::Staff),
        _ => None,
    }
}

fn parse_member_row(row: &Row<'_>) -> RepoResult<Member> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in members.uuid"))
    })?;

    let role_text: String = row.get("role")?;
    let role = parse_role(&role_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid role `{role_text}` in members.role"))
    })?;

    Ok(Member {
        uuid,
        name: row.get("name")?,
        role,
    })
}
