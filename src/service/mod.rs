//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Apply role-based authorization explicitly, taking the acting member as
//!   a parameter instead of relying on ambient request state.
//!
//! # Invariants
//! - Catalogue mutation and cross-member visibility are staff-only.
//! - Services never bypass repository validation/guard contracts.

pub mod catalog_service;
pub mod circulation_service;
pub mod member_service;
