//! Entities and persistence-adapter traits for the credential and session
//! authority. `identity-auth` depends only on the traits exported here;
//! `memory` is the reference backend used by every test in the workspace,
//! `postgres` (behind the `postgres` feature) is the durable backend.

pub mod entities;
pub mod error;
pub mod memory;
pub mod repository;

pub use entities::{
    Permission, PermissionId, Role, RoleId, RolePermission, Session, SessionId, User, UserId,
    UserRole, VerificationToken, ROLE_ADMIN, ROLE_USER,
};
pub use error::{DomainError, DomainResult};
pub use memory::{InMemoryRoleRepository, InMemorySessionRepository, InMemoryUserRepository};
pub use repository::{RoleRepository, SessionRepository, UserRepository};
