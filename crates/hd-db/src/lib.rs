//! # hd-db
//!
//! PostgreSQL persistence for Helpdesk RS, built on SQLx:
//!
//! - Connection pool management
//! - Repositories for users, roles, and tickets
//! - Postgres implementations of the `hd-auth` storage contracts
//!
//! ## Example
//!
//! ```ignore
//! use hd_db::{Database, DatabaseConfig, UserRepository};
//!
//! let db = Database::connect(&DatabaseConfig::from_env()).await?;
//! let users = UserRepository::new(db.pool().clone());
//! let admin = users.find_by_login("admin").await?;
//! ```

pub mod credentials;
pub mod pool;
pub mod refresh_tokens;
pub mod repository;
pub mod roles;
pub mod tickets;
pub mod users;

pub use credentials::PgCredentialStore;
pub use pool::{Database, DatabaseConfig};
pub use refresh_tokens::PgRefreshTokenStore;
pub use repository::{Pagination, RepositoryError, RepositoryResult};
pub use roles::{CreateRoleDto, RoleRepository, RoleRow, UpdateRoleDto};
pub use tickets::{CreateTicketDto, TicketRepository, TicketRow, UpdateTicketDto};
pub use users::{CreateUserDto, UpdateUserDto, UserRepository, UserRow};
