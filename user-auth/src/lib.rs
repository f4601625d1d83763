//! User/auth service: registration, login, JWT issuance, opaque
//! refresh-token rotation, and profile/address CRUD, backed directly by
//! PostgreSQL rather than the event-sourced `Reducer` used by the catalog
//! services — see [`store`] for why.

pub mod error;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod refresh;
pub mod router;
pub mod store;
pub mod types;

pub use handlers::AppState;
pub use store::PostgresUserStore;
pub use types::{User, UserId, UserRole};
