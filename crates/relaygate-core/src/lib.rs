pub mod auth;
pub mod bootstrap;
pub mod proxy_engine;
pub mod state;
pub mod token_refresher;
pub mod upstream_client;

pub use auth::{
    AuthContext, AuthError, AuthKeyEntry, AuthProvider, AuthSnapshot, MemoryAuth, NoopAuth,
    UserEntry,
};
