//! Authenticated-session lifecycle.
//!
//! Provides:
//! - [`SessionStore`]: who is logged in and the bearer token, with login,
//!   register, logout and observer subscriptions
//! - Persistence of the session record across restarts ([`SessionStorage`])
//! - Boot-time hydration racing a bounded fallback timer ([`hydration`])
//! - Global eviction on 401, plugged into the transport ([`SessionEviction`])
//!
//! ## Invariant
//! `token.is_some() == user.is_some() == is_authenticated` in every
//! observable state. User and token are only ever set or cleared together.

pub mod eviction;
pub mod hydration;
pub mod model;
pub mod persist;
pub mod store;

pub use eviction::SessionEviction;
pub use hydration::Hydration;
pub use model::{RegisterRequest, Role, SessionSnapshot, User};
pub use persist::{
    FileSessionStorage, MemorySessionStorage, PersistedSession, PersistedState, SessionStorage,
    StoredCredentials,
};
pub use store::SessionStore;
