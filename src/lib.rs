//! Session-aware client for the GradeDesk homework grading API.
//!
//! Two state containers form the core:
//! - [`SessionStore`]: identity, bearer token, and the boot-time
//!   hydration latch
//! - [`BackgroundTaskTracker`]: ids of in-flight calls that must not block
//!   page rendering
//!
//! Around them sit a thin [`HttpTransport`] with request/response hooks, a
//! route guard, and typed page-level API calls. [`ClientApp`] wires them
//! together.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod routing;
pub mod session;
pub mod tasks;
pub mod transport;

pub use api::GradingApi;
pub use app::ClientApp;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use routing::{Guard, Navigator, Route};
pub use session::{RegisterRequest, Role, SessionSnapshot, SessionStore, User};
pub use tasks::{BackgroundTaskTracker, TaskGuard};
pub use transport::HttpTransport;
