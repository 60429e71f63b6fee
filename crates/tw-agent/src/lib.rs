//! Session lifecycle for detached agent processes: launch a backend under a
//! pre-allocated session id, discover the backend's own id when it picks
//! one, resume later with a follow-up prompt, and poll for completion.

mod error;
pub mod handshake;
mod manager;
pub mod process;
pub mod runners;
pub mod status;
pub mod store;

pub use error::AgentError;
pub use handshake::HandshakePolicy;
pub use manager::session::{LaunchOutcome, RESUME_SEPARATOR};
pub use manager::{AgentManager, ManagerOptions};
pub use runners::{AvailableBackend, Backend, BackendRegistry};
pub use status::{SessionState, SessionStatus};
pub use store::{SessionId, SessionPaths, SessionStore};
