pub mod launcher;
pub mod paths;

pub use launcher::{BackendOverride, HandshakeConfig, LauncherConfig, WaitConfig};
pub use paths::ConfigPaths;
