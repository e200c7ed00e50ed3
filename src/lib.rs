pub mod bindings;
pub mod bridge;
pub mod cli;
pub mod combat;
pub mod config;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod host;
pub mod marshal;
pub mod scheduler;
pub mod script_harness;
pub mod sim;
pub mod world;

pub use bridge::Bridge;
pub use env::{EnvHandle, ScriptEnv};
pub use error::{ScriptError, ScriptResult};
pub use host::ScriptHost;
pub use marshal::ScriptValue;
