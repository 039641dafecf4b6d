//! Control actions against compose services
//!
//! ## Flow
//!
//! ```text
//! POST /action → assert_runnable (busy? registered? validator) → 400/500 on rejection
//!                      ↓ ok
//!              spawn_execute → [worker thread] claim busy → executor → release busy
//! ```

pub mod compose;
pub mod error;
pub mod runner;

pub use compose::{ComposeExecutor, Requirement, ServiceStateValidator, compose_runner};
pub use error::{ActionError, ErrorKind};
pub use runner::{ActionEntry, ActionExecutor, ActionName, ActionRunner, Validator};
