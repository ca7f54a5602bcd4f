// ABOUTME: Container engine access: capability traits and their implementations.
// ABOUTME: BollardRuntime talks to the local engine; MockRuntime (test-support feature) is an in-memory one.

mod bollard;
mod connect;
mod error;
#[cfg(any(test, feature = "test-support"))]
mod mock;
pub mod traits;

pub use self::bollard::{BollardRuntime, DEFAULT_DOCKER_HOST};
pub use connect::{ApiVersion, ConnectOptions, TlsFiles};
pub use error::{RuntimeError, RuntimeErrorKind};
#[cfg(any(test, feature = "test-support"))]
pub use mock::{Call, MockOp, MockRuntime};
pub use traits::*;
