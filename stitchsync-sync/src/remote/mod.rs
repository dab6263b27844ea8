//! Remote project stores.
//!
//! The engine talks to the remote document store through [`RemoteStore`].
//! Two implementations ship with the crate:
//! - [`HttpRemoteStore`] for a REST document API
//! - [`MemoryRemoteStore`] for tests and offline demos

pub mod http;
pub mod memory;
pub mod storage;

pub use http::{HttpConnectivityProbe, HttpRemoteConfig, HttpRemoteStore};
pub use memory::{FailureMode, MemoryRemoteStore};
pub use storage::{RemoteDocument, RemoteStore};
