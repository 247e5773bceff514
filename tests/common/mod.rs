//! Common test utilities for publista-client integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod server;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use server::*;
