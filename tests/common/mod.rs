//! Common test utilities for nvd-search integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod feed;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use feed::*;
#[allow(unused_imports)]
pub use fixtures::*;
