//! Shared utilities for diva-engine integration tests.
//!
//! - `TestHarness` owns a temp directory laid out like an engine installation
//! - `DescriptorBuilder` writes algorithm descriptors into its services file

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
