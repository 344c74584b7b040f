//! Shared fixtures for unit tests.
//!
//! [`factories`] builds small classes through the public builder API and [`machine`]
//! runs their bodies symbolically, so behavior can be checked without a JVM.

pub mod factories;
pub mod machine;
