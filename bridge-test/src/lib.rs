//! Mocks and fixtures shared by the relayer test suites.

pub mod mocks;
pub mod test_utils;
