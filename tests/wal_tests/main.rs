//! WAL integration tests

mod recovery_tests;
mod writer_tests;
