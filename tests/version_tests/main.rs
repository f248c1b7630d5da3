//! Version and manifest integration tests
