//! MemTable integration tests
