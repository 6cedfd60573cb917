//! Testing utilities: an in-memory store standing in for PostgreSQL.

mod memory;

pub use memory::MemoryStore;
