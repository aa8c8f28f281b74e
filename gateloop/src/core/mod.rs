//! Deterministic, pure logic shared by the controller.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod checklist;
pub mod gates;
pub mod promise;
pub mod stuck;
pub mod types;
