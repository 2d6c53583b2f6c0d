//! Test harness utilities for client integration tests.
//!
//! This module provides a scripted WebSocket server and an event recorder
//! shared by the integration test files.

#![allow(dead_code)]

mod events;
mod server;

pub use events::{Recorded, Recorder};
pub use server::{FailingStream, ServerConn, TestServer, server_frame};
