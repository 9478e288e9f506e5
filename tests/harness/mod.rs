//! Test harness utilities for driving a `wsconn` client against a scripted
//! loopback server.

#![allow(dead_code)]

mod observer;
mod server;

pub use observer::{Event, EventLog};
pub use server::{ServerConn, TestServer};
