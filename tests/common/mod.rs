//! Common utilities for integration tests.
//!
//! This module provides helper functions for detecting a Redis server,
//! setting up test data, and cleaning up after tests.
//!
//! ## Redis Connection Strategy
//!
//! Tests use `REDIS_HOST`/`REDIS_PORT` env vars when set (for CI), falling
//! back to `localhost:6379`. Tests that need a live server call
//! [`redis_available`] first and return early when none is reachable.

#![allow(dead_code)]

use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

use redis_streams_trigger::ConnectionConfig;

static KEY_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Redis host for tests. Override with the `REDIS_HOST` env var.
pub fn redis_host() -> String {
    std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string())
}

/// Redis port for tests. Override with the `REDIS_PORT` env var.
pub fn redis_port() -> u16 {
    std::env::var("REDIS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6379)
}

/// Connection config pointing at the test Redis instance.
pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig::new(redis_host(), redis_port())
}

/// Check if Redis is available at the test address.
pub fn redis_available() -> bool {
    let output = Command::new("redis-cli")
        .args(["-h", &redis_host(), "-p", &redis_port().to_string(), "PING"])
        .output();

    match output {
        Ok(o) => o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "PONG",
        Err(_) => false,
    }
}

/// Run a redis-cli command and return success status.
pub fn redis_cli(args: &[&str]) -> bool {
    let host = redis_host();
    let port = redis_port().to_string();
    let mut full_args = vec!["-h", &host, "-p", &port];
    full_args.extend(args);

    Command::new("redis-cli")
        .args(&full_args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run a redis-cli command and return the output as a string.
pub fn redis_cli_output(args: &[&str]) -> Option<String> {
    let host = redis_host();
    let port = redis_port().to_string();
    let mut full_args = vec!["-h", &host, "-p", &port];
    full_args.extend(args);

    Command::new("redis-cli")
        .args(&full_args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

/// Generate a stream key unique to this test process and call site.
pub fn unique_key(prefix: &str) -> String {
    let n = KEY_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{}:{}", prefix, std::process::id(), n)
}

/// Delete a key, ignoring failures.
pub fn cleanup_key(key: &str) {
    redis_cli(&["DEL", key]);
}

/// Append an entry with a single field via redis-cli.
pub fn xadd(stream: &str, field: &str, value: &str) {
    redis_cli(&["XADD", stream, "*", field, value]);
}
