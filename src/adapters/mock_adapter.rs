//! Mock transport for testing
//!
//! Simulates an instrument without hardware. It provides:
//! - Scripted responses per command
//! - Controllable failure injection per command
//! - Call logging for test verification

use super::ScpiTransport;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MockState {
    responses: HashMap<String, String>,
    failures: HashMap<String, String>,
    binary: HashMap<String, Vec<u8>>,
    default_response: Option<String>,
    call_log: Vec<String>,
    closed: bool,
}

/// Mock SCPI transport
///
/// Clones share state, so a test can keep a handle after boxing the adapter.
///
/// # Example
///
/// ```
/// use scpi_doom::adapters::MockAdapter;
///
/// let adapter = MockAdapter::new()
///     .with_response(":CHAN1:SCAL?", "1.0")
///     .with_failure(":SYS:ERR?", "VI_ERROR_TMO");
/// assert!(adapter.call_log().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// Create a mock that answers every query with an empty line
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer `cmd` with `response`
    pub fn with_response(self, cmd: &str, response: &str) -> Self {
        self.state()
            .responses
            .insert(cmd.to_string(), response.to_string());
        self
    }

    /// Fail `cmd` with `message`
    pub fn with_failure(self, cmd: &str, message: &str) -> Self {
        self.state()
            .failures
            .insert(cmd.to_string(), message.to_string());
        self
    }

    /// Answer binary queries of `cmd` with `data`
    pub fn with_binary(self, cmd: &str, data: Vec<u8>) -> Self {
        self.state().binary.insert(cmd.to_string(), data);
        self
    }

    /// Answer unscripted queries with `response` instead of an empty line
    pub fn with_default_response(self, response: &str) -> Self {
        self.state().default_response = Some(response.to_string());
        self
    }

    /// Every call so far, formatted as `query: CMD`, `write: CMD`, ...
    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    /// Commands sent through `query`
    pub fn queried(&self) -> Vec<String> {
        self.call_log()
            .iter()
            .filter_map(|c| c.strip_prefix("query: ").map(str::to_string))
            .collect()
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn log_call(&self, call: String) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        if state.closed {
            bail!("Not connected");
        }
        state.call_log.push(call);
        Ok(state)
    }
}

#[async_trait]
impl ScpiTransport for MockAdapter {
    async fn query(&mut self, cmd: &str) -> Result<String> {
        let state = self.log_call(format!("query: {}", cmd))?;
        if let Some(message) = state.failures.get(cmd) {
            return Err(anyhow!("{}", message));
        }
        Ok(state
            .responses
            .get(cmd)
            .or(state.default_response.as_ref())
            .cloned()
            .unwrap_or_default())
    }

    async fn write(&mut self, cmd: &str) -> Result<()> {
        let state = self.log_call(format!("write: {}", cmd))?;
        if let Some(message) = state.failures.get(cmd) {
            return Err(anyhow!("{}", message));
        }
        Ok(())
    }

    async fn query_binary(&mut self, cmd: &str) -> Result<Vec<u8>> {
        let state = self.log_call(format!("query_binary: {}", cmd))?;
        if let Some(message) = state.failures.get(cmd) {
            return Err(anyhow!("{}", message));
        }
        state
            .binary
            .get(cmd)
            .cloned()
            .ok_or_else(|| anyhow!("No binary data scripted for {}", cmd))
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.call_log.push("close".to_string());
        state.closed = true;
        Ok(())
    }

    fn resource_name(&self) -> &str {
        "MOCK0::INSTR"
    }
}
