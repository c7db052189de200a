//! VISA adapter for USB and LAN instruments
//!
//! Wraps the visa-rs crate and provides async I/O using Tokio's blocking task
//! executor for the synchronous VISA calls.
//!
//! Supports resource strings like:
//! - "USB0::0x1AB1::0x0515::MS5A000000001::INSTR" (USB)
//! - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
//!
//! Each I/O sets the session's VISA timeout first, so VISA ends a stalled
//! read before the async guard (timeout plus a margin) gives up on it. When
//! an exchange does not finish, the session is cleared before the next one.
//!
//! Without the `instrument_visa` feature every operation fails with
//! [`DoomError::FeatureNotEnabled`].

use crate::error::{AppResult, DoomError};
use anyhow::Result;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use super::socket_adapter::read_block;
#[cfg(feature = "instrument_visa")]
use super::ScpiTransport;
#[cfg(feature = "instrument_visa")]
use anyhow::{anyhow, Context};
#[cfg(feature = "instrument_visa")]
use async_trait::async_trait;
#[cfg(feature = "instrument_visa")]
use std::ffi::CString;
#[cfg(feature = "instrument_visa")]
use std::io::{Read, Write};
#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "instrument_visa")]
use tracing::debug;
#[cfg(feature = "instrument_visa")]
use visa_rs::attribute::AttrTmoValue;
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;
#[cfg(feature = "instrument_visa")]
use visa_rs::{flags::AccessMode, DefaultRM, Instrument, TIMEOUT_IMMEDIATE};

const FEATURE: &str = "instrument_visa";

/// List every VISA resource the resource manager can see.
#[cfg(feature = "instrument_visa")]
pub fn list_resources() -> AppResult<Vec<String>> {
    let to_err = |e: visa_rs::Error| DoomError::Instrument(format!("VISA: {}", e));

    let rm = DefaultRM::new().map_err(to_err)?;
    let expr = CString::new("?*INSTR")
        .map_err(|e| DoomError::Instrument(e.to_string()))?
        .into();
    let mut list = match rm.find_res_list(&expr) {
        Ok(list) => list,
        // VI_ERROR_RSRC_NFOUND: nothing attached
        Err(_) => return Ok(Vec::new()),
    };

    let mut resources = Vec::new();
    while let Some(res) = list.find_next().map_err(to_err)? {
        resources.push(res.to_string());
    }
    debug!(count = resources.len(), "VISA resources enumerated");
    Ok(resources)
}

/// List every VISA resource the resource manager can see.
#[cfg(not(feature = "instrument_visa"))]
pub fn list_resources() -> AppResult<Vec<String>> {
    Err(DoomError::FeatureNotEnabled(FEATURE.to_string()))
}

/// VISA adapter for instrument communication
#[cfg(feature = "instrument_visa")]
pub struct VisaAdapter {
    resource_name: String,
    timeout: Duration,
    chunk_size: usize,
    instrument: Option<Arc<Mutex<Instrument>>>,
    /// Last exchange did not complete; clear the session before the next one
    stale: bool,
}

/// Extra time the async guard allows beyond the VISA timeout
#[cfg(feature = "instrument_visa")]
const GUARD_MARGIN: Duration = Duration::from_millis(500);

#[cfg(feature = "instrument_visa")]
fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(feature = "instrument_visa")]
fn set_session_timeout(instr: &Instrument, timeout: Duration) -> Result<()> {
    let ms = timeout_ms(timeout);
    let attr = AttrTmoValue::new_checked(ms).ok_or_else(|| anyhow!("Invalid VISA timeout: {}ms", ms))?;
    instr.set_attr(attr).context("Failed to set VISA timeout")
}

/// VISA adapter placeholder when the `instrument_visa` feature is disabled
#[cfg(not(feature = "instrument_visa"))]
pub struct VisaAdapter {
    _private: (),
}

#[cfg(not(feature = "instrument_visa"))]
impl VisaAdapter {
    /// Always fails: VISA support not compiled in
    pub async fn open(_resource: &str, _timeout: Duration, _chunk_size: usize) -> Result<Self> {
        Err(DoomError::FeatureNotEnabled(FEATURE.to_string()).into())
    }
}

#[cfg(not(feature = "instrument_visa"))]
#[async_trait::async_trait]
impl super::ScpiTransport for VisaAdapter {
    async fn query(&mut self, _cmd: &str) -> Result<String> {
        Err(DoomError::FeatureNotEnabled(FEATURE.to_string()).into())
    }

    async fn write(&mut self, _cmd: &str) -> Result<()> {
        Err(DoomError::FeatureNotEnabled(FEATURE.to_string()).into())
    }

    async fn query_binary(&mut self, _cmd: &str) -> Result<Vec<u8>> {
        Err(DoomError::FeatureNotEnabled(FEATURE.to_string()).into())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn resource_name(&self) -> &str {
        ""
    }
}

#[cfg(feature = "instrument_visa")]
impl VisaAdapter {
    /// Open a VISA resource
    ///
    /// # Errors
    /// Returns error if the resource manager or the resource cannot be opened
    pub async fn open(resource: &str, timeout: Duration, chunk_size: usize) -> Result<Self> {
        let resource_str = resource.to_string();
        let instrument = tokio::task::spawn_blocking(move || {
            let rm = DefaultRM::new().context("Failed to create VISA resource manager")?;
            let rsc = CString::new(resource_str.as_str())
                .context("Failed to create CString")?
                .into();
            let instr = rm
                .open(&rsc, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
                .with_context(|| format!("Failed to open VISA resource: {}", resource_str))?;
            set_session_timeout(&instr, timeout)?;
            Ok::<Instrument, anyhow::Error>(instr)
        })
        .await
        .context("VISA open task panicked")??;

        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            resource,
            timeout.as_millis()
        );

        Ok(Self {
            resource_name: resource.to_string(),
            timeout,
            chunk_size,
            instrument: Some(Arc::new(Mutex::new(instrument))),
            stale: false,
        })
    }

    /// Run blocking VISA I/O on a dedicated thread, bounded by the timeout.
    ///
    /// The session is marked stale until the exchange succeeds, so a timed
    /// out, failed or dropped exchange gets a device clear before the next.
    async fn blocking<T, F>(&mut self, cmd: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Instrument, usize) -> Result<T> + Send + 'static,
    {
        let instrument = self
            .instrument
            .as_ref()
            .ok_or_else(|| anyhow!("VISA instrument not connected"))?
            .clone();
        let chunk_size = self.chunk_size;
        let timeout = self.timeout;
        let clear_first = self.stale;

        let task = tokio::task::spawn_blocking(move || {
            let mut guard = instrument
                .lock()
                .map_err(|_| anyhow!("VISA session lock poisoned"))?;
            if clear_first {
                guard.clear().context("Failed to clear VISA session")?;
                debug!("VISA session cleared after an incomplete exchange");
            }
            set_session_timeout(&guard, timeout)?;
            op(&mut guard, chunk_size)
        });

        self.stale = true;
        let value = tokio::time::timeout(timeout + GUARD_MARGIN, task)
            .await
            .map_err(|_| anyhow!("VI_ERROR_TMO: timeout waiting for {}", cmd))?
            .context("VISA I/O task panicked")??;
        self.stale = false;
        Ok(value)
    }
}

#[cfg(feature = "instrument_visa")]
fn read_message(instr: &mut Instrument, chunk_size: usize, done: fn(&[u8]) -> bool) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let n = instr.read(&mut chunk).context("VISA read failed")?;
        data.extend_from_slice(&chunk[..n]);
        if n == 0 || done(&data) {
            return Ok(data);
        }
    }
}

/// A definite-length block plus its terminator has fully arrived.
#[cfg(feature = "instrument_visa")]
fn block_complete(data: &[u8]) -> bool {
    if data.len() < 2 || data[0] != b'#' {
        return data.ends_with(b"\n");
    }
    let digits = match (data[1] as char).to_digit(10) {
        Some(0) | None => return data.ends_with(b"\n"),
        Some(d) => d as usize,
    };
    let length = data
        .get(2..2 + digits)
        .and_then(|s| std::str::from_utf8(s).ok())
        .and_then(|s| s.parse::<usize>().ok());
    match length {
        Some(length) => data.len() >= 2 + digits + length,
        None => false,
    }
}

#[cfg(feature = "instrument_visa")]
#[async_trait]
impl ScpiTransport for VisaAdapter {
    async fn query(&mut self, cmd: &str) -> Result<String> {
        let line = format!("{}\n", cmd);
        let raw = self
            .blocking(cmd, move |instr, chunk| {
                instr.write_all(line.as_bytes()).context("VISA write failed")?;
                read_message(instr, chunk, |d| d.ends_with(b"\n"))
            })
            .await
            .with_context(|| format!("VISA query failed for: {}", cmd))?;

        let response = String::from_utf8_lossy(&raw)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        debug!("VISA query '{}' -> '{}'", cmd, response);
        Ok(response)
    }

    async fn write(&mut self, cmd: &str) -> Result<()> {
        let line = format!("{}\n", cmd);
        self.blocking(cmd, move |instr, _| {
            instr.write_all(line.as_bytes()).context("VISA write failed")
        })
        .await
        .with_context(|| format!("VISA write failed for: {}", cmd))?;
        debug!("VISA command sent: {}", cmd);
        Ok(())
    }

    async fn query_binary(&mut self, cmd: &str) -> Result<Vec<u8>> {
        let line = format!("{}\n", cmd);
        let raw = self
            .blocking(cmd, move |instr, chunk| {
                instr.write_all(line.as_bytes()).context("VISA write failed")?;
                read_message(instr, chunk, block_complete)
            })
            .await
            .with_context(|| format!("VISA binary query failed for: {}", cmd))?;

        let mut reader: &[u8] = &raw;
        read_block(&mut reader).await
    }

    async fn close(&mut self) -> Result<()> {
        if self.instrument.take().is_some() {
            debug!("VISA resource '{}' closed", self.resource_name);
        }
        Ok(())
    }

    fn resource_name(&self) -> &str {
        &self.resource_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "instrument_visa"))]
    #[test]
    fn test_listing_requires_feature() {
        assert!(matches!(
            list_resources(),
            Err(DoomError::FeatureNotEnabled(f)) if f == "instrument_visa"
        ));
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[tokio::test]
    async fn test_open_requires_feature() {
        let result = VisaAdapter::open("USB0::0x1AB1::0x0515::X::INSTR", Duration::from_secs(1), 1024).await;
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("--features instrument_visa"));
    }

    #[cfg(feature = "instrument_visa")]
    #[test]
    fn test_session_timeout_ms() {
        assert_eq!(timeout_ms(Duration::from_millis(5000)), 5000);
        assert_eq!(timeout_ms(Duration::from_secs(u64::MAX)), u32::MAX);
        assert!(AttrTmoValue::new_checked(timeout_ms(Duration::from_millis(100))).is_some());
    }

    #[cfg(feature = "instrument_visa")]
    #[test]
    fn test_block_complete() {
        assert!(!block_complete(b"#15ab"));
        assert!(block_complete(b"#15abcde"));
        assert!(block_complete(b"1.0\n"));
        assert!(!block_complete(b"1.0"));
    }
}
