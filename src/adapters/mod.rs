//! Instrument transport adapters
//!
//! This module contains the [`ScpiTransport`] trait and its implementations,
//! providing low-level I/O for the different ways of reaching an instrument:
//!
//! - [`SocketAdapter`]: raw SCPI over TCP (Rigol LAN port 5555), always available
//! - [`VisaAdapter`]: VISA resources (USB, TCPIP INSTR), `instrument_visa` feature
//! - [`MockAdapter`]: scripted responses for tests and offline runs

pub mod mock_adapter;
pub mod socket_adapter;
pub mod visa_adapter;

pub use mock_adapter::MockAdapter;
pub use socket_adapter::{SocketAdapter, SocketAdapterBuilder};
pub use visa_adapter::VisaAdapter;

use crate::config::ConnectionConfig;
use crate::error::{AppResult, DoomError};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

/// SCPI transport over a single open instrument connection.
///
/// One request is in flight at a time; callers own the connection mutably.
#[async_trait]
pub trait ScpiTransport: Send {
    /// Send a query and read one response line (terminator stripped, not trimmed).
    async fn query(&mut self, cmd: &str) -> Result<String>;

    /// Send a command without reading a response.
    async fn write(&mut self, cmd: &str) -> Result<()>;

    /// Send a query whose response is an IEEE 488.2 definite-length block and
    /// return the block payload.
    async fn query_binary(&mut self, cmd: &str) -> Result<Vec<u8>>;

    /// Close the connection. Further calls fail.
    async fn close(&mut self) -> Result<()>;

    /// Resource string this transport is connected to.
    fn resource_name(&self) -> &str;
}

/// Where the instrument lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// LAN instrument reached by host name or IP address
    Tcp(String),
    /// VISA resource string of a USB instrument
    Usb(String),
}

impl Target {
    /// Resource string for display and logs
    ///
    /// Network targets use the raw socket form, `TCPIP0::<ip>::<port>::SOCKET`.
    pub fn resource_string(&self, port: u16) -> String {
        match self {
            Target::Tcp(host) => format!("TCPIP0::{}::{}::SOCKET", host, port),
            Target::Usb(resource) => resource.clone(),
        }
    }
}

/// Resolve the `--ip` / `--usb` flags into a [`Target`].
///
/// `--ip` wins when both are given. With `--usb` the first VISA resource whose
/// name contains `USB` is used.
pub fn resolve_target(ip: Option<&str>, usb: bool) -> AppResult<Target> {
    if let Some(ip) = ip {
        let ip = ip.trim();
        if ip.is_empty() {
            return Err(DoomError::MissingTarget);
        }
        return Ok(Target::Tcp(ip.to_string()));
    }

    if usb {
        let resources = visa_adapter::list_resources()?;
        return first_usb(&resources)
            .map(Target::Usb)
            .ok_or(DoomError::NoUsbDevice);
    }

    Err(DoomError::MissingTarget)
}

/// First resource string naming a USB device.
pub fn first_usb(resources: &[String]) -> Option<String> {
    resources.iter().find(|r| r.contains("USB")).cloned()
}

/// Open a transport for `target` using the connection settings.
pub async fn open(target: &Target, config: &ConnectionConfig) -> AppResult<Box<dyn ScpiTransport>> {
    let resource = target.resource_string(config.socket_port);
    debug!(resource = %resource, timeout_ms = config.timeout_ms, "Opening instrument");

    let transport: Box<dyn ScpiTransport> = match target {
        Target::Tcp(host) => Box::new(
            SocketAdapterBuilder::new(host.clone(), config.socket_port)
                .with_timeout(config.timeout())
                .with_chunk_size(config.chunk_size)
                .build()
                .await
                .map_err(|e| DoomError::Connection(format!("{:#}", e)))?,
        ),
        Target::Usb(resource) => Box::new(
            VisaAdapter::open(resource, config.timeout(), config.chunk_size)
                .await
                .map_err(|e| DoomError::Connection(format!("{:#}", e)))?,
        ),
    };

    info!(resource = %transport.resource_name(), "Instrument connection open");
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_target() {
        let target = resolve_target(Some("192.168.2.70"), false).unwrap();
        assert_eq!(target, Target::Tcp("192.168.2.70".to_string()));
        assert_eq!(
            target.resource_string(5555),
            "TCPIP0::192.168.2.70::5555::SOCKET"
        );
    }

    #[test]
    fn test_missing_target() {
        assert!(matches!(
            resolve_target(None, false),
            Err(DoomError::MissingTarget)
        ));
        assert!(matches!(
            resolve_target(Some("  "), false),
            Err(DoomError::MissingTarget)
        ));
    }

    #[test]
    fn test_first_usb_resource() {
        let resources = vec![
            "TCPIP0::192.168.1.5::INSTR".to_string(),
            "USB0::0x1AB1::0x0515::MS5A000000001::INSTR".to_string(),
            "USB0::0x1AB1::0x0515::MS5A000000002::INSTR".to_string(),
        ];
        assert_eq!(
            first_usb(&resources).as_deref(),
            Some("USB0::0x1AB1::0x0515::MS5A000000001::INSTR")
        );
        assert_eq!(first_usb(&resources[..1]), None);
    }

    #[test]
    fn test_usb_target_keeps_resource() {
        let target = Target::Usb("USB0::0x1AB1::0x0515::X::INSTR".to_string());
        assert_eq!(target.resource_string(5555), "USB0::0x1AB1::0x0515::X::INSTR");
    }
}
