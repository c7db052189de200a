//! Raw SCPI socket adapter
//!
//! LAN-enabled Rigol scopes accept newline-terminated SCPI on TCP port 5555.
//! This adapter speaks that protocol directly with tokio, so network targets
//! work without a VISA runtime installed.
//!
//! A reply that was not read to the end (timeout, or the query future dropped
//! on Ctrl+C) may still arrive later. The adapter then reconnects before the
//! next command so a late reply is never taken as the answer to another query.

use super::ScpiTransport;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Builder for constructing a [`SocketAdapter`]
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use scpi_doom::adapters::SocketAdapterBuilder;
///
/// # async fn example() -> anyhow::Result<()> {
/// let adapter = SocketAdapterBuilder::new("192.168.2.70".to_string(), 5555)
///     .with_timeout(Duration::from_millis(2000))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SocketAdapterBuilder {
    host: String,
    port: u16,
    timeout: Duration,
    chunk_size: usize,
    terminator: String,
}

impl SocketAdapterBuilder {
    /// Create a new builder for `host:port`
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            timeout: Duration::from_secs(5),
            chunk_size: 102_400,
            terminator: "\n".to_string(),
        }
    }

    /// Set timeout for connect and each read
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the read buffer size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the write terminator
    pub fn with_terminator(mut self, terminator: String) -> Self {
        self.terminator = terminator;
        self
    }

    /// Connect and build the adapter
    ///
    /// # Errors
    /// Returns error if the TCP connection cannot be established in time
    pub async fn build(self) -> Result<SocketAdapter> {
        let addr = format!("{}:{}", self.host, self.port);
        let io = connect(&addr, self.timeout, self.chunk_size).await?;

        Ok(SocketAdapter {
            resource_name: format!("TCPIP0::{}::{}::SOCKET", self.host, self.port),
            addr,
            timeout: self.timeout,
            chunk_size: self.chunk_size,
            terminator: self.terminator,
            io: Some(io),
            reply_pending: false,
        })
    }
}

type SocketIo = (BufReader<OwnedReadHalf>, OwnedWriteHalf);

async fn connect(addr: &str, limit: Duration, chunk_size: usize) -> Result<SocketIo> {
    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| anyhow!("Timed out connecting to {}", addr))?
        .with_context(|| format!("Failed to connect to {}", addr))?;
    stream.set_nodelay(true).ok();

    let (read_half, write_half) = stream.into_split();
    debug!(%addr, "SCPI socket connected");
    Ok((BufReader::with_capacity(chunk_size, read_half), write_half))
}

/// SCPI transport over a raw TCP socket
pub struct SocketAdapter {
    resource_name: String,
    addr: String,
    timeout: Duration,
    chunk_size: usize,
    terminator: String,
    io: Option<SocketIo>,
    /// Set while a reply is owed; still set on the next send means it was abandoned
    reply_pending: bool,
}

impl SocketAdapter {
    /// Current read timeout
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Drop the stream holding an abandoned reply and open a fresh one.
    async fn resync(&mut self) -> Result<()> {
        warn!(addr = %self.addr, "Previous SCPI reply was not read, reconnecting");
        if let Some((_, mut writer)) = self.io.take() {
            writer.shutdown().await.ok();
        }
        self.io = Some(connect(&self.addr, self.timeout, self.chunk_size).await?);
        self.reply_pending = false;
        Ok(())
    }

    async fn send(&mut self, cmd: &str, expects_reply: bool) -> Result<&mut BufReader<OwnedReadHalf>> {
        if self.io.is_none() {
            bail!("SCPI socket not connected");
        }
        if self.reply_pending {
            self.resync().await?;
        }
        let (reader, writer) = self
            .io
            .as_mut()
            .ok_or_else(|| anyhow!("SCPI socket not connected"))?;

        let line = format!("{}{}", cmd, self.terminator);
        self.reply_pending = expects_reply;
        writer
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write SCPI command: {}", cmd))?;
        writer.flush().await?;
        trace!(cmd, "SCPI command sent");
        Ok(reader)
    }
}

#[async_trait]
impl ScpiTransport for SocketAdapter {
    async fn query(&mut self, cmd: &str) -> Result<String> {
        let limit = self.timeout;
        let reader = self.send(cmd, true).await?;
        let response = timeout(limit, read_line(reader))
            .await
            .map_err(|_| anyhow!("Timeout waiting for response to {}", cmd))??;
        self.reply_pending = false;
        debug!("SCPI query '{}' -> '{}'", cmd, response.trim());
        Ok(response)
    }

    async fn write(&mut self, cmd: &str) -> Result<()> {
        self.send(cmd, false).await?;
        Ok(())
    }

    async fn query_binary(&mut self, cmd: &str) -> Result<Vec<u8>> {
        let limit = self.timeout;
        let reader = self.send(cmd, true).await?;
        let data = timeout(limit, read_block(reader))
            .await
            .map_err(|_| anyhow!("Timeout reading binary block for {}", cmd))??;
        self.reply_pending = false;
        debug!(cmd, bytes = data.len(), "SCPI binary block received");
        Ok(data)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some((_, mut writer)) = self.io.take() {
            writer.shutdown().await.ok();
            debug!("SCPI socket '{}' closed", self.resource_name);
        }
        self.reply_pending = false;
        Ok(())
    }

    fn resource_name(&self) -> &str {
        &self.resource_name
    }
}

/// Read one response line, dropping the `\n` / `\r\n` terminator.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        bail!("Connection closed by instrument");
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read an IEEE 488.2 block (`#<n><length><payload>`) and return the payload.
///
/// `#0` (indefinite length) reads up to the line terminator. The terminator
/// following a definite block is consumed so the next query starts clean.
pub async fn read_block<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte).await.context("Missing block header")?;
    if byte[0] != b'#' {
        bail!("Malformed block header: expected '#', got {:?}", byte[0] as char);
    }

    reader.read_exact(&mut byte).await.context("Missing block length digit")?;
    let digits = (byte[0] as char)
        .to_digit(10)
        .ok_or_else(|| anyhow!("Malformed block header: bad digit {:?}", byte[0] as char))?
        as usize;

    if digits == 0 {
        let mut data = Vec::new();
        reader.read_until(b'\n', &mut data).await?;
        if data.last() == Some(&b'\n') {
            data.pop();
        }
        return Ok(data);
    }

    let mut len_buf = vec![0u8; digits];
    reader.read_exact(&mut len_buf).await.context("Truncated block length")?;
    let length: usize = std::str::from_utf8(&len_buf)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow!("Malformed block length {:?}", String::from_utf8_lossy(&len_buf)))?;

    let mut data = vec![0u8; length];
    reader
        .read_exact(&mut data)
        .await
        .with_context(|| format!("Block truncated, expected {} bytes", length))?;

    if reader.fill_buf().await.map(|b| b.first() == Some(&b'\n')).unwrap_or(false) {
        reader.consume(1);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_strips_terminator() {
        let mut input: &[u8] = b"RIGOL TECHNOLOGIES,MSO5074,MS5A0001,00.01.03\r\nnext\n";
        let line = read_line(&mut input).await.unwrap();
        assert_eq!(line, "RIGOL TECHNOLOGIES,MSO5074,MS5A0001,00.01.03");
        assert_eq!(read_line(&mut input).await.unwrap(), "next");
        assert!(read_line(&mut input).await.is_err());
    }

    #[tokio::test]
    async fn test_read_block_definite_length() {
        let mut input: &[u8] = b"#9000000004\x01\x02\n\x04\n1.0\n";
        let data = read_block(&mut input).await.unwrap();
        assert_eq!(data, vec![1, 2, b'\n', 4]);
        // Trailing terminator consumed; next line intact
        assert_eq!(read_line(&mut input).await.unwrap(), "1.0");
    }

    #[tokio::test]
    async fn test_read_block_short_header() {
        let mut input: &[u8] = b"#13abc\n";
        assert_eq!(read_block(&mut input).await.unwrap(), b"abc".to_vec());
    }

    #[tokio::test]
    async fn test_read_block_indefinite() {
        let mut input: &[u8] = b"#0hello\n";
        assert_eq!(read_block(&mut input).await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_read_block_rejects_garbage() {
        let mut input: &[u8] = b"1.0\n";
        assert!(read_block(&mut input).await.is_err());

        let mut truncated: &[u8] = b"#210abc";
        assert!(read_block(&mut truncated).await.is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let builder = SocketAdapterBuilder::new("10.0.0.2".to_string(), 5555)
            .with_timeout(Duration::from_millis(1500))
            .with_chunk_size(4096);
        assert_eq!(builder.timeout, Duration::from_millis(1500));
        assert_eq!(builder.chunk_size, 4096);
        assert_eq!(builder.terminator, "\n");
    }
}
