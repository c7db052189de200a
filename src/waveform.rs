//! Waveform capture.
//!
//! Configures byte-format readout of one channel, reads the preamble and a
//! single data block, and optionally exports scaled samples to CSV.

use crate::adapters::ScpiTransport;
use crate::error::{AppResult, DoomError};
use crate::storage;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Points requested per capture
pub const CAPTURE_POINTS: usize = 1200;

/// Parsed `:WAV:PRE?` response
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformPreamble {
    /// 0 = BYTE, 1 = WORD, 2 = ASC
    pub format: u8,
    /// 0 = NORM, 1 = MAX, 2 = RAW
    pub acquisition: u8,
    /// Number of points
    pub points: usize,
    /// Average count
    pub count: u32,
    /// Seconds between points
    pub x_increment: f64,
    /// Time of the first point
    pub x_origin: f64,
    /// Reference time index
    pub x_reference: f64,
    /// Volts per code
    pub y_increment: f64,
    /// Vertical offset in codes
    pub y_origin: f64,
    /// Vertical reference code
    pub y_reference: f64,
}

impl WaveformPreamble {
    /// Parse the ten comma-separated preamble fields.
    pub fn parse(text: &str) -> Result<Self> {
        let fields: Vec<f64> = text
            .trim()
            .split(',')
            .map(|f| {
                f.trim()
                    .parse::<f64>()
                    .with_context(|| format!("Invalid preamble field '{}'", f.trim()))
            })
            .collect::<Result<_>>()?;

        if fields.len() != 10 {
            return Err(anyhow!(
                "Expected 10 preamble fields, got {}",
                fields.len()
            ));
        }

        Ok(Self {
            format: fields[0] as u8,
            acquisition: fields[1] as u8,
            points: fields[2] as usize,
            count: fields[3] as u32,
            x_increment: fields[4],
            x_origin: fields[5],
            x_reference: fields[6],
            y_increment: fields[7],
            y_origin: fields[8],
            y_reference: fields[9],
        })
    }

    /// Time of sample `index`, in seconds
    pub fn time_at(&self, index: usize) -> f64 {
        (index as f64 - self.x_reference) * self.x_increment + self.x_origin
    }

    /// Voltage of a raw byte sample
    pub fn volts(&self, raw: u8) -> f64 {
        (f64::from(raw) - self.y_origin - self.y_reference) * self.y_increment
    }
}

/// One captured block
#[derive(Debug, Clone)]
pub struct WaveformCapture {
    /// Source channel, e.g. `CHAN1`
    pub channel: String,
    /// Scaling information
    pub preamble: WaveformPreamble,
    /// Raw byte samples
    pub data: Vec<u8>,
}

impl WaveformCapture {
    /// `(time, volts)` for each sample
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(|(i, raw)| (self.preamble.time_at(i), self.preamble.volts(*raw)))
    }

    /// Write `time,volts` rows to `path`.
    pub fn export_csv(&self, path: &Path) -> AppResult<()> {
        let rows = self
            .samples()
            .map(|(t, v)| vec![t.to_string(), v.to_string()]);
        storage::write_csv(path, &["time", "volts"], rows)
    }
}

async fn read_block(transport: &mut dyn ScpiTransport, channel: &str, settle: Duration) -> Result<WaveformCapture> {
    for cmd in [
        ":WAV:FORM BYTE".to_string(),
        ":WAV:MODE NORM".to_string(),
        ":WAV:POIN:MODE RAW".to_string(),
        format!(":WAV:POIN {}", CAPTURE_POINTS),
        format!(":WAV:SOUR {}", channel),
    ] {
        transport
            .write(&cmd)
            .await
            .with_context(|| format!("Failed to send '{}'", cmd))?;
    }
    tokio::time::sleep(settle).await;

    let preamble = transport
        .query(":WAV:PRE?")
        .await
        .context("Failed to read waveform preamble")?;
    let preamble = WaveformPreamble::parse(&preamble)?;
    debug!(?preamble, "Waveform preamble");

    let data = transport
        .query_binary(":WAV:DATA?")
        .await
        .context("Failed to read waveform data")?;

    Ok(WaveformCapture {
        channel: channel.to_string(),
        preamble,
        data,
    })
}

/// Capture one block from `channel` after waiting `settle` for the scope to
/// apply the readout settings.
pub async fn capture(transport: &mut dyn ScpiTransport, channel: &str, settle: Duration) -> AppResult<WaveformCapture> {
    read_block(transport, channel, settle)
        .await
        .map_err(|e| DoomError::Instrument(format!("Waveform read error: {:#}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;

    const PREAMBLE: &str = "0,2,1200,1,1.000000e-06,-6.000000e-04,0,4.000000e-02,0,128\n";

    #[test]
    fn test_parse_preamble() {
        let pre = WaveformPreamble::parse(PREAMBLE).unwrap();
        assert_eq!(pre.points, 1200);
        assert_eq!(pre.acquisition, 2);
        assert!((pre.x_increment - 1e-6).abs() < 1e-12);
        assert!((pre.y_reference - 128.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_preamble_requires_ten_numeric_fields() {
        assert!(WaveformPreamble::parse("0,2,1200").is_err());
        assert!(WaveformPreamble::parse("0,2,1200,1,x,0,0,0.04,0,128").is_err());
    }

    #[test]
    fn test_scaling() {
        let pre = WaveformPreamble::parse(PREAMBLE).unwrap();
        assert!((pre.volts(128)).abs() < 1e-12);
        assert!((pre.volts(153) - 1.0).abs() < 1e-9);
        assert!((pre.time_at(600) - 0.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_capture_sequence() {
        let mock = MockAdapter::new()
            .with_response(":WAV:PRE?", PREAMBLE)
            .with_binary(":WAV:DATA?", vec![128; 1200]);
        let mut transport = mock.clone();

        let capture = capture(&mut transport, "CHAN2", Duration::ZERO).await.unwrap();
        assert_eq!(capture.data.len(), 1200);
        assert_eq!(capture.channel, "CHAN2");
        assert_eq!(
            mock.call_log(),
            vec![
                "write: :WAV:FORM BYTE",
                "write: :WAV:MODE NORM",
                "write: :WAV:POIN:MODE RAW",
                "write: :WAV:POIN 1200",
                "write: :WAV:SOUR CHAN2",
                "query: :WAV:PRE?",
                "query_binary: :WAV:DATA?",
            ]
        );
    }

    #[tokio::test]
    async fn test_capture_error_is_instrument_error() {
        let mut transport = MockAdapter::new().with_response(":WAV:PRE?", "garbage");
        let err = capture(&mut transport, "CHAN1", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, DoomError::Instrument(_)));
        assert!(err.to_string().contains("Waveform read error"));
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wave.csv");
        let capture = WaveformCapture {
            channel: "CHAN1".into(),
            preamble: WaveformPreamble::parse("0,0,2,1,0.5,0,0,1,0,0").unwrap(),
            data: vec![1, 2],
        };
        capture.export_csv(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "time,volts\n0,1\n0.5,2\n");
    }
}
