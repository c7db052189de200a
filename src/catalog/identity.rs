//! Instrument identity from `*IDN?`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static IDN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([^,]+),([^,]+),([^,]+),([^,\s]+)").expect("IDN regex is valid")
});

/// Identification string returned by `*IDN?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentIdentity {
    raw: String,
}

/// The four standard `*IDN?` fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFields {
    /// Manufacturer, e.g. `RIGOL TECHNOLOGIES`
    pub manufacturer: String,
    /// Model, e.g. `MSO5074`
    pub model: String,
    /// Serial number
    pub serial: String,
    /// Firmware version
    pub firmware: String,
}

impl InstrumentIdentity {
    /// Wrap a raw `*IDN?` response
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Response as received, surrounding whitespace removed
    pub fn as_str(&self) -> &str {
        self.raw.trim()
    }

    /// Filesystem-safe tag used to namespace learned-command files.
    ///
    /// `RIGOL TECHNOLOGIES,MSO5074,MS5A1234,00.01.03` becomes
    /// `RIGOL_TECHNOLOGIES_MSO5074_MS5A1234_00_01_03`.
    pub fn tag(&self) -> String {
        self.as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Split into the standard fields, if the response has them
    pub fn fields(&self) -> Option<IdentityFields> {
        let caps = IDN_RE.captures(&self.raw)?;
        let field = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());
        Some(IdentityFields {
            manufacturer: field(1)?,
            model: field(2)?,
            serial: field(3)?,
            firmware: field(4)?,
        })
    }
}

impl fmt::Display for InstrumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDN: &str = "RIGOL TECHNOLOGIES,MSO5074,MS5A244909354,00.01.03.00.01\n";

    #[test]
    fn test_tag_is_filesystem_safe() {
        let id = InstrumentIdentity::new(IDN);
        assert_eq!(
            id.tag(),
            "RIGOL_TECHNOLOGIES_MSO5074_MS5A244909354_00_01_03_00_01"
        );
        let odd = InstrumentIdentity::new("ACME/Labs,X:1,\\sn,v1");
        assert!(!odd.tag().contains(['/', ':', '\\', ',']));
    }

    #[test]
    fn test_fields() {
        let fields = InstrumentIdentity::new(IDN).fields().unwrap();
        assert_eq!(fields.manufacturer, "RIGOL TECHNOLOGIES");
        assert_eq!(fields.model, "MSO5074");
        assert_eq!(fields.serial, "MS5A244909354");
        assert_eq!(fields.firmware, "00.01.03.00.01");
    }

    #[test]
    fn test_fields_missing() {
        assert!(InstrumentIdentity::new("garbage").fields().is_none());
    }

    #[test]
    fn test_display_trims() {
        assert_eq!(InstrumentIdentity::new(IDN).to_string(), IDN.trim());
    }
}
