//! Installed option/license query over the scope's web interface.
//!
//! The scope answers `POST /cgi-bin/options.cgi` with a flat payload:
//! `CODE$STATUS$Description#CODE$STATUS$Description#...`.

use crate::console::{Reporter, Tone};
use crate::error::{AppResult, DoomError};
use std::time::Duration;
use tracing::debug;

/// One installed option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseOption {
    /// Option code, e.g. `RLU`
    pub code: String,
    /// Status flag; `1` means active
    pub status: String,
    /// Human-readable description
    pub description: String,
}

impl LicenseOption {
    /// Whether the option is active
    pub fn is_active(&self) -> bool {
        self.status == "1"
    }

    /// `<code padded 10> → <status padded 5>  <description>`
    pub fn render(&self) -> String {
        format!("{:<10} → {:<5}  {}", self.code, self.status, self.description)
    }
}

/// Parse the options payload. Items that do not have exactly three
/// `$`-separated fields are dropped.
pub fn parse_options(body: &str) -> Vec<LicenseOption> {
    body.trim()
        .split('#')
        .filter_map(|item| {
            let parts: Vec<&str> = item.split('$').collect();
            match parts.as_slice() {
                [code, status, description] => Some(LicenseOption {
                    code: code.trim().to_string(),
                    status: status.trim().to_string(),
                    description: description.trim().to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Options endpoint for `host`
pub fn options_url(host: &str) -> String {
    format!("http://{}/cgi-bin/options.cgi", host.trim())
}

/// Fetch and parse the option list from `host`.
pub async fn fetch_options(host: &str, timeout: Duration) -> AppResult<Vec<LicenseOption>> {
    let url = options_url(host);
    debug!(url = %url, "Querying installed options");

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DoomError::License(e.to_string()))?;

    let response = client
        .post(&url)
        .send()
        .await
        .map_err(|e| DoomError::License(e.to_string()))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(DoomError::License(format!("HTTP {} from Rigol", status.as_u16())));
    }

    let body = response
        .text()
        .await
        .map_err(|e| DoomError::License(e.to_string()))?;
    Ok(parse_options(&body))
}

/// Print the option list, active ones green.
pub fn report(reporter: &Reporter, options: &[LicenseOption]) {
    for option in options {
        let tone = if option.is_active() { Tone::Success } else { Tone::Warn };
        reporter.line(tone, option.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_keeps_three_part_items() {
        let body = "RLU$1$Record Length Upgrade#BAD$1#MSO$0$Mixed Signal#$$#EXTRA$1$a$b\n";
        let options = parse_options(body);
        assert_eq!(options.len(), 3);
        assert_eq!(options[0].code, "RLU");
        assert!(options[0].is_active());
        assert_eq!(options[1].description, "Mixed Signal");
        assert!(!options[1].is_active());
        assert_eq!(options[2].code, "");
    }

    #[test]
    fn test_render_layout() {
        let option = LicenseOption {
            code: "RLU".into(),
            status: "1".into(),
            description: "Record Length Upgrade".into(),
        };
        assert_eq!(option.render(), "RLU        → 1      Record Length Upgrade");
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn test_fetch_options() {
        let host = serve_once("200 OK", "RLU$1$Record Length Upgrade#MSO$0$Mixed Signal").await;
        let options = fetch_options(&host, Duration::from_secs(3)).await.unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].code, "MSO");
    }

    #[tokio::test]
    async fn test_non_200_is_reported() {
        let host = serve_once("404 Not Found", "").await;
        let err = fetch_options(&host, Duration::from_secs(3)).await.unwrap_err();
        assert_eq!(err.to_string(), "License query failed: HTTP 404 from Rigol");
    }
}
