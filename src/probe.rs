//! HTTP availability probe.
//!
//! One bounded GET per call, every outcome folded into a [`ProbeResult`].
//! Retrying is the watch cycle's job, not the probe's.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;

const USER_AGENT: &str = concat!("webwatchd/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// A complete 2xx response was read.
    Success,
    Timeout,
    /// No HTTP exchange happened (refused, unreachable, DNS).
    ConnectionError,
    /// The exchange started but failed, or the server answered non-2xx.
    ProtocolError,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeStatus::Success => "Success",
            ProbeStatus::Timeout => "Timeout",
            ProbeStatus::ConnectionError => "ConnectionError",
            ProbeStatus::ProtocolError => "ProtocolError",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub http_status: Option<u16>,
    /// Body bytes actually read.
    pub received_length: u64,
    /// `Content-Length` advertised by the server, 0 when absent.
    pub declared_length: u64,
}

impl ProbeResult {
    pub fn success(http_status: u16, received_length: u64, declared_length: u64) -> Self {
        Self {
            status: ProbeStatus::Success,
            http_status: Some(http_status),
            received_length,
            declared_length,
        }
    }

    pub fn timeout() -> Self {
        Self::failure(ProbeStatus::Timeout, None)
    }

    pub fn failure(status: ProbeStatus, http_status: Option<u16>) -> Self {
        Self {
            status,
            http_status,
            received_length: 0,
            declared_length: 0,
        }
    }

    /// The endpoint is considered up only on a completed `200 OK`.
    pub fn is_ok(&self) -> bool {
        self.status == ProbeStatus::Success && self.http_status == Some(StatusCode::OK.as_u16())
    }

    fn from_error(err: &reqwest::Error) -> Self {
        let code = err.status().map(|s| s.as_u16());
        if err.is_timeout() {
            ProbeResult::failure(ProbeStatus::Timeout, code)
        } else if err.is_connect() {
            ProbeResult::failure(ProbeStatus::ConnectionError, code)
        } else {
            ProbeResult::failure(ProbeStatus::ProtocolError, code)
        }
    }
}

pub trait Prober {
    fn probe(&self, url: &str, timeout: Duration) -> ProbeResult;
}

/// Blocking `reqwest` probe. Follows redirects.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

impl Prober for HttpProber {
    fn probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let response = match self.client.get(url).timeout(timeout).send() {
            Ok(response) => response,
            Err(e) => {
                log::debug!("Probe of {url} failed before a response: {e}");
                return ProbeResult::from_error(&e);
            }
        };

        let status = response.status();
        let declared = response.content_length().unwrap_or(0);
        if !status.is_success() {
            log::debug!("Probe of {url} answered {status}");
            return ProbeResult::failure(ProbeStatus::ProtocolError, Some(status.as_u16()));
        }

        match response.bytes() {
            Ok(body) => ProbeResult::success(status.as_u16(), body.len() as u64, declared),
            Err(e) => {
                log::debug!("Probe of {url} failed reading the body: {e}");
                let mut result = ProbeResult::from_error(&e);
                result.http_status = Some(status.as_u16());
                if result.status == ProbeStatus::ConnectionError {
                    result.status = ProbeStatus::ProtocolError;
                }
                result
            }
        }
    }
}
