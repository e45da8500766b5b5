use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::model::{CheckKind, Service};

/// Strategy that observes whether one service is reachable
///
/// A probe is owned by exactly one inspector and keeps its own state across
/// cycles. `Ok(false)` is an offline verdict; `Err` means no verdict could be
/// reached this cycle.
#[async_trait::async_trait]
pub trait Probe: Send {
    async fn check(&mut self, service: &Service) -> Result<bool>;

    /// State the owning inspector learned outside of this probe, e.g. from
    /// the log after a restart
    fn seed(&mut self, _last_known: Option<bool>) {}
}

/// Builds the probe bound to a newly tracked service
pub trait ProbeFactory: Send + Sync {
    fn create(&self, service: &Service) -> Box<dyn Probe>;
}

/// Consecutive-failure counter shared by the default probes
///
/// A service that was online is only reported offline once `threshold`
/// attempts in a row failed.
#[derive(Debug, Clone)]
pub struct FailureDamper {
    threshold: u32,
    consecutive_failures: u32,
    last_verdict: Option<bool>,
}

impl FailureDamper {
    pub fn new(threshold: u32) -> Self {
        Self { threshold: threshold.max(1), consecutive_failures: 0, last_verdict: None }
    }

    /// Fold one raw attempt into a verdict
    pub fn observe(&mut self, reachable: bool) -> bool {
        if reachable {
            self.consecutive_failures = 0;
            self.last_verdict = Some(true);
            return true;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.last_verdict == Some(true) && self.consecutive_failures < self.threshold {
            return true;
        }
        self.last_verdict = Some(false);
        false
    }

    /// Adopt a previously recorded verdict unless this damper has one of its own
    pub fn seed(&mut self, last_known: Option<bool>) {
        if self.last_verdict.is_none() {
            self.last_verdict = last_known;
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// HTTP/HTTPS probe; 2xx and 3xx responses count as online
pub struct HttpProbe {
    client: reqwest::Client,
    damper: FailureDamper,
}

impl HttpProbe {
    pub fn new(timeout_seconds: u64, failure_threshold: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self::with_client(client, failure_threshold))
    }

    pub fn with_client(client: reqwest::Client, failure_threshold: u32) -> Self {
        Self { client, damper: FailureDamper::new(failure_threshold) }
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn check(&mut self, service: &Service) -> Result<bool> {
        let url = Url::parse(&service.target).map_err(|e| anyhow!("Invalid URL: {}", e))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(anyhow!("Invalid scheme for HTTP probe: {}", other)),
        }

        let reachable = match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                status.is_success() || status.is_redirection()
            }
            Err(e) => {
                debug!(service = %service.id, "HTTP request failed: {}", e);
                false
            }
        };

        Ok(self.damper.observe(reachable))
    }

    fn seed(&mut self, last_known: Option<bool>) {
        self.damper.seed(last_known);
    }
}

/// TCP connect probe for `host:port` targets
pub struct TcpProbe {
    timeout_duration: Duration,
    damper: FailureDamper,
}

impl TcpProbe {
    pub fn new(timeout_seconds: u64, failure_threshold: u32) -> Self {
        Self {
            timeout_duration: Duration::from_secs(timeout_seconds),
            damper: FailureDamper::new(failure_threshold),
        }
    }
}

#[async_trait::async_trait]
impl Probe for TcpProbe {
    async fn check(&mut self, service: &Service) -> Result<bool> {
        let (host, port) = service
            .target
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("TCP target must be in format host:port"))?;
        let port: u16 = port.parse().map_err(|_| anyhow!("Invalid port number"))?;

        let reachable =
            match timeout(self.timeout_duration, tokio::net::TcpStream::connect((host, port))).await {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    debug!(service = %service.id, "TCP connection failed: {}", e);
                    false
                }
                Err(_) => {
                    debug!(service = %service.id, "TCP connection timeout");
                    false
                }
            };

        Ok(self.damper.observe(reachable))
    }

    fn seed(&mut self, last_known: Option<bool>) {
        self.damper.seed(last_known);
    }
}

/// Picks the HTTP or TCP probe by the service's check kind
pub struct DefaultProbeFactory {
    client: reqwest::Client,
    timeout_seconds: u64,
    failure_threshold: u32,
}

impl DefaultProbeFactory {
    pub fn new(timeout_seconds: u64, failure_threshold: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self { client, timeout_seconds, failure_threshold })
    }
}

impl ProbeFactory for DefaultProbeFactory {
    fn create(&self, service: &Service) -> Box<dyn Probe> {
        match service.kind {
            CheckKind::Http => {
                Box::new(HttpProbe::with_client(self.client.clone(), self.failure_threshold))
            }
            CheckKind::Tcp => Box::new(TcpProbe::new(self.timeout_seconds, self.failure_threshold)),
        }
    }
}
