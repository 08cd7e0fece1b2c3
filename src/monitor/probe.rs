//! Probe collaborators: one health check attempt against a service.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::db::models::{ProbeKind, Service};
use crate::version::user_agent;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Connection failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("Expected status {expected} but got {actual}")]
    UnexpectedStatus { expected: i32, actual: u16 },
}

/// A single health check. Returns the round-trip time on success.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, service: &Service) -> Result<Duration, ProbeError>;
}

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Checks HTTP(S) endpoints with a GET request and TCP endpoints with a plain
/// connect, both bounded by the service's timeout.
#[derive(Clone, Debug)]
pub struct NetworkProbe {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl NetworkProbe {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .build()?;
        Ok(Self {
            client,
            default_timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }

    /// Timeout used for services that do not set one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout.max(Duration::from_secs(1));
        self
    }

    fn timeout_for(&self, service: &Service) -> Duration {
        if service.timeout > 0 {
            service.timeout_duration()
        } else {
            self.default_timeout
        }
    }

    async fn check_http(&self, service: &Service) -> Result<Duration, ProbeError> {
        let timeout = self.timeout_for(service);
        let start_time = Instant::now();
        let response = self
            .client
            .get(&service.target)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Request(e)
                }
            })?;
        let elapsed = start_time.elapsed();

        let status = response.status();
        let accepted = if service.expected_status > 0 {
            i32::from(status.as_u16()) == service.expected_status
        } else {
            status.is_success()
        };
        if !accepted {
            return Err(ProbeError::UnexpectedStatus {
                expected: service.expected_status,
                actual: status.as_u16(),
            });
        }
        Ok(elapsed)
    }

    async fn check_tcp(&self, service: &Service) -> Result<Duration, ProbeError> {
        let timeout = self.timeout_for(service);
        let start_time = Instant::now();
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&service.target)).await {
            Ok(Ok(_stream)) => Ok(start_time.elapsed()),
            Ok(Err(e)) => Err(ProbeError::Connect(e)),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl Probe for NetworkProbe {
    async fn check(&self, service: &Service) -> Result<Duration, ProbeError> {
        match service.kind {
            ProbeKind::Http => self.check_http(service).await,
            ProbeKind::Tcp => self.check_tcp(service).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let service = Service::new("local", ProbeKind::Tcp, addr.to_string());
        let probe = NetworkProbe::new().unwrap();
        assert!(probe.check(&service).await.is_ok());
    }

    #[tokio::test]
    async fn test_tcp_probe_reports_refused_connection() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service = Service::new("closed", ProbeKind::Tcp, addr.to_string());
        let probe = NetworkProbe::new().unwrap();
        let result = probe.check(&service).await;
        assert!(matches!(result, Err(ProbeError::Connect(_))));
    }

    #[test]
    fn test_unset_timeout_falls_back_to_default() {
        let probe = NetworkProbe::new()
            .unwrap()
            .with_default_timeout(Duration::from_secs(3));
        let mut service = Service::new("svc", ProbeKind::Http, "http://localhost");
        assert_eq!(probe.timeout_for(&service), Duration::from_secs(10));
        service.timeout = 0;
        assert_eq!(probe.timeout_for(&service), Duration::from_secs(3));
    }
}
