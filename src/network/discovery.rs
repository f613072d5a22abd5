use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::{Config, Error, PeerUrl, Result, ServiceRecord};
use crate::protocol::{ControlRequest, ControlResponse};
use super::connection::ControlTransport;

/// Events delivered by the external discovery component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A service appeared and its addresses were resolved
    ServiceUp(ServiceRecord),
    /// A previously announced service went away
    ServiceDown {
        name: String,
    },
    /// The discovery component reported a failure
    Error(String),
}

/// A discovered service worth probing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCandidate {
    pub name: String,
    pub url: PeerUrl,
}

/// Turns raw discovery announcements into confirmed master URLs
///
/// Vetting is one-shot: a candidate that fails any step is dropped and never
/// retried.
pub struct PeerVetter {
    own_name: String,
    capability_token: String,
    max_hops: usize,
    transport: Arc<dyn ControlTransport>,
}

impl PeerVetter {
    /// Creates a vetter for a node advertising `config.service_name`
    pub fn new(config: &Config, transport: Arc<dyn ControlTransport>) -> Self {
        PeerVetter {
            own_name: config.service_name.clone(),
            capability_token: config.capability_token.clone(),
            max_hops: config.max_referral_hops,
            transport,
        }
    }

    /// Applies self-exclusion and address selection to an announcement
    pub fn candidate(&self, record: &ServiceRecord) -> Option<PeerCandidate> {
        if record.name == self.own_name {
            debug!(name = %record.name, "Ignoring self");
            return None;
        }

        // The last resolved address wins
        let Some(ip) = record.addresses.last() else {
            warn!(name = %record.name, "Service announced without addresses");
            return None;
        };

        Some(PeerCandidate {
            name: record.name.clone(),
            url: PeerUrl::new(SocketAddr::new(*ip, record.port)),
        })
    }

    /// Vets an announcement, returning the master URL it leads to, if any
    pub async fn vet(&self, record: &ServiceRecord) -> Result<Option<PeerUrl>> {
        let Some(candidate) = self.candidate(record) else {
            return Ok(None);
        };

        if !self.probe_capability(candidate.url).await? {
            info!(name = %candidate.name, "Skipping non-storm server");
            return Ok(None);
        }

        self.resolve_master(candidate.url).await
    }

    /// Returns whether the peer advertises our capability token
    pub async fn probe_capability(&self, url: PeerUrl) -> Result<bool> {
        match self.transport.request(url, ControlRequest::Options).await {
            Ok(ControlResponse::Options { public }) => {
                Ok(public.iter().any(|token| token == &self.capability_token))
            }
            Ok(other) => {
                debug!(%url, response = ?other, "Capability probe answered without options");
                Ok(false)
            }
            Err(e) => Err(Error::discovery(format!("OPTIONS {}: {}", url, e))),
        }
    }

    /// Follows "my master is at X" referrals until a peer claims mastership
    ///
    /// `Ok(None)` means the chain ended at a peer that has not settled its own
    /// election yet.
    pub async fn resolve_master(&self, url: PeerUrl) -> Result<Option<PeerUrl>> {
        let mut current = url;

        for _ in 0..self.max_hops {
            let response = self
                .transport
                .request(current, ControlRequest::StatusCheck)
                .await
                .map_err(|e| Error::discovery(format!("STATUS {}: {}", current, e)))?;

            match response {
                ControlResponse::Status { is_master: true, .. } => return Ok(Some(current)),
                ControlResponse::Status {
                    is_master: false,
                    master_url: Some(next),
                } => {
                    debug!(from = %current, to = %next, "Following master referral");
                    current = next;
                }
                ControlResponse::Status { is_master: false, master_url: None } => {
                    debug!(url = %current, "Peer has no master yet");
                    return Ok(None);
                }
                other => {
                    return Err(Error::discovery(format!(
                        "STATUS {}: unexpected response {:?}",
                        current, other
                    )))
                }
            }
        }

        Err(Error::ReferralLimit(self.max_hops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::net::IpAddr;

    /// Answers requests from a fixed table keyed by URL
    #[derive(Default)]
    struct Scripted {
        options: HashMap<PeerUrl, Vec<String>>,
        status: HashMap<PeerUrl, ControlResponse>,
        calls: Mutex<Vec<(PeerUrl, &'static str)>>,
    }

    #[async_trait]
    impl ControlTransport for Scripted {
        async fn request(&self, url: PeerUrl, request: ControlRequest) -> Result<ControlResponse> {
            self.calls.lock().unwrap().push((url, request.method()));
            match request {
                ControlRequest::Options => self
                    .options
                    .get(&url)
                    .map(|public| ControlResponse::Options { public: public.clone() })
                    .ok_or_else(|| Error::network("connection refused")),
                ControlRequest::StatusCheck => self
                    .status
                    .get(&url)
                    .cloned()
                    .ok_or_else(|| Error::network("connection refused")),
                _ => Err(Error::network("unexpected")),
            }
        }
    }

    fn url(port: u16) -> PeerUrl {
        format!("10.0.0.1:{}", port).parse().unwrap()
    }

    fn record(name: &str, port: u16) -> ServiceRecord {
        ServiceRecord {
            name: name.into(),
            addresses: vec!["192.168.1.9".parse().unwrap(), "10.0.0.1".parse().unwrap()],
            port,
        }
    }

    fn vetter(transport: Scripted) -> (PeerVetter, Arc<Scripted>) {
        let transport = Arc::new(transport);
        let vetter = PeerVetter::new(&Config::default(), transport.clone());
        (vetter, transport)
    }

    #[test]
    fn test_self_exclusion() {
        let (vetter, _) = vetter(Scripted::default());
        assert!(vetter.candidate(&record(crate::core::DEFAULT_SERVICE_NAME, 5000)).is_none());
    }

    #[test]
    fn test_last_address_is_preferred() {
        let (vetter, _) = vetter(Scripted::default());
        let candidate = vetter.candidate(&record("Living Room", 5000)).unwrap();
        assert_eq!(candidate.url.host(), "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(candidate.url.addr().port(), 5000);

        let empty = ServiceRecord {
            name: "Nowhere".into(),
            addresses: vec![],
            port: 5000,
        };
        assert!(vetter.candidate(&empty).is_none());
    }

    #[tokio::test]
    async fn test_self_is_never_probed() {
        let (vetter, transport) = vetter(Scripted::default());
        let found = vetter.vet(&record(crate::core::DEFAULT_SERVICE_NAME, 5000)).await.unwrap();
        assert_eq!(found, None);
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_storm_server_is_skipped() {
        let mut script = Scripted::default();
        script.options.insert(url(5000), vec!["ANNOUNCE".into(), "SETUP".into()]);
        let (vetter, transport) = vetter(script);

        assert_eq!(vetter.vet(&record("Apple TV", 5000)).await.unwrap(), None);
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_referral_chain_reaches_master() {
        let mut script = Scripted::default();
        script.options.insert(url(5000), vec!["SETUP".into(), "STORM".into()]);
        script.status.insert(
            url(5000),
            ControlResponse::Status {
                is_master: false,
                master_url: Some(url(5001)),
            },
        );
        script.status.insert(
            url(5001),
            ControlResponse::Status {
                is_master: true,
                master_url: None,
            },
        );
        let (vetter, transport) = vetter(script);

        assert_eq!(vetter.vet(&record("Bedroom", 5000)).await.unwrap(), Some(url(5001)));
        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![(url(5000), "OPTIONS"), (url(5000), "STATUS"), (url(5001), "STATUS")]
        );
    }

    #[tokio::test]
    async fn test_referral_cycle_is_bounded() {
        let mut script = Scripted::default();
        script.options.insert(url(5000), vec!["STORM".into()]);
        script.status.insert(
            url(5000),
            ControlResponse::Status {
                is_master: false,
                master_url: Some(url(5001)),
            },
        );
        script.status.insert(
            url(5001),
            ControlResponse::Status {
                is_master: false,
                master_url: Some(url(5000)),
            },
        );
        let (vetter, _) = vetter(script);

        let err = vetter.vet(&record("Loop", 5000)).await.unwrap_err();
        assert!(matches!(err, Error::ReferralLimit(8)));
    }

    #[tokio::test]
    async fn test_probe_failure_drops_peer() {
        let (vetter, _) = vetter(Scripted::default());
        let err = vetter.vet(&record("Offline", 5000)).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }
}
