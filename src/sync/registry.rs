use tracing::{info, warn};

use crate::core::{AudioSlaveEndpoint, SlaveRecord};

/// Slaves registered with this master, in registration order
#[derive(Debug, Default)]
pub struct SlaveRegistry {
    slaves: Vec<SlaveRecord>,
}

impl SlaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a slave; returns `false` if it was already registered
    pub fn register(&mut self, slave: SlaveRecord) -> bool {
        if self.slaves.contains(&slave) {
            info!(host = %slave.host, port = slave.port, "Slave already registered");
            return false;
        }

        info!(host = %slave.host, port = slave.port, "Registered slave");
        self.slaves.push(slave);
        true
    }

    pub fn slaves(&self) -> &[SlaveRecord] {
        &self.slaves
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }
}

/// Audio endpoints of slaves that acknowledged the current session
///
/// Acknowledgements carry the session they answer; late answers for an older
/// session are discarded.
#[derive(Debug, Default)]
pub struct EndpointSet {
    session: u64,
    owners: Vec<SlaveRecord>,
    endpoints: Vec<AudioSlaveEndpoint>,
}

impl EndpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every endpoint and starts collecting for `session`
    pub fn reset(&mut self, session: u64) {
        self.session = session;
        self.owners.clear();
        self.endpoints.clear();
    }

    /// Session whose acknowledgements are being collected
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Records the audio port `slave` returned for `session`
    ///
    /// Returns `false` if the acknowledgement is stale.
    pub fn insert(&mut self, session: u64, slave: SlaveRecord, audio_port: u16) -> bool {
        if session != self.session {
            warn!(host = %slave.host, session, current = self.session, "Ignoring stale start acknowledgement");
            return false;
        }

        let endpoint = AudioSlaveEndpoint {
            host: slave.host,
            audio_port,
        };

        match self.owners.iter().position(|owner| *owner == slave) {
            Some(index) => self.endpoints[index] = endpoint,
            None => {
                self.owners.push(slave);
                self.endpoints.push(endpoint);
            }
        }

        info!(endpoint = %endpoint.addr(), "Slave joined audio fan-out");
        true
    }

    /// Current fan-out targets
    pub fn endpoints(&self) -> &[AudioSlaveEndpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slave(last: u8, port: u16) -> SlaveRecord {
        SlaveRecord {
            host: format!("10.0.0.{}", last).parse().unwrap(),
            port,
        }
    }

    #[test]
    fn test_idempotent_registration() {
        let mut registry = SlaveRegistry::new();
        assert!(registry.register(slave(2, 5000)));
        assert!(!registry.register(slave(2, 5000)));
        assert_eq!(registry.len(), 1);

        // Same host, different control port is a different slave
        assert!(registry.register(slave(2, 5001)));
        assert_eq!(registry.slaves(), &[slave(2, 5000), slave(2, 5001)]);
    }

    #[test]
    fn test_endpoint_per_slave() {
        let mut endpoints = EndpointSet::new();
        endpoints.reset(1);
        assert!(endpoints.insert(1, slave(2, 5000), 6000));
        assert!(endpoints.insert(1, slave(2, 5000), 6001));
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints.endpoints()[0].audio_port, 6001);
    }

    #[test]
    fn test_stale_acknowledgement_ignored() {
        let mut endpoints = EndpointSet::new();
        endpoints.reset(1);
        endpoints.insert(1, slave(2, 5000), 6000);

        endpoints.reset(2);
        assert!(endpoints.is_empty());
        assert!(!endpoints.insert(1, slave(3, 5000), 6000));
        assert!(endpoints.is_empty());
        assert_eq!(endpoints.session(), 2);
    }
}
