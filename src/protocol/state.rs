use tracing::{error, info, warn};

use crate::core::PeerUrl;

/// This node's belief about the topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Election still pending
    Unknown,
    /// This node receives the stream and fans it out
    Master,
    /// This node plays audio fanned out by the master at the given URL
    Following(PeerUrl),
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Unknown => "unknown",
            Role::Master => "master",
            Role::Following(_) => "slave",
        }
    }
}

/// Outcome of feeding an event into the election
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Startup delay elapsed with no master found
    BecameMaster,
    /// A master was found while the election was pending
    StartedFollowing(PeerUrl),
    /// A peer claims mastership while we are master
    Conflict(PeerUrl),
    /// A different master was reported while following
    TransitionIgnored {
        current: PeerUrl,
        reported: PeerUrl,
    },
    /// The master we already follow was reported again
    Duplicate,
    /// Event had no effect (timeout after the election settled)
    Unchanged,
}

impl Transition {
    /// Whether this transition settled the election
    pub fn settles(&self) -> bool {
        matches!(self, Transition::BecameMaster | Transition::StartedFollowing(_))
    }
}

/// Master election state machine
///
/// The role moves from `Unknown` to either `Master` or `Following` exactly once.
/// Later reports never change it; conflicting reports are only logged and
/// counted so an operator can see them.
#[derive(Debug)]
pub struct ElectionState {
    role: Role,
    conflicts: u32,
}

impl Default for ElectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ElectionState {
    /// Creates a new election in the `Unknown` state
    pub fn new() -> Self {
        ElectionState {
            role: Role::Unknown,
            conflicts: 0,
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, Role::Master)
    }

    pub fn is_following(&self) -> bool {
        matches!(self.role, Role::Following(_))
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.role, Role::Unknown)
    }

    /// URL of the master we follow, if any
    pub fn master_url(&self) -> Option<PeerUrl> {
        match &self.role {
            Role::Following(url) => Some(*url),
            _ => None,
        }
    }

    /// Number of conflicting or unresolved master reports seen so far
    pub fn conflicts(&self) -> u32 {
        self.conflicts
    }

    /// Startup delay elapsed
    pub fn on_timeout(&mut self) -> Transition {
        match self.role {
            Role::Unknown => {
                info!("No master found before startup delay, electing self");
                self.role = Role::Master;
                Transition::BecameMaster
            }
            _ => Transition::Unchanged,
        }
    }

    /// A vetted peer resolved to a master at `url`
    pub fn on_master_found(&mut self, url: PeerUrl) -> Transition {
        match self.role {
            Role::Unknown => {
                info!(%url, "Found storm master");
                self.role = Role::Following(url);
                Transition::StartedFollowing(url)
            }
            Role::Master => {
                self.conflicts += 1;
                error!(%url, conflicts = self.conflicts, "Master conflict: peer also claims mastership");
                Transition::Conflict(url)
            }
            Role::Following(current) if current == url => Transition::Duplicate,
            Role::Following(current) => {
                self.conflicts += 1;
                warn!(%current, reported = %url, "Master transition not supported, keeping current master");
                Transition::TransitionIgnored {
                    current,
                    reported: url,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(port: u16) -> PeerUrl {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_timeout_elects_self() {
        let mut election = ElectionState::new();
        assert!(!election.is_settled());
        assert_eq!(election.on_timeout(), Transition::BecameMaster);
        assert!(election.is_master());
        assert!(!election.is_following());
        assert_eq!(election.master_url(), None);

        // Timer firing again is harmless
        assert_eq!(election.on_timeout(), Transition::Unchanged);
        assert!(election.is_master());
    }

    #[test]
    fn test_found_master_before_timeout() {
        let mut election = ElectionState::new();
        let transition = election.on_master_found(url(5000));
        assert!(transition.settles());
        assert_eq!(transition, Transition::StartedFollowing(url(5000)));

        // The late timer must not turn a slave into a master
        assert_eq!(election.on_timeout(), Transition::Unchanged);
        assert!(election.is_following());
        assert!(!election.is_master());
        assert_eq!(election.master_url(), Some(url(5000)));
    }

    #[test]
    fn test_conflict_keeps_master_role() {
        let mut election = ElectionState::new();
        election.on_timeout();
        assert_eq!(election.on_master_found(url(6000)), Transition::Conflict(url(6000)));
        assert!(election.is_master());
        assert_eq!(election.conflicts(), 1);
    }

    #[test]
    fn test_following_duplicate_and_transition() {
        let mut election = ElectionState::new();
        election.on_master_found(url(5000));

        assert_eq!(election.on_master_found(url(5000)), Transition::Duplicate);
        assert_eq!(election.conflicts(), 0);

        assert_eq!(
            election.on_master_found(url(5001)),
            Transition::TransitionIgnored {
                current: url(5000),
                reported: url(5001),
            }
        );
        assert_eq!(election.master_url(), Some(url(5000)));
        assert_eq!(election.conflicts(), 1);
    }
}
