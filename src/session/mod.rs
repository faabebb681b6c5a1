use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Which way the bytes moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

/// Memory of the last transfer started on this session. A new request
/// for the same direction and target continues where the interrupted
/// transfer left off; anything else starts fresh and overwrites it.
#[derive(Debug, Default)]
pub struct TransferSession {
    last: Option<(Direction, PathBuf)>,
}

impl TransferSession {
    /// True when `target` continues the transfer recorded last time.
    /// Downloads are keyed by canonical absolute path, uploads by bare
    /// filename.
    pub fn is_resume(&self, direction: Direction, target: &Path) -> bool {
        matches!(&self.last, Some((d, t)) if *d == direction && t == target)
    }

    /// Record the transfer that is now in flight
    pub fn record(&mut self, direction: Direction, target: PathBuf) {
        self.last = Some((direction, target));
    }
}

/// Hands out the session for whichever peer is currently connected.
/// Affinity is scoped to the peer IP: reconnecting from the same
/// address keeps the state, a different address drops it.
#[derive(Debug, Default)]
pub struct SessionTracker {
    peer: Option<IpAddr>,
    session: TransferSession,
}

impl SessionTracker {
    pub fn session_for(&mut self, peer: IpAddr) -> &mut TransferSession {
        if self.peer != Some(peer) {
            self.peer = Some(peer);
            self.session = TransferSession::default();
        }
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_requires_same_direction_and_target() {
        let mut session = TransferSession::default();
        let target = PathBuf::from("/data/report.pdf");

        assert!(!session.is_resume(Direction::Download, &target));

        session.record(Direction::Download, target.clone());
        assert!(session.is_resume(Direction::Download, &target));
        assert!(!session.is_resume(Direction::Upload, &target));
        assert!(!session.is_resume(Direction::Download, Path::new("/data/other.pdf")));
    }

    #[test]
    fn test_different_target_clears_resume_eligibility() {
        let mut session = TransferSession::default();
        let original = PathBuf::from("/data/report.pdf");

        session.record(Direction::Download, original.clone());
        session.record(Direction::Download, PathBuf::from("/data/other.pdf"));

        // Starting a different file forfeits the old append state
        assert!(!session.is_resume(Direction::Download, &original));
    }

    #[test]
    fn test_tracker_keeps_state_for_same_address() {
        let mut tracker = SessionTracker::default();
        let peer: IpAddr = "10.0.0.7".parse().unwrap();

        tracker
            .session_for(peer)
            .record(Direction::Upload, PathBuf::from("big.iso"));
        assert!(tracker
            .session_for(peer)
            .is_resume(Direction::Upload, Path::new("big.iso")));
    }

    #[test]
    fn test_tracker_resets_for_new_address() {
        let mut tracker = SessionTracker::default();
        let first: IpAddr = "10.0.0.7".parse().unwrap();
        let second: IpAddr = "10.0.0.8".parse().unwrap();

        tracker
            .session_for(first)
            .record(Direction::Upload, PathBuf::from("big.iso"));
        assert!(!tracker
            .session_for(second)
            .is_resume(Direction::Upload, Path::new("big.iso")));

        // The first peer's state was discarded, not shelved
        assert!(!tracker
            .session_for(first)
            .is_resume(Direction::Upload, Path::new("big.iso")));
    }
}
