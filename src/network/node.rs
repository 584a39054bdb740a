use std::sync::RwLock;

/// A known peer, addressed as `host:port`.
#[derive(Clone)]
pub struct Peer {
    addr: String,
}

impl Peer {
    fn new(addr: String) -> Peer {
        Peer { addr }
    }

    pub fn get_addr(&self) -> String {
        self.addr.clone()
    }
}

/// The append-only known-peers list. Peers are added as they introduce
/// themselves and evicted when a dial fails.
pub struct Peers {
    inner: RwLock<Vec<Peer>>,
}

impl Default for Peers {
    fn default() -> Self {
        Self::new()
    }
}

impl Peers {
    pub fn new() -> Peers {
        Peers {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_peer(&self, addr: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on peers - this should never happen");
        if !inner.iter().any(|x| x.get_addr().eq(addr.as_str())) {
            inner.push(Peer::new(addr));
        }
    }

    pub fn evict_peer(&self, addr: &str) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on peers - this should never happen");
        if let Some(idx) = inner.iter().position(|x| x.get_addr().eq(addr)) {
            inner.remove(idx);
        }
    }

    pub fn peer_is_known(&self, addr: &str) -> bool {
        self.inner
            .read()
            .expect("Failed to acquire read lock on peers - this should never happen")
            .iter()
            .any(|x| x.get_addr().eq(addr))
    }

    pub fn get_peers(&self) -> Vec<Peer> {
        self.inner
            .read()
            .expect("Failed to acquire read lock on peers - this should never happen")
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_deduplicated() {
        let peers = Peers::new();
        peers.add_peer("localhost:5000".to_string());
        peers.add_peer("localhost:5001".to_string());
        peers.add_peer("localhost:5000".to_string());

        assert_eq!(peers.get_peers().len(), 2);
        assert!(peers.peer_is_known("localhost:5000"));
        assert!(!peers.peer_is_known("localhost:5002"));
    }

    #[test]
    fn test_evict() {
        let peers = Peers::new();
        peers.add_peer("localhost:5000".to_string());
        peers.add_peer("localhost:5001".to_string());

        peers.evict_peer("localhost:5000");
        assert!(!peers.peer_is_known("localhost:5000"));
        assert_eq!(peers.get_peers().len(), 1);

        // Evicting an unknown peer is a no-op.
        peers.evict_peer("localhost:9999");
        assert_eq!(peers.get_peers().len(), 1);
    }
}
