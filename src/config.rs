use std::net::SocketAddr;

/// Configuration for a single cluster node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Node name (unique identifier within the cluster)
    pub name: String,
    /// Address to bind the RPC listener to
    pub listen_addr: SocketAddr,
    /// Address of an existing member to join through (optional)
    pub join_addr: Option<SocketAddr>,
    /// Mean communication delay injected into outbound channels, in ms.
    /// Zero disables delay injection.
    pub mean_delay_ms: f64,
    /// Probability in [0, 1] that an outbound channel drops its message
    pub loss_rate: f64,
    /// Random seed for fault injection and election timing.
    /// Zero means "derive from entropy".
    pub seed: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "node".to_string(),
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:8080"
                .parse()
                .expect("default listen address is valid"),
            join_addr: None,
            mean_delay_ms: 0.0,
            loss_rate: 0.0,
            seed: 0,
            election_timeout_min_ms: 2000,
            election_timeout_max_ms: 3000,
            heartbeat_interval_ms: 1000,
        }
    }
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, listen_addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_join_addr(mut self, addr: SocketAddr) -> Self {
        self.join_addr = Some(addr);
        self
    }

    pub fn with_faults(mut self, mean_delay_ms: f64, loss_rate: f64) -> Self {
        self.mean_delay_ms = mean_delay_ms;
        self.loss_rate = loss_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_config_default() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.name, "node");
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
        assert!(cfg.join_addr.is_none());
        assert_eq!(cfg.mean_delay_ms, 0.0);
        assert_eq!(cfg.loss_rate, 0.0);
        assert_eq!(cfg.seed, 0);
        assert_eq!(cfg.election_timeout_min_ms, 2000);
        assert_eq!(cfg.election_timeout_max_ms, 3000);
        assert_eq!(cfg.heartbeat_interval_ms, 1000);
    }

    #[test]
    fn node_config_new() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = NodeConfig::new("alpha", addr);
        assert_eq!(cfg.name, "alpha");
        assert_eq!(cfg.listen_addr, addr);
        assert!(cfg.join_addr.is_none());
    }

    #[test]
    fn node_config_builders() {
        let join: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let cfg = NodeConfig::default()
            .with_join_addr(join)
            .with_faults(50.0, 0.1)
            .with_seed(42);
        assert_eq!(cfg.join_addr, Some(join));
        assert_eq!(cfg.mean_delay_ms, 50.0);
        assert_eq!(cfg.loss_rate, 0.1);
        assert_eq!(cfg.seed, 42);
    }
}
