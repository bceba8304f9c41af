//! Backend group management.
//!
//! # Responsibilities
//! - Group backends by name (route `backend_group`, webhook `cluster`)
//! - Apply the group's load balancer to pick a member
//! - Hand out connection guards

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::load_balancer::{
    backend::{Backend, BackendConnectionGuard},
    round_robin::RoundRobin,
    LoadBalancer,
};

/// Named backend groups.
#[derive(Debug)]
pub struct BackendManager {
    groups: HashMap<String, (Vec<Arc<Backend>>, Box<dyn LoadBalancer>)>,
}

impl BackendManager {
    pub fn new(configs: Vec<BackendConfig>) -> Self {
        let mut groups: HashMap<String, Vec<Arc<Backend>>> = HashMap::new();

        // 1. Group backends by group name
        for config in configs {
            match config.address.parse() {
                Ok(addr) => {
                    let backend = Arc::new(Backend::new(addr, config.max_connections));
                    groups.entry(config.group.clone()).or_default().push(backend);
                }
                Err(_) => tracing::warn!(address = %config.address, "Invalid backend address"),
            }
        }

        // 2. One balancer per group
        let groups = groups
            .into_iter()
            .map(|(name, backends)| {
                let lb: Box<dyn LoadBalancer> = Box::new(RoundRobin::new());
                (name, (backends, lb))
            })
            .collect();

        Self { groups }
    }

    #[cfg(test)]
    pub fn has_group(&self, group_name: &str) -> bool {
        self.groups.contains_key(group_name)
    }

    /// Select a member of `group_name`.
    /// Returns a guard that releases the connection slot on drop.
    pub fn get(&self, group_name: &str) -> Option<BackendConnectionGuard> {
        let Some((backends, lb)) = self.groups.get(group_name) else {
            tracing::debug!(group = %group_name, "Group not found");
            return None;
        };

        match lb.next_server(backends) {
            Some(backend) => backend.try_create_guard(),
            None => {
                tracing::debug!(group = %group_name, backend_count = backends.len(), "No backend with spare capacity");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(group: &str, address: &str) -> BackendConfig {
        BackendConfig {
            group: group.to_string(),
            address: address.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_groups_by_name() {
        let manager = BackendManager::new(vec![
            backend("app", "127.0.0.1:9001"),
            backend("app", "127.0.0.1:9002"),
            backend("alerts", "127.0.0.1:9100"),
            backend("broken", "not-an-address"),
        ]);

        assert!(manager.has_group("app"));
        assert!(manager.has_group("alerts"));
        assert!(!manager.has_group("broken"));
        assert_eq!(manager.get("alerts").unwrap().addr, "127.0.0.1:9100".parse().unwrap());
        assert!(manager.get("missing").is_none());
    }
}
