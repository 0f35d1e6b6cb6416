use crate::hypervisor::{Inventory, SessionProvider};
use crate::table::{Field, Table};

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};

// Error Handling
use log::{info, warn};
use proxfleet_error::ProxfleetError;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum HostState {
    Reachable(Inventory),
    /// The inventory couldn't be fetched, with the failure text.
    Unreachable(String),
}

/// Configured hosts referenced by the batch, by `target_host` name.
/// Hosts missing from the registry are unknown to the configuration.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct HostRegistry {
    hosts: BTreeMap<String, HostState>,
}

impl HostRegistry {
    pub fn insert(&mut self, host: &str, state: HostState) {
        self.hosts.insert(host.to_owned(), state);
    }
    pub fn get(&self, host: &str) -> Option<&HostState> {
        self.hosts.get(host)
    }
    pub fn inventory(&self, host: &str) -> Option<&Inventory> {
        match self.hosts.get(host) {
            Some(HostState::Reachable(inventory)) => Some(inventory),
            _ => None,
        }
    }
    pub fn hosts(&self) -> impl Iterator<Item = (&String, &HostState)> {
        self.hosts.iter()
    }

    /**
    Fetch the inventory of every configured host the table references.
    Hosts are queried concurrently, a failing host is registered
    as unreachable instead of failing the batch.
    */
    pub async fn discover(provider: &dyn SessionProvider, table: &Table) -> HostRegistry {
        let configured: BTreeSet<String> = provider.hosts().into_iter().collect();
        let referenced: BTreeSet<String> = table
            .rows
            .iter()
            .filter_map(|e| e.value(Field::TargetHost))
            .filter(|e| configured.contains(*e))
            .map(|e| e.to_owned())
            .collect();

        info!("[start] discovering {} host(s)", referenced.len());
        let tasks = referenced.iter().map(|host| async move {
            let state = match Self::fetch(provider, host).await {
                Ok(inventory) => HostState::Reachable(inventory),
                Err(e) => {
                    warn!("[{}] host unreachable: {}", host, e);
                    HostState::Unreachable(e.to_string())
                }
            };
            (host.to_owned(), state)
        });

        let mut registry = HostRegistry::default();
        for (host, state) in join_all(tasks).await {
            registry.insert(&host, state);
        }
        info!("[end] discovered {} host(s)", registry.hosts.len());
        registry
    }

    async fn fetch(provider: &dyn SessionProvider, host: &str) -> Result<Inventory, ProxfleetError> {
        let session = provider.session(host).await?;
        session.inventory().await
    }
}
