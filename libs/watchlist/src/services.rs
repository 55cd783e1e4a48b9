//! Source directory cache
//!
//! Each consumer session keeps the services its provider advertised. Map
//! actions are applied exactly: Add replaces the entry, Update merges only the
//! filters present, Delete removes it. The caller learns which services
//! changed availability so items can be suspended, recovered or re-routed.

use std::collections::BTreeMap;
use types::rdm::directory::{ServiceEntry, ServiceInfo, ServiceState};
use types::MapAction;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CachedService {
    pub info: ServiceInfo,
    pub state: ServiceState,
}

impl CachedService {
    /// Up and accepting requests
    pub fn is_available(&self) -> bool {
        self.state.service_up && self.state.accepting_requests
    }

    pub fn supports(&self, domain: u16) -> bool {
        self.info.capabilities.is_empty() || self.info.capabilities.contains(&domain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable,
    Deleted,
}

/// A service whose availability changed while applying a directory message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceChange {
    pub id: u16,
    pub name: String,
    pub now: Availability,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceCache {
    services: BTreeMap<u16, CachedService>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, entries: Vec<ServiceEntry>) -> Vec<ServiceChange> {
        let mut changes = Vec::new();
        for entry in entries {
            let before = self.services.get(&entry.id).map(CachedService::is_available);
            match entry.action {
                MapAction::Delete => {
                    if let Some(removed) = self.services.remove(&entry.id) {
                        changes.push(ServiceChange {
                            id: entry.id,
                            name: removed.info.name,
                            now: Availability::Deleted,
                        });
                    }
                    continue;
                }
                MapAction::Add => {
                    let service = CachedService {
                        info: entry.info.unwrap_or_default(),
                        state: entry.state.unwrap_or_default(),
                    };
                    self.services.insert(entry.id, service);
                }
                MapAction::Update => {
                    let service = self.services.entry(entry.id).or_default();
                    if let Some(info) = entry.info {
                        service.info = info;
                    }
                    if let Some(state) = entry.state {
                        service.state = state;
                    }
                }
            }
            if let Some(service) = self.services.get(&entry.id) {
                let available = service.is_available();
                if before != Some(available) {
                    changes.push(ServiceChange {
                        id: entry.id,
                        name: service.info.name.clone(),
                        now: if available {
                            Availability::Available
                        } else {
                            Availability::Unavailable
                        },
                    });
                }
            }
        }
        changes
    }

    pub fn by_name(&self, name: &str) -> Option<(u16, &CachedService)> {
        self.services
            .iter()
            .find(|(_, service)| service.info.name == name)
            .map(|(id, service)| (*id, service))
    }

    pub fn by_id(&self, id: u16) -> Option<&CachedService> {
        self.services.get(&id)
    }

    pub fn name_of(&self, id: u16) -> Option<&str> {
        self.services.get(&id).map(|s| s.info.name.as_str())
    }

    /// Every cached service as an Add entry, optionally only one
    pub fn entries(&self, only: Option<&str>) -> Vec<ServiceEntry> {
        self.services
            .iter()
            .filter(|(_, service)| only.map_or(true, |name| service.info.name == name))
            .map(|(id, service)| ServiceEntry::add(*id, service.info.clone(), service.state.clone()))
            .collect()
    }

    /// First service offering the named dictionary
    pub fn dictionary_provider(&self, dictionary: &str) -> Option<u16> {
        self.services
            .iter()
            .find(|(_, s)| s.is_available() && s.info.dictionaries_provided.iter().any(|d| d == dictionary))
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> ServiceInfo {
        ServiceInfo {
            name: name.into(),
            capabilities: vec![6],
            ..ServiceInfo::default()
        }
    }

    #[test]
    fn add_update_delete_report_availability_changes() {
        let mut cache = ServiceCache::new();
        let changes = cache.apply(vec![ServiceEntry::add(1, info("DIRECT_FEED"), ServiceState::default())]);
        assert_eq!(changes[0].now, Availability::Available);
        assert_eq!(cache.by_name("DIRECT_FEED").map(|(id, _)| id), Some(1));

        let down = ServiceEntry {
            action: MapAction::Update,
            id: 1,
            info: None,
            state: Some(ServiceState {
                service_up: false,
                ..ServiceState::default()
            }),
            groups: Vec::new(),
        };
        let changes = cache.apply(vec![down]);
        assert_eq!(changes[0].now, Availability::Unavailable);
        assert_eq!(cache.name_of(1), Some("DIRECT_FEED"));

        let changes = cache.apply(vec![ServiceEntry::delete(1)]);
        assert_eq!(changes[0].now, Availability::Deleted);
        assert!(cache.is_empty());
    }

    #[test]
    fn update_without_state_change_is_silent() {
        let mut cache = ServiceCache::new();
        cache.apply(vec![ServiceEntry::add(1, info("A"), ServiceState::default())]);
        let info_only = ServiceEntry {
            action: MapAction::Update,
            id: 1,
            info: Some(info("A")),
            state: None,
            groups: Vec::new(),
        };
        assert!(cache.apply(vec![info_only]).is_empty());
        assert_eq!(cache.entries(Some("A")).len(), 1);
        assert!(cache.entries(Some("B")).is_empty());
    }
}
