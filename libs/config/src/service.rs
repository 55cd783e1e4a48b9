//! Services a provider advertises in its source directory

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use types::rdm::directory::{ServiceEntry, ServiceInfo, ServiceState};
use types::{DomainType, Qos, Rate, Timeliness};

/// Who answers directory or dictionary requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminControl {
    /// Answered by the library from configuration
    #[default]
    ApiControl,
    /// Delivered to the application
    UserControl,
}

/// Quality of service in configuration form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    /// Unset means real time
    pub delayed_secs: Option<u16>,
    /// Unset means tick by tick
    pub conflation_ms: Option<u16>,
    pub dynamic: bool,
}

impl QosConfig {
    pub fn to_qos(self) -> Qos {
        let timeliness = match self.delayed_secs {
            None => Timeliness::RealTime,
            Some(secs) => Timeliness::Delayed(secs),
        };
        let rate = match self.conflation_ms {
            None => Rate::TickByTick,
            Some(ms) => Rate::TimeConflated(ms),
        };
        Qos {
            timeliness,
            rate,
            dynamic: self.dynamic,
        }
    }
}

/// One configured service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default = "default_true")]
    pub is_source: bool,
    /// Supported domain type values
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<u16>,
    #[serde(default)]
    pub dictionaries_provided: Vec<String>,
    #[serde(default)]
    pub dictionaries_used: Vec<String>,
    #[serde(default = "default_qos")]
    pub qos: Vec<QosConfig>,
    #[serde(default = "default_true")]
    pub service_up: bool,
    #[serde(default = "default_true")]
    pub accepting_requests: bool,
}

fn default_true() -> bool {
    true
}

fn default_capabilities() -> Vec<u16> {
    vec![
        DomainType::MARKET_PRICE.into(),
        DomainType::MARKET_BY_ORDER.into(),
    ]
}

fn default_qos() -> Vec<QosConfig> {
    vec![QosConfig::default()]
}

impl ServiceConfig {
    /// Service with market price and market-by-order capabilities
    pub fn new(id: u16, name: impl Into<String>) -> Result<Self> {
        let service = Self {
            id,
            name: name.into(),
            vendor: None,
            is_source: true,
            capabilities: default_capabilities(),
            dictionaries_provided: Vec::new(),
            dictionaries_used: Vec::new(),
            qos: default_qos(),
            service_up: true,
            accepting_requests: true,
        };
        service.validate()?;
        Ok(service)
    }

    pub fn with_capabilities(mut self, capabilities: &[u16]) -> Result<Self> {
        for &value in capabilities {
            DomainType::new(value).map_err(|e| {
                ConfigError::invalid(format!("service {}.capabilities", self.name), e.to_string())
            })?;
        }
        self.capabilities = capabilities.to_vec();
        Ok(self)
    }

    pub fn with_dictionaries(mut self, provided: &[&str], used: &[&str]) -> Self {
        self.dictionaries_provided = provided.iter().map(|s| s.to_string()).collect();
        self.dictionaries_used = used.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("service.name", "must not be empty"));
        }
        if self.capabilities.is_empty() {
            return Err(ConfigError::invalid(
                format!("service {}.capabilities", self.name),
                "at least one domain is required",
            ));
        }
        for &value in &self.capabilities {
            DomainType::new(value).map_err(|e| {
                ConfigError::invalid(format!("service {}.capabilities", self.name), e.to_string())
            })?;
        }
        Ok(())
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name.clone(),
            vendor: self.vendor.clone(),
            is_source: self.is_source,
            capabilities: self.capabilities.clone(),
            dictionaries_provided: self.dictionaries_provided.clone(),
            dictionaries_used: self.dictionaries_used.clone(),
            qos: self.qos.iter().map(|q| q.to_qos()).collect(),
        }
    }

    pub fn state(&self) -> ServiceState {
        ServiceState {
            service_up: self.service_up,
            accepting_requests: self.accepting_requests,
            status: None,
        }
    }

    /// Directory entry announcing this service
    pub fn entry(&self) -> ServiceEntry {
        ServiceEntry::add(self.id, self.info(), self.state())
    }
}

/// Reject duplicate service ids or names
pub fn validate_services(services: &[ServiceConfig]) -> Result<()> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for service in services {
        service.validate()?;
        if !ids.insert(service.id) {
            return Err(ConfigError::duplicate("service id", service.id.to_string()));
        }
        if !names.insert(service.name.as_str()) {
            return Err(ConfigError::duplicate("service name", service.name.clone()));
        }
    }
    Ok(())
}
