//! Interactive and non-interactive provider configuration

use crate::channel::{ChannelConfig, PreferredHostConfig, ReconnectConfig, ServerConfig};
use crate::consumer::default_user;
use crate::defaults;
use crate::dictionary::DictionaryFiles;
use crate::error::{ConfigError, Result};
use crate::service::{validate_services, AdminControl, ServiceConfig};
use crate::OperationModel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Provider that listens for consumers and answers their requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IProviderConfig {
    pub name: String,
    pub server: ServerConfig,
    pub operation_model: OperationModel,
    pub dispatch_timeout_ms: u64,
    pub services: Vec<ServiceConfig>,
    pub directory_admin: AdminControl,
    pub dictionary_admin: AdminControl,
    /// Served to consumers under API control
    pub dictionary: Option<DictionaryFiles>,
    pub max_nesting_depth: usize,
    /// Deliver item requests for unconfigured services instead of rejecting them
    pub accept_unknown_services: bool,
}

impl Default for IProviderConfig {
    fn default() -> Self {
        Self {
            name: "Provider_1".into(),
            server: ServerConfig::default(),
            operation_model: OperationModel::ApiDispatch,
            dispatch_timeout_ms: defaults::DISPATCH_TIMEOUT_MS,
            services: Vec::new(),
            directory_admin: AdminControl::ApiControl,
            dictionary_admin: AdminControl::ApiControl,
            dictionary: None,
            max_nesting_depth: defaults::MAX_NESTING_DEPTH,
            accept_unknown_services: false,
        }
    }
}

impl IProviderConfig {
    pub fn builder() -> IProviderConfigBuilder {
        IProviderConfigBuilder {
            config: IProviderConfig::default(),
        }
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        self.server.validate()?;
        validate_services(&self.services)?;
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::invalid(
                "max_nesting_depth",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub(crate) fn expand_paths(&mut self) -> Result<()> {
        if let Some(files) = &mut self.dictionary {
            files.expand()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct IProviderConfigBuilder {
    config: IProviderConfig,
}

impl IProviderConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        self.config.name = name;
        Ok(self)
    }

    /// `host:port` or `memory://name` to listen on
    pub fn bind(mut self, bind: &str) -> Result<Self> {
        let mut server = self.config.server.clone();
        server.bind = bind.to_string();
        server.validate()?;
        self.config.server = server;
        Ok(self)
    }

    pub fn server(mut self, server: ServerConfig) -> Result<Self> {
        server.validate()?;
        self.config.server = server;
        Ok(self)
    }

    pub fn service(mut self, service: ServiceConfig) -> Result<Self> {
        let mut services = self.config.services.clone();
        services.push(service);
        validate_services(&services)?;
        self.config.services = services;
        Ok(self)
    }

    pub fn directory_admin(mut self, control: AdminControl) -> Self {
        self.config.directory_admin = control;
        self
    }

    pub fn dictionary_admin(mut self, control: AdminControl) -> Self {
        self.config.dictionary_admin = control;
        self
    }

    pub fn dictionary(mut self, files: DictionaryFiles) -> Self {
        self.config.dictionary = Some(files);
        self
    }

    pub fn operation_model(mut self, model: OperationModel) -> Self {
        self.config.operation_model = model;
        self
    }

    pub fn accept_unknown_services(mut self, accept: bool) -> Self {
        self.config.accept_unknown_services = accept;
        self
    }

    pub fn build(self) -> Result<IProviderConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Provider that connects out and publishes without being asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NiProviderConfig {
    pub name: String,
    pub user_name: String,
    pub application_id: String,
    pub position: String,
    pub operation_model: OperationModel,
    pub dispatch_timeout_ms: u64,
    pub channels: Vec<ChannelConfig>,
    pub reconnect: ReconnectConfig,
    pub preferred_host: PreferredHostConfig,
    pub services: Vec<ServiceConfig>,
    /// ApiControl publishes the configured directory on every connect
    pub directory_admin: AdminControl,
    pub login_timeout_ms: u64,
}

impl Default for NiProviderConfig {
    fn default() -> Self {
        Self {
            name: "NiProvider_1".into(),
            user_name: default_user(),
            application_id: defaults::APPLICATION_ID.into(),
            position: defaults::POSITION.into(),
            operation_model: OperationModel::ApiDispatch,
            dispatch_timeout_ms: defaults::DISPATCH_TIMEOUT_MS,
            channels: Vec::new(),
            reconnect: ReconnectConfig::default(),
            preferred_host: PreferredHostConfig::default(),
            services: Vec::new(),
            directory_admin: AdminControl::ApiControl,
            login_timeout_ms: defaults::LOGIN_TIMEOUT_MS,
        }
    }
}

impl NiProviderConfig {
    pub fn builder() -> NiProviderConfigBuilder {
        NiProviderConfigBuilder {
            config: NiProviderConfig::default(),
        }
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.user_name.trim().is_empty() {
            return Err(ConfigError::invalid("user_name", "must not be empty"));
        }
        if self.channels.is_empty() {
            return Err(ConfigError::missing("channels"));
        }
        let mut names = HashSet::new();
        for channel in &self.channels {
            channel.validate()?;
            if !names.insert(channel.name.as_str()) {
                return Err(ConfigError::duplicate("channel", channel.name.clone()));
            }
        }
        self.preferred_host.validate(self.channels.len())?;
        self.reconnect.validate()?;
        validate_services(&self.services)
    }
}

#[derive(Debug, Clone)]
pub struct NiProviderConfigBuilder {
    config: NiProviderConfig,
}

impl NiProviderConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        self.config.name = name;
        Ok(self)
    }

    pub fn user_name(mut self, user: impl Into<String>) -> Result<Self> {
        let user = user.into();
        if user.trim().is_empty() {
            return Err(ConfigError::invalid("user_name", "must not be empty"));
        }
        self.config.user_name = user;
        Ok(self)
    }

    pub fn host(self, host: &str) -> Result<Self> {
        let name = format!("Channel_{}", self.config.channels.len() + 1);
        self.channel(ChannelConfig::new(name, host)?)
    }

    pub fn channel(mut self, channel: ChannelConfig) -> Result<Self> {
        channel.validate()?;
        if self.config.channels.iter().any(|c| c.name == channel.name) {
            return Err(ConfigError::duplicate("channel", channel.name));
        }
        self.config.channels.push(channel);
        Ok(self)
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Result<Self> {
        reconnect.validate()?;
        self.config.reconnect = reconnect;
        Ok(self)
    }

    pub fn preferred_host(mut self, host_index: usize, detection_interval: Duration) -> Result<Self> {
        let preferred = PreferredHostConfig {
            enabled: true,
            host_index,
            detection_interval_ms: detection_interval.as_millis() as u64,
        };
        preferred.validate(self.config.channels.len())?;
        self.config.preferred_host = preferred;
        Ok(self)
    }

    pub fn service(mut self, service: ServiceConfig) -> Result<Self> {
        let mut services = self.config.services.clone();
        services.push(service);
        validate_services(&services)?;
        self.config.services = services;
        Ok(self)
    }

    pub fn directory_admin(mut self, control: AdminControl) -> Self {
        self.config.directory_admin = control;
        self
    }

    pub fn operation_model(mut self, model: OperationModel) -> Self {
        self.config.operation_model = model;
        self
    }

    pub fn build(self) -> Result<NiProviderConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
