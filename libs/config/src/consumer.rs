//! Consumer configuration
//!
//! A consumer connects to one or more channels. Without sessions every
//! channel belongs to a single implicit session and they are tried in order;
//! with sessions each session is an independent connection and items are
//! routed to whichever session carries the requested service.

use crate::channel::{ChannelConfig, PreferredHostConfig, ReconnectConfig, SessionConfig};
use crate::defaults;
use crate::dictionary::DictionarySource;
use crate::error::{ConfigError, Result};
use crate::OperationModel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Channels grouped for one connection, in failover order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub name: String,
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub name: String,
    pub user_name: String,
    pub application_id: String,
    pub application_name: String,
    pub position: String,
    pub password: Option<String>,
    pub operation_model: OperationModel,
    pub dispatch_timeout_ms: u64,
    pub channels: Vec<ChannelConfig>,
    pub sessions: Vec<SessionConfig>,
    pub reconnect: ReconnectConfig,
    pub preferred_host: PreferredHostConfig,
    pub login_timeout_ms: u64,
    pub directory_timeout_ms: u64,
    pub dictionary_timeout_ms: u64,
    /// Pending item requests older than this are re-sent
    pub request_timeout_ms: u64,
    pub dictionary: DictionarySource,
    pub max_nesting_depth: usize,
    /// Advertise round-trip latency support in the login request
    pub support_rtt: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            name: "Consumer_1".into(),
            user_name: default_user(),
            application_id: defaults::APPLICATION_ID.into(),
            application_name: "omm-consumer".into(),
            position: defaults::POSITION.into(),
            password: None,
            operation_model: OperationModel::ApiDispatch,
            dispatch_timeout_ms: defaults::DISPATCH_TIMEOUT_MS,
            channels: Vec::new(),
            sessions: Vec::new(),
            reconnect: ReconnectConfig::default(),
            preferred_host: PreferredHostConfig::default(),
            login_timeout_ms: defaults::LOGIN_TIMEOUT_MS,
            directory_timeout_ms: defaults::DIRECTORY_TIMEOUT_MS,
            dictionary_timeout_ms: defaults::DICTIONARY_TIMEOUT_MS,
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
            dictionary: DictionarySource::default(),
            max_nesting_depth: defaults::MAX_NESTING_DEPTH,
            support_rtt: false,
        }
    }
}

pub(crate) fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "user".into())
}

impl ConsumerConfig {
    pub fn builder() -> ConsumerConfigBuilder {
        ConsumerConfigBuilder {
            config: ConsumerConfig::default(),
        }
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }

    pub fn dictionary_timeout(&self) -> Duration {
        Duration::from_millis(self.dictionary_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Sessions with channel names replaced by their configurations
    pub fn resolved_sessions(&self) -> Result<Vec<ResolvedSession>> {
        if self.sessions.is_empty() {
            return Ok(vec![ResolvedSession {
                name: self.name.clone(),
                channels: self.channels.clone(),
            }]);
        }
        self.sessions
            .iter()
            .map(|session| {
                let channels = session
                    .channels
                    .iter()
                    .map(|name| {
                        self.channels
                            .iter()
                            .find(|c| &c.name == name)
                            .cloned()
                            .ok_or_else(|| {
                                ConfigError::unknown("channel", name, format!("session {}", session.name))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ResolvedSession {
                    name: session.name.clone(),
                    channels,
                })
            })
            .collect()
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
        let mut session_names = HashSet::new();
        for session in &self.sessions {
            if session.channels.is_empty() {
                return Err(ConfigError::invalid(
                    format!("session {}.channels", session.name),
                    "must not be empty",
                ));
            }
            if !session_names.insert(session.name.as_str()) {
                return Err(ConfigError::duplicate("session", session.name.clone()));
            }
        }
        let sessions = self.resolved_sessions()?;
        let smallest = sessions.iter().map(|s| s.channels.len()).min().unwrap_or(0);
        self.preferred_host.validate(smallest)?;
        self.reconnect.validate()?;
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::invalid(
                "max_nesting_depth",
                "must be greater than zero",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub(crate) fn expand_paths(&mut self) -> Result<()> {
        if let DictionarySource::Files(files) = &mut self.dictionary {
            files.expand()?;
        }
        Ok(())
    }
}

/// Validating builder; each setter rejects a bad value immediately
#[derive(Debug, Clone)]
pub struct ConsumerConfigBuilder {
    config: ConsumerConfig,
}

impl ConsumerConfigBuilder {
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

    pub fn application_id(mut self, id: impl Into<String>) -> Self {
        self.config.application_id = id.into();
        self
    }

    pub fn position(mut self, position: impl Into<String>) -> Self {
        self.config.position = position.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Add a channel named after its position, `Channel_<n>`
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

    /// Group already added channels into a routing session
    pub fn session(mut self, name: impl Into<String>, channels: &[&str]) -> Result<Self> {
        let name = name.into();
        for channel in channels {
            if !self.config.channels.iter().any(|c| c.name == *channel) {
                return Err(ConfigError::unknown("channel", *channel, format!("session {name}")));
            }
        }
        if channels.is_empty() {
            return Err(ConfigError::invalid(
                format!("session {name}.channels"),
                "must not be empty",
            ));
        }
        self.config.sessions.push(SessionConfig {
            name,
            channels: channels.iter().map(|c| c.to_string()).collect(),
        });
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

    pub fn operation_model(mut self, model: OperationModel) -> Self {
        self.config.operation_model = model;
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout_ms", "must be greater than zero"));
        }
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        Ok(self)
    }

    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.config.login_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn dictionary(mut self, source: DictionarySource) -> Self {
        self.config.dictionary = source;
        self
    }

    pub fn max_nesting_depth(mut self, depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(ConfigError::invalid("max_nesting_depth", "must be greater than zero"));
        }
        self.config.max_nesting_depth = depth;
        Ok(self)
    }

    pub fn support_rtt(mut self, enabled: bool) -> Self {
        self.config.support_rtt = enabled;
        self
    }

    pub fn build(self) -> Result<ConsumerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fails_at_the_bad_setter() {
        let err = ConsumerConfig::builder().host("no-port").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = ConsumerConfig::builder()
            .host("localhost:14002")
            .unwrap()
            .session("A", &["Channel_9"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownReference { kind: "channel", .. }));
    }

    #[test]
    fn build_requires_a_channel() {
        assert!(matches!(
            ConsumerConfig::builder().build(),
            Err(ConfigError::Missing { .. })
        ));
    }

    #[test]
    fn without_sessions_all_channels_form_one_session() {
        let config = ConsumerConfig::builder()
            .host("primary:14002")
            .unwrap()
            .host("backup:14002")
            .unwrap()
            .build()
            .unwrap();
        let sessions = config.resolved_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        let hosts: Vec<_> = sessions[0].channels.iter().map(|c| c.host.as_str()).collect();
        assert_eq!(hosts, ["primary:14002", "backup:14002"]);
    }

    #[test]
    fn sessions_resolve_their_channels() {
        let config = ConsumerConfig::builder()
            .host("a:1")
            .unwrap()
            .host("b:2")
            .unwrap()
            .host("c:3")
            .unwrap()
            .session("East", &["Channel_1", "Channel_2"])
            .unwrap()
            .session("West", &["Channel_3"])
            .unwrap()
            .build()
            .unwrap();
        let sessions = config.resolved_sessions().unwrap();
        assert_eq!(sessions[0].name, "East");
        assert_eq!(sessions[0].channels.len(), 2);
        assert_eq!(sessions[1].channels[0].host, "c:3");
    }

    #[test]
    fn preferred_host_must_fit_smallest_session() {
        let err = ConsumerConfig::builder()
            .host("a:1")
            .unwrap()
            .preferred_host(1, Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err.field(), Some("preferred_host.host_index"));
    }
}
