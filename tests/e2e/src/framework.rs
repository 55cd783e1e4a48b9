//! Core E2E testing framework
//!
//! A [`TestFramework`] owns one interactive provider serving a single
//! service and builds consumers connected to it, over loopback TCP or the
//! in-memory transport.

use crate::fixtures::FeedProvider;
use access::{OmmConsumer, OmmProvider};
use anyhow::{bail, Context, Result};
use network::MemoryRegistry;
use omm_config::{
    ConsumerConfig, DictionarySource, IProviderConfig, OperationModel, ReconnectConfig, ServiceConfig,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// Transport the scenario runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Memory,
    Tcp,
}

#[derive(Debug, Clone)]
pub struct TestConfig {
    pub transport: Transport,
    /// Upper bound for every wait in a scenario
    pub timeout: Duration,
    pub service_name: String,
    pub service_id: u16,
    pub operation_model: OperationModel,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Memory,
            timeout: Duration::from_secs(10),
            service_name: "DIRECT_FEED".into(),
            service_id: 1,
            operation_model: OperationModel::ApiDispatch,
        }
    }
}

impl TestConfig {
    pub fn over(transport: Transport) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }
}

/// Main test framework coordinator
pub struct TestFramework {
    config: TestConfig,
    memory: MemoryRegistry,
    feed: Arc<FeedProvider>,
    provider: Option<OmmProvider>,
    /// Address consumers connect to; fixed once the first provider bound
    address: String,
    test_id: Uuid,
}

impl TestFramework {
    /// Start the provider; consumers are built on demand
    pub fn new(config: TestConfig) -> Result<Self> {
        let test_id = Uuid::new_v4();
        let address = match config.transport {
            Transport::Memory => format!("memory://e2e-{test_id}"),
            Transport::Tcp => "127.0.0.1:0".to_string(),
        };
        let mut framework = Self {
            config,
            memory: MemoryRegistry::new(),
            feed: Arc::new(FeedProvider::new()),
            provider: None,
            address,
            test_id,
        };
        framework.start_provider()?;
        Ok(framework)
    }

    /// Bind a provider at the framework's address, reusing the feed
    pub fn start_provider(&mut self) -> Result<()> {
        if self.provider.is_some() {
            bail!("provider already running");
        }
        let config = IProviderConfig::builder()
            .bind(&self.address)?
            .service(ServiceConfig::new(self.config.service_id, self.config.service_name.clone())?)?
            .build()?;
        let provider = OmmProvider::interactive(config, Arc::clone(&self.feed) as _)
            .memory(self.memory.clone())
            .build()
            .context("interactive provider did not start")?;
        if let Some(endpoint) = provider.endpoint() {
            self.address = endpoint.to_string();
        }
        info!(test_id = %self.test_id, address = %self.address, "Provider started");
        self.provider = Some(provider);
        Ok(())
    }

    /// Shut the provider down; its consumers see the channel drop
    pub fn stop_provider(&mut self) {
        if let Some(provider) = self.provider.take() {
            provider.uninitialize();
            info!(test_id = %self.test_id, "Provider stopped");
        }
    }

    pub fn provider(&self) -> Result<&OmmProvider> {
        self.provider.as_ref().context("provider is not running")
    }

    pub fn feed(&self) -> &Arc<FeedProvider> {
        &self.feed
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn consumer_config(&self) -> Result<ConsumerConfig> {
        let reconnect = ReconnectConfig::new(Duration::from_millis(50), Duration::from_millis(200), -1)?;
        Ok(ConsumerConfig::builder()
            .name(format!("consumer-{}", self.test_id))?
            .host(&self.address)?
            .user_name("e2e")?
            .reconnect(reconnect)?
            .dictionary(DictionarySource::Disabled)
            .operation_model(self.config.operation_model)
            .build()?)
    }

    /// Consumer logged in to the provider with its directory loaded
    pub fn consumer(&self) -> Result<OmmConsumer> {
        OmmConsumer::builder(self.consumer_config()?)
            .memory(self.memory.clone())
            .build()
            .context("consumer did not become ready")
    }

    /// Poll `done` until it holds or the scenario timeout passes
    pub fn wait_until(&self, what: &str, mut done: impl FnMut() -> bool) -> Result<()> {
        let deadline = Instant::now() + self.config.timeout;
        while Instant::now() < deadline {
            if done() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }
        if done() {
            return Ok(());
        }
        bail!("timed out after {:?} waiting for {what}", self.config.timeout)
    }
}

impl Drop for TestFramework {
    fn drop(&mut self) {
        self.stop_provider();
    }
}
