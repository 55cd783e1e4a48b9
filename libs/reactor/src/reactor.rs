//! The reactor: runtime owner and public surface of the multiplexer

use crate::channel::{ChannelShared, Command};
use crate::client::{ClientPlan, ClientSupervisor};
use crate::error::{ReactorError, Result};
use crate::event::{ChannelInfo, ChannelRole, ChannelState, ReactorEvent};
use crate::registry::Registry;
use crate::server::{self, ServerShared};
use codec::{Decoder, Encoder};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use network::{
    BufferPool, ChannelId, Endpoint, EndpointConnector, IoctlCode, MemoryRegistry,
    DEFAULT_MAX_FRAME_SIZE,
};
use omm_config::{ChannelConfig, ConfigError, PreferredHostConfig, ReconnectConfig, ServerConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle as RuntimeHandle, Runtime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Time allowed for channels to flush and close on shutdown
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ReactorOptions {
    /// Name announced in every handshake
    pub component_name: String,
    pub worker_threads: usize,
    pub max_nesting_depth: usize,
    pub max_frame_size: usize,
    /// Where `memory://` endpoints are resolved and bound
    pub memory: MemoryRegistry,
}

impl Default for ReactorOptions {
    fn default() -> Self {
        Self {
            component_name: "omm-sdk".into(),
            worker_threads: 2,
            max_nesting_depth: 32,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            memory: MemoryRegistry::new(),
        }
    }
}

impl ReactorOptions {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            ..Self::default()
        }
    }

    pub fn with_memory(mut self, memory: MemoryRegistry) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}

/// Owns the IO runtime and every channel of one consumer or provider
pub struct Reactor {
    runtime: Mutex<Option<Runtime>>,
    handle: RuntimeHandle,
    registry: Arc<Registry>,
    events: Receiver<ReactorEvent>,
    connector: EndpointConnector,
    encoder: Encoder,
    decoder: Decoder,
    options: ReactorOptions,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    stop_servers: watch::Sender<bool>,
}

impl Reactor {
    pub fn new(options: ReactorOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.worker_threads.max(1))
            .thread_name(format!("{}-reactor", options.component_name))
            .enable_all()
            .build()
            .map_err(|e| ReactorError::runtime(format!("failed to start runtime: {e}")))?;
        let (sender, events) = crossbeam_channel::unbounded();
        let (stop_servers, _) = watch::channel(false);
        info!(component = %options.component_name, "Reactor started");
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            registry: Arc::new(Registry::new(sender)),
            events,
            connector: EndpointConnector::new(options.memory.clone()),
            encoder: Encoder::with_max_depth(options.max_nesting_depth),
            decoder: Decoder::with_max_depth(options.max_nesting_depth),
            options,
            supervisors: Mutex::new(Vec::new()),
            stop_servers,
        })
    }

    fn ensure_running(&self) -> Result<()> {
        if self.runtime.lock().is_none() {
            return Err(ReactorError::Shutdown);
        }
        Ok(())
    }

    /// Queue consumed by the dispatcher
    pub fn events(&self) -> &Receiver<ReactorEvent> {
        &self.events
    }

    /// Wait up to `timeout` for the next event
    pub fn next_event(&self, timeout: Duration) -> Option<ReactorEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Start a client channel over `hosts`, tried in order
    ///
    /// Returns at once; the channel reports itself through a `ChannelUp` event.
    pub fn connect(
        &self,
        name: impl Into<String>,
        hosts: Vec<ChannelConfig>,
        reconnect: &ReconnectConfig,
        preferred: PreferredHostConfig,
    ) -> Result<ChannelId> {
        self.ensure_running()?;
        let name = name.into();
        let Some(first) = hosts.first() else {
            return Err(ConfigError::missing(format!("{name}.channels")).into());
        };
        for host in &hosts {
            host.validate()?;
        }
        reconnect.validate()?;
        preferred.validate(hosts.len())?;

        let tuning = hosts
            .get(preferred.host_index)
            .filter(|_| preferred.enabled)
            .unwrap_or(first)
            .tuning
            .clone();
        let id = self.registry.allocate_id();
        let pool = BufferPool::new(
            name.clone(),
            tuning.guaranteed_output_buffers,
            tuning.max_output_buffers,
        );
        let (shared, commands) = ChannelShared::new(
            id,
            name.clone(),
            ChannelRole::Client,
            pool,
            tuning.settings(),
            tuning.backpressure(),
        );
        let shared = Arc::new(shared);
        self.registry.insert(Arc::clone(&shared));

        let supervisor = ClientSupervisor {
            shared,
            plan: ClientPlan {
                hosts,
                policy: reconnect.policy(),
                preferred,
                component_name: self.options.component_name.clone(),
                max_frame_size: self.options.max_frame_size,
            },
            connector: self.connector.clone(),
            events: self.registry.events.clone(),
            decoder: self.decoder,
        };
        info!(channel = %name, id = %id, "Client channel starting");
        let task = self.handle.spawn(supervisor.run(commands));
        self.supervisors.lock().push(task);
        Ok(id)
    }

    /// Bind a server and start accepting; returns the endpoint actually bound
    pub fn listen(&self, config: &ServerConfig) -> Result<Endpoint> {
        self.ensure_running()?;
        config.validate()?;
        if RuntimeHandle::try_current().is_ok() {
            return Err(ReactorError::runtime(
                "listen must be called from outside an async runtime",
            ));
        }
        let endpoint = config.endpoint()?;
        let acceptor = self.handle.block_on(self.connector.bind(&endpoint))?;
        let bound = acceptor.local_endpoint();
        let server = Arc::new(ServerShared::new(
            config,
            bound.clone(),
            self.options.component_name.clone(),
            self.options.max_frame_size,
        ));
        self.registry
            .servers
            .insert(config.name.clone(), Arc::clone(&server));
        self.handle.spawn(server::serve(
            acceptor,
            server,
            Arc::clone(&self.registry),
            self.decoder,
            self.stop_servers.subscribe(),
        ));
        Ok(bound)
    }

    fn channel(&self, channel: ChannelId) -> Result<Arc<ChannelShared>> {
        self.registry
            .get(channel)
            .ok_or(ReactorError::UnknownChannel { channel })
    }

    /// Encode and write `msg`, honouring the channel's direct-write setting
    pub fn submit(&self, channel: ChannelId, msg: &types::Msg) -> Result<()> {
        self.write(channel, msg, false)
    }

    /// Encode and write `msg` on the calling thread regardless of channel settings
    pub fn submit_direct(&self, channel: ChannelId, msg: &types::Msg) -> Result<()> {
        self.write(channel, msg, true)
    }

    fn write(&self, channel: ChannelId, msg: &types::Msg, direct: bool) -> Result<()> {
        self.ensure_running()?;
        let shared = self.channel(channel)?;
        let bytes = self.encoder.encode_msg(msg)?;
        debug!(channel = %shared.name, stream_id = msg.stream_id(), bytes = bytes.len(), "Submitting");
        shared.submit(bytes, direct, &self.handle)
    }

    /// Apply an IOCtl code to every channel and server of this reactor
    pub fn modify_ioctl(&self, code: i32, value: i64) -> Result<()> {
        self.ensure_running()?;
        let ioctl = IoctlCode::try_from(code)?;
        let channels = self.registry.all();
        match ioctl {
            IoctlCode::ServerNumPoolBuffers | IoctlCode::ServerPeakBufReset => {
                if self.registry.servers.is_empty() {
                    return Err(ReactorError::ioctl(code, "no server is listening"));
                }
                let capacity = usize::try_from(value)
                    .map_err(|_| ReactorError::ioctl(code, "value must not be negative"))?;
                for server in self.registry.servers.iter() {
                    if ioctl == IoctlCode::ServerNumPoolBuffers {
                        server.shared_pool.set_capacity(capacity);
                    } else {
                        server.shared_pool.reset_peak();
                    }
                }
            }
            IoctlCode::ReactorChannelPreferredHost => {
                let selected = usize::try_from(value).ok();
                let mut clients = 0;
                for channel in channels.iter().filter(|c| c.role == ChannelRole::Client) {
                    clients += 1;
                    channel.command(Command::FallbackToPreferred(selected));
                }
                if clients == 0 {
                    return Err(ReactorError::ioctl(code, "no client channel to fall back"));
                }
            }
            _ => {
                for server in self.registry.servers.iter() {
                    server.settings.apply(ioctl, value, &server.template)?;
                }
                for channel in &channels {
                    channel.settings.apply(ioctl, value, &channel.pool)?;
                }
            }
        }
        info!(ioctl = %ioctl, value, channels = channels.len(), "IOCtl applied");
        Ok(())
    }

    /// Apply an IOCtl code to one channel
    pub fn modify_channel_ioctl(&self, channel: ChannelId, code: i32, value: i64) -> Result<()> {
        self.ensure_running()?;
        let shared = self.channel(channel)?;
        let ioctl = IoctlCode::try_from(code)?;
        match ioctl {
            IoctlCode::ReactorChannelPreferredHost => {
                shared.command(Command::FallbackToPreferred(usize::try_from(value).ok()));
            }
            _ if ioctl.is_server_code() => {
                return Err(ReactorError::ioctl(code, "applies to a server, not a channel"));
            }
            _ => shared.settings.apply(ioctl, value, &shared.pool)?,
        }
        Ok(())
    }

    /// The stream layer finished its handshake on `channel`
    pub fn set_ready(&self, channel: ChannelId) {
        if let Some(shared) = self.registry.get(channel) {
            if shared.is_connected() {
                shared.set_state(ChannelState::Ready);
            }
        }
    }

    pub fn channel_info(&self, channel: ChannelId) -> Option<ChannelInfo> {
        self.registry.get(channel).map(|shared| shared.info())
    }

    /// Every live channel, oldest first
    pub fn channels(&self) -> Vec<ChannelInfo> {
        let mut infos: Vec<ChannelInfo> = self.registry.all().iter().map(|c| c.info()).collect();
        infos.sort_by_key(|info| info.channel);
        infos
    }

    /// Output buffer pool of `channel`
    pub fn buffer_pool(&self, channel: ChannelId) -> Option<BufferPool> {
        self.registry.get(channel).map(|shared| shared.pool.clone())
    }

    /// Close one channel; a client channel stops reconnecting
    pub fn close_channel(&self, channel: ChannelId) -> Result<()> {
        let shared = self.channel(channel)?;
        if !shared.command(Command::Close) {
            debug!(channel = %shared.name, "Channel task already finished");
        }
        Ok(())
    }

    /// Flush and close every channel, stop the servers and the runtime
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        let _ = self.stop_servers.send(true);
        let channels = self.registry.all();
        for channel in &channels {
            channel.command(Command::Close);
        }
        let supervisors: Vec<JoinHandle<()>> = self.supervisors.lock().drain(..).collect();
        if RuntimeHandle::try_current().is_ok() {
            warn!("Reactor dropped inside an async runtime; channels close without flushing");
            runtime.shutdown_background();
            return;
        }
        let registry = Arc::clone(&self.registry);
        runtime.block_on(async move {
            let closed = async {
                for task in supervisors {
                    let _ = task.await;
                }
                while registry
                    .all()
                    .iter()
                    .any(|c| c.role == ChannelRole::Server && c.is_connected())
                {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            };
            if tokio::time::timeout(CLOSE_GRACE, closed).await.is_err() {
                warn!("Channels did not close within the grace period");
            }
        });
        runtime.shutdown_timeout(Duration::from_millis(200));
        info!(component = %self.options.component_name, "Reactor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
