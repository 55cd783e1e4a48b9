//! Provider facade
//!
//! One [`OmmProvider`] type plays either provider role:
//! - interactive: binds a server, receives consumer requests through an
//!   [`OmmProviderClient`] and answers each on the handle of its event
//! - non-interactive: connects out, logs in, publishes its directory and
//!   opens item streams by submitting their first refresh under ids the
//!   application chooses

use crate::client::{self, OmmErrorClient, OmmProviderClient};
use crate::closure::Closure;
use crate::dispatch::{self, DispatchOutcome, DispatchTarget, Dispatcher, Pending};
use crate::error::{OmmError, Result};
use crate::event::OmmProviderEvent;
use codec::DictionaryRegistry;
use network::{ChannelId, Endpoint, MemoryRegistry};
use omm_config::{AdminControl, IProviderConfig, NiProviderConfig, OperationModel, ServiceConfig};
use parking_lot::Mutex;
use reactor::{ChannelInfo, Reactor, ReactorEvent, ReactorOptions};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};
use types::rdm::directory::{self, filter_mask, ServiceEntry};
use types::rdm::login::LoginRequest;
use types::{DomainType, Msg, ReqMsg, UpdateMsg};
use watchlist::{
    Effects, Handle, NiPhase, NiProviderSettings, NiProviderWatchlist, ProviderSettings,
    ProviderWatchlist,
};

const READY_POLL: Duration = Duration::from_millis(10);

/// Which side of the publishing relationship a provider plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    Interactive,
    NonInteractive,
}

enum Streams {
    Interactive(ProviderWatchlist),
    NonInteractive(NiProviderWatchlist),
}

#[derive(Clone)]
struct Registration {
    client: Arc<dyn OmmProviderClient>,
    closure: Closure,
}

pub(crate) struct ProviderCore {
    name: String,
    role: ProviderRole,
    reactor: Reactor,
    streams: Mutex<Streams>,
    /// Receives every consumer request of an interactive provider
    client: Option<Arc<dyn OmmProviderClient>>,
    /// Login clients of a non-interactive provider
    registrations: Mutex<HashMap<Handle, Registration>>,
    dispatcher: Dispatcher,
    error_client: Option<Arc<dyn OmmErrorClient>>,
    endpoint: Option<Endpoint>,
    closed: AtomicBool,
}

impl ProviderCore {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(OmmError::shutdown(format!("provider {} is uninitialized", self.name)));
        }
        Ok(())
    }

    /// Write outbound messages and queue deliveries; call with the stream table locked
    fn apply(&self, effects: Effects) -> Result<()> {
        let mut failed = None;
        for outbound in &effects.outbound {
            if let Err(error) = self.reactor.submit(outbound.channel, &outbound.msg) {
                debug!(
                    provider = %self.name,
                    channel = %outbound.channel,
                    stream_id = outbound.msg.stream_id(),
                    %error,
                    "Write failed"
                );
                failed.get_or_insert(error);
            }
        }
        self.dispatcher.enqueue(effects);
        match failed {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    pub(crate) fn submit(&self, msg: Msg, handle: u64) -> Result<()> {
        self.ensure_open()?;
        let mut streams = self.streams.lock();
        let effects = match &mut *streams {
            Streams::Interactive(table) => table.submit(Handle::from_raw(handle), msg)?,
            Streams::NonInteractive(table) => table.submit(handle, msg)?,
        };
        self.apply(effects)
    }

    pub(crate) fn submit_on_stream(&self, handle: Handle, msg: Msg) -> Result<()> {
        if self.role == ProviderRole::NonInteractive {
            return Err(OmmError::invalid_usage(
                "login events have no stream to answer on; submit with an item id",
            ));
        }
        self.submit(msg, handle.raw())
    }

    fn register(&self, request: ReqMsg, client: Arc<dyn OmmProviderClient>, closure: Closure) -> Result<Handle> {
        self.ensure_open()?;
        let mut streams = self.streams.lock();
        let Streams::NonInteractive(table) = &mut *streams else {
            return Err(OmmError::invalid_usage(
                "interactive providers receive requests through their provider client",
            ));
        };
        if request.domain != DomainType::LOGIN {
            return Err(OmmError::unsupported_domain(
                request.domain.value().into(),
                "non-interactive providers only register for login events",
            ));
        }
        let (handle, effects) = table.register_login();
        self.registrations
            .lock()
            .insert(handle, Registration { client, closure });
        self.apply(effects)?;
        Ok(handle)
    }

    fn unregister(&self, handle: Handle) -> Result<()> {
        self.ensure_open()?;
        let _callbacks = self.dispatcher.callback_lock();
        let mut streams = self.streams.lock();
        self.registrations.lock().remove(&handle);
        match &mut *streams {
            Streams::NonInteractive(table) => Ok(table.unregister_login(handle)?),
            Streams::Interactive(_) => Err(crate::error::unknown_handle(handle)),
        }
    }

    fn update_directory(&self, entries: Vec<ServiceEntry>) -> Result<()> {
        self.ensure_open()?;
        let mut streams = self.streams.lock();
        let effects = match &mut *streams {
            Streams::Interactive(table) => table.update_directory(entries)?,
            Streams::NonInteractive(table) => {
                let update = UpdateMsg::new()
                    .domain(DomainType::SOURCE)
                    .filter(filter_mask::WATCHLIST)
                    .payload(directory::encode(&entries, filter_mask::WATCHLIST)?);
                table.submit(0, update.into())?
            }
        };
        self.apply(effects)
    }

    fn rtt_probe(&self, handle: Handle) -> Result<()> {
        self.ensure_open()?;
        let mut streams = self.streams.lock();
        let Streams::Interactive(table) = &mut *streams else {
            return Err(OmmError::invalid_usage("RTT probes are sent by interactive providers"));
        };
        let effects = table.rtt_probe(handle, Instant::now())?;
        self.apply(effects)
    }

    pub(crate) fn channel_info(&self, channel: ChannelId) -> Option<ChannelInfo> {
        self.reactor.channel_info(channel)
    }

    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.dispatcher.stop();
        let _callbacks = self.dispatcher.callback_lock();
        let mut streams = self.streams.lock();
        if let Streams::NonInteractive(table) = &mut *streams {
            for outbound in table.close_all().outbound {
                if let Err(error) = self.reactor.submit(outbound.channel, &outbound.msg) {
                    debug!(channel = %outbound.channel, %error, "Logout not written");
                }
            }
        }
        self.registrations.lock().clear();
        info!(provider = %self.name, "Provider closed");
        true
    }

    /// Wait for the login of a non-interactive provider
    fn await_login(&self, timeout: Duration, pump: bool) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let phase = match &*self.streams.lock() {
                Streams::NonInteractive(table) => table.phase(),
                Streams::Interactive(_) => return Ok(()),
            };
            match phase {
                NiPhase::Ready => return Ok(()),
                NiPhase::LoginDenied => {
                    return Err(OmmError::invalid_usage(format!(
                        "login of provider {} was denied",
                        self.name
                    )))
                }
                NiPhase::Down | NiPhase::LoginPending => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(OmmError::invalid_usage(format!(
                    "provider {} did not log in within {timeout:?}",
                    self.name
                )));
            }
            let step = (deadline - now).min(READY_POLL);
            if pump {
                self.dispatcher.dispatch(self, step);
            } else {
                thread::sleep(step);
            }
        }
    }
}

impl DispatchTarget for ProviderCore {
    fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn on_event(&self, event: ReactorEvent) {
        let now = Instant::now();
        let channel = event.channel();
        let mut streams = self.streams.lock();
        let (effects, ready) = match &mut *streams {
            Streams::Interactive(table) => match event {
                ReactorEvent::ChannelUp { channel, host } => {
                    info!(provider = %self.name, channel = %channel, peer = %host, "Client channel up");
                    (Effects::new(), false)
                }
                ReactorEvent::ChannelDown { channel, reason, .. } => {
                    info!(provider = %self.name, channel = %channel, reason = %reason, "Client channel down");
                    (table.channel_down(channel), false)
                }
                ReactorEvent::Message { channel, msg } => {
                    let login = matches!(&msg, Msg::Request(r) if r.domain == DomainType::LOGIN);
                    (table.on_message(channel, msg, now), login)
                }
            },
            Streams::NonInteractive(table) => {
                let before = table.phase();
                let effects = match event {
                    ReactorEvent::ChannelUp { channel, host } => {
                        info!(provider = %self.name, channel = %channel, host = %host, "Channel up");
                        table.channel_up(channel)
                    }
                    ReactorEvent::ChannelDown { channel, reason, .. } => table.channel_down(channel, &reason),
                    ReactorEvent::Message { channel, msg } => table.on_message(channel, msg),
                };
                let after = table.phase();
                (effects, before != NiPhase::Ready && after == NiPhase::Ready)
            }
        };
        if let Err(error) = self.apply(effects) {
            debug!(channel = %channel, %error, "Reply to a channel event not written");
        }
        if ready {
            self.reactor.set_ready(channel);
        }
    }

    fn deliver(&self, pending: Pending) -> bool {
        let delivery = match pending {
            Pending::Violation(violation) => {
                let error = OmmError::from(violation.error);
                client::report(self.error_client.as_deref(), &error, Some(violation.handle));
                return true;
            }
            Pending::Deliver(delivery) => delivery,
        };
        let registration = match (self.role, &self.client) {
            (ProviderRole::Interactive, Some(client)) => Some(Registration {
                client: Arc::clone(client),
                closure: Closure::none(),
            }),
            _ => self.registrations.lock().get(&delivery.handle).cloned(),
        };
        let Some(registration) = registration else {
            trace!(handle = %delivery.handle, "Delivery without a client dropped");
            return false;
        };
        let event = OmmProviderEvent {
            handle: delivery.handle,
            closure: &registration.closure,
            channel: delivery.channel,
            provider: self,
        };
        client::to_provider(registration.client.as_ref(), delivery.kind, &delivery.msg, &event);
        true
    }
}

enum RoleConfig {
    Interactive(IProviderConfig, Arc<dyn OmmProviderClient>),
    NonInteractive(NiProviderConfig),
}

#[derive(Default)]
struct BuildOptions {
    error_client: Option<Arc<dyn OmmErrorClient>>,
    dictionaries: Option<Arc<DictionaryRegistry>>,
    memory: Option<MemoryRegistry>,
}

/// Builds an [`OmmProvider`] for either role
pub struct OmmProviderBuilder {
    role: RoleConfig,
    options: BuildOptions,
}

impl OmmProviderBuilder {
    pub fn error_client(mut self, client: Arc<dyn OmmErrorClient>) -> Self {
        self.options.error_client = Some(client);
        self
    }

    /// Registry the dictionary files of an interactive provider are loaded into
    pub fn dictionaries(mut self, registry: Arc<DictionaryRegistry>) -> Self {
        self.options.dictionaries = Some(registry);
        self
    }

    pub fn memory(mut self, registry: MemoryRegistry) -> Self {
        self.options.memory = Some(registry);
        self
    }

    pub fn build(self) -> Result<OmmProvider> {
        match self.role {
            RoleConfig::Interactive(config, client) => self.options.interactive(config, client),
            RoleConfig::NonInteractive(config) => self.options.non_interactive(config),
        }
    }
}

impl BuildOptions {
    fn reactor(&self, name: &str, max_nesting_depth: Option<usize>) -> Result<Reactor> {
        let mut options = ReactorOptions::new(name);
        if let Some(depth) = max_nesting_depth {
            options = options.with_max_nesting_depth(depth);
        }
        if let Some(memory) = &self.memory {
            options = options.with_memory(memory.clone());
        }
        Ok(Reactor::new(options)?)
    }

    fn interactive(self, config: IProviderConfig, client: Arc<dyn OmmProviderClient>) -> Result<OmmProvider> {
        config.validate()?;
        let dictionary = match &config.dictionary {
            Some(files) => {
                let registry = self
                    .dictionaries
                    .clone()
                    .unwrap_or_else(|| Arc::new(DictionaryRegistry::new()));
                Some(registry.load_files(&files.field_path, &files.enum_path)?)
            }
            None => None,
        };
        let settings = ProviderSettings {
            services: config.services.iter().map(ServiceConfig::entry).collect(),
            answer_directory: config.directory_admin == AdminControl::ApiControl,
            answer_dictionary: config.dictionary_admin == AdminControl::ApiControl,
            dictionary,
            accept_unknown_services: config.accept_unknown_services,
        };
        let reactor = self.reactor(&config.name, Some(config.max_nesting_depth))?;
        let endpoint = reactor.listen(&config.server)?;
        info!(provider = %config.name, endpoint = %endpoint, "Interactive provider listening");
        let core = ProviderCore {
            name: config.name.clone(),
            role: ProviderRole::Interactive,
            reactor,
            streams: Mutex::new(Streams::Interactive(ProviderWatchlist::new(settings))),
            client: Some(client),
            registrations: Mutex::new(HashMap::new()),
            dispatcher: Dispatcher::new(),
            error_client: self.error_client,
            endpoint: Some(endpoint),
            closed: AtomicBool::new(false),
        };
        OmmProvider::start(core, config.operation_model, config.dispatch_timeout())
    }

    fn non_interactive(self, config: NiProviderConfig) -> Result<OmmProvider> {
        config.validate()?;
        let mut login = LoginRequest::new(config.user_name.clone());
        login.application_id = Some(config.application_id.clone());
        login.position = Some(config.position.clone());
        let settings = NiProviderSettings {
            login,
            services: config.services.iter().map(ServiceConfig::entry).collect(),
            publish_directory: config.directory_admin == AdminControl::ApiControl,
        };
        let table = NiProviderWatchlist::new(settings)?;
        let reactor = self.reactor(&config.name, None)?;
        reactor.connect(
            config.name.clone(),
            config.channels.clone(),
            &config.reconnect,
            config.preferred_host,
        )?;
        let core = ProviderCore {
            name: config.name.clone(),
            role: ProviderRole::NonInteractive,
            reactor,
            streams: Mutex::new(Streams::NonInteractive(table)),
            client: None,
            registrations: Mutex::new(HashMap::new()),
            dispatcher: Dispatcher::new(),
            error_client: self.error_client,
            endpoint: None,
            closed: AtomicBool::new(false),
        };
        let provider = OmmProvider::start(core, config.operation_model, config.dispatch_timeout())?;
        provider
            .core
            .await_login(config.login_timeout(), config.operation_model == OperationModel::UserDispatch)?;
        info!(provider = %config.name, "Non-interactive provider logged in");
        Ok(provider)
    }
}

/// Provider side of the API
pub struct OmmProvider {
    core: Arc<ProviderCore>,
    model: OperationModel,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OmmProvider {
    /// Provider serving consumer requests on a bound port
    pub fn interactive(config: IProviderConfig, client: Arc<dyn OmmProviderClient>) -> OmmProviderBuilder {
        OmmProviderBuilder {
            role: RoleConfig::Interactive(config, client),
            options: BuildOptions::default(),
        }
    }

    /// Provider publishing into an infrastructure host
    pub fn non_interactive(config: NiProviderConfig) -> OmmProviderBuilder {
        OmmProviderBuilder {
            role: RoleConfig::NonInteractive(config),
            options: BuildOptions::default(),
        }
    }

    fn start(core: ProviderCore, model: OperationModel, dispatch_timeout: Duration) -> Result<Self> {
        let provider = Self {
            core: Arc::new(core),
            model,
            worker: Mutex::new(None),
        };
        if model == OperationModel::ApiDispatch {
            let worker = dispatch::spawn(Arc::clone(&provider.core), dispatch_timeout)?;
            *provider.worker.lock() = Some(worker);
        }
        Ok(provider)
    }

    pub fn role(&self) -> ProviderRole {
        self.core.role
    }

    /// Endpoint an interactive provider is bound to
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.core.endpoint.as_ref()
    }

    /// Send `msg` on a stream
    ///
    /// Interactive providers pass the handle of the request event. A
    /// non-interactive provider names items with ids of its own choosing; the
    /// first refresh for an id opens its stream.
    pub fn submit(&self, msg: impl Into<Msg>, handle: u64) -> Result<()> {
        self.core.submit(msg.into(), handle)
    }

    /// Register for login stream events of a non-interactive provider
    pub fn register_client(
        &self,
        request: ReqMsg,
        client: Arc<dyn OmmProviderClient>,
        closure: Closure,
    ) -> Result<Handle> {
        self.core.register(request, client, closure)
    }

    pub fn unregister(&self, handle: Handle) -> Result<()> {
        self.core.unregister(handle)
    }

    /// Change the advertised services
    pub fn update_directory(&self, entries: Vec<ServiceEntry>) -> Result<()> {
        self.core.update_directory(entries)
    }

    /// Measure round-trip latency on the login stream `handle`
    pub fn rtt_probe(&self, handle: Handle) -> Result<()> {
        self.core.rtt_probe(handle)
    }

    pub fn dispatch(&self, timeout: Duration) -> Result<DispatchOutcome> {
        self.core.ensure_open()?;
        if self.model == OperationModel::ApiDispatch {
            return Err(OmmError::invalid_usage(
                "dispatch is driven by the internal thread in ApiDispatch mode",
            ));
        }
        Ok(self.core.dispatcher.dispatch(self.core.as_ref(), timeout))
    }

    /// Apply an IOCtl code to the server and its channels, or to the outbound channel
    pub fn modify_ioctl(&self, code: i32, value: i64) -> Result<()> {
        self.core.ensure_open()?;
        Ok(self.core.reactor.modify_ioctl(code, value)?)
    }

    pub fn channel_information(&self) -> Vec<ChannelInfo> {
        self.core.reactor.channels()
    }

    pub fn uninitialize(&self) {
        if !self.core.close() {
            return;
        }
        dispatch::join(self.worker.lock().take());
        self.core.reactor.shutdown();
    }
}

impl Drop for OmmProvider {
    fn drop(&mut self) {
        self.uninitialize();
    }
}

impl fmt::Debug for OmmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmmProvider")
            .field("name", &self.core.name)
            .field("role", &self.core.role)
            .field("model", &self.model)
            .finish()
    }
}
