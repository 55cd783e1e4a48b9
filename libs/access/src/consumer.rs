//! Consumer facade
//!
//! An [`OmmConsumer`] owns one reactor and one consumer watchlist. Every call
//! runs the watchlist operation and writes its outbound messages under the
//! watchlist lock, so requests leave in call order; deliveries are queued to
//! the dispatcher in the same critical section.

use crate::client::{self, OmmConsumerClient, OmmErrorClient};
use crate::closure::Closure;
use crate::dispatch::{self, DispatchOutcome, DispatchTarget, Dispatcher, Pending};
use crate::error::{OmmError, OmmErrorKind, Result};
use crate::event::OmmConsumerEvent;
use codec::DictionaryRegistry;
use network::{ChannelId, MemoryRegistry};
use omm_config::{ConsumerConfig, DictionarySource, OperationModel, PreferredHostConfig};
use parking_lot::Mutex;
use reactor::{ChannelInfo, Reactor, ReactorEvent, ReactorOptions};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use types::rdm::login::LoginRequest;
use types::{GenericMsg, PostMsg, ReqMsg};
use watchlist::{ConsumerSettings, ConsumerWatchlist, Effects, Handle, ItemState, SessionPhase};

/// Poll step while waiting for the sessions to log in
const READY_POLL: Duration = Duration::from_millis(10);

#[derive(Clone)]
struct Registration {
    client: Arc<dyn OmmConsumerClient>,
    closure: Closure,
    parent: Option<Handle>,
}

pub(crate) struct ConsumerCore {
    name: String,
    reactor: Reactor,
    watchlist: Mutex<ConsumerWatchlist>,
    registrations: Mutex<HashMap<Handle, Registration>>,
    dispatcher: Dispatcher,
    error_client: Option<Arc<dyn OmmErrorClient>>,
    dictionaries: Arc<DictionaryRegistry>,
    channels: Vec<ChannelId>,
    closed: AtomicBool,
}

impl ConsumerCore {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(OmmError::shutdown(format!("consumer {} is uninitialized", self.name)));
        }
        Ok(())
    }

    /// Write outbound messages and queue deliveries; call with the watchlist locked
    fn apply(&self, effects: Effects) -> Result<()> {
        let mut failed = None;
        for outbound in &effects.outbound {
            if let Err(error) = self.reactor.submit(outbound.channel, &outbound.msg) {
                debug!(
                    consumer = %self.name,
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

    fn register(
        &self,
        request: ReqMsg,
        client: Arc<dyn OmmConsumerClient>,
        closure: Closure,
        parent: Option<Handle>,
    ) -> Result<Handle> {
        self.ensure_open()?;
        let mut watchlist = self.watchlist.lock();
        let (handle, effects) = watchlist.register(request, parent, Instant::now())?;
        {
            let registration = Registration {
                client,
                closure,
                parent,
            };
            let mut registrations = self.registrations.lock();
            for member in watchlist.batch_members(handle).unwrap_or_default() {
                registrations.insert(
                    *member,
                    Registration {
                        parent: Some(handle),
                        ..registration.clone()
                    },
                );
            }
            registrations.insert(handle, registration);
        }
        if let Err(error) = self.apply(effects) {
            if error.kind() == OmmErrorKind::MemoryExhaustion {
                if let Ok(rollback) = watchlist.unregister(handle) {
                    let _ = self.apply(rollback);
                }
                self.forget(handle);
                return Err(error);
            }
            debug!(handle = %handle, %error, "Request not written, retried after the request timeout");
        }
        debug!(consumer = %self.name, handle = %handle, "Registered");
        Ok(handle)
    }

    /// Drop the registration of `handle` and of every stream it owns
    fn forget(&self, handle: Handle) {
        self.registrations
            .lock()
            .retain(|h, registration| *h != handle && registration.parent != Some(handle));
    }

    pub(crate) fn reissue(&self, handle: Handle, request: ReqMsg) -> Result<()> {
        self.ensure_open()?;
        let mut watchlist = self.watchlist.lock();
        let effects = watchlist.reissue(handle, request, Instant::now())?;
        self.apply(effects)
    }

    pub(crate) fn submit_generic(&self, handle: Handle, generic: GenericMsg) -> Result<()> {
        self.ensure_open()?;
        let mut watchlist = self.watchlist.lock();
        let effects = watchlist.submit_generic(handle, generic)?;
        self.apply(effects)
    }

    pub(crate) fn submit_post(&self, handle: Handle, post: PostMsg) -> Result<()> {
        self.ensure_open()?;
        let mut watchlist = self.watchlist.lock();
        let effects = watchlist.submit_post(handle, post)?;
        self.apply(effects)
    }

    pub(crate) fn unregister(&self, handle: Handle) -> Result<()> {
        self.ensure_open()?;
        let _callbacks = self.dispatcher.callback_lock();
        let mut watchlist = self.watchlist.lock();
        let result = watchlist.unregister(handle);
        self.forget(handle);
        let effects = result?;
        debug!(consumer = %self.name, handle = %handle, "Unregistered");
        self.apply(effects)
    }

    pub(crate) fn channel_info(&self, channel: ChannelId) -> Option<ChannelInfo> {
        self.reactor.channel_info(channel)
    }

    /// A retired member may have taken its batch parent with it
    fn forget_retired_parent(&self, parent: Option<Handle>) {
        let Some(parent) = parent else { return };
        let retired = !self.watchlist.lock().is_registered(parent);
        if retired {
            self.registrations.lock().remove(&parent);
        }
    }

    /// Close every stream and log out; no callback runs afterwards
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.dispatcher.stop();
        let _callbacks = self.dispatcher.callback_lock();
        let mut watchlist = self.watchlist.lock();
        let effects = watchlist.close_all();
        for outbound in &effects.outbound {
            if let Err(error) = self.reactor.submit(outbound.channel, &outbound.msg) {
                debug!(channel = %outbound.channel, %error, "Close not written");
            }
        }
        self.registrations.lock().clear();
        info!(consumer = %self.name, "Consumer closed");
        true
    }

    /// Wait for every session to log in
    ///
    /// Succeeds with a warning when at least one session is ready at the
    /// deadline; the others keep recovering in the background.
    fn await_ready(&self, timeout: Duration, pump: bool) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let (phases, ready) = {
                let watchlist = self.watchlist.lock();
                let phases: Vec<Option<SessionPhase>> =
                    self.channels.iter().map(|c| watchlist.session_phase(*c)).collect();
                (phases, watchlist.is_ready())
            };
            if ready {
                return Ok(());
            }
            if phases.iter().all(|p| *p == Some(SessionPhase::LoginDenied)) {
                return Err(OmmError::invalid_usage(format!(
                    "login of consumer {} was denied",
                    self.name
                )));
            }
            let now = Instant::now();
            if now >= deadline {
                if phases.contains(&Some(SessionPhase::Ready)) {
                    warn!(consumer = %self.name, ?phases, "Not every session is ready, continuing");
                    return Ok(());
                }
                return Err(OmmError::invalid_usage(format!(
                    "consumer {} did not log in within {timeout:?}",
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

impl DispatchTarget for ConsumerCore {
    fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn on_event(&self, event: ReactorEvent) {
        let now = Instant::now();
        let mut watchlist = self.watchlist.lock();
        let (channel, effects) = match event {
            ReactorEvent::ChannelUp { channel, host } => {
                info!(consumer = %self.name, channel = %channel, host = %host, "Channel up");
                (channel, watchlist.channel_up(channel))
            }
            ReactorEvent::ChannelDown {
                channel,
                reconnecting,
                reason,
            } => {
                warn!(consumer = %self.name, channel = %channel, reconnecting, reason = %reason, "Channel down");
                (channel, watchlist.channel_down(channel, reconnecting, &reason))
            }
            ReactorEvent::Message { channel, msg } => (channel, watchlist.on_message(channel, msg, now)),
        };
        if let Err(error) = self.apply(effects) {
            debug!(channel = %channel, %error, "Reply to a channel event not written");
        }
        if watchlist.session_phase(channel) == Some(SessionPhase::Ready) {
            self.reactor.set_ready(channel);
        }
    }

    fn on_tick(&self, now: Instant) {
        let mut watchlist = self.watchlist.lock();
        let effects = watchlist.tick(now);
        if let Err(error) = self.apply(effects) {
            debug!(%error, "Re-request not written");
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
        let registration = {
            let mut registrations = self.registrations.lock();
            if delivery.retire {
                registrations.remove(&delivery.handle)
            } else {
                registrations.get(&delivery.handle).cloned()
            }
        };
        let Some(registration) = registration else {
            trace!(handle = %delivery.handle, "Delivery for an unregistered handle dropped");
            return false;
        };
        let event = OmmConsumerEvent {
            handle: delivery.handle,
            parent: delivery.parent.or(registration.parent),
            closure: &registration.closure,
            channel: delivery.channel,
            consumer: self,
        };
        client::to_consumer(registration.client.as_ref(), &delivery.msg, &event);
        if delivery.retire {
            self.forget_retired_parent(registration.parent);
        }
        true
    }
}

/// Builds an [`OmmConsumer`] from a validated configuration
pub struct OmmConsumerBuilder {
    config: ConsumerConfig,
    error_client: Option<Arc<dyn OmmErrorClient>>,
    dictionaries: Option<Arc<DictionaryRegistry>>,
    memory: Option<MemoryRegistry>,
}

impl OmmConsumerBuilder {
    /// Receive stream protocol violations instead of having them logged
    pub fn error_client(mut self, client: Arc<dyn OmmErrorClient>) -> Self {
        self.error_client = Some(client);
        self
    }

    /// Share a dictionary registry with other instances
    pub fn dictionaries(mut self, registry: Arc<DictionaryRegistry>) -> Self {
        self.dictionaries = Some(registry);
        self
    }

    /// Endpoint registry resolving `memory://` hosts
    pub fn memory(mut self, registry: MemoryRegistry) -> Self {
        self.memory = Some(registry);
        self
    }

    /// Connect every session and wait until they are logged in
    pub fn build(self) -> Result<OmmConsumer> {
        let config = self.config;
        config.validate()?;
        let sessions = config.resolved_sessions()?;
        let dictionaries = self
            .dictionaries
            .unwrap_or_else(|| Arc::new(DictionaryRegistry::new()));
        if let DictionarySource::Files(files) = &config.dictionary {
            dictionaries.load_files(&files.field_path, &files.enum_path)?;
        }
        let download = matches!(config.dictionary, DictionarySource::Download);
        let settings = ConsumerSettings {
            login: login_request(&config),
            request_timeout: config.request_timeout(),
            download_dictionary: download,
        };
        let mut watchlist = ConsumerWatchlist::new(settings, Arc::clone(&dictionaries))?;

        let mut options =
            ReactorOptions::new(config.name.clone()).with_max_nesting_depth(config.max_nesting_depth);
        if let Some(memory) = self.memory {
            options = options.with_memory(memory);
        }
        let reactor = Reactor::new(options)?;
        let mut channels = Vec::with_capacity(sessions.len());
        for session in sessions {
            let preferred = if session.channels.len() > config.preferred_host.host_index {
                config.preferred_host
            } else {
                PreferredHostConfig::default()
            };
            let channel = reactor.connect(session.name.clone(), session.channels, &config.reconnect, preferred)?;
            watchlist.add_session(channel, session.name);
            channels.push(channel);
        }

        let core = Arc::new(ConsumerCore {
            name: config.name.clone(),
            reactor,
            watchlist: Mutex::new(watchlist),
            registrations: Mutex::new(HashMap::new()),
            dispatcher: Dispatcher::new(),
            error_client: self.error_client,
            dictionaries,
            channels,
            closed: AtomicBool::new(false),
        });
        let consumer = OmmConsumer {
            worker: Mutex::new(None),
            model: config.operation_model,
            dispatch_timeout: config.dispatch_timeout(),
            core,
        };
        if consumer.model == OperationModel::ApiDispatch {
            let worker = dispatch::spawn(Arc::clone(&consumer.core), consumer.dispatch_timeout)?;
            *consumer.worker.lock() = Some(worker);
        }

        let mut timeout = config.login_timeout() + config.directory_timeout();
        if download {
            timeout += config.dictionary_timeout();
        }
        consumer
            .core
            .await_ready(timeout, consumer.model == OperationModel::UserDispatch)?;
        info!(consumer = %config.name, sessions = consumer.core.channels.len(), "Consumer ready");
        Ok(consumer)
    }
}

fn login_request(config: &ConsumerConfig) -> LoginRequest {
    let mut login = LoginRequest::new(config.user_name.clone());
    login.application_id = Some(config.application_id.clone());
    login.application_name = Some(config.application_name.clone());
    login.position = Some(config.position.clone());
    login.password = config.password.clone();
    login.support_rtt = config.support_rtt;
    login
}

/// Consumer side of the API
///
/// Requests are registered with a client whose callbacks receive every
/// message of the stream. Callbacks run on the internal dispatch thread
/// (`OperationModel::ApiDispatch`) or inside [`OmmConsumer::dispatch`]
/// (`OperationModel::UserDispatch`), never two at a time.
pub struct OmmConsumer {
    core: Arc<ConsumerCore>,
    model: OperationModel,
    dispatch_timeout: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OmmConsumer {
    pub fn builder(config: ConsumerConfig) -> OmmConsumerBuilder {
        OmmConsumerBuilder {
            config,
            error_client: None,
            dictionaries: None,
            memory: None,
        }
    }

    /// Open a stream for `request`; the client receives its messages
    pub fn register_client(
        &self,
        request: ReqMsg,
        client: Arc<dyn OmmConsumerClient>,
        closure: Closure,
    ) -> Result<Handle> {
        self.core.register(request, client, closure, None)
    }

    /// Open a sub-stream inside the tunnel stream `parent`
    pub fn register_client_with_parent(
        &self,
        request: ReqMsg,
        client: Arc<dyn OmmConsumerClient>,
        closure: Closure,
        parent: Handle,
    ) -> Result<Handle> {
        self.core.register(request, client, closure, Some(parent))
    }

    /// Change priority, view or pause state of an open stream
    pub fn reissue(&self, handle: Handle, request: ReqMsg) -> Result<()> {
        self.core.reissue(handle, request)
    }

    pub fn submit_generic(&self, handle: Handle, generic: GenericMsg) -> Result<()> {
        self.core.submit_generic(handle, generic)
    }

    /// Contribute data on an item or login stream
    pub fn submit_post(&self, handle: Handle, post: PostMsg) -> Result<()> {
        self.core.submit_post(handle, post)
    }

    /// Close the stream of `handle`
    ///
    /// Safe inside callbacks. Once this returns no callback for `handle`
    /// runs, even for messages already received.
    pub fn unregister(&self, handle: Handle) -> Result<()> {
        self.core.unregister(handle)
    }

    /// Stream state of a registration; a batch is Open once every member is
    pub fn item_state(&self, handle: Handle) -> Option<ItemState> {
        self.core.watchlist.lock().state(handle)
    }

    /// Run callbacks for up to `timeout`; `UserDispatch` only
    pub fn dispatch(&self, timeout: Duration) -> Result<DispatchOutcome> {
        self.core.ensure_open()?;
        if self.model == OperationModel::ApiDispatch {
            return Err(OmmError::invalid_usage(
                "dispatch is driven by the internal thread in ApiDispatch mode",
            ));
        }
        Ok(self.core.dispatcher.dispatch(self.core.as_ref(), timeout))
    }

    /// Apply an IOCtl code to every channel of this consumer
    pub fn modify_ioctl(&self, code: i32, value: i64) -> Result<()> {
        self.core.ensure_open()?;
        Ok(self.core.reactor.modify_ioctl(code, value)?)
    }

    pub fn channel_information(&self) -> Vec<ChannelInfo> {
        self.core.reactor.channels()
    }

    pub fn dictionaries(&self) -> &Arc<DictionaryRegistry> {
        &self.core.dictionaries
    }

    pub fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout
    }

    /// Close every stream, log out and stop the reactor
    ///
    /// Waits for a running callback to return. Later calls fail with
    /// `Shutdown`.
    pub fn uninitialize(&self) {
        if !self.core.close() {
            return;
        }
        dispatch::join(self.worker.lock().take());
        self.core.reactor.shutdown();
    }
}

impl Drop for OmmConsumer {
    fn drop(&mut self) {
        self.uninitialize();
    }
}

impl fmt::Debug for OmmConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmmConsumer")
            .field("name", &self.core.name)
            .field("model", &self.model)
            .field("channels", &self.core.channels)
            .finish()
    }
}
