//! Window Adapter - a bus Adapter over one or more window endpoints
//!
//! ```text
//! Adapter::send ──► stamp channel id ──► every dispatch WindowProtocol
//!
//! listen WindowProtocol ──► origin check ──► shape check ──► channel check
//!                                                             │
//!                               every registered callback ◄───┘
//! ```
//!
//! Several listen and dispatch wrappers can sit under one adapter, which
//! gives fan-in from many sources and fan-out to many recipients.

use bus::handler::panic_message;
use bus::{Adapter, ChannelId, IdGenerator, Message, MessageCallback};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::config::WindowAdapterOptions;
use crate::error::{Result, WindowError};
use crate::log::Console;
use crate::origin::{derive_peer_origin, normalize_origin, ChannelPolicy, OriginPolicy};
use crate::protocol::{SubscriberId, WindowProtocol};
use crate::window::{BrowsingContext, MessageEvent, WindowLike, ANY_ORIGIN};

type Protocols = SmallVec<[Arc<WindowProtocol>; 2]>;

pub struct WindowAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    id: String,
    listen: Protocols,
    dispatch: Protocols,
    subscriptions: RwLock<SmallVec<[(Arc<WindowProtocol>, SubscriberId); 2]>>,
    callbacks: RwLock<Vec<MessageCallback>>,
    origins: OriginPolicy,
    channels: ChannelPolicy,
    channel_id: Option<ChannelId>,
    console: Console,
    destroyed: AtomicBool,
}

impl WindowAdapter {
    /// Compose an adapter from prepared wrappers
    ///
    /// Inbound traffic is accepted only from `options.origins`.
    pub fn new(
        listen: impl IntoIterator<Item = Arc<WindowProtocol>>,
        dispatch: impl IntoIterator<Item = Arc<WindowProtocol>>,
        options: WindowAdapterOptions,
    ) -> Result<Self> {
        let origins = OriginPolicy::new(options.origin_list())?;
        Ok(Self::build(
            listen.into_iter().collect(),
            dispatch.into_iter().collect(),
            origins,
            &options,
        ))
    }

    /// Adapter between `own` and an explicit `target` window
    pub fn create_by_window<C>(
        own: &Arc<C>,
        target: Arc<dyn WindowLike>,
        options: WindowAdapterOptions,
    ) -> Result<Self>
    where
        C: BrowsingContext + 'static,
    {
        let route = Route::resolve(own.as_ref(), &options)?;
        let own_window: Arc<dyn WindowLike> = own.clone();

        let listen = SmallVec::from_elem(WindowProtocol::listen(own_window), 1);
        let dispatch = SmallVec::from_elem(WindowProtocol::dispatch(target, route.target_origin), 1);

        Ok(Self::build(listen, dispatch, route.origins, &options))
    }

    /// Adapter from a popup or iframe back to whoever embeds it
    ///
    /// The opener wins over the parent.
    pub fn create_child<C>(own: &Arc<C>, options: WindowAdapterOptions) -> Result<Self>
    where
        C: BrowsingContext + 'static,
    {
        let target = own.opener().or_else(|| own.parent()).ok_or(WindowError::NoTarget)?;
        Self::create_by_window(own, target, options)
    }

    fn build(
        listen: Protocols,
        dispatch: Protocols,
        origins: OriginPolicy,
        options: &WindowAdapterOptions,
    ) -> Self {
        let inner = Arc::new(AdapterInner {
            id: IdGenerator::new().next("wa"),
            listen,
            dispatch,
            subscriptions: RwLock::new(SmallVec::new()),
            callbacks: RwLock::new(Vec::new()),
            origins,
            channels: ChannelPolicy::new(options.channel_list()),
            channel_id: options.channel_id.clone(),
            console: Console::new(options.log_level, "WindowAdapter"),
            destroyed: AtomicBool::new(false),
        });

        for protocol in inner.listen.iter() {
            let weak: Weak<AdapterInner> = Arc::downgrade(&inner);
            let id = protocol.on_message(Arc::new(move |event: &MessageEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_event(event);
                }
            }));
            inner.subscriptions.write().push((protocol.clone(), id));
        }

        inner
            .console
            .info(format_args!("Window Adapter was created! {}", inner.id));

        Self { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.inner.channel_id.as_ref()
    }

    pub fn origins(&self) -> &OriginPolicy {
        &self.inner.origins
    }

    /// Target origins the dispatch wrappers post to
    pub fn dispatch_origins(&self) -> Vec<String> {
        self.inner
            .dispatch
            .iter()
            .map(|protocol| protocol.target_origin().to_string())
            .collect()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.callbacks.read().len()
    }

    /// Errors logged by this adapter, printed or not
    pub fn saved_errors(&self) -> Vec<String> {
        self.inner.console.saved_errors()
    }
}

impl Adapter for WindowAdapter {
    fn send(&self, message: Message) {
        if self.is_destroyed() {
            return;
        }

        let message = message.with_channel_id(self.inner.channel_id.clone());
        let data = match message.to_value() {
            Ok(data) => data,
            Err(e) => {
                self.inner
                    .console
                    .error(format_args!("Can't serialize message: {}", e));
                return;
            }
        };

        self.inner.console.info(format_args!("Send message {}", data));
        for protocol in self.inner.dispatch.iter() {
            protocol.send(data.clone());
        }
    }

    fn add_listener(&self, callback: MessageCallback) {
        if self.is_destroyed() {
            return;
        }
        self.inner.console.info("Add Window Adapter Listener");
        self.inner.callbacks.write().push(callback);
    }

    fn destroy(&self) {
        self.inner.destroy();
    }
}

impl Drop for WindowAdapter {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

impl std::fmt::Debug for WindowAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowAdapter")
            .field("id", &self.inner.id)
            .field("channel_id", &self.inner.channel_id)
            .field("listen", &self.inner.listen.len())
            .field("dispatch", &self.inner.dispatch.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl AdapterInner {
    fn on_event(&self, event: &MessageEvent) {
        let Some(message) = self.access_event(event) else {
            return;
        };

        self.console
            .info(format_args!("Receive new message from {}", event.origin));

        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            let message = message.clone();
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(message))) {
                self.console.error(format_args!(
                    "Unhandled exception in listener: {}",
                    panic_message(panic.as_ref())
                ));
            }
        }
    }

    fn access_event(&self, event: &MessageEvent) -> Option<Message> {
        if self.destroyed.load(Ordering::SeqCst) {
            return None;
        }

        if !self.origins.allows(&event.origin) {
            self.console
                .warn(format_args!("Block event by origin \"{}\"", event.origin));
            return None;
        }

        let message = match Message::from_value(event.data.clone()) {
            Ok(message) => message,
            Err(e) => {
                self.console.info(format_args!("Wrong event format: {}", e));
                return None;
            }
        };

        if !self.channels.allows(message.channel_id()) {
            let channel = message
                .channel_id()
                .map(ToString::to_string)
                .unwrap_or_else(|| "undefined".to_string());
            self.console
                .warn(format_args!("Block event by channel id \"{}\"", channel));
            return None;
        }

        Some(message)
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        for (protocol, id) in self.subscriptions.write().drain(..) {
            protocol.off(id);
        }
        for protocol in self.listen.iter().chain(self.dispatch.iter()) {
            protocol.destroy();
        }
        self.callbacks.write().clear();

        self.console.info("Destroy Window Adapter");
    }
}

/// Where a window-built adapter listens from and posts to
struct Route {
    origins: OriginPolicy,
    target_origin: String,
}

impl Route {
    fn resolve<C: BrowsingContext + ?Sized>(own: &C, options: &WindowAdapterOptions) -> Result<Self> {
        let configured = options
            .origin_list()
            .iter()
            .map(|origin| normalize_origin(origin))
            .collect::<Result<Vec<_>>>()?;
        let own_origin = normalize_origin(&own.origin()).ok();
        let peer_origin = if configured.is_empty() {
            derive_peer_origin(own)
        } else {
            None
        };

        let concrete = configured.iter().find(|origin| origin.as_str() != ANY_ORIGIN);
        let target_origin = match (concrete, configured.is_empty()) {
            (Some(origin), _) => origin.clone(),
            (None, false) => ANY_ORIGIN.to_string(),
            // Only an explicit `*` may broadcast
            (None, true) => peer_origin
                .clone()
                .or_else(|| own_origin.clone())
                .ok_or(WindowError::UnknownOrigin)?,
        };

        let allowed = configured
            .into_iter()
            .chain(own_origin)
            .chain(peer_origin);

        Ok(Self {
            origins: OriginPolicy::new(allowed)?,
            target_origin,
        })
    }
}
