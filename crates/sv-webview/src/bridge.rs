//! Page ⇄ native host messaging.
//!
//! Outbound: Android hosts get a JSON string on an injected interface object,
//! iOS hosts get the structured message on a WebKit message handler, plain
//! browsers get nothing. Inbound: window `message` events plus one direct
//! entry point the host can call, both owned by an [`InboundSource`] that is
//! attached while at least one listener is registered.

use crate::deeplink::DeepLink;
use crate::environment::EnvironmentDetector;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use sv_api_types::{InboundMessage, NativeMessage, OutboundMessage};
use sv_storage::{KeyValueStore, session_keys};
use thiserror::Error;
use tracing::{debug, warn};

pub const ANDROID_INTERFACE: &str = "AndroidBridge";
pub const IOS_MESSAGE_HANDLER: &str = "nativeBridge";
pub const DIRECT_ENTRY_POINT: &str = "ShareVestBridge";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("native host object `{0}` is not present")]
    MissingHost(&'static str),
    #[error("could not serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("host call failed: {0}")]
    Host(String),
    #[error("could not attach inbound listener: {0}")]
    Attach(String),
}

/// The host-injected objects messages are posted to.
pub trait HostInterface {
    fn post_android(&self, json: &str) -> Result<(), BridgeError>;
    fn post_ios(&self, message: &Value) -> Result<(), BridgeError>;
}

/// An inbound payload as it arrived: event `data` may be a string or an object.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInbound {
    Text(String),
    Json(Value),
}

pub type InboundSink = Rc<dyn Fn(RawInbound)>;

/// Owner of the window `message` listener and the direct entry point.
pub trait InboundSource {
    fn attach(&self, sink: InboundSink) -> Result<(), BridgeError>;
    fn detach(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Android,
    Ios,
    /// Not running inside a native host.
    Skipped,
    /// Host object missing or the call failed; the message is gone.
    Dropped,
}

type Handler = Rc<dyn Fn(InboundMessage)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
    attached: bool,
}

pub struct NativeBridge {
    detector: Rc<EnvironmentDetector>,
    session: Rc<dyn KeyValueStore>,
    host: Rc<dyn HostInterface>,
    inbound: Rc<dyn InboundSource>,
    registry: Rc<RefCell<Registry>>,
}

impl NativeBridge {
    pub fn new(
        detector: Rc<EnvironmentDetector>,
        session: Rc<dyn KeyValueStore>,
        host: Rc<dyn HostInterface>,
        inbound: Rc<dyn InboundSource>,
    ) -> Self {
        Self {
            detector,
            session,
            host,
            inbound,
            registry: Rc::default(),
        }
    }

    pub fn detector(&self) -> &EnvironmentDetector {
        &self.detector
    }

    pub fn send(&self, message: &OutboundMessage) -> Delivery {
        match message.to_native() {
            Ok(native) => self.send_native(&native),
            Err(err) => {
                warn!("dropping unserializable outbound message: {err}");
                Delivery::Dropped
            }
        }
    }

    /// Send an arbitrary tag, for host features this build has no variant for.
    pub fn send_tagged(&self, kind: &str, payload: Option<Value>) -> Delivery {
        self.send_native(&NativeMessage::new(kind, payload))
    }

    fn send_native(&self, message: &NativeMessage) -> Delivery {
        let env = self.detector.detect();
        let result = if env.is_android_host {
            serde_json::to_string(message)
                .map_err(BridgeError::from)
                .and_then(|json| self.host.post_android(&json))
                .map(|()| Delivery::Android)
        } else if env.is_ios_host {
            serde_json::to_value(message)
                .map_err(BridgeError::from)
                .and_then(|value| self.host.post_ios(&value))
                .map(|()| Delivery::Ios)
        } else {
            return Delivery::Skipped;
        };

        result.unwrap_or_else(|err| {
            debug!(kind = %message.kind, "native message dropped: {err}");
            Delivery::Dropped
        })
    }

    // ── Outbound conveniences ──

    pub fn network_status(&self, online: bool) -> Delivery {
        self.send(&OutboundMessage::NetworkStatus { online })
    }

    pub fn navigation(&self, path: &str) -> Delivery {
        self.send(&OutboundMessage::Navigation { path: path.to_owned() })
    }

    pub fn show_loading(&self, show: bool) -> Delivery {
        self.send(&OutboundMessage::ShowLoading { show })
    }

    pub fn show_alert(&self, title: &str, message: &str) -> Delivery {
        self.send(&OutboundMessage::ShowAlert {
            title: title.to_owned(),
            message: message.to_owned(),
        })
    }

    /// Auth token handed over by the host: the `token` query parameter, else
    /// the one-shot session value (removed on read), else nothing.
    pub fn request_token(&self) -> Option<String> {
        let from_query = self
            .detector
            .probe()
            .and_then(|probe| DeepLink::parse(&probe.query).token);
        if from_query.is_some() {
            return from_query;
        }
        sv_storage::soft_take(self.session.as_ref(), session_keys::NATIVE_TOKEN)
            .filter(|token| !token.trim().is_empty())
    }

    /// Stash a host-provided token for the next `request_token`.
    pub fn stash_token(&self, token: &str) -> bool {
        sv_storage::soft_set(self.session.as_ref(), session_keys::NATIVE_TOKEN, token)
    }

    pub fn listen(&self, callback: impl Fn(InboundMessage) + 'static) -> Listener {
        let (id, needs_attach) = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, Rc::new(callback)));
            let needs_attach = !registry.attached;
            registry.attached = true;
            (id, needs_attach)
        };

        if needs_attach {
            let weak = Rc::downgrade(&self.registry);
            let sink: InboundSink = Rc::new(move |raw| dispatch(&weak, raw));
            if let Err(err) = self.inbound.attach(sink) {
                warn!("native bridge listener unavailable: {err}");
                self.registry.borrow_mut().attached = false;
            }
        }

        Listener {
            id,
            registry: Rc::downgrade(&self.registry),
            inbound: self.inbound.clone(),
            active: Cell::new(true),
        }
    }

    /// Feed a raw inbound payload through the same path the host uses.
    pub fn receive(&self, raw: RawInbound) {
        dispatch(&Rc::downgrade(&self.registry), raw);
    }

    pub fn listener_count(&self) -> usize {
        self.registry.borrow().handlers.len()
    }
}

fn decode(raw: RawInbound) -> Option<InboundMessage> {
    let native = match raw {
        RawInbound::Text(text) | RawInbound::Json(Value::String(text)) => NativeMessage::parse_str(&text),
        RawInbound::Json(value) => NativeMessage::from_value(value),
    };
    match native.and_then(InboundMessage::try_from) {
        Ok(message) => Some(message),
        Err(err) => {
            debug!("ignoring inbound native message: {err}");
            None
        }
    }
}

fn dispatch(registry: &Weak<RefCell<Registry>>, raw: RawInbound) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let Some(message) = decode(raw) else {
        return;
    };
    let handlers: Vec<Handler> = registry
        .borrow()
        .handlers
        .iter()
        .map(|(_, h)| h.clone())
        .collect();
    for handler in handlers {
        handler(message.clone());
    }
}

/// Registration handle. `unsubscribe` is idempotent; the last one detaches
/// the window listener and removes the direct entry point.
pub struct Listener {
    id: u64,
    registry: Weak<RefCell<Registry>>,
    inbound: Rc<dyn InboundSource>,
    active: Cell<bool>,
}

impl Listener {
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let detach = {
            let mut registry = registry.borrow_mut();
            registry.handlers.retain(|(id, _)| *id != self.id);
            let detach = registry.handlers.is_empty() && registry.attached;
            if detach {
                registry.attached = false;
            }
            detach
        };
        if detach {
            self.inbound.detach();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::environment::RuntimeProbe;
    use sv_storage::InMemoryStore;

    #[derive(Default)]
    pub struct RecordingHost {
        pub android: RefCell<Vec<String>>,
        pub ios: RefCell<Vec<Value>>,
        pub missing: bool,
    }

    impl HostInterface for RecordingHost {
        fn post_android(&self, json: &str) -> Result<(), BridgeError> {
            if self.missing {
                return Err(BridgeError::MissingHost(ANDROID_INTERFACE));
            }
            self.android.borrow_mut().push(json.to_owned());
            Ok(())
        }

        fn post_ios(&self, message: &Value) -> Result<(), BridgeError> {
            if self.missing {
                return Err(BridgeError::MissingHost(IOS_MESSAGE_HANDLER));
            }
            self.ios.borrow_mut().push(message.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeInbound {
        pub sink: RefCell<Option<InboundSink>>,
        pub attaches: Cell<u32>,
        pub detaches: Cell<u32>,
    }

    impl FakeInbound {
        pub fn push(&self, raw: RawInbound) {
            let sink = self.sink.borrow().clone();
            if let Some(sink) = sink {
                sink(raw);
            }
        }
    }

    impl InboundSource for FakeInbound {
        fn attach(&self, sink: InboundSink) -> Result<(), BridgeError> {
            self.attaches.set(self.attaches.get() + 1);
            *self.sink.borrow_mut() = Some(sink);
            Ok(())
        }

        fn detach(&self) {
            self.detaches.set(self.detaches.get() + 1);
            self.sink.borrow_mut().take();
        }
    }

    pub struct Rig {
        pub session: Rc<InMemoryStore>,
        pub host: Rc<RecordingHost>,
        pub inbound: Rc<FakeInbound>,
        pub bridge: NativeBridge,
    }

    pub fn rig(user_agent: &str, query: &str) -> Rig {
        rig_with_host(user_agent, query, RecordingHost::default())
    }

    pub fn rig_with_host(user_agent: &str, query: &str, host: RecordingHost) -> Rig {
        let session = Rc::new(InMemoryStore::new());
        let probe = RuntimeProbe {
            user_agent: user_agent.to_owned(),
            query: query.to_owned(),
        };
        let detector = Rc::new(EnvironmentDetector::new(
            session.clone(),
            Rc::new(move || Some(probe.clone())),
        ));
        let host = Rc::new(host);
        let inbound = Rc::new(FakeInbound::default());
        let bridge = NativeBridge::new(detector, session.clone(), host.clone(), inbound.clone());
        Rig {
            session,
            host,
            inbound,
            bridge,
        }
    }

    pub const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/120.0 Mobile Safari/537.36";
    pub const IOS_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";
    pub const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
}
