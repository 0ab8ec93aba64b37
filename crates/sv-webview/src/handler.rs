//! Page-side reactions to inbound host messages.

use crate::deeplink::is_local_path;
use crate::signals::{LocalSignal, SignalBus};
use std::rc::Rc;
use sv_api_types::InboundMessage;
use sv_auth::SessionManager;
use tracing::{debug, info};

/// Full-page navigation (`location.assign` in the browser).
pub trait Navigator {
    fn navigate(&self, path: &str);
}

pub type FallbackHandler = Rc<dyn Fn(&InboundMessage)>;

pub struct InboundHandler {
    session: Rc<SessionManager>,
    signals: Rc<SignalBus>,
    navigator: Rc<dyn Navigator>,
    fallback: Option<FallbackHandler>,
}

impl InboundHandler {
    pub fn new(session: Rc<SessionManager>, signals: Rc<SignalBus>, navigator: Rc<dyn Navigator>) -> Self {
        Self {
            session,
            signals,
            navigator,
            fallback: None,
        }
    }

    /// Receives every tag this handler does not interpret.
    pub fn with_fallback(mut self, fallback: impl Fn(&InboundMessage) + 'static) -> Self {
        self.fallback = Some(Rc::new(fallback));
        self
    }

    pub fn handle(&self, message: InboundMessage) {
        match message {
            InboundMessage::SetToken { token, user } => {
                self.session.set_token(&token, user);
                info!("auth token received from native host");
                self.signals.emit(LocalSignal::AuthTokenUpdated);
            }
            InboundMessage::Logout => {
                self.session.logout();
                self.signals.emit(LocalSignal::LogoutRequested);
            }
            InboundMessage::Navigate { path } => {
                if is_local_path(&path) {
                    self.navigator.navigate(&path);
                } else {
                    debug!(%path, "refusing native navigation outside this origin");
                }
            }
            InboundMessage::Refresh => self.signals.emit(LocalSignal::RefreshRequested),
            other @ InboundMessage::Other { .. } => match &self.fallback {
                Some(fallback) => fallback(&other),
                None => debug!(kind = other.kind(), "unhandled native message"),
            },
        }
    }
}
