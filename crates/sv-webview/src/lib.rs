//! WebView host integration: runtime detection, the native message bridge,
//! and the page-side reactions to host messages.

pub mod bridge;
pub mod deeplink;
pub mod environment;
pub mod handler;
pub mod payment;
pub mod redirect;
pub mod signals;

pub use bridge::{
    BridgeError, Delivery, HostInterface, InboundSink, InboundSource, Listener, NativeBridge, RawInbound,
};
pub use deeplink::{DeepLink, is_local_path};
pub use environment::{EnvironmentDetector, EnvironmentInfo, ProbeFn, RuntimeProbe, Source, classify};
pub use handler::{InboundHandler, Navigator};
pub use payment::{PaymentCallback, PaymentOutcome, notify_payment_outcome};
pub use redirect::{PendingPurchase, remember_return_url, take_return_url};
pub use signals::{LocalSignal, SignalBus, SubscriptionId};
