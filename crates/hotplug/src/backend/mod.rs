//! Enumeration backends
//!
//! A backend owns the connection to the underlying device subsystem. It
//! answers one-shot enumeration queries and, once a watch is registered,
//! pushes attach/detach events into the channel it was given until the watch
//! is released.

pub mod mock;
pub mod usb;

pub use mock::MockBackend;
pub use usb::UsbBackend;

use crate::device::Attachment;
use crate::error::Result;
use crate::events::EventSender;
use crate::filter::MatchCriteria;

/// Handle identifying a registered watch, used to release it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(pub u64);

/// Source of device topology: one-shot enumeration plus ongoing watches.
pub trait EnumerationBackend: Send + Sync {
    /// Register interest in devices matching `criteria`.
    ///
    /// Until the returned token is passed to [`unwatch`](Self::unwatch),
    /// attach and detach events for matching devices are delivered through
    /// `events`, tagged with this watch's criteria.
    fn watch(&self, criteria: MatchCriteria, events: EventSender) -> Result<WatchToken>;

    /// Release a watch. Unknown tokens are ignored.
    fn unwatch(&self, token: WatchToken);

    /// List the currently attached devices matching `criteria`.
    fn enumerate(&self, criteria: MatchCriteria) -> Result<Vec<Attachment>>;
}
