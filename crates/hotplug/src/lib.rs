//! USB device discovery and hot-plug registry
//!
//! Watches the USB bus for devices matching a set of filters, keeps a
//! registry of the matching devices currently attached, and broadcasts
//! connect/disconnect notifications as the topology changes. Each filter
//! names the entity type that wraps its matches, so heterogeneous device
//! populations come back as the right concrete types.
//!
//! # Example
//!
//! ```
//! use hotplug::{DeviceFilter, GenericDevice, HotplugManager, MockBackend};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hotplug::Result<()> {
//! let backend = Arc::new(MockBackend::new());
//! backend.attach(0x05ac, 0x8290);
//!
//! let manager = HotplugManager::new(backend.clone());
//! manager.start_single(DeviceFilter::match_all::<GenericDevice>())?;
//!
//! // The initial enumeration runs inside `start`.
//! assert_eq!(manager.devices().len(), 1);
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! # Watching real hardware
//!
//! ```no_run
//! use hotplug::{DeviceFilter, GenericDevice, HotplugManager, UsbBackend};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> hotplug::Result<()> {
//! let backend = Arc::new(UsbBackend::new()?);
//! let manager = HotplugManager::new(backend);
//! let mut events = manager.subscribe();
//! manager.start(vec![
//!     DeviceFilter::match_product::<GenericDevice>(0x0042, 0x04f9),
//!     DeviceFilter::match_class::<GenericDevice>(0x03),
//! ])?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}: {}", event.name(), event.id());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod device;
pub mod error;
pub mod events;
pub mod filter;
pub mod manager;
mod registry;

pub use backend::{EnumerationBackend, MockBackend, UsbBackend, WatchToken};
pub use device::{Attachment, DeviceId, DeviceInfo, DeviceSpeed, GenericDevice, UsbDevice};
pub use error::{HotplugError, Result};
pub use events::{CHANNEL_CAPACITY, DeviceEvent, EventSender, HotplugEvent};
pub use filter::{DeviceFilter, MatchCriteria};
pub use manager::HotplugManager;
