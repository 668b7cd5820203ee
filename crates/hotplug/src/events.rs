//! Event types flowing between backends, the manager, and subscribers
//!
//! Backends push [`HotplugEvent`]s into a bounded channel; the manager's
//! consumer task turns them into registry mutations and broadcasts
//! [`DeviceEvent`]s to subscribers.

use crate::device::{Attachment, DeviceId, UsbDevice};
use crate::filter::MatchCriteria;
use async_channel::{Receiver, Sender, bounded};
use std::fmt;
use std::sync::Arc;

/// Capacity of the backend-to-manager event channel
pub const CHANNEL_CAPACITY: usize = 256;

/// Raw topology change reported by an enumeration backend
#[derive(Debug, Clone)]
pub enum HotplugEvent {
    /// A device matching a watched criteria was attached
    Arrived {
        /// Criteria of the watch that observed the arrival
        criteria: MatchCriteria,
        attachment: Attachment,
    },
    /// A previously observed device was detached
    Left { id: DeviceId },
}

/// Sender half handed to backends when a watch is registered
pub type EventSender = Sender<HotplugEvent>;
pub(crate) type EventReceiver = Receiver<HotplugEvent>;

pub(crate) fn event_channel() -> (EventSender, EventReceiver) {
    bounded(CHANNEL_CAPACITY)
}

/// Registry change notification delivered to subscribers
#[derive(Clone)]
pub enum DeviceEvent {
    /// A matching device was registered
    Connected(Arc<dyn UsbDevice>),
    /// A registered device was removed
    Disconnected(Arc<dyn UsbDevice>),
}

impl DeviceEvent {
    /// Stable name of the notification kind.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceEvent::Connected(_) => "device-connected",
            DeviceEvent::Disconnected(_) => "device-disconnected",
        }
    }

    /// The device the notification is about.
    pub fn device(&self) -> &Arc<dyn UsbDevice> {
        match self {
            DeviceEvent::Connected(device) | DeviceEvent::Disconnected(device) => device,
        }
    }

    pub fn id(&self) -> &DeviceId {
        self.device().id()
    }
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceInfo, DeviceSpeed, GenericDevice};

    fn sample_device() -> Arc<dyn UsbDevice> {
        let info = DeviceInfo {
            vendor_id: 0x05ac,
            product_id: 0x8290,
            bus_number: 1,
            device_address: 4,
            manufacturer: None,
            product: None,
            serial_number: None,
            class: 0,
            subclass: 0,
            protocol: 0,
            speed: DeviceSpeed::High,
            num_configurations: 1,
        };
        Arc::new(GenericDevice::from_attachment(Attachment::new(
            DeviceId::from_bus_address(1, 4),
            info,
        )))
    }

    #[test]
    fn test_event_names() {
        let device = sample_device();
        assert_eq!(DeviceEvent::Connected(Arc::clone(&device)).name(), "device-connected");
        assert_eq!(DeviceEvent::Disconnected(device).name(), "device-disconnected");
    }

    #[test]
    fn test_event_debug_format() {
        let event = DeviceEvent::Connected(sample_device());
        assert_eq!(format!("{event:?}"), "device-connected(001.004)");
    }

    #[test]
    fn test_channel_is_bounded() {
        let (tx, rx) = event_channel();
        for _ in 0..CHANNEL_CAPACITY {
            tx.try_send(HotplugEvent::Left {
                id: DeviceId::from_bus_address(1, 1),
            })
            .unwrap();
        }
        assert!(tx.try_send(HotplugEvent::Left {
            id: DeviceId::from_bus_address(1, 1),
        })
        .is_err());
        assert_eq!(rx.len(), CHANNEL_CAPACITY);
    }
}
