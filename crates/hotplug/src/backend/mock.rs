//! In-process backend for tests and examples
//!
//! Simulates a USB bus: attaching and detaching devices produces the same
//! event flow a real backend would, and failures can be injected to exercise
//! error paths. No hardware access is involved.

use crate::backend::{EnumerationBackend, WatchToken};
use crate::device::{Attachment, DeviceId, DeviceInfo, DeviceSpeed};
use crate::error::{HotplugError, Result};
use crate::events::{EventSender, HotplugEvent};
use crate::filter::MatchCriteria;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Bus number reported for all simulated devices
const MOCK_BUS: u8 = 1;

/// Simulated enumeration backend.
///
/// Devices attached before a manager starts show up in its initial
/// enumeration; devices attached afterwards flow through the registered
/// watches like real hot-plug events.
pub struct MockBackend {
    state: Mutex<MockState>,
}

struct MockState {
    watches: HashMap<WatchToken, MockWatch>,
    attached: Vec<Attachment>,
    next_token: u64,
    next_address: u8,
    fail_watch: Option<String>,
    fail_enumerate: Option<String>,
}

struct MockWatch {
    criteria: MatchCriteria,
    events: EventSender,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                watches: HashMap::new(),
                attached: Vec::new(),
                next_token: 1,
                next_address: 1,
                fail_watch: None,
                fail_enumerate: None,
            }),
        }
    }

    /// Attach a simulated device, notifying any matching watches.
    ///
    /// Addresses are assigned sequentially and never reused, mirroring how a
    /// real bus treats a replugged device as a new one.
    pub fn attach(&self, vendor_id: u16, product_id: u16) -> DeviceId {
        let mut state = self.state.lock().unwrap();
        let address = state.next_address;
        state.next_address += 1;
        let info = DeviceInfo {
            vendor_id,
            product_id,
            bus_number: MOCK_BUS,
            device_address: address,
            manufacturer: Some("Mock Manufacturer".to_string()),
            product: Some(format!("Mock Device {address:03}")),
            serial_number: Some(format!("MOCK{address:06}")),
            class: 0,
            subclass: 0,
            protocol: 0,
            speed: DeviceSpeed::High,
            num_configurations: 1,
        };
        state.insert_attachment(info)
    }

    /// Attach a simulated device with a caller-supplied descriptor.
    ///
    /// The identifier is derived from the descriptor's bus number and
    /// address, so callers must keep those unique across live devices.
    pub fn attach_with_info(&self, info: DeviceInfo) -> DeviceId {
        self.state.lock().unwrap().insert_attachment(info)
    }

    /// Detach a simulated device, notifying any matching watches.
    ///
    /// Returns `false` if no device with that identifier is attached.
    pub fn detach(&self, id: &DeviceId) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.attached.iter().position(|a| a.id() == id) else {
            return false;
        };
        let attachment = state.attached.remove(index);
        state.deliver_removal(attachment.info(), attachment.id());
        true
    }

    /// Inject a raw arrival event without changing the attached set.
    ///
    /// The event is delivered through one registered watch's channel and
    /// carries the given criteria tag verbatim; with no active watches it is
    /// dropped.
    pub fn emit_arrival(&self, criteria: MatchCriteria, attachment: Attachment) {
        let state = self.state.lock().unwrap();
        if let Some(watch) = state.watches.values().next() {
            let _ = watch
                .events
                .try_send(HotplugEvent::Arrived {
                    criteria,
                    attachment,
                });
        }
    }

    /// Inject a raw removal event without changing the attached set.
    pub fn emit_removal(&self, id: DeviceId) {
        let state = self.state.lock().unwrap();
        if let Some(watch) = state.watches.values().next() {
            let _ = watch.events.try_send(HotplugEvent::Left { id });
        }
    }

    /// Make the next `watch` call fail with the given message.
    pub fn fail_next_watch(&self, message: &str) {
        self.state.lock().unwrap().fail_watch = Some(message.to_string());
    }

    /// Make the next `enumerate` call fail with the given message.
    pub fn fail_next_enumerate(&self, message: &str) {
        self.state.lock().unwrap().fail_enumerate = Some(message.to_string());
    }

    pub fn watch_count(&self) -> usize {
        self.state.lock().unwrap().watches.len()
    }

    pub fn has_watch(&self, criteria: &MatchCriteria) -> bool {
        self.state
            .lock()
            .unwrap()
            .watches
            .values()
            .any(|w| w.criteria == *criteria)
    }

    pub fn attached_count(&self) -> usize {
        self.state.lock().unwrap().attached.len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn insert_attachment(&mut self, info: DeviceInfo) -> DeviceId {
        let id = DeviceId::from_bus_address(info.bus_number, info.device_address);
        let attachment = Attachment::new(id.clone(), info);
        self.deliver_arrival(&attachment);
        self.attached.push(attachment);
        id
    }

    fn deliver_arrival(&self, attachment: &Attachment) {
        for watch in self.watches.values() {
            if watch.criteria.matches(attachment.info()) {
                let event = HotplugEvent::Arrived {
                    criteria: watch.criteria,
                    attachment: attachment.clone(),
                };
                if let Err(e) = watch.events.try_send(event) {
                    debug!("Mock backend dropping arrival event: {}", e);
                }
            }
        }
    }

    fn deliver_removal(&self, info: &DeviceInfo, id: &DeviceId) {
        for watch in self.watches.values() {
            if watch.criteria.matches(info) {
                if let Err(e) = watch.events.try_send(HotplugEvent::Left { id: id.clone() }) {
                    debug!("Mock backend dropping removal event: {}", e);
                }
            }
        }
    }
}

impl EnumerationBackend for MockBackend {
    fn watch(&self, criteria: MatchCriteria, events: EventSender) -> Result<WatchToken> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_watch.take() {
            return Err(HotplugError::Registration(message));
        }
        let token = WatchToken(state.next_token);
        state.next_token += 1;
        state.watches.insert(token, MockWatch { criteria, events });
        debug!("Mock backend watching {} as {:?}", criteria, token);
        Ok(token)
    }

    fn unwatch(&self, token: WatchToken) {
        self.state.lock().unwrap().watches.remove(&token);
    }

    fn enumerate(&self, criteria: MatchCriteria) -> Result<Vec<Attachment>> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_enumerate.take() {
            return Err(HotplugError::Enumeration(message));
        }
        Ok(state
            .attached
            .iter()
            .filter(|a| criteria.matches(a.info()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;

    #[test]
    fn test_attach_delivers_to_matching_watches_only() {
        let backend = MockBackend::new();
        let (pair_tx, pair_rx) = event_channel();
        let (class_tx, class_rx) = event_channel();

        let pair = MatchCriteria::VendorProduct {
            vendor_id: 0x05ac,
            product_id: 0x8290,
        };
        backend.watch(pair, pair_tx).unwrap();
        backend
            .watch(MatchCriteria::DeviceClass { class: 0x03 }, class_tx)
            .unwrap();

        let id = backend.attach(0x05ac, 0x8290);

        match pair_rx.try_recv().unwrap() {
            HotplugEvent::Arrived {
                criteria,
                attachment,
            } => {
                assert_eq!(criteria, pair);
                assert_eq!(attachment.id(), &id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(class_rx.try_recv().is_err());
    }

    #[test]
    fn test_detach_notifies_matching_watches() {
        let backend = MockBackend::new();
        let (tx, rx) = event_channel();
        backend.watch(MatchCriteria::All, tx).unwrap();

        let id = backend.attach(0x05ac, 0x8290);
        rx.try_recv().unwrap();

        assert!(backend.detach(&id));
        match rx.try_recv().unwrap() {
            HotplugEvent::Left { id: left } => assert_eq!(left, id),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(backend.attached_count(), 0);
        assert!(!backend.detach(&id));
    }

    #[test]
    fn test_enumerate_filters_by_criteria() {
        let backend = MockBackend::new();
        backend.attach(0x05ac, 0x8290);
        backend.attach(0x046d, 0xc52b);

        let all = backend.enumerate(MatchCriteria::All).unwrap();
        assert_eq!(all.len(), 2);

        let pair = backend
            .enumerate(MatchCriteria::VendorProduct {
                vendor_id: 0x046d,
                product_id: 0xc52b,
            })
            .unwrap();
        assert_eq!(pair.len(), 1);
        assert_eq!(pair[0].info().vendor_id, 0x046d);
    }

    #[test]
    fn test_failure_injection_is_one_shot() {
        let backend = MockBackend::new();
        let (tx, _rx) = event_channel();

        backend.fail_next_watch("injected");
        assert!(backend.watch(MatchCriteria::All, tx.clone()).is_err());
        assert!(backend.watch(MatchCriteria::All, tx).is_ok());

        backend.fail_next_enumerate("injected");
        assert!(backend.enumerate(MatchCriteria::All).is_err());
        assert!(backend.enumerate(MatchCriteria::All).is_ok());
    }

    #[test]
    fn test_unwatch_stops_delivery() {
        let backend = MockBackend::new();
        let (tx, rx) = event_channel();
        let token = backend.watch(MatchCriteria::All, tx).unwrap();
        assert_eq!(backend.watch_count(), 1);

        backend.unwatch(token);
        assert_eq!(backend.watch_count(), 0);

        backend.attach(0x05ac, 0x8290);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_requires_active_watch() {
        let backend = MockBackend::new();
        // No watches registered; injected events are dropped.
        backend.emit_removal(DeviceId::from_bus_address(1, 1));

        let (tx, rx) = event_channel();
        backend.watch(MatchCriteria::DeviceClass { class: 0x08 }, tx).unwrap();
        backend.emit_removal(DeviceId::from_bus_address(1, 1));
        assert!(matches!(rx.try_recv().unwrap(), HotplugEvent::Left { .. }));
    }
}
