//! Hotplug manager: watches, registry, and notification fan-out
//!
//! The manager ties a backend to the device registry. `start` configures the
//! active filter set, seeds the registry from an initial enumeration, and
//! from then on a consumer task applies backend events to the registry,
//! broadcasting a notification for every accepted change.
//!
//! All registry mutations happen under one lock, and notifications are sent
//! while it is held, so subscribers observe changes in the order they were
//! applied and a received notification is never ahead of the registry.

use crate::backend::{EnumerationBackend, WatchToken};
use crate::device::{Attachment, DeviceId, UsbDevice};
use crate::error::{HotplugError, Result};
use crate::events::{self, DeviceEvent, EventReceiver, EventSender, HotplugEvent};
use crate::filter::{DeviceFilter, MatchCriteria};
use crate::registry::DeviceRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the notification broadcast channel
const NOTIFICATION_CAPACITY: usize = 64;

/// Tracks matching USB devices and notifies subscribers of changes.
///
/// Create one with [`HotplugManager::new`] from within a Tokio runtime (the
/// event consumer runs as a spawned task), then call [`start`] with the
/// filters to watch.
///
/// [`start`]: HotplugManager::start
pub struct HotplugManager {
    backend: Arc<dyn EnumerationBackend>,
    state: Mutex<ManagerState>,
    notifications: broadcast::Sender<DeviceEvent>,
    event_tx: EventSender,
}

struct ManagerState {
    registry: DeviceRegistry,
    watches: HashMap<MatchCriteria, ActiveWatch>,
}

struct ActiveWatch {
    filter: DeviceFilter,
    token: WatchToken,
}

impl HotplugManager {
    /// Create a manager on the given backend and spawn its event consumer.
    ///
    /// The consumer holds only a weak reference, so dropping every `Arc`
    /// returned from here shuts the task down.
    pub fn new(backend: Arc<dyn EnumerationBackend>) -> Arc<Self> {
        let (event_tx, event_rx) = events::event_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let manager = Arc::new(Self {
            backend,
            state: Mutex::new(ManagerState {
                registry: DeviceRegistry::new(),
                watches: HashMap::new(),
            }),
            notifications,
            event_tx,
        });
        tokio::spawn(consume_events(Arc::downgrade(&manager), event_rx));
        manager
    }

    /// Replace the active filter set and seed the registry.
    ///
    /// Watches are registered for each new criteria and every filter's
    /// current matches are folded into the registry, with a connect
    /// notification per newly registered device. Filters from a previous
    /// `start` that are absent from `filters` are deregistered; their devices
    /// stay registered until the backend reports a removal.
    ///
    /// On error the previous configuration remains active: watches registered
    /// by the failed call are released and the registry keeps its contents.
    /// Calling `start` again with an identical filter set is a no-op apart
    /// from re-running the enumeration, which cannot duplicate devices.
    pub fn start(&self, filters: Vec<DeviceFilter>) -> Result<()> {
        if filters.is_empty() {
            return Err(HotplugError::EmptyFilterSet);
        }
        if self.event_tx.is_closed() {
            return Err(HotplugError::ShutDown);
        }
        let filters = dedupe_filters(filters);

        // Register watches for criteria not yet active.
        let active: Vec<MatchCriteria> = {
            let state = self.state.lock().unwrap();
            state.watches.keys().copied().collect()
        };
        let mut registered: Vec<(DeviceFilter, WatchToken)> = Vec::new();
        for filter in &filters {
            if active.contains(&filter.criteria()) {
                continue;
            }
            match self.backend.watch(filter.criteria(), self.event_tx.clone()) {
                Ok(token) => registered.push((filter.clone(), token)),
                Err(e) => {
                    self.release_watches(registered.into_iter().map(|(_, token)| token));
                    return Err(e);
                }
            }
        }

        // Install the union of old and new watches so the consumer accepts
        // arrivals for the new criteria while the initial enumeration runs.
        let installed: Vec<MatchCriteria> =
            registered.iter().map(|(f, _)| f.criteria()).collect();
        let displaced: Vec<WatchToken> = {
            let mut state = self.state.lock().unwrap();
            let mut displaced = Vec::new();
            for (filter, token) in registered {
                let criteria = filter.criteria();
                if let Some(previous) = state.watches.insert(criteria, ActiveWatch { filter, token })
                {
                    // A concurrent start raced us on the same criteria.
                    displaced.push(previous.token);
                }
            }
            displaced
        };
        self.release_watches(displaced);

        // Enumerate outside the lock; arrivals racing through the event
        // channel are absorbed later by the identifier guard.
        let mut enumerated: Vec<(DeviceFilter, Vec<Attachment>)> = Vec::new();
        for filter in &filters {
            match self.backend.enumerate(filter.criteria()) {
                Ok(attachments) => enumerated.push((filter.clone(), attachments)),
                Err(e) => {
                    // Roll back this call's registrations; the previous
                    // configuration stays active.
                    let added: Vec<WatchToken> = {
                        let mut state = self.state.lock().unwrap();
                        installed
                            .iter()
                            .filter_map(|criteria| state.watches.remove(criteria))
                            .map(|watch| watch.token)
                            .collect()
                    };
                    self.release_watches(added);
                    return Err(e);
                }
            }
        }

        // Commit: prune dropped filters, refresh kept ones, seed the registry.
        let pruned: Vec<WatchToken> = {
            let mut state = self.state.lock().unwrap();

            let keep: Vec<MatchCriteria> = filters.iter().map(|f| f.criteria()).collect();
            let dropped: Vec<MatchCriteria> = state
                .watches
                .keys()
                .filter(|criteria| !keep.contains(criteria))
                .copied()
                .collect();
            let mut pruned = Vec::new();
            for criteria in dropped {
                if let Some(watch) = state.watches.remove(&criteria) {
                    debug!("Deregistered filter for {}", criteria);
                    pruned.push(watch.token);
                }
            }

            // Criteria that stayed active pick up the new filter's entity type.
            for filter in &filters {
                if let Some(watch) = state.watches.get_mut(&filter.criteria()) {
                    watch.filter = filter.clone();
                }
            }

            let mut seeded = 0usize;
            for (filter, attachments) in enumerated {
                for attachment in attachments {
                    if state.registry.contains(attachment.id()) {
                        debug!("Device {} already registered, skipping", attachment.id());
                        continue;
                    }
                    let device = filter.build(attachment);
                    debug!(
                        "Device connected: {} as {}",
                        device.id(),
                        filter.entity_type()
                    );
                    state.registry.insert(Arc::clone(&device));
                    let _ = self.notifications.send(DeviceEvent::Connected(device));
                    seeded += 1;
                }
            }

            info!(
                "Watching {} filter(s), {} device(s) present ({} newly registered)",
                state.watches.len(),
                state.registry.len(),
                seeded
            );
            pruned
        };
        self.release_watches(pruned);

        Ok(())
    }

    /// Convenience wrapper for starting with a single filter.
    pub fn start_single(&self, filter: DeviceFilter) -> Result<()> {
        self.start(vec![filter])
    }

    /// Snapshot of the currently registered devices, ordered by identifier.
    pub fn devices(&self) -> Vec<Arc<dyn UsbDevice>> {
        self.state.lock().unwrap().registry.snapshot()
    }

    /// Look up a registered device by identifier.
    pub fn device(&self, id: &DeviceId) -> Option<Arc<dyn UsbDevice>> {
        self.state.lock().unwrap().registry.get(id)
    }

    /// Number of currently registered devices.
    pub fn device_count(&self) -> usize {
        self.state.lock().unwrap().registry.len()
    }

    /// Subscribe to connect/disconnect notifications.
    ///
    /// Only changes applied after this call are delivered. Slow subscribers
    /// may observe `Lagged` rather than blocking the manager.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.notifications.subscribe()
    }

    /// Release all watches and stop processing events.
    ///
    /// The registry keeps its final contents and stays readable; `start`
    /// afterwards fails with [`HotplugError::ShutDown`].
    pub fn shutdown(&self) {
        let tokens: Vec<WatchToken> = {
            let mut state = self.state.lock().unwrap();
            state.watches.drain().map(|(_, watch)| watch.token).collect()
        };
        self.release_watches(tokens);
        self.event_tx.close();
        info!("Hotplug manager shut down");
    }

    fn release_watches<I: IntoIterator<Item = WatchToken>>(&self, tokens: I) {
        for token in tokens {
            self.backend.unwatch(token);
        }
    }

    fn apply_event(&self, event: HotplugEvent) {
        match event {
            HotplugEvent::Arrived {
                criteria,
                attachment,
            } => self.handle_arrived(criteria, attachment),
            HotplugEvent::Left { id } => self.handle_left(&id),
        }
    }

    fn handle_arrived(&self, criteria: MatchCriteria, attachment: Attachment) {
        let mut state = self.state.lock().unwrap();
        let filter = match state.watches.get(&criteria) {
            Some(watch) => watch.filter.clone(),
            None => {
                debug!(
                    "Dropping arrival of {} for inactive filter {}",
                    attachment.id(),
                    criteria
                );
                return;
            }
        };
        if state.registry.contains(attachment.id()) {
            debug!("Duplicate arrival of {}, ignoring", attachment.id());
            return;
        }
        let device = filter.build(attachment);
        info!(
            "Device connected: {} as {}",
            device.id(),
            filter.entity_type()
        );
        state.registry.insert(Arc::clone(&device));
        let _ = self.notifications.send(DeviceEvent::Connected(device));
    }

    fn handle_left(&self, id: &DeviceId) {
        let mut state = self.state.lock().unwrap();
        match state.registry.remove(id) {
            Some(device) => {
                info!("Device disconnected: {}", id);
                let _ = self.notifications.send(DeviceEvent::Disconnected(device));
            }
            None => {
                debug!("Removal of unknown device {}, ignoring", id);
            }
        }
    }
}

impl Drop for HotplugManager {
    fn drop(&mut self) {
        self.event_tx.close();
        if let Ok(mut state) = self.state.lock() {
            for (_, watch) in state.watches.drain() {
                self.backend.unwatch(watch.token);
            }
        }
    }
}

/// Applies backend events until the channel closes or the manager is gone.
async fn consume_events(manager: Weak<HotplugManager>, events: EventReceiver) {
    while let Ok(event) = events.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.apply_event(event);
    }
    debug!("Hotplug event consumer stopped");
}

/// Later filters win when a call repeats the same criteria.
fn dedupe_filters(filters: Vec<DeviceFilter>) -> Vec<DeviceFilter> {
    let mut unique: Vec<DeviceFilter> = Vec::with_capacity(filters.len());
    for filter in filters {
        if let Some(existing) = unique
            .iter_mut()
            .find(|f| f.criteria() == filter.criteria())
        {
            *existing = filter;
        } else {
            unique.push(filter);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::GenericDevice;

    #[test]
    fn test_dedupe_keeps_last_filter_per_criteria() {
        let filters = vec![
            DeviceFilter::match_all::<GenericDevice>(),
            DeviceFilter::match_product::<GenericDevice>(0x8290, 0x05ac),
            DeviceFilter::match_all::<GenericDevice>(),
        ];
        let unique = dedupe_filters(filters);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].criteria(), MatchCriteria::All);
        assert_eq!(
            unique[1].criteria(),
            MatchCriteria::VendorProduct {
                vendor_id: 0x05ac,
                product_id: 0x8290
            }
        );
    }
}
