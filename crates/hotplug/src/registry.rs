//! Registry of currently attached matching devices

use crate::device::{DeviceId, UsbDevice};
use std::collections::HashMap;
use std::sync::Arc;

/// Identifier-keyed table of live device entities.
///
/// The manager is the only mutator; everything else sees snapshots.
#[derive(Default)]
pub(crate) struct DeviceRegistry {
    devices: HashMap<DeviceId, Arc<dyn UsbDevice>>,
}

impl DeviceRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub(crate) fn get(&self, id: &DeviceId) -> Option<Arc<dyn UsbDevice>> {
        self.devices.get(id).cloned()
    }

    pub(crate) fn insert(&mut self, device: Arc<dyn UsbDevice>) -> Option<Arc<dyn UsbDevice>> {
        self.devices.insert(device.id().clone(), device)
    }

    pub(crate) fn remove(&mut self, id: &DeviceId) -> Option<Arc<dyn UsbDevice>> {
        self.devices.remove(id)
    }

    /// All registered devices, ordered by identifier.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn UsbDevice>> {
        let mut devices: Vec<Arc<dyn UsbDevice>> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.id().cmp(b.id()));
        devices
    }

    pub(crate) fn len(&self) -> usize {
        self.devices.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
