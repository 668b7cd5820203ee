//! libusb-backed enumeration backend
//!
//! Owns the `rusb` context and a dedicated pump thread driving
//! `handle_events`, which is where libusb invokes hotplug callbacks. Each
//! registered watch maps to a libusb callback registration; callbacks forward
//! events into the manager's channel with a blocking send.

use crate::backend::{EnumerationBackend, WatchToken};
use crate::device::{Attachment, DeviceId, DeviceInfo, DeviceSpeed};
use crate::error::{HotplugError, Result};
use crate::events::{EventSender, HotplugEvent};
use crate::filter::MatchCriteria;
use rusb::{
    Context, Device, DeviceDescriptor, DeviceHandle, Hotplug, HotplugBuilder, Registration,
    UsbContext,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Poll interval for the libusb event pump
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Enumeration backend talking to real hardware through libusb.
pub struct UsbBackend {
    context: Context,
    watches: Mutex<HashMap<WatchToken, Registration<Context>>>,
    next_token: AtomicU64,
    shutdown: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl UsbBackend {
    /// Open a USB context and start the event pump thread.
    pub fn new() -> Result<Self> {
        let context = Context::new()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let pump = spawn_event_pump(context.clone(), Arc::clone(&shutdown));
        Ok(Self {
            context,
            watches: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            shutdown,
            pump: Mutex::new(Some(pump)),
        })
    }
}

impl Drop for UsbBackend {
    fn drop(&mut self) {
        // Deregister callbacks before stopping the pump.
        if let Ok(mut watches) = self.watches.lock() {
            watches.clear();
        }
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut pump) = self.pump.lock()
            && let Some(handle) = pump.take()
        {
            let _ = handle.join();
        }
    }
}

impl EnumerationBackend for UsbBackend {
    fn watch(&self, criteria: MatchCriteria, events: EventSender) -> Result<WatchToken> {
        if !rusb::has_hotplug() {
            return Err(HotplugError::Registration(
                "hotplug support is not available on this platform".to_string(),
            ));
        }

        let mut builder = HotplugBuilder::new();
        builder.enumerate(false);
        match criteria {
            MatchCriteria::All => {}
            MatchCriteria::VendorProduct {
                vendor_id,
                product_id,
            } => {
                builder.vendor_id(vendor_id);
                builder.product_id(product_id);
            }
            MatchCriteria::DeviceClass { class } => {
                builder.class(class);
            }
        }

        let callback = WatchCallback { criteria, events };
        let registration = builder
            .register(&self.context, Box::new(callback))
            .map_err(|e| HotplugError::Registration(e.to_string()))?;

        let token = WatchToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.watches.lock().unwrap().insert(token, registration);
        debug!("Registered USB watch for {} as {:?}", criteria, token);
        Ok(token)
    }

    fn unwatch(&self, token: WatchToken) {
        // Dropping the registration deregisters the libusb callback.
        if self.watches.lock().unwrap().remove(&token).is_some() {
            debug!("Released USB watch {:?}", token);
        }
    }

    fn enumerate(&self, criteria: MatchCriteria) -> Result<Vec<Attachment>> {
        let devices = self
            .context
            .devices()
            .map_err(|e| HotplugError::Enumeration(e.to_string()))?;

        let mut matching = Vec::new();
        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(
                        "Skipping device at {:03}.{:03} during enumeration: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };
            if !matches_descriptor(
                &criteria,
                descriptor.vendor_id(),
                descriptor.product_id(),
                descriptor.class_code(),
            ) {
                continue;
            }
            matching.push(read_attachment(&device, &descriptor, true));
        }
        debug!("Enumerated {} devices matching {}", matching.len(), criteria);
        Ok(matching)
    }
}

/// Per-watch libusb callback, invoked on the pump thread.
struct WatchCallback {
    criteria: MatchCriteria,
    events: EventSender,
}

impl Hotplug<Context> for WatchCallback {
    fn device_arrived(&mut self, device: Device<Context>) {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Ignoring arrival with unreadable descriptor: {}", e);
                return;
            }
        };
        // String descriptors need control transfers, which must not run on
        // the event pump thread; only the cached descriptor is read here.
        let attachment = read_attachment(&device, &descriptor, false);
        debug!(
            "USB arrival: {} ({:04x}:{:04x})",
            attachment.id(),
            descriptor.vendor_id(),
            descriptor.product_id()
        );
        if let Err(e) = self.events.send_blocking(HotplugEvent::Arrived {
            criteria: self.criteria,
            attachment,
        }) {
            error!("Failed to forward USB arrival: {}", e);
        }
    }

    fn device_left(&mut self, device: Device<Context>) {
        let id = DeviceId::from_bus_address(device.bus_number(), device.address());
        debug!("USB removal: {}", id);
        if let Err(e) = self.events.send_blocking(HotplugEvent::Left { id }) {
            error!("Failed to forward USB removal: {}", e);
        }
    }
}

fn spawn_event_pump(context: Context, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("usb-hotplug-pump".to_string())
        .spawn(move || {
            debug!("USB event pump started");
            while !shutdown.load(Ordering::Relaxed) {
                match context.handle_events(Some(EVENT_POLL_INTERVAL)) {
                    Ok(()) => {}
                    Err(rusb::Error::Interrupted) => {
                        debug!("USB event handling interrupted, continuing");
                    }
                    Err(e) => {
                        warn!("USB event handling error: {}", e);
                        std::thread::sleep(EVENT_POLL_INTERVAL);
                    }
                }
            }
            debug!("USB event pump stopped");
        })
        .expect("Failed to spawn USB event pump thread")
}

fn matches_descriptor(criteria: &MatchCriteria, vendor_id: u16, product_id: u16, class: u8) -> bool {
    match criteria {
        MatchCriteria::All => true,
        MatchCriteria::VendorProduct {
            vendor_id: v,
            product_id: p,
        } => vendor_id == *v && product_id == *p,
        MatchCriteria::DeviceClass { class: c } => class == *c,
    }
}

/// Build an attachment from a libusb device.
///
/// `read_strings` controls whether string descriptors are fetched; that
/// requires opening the device and is only safe off the pump thread.
fn read_attachment(
    device: &Device<Context>,
    descriptor: &DeviceDescriptor,
    read_strings: bool,
) -> Attachment {
    let id = DeviceId::from_bus_address(device.bus_number(), device.address());

    let (manufacturer, product, serial_number) = if read_strings {
        match device.open() {
            Ok(handle) => read_string_descriptors(&handle, descriptor),
            Err(e) => {
                debug!("Could not open {} for string descriptors: {}", id, e);
                (None, None, None)
            }
        }
    } else {
        (None, None, None)
    };

    let info = DeviceInfo {
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        bus_number: device.bus_number(),
        device_address: device.address(),
        manufacturer,
        product,
        serial_number,
        class: descriptor.class_code(),
        subclass: descriptor.sub_class_code(),
        protocol: descriptor.protocol_code(),
        speed: map_device_speed(device.speed()),
        num_configurations: descriptor.num_configurations(),
    };

    Attachment::new(id, info).with_handle(Arc::new(device.clone()))
}

fn read_string_descriptors(
    handle: &DeviceHandle<Context>,
    descriptor: &DeviceDescriptor,
) -> (Option<String>, Option<String>, Option<String>) {
    let read = |index: Option<u8>| index.and_then(|i| handle.read_string_descriptor_ascii(i).ok());
    (
        read(descriptor.manufacturer_string_index()),
        read(descriptor.product_string_index()),
        read(descriptor.serial_number_string_index()),
    )
}

fn map_device_speed(speed: rusb::Speed) -> DeviceSpeed {
    match speed {
        rusb::Speed::Low => DeviceSpeed::Low,
        rusb::Speed::Full => DeviceSpeed::Full,
        rusb::Speed::High => DeviceSpeed::High,
        rusb::Speed::Super => DeviceSpeed::Super,
        rusb::Speed::SuperPlus => DeviceSpeed::SuperPlus,
        _ => DeviceSpeed::Full,
    }
}
