//! Device identity, descriptors, and the device-entity trait
//!
//! Every matching device tracked by the manager is wrapped in a caller-chosen
//! entity type implementing [`UsbDevice`]. The wrapper is built from an
//! [`Attachment`], which bundles the stable identifier, the descriptor
//! snapshot, and an optional backend handle to the underlying device.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Stable identifier for an attached device, unique while it stays plugged in.
///
/// The USB backend derives it from the bus number and device address, which
/// the bus reassigns on replug; a replugged device is a new identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for a device at the given bus position, e.g. `003.007`.
    pub fn from_bus_address(bus_number: u8, device_address: u8) -> Self {
        Self(format!("{bus_number:03}.{device_address:03}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// USB device speed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceSpeed {
    /// Low speed (1.5 Mbps)
    Low,
    /// Full speed (12 Mbps)
    Full,
    /// High speed (480 Mbps)
    High,
    /// Super speed (5 Gbps)
    Super,
    /// Super speed plus (10 Gbps)
    SuperPlus,
}

/// Descriptor snapshot taken when a device was discovered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Vendor ID
    pub vendor_id: u16,
    /// Product ID
    pub product_id: u16,
    /// Bus number the device is attached to
    pub bus_number: u8,
    /// Address on the bus
    pub device_address: u8,
    /// Manufacturer string (if available)
    pub manufacturer: Option<String>,
    /// Product string (if available)
    pub product: Option<String>,
    /// Serial number (if available)
    pub serial_number: Option<String>,
    /// Device class code
    pub class: u8,
    /// Device subclass code
    pub subclass: u8,
    /// Device protocol
    pub protocol: u8,
    /// Device speed
    pub speed: DeviceSpeed,
    /// Number of configurations
    pub num_configurations: u8,
}

/// Everything known about a device at the moment it appeared.
///
/// The optional handle is an opaque reference to the backend's own device
/// object (the USB backend stores the `rusb` device); entity types that need
/// backend-specific access can downcast it with [`Attachment::handle`].
#[derive(Clone)]
pub struct Attachment {
    id: DeviceId,
    info: DeviceInfo,
    handle: Option<Arc<dyn Any + Send + Sync>>,
}

impl Attachment {
    pub fn new(id: DeviceId, info: DeviceInfo) -> Self {
        Self {
            id,
            info,
            handle: None,
        }
    }

    /// Attach a backend handle to this attachment.
    pub fn with_handle(mut self, handle: Arc<dyn Any + Send + Sync>) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Downcast the backend handle, if one is present and of type `T`.
    pub fn handle<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.handle
            .as_ref()
            .and_then(|handle| Arc::clone(handle).downcast::<T>().ok())
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("id", &self.id)
            .field("info", &self.info)
            .field("handle", &self.handle.as_ref().map(|_| "..."))
            .finish()
    }
}

/// A registered device entity.
///
/// Implementors wrap an [`Attachment`] and expose whatever device-specific
/// behavior they need; the manager instantiates them through the filter that
/// matched the device. The `Any` supertrait allows callers to recover the
/// concrete type from the registry's `Arc<dyn UsbDevice>` handles.
pub trait UsbDevice: Any + Send + Sync {
    /// Build the entity from a discovered attachment.
    fn from_attachment(attachment: Attachment) -> Self
    where
        Self: Sized;

    /// Stable identifier of the underlying device.
    fn id(&self) -> &DeviceId;

    /// Descriptor snapshot of the underlying device.
    fn info(&self) -> &DeviceInfo;
}

impl dyn UsbDevice {
    /// Whether the entity's concrete type is `T`.
    pub fn is<T: UsbDevice>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }

    /// Borrow the entity as its concrete type `T`.
    pub fn downcast_ref<T: UsbDevice>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    /// Recover a shared handle to the concrete type `T`.
    pub fn downcast_arc<T: UsbDevice>(self: Arc<Self>) -> Option<Arc<T>> {
        let any: Arc<dyn Any + Send + Sync> = self;
        any.downcast::<T>().ok()
    }
}

/// Plain entity type for callers that only need the descriptor data.
#[derive(Debug, Clone)]
pub struct GenericDevice {
    attachment: Attachment,
}

impl GenericDevice {
    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    pub fn vendor_id(&self) -> u16 {
        self.attachment.info().vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.attachment.info().product_id
    }
}

impl UsbDevice for GenericDevice {
    fn from_attachment(attachment: Attachment) -> Self {
        Self { attachment }
    }

    fn id(&self) -> &DeviceId {
        self.attachment.id()
    }

    fn info(&self) -> &DeviceInfo {
        self.attachment.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info(vendor_id: u16, product_id: u16) -> DeviceInfo {
        DeviceInfo {
            vendor_id,
            product_id,
            bus_number: 3,
            device_address: 7,
            manufacturer: Some("Test Manufacturer".to_string()),
            product: Some("Test Product".to_string()),
            serial_number: None,
            class: 0,
            subclass: 0,
            protocol: 0,
            speed: DeviceSpeed::High,
            num_configurations: 1,
        }
    }

    #[test]
    fn test_device_id_from_bus_address() {
        let id = DeviceId::from_bus_address(3, 7);
        assert_eq!(id.as_str(), "003.007");
        assert_eq!(id.to_string(), "003.007");
    }

    #[test]
    fn test_device_id_ordering_follows_bus_position() {
        let mut ids = vec![
            DeviceId::from_bus_address(2, 1),
            DeviceId::from_bus_address(1, 12),
            DeviceId::from_bus_address(1, 2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                DeviceId::from_bus_address(1, 2),
                DeviceId::from_bus_address(1, 12),
                DeviceId::from_bus_address(2, 1),
            ]
        );
    }

    #[test]
    fn test_generic_device_wraps_attachment() {
        let attachment = Attachment::new(DeviceId::from_bus_address(3, 7), sample_info(0x05ac, 0x8290));
        let device = GenericDevice::from_attachment(attachment);
        assert_eq!(device.id().as_str(), "003.007");
        assert_eq!(device.vendor_id(), 0x05ac);
        assert_eq!(device.product_id(), 0x8290);
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let attachment = Attachment::new(DeviceId::from_bus_address(1, 1), sample_info(1, 2));
        let device: Arc<dyn UsbDevice> = Arc::new(GenericDevice::from_attachment(attachment));

        assert!(device.is::<GenericDevice>());
        assert!(device.downcast_ref::<GenericDevice>().is_some());

        let concrete = Arc::clone(&device).downcast_arc::<GenericDevice>().unwrap();
        assert_eq!(concrete.vendor_id(), 1);
    }

    #[test]
    fn test_attachment_handle_downcast() {
        let attachment = Attachment::new(DeviceId::from_bus_address(1, 1), sample_info(1, 2))
            .with_handle(Arc::new(42u32));

        assert_eq!(attachment.handle::<u32>().as_deref(), Some(&42));
        assert!(attachment.handle::<String>().is_none());

        let bare = Attachment::new(DeviceId::from_bus_address(1, 2), sample_info(1, 2));
        assert!(bare.handle::<u32>().is_none());
    }
}
