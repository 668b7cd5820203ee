//! Test utilities for usb-hotplug
//!
//! Provides mock descriptor fabricators and helper functions for testing
//! across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_device_info;
//!
//! let info = create_mock_device_info(1, 0x1234, 0x5678);
//! assert_eq!(info.vendor_id, 0x1234);
//! ```

use hotplug::{Attachment, DeviceId, DeviceInfo, DeviceSpeed};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock DeviceInfo for testing
///
/// # Arguments
/// * `address` - Address on the mock bus (bus number is fixed at 1)
/// * `vendor_id` - USB Vendor ID
/// * `product_id` - USB Product ID
///
/// # Example
/// ```
/// use common::test_utils::create_mock_device_info;
///
/// let info = create_mock_device_info(4, 0x1234, 0x5678);
/// assert_eq!(info.device_address, 4);
/// assert_eq!(info.vendor_id, 0x1234);
/// ```
pub fn create_mock_device_info(address: u8, vendor_id: u16, product_id: u16) -> DeviceInfo {
    DeviceInfo {
        vendor_id,
        product_id,
        bus_number: 1,
        device_address: address,
        manufacturer: Some(format!("Test Manufacturer {}", address)),
        product: Some(format!("Test Product {}", address)),
        serial_number: Some(format!("SN{:06}", address)),
        class: 0x00,
        subclass: 0x00,
        protocol: 0x00,
        speed: DeviceSpeed::High,
        num_configurations: 1,
    }
}

/// Create a mock DeviceInfo with specific USB class
///
/// # Arguments
/// * `address` - Address on the mock bus
/// * `vendor_id` - USB Vendor ID
/// * `product_id` - USB Product ID
/// * `class` - USB Device Class
/// * `subclass` - USB Device Subclass
/// * `protocol` - USB Device Protocol
pub fn create_mock_device_info_with_class(
    address: u8,
    vendor_id: u16,
    product_id: u16,
    class: u8,
    subclass: u8,
    protocol: u8,
) -> DeviceInfo {
    DeviceInfo {
        class,
        subclass,
        protocol,
        ..create_mock_device_info(address, vendor_id, product_id)
    }
}

/// Create a mock mass storage device info
pub fn create_mock_mass_storage_device(address: u8) -> DeviceInfo {
    create_mock_device_info_with_class(address, 0x0781, 0x5581, 0x08, 0x06, 0x50)
}

/// Create a mock HID device info (keyboard/mouse)
pub fn create_mock_hid_device(address: u8) -> DeviceInfo {
    create_mock_device_info_with_class(address, 0x046d, 0xc52b, 0x03, 0x00, 0x00)
}

/// Create a list of mock devices with unique addresses and IDs
///
/// # Example
/// ```
/// use common::test_utils::create_mock_device_list;
///
/// let devices = create_mock_device_list(5);
/// assert_eq!(devices.len(), 5);
/// ```
pub fn create_mock_device_list(count: u8) -> Vec<DeviceInfo> {
    (1..=count)
        .map(|i| create_mock_device_info(i, 0x1000 + (i as u16), 0x2000 + (i as u16)))
        .collect()
}

/// Create an Attachment for a mock device
///
/// The identifier is derived from the descriptor's bus position, matching
/// how backends construct attachments.
pub fn create_mock_attachment(address: u8, vendor_id: u16, product_id: u16) -> Attachment {
    attachment_for(create_mock_device_info(address, vendor_id, product_id))
}

/// Create an Attachment from an existing descriptor
pub fn attachment_for(info: DeviceInfo) -> Attachment {
    let id = DeviceId::from_bus_address(info.bus_number, info.device_address);
    Attachment::new(id, info)
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Arguments
/// * `duration` - Maximum time to wait
/// * `future` - The async operation to run
///
/// # Returns
/// Result containing the operation result or a timeout error
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_device_info() {
        let info = create_mock_device_info(42, 0x1234, 0x5678);

        assert_eq!(info.device_address, 42);
        assert_eq!(info.vendor_id, 0x1234);
        assert_eq!(info.product_id, 0x5678);
        assert!(info.manufacturer.is_some());
        assert!(info.product.is_some());
        assert!(info.serial_number.is_some());
    }

    #[test]
    fn test_create_mock_device_list() {
        let devices = create_mock_device_list(10);

        assert_eq!(devices.len(), 10);

        // Verify all addresses are unique
        let addresses: Vec<u8> = devices.iter().map(|d| d.device_address).collect();
        let unique: std::collections::HashSet<_> = addresses.iter().collect();
        assert_eq!(addresses.len(), unique.len());
    }

    #[test]
    fn test_create_mock_mass_storage_device() {
        let info = create_mock_mass_storage_device(1);

        assert_eq!(info.class, 0x08); // Mass Storage
        assert_eq!(info.subclass, 0x06); // SCSI
        assert_eq!(info.protocol, 0x50); // Bulk-Only
    }

    #[test]
    fn test_create_mock_hid_device() {
        let info = create_mock_hid_device(1);

        assert_eq!(info.class, 0x03); // HID
    }

    #[test]
    fn test_create_mock_attachment() {
        let attachment = create_mock_attachment(7, 0x1234, 0x5678);

        assert_eq!(attachment.id().as_str(), "001.007");
        assert_eq!(attachment.info().vendor_id, 0x1234);
        assert!(attachment.handle::<u32>().is_none());
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(result.is_err());
    }
}
