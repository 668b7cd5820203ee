//! Device filters: match criteria plus the entity type to instantiate
//!
//! A [`DeviceFilter`] pairs a [`MatchCriteria`] with a factory for the entity
//! type that should represent matching devices. Filters are cheap to clone;
//! the factory is shared behind an `Arc`.

use crate::device::{Attachment, DeviceInfo, UsbDevice};
use std::any::type_name;
use std::fmt;
use std::sync::Arc;

/// What a filter matches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchCriteria {
    /// Every attached device
    All,
    /// An exact vendor/product ID pair
    VendorProduct { vendor_id: u16, product_id: u16 },
    /// A device class code
    DeviceClass { class: u8 },
}

impl MatchCriteria {
    /// Whether a device with the given descriptor satisfies the criteria.
    pub fn matches(&self, info: &DeviceInfo) -> bool {
        match self {
            MatchCriteria::All => true,
            MatchCriteria::VendorProduct {
                vendor_id,
                product_id,
            } => info.vendor_id == *vendor_id && info.product_id == *product_id,
            MatchCriteria::DeviceClass { class } => info.class == *class,
        }
    }
}

impl fmt::Display for MatchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchCriteria::All => write!(f, "any device"),
            MatchCriteria::VendorProduct {
                vendor_id,
                product_id,
            } => write!(f, "{vendor_id:04x}:{product_id:04x}"),
            MatchCriteria::DeviceClass { class } => write!(f, "class {class:02x}"),
        }
    }
}

type DeviceFactory = Arc<dyn Fn(Attachment) -> Arc<dyn UsbDevice> + Send + Sync>;

/// Match criteria bound to the entity type that represents matching devices.
#[derive(Clone)]
pub struct DeviceFilter {
    criteria: MatchCriteria,
    entity_type: &'static str,
    factory: DeviceFactory,
}

impl DeviceFilter {
    /// Filter for an exact product/vendor ID pair, represented as `T`.
    pub fn match_product<T: UsbDevice>(product_id: u16, vendor_id: u16) -> Self {
        Self::with_criteria::<T>(MatchCriteria::VendorProduct {
            vendor_id,
            product_id,
        })
    }

    /// Filter matching every attached device, represented as `T`.
    pub fn match_all<T: UsbDevice>() -> Self {
        Self::with_criteria::<T>(MatchCriteria::All)
    }

    /// Filter for a device class code, represented as `T`.
    pub fn match_class<T: UsbDevice>(class: u8) -> Self {
        Self::with_criteria::<T>(MatchCriteria::DeviceClass { class })
    }

    fn with_criteria<T: UsbDevice>(criteria: MatchCriteria) -> Self {
        let factory: DeviceFactory =
            Arc::new(|attachment| Arc::new(T::from_attachment(attachment)));
        Self {
            criteria,
            entity_type: type_name::<T>(),
            factory,
        }
    }

    pub fn criteria(&self) -> MatchCriteria {
        self.criteria
    }

    /// Vendor ID this filter matches on, if it matches a specific pair.
    pub fn vendor_id(&self) -> Option<u16> {
        match self.criteria {
            MatchCriteria::VendorProduct { vendor_id, .. } => Some(vendor_id),
            _ => None,
        }
    }

    /// Product ID this filter matches on, if it matches a specific pair.
    pub fn product_id(&self) -> Option<u16> {
        match self.criteria {
            MatchCriteria::VendorProduct { product_id, .. } => Some(product_id),
            _ => None,
        }
    }

    /// Class code this filter matches on, if it matches a class.
    pub fn device_class(&self) -> Option<u8> {
        match self.criteria {
            MatchCriteria::DeviceClass { class } => Some(class),
            _ => None,
        }
    }

    /// Whether this filter matches every attached device.
    pub fn matches_all(&self) -> bool {
        self.criteria == MatchCriteria::All
    }

    /// Name of the entity type instantiated for matching devices.
    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    /// Whether a device with the given descriptor satisfies this filter.
    pub fn matches(&self, info: &DeviceInfo) -> bool {
        self.criteria.matches(info)
    }

    /// Instantiate the entity for a matched attachment.
    pub(crate) fn build(&self, attachment: Attachment) -> Arc<dyn UsbDevice> {
        (self.factory)(attachment)
    }
}

impl fmt::Debug for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceFilter")
            .field("criteria", &self.criteria)
            .field("entity_type", &self.entity_type)
            .finish()
    }
}
