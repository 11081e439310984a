//! Named registry for peripheral chips.
//!
//! Unlike [`MemoryMap`](super::MemoryMap), the hub never lets two peripherals
//! share an address: a registration that touches any existing range is
//! rejected outright. Bindings are kept sorted by start address so lookups,
//! ticks and interrupt polling always visit peripherals in the same order.

use super::{BusError, Device, Result};

/// A peripheral bound to a name and an address range.
struct PeripheralBinding {
    name: String,
    start: u16,
    end: u16,
    peripheral: Box<dyn Device>,
}

impl PeripheralBinding {
    fn contains(&self, addr: u16) -> bool {
        addr >= self.start && addr <= self.end
    }

    fn overlaps(&self, start: u16, end: u16) -> bool {
        self.start <= end && start <= self.end
    }
}

/// Peripheral registry owned by one bus.
///
/// # Examples
///
/// ```rust
/// use homebrew6502::{Acia6850, BusError, PeripheralHub, Via6522};
///
/// let mut hub = PeripheralHub::new();
/// hub.register_peripheral(Box::new(Via6522::new()), 0x6000, 0x600F, "via")
///     .unwrap();
///
/// // Any overlap is refused, whatever the chip
/// let err = hub
///     .register_peripheral(Box::new(Acia6850::new()), 0x600F, 0x6010, "acia")
///     .unwrap_err();
/// assert!(matches!(err, BusError::AddressConflict { .. }));
/// ```
pub struct PeripheralHub {
    bindings: Vec<PeripheralBinding>,
}

impl PeripheralHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Bind `peripheral` to `start..=end` under `name`.
    ///
    /// # Errors
    ///
    /// - [`BusError::InvalidRange`] if `end < start`
    /// - [`BusError::AddressConflict`] if the range intersects any existing binding
    /// - [`BusError::DuplicateName`] if `name` is already bound
    ///
    /// The range need not match `peripheral.size()`; offsets past the
    /// device's registers are still routed to it. On error the hub is
    /// unchanged.
    pub fn register_peripheral(
        &mut self,
        peripheral: Box<dyn Device>,
        start: u16,
        end: u16,
        name: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();

        if end < start {
            return Err(BusError::InvalidRange { start, end });
        }

        if let Some(existing) = self
            .bindings
            .iter()
            .find(|binding| binding.overlaps(start, end))
        {
            log::warn!(
                "Refusing {} at ${:04X}-${:04X}: overlaps {} at ${:04X}-${:04X}",
                name,
                start,
                end,
                existing.name,
                existing.start,
                existing.end
            );
            return Err(BusError::AddressConflict {
                new_name: name,
                new_start: start,
                new_end: end,
                existing_name: existing.name.clone(),
                existing_start: existing.start,
                existing_end: existing.end,
            });
        }

        if self.bindings.iter().any(|binding| binding.name == name) {
            return Err(BusError::DuplicateName(name));
        }

        log::debug!("Registered {} at ${:04X}-${:04X}", name, start, end);
        let index = self.bindings.partition_point(|binding| binding.start < start);
        self.bindings.insert(
            index,
            PeripheralBinding {
                name,
                start,
                end,
                peripheral,
            },
        );
        Ok(())
    }

    /// Remove the peripheral bound to `name`, returning it.
    ///
    /// Does nothing if no such peripheral exists.
    pub fn unregister_peripheral(&mut self, name: &str) -> Option<Box<dyn Device>> {
        let index = self
            .bindings
            .iter()
            .position(|binding| binding.name == name)?;
        log::debug!("Unregistered {}", name);
        Some(self.bindings.remove(index).peripheral)
    }

    /// Number of registered peripherals.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no peripheral is registered.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Names in start-address order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|binding| binding.name.as_str())
    }

    /// Address range bound to `name`.
    pub fn range_of(&self, name: &str) -> Option<(u16, u16)> {
        self.bindings
            .iter()
            .find(|binding| binding.name == name)
            .map(|binding| (binding.start, binding.end))
    }

    /// Check if some peripheral owns `addr`.
    pub fn contains(&self, addr: u16) -> bool {
        self.binding_at(addr).is_some()
    }

    fn binding_at(&self, addr: u16) -> Option<&PeripheralBinding> {
        self.bindings.iter().find(|binding| binding.contains(addr))
    }

    fn binding_at_mut(&mut self, addr: u16) -> Option<&mut PeripheralBinding> {
        self.bindings.iter_mut().find(|binding| binding.contains(addr))
    }

    /// Read through whichever peripheral owns `addr`.
    pub fn read(&self, addr: u16) -> Option<u8> {
        self.binding_at(addr)
            .map(|binding| binding.peripheral.read(addr - binding.start))
    }

    /// Write through whichever peripheral owns `addr`.
    ///
    /// Returns false if no peripheral owns the address.
    pub fn write(&mut self, addr: u16, value: u8) -> bool {
        match self.binding_at_mut(addr) {
            Some(binding) => {
                let offset = addr - binding.start;
                binding.peripheral.write(offset, value);
                true
            }
            None => false,
        }
    }

    /// Advance every peripheral by `cycles`, in start-address order.
    pub fn tick(&mut self, cycles: u32) {
        for binding in &mut self.bindings {
            binding.peripheral.tick(cycles);
        }
    }

    /// Reset every peripheral.
    pub fn reset(&mut self) {
        for binding in &mut self.bindings {
            binding.peripheral.reset();
        }
    }

    /// Names of peripherals currently asserting an interrupt, in start-address order.
    pub fn interrupting(&self) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|binding| binding.peripheral.has_interrupt())
            .map(|binding| binding.name.as_str())
            .collect()
    }

    /// Borrow the peripheral bound to `name` as its concrete type.
    pub fn peripheral<T: Device + 'static>(&self, name: &str) -> Option<&T> {
        self.bindings
            .iter()
            .find(|binding| binding.name == name)
            .and_then(|binding| binding.peripheral.as_any().downcast_ref::<T>())
    }

    /// Mutably borrow the peripheral bound to `name` as its concrete type.
    pub fn peripheral_mut<T: Device + 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.bindings
            .iter_mut()
            .find(|binding| binding.name == name)
            .and_then(|binding| binding.peripheral.as_any_mut().downcast_mut::<T>())
    }
}

impl Default for PeripheralHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Acia6850, Via6522};

    fn via() -> Box<dyn Device> {
        Box::new(Via6522::new())
    }

    #[test]
    fn test_overlap_detection_both_orders() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x1000, 0x100F, "low")
            .unwrap();

        // Overlaps the end
        assert!(hub
            .register_peripheral(via(), 0x1008, 0x1017, "mid")
            .is_err());
        // Overlaps the start
        assert!(hub
            .register_peripheral(via(), 0x0FF8, 0x1007, "pre")
            .is_err());
        // Exactly adjacent is fine
        assert!(hub
            .register_peripheral(via(), 0x0FF0, 0x0FFF, "adjacent")
            .is_ok());
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_containment_rejected() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x2000, 0x200F, "via")
            .unwrap();

        let err = hub
            .register_peripheral(Box::new(Acia6850::new()), 0x2004, 0x2005, "acia")
            .unwrap_err();
        assert_eq!(
            err,
            BusError::AddressConflict {
                new_name: "acia".to_string(),
                new_start: 0x2004,
                new_end: 0x2005,
                existing_name: "via".to_string(),
                existing_start: 0x2000,
                existing_end: 0x200F,
            }
        );
    }

    #[test]
    fn test_error_message_names_both_ranges() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x6000, 0x600F, "via")
            .unwrap();
        let err = hub
            .register_peripheral(via(), 0x6008, 0x6017, "via2")
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("$6000-$600F"));
        assert!(message.contains("$6008-$6017"));
    }

    #[test]
    fn test_duplicate_name_and_invalid_range() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x6000, 0x600F, "via")
            .unwrap();

        assert_eq!(
            hub.register_peripheral(via(), 0x7000, 0x700F, "via"),
            Err(BusError::DuplicateName("via".to_string()))
        );
        assert_eq!(
            hub.register_peripheral(via(), 0x7001, 0x7000, "other"),
            Err(BusError::InvalidRange {
                start: 0x7001,
                end: 0x7000
            })
        );
    }

    #[test]
    fn test_overlap_reported_before_duplicate_name() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x6000, 0x600F, "via")
            .unwrap();

        let err = hub
            .register_peripheral(via(), 0x6008, 0x6017, "via")
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::AddressConflict {
                existing_start: 0x6000,
                new_start: 0x6008,
                ..
            }
        ));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_range_wider_than_registers() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(Box::new(Acia6850::new()), 0x8000, 0x8003, "acia")
            .unwrap();

        assert_eq!(hub.range_of("acia"), Some((0x8000, 0x8003)));
        assert_eq!(hub.read(0x8002), Some(0xFF));
        assert_eq!(hub.read(0x8003), Some(0xFF));
        assert!(hub.write(0x8002, 0x55));

        // Narrower than the register window is accepted too
        hub.register_peripheral(via(), 0x9000, 0x9003, "via")
            .unwrap();
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_bindings_sorted_by_start() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x9000, 0x900F, "c").unwrap();
        hub.register_peripheral(via(), 0x1000, 0x100F, "a").unwrap();
        hub.register_peripheral(via(), 0x5000, 0x500F, "b").unwrap();

        assert_eq!(hub.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unregister_by_name() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x6000, 0x600F, "via")
            .unwrap();

        assert!(hub.unregister_peripheral("missing").is_none());
        assert!(hub.unregister_peripheral("via").is_some());
        assert!(hub.is_empty());
        assert_eq!(hub.read(0x6000), None);

        // The range is free again
        hub.register_peripheral(via(), 0x6008, 0x6017, "via")
            .unwrap();
    }

    #[test]
    fn test_routing_uses_offsets() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x6000, 0x600F, "via")
            .unwrap();

        assert!(hub.write(0x6003, 0xFF)); // DDRA
        assert!(hub.write(0x6001, 0x42)); // ORA
        assert_eq!(hub.read(0x6001), Some(0x42));
        assert!(!hub.write(0x6010, 0x00));
        assert_eq!(hub.range_of("via"), Some((0x6000, 0x600F)));
    }

    #[test]
    fn test_tick_and_interrupt_polling() {
        let mut hub = PeripheralHub::new();
        hub.register_peripheral(via(), 0x6000, 0x600F, "via")
            .unwrap();
        hub.register_peripheral(Box::new(Acia6850::new()), 0x5000, 0x5001, "acia")
            .unwrap();

        {
            let via = hub.peripheral_mut::<Via6522>("via").unwrap();
            via.write(0x0E, 0xC0);
            via.set_timer1(10);
        }
        assert!(hub.interrupting().is_empty());

        hub.tick(10);
        assert_eq!(hub.interrupting(), vec!["via"]);

        hub.reset();
        assert!(hub.interrupting().is_empty());
        assert!(hub.peripheral::<Acia6850>("via").is_none());
    }
}
