//! Register-level GPIO access for the Milk-V Duo (CV1800B).
//!
//! Every GPIO controller's register block is mapped from `/dev/mem` once per
//! process by the [`Registry`]; [`GpioPin`] handles then flip single bits in
//! those registers without going through the kernel GPIO subsystem.

pub mod error;
pub mod gpio;
pub mod gpio_bank_data;
pub mod registry;

pub use error::{GpioError, Result};
pub use gpio::{Direction, GpioPin, InterruptLevelType, InterruptPolarity};
pub use gpio_bank_data::{ControllerId, Register, RegisterBlock, PINS_PER_BANK};
pub use registry::{RegisterBank, Registry, RegistryConfig};

#[cfg(test)]
mod tests {
    use crate::{ControllerId, GpioError, GpioPin, Registry, RegistryConfig};

    #[test]
    fn pin_index_is_checked_before_mapping() {
        let registry = Registry::new(RegistryConfig::new("/nonexistent/mem"));

        for pin in [32, 33, u32::MAX] {
            let ret = GpioPin::with_registry(&registry, ControllerId::Port0, pin);
            assert!(matches!(ret, Err(GpioError::InvalidPinIndex(p)) if p == pin));
        }
        assert!(!registry.is_ready());
    }

    #[test]
    fn global_handle_rejects_out_of_range_pin() {
        let ret = GpioPin::new(ControllerId::PowerPort, 32);
        assert!(matches!(ret, Err(GpioError::InvalidPinIndex(32))));
    }
}
