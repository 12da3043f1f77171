use crate::error::{GpioError, Result};
use crate::gpio_bank_data::{ControllerId, Register, PINS_PER_BANK};
use crate::registry::{RegisterBank, Registry};

/// Specifies the GPIO pin direction.
///
/// * `Input` - DDR bit cleared
/// * `Output` - DDR bit set
///
/// # Example
///
/// To set up pin 2 of the power-domain controller as an output:
///
/// ```rust,no_run
/// use milkv_gpio::{ControllerId, Direction, GpioPin};
///
/// let led = GpioPin::new(ControllerId::PowerPort, 2).unwrap();
/// led.configure_direction(Direction::Output);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    Input,
    Output,
}

/// Specifies what triggers an interrupt.
///
/// * `LevelSensitive` - while the signal level persists
/// * `EdgeSensitive` - on a signal transition
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterruptLevelType {
    LevelSensitive,
    EdgeSensitive,
}

/// Specifies which logic level signals an interrupt.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterruptPolarity {
    ActiveLow,
    ActiveHigh,
}

/// A single pin of one GPIO controller.
///
/// The handle holds a shared view of its controller's registers and only
/// ever changes the bit at its own pin index. Handles are cheap to create and
/// drop; the mapping belongs to the [`Registry`].
///
/// Each mutating operation is a read-modify-write of a register word that
/// all 32 pins of the controller share. Nothing here locks: threads changing
/// different pins of the same controller at the same time must hold their
/// own per-controller lock, or one of the updates can be lost.
///
/// # Example
///
/// ```rust,no_run
/// use milkv_gpio::{ControllerId, Direction, GpioPin};
///
/// let led = GpioPin::new(ControllerId::PowerPort, 2).unwrap();
/// led.configure_direction(Direction::Output);
/// led.write_level(true);
/// assert!(led.read_level());
/// ```
#[derive(Debug, Clone)]
pub struct GpioPin {
    controller: ControllerId,
    pin: u32,
    bank: RegisterBank,
}

impl GpioPin {
    /// Creates a handle backed by the process-wide [`Registry::global`].
    ///
    /// Maps the controllers on first use, which needs access to `/dev/mem`.
    ///
    /// # Arguments
    ///
    /// * `controller` - The controller the pin belongs to.
    /// * `pin` - The bit position of the pin, 0 to 31.
    pub fn new(controller: ControllerId, pin: u32) -> Result<Self> {
        GpioPin::with_registry(Registry::global(), controller, pin)
    }

    /// Creates a handle backed by `registry`.
    ///
    /// The pin index is checked before the registry is touched.
    pub fn with_registry(registry: &Registry, controller: ControllerId, pin: u32) -> Result<Self> {
        if pin >= PINS_PER_BANK {
            return Err(GpioError::InvalidPinIndex(pin));
        }

        registry.ensure_mapped()?;
        let bank = registry.bank(controller)?;

        log::debug!("created handle for {} pin {}", controller, pin);

        Ok(GpioPin {
            controller,
            pin,
            bank,
        })
    }

    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// The single bit this pin owns in every register.
    pub fn mask(&self) -> u32 {
        1 << self.pin
    }

    /// Sets the pin up as input or output.
    ///
    /// # Arguments
    ///
    /// * `direction` - `Direction::Input` or `Direction::Output`
    pub fn configure_direction(&self, direction: Direction) {
        self.update(Register::Ddr, direction == Direction::Output);
    }

    /// Returns the direction currently programmed in hardware.
    pub fn direction(&self) -> Direction {
        if self.is_set(Register::Ddr) {
            Direction::Output
        } else {
            Direction::Input
        }
    }

    /// Drives the output latch high (`true`) or low (`false`).
    pub fn write_level(&self, level: bool) {
        self.update(Register::Dr, level);
    }

    /// Returns the value of the output latch.
    pub fn read_level(&self) -> bool {
        self.is_set(Register::Dr)
    }

    /// Returns the level sampled on the external pin.
    pub fn read_input(&self) -> bool {
        self.is_set(Register::PortaExt)
    }

    pub fn enable_interrupt(&self) {
        self.update(Register::IntEn, true);
    }

    pub fn disable_interrupt(&self) {
        self.update(Register::IntEn, false);
    }

    pub fn enable_interrupt_mask(&self) {
        self.update(Register::IntMask, true);
    }

    pub fn disable_interrupt_mask(&self) {
        self.update(Register::IntMask, false);
    }

    /// Enables hardware debouncing. Useful when a button is connected.
    pub fn enable_debounce(&self) {
        self.update(Register::Debounce, true);
    }

    pub fn disable_debounce(&self) {
        self.update(Register::Debounce, false);
    }

    /// Sets the interrupt trigger: level or edge sensitive.
    pub fn set_interrupt_level_type(&self, level_type: InterruptLevelType) {
        self.update(
            Register::IntTypeLevel,
            level_type == InterruptLevelType::EdgeSensitive,
        );
    }

    /// Sets the interrupt polarity: active low or active high.
    pub fn set_interrupt_polarity(&self, polarity: InterruptPolarity) {
        self.update(
            Register::IntPolarity,
            polarity == InterruptPolarity::ActiveHigh,
        );
    }

    /// Returns the whole INT_STATUS word of the controller.
    pub fn interrupt_status(&self) -> u32 {
        self.bank.read(Register::IntStatus)
    }

    /// Returns the whole RAW_INT_STATUS word of the controller.
    pub fn raw_interrupt_status(&self) -> u32 {
        self.bank.read(Register::RawIntStatus)
    }

    /// Returns `true` if this pin has a pending, unmasked interrupt.
    pub fn interrupt_pending(&self) -> bool {
        self.interrupt_status() & self.mask() != 0
    }

    /// Acknowledges an edge interrupt on this pin.
    ///
    /// PORTA_EOI is write-one-to-clear, so only this pin's bit is written.
    pub fn clear_interrupt(&self) {
        self.bank.write(Register::PortaEoi, self.mask());
    }

    fn is_set(&self, register: Register) -> bool {
        self.bank.read(register) & self.mask() != 0
    }

    fn update(&self, register: Register, set: bool) {
        if set {
            self.bank.set_bits(register, self.mask());
        } else {
            self.bank.clear_bits(register, self.mask());
        }
    }
}
