use std::{fmt, mem, str::FromStr};

use crate::error::GpioError;

/// Identifies one of the GPIO controllers present on the SoC.
///
/// The four general purpose banks live next to each other in the peripheral
/// address space, the power-domain bank sits in the RTC domain.
///
/// # Example
///
/// ```rust
/// use milkv_gpio::ControllerId;
///
/// let id: ControllerId = "PWR_GPIO".parse().unwrap();
/// assert_eq!(id, ControllerId::PowerPort);
/// assert_eq!(id.base_address(), 0x0502_1000);
/// ```
#[derive(Debug, Eq, Hash, PartialEq, Clone, Copy, PartialOrd, Ord)]
pub enum ControllerId {
    Port0 = 0,
    Port1 = 1,
    Port2 = 2,
    Port3 = 3,
    PowerPort = 4,
}

impl ControllerId {
    /// Every controller, in registry order.
    pub const ALL: [ControllerId; 5] = [
        ControllerId::Port0,
        ControllerId::Port1,
        ControllerId::Port2,
        ControllerId::Port3,
        ControllerId::PowerPort,
    ];

    /// Position of the controller inside the registry.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Physical address of the controller's register block.
    pub fn base_address(&self) -> u64 {
        match self {
            ControllerId::Port0 => GPIO0_BASE,
            ControllerId::Port1 => GPIO1_BASE,
            ControllerId::Port2 => GPIO2_BASE,
            ControllerId::Port3 => GPIO3_BASE,
            ControllerId::PowerPort => PWR_GPIO_BASE,
        }
    }

    /// Name of the controller as printed on the board documentation.
    pub fn name(&self) -> &'static str {
        match self {
            ControllerId::Port0 => "GPIO0",
            ControllerId::Port1 => "GPIO1",
            ControllerId::Port2 => "GPIO2",
            ControllerId::Port3 => "GPIO3",
            ControllerId::PowerPort => "PWR_GPIO",
        }
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControllerId {
    type Err = GpioError;

    /// Converts a board name to a `ControllerId`.
    ///
    /// Valid strings are `"GPIO0"` to `"GPIO3"` and `"PWR_GPIO"`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControllerId::ALL
            .iter()
            .copied()
            .find(|id| id.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GpioError::InvalidController(s.to_string()))
    }
}

impl TryFrom<u32> for ControllerId {
    type Error = GpioError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        ControllerId::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| GpioError::InvalidController(index.to_string()))
    }
}

pub const GPIO0_BASE: u64 = 0x0302_0000;
pub const GPIO1_BASE: u64 = 0x0302_1000;
pub const GPIO2_BASE: u64 = 0x0302_2000;
pub const GPIO3_BASE: u64 = 0x0302_3000;
pub const PWR_GPIO_BASE: u64 = 0x0502_1000;

/// Number of pins served by one controller, one bit per pin in every register.
pub const PINS_PER_BANK: u32 = 32;

/// Memory layout of one controller's register block.
///
/// The structure is never instantiated; it only fixes the offsets and the
/// size of the mapping. Reserved words must stay in place.
#[repr(C)]
pub struct RegisterBlock {
    pub swporta_dr: u32,
    pub swporta_ddr: u32,
    _reserved0: [u32; 10],
    pub inten: u32,
    pub intmask: u32,
    pub inttype_level: u32,
    pub int_polarity: u32,
    pub int_status: u32,
    pub raw_int_status: u32,
    pub debounce: u32,
    pub porta_eoi: u32,
    pub porta_ext: u32,
    _reserved1: [u32; 3],
    pub ls_sync: u32,
}

/// Length in bytes of one controller mapping.
pub const REGISTER_BLOCK_SIZE: usize = mem::size_of::<RegisterBlock>();

const _: () = {
    assert!(mem::offset_of!(RegisterBlock, swporta_dr) == 0x00);
    assert!(mem::offset_of!(RegisterBlock, swporta_ddr) == 0x04);
    assert!(mem::offset_of!(RegisterBlock, inten) == 0x30);
    assert!(mem::offset_of!(RegisterBlock, intmask) == 0x34);
    assert!(mem::offset_of!(RegisterBlock, inttype_level) == 0x38);
    assert!(mem::offset_of!(RegisterBlock, int_polarity) == 0x3C);
    assert!(mem::offset_of!(RegisterBlock, int_status) == 0x40);
    assert!(mem::offset_of!(RegisterBlock, raw_int_status) == 0x44);
    assert!(mem::offset_of!(RegisterBlock, debounce) == 0x48);
    assert!(mem::offset_of!(RegisterBlock, porta_eoi) == 0x4C);
    assert!(mem::offset_of!(RegisterBlock, porta_ext) == 0x50);
    assert!(mem::offset_of!(RegisterBlock, ls_sync) == 0x60);
    assert!(REGISTER_BLOCK_SIZE == 0x64);
};

/// A named 32-bit register inside a [`RegisterBlock`].
#[derive(Debug, Eq, Hash, PartialEq, Clone, Copy)]
pub enum Register {
    /// Output data.
    Dr,
    /// Direction, 1 = output.
    Ddr,
    IntEn,
    IntMask,
    /// Interrupt trigger, 1 = edge sensitive.
    IntTypeLevel,
    /// Interrupt polarity, 1 = active high.
    IntPolarity,
    IntStatus,
    RawIntStatus,
    Debounce,
    /// End of interrupt, write one to clear.
    PortaEoi,
    /// External pin state, read only.
    PortaExt,
    LsSync,
}

impl Register {
    /// Byte offset of the register from the controller's base address.
    pub const fn offset(&self) -> usize {
        match self {
            Register::Dr => mem::offset_of!(RegisterBlock, swporta_dr),
            Register::Ddr => mem::offset_of!(RegisterBlock, swporta_ddr),
            Register::IntEn => mem::offset_of!(RegisterBlock, inten),
            Register::IntMask => mem::offset_of!(RegisterBlock, intmask),
            Register::IntTypeLevel => mem::offset_of!(RegisterBlock, inttype_level),
            Register::IntPolarity => mem::offset_of!(RegisterBlock, int_polarity),
            Register::IntStatus => mem::offset_of!(RegisterBlock, int_status),
            Register::RawIntStatus => mem::offset_of!(RegisterBlock, raw_int_status),
            Register::Debounce => mem::offset_of!(RegisterBlock, debounce),
            Register::PortaEoi => mem::offset_of!(RegisterBlock, porta_eoi),
            Register::PortaExt => mem::offset_of!(RegisterBlock, porta_ext),
            Register::LsSync => mem::offset_of!(RegisterBlock, ls_sync),
        }
    }
}
