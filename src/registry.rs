use std::{
    env, fmt,
    fs::{File, OpenOptions},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    ptr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use lazy_static::lazy_static;
use memmap2::{MmapMut, MmapOptions};

use crate::error::{GpioError, Result};
use crate::gpio_bank_data::{ControllerId, Register, REGISTER_BLOCK_SIZE};

static DEFAULT_DEVICE: &str = "/dev/mem";
static DEVICE_ENV: &str = "MILKV_GPIO_DEVICE";

lazy_static! {
    static ref GLOBAL_REGISTRY: Registry = Registry::new(RegistryConfig::from_env());
}

/// Where the registry takes its physical memory from.
///
/// # Example
///
/// ```rust
/// use milkv_gpio::RegistryConfig;
///
/// let config = RegistryConfig::default();
/// assert_eq!(config.device.to_str(), Some("/dev/mem"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Character device exposing physical memory.
    pub device: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            device: PathBuf::from(DEFAULT_DEVICE),
        }
    }
}

impl RegistryConfig {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        RegistryConfig {
            device: device.into(),
        }
    }

    /// Builds a configuration from the environment.
    ///
    /// `MILKV_GPIO_DEVICE` overrides the device path, otherwise `/dev/mem` is used.
    pub fn from_env() -> Self {
        match env::var_os(DEVICE_ENV) {
            Some(device) if !device.is_empty() => RegistryConfig::new(device),
            _ => RegistryConfig::default(),
        }
    }
}

/// One controller's register block mapped into the process.
#[derive(Debug)]
struct BankMapping {
    controller: ControllerId,
    registers: *mut u32,
    _mmap: MmapMut,
}

// The pointer targets `_mmap`, which lives exactly as long as this value.
// Register words are only touched through volatile 32-bit accesses, callers
// serialize read-modify-write sequences on a shared word themselves.
unsafe impl Send for BankMapping {}
unsafe impl Sync for BankMapping {}

impl BankMapping {
    fn map(device: &File, controller: ControllerId) -> Result<Self> {
        let base = controller.base_address();
        let mut mmap = unsafe {
            MmapOptions::new()
                .offset(base)
                .len(REGISTER_BLOCK_SIZE)
                .map_mut(device)
        }
        .map_err(|source| GpioError::MappingFailed {
            controller,
            base,
            source,
        })?;

        log::debug!("mapped {} registers at {:#010x}", controller, base);

        Ok(BankMapping {
            controller,
            registers: mmap.as_mut_ptr().cast::<u32>(),
            _mmap: mmap,
        })
    }
}

/// Shared, typed view onto one controller's registers.
///
/// Cloning a view is cheap and every clone observes the same memory. The
/// mapping stays alive as long as any view does, even after
/// [`Registry::close`].
#[derive(Clone)]
pub struct RegisterBank {
    mapping: Arc<BankMapping>,
}

impl RegisterBank {
    /// The controller this view belongs to.
    pub fn controller(&self) -> ControllerId {
        self.mapping.controller
    }

    /// Physical address the view was mapped from.
    pub fn base_address(&self) -> u64 {
        self.mapping.controller.base_address()
    }

    /// Returns `true` when both views share one mapping.
    pub fn same_mapping(&self, other: &RegisterBank) -> bool {
        Arc::ptr_eq(&self.mapping, &other.mapping)
    }

    /// Reads a whole register word.
    pub fn read(&self, register: Register) -> u32 {
        unsafe { ptr::read_volatile(self.register_ptr(register)) }
    }

    /// Overwrites a whole register word.
    pub fn write(&self, register: Register, value: u32) {
        unsafe { ptr::write_volatile(self.register_ptr(register), value) }
    }

    /// Read-modify-write of one register word.
    ///
    /// Not atomic: two threads modifying the same word concurrently can lose
    /// an update.
    pub fn modify<F>(&self, register: Register, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read(register);
        self.write(register, f(value));
    }

    /// Sets the bits of `mask`, leaving the rest of the word unchanged.
    pub fn set_bits(&self, register: Register, mask: u32) {
        self.modify(register, |value| value | mask);
    }

    /// Clears the bits of `mask`, leaving the rest of the word unchanged.
    pub fn clear_bits(&self, register: Register, mask: u32) {
        self.modify(register, |value| value & !mask);
    }

    fn register_ptr(&self, register: Register) -> *mut u32 {
        // every offset is word aligned and inside REGISTER_BLOCK_SIZE
        unsafe { self.mapping.registers.add(register.offset() / 4) }
    }
}

impl fmt::Debug for RegisterBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterBank")
            .field("controller", &self.controller())
            .field("base_address", &format_args!("{:#010x}", self.base_address()))
            .finish()
    }
}

#[derive(Debug)]
struct Mappings {
    _device: File,
    banks: Vec<RegisterBank>,
}

impl Mappings {
    fn open(path: &Path) -> Result<Self> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|source| GpioError::DeviceOpenFailed {
                path: path.to_path_buf(),
                source,
            })?;

        log::info!("opened {} for GPIO register access", path.display());

        // a failure here drops the banks mapped so far
        let banks = ControllerId::ALL
            .iter()
            .map(|&controller| {
                BankMapping::map(&device, controller).map(|mapping| RegisterBank {
                    mapping: Arc::new(mapping),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Mappings {
            _device: device,
            banks,
        })
    }
}

#[derive(Debug)]
enum State {
    Unmapped,
    Ready(Mappings),
    /// Setup failed; the error is replayed instead of retrying.
    Failed(GpioError),
    Closed,
}

/// Process-wide owner of the GPIO register mappings.
///
/// The registry opens the physical memory device once and maps every
/// controller on the first call to [`Registry::ensure_mapped`]. Later calls
/// reuse the existing mappings. Setup is attempted at most once and a
/// closed registry never maps again.
///
/// # Example
///
/// ```rust,no_run
/// use milkv_gpio::{ControllerId, Register, Registry};
///
/// let registry = Registry::global();
/// registry.ensure_mapped().unwrap();
///
/// let bank = registry.bank(ControllerId::PowerPort).unwrap();
/// println!("DR = {:#010x}", bank.read(Register::Dr));
/// ```
#[derive(Debug)]
pub struct Registry {
    config: RegistryConfig,
    state: Mutex<State>,
}

impl Registry {
    /// Creates a registry that has not mapped anything yet.
    pub fn new(config: RegistryConfig) -> Self {
        Registry {
            config,
            state: Mutex::new(State::Unmapped),
        }
    }

    /// The registry shared by the whole process, configured from the environment.
    pub fn global() -> &'static Registry {
        &GLOBAL_REGISTRY
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns `true` once every controller is mapped.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state(), State::Ready(_))
    }

    /// Opens the device and maps every controller, unless already done.
    ///
    /// Requires the privilege to open the device for writing. On failure
    /// nothing stays mapped, the registry remains not ready and every later
    /// call returns the same error without touching the device again. After
    /// [`Registry::close`] it fails with `GpioError::RegistryClosed`.
    pub fn ensure_mapped(&self) -> Result<()> {
        let mut state = self.state();
        match &*state {
            State::Ready(_) => return Ok(()),
            State::Failed(e) => return Err(e.duplicate()),
            State::Closed => return Err(GpioError::RegistryClosed),
            State::Unmapped => {}
        }

        match Mappings::open(&self.config.device) {
            Ok(mappings) => {
                *state = State::Ready(mappings);
                Ok(())
            }
            Err(e) => {
                log::warn!("GPIO register mapping failed: {}", e);
                *state = State::Failed(e.duplicate());
                Err(e)
            }
        }
    }

    /// Returns the shared view for `controller`.
    ///
    /// # Arguments
    ///
    /// * `controller` - The controller whose registers are wanted.
    pub fn bank(&self, controller: ControllerId) -> Result<RegisterBank> {
        let bank = match &*self.state() {
            State::Ready(mappings) => mappings.banks.get(controller.index()).cloned(),
            _ => None,
        };
        bank.ok_or(GpioError::ControllerNotMapped(controller))
    }

    /// Releases the device and the registry's hold on every mapping.
    ///
    /// The registry is closed for good: views handed out earlier stay valid
    /// until dropped, but nothing is mapped again. Calling it again, or on a
    /// registry that never mapped, does nothing more.
    pub fn close(&self) {
        let mut state = self.state();
        if let State::Ready(mappings) = &*state {
            log::debug!(
                "releasing {} GPIO register mappings",
                mappings.banks.len()
            );
        }
        *state = State::Closed;
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::FileExt;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::gpio_bank_data::PWR_GPIO_BASE;

    // sparse file standing in for physical memory
    fn simulated_memory() -> NamedTempFile {
        let memory = NamedTempFile::new().unwrap();
        memory.as_file().set_len(PWR_GPIO_BASE + 0x1000).unwrap();
        memory
    }

    #[test]
    fn bank_before_mapping_is_an_error() {
        let memory = simulated_memory();
        let registry = Registry::new(RegistryConfig::new(memory.path()));

        assert!(!registry.is_ready());
        assert!(matches!(
            registry.bank(ControllerId::Port0),
            Err(GpioError::ControllerNotMapped(ControllerId::Port0))
        ));
    }

    #[test]
    fn ensure_mapped_is_idempotent() {
        env_logger::try_init().ok();

        let memory = simulated_memory();
        let registry = Registry::new(RegistryConfig::new(memory.path()));

        registry.ensure_mapped().unwrap();
        let first = registry.bank(ControllerId::Port1).unwrap();
        registry.ensure_mapped().unwrap();
        let second = registry.bank(ControllerId::Port1).unwrap();

        assert!(first.same_mapping(&second));
        first.write(Register::Debounce, 0xdead_beef);
        assert_eq!(second.read(Register::Debounce), 0xdead_beef);
    }

    #[test]
    fn registers_land_at_physical_addresses() {
        let memory = simulated_memory();
        let registry = Registry::new(RegistryConfig::new(memory.path()));
        registry.ensure_mapped().unwrap();

        for controller in ControllerId::ALL {
            let bank = registry.bank(controller).unwrap();
            assert_eq!(bank.controller(), controller);
            bank.write(Register::LsSync, 0x1234_0000 | controller.index() as u32);
        }

        for controller in ControllerId::ALL {
            let mut raw = [0u8; 4];
            let address = controller.base_address() + Register::LsSync.offset() as u64;
            memory.as_file().read_exact_at(&mut raw, address).unwrap();
            assert_eq!(
                u32::from_ne_bytes(raw),
                0x1234_0000 | controller.index() as u32
            );
        }
    }

    #[test]
    fn missing_device_reports_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(RegistryConfig::new(dir.path().join("mem")));

        assert!(matches!(
            registry.ensure_mapped(),
            Err(GpioError::DeviceOpenFailed { .. })
        ));
        assert!(!registry.is_ready());
    }

    #[test]
    fn failed_setup_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem");
        let registry = Registry::new(RegistryConfig::new(&path));
        assert!(registry.ensure_mapped().is_err());

        // the device showing up later does not matter any more
        let memory = std::fs::File::create(&path).unwrap();
        memory.set_len(PWR_GPIO_BASE + 0x1000).unwrap();

        match registry.ensure_mapped() {
            Err(GpioError::DeviceOpenFailed { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!registry.is_ready());
    }

    #[test]
    fn unmappable_device_reports_mapping_failure() {
        let registry = Registry::new(RegistryConfig::new("/dev/null"));

        match registry.ensure_mapped() {
            Err(GpioError::MappingFailed { controller, base, .. }) => {
                assert_eq!(controller, ControllerId::Port0);
                assert_eq!(base, 0x0302_0000);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!registry.is_ready());
        assert!(registry.bank(ControllerId::Port0).is_err());
    }

    #[test]
    fn close_is_idempotent_and_keeps_live_views_valid() {
        let memory = simulated_memory();
        let registry = Registry::new(RegistryConfig::new(memory.path()));

        registry.ensure_mapped().unwrap();
        let bank = registry.bank(ControllerId::PowerPort).unwrap();

        registry.close();
        registry.close();

        assert!(!registry.is_ready());
        assert!(matches!(
            registry.bank(ControllerId::PowerPort),
            Err(GpioError::ControllerNotMapped(_))
        ));
        assert!(matches!(
            registry.ensure_mapped(),
            Err(GpioError::RegistryClosed)
        ));

        bank.set_bits(Register::Dr, 1 << 2);
        assert_eq!(bank.read(Register::Dr), 1 << 2);
    }

    #[test]
    fn close_before_mapping_prevents_mapping() {
        let memory = simulated_memory();
        let registry = Registry::new(RegistryConfig::new(memory.path()));
        registry.close();

        assert!(matches!(
            registry.ensure_mapped(),
            Err(GpioError::RegistryClosed)
        ));
        assert!(!registry.is_ready());
    }

    #[test]
    fn set_and_clear_touch_only_their_mask() {
        let memory = simulated_memory();
        let registry = Registry::new(RegistryConfig::new(memory.path()));
        registry.ensure_mapped().unwrap();
        let bank = registry.bank(ControllerId::Port3).unwrap();

        bank.write(Register::IntMask, 0xf0f0_f0f0);
        bank.set_bits(Register::IntMask, 1 << 0);
        assert_eq!(bank.read(Register::IntMask), 0xf0f0_f0f1);
        bank.clear_bits(Register::IntMask, 1 << 31);
        assert_eq!(bank.read(Register::IntMask), 0x70f0_f0f1);
    }

    #[test]
    fn config_defaults_to_dev_mem() {
        assert_eq!(RegistryConfig::default().device, PathBuf::from("/dev/mem"));
    }
}
