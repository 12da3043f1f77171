use std::{io, path::PathBuf};

use thiserror::Error;

use crate::gpio_bank_data::ControllerId;

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("cannot open physical memory device {}", path.display())]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot map {controller} registers at {base:#010x}")]
    MappingFailed {
        controller: ControllerId,
        base: u64,
        #[source]
        source: io::Error,
    },
    #[error("invalid GPIO controller: {0}")]
    InvalidController(String),
    #[error("invalid pin index {0}, expected 0 to 31")]
    InvalidPinIndex(u32),
    #[error("GPIO controller {0} is not mapped")]
    ControllerNotMapped(ControllerId),
    #[error("GPIO register mappings have been released")]
    RegistryClosed,
}

impl GpioError {
    /// Copies the error; an `io::Error` source keeps its kind and message.
    pub(crate) fn duplicate(&self) -> GpioError {
        fn copy_io(e: &io::Error) -> io::Error {
            io::Error::new(e.kind(), e.to_string())
        }

        match self {
            GpioError::DeviceOpenFailed { path, source } => GpioError::DeviceOpenFailed {
                path: path.clone(),
                source: copy_io(source),
            },
            GpioError::MappingFailed {
                controller,
                base,
                source,
            } => GpioError::MappingFailed {
                controller: *controller,
                base: *base,
                source: copy_io(source),
            },
            GpioError::InvalidController(name) => GpioError::InvalidController(name.clone()),
            GpioError::InvalidPinIndex(pin) => GpioError::InvalidPinIndex(*pin),
            GpioError::ControllerNotMapped(controller) => {
                GpioError::ControllerNotMapped(*controller)
            }
            GpioError::RegistryClosed => GpioError::RegistryClosed,
        }
    }
}

pub type Result<T, E = GpioError> = std::result::Result<T, E>;
