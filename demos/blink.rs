//! Blinks the on-board LED wired to PWR_GPIO pin 2.
//!
//! Needs root, or `MILKV_GPIO_DEVICE` pointing at a writable memory device.

use std::{thread, time::Duration};

use milkv_gpio::{ControllerId, Direction, GpioPin};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let led = GpioPin::new(ControllerId::PowerPort, 2)?;
    led.configure_direction(Direction::Output);

    loop {
        led.write_level(true);
        println!("LED state: {}", led.read_level() as u32);
        thread::sleep(Duration::from_millis(50));

        led.write_level(false);
        println!("LED state: {}", led.read_level() as u32);
        thread::sleep(Duration::from_millis(450));
    }
}
