//! One-shot hardware peripheral initialization.
//!
//! Configures GPIO directions and the RS-485 UART using raw ESP-IDF sys
//! calls. Called once from `main()` before the control loop starts.
//!
//! [`Gpio`] wraps an already-configured pin number as an `embedded-hal`
//! digital pin so drivers stay generic over the pin type and can be tested
//! on the host with mock pins.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    UartInitFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::UartInitFailed(rc) => write!(f, "RS-485 UART init failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

#[cfg(target_os = "espidf")]
pub fn init_peripherals(baud_rate: u32) -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the control loop; single-threaded.
    unsafe {
        init_gpio_inputs()?;
        init_gpio_outputs()?;
        init_uart(baud_rate)?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals(_baud_rate: u32) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    for &pin in &[pins::SAFETY_GPIO, pins::SIGNAL_GPIO] {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    info!("hw_init: GPIO inputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    false
}

// ── GPIO Outputs ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    // Relay starts de-energized, LEDs are active low and start dark.
    let outputs = [
        (pins::RELAY_GPIO, 0),
        (pins::LED_COMM_GPIO, 1),
        (pins::LED_ACTIVITY_GPIO, 1),
    ];

    for &(pin, level) in &outputs {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        unsafe { gpio_set_level(pin, level) };
    }

    info!("hw_init: GPIO outputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: gpio_set_level writes to an output pin configured in
    // init_gpio_outputs(). Main-loop only.
    unsafe {
        gpio_set_level(pin, u32::from(high));
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

// ── RS-485 UART ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_uart(baud_rate: u32) -> Result<(), HwInitError> {
    let cfg = uart_config_t {
        baud_rate: baud_rate as i32,
        data_bits: uart_word_length_t_UART_DATA_8_BITS,
        parity: uart_parity_t_UART_PARITY_DISABLE,
        stop_bits: uart_stop_bits_t_UART_STOP_BITS_1,
        flow_ctrl: uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
        ..Default::default()
    };

    let port = pins::RS485_UART_PORT;
    let ret = unsafe {
        uart_driver_install(
            port,
            pins::RS485_RX_BUFFER,
            pins::RS485_TX_BUFFER,
            0,
            core::ptr::null_mut(),
            0,
        )
    };
    if ret != ESP_OK {
        return Err(HwInitError::UartInitFailed(ret));
    }

    let ret = unsafe { uart_param_config(port, &cfg) };
    if ret != ESP_OK {
        return Err(HwInitError::UartInitFailed(ret));
    }

    // RTS doubles as the transceiver's driver-enable line.
    let ret = unsafe {
        uart_set_pin(
            port,
            pins::RS485_TX_GPIO,
            pins::RS485_RX_GPIO,
            pins::RS485_DE_GPIO,
            UART_PIN_NO_CHANGE,
        )
    };
    if ret != ESP_OK {
        return Err(HwInitError::UartInitFailed(ret));
    }

    let ret = unsafe { uart_set_mode(port, uart_mode_t_UART_MODE_RS485_HALF_DUPLEX) };
    if ret != ESP_OK {
        return Err(HwInitError::UartInitFailed(ret));
    }

    info!("hw_init: RS-485 UART{} at {} baud", port, baud_rate);
    Ok(())
}

// ── embedded-hal pin wrapper ──────────────────────────────────

/// A GPIO configured by [`init_peripherals`], addressed by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gpio(pub i32);

impl ErrorType for Gpio {
    type Error = Infallible;
}

impl OutputPin for Gpio {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        gpio_write(self.0, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        gpio_write(self.0, true);
        Ok(())
    }
}

impl InputPin for Gpio {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(gpio_read(self.0))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!gpio_read(self.0))
    }
}
