use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin, InputPin, OutputPin};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;
use esp_idf_hal::sys::EspError;
use esp_idf_hal::uart::{self, Uart, UartDriver};

use crate::gps::UartPort;

/// GPS 串口（UART2，只读，不等待）。
pub struct GpsUart {
    driver: UartDriver<'static>,
}

impl GpsUart {
    /// 按波特率初始化 UART（无流控）。
    pub fn new<U: Uart>(
        uart: impl Peripheral<P = U> + 'static,
        tx: impl Peripheral<P = impl OutputPin> + 'static,
        rx: impl Peripheral<P = impl InputPin> + 'static,
        baud: u32,
    ) -> Result<Self, EspError> {
        let config = uart::config::Config::new().baudrate(Hertz(baud));
        let driver = UartDriver::new(
            uart,
            tx,
            rx,
            AnyInputPin::none(),
            AnyOutputPin::none(),
            &config,
        )?;
        Ok(Self { driver })
    }
}

impl UartPort for GpsUart {
    type Error = EspError;

    fn pending(&mut self) -> Result<usize, EspError> {
        self.driver.remaining_read()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, EspError> {
        self.driver.read(buf, NON_BLOCK)
    }
}
