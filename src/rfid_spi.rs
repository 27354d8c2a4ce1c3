use esp_idf_hal::gpio::{AnyOutputPin, InputPin, Output, OutputPin, PinDriver};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;
use esp_idf_hal::spi::config::Config as SpiConfig;
use esp_idf_hal::spi::{SpiAnyPins, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_hal::sys::EspError;
use mfrc522::comm::blocking::spi::SpiInterface;
use mfrc522::{AtqA, Initialized, Mfrc522};

use crate::rfid::{cascade_level1, PcdError, PiccReader};

type Device = SpiDeviceDriver<'static, SpiDriver<'static>>;

/// MFRC522 初始化错误。
#[derive(Debug)]
pub enum ReaderInitError {
    Esp(EspError),
    Device(String),
}

impl From<EspError> for ReaderInitError {
    fn from(err: EspError) -> Self {
        ReaderInitError::Esp(err)
    }
}

impl std::fmt::Display for ReaderInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderInitError::Esp(err) => write!(f, "esp error: {}", err),
            ReaderInitError::Device(msg) => write!(f, "mfrc522 init failed: {}", msg),
        }
    }
}

impl std::error::Error for ReaderInitError {}

/// SPI 连接的 MFRC522 读卡模块（REQA = request idle，select 内含防冲突级联）。
///
/// 上报的 UID 为第一级防冲突应答（含 BCC），与既有后端的 10 位十六进制格式一致。
pub struct Mfrc522Reader {
    driver: Mfrc522<SpiInterface<Device>, Initialized>,
    atqa: Option<AtqA>,
    // 复位脚需保持高电平
    _rst: PinDriver<'static, AnyOutputPin, Output>,
}

impl Mfrc522Reader {
    /// 初始化 SPI（100 kHz，默认模式 0）并复位读卡模块。
    pub fn new<SPI: SpiAnyPins>(
        spi: impl Peripheral<P = SPI> + 'static,
        sck: impl Peripheral<P = impl OutputPin> + 'static,
        mosi: impl Peripheral<P = impl OutputPin> + 'static,
        miso: impl Peripheral<P = impl InputPin> + 'static,
        cs: impl Peripheral<P = impl OutputPin> + 'static,
        rst: AnyOutputPin,
    ) -> Result<Self, ReaderInitError> {
        let mut rst = PinDriver::output(rst)?;
        rst.set_high()?;

        let bus = SpiDriver::new(spi, sck, mosi, Some(miso), &SpiDriverConfig::new())?;
        let config = SpiConfig::new().baudrate(100.kHz().into());
        let device = SpiDeviceDriver::new(bus, Some(cs), &config)?;

        let driver = Mfrc522::new(SpiInterface::new(device))
            .init()
            .map_err(|err| ReaderInitError::Device(format!("{:?}", err)))?;
        Ok(Self {
            driver,
            atqa: None,
            _rst: rst,
        })
    }
}

impl PiccReader for Mfrc522Reader {
    fn request_idle(&mut self) -> Result<(), PcdError> {
        match self.driver.reqa() {
            Ok(atqa) => {
                self.atqa = Some(atqa);
                Ok(())
            }
            Err(_) => {
                self.atqa = None;
                Err(PcdError::NoTag)
            }
        }
    }

    fn anticollision(&mut self) -> Result<Vec<u8>, PcdError> {
        let atqa = self.atqa.take().ok_or(PcdError::NoTag)?;
        let uid = self
            .driver
            .select(&atqa)
            .map_err(|err| PcdError::Device(format!("{:?}", err)))?;
        Ok(cascade_level1(uid.as_bytes()))
    }
}
