// 模块划分：配置、GPS 串口、读卡、HTTP 监听/分发、协作式调度
pub mod build_env;
pub mod config;
pub mod dispatch;
pub mod gps;
pub mod listener;
pub mod rfid;
pub mod scheduler;
pub mod sim;

// 仅 ESP-IDF 目标：Wi-Fi、UART 与 SPI 读卡器适配
#[cfg(target_os = "espidf")]
pub mod net;
#[cfg(target_os = "espidf")]
pub mod rfid_spi;
#[cfg(target_os = "espidf")]
pub mod uart_link;
