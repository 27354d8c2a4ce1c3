use std::net::{Ipv4Addr, SocketAddr};

use gps_rfid_node::config::NodeConfig;
use gps_rfid_node::listener::RequestListener;
use gps_rfid_node::rfid::ScanDevice;
use gps_rfid_node::scheduler::{Node, ShutdownFlag};

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_hal::gpio::{InterruptType, PinDriver, Pull};
    use esp_idf_hal::prelude::*;
    use gps_rfid_node::net;
    use gps_rfid_node::rfid_spi::Mfrc522Reader;
    use gps_rfid_node::uart_link::GpsUart;

    // ESP-IDF 运行时初始化（链接补丁 & 日志）
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("GPS/RFID node booting (ESP-IDF)...");
    let config = NodeConfig::from_build_env()?;

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    // 先连网（静态地址），失败即终止
    let _wifi = net::connect_wifi(peripherals.modem, &config)?;

    // GPS：UART2，TX=17 / RX=16
    let uart = GpsUart::new(peripherals.uart2, pins.gpio17, pins.gpio16, config.gps_baud)?;

    // 读卡器：SCK=18 MOSI=23 MISO=19 CS=4 RST=5
    let reader = Mfrc522Reader::new(
        peripherals.spi2,
        pins.gpio18,
        pins.gpio23,
        pins.gpio19,
        pins.gpio4,
        pins.gpio5.downgrade_output(),
    )?;

    // BOOT 键下降沿作为关机中断
    let shutdown = ShutdownFlag::new();
    let mut button = PinDriver::input(pins.gpio0)?;
    button.set_pull(Pull::Up)?;
    button.set_interrupt_type(InterruptType::NegEdge)?;
    let flag = shutdown.clone();
    unsafe {
        button.subscribe(move || flag.request())?;
    }
    button.enable_interrupt()?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.http_port));
    let listener = RequestListener::bind(addr, config.recv_timeout)?;
    let mut node = Node::new(
        uart,
        listener,
        ScanDevice::new(reader, config.scan_timeout),
        config.recv_window,
        config.tick_interval,
    );
    node.run(&shutdown);
    Ok(())
}

/// 主机模拟：回环监听 + 脚本化 GPS 与读卡器。
#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use gps_rfid_node::sim::{ScriptedReader, ScriptedUart};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("GPS/RFID node booting (host simulation)...");

    let mut config = NodeConfig::from_build_env()?;
    if option_env!("HTTP_PORT").is_none() {
        config.http_port = 8080;
    }

    let mut uart = ScriptedUart::new();
    for sentence in [
        "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n",
        "$GPGSV,2,1,08,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*75\r\n",
        "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n",
    ] {
        uart.push_bytes(sentence.as_bytes());
    }
    let reader = ScriptedReader::always(vec![0xDE, 0xAD, 0xBE, 0xEF]);

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.http_port));
    let listener = RequestListener::bind(addr, config.recv_timeout)?;
    let mut node = Node::new(
        uart,
        listener,
        ScanDevice::new(reader, config.scan_timeout),
        config.recv_window,
        config.tick_interval,
    );

    // Ctrl-C / SIGTERM 仅置位标志，由主循环完成关机
    let shutdown = ShutdownFlag::new();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, shutdown.handle())?;
    }
    node.run(&shutdown);
    Ok(())
}
