use core::convert::TryInto;
use std::fmt;

use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::modem::Modem;
use esp_idf_hal::sys::EspError;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::ipv4::{
    ClientConfiguration as IpClientConfiguration, ClientSettings, Configuration as IpConfiguration, Mask,
    Subnet,
};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration, NetifStack};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi, WifiDriver};

use crate::config::NodeConfig;

#[derive(Debug)]
pub enum NetError {
    Esp(EspError),
    Credentials(&'static str),
}

impl From<EspError> for NetError {
    fn from(err: EspError) -> Self {
        NetError::Esp(err)
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Esp(err) => write!(f, "esp error: {}", err),
            NetError::Credentials(what) => write!(f, "invalid Wi-Fi {}", what),
        }
    }
}

impl std::error::Error for NetError {}

/// 固定 IPv4 地址的 STA 网卡配置。
fn static_netif(config: &NodeConfig) -> Result<EspNetif, EspError> {
    let ip_configuration = IpConfiguration::Client(IpClientConfiguration::Fixed(ClientSettings {
        ip: config.static_ip,
        subnet: Subnet {
            gateway: config.gateway,
            mask: Mask(config.netmask_prefix()),
        },
        dns: Some(config.dns),
        secondary_dns: None,
    }));
    EspNetif::new_with_conf(&NetifConfiguration {
        ip_configuration: Some(ip_configuration),
        ..NetifConfiguration::wifi_default_client()
    })
}

/// 连接预配置的无线网络并设置静态地址；阻塞直到网卡就绪。
pub fn connect_wifi(modem: Modem, config: &NodeConfig) -> Result<BlockingWifi<EspWifi<'static>>, NetError> {
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take().ok();
    let driver = WifiDriver::new(modem, sys_loop.clone(), nvs)?;
    let esp_wifi = EspWifi::wrap_all(driver, static_netif(config)?, EspNetif::new(NetifStack::Ap)?)?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let auth_method = if config.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    let wifi_configuration: Configuration = Configuration::Client(ClientConfiguration {
        ssid: config
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| NetError::Credentials("ssid"))?,
        bssid: None,
        auth_method,
        password: config
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| NetError::Credentials("password"))?,
        channel: None,
        ..Default::default()
    });

    wifi.set_configuration(&wifi_configuration)?;
    wifi.start()?;
    log::info!("Wi-Fi started");
    wifi.connect()?;
    log::info!("Wi-Fi connected to {}", config.wifi_ssid);
    wifi.wait_netif_up()?;
    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    log::info!("Static IP set to: {}", ip_info.ip);
    Ok(wifi)
}
