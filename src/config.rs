use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

pub use crate::build_env::BUILD_ENV_KEYS;

/// 节点运行参数（编译期由 .env 注入，缺省时使用默认值）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub static_ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub http_port: u16,
    pub gps_baud: u32,
    pub tick_interval: Duration,
    pub recv_window: usize,
    /// 单次接收请求头的超时。
    pub recv_timeout: Duration,
    /// `None` 表示无限等待刷卡（扫描期间整个循环挂起）。
    pub scan_timeout: Option<Duration>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            static_ip: Ipv4Addr::new(192, 168, 1, 18),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns: Ipv4Addr::new(8, 8, 8, 8),
            http_port: 80,
            gps_baud: 9600,
            tick_interval: Duration::from_millis(100),
            recv_window: 1024,
            recv_timeout: Duration::from_secs(2),
            scan_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid {}: {:?}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl NodeConfig {
    /// 读取 build.rs 注入的编译期配置（键集合见 [`BUILD_ENV_KEYS`]）。
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            let value = match key {
                "WIFI_SSID" => option_env!("WIFI_SSID"),
                "WIFI_PASS" => option_env!("WIFI_PASS"),
                "STATIC_IP" => option_env!("STATIC_IP"),
                "NETMASK" => option_env!("NETMASK"),
                "GATEWAY" => option_env!("GATEWAY"),
                "DNS" => option_env!("DNS"),
                "HTTP_PORT" => option_env!("HTTP_PORT"),
                "SCAN_TIMEOUT_SECS" => option_env!("SCAN_TIMEOUT_SECS"),
                "TICK_MS" => option_env!("TICK_MS"),
                _ => None,
            };
            value.map(str::to_string)
        })
    }

    /// 通过任意键值查询构建配置，未提供的键保持默认值。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(ssid) = lookup("WIFI_SSID") {
            config.wifi_ssid = ssid;
        }
        if let Some(pass) = lookup("WIFI_PASS") {
            config.wifi_pass = pass;
        }
        parse_into(&lookup, "STATIC_IP", &mut config.static_ip)?;
        parse_into(&lookup, "NETMASK", &mut config.netmask)?;
        parse_into(&lookup, "GATEWAY", &mut config.gateway)?;
        parse_into(&lookup, "DNS", &mut config.dns)?;
        parse_into(&lookup, "HTTP_PORT", &mut config.http_port)?;

        let mut tick_ms = config.tick_interval.as_millis() as u64;
        parse_into(&lookup, "TICK_MS", &mut tick_ms)?;
        config.tick_interval = Duration::from_millis(tick_ms);

        let mut timeout_secs = config.scan_timeout.map(|d| d.as_secs()).unwrap_or(0);
        parse_into(&lookup, "SCAN_TIMEOUT_SECS", &mut timeout_secs)?;
        // 0 = 不设超时
        config.scan_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        if !is_contiguous_mask(config.netmask) {
            return Err(ConfigError::Invalid {
                key: "NETMASK",
                value: config.netmask.to_string(),
            });
        }
        Ok(config)
    }

    /// 子网掩码前缀长度（255.255.255.0 -> 24）。
    pub fn netmask_prefix(&self) -> u8 {
        u32::from(self.netmask).count_ones() as u8
    }
}

fn parse_into<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    *slot = trimmed
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw.clone() })?;
    Ok(())
}

fn is_contiguous_mask(mask: Ipv4Addr) -> bool {
    let bits = u32::from(mask);
    bits.leading_ones() + bits.trailing_zeros() == 32
}
