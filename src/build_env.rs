//! 允许由 .env 注入的编译期配置键（build.rs 与 `config` 共用）。

pub const BUILD_ENV_KEYS: &[&str] = &[
    "WIFI_SSID",
    "WIFI_PASS",
    "STATIC_IP",
    "NETMASK",
    "GATEWAY",
    "DNS",
    "HTTP_PORT",
    "SCAN_TIMEOUT_SECS",
    "TICK_MS",
];
