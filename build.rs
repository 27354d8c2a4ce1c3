use std::env;
use std::fs;

#[path = "src/build_env.rs"]
mod build_env;

use build_env::BUILD_ENV_KEYS;

const ENV_PATH: &str = ".env";

fn main() {
    // 仅在 ESP-IDF 目标上初始化构建环境变量（主机构建跳过）
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
    println!("cargo:rerun-if-changed={}", ENV_PATH);

    match fs::read_to_string(ENV_PATH) {
        Ok(contents) => {
            for (key, value) in contents.lines().filter_map(parse_assignment) {
                if BUILD_ENV_KEYS.contains(&key) {
                    println!("cargo:rustc-env={}={}", key, value);
                } else {
                    println!("cargo:warning=ignoring unknown .env key {}", key);
                }
            }
        }
        Err(_) => {
            println!("cargo:warning=no .env found; node uses built-in defaults and an empty WIFI_SSID");
        }
    }
}

/// `[export ]KEY=VALUE`，值可带双引号；注释与空行返回 None。
fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let (key, value) = line.trim_start_matches("export ").split_once('=')?;
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value);
    Some((key.trim(), value))
}
