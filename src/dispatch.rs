use std::io::{self, Write};

use serde::Serialize;

use crate::listener::Connection;
use crate::rfid::TagScanner;

/// 固定响应头：不区分结果，一律 200。
pub const RESPONSE_HEAD: &str = "HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n";

/// 已声明的路由。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    TriggerScan,
}

/// 路由表（按路径精确匹配，不限方法）。
pub const ROUTES: &[(&str, Route)] = &[("/trigger_rfid", Route::TriggerScan)];

/// 请求行（方法 + 路径，已去掉查询串）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub path: &'a str,
}

impl<'a> RequestLine<'a> {
    /// 解析请求首行；格式不完整时返回 None。
    pub fn parse(request: &'a str) -> Option<Self> {
        let first = request.lines().next()?;
        let mut parts = first.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;
        let path = target.split(['?', '#']).next().unwrap_or(target);
        Some(Self { method, path })
    }

    pub fn route(&self) -> Option<Route> {
        ROUTES
            .iter()
            .find(|(path, _)| *path == self.path)
            .map(|(_, route)| *route)
    }
}

/// 单次刷卡的结果。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// 返回给客户端的 JSON 载荷。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Scan(ScanResult),
    Error { error: &'static str },
}

impl Payload {
    pub fn invalid_endpoint() -> Self {
        Payload::Error {
            error: "Invalid endpoint",
        }
    }

    /// 序列化为 `{"key": value, ...}` 形式（分隔符后带空格）。
    pub fn to_json_string(&self) -> String {
        let mut buf = Vec::with_capacity(64);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
        if self.serialize(&mut ser).is_err() {
            return "{}".to_string();
        }
        String::from_utf8(buf).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 紧凑输出，但 `:` 与 `,` 后各留一个空格。
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// 请求分发器：路由 -> 动作 -> JSON 响应，然后关闭连接。
pub struct Dispatcher<S> {
    scanner: S,
}

impl<S: TagScanner> Dispatcher<S> {
    pub fn new(scanner: S) -> Self {
        Self { scanner }
    }

    pub fn scanner_mut(&mut self) -> &mut S {
        &mut self.scanner
    }

    /// 按请求生成载荷（刷卡路由会同步阻塞到读卡完成或超时）。
    pub fn respond(&mut self, request: &str) -> Payload {
        let route = RequestLine::parse(request).and_then(|line| line.route());
        match route {
            Some(Route::TriggerScan) => match self.scanner.scan() {
                Ok(uid) => Payload::Scan(ScanResult {
                    success: true,
                    uid: Some(uid.to_hex()),
                }),
                Err(err) => {
                    log::warn!("RFID scan failed: {}", err);
                    Payload::Scan(ScanResult {
                        success: false,
                        uid: None,
                    })
                }
            },
            None => Payload::invalid_endpoint(),
        }
    }

    /// 处理一个连接；无论写入成功与否都会关闭连接。
    pub fn handle<C: Connection>(&mut self, mut conn: C, request: &str) -> io::Result<Payload> {
        let payload = self.respond(request);
        let written = write_response(&mut conn, &payload);
        conn.close();
        written.map(|_| payload)
    }
}

fn write_response<W: Write>(out: &mut W, payload: &Payload) -> io::Result<()> {
    out.write_all(RESPONSE_HEAD.as_bytes())?;
    out.write_all(payload.to_json_string().as_bytes())?;
    out.flush()
}
