use std::fmt;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// 读卡器（PCD）返回的非 OK 状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PcdError {
    NoTag,
    Collision,
    Device(String),
}

impl fmt::Display for PcdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PcdError::NoTag => write!(f, "no tag in field"),
            PcdError::Collision => write!(f, "tag collision"),
            PcdError::Device(msg) => write!(f, "reader error: {}", msg),
        }
    }
}

/// 非接触式读卡器的命令集（寻卡 + 防冲突）。
pub trait PiccReader {
    /// 发送 "request idle"（REQA），检测射频场内是否有卡。
    fn request_idle(&mut self) -> Result<(), PcdError>;

    /// 执行防冲突流程，返回卡片 UID 字节。
    fn anticollision(&mut self) -> Result<Vec<u8>, PcdError>;
}

/// 卡片唯一标识。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagIdentifier(Vec<u8>);

impl TagIdentifier {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// 每字节两位大写十六进制。
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in &self.0 {
            let _ = write!(out, "{:02X}", byte);
        }
        out
    }
}

impl fmt::Display for TagIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 级联标签（双倍/三倍长度 UID 的第一级以它开头）。
pub const CASCADE_TAG: u8 = 0x88;

/// 还原第一级防冲突应答：4 字节 UID 段 + BCC 校验字节（前 4 字节异或）。
///
/// 单倍长度卡即 UID 本身加 BCC；更长的 UID 第一级为 CT + 前 3 字节。
pub fn cascade_level1(uid: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5);
    if uid.len() > 4 {
        frame.push(CASCADE_TAG);
        frame.extend_from_slice(&uid[..3]);
    } else {
        frame.extend_from_slice(uid);
    }
    let bcc = frame.iter().fold(0u8, |acc, byte| acc ^ byte);
    frame.push(bcc);
    frame
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanError {
    TimedOut(Duration),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::TimedOut(after) => write!(f, "no tag presented within {:?}", after),
        }
    }
}

impl std::error::Error for ScanError {}

/// 触发一次刷卡读取（Dispatcher 依赖此接口）。
pub trait TagScanner {
    fn scan(&mut self) -> Result<TagIdentifier, ScanError>;
}

/// 扫描状态机。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    AwaitingTag { since: Instant },
}

/// 单步结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanStep {
    AwaitingTag,
    Found(TagIdentifier),
}

/// 读卡设备：驱动握手流程直到读到 UID。
pub struct ScanDevice<R> {
    reader: R,
    timeout: Option<Duration>,
    state: ScanState,
}

impl<R: PiccReader> ScanDevice<R> {
    pub fn new(reader: R, timeout: Option<Duration>) -> Self {
        Self {
            reader,
            timeout,
            state: ScanState::Idle,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// 执行一次寻卡 + 防冲突尝试；任何非 OK 状态都回到等待。
    pub fn step(&mut self) -> ScanStep {
        if self.state == ScanState::Idle {
            log::info!("Place RFID card...");
            self.state = ScanState::AwaitingTag {
                since: Instant::now(),
            };
        }
        if self.reader.request_idle().is_err() {
            return ScanStep::AwaitingTag;
        }
        match self.reader.anticollision() {
            Ok(raw_uid) => {
                let uid = TagIdentifier::new(raw_uid);
                log::info!("RFID detected: UID={}", uid);
                self.state = ScanState::Idle;
                ScanStep::Found(uid)
            }
            Err(err) => {
                log::debug!("anticollision failed: {}", err);
                ScanStep::AwaitingTag
            }
        }
    }

    /// 放弃当前等待，回到空闲。
    pub fn cancel(&mut self) {
        self.state = ScanState::Idle;
    }

    fn expired(&self) -> bool {
        match (self.state, self.timeout) {
            (ScanState::AwaitingTag { since }, Some(limit)) => since.elapsed() >= limit,
            _ => false,
        }
    }
}

impl<R: PiccReader> TagScanner for ScanDevice<R> {
    /// 紧密轮询直到读到卡或超时（无休眠，总线为本地高速设备）。
    fn scan(&mut self) -> Result<TagIdentifier, ScanError> {
        loop {
            if let ScanStep::Found(uid) = self.step() {
                return Ok(uid);
            }
            if self.expired() {
                self.cancel();
                let limit = self.timeout.unwrap_or_default();
                log::warn!("RFID scan timed out after {:?}", limit);
                return Err(ScanError::TimedOut(limit));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ReaderResponse, ScriptedReader};

    #[test]
    fn formats_uid_as_uppercase_hex() {
        let uid = TagIdentifier::new(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(uid.to_hex(), "DEADBEEF");
        assert_eq!(TagIdentifier::new(vec![0x01, 0x0a]).to_string(), "010A");
    }

    #[test]
    fn level1_frame_appends_check_byte() {
        let frame = cascade_level1(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(frame, vec![0xDE, 0xAD, 0xBE, 0xEF, 0x22]);
        assert_eq!(TagIdentifier::new(frame).to_hex(), "DEADBEEF22");

        // 7 字节 UID：CT + 前 3 字节 + BCC
        let frame = cascade_level1(&[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        assert_eq!(frame, vec![CASCADE_TAG, 0x04, 0x11, 0x22, 0x88 ^ 0x04 ^ 0x11 ^ 0x22]);
    }

    #[test]
    fn scan_returns_first_successful_handshake() {
        let reader = ScriptedReader::new(vec![
            ReaderResponse::NoTag,
            ReaderResponse::NoTag,
            ReaderResponse::AnticollisionFails,
            ReaderResponse::Tag(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        ]);
        let mut device = ScanDevice::new(reader, None);
        let uid = device.scan().unwrap();
        assert_eq!(uid.to_hex(), "DEADBEEF");
        assert_eq!(device.state(), ScanState::Idle);
        assert_eq!(device.reader_mut().requests(), 4);
        assert_eq!(device.reader_mut().anticollisions(), 2);
    }

    #[test]
    fn step_tracks_awaiting_state() {
        let reader = ScriptedReader::new(vec![
            ReaderResponse::NoTag,
            ReaderResponse::Tag(vec![0x04, 0x11, 0x22, 0x33]),
        ]);
        let mut device = ScanDevice::new(reader, None);
        assert_eq!(device.state(), ScanState::Idle);

        assert_eq!(device.step(), ScanStep::AwaitingTag);
        assert!(matches!(device.state(), ScanState::AwaitingTag { .. }));

        match device.step() {
            ScanStep::Found(uid) => assert_eq!(uid.to_hex(), "04112233"),
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(device.state(), ScanState::Idle);
    }

    #[test]
    fn bounded_scan_gives_up() {
        let mut device = ScanDevice::new(ScriptedReader::empty_field(), Some(Duration::from_millis(20)));
        let started = Instant::now();
        let err = device.scan().unwrap_err();
        assert_eq!(err, ScanError::TimedOut(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(device.state(), ScanState::Idle);
    }
}
