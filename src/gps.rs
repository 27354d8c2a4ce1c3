use std::fmt;

/// 单行 NMEA 语句的最大长度（标准为 82 字节，留出余量）。
pub const MAX_LINE_LEN: usize = 128;

/// 非阻塞串口抽象（GPS UART）。
pub trait UartPort {
    type Error: fmt::Debug;

    /// 驱动缓冲区中待读取的字节数。
    fn pending(&mut self) -> Result<usize, Self::Error>;

    /// 读取当前可用的字节，不等待；返回 0 表示暂无数据。
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// 语句类型（只区分定位数据与推荐最小数据）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentenceKind {
    Gga,
    Rmc,
    Other,
    Undecodable,
}

impl SentenceKind {
    /// 按语句标识分类，不区分 talker（GP/GN/GL...）。
    pub fn classify(line: &str) -> Self {
        let Some(rest) = line.strip_prefix('$') else {
            return SentenceKind::Other;
        };
        match rest.get(2..5) {
            Some("GGA") => SentenceKind::Gga,
            Some("RMC") => SentenceKind::Rmc,
            _ => SentenceKind::Other,
        }
    }

    pub fn is_relevant(self) -> bool {
        matches!(self, SentenceKind::Gga | SentenceKind::Rmc)
    }
}

/// 一行 GPS 原始文本，读取后立即记录并丢弃。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpsLine {
    pub raw: String,
    pub sentence_kind: SentenceKind,
}

impl GpsLine {
    /// 解码并分类；非法 UTF-8 标记为 Undecodable。
    pub fn decode(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                let raw = text.trim().to_string();
                let sentence_kind = SentenceKind::classify(&raw);
                Self { raw, sentence_kind }
            }
            Err(_) => Self {
                raw: String::from_utf8_lossy(bytes).trim().to_string(),
                sentence_kind: SentenceKind::Undecodable,
            },
        }
    }
}

/// 单次轮询结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GpsPoll {
    Idle,
    Line(GpsLine),
    Fault,
}

/// GPS 行读取器：每个调度周期最多取一行，绝不阻塞、绝不向外抛错。
pub struct SerialLineReader<U> {
    uart: U,
}

impl<U: UartPort> SerialLineReader<U> {
    pub fn new(uart: U) -> Self {
        Self { uart }
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    /// 轮询一次：无数据立即返回，有数据则读一行、解码并记录日志。
    pub fn poll(&mut self) -> GpsPoll {
        match self.read_line() {
            Ok(None) => GpsPoll::Idle,
            Ok(Some(bytes)) => {
                let line = GpsLine::decode(&bytes);
                log_line(&line);
                GpsPoll::Line(line)
            }
            Err(err) => {
                log::warn!("GPS read error: {:?}", err);
                GpsPoll::Fault
            }
        }
    }

    /// 读取至换行符或缓冲区耗尽；跨周期的半行不做拼接。
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, U::Error> {
        if self.uart.pending()? == 0 {
            return Ok(None);
        }
        let mut line = Vec::with_capacity(MAX_LINE_LEN);
        let mut byte = [0u8; 1];
        while line.len() < MAX_LINE_LEN {
            if self.uart.read_available(&mut byte)? == 0 {
                break;
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

fn log_line(line: &GpsLine) {
    match line.sentence_kind {
        SentenceKind::Undecodable => log::warn!("GPS decoding error"),
        kind => {
            log::info!("{}", line.raw);
            if kind.is_relevant() {
                log::info!("Relevant GPS data: {}", line.raw);
            }
        }
    }
}
