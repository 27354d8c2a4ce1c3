//! 脚本化的硬件替身：主机模拟运行与单元测试共用。

use std::collections::VecDeque;

use crate::gps::UartPort;
use crate::rfid::{PcdError, PiccReader};

/// 模拟的 UART 故障。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimFault;

enum UartEvent {
    Bytes(VecDeque<u8>),
    Fault,
}

/// 按块推入字节的 UART；每块代表某个周期内到达的数据，块尾视为暂无更多数据。
#[derive(Default)]
pub struct ScriptedUart {
    events: VecDeque<UartEvent>,
}

impl ScriptedUart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.events.push_back(UartEvent::Bytes(bytes.iter().copied().collect()));
    }

    pub fn push_fault(&mut self) {
        self.events.push_back(UartEvent::Fault);
    }

    pub fn is_drained(&self) -> bool {
        self.events.iter().all(|event| match event {
            UartEvent::Bytes(bytes) => bytes.is_empty(),
            UartEvent::Fault => false,
        })
    }
}

impl UartPort for ScriptedUart {
    type Error = SimFault;

    fn pending(&mut self) -> Result<usize, SimFault> {
        while let Some(UartEvent::Bytes(bytes)) = self.events.front() {
            if !bytes.is_empty() {
                return Ok(bytes.len());
            }
            self.events.pop_front();
        }
        match self.events.pop_front() {
            Some(UartEvent::Fault) => Err(SimFault),
            _ => Ok(0),
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SimFault> {
        let Some(UartEvent::Bytes(bytes)) = self.events.front_mut() else {
            return Ok(0);
        };
        if bytes.is_empty() {
            self.events.pop_front();
            return Ok(0);
        }
        let count = buf.len().min(bytes.len());
        for (slot, byte) in buf.iter_mut().zip(bytes.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

/// 一次寻卡尝试的模拟结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderResponse {
    NoTag,
    AnticollisionFails,
    Tag(Vec<u8>),
}

/// 按脚本返回结果的读卡器；脚本耗尽后一直报告无卡。
pub struct ScriptedReader {
    script: VecDeque<ReaderResponse>,
    current: Option<ReaderResponse>,
    repeat_last: bool,
    requests: usize,
    anticollisions: usize,
}

impl ScriptedReader {
    pub fn new(script: Vec<ReaderResponse>) -> Self {
        Self {
            script: script.into(),
            current: None,
            repeat_last: false,
            requests: 0,
            anticollisions: 0,
        }
    }

    /// 射频场内始终没有卡。
    pub fn empty_field() -> Self {
        Self::new(Vec::new())
    }

    /// 每次寻卡都读到同一张卡。
    pub fn always(uid: Vec<u8>) -> Self {
        let mut reader = Self::new(vec![ReaderResponse::Tag(uid)]);
        reader.repeat_last = true;
        reader
    }

    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn anticollisions(&self) -> usize {
        self.anticollisions
    }

    fn next_response(&mut self) -> ReaderResponse {
        if self.repeat_last && self.script.len() == 1 {
            if let Some(last) = self.script.front() {
                return last.clone();
            }
        }
        self.script.pop_front().unwrap_or(ReaderResponse::NoTag)
    }
}

impl PiccReader for ScriptedReader {
    fn request_idle(&mut self) -> Result<(), PcdError> {
        self.requests += 1;
        match self.next_response() {
            ReaderResponse::NoTag => {
                self.current = None;
                Err(PcdError::NoTag)
            }
            response => {
                self.current = Some(response);
                Ok(())
            }
        }
    }

    fn anticollision(&mut self) -> Result<Vec<u8>, PcdError> {
        self.anticollisions += 1;
        match self.current.take() {
            Some(ReaderResponse::Tag(uid)) => Ok(uid),
            Some(_) => Err(PcdError::Collision),
            None => Err(PcdError::NoTag),
        }
    }
}
