use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::dispatch::Dispatcher;
use crate::gps::{GpsPoll, SerialLineReader, UartPort};
use crate::listener::{read_request, Accept, Acceptor};
use crate::rfid::TagScanner;

/// 外部关机信号（中断/按键处理函数中置位）。
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 底层原子标志，供信号处理函数直接置位。
    pub fn handle(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Running,
    ShuttingDown,
}

/// 一个调度周期内发生的事情。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub gps: GpsPoll,
    pub served_client: bool,
}

/// 节点上下文：持有 GPS 串口、监听器与分发器，由协作式循环驱动。
pub struct Node<U, L, S> {
    gps: SerialLineReader<U>,
    listener: Option<L>,
    dispatcher: Dispatcher<S>,
    recv_window: usize,
    tick_interval: Duration,
    state: NodeState,
}

impl<U, L, S> Node<U, L, S>
where
    U: UartPort,
    L: Acceptor,
    S: TagScanner,
{
    /// 监听器已绑定后构建节点，初始状态为 Running。
    pub fn new(uart: U, listener: L, scanner: S, recv_window: usize, tick_interval: Duration) -> Self {
        Self {
            gps: SerialLineReader::new(uart),
            listener: Some(listener),
            dispatcher: Dispatcher::new(scanner),
            recv_window,
            tick_interval,
            state: NodeState::Running,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// 一个周期：先排空 GPS，再尝试 accept（可能因刷卡阻塞）。
    pub fn tick(&mut self) -> TickReport {
        let gps = self.gps.poll();
        let served_client = self.serve_pending();
        TickReport { gps, served_client }
    }

    fn serve_pending(&mut self) -> bool {
        let Some(listener) = self.listener.as_mut() else {
            return false;
        };
        let (mut conn, peer) = match listener.accept() {
            Ok(Accept::Ready(conn, peer)) => (conn, peer),
            Ok(Accept::WouldBlock) => return false,
            Err(err) => {
                log::warn!("accept failed: {}", err);
                return false;
            }
        };
        log::info!("Client connected from {}", peer);
        let request = match read_request(&mut conn, self.recv_window) {
            Ok(request) => request,
            Err(err) => {
                log::warn!("request read from {} failed: {}", peer, err);
                return true;
            }
        };
        if let Err(err) = self.dispatcher.handle(conn, &request) {
            log::warn!("response to {} failed: {}", peer, err);
        }
        true
    }

    /// 进入关机：释放监听器（仅一次）。
    pub fn shutdown(&mut self) {
        if self.state == NodeState::ShuttingDown {
            return;
        }
        log::info!("Shutting down...");
        self.state = NodeState::ShuttingDown;
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
    }

    /// 主循环：直到收到关机信号。
    pub fn run(&mut self, shutdown: &ShutdownFlag) {
        while self.state == NodeState::Running {
            if shutdown.is_requested() {
                self.shutdown();
                break;
            }
            self.tick();
            // 短暂让出处理器
            thread::sleep(self.tick_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Connection;
    use crate::rfid::ScanDevice;
    use crate::sim::{ScriptedReader, ScriptedUart, SimFault};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::rc::Rc;

    type CallLog = Rc<RefCell<Vec<&'static str>>>;

    /// 记录调用顺序的 UART。
    struct TracingUart {
        log: CallLog,
        inner: ScriptedUart,
    }

    impl UartPort for TracingUart {
        type Error = SimFault;

        fn pending(&mut self) -> Result<usize, SimFault> {
            self.log.borrow_mut().push("gps");
            self.inner.pending()
        }

        fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SimFault> {
            self.inner.read_available(buf)
        }
    }

    struct MemoryConn {
        request: io::Cursor<Vec<u8>>,
        response: Rc<RefCell<Vec<u8>>>,
    }

    impl Read for MemoryConn {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.request.read(buf)
        }
    }

    impl Write for MemoryConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.response.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for MemoryConn {
        fn close(self) {}
    }

    type Responses = Rc<RefCell<Vec<Rc<RefCell<Vec<u8>>>>>>;

    /// 按脚本返回连接，脚本耗尽后一直 WouldBlock。
    struct ScriptedListener {
        log: CallLog,
        pending: VecDeque<&'static str>,
        responses: Responses,
        closed: Rc<RefCell<usize>>,
        shutdown_after: Option<(usize, ShutdownFlag)>,
        accepts: usize,
    }

    impl ScriptedListener {
        fn new(log: CallLog) -> Self {
            Self {
                log,
                pending: VecDeque::new(),
                responses: Rc::default(),
                closed: Rc::default(),
                shutdown_after: None,
                accepts: 0,
            }
        }
    }

    impl Acceptor for ScriptedListener {
        type Conn = MemoryConn;

        fn accept(&mut self) -> io::Result<Accept<MemoryConn>> {
            self.log.borrow_mut().push("accept");
            self.accepts += 1;
            if let Some((limit, flag)) = &self.shutdown_after {
                if self.accepts >= *limit {
                    flag.request();
                }
            }
            let Some(request) = self.pending.pop_front() else {
                return Ok(Accept::WouldBlock);
            };
            let response = Rc::new(RefCell::new(Vec::new()));
            self.responses.borrow_mut().push(response.clone());
            let conn = MemoryConn {
                request: io::Cursor::new(request.as_bytes().to_vec()),
                response,
            };
            let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 40000);
            Ok(Accept::Ready(conn, peer))
        }

        fn close(self) {
            *self.closed.borrow_mut() += 1;
        }
    }

    fn node_with(
        log: &CallLog,
        uart: ScriptedUart,
        listener: ScriptedListener,
        reader: ScriptedReader,
    ) -> Node<TracingUart, ScriptedListener, ScanDevice<ScriptedReader>> {
        let uart = TracingUart {
            log: log.clone(),
            inner: uart,
        };
        Node::new(uart, listener, ScanDevice::new(reader, None), 1024, Duration::ZERO)
    }

    #[test]
    fn gps_is_polled_before_accept_every_tick() {
        let log: CallLog = Rc::default();
        let mut uart = ScriptedUart::new();
        uart.push_bytes(b"$GPGGA,1\r\n");
        uart.push_bytes(b"$GPGSV,2\r\n");
        let mut listener = ScriptedListener::new(log.clone());
        listener.pending.push_back("GET /nope HTTP/1.0\r\n\r\n");
        let mut node = node_with(&log, uart, listener, ScriptedReader::empty_field());

        for _ in 0..6 {
            node.tick();
        }

        let calls = log.borrow();
        assert_eq!(calls.len(), 12);
        for pair in calls.chunks(2) {
            assert_eq!(pair, ["gps", "accept"]);
        }
    }

    #[test]
    fn idle_tick_returns_without_blocking() {
        let log: CallLog = Rc::default();
        let listener = ScriptedListener::new(log.clone());
        let mut node = node_with(&log, ScriptedUart::new(), listener, ScriptedReader::empty_field());
        let report = node.tick();
        assert_eq!(
            report,
            TickReport {
                gps: GpsPoll::Idle,
                served_client: false
            }
        );
        assert_eq!(node.state(), NodeState::Running);
    }

    #[test]
    fn tick_serves_scan_request() {
        let log: CallLog = Rc::default();
        let mut listener = ScriptedListener::new(log.clone());
        listener.pending.push_back("GET /trigger_rfid HTTP/1.0\r\n\r\n");
        let reader = ScriptedReader::always(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let responses = listener.responses.clone();
        let mut node = node_with(&log, ScriptedUart::new(), listener, reader);

        let report = node.tick();
        assert!(report.served_client);

        let response = responses.borrow()[0].borrow().clone();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
        let body = text.split("\r\n\r\n").nth(1).unwrap();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value, serde_json::json!({"success": true, "uid": "DEADBEEF"}));
    }

    #[test]
    fn shutdown_releases_listener_once_and_stops_ticking() {
        let log: CallLog = Rc::default();
        let flag = ShutdownFlag::new();
        let mut listener = ScriptedListener::new(log.clone());
        listener.shutdown_after = Some((3, flag.clone()));
        let closed = listener.closed.clone();
        let mut node = node_with(&log, ScriptedUart::new(), listener, ScriptedReader::empty_field());

        node.run(&flag);

        assert_eq!(node.state(), NodeState::ShuttingDown);
        assert_eq!(*closed.borrow(), 1);
        let accepts = log.borrow().iter().filter(|call| **call == "accept").count();
        assert_eq!(accepts, 3);

        // 再次关机或 tick 不会重复释放
        node.shutdown();
        let report = node.tick();
        assert!(!report.served_client);
        assert_eq!(*closed.borrow(), 1);
    }

    #[test]
    fn run_exits_immediately_when_already_signalled() {
        let log: CallLog = Rc::default();
        let listener = ScriptedListener::new(log.clone());
        let closed = listener.closed.clone();
        let mut node = node_with(&log, ScriptedUart::new(), listener, ScriptedReader::empty_field());
        let flag = ShutdownFlag::new();
        flag.request();

        node.run(&flag);

        assert!(log.borrow().is_empty());
        assert_eq!(*closed.borrow(), 1);
    }

    #[test]
    fn raw_handle_stops_the_loop() {
        let log: CallLog = Rc::default();
        let flag = ShutdownFlag::new();
        let listener = ScriptedListener::new(log.clone());
        let closed = listener.closed.clone();
        let mut node = node_with(&log, ScriptedUart::new(), listener, ScriptedReader::empty_field());

        // 信号处理函数持有的是 Arc<AtomicBool>，与 flag 共享同一状态
        let handle = flag.handle();
        assert!(!flag.is_requested());
        handle.store(true, Ordering::SeqCst);
        assert!(flag.is_requested());

        node.run(&flag);
        assert_eq!(node.state(), NodeState::ShuttingDown);
        assert_eq!(*closed.borrow(), 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn gps_faults_do_not_stop_the_loop() {
        let log: CallLog = Rc::default();
        let mut uart = ScriptedUart::new();
        uart.push_fault();
        uart.push_bytes(&[0xFF, 0xFE, b'\n']);
        uart.push_bytes(b"$GPRMC,1\r\n");
        let listener = ScriptedListener::new(log.clone());
        let mut node = node_with(&log, uart, listener, ScriptedReader::empty_field());

        assert_eq!(node.tick().gps, GpsPoll::Fault);
        assert!(matches!(node.tick().gps, GpsPoll::Line(_)));
        assert!(matches!(node.tick().gps, GpsPoll::Line(_)));
        assert_eq!(node.tick().gps, GpsPoll::Idle);
        assert_eq!(node.state(), NodeState::Running);
    }
}
