use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

/// 单个客户端连接：一次请求/响应后关闭，无 keep-alive。
pub trait Connection: Read + Write {
    fn close(self);
}

/// 非阻塞 accept 的结果：无连接时返回 WouldBlock 而不是错误。
#[derive(Debug)]
pub enum Accept<C> {
    Ready(C, SocketAddr),
    WouldBlock,
}

/// 监听端抽象（进程内唯一，关机时释放一次）。
pub trait Acceptor {
    type Conn: Connection;

    fn accept(&mut self) -> io::Result<Accept<Self::Conn>>;

    fn close(self);
}

impl Connection for TcpStream {
    fn close(self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// 基于 TcpListener 的非阻塞监听器。
pub struct RequestListener {
    inner: TcpListener,
    recv_timeout: Duration,
}

impl RequestListener {
    /// 绑定地址并切换为非阻塞模式。
    pub fn bind(addr: SocketAddr, recv_timeout: Duration) -> io::Result<Self> {
        let inner = TcpListener::bind(addr)?;
        inner.set_nonblocking(true)?;
        log::info!("Server started on {}", inner.local_addr()?);
        Ok(Self { inner, recv_timeout })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl Acceptor for RequestListener {
    type Conn = TcpStream;

    fn accept(&mut self) -> io::Result<Accept<TcpStream>> {
        match self.inner.accept() {
            Ok((stream, peer)) => {
                // 客户端读取改回阻塞，但受超时约束
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(self.recv_timeout))?;
                Ok(Accept::Ready(stream, peer))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Accept::WouldBlock),
            Err(err) => Err(err),
        }
    }

    fn close(self) {
        drop(self.inner);
    }
}

/// 单次有界接收请求头（不读取请求体）。
pub fn read_request<C: Read>(conn: &mut C, window: usize) -> io::Result<String> {
    let mut buf = vec![0u8; window];
    let count = conn.read(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf[..count]).into_owned())
}
