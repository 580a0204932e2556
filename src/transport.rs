//! Byte-stream transport over TCP or Unix-domain sockets.
//!
//! Provides a uniform interface over both socket families and splits an
//! established connection into an owned read half and an owned, buffered
//! write half so the reader and writer tasks can run independently.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadBuf};
use tokio::net::{tcp, TcpStream};
#[cfg(unix)]
use tokio::net::{unix, UnixStream};

use crate::cmd::Query;
use crate::connection::ConnectInfo;
use crate::decoder;
use crate::encoder;
use crate::error::{RedisError, RedisResult};
use crate::value::Value;

const READ_BUFFER_CAPACITY: usize = 4096;

/// Read half of a server connection.
pub(crate) enum ReadHalf {
    Tcp(tcp::OwnedReadHalf),
    #[cfg(unix)]
    Unix(unix::OwnedReadHalf),
}

/// Buffered write half of a server connection.
pub(crate) enum WriteHalf {
    Tcp(BufWriter<tcp::OwnedWriteHalf>),
    #[cfg(unix)]
    Unix(BufWriter<unix::OwnedWriteHalf>),
}

impl AsyncRead for ReadHalf {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ReadHalf::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            ReadHalf::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for WriteHalf {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            WriteHalf::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            WriteHalf::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            WriteHalf::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            WriteHalf::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            WriteHalf::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            WriteHalf::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Open a connection per the config: a non-empty `path` selects a
/// Unix-domain socket, otherwise TCP to `host:port`.
pub(crate) async fn connect(info: &ConnectInfo) -> RedisResult<(RedisReader, RedisWriter)> {
    if !info.path.is_empty() {
        return connect_unix(info).await;
    }

    let stream = TcpStream::connect((info.host.as_str(), info.port)).await?;
    // Pipelined small writes; don't let Nagle batch them.
    stream.set_nodelay(true)?;
    let (read, write) = stream.into_split();

    Ok((
        RedisReader::new(ReadHalf::Tcp(read)),
        RedisWriter::new(WriteHalf::Tcp(BufWriter::new(write))),
    ))
}

#[cfg(unix)]
async fn connect_unix(info: &ConnectInfo) -> RedisResult<(RedisReader, RedisWriter)> {
    let stream = UnixStream::connect(&info.path).await?;
    let (read, write) = stream.into_split();

    Ok((
        RedisReader::new(ReadHalf::Unix(read)),
        RedisWriter::new(WriteHalf::Unix(BufWriter::new(write))),
    ))
}

#[cfg(not(unix))]
async fn connect_unix(_info: &ConnectInfo) -> RedisResult<(RedisReader, RedisWriter)> {
    Err(RedisError::Connection(
        "Unix-domain sockets are not supported on this platform".into(),
    ))
}

/// Decoding side: owns the read half and its buffer.
pub(crate) struct RedisReader {
    stream: ReadHalf,
    buf: BytesMut,
}

impl RedisReader {
    fn new(stream: ReadHalf) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// Read one complete reply, pulling more bytes from the socket as
    /// needed.
    pub(crate) async fn read_reply(&mut self) -> RedisResult<Value> {
        loop {
            if !self.buf.is_empty() {
                match decoder::decode(&self.buf) {
                    Ok((value, consumed)) => {
                        let _ = self.buf.split_to(consumed);
                        return Ok(value);
                    }
                    Err(RedisError::Incomplete) => {}
                    Err(err) => return Err(err),
                }
            }

            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(RedisError::Disconnected);
            }
        }
    }
}

/// Encoding side: owns the buffered write half.
pub(crate) struct RedisWriter {
    stream: WriteHalf,
    scratch: BytesMut,
}

impl RedisWriter {
    fn new(stream: WriteHalf) -> Self {
        Self {
            stream,
            scratch: BytesMut::with_capacity(256),
        }
    }

    pub(crate) async fn write_query(&mut self, query: &Query) -> RedisResult<()> {
        self.scratch.clear();
        encoder::encode_query(query, &mut self.scratch);
        self.stream.write_all(&self.scratch).await?;
        Ok(())
    }

    pub(crate) async fn flush(&mut self) -> RedisResult<()> {
        self.stream.flush().await?;
        Ok(())
    }
}
