use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::parser::LogRecordParser;
use crate::models::LogRecord;

/// Receives syslog datagrams over UDP and parses them into records
pub struct SyslogListener {
    socket: UdpSocket,
    parser: LogRecordParser,
    received: usize,
}

impl SyslogListener {
    /// Bind a listener to `address`
    pub async fn bind(address: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(address).await?;
        Ok(SyslogListener {
            socket,
            parser: LogRecordParser::new(),
            received: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Run the listener, sending records through the channel until it closes
    pub async fn run(&mut self, tx: mpsc::Sender<LogRecord>) -> std::io::Result<()> {
        let mut buf = [0u8; 2048];

        log::info!("Syslog listener started on {}", self.local_addr()?);

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((size, peer)) => {
                    let datagram = String::from_utf8_lossy(&buf[..size]);
                    let message = strip_priority(datagram.trim());
                    if message.is_empty() {
                        continue;
                    }

                    self.received += 1;
                    let source = format!("syslog:{}", peer.ip());
                    let record = self.parser.parse_line(message, &source, self.received);
                    if tx.send(record).await.is_err() {
                        log::info!("Channel closed, stopping syslog listener");
                        break;
                    }
                }
                Err(e) => {
                    log::error!("Syslog recv error: {}", e);
                }
            }
        }

        Ok(())
    }
}

/// Drop a leading `<PRI>` field, if present
fn strip_priority(message: &str) -> &str {
    if let Some(rest) = message.strip_prefix('<') {
        if let Some(end) = rest.find('>') {
            if end <= 3 && rest[..end].chars().all(|c| c.is_ascii_digit()) {
                return &rest[end + 1..];
            }
        }
    }
    message
}
