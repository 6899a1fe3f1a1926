//! Network front end.
//!
//! One TCP listener and one UDP socket share the port. TCP connections
//! may carry several length-framed requests back to back; every UDP
//! datagram is one request. All requests funnel into the dispatcher.

use crate::dispatch::Dispatcher;
use raida_proto::frame::MAX_BODY_SIZE;
use raida_proto::header::REQUEST_HEADER_SIZE;
use raida_core::bytes::read_u16_be_at;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct Server {
    dispatcher: Arc<Dispatcher>,
    tcp: TcpListener,
    udp: Arc<UdpSocket>,
}

impl Server {
    /// Bind both sockets on the given port
    pub async fn bind(dispatcher: Arc<Dispatcher>, port: u16) -> std::io::Result<Server> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let tcp = TcpListener::bind(addr).await?;
        let udp = Arc::new(UdpSocket::bind(addr).await?);
        info!(%addr, "listening");
        Ok(Server {
            dispatcher,
            tcp,
            udp,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn udp_local_addr(&self) -> std::io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Serve until the shutdown signal flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let udp_dispatcher = Arc::clone(&self.dispatcher);
        let udp_socket = Arc::clone(&self.udp);
        let mut udp_shutdown = shutdown.clone();
        let udp_task = tokio::spawn(async move {
            let mut buf = vec![0u8; REQUEST_HEADER_SIZE + MAX_BODY_SIZE];
            loop {
                tokio::select! {
                    _ = udp_shutdown.changed() => break,
                    received = udp_socket.recv_from(&mut buf) => {
                        let (len, from) = match received {
                            Ok(r) => r,
                            Err(e) => {
                                warn!("udp receive failed: {e}");
                                continue;
                            }
                        };
                        let request = buf[..len].to_vec();
                        let dispatcher = Arc::clone(&udp_dispatcher);
                        let socket = Arc::clone(&udp_socket);
                        tokio::spawn(async move {
                            let response = dispatcher.handle(&request).await;
                            if let Err(e) = socket.send_to(&response, from).await {
                                debug!("udp send to {from} failed: {e}");
                            }
                        });
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.tcp.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    debug!(%peer, "connection");
                    let dispatcher = Arc::clone(&self.dispatcher);
                    tokio::spawn(async move {
                        if let Err(e) = serve_stream(dispatcher, stream).await {
                            debug!(%peer, "connection closed: {e}");
                        }
                    });
                }
            }
        }
        udp_task.abort();
        info!("server stopped");
    }
}

/// Read framed requests off one TCP connection until EOF
async fn serve_stream(
    dispatcher: Arc<Dispatcher>,
    mut stream: TcpStream,
) -> std::io::Result<()> {
    loop {
        let mut header = [0u8; REQUEST_HEADER_SIZE];
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
        let body_size = read_u16_be_at(&header, 22) as usize;
        let mut request = header.to_vec();
        if body_size > 0 {
            let mut body = vec![0u8; body_size];
            stream.read_exact(&mut body).await?;
            request.extend_from_slice(&body);
        }

        let response = dispatcher.handle(&request).await;
        if let Err(e) = stream.write_all(&response).await {
            error!("response write failed: {e}");
            return Err(e);
        }
    }
}
