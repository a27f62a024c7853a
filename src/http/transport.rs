//! Byte-stream transports a connection can run over.

use crate::http::{Error, Result};
use std::io::{Read, Write};
use std::net::{Shutdown as NetShutdown, TcpStream};

/// Closes both directions of a transport from any thread, waking a
/// reader blocked on it.
pub trait Shutdown: Send + Sync {
    fn shutdown(&self);
}

/// A full-duplex byte stream that can be split into an independently owned
/// reader and writer.
pub trait Transport: Send + 'static {
    type Reader: Read + Send + 'static;
    type Writer: Write + Send + 'static;

    fn split(self) -> Result<(Self::Reader, Self::Writer, Box<dyn Shutdown>)>;

    fn is_secure(&self) -> bool {
        false
    }
}

impl Shutdown for TcpStream {
    fn shutdown(&self) {
        let _ = TcpStream::shutdown(self, NetShutdown::Both);
    }
}

impl Transport for TcpStream {
    type Reader = TcpStream;
    type Writer = TcpStream;

    fn split(self) -> Result<(TcpStream, TcpStream, Box<dyn Shutdown>)> {
        self.set_nodelay(true)?;
        let writer = self.try_clone()?;
        let closer = self.try_clone()?;

        Ok((self, writer, Box::new(closer)))
    }
}

pub fn connect_tcp(authority: &str) -> Result<TcpStream> {
    TcpStream::connect(authority)
        .map_err(|e| Error::connection(&format!("could not connect to {authority}: {e}"), None))
}

#[cfg(feature = "tls")]
pub use tls::{connect_tls, TlsTransport};

#[cfg(feature = "tls")]
mod tls {
    use super::*;
    use crate::http::error::SomeError;
    use rustls::client::InvalidDnsNameError;
    use rustls::{ClientConnection, StreamOwned};
    use std::io::ErrorKind as IoErrorKind;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    const ALPN_PROTOCOLS: &[&[u8]] = &[b"h2"];
    /// How long the reader holds the session lock before letting the writer in.
    const READ_SLICE: Duration = Duration::from_millis(20);

    type Session = StreamOwned<ClientConnection, TcpStream>;

    /// A rustls client session shared by the reader and writer halves.
    pub struct TlsTransport {
        session: Arc<Mutex<Session>>,
    }

    pub struct TlsHalf {
        session: Arc<Mutex<Session>>,
    }

    struct TlsCloser {
        socket: TcpStream,
    }

    fn client_config() -> rustls::ClientConfig {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        let mut config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

        config
    }

    /// Opens a TCP connection to `authority` and wraps it in a TLS session
    /// negotiating `h2` via ALPN.
    pub fn connect_tls(authority: &str, host: &str) -> Result<TlsTransport> {
        let socket = connect_tcp(authority)?;
        let server_name = host.try_into().map_err(|e: InvalidDnsNameError| {
            Error::connection("invalid host address", e.to_string().some_box())
        })?;
        let client = ClientConnection::new(Arc::new(client_config()), server_name)
            .map_err(|e| Error::connection("could not start tls session", e.some_box()))?;
        let mut session = StreamOwned::new(client, socket);
        while session.conn.is_handshaking() {
            session
                .conn
                .complete_io(&mut session.sock)
                .map_err(|e| Error::connection(&format!("tls handshake failed: {e}"), None))?;
        }
        if session.conn.alpn_protocol() != Some(b"h2") {
            return Err(Error::connection("server did not negotiate h2", None));
        }

        Ok(TlsTransport {
            session: Arc::new(Mutex::new(session)),
        })
    }

    impl Read for TlsHalf {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
                match session.read(buf) {
                    Err(e) if matches!(e.kind(), IoErrorKind::WouldBlock | IoErrorKind::TimedOut) => {
                        drop(session);
                        std::thread::yield_now();
                    }
                    result => return result,
                }
            }
        }
    }

    impl Write for TlsHalf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .flush()
        }
    }

    impl Shutdown for TlsCloser {
        fn shutdown(&self) {
            let _ = self.socket.shutdown(NetShutdown::Both);
        }
    }

    impl Transport for TlsTransport {
        type Reader = TlsHalf;
        type Writer = TlsHalf;

        fn split(self) -> Result<(TlsHalf, TlsHalf, Box<dyn Shutdown>)> {
            let socket = {
                let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
                session.sock.set_read_timeout(Some(READ_SLICE))?;
                session.sock.try_clone()?
            };
            let reader = TlsHalf {
                session: self.session.clone(),
            };
            let writer = TlsHalf {
                session: self.session,
            };

            Ok((reader, writer, Box::new(TlsCloser { socket })))
        }

        fn is_secure(&self) -> bool {
            true
        }
    }
}
