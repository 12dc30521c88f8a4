use may::coroutine::JoinHandle;
use may_minihttp::{HttpServerWithHeaders, HttpService};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Listener for one service.
///
/// Accepts up to 32 request headers, enough for traffic that went through
/// gateways and proxies.
pub struct HttpServer<T>(pub T);

/// A running listener.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll the address until it accepts connections (about 250ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        self.wait_ready_for(Duration::from_millis(250))
    }

    pub fn wait_ready_for(&self, budget: Duration) -> io::Result<()> {
        let deadline = Instant::now() + budget;
        loop {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("listener on {} not ready", self.addr),
                ));
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Cancel the accept coroutine and wait for it.
    pub fn stop(self) {
        // SAFETY: may::CoroutineHandle::coroutine().cancel() is marked unsafe by the may runtime.
        // The handle is owned here and the coroutine is only cancelled once.
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
        info!(addr = %self.addr, "listener stopped");
    }

    /// Block until the listener exits.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Bind the first address of `addr` that accepts a listener.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let mut last_err = io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing");
        for candidate in addr.to_socket_addrs()? {
            match HttpServerWithHeaders::<_, 32>(self.0.clone()).start(candidate) {
                Ok(handle) => {
                    info!(addr = %candidate, "listener started");
                    return Ok(ServerHandle { addr: candidate, handle });
                }
                Err(e) => {
                    warn!(addr = %candidate, error = %e, "bind failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}
