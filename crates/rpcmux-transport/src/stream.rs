use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::Result;

/// A connected transport stream — implements `Read + Write`.
///
/// Wraps a Unix domain socket stream and exposes the socket options the
/// message layers above need: read/write timeouts, `SO_LINGER` for
/// close-time flushing, and both-direction shutdown to wake a blocked
/// reader thread.
pub struct MuxStream {
    inner: UnixStream,
}

impl MuxStream {
    pub(crate) fn from_unix(inner: UnixStream) -> Self {
        Self { inner }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_unix(cloned))
    }

    /// Configure `SO_LINGER` on the stream.
    ///
    /// `Some(d)` makes the final close block up to `d` while unsent data
    /// drains; `None` restores the default (close returns immediately).
    pub fn set_linger(&self, linger: Option<Duration>) -> Result<()> {
        use std::os::fd::AsRawFd;

        let opt = match linger {
            Some(duration) => libc::linger {
                l_onoff: 1,
                l_linger: duration.as_secs().min(libc::c_int::MAX as u64) as libc::c_int,
            },
            None => libc::linger {
                l_onoff: 0,
                l_linger: 0,
            },
        };

        // SAFETY: `opt` is a valid linger struct for the provided length,
        // and the fd is an open socket descriptor owned by this process.
        let rc = unsafe {
            libc::setsockopt(
                self.inner.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                (&opt as *const libc::linger).cast::<libc::c_void>(),
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };

        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error().into())
        }
    }

    /// Shut down both directions of the stream.
    ///
    /// A reader blocked in `read` observes EOF afterwards, which is how
    /// the socket layer stops its reader threads.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown(Shutdown::Both).map_err(Into::into)
    }
}

impl Read for MuxStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for MuxStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for MuxStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxStream").finish_non_exhaustive()
    }
}
