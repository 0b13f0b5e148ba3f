//! Platform-specific blocking primitive for the loop driver.
//!
//! Provides a unified interface over:
//! - Linux: epoll
//! - macOS/BSD: kqueue
//!
//! The driver parks here between loop iterations, with a timeout derived
//! from the next timer deadline. The timer-only handle surface registers no
//! descriptors; stream-family handle kinds are what would add registration.

use std::io;
use std::time::Duration;

/// Platform-specific poller.
pub(crate) struct Poller {
    #[cfg(target_os = "linux")]
    inner: linux::EpollPoller,

    #[cfg(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    ))]
    inner: kqueue::KqueuePoller,
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
)))]
compile_error!("eventide requires epoll (Linux) or kqueue (macOS/BSD)");

impl Poller {
    /// Create a new poller with room for `event_capacity` events per wake.
    pub(crate) fn new(event_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            #[cfg(target_os = "linux")]
            inner: linux::EpollPoller::new(event_capacity)?,

            #[cfg(any(
                target_os = "macos",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "netbsd"
            ))]
            inner: kqueue::KqueuePoller::new(event_capacity)?,
        })
    }

    /// Block until an OS event arrives or the timeout elapses.
    ///
    /// `None` blocks indefinitely. Returns the number of OS events (always 0
    /// while no descriptors are registered). EINTR is absorbed and reported
    /// as 0 so the driver re-evaluates its deadlines instead of failing.
    pub(crate) fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        self.inner.poll(timeout)
    }
}

// =============================================================================
// Linux: epoll implementation
// =============================================================================

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use std::os::unix::io::RawFd;

    pub(super) struct EpollPoller {
        epoll_fd: RawFd,
        events: Vec<libc::epoll_event>,
    }

    impl EpollPoller {
        pub(super) fn new(event_capacity: usize) -> io::Result<Self> {
            let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
            if epoll_fd < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self {
                epoll_fd,
                events: vec![unsafe { std::mem::zeroed() }; event_capacity.max(1)],
            })
        }

        pub(super) fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
            let count = unsafe {
                libc::epoll_wait(
                    self.epoll_fd,
                    self.events.as_mut_ptr(),
                    self.events.len() as i32,
                    timeout_to_ms(timeout),
                )
            };

            if count < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    return Ok(0);
                }
                return Err(err);
            }

            Ok(count as usize)
        }
    }

    impl Drop for EpollPoller {
        fn drop(&mut self) {
            unsafe { libc::close(self.epoll_fd) };
        }
    }

    // epoll_wait takes whole milliseconds; round up so a sub-millisecond
    // timeout does not spin until its deadline.
    fn timeout_to_ms(timeout: Option<Duration>) -> i32 {
        match timeout {
            None => -1,
            Some(d) => {
                let ms = (d.as_nanos() + 999_999) / 1_000_000;
                ms.min(i32::MAX as u128) as i32
            }
        }
    }
}

// =============================================================================
// macOS/BSD: kqueue implementation
// =============================================================================

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
mod kqueue {
    use super::*;
    use std::os::unix::io::RawFd;

    pub(super) struct KqueuePoller {
        kqueue_fd: RawFd,
        events: Vec<libc::kevent>,
    }

    impl KqueuePoller {
        pub(super) fn new(event_capacity: usize) -> io::Result<Self> {
            let kqueue_fd = unsafe { libc::kqueue() };
            if kqueue_fd < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self {
                kqueue_fd,
                events: vec![unsafe { std::mem::zeroed() }; event_capacity.max(1)],
            })
        }

        pub(super) fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
            let timeout_spec = timeout.map(|d| libc::timespec {
                tv_sec: d.as_secs() as libc::time_t,
                tv_nsec: d.subsec_nanos() as libc::c_long,
            });

            let timeout_ptr = match &timeout_spec {
                Some(ts) => ts as *const libc::timespec,
                None => std::ptr::null(),
            };

            let count = unsafe {
                libc::kevent(
                    self.kqueue_fd,
                    std::ptr::null(),
                    0,
                    self.events.as_mut_ptr(),
                    self.events.len() as i32,
                    timeout_ptr,
                )
            };

            if count < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    return Ok(0);
                }
                return Err(err);
            }

            Ok(count as usize)
        }
    }

    impl Drop for KqueuePoller {
        fn drop(&mut self) {
            unsafe { libc::close(self.kqueue_fd) };
        }
    }
}
