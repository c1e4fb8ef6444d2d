//! This module contains all networking-related system calls, plus
//! `select`, which watches any kind of descriptor.
//!
//! ## Notes:
//!
//! - These calls are implementations of the [`Cage`] struct in the
//!   [`safeposix`](crate::safeposix) crate.
//! - Addresses are synthetic. `gethostbyname_syscall` invents one for every
//!   unknown name and `connect_syscall` turns it back into the name before
//!   asking the network bridge to connect.
//!
//! ## Network Calls
//!
//! - select_syscall
//! - socket_syscall
//! - connect_syscall
//! - gethostbyname_syscall
//! - bind_syscall
//! - listen_syscall
//! - accept_syscall

use crate::interface::{self, syscall_error, Errno, FdSet, RustDuration, RustInstant};
use crate::safeposix::cage::{Cage, FdSlot, FsState};
use crate::safeposix::stream::ResourceHandle;

use super::net_constants::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Readiness {
    Read,
    Write,
    Exception,
}

impl Readiness {
    fn test(self, handle: &dyn ResourceHandle) -> bool {
        match self {
            Readiness::Read => handle.is_read_ready(),
            Readiness::Write => handle.is_write_ready(),
            Readiness::Exception => handle.is_exception(),
        }
    }
}

// outcome of one scan over the three sets
#[derive(Default)]
struct SelectProbe {
    ready: bool,
    must_poll: bool,
}

impl Cage {
    // Checking: validates every watched descriptor and reports whether any
    // of them is ready, without touching the sets
    fn select_probe(state: &FsState, nfds: i32, sets: [(Option<&FdSet>, Readiness); 3]) -> Result<SelectProbe, Errno> {
        let mut probe = SelectProbe::default();
        for (set, kind) in sets {
            let set = match set {
                Some(set) => set,
                None => continue,
            };
            for fd in (0..nfds).filter(|fd| set.is_set(*fd)) {
                let handle = Self::get_handle(state, fd)?;
                if kind.test(&*handle) {
                    probe.ready = true;
                }
                if !handle.signals_readiness() {
                    probe.must_poll = true;
                }
            }
        }
        Ok(probe)
    }

    // Satisfied: clears the bits of descriptors that are not ready
    fn select_apply(state: &FsState, nfds: i32, set: Option<&mut FdSet>, kind: Readiness) -> Result<i32, Errno> {
        let set = match set {
            Some(set) => set,
            None => return Ok(0),
        };
        let mut nset = 0;
        for fd in 0..nfds {
            if !set.is_set(fd) {
                continue;
            }
            let handle = Self::get_handle(state, fd)?;
            if kind.test(&*handle) {
                nset += 1;
            } else {
                set.clear(fd);
            }
        }
        Ok(nset)
    }

    /// ## `select_syscall`
    ///
    /// ### Description
    /// Waits until at least one watched descriptor is ready or the timeout
    /// expires. Readiness is whatever the resources report. The wait is on
    /// the cage's condition variable, so every write, close, console input
    /// and storage completion makes all selectors re-check; resources that
    /// cannot announce readiness (host sockets) are re-polled every poll
    /// interval.
    ///
    /// ### Arguments
    /// * `nfds` - one more than the highest descriptor to look at
    /// * `readfds`, `writefds`, `exceptfds` - sets to watch; `None` skips
    ///   the set
    /// * `timeout` - `None` waits forever, zero polls once
    ///
    /// ### Returns
    /// Total number of bits left set. On success the sets hold only ready
    /// descriptors; on timeout all sets are cleared and 0 is returned.
    ///
    /// ### Errors
    /// * `EINVAL` - `nfds` is negative or larger than `FD_SETSIZE`
    /// * `EBADF` - a set names a descriptor that is free, reserved or broken
    pub fn select_syscall(
        &self,
        nfds: i32,
        mut readfds: Option<&mut FdSet>,
        mut writefds: Option<&mut FdSet>,
        mut exceptfds: Option<&mut FdSet>,
        timeout: Option<RustDuration>,
    ) -> i32 {
        if !(0..=interface::FD_SET_MAX_FD).contains(&nfds) {
            return syscall_error(Errno::EINVAL, "select", "number of descriptors is out of range");
        }

        // a deadline past what Instant can hold is no deadline
        let deadline = timeout.and_then(|timeout| RustInstant::now().checked_add(timeout));
        let poll_interval = self.config.poll_interval();
        let mut state = self.state.lock();

        loop {
            let sets = [
                (readfds.as_deref(), Readiness::Read),
                (writefds.as_deref(), Readiness::Write),
                (exceptfds.as_deref(), Readiness::Exception),
            ];
            let probe = match Self::select_probe(&state, nfds, sets) {
                Ok(probe) => probe,
                Err(e) => return syscall_error(e, "select", "invalid file descriptor in set"),
            };
            if probe.ready {
                break;
            }

            // Blocked
            match deadline {
                None if probe.must_poll => {
                    self.cond.wait_for(&mut state, poll_interval);
                }
                None => self.cond.wait(&mut state),
                Some(deadline) => {
                    let now = RustInstant::now();
                    let wake_at = match now.checked_add(poll_interval) {
                        Some(next_poll) if probe.must_poll => deadline.min(next_poll),
                        _ => deadline,
                    };
                    if now >= deadline || (self.cond.wait_until(&mut state, wake_at).timed_out() && RustInstant::now() >= deadline) {
                        // TimedOut
                        for set in [readfds.as_deref_mut(), writefds.as_deref_mut(), exceptfds.as_deref_mut()].into_iter().flatten() {
                            set.clear_all();
                        }
                        return 0;
                    }
                }
            }
        }

        let mut total = 0;
        for (set, kind) in [
            (readfds, Readiness::Read),
            (writefds, Readiness::Write),
            (exceptfds, Readiness::Exception),
        ] {
            match Self::select_apply(&state, nfds, set, kind) {
                Ok(nset) => total += nset,
                Err(e) => return syscall_error(e, "select", "invalid file descriptor in set"),
            }
        }
        total
    }

    /// ## `socket_syscall`
    ///
    /// ### Description
    /// Allocates a descriptor with nothing behind it yet. The connection is
    /// attached by [`Cage::connect_syscall`] or [`Cage::listen_syscall`].
    ///
    /// ### Errors
    /// * `EAFNOSUPPORT` - family other than `AF_INET` / `AF_UNSPEC`
    /// * `EOPNOTSUPP` - type other than `SOCK_STREAM`
    /// * `ENFILE` - no descriptor is free
    pub fn socket_syscall(&self, domain: i32, socktype: i32, _protocol: i32) -> i32 {
        if domain != AF_INET && domain != AF_UNSPEC {
            return syscall_error(Errno::EAFNOSUPPORT, "socket", "only internet sockets are emulated");
        }
        if socktype & 0xf != SOCK_STREAM {
            return syscall_error(Errno::EOPNOTSUPP, "socket", "only stream sockets are emulated");
        }

        let mut state = self.state.lock();
        match self.get_next_fd(&state, None) {
            Some(fd) => {
                state.reserve(fd);
                fd
            }
            None => syscall_error(Errno::ENFILE, "socket", "no available file descriptor number could be found"),
        }
    }

    // the slot must still be the bare reservation made by socket(); returns
    // its token
    fn reserved_socket(state: &FsState, fd: i32, syscall: &str) -> Result<u64, i32> {
        match state.fdtable.get(&fd) {
            Some(FdSlot::Reserved(token)) => Ok(*token),
            Some(FdSlot::Bound(_)) => Err(syscall_error(Errno::EISCONN, syscall, "socket is already connected")),
            _ => Err(syscall_error(Errno::EBADF, syscall, "invalid file descriptor")),
        }
    }

    // binds a freshly created handle only to the reservation the bridge
    // call started from
    fn attach_socket(&self, fd: i32, token: u64, handle: interface::RustRfc<dyn ResourceHandle>, syscall: &str) -> i32 {
        let mut state = self.state.lock();
        match state.fdtable.get(&fd) {
            Some(FdSlot::Reserved(current)) if *current == token => {
                state.fdtable.insert(fd, FdSlot::Bound(handle));
                drop(state);
                self.notify_readiness();
                0
            }
            _ => {
                drop(state);
                handle.close();
                syscall_error(Errno::EBADF, syscall, "descriptor was closed while connecting")
            }
        }
    }

    /// ## `connect_syscall`
    ///
    /// ### Description
    /// Resolves `addr` back to the hostname it was handed out for (or formats
    /// it as dotted decimal if it is not synthetic) and asks the network
    /// bridge to connect. The cage lock is not held while the bridge
    /// connects.
    ///
    /// ### Arguments
    /// * `addr` - IPv4 address in network byte order
    /// * `port` - port in host byte order
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is not a socket descriptor
    /// * `EISCONN` - `fd` is already connected
    /// * `ECONNREFUSED` - the connection could not be made; `fd` stays an
    ///   unconnected socket
    pub fn connect_syscall(&self, fd: i32, addr: u32, port: u16) -> i32 {
        let (token, host) = {
            let state = self.state.lock();
            let token = match Self::reserved_socket(&state, fd, "connect") {
                Ok(token) => token,
                Err(e) => return e,
            };
            let host = match state.hosts.reverse_lookup(addr) {
                Some(name) => name.to_string(),
                None => interface::ipv4_to_string(addr),
            };
            (token, host)
        };

        match self.network.connect(fd, &host, port) {
            Ok(handle) => self.attach_socket(fd, token, handle, "connect"),
            Err(e) => {
                log::debug!("connect to {}:{} failed: {}", host, port, e);
                syscall_error(Errno::ECONNREFUSED, "connect", "connection refused")
            }
        }
    }

    /// ## `gethostbyname_syscall`
    ///
    /// ### Returns
    /// The address of `name` in network byte order. Unknown names get the
    /// next synthetic address; the same name always maps to the same address.
    pub fn gethostbyname_syscall(&self, name: &str) -> u32 {
        self.state.lock().hosts.lookup_or_allocate(name)
    }

    /// ## `bind_syscall`
    ///
    /// ### Description
    /// Records the port a later `listen` will use. The address is ignored;
    /// listeners always bind to loopback.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is not a socket descriptor
    /// * `EISCONN` - `fd` is already connected or listening
    pub fn bind_syscall(&self, fd: i32, addr: u32, port: u16) -> i32 {
        let mut state = self.state.lock();
        if let Err(e) = Self::reserved_socket(&state, fd, "bind") {
            return e;
        }
        log::debug!("bind of {} to {}:{} uses loopback", fd, interface::ipv4_to_string(addr), port);
        state.bind_ports.insert(fd, port);
        0
    }

    /// ## `listen_syscall`
    ///
    /// ### Description
    /// Turns a bare socket descriptor into a listener on loopback and the
    /// port recorded by `bind` (an ephemeral one if there was no bind).
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is not a socket descriptor
    /// * `EISCONN` - `fd` is already connected or listening
    /// * anything the network bridge reports, unchanged
    pub fn listen_syscall(&self, fd: i32, backlog: i32) -> i32 {
        let (token, port) = {
            let state = self.state.lock();
            let token = match Self::reserved_socket(&state, fd, "listen") {
                Ok(token) => token,
                Err(e) => return e,
            };
            (token, state.bind_ports.get(&fd).copied().unwrap_or(0))
        };

        let backlog = if backlog <= 0 { DEFAULT_BACKLOG } else { backlog };
        match self.network.listen(fd, port, backlog) {
            Ok(handle) => self.attach_socket(fd, token, handle, "listen"),
            Err(e) => syscall_error(e, "listen", "the network bridge could not listen"),
        }
    }

    /// ## `accept_syscall`
    ///
    /// ### Description
    /// Takes the next pending connection of listener `fd` and binds it to the
    /// lowest free descriptor. Blocks, re-polling the listener, unless `fd`
    /// is non-blocking.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is free, reserved or broken
    /// * `ENOTSOCK` - `fd` is not a listener
    /// * `EAGAIN` - non-blocking and nothing pending
    /// * `ENFILE` - no descriptor is free
    pub fn accept_syscall(&self, fd: i32) -> i32 {
        let mut state = self.state.lock();
        loop {
            let handle = match Self::get_handle(&state, fd) {
                Ok(handle) => handle,
                Err(e) => return syscall_error(e, "accept", "invalid file descriptor"),
            };
            let newfd = match self.get_next_fd(&state, None) {
                Some(newfd) => newfd,
                None => return syscall_error(Errno::ENFILE, "accept", "no available file descriptor number could be found"),
            };

            state.reserve(newfd);
            match handle.accept(newfd) {
                Ok(connection) => {
                    state.fdtable.insert(newfd, FdSlot::Bound(connection));
                    return newfd;
                }
                Err(Errno::EAGAIN) if !handle.is_nonblocking() => {
                    state.fdtable.remove(&newfd);
                    self.wait_for_handle(&mut state, &*handle);
                }
                Err(e) => {
                    state.fdtable.remove(&newfd);
                    return syscall_error(e, "accept", "could not accept a connection");
                }
            }
        }
    }
}
