#[cfg(test)]
pub mod net_tests {
    use super::super::*;
    use crate::interface::{ipv4_from_string, Errno, StatData};
    use crate::safeposix::syscalls::net_constants::*;
    use serial_test::serial;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    // a loopback port that was free a moment ago
    fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn refusing_cage() -> (RustRfc<Cage>, RustRfc<RefusingNetwork>) {
        let network = RustRfc::new(RefusingNetwork::default());
        let mut cage_backends = backends(RecordingConsole::new());
        cage_backends.network = network.clone();
        (Cage::new(FsConfig::default(), cage_backends), network)
    }

    #[test]
    #[serial]
    pub fn ut_gethostbyname_is_stable() {
        let (cage, _console) = test_cage();
        assert_eq!(cage.gethostbyname_syscall("localhost"), LOCALHOST_ADDR.to_be());

        let first = cage.gethostbyname_syscall("example.org");
        let second = cage.gethostbyname_syscall("example.net");
        assert_eq!(u32::from_be(first), FIRST_SYNTHETIC_ADDR);
        assert_ne!(first, second);
        assert_eq!(cage.gethostbyname_syscall("example.org"), first);
        // names are not normalized either
        assert_ne!(cage.gethostbyname_syscall("EXAMPLE.ORG"), first);
    }

    #[test]
    #[serial]
    pub fn ut_socket_argument_checks() {
        let (cage, _console) = test_cage();
        assert_eq!(cage.socket_syscall(10, SOCK_STREAM, 0), Errno::EAFNOSUPPORT.as_ret());
        assert_eq!(cage.socket_syscall(AF_INET, SOCK_DGRAM, 0), Errno::EOPNOTSUPP.as_ret());

        let sockfd = cage.socket_syscall(AF_INET, SOCK_STREAM, IPPROTO_TCP);
        assert_eq!(sockfd, 3);
        assert!(cage.is_known_descriptor(sockfd));
        // nothing attached yet
        let mut readbuf = sizecbuf(1);
        assert_eq!(cage.read_syscall(sockfd, &mut readbuf), Errno::EBADF.as_ret());
        assert_eq!(cage.close_syscall(sockfd), 0);
        assert!(!cage.is_known_descriptor(sockfd));
    }

    #[test]
    #[serial]
    pub fn ut_connect_through_host_network() {
        let (cage, _console) = test_cage();
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();

        let sockfd = cage.socket_syscall(AF_INET, SOCK_STREAM, 0);
        let localhost = cage.gethostbyname_syscall("localhost");
        assert_eq!(cage.connect_syscall(sockfd, localhost, port), 0);

        let (mut peer, _) = server.accept().unwrap();
        assert_eq!(cage.write_syscall(sockfd, b"SSH-2.0"), 7);
        let mut received = [0u8; 7];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"SSH-2.0");

        // the blocking read re-polls the host socket until the reply lands
        let replier = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(50));
            peer.write_all(b"pong").unwrap();
            peer
        });
        let mut readbuf = sizecbuf(4);
        assert_eq!(cage.read_syscall(sockfd, &mut readbuf), 4);
        assert_eq!(cbuf2str(&readbuf), "pong");
        let _peer = replier.join().unwrap();

        assert_eq!(cage.connect_syscall(sockfd, localhost, port), Errno::EISCONN.as_ret());
        assert_eq!(cage.isatty_syscall(sockfd), 0);
        let mut statbuf = StatData::default();
        assert_eq!(cage.fstat_syscall(sockfd, &mut statbuf), 0);
        assert_eq!(statbuf.st_mode & S_FILETYPEFLAGS, S_IFSOCK);

        let dupfd = cage.dup_syscall(sockfd, None);
        assert_eq!(cage.close_syscall(sockfd), 0);
        assert_eq!(cage.write_syscall(dupfd, b"x"), 1);
    }

    #[test]
    #[serial]
    pub fn ut_connect_refused_keeps_socket() {
        let (cage, _console) = test_cage();
        let port = free_port();
        let sockfd = cage.socket_syscall(AF_INET, SOCK_STREAM, 0);
        let localhost = cage.gethostbyname_syscall("localhost");

        assert_eq!(cage.connect_syscall(sockfd, localhost, port), Errno::ECONNREFUSED.as_ret());
        assert_eq!(cage.known_descriptors(), vec![0, 1, 2, sockfd]);
        let mut readbuf = sizecbuf(1);
        assert_eq!(cage.read_syscall(sockfd, &mut readbuf), Errno::EBADF.as_ret());
    }

    #[test]
    #[serial]
    pub fn ut_connect_resolves_synthetic_names() {
        let (cage, network) = refusing_cage();
        let sockfd = cage.socket_syscall(AF_INET, SOCK_STREAM, 0);

        let addr = cage.gethostbyname_syscall("example.org");
        assert_eq!(cage.connect_syscall(sockfd, addr, 22), Errno::ECONNREFUSED.as_ret());
        let literal = ipv4_from_string("10.0.0.1").unwrap();
        assert_eq!(cage.connect_syscall(sockfd, literal, 8022), Errno::ECONNREFUSED.as_ret());

        let attempts = network.attempts.lock().clone();
        assert_eq!(attempts, vec![("example.org".to_string(), 22), ("10.0.0.1".to_string(), 8022)]);
    }

    fn reusing_cage() -> (RustRfc<Cage>, RustRfc<ReusingNetwork>) {
        let network = RustRfc::new(ReusingNetwork::default());
        let mut cage_backends = backends(RecordingConsole::new());
        cage_backends.network = network.clone();
        let cage = Cage::new(FsConfig::default(), cage_backends);
        *network.cage.lock() = Some(RustRfc::downgrade(&cage));
        (cage, network)
    }

    #[test]
    #[serial]
    pub fn ut_connect_does_not_attach_to_reused_descriptor() {
        let (cage, network) = reusing_cage();
        let sockfd = cage.socket_syscall(AF_INET, SOCK_STREAM, 0);
        let localhost = cage.gethostbyname_syscall("localhost");

        assert_eq!(cage.connect_syscall(sockfd, localhost, 22), Errno::EBADF.as_ret());
        assert_eq!(*network.reused.lock(), vec![sockfd]);

        // the new owner still holds a bare socket
        assert_eq!(cage.write_syscall(sockfd, b"x"), Errno::EBADF.as_ret());
        *network.cage.lock() = None;
        assert_eq!(cage.connect_syscall(sockfd, localhost, 22), 0);
        assert_eq!(cage.write_syscall(sockfd, b"x"), 1);
    }

    #[test]
    #[serial]
    pub fn ut_listen_does_not_attach_to_reused_descriptor() {
        let (cage, network) = reusing_cage();
        let sockfd = cage.socket_syscall(AF_INET, SOCK_STREAM, 0);

        assert_eq!(cage.listen_syscall(sockfd, 1), Errno::EBADF.as_ret());
        assert_eq!(*network.reused.lock(), vec![sockfd]);
        assert_eq!(cage.known_descriptors(), vec![0, 1, 2, sockfd]);
        let mut readbuf = sizecbuf(1);
        assert_eq!(cage.read_syscall(sockfd, &mut readbuf), Errno::EBADF.as_ret());
    }

    #[test]
    #[serial]
    pub fn ut_connect_bad_descriptors() {
        let (cage, network) = refusing_cage();
        let addr = cage.gethostbyname_syscall("example.org");
        assert_eq!(cage.connect_syscall(50, addr, 22), Errno::EBADF.as_ret());
        let nullfd = cage.open_syscall("/dev/null", O_RDWR, 0);
        assert_eq!(cage.connect_syscall(nullfd, addr, 22), Errno::EISCONN.as_ret());
        assert!(network.attempts.lock().is_empty());
    }

    #[test]
    #[serial]
    pub fn ut_bind_listen_accept() {
        let (cage, _console) = test_cage();
        let port = free_port();
        let listenfd = cage.socket_syscall(AF_INET, SOCK_STREAM, 0);
        assert_eq!(cage.bind_syscall(listenfd, 0, port), 0);
        assert_eq!(cage.listen_syscall(listenfd, 0), 0);
        assert_eq!(cage.bind_syscall(listenfd, 0, port), Errno::EISCONN.as_ret());

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream.write_all(b"hello").unwrap();
            stream
        });

        let connfd = cage.accept_syscall(listenfd);
        assert!(connfd > listenfd);
        let _stream = client.join().unwrap();

        let mut readbuf = sizecbuf(5);
        let mut total = 0;
        while total < 5 {
            let nread = cage.read_syscall(connfd, &mut readbuf[total..]);
            assert!(nread > 0);
            total += nread as usize;
        }
        assert_eq!(cbuf2str(&readbuf), "hello");

        // listeners are not streams and cannot be shared
        assert_eq!(cage.read_syscall(listenfd, &mut readbuf), Errno::ENOTCONN.as_ret());
        assert_eq!(cage.dup_syscall(listenfd, None), Errno::EACCES.as_ret());
        assert_eq!(cage.accept_syscall(connfd), Errno::ENOTSOCK.as_ret());
    }

    #[test]
    #[serial]
    pub fn ut_nonblocking_accept() {
        let (cage, _console) = test_cage();
        let listenfd = cage.socket_syscall(AF_INET, SOCK_STREAM, 0);
        assert_eq!(cage.listen_syscall(listenfd, 5), 0);
        assert_eq!(cage.fcntl_syscall(listenfd, F_SETFL, O_NONBLOCK), 0);
        assert_eq!(cage.accept_syscall(listenfd), Errno::EAGAIN.as_ret());
        assert_eq!(cage.known_descriptors(), vec![0, 1, 2, listenfd]);
    }

    #[test]
    #[serial]
    pub fn ut_listen_failure_keeps_socket() {
        let (cage, _network) = refusing_cage();
        let sockfd = cage.socket_syscall(AF_UNSPEC, SOCK_STREAM, 0);
        assert_eq!(cage.listen_syscall(sockfd, 1), Errno::EADDRINUSE.as_ret());
        assert!(cage.is_known_descriptor(sockfd));
        assert_eq!(cage.listen_syscall(99, 1), Errno::EBADF.as_ret());
    }
}
