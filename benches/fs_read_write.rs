/* Benchmarks for the descriptor layer.  In general, I'm not doing
 * results checking / assertations to avoid adding bias to the results. */

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use bridgeposix::safeposix::cage::{Cage, CageBackends};
use bridgeposix::safeposix::config::FsConfig;
use bridgeposix::safeposix::console::ConsoleBridge;
use bridgeposix::safeposix::net::HostNetwork;
use bridgeposix::safeposix::storage::HostDirStorage;
use bridgeposix::safeposix::stream::StreamResult;
use bridgeposix::safeposix::syscalls::*;

use std::sync::Arc;


struct SinkConsole;

impl ConsoleBridge for SinkConsole {
    fn open(&self, _fd: i32, _path: Option<&str>, _flags: i32) -> bool {
        true
    }

    fn write(&self, _fd: i32, data: &[u8]) -> StreamResult<usize> {
        Ok(data.len())
    }

    fn close(&self, _fd: i32) {}
}

pub fn run_benchmark(c: &mut Criterion) {
    let storage_root = tempfile::tempdir().unwrap();
    let backends = CageBackends {
        console: Arc::new(SinkConsole),
        storage: Some(Arc::new(HostDirStorage::new(storage_root.path()))),
        network: Arc::new(HostNetwork),
        extra_paths: Vec::new(),
    };
    let cage = Cage::new(FsConfig::default(), backends);
    let known_hosts = cage.config.known_hosts_path.clone();
    assert_eq!(cage.mkdir_syscall("/.ssh", 0o700), 0);

    // --- COMPARING read + write CALLS on a storage file and the console ---
    let mut group = c.benchmark_group("Compare fs:write+read");

    group.plot_config(criterion::PlotConfiguration::default().summary_scale(criterion::AxisScale::Linear));

    // Rather than track the file size, reset after a fixed amount of data
    // is written so the reads always have something to consume.
    const RESET_LENGTH: i32 = 1024 * 1024; // 1MB

    for buflen in [1, 64, 1024, 65536].iter() {
        let writebuf = vec![b'X'; *buflen];
        let mut readbuf = vec![0u8; *buflen];
        let expected_retval = *buflen as i32;

        let fd = cage.open_syscall(&known_hosts, O_CREAT | O_TRUNC | O_RDWR, 0o600);
        assert!(fd > 2);

        let mut pos = 0;
        group.bench_with_input(BenchmarkId::new("TF02:Storage write", buflen), buflen, |b, _| {
            b.iter(|| {
                pos += expected_retval;
                if RESET_LENGTH < pos {
                    cage.lseek_syscall(fd, 0, SEEK_SET);
                    pos = expected_retval;
                }
                assert_eq!(cage.write_syscall(fd, &writebuf), expected_retval);
            })
        });

        // make sure the reads have a full file underneath them
        while pos + expected_retval <= RESET_LENGTH {
            assert_eq!(cage.write_syscall(fd, &writebuf), expected_retval);
            pos += expected_retval;
        }
        cage.lseek_syscall(fd, 0, SEEK_SET);
        pos = 0;

        group.bench_with_input(BenchmarkId::new("TF02:Storage read", buflen), buflen, |b, _| {
            b.iter(|| {
                pos += expected_retval;
                if RESET_LENGTH < pos {
                    cage.lseek_syscall(fd, 0, SEEK_SET);
                    pos = expected_retval;
                }
                assert_eq!(cage.read_syscall(fd, &mut readbuf), expected_retval);
            })
        });

        cage.close_syscall(fd);
    }

    // console output goes straight to the bridge
    for buflen in [1, 1024].iter() {
        let writebuf = vec![b'X'; *buflen];
        group.bench_with_input(BenchmarkId::new("TF02:Console write", buflen), buflen, |b, buflen| {
            b.iter(|| {
                assert_eq!(cage.write_syscall(STDOUT_FILENO, &writebuf), *buflen as i32);
            })
        });
    }
    group.finish();
}

criterion_group!(name=benches;
                 // Add the global settings here so we don't type it everywhere
                 config=global_criterion_settings::get_criterion();
                 targets=run_benchmark);
criterion_main!(benches);
