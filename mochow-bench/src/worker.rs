//! Forked worker processes.
//!
//! A [`WorkerGroup`] forks one child per task. Each child moves into its own
//! process group, runs its closure, writes a JSON [`WorkerMessage`] to a pipe
//! and `_exit`s. The parent drains every pipe on a reader thread that
//! forwards the bytes to a single channel, so [`WorkerGroup::join`] has
//! exactly one blocking point: `recv_deadline` on that channel.
//!
//! Cancellation is destructive. A timed-out or failed group sends `SIGKILL`
//! to the process group of every live child and reaps it, so a worker parked
//! in a network read, and anything it spawned, is gone when `join` returns.
//! Dropping a group has the same effect.

use crate::{BenchError, BenchResult};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::os::fd::FromRawFd;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// What a child reports back through its pipe.
#[derive(Debug, Serialize, Deserialize)]
enum WorkerMessage<T> {
    Ok(T),
    Err(String),
}

/// Bytes read from one child's pipe, tagged with the child's slot.
struct Completion {
    slot: usize,
    bytes: io::Result<Vec<u8>>,
}

/// Why a [`WorkerGroup::join`] did not produce results.
#[derive(Debug)]
pub enum JoinError {
    /// The deadline elapsed; every live worker has been killed.
    TimedOut,
    /// A worker failed or crashed; every other live worker has been killed.
    Failed(BenchError),
}

struct Worker {
    name: String,
    pid: libc::pid_t,
    /// Raw `waitpid` status once the child has been reaped.
    status: Option<libc::c_int>,
}

impl Worker {
    fn is_live(&self) -> bool {
        self.status.is_none()
    }

    /// Block until the child exits and remember its status.
    fn reap(&mut self) -> libc::c_int {
        if let Some(status) = self.status {
            return status;
        }
        let mut status: libc::c_int = 0;
        loop {
            let rc = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if rc == -1 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break;
        }
        self.status = Some(status);
        status
    }

    /// SIGKILL the child's process group, then reap the child.
    fn kill(&mut self) {
        if !self.is_live() {
            return;
        }
        unsafe {
            libc::killpg(self.pid, libc::SIGKILL);
            // The child may not have reached setpgid yet.
            libc::kill(self.pid, libc::SIGKILL);
        }
        self.reap();
        tracing::debug!(worker = %self.name, pid = self.pid, "worker killed");
    }
}

/// A set of forked workers that all produce a `T`.
pub struct WorkerGroup<T> {
    workers: Vec<Worker>,
    tx: Option<Sender<Completion>>,
    rx: Receiver<Completion>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for WorkerGroup<T>
where
    T: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkerGroup<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            workers: Vec::new(),
            tx: Some(tx),
            rx,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Process ids of all workers spawned so far.
    pub fn pids(&self) -> Vec<i32> {
        self.workers.iter().map(|w| w.pid).collect()
    }

    /// Fork a child that runs `task` and reports its result.
    ///
    /// `task` only ever runs in the child. The parent drops it unrun, so
    /// anything it borrows is free again once `spawn` returns.
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F) -> BenchResult<i32>
    where
        F: FnOnce() -> BenchResult<T>,
    {
        let name = name.into();
        let tx = self
            .tx
            .clone()
            .ok_or_else(|| BenchError::Spawn("worker group already joined".into()))?;

        let (read_fd, write_fd) = result_pipe()?;

        let pid = unsafe { libc::fork() };
        if pid == -1 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
            }
            return Err(BenchError::Spawn(format!("fork: {err}")));
        }

        if pid == 0 {
            unsafe {
                libc::close(read_fd);
                libc::setpgid(0, 0);
            }
            run_child(write_fd, task);
        }

        // Parent.
        unsafe {
            libc::close(write_fd);
            libc::setpgid(pid, pid);
        }
        drop(task);

        let slot = self.workers.len();
        let pipe = unsafe { File::from_raw_fd(read_fd) };
        tracing::debug!(worker = %name, pid, "worker spawned");
        let reader_name = format!("{name}-reader");
        // Tracked before the reader starts so a failed spawn still gets killed on drop.
        self.workers.push(Worker {
            name,
            pid,
            status: None,
        });
        std::thread::Builder::new()
            .name(reader_name)
            .spawn(move || {
                let mut pipe = pipe;
                let mut bytes = Vec::new();
                let bytes = pipe.read_to_end(&mut bytes).map(|_| bytes);
                let _ = tx.send(Completion { slot, bytes });
            })?;
        Ok(pid)
    }

    /// Wait for every worker, up to `timeout` in total (`None` waits forever).
    ///
    /// Results come back in spawn order. The first failure, crash or the
    /// deadline kills all remaining live workers before returning.
    pub fn join(mut self, timeout: Option<Duration>) -> Result<Vec<T>, JoinError> {
        self.tx = None;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut results: Vec<Option<T>> = self.workers.iter().map(|_| None).collect();
        let mut pending = self.workers.len();

        while pending > 0 {
            let received = match deadline {
                Some(deadline) => self.rx.recv_deadline(deadline),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            let completion = match received {
                Ok(completion) => completion,
                Err(RecvTimeoutError::Timeout) => {
                    self.kill_all();
                    return Err(JoinError::TimedOut);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.kill_all();
                    return Err(JoinError::Failed(BenchError::Spawn(
                        "worker result channel closed".into(),
                    )));
                }
            };

            let worker = &mut self.workers[completion.slot];
            let status = worker.reap();
            match decode::<T>(&worker.name, completion.bytes, status) {
                Ok(value) => {
                    results[completion.slot] = Some(value);
                    pending -= 1;
                }
                Err(e) => {
                    self.kill_all();
                    return Err(JoinError::Failed(e));
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Kill and reap every worker that is still running.
    pub fn kill_all(&mut self) {
        for worker in self.workers.iter_mut().filter(|w| w.is_live()) {
            worker.kill();
        }
    }
}

impl<T> Drop for WorkerGroup<T> {
    fn drop(&mut self) {
        for worker in self.workers.iter_mut().filter(|w| w.is_live()) {
            worker.kill();
        }
    }
}

/// Pipe a worker reports through. Both ends are close-on-exec: a process the
/// workload execs must not hold the write end, or the reader never sees EOF.
fn result_pipe() -> BenchResult<(libc::c_int, libc::c_int)> {
    let mut fds: [libc::c_int; 2] = [0; 2];

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };

    if rc != 0 {
        return Err(BenchError::Spawn(format!(
            "pipe: {}",
            io::Error::last_os_error()
        )));
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    for fd in fds {
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fds[0]);
                libc::close(fds[1]);
            }
            return Err(BenchError::Spawn(format!("fcntl: {err}")));
        }
    }

    Ok((fds[0], fds[1]))
}

/// Body of the forked child. Never returns.
fn run_child<T, F>(write_fd: libc::c_int, task: F) -> !
where
    T: Serialize,
    F: FnOnce() -> BenchResult<T>,
{
    let message = match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => WorkerMessage::Ok(value),
        Ok(Err(e)) => WorkerMessage::Err(e.into_worker_message()),
        Err(payload) => WorkerMessage::Err(panic_message(payload.as_ref())),
    };

    let mut pipe = unsafe { File::from_raw_fd(write_fd) };
    let code = match serde_json::to_writer(&mut pipe, &message) {
        Ok(()) => 0,
        Err(_) => 1,
    };
    drop(pipe);
    unsafe { libc::_exit(code) }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

fn decode<T: DeserializeOwned>(
    name: &str,
    bytes: io::Result<Vec<u8>>,
    status: libc::c_int,
) -> BenchResult<T> {
    let bytes = bytes?;
    if bytes.is_empty() {
        return Err(BenchError::WorkerCrashed {
            name: name.to_string(),
            status: describe_status(status),
        });
    }
    match serde_json::from_slice::<WorkerMessage<T>>(&bytes)? {
        WorkerMessage::Ok(value) => Ok(value),
        WorkerMessage::Err(msg) => Err(BenchError::Workload(msg)),
    }
}

fn describe_status(status: libc::c_int) -> String {
    if libc::WIFEXITED(status) {
        format!("exit code {}", libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        format!("killed by signal {}", libc::WTERMSIG(status))
    } else {
        format!("wait status {status}")
    }
}

/// Does a process with this pid still exist (zombies included)?
pub fn process_exists(pid: i32) -> bool {
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
