//! Child process execution.
//!
//! [`run`] waits for the child and captures stdout and stderr separately.
//! [`stream`] attaches the child to a pseudo-terminal so tools that only
//! report progress to a tty (git push does) keep doing so, echoing the
//! output live while buffering it for later inspection.
//!
//! Neither function treats a non-zero exit as an error; callers inspect
//! [`CmdOutput::code`] and decide.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::pty::openpty;
use nix::unistd::setsid;

/// Result of one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdOutput {
    /// Exit code, `-1` when the child was killed by a signal.
    pub code: i32,
    pub stdout: String,
    /// Always empty for [`stream`], where both streams share the terminal.
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stdout and stderr joined, for matching against error text.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Runs `cmd` to completion with stdin closed.
pub fn run(mut cmd: Command) -> io::Result<CmdOutput> {
    cmd.stdin(Stdio::null());
    let output = cmd.output()?;
    Ok(CmdOutput {
        code: exit_code(output.status),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs `cmd` on a fresh pseudo-terminal as a new session leader.
///
/// Everything the child writes is copied to `sink` as it arrives and also
/// returned in [`CmdOutput::stdout`] with `\r\n` folded to `\n`. The master
/// side is polled with `poll_interval` as the upper bound on each wait; a
/// wait that times out checks whether the child has exited.
pub fn stream(
    mut cmd: Command,
    sink: &mut dyn Write,
    poll_interval: Duration,
) -> io::Result<CmdOutput> {
    let pty = openpty(None, None)?;
    let master: OwnedFd = pty.master;
    let slave: OwnedFd = pty.slave;

    cmd.stdin(Stdio::from(slave.try_clone()?))
        .stdout(Stdio::from(slave.try_clone()?))
        .stderr(Stdio::from(slave));
    // SAFETY: setsid is async-signal-safe and only affects the child.
    unsafe {
        cmd.pre_exec(|| setsid().map(drop).map_err(io::Error::from));
    }
    let mut child = cmd.spawn()?;
    // The Command owns the parent's copies of the slave; EOF on the master
    // only arrives once they are closed.
    drop(cmd);

    let raw = master.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;

    let mut master = File::from(master);
    let wait_ms = u16::try_from(poll_interval.as_millis()).unwrap_or(u16::MAX);
    let captured = match pump(&mut master, &mut child, sink, wait_ms) {
        Ok(buf) => buf,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };
    drop(master);

    let status = child.wait()?;
    Ok(CmdOutput {
        code: exit_code(status),
        stdout: String::from_utf8_lossy(&captured).replace("\r\n", "\n"),
        stderr: String::new(),
    })
}

fn pump(
    master: &mut File,
    child: &mut Child,
    sink: &mut dyn Write,
    wait_ms: u16,
) -> io::Result<Vec<u8>> {
    let mut captured = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut exited = false;

    loop {
        let revents = {
            let mut fds = [PollFd::new(master.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(wait_ms)) {
                Ok(0) => None,
                Ok(_) => Some(fds[0].revents().unwrap_or(PollFlags::empty())),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        };

        let Some(revents) = revents else {
            if exited {
                break;
            }
            exited = child.try_wait()?.is_some();
            continue;
        };

        if revents.contains(PollFlags::POLLIN) {
            match drain(master, &mut chunk, &mut captured, sink)? {
                Drained::Open => continue,
                Drained::Closed => break,
            }
        }
        if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
            break;
        }
    }

    let _ = sink.flush();
    Ok(captured)
}

enum Drained {
    Open,
    Closed,
}

fn drain(
    master: &mut File,
    chunk: &mut [u8],
    captured: &mut Vec<u8>,
    sink: &mut dyn Write,
) -> io::Result<Drained> {
    loop {
        match master.read(chunk) {
            Ok(0) => return Ok(Drained::Closed),
            Ok(n) => {
                captured.extend_from_slice(&chunk[..n]);
                // Echo is best-effort; the buffer is what callers match on.
                let _ = sink.write_all(&chunk[..n]);
                let _ = sink.flush();
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Drained::Open),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports EIO on the master once every slave fd is closed.
            Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => return Ok(Drained::Closed),
            Err(e) => return Err(e),
        }
    }
}
