//! Co-processor link over a character device or a spawned simulator.
//!
//! - Character device: configured with `stty -F <dev> <config>`, then opened
//!   non-blocking without becoming the controlling terminal.
//! - Regular file: executed as `sh -c "<file> <config>"` with a raw
//!   pseudo-terminal as its stdin/stdout. Used to run a simulated
//!   co-processor on the host.
//!
//! Both end up as a [`SerialStream`], an `AsyncRead + AsyncWrite` over the
//! file descriptor driven by the tokio reactor.
//!
//! # Example
//!
//! ```ignore
//! use ncp_spinel::transport::open_link;
//!
//! let link = open_link("/dev/ttyACM0".as_ref(), "115200").await?;
//! let (reader, writer) = tokio::io::split(link.stream);
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{ready, Context, Poll};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, Winsize};
use nix::sys::termios::{self, ControlFlags, FlushArg, SetArg, Termios};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, Command};

use crate::error::{Result, SpinelError};

/// Longest accepted shell command line.
const MAX_COMMAND_LEN: usize = 255;

/// An opened co-processor link.
pub struct Link {
    /// Byte stream to the co-processor.
    pub stream: SerialStream,
    /// Simulator process, when the link is a pseudo-terminal.
    pub child: Option<Child>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("fd", &self.stream.inner.as_raw_fd())
            .field("child", &self.child.as_ref().and_then(Child::id))
            .finish()
    }
}

/// Open the link at `path`, choosing UART or PTY by file type.
pub async fn open_link(path: &Path, config: &str) -> Result<Link> {
    let metadata = std::fs::metadata(path)?;
    let file_type = metadata.file_type();

    if file_type.is_char_device() {
        let stream = open_uart(path, config).await?;
        tracing::info!(path = %path.display(), config, "Opened UART link");
        Ok(Link {
            stream,
            child: None,
        })
    } else if file_type.is_file() {
        let (stream, child) = open_pty(path, config)?;
        tracing::info!(
            path = %path.display(),
            pid = ?child.id(),
            "Spawned co-processor behind pty"
        );
        Ok(Link {
            stream,
            child: Some(child),
        })
    } else {
        tracing::error!(path = %path.display(), "Unsupported co-processor path");
        Err(SpinelError::InvalidArgs)
    }
}

/// Reject configuration strings that could chain shell commands.
fn validate_config(config: &str) -> Result<()> {
    if config.contains(['&', '|', ';']) {
        tracing::error!(config, "Illegal co-processor config arguments");
        return Err(SpinelError::InvalidArgs);
    }
    Ok(())
}

/// Configure and open a character device.
pub async fn open_uart(path: &Path, config: &str) -> Result<SerialStream> {
    validate_config(config)?;

    let status = Command::new("stty")
        .arg("-F")
        .arg(path)
        .args(config.split_whitespace())
        .stdin(Stdio::null())
        .status()
        .await?;
    if !status.success() {
        tracing::error!(path = %path.display(), config, %status, "stty failed");
        return Err(SpinelError::Failed);
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
        .open(path)?;

    termios::tcflush(&file, FlushArg::TCIOFLUSH).map_err(io::Error::from)?;

    SerialStream::new(file)
}

/// Spawn `path` with a raw pseudo-terminal as its stdin and stdout.
pub fn open_pty(path: &Path, config: &str) -> Result<(SerialStream, Child)> {
    let command = format!("{} {}", path.display(), config);
    if command.len() > MAX_COMMAND_LEN {
        tracing::error!(len = command.len(), "Co-processor command line too long");
        return Err(SpinelError::InvalidArgs);
    }

    let pty = openpty(None::<&Winsize>, None::<&Termios>).map_err(io::Error::from)?;
    make_raw(&pty.slave)?;

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let stdin = pty.slave.try_clone()?;
    let child = Command::new(shell)
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(pty.slave))
        .kill_on_drop(true)
        .spawn()?;

    let stream = SerialStream::new(File::from(pty.master))?;
    Ok((stream, child))
}

fn make_raw(fd: &OwnedFd) -> Result<()> {
    let mut tios = termios::tcgetattr(fd).map_err(io::Error::from)?;
    termios::cfmakeraw(&mut tios);
    tios.control_flags =
        ControlFlags::CS8 | ControlFlags::HUPCL | ControlFlags::CREAD | ControlFlags::CLOCAL;
    termios::tcsetattr(fd, SetArg::TCSANOW, &tios).map_err(io::Error::from)?;
    Ok(())
}

/// Non-blocking file descriptor registered with the tokio reactor.
pub struct SerialStream {
    inner: AsyncFd<File>,
}

impl SerialStream {
    /// Wrap an open file, switching it to non-blocking mode.
    pub fn new(file: File) -> Result<Self> {
        let fd = file.as_raw_fd();
        let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;

        Ok(Self {
            inner: AsyncFd::try_new(file).map_err(io::Error::from)?,
        })
    }

    /// Get a reference to the underlying file.
    pub fn inner(&self) -> &File {
        self.inner.get_ref()
    }
}

impl AsyncRead for SerialStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;

            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for SerialStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;

            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
