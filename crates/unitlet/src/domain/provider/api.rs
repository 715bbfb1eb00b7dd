//! Arguments of the log and exec callbacks.

use std::pin::Pin;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;

/// Byte stream of container log output.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Log query options as sent by the API server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerLogOpts {
    pub tail: Option<u32>,
    pub limit_bytes: Option<u64>,
    pub timestamps: bool,
    pub follow: bool,
    pub previous: bool,
    pub since_seconds: Option<u64>,
}

/// Streams attached to an exec session.
#[derive(Default)]
pub struct AttachIo {
    pub stdin: Option<Pin<Box<dyn AsyncRead + Send>>>,
    pub stdout: Option<Pin<Box<dyn AsyncWrite + Send>>>,
    pub stderr: Option<Pin<Box<dyn AsyncWrite + Send>>>,
    pub tty: bool,
}

impl std::fmt::Debug for AttachIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachIo")
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("tty", &self.tty)
            .finish()
    }
}
