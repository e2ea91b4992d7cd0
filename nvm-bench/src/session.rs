// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Result};
use log::debug;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use thiserror::Error;

/// SSH port is fixed; the per-machine port field in the machine config is
/// the benchmark server's bind port.
const SSH_PORT: u16 = 22;

/// Upper bound for one streaming read. The remote side keeps producing
/// while we drain, a bigger buffer only shifts where backpressure starts.
pub const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("can't reach {host}:{port} ({source})")]
    Tcp {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("ssh handshake with {host} failed ({source})")]
    Handshake { host: String, source: ssh2::Error },
    #[error("authentication of {user}@{host} failed ({source})")]
    Auth {
        user: String,
        host: String,
        source: ssh2::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ExecOpts {
    /// Number of times to blind-write the credential right after dispatch,
    /// one per expected `sudo -S` prompt. Not an interactive negotiation;
    /// only safe when the prompt count is known exactly.
    pub sudo_passwd_writes: u32,
}

/// Live handle on one remote process's merged stdout/stderr stream.
pub trait OutputHandle {
    /// One bounded read. Ok(None) means nothing available right now.
    fn read_chunk(&mut self) -> Result<Option<String>>;
    /// True once the remote process has finished and the stream is drained.
    fn finished(&self) -> bool;
}

pub struct OutputChannel {
    channel: ssh2::Channel,
}

impl OutputHandle for OutputChannel {
    fn read_chunk(&mut self) -> Result<Option<String>> {
        let mut buf = [0u8; READ_CHUNK];
        match self.channel.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn finished(&self) -> bool {
        self.channel.eof()
    }
}

/// One authenticated remote shell connection. Unknown host keys are
/// trusted on first contact; the fleet is assumed to be provisioned by the
/// operator running the sweep.
pub struct Session {
    pub host: String,
    pub user: String,
    passwd: String,
    inner: Option<ssh2::Session>,
}

impl Session {
    pub fn connect(host: &str, user: &str, passwd: &str) -> Result<Self, ConnectError> {
        let tcp = TcpStream::connect((host, SSH_PORT)).map_err(|e| ConnectError::Tcp {
            host: host.into(),
            port: SSH_PORT,
            source: e,
        })?;

        let mut sess = ssh2::Session::new().map_err(|e| ConnectError::Handshake {
            host: host.into(),
            source: e,
        })?;
        sess.set_tcp_stream(tcp);
        sess.handshake().map_err(|e| ConnectError::Handshake {
            host: host.into(),
            source: e,
        })?;

        sess.userauth_password(user, passwd)
            .map_err(|e| ConnectError::Auth {
                user: user.into(),
                host: host.into(),
                source: e,
            })?;

        Ok(Self {
            host: host.into(),
            user: user.into(),
            passwd: passwd.into(),
            inner: Some(sess),
        })
    }

    fn dispatch(
        &self,
        commands: &[String],
        opts: &ExecOpts,
        merge_stderr: bool,
    ) -> Result<ssh2::Channel> {
        let sess = match self.inner.as_ref() {
            Some(v) => v,
            None => bail!("session to {} is closed", self.host),
        };
        sess.set_blocking(true);

        let cmd = commands.join(" && ");
        debug!("{}@{}: $ {}", self.user, self.host, &cmd);

        let mut channel = sess.channel_session()?;
        if merge_stderr {
            channel.handle_extended_data(ssh2::ExtendedData::Merge)?;
        }
        channel.exec(&cmd)?;

        for _ in 0..opts.sudo_passwd_writes {
            channel.write_all(self.passwd.as_bytes())?;
            channel.write_all(b"\n")?;
        }
        if opts.sudo_passwd_writes > 0 {
            channel.flush()?;
        }

        Ok(channel)
    }

    /// Runs `commands` chained with && and blocks until completion.
    /// Returns (stdout, stderr); a non-zero exit status is the caller's
    /// problem, matching shell `|| true` usage in cleanup commands.
    pub fn execute(&self, commands: &[String], opts: &ExecOpts) -> Result<(String, String)> {
        let mut channel = self.dispatch(commands, opts, false)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;
        channel.wait_close()?;

        if let Ok(status) = channel.exit_status() {
            if status != 0 {
                debug!("{}@{}: exit status {}", self.user, self.host, status);
            }
        }

        Ok((stdout, stderr))
    }

    /// Same dispatch but returns immediately with a live output handle.
    /// stderr is merged into the stream so statistics lines can't be
    /// missed. The underlying connection switches to streaming
    /// (non-blocking) mode until the next `execute` call on this session.
    pub fn execute_non_blocking(
        &self,
        commands: &[String],
        opts: &ExecOpts,
    ) -> Result<OutputChannel> {
        let channel = self.dispatch(commands, opts, true)?;
        // dispatch() can only succeed with inner present.
        self.inner.as_ref().unwrap().set_blocking(false);
        Ok(OutputChannel { channel })
    }

    /// Releases the connection. Safe to call repeatedly and on broken
    /// connections.
    pub fn close(&mut self) {
        if let Some(sess) = self.inner.take() {
            sess.set_blocking(true);
            let _ = sess.disconnect(None, "done", None);
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            host: "test".into(),
            user: "test".into(),
            passwd: "".into(),
            inner: Some(ssh2::Session::new().unwrap()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
