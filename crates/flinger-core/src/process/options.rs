//! Start requests and the options they are built from.

use super::layout::ServerLayout;
use std::fmt;

/// Marker passed to the server when no password is configured.
pub const NO_AUTH_ARG: &str = "-SecurityTypes=None";
/// Security type used when a password is configured.
pub const VNC_AUTH_ARG: &str = "-SecurityTypes=VncAuth";

/// A single start request: an optional password and the server arguments.
///
/// Arguments are handed to the server verbatim. The supervisor never
/// validates option syntax.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StartRequest {
    password: Option<String>,
    args: Vec<String>,
}

impl StartRequest {
    pub fn new(password: Option<String>, args: Vec<String>) -> Self {
        Self { password, args }
    }

    /// The password, if one was given and it is not empty.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

impl fmt::Debug for StartRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartRequest")
            .field("password", &self.password().map(|_| "<redacted>"))
            .field("args", &self.args)
            .finish()
    }
}

/// User-facing server options, turned into a [`StartRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOptions {
    /// Listening port, passed as `-rfbport=<port>`.
    pub port: Option<u16>,
    /// Connection password. Empty means no authentication.
    pub password: Option<String>,
    /// Additional raw parameters, whitespace separated.
    pub extra: String,
}

impl ServerOptions {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    /// Build the argument list for the server.
    ///
    /// A password selects VNC authentication against the credential file;
    /// no password passes the explicit no-auth marker instead.
    pub fn to_args(&self, layout: &ServerLayout) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.port {
            args.push(format!("-rfbport={}", port));
        }
        if self.has_password() {
            args.push(VNC_AUTH_ARG.to_string());
            args.push(format!(
                "-PasswordFile={}",
                layout.credential_file().display()
            ));
        } else {
            args.push(NO_AUTH_ARG.to_string());
        }
        args.extend(self.extra.split_whitespace().map(str::to_string));
        args
    }

    /// Build the start request for the given layout.
    pub fn into_request(self, layout: &ServerLayout) -> StartRequest {
        let args = self.to_args(layout);
        StartRequest::new(self.password, args)
    }

    fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}
