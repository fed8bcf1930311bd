#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[macro_use]
extern crate tracing;

mod session;

use cobaltrdp_connector::ConnectorError;
use cobaltrdp_session::SessionError;

pub use cobaltrdp_connector::{Config, Credentials, DesktopSize};
pub use cobaltrdp_session::{FrameSnapshot, InputEvent, MouseButton};
pub use session::{connect, ConnectOptions, PointerSnapshot, RdpSession};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection sequence failure; fatal.
    #[error("connection failed")]
    Connect(#[from] ConnectorError),

    /// Protocol failure while active; fatal, the session terminates.
    #[error("session failed")]
    Session(#[from] SessionError),

    /// TCP or TLS transport failure; fatal.
    #[error("transport I/O failed")]
    Io(#[from] std::io::Error),

    /// A setup read or a send missed its deadline; fatal.
    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// The operation was attempted before the session became active or
    /// after it was closed; the caller may retry on a live session.
    #[error("not connected")]
    NotConnected,

    /// The receive task already recorded a fatal error; the session is
    /// terminating.
    #[error("session terminated: {0}")]
    Terminated(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
