use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A diagnostic carried by a server `Error` or `EED` package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDiagnostic {
    pub number: i32,
    pub state: u8,
    pub severity: u8,
    pub message: String,
    pub server_name: String,
    pub proc_name: String,
    pub line: u16,
}

impl fmt::Display for ServerDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (severity {}, state {}): {}",
            self.number, self.severity, self.state, self.message
        )
    }
}

/// All errors the driver surfaces, per the protocol's error handling design.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A decoder asked for more bytes than the current buffer holds.
    ///
    /// Recovered internally by the framer pulling more packets; only
    /// observable by callers if it escapes a closed connection.
    #[error("not enough bytes to decode: wanted {wanted}, had {available}")]
    NotEnoughBytes { wanted: usize, available: usize },

    /// A package's declared length prefix didn't match the bytes consumed
    /// while decoding its body.
    #[error("framing mismatch: {context}: declared {declared} bytes, consumed {consumed}")]
    FramingMismatch {
        context: &'static str,
        declared: usize,
        consumed: usize,
    },

    /// An unexpected package kind or field count turned up during a
    /// negotiated exchange (login, dynamic prepare, ...).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server explicitly denied a login attempt.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// The caller asked for an encryption tier below the one this driver
    /// implements.
    #[error("unsupported encryption tier requested")]
    UnsupportedEncryption,

    /// The server negotiated an asymmetric cipher this driver doesn't
    /// implement (only RSA, asymmetric type 1, is supported).
    #[error("unsupported cipher suite: {0}")]
    UnsupportedCipher(u16),

    /// The server returned an `Error` or `EED` package.
    #[error("server error: {0}")]
    Server(ServerDiagnostic),

    /// A caller-supplied value could not be coerced to the target wire
    /// datatype.
    #[error("cannot convert value of kind {source_kind} to {target:?}")]
    CannotConvert {
        target: crate::types::DataType,
        source_kind: &'static str,
    },

    /// The connection has already been closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// A transport-level failure (not a server error reply) was observed
    /// on an operation that a pool needs to treat as fatal to the
    /// connection, e.g. a failed `ping`.
    #[error("connection is no longer usable: {0}")]
    BadConnection(String),

    /// A per-operation deadline elapsed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// The operation was canceled by its cancellation token.
    #[error("operation canceled")]
    Canceled,

    /// Transport-level I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// RSA/crypto failure while encrypting the login password or session
    /// key.
    #[error("crypto error: {0}")]
    Crypto(#[from] rsa::Error),
}

impl Error {
    /// True for errors that mean the underlying connection is no longer
    /// usable and should be discarded by a pool, rather than retried.
    pub fn is_bad_connection(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ConnectionClosed
                | Error::FramingMismatch { .. }
                | Error::ProtocolViolation(_)
                | Error::BadConnection(_)
        )
    }
}
