use thiserror::Error;

/// Base value of the numeric error codes reported by [`ErrorCode::code`].
pub const ERROR_CODE_BASE: i32 = 0x0011_1122;

/// Numeric value reported for a successful call.
pub const OK_CODE: i32 = 0;

/// Stable, transport-independent outcome of a failed client call.
///
/// Success is expressed as `Ok(..)` on the client methods, so there is no
/// `Ok` variant here. Use [`ErrorCode::code`] when a numeric value has to
/// cross a process or language boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[error("could not resolve proxy name")]
    CouldNotResolveProxy,

    #[error("could not resolve host name")]
    CouldNotResolveHost,

    #[error("could not connect to server")]
    CouldNotConnect,

    #[error("out of memory")]
    OutOfMemory,

    #[error("TLS handshake failed")]
    TlsHandshakeFailed,

    #[error("server certificate failed verification")]
    PeerVerificationFailed,

    #[error("failed sending data to the peer")]
    SendError,

    #[error("failed receiving data from the peer")]
    ReceiveError,

    #[error("problem with the local certificate or CA bundle")]
    LocalCertificateProblem,

    #[error("request timed out")]
    RequestTimeout,

    #[error("failed to create request data")]
    RequestDataCreationFailed,

    #[error("failed to initialize the client")]
    ClientInitFailed,

    #[error("request cancelled by user")]
    UserCancelled,

    #[error("unknown failure")]
    UnknownFailure,
}

impl ErrorCode {
    /// Numeric code of this outcome; see [`ERROR_CODE_BASE`].
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::CouldNotResolveProxy => ERROR_CODE_BASE + 0x01,
            Self::CouldNotResolveHost => ERROR_CODE_BASE + 0x02,
            Self::CouldNotConnect => ERROR_CODE_BASE + 0x03,
            Self::OutOfMemory => ERROR_CODE_BASE + 0x04,
            Self::TlsHandshakeFailed => ERROR_CODE_BASE + 0x05,
            Self::PeerVerificationFailed => ERROR_CODE_BASE + 0x06,
            Self::SendError => ERROR_CODE_BASE + 0x07,
            Self::ReceiveError => ERROR_CODE_BASE + 0x08,
            Self::LocalCertificateProblem => ERROR_CODE_BASE + 0x09,
            Self::RequestTimeout => ERROR_CODE_BASE + 0x10,
            Self::RequestDataCreationFailed => ERROR_CODE_BASE + 0x11,
            Self::ClientInitFailed => ERROR_CODE_BASE + 0x12,
            Self::UserCancelled => ERROR_CODE_BASE + 0x13,
            Self::UnknownFailure => -1,
        }
    }

    /// Whether the client retries a call that ended with this outcome.
    ///
    /// Only timeouts and refused/unreachable connections qualify; every other
    /// failure is terminal for the current call.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::RequestTimeout | Self::CouldNotConnect)
    }
}

/// Low-level result code reported by a [`Transport`](crate::Transport).
///
/// Modelled on the result codes of classic C transfer libraries so that any
/// engine can report its failures without knowing about [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportCode {
    #[default]
    Ok,
    UnsupportedProtocol,
    FailedInit,
    UrlMalformed,
    CouldNotResolveProxy,
    CouldNotResolveHost,
    CouldNotConnect,
    OutOfMemory,
    OperationTimedOut,
    SslConnectError,
    PeerFailedVerification,
    SslCertProblem,
    SslCaCertBadFile,
    SendError,
    RecvError,
    GotNothing,
    AbortedByCallback,
    TooManyRedirects,
    BadContentEncoding,
    /// A request header line or option value was rejected.
    BadFunctionArgument,
    /// Engine-specific code with no named counterpart.
    Other(i32),
}

impl TransportCode {
    /// Human readable description, for diagnostics only.
    #[must_use]
    pub fn strerror(self) -> String {
        let text = match self {
            Self::Ok => "No error",
            Self::UnsupportedProtocol => "Unsupported protocol",
            Self::FailedInit => "Failed initialization",
            Self::UrlMalformed => "URL using bad/illegal format or missing URL",
            Self::CouldNotResolveProxy => "Couldn't resolve proxy name",
            Self::CouldNotResolveHost => "Couldn't resolve host name",
            Self::CouldNotConnect => "Couldn't connect to server",
            Self::OutOfMemory => "Out of memory",
            Self::OperationTimedOut => "Timeout was reached",
            Self::SslConnectError => "SSL connect error",
            Self::PeerFailedVerification => {
                "SSL peer certificate or SSH remote key was not OK"
            }
            Self::SslCertProblem => "Problem with the local SSL certificate",
            Self::SslCaCertBadFile => "Problem with the SSL CA cert (path? access rights?)",
            Self::SendError => "Failed sending data to the peer",
            Self::RecvError => "Failure when receiving data from the peer",
            Self::GotNothing => "Server returned nothing (no headers, no data)",
            Self::AbortedByCallback => "Operation was aborted by an application callback",
            Self::TooManyRedirects => "Number of redirects hit maximum amount",
            Self::BadContentEncoding => "Unrecognized or bad HTTP Content or Transfer-Encoding",
            Self::BadFunctionArgument => "A transport function was given a bad argument",
            Self::Other(code) => return format!("Unknown error ({code})"),
        };
        text.to_owned()
    }
}

/// Map a transport result to the domain taxonomy.
///
/// This is the only place where transport codes are interpreted; nothing
/// past the client boundary ever sees a [`TransportCode`].
///
/// # Errors
///
/// Returns the [`ErrorCode`] matching any code other than [`TransportCode::Ok`].
/// Codes without a dedicated counterpart map to [`ErrorCode::UnknownFailure`].
pub fn translate(code: TransportCode) -> Result<(), ErrorCode> {
    let err = match code {
        TransportCode::Ok => return Ok(()),
        TransportCode::CouldNotResolveProxy => ErrorCode::CouldNotResolveProxy,
        TransportCode::CouldNotResolveHost => ErrorCode::CouldNotResolveHost,
        TransportCode::CouldNotConnect => ErrorCode::CouldNotConnect,
        TransportCode::OutOfMemory => ErrorCode::OutOfMemory,
        TransportCode::SslConnectError => ErrorCode::TlsHandshakeFailed,
        TransportCode::PeerFailedVerification => ErrorCode::PeerVerificationFailed,
        TransportCode::SendError => ErrorCode::SendError,
        TransportCode::RecvError | TransportCode::GotNothing => ErrorCode::ReceiveError,
        TransportCode::SslCertProblem | TransportCode::SslCaCertBadFile => {
            ErrorCode::LocalCertificateProblem
        }
        TransportCode::OperationTimedOut => ErrorCode::RequestTimeout,
        TransportCode::FailedInit => ErrorCode::ClientInitFailed,
        TransportCode::AbortedByCallback => ErrorCode::UserCancelled,
        TransportCode::BadFunctionArgument => ErrorCode::RequestDataCreationFailed,
        TransportCode::UnsupportedProtocol
        | TransportCode::UrlMalformed
        | TransportCode::TooManyRedirects
        | TransportCode::BadContentEncoding
        | TransportCode::Other(_) => ErrorCode::UnknownFailure,
    };
    Err(err)
}

/// Failure while materializing a request body.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ContentError {
    /// A multipart part could not be built; the whole form is discarded.
    #[error("multipart part #{index} is invalid: {reason}")]
    InvalidPart { index: usize, reason: String },

    /// A file referenced by a part could not be read.
    #[error("failed to read '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be serialized as JSON.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
