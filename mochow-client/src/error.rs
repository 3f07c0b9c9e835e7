pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors returned by [`crate::MochowClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with an error status or a non-zero result code.
    #[error("mochow server error (http {status}, code {code}): {msg}")]
    Server { status: u16, code: i64, msg: String },

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be read or decoded.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// A required argument was empty or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}
