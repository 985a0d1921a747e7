use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A credential or endpoint required by an external service is missing.
    #[error("Missing configuration: {0}")]
    Configuration(String),

    /// The analysis service answered with something that is not the expected JSON.
    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),

    /// Stored goal state could not be decoded. Recovered inside the store.
    #[error("Stored goal state is corrupt: {0}")]
    StorageCorruption(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Analysis service returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
