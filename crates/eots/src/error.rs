use thiserror::Error;

#[derive(Debug, Error)]
pub enum EotsError {
    #[error("expected 32 bytes, got {0}")]
    InvalidInputLength(usize),

    #[error("bytes do not encode a valid scalar")]
    ScalarParseFailed,

    #[error("bytes do not encode an x coordinate on the curve")]
    PointParseFailed,

    #[error("secret key parse failed")]
    SecretKeyParseFailed,

    #[error("challenge delta is not invertible")]
    NotInvertible,
}
