use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProtocolError {
    #[snafu(display("{id_type} '{raw}' is not a valid handle"))]
    InvalidHandle {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: std::num::ParseIntError,
    },
    #[snafu(display("video identifier must not be empty"))]
    EmptyVideoId { stage: &'static str },
    #[snafu(display("failed to encode envelope on `{stage}`: {source}"))]
    EncodeEnvelope {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to decode envelope on `{stage}`: {source}"))]
    DecodeEnvelope {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
