use mapscout_common::error::CommonError;
use mapscout_common::gemini::GeminiClientError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Upstream(#[from] GeminiClientError),

    #[error(transparent)]
    Common(#[from] CommonError),
}
