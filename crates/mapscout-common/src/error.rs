/// Error types shared by crates that talk to the upstream Gemini service.
///
/// Transport and upstream failures live in [`crate::gemini::GeminiClientError`];
/// this enum covers setup problems detected before any request is made.
/// Application crates wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("config error: {0}")]
    Config(String),
}
