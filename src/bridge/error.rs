use crate::api::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Api(#[from] ApiError),
}
