use std::future::Future;

use crate::error::AppError;
use crate::models::{OutgoingRequest, RawResponse};

/// Sends one signed request over the wire.
///
/// Implementations report transport failures as [`AppError::Network`] and
/// return every received response, whatever its status; status handling
/// and retries belong to the request client. Must be safe for concurrent use.
pub trait Transport: Send + Sync + Clone {
    fn send(
        &self,
        request: &OutgoingRequest,
    ) -> impl Future<Output = Result<RawResponse, AppError>> + Send;
}
