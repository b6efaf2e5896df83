pub mod credit;
pub mod history;
pub mod transport;

pub use credit::{CreditInfo, CreditReceipt, fetch_credit, receive_credit};
pub use history::{probe_history, wait_for_history};
pub use transport::ReqwestTransport;

use jimeng_core::client::RequestClient;
use jimeng_core::config::ClientConfig;
use jimeng_core::error::AppError;

/// Request client over the reqwest transport.
pub type JimengClient = RequestClient<ReqwestTransport>;

/// Builds a [`JimengClient`] honoring the configured request timeout.
pub fn connect(config: ClientConfig) -> Result<JimengClient, AppError> {
    let transport = ReqwestTransport::with_timeout(config.request_timeout)?;
    Ok(RequestClient::new(transport, config))
}
