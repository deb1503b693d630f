pub mod dispatcher;
pub mod task;

use std::sync::Arc;

pub use dispatcher::DispatchError;

use crate::config::Config;
use crate::transport::Transport;
use crate::utils::gate::Gate;
use crate::utils::report::Summary;

/// Fetches every locator into `config.destination`. The gate lives for
/// exactly this call.
pub async fn download(
    config: &Config,
    locators: Vec<String>,
    transport: Arc<dyn Transport>,
) -> Result<Summary, DispatchError> {
    let gate = Gate::new(config.capacity);
    dispatcher::dispatch(
        config.destination.clone(),
        locators,
        &gate,
        transport,
        config.timeout,
    )
    .await
}
