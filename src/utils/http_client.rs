use reqwest::Client;
use std::time::Duration;

/// Client for the storage REST calls. Container create/delete answer quickly,
/// so the timeouts are short.
pub fn new_api_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
}
