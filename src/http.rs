use std::time::Duration;

use reqwest::blocking::Client;

pub fn user_agent() -> String {
    format!("spectrator/{}", env!("CARGO_PKG_VERSION"))
}

/// Blocking client shared by the archive adapters. Every request is a
/// single attempt; failures surface to the caller as-is.
pub fn client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent())
        .timeout(timeout)
        .build()
}
