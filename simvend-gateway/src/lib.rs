pub mod five_sim;
pub mod mock;
pub mod xendit;

pub use five_sim::{classify_failure, FiveSimClient};
pub use mock::{MockPaymentGateway, MockProvisioningClient};
pub use xendit::XenditGateway;

use simvend_shared::Masked;
use std::time::Duration;

/// Connection settings shared by the HTTP adapters.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub api_url: String,
    pub api_key: Masked<String>,
    pub timeout: Duration,
}

impl HttpSettings {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: Masked(api_key.into()),
            timeout,
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.timeout).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let settings = HttpSettings::new("https://api.xendit.co/", "key", Duration::from_secs(5));
        assert_eq!(settings.endpoint("/v2/invoices"), "https://api.xendit.co/v2/invoices");

        let settings = HttpSettings::new("https://5sim.net/v1", "key", Duration::from_secs(5));
        assert_eq!(settings.endpoint("user/check/7"), "https://5sim.net/v1/user/check/7");
    }

    #[test]
    fn test_api_key_is_masked_in_debug() {
        let settings = HttpSettings::new("https://api.xendit.co", "xnd_secret", Duration::from_secs(5));
        assert!(!format!("{:?}", settings).contains("xnd_secret"));
    }
}
