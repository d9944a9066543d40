//! Over-the-air payload delivery client seam.
//!
//! The actual exploit delivery mechanism is an external collaborator; the
//! kiosk only needs an opaque "hack the server" / "upload and execute"
//! surface returning success plus auxiliary data.

use tracing::info;

pub trait OtaClient: Send {
    /// Point the client at a different OTA server (scenario switch).
    fn retarget(&mut self, url: &str);
    /// Attempt to compromise the server itself.
    fn hack_server(&mut self) -> (bool, String);
    /// Upload a binary to the compromised server and execute it.
    fn upload_and_execute(&mut self, path: &str) -> (bool, String);
}

/// Demo-mode client with deterministic outcomes: every operation succeeds
/// except against servers on the configured secure URL list.
pub struct DemoOtaClient {
    url: String,
    secure_urls: Vec<String>,
}

impl DemoOtaClient {
    pub fn new(secure_urls: Vec<String>) -> Self {
        Self {
            url: String::new(),
            secure_urls,
        }
    }

    fn target_is_secure(&self) -> bool {
        self.secure_urls.iter().any(|secure| *secure == self.url)
    }
}

impl OtaClient for DemoOtaClient {
    fn retarget(&mut self, url: &str) {
        info!(url, "OTA client retargeted");
        self.url = url.to_string();
    }

    fn hack_server(&mut self) -> (bool, String) {
        if self.target_is_secure() {
            (false, format!("hack rejected by {}", self.url))
        } else {
            (true, format!("shell obtained on {}", self.url))
        }
    }

    fn upload_and_execute(&mut self, path: &str) -> (bool, String) {
        if self.target_is_secure() {
            (false, format!("upload of {path} rejected"))
        } else {
            (true, format!("executed {path}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_client_refuses_secure_targets() {
        let mut client = DemoOtaClient::new(vec!["http://10.88.88.21:5050".to_string()]);

        client.retarget("http://10.88.88.11:5050");
        assert!(client.hack_server().0);
        assert!(client.upload_and_execute("payload.bin").0);

        client.retarget("http://10.88.88.21:5050");
        assert!(!client.hack_server().0);
        assert!(!client.upload_and_execute("payload.bin").0);
    }
}
