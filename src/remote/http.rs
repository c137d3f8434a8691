//! Blocking HTTP transport for the APM web interface

use tracing::debug;

use crate::common::{CraneError, CraneResult, Transport};

/// Server-side script that executes one command
const COMMAND_SCRIPT: &str = "online/apm_line.php";

pub struct HttpTransport {
    server: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(server: &str) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            agent: ureq::Agent::new(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn command_url(&self) -> String {
        format!("{}/{}", self.server, COMMAND_SCRIPT)
    }

    pub fn resource_url(&self, app: &str, resource: &str) -> String {
        format!("{}/online/{}/{}", self.server, app, resource)
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, app: &str, command: &str) -> CraneResult<String> {
        let url = self.command_url();
        debug!(%url, app, "POST command");
        let response = self
            .agent
            .post(&url)
            .send_form(&[("p", app), ("a", command)])
            .map_err(|e| transport_error(&url, e))?;
        Ok(response.into_string()?)
    }

    fn fetch(&mut self, app: &str, resource: &str) -> CraneResult<String> {
        let url = self.resource_url(app, resource);
        debug!(%url, "GET resource");
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| transport_error(&url, e))?;
        Ok(response.into_string()?)
    }
}

fn transport_error(url: &str, error: ureq::Error) -> CraneError {
    match error {
        ureq::Error::Status(code, response) => CraneError::TransportError(format!(
            "{} returned HTTP {} {}",
            url,
            code,
            response.status_text()
        )),
        ureq::Error::Transport(transport) => {
            CraneError::TransportError(format!("{}: {}", url, transport))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let http = HttpTransport::new("http://byu.apmonitor.com/");
        assert_eq!(http.server(), "http://byu.apmonitor.com");
        assert_eq!(http.command_url(), "http://byu.apmonitor.com/online/apm_line.php");
        assert_eq!(
            http.resource_url("crane_pendulum", "results.csv"),
            "http://byu.apmonitor.com/online/crane_pendulum/results.csv"
        );
    }

    #[test]
    fn test_unreachable_server_is_transport_error() {
        // port 9 on localhost is not served in the test environment
        let mut http = HttpTransport::new("http://127.0.0.1:9");
        let err = http.send("crane", "clear all").unwrap_err();
        assert!(matches!(err, CraneError::TransportError(_)));
    }
}
