//! Remote APM session: command transport, session ordering and data upload

pub mod data;
pub mod http;
pub mod session;

pub use data::DataTable;
pub use http::HttpTransport;
pub use session::{RemoteSession, SessionStage, VariableClass, RESULTS_RESOURCE};

#[cfg(test)]
pub(crate) mod mock {
    use crate::common::{CraneError, CraneResult, Transport};

    /// Records every command; serves `results` for any fetch when set
    #[derive(Debug, Default)]
    pub struct MockTransport {
        pub sent: Vec<(String, String)>,
        pub fetched: Vec<String>,
        pub results: Option<String>,
    }

    impl MockTransport {
        pub fn with_results(results: &str) -> Self {
            Self {
                results: Some(results.to_string()),
                ..Self::default()
            }
        }

        pub fn commands(&self) -> Vec<&str> {
            self.sent.iter().map(|(_, c)| c.as_str()).collect()
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, app: &str, command: &str) -> CraneResult<String> {
            self.sent.push((app.to_string(), command.to_string()));
            if command == "solve" {
                Ok("Successful solution".to_string())
            } else {
                Ok(String::new())
            }
        }

        fn fetch(&mut self, _app: &str, resource: &str) -> CraneResult<String> {
            self.fetched.push(resource.to_string());
            self.results.clone().ok_or_else(|| {
                CraneError::TransportError(format!("{} not found (HTTP 404)", resource))
            })
        }
    }
}
