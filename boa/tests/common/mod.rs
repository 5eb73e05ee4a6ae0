//! Mock archive shared by the integration tests.
//!
//! The client is blocking, so the mock server is driven from its own tokio
//! runtime and every client call is made from the plain test thread.

#![allow(dead_code)]

use boa::{BoaClient, Credentials};
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer, Request};

pub const LOGIN: &str = "userone";
pub const PASSWORD: &str = "blah";

pub const TAP_PATH: &str = "/boa-tap/tap";
pub const DOWNLOAD_PATH: &str = "/boa-sl";

pub struct MockArchive {
    // Dropped before the runtime so expectations are verified first.
    server: MockServer,
    rt: Runtime,
}

impl MockArchive {
    pub fn start() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let rt = Runtime::new().expect("Failed to build tokio runtime");
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    pub fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    pub fn tap_url(&self) -> String {
        format!("{}{TAP_PATH}", self.server.uri())
    }

    pub fn download_url(&self) -> String {
        format!("{}{DOWNLOAD_PATH}", self.server.uri())
    }

    pub fn client(&self) -> BoaClient {
        BoaClient::builder()
            .tap_url(self.tap_url())
            .download_url(self.download_url())
            .credentials(Credentials::new(LOGIN, PASSWORD))
            .build()
            .expect("Failed to build client")
    }

    pub fn received(&self) -> Vec<Request> {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }
}

/// Matches requests whose `name` query parameter contains `needle`.
pub fn param_contains(
    name: &'static str,
    needle: &'static str,
) -> impl Fn(&Request) -> bool + Send + Sync + 'static {
    move |req: &Request| {
        req.url
            .query_pairs()
            .any(|(k, v)| k == name && v.contains(needle))
    }
}

/// Build an uncompressed tar archive in memory.
pub fn tar_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *data)
            .expect("Failed to append tar member");
    }
    builder.into_inner().expect("Failed to finish tar")
}
