//! Client for the BepiColombo Operational Archive (BOA).
//!
//! The archive exposes a TAP service that answers ADQL queries and a
//! retrieval service that packages data products for download. Both use HTTP
//! Basic authentication with credentials kept in a small YAML file.
//!
//! All calls are blocking and perform exactly one request/response exchange.
//!
//! # Example
//!
//! ```no_run
//! use boa::BoaClient;
//!
//! // Default TAP URL, credentials from $BOA_CONFIG or ~/.boa_tap.yml
//! let client = BoaClient::new(None, None)?;
//!
//! let subsystems = client.query("select distinct subsystem_id from subsystem")?;
//! for row in subsystems.rows() {
//!     println!("{}", row.get("subsystem_id").unwrap());
//! }
//!
//! client.download("product-1", "/tmp/out.bin")?;
//! # Ok::<(), boa::Error>(())
//! ```

pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod packets;
pub mod table;
pub mod tap;

pub use client::{BoaClient, BoaClientBuilder, DEFAULT_DOWNLOAD_URL, DEFAULT_TAP_URL};
pub use config::{ConfigError, Credentials};
pub use download::RetrieveOptions;
pub use error::{Error, Result};
pub use packets::PacketQuery;
pub use table::{ResultTable, Row, Value};
