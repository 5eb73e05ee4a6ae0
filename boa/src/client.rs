//! Blocking client for the archive's TAP and retrieval endpoints.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};

use crate::config::{default_config_path, Credentials};
use crate::download::{self, RetrieveOptions};
use crate::error::{Error, Result};
use crate::packets::{PacketQuery, EVENT_SERVICE_TYPE, REDUCED_DROP_COLUMNS};
use crate::table::{ResultTable, Value};
use crate::tap::{self, DEFAULT_MAX_ROWS};

/// Operational TAP service.
pub const DEFAULT_TAP_URL: &str = "https://boa.esac.esa.int/boa-tap/tap";

/// Operational retrieval service.
pub const DEFAULT_DOWNLOAD_URL: &str = "https://boa.esac.esa.int/boa-sl";

const SUBSYSTEM_QUERY: &str = "select distinct subsystem_id from subsystem";

/// Client for the BepiColombo Operational Archive.
///
/// Holds the service URLs and credentials; none of these change after
/// construction. Every operation is a single blocking request/response
/// exchange with no retries.
#[derive(Debug, Clone)]
pub struct BoaClient {
    tap_url: String,
    download_url: String,
    credentials: Credentials,
    http: Client,
}

/// Builder for [`BoaClient`].
///
/// Credentials come from, in order: [`credentials`](Self::credentials),
/// [`config_file`](Self::config_file), or the default config location.
#[derive(Debug, Default)]
pub struct BoaClientBuilder {
    tap_url: Option<String>,
    download_url: Option<String>,
    config_file: Option<PathBuf>,
    credentials: Option<Credentials>,
}

impl BoaClientBuilder {
    pub fn tap_url(mut self, url: impl Into<String>) -> Self {
        self.tap_url = Some(url.into());
        self
    }

    pub fn download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Use these credentials instead of reading a config file.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn build(self) -> Result<BoaClient> {
        let tap_url = trim_url(self.tap_url.as_deref().unwrap_or(DEFAULT_TAP_URL));
        let download_url = trim_url(self.download_url.as_deref().unwrap_or(DEFAULT_DOWNLOAD_URL));

        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None => {
                let path = match self.config_file {
                    Some(path) => path,
                    None => default_config_path()?,
                };
                debug!("loading credentials from {}", path.display());
                Credentials::from_file(&path)?
            }
        };

        let http = Client::builder()
            .user_agent(concat!("boa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::network(&tap_url, e))?;

        Ok(BoaClient {
            tap_url,
            download_url,
            credentials,
            http,
        })
    }
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

impl BoaClient {
    /// Create a client for `url` (default [`DEFAULT_TAP_URL`]) with
    /// credentials from `config_file` (default location when `None`).
    pub fn new(url: Option<&str>, config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(url) = url {
            builder = builder.tap_url(url);
        }
        if let Some(path) = config_file {
            builder = builder.config_file(path);
        }
        builder.build()
    }

    pub fn builder() -> BoaClientBuilder {
        BoaClientBuilder::default()
    }

    pub fn tap_url(&self) -> &str {
        &self.tap_url
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    pub fn login(&self) -> &str {
        self.credentials.login()
    }

    // === HTTP helpers ===

    fn get(&self, url: &str) -> RequestBuilder {
        self.http
            .get(url)
            .basic_auth(self.credentials.login(), Some(self.credentials.password()))
    }

    /// Whether `url` is served by the archive (same scheme, host and port as
    /// the TAP or retrieval service). Credentials are only sent there.
    fn is_archive_url(&self, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        [&self.tap_url, &self.download_url]
            .into_iter()
            .filter_map(|base| Url::parse(base).ok())
            .any(|base| base.origin() == url.origin())
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<Response> {
        debug!("GET {url}");
        request.send().map_err(|e| Error::network(url, e))
    }

    /// Map the status of a retrieval response onto the error taxonomy.
    fn check_retrieval(url: &str, identifier: &str, response: Response) -> Result<Response> {
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Err(Error::NotFound {
                identifier: identifier.to_string(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Auth {
                url: url.to_string(),
                status: status.as_u16(),
            }),
            s if s.is_success() => Ok(response),
            s => Err(Error::Server {
                url: url.to_string(),
                status: s.as_u16(),
                message: response.text().unwrap_or_default().trim().to_string(),
            }),
        }
    }

    // === Queries ===

    /// Run an ADQL query with the default row limit.
    pub fn query(&self, adql: &str) -> Result<ResultTable> {
        self.query_with_limit(adql, DEFAULT_MAX_ROWS)
    }

    /// Run an ADQL query returning at most `max_rows` rows.
    pub fn query_with_limit(&self, adql: &str, max_rows: u32) -> Result<ResultTable> {
        let url = format!("{}/sync", self.tap_url);
        debug!("Query: {adql}");

        let request = self.get(&url).query(&tap::sync_params(adql, max_rows));
        let response = self.send(&url, request)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|e| Error::network(&url, e))?;

        if !status.is_success() {
            return Err(Error::Query {
                status: status.as_u16(),
                message: tap::rejection_message(&String::from_utf8_lossy(&body)),
            });
        }

        // A CSV header never starts with '<', so this is a VOTable document.
        if body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'<') {
            let text = String::from_utf8_lossy(&body);
            return match tap::error_message(&text) {
                Some(message) => Err(Error::Query {
                    status: status.as_u16(),
                    message,
                }),
                None => Err(Error::invalid_response(
                    &url,
                    "expected CSV but received an XML document",
                )),
            };
        }

        let table =
            tap::parse_csv(&body).map_err(|e| Error::invalid_response(&url, e.to_string()))?;

        debug!("query returned {} rows", table.len());
        if max_rows > 0 && table.len() >= max_rows as usize {
            warn!(
                "number of rows returned is limited by the query - increase max_rows to see more"
            );
        }

        Ok(table)
    }

    // === Downloads ===

    fn product_url(&self, identifier: &str) -> String {
        if identifier.starts_with("http://") || identifier.starts_with("https://") {
            identifier.to_string()
        } else {
            format!(
                "{}/retrieve-data?{}",
                self.download_url,
                urlencoding::encode(identifier)
            )
        }
    }

    /// Fetch a product and write it to `destination`.
    ///
    /// `identifier` is appended, percent-encoded, to the retrieval endpoint.
    /// An absolute `http(s)` URL (such as a packet's `retrieval_url`) is
    /// fetched as is, without credentials unless it points at the archive.
    /// Nothing is left at `destination` if the transfer fails.
    pub fn download(&self, identifier: &str, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        let url = self.product_url(identifier);

        let request = if self.is_archive_url(&url) {
            self.get(&url)
        } else {
            debug!("{url} is not an archive URL, sending no credentials");
            self.http.get(&url)
        };
        let response = self.send(&url, request)?;
        let mut response = Self::check_retrieval(&url, identifier, response)?;

        let bytes = download::write_atomically(&mut response, destination, |e| {
            Error::network(&url, e)
        })?;

        info!("retrieved {} ({bytes} bytes)", destination.display());
        Ok(())
    }

    /// Retrieve the products selected by an ADQL query.
    ///
    /// Queries on `boa.telemetry_packet` are sent with an explicit
    /// `dataformat` (GDDS when `options.binary`, otherwise XML). The file is
    /// named from the response's `Content-Disposition` header and written to
    /// `options.directory`. With `options.extract` the tar archive is
    /// unpacked there and the extracted files are returned; otherwise the
    /// downloaded file is.
    pub fn retrieve_data(&self, adql: &str, options: &RetrieveOptions) -> Result<Vec<PathBuf>> {
        let base = format!("{}/retrieve-data", self.download_url);

        let (url, request) = if adql.to_lowercase().contains("boa.telemetry_packet") {
            let format = if options.binary { "GDDS" } else { "XML" };
            let request = self
                .get(&base)
                .query(&[("dataformat", format), ("QUERY", adql)]);
            (base, request)
        } else {
            let url = format!("{base}?{}", urlencoding::encode(adql));
            let request = self.get(&url);
            (url, request)
        };

        let response = self.send(&url, request)?;
        let mut response = Self::check_retrieval(&url, adql, response)?;

        let filename = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(download::filename_from_content_disposition)
            .ok_or_else(|| {
                Error::invalid_response(&url, "no file name in Content-Disposition header")
            })?;

        let path = options.directory.join(&filename);
        download::write_atomically(&mut response, &path, |e| Error::network(&url, e))?;
        info!("retrieved file {filename}");

        if options.extract {
            download::extract_archive(&path, &options.directory)
        } else {
            Ok(vec![path])
        }
    }

    // === Telemetry packets ===

    /// Subsystem identifiers known to the archive.
    pub fn subsystems(&self) -> Result<Vec<String>> {
        let table = self.query(SUBSYSTEM_QUERY)?;
        let column = table.column("subsystem_id").ok_or_else(|| {
            Error::invalid_response(&self.tap_url, "subsystem query returned no subsystem_id")
        })?;

        Ok(column
            .into_iter()
            .filter(|v| !v.is_null())
            .map(Value::to_string)
            .collect())
    }

    fn validate_subsystem(&self, name: &str) -> Result<()> {
        let valid = self.subsystems()?;
        if valid.iter().any(|s| s == name) {
            Ok(())
        } else {
            Err(Error::InvalidSubsystem {
                name: name.to_string(),
                valid,
            })
        }
    }

    /// Query telemetry packets.
    ///
    /// A named subsystem is checked against [`subsystems`](Self::subsystems)
    /// first. Time columns are returned as [`Value::Timestamp`].
    pub fn query_packets(&self, query: &PacketQuery) -> Result<ResultTable> {
        if let Some(subsystem) = &query.subsystem {
            self.validate_subsystem(subsystem)?;
        }

        let mut packets = self.query_with_limit(&query.to_adql(), query.max_rows)?;
        if query.reduced {
            packets = packets.without_columns(&REDUCED_DROP_COLUMNS);
        }
        let packets = packets.with_parsed_times();

        info!("{} matching telemetry packets found", packets.len());
        Ok(packets)
    }

    /// Event report packets (service type 5) of one subsystem.
    pub fn events(
        &self,
        subsystem: &str,
        start: Option<NaiveDateTime>,
        stop: Option<NaiveDateTime>,
    ) -> Result<ResultTable> {
        let query = PacketQuery {
            start,
            stop,
            ..PacketQuery::new()
                .subsystem(subsystem)
                .service_type(EVENT_SERVICE_TYPE)
        };
        self.query_packets(&query)
    }

    /// Retrieve the packet files of one subsystem for a time window.
    pub fn retrieve_packets(
        &self,
        subsystem: &str,
        start: Option<NaiveDateTime>,
        stop: Option<NaiveDateTime>,
        options: &RetrieveOptions,
    ) -> Result<Vec<PathBuf>> {
        let query = PacketQuery {
            start,
            stop,
            ..PacketQuery::new().subsystem(subsystem)
        };
        if let Some(subsystem) = &query.subsystem {
            self.validate_subsystem(subsystem)?;
        }
        self.retrieve_data(&query.to_adql(), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BoaClient {
        BoaClient::builder()
            .credentials(Credentials::new("userone", "blah"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_urls() {
        let client = client();
        assert_eq!(client.tap_url(), DEFAULT_TAP_URL);
        assert_eq!(client.download_url(), DEFAULT_DOWNLOAD_URL);
        assert_eq!(client.login(), "userone");
    }

    #[test]
    fn test_trailing_slashes_trimmed() {
        let client = BoaClient::builder()
            .tap_url("http://localhost:8080/tap/")
            .download_url("http://localhost:8080/sl//")
            .credentials(Credentials::new("a", "b"))
            .build()
            .unwrap();
        assert_eq!(client.tap_url(), "http://localhost:8080/tap");
        assert_eq!(client.download_url(), "http://localhost:8080/sl");
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yml");
        let err = BoaClient::new(None, Some(path.as_path())).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(crate::config::ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_archive_url_matches_origin() {
        let client = client();
        assert!(client.is_archive_url("https://boa.esac.esa.int/boa-sl/retrieve-data?x=1"));
        assert!(client.is_archive_url("https://boa.esac.esa.int:443/other"));
        assert!(!client.is_archive_url("http://boa.esac.esa.int/boa-sl/retrieve-data?x=1"));
        assert!(!client.is_archive_url("https://mirror.example.org/boa-sl/retrieve-data"));
        assert!(!client.is_archive_url("https://boa.esac.esa.int.example.org/"));
        assert!(!client.is_archive_url("not a url"));
    }

    #[test]
    fn test_product_url() {
        let client = client();
        assert_eq!(
            client.product_url("product-1"),
            "https://boa.esac.esa.int/boa-sl/retrieve-data?product-1"
        );
        assert_eq!(
            client.product_url("item_id=12 3"),
            "https://boa.esac.esa.int/boa-sl/retrieve-data?item_id%3D12%203"
        );
        assert_eq!(
            client.product_url("https://boa.esac.esa.int/boa-sl/retrieve-data?x=1"),
            "https://boa.esac.esa.int/boa-sl/retrieve-data?x=1"
        );
    }
}
