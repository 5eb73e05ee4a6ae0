//! ADQL queries against a mock TAP service.

mod common;

use std::io::Write;

use boa::{BoaClient, Error, Value, DEFAULT_TAP_URL};
use common::{MockArchive, LOGIN, PASSWORD, TAP_PATH};
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const SUBSYSTEM_CSV: &str = "subsystem_id,description,packets\n\
                             MAG,Magnetometer,1200\n\
                             PHEBUS,\"Probing of Hermean Exosphere, UV\",37\n\
                             SIXS,,0\n";

fn sync_path() -> String {
    format!("{TAP_PATH}/sync")
}

#[test]
fn test_query_returns_server_table() {
    let archive = MockArchive::start();
    let adql = "SELECT subsystem_id, description, packets FROM subsystem";
    archive.mount(
        Mock::given(method("GET"))
            .and(path(sync_path()))
            .and(basic_auth(LOGIN, PASSWORD))
            .and(query_param("LANG", "ADQL"))
            .and(query_param("REQUEST", "doQuery"))
            .and(query_param("MAXREC", "5000"))
            .and(query_param("FORMAT", "csv"))
            .and(query_param("QUERY", adql))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/csv")
                    .set_body_string(SUBSYSTEM_CSV),
            )
            .expect(1),
    );

    let table = archive.client().query(adql).unwrap();

    assert_eq!(table.columns(), ["subsystem_id", "description", "packets"]);
    assert_eq!(table.len(), 3);

    let expected = [
        [
            Value::Text("MAG".into()),
            Value::Text("Magnetometer".into()),
            Value::Int(1200),
        ],
        [
            Value::Text("PHEBUS".into()),
            Value::Text("Probing of Hermean Exosphere, UV".into()),
            Value::Int(37),
        ],
        [Value::Text("SIXS".into()), Value::Null, Value::Int(0)],
    ];
    for (row, expected) in table.rows().zip(expected.iter()) {
        assert_eq!(row.values(), expected);
    }
}

#[test]
fn test_query_with_limit_sends_maxrec() {
    let archive = MockArchive::start();
    archive.mount(
        Mock::given(method("GET"))
            .and(path(sync_path()))
            .and(query_param("MAXREC", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("n\n1\n2\n"))
            .expect(1),
    );

    let table = archive
        .client()
        .query_with_limit("SELECT TOP 2 n FROM t", 2)
        .unwrap();
    assert_eq!(table.len(), 2);
}

#[test]
fn test_unauthorized_is_auth_error() {
    let archive = MockArchive::start();
    archive.mount(
        Mock::given(method("GET"))
            .and(path(sync_path()))
            .respond_with(ResponseTemplate::new(401)),
    );

    let err = archive.client().query("SELECT 1").unwrap_err();
    match err {
        Error::Auth { status, .. } => assert_eq!(status, 401),
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[test]
fn test_forbidden_is_auth_error() {
    let archive = MockArchive::start();
    archive.mount(
        Mock::given(method("GET"))
            .and(path(sync_path()))
            .respond_with(ResponseTemplate::new(403)),
    );

    let err = archive.client().query("SELECT 1").unwrap_err();
    assert!(matches!(err, Error::Auth { status: 403, .. }));
}

#[test]
fn test_bad_request_is_query_error() {
    let archive = MockArchive::start();
    let doc = r#"<?xml version="1.0"?>
<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="ERROR">Unknown table "nosuch"</INFO>
</RESOURCE></VOTABLE>"#;
    archive.mount(
        Mock::given(method("GET"))
            .and(path(sync_path()))
            .respond_with(ResponseTemplate::new(400).set_body_string(doc)),
    );

    let err = archive.client().query("SELECT * FROM nosuch").unwrap_err();
    match err {
        Error::Query { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Unknown table \"nosuch\"");
        }
        other => panic!("expected query error, got {other:?}"),
    }
}

#[test]
fn test_error_document_with_ok_status_is_query_error() {
    let archive = MockArchive::start();
    let doc = r#"<VOTABLE><RESOURCE><INFO name="QUERY_STATUS" value="ERROR">syntax error near FROM</INFO></RESOURCE></VOTABLE>"#;
    archive.mount(
        Mock::given(method("GET"))
            .and(path(sync_path()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-votable+xml")
                    .set_body_string(doc),
            ),
    );

    let err = archive.client().query("SELECT FROM").unwrap_err();
    assert!(matches!(err, Error::Query { status: 200, .. }));
}

#[test]
fn test_server_error_is_query_error() {
    let archive = MockArchive::start();
    archive.mount(
        Mock::given(method("GET"))
            .and(path(sync_path()))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend unavailable")),
    );

    let err = archive.client().query("SELECT 1").unwrap_err();
    match err {
        Error::Query { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "backend unavailable");
        }
        other => panic!("expected query error, got {other:?}"),
    }
}

#[test]
fn test_connection_refused_is_network_error() {
    // Nothing listens on port 1.
    let client = BoaClient::builder()
        .tap_url("http://127.0.0.1:1/boa-tap/tap")
        .credentials(boa::Credentials::new(LOGIN, PASSWORD))
        .build()
        .unwrap();

    let err = client.query("SELECT 1").unwrap_err();
    assert!(matches!(err, Error::Network { .. }), "got {err:?}");
}

#[test]
fn test_client_from_config_file_uses_default_url() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "user:\n    login: {LOGIN}\n    password: {PASSWORD}").unwrap();

    let client = BoaClient::new(None, Some(config.path())).unwrap();

    assert_eq!(client.tap_url(), DEFAULT_TAP_URL);
    assert_eq!(client.login(), LOGIN);
}

#[test]
fn test_client_from_config_file_talks_to_given_url() {
    let archive = MockArchive::start();
    archive.mount(
        Mock::given(method("GET"))
            .and(path(sync_path()))
            .and(basic_auth("cfg-user", "cfg-pass"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x\n1\n"))
            .expect(1),
    );

    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "user:\n  login: cfg-user\n  password: cfg-pass").unwrap();

    let tap_url = archive.tap_url();
    let client = BoaClient::new(Some(&tap_url), Some(config.path())).unwrap();
    let table = client.query("SELECT x FROM t").unwrap();

    assert_eq!(table.row(0).unwrap().get("x"), Some(&Value::Int(1)));
}
