//! Telemetry packet queries.
//!
//! The archive's `TELEMETRY_PACKET` table holds one row per downlinked packet.
//! [`PacketQuery`] builds the ADQL for a time window and optional filters on
//! subsystem, PUS service type/subtype and SPID.

use chrono::{Duration, NaiveDateTime, Utc};

use crate::tap::DEFAULT_MAX_ROWS;

/// Timestamp layout expected by the archive, e.g. `2019-04-27 07:49:11.688000`.
pub const ADQL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// PUS service type of event reports.
pub const EVENT_SERVICE_TYPE: u8 = 5;

/// Bookkeeping columns removed from reduced packet tables.
pub const REDUCED_DROP_COLUMNS: [&str; 9] = [
    "item_id",
    "ground_station_id",
    "mib_version",
    "inactive",
    "ingested_time",
    "bscs_ingestion_time",
    "proprietary_end_date",
    "retrieval_url",
    "telemetry_packet_oid",
];

/// Query for telemetry packets.
///
/// Without explicit bounds the window is the last 24 hours (UTC).
#[derive(Debug, Clone, PartialEq)]
pub struct PacketQuery {
    pub start: Option<NaiveDateTime>,
    pub stop: Option<NaiveDateTime>,
    pub subsystem: Option<String>,
    pub spid: Option<u32>,
    pub service_type: Option<u8>,
    pub service_subtype: Option<u8>,
    pub max_rows: u32,
    /// Drop [`REDUCED_DROP_COLUMNS`] from the result.
    pub reduced: bool,
}

impl Default for PacketQuery {
    fn default() -> Self {
        Self {
            start: None,
            stop: None,
            subsystem: None,
            spid: None,
            service_type: None,
            service_subtype: None,
            max_rows: DEFAULT_MAX_ROWS,
            reduced: true,
        }
    }
}

impl PacketQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: NaiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn stop(mut self, stop: NaiveDateTime) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Restrict to one subsystem. Names are upper-cased.
    pub fn subsystem(mut self, subsystem: &str) -> Self {
        self.subsystem = Some(subsystem.to_uppercase());
        self
    }

    pub fn spid(mut self, spid: u32) -> Self {
        self.spid = Some(spid);
        self
    }

    pub fn service_type(mut self, service_type: u8) -> Self {
        self.service_type = Some(service_type);
        self
    }

    pub fn service_subtype(mut self, service_subtype: u8) -> Self {
        self.service_subtype = Some(service_subtype);
        self
    }

    pub fn max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn reduced(mut self, reduced: bool) -> Self {
        self.reduced = reduced;
        self
    }

    /// Resolve the time window against `now`.
    pub fn window(&self, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let start = self.start.unwrap_or(now - Duration::days(1));
        let stop = self.stop.unwrap_or(now);
        (start, stop)
    }

    /// ADQL text for this query, using the current time for open bounds.
    pub fn to_adql(&self) -> String {
        self.to_adql_at(Utc::now().naive_utc())
    }

    /// ADQL text for this query, resolving open bounds against `now`.
    pub fn to_adql_at(&self, now: NaiveDateTime) -> String {
        let (start, stop) = self.window(now);
        let mut adql = format!(
            "SELECT * FROM TELEMETRY_PACKET WHERE on_board_time >= '{}' and on_board_time <= '{}'",
            start.format(ADQL_TIME_FORMAT),
            stop.format(ADQL_TIME_FORMAT),
        );

        if let Some(subsystem) = &self.subsystem {
            adql.push_str(&format!(" and subsystem_id='{}'", escape_literal(subsystem)));
        }
        if let Some(service_type) = self.service_type {
            adql.push_str(&format!(" and source_packet_service_type={service_type}"));
        }
        if let Some(service_subtype) = self.service_subtype {
            adql.push_str(&format!(
                " and source_packet_service_subtype={service_subtype}"
            ));
        }
        if let Some(spid) = self.spid {
            adql.push_str(&format!(" and telemetry_packet_spid={spid}"));
        }

        adql
    }
}

/// Double single quotes so a value stays inside its ADQL string literal.
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}
