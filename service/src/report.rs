//! Query results and the JSON documents built from them

use crate::discovery::DiscoveryError;
use query::ErrorCategory;
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use shared::{ExtendedInfo, Player, ServerInfo, ServerOs, ServerType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl From<u8> for Visibility {
    fn from(raw: u8) -> Self {
        if raw == 0 {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// Extension block fields, present only when the server sent them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedRecord {
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub appid: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub game_version: String,
    #[serde(skip_serializing_if = "is_zero_u16")]
    pub port: u16,
    pub steamid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub game_mode: String,
    pub gameid: String,
}

fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

fn is_zero_u16(value: &u16) -> bool {
    *value == 0
}

impl From<ExtendedInfo> for ExtendedRecord {
    fn from(ext: ExtendedInfo) -> Self {
        Self {
            appid: ext.app_id,
            game_version: ext.game_version,
            port: ext.port,
            steamid: ext.steam_id.to_string(),
            game_mode: ext.keywords,
            gameid: ext.game_id.to_string(),
        }
    }
}

/// A server that answered its info query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerRecord {
    pub ip: String,
    pub protocol: u8,
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub os: ServerOs,
    pub visibility: Visibility,
    pub vac: bool,
    #[serde(flatten)]
    pub extended: Option<ExtendedRecord>,
    /// Absent when nobody is connected, empty when the player query failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players_online: Option<Vec<Player>>,
}

impl ServerRecord {
    pub fn new(ip: impl Into<String>, info: ServerInfo, players_online: Option<Vec<Player>>) -> Self {
        Self {
            ip: ip.into(),
            protocol: info.protocol,
            name: info.name,
            map: info.map,
            folder: info.folder,
            game: info.game,
            players: info.players,
            max_players: info.max_players,
            bots: info.bots,
            server_type: info.server_type,
            os: info.os,
            visibility: Visibility::from(info.visibility),
            vac: info.vac != 0,
            extended: info.ext.map(ExtendedRecord::from),
            players_online,
        }
    }
}

/// A server that could not be queried
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub ip: String,
    pub error: ErrorCategory,
}

/// Outcome of querying one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Success(ServerRecord),
    Failure(FailureRecord),
}

impl QueryResult {
    pub fn failure(ip: impl Into<String>, error: ErrorCategory) -> Self {
        QueryResult::Failure(FailureRecord {
            ip: ip.into(),
            error,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success(_))
    }

    pub fn ip(&self) -> &str {
        match self {
            QueryResult::Success(record) => &record.ip,
            QueryResult::Failure(record) => &record.ip,
        }
    }
}

/// Every result of one pipeline run, in completion order
///
/// Serializes as `{"data": [{"<endpoint>": <result>, ...}], "total": n}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    entries: Vec<(String, QueryResult)>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, endpoint: impl Into<String>, result: QueryResult) {
        self.entries.push((endpoint.into(), result));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, endpoint: &str) -> Option<&QueryResult> {
        self.entries
            .iter()
            .find(|(key, _)| key == endpoint)
            .map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryResult)> {
        self.entries.iter().map(|(key, result)| (key.as_str(), result))
    }

    pub fn successes(&self) -> usize {
        self.entries.iter().filter(|(_, r)| r.is_success()).count()
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

struct Entries<'a>(&'a [(String, QueryResult)]);

impl Serialize for Entries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(key, result)| (key, result)))
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut doc = serializer.serialize_struct("Report", 2)?;
        doc.serialize_field("data", &[Entries(&self.entries)])?;
        doc.serialize_field("total", &self.entries.len())?;
        doc.end()
    }
}

/// Body printed when discovery fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDocument {
    pub error: String,
    pub status: u16,
}

impl From<&DiscoveryError> for ErrorDocument {
    fn from(err: &DiscoveryError) -> Self {
        Self {
            error: err.user_message().to_string(),
            status: err.status_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn info(players: u8, ext: Option<ExtendedInfo>) -> ServerInfo {
        ServerInfo {
            protocol: 17,
            name: "Casual".into(),
            map: "de_dust2".into(),
            folder: "csgo".into(),
            game: "Counter-Strike".into(),
            players,
            max_players: 24,
            bots: 0,
            server_type: ServerType::Dedicated,
            os: ServerOs::Linux,
            visibility: 1,
            vac: 1,
            ext,
        }
    }

    #[test]
    fn test_server_record_without_extension() {
        let record = ServerRecord::new("1.2.3.4:27015", info(0, None), None);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["ip"], "1.2.3.4:27015");
        assert_eq!(value["type"], "dedicated");
        assert_eq!(value["os"], "linux");
        assert_eq!(value["visibility"], "private");
        assert_eq!(value["vac"], true);
        for absent in ["appid", "steamid", "gameid", "port", "players_online"] {
            assert!(value.get(absent).is_none(), "{} should be omitted", absent);
        }
    }

    #[test]
    fn test_server_record_with_extension_and_players() {
        let ext = ExtendedInfo {
            app_id: 730,
            game_version: "1.38.0.1".into(),
            port: 27015,
            steam_id: 90_000_000_000_000_001,
            keywords: "casual".into(),
            game_id: 730,
        };
        let players = vec![Player {
            index: 0,
            name: "alice".into(),
            score: 5,
            duration: 30.0,
        }];
        let record = ServerRecord::new("1.2.3.4:27015", info(1, Some(ext)), Some(players));
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["appid"], 730);
        assert_eq!(value["steamid"], "90000000000000001");
        assert_eq!(value["gameid"], "730");
        assert_eq!(value["game_mode"], "casual");
        assert_eq!(value["players_online"][0]["name"], "alice");
    }

    #[test]
    fn test_failed_player_query_is_empty_list() {
        let record = ServerRecord::new("1.2.3.4:27015", info(3, None), Some(Vec::new()));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["players_online"], json!([]));
    }

    #[test]
    fn test_report_document_shape() {
        let mut report = Report::new();
        report.push(
            "1.2.3.4:27015",
            QueryResult::Success(ServerRecord::new("1.2.3.4:27015", info(0, None), None)),
        );
        report.push(
            "5.6.7.8:27015",
            QueryResult::failure("5.6.7.8:27015", ErrorCategory::Timeout),
        );

        let value: Value = serde_json::from_str(&report.to_json(false).unwrap()).unwrap();
        assert_eq!(value["total"], 2);
        assert_eq!(value["data"].as_array().unwrap().len(), 1);
        assert_eq!(value["data"][0]["1.2.3.4:27015"]["map"], "de_dust2");
        assert_eq!(
            value["data"][0]["5.6.7.8:27015"],
            json!({"ip": "5.6.7.8:27015", "error": "Connection timeout"})
        );
        assert_eq!(report.successes(), 1);
        assert!(report.get("5.6.7.8:27015").is_some());
    }

    #[test]
    fn test_empty_report() {
        let value = serde_json::to_value(Report::new()).unwrap();
        assert_eq!(value, json!({"data": [{}], "total": 0}));
    }

    #[test]
    fn test_error_document() {
        let doc = ErrorDocument::from(&DiscoveryError::InvalidCredential(403));
        assert_eq!(
            serde_json::to_value(doc).unwrap(),
            json!({"error": "Invalid Steam API Key", "status": 401})
        );
    }
}
