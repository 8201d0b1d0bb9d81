//! Action definitions.
//!
//! Actions are a closed set of tagged variants. Every variant carries its
//! parameter struct; string parameters may contain `{{data.field}}` style
//! placeholders which are resolved against the current item immediately
//! before the action runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a stage distributes items across workers.
///
/// Parallel stages spread items over the job's worker count and give no
/// cross-item ordering guarantee. SingleThreaded stages process all items on
/// one worker in arrival order and preserve the relative order of survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConcurrencyPolicy {
    Parallel,
    SingleThreaded,
}

/// One configured stage of a job's action chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Stable identifier, unique within the job. Recorded as the offending
    /// action when a run fails.
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Inactive actions are left out when the pipeline is assembled.
    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(flatten)]
    pub params: ActionParams,
}

/// Parameters of every supported action, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionParams {
    ListFiles(ListFilesParams),
    ReadFile(ReadFileParams),
    CopyFile(CopyFileParams),
    MoveFile(MoveFileParams),
    DeleteFile(DeleteFileParams),
    HttpRequest(HttpRequestParams),
    FilterRegexp(FilterRegexpParams),
    FilterTimestamp(FilterTimestampParams),
    FilterPersisted(FilterPersistedParams),
    PersistValue(PersistValueParams),
    Limit(LimitParams),
    Skip(SkipParams),
    Log(LogParams),
    Pause(PauseParams),
    SortTimestamp(SortTimestampParams),
    SplitArray(SplitArrayParams),
    Duplicate(DuplicateParams),
    AddData(AddDataParams),
    SendMessage(SendMessageParams),
    ExecuteCommand(ExecuteCommandParams),
    QueryData(QueryDataParams),
}

impl ActionParams {
    /// Type identifier, matching the serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionParams::ListFiles(_) => "listFiles",
            ActionParams::ReadFile(_) => "readFile",
            ActionParams::CopyFile(_) => "copyFile",
            ActionParams::MoveFile(_) => "moveFile",
            ActionParams::DeleteFile(_) => "deleteFile",
            ActionParams::HttpRequest(_) => "httpRequest",
            ActionParams::FilterRegexp(_) => "filterRegexp",
            ActionParams::FilterTimestamp(_) => "filterTimestamp",
            ActionParams::FilterPersisted(_) => "filterPersisted",
            ActionParams::PersistValue(_) => "persistValue",
            ActionParams::Limit(_) => "limit",
            ActionParams::Skip(_) => "skip",
            ActionParams::Log(_) => "log",
            ActionParams::Pause(_) => "pause",
            ActionParams::SortTimestamp(_) => "sortTimestamp",
            ActionParams::SplitArray(_) => "splitArray",
            ActionParams::Duplicate(_) => "duplicate",
            ActionParams::AddData(_) => "addData",
            ActionParams::SendMessage(_) => "sendMessage",
            ActionParams::ExecuteCommand(_) => "executeCommand",
            ActionParams::QueryData(_) => "queryData",
        }
    }

    /// Connectors this action resolves at run time.
    pub fn connector_refs(&self) -> Vec<&str> {
        match self {
            ActionParams::ListFiles(p) => vec![p.connector.as_str()],
            ActionParams::ReadFile(p) => vec![p.connector.as_str()],
            ActionParams::CopyFile(p) => vec![p.source.as_str(), p.target.as_str()],
            ActionParams::MoveFile(p) => vec![p.connector.as_str()],
            ActionParams::DeleteFile(p) => vec![p.connector.as_str()],
            ActionParams::HttpRequest(p) => vec![p.connector.as_str()],
            ActionParams::SendMessage(p) => vec![p.connector.as_str()],
            ActionParams::QueryData(p) => vec![p.connector.as_str()],
            _ => Vec::new(),
        }
    }
}

/// HTTP method of a web request action. Converted to the client's method
/// type by the web connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// Time unit of the timestamp filter threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn to_duration(self, amount: i64) -> chrono::Duration {
        match self {
            TimeUnit::Seconds => chrono::Duration::seconds(amount),
            TimeUnit::Minutes => chrono::Duration::minutes(amount),
            TimeUnit::Hours => chrono::Duration::hours(amount),
            TimeUnit::Days => chrono::Duration::days(amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesParams {
    /// File connector to list from.
    pub connector: String,
    pub directory: String,
    /// Only files ending in this suffix are listed. Empty matches all.
    #[serde(default)]
    pub file_ending: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileParams {
    pub connector: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyFileParams {
    /// File connector the source is read from.
    pub source: String,
    pub source_file: String,
    /// File connector the target is written to.
    pub target: String,
    pub target_file: String,
    /// Write to `<target>.famulus` and rename once complete, so consumers
    /// never observe half-written files.
    #[serde(default = "default_true")]
    pub transfer_suffix: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFileParams {
    pub connector: String,
    pub source_file: String,
    pub target_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileParams {
    pub connector: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestParams {
    /// Web connector supplying the client.
    pub connector: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRegexpParams {
    /// Templated value the expression is matched against.
    pub input: String,
    pub expression: String,
    /// When true, matching items are dropped; otherwise only matching items
    /// survive.
    #[serde(default)]
    pub drop_matching: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTimestampParams {
    /// Templated value parsed as a timestamp.
    pub input: String,
    /// chrono format string, e.g. `%Y-%m-%d %H:%M:%S`.
    pub timestamp_format: String,
    pub amount: i64,
    pub unit: TimeUnit,
    /// When true, items older than `now - amount * unit` are dropped;
    /// otherwise only older items survive.
    #[serde(default = "default_true")]
    pub drop_older: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPersistedParams {
    /// Templated value checked against the job's persisted values.
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistValueParams {
    /// Templated value persisted into the job's store.
    pub input: String,
    /// After the run the store is trimmed to the newest N values.
    /// Zero keeps everything.
    #[serde(default)]
    pub num_values_to_keep: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitParams {
    #[serde(default = "default_one")]
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipParams {
    #[serde(default = "default_one")]
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogParams {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseParams {
    #[serde(default = "default_pause_millis")]
    pub milliseconds: u64,
    /// Uniform jitter applied to the delay, in milliseconds.
    #[serde(default)]
    pub variance: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortTimestampParams {
    /// Templated value the pattern is applied to.
    pub input: String,
    /// Regular expression whose first match is parsed as the timestamp.
    pub pattern: String,
    pub timestamp_format: String,
    #[serde(default = "default_true")]
    pub sort_ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitArrayParams {
    /// Dot-separated path of the array to fan out, e.g. `data.entries`.
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateParams {
    #[serde(default = "default_amount")]
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDataParams {
    /// Object merged into the item's `data`. String values may be templated.
    pub json: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    /// Messaging connector to publish through.
    pub connector: String,
    pub subject: String,
    /// Templated message payload.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandParams {
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDataParams {
    /// Data connector the statement runs against.
    pub connector: String,
    pub query: String,
}

fn default_true() -> bool {
    true
}

fn default_one() -> u64 {
    1
}

fn default_amount() -> u32 {
    2
}

fn default_pause_millis() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_spec_tagging() {
        let spec: ActionSpec = serde_json::from_value(json!({
            "id": "filter-backups",
            "type": "filterRegexp",
            "input": "{{data.filename}}",
            "expression": ".*backup.*",
            "dropMatching": true
        }))
        .unwrap();

        assert!(spec.active);
        assert_eq!(spec.params.kind(), "filterRegexp");
        match &spec.params {
            ActionParams::FilterRegexp(p) => {
                assert_eq!(p.input, "{{data.filename}}");
                assert!(p.drop_matching);
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let spec: ActionSpec = serde_json::from_value(json!({
            "id": "wait",
            "type": "pause"
        }))
        .unwrap();
        match spec.params {
            ActionParams::Pause(p) => {
                assert_eq!(p.milliseconds, 1000);
                assert_eq!(p.variance, 0);
            }
            other => panic!("unexpected params: {other:?}"),
        }

        let spec: ActionSpec = serde_json::from_value(json!({
            "id": "copy",
            "type": "copyFile",
            "source": "in",
            "sourceFile": "{{data.filename}}",
            "target": "out",
            "targetFile": "{{data.filename}}"
        }))
        .unwrap();
        match spec.params {
            ActionParams::CopyFile(p) => assert!(p.transfer_suffix),
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn test_connector_refs() {
        let spec: ActionSpec = serde_json::from_value(json!({
            "id": "copy",
            "type": "copyFile",
            "source": "in",
            "sourceFile": "a",
            "target": "out",
            "targetFile": "b"
        }))
        .unwrap();
        assert_eq!(spec.params.connector_refs(), vec!["in", "out"]);
    }

    #[test]
    fn test_http_method_wire_names() {
        assert_eq!(serde_json::to_value(HttpMethod::Get).unwrap(), json!("GET"));
        let parsed: HttpMethod = serde_json::from_value(json!("DELETE")).unwrap();
        assert_eq!(parsed, HttpMethod::Delete);
    }
}
