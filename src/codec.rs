//! JSON payloads of the config/state and command streams.
//!
//! Readers work on `serde_json::Value` so a payload can be classified
//! (config vs. state, node vs. leaf) before it is applied. Missing optional
//! fields fall back to defaults; malformed values surface as errors so the
//! caller can skip the record.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::config::Identity;
use crate::error::{AlarmError, Result};
use crate::model::{
  BasicState, ClientState, EnabledState, ItemConfig, LeafConfig, SeverityLevel, TitleDetail,
  TitleDetailDelay,
};
use crate::replication::command::AlarmCommand;

pub mod tags {
  pub const USER: &str = "user";
  pub const HOST: &str = "host";
  pub const DESCRIPTION: &str = "description";
  pub const ENABLED: &str = "enabled";
  pub const ENABLED_DATE: &str = "enabled_date";
  pub const LATCHING: &str = "latching";
  pub const ANNUNCIATING: &str = "annunciating";
  pub const DELAY: &str = "delay";
  pub const COUNT: &str = "count";
  pub const FILTER: &str = "filter";
  pub const GUIDANCE: &str = "guidance";
  pub const DISPLAYS: &str = "displays";
  pub const COMMANDS: &str = "commands";
  pub const ACTIONS: &str = "actions";
  pub const TITLE: &str = "title";
  pub const DETAILS: &str = "details";
  pub const SEVERITY: &str = "severity";
  pub const MESSAGE: &str = "message";
  pub const VALUE: &str = "value";
  pub const TIME: &str = "time";
  pub const SECONDS: &str = "seconds";
  pub const NANO: &str = "nano";
  pub const LATCH: &str = "latch";
  pub const CURRENT_SEVERITY: &str = "current_severity";
  pub const CURRENT_MESSAGE: &str = "current_message";
  pub const MODE: &str = "mode";
  pub const MAINTENANCE: &str = "maintenance";
  pub const NORMAL: &str = "normal";
  pub const NOTIFY: &str = "notify";
  pub const NOTIFY_ENABLED: &str = "enabled";
  pub const NOTIFY_DISABLED: &str = "disabled";
  pub const COMMAND: &str = "command";
  pub const DELETE: &str = "delete";
}

const LEGACY_DISPLAY_PREFIX: &str = "opi:";
const DELETE_MESSAGE: &str = "Deleting";
const LOCAL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_payload(text: &str) -> Result<Value> {
  let value: Value = serde_json::from_str(text)?;
  if !value.is_object() {
    return Err(AlarmError::Serialization(format!(
      "expected a JSON object, got {text}"
    )));
  }
  Ok(value)
}

/// Leaf config carries a description, leaf state a current severity.
pub fn is_leaf_config_or_state(json: &Value) -> bool {
  json.get(tags::DESCRIPTION).is_some() || json.get(tags::CURRENT_SEVERITY).is_some()
}

/// State payloads are the only ones with a severity.
pub fn is_state_update(json: &Value) -> bool {
  json.get(tags::SEVERITY).is_some()
}

/// Identification record written right before a tombstone.
pub fn is_deletion_marker(json: &Value) -> bool {
  json.get(tags::DELETE).is_some() && !is_leaf_config_or_state(json) && !is_state_update(json)
}

fn as_text(value: &Value) -> String {
  match value {
    Value::String(text) => text.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

fn as_bool(value: &Value) -> bool {
  match value {
    Value::Bool(flag) => *flag,
    Value::String(text) => text.eq_ignore_ascii_case("true"),
    _ => false,
  }
}

fn as_u32(value: &Value, path: &str, field: &str) -> Result<u32> {
  let number = match value {
    Value::Number(number) => number.as_u64(),
    Value::String(text) => text.trim().parse::<u64>().ok(),
    _ => None,
  };
  number
    .and_then(|number| u32::try_from(number).ok())
    .ok_or_else(|| invalid(path, format!("{field} must be a non-negative integer: {value}")))
}

fn invalid(path: &str, message: impl Into<String>) -> AlarmError {
  AlarmError::InvalidPayload {
    path: path.to_string(),
    message: message.into(),
  }
}

fn parse_title_details(json: Option<&Value>) -> Vec<TitleDetail> {
  let Some(Value::Array(entries)) = json else {
    return Vec::new();
  };
  entries
    .iter()
    .map(|entry| {
      TitleDetail::new(
        entry.get(tags::TITLE).map(as_text).unwrap_or_default(),
        entry.get(tags::DETAILS).map(as_text).unwrap_or_default(),
      )
    })
    .collect()
}

fn parse_title_detail_delays(json: Option<&Value>, path: &str) -> Result<Vec<TitleDetailDelay>> {
  let Some(Value::Array(entries)) = json else {
    return Ok(Vec::new());
  };
  entries
    .iter()
    .map(|entry| {
      let delay = match entry.get(tags::DELAY) {
        Some(value) => as_u32(value, path, tags::DELAY)?,
        None => 0,
      };
      Ok(TitleDetailDelay::new(
        entry.get(tags::TITLE).map(as_text).unwrap_or_default(),
        entry.get(tags::DETAILS).map(as_text).unwrap_or_default(),
        delay,
      ))
    })
    .collect()
}

/// Settings shared by nodes and leaves. A list missing from the payload clears it.
pub fn parse_item_config(json: &Value, path: &str) -> Result<ItemConfig> {
  let displays = parse_title_details(json.get(tags::DISPLAYS))
    .into_iter()
    .map(|mut link| {
      if let Some(stripped) = link.detail.strip_prefix(LEGACY_DISPLAY_PREFIX) {
        let stripped = stripped.to_string();
        tracing::debug!(link = %link.detail, "removing legacy display prefix");
        link.detail = stripped;
      }
      link
    })
    .collect();

  Ok(ItemConfig {
    guidance: parse_title_details(json.get(tags::GUIDANCE)),
    displays,
    commands: parse_title_details(json.get(tags::COMMANDS)),
    actions: parse_title_detail_delays(json.get(tags::ACTIONS), path)?,
  })
}

pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
  if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
    return Some(date.with_timezone(&Utc));
  }
  let naive = NaiveDateTime::parse_from_str(raw.trim(), LOCAL_DATE_FORMAT).ok()?;
  Local
    .from_local_datetime(&naive)
    .earliest()
    .map(|date| date.with_timezone(&Utc))
}

fn parse_enabled(json: &Value, path: &str) -> Result<EnabledState> {
  if let Some(raw) = json.get(tags::ENABLED_DATE).and_then(Value::as_str) {
    let date =
      parse_date(raw).ok_or_else(|| invalid(path, format!("invalid enabled_date: {raw}")))?;
    return Ok(EnabledState::until(date));
  }

  match json.get(tags::ENABLED) {
    None => Ok(EnabledState::enabled()),
    Some(Value::Bool(true)) => Ok(EnabledState::enabled()),
    Some(Value::Bool(false)) => Ok(EnabledState::disabled()),
    Some(Value::String(raw)) if raw.eq_ignore_ascii_case("true") => Ok(EnabledState::enabled()),
    Some(Value::String(raw)) if raw.eq_ignore_ascii_case("false") => Ok(EnabledState::disabled()),
    Some(Value::String(raw)) => parse_date(raw)
      .map(EnabledState::until)
      .ok_or_else(|| invalid(path, format!("invalid enabled value: {raw}"))),
    Some(other) => Err(invalid(path, format!("invalid enabled value: {other}"))),
  }
}

/// Leaf settings, present only when the payload has a description.
pub fn parse_leaf_config(json: &Value, path: &str) -> Result<Option<LeafConfig>> {
  let Some(description) = json.get(tags::DESCRIPTION) else {
    return Ok(None);
  };

  let defaults = LeafConfig::default();
  Ok(Some(LeafConfig {
    description: as_text(description),
    enabled: parse_enabled(json, path)?,
    latching: json.get(tags::LATCHING).map_or(defaults.latching, as_bool),
    annunciating: json
      .get(tags::ANNUNCIATING)
      .map_or(defaults.annunciating, as_bool),
    delay: match json.get(tags::DELAY) {
      Some(value) => as_u32(value, path, tags::DELAY)?,
      None => defaults.delay,
    },
    count: match json.get(tags::COUNT) {
      Some(value) => as_u32(value, path, tags::COUNT)?,
      None => defaults.count,
    },
    filter: json.get(tags::FILTER).map(as_text).unwrap_or_default(),
  }))
}

pub fn is_maintenance_mode(json: &Value) -> bool {
  json
    .get(tags::MODE)
    .is_some_and(|mode| as_text(mode) == tags::MAINTENANCE)
}

/// Accepts `"notify": "disabled"` as well as the boolean form `"notify": false`.
pub fn is_disable_notify(json: &Value) -> bool {
  match json.get(tags::NOTIFY) {
    Some(Value::Bool(flag)) => !flag,
    Some(Value::String(text)) => text == tags::NOTIFY_DISABLED || text == "false",
    _ => false,
  }
}

fn parse_severity(json: &Value, field: &str, path: &str) -> Result<Option<SeverityLevel>> {
  match json.get(field) {
    None => Ok(None),
    Some(value) => as_text(value)
      .parse::<SeverityLevel>()
      .map(Some)
      .map_err(|error| invalid(path, error.to_string())),
  }
}

fn parse_time(json: &Value, path: &str) -> Result<Option<DateTime<Utc>>> {
  let Some(time) = json.get(tags::TIME) else {
    return Ok(None);
  };
  let seconds = time.get(tags::SECONDS).and_then(Value::as_i64).unwrap_or(0);
  let nano = time.get(tags::NANO).and_then(Value::as_u64).unwrap_or(0);
  let nano = u32::try_from(nano).map_err(|_| invalid(path, format!("invalid nano: {nano}")))?;
  Utc
    .timestamp_opt(seconds, nano)
    .single()
    .map(Some)
    .ok_or_else(|| invalid(path, format!("invalid time: {seconds}.{nano}")))
}

/// Complete leaf state, or `None` when any required field is missing.
pub fn parse_client_state(json: &Value, path: &str) -> Result<Option<ClientState>> {
  let Some(severity) = parse_severity(json, tags::SEVERITY, path)? else {
    return Ok(None);
  };
  let Some(current_severity) = parse_severity(json, tags::CURRENT_SEVERITY, path)? else {
    return Ok(None);
  };
  let (Some(message), Some(value), Some(current_message)) = (
    json.get(tags::MESSAGE),
    json.get(tags::VALUE),
    json.get(tags::CURRENT_MESSAGE),
  ) else {
    return Ok(None);
  };
  let Some(time) = parse_time(json, path)? else {
    return Ok(None);
  };

  Ok(Some(ClientState {
    severity,
    message: as_text(message),
    value: as_text(value),
    time: Some(time),
    latch: json.get(tags::LATCH).is_some_and(as_bool),
    current_severity,
    current_message: as_text(current_message),
  }))
}

/// Rollup state of a node: only the severity is read.
pub fn parse_node_state(json: &Value, path: &str) -> Result<Option<BasicState>> {
  Ok(parse_severity(json, tags::SEVERITY, path)?.map(BasicState::new))
}

fn write_identity(map: &mut Map<String, Value>, identity: &Identity) {
  map.insert(tags::USER.to_string(), json!(identity.user));
  map.insert(tags::HOST.to_string(), json!(identity.host));
}

fn title_details_json(entries: &[TitleDetail]) -> Value {
  Value::Array(
    entries
      .iter()
      .map(|entry| json!({ "title": entry.title, "details": entry.detail }))
      .collect(),
  )
}

/// Configuration payload for an item. Defaults are omitted, as readers fill
/// them back in.
pub fn item_config_to_json(
  config: &ItemConfig,
  leaf: Option<&LeafConfig>,
  identity: &Identity,
) -> Result<String> {
  let mut map = Map::new();
  write_identity(&mut map, identity);

  if let Some(leaf) = leaf {
    map.insert(tags::DESCRIPTION.to_string(), json!(leaf.description));
    match leaf.enabled.enabled_date {
      Some(date) if !leaf.enabled.enabled => {
        map.insert(tags::ENABLED.to_string(), json!(date.to_rfc3339()));
      }
      _ if !leaf.enabled.enabled => {
        map.insert(tags::ENABLED.to_string(), json!(false));
      }
      _ => {}
    }
    if !leaf.latching {
      map.insert(tags::LATCHING.to_string(), json!(false));
    }
    if !leaf.annunciating {
      map.insert(tags::ANNUNCIATING.to_string(), json!(false));
    }
    if leaf.delay > 0 {
      map.insert(tags::DELAY.to_string(), json!(leaf.delay));
    }
    if leaf.count > 0 {
      map.insert(tags::COUNT.to_string(), json!(leaf.count));
    }
    if !leaf.filter.is_empty() {
      map.insert(tags::FILTER.to_string(), json!(leaf.filter));
    }
  }

  for (tag, entries) in [
    (tags::GUIDANCE, &config.guidance),
    (tags::DISPLAYS, &config.displays),
    (tags::COMMANDS, &config.commands),
  ] {
    if !entries.is_empty() {
      map.insert(tag.to_string(), title_details_json(entries));
    }
  }
  if !config.actions.is_empty() {
    let actions = config
      .actions
      .iter()
      .map(|action| {
        json!({
          "title": action.title,
          "details": action.detail,
          "delay": action.delay,
        })
      })
      .collect();
    map.insert(tags::ACTIONS.to_string(), Value::Array(actions));
  }

  Ok(serde_json::to_string(&Value::Object(map))?)
}

pub fn command_to_json(command: AlarmCommand, identity: &Identity) -> Result<String> {
  let mut map = Map::new();
  write_identity(&mut map, identity);
  map.insert(tags::COMMAND.to_string(), json!(command.as_str()));
  Ok(serde_json::to_string(&Value::Object(map))?)
}

pub fn delete_message_to_json(identity: &Identity) -> Result<String> {
  let mut map = Map::new();
  write_identity(&mut map, identity);
  map.insert(tags::DELETE.to_string(), json!(DELETE_MESSAGE));
  Ok(serde_json::to_string(&Value::Object(map))?)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn identity() -> Identity {
    Identity::new("operator", "console1")
  }

  #[test]
  fn classifies_payloads() {
    let leaf_config = parse_payload(r#"{"description":"x"}"#).expect("parse");
    let node_config = parse_payload("{}").expect("parse");
    let node_state = parse_payload(r#"{"severity":"MAJOR"}"#).expect("parse");
    let leaf_state =
      parse_payload(r#"{"severity":"MAJOR","current_severity":"OK"}"#).expect("parse");
    let marker = parse_payload(&delete_message_to_json(&identity()).expect("encode")).expect("parse");

    assert!(is_leaf_config_or_state(&leaf_config));
    assert!(!is_state_update(&leaf_config));
    assert!(!is_leaf_config_or_state(&node_config));
    assert!(is_state_update(&node_state));
    assert!(!is_leaf_config_or_state(&node_state));
    assert!(is_leaf_config_or_state(&leaf_state));
    assert!(is_deletion_marker(&marker));
    assert!(!is_deletion_marker(&leaf_config));
  }

  #[test]
  fn rejects_non_object_payloads() {
    assert!(parse_payload("[1,2]").is_err());
    assert!(parse_payload("not json").is_err());
  }

  #[test]
  fn leaf_config_defaults_and_legacy_display_links() {
    let json = parse_payload(
      r#"{
        "description": "Vacuum pressure",
        "delay": 5,
        "displays": [{"title": "Overview", "details": "opi:vac.bob"}],
        "actions": [{"title": "mail", "details": "mailto:ops", "delay": 60}]
      }"#,
    )
    .expect("parse");

    let leaf = parse_leaf_config(&json, "/Acc/PV").expect("leaf").expect("has description");
    assert_eq!(leaf.description, "Vacuum pressure");
    assert!(leaf.enabled.enabled);
    assert!(leaf.latching);
    assert!(leaf.annunciating);
    assert_eq!(leaf.delay, 5);
    assert_eq!(leaf.count, 0);

    let config = parse_item_config(&json, "/Acc/PV").expect("config");
    assert_eq!(config.displays[0].detail, "vac.bob");
    assert_eq!(config.actions[0].delay, 60);
    assert!(config.guidance.is_empty());
  }

  #[test]
  fn legacy_display_prefix_is_stripped_with_debug_logging() {
    let subscriber = tracing_subscriber::fmt()
      .with_max_level(tracing::Level::DEBUG)
      .with_test_writer()
      .finish();
    let json = parse_payload(r#"{"displays": [{"title": "Main", "details": "opi:main.bob"}]}"#)
      .expect("parse");
    let config = tracing::subscriber::with_default(subscriber, || {
      parse_item_config(&json, "/Acc/G").expect("config")
    });
    assert_eq!(config.displays[0].detail, "main.bob");
  }

  #[test]
  fn enabled_accepts_bool_or_date() {
    let disabled = parse_payload(r#"{"description":"x","enabled":false}"#).expect("parse");
    let leaf = parse_leaf_config(&disabled, "/A/x").expect("ok").expect("leaf");
    assert_eq!(leaf.enabled, EnabledState::disabled());

    let until = parse_payload(r#"{"description":"x","enabled":"2031-05-01T08:00:00Z"}"#)
      .expect("parse");
    let leaf = parse_leaf_config(&until, "/A/x").expect("ok").expect("leaf");
    assert!(!leaf.enabled.enabled);
    assert_eq!(
      leaf.enabled.enabled_date.map(|date| date.to_rfc3339()),
      Some("2031-05-01T08:00:00+00:00".to_string())
    );

    let local = parse_payload(r#"{"description":"x","enabled_date":"2031-05-01 08:00:00"}"#)
      .expect("parse");
    let leaf = parse_leaf_config(&local, "/A/x").expect("ok").expect("leaf");
    assert!(leaf.enabled.enabled_date.is_some());

    let broken = parse_payload(r#"{"description":"x","enabled":"someday"}"#).expect("parse");
    assert!(parse_leaf_config(&broken, "/A/x").is_err());
  }

  #[test]
  fn client_state_requires_all_fields() {
    let state = ClientState {
      severity: SeverityLevel::MajorAck,
      message: "HIHI".to_string(),
      value: "12.5".to_string(),
      time: Utc.timestamp_opt(1_700_000_000, 42).single(),
      latch: true,
      current_severity: SeverityLevel::Ok,
      current_message: "NO_ALARM".to_string(),
    };
    let json = parse_payload(
      r#"{"severity":"MAJOR_ACK","latch":true,"message":"HIHI","value":"12.5",
          "time":{"seconds":1700000000,"nano":42},"current_severity":"OK",
          "current_message":"NO_ALARM","mode":"maintenance","notify":"enabled"}"#,
    )
    .expect("parse");
    assert_eq!(
      parse_client_state(&json, "/A/x").expect("state"),
      Some(state)
    );
    assert!(is_maintenance_mode(&json));
    assert!(!is_disable_notify(&json));

    let partial = parse_payload(r#"{"severity":"MAJOR","message":"x"}"#).expect("parse");
    assert_eq!(parse_client_state(&partial, "/A/x").expect("state"), None);

    let bogus = parse_payload(r#"{"severity":"LOUD"}"#).expect("parse");
    assert!(parse_node_state(&bogus, "/A").is_err());
  }

  #[test]
  fn notify_flag_accepts_both_forms() {
    let legacy = parse_payload(r#"{"severity":"OK","notify":false}"#).expect("parse");
    let named = parse_payload(r#"{"severity":"OK","notify":"disabled"}"#).expect("parse");
    let enabled = parse_payload(r#"{"severity":"OK","notify":"enabled"}"#).expect("parse");
    assert!(is_disable_notify(&legacy));
    assert!(is_disable_notify(&named));
    assert!(!is_disable_notify(&enabled));
    assert!(!is_maintenance_mode(&enabled));
  }

  #[test]
  fn writes_identity_into_outbound_payloads() {
    let command = command_to_json(AlarmCommand::Acknowledge, &identity()).expect("encode");
    let json = parse_payload(&command).expect("parse");
    assert_eq!(json["command"], "acknowledge");
    assert_eq!(json["user"], "operator");
    assert_eq!(json["host"], "console1");

    let leaf = LeafConfig {
      description: "x".to_string(),
      latching: false,
      ..LeafConfig::default()
    };
    let config = item_config_to_json(&ItemConfig::default(), Some(&leaf), &identity())
      .expect("encode");
    let json = parse_payload(&config).expect("parse");
    assert_eq!(json["latching"], false);
    assert!(json.get("enabled").is_none());
    assert_eq!(
      parse_leaf_config(&json, "/A/x").expect("ok"),
      Some(leaf)
    );
  }
}
