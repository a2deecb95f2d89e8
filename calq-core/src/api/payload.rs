//! Request body assembly for the Track, Profile and Transfer endpoints
//!
//! The builder is pure: it only injects the reserved API-level keys around
//! the caller's data. Reserved keys always win over caller-supplied API
//! properties with the same name.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::reserved::api;

/// A JSON object keyed by property name
pub type Properties = Map<String, Value>;

/// Timestamp format sent to the API (ISO-8601, UTC, numeric offset)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Builds API request bodies for one write key
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    write_key: String,
}

impl PayloadBuilder {
    pub fn new(write_key: impl Into<String>) -> Self {
        Self {
            write_key: write_key.into(),
        }
    }

    pub fn write_key(&self) -> &str {
        &self.write_key
    }

    /// Build the body of a Track call.
    ///
    /// `api_props` and `user_props` are both required; an empty user map is
    /// sent as `{}`.
    pub fn build_track(
        &self,
        actor: &str,
        action: &str,
        api_props: Option<Properties>,
        user_props: Option<Properties>,
    ) -> Result<Properties> {
        self.build_track_at(actor, action, api_props, user_props, Utc::now())
    }

    pub(crate) fn build_track_at(
        &self,
        actor: &str,
        action: &str,
        api_props: Option<Properties>,
        user_props: Option<Properties>,
        now: DateTime<Utc>,
    ) -> Result<Properties> {
        let mut payload =
            api_props.ok_or_else(|| Error::validation("api properties must be specified"))?;
        let user_props =
            user_props.ok_or_else(|| Error::validation("user properties must be specified"))?;
        require_non_empty("actor", actor)?;
        require_non_empty("action", action)?;

        payload.insert(api::ACTOR.into(), Value::from(actor));
        payload.insert(api::ACTION_NAME.into(), Value::from(action));
        payload.insert(api::WRITE_KEY.into(), Value::from(self.write_key.as_str()));
        payload.insert(api::USER_PROPERTIES.into(), Value::Object(user_props));
        payload.insert(
            api::TIMESTAMP.into(),
            Value::from(now.format(TIMESTAMP_FORMAT).to_string()),
        );

        Ok(payload)
    }

    /// Build the body of a Profile call. `user_props` must not be empty.
    pub fn build_profile(&self, actor: &str, user_props: Properties) -> Result<Properties> {
        require_non_empty("actor", actor)?;
        if user_props.is_empty() {
            return Err(Error::validation("profile properties must be specified"));
        }

        let mut payload = Properties::new();
        payload.insert(api::ACTOR.into(), Value::from(actor));
        payload.insert(api::WRITE_KEY.into(), Value::from(self.write_key.as_str()));
        payload.insert(api::USER_PROPERTIES.into(), Value::Object(user_props));
        Ok(payload)
    }

    /// Build the body of a Transfer call merging `old_actor` into `new_actor`.
    pub fn build_transfer(&self, old_actor: &str, new_actor: &str) -> Result<Properties> {
        require_non_empty("old actor", old_actor)?;
        require_non_empty("new actor", new_actor)?;

        let mut payload = Properties::new();
        payload.insert(api::OLD_ACTOR.into(), Value::from(old_actor));
        payload.insert(api::NEW_ACTOR.into(), Value::from(new_actor));
        payload.insert(api::WRITE_KEY.into(), Value::from(self.write_key.as_str()));
        Ok(payload)
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(format!("{} must be specified", what)));
    }
    Ok(())
}
