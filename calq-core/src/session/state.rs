//! Identity state of one visitor
//!
//! A session starts [`Identity::Anonymous`] under a random actor id and
//! moves to [`Identity::Identified`] once the application names the
//! visitor. The transition happens at most once per session; only `clear`
//! goes back to anonymous.
//!
//! This type only models the transitions. Sending the transfer call and
//! persisting the cookie is done by the client, guided by the returned
//! outcomes.

use serde_json::Value;
use uuid::Uuid;

use crate::api::{reserved, Properties};
use crate::error::{Error, Result};

use super::cookie::CookieState;

/// Whether the session's actor is provisional or application-assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Identified,
}

/// Result of [`SessionState::identify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifyOutcome {
    /// Same actor as before; nothing changed
    Unchanged,
    /// Actor replaced. `transfer` is set when the anonymous actor had
    /// already tracked actions that the server should merge.
    Identified { previous: String, transfer: bool },
}

/// Generate a new anonymous actor id (UUID v4)
pub fn new_anonymous_actor() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    actor: String,
    identity: Identity,
    has_tracked: bool,
    global_properties: Properties,
    /// Unknown fields from the cookie this state was loaded from
    prior_cookie_fields: Properties,
}

impl SessionState {
    /// Fresh anonymous state for `actor`
    pub fn anonymous(actor: impl Into<String>) -> Result<Self> {
        let actor = actor.into();
        if actor.is_empty() {
            return Err(Error::validation("an actor must be specified"));
        }
        Ok(Self {
            actor,
            identity: Identity::Anonymous,
            has_tracked: false,
            global_properties: Properties::new(),
            prior_cookie_fields: Properties::new(),
        })
    }

    /// State restored from a decoded cookie
    pub fn from_cookie(cookie: CookieState) -> Self {
        let mut global_properties = cookie.action_global;
        global_properties.retain(|key, _| !reserved::is_api_reserved(key));

        Self {
            actor: cookie.actor,
            identity: if cookie.is_anon {
                Identity::Anonymous
            } else {
                Identity::Identified
            },
            has_tracked: cookie.has_action,
            global_properties,
            prior_cookie_fields: cookie.extra,
        }
    }

    /// Cookie representation, re-emitting any unknown prior fields
    pub fn to_cookie(&self) -> CookieState {
        CookieState {
            actor: self.actor.clone(),
            has_action: self.has_tracked,
            is_anon: self.is_anonymous(),
            action_global: self.global_properties.clone(),
            extra: self.prior_cookie_fields.clone(),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity == Identity::Anonymous
    }

    pub fn has_tracked(&self) -> bool {
        self.has_tracked
    }

    pub fn global_properties(&self) -> &Properties {
        &self.global_properties
    }

    pub fn prior_cookie_fields(&self) -> &Properties {
        &self.prior_cookie_fields
    }

    /// Switch to the application-assigned `actor`.
    pub fn identify(&mut self, actor: &str) -> Result<IdentifyOutcome> {
        let outcome = self.check_identify(actor)?;
        if let IdentifyOutcome::Identified { .. } = outcome {
            self.apply_identify(actor);
        }
        Ok(outcome)
    }

    /// Work out what identifying as `actor` would do, without changing
    /// anything.
    pub fn check_identify(&self, actor: &str) -> Result<IdentifyOutcome> {
        if actor.is_empty() {
            return Err(Error::validation("an actor must be specified"));
        }
        if actor == self.actor {
            return Ok(IdentifyOutcome::Unchanged);
        }
        if self.identity == Identity::Identified {
            return Err(Error::AlreadyIdentified {
                current: self.actor.clone(),
                requested: actor.to_string(),
            });
        }
        Ok(IdentifyOutcome::Identified {
            previous: self.actor.clone(),
            transfer: self.has_tracked,
        })
    }

    /// Switch to `actor` as identified. Callers check the transition with
    /// [`SessionState::check_identify`] first.
    pub(crate) fn apply_identify(&mut self, actor: &str) {
        self.actor = actor.to_string();
        self.identity = Identity::Identified;
        self.has_tracked = false;
    }

    /// Set a global property. Returns true if the stored value changed.
    pub fn set_global_property(&mut self, key: &str, value: Value) -> Result<bool> {
        if key.is_empty() {
            return Err(Error::validation("a property name must be specified"));
        }
        if reserved::is_api_reserved(key) {
            return Err(Error::validation(format!(
                "{:?} is a reserved API property and cannot be a global property",
                key
            )));
        }
        if self.global_properties.get(key) == Some(&value) {
            return Ok(false);
        }
        self.global_properties.insert(key.to_string(), value);
        Ok(true)
    }

    /// Record that an action was tracked. Returns true on the first call for
    /// this identity.
    pub fn mark_tracked(&mut self) -> bool {
        !std::mem::replace(&mut self.has_tracked, true)
    }

    /// Reset to a new anonymous visitor, dropping everything including
    /// unknown cookie fields
    pub fn clear(&mut self, actor: String) {
        self.actor = actor;
        self.identity = Identity::Anonymous;
        self.has_tracked = false;
        self.global_properties.clear();
        self.prior_cookie_fields.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn anon() -> SessionState {
        SessionState::anonymous("anon-1").unwrap()
    }

    #[test]
    fn test_anonymous_requires_actor() {
        assert!(SessionState::anonymous("").is_err());
        let state = anon();
        assert_eq!(state.actor(), "anon-1");
        assert!(state.is_anonymous());
        assert!(!state.has_tracked());
    }

    #[test]
    fn test_new_anonymous_actor_is_uuid_v4() {
        let actor = new_anonymous_actor();
        let parsed = Uuid::parse_str(&actor).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(actor, new_anonymous_actor());
    }

    #[test]
    fn test_identify_without_tracking_skips_transfer() {
        let mut state = anon();
        let outcome = state.identify("user-1").unwrap();
        assert_eq!(
            outcome,
            IdentifyOutcome::Identified {
                previous: "anon-1".to_string(),
                transfer: false
            }
        );
        assert_eq!(state.identity(), Identity::Identified);
    }

    #[test]
    fn test_check_identify_leaves_state_alone() {
        let mut state = anon();
        state.mark_tracked();
        let before = state.clone();

        let outcome = state.check_identify("user-1").unwrap();
        assert!(matches!(outcome, IdentifyOutcome::Identified { transfer: true, .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_identify_after_tracking_requests_transfer() {
        let mut state = anon();
        assert!(state.mark_tracked());
        assert!(!state.mark_tracked());

        let outcome = state.identify("user-1").unwrap();
        assert!(matches!(outcome, IdentifyOutcome::Identified { transfer: true, .. }));
        assert!(!state.has_tracked());
    }

    #[test]
    fn test_identify_twice() {
        let mut state = anon();
        state.identify("user-1").unwrap();
        assert_eq!(state.identify("user-1").unwrap(), IdentifyOutcome::Unchanged);
        assert!(matches!(
            state.identify("user-2"),
            Err(Error::AlreadyIdentified { .. })
        ));
        assert_eq!(state.actor(), "user-1");
    }

    #[test]
    fn test_set_global_property_reports_changes() {
        let mut state = anon();
        assert!(state.set_global_property("plan", json!("pro")).unwrap());
        assert!(!state.set_global_property("plan", json!("pro")).unwrap());
        assert!(state.set_global_property("plan", json!("free")).unwrap());
        assert!(state.set_global_property("write_key", json!("x")).is_err());
    }

    #[test]
    fn test_cookie_round_trip_keeps_unknown_fields() {
        let mut extra = Properties::new();
        extra.insert("visits".into(), json!(3));
        let cookie = CookieState {
            actor: "user-1".to_string(),
            has_action: true,
            is_anon: false,
            action_global: Properties::new(),
            extra,
        };

        let state = SessionState::from_cookie(cookie.clone());
        assert_eq!(state.identity(), Identity::Identified);
        assert_eq!(state.to_cookie(), cookie);
    }

    #[test]
    fn test_from_cookie_drops_reserved_api_keys() {
        let mut action_global = Properties::new();
        action_global.insert("actor".into(), json!("x"));
        action_global.insert("$device_agent".into(), json!("curl"));
        let state = SessionState::from_cookie(CookieState {
            actor: "a".to_string(),
            has_action: false,
            is_anon: true,
            action_global,
            extra: Properties::new(),
        });
        assert!(state.global_properties().get("actor").is_none());
        assert_eq!(state.global_properties()["$device_agent"], "curl");
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut extra = Properties::new();
        extra.insert("legacy".into(), json!(true));
        let mut state = SessionState::from_cookie(CookieState {
            actor: "user-1".to_string(),
            has_action: true,
            is_anon: false,
            action_global: Properties::new(),
            extra,
        });
        state.set_global_property("plan", json!("pro")).unwrap();

        state.clear("anon-2".to_string());
        assert_eq!(state.actor(), "anon-2");
        assert!(state.is_anonymous());
        assert!(!state.has_tracked());
        assert!(state.global_properties().is_empty());
        assert!(state.prior_cookie_fields().is_empty());
    }
}
