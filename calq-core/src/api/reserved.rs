//! Reserved property names understood by the Calq API
//!
//! Action-level names are `$`-prefixed and live inside the user property
//! blob of a Track call. API-level names are top-level keys of a request
//! body. Both vocabularies are fixed by the server; callers must not reuse
//! them for their own data.

/// Reserved names that may appear inside an action's property map.
pub mod action {
    pub const SALE_VALUE: &str = "$sale_value";
    pub const SALE_CURRENCY: &str = "$sale_currency";

    pub const DEVICE_AGENT: &str = "$device_agent";
    pub const DEVICE_OS: &str = "$device_os";
    pub const DEVICE_RESOLUTION: &str = "$device_resolution";
    pub const DEVICE_MOBILE: &str = "$device_mobile";

    pub const COUNTRY: &str = "$country";
    pub const REGION: &str = "$region";
    pub const CITY: &str = "$city";

    pub const GENDER: &str = "$gender";
    pub const AGE: &str = "$age";

    pub const UTM_CAMPAIGN: &str = "$utm_campaign";
    pub const UTM_SOURCE: &str = "$utm_source";
    pub const UTM_MEDIUM: &str = "$utm_medium";
    pub const UTM_CONTENT: &str = "$utm_content";
    pub const UTM_TERM: &str = "$utm_term";

    /// Every action-level reserved name.
    pub const ALL: [&str; 16] = [
        SALE_VALUE,
        SALE_CURRENCY,
        DEVICE_AGENT,
        DEVICE_OS,
        DEVICE_RESOLUTION,
        DEVICE_MOBILE,
        COUNTRY,
        REGION,
        CITY,
        GENDER,
        AGE,
        UTM_CAMPAIGN,
        UTM_SOURCE,
        UTM_MEDIUM,
        UTM_CONTENT,
        UTM_TERM,
    ];
}

/// Reserved top-level keys of an API request body.
pub mod api {
    pub const ACTOR: &str = "actor";
    pub const ACTION_NAME: &str = "action_name";
    pub const WRITE_KEY: &str = "write_key";
    pub const USER_PROPERTIES: &str = "properties";
    pub const TIMESTAMP: &str = "timestamp";
    pub const OLD_ACTOR: &str = "old_actor";
    pub const NEW_ACTOR: &str = "new_actor";
    pub const IP_ADDRESS: &str = "ip_address";

    /// Every API-level reserved name.
    pub const ALL: [&str; 8] = [
        ACTOR,
        ACTION_NAME,
        WRITE_KEY,
        USER_PROPERTIES,
        TIMESTAMP,
        OLD_ACTOR,
        NEW_ACTOR,
        IP_ADDRESS,
    ];
}

/// Campaign parameters read from the request, as
/// (reserved property, query/form parameter) pairs.
pub const UTM_PARAMETERS: [(&str, &str); 5] = [
    (action::UTM_CAMPAIGN, "utm_campaign"),
    (action::UTM_SOURCE, "utm_source"),
    (action::UTM_MEDIUM, "utm_medium"),
    (action::UTM_CONTENT, "utm_content"),
    (action::UTM_TERM, "utm_term"),
];

/// Returns true if `name` is an API-level reserved key.
pub fn is_api_reserved(name: &str) -> bool {
    api::ALL.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_are_prefixed() {
        assert!(action::ALL.iter().all(|name| name.starts_with('$')));
    }

    #[test]
    fn test_api_names_are_not_prefixed() {
        assert!(api::ALL.iter().all(|name| !name.starts_with('$')));
        assert!(is_api_reserved("write_key"));
        assert!(!is_api_reserved("$utm_term"));
    }

    #[test]
    fn test_utm_parameters_map_to_reserved_names() {
        for (reserved, param) in UTM_PARAMETERS {
            assert!(action::ALL.contains(&reserved));
            assert_eq!(reserved.trim_start_matches('$'), param);
        }
    }
}
