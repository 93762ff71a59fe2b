//! Stable identity for a session runner process.
//!
//! A session runner's ID must survive process restarts so that `session:{id}` and
//! `sessions:available` entries left behind by a crashed runner are picked back up by its
//! replacement instead of orphaned. Precedence: explicit configuration, then the `HOSTNAME`
//! environment variable if it matches the `session-<n>` convention used by the orchestrator
//! that schedules these processes, else a freshly minted ID.

use uuid::Uuid;

use crate::config::SessionConfig;

/// Resolve this process's session ID per the configured/hostname/fresh-ID precedence.
pub fn resolve_session_id(config: &SessionConfig) -> String {
    if let Some(id) = &config.session_id {
        return id.clone();
    }

    if let Ok(hostname) = std::env::var("HOSTNAME") {
        if is_session_hostname(&hostname) {
            return hostname;
        }
    }

    Uuid::new_v4().to_string()
}

fn is_session_hostname(hostname: &str) -> bool {
    hostname
        .strip_prefix("session-")
        .is_some_and(|suffix| !suffix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_wins_over_everything() {
        let config = SessionConfig {
            session_id: Some("fixed-id".to_string()),
            ..SessionConfig::default()
        };
        assert_eq!(resolve_session_id(&config), "fixed-id");
    }

    #[test]
    fn session_hostname_pattern_is_recognized() {
        assert!(is_session_hostname("session-7"));
        assert!(is_session_hostname("session-abc"));
        assert!(!is_session_hostname("session-"));
        assert!(!is_session_hostname("worker-1"));
        assert!(!is_session_hostname(""));
    }

    #[test]
    fn falls_back_to_a_fresh_uuid_when_unconfigured() {
        std::env::remove_var("HOSTNAME");
        let config = SessionConfig::default();
        let id = resolve_session_id(&config);
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
