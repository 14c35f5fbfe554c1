//! Database naming: prefix selection, username sanitization, and the
//! inverse classifiers used by cleanup tooling.

/// Selects between the production and test database prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Test,
}

impl Environment {
    pub fn from_node_env(node_env: &str) -> Self {
        if node_env.eq_ignore_ascii_case("test") {
            Environment::Test
        } else {
            Environment::Production
        }
    }
}

/// Pure selector: production or test prefix, depending on `env`.
pub fn prefix<'a>(env: Environment, database_prefix: &'a str, database_test_prefix: &'a str) -> &'a str {
    match env {
        Environment::Production => database_prefix,
        Environment::Test => database_test_prefix,
    }
}

const SANITIZED_MAX_LEN: usize = 50;

/// `sanitizeUsername`: lowercase, replace every character outside
/// `[a-z0-9_$()+/-]` with `_`, prepend `u_` if the result would not start
/// with a letter, then truncate to 50 characters.
///
/// Deterministic and idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize_username(s: &str) -> String {
    let lowered = s.to_lowercase();
    let mut replaced: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase()
                || c.is_ascii_digit()
                || matches!(c, '_' | '$' | '(' | ')' | '+' | '/' | '-')
            {
                c
            } else {
                '_'
            }
        })
        .collect();

    let starts_with_letter = replaced.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    if !starts_with_letter {
        replaced = format!("u_{replaced}");
    }

    replaced.chars().take(SANITIZED_MAX_LEN).collect()
}

pub fn user_database_name(prefix: &str, sanitized_username: &str) -> String {
    format!("{prefix}_user_{sanitized_username}")
}

pub fn user_registry_database_name(prefix: &str) -> String {
    format!("{prefix}_user_registry")
}

pub fn audit_database_name(prefix: &str, sanitized_username: &str) -> String {
    format!("{prefix}_audit_{sanitized_username}")
}

pub fn chat_database_name(prefix: &str, sanitized_username: &str) -> String {
    format!("{prefix}_chat_{sanitized_username}")
}

pub fn is_user_registry_database(name: &str) -> bool {
    name.ends_with("_user_registry")
}

pub fn is_user_database(name: &str) -> bool {
    name.contains("_user_") && !is_user_registry_database(name)
}

pub fn is_audit_database(name: &str) -> bool {
    name.contains("_audit_")
}

pub fn is_chat_database(name: &str) -> bool {
    name.contains("_chat_")
}

/// Inverse of the `*_database_name` functions: recovers the sanitized
/// username segment from any of the three per-user database kinds.
/// Accepts both production and test prefixes since it keys off the fixed
/// `_user_`/`_audit_`/`_chat_` markers rather than a known prefix value.
pub fn extract_username_from_database_name(name: &str) -> Option<String> {
    for marker in ["_user_", "_audit_", "_chat_"] {
        if let Some(idx) = name.find(marker) {
            let rest = &name[idx + marker.len()..];
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["Hello World!", "  ", "123abc", "áéí", "", "already_ok-1"] {
            let once = sanitize_username(input);
            let twice = sanitize_username(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
            assert!(once.len() <= SANITIZED_MAX_LEN);
        }
    }

    #[test]
    fn sanitize_lowercases_and_replaces() {
        assert_eq!(sanitize_username("Hello World!"), "hello_world_");
    }

    #[test]
    fn sanitize_prepends_marker_when_not_starting_with_letter() {
        assert_eq!(sanitize_username("123abc"), "u_123abc");
        assert_eq!(sanitize_username(""), "u_");
    }

    #[test]
    fn sanitize_truncates_to_50() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_username(&long).len(), 50);
    }

    #[test]
    fn database_names_are_pure_functions_of_prefix_and_sanitized_name() {
        let a = sanitize_username("Alice");
        let b = sanitize_username("alice");
        assert_eq!(a, b);
        assert_eq!(user_database_name("eddo", &a), user_database_name("eddo", &b));
    }

    #[test]
    fn classifiers_round_trip() {
        let name = user_database_name("eddo_test", "alice");
        assert!(is_user_database(&name));
        assert!(!is_user_registry_database(&name));
        assert_eq!(extract_username_from_database_name(&name).as_deref(), Some("alice"));

        let registry = user_registry_database_name("eddo_test");
        assert!(is_user_registry_database(&registry));
        assert!(!is_user_database(&registry));
    }
}
