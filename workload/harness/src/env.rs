use std::env;

use tracing::warn;

/// Returns the value of `key`, or `fallback` when unset or empty.
pub fn env_or_default(key: &str, fallback: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}

/// Parses `key` as an integer, logging and falling back on malformed input.
pub fn env_int(key: &str, fallback: i64) -> i64 {
    let Ok(raw) = env::var(key) else {
        return fallback;
    };
    if raw.is_empty() {
        return fallback;
    }
    match raw.parse::<i64>() {
        Ok(value) => value,
        Err(_) => {
            warn!(target: "config", %key, %raw, fallback, "invalid integer, using default");
            fallback
        }
    }
}

/// Parses `key` as a `u64`, logging and falling back on malformed input.
pub fn env_u64(key: &str, fallback: u64) -> u64 {
    let Ok(raw) = env::var(key) else {
        return fallback;
    };
    if raw.is_empty() {
        return fallback;
    }
    match raw.parse::<u64>() {
        Ok(value) => value,
        Err(_) => {
            warn!(target: "config", %key, %raw, fallback, "invalid integer, using default");
            fallback
        }
    }
}

/// True when `key` is set to exactly `"1"`.
pub fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_unset_and_malformed() {
        assert_eq!(env_or_default("SQUALL_TEST_UNSET_VAR", "dflt"), "dflt");
        assert_eq!(env_int("SQUALL_TEST_UNSET_VAR", 7), 7);

        env::set_var("SQUALL_TEST_BAD_INT", "not-a-number");
        assert_eq!(env_int("SQUALL_TEST_BAD_INT", 3), 3);
        env::remove_var("SQUALL_TEST_BAD_INT");
    }

    #[test]
    fn reads_set_values() {
        env::set_var("SQUALL_TEST_SET_VAR", "42");
        assert_eq!(env_or_default("SQUALL_TEST_SET_VAR", "x"), "42");
        assert_eq!(env_int("SQUALL_TEST_SET_VAR", 0), 42);
        assert_eq!(env_u64("SQUALL_TEST_SET_VAR", 0), 42);
        env::remove_var("SQUALL_TEST_SET_VAR");

        env::set_var("SQUALL_TEST_FLAG", "1");
        assert!(env_flag("SQUALL_TEST_FLAG"));
        env::set_var("SQUALL_TEST_FLAG", "0");
        assert!(!env_flag("SQUALL_TEST_FLAG"));
        env::remove_var("SQUALL_TEST_FLAG");
    }
}
