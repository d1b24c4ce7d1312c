//! Session keys.
//!
//! One session exists per (channel, user) pair; the key is the stable
//! `{channel}:{user}` string adapters and the cancel map agree on.
//! Sub-agent sessions use the `subagent` channel with a run-scoped user
//! segment, so they never collide with interactive sessions.

/// Build the canonical session key for a (channel, user) pair.
pub fn session_key(channel: &str, user_id: &str) -> String {
    format!("{}:{}", sanitize(channel), sanitize(user_id))
}

/// Key for a sub-agent child session under a parent.
pub fn subagent_key(run_id: &str) -> String {
    format!("subagent:{run_id}")
}

/// Split a key back into (channel, user). Unknown shapes map to the
/// whole key as user on the "unknown" channel.
pub fn parse(key: &str) -> (&str, &str) {
    match key.split_once(':') {
        Some((channel, user)) => (channel, user),
        None => ("unknown", key),
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = session_key("ws", "alice");
        assert_eq!(key, "ws:alice");
        assert_eq!(parse(&key), ("ws", "alice"));
    }

    #[test]
    fn sanitizes_separators() {
        let key = session_key("web socket", "a:b");
        assert_eq!(key, "web_socket:a_b");
    }

    #[test]
    fn subagent_keys_use_their_own_channel() {
        let key = subagent_key("1234");
        assert_eq!(parse(&key).0, "subagent");
    }
}
