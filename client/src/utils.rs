use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::PlayerId;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-process client id: `player_<millis>_<9 random chars>`
pub fn generate_player_id() -> PlayerId {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("player_{}_{}", get_timestamp(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_ids_are_unique() {
        let a = generate_player_id();
        let b = generate_player_id();
        assert_ne!(a, b);
        assert!(a.starts_with("player_"));
    }

    #[test]
    fn test_timestamp_is_recent() {
        // 2020-01-01
        assert!(get_timestamp() > 1_577_836_800_000);
    }
}
