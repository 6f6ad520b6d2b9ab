pub fn env_string(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

pub fn env_u64(keys: &[&str]) -> Option<u64> {
    env_string(keys).and_then(|v| v.parse::<u64>().ok())
}
