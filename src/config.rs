//! `CONFIG GET|SET|RESETSTAT|REWRITE` over an in-memory string→string map
//! (spec.md §6), evolving the teacher's `redis/config.rs` file-parser
//! approach (it read `redis.conf` into discrete typed fields) into a plain
//! map the rest of the engine reads through typed accessors.

use std::collections::HashMap;

/// Bitset over `notify-keyspace-events` classes (spec.md §4.8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyFlags(u32);

const NOTIFY_KEYSPACE: u32 = 1 << 0; // K
const NOTIFY_KEYEVENT: u32 = 1 << 1; // E
const NOTIFY_GENERIC: u32 = 1 << 2; // g
const NOTIFY_STRING: u32 = 1 << 3; // $
const NOTIFY_LIST: u32 = 1 << 4; // l
const NOTIFY_SET: u32 = 1 << 5; // s
const NOTIFY_HASH: u32 = 1 << 6; // h
const NOTIFY_ZSET: u32 = 1 << 7; // z
const NOTIFY_EXPIRED: u32 = 1 << 8; // x
const NOTIFY_EVICTED: u32 = 1 << 9; // e
const NOTIFY_STREAM: u32 = 1 << 10; // t
const NOTIFY_KEY_MISS: u32 = 1 << 11; // m
const NOTIFY_NEW: u32 = 1 << 12; // n
const NOTIFY_ALL_CLASSES: u32 = NOTIFY_GENERIC
    | NOTIFY_STRING
    | NOTIFY_LIST
    | NOTIFY_SET
    | NOTIFY_HASH
    | NOTIFY_ZSET
    | NOTIFY_EXPIRED
    | NOTIFY_EVICTED
    | NOTIFY_STREAM;

impl NotifyFlags {
    pub fn parse(spec: &str) -> Self {
        let mut bits = 0u32;
        for ch in spec.chars() {
            bits |= match ch {
                'K' => NOTIFY_KEYSPACE,
                'E' => NOTIFY_KEYEVENT,
                'g' => NOTIFY_GENERIC,
                '$' => NOTIFY_STRING,
                'l' => NOTIFY_LIST,
                's' => NOTIFY_SET,
                'h' => NOTIFY_HASH,
                'z' => NOTIFY_ZSET,
                'x' => NOTIFY_EXPIRED,
                'e' => NOTIFY_EVICTED,
                't' => NOTIFY_STREAM,
                'm' => NOTIFY_KEY_MISS,
                'n' => NOTIFY_NEW,
                'A' => NOTIFY_ALL_CLASSES,
                _ => 0,
            };
        }
        NotifyFlags(bits)
    }

    pub fn keyspace_enabled(&self) -> bool {
        self.0 & NOTIFY_KEYSPACE != 0
    }

    pub fn keyevent_enabled(&self) -> bool {
        self.0 & NOTIFY_KEYEVENT != 0
    }

    pub fn class_enabled(&self, class: char) -> bool {
        let bit = match class {
            'g' => NOTIFY_GENERIC,
            '$' => NOTIFY_STRING,
            'l' => NOTIFY_LIST,
            's' => NOTIFY_SET,
            'h' => NOTIFY_HASH,
            'z' => NOTIFY_ZSET,
            'x' => NOTIFY_EXPIRED,
            'e' => NOTIFY_EVICTED,
            't' => NOTIFY_STREAM,
            'm' => NOTIFY_KEY_MISS,
            'n' => NOTIFY_NEW,
            _ => 0,
        };
        self.0 & bit != 0
    }
}

/// Known `CONFIG` keys with documented defaults (spec.md §6). `CONFIG SET`
/// of a key not in this set (or not in the free-form map) is an error.
const KNOWN_DEFAULTS: &[(&str, &str)] = &[
    ("maxmemory", "0"),
    ("maxmemory-policy", "noeviction"),
    ("notify-keyspace-events", ""),
    ("databases", "16"),
    ("save", "3600 1 300 100 60 10000"),
    ("appendonly", "no"),
    ("timeout", "0"),
    ("tcp-keepalive", "300"),
    ("hash-max-listpack-entries", "128"),
    ("list-max-listpack-size", "128"),
    ("set-max-intset-entries", "512"),
    ("zset-max-listpack-entries", "128"),
];

pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        let values = KNOWN_DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config { values }
    }

    pub fn is_known(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_ascii_lowercase())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// Returns `false` when `key` is not a recognized option (spec.md §6:
    /// "`CONFIG SET` of unknown keys returns `ERR`").
    pub fn set(&mut self, key: &str, value: String) -> bool {
        let key = key.to_ascii_lowercase();
        if !self.values.contains_key(&key) {
            return false;
        }
        self.values.insert(key, value);
        true
    }

    /// `CONFIG GET` supports glob patterns over key names.
    pub fn matching(&self, pattern: &str) -> Vec<(String, String)> {
        self.values
            .iter()
            .filter(|(k, _)| crate::pubsub::glob_match(pattern.as_bytes(), k.as_bytes()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn notify_flags(&self) -> NotifyFlags {
        NotifyFlags::parse(self.get("notify-keyspace-events").unwrap_or(""))
    }

    pub fn databases(&self) -> usize {
        self.get("databases").and_then(|s| s.parse().ok()).unwrap_or(16)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_setting_unknown_keys() {
        let mut cfg = Config::new();
        assert!(!cfg.set("not-a-real-option", "1".into()));
        assert!(cfg.set("maxmemory", "100mb".into()));
        assert_eq!(cfg.get("maxmemory"), Some("100mb"));
    }

    #[test]
    fn notify_flags_parse_class_bits() {
        let flags = NotifyFlags::parse("Ex");
        assert!(flags.keyevent_enabled());
        assert!(flags.class_enabled('x'));
        assert!(!flags.class_enabled('g'));
    }
}
