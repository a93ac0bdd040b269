use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATUS: &str = "status";
pub const ENEMY_STATUS: &str = "enemy_status";
pub const ROUND_TIMER: &str = "round_timer";

/// RAM-derived snapshot of one emulated frame.
///
/// The three fields the control loop depends on are held typed; every other
/// decoded variable (health, matches won, ...) is kept by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    status: i64,
    enemy_status: i64,
    round_timer: i64,
    extra: BTreeMap<String, i64>,
}

impl Info {
    pub fn new(status: i64, enemy_status: i64, round_timer: i64) -> Self {
        Self {
            status,
            enemy_status,
            round_timer,
            extra: BTreeMap::new(),
        }
    }

    /// Build from a decoded field map. Fails if a required field is absent.
    pub fn from_fields(mut fields: BTreeMap<String, i64>) -> Result<Self> {
        let mut take = |name: &str| {
            fields
                .remove(name)
                .ok_or_else(|| anyhow!("frame info is missing required field `{name}`"))
        };
        let status = take(STATUS)?;
        let enemy_status = take(ENEMY_STATUS)?;
        let round_timer = take(ROUND_TIMER)?;
        Ok(Self {
            status,
            enemy_status,
            round_timer,
            extra: fields,
        })
    }

    pub fn with_field(mut self, name: impl Into<String>, value: i64) -> Self {
        match name.into() {
            n if n == STATUS => self.status = value,
            n if n == ENEMY_STATUS => self.enemy_status = value,
            n if n == ROUND_TIMER => self.round_timer = value,
            n => {
                self.extra.insert(n, value);
            }
        }
        self
    }

    pub fn status(&self) -> i64 {
        self.status
    }

    pub fn enemy_status(&self) -> i64 {
        self.enemy_status
    }

    pub fn round_timer(&self) -> i64 {
        self.round_timer
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        match name {
            STATUS => Some(self.status),
            ENEMY_STATUS => Some(self.enemy_status),
            ROUND_TIMER => Some(self.round_timer),
            _ => self.extra.get(name).copied(),
        }
    }

    /// All fields, required ones first.
    pub fn fields(&self) -> impl Iterator<Item = (&str, i64)> {
        [
            (STATUS, self.status),
            (ENEMY_STATUS, self.enemy_status),
            (ROUND_TIMER, self.round_timer),
        ]
        .into_iter()
        .chain(self.extra.iter().map(|(k, &v)| (k.as_str(), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fields_splits_required() {
        let fields = BTreeMap::from([
            ("status".to_string(), 512),
            ("enemy_status".to_string(), 514),
            ("round_timer".to_string(), 153),
            ("health".to_string(), 176),
        ]);
        let info = Info::from_fields(fields).unwrap();
        assert_eq!(info.status(), 512);
        assert_eq!(info.enemy_status(), 514);
        assert_eq!(info.round_timer(), 153);
        assert_eq!(info.get("health"), Some(176));
        assert_eq!(info.fields().count(), 4);
    }

    #[test]
    fn test_missing_required_field() {
        let fields = BTreeMap::from([("status".to_string(), 512)]);
        let err = Info::from_fields(fields).unwrap_err();
        assert!(err.to_string().contains("enemy_status"));
    }

    #[test]
    fn test_with_field_routes_required_names() {
        let info = Info::new(0, 0, 0)
            .with_field("status", 516)
            .with_field("matches_won", 1);
        assert_eq!(info.status(), 516);
        assert_eq!(info.get("matches_won"), Some(1));
        assert_eq!(info.get("nope"), None);
    }
}
