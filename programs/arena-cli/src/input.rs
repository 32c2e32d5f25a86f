//! Tournament file loading

use std::fs;
use std::path::Path;

use anyhow::Context;
use arena_core::{validate_round_count, ConfigurationError, PayoffMatrix, StrategySpec};
use serde::Deserialize;

/// Rounds per match when neither the file nor the command line says.
pub const DEFAULT_ROUNDS: i64 = 100;

/// ```json
/// { "rounds_per_match": 50,
///   "payoff": { "temptation": 5, "reward": 3, "punishment": 1, "sucker": 0 },
///   "strategies": [ { "name": "tft", "text": "tit for tat" } ] }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TournamentFile {
    #[serde(default)]
    pub rounds_per_match: Option<i64>,
    #[serde(default)]
    pub payoff: Option<PayoffMatrix>,
    pub strategies: Vec<StrategySpec>,
}

impl TournamentFile {
    /// Command-line value first, then the file, then the default.
    pub fn rounds(&self, from_cli: Option<i64>, max: u32) -> Result<u32, ConfigurationError> {
        validate_round_count(from_cli.or(self.rounds_per_match).unwrap_or(DEFAULT_ROUNDS), max)
    }
}

pub fn load(path: &Path) -> anyhow::Result<TournamentFile> {
    let raw = fs::read_to_string(path).with_context(|| format!("cannot read `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid tournament file `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_file() {
        let file = write(
            r#"{
                "rounds_per_match": 12,
                "payoff": {"temptation": 6, "reward": 4, "punishment": 1, "sucker": 0},
                "strategies": [
                    {"name": "tft", "text": "tit for tat"},
                    {"name": "mean", "text": "always defect"}
                ]
            }"#,
        );
        let loaded = load(file.path()).unwrap();
        assert_eq!(loaded.strategies.len(), 2);
        assert_eq!(loaded.strategies[0], StrategySpec::new("tft", "tit for tat"));
        assert_eq!(loaded.payoff.unwrap().temptation(), 6);
        assert_eq!(loaded.rounds(None, 1000), Ok(12));
        assert_eq!(loaded.rounds(Some(3), 1000), Ok(3));
    }

    #[test]
    fn test_defaults_and_validation() {
        let file = write(r#"{"strategies": []}"#);
        let loaded = load(file.path()).unwrap();
        assert!(loaded.payoff.is_none());
        assert_eq!(loaded.rounds(None, 1000), Ok(100));
        assert_eq!(loaded.rounds(Some(-4), 1000), Err(ConfigurationError::NegativeRounds { value: -4 }));
    }

    #[test]
    fn test_rejects_bad_input() {
        // non-integer round count
        assert!(load(write(r#"{"rounds_per_match": 2.5, "strategies": []}"#).path()).is_err());
        // payoff ordering violated
        let bad_payoff =
            r#"{"payoff": {"temptation": 1, "reward": 3, "punishment": 2, "sucker": 0}, "strategies": []}"#;
        assert!(load(write(bad_payoff).path()).is_err());
        // unknown key
        assert!(load(write(r#"{"strategy": []}"#).path()).is_err());
        assert!(load(Path::new("/definitely/not/here.json")).is_err());
    }
}
