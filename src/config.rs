//! Configuration from environment variables (`.env` honored via dotenv).
//!
//! RPC endpoints can be given explicitly (`RPC_PRIMARY` / `RPC_HTTP_PRIMARY`)
//! or derived from a single `HELIUS_KEY`. Missing endpoints are fatal at
//! startup; everything else has a default.

use std::env;

/// Known AMM/CLMM program IDs, overridable per deployment.
pub const DEFAULT_RAYDIUM_AMM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const DEFAULT_RAYDIUM_CLMM: &str = "4hGdEStwqyqZkG2tZibsSDQ7SBy7xH2sVQ2QJVV5o4Ck";
pub const DEFAULT_ORCA_AMM: &str = "9WwG7VJp49r4bgx1mVQqzKkGKuX3sX5Y3F9F6w8vG8bS";
pub const DEFAULT_ORCA_WHIRL: &str = "whirLbMiicVq4SCVZxdrmB9otnE8u6VYzG9xH8Wc7so";

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The configured AMM program set. A transaction referencing any of these is
/// attributed to that program; everything else is skipped by the parsers.
#[derive(Debug, Clone)]
pub struct ProgramSet {
    pub raydium_amm: String,
    pub raydium_clmm: String,
    pub orca_amm: String,
    pub orca_whirl: String,
}

impl ProgramSet {
    pub fn ids(&self) -> [&str; 4] {
        [
            self.raydium_amm.as_str(),
            self.raydium_clmm.as_str(),
            self.orca_amm.as_str(),
            self.orca_whirl.as_str(),
        ]
    }

    pub fn contains(&self, program_id: &str) -> bool {
        self.ids().contains(&program_id)
    }
}

/// Thresholds for the five-condition detector rule plus its cadence.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub vc_max: f64,
    pub ofs_max: f64,
    pub lt_max: f64,
    pub wc_min: f64,
    pub rq_max: f64,
    pub poll_sec: f64,
    pub dedup_sec: i64,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub poll_sec: f64,
    pub window_min: i64,
    pub batch: i64,
}

/// One rung of a partial-exit ladder: sell `ratio` of the remaining size
/// once price reaches `level` multiples of entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialLevel {
    pub level: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone)]
pub struct ExitConfig {
    pub poll_sec: f64,
    pub tp_mult: f64,
    pub sl_mult: f64,
    pub tp_partials: Vec<PartialLevel>,
    pub sl_partials: Vec<PartialLevel>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub rpc_ws: String,
    pub rpc_http: String,
    pub rpc_ws_backup: Option<String>,
    pub programs: ProgramSet,
    pub parser_batch: usize,
    pub resolver_max_retries: i64,
    pub detector: DetectorConfig,
    pub executor: ExecutorConfig,
    pub exits: ExitConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let helius = env::var("HELIUS_KEY").ok().filter(|k| !k.is_empty());

        let rpc_ws = env::var("RPC_PRIMARY")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| {
                helius
                    .as_ref()
                    .map(|k| format!("wss://mainnet.helius-rpc.com/?api-key={}", k))
            })
            .ok_or_else(|| ConfigError::MissingVariable("RPC_PRIMARY".to_string()))?;

        let rpc_http = env::var("RPC_HTTP_PRIMARY")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| {
                helius
                    .as_ref()
                    .map(|k| format!("https://mainnet.helius-rpc.com/?api-key={}", k))
            })
            .ok_or_else(|| ConfigError::MissingVariable("RPC_HTTP_PRIMARY".to_string()))?;

        let rpc_ws_backup = env::var("RPC_BACKUP").ok().filter(|v| !v.is_empty());

        Ok(Self {
            db_path: env::var("POOLFLOW_DB_PATH").unwrap_or_else(|_| "poolflow.db".to_string()),
            rpc_ws,
            rpc_http,
            rpc_ws_backup,
            programs: ProgramSet {
                raydium_amm: env::var("RAYDIUM_AMM")
                    .unwrap_or_else(|_| DEFAULT_RAYDIUM_AMM.to_string()),
                raydium_clmm: env::var("RAYDIUM_CLMM")
                    .unwrap_or_else(|_| DEFAULT_RAYDIUM_CLMM.to_string()),
                orca_amm: env::var("ORCA_AMM").unwrap_or_else(|_| DEFAULT_ORCA_AMM.to_string()),
                orca_whirl: env::var("ORCA_WHIRL")
                    .unwrap_or_else(|_| DEFAULT_ORCA_WHIRL.to_string()),
            },
            parser_batch: env_parse("PARSER_BATCH", 500usize).min(500),
            resolver_max_retries: env_parse("RESOLVER_MAX_RETRIES", 5i64),
            detector: DetectorConfig {
                vc_max: env_parse("DETECTOR_VC_MAX", 0.015),
                ofs_max: env_parse("DETECTOR_OFS_MAX", 0.001),
                lt_max: env_parse("DETECTOR_LT_MAX", 5000.0),
                wc_min: env_parse("DETECTOR_WC_MIN", 0.6),
                rq_max: env_parse("DETECTOR_RQ_MAX", 0.5),
                poll_sec: env_parse("DETECTOR_POLL_SEC", 2.0),
                dedup_sec: env_parse("DETECTOR_DEDUP_SEC", 300i64),
            },
            executor: ExecutorConfig {
                poll_sec: env_parse("EXECUTOR_POLL_SEC", 2.0),
                window_min: env_parse("EXECUTOR_WINDOW_MIN", 10i64),
                batch: env_parse("EXECUTOR_BATCH", 200i64),
            },
            exits: ExitConfig {
                poll_sec: env_parse("EXIT_POLL_SEC", 5.0),
                tp_mult: env_parse("TP_MULT", 2.0),
                sl_mult: env_parse("SL_MULT", 0.30),
                tp_partials: parse_partials(&env::var("TP_PARTIAL").unwrap_or_default()),
                sl_partials: parse_partials(&env::var("SL_PARTIAL").unwrap_or_default()),
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse a partial-exit ladder from `"level:ratio,level:ratio"`.
///
/// Malformed items are dropped; a level must be > 0 and a ratio in (0, 1].
/// The result is sorted ascending by level so lower rungs fire first.
pub fn parse_partials(raw: &str) -> Vec<PartialLevel> {
    let mut out = Vec::new();
    for item in raw.split(',') {
        let item = item.trim();
        let Some((lvl, rat)) = item.split_once(':') else {
            continue;
        };
        let (Ok(level), Ok(ratio)) = (lvl.trim().parse::<f64>(), rat.trim().parse::<f64>()) else {
            continue;
        };
        if level > 0.0 && ratio > 0.0 && ratio <= 1.0 {
            out.push(PartialLevel { level, ratio });
        }
    }
    out.sort_by(|a, b| a.level.total_cmp(&b.level));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partials_ordered() {
        let parsed = parse_partials("2.0:0.5,1.5:0.25");
        assert_eq!(
            parsed,
            vec![
                PartialLevel { level: 1.5, ratio: 0.25 },
                PartialLevel { level: 2.0, ratio: 0.5 },
            ]
        );
    }

    #[test]
    fn test_parse_partials_drops_invalid_items() {
        // Negative level, ratio above 1, missing colon, garbage: all dropped
        let parsed = parse_partials("-1:0.5,1.5:1.5,nope,abc:def,2.0:1.0");
        assert_eq!(parsed, vec![PartialLevel { level: 2.0, ratio: 1.0 }]);
    }

    #[test]
    fn test_parse_partials_empty() {
        assert!(parse_partials("").is_empty());
        assert!(parse_partials("   ").is_empty());
    }

    #[test]
    fn test_program_set_contains() {
        let programs = ProgramSet {
            raydium_amm: DEFAULT_RAYDIUM_AMM.to_string(),
            raydium_clmm: DEFAULT_RAYDIUM_CLMM.to_string(),
            orca_amm: DEFAULT_ORCA_AMM.to_string(),
            orca_whirl: DEFAULT_ORCA_WHIRL.to_string(),
        };
        assert!(programs.contains(DEFAULT_ORCA_WHIRL));
        assert!(!programs.contains("11111111111111111111111111111111"));
    }
}
