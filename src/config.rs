//! Extractor configuration
//!
//! Everything is read from the process environment (a `.env` file is loaded by
//! the binary). Sources are described by four parallel JSON arrays that must all
//! have the same length:
//!
//! ```text
//! WEBSOCKET_URLS=["wss://a.example", "https://b.example"]
//! RATE_LIMITS=[100, 250]      # milliseconds between two calls
//! CHUNK_SIZES=[2000, 1000]    # blocks per eth_getLogs
//! MAX_CONCURRENT=[4, 2]
//! ```

use crate::errors::SwapSyncError;
use alloy::primitives::Address;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::time::Duration;

/// Connection and budget for one rpc endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub rate_limit: Duration,
    pub chunk_size: u64,
    pub max_concurrent: usize,
}

/// The pool being extracted and how its integers scale into decimals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub address: Address,
    pub token0_symbol: String,
    pub token0_decimals: u32,
    pub token1_symbol: String,
    pub token1_decimals: u32,
    /// `sqrtPriceX96` is stored divided by `10^sqrt_price_decimals`
    pub sqrt_price_decimals: u32,
    pub liquidity_decimals: u32,
}

impl PoolConfig {
    /// USDC/WETH style pool: token0 has 6 decimals, token1 has 18
    pub fn new(address: Address) -> Self {
        Self {
            address,
            token0_symbol: "usdc".to_string(),
            token0_decimals: 6,
            token1_symbol: "weth".to_string(),
            token1_decimals: 18,
            sqrt_price_decimals: 18,
            liquidity_decimals: 0,
        }
    }

    /// `10^(token0_decimals - token1_decimals)`, turns `1.0001^tick` into a token1 price
    pub fn price_scaling(&self) -> f64 {
        10f64.powi(self.token0_decimals as i32 - self.token1_decimals as i32)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Applied as the connection's `search_path`
    pub schema: Option<String>,
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub sources: Vec<SourceConfig>,
    pub pool: PoolConfig,
    pub database: DatabaseConfig,
    pub call_timeout: Duration,
    pub max_retries: usize,
    /// Memory budget in bytes, shown next to heap usage
    pub memory_threshold: Option<u64>,
}

const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_TABLE: &str = "swap_events";

impl ExtractorConfig {
    /// Reads the configuration from the process environment
    pub fn from_env() -> Result<Self, SwapSyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SwapSyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sources = parse_sources(&lookup)?;

        let address = required(&lookup, "POOL_ADDRESS")?;
        let address = Address::from_str(address.trim())
            .map_err(|e| SwapSyncError::Config(format!("POOL_ADDRESS is not an address: {e}")))?;

        let mut pool = PoolConfig::new(address);
        if let Some(symbol) = lookup("TOKEN0_SYMBOL") {
            pool.token0_symbol = symbol.trim().to_lowercase();
        }
        if let Some(symbol) = lookup("TOKEN1_SYMBOL") {
            pool.token1_symbol = symbol.trim().to_lowercase();
        }
        pool.token0_decimals = parsed_or(&lookup, "TOKEN0_DECIMALS", pool.token0_decimals)?;
        pool.token1_decimals = parsed_or(&lookup, "TOKEN1_DECIMALS", pool.token1_decimals)?;
        pool.liquidity_decimals =
            parsed_or(&lookup, "LIQUIDITY_DECIMALS", pool.liquidity_decimals)?;

        let database = DatabaseConfig {
            url: required(&lookup, "DATABASE_URL")?,
            schema: lookup("DB_SCHEMA").filter(|s| !s.trim().is_empty()),
            table: lookup("SWAP_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
        };

        let call_timeout =
            Duration::from_millis(parsed_or(&lookup, "CALL_TIMEOUT_MS", DEFAULT_CALL_TIMEOUT_MS)?);
        let max_retries = parsed_or(&lookup, "MAX_RETRIES", 0usize)?;

        // 85% of the RAM_ALLOCATION gigabytes
        let memory_threshold = match lookup("RAM_ALLOCATION") {
            Some(gb) => {
                let gb: f64 = gb.trim().parse().map_err(|_| {
                    SwapSyncError::Config(format!("RAM_ALLOCATION is not a number: {gb}"))
                })?;
                Some((gb * 0.85 * 1024.0 * 1024.0 * 1024.0) as u64)
            }
            None => None,
        };

        Ok(Self {
            sources,
            pool,
            database,
            call_timeout,
            max_retries,
            memory_threshold,
        })
    }
}

fn parse_sources<F>(lookup: &F) -> Result<Vec<SourceConfig>, SwapSyncError>
where
    F: Fn(&str) -> Option<String>,
{
    let urls: Vec<String> = json_list(lookup, "WEBSOCKET_URLS")?;
    let rate_limits: Vec<u64> = json_list(lookup, "RATE_LIMITS")?;
    let chunk_sizes: Vec<u64> = json_list(lookup, "CHUNK_SIZES")?;
    let max_concurrent: Vec<usize> = json_list(lookup, "MAX_CONCURRENT")?;

    if urls.len() != rate_limits.len()
        || urls.len() != chunk_sizes.len()
        || urls.len() != max_concurrent.len()
    {
        return Err(SwapSyncError::Config(format!(
            "WEBSOCKET_URLS ({}), RATE_LIMITS ({}), CHUNK_SIZES ({}), and MAX_CONCURRENT ({}) must have the same length",
            urls.len(),
            rate_limits.len(),
            chunk_sizes.len(),
            max_concurrent.len()
        )));
    }
    if urls.is_empty() {
        return Err(SwapSyncError::Config("no sources configured".to_string()));
    }

    urls.into_iter()
        .zip(rate_limits)
        .zip(chunk_sizes)
        .zip(max_concurrent)
        .enumerate()
        .map(|(index, (((url, rate), chunk_size), max_concurrent))| {
            if chunk_size == 0 {
                return Err(SwapSyncError::Config(format!(
                    "chunk size of source {index} must be greater than zero"
                )));
            }
            Ok(SourceConfig {
                name: format!("Provider {index}"),
                url,
                rate_limit: Duration::from_millis(rate),
                chunk_size,
                max_concurrent,
            })
        })
        .collect()
}

// Missing lists are treated as empty so the length check reports them
fn json_list<T, F>(lookup: &F, key: &str) -> Result<Vec<T>, SwapSyncError>
where
    T: DeserializeOwned,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| SwapSyncError::Config(format!("{key} is not a valid JSON list: {e}"))),
        None => Ok(Vec::new()),
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, SwapSyncError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| SwapSyncError::Config(format!("{key} not set")))
}

fn parsed_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, SwapSyncError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SwapSyncError::Config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> HashMap<String, String> {
        env(&[
            ("WEBSOCKET_URLS", r#"["wss://one.example", "http://two.example"]"#),
            ("RATE_LIMITS", "[100, 250]"),
            ("CHUNK_SIZES", "[2000, 500]"),
            ("MAX_CONCURRENT", "[4, 1]"),
            ("POOL_ADDRESS", "0x45dda9cb7c25131df268515131f647d726f50608"),
            ("DATABASE_URL", "postgres://localhost/swaps"),
        ])
    }

    #[test]
    fn test_parse_full_config() {
        let mut vars = base();
        vars.insert("RAM_ALLOCATION".into(), "4".into());
        vars.insert("DB_SCHEMA".into(), "uniswapv3usdcweth".into());
        let config = ExtractorConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].name, "Provider 1");
        assert_eq!(config.sources[1].rate_limit, Duration::from_millis(250));
        assert_eq!(config.sources[1].chunk_size, 500);
        assert_eq!(config.sources[0].max_concurrent, 4);
        assert_eq!(config.pool.token0_decimals, 6);
        assert_eq!(config.pool.token1_symbol, "weth");
        assert_eq!(config.database.table, "swap_events");
        assert_eq!(config.database.schema.as_deref(), Some("uniswapv3usdcweth"));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 0);
        assert_eq!(
            config.memory_threshold,
            Some((4.0 * 0.85 * 1024.0 * 1024.0 * 1024.0) as u64)
        );
    }

    #[test]
    fn test_mismatched_lists_are_rejected() {
        let mut vars = base();
        vars.insert("CHUNK_SIZES".into(), "[2000]".into());
        let err = ExtractorConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, SwapSyncError::Config(_)));
        assert!(err.to_string().contains("must have the same length"));
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let mut vars = base();
        vars.insert("CHUNK_SIZES".into(), "[2000, 0]".into());
        assert!(ExtractorConfig::from_lookup(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_missing_database_url() {
        let mut vars = base();
        vars.remove("DATABASE_URL");
        let err = ExtractorConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert_eq!(err.to_string(), "Config error: DATABASE_URL not set");
    }

    #[test]
    fn test_price_scaling() {
        let pool = PoolConfig::new(Address::ZERO);
        assert!((pool.price_scaling() - 1e-12).abs() < 1e-24);
    }
}
