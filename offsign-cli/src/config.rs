//! Command-line configuration.
//!
//! Flags shared by every command and their conversion into the library's
//! [`OfflineConfig`] and [`FeeOverrides`]. The node endpoint comes from, in
//! order: `--api-url`, then `FULLNODE_API_INFO`, then the library default.

use std::time::Duration;

use clap::Args;

use offsign::{FeeOverrides, OfflineConfig};

/// Node connection and inclusion-wait settings.
#[derive(Debug, Args)]
pub struct NodeArgs {
    /// JSON-RPC endpoint, e.g. http://127.0.0.1:1234/rpc/v1.
    #[arg(long, global = true, env = "OFFSIGN_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the endpoint.
    #[arg(long, global = true, env = "OFFSIGN_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Lotus-style `token:/ip4/<host>/tcp/<port>/http` connection string.
    #[arg(long, global = true, env = "FULLNODE_API_INFO", hide_env_values = true)]
    pub api_info: Option<String>,

    /// Per-request timeout, in seconds.
    #[arg(long, global = true, env = "OFFSIGN_RPC_TIMEOUT", default_value_t = 30)]
    pub rpc_timeout: u64,

    /// Epochs a message must be buried under before it counts as included.
    #[arg(long, global = true, env = "OFFSIGN_CONFIDENCE", default_value_t = 5)]
    pub confidence: u64,

    /// Seconds between inclusion polls.
    #[arg(long, global = true, default_value_t = 5)]
    pub poll_interval: u64,

    /// Give up waiting for inclusion after this many seconds.
    #[arg(long, global = true, env = "OFFSIGN_WAIT_TIMEOUT", default_value_t = 1800)]
    pub wait_timeout: u64,
}

impl NodeArgs {
    pub fn to_config(&self) -> Result<OfflineConfig, String> {
        let mut config = OfflineConfig::default();

        if let Some(info) = self.api_info.as_deref() {
            let (endpoint, token) = parse_api_info(info)?;
            config.rpc.endpoint = endpoint;
            config.rpc.token = token;
        }
        if let Some(url) = &self.api_url {
            config.rpc.endpoint = url.clone();
        }
        if let Some(token) = &self.api_token {
            config.rpc.token = Some(token.clone());
        }

        config.rpc.timeout = Duration::from_secs(self.rpc_timeout);
        config.inclusion.confidence = self.confidence;
        config.inclusion.poll_interval = Duration::from_secs(self.poll_interval.max(1));
        config.inclusion.deadline = Duration::from_secs(self.wait_timeout);
        Ok(config)
    }
}

/// Gas overrides shared by every command that sends a message.
#[derive(Debug, Args)]
pub struct FeeArgs {
    /// Gas premium in attoFIL.
    #[arg(long)]
    pub gas_premium: Option<String>,

    /// Gas fee cap in attoFIL.
    #[arg(long = "gas-feecap")]
    pub gas_fee_cap: Option<String>,

    /// Gas limit; estimated when omitted.
    #[arg(long)]
    pub gas_limit: Option<i64>,

    /// Spend at most this much on gas, e.g. "0.05" or "50 milliFIL".
    #[arg(long)]
    pub max_fee: Option<String>,
}

impl FeeArgs {
    pub fn overrides(&self) -> FeeOverrides {
        FeeOverrides {
            // 0 means "estimate" on the command line.
            gas_limit: self.gas_limit.filter(|l| *l != 0),
            gas_fee_cap: self.gas_fee_cap.clone(),
            gas_premium: self.gas_premium.clone(),
            max_fee: self.max_fee.clone(),
        }
    }
}

/// Parses `[token:]<multiaddr>` into an HTTP endpoint and optional token.
///
/// Supports `/ip4`, `/ip6` and `/dns*` hosts over `/tcp/<port>` with an
/// optional trailing `/http`, `/https`, `/ws` or `/wss`.
pub fn parse_api_info(info: &str) -> Result<(String, Option<String>), String> {
    let info = info.trim();
    let (token, addr) = match info.split_once(":/") {
        Some((token, rest)) => (Some(token.to_string()), format!("/{rest}")),
        None => (None, info.to_string()),
    };

    let parts: Vec<&str> = addr.trim_start_matches('/').split('/').collect();
    let (host, port, scheme) = match parts.as_slice() {
        [proto, host, "tcp", port, rest @ ..] => {
            let host = match *proto {
                "ip4" | "dns" | "dns4" | "dns6" => host.to_string(),
                "ip6" => format!("[{host}]"),
                other => return Err(format!("unsupported address protocol {other:?} in api info")),
            };
            let scheme = match rest {
                [] | ["http"] | ["ws"] => "http",
                ["https"] | ["wss"] => "https",
                other => return Err(format!("unsupported api info suffix {:?}", other.join("/"))),
            };
            (host, *port, scheme)
        }
        _ => return Err(format!("malformed api info {addr:?}")),
    };
    port.parse::<u16>()
        .map_err(|e| format!("invalid port {port:?} in api info: {e}"))?;

    let token = token.filter(|t| !t.is_empty());
    Ok((format!("{scheme}://{host}:{port}/rpc/v1"), token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_info_with_token() {
        let (endpoint, token) = parse_api_info("eyJhbGciOi.abc:/ip4/10.0.0.7/tcp/1234/http").unwrap();
        assert_eq!(endpoint, "http://10.0.0.7:1234/rpc/v1");
        assert_eq!(token.as_deref(), Some("eyJhbGciOi.abc"));
    }

    #[test]
    fn api_info_without_token_or_suffix() {
        let (endpoint, token) = parse_api_info("/dns/lotus.internal/tcp/443/https").unwrap();
        assert_eq!(endpoint, "https://lotus.internal:443/rpc/v1");
        assert_eq!(token, None);

        let (endpoint, _) = parse_api_info("/ip6/::1/tcp/1234").unwrap();
        assert_eq!(endpoint, "http://[::1]:1234/rpc/v1");
    }

    #[test]
    fn malformed_api_info_is_rejected() {
        assert!(parse_api_info("tok:/ip4/127.0.0.1/udp/1234").is_err());
        assert!(parse_api_info("/ip4/127.0.0.1/tcp/notaport/http").is_err());
        assert!(parse_api_info("/unix/tmp/lotus.sock/tcp/1").is_err());
    }

    #[test]
    fn explicit_url_wins_over_api_info() {
        let args = NodeArgs {
            api_url: Some("http://override:1/rpc/v1".to_string()),
            api_token: None,
            api_info: Some("tok:/ip4/127.0.0.1/tcp/1234/http".to_string()),
            rpc_timeout: 10,
            confidence: 2,
            poll_interval: 0,
            wait_timeout: 60,
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.rpc.endpoint, "http://override:1/rpc/v1");
        assert_eq!(config.rpc.token.as_deref(), Some("tok"));
        assert_eq!(config.inclusion.confidence, 2);
        assert_eq!(config.inclusion.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn zero_gas_limit_means_estimate() {
        let fees = FeeArgs {
            gas_premium: None,
            gas_fee_cap: Some("1000".to_string()),
            gas_limit: Some(0),
            max_fee: None,
        };
        let overrides = fees.overrides();
        assert_eq!(overrides.gas_limit, None);
        assert_eq!(overrides.gas_fee_cap.as_deref(), Some("1000"));
    }
}
