use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gemproxy_common::{GlobalConfig, GlobalConfigPatch};

#[derive(Debug, Parser)]
#[command(
    name = "gemproxy",
    version,
    about = "OpenAI-compatible proxy in front of the Gemini API"
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) config: ConfigArgs,

    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the standalone HTTP server (default).
    Serve,
    /// Read one function-compute HTTP event from stdin and print the reply.
    Invoke,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct ConfigArgs {
    /// JSON config file; CLI flags and environment override it.
    #[arg(long, env = "GEMPROXY_CONFIG", global = true)]
    pub(crate) config: Option<String>,

    /// Bind host.
    #[arg(long, env = "GEMPROXY_HOST", global = true)]
    pub(crate) host: Option<String>,

    /// Bind port. `PORT` is honoured when this is unset.
    #[arg(long, env = "GEMPROXY_PORT", global = true)]
    pub(crate) port: Option<u16>,

    /// Key used when a request carries no bearer token.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub(crate) api_key: Option<String>,

    /// Gemini API base URL.
    #[arg(long, env = "GEMPROXY_UPSTREAM", global = true)]
    pub(crate) upstream: Option<String>,

    /// Optional outbound proxy for upstream requests.
    #[arg(long, env = "GEMPROXY_PROXY", global = true)]
    pub(crate) proxy: Option<String>,

    #[arg(long, env = "GEMPROXY_CONNECT_TIMEOUT_SECS", global = true)]
    pub(crate) connect_timeout_secs: Option<u64>,

    #[arg(long, env = "GEMPROXY_REQUEST_TIMEOUT_SECS", global = true)]
    pub(crate) request_timeout_secs: Option<u64>,

    #[arg(long, env = "GEMPROXY_STREAM_IDLE_TIMEOUT_SECS", global = true)]
    pub(crate) stream_idle_timeout_secs: Option<u64>,

    #[arg(long, env = "GEMPROXY_MAX_BODY_BYTES", global = true)]
    pub(crate) max_body_bytes: Option<usize>,
}

impl ConfigArgs {
    fn into_patch(self) -> GlobalConfigPatch {
        let port = self.port.or_else(|| {
            std::env::var("PORT")
                .ok()
                .and_then(|value| value.trim().parse().ok())
        });
        GlobalConfigPatch {
            host: self.host,
            port,
            default_api_key: self.api_key,
            upstream_base_url: self.upstream,
            proxy: self.proxy,
            connect_timeout_secs: self.connect_timeout_secs,
            request_timeout_secs: self.request_timeout_secs,
            stream_idle_timeout_secs: self.stream_idle_timeout_secs,
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// defaults < config file < CLI/ENV.
    pub(crate) fn resolve(self) -> anyhow::Result<GlobalConfig> {
        let mut merged = match self.config.as_deref() {
            Some(path) => GlobalConfigPatch::from_file(path).context("load config file")?,
            None => GlobalConfigPatch::default(),
        };
        merged.overlay(self.into_patch());
        merged
            .into_config()
            .context("finalize merged global config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_with_subcommand() {
        let cli = Cli::try_parse_from([
            "gemproxy",
            "invoke",
            "--port",
            "9000",
            "--upstream",
            "http://localhost:1234/",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Invoke)));
        let config = cli.config.resolve().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.upstream_base_url, "http://localhost:1234");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["gemproxy", "--request-timeout-secs", "0"]).unwrap();
        assert!(cli.config.resolve().is_err());
    }
}
