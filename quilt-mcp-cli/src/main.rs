// quilt-mcp-cli/src/main.rs
// ============================================================================
// Module: Quilt MCP CLI Entry Point
// Description: Flag parsing, config resolution, and server startup.
// Purpose: Run the MCP server with documented exit codes.
// Dependencies: clap, quilt-mcp, tokio
// ============================================================================

//! ## Overview
//! Flags override environment variables, which override the deployment
//! preset. Exit codes: 0 clean shutdown, 1 unrecoverable runtime error,
//! 2 invalid configuration, 130 external interrupt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;
use quilt_mcp::McpServer;
use quilt_mcp_config::ConfigOverrides;
use quilt_mcp_config::QuiltMcpConfig;
use quilt_mcp_core::BackendKind;
use quilt_mcp_core::DeploymentMode;
use quilt_mcp_core::TransportKind;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Clean shutdown.
const EXIT_OK: u8 = 0;
/// Unrecoverable runtime error.
const EXIT_RUNTIME: u8 = 1;
/// Configuration rejected.
const EXIT_CONFIG: u8 = 2;
/// External interrupt (SIGINT).
const EXIT_INTERRUPT: u8 = 130;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Quilt MCP server command line.
#[derive(Parser, Debug)]
#[command(name = "quilt-mcp", version, about = "MCP server for the Quilt data catalog")]
struct Cli {
    /// Deployment preset.
    #[arg(long, value_enum)]
    deployment: Option<DeploymentArg>,
    /// Backend kind override.
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
    /// Transport override.
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,
    /// Catalog GraphQL base URL.
    #[arg(long, value_name = "URL")]
    catalog_url: Option<String>,
    /// Registry host or s3:// bucket.
    #[arg(long, value_name = "URL")]
    registry_url: Option<String>,
    /// Strict mode: every tool call demands a validated JWT.
    #[arg(long, action = ArgAction::SetTrue)]
    require_jwt: bool,
    /// Outbound HTTP timeout in seconds.
    #[arg(long, value_name = "N")]
    service_timeout: Option<u64>,
    /// Suppress the startup banner.
    #[arg(long, action = ArgAction::SetTrue)]
    skip_banner: bool,
}

/// Deployment preset argument.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum DeploymentArg {
    /// Stateless HTTP against the catalog.
    Remote,
    /// Local stdio against the catalog.
    Local,
    /// Legacy stdio against the direct backend.
    Legacy,
}

/// Backend kind argument.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum BackendArg {
    /// Direct S3-native backend.
    Direct,
    /// Catalog GraphQL backend.
    Graphql,
}

/// Transport kind argument.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum TransportArg {
    /// Framed JSON-RPC over stdin/stdout.
    Stdio,
    /// HTTP endpoint at /mcp.
    Http,
}

impl From<DeploymentArg> for DeploymentMode {
    fn from(arg: DeploymentArg) -> Self {
        match arg {
            DeploymentArg::Remote => Self::Remote,
            DeploymentArg::Local => Self::Local,
            DeploymentArg::Legacy => Self::Legacy,
        }
    }
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Direct => Self::Direct,
            BackendArg::Graphql => Self::Graphql,
        }
    }
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => Self::Stdio,
            TransportArg::Http => Self::Http,
        }
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        deployment: cli.deployment.map(Into::into),
        backend: cli.backend.map(Into::into),
        transport: cli.transport.map(Into::into),
        catalog_url: cli.catalog_url,
        registry_url: cli.registry_url,
        require_jwt: if cli.require_jwt { Some(true) } else { None },
        service_timeout_secs: cli.service_timeout,
        skip_banner: cli.skip_banner,
    };
    let config = match QuiltMcpConfig::resolve(&overrides) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("quilt-mcp: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if !config.skip_banner {
        print_banner(&config);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("quilt-mcp: runtime start failed: {err}");
            return ExitCode::from(EXIT_RUNTIME);
        }
    };
    let code = runtime.block_on(run(config));
    ExitCode::from(code)
}

/// Runs the server, racing it against an external interrupt.
async fn run(config: QuiltMcpConfig) -> u8 {
    let server = match McpServer::from_config(config).await {
        Ok(server) => server,
        Err(err) => {
            eprintln!("quilt-mcp: startup failed: {err}");
            return if err.kind == quilt_mcp_core::ErrorKind::ConfigInvalid {
                EXIT_CONFIG
            } else {
                EXIT_RUNTIME
            };
        }
    };
    tokio::select! {
        result = server.serve() => match result {
            Ok(()) => EXIT_OK,
            Err(err) => {
                eprintln!("quilt-mcp: {err}");
                EXIT_RUNTIME
            }
        },
        _ = tokio::signal::ctrl_c() => EXIT_INTERRUPT,
    }
}

/// Prints the startup banner to stderr so stdio framing stays clean.
fn print_banner(config: &QuiltMcpConfig) {
    let _ = writeln!(
        std::io::stderr(),
        "quilt-mcp {} ({:?} deployment, {:?} backend, {:?} transport)",
        env!("CARGO_PKG_VERSION"),
        config.deployment,
        config.backend,
        config.transport,
    );
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use clap::Parser;

    use super::Cli;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_parse_into_overrides() {
        let cli = Cli::parse_from([
            "quilt-mcp",
            "--deployment",
            "remote",
            "--backend",
            "graphql",
            "--transport",
            "http",
            "--catalog-url",
            "https://demo.quiltdata.com",
            "--require-jwt",
            "--service-timeout",
            "30",
            "--skip-banner",
        ]);
        assert!(cli.require_jwt);
        assert!(cli.skip_banner);
        assert_eq!(cli.service_timeout, Some(30));
        assert_eq!(cli.catalog_url.as_deref(), Some("https://demo.quiltdata.com"));
    }
}
