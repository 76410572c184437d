//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<SimConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<SimConfig> {
    let config: SimConfig =
        ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Render a configuration back to TOML
pub fn to_toml_string(config: &SimConfig) -> Result<String> {
    ::toml::to_string_pretty(config).context("Failed to serialize configuration")
}

/// Load the file named by `--config` (or defaults) and apply CLI overrides
pub fn load_config(cli: &Cli) -> Result<SimConfig> {
    let config = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => SimConfig::default(),
    };
    merge_cli_with_config(cli, config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: SimConfig) -> Result<SimConfig> {
    // Grid shape
    if let Some(size) = cli.size {
        config.grid.rows = size;
        config.grid.cols = size;
    }
    if let Some(rows) = cli.rows {
        config.grid.rows = rows;
    }
    if let Some(cols) = cli.cols {
        config.grid.cols = cols;
    }
    if let Some(initial) = cli.initial_temp {
        config.grid.initial_temp = initial;
    }

    // Boundary: the uniform value first, then per-edge values on top of it
    if let Some(value) = cli.boundary {
        config.grid.boundary = Boundary::uniform(value);
    }
    if let Some(top) = cli.top {
        config.grid.boundary.top = top;
    }
    if let Some(bottom) = cli.bottom {
        config.grid.boundary.bottom = bottom;
    }
    if let Some(left) = cli.left {
        config.grid.boundary.left = left;
    }
    if let Some(right) = cli.right {
        config.grid.boundary.right = right;
    }

    // Diffusion parameters
    if let Some(c) = cli.coefficient {
        config.grid.coefficient = Some(c);
    }
    if let Some(alpha) = cli.alpha {
        config.grid.alpha = alpha;
    }
    if let Some(dt) = cli.dt {
        config.grid.dt = dt;
    }
    if let Some(dx) = cli.dx {
        config.grid.dx = dx;
    }
    if let Some(hotspot) = cli.hotspot {
        config.grid.hotspot = Some(hotspot);
    }

    // Run control
    if let Some(iterations) = cli.iterations {
        config.run.iterations = iterations;
    }
    if let Some(tol) = cli.tolerance {
        config.run.tolerance = Some(tol);
    }
    if let Some(workers) = cli.workers {
        config.run.workers = workers;
    }

    // Network
    if let Some(ref host) = cli.host {
        config.network.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(ms) = cli.round_timeout_ms {
        config.network.round_timeout_ms = ms;
    }
    if let Some(ms) = cli.accept_timeout_ms {
        config.network.accept_timeout_ms = ms;
    }
    if let Some(ms) = cli.connect_timeout_ms {
        config.network.connect_timeout_ms = ms;
    }

    // Runtime
    if cli.debug {
        config.runtime.debug = true;
    }
    if let Some(ref path) = cli.json_output {
        config.runtime.json_output = Some(path.clone());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_parse_toml_basic() {
        let config = parse_toml_string(
            r#"
            [grid]
            rows = 6
            cols = 8
            initial_temp = 0.0
            coefficient = 0.2

            [grid.boundary]
            top = 100.0

            [run]
            iterations = 50
            workers = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.grid.rows, 6);
        assert_eq!(config.grid.cols, 8);
        assert_eq!(config.grid.boundary.top, 100.0);
        assert_eq!(config.grid.boundary.left, 0.0);
        assert_eq!(config.grid.coefficient, Some(0.2));
        assert_eq!(config.run.iterations, 50);
        assert_eq!(config.run.workers, 2);
        assert_eq!(config.run.tolerance, None);
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn test_parse_toml_hotspot_and_network() {
        let config = parse_toml_string(
            r#"
            [grid.hotspot]
            row = 3
            col = 4
            temp = 80.0

            [network]
            host = "0.0.0.0"
            port = 4000
            round_timeout_ms = 500
            "#,
        )
        .unwrap();

        let hotspot = config.grid.hotspot.unwrap();
        assert_eq!((hotspot.row, hotspot.col, hotspot.temp), (3, 4, 80.0));
        assert_eq!(config.network.addr(), "0.0.0.0:4000");
        assert_eq!(config.network.round_timeout_ms, 500);
        assert_eq!(config.network.accept_timeout_ms, 60_000);
        assert_eq!(config.grid.rows, 200);
    }

    #[test]
    fn test_parse_toml_rejects_unknown_types() {
        assert!(parse_toml_string("[grid]\nrows = \"many\"\n").is_err());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let mut config = SimConfig::default();
        config.grid.rows = 12;
        config.grid.coefficient = Some(0.125);
        config.run.tolerance = Some(1e-6);
        config.runtime.json_output = Some(PathBuf::from("out.json"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(to_toml_string(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = parse_toml_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = parse_toml_file(Path::new("/nonexistent/heatflow.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/heatflow.toml"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[grid]\nrows = 10\ncols = 10\n[grid.boundary]\ntop = 5.0\nleft = 1.0\n[run]\niterations = 7\nworkers = 3"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = Cli::try_parse_from([
            "heatflow",
            "--config",
            path.as_str(),
            "--cols",
            "20",
            "--top",
            "100",
            "-n",
            "9",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.grid.rows, 10);
        assert_eq!(config.grid.cols, 20);
        assert_eq!(config.grid.boundary.top, 100.0);
        assert_eq!(config.grid.boundary.left, 1.0);
        assert_eq!(config.run.iterations, 9);
        assert_eq!(config.run.workers, 3);
    }

    #[test]
    fn test_uniform_boundary_then_edge_override() {
        let cli =
            Cli::try_parse_from(["heatflow", "--boundary", "10", "--bottom", "0"]).unwrap();
        let config = merge_cli_with_config(&cli, SimConfig::default()).unwrap();

        assert_eq!(config.grid.boundary.top, 10.0);
        assert_eq!(config.grid.boundary.left, 10.0);
        assert_eq!(config.grid.boundary.right, 10.0);
        assert_eq!(config.grid.boundary.bottom, 0.0);
    }
}
