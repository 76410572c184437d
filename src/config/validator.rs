//! Configuration validation

use super::*;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &SimConfig) -> Result<()> {
    validate_grid(&config.grid)?;
    validate_run(&config.run)?;
    validate_network(&config.network)?;

    Ok(())
}

/// Validate grid shape, temperatures and diffusion parameters
pub fn validate_grid(grid: &GridConfig) -> Result<()> {
    if grid.rows < 3 || grid.cols < 3 {
        anyhow::bail!(
            "grid must be at least 3x3 to have interior cells, got {}x{}",
            grid.rows,
            grid.cols
        );
    }

    if !grid.initial_temp.is_finite() {
        anyhow::bail!("initial_temp must be finite, got {}", grid.initial_temp);
    }

    let b = &grid.boundary;
    for (edge, value) in [
        ("top", b.top),
        ("bottom", b.bottom),
        ("left", b.left),
        ("right", b.right),
    ] {
        if !value.is_finite() {
            anyhow::bail!("boundary.{} must be finite, got {}", edge, value);
        }
    }

    match grid.coefficient {
        Some(c) => {
            if !(c.is_finite() && c > 0.0) {
                anyhow::bail!("coefficient must be positive and finite, got {}", c);
            }
        }
        None => {
            for (name, value) in [("alpha", grid.alpha), ("dt", grid.dt), ("dx", grid.dx)] {
                if !(value.is_finite() && value > 0.0) {
                    anyhow::bail!("{} must be positive and finite, got {}", name, value);
                }
            }
        }
    }

    if let Some(ref hotspot) = grid.hotspot {
        validate_hotspot(hotspot, grid.rows, grid.cols)?;
    }

    Ok(())
}

/// Hotspot must sit strictly inside the boundary
pub fn validate_hotspot(hotspot: &Hotspot, rows: usize, cols: usize) -> Result<()> {
    let inside = hotspot.row >= 1
        && hotspot.row < rows - 1
        && hotspot.col >= 1
        && hotspot.col < cols - 1;
    if !inside {
        anyhow::bail!(
            "hotspot ({}, {}) must be an interior cell of the {}x{} grid",
            hotspot.row,
            hotspot.col,
            rows,
            cols
        );
    }
    if !hotspot.temp.is_finite() {
        anyhow::bail!("hotspot temperature must be finite, got {}", hotspot.temp);
    }
    Ok(())
}

/// Validate iteration control
pub fn validate_run(run: &RunConfig) -> Result<()> {
    if run.iterations == 0 {
        anyhow::bail!("iterations must be at least 1");
    }

    if let Some(tol) = run.tolerance {
        if !(tol.is_finite() && tol > 0.0) {
            anyhow::bail!("tolerance must be positive and finite, got {}", tol);
        }
    }

    if run.workers == 0 {
        anyhow::bail!("workers must be at least 1");
    }

    Ok(())
}

/// Validate master address and deadlines
pub fn validate_network(network: &NetworkConfig) -> Result<()> {
    if network.host.trim().is_empty() {
        anyhow::bail!("network.host must not be empty");
    }

    for (name, value) in [
        ("round_timeout_ms", network.round_timeout_ms),
        ("accept_timeout_ms", network.accept_timeout_ms),
        ("connect_timeout_ms", network.connect_timeout_ms),
    ] {
        if value == 0 {
            anyhow::bail!("network.{} must be greater than 0", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.grid.rows = 6;
        config.grid.cols = 6;
        config.run.workers = 2;
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SimConfig::default()).is_ok());
        assert!(validate_config(&small_config()).is_ok());
    }

    #[test]
    fn test_validate_grid_size() {
        let mut config = small_config();
        config.grid.rows = 2;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("at least 3x3"));
    }

    #[test]
    fn test_validate_coefficient_and_physical_params() {
        let mut grid = small_config().grid;
        grid.coefficient = Some(0.0);
        assert!(validate_grid(&grid).is_err());

        grid.coefficient = Some(f64::NAN);
        assert!(validate_grid(&grid).is_err());

        // Above the CFL limit is allowed; it only warns at run time
        grid.coefficient = Some(0.4);
        assert!(validate_grid(&grid).is_ok());

        grid.coefficient = None;
        grid.dx = 0.0;
        assert!(validate_grid(&grid).is_err());
    }

    #[test]
    fn test_validate_hotspot_position() {
        let hotspot = |row, col| Hotspot {
            row,
            col,
            temp: 100.0,
        };

        assert!(validate_hotspot(&hotspot(1, 1), 6, 6).is_ok());
        assert!(validate_hotspot(&hotspot(4, 4), 6, 6).is_ok());
        assert!(validate_hotspot(&hotspot(0, 3), 6, 6).is_err());
        assert!(validate_hotspot(&hotspot(3, 5), 6, 6).is_err());
        assert!(validate_hotspot(&hotspot(6, 3), 6, 6).is_err());
    }

    #[test]
    fn test_validate_run() {
        let mut run = small_config().run;
        run.iterations = 0;
        assert!(validate_run(&run).is_err());

        run.iterations = 10;
        run.tolerance = Some(-1.0);
        assert!(validate_run(&run).is_err());

        run.tolerance = Some(f64::INFINITY);
        assert!(validate_run(&run).is_err());

        run.tolerance = Some(1e-4);
        assert!(validate_run(&run).is_ok());

        run.workers = 0;
        assert!(validate_run(&run).is_err());
    }

    #[test]
    fn test_validate_network() {
        let mut network = NetworkConfig::default();
        assert!(validate_network(&network).is_ok());

        network.round_timeout_ms = 0;
        assert!(validate_network(&network).is_err());

        network.round_timeout_ms = 100;
        network.host = " ".to_string();
        assert!(validate_network(&network).is_err());
    }
}
