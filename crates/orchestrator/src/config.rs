//! Configuration parsing and validation for decomposition runs.

use grid::cell::SendMask;
use grid::error::DecompositionError;
use serde::{Deserialize, Serialize};
use std::fs;

/// Main decomposition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// Human-readable run name.
    pub name: String,
    /// Global box size per axis.
    pub box_size: [f64; 3],
    /// Periodic boundary conditions.
    pub periodic: bool,
    /// Top-level grid resolution per axis, shared by the natural and the
    /// zoom grid.
    pub cdim: [usize; 3],
    /// Embed a zoom grid over the high-resolution particle subset.
    #[serde(default)]
    pub with_zoom_region: bool,
    /// Multiplier applied to the high-resolution extent to buffer the
    /// zoom cube.
    #[serde(default = "default_zoom_boost_factor")]
    pub zoom_boost_factor: f64,
    /// Chebyshev radius of the neighbour shell around the zoom region.
    #[serde(default = "default_neighbour_delta")]
    pub neighbour_delta: usize,
    /// Gravity opening angle: pairs failing the angle test are deferred to
    /// the multipole approximation.
    pub theta_crit: f64,
    /// Long-range truncation distance of the periodic mesh, if one is used.
    pub mesh_r_cut_max: Option<f64>,
    /// Maximum number of communication proxies per rank.
    #[serde(default = "default_max_proxies")]
    pub max_proxies: usize,
    /// Build hydrodynamics interactions.
    #[serde(default)]
    pub with_hydro: bool,
    /// Build gravity interactions.
    #[serde(default = "default_true")]
    pub with_gravity: bool,
}

fn default_zoom_boost_factor() -> f64 {
    1.1
}

fn default_neighbour_delta() -> usize {
    1
}

fn default_max_proxies() -> usize {
    SendMask::CAPACITY
}

fn default_true() -> bool {
    true
}

impl DecompositionConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, DecompositionError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            DecompositionError::config(format!("failed to read config file {path}: {e}"))
        })?;

        let config: DecompositionConfig = serde_json::from_str(&contents)
            .map_err(|e| DecompositionError::config(format!("failed to parse config JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), DecompositionError> {
        for a in 0..3 {
            if self.box_size[a] <= 0.0 {
                return Err(DecompositionError::config(format!(
                    "box size must be positive on axis {a}"
                )));
            }
            if self.cdim[a] < 3 {
                return Err(DecompositionError::config(format!(
                    "grid resolution must be at least 3 on axis {a}"
                )));
            }
        }

        if self.theta_crit <= 0.0 || self.theta_crit >= 1.0 {
            return Err(DecompositionError::config(
                "opening angle theta_crit must lie in (0, 1)",
            ));
        }

        if self.with_zoom_region {
            if self.zoom_boost_factor < 1.0 {
                return Err(DecompositionError::config(
                    "zoom boost factor must be at least 1",
                ));
            }
            if self.box_size[0] != self.box_size[1] || self.box_size[1] != self.box_size[2] {
                return Err(DecompositionError::geometry(
                    "a zoom region requires a cubic box",
                ));
            }
            if self.neighbour_delta == 0 {
                return Err(DecompositionError::config(
                    "neighbour shell radius must be at least 1",
                ));
            }
        }

        if let Some(r_cut) = self.mesh_r_cut_max {
            if !self.periodic {
                return Err(DecompositionError::config(
                    "a mesh truncation distance only applies to periodic boxes",
                ));
            }
            let half_min = 0.5 * self.box_size[0].min(self.box_size[1]).min(self.box_size[2]);
            if r_cut <= 0.0 || r_cut > half_min {
                return Err(DecompositionError::config(format!(
                    "mesh truncation distance {r_cut} must lie in (0, {half_min}]"
                )));
            }
        }

        if self.max_proxies == 0 || self.max_proxies > SendMask::CAPACITY {
            return Err(DecompositionError::config(format!(
                "max_proxies must lie in [1, {}]",
                SendMask::CAPACITY
            )));
        }

        if !self.with_hydro && !self.with_gravity {
            return Err(DecompositionError::config(
                "at least one of hydro and gravity must be enabled",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> DecompositionConfig {
        DecompositionConfig {
            name: "test".to_string(),
            box_size: [8.0; 3],
            periodic: true,
            cdim: [8, 8, 8],
            with_zoom_region: true,
            zoom_boost_factor: default_zoom_boost_factor(),
            neighbour_delta: default_neighbour_delta(),
            theta_crit: 0.5,
            mesh_r_cut_max: None,
            max_proxies: default_max_proxies(),
            with_hydro: false,
            with_gravity: true,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zoom_region_requires_a_cubic_box() {
        let mut config = base_config();
        config.box_size = [8.0, 8.0, 4.0];
        assert!(matches!(
            config.validate(),
            Err(DecompositionError::Geometry(_))
        ));

        // Without the zoom region the same box is fine.
        config.with_zoom_region = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mesh_cutoff_bounds() {
        let mut config = base_config();
        config.mesh_r_cut_max = Some(4.0);
        assert!(config.validate().is_ok());

        // Beyond half the box the nearest-image convention breaks.
        config.mesh_r_cut_max = Some(4.5);
        assert!(config.validate().is_err());

        // No mesh without periodicity.
        config.mesh_r_cut_max = Some(2.0);
        config.periodic = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn proxy_capacity_is_bounded_by_the_send_mask() {
        let mut config = base_config();
        config.max_proxies = SendMask::CAPACITY + 1;
        assert!(config.validate().is_err());
        config.max_proxies = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn opening_angle_range() {
        let mut config = base_config();
        config.theta_crit = 0.0;
        assert!(config.validate().is_err());
        config.theta_crit = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_with_defaults() {
        let json = r#"{
            "name": "small box",
            "box_size": [8.0, 8.0, 8.0],
            "periodic": true,
            "cdim": [8, 8, 8],
            "theta_crit": 0.5,
            "mesh_r_cut_max": null
        }"#;
        let config: DecompositionConfig = serde_json::from_str(json).unwrap();
        assert!(!config.with_zoom_region);
        assert_eq!(config.zoom_boost_factor, 1.1);
        assert_eq!(config.neighbour_delta, 1);
        assert_eq!(config.max_proxies, SendMask::CAPACITY);
        assert!(config.with_gravity);
        assert!(!config.with_hydro);
        assert!(config.validate().is_ok());
    }
}
