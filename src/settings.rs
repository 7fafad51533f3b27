use std::path::{Path, PathBuf};

use crate::components::history::CompactionPolicy;
use crate::error::ConfigError;

/// Colouring settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct ColoringSettings {
    /// Segment the whole image at load time instead of filling on demand
    pub precomputed: bool,
    /// Spatial index divisions along x
    pub grid_x: u32,
    /// Spatial index divisions along y
    pub grid_y: u32,
    /// Image pixels per view unit
    pub display_scale: f32,
    /// Default line width for new gestures (view units)
    pub stroke_width: f32,
    /// Default paint colour for new gestures (straight RGBA)
    pub stroke_color: [u8; 4],
    pub precomputed_compaction: CompactionPolicy,
    pub on_demand_compaction: CompactionPolicy,
    /// Finger input is held back this long before ink lands
    pub touch_hold_off_ms: u32,
    /// Stylus input is held back this long before ink lands
    pub pencil_hold_off_ms: u32,
}

impl Default for ColoringSettings {
    fn default() -> Self {
        Self {
            precomputed: true,
            grid_x: 4,
            grid_y: 4,
            display_scale: 1.0,
            stroke_width: 5.0,
            stroke_color: [0, 0, 0, 255],
            precomputed_compaction: CompactionPolicy::new(100, 30),
            on_demand_compaction: CompactionPolicy::new(8, 0),
            touch_hold_off_ms: 100,
            pencil_hold_off_ms: 42,
        }
    }
}

impl ColoringSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/tapfill/tapfill_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\Tapfill\tapfill_settings.cfg
    /// On macOS:   ~/Library/Application Support/Tapfill/tapfill_settings.cfg
    /// Fallback:   same directory as the executable.
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("tapfill");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("tapfill_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("Tapfill");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("tapfill_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("Tapfill");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("tapfill_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("tapfill_settings.cfg")))
        }
    }

    /// Reject values no session can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_x == 0 || self.grid_y == 0 {
            return Err(ConfigError::ZeroGrid {
                x: self.grid_x,
                y: self.grid_y,
            });
        }
        if !(self.display_scale > 0.0 && self.display_scale.is_finite()) {
            return Err(ConfigError::InvalidScale(self.display_scale));
        }
        if !(self.stroke_width > 0.0 && self.stroke_width.is_finite()) {
            return Err(ConfigError::InvalidStrokeWidth(self.stroke_width));
        }
        Ok(())
    }

    /// Compaction policy for the configured fill mode.
    pub fn compaction(&self) -> CompactionPolicy {
        if self.precomputed {
            self.precomputed_compaction
        } else {
            self.on_demand_compaction
        }
    }

    /// Serialize a colour as "r,g,b,a"
    fn color_to_str(c: [u8; 4]) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse a colour from "r,g,b,a"
    fn str_to_color(s: &str) -> Option<[u8; 4]> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return None;
        }
        let r = parts[0].trim().parse::<u8>().ok()?;
        let g = parts[1].trim().parse::<u8>().ok()?;
        let b = parts[2].trim().parse::<u8>().ok()?;
        let a = parts[3].trim().parse::<u8>().ok()?;
        Some([r, g, b, a])
    }

    /// Parse a policy from "threshold,retain"
    fn str_to_policy(s: &str) -> Option<CompactionPolicy> {
        let (threshold, retain) = s.split_once(',')?;
        Some(CompactionPolicy::new(
            threshold.trim().parse().ok()?,
            retain.trim().parse().ok()?,
        ))
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "precomputed={}\n\
             grid_x={}\n\
             grid_y={}\n\
             display_scale={}\n\
             stroke_width={}\n\
             stroke_color={}\n\
             precomputed_compaction={},{}\n\
             on_demand_compaction={},{}\n\
             touch_hold_off_ms={}\n\
             pencil_hold_off_ms={}\n",
            self.precomputed,
            self.grid_x,
            self.grid_y,
            self.display_scale,
            self.stroke_width,
            Self::color_to_str(self.stroke_color),
            self.precomputed_compaction.threshold,
            self.precomputed_compaction.retain,
            self.on_demand_compaction.threshold,
            self.on_demand_compaction.retain,
            self.touch_hold_off_ms,
            self.pencil_hold_off_ms,
        )
    }

    /// Parse `key=value` lines.  Unknown keys are ignored and malformed
    /// values keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        let d = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            let val = val.trim();
            match key.trim() {
                "precomputed" => s.precomputed = val == "true",
                "grid_x" => s.grid_x = val.parse().unwrap_or(d.grid_x),
                "grid_y" => s.grid_y = val.parse().unwrap_or(d.grid_y),
                "display_scale" => s.display_scale = val.parse().unwrap_or(d.display_scale),
                "stroke_width" => s.stroke_width = val.parse().unwrap_or(d.stroke_width),
                "stroke_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.stroke_color = c;
                    }
                }
                "precomputed_compaction" => {
                    if let Some(p) = Self::str_to_policy(val) {
                        s.precomputed_compaction = p;
                    }
                }
                "on_demand_compaction" => {
                    if let Some(p) = Self::str_to_policy(val) {
                        s.on_demand_compaction = p;
                    }
                }
                "touch_hold_off_ms" => {
                    s.touch_hold_off_ms = val.parse().unwrap_or(d.touch_hold_off_ms)
                }
                "pencil_hold_off_ms" => {
                    s.pencil_hold_off_ms = val.parse().unwrap_or(d.pencil_hold_off_ms)
                }
                _ => {}
            }
        }
        s
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Could not write settings to {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_config_string())
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let s = ColoringSettings::default();
        assert!(s.precomputed);
        assert_eq!((s.grid_x, s.grid_y), (4, 4));
        assert_eq!(s.precomputed_compaction, CompactionPolicy::new(100, 30));
        assert_eq!(s.on_demand_compaction, CompactionPolicy::new(8, 0));
        assert_eq!((s.touch_hold_off_ms, s.pencil_hold_off_ms), (100, 42));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn config_string_survives_a_reparse() {
        let mut s = ColoringSettings::default();
        s.precomputed = false;
        s.grid_x = 8;
        s.stroke_color = [10, 20, 30, 128];
        s.on_demand_compaction = CompactionPolicy::new(12, 2);
        assert_eq!(ColoringSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn unknown_keys_and_bad_values_fall_back() {
        let s = ColoringSettings::parse(
            "grid_x=abc\nfavourite_animal=otter\nstroke_color=1,2,3\nno equals sign\ngrid_y = 2\n",
        );
        assert_eq!(s.grid_x, 4);
        assert_eq!(s.grid_y, 2);
        assert_eq!(s.stroke_color, [0, 0, 0, 255]);
    }

    #[test]
    fn validate_reports_unusable_values() {
        let mut s = ColoringSettings::default();
        s.grid_y = 0;
        assert_eq!(s.validate(), Err(ConfigError::ZeroGrid { x: 4, y: 0 }));

        let mut s = ColoringSettings::default();
        s.display_scale = 0.0;
        assert_eq!(s.validate(), Err(ConfigError::InvalidScale(0.0)));

        let mut s = ColoringSettings::default();
        s.stroke_width = -1.0;
        assert_eq!(s.validate(), Err(ConfigError::InvalidStrokeWidth(-1.0)));
    }

    #[test]
    fn saved_file_loads_back() {
        let path = std::env::temp_dir().join(format!(
            "tapfill_settings_test_{}.cfg",
            std::process::id()
        ));
        let mut s = ColoringSettings::default();
        s.grid_x = 6;
        s.precomputed = false;
        s.save_to(&path).unwrap();
        assert_eq!(ColoringSettings::load_from(&path), s);
        let _ = std::fs::remove_file(&path);

        // Missing file means defaults
        assert_eq!(ColoringSettings::load_from(&path), ColoringSettings::default());
    }

    #[test]
    fn compaction_follows_the_mode() {
        let mut s = ColoringSettings::default();
        assert_eq!(s.compaction().threshold, 100);
        s.precomputed = false;
        assert_eq!(s.compaction().threshold, 8);
    }
}
