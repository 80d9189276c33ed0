use std::fs;
use std::path::Path;

use crossframe_core::{MessengerError, Origin, TargetOrigin};

/// High-level configuration for the frame handshake demo
#[derive(Clone, Debug, PartialEq)]
pub struct FrameHandshakeConfig {
    /// Origin of the host page
    pub parent_origin: String,
    /// Origin of the embedded widget frame
    pub child_origin: String,
    /// Origin of a window that tries to inject forged messages
    pub rogue_origin: String,
    pub ping_rounds: u32,
    /// Bind each messenger to its peer's exact origin instead of "*"
    pub restrict_origins: bool,
    pub round_timeout_ms: u64,
}

impl Default for FrameHandshakeConfig {
    fn default() -> Self {
        Self {
            parent_origin: env_string("PARENT_ORIGIN", "https://host.example"),
            child_origin: env_string("CHILD_ORIGIN", "https://widget.example"),
            rogue_origin: env_string("ROGUE_ORIGIN", "https://rogue.example"),
            ping_rounds: std::env::var("PING_ROUNDS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            restrict_origins: std::env::var("RESTRICT_ORIGINS")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(true),
            round_timeout_ms: std::env::var("ROUND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(500),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl FrameHandshakeConfig {
    /// Load configuration from a TOML file (path via FRAME_HANDSHAKE_CONFIG or ./frame_handshake.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("FRAME_HANDSHAKE_CONFIG")
            .unwrap_or_else(|_| "frame_handshake.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "frame_handshake", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match Self::from_file(p, default.clone()) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(target = "frame_handshake", error = %e, path = %path, "Failed to load TOML; using defaults");
                default
            }
        }
    }

    /// Read a TOML file and overlay it onto `base`.
    pub fn from_file(path: &Path, base: Self) -> crossframe_core::Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s, base).map_err(|e| MessengerError::Config(e.to_string()))
    }

    /// Overlay a TOML document onto `base`.
    pub fn from_toml_str(s: &str, base: Self) -> Result<Self, toml::de::Error> {
        toml::from_str::<FrameHandshakeToml>(s).map(|t| t.overlay(base))
    }

    /// Reject configurations the demo cannot run with.
    pub fn validate(&self) -> crossframe_core::Result<()> {
        for origin in [&self.parent_origin, &self.child_origin, &self.rogue_origin] {
            Origin::parse(origin)?;
        }
        if self.ping_rounds == 0 {
            return Err(MessengerError::Config("ping_rounds must be at least 1".into()));
        }
        if self.round_timeout_ms == 0 {
            return Err(MessengerError::Config(
                "round_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Target origin a messenger talking to `peer_origin` should be bound to.
    pub fn target_origin_for(&self, peer_origin: &str) -> crossframe_core::Result<TargetOrigin> {
        if self.restrict_origins {
            TargetOrigin::parse(peer_origin)
        } else {
            Ok(TargetOrigin::Any)
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct FrameHandshakeToml {
    pub parent_origin: Option<String>,
    pub child_origin: Option<String>,
    pub rogue_origin: Option<String>,
    pub ping_rounds: Option<u32>,
    pub restrict_origins: Option<bool>,
    pub round_timeout_ms: Option<u64>,
}

impl FrameHandshakeToml {
    fn overlay(self, mut base: FrameHandshakeConfig) -> FrameHandshakeConfig {
        if let Some(v) = self.parent_origin {
            base.parent_origin = v;
        }
        if let Some(v) = self.child_origin {
            base.child_origin = v;
        }
        if let Some(v) = self.rogue_origin {
            base.rogue_origin = v;
        }
        if let Some(v) = self.ping_rounds {
            base.ping_rounds = v;
        }
        if let Some(v) = self.restrict_origins {
            base.restrict_origins = v;
        }
        if let Some(v) = self.round_timeout_ms {
            base.round_timeout_ms = v;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> FrameHandshakeConfig {
        FrameHandshakeConfig {
            parent_origin: "https://host.example".into(),
            child_origin: "https://widget.example".into(),
            rogue_origin: "https://rogue.example".into(),
            ping_rounds: 3,
            restrict_origins: true,
            round_timeout_ms: 500,
        }
    }

    #[test]
    fn toml_overlays_only_present_keys() {
        let cfg = FrameHandshakeConfig::from_toml_str(
            "child_origin = \"http://localhost:3000\"\nping_rounds = 10\n",
            base(),
        )
        .unwrap();
        assert_eq!(cfg.child_origin, "http://localhost:3000");
        assert_eq!(cfg.ping_rounds, 10);
        assert_eq!(cfg.parent_origin, "https://host.example");
        assert!(cfg.restrict_origins);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = FrameHandshakeConfig::from_file(
            Path::new("/nonexistent/frame_handshake.toml"),
            base(),
        )
        .unwrap_err();
        assert!(matches!(err, MessengerError::Io(_)));
    }

    #[test]
    fn file_overlay_and_parse_errors() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("frame_handshake_good_{}.toml", std::process::id()));
        fs::write(&good, "restrict_origins = false\n").unwrap();
        let cfg = FrameHandshakeConfig::from_file(&good, base()).unwrap();
        assert!(!cfg.restrict_origins);
        assert_eq!(cfg.ping_rounds, 3);

        let bad = dir.join(format!("frame_handshake_bad_{}.toml", std::process::id()));
        fs::write(&bad, "ping_rounds = \"many\"\n").unwrap();
        assert!(matches!(
            FrameHandshakeConfig::from_file(&bad, base()),
            Err(MessengerError::Config(_))
        ));

        let _ = fs::remove_file(good);
        let _ = fs::remove_file(bad);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(FrameHandshakeConfig::from_toml_str("ping_rounds = \"many\"", base()).is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(base().validate().is_ok());

        let mut zero_rounds = base();
        zero_rounds.ping_rounds = 0;
        assert!(matches!(
            zero_rounds.validate(),
            Err(MessengerError::Config(_))
        ));

        let mut bad_origin = base();
        bad_origin.rogue_origin = "nowhere".into();
        assert!(matches!(
            bad_origin.validate(),
            Err(MessengerError::InvalidOrigin(_))
        ));
    }

    #[test]
    fn unrestricted_config_uses_wildcard() {
        let mut cfg = base();
        assert_eq!(
            cfg.target_origin_for("https://widget.example").unwrap().to_string(),
            "https://widget.example"
        );
        cfg.restrict_origins = false;
        assert!(cfg
            .target_origin_for("https://widget.example")
            .unwrap()
            .is_wildcard());
    }
}
