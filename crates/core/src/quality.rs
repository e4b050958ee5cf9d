//! Quality management
//!
//! Classifies the host into one of five quality profiles and hands out the
//! effective [`QualitySettings`]. Under memory pressure the settings are
//! degraded in tiers; relief restores the profile's baseline.
//!
//! The manager never changes state on its own. The memory coordinator (or
//! any other caller) drives every transition.

use crate::host::HostProbe;
use scrawl_render::{DistortionLevel, QualitySettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

/// Highest degradation tier
pub const MAX_TIER: u8 = 3;

/// Host classes, most conservative first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityProfile {
    LowEndMobile,
    Mobile,
    Tablet,
    DesktopLow,
    DesktopHigh,
}

impl QualityProfile {
    pub const ALL: [QualityProfile; 5] = [
        QualityProfile::LowEndMobile,
        QualityProfile::Mobile,
        QualityProfile::Tablet,
        QualityProfile::DesktopLow,
        QualityProfile::DesktopHigh,
    ];

    /// Baseline settings of the profile
    pub fn settings(self) -> QualitySettings {
        let (render_scale, texture_scale, antialiasing, blending, max_texture_size, concurrency) =
            match self {
                QualityProfile::LowEndMobile => (0.75, 0.5, false, false, 1024, 1),
                QualityProfile::Mobile => (1.0, 0.5, true, false, 2048, 2),
                QualityProfile::Tablet => (1.25, 0.75, true, true, 2048, 3),
                QualityProfile::DesktopLow => (1.5, 1.0, true, true, 4096, 4),
                QualityProfile::DesktopHigh => (2.0, 1.0, true, true, 8192, 8),
            };
        QualitySettings {
            render_scale,
            texture_scale,
            antialiasing,
            blending,
            max_texture_size,
            concurrency_limit: concurrency,
            compression_level: match self {
                QualityProfile::LowEndMobile => 9,
                QualityProfile::Mobile => 8,
                QualityProfile::Tablet => 7,
                _ => 6,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QualityProfile::LowEndMobile => "low-end-mobile",
            QualityProfile::Mobile => "mobile",
            QualityProfile::Tablet => "tablet",
            QualityProfile::DesktopLow => "desktop-low",
            QualityProfile::DesktopHigh => "desktop-high",
        }
    }
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Effective network class reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionClass {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl ConnectionClass {
    pub fn is_slow(self) -> bool {
        matches!(self, ConnectionClass::Slow2g | ConnectionClass::TwoG)
    }
}

impl FromStr for ConnectionClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(ConnectionClass::Slow2g),
            "2g" => Ok(ConnectionClass::TwoG),
            "3g" => Ok(ConnectionClass::ThreeG),
            "4g" => Ok(ConnectionClass::FourG),
            other => Err(format!("unknown connection class '{other}'")),
        }
    }
}

/// Host hints used to pick a profile. Unknown values are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSignals {
    pub memory_gb: Option<f64>,
    pub cores: Option<usize>,
    pub touch: bool,
    pub screen_width: Option<u32>,
    pub connection: Option<ConnectionClass>,
}

impl DeviceSignals {
    /// Memory and core count from the probe; no touch screen, unknown network
    pub fn from_probe(probe: &dyn HostProbe) -> Self {
        Self {
            memory_gb: probe
                .physical_memory_bytes()
                .map(|bytes| bytes as f64 / (1024.0 * 1024.0 * 1024.0)),
            cores: probe.logical_cores(),
            ..Default::default()
        }
    }
}

/// Partial settings patch; `None` fields keep their value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityOverride {
    pub render_scale: Option<f32>,
    pub texture_scale: Option<f32>,
    pub antialiasing: Option<bool>,
    pub blending: Option<bool>,
    pub max_texture_size: Option<u32>,
    pub concurrency_limit: Option<usize>,
    pub compression_level: Option<u8>,
}

impl QualityOverride {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Patch `settings`, clamping the result into the envelope
    pub fn apply(&self, settings: QualitySettings) -> QualitySettings {
        QualitySettings {
            render_scale: self.render_scale.unwrap_or(settings.render_scale),
            texture_scale: self.texture_scale.unwrap_or(settings.texture_scale),
            antialiasing: self.antialiasing.unwrap_or(settings.antialiasing),
            blending: self.blending.unwrap_or(settings.blending),
            max_texture_size: self.max_texture_size.unwrap_or(settings.max_texture_size),
            concurrency_limit: self.concurrency_limit.unwrap_or(settings.concurrency_limit),
            compression_level: self.compression_level.unwrap_or(settings.compression_level),
        }
        .clamped()
    }

    /// Later fields win
    pub fn merge(self, other: QualityOverride) -> QualityOverride {
        QualityOverride {
            render_scale: other.render_scale.or(self.render_scale),
            texture_scale: other.texture_scale.or(self.texture_scale),
            antialiasing: other.antialiasing.or(self.antialiasing),
            blending: other.blending.or(self.blending),
            max_texture_size: other.max_texture_size.or(self.max_texture_size),
            concurrency_limit: other.concurrency_limit.or(self.concurrency_limit),
            compression_level: other.compression_level.or(self.compression_level),
        }
    }
}

/// Quality state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "tier")]
pub enum QualityState {
    Optimal,
    Degraded(u8),
}

/// Degradation tier for a pressure value: 1 at 0.6, 2 at 0.75, 3 at 0.9
pub fn pressure_tier(pressure: f64) -> u8 {
    if !pressure.is_finite() {
        return 0;
    }
    if pressure >= 0.9 {
        3
    } else if pressure >= 0.75 {
        2
    } else if pressure >= 0.6 {
        1
    } else {
        0
    }
}

/// Settings after applying degradation `tier` to `base`
pub fn degrade(base: QualitySettings, tier: u8) -> QualitySettings {
    let mut settings = base;
    match tier.min(MAX_TIER) {
        0 => {}
        1 => {
            settings.render_scale *= 0.85;
            settings.texture_scale *= 0.75;
        }
        2 => {
            settings.render_scale *= 0.7;
            settings.texture_scale *= 0.5;
            settings.blending = false;
        }
        _ => {
            settings.render_scale = 0.5;
            settings.texture_scale = 0.25;
            settings.antialiasing = false;
            settings.blending = false;
            settings.max_texture_size = settings.max_texture_size.min(1024);
            settings.concurrency_limit = 1;
        }
    }
    settings.clamped()
}

/// First matching rule wins; unknown hosts get the most conservative profile
pub fn detect(signals: &DeviceSignals) -> QualityProfile {
    let memory = signals.memory_gb.filter(|m| m.is_finite() && *m > 0.0);
    let cores = signals.cores.filter(|&c| c > 0);

    if memory.is_some_and(|m| m <= 2.0)
        || cores.is_some_and(|c| c <= 2)
        || signals.connection.is_some_and(ConnectionClass::is_slow)
    {
        return QualityProfile::LowEndMobile;
    }
    if signals.touch && signals.screen_width.is_some_and(|w| w <= 768) {
        return QualityProfile::Mobile;
    }
    if signals.touch && signals.screen_width.is_some_and(|w| w <= 1366) {
        return QualityProfile::Tablet;
    }
    match (memory, cores) {
        (Some(m), Some(c)) if m >= 8.0 && c >= 8 => QualityProfile::DesktopHigh,
        (Some(_), Some(_)) => QualityProfile::DesktopLow,
        _ => QualityProfile::LowEndMobile,
    }
}

/// Patch for a distortion level, applied on top of the effective settings
fn level_patch(level: DistortionLevel) -> QualityOverride {
    match level {
        DistortionLevel::High => QualityOverride {
            antialiasing: Some(true),
            ..Default::default()
        },
        DistortionLevel::Balanced => QualityOverride::default(),
        DistortionLevel::Low => QualityOverride {
            blending: Some(false),
            ..Default::default()
        },
    }
}

struct QualityInner {
    signals: DeviceSignals,
    profile: QualityProfile,
    tier: u8,
    override_patch: QualityOverride,
}

impl QualityInner {
    /// Profile, then the override, then `extra`; degradation goes last so a
    /// patch can never lift a setting above what the tier allows
    fn effective_with(&self, extra: &QualityOverride) -> QualitySettings {
        let baseline = extra.apply(self.override_patch.apply(self.profile.settings()));
        degrade(baseline, self.tier)
    }

    fn effective(&self) -> QualitySettings {
        self.effective_with(&QualityOverride::default())
    }
}

/// Owner of the effective quality settings
pub struct QualityManager {
    inner: Mutex<QualityInner>,
}

impl QualityManager {
    pub fn new(signals: DeviceSignals) -> Self {
        let profile = detect(&signals);
        tracing::info!(%profile, "quality profile detected");
        Self {
            inner: Mutex::new(QualityInner {
                signals,
                profile,
                tier: 0,
                override_patch: QualityOverride::default(),
            }),
        }
    }

    /// Start from a fixed profile, ignoring detection
    pub fn with_profile(profile: QualityProfile) -> Self {
        let manager = Self::new(DeviceSignals::default());
        manager.lock().profile = profile;
        manager
    }

    fn lock(&self) -> MutexGuard<'_, QualityInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn profile(&self) -> QualityProfile {
        self.lock().profile
    }

    pub fn tier(&self) -> u8 {
        self.lock().tier
    }

    pub fn state(&self) -> QualityState {
        match self.lock().tier {
            0 => QualityState::Optimal,
            tier => QualityState::Degraded(tier),
        }
    }

    /// Snapshot of the effective settings
    pub fn settings(&self) -> QualitySettings {
        self.lock().effective()
    }

    /// Effective settings with the distortion level's patch; does not change state
    pub fn settings_for_level(&self, level: DistortionLevel) -> QualitySettings {
        self.lock().effective_with(&level_patch(level))
    }

    /// Patch the effective settings until `clear_override`
    pub fn override_settings(&self, patch: QualityOverride) -> QualitySettings {
        let mut inner = self.lock();
        inner.override_patch = inner.override_patch.merge(patch);
        inner.effective()
    }

    pub fn clear_override(&self) {
        self.lock().override_patch = QualityOverride::default();
    }

    /// Replace the host signals and re-detect
    pub fn update_signals(&self, signals: DeviceSignals) -> QualityProfile {
        self.lock().signals = signals;
        self.reset_to_optimal()
    }

    /// Re-detect the profile and drop any degradation
    pub fn reset_to_optimal(&self) -> QualityProfile {
        let mut inner = self.lock();
        let profile = detect(&inner.signals);
        if profile != inner.profile || inner.tier != 0 {
            tracing::info!(from = %inner.profile, to = %profile, "quality reset to optimal");
        }
        inner.profile = profile;
        inner.tier = 0;
        profile
    }

    /// Move to the pressure's tier if that is worse than the current one
    ///
    /// Returns the tier in effect afterwards.
    pub fn degrade_for_pressure(&self, pressure: f64) -> u8 {
        let mut inner = self.lock();
        let target = pressure_tier(pressure).max(inner.tier);
        if target != inner.tier {
            tracing::info!(from = inner.tier, to = target, pressure, "quality degraded");
            inner.tier = target;
        }
        inner.tier
    }

    /// Return to the profile's baseline settings
    pub fn restore_after_relief(&self) {
        let mut inner = self.lock();
        if inner.tier != 0 {
            tracing::info!(from = inner.tier, "quality restored");
            inner.tier = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop() -> DeviceSignals {
        DeviceSignals {
            memory_gb: Some(16.0),
            cores: Some(12),
            ..Default::default()
        }
    }

    #[test]
    fn test_detect_rules_in_order() {
        let cases = [
            (DeviceSignals::default(), QualityProfile::LowEndMobile),
            (
                DeviceSignals {
                    memory_gb: Some(2.0),
                    ..desktop()
                },
                QualityProfile::LowEndMobile,
            ),
            (
                DeviceSignals {
                    cores: Some(2),
                    ..desktop()
                },
                QualityProfile::LowEndMobile,
            ),
            (
                DeviceSignals {
                    connection: Some(ConnectionClass::TwoG),
                    ..desktop()
                },
                QualityProfile::LowEndMobile,
            ),
            (
                DeviceSignals {
                    touch: true,
                    screen_width: Some(390),
                    ..desktop()
                },
                QualityProfile::Mobile,
            ),
            (
                DeviceSignals {
                    touch: true,
                    screen_width: Some(1024),
                    ..desktop()
                },
                QualityProfile::Tablet,
            ),
            (desktop(), QualityProfile::DesktopHigh),
            (
                DeviceSignals {
                    memory_gb: Some(4.0),
                    cores: Some(4),
                    ..Default::default()
                },
                QualityProfile::DesktopLow,
            ),
            (
                DeviceSignals {
                    memory_gb: Some(16.0),
                    ..Default::default()
                },
                QualityProfile::LowEndMobile,
            ),
        ];
        for (signals, expected) in cases {
            assert_eq!(detect(&signals), expected, "{signals:?}");
        }
    }

    #[test]
    fn test_profiles_are_ordered_and_within_envelope() {
        for pair in QualityProfile::ALL.windows(2) {
            let (lower, higher) = (pair[0].settings(), pair[1].settings());
            assert!(lower.render_scale <= higher.render_scale);
            assert!(lower.concurrency_limit <= higher.concurrency_limit);
        }
        for profile in QualityProfile::ALL {
            assert!(profile.settings().is_within_envelope(), "{profile}");
        }
    }

    #[test]
    fn test_connection_class_parse() {
        assert_eq!("slow-2g".parse::<ConnectionClass>(), Ok(ConnectionClass::Slow2g));
        assert_eq!("4G".parse::<ConnectionClass>(), Ok(ConnectionClass::FourG));
        assert!("5g".parse::<ConnectionClass>().is_err());
    }

    #[test]
    fn test_pressure_tiers() {
        assert_eq!(pressure_tier(0.0), 0);
        assert_eq!(pressure_tier(0.59), 0);
        assert_eq!(pressure_tier(0.6), 1);
        assert_eq!(pressure_tier(0.75), 2);
        assert_eq!(pressure_tier(0.95), 3);
        assert_eq!(pressure_tier(f64::NAN), 0);
    }

    #[test]
    fn test_degrade_then_restore_round_trip() {
        let manager = QualityManager::new(desktop());
        let before = manager.settings();

        assert_eq!(manager.degrade_for_pressure(0.95), 3);
        assert_eq!(manager.state(), QualityState::Degraded(3));
        let degraded = manager.settings();
        assert_eq!(degraded.render_scale, 0.5);
        assert!(!degraded.antialiasing);
        assert!(degraded.is_within_envelope());

        manager.restore_after_relief();
        assert_eq!(manager.state(), QualityState::Optimal);
        assert_eq!(manager.settings(), before);
    }

    #[test]
    fn test_degradation_is_monotonic() {
        let manager = QualityManager::new(desktop());
        assert_eq!(manager.degrade_for_pressure(0.8), 2);
        assert_eq!(manager.degrade_for_pressure(0.65), 2);
        assert_eq!(manager.degrade_for_pressure(0.1), 2);

        let mut previous = QualityProfile::DesktopHigh.settings();
        for tier in 1..=MAX_TIER {
            let next = degrade(QualityProfile::DesktopHigh.settings(), tier);
            assert!(next.render_scale <= previous.render_scale);
            assert!(next.texture_scale <= previous.texture_scale);
            previous = next;
        }
    }

    #[test]
    fn test_override_and_clear() {
        let manager = QualityManager::with_profile(QualityProfile::DesktopLow);
        let base = manager.settings();

        let patched = manager.override_settings(QualityOverride {
            blending: Some(false),
            render_scale: Some(9.0),
            ..Default::default()
        });
        assert!(!patched.blending);
        assert_eq!(patched.render_scale, 2.0);
        assert_eq!(manager.settings(), patched);

        manager.clear_override();
        assert_eq!(manager.settings(), base);
    }

    #[test]
    fn test_settings_for_level_does_not_mutate() {
        let manager = QualityManager::with_profile(QualityProfile::DesktopLow);
        let before = manager.settings();

        let low = manager.settings_for_level(DistortionLevel::Low);
        assert!(!low.blending);
        assert_eq!(
            manager.settings_for_level(DistortionLevel::Balanced),
            before
        );
        assert_eq!(manager.settings(), before);

        manager.degrade_for_pressure(0.95);
        let high = manager.settings_for_level(DistortionLevel::High);
        assert!(!high.antialiasing);
        assert_eq!(high.render_scale, 0.5);
    }

    #[test]
    fn test_override_cannot_lift_degraded_settings() {
        let manager = QualityManager::with_profile(QualityProfile::DesktopHigh);
        let patched = manager.override_settings(QualityOverride {
            render_scale: Some(2.0),
            antialiasing: Some(true),
            ..Default::default()
        });
        assert_eq!(patched.render_scale, 2.0);

        manager.degrade_for_pressure(0.95);
        let settings = manager.settings();
        assert_eq!(settings.render_scale, 0.5);
        assert!(!settings.antialiasing);
        assert_eq!(settings.concurrency_limit, 1);

        manager.restore_after_relief();
        assert_eq!(manager.settings().render_scale, 2.0);
    }

    #[test]
    fn test_degradation_is_monotonic_under_patches() {
        let manager = QualityManager::with_profile(QualityProfile::DesktopHigh);
        manager.override_settings(QualityOverride {
            render_scale: Some(2.0),
            ..Default::default()
        });
        let mut previous = manager.settings_for_level(DistortionLevel::High);

        for pressure in [0.55, 0.7, 0.95] {
            manager.degrade_for_pressure(pressure);
            let current = manager.settings_for_level(DistortionLevel::High);
            assert!(current.render_scale <= previous.render_scale);
            assert!(current.texture_scale <= previous.texture_scale);
            assert!(!current.blending || previous.blending);
            previous = current;
        }
    }

    #[test]
    fn test_reset_to_optimal_redetects() {
        let manager = QualityManager::new(desktop());
        manager.degrade_for_pressure(0.7);
        assert_eq!(manager.reset_to_optimal(), QualityProfile::DesktopHigh);
        assert_eq!(manager.tier(), 0);

        let profile = manager.update_signals(DeviceSignals {
            touch: true,
            screen_width: Some(700),
            ..desktop()
        });
        assert_eq!(profile, QualityProfile::Mobile);
        assert_eq!(manager.profile(), QualityProfile::Mobile);
    }

    #[test]
    fn test_signals_from_probe() {
        let probe = crate::host::StaticProbe::new(Some(8 * 1024 * 1024 * 1024), Some(8));
        let signals = DeviceSignals::from_probe(&probe);
        assert_eq!(signals.memory_gb, Some(8.0));
        assert_eq!(detect(&signals), QualityProfile::DesktopHigh);
    }
}
