//! Pure user-agent classification.
//!
//! Autoplay restrictions differ by platform class, and the remediation
//! text shown on microphone-permission failures differs by browser. Both
//! decisions are driven by the marker tables below rather than scattered
//! conditionals, so the rules stay reviewable in one place.

/// Autoplay-policy class of the calling browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// iOS-family browser on the system WebKit build. Unlock must succeed
    /// before session start may proceed. WebKit-shell browsers such as
    /// `CriOS`/`FxiOS` belong here too.
    IosRestrictive,
    /// iOS device running a genuinely foreign rendering engine; does not
    /// exhibit the same restriction, so unlock failure is non-fatal.
    IosOther,
    /// Everything else. Unlock failure is logged only.
    Desktop,
}

const IOS_DEVICE_MARKERS: &[&str] = &["iPhone", "iPad", "iPod"];

const WEBKIT_ENGINE_MARKER: &str = "AppleWebKit";

/// Engine markers that indicate a non-WebKit engine repackaged for iOS.
/// Note "Gecko/" with the trailing slash: the decorative "like Gecko"
/// token present in WebKit strings must not match.
const FOREIGN_ENGINE_MARKERS: &[&str] = &["Gecko/", "Blink/"];

impl Platform {
    pub fn classify(user_agent: &str) -> Self {
        let on_ios_device = IOS_DEVICE_MARKERS.iter().any(|m| user_agent.contains(m));
        if !on_ios_device {
            return Platform::Desktop;
        }
        let foreign_engine = FOREIGN_ENGINE_MARKERS.iter().any(|m| user_agent.contains(m));
        if foreign_engine && !user_agent.contains(WEBKIT_ENGINE_MARKER) {
            Platform::IosOther
        } else {
            Platform::IosRestrictive
        }
    }

    /// Whether a failed unlock must abort session start.
    pub fn unlock_required(self) -> bool {
        matches!(self, Platform::IosRestrictive)
    }
}

/// Shown when the unlock step fails fatally.
pub const IOS_UNLOCK_HINT: &str =
    "Audio could not be enabled. Tap the screen once, allow sound for this site, and try again.";

/// Browser-specific microphone remediation text. First matching marker
/// wins, so the more specific shells come before the engines they embed.
const MIC_HINTS: &[(&str, &str)] = &[
    (
        "CriOS",
        "Open iOS Settings > Chrome > Microphone, allow access, then tap to retry.",
    ),
    (
        "FxiOS",
        "Open iOS Settings > Firefox > Microphone, allow access, then tap to retry.",
    ),
    (
        "iPhone",
        "Open iOS Settings > Safari > Microphone, allow access, then tap to retry.",
    ),
    (
        "iPad",
        "Open iOS Settings > Safari > Microphone, allow access, then tap to retry.",
    ),
    (
        "Edg",
        "Click the lock icon in the address bar, set Microphone to Allow, and reload.",
    ),
    (
        "Firefox",
        "Click the microphone icon in the address bar and choose Allow.",
    ),
    (
        "Chrome",
        "Click the camera icon at the right of the address bar and allow microphone access.",
    ),
    (
        "Safari",
        "Choose Safari > Settings for This Website and set Microphone to Allow.",
    ),
];

const MIC_HINT_FALLBACK: &str =
    "Allow microphone access for this site in your browser settings and try again.";

pub fn mic_permission_hint(user_agent: &str) -> &'static str {
    MIC_HINTS
        .iter()
        .find(|(marker, _)| user_agent.contains(marker))
        .map(|(_, hint)| *hint)
        .unwrap_or(MIC_HINT_FALLBACK)
}
