//! Device access checks performed before any hardware is bound.

use std::collections::HashMap;

/// A device or storage right a capture session depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Camera,
    Microphone,
    StorageRead,
    StorageWrite,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Camera => write!(f, "camera"),
            Capability::Microphone => write!(f, "microphone"),
            Capability::StorageRead => write!(f, "storage_read"),
            Capability::StorageWrite => write!(f, "storage_write"),
        }
    }
}

/// Capabilities needed to open a still-image session.
pub const STILL_CAPABILITIES: &[Capability] = &[
    Capability::Camera,
    Capability::StorageRead,
    Capability::StorageWrite,
];

/// Capabilities needed to open a video session.
pub const VIDEO_CAPABILITIES: &[Capability] = &[
    Capability::Camera,
    Capability::Microphone,
    Capability::StorageRead,
    Capability::StorageWrite,
];

/// Permission status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// Permission denied
    Denied,
    /// Permission not determined (user hasn't been asked yet)
    NotDetermined,
    /// Permission restricted (parental controls, etc)
    Restricted,
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not_determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Detailed permission information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PermissionInfo {
    pub status: PermissionStatus,
    pub message: String,
    pub can_request: bool,
}

/// Where grant decisions come from. Requesting access is the host's job;
/// a source only reports.
pub trait PermissionSource {
    fn status(&self, capability: Capability) -> PermissionInfo;
}

/// Pure predicate over a [`PermissionSource`].
pub struct DeviceAccessGuard<'a> {
    source: &'a dyn PermissionSource,
}

impl<'a> DeviceAccessGuard<'a> {
    pub fn new(source: &'a dyn PermissionSource) -> Self {
        Self { source }
    }

    /// True when every required capability is granted.
    pub fn check_access(&self, required: &[Capability]) -> bool {
        self.missing(required).is_empty()
    }

    /// Required capabilities that are not granted, in request order.
    pub fn missing(&self, required: &[Capability]) -> Vec<Capability> {
        required
            .iter()
            .copied()
            .filter(|cap| self.source.status(*cap).status != PermissionStatus::Granted)
            .collect()
    }
}

/// Fixed grants, for hosts that already negotiated permissions.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    grants: HashMap<Capability, PermissionStatus>,
}

impl StaticPermissions {
    pub fn all_granted() -> Self {
        let mut grants = HashMap::new();
        for cap in VIDEO_CAPABILITIES {
            grants.insert(*cap, PermissionStatus::Granted);
        }
        Self { grants }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability, status: PermissionStatus) -> Self {
        self.grants.insert(capability, status);
        self
    }
}

impl PermissionSource for StaticPermissions {
    fn status(&self, capability: Capability) -> PermissionInfo {
        let status = self
            .grants
            .get(&capability)
            .copied()
            .unwrap_or(PermissionStatus::NotDetermined);
        PermissionInfo {
            status,
            message: format!("{} access {}", capability, status),
            can_request: status == PermissionStatus::NotDetermined,
        }
    }
}

/// Queries the running system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPermissions;

impl PermissionSource for SystemPermissions {
    fn status(&self, capability: Capability) -> PermissionInfo {
        match capability {
            Capability::Camera => check_camera(),
            Capability::Microphone => check_microphone(),
            // Filesystem permissions are enforced when the artifact is written.
            Capability::StorageRead | Capability::StorageWrite => PermissionInfo {
                status: PermissionStatus::Granted,
                message: "Storage access checked at write time".to_string(),
                can_request: false,
            },
        }
    }
}

#[cfg(target_os = "linux")]
fn check_camera() -> PermissionInfo {
    let devices: Vec<String> = (0..10)
        .map(|i| format!("/dev/video{}", i))
        .filter(|path| std::path::Path::new(path).exists())
        .collect();
    check_linux_device("camera", devices.first().map(String::as_str), &["video", "plugdev"])
}

#[cfg(target_os = "linux")]
fn check_microphone() -> PermissionInfo {
    let device = std::path::Path::new("/dev/snd")
        .exists()
        .then_some("/dev/snd");
    check_linux_device("microphone", device, &["audio"])
}

#[cfg(target_os = "linux")]
fn check_linux_device(label: &str, device: Option<&str>, groups: &[&str]) -> PermissionInfo {
    let Some(device) = device else {
        return PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: format!("No {} device found", label),
            can_request: false,
        };
    };

    match std::fs::metadata(device) {
        Ok(_) if in_any_group(groups) => PermissionInfo {
            status: PermissionStatus::Granted,
            message: format!("{} access granted via {}", label, device),
            can_request: false,
        },
        Ok(_) => PermissionInfo {
            status: PermissionStatus::Denied,
            message: format!(
                "{} exists but user is not in any of [{}]",
                device,
                groups.join(", ")
            ),
            can_request: true,
        },
        Err(e) => PermissionInfo {
            status: PermissionStatus::Denied,
            message: format!("Cannot access {}: {}", device, e),
            can_request: true,
        },
    }
}

#[cfg(target_os = "linux")]
fn in_any_group(groups: &[&str]) -> bool {
    let output = std::process::Command::new("groups").output().ok();
    output
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|names| {
            names
                .split_whitespace()
                .any(|name| groups.contains(&name))
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn check_camera() -> PermissionInfo {
    unsupported_platform()
}

#[cfg(not(target_os = "linux"))]
fn check_microphone() -> PermissionInfo {
    unsupported_platform()
}

#[cfg(not(target_os = "linux"))]
fn unsupported_platform() -> PermissionInfo {
    PermissionInfo {
        status: PermissionStatus::NotDetermined,
        message: "Platform not supported".to_string(),
        can_request: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_accepts_full_grants() {
        let source = StaticPermissions::all_granted();
        let guard = DeviceAccessGuard::new(&source);
        assert!(guard.check_access(STILL_CAPABILITIES));
        assert!(guard.check_access(VIDEO_CAPABILITIES));
    }

    #[test]
    fn guard_reports_missing_in_order() {
        let source = StaticPermissions::all_granted()
            .with(Capability::Microphone, PermissionStatus::Denied)
            .with(Capability::StorageWrite, PermissionStatus::Restricted);
        let guard = DeviceAccessGuard::new(&source);

        assert!(!guard.check_access(VIDEO_CAPABILITIES));
        assert_eq!(
            guard.missing(VIDEO_CAPABILITIES),
            vec![Capability::Microphone, Capability::StorageWrite]
        );
    }

    #[test]
    fn still_sessions_do_not_need_microphone() {
        let source = StaticPermissions::all_granted()
            .with(Capability::Microphone, PermissionStatus::Denied);
        assert!(DeviceAccessGuard::new(&source).check_access(STILL_CAPABILITIES));
    }

    #[test]
    fn undetermined_is_not_granted() {
        let source = StaticPermissions::none();
        let info = source.status(Capability::Camera);
        assert_eq!(info.status, PermissionStatus::NotDetermined);
        assert!(info.can_request);
        assert!(!DeviceAccessGuard::new(&source).check_access(&[Capability::Camera]));
    }

    #[test]
    fn system_storage_is_reported_granted() {
        let info = SystemPermissions.status(Capability::StorageWrite);
        assert_eq!(info.status, PermissionStatus::Granted);
    }
}
