use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

static NS_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns `true` if the environment supports namespace-based tests
/// (requires `ip` tool and passwordless `sudo`).
pub fn check_privileges() -> bool {
    let has_ip = Command::new("ip")
        .arg("netns")
        .output()
        .is_ok_and(|o| o.status.success());

    has_ip
        && Command::new("sudo")
            .args(["-n", "ip", "netns", "list"])
            .output()
            .is_ok_and(|o| o.status.success())
}

/// Check if a binary exists in PATH.
pub fn check_binary(name: &str) -> Option<PathBuf> {
    Command::new("sh")
        .args(["-c", &format!("command -v {name}")])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Reason why namespace tests must be skipped.
#[derive(Debug)]
pub enum SkipReason {
    NotRoot,
    MissingTool(String),
    MissingDaemon(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotRoot => write!(f, "requires root / passwordless sudo"),
            SkipReason::MissingTool(t) => write!(f, "system tool '{t}' not found"),
            SkipReason::MissingDaemon(d) => write!(f, "routing daemon '{d}' not installed"),
        }
    }
}

/// Check what plain namespace tests need: privileges and `ip`/`ping`.
pub fn check_namespace_deps() -> Result<(), SkipReason> {
    if !check_privileges() {
        return Err(SkipReason::NotRoot);
    }
    for tool in ["ip", "ping", "sysctl"] {
        if check_binary(tool).is_none() {
            return Err(SkipReason::MissingTool(tool.to_string()));
        }
    }
    Ok(())
}

/// Like [`check_namespace_deps`], and FRR must be installed.
pub fn check_frr_deps() -> Result<(), SkipReason> {
    check_namespace_deps()?;
    for daemon in ["/usr/lib/frr/zebra", "/usr/lib/frr/bgpd", "/usr/lib/frr/ripd"] {
        if !std::path::Path::new(daemon).exists() {
            return Err(SkipReason::MissingDaemon(daemon.to_string()));
        }
    }
    if check_binary("vtysh").is_none() {
        return Err(SkipReason::MissingTool("vtysh".into()));
    }
    Ok(())
}

/// Generate a unique namespace/interface name safe for parallel tests.
///
/// Combines prefix + PID + atomic counter, truncated to 15 chars
/// (Linux netdev name limit).
pub fn unique_ns_name(prefix: &str) -> String {
    let seq = NS_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id() % 0xffff;
    let name = format!("{prefix}_{pid:x}_{seq}");
    if name.len() > 15 { name[..15].to_string() } else { name }
}
