use std::io::Read;
use std::os::unix::process::CommandExt as _;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

const SHELL_POLL: Duration = Duration::from_millis(20);

/// A Linux network namespace with RAII cleanup.
///
/// Creates the namespace on construction, brings up loopback, and deletes
/// it on drop. All commands inside the namespace run via `sudo ip netns exec`.
pub struct Namespace {
    pub name: String,
}

/// Captured result of a shell command run inside a namespace.
#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the command was killed.
    pub status: Option<i32>,
    pub timed_out: bool,
}

impl ShellOutput {
    /// Stdout followed by stderr, the way an interactive terminal shows them.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        let mut out = self.stdout.clone();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl Namespace {
    pub fn new(name: &str) -> Result<Self> {
        // Clean up stale namespace with same name (idempotent)
        let _ = sudo(&["ip", "netns", "del", name]);

        sudo_checked(&["ip", "netns", "add", name])
            .with_context(|| format!("create netns '{name}'"))?;

        debug!(ns = name, "created network namespace");

        let ns = Self {
            name: name.to_string(),
        };
        ns.exec_checked("ip", &["link", "set", "lo", "up"])
            .with_context(|| format!("bring up loopback in '{name}'"))?;
        Ok(ns)
    }

    /// Run a command inside this namespace, returning raw output.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let mut full_args = vec!["ip", "netns", "exec", &self.name, cmd];
        full_args.extend_from_slice(args);
        sudo(&full_args).with_context(|| format!("exec '{cmd}' in ns '{}'", self.name))
    }

    /// Run a command inside this namespace, failing if it exits non-zero.
    pub fn exec_checked(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let mut full_args = vec!["ip", "netns", "exec", &self.name, cmd];
        full_args.extend_from_slice(args);
        sudo_checked(&full_args).with_context(|| format!("exec '{cmd}' in ns '{}'", self.name))
    }

    /// Run `sh -c script` inside this namespace with a deadline.
    ///
    /// The command runs in its own process group. When `timeout` elapses the
    /// whole group is killed and the partial output is returned with
    /// `timed_out` set. A non-zero exit is not an error here.
    pub fn shell(&self, script: &str, timeout: Duration) -> Result<ShellOutput> {
        let mut child = Command::new("sudo")
            .args(["ip", "netns", "exec", &self.name, "sh", "-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .with_context(|| format!("spawn `{script}` in ns '{}'", self.name))?;

        // Drain both pipes concurrently so a chatty command cannot block on a
        // full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait().context("wait for shell command")? {
                break status.code();
            }
            if Instant::now() >= deadline {
                warn!(ns = self.name, script, ?timeout, "command timed out, killing");
                kill_group(child.id(), "-KILL");
                let _ = child.wait();
                timed_out = true;
                break None;
            }
            thread::sleep(SHELL_POLL);
        };

        Ok(ShellOutput {
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
            status,
            timed_out,
        })
    }

    /// Create a veth pair connecting this namespace to `peer`.
    ///
    /// Both ends are created directly inside their namespaces, so names only
    /// have to be unique per namespace. Addresses are optional (switch ports
    /// carry none). Interface names must be <= 15 chars (Linux limit).
    pub fn add_veth_link(
        &self,
        peer: &Namespace,
        local_iface: &str,
        peer_iface: &str,
        local_ip: Option<&str>,
        peer_ip: Option<&str>,
    ) -> Result<()> {
        sudo_checked(&[
            "ip",
            "link",
            "add",
            local_iface,
            "netns",
            &self.name,
            "type",
            "veth",
            "peer",
            "name",
            peer_iface,
            "netns",
            &peer.name,
        ])
        .with_context(|| format!("create veth pair {local_iface} <-> {peer_iface}"))?;

        debug!(local = local_iface, peer = peer_iface, "created veth pair");

        if let Some(ip) = local_ip {
            self.add_address(local_iface, ip)?;
        }
        self.set_link_state(local_iface, true)?;

        if let Some(ip) = peer_ip {
            peer.add_address(peer_iface, ip)?;
        }
        peer.set_link_state(peer_iface, true)?;

        debug!(
            ns_local = self.name,
            ns_peer = peer.name,
            local_ip,
            peer_ip,
            "veth link configured"
        );

        Ok(())
    }

    /// Assign `cidr` (e.g. `10.0.0.1/24`) to `iface`.
    pub fn add_address(&self, iface: &str, cidr: &str) -> Result<()> {
        self.exec_checked("ip", &["addr", "add", cidr, "dev", iface])
            .with_context(|| format!("set {cidr} on {iface}"))?;
        Ok(())
    }

    /// Administratively bring `iface` up or down.
    pub fn set_link_state(&self, iface: &str, up: bool) -> Result<()> {
        let state = if up { "up" } else { "down" };
        self.exec_checked("ip", &["link", "set", iface, state])
            .with_context(|| format!("set {iface} {state}"))?;
        Ok(())
    }

    /// Set a kernel parameter inside this namespace.
    pub fn sysctl(&self, key: &str, value: &str) -> Result<()> {
        let assignment = format!("{key}={value}");
        self.exec_checked("sysctl", &["-q", "-w", &assignment])
            .with_context(|| format!("sysctl {assignment}"))?;
        Ok(())
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        debug!(ns = self.name, "deleting network namespace");
        let _ = sudo(&["ip", "netns", "del", &self.name]);
    }
}

// -- helpers --

/// Run `sudo <args>`, returning raw output.
pub(crate) fn sudo(args: &[&str]) -> Result<Output> {
    Command::new("sudo")
        .args(args)
        .output()
        .with_context(|| format!("sudo {}", args.join(" ")))
}

/// Run `sudo <args>`, returning output on success or bailing with stderr.
pub(crate) fn sudo_checked(args: &[&str]) -> Result<Output> {
    let output = sudo(args)?;
    if !output.status.success() {
        bail!(
            "command failed: sudo {}\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

/// Signal a whole process group (negative PID) so the process wrapped by
/// `sudo ip netns exec` receives it too.
pub(crate) fn kill_group(pgid: u32, signal: &str) {
    let _ = Command::new("sudo")
        .args(["kill", signal, "--", &format!("-{pgid}")])
        .output();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{check_privileges, unique_ns_name};

    #[test]
    fn test_combined_output_joins_streams() {
        let out = ShellOutput {
            stdout: "PING 10.0.0.1".into(),
            stderr: "connect: Network is unreachable\n".into(),
            status: Some(2),
            timed_out: false,
        };
        assert_eq!(
            out.combined(),
            "PING 10.0.0.1\nconnect: Network is unreachable\n"
        );
        assert!(!out.success());
    }

    #[test]
    fn test_namespace_has_loopback() {
        if !check_privileges() {
            eprintln!("Skipping: insufficient privileges");
            return;
        }

        let ns = Namespace::new(&unique_ns_name("nst_a")).expect("create ns");
        let out = ns
            .shell("ip link show lo", Duration::from_secs(5))
            .expect("ip link");
        assert!(out.stdout.contains("lo"), "loopback missing: {}", out.stdout);
        assert!(out.stdout.contains("UP"), "loopback down: {}", out.stdout);
    }

    #[test]
    fn test_shell_timeout_kills_command() {
        if !check_privileges() {
            eprintln!("Skipping: insufficient privileges");
            return;
        }

        let ns = Namespace::new(&unique_ns_name("nst_t")).expect("create ns");
        let start = Instant::now();
        let out = ns
            .shell("echo started; sleep 30", Duration::from_millis(500))
            .expect("shell");
        assert!(out.timed_out);
        assert!(out.status.is_none());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_veth_ping_and_link_down() {
        if !check_privileges() {
            eprintln!("Skipping: insufficient privileges");
            return;
        }

        let ns1 = Namespace::new(&unique_ns_name("nst_a")).expect("create ns1");
        let ns2 = Namespace::new(&unique_ns_name("nst_b")).expect("create ns2");

        ns1.add_veth_link(
            &ns2,
            "a-eth0",
            "b-eth0",
            Some("10.200.1.1/24"),
            Some("10.200.1.2/24"),
        )
        .expect("add veth link");

        let out = ns1
            .shell("ping -c 1 -W 1 10.200.1.2", Duration::from_secs(5))
            .expect("ping");
        assert!(out.success(), "ping failed:\n{}", out.combined());

        ns1.set_link_state("a-eth0", false).expect("link down");
        let out = ns1
            .shell("ping -c 1 -W 1 10.200.1.2", Duration::from_secs(5))
            .expect("ping");
        assert!(!out.success(), "ping should fail with link down");
    }
}
