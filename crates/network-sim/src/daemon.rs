//! Routing daemon lifecycle inside a router namespace.
//!
//! FRR daemons run in a per-node *path space* (`-N <ns>`), which gives every
//! router its own `/etc/frr/<ns>/` config and `/var/run/frr/<ns>/` state, so
//! several routers can share one host. BIRD gets a private `/etc/bird` via
//! `/etc/netns/<ns>/bird`, which `ip netns exec` bind-mounts for every command
//! run in the namespace.
//!
//! Daemons are stopped on drop: SIGTERM, a bounded grace period, then SIGKILL.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::namespace::{Namespace, sudo, sudo_checked};
use crate::topology::DaemonKind;

const FRR_BIN_DIR: &str = "/usr/lib/frr";
const STOP_GRACE: Duration = Duration::from_secs(2);
const STOP_POLL: Duration = Duration::from_millis(100);

/// A routing suite started inside one router namespace.
pub struct RouterDaemon {
    node: String,
    /// FRR path space / BIRD runtime directory name. Equal to the namespace
    /// name so parallel runs never collide.
    space: String,
    kind: DaemonKind,
    running: bool,
}

impl RouterDaemon {
    /// Install the node's configuration and launch the daemon(s).
    ///
    /// `config_dir` is the node's directory (holding `frr.conf` or
    /// `bird.conf`); daemon logs are written there too. For BIRD every
    /// `*.conf` in `shared_dir` is installed next to `bird.conf`.
    pub fn start(
        ns: &Namespace,
        node: &str,
        kind: &DaemonKind,
        config_dir: &Path,
        shared_dir: Option<&Path>,
    ) -> Result<Self> {
        let config_dir = config_dir
            .canonicalize()
            .with_context(|| format!("config directory for {node}: {}", config_dir.display()))?;

        // Constructed before launching so a partial start is still torn down.
        let mut daemon = Self {
            node: node.to_string(),
            space: ns.name.clone(),
            kind: kind.clone(),
            running: true,
        };

        match kind {
            DaemonKind::Frr { daemons } => daemon.start_frr(ns, daemons, &config_dir)?,
            DaemonKind::Bird => daemon.start_bird(ns, &config_dir, shared_dir)?,
        }

        info!(node, suite = daemon.suite(), "routing daemon started");
        Ok(daemon)
    }

    fn start_frr(&mut self, ns: &Namespace, daemons: &[String], config_dir: &Path) -> Result<()> {
        let source = require_file(config_dir.join("frr.conf"))?;
        let etc = format!("/etc/frr/{}", self.space);
        let run = format!("/var/run/frr/{}", self.space);
        let conf = format!("{etc}/frr.conf");

        for dir in [&etc, &run] {
            sudo_checked(&["install", "-d", "-m", "755", "-o", "frr", "-g", "frr", dir])
                .with_context(|| format!("create {dir}"))?;
        }
        sudo_checked(&[
            "install",
            "-m",
            "640",
            "-o",
            "frr",
            "-g",
            "frr",
            &source.to_string_lossy(),
            &conf,
        ])
        .with_context(|| format!("install frr.conf for {}", self.node))?;

        let vtysh_conf = format!("hostname {}\n", self.node);
        sudo_checked(&[
            "sh",
            "-c",
            &format!(
                "printf %s {} > {etc}/vtysh.conf",
                shell_quote(&vtysh_conf)
            ),
        ])
        .context("write vtysh.conf")?;

        // zebra has to come up before the protocol daemons connect to it.
        for name in daemons {
            let binary = format!("{FRR_BIN_DIR}/{name}");
            let log = format!("file:{}", config_dir.join(format!("{name}.log")).display());
            ns.exec_checked(
                &binary,
                &[
                    "-N",
                    &self.space,
                    "-f",
                    &conf,
                    "--log",
                    &log,
                    "--log-level",
                    "debugging",
                    "-d",
                ],
            )
            .with_context(|| format!("launch {name} on {}", self.node))?;
            debug!(node = self.node, daemon = name, "launched");
        }
        Ok(())
    }

    fn start_bird(
        &mut self,
        ns: &Namespace,
        config_dir: &Path,
        shared_dir: Option<&Path>,
    ) -> Result<()> {
        let source = require_file(config_dir.join("bird.conf"))?;
        let etc = format!("/etc/netns/{}/bird", self.space);
        let run = format!("/var/run/bird/{}", self.space);

        for dir in [&etc, &run] {
            sudo_checked(&["install", "-d", "-m", "755", "-o", "bird", "-g", "bird", dir])
                .with_context(|| format!("create {dir}"))?;
        }

        let mut files = vec![source];
        if let Some(shared) = shared_dir {
            files.extend(shared_configs(shared)?);
        }
        for file in &files {
            sudo_checked(&[
                "install",
                "-m",
                "640",
                "-o",
                "bird",
                "-g",
                "bird",
                &file.to_string_lossy(),
                &format!("{etc}/"),
            ])
            .with_context(|| format!("install {} for {}", file.display(), self.node))?;
        }

        let log = config_dir.join("bird.log");
        ns.exec_checked(
            "bird",
            &[
                "-c",
                "/etc/bird/bird.conf",
                "-s",
                &self.bird_socket(),
                "-P",
                &self.bird_pidfile(),
                "-D",
                &log.to_string_lossy(),
                "-u",
                "bird",
                "-g",
                "bird",
            ],
        )
        .with_context(|| format!("launch bird on {}", self.node))?;
        Ok(())
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn suite(&self) -> &'static str {
        match self.kind {
            DaemonKind::Frr { .. } => "frr",
            DaemonKind::Bird => "bird",
        }
    }

    /// Shell command that runs `query` through the daemon's CLI.
    pub fn query_command(&self, query: &str) -> String {
        match self.kind {
            DaemonKind::Frr { .. } => {
                format!("vtysh -N {} -c {}", self.space, shell_quote(query))
            }
            DaemonKind::Bird => format!("birdc -s {} {}", self.bird_socket(), query),
        }
    }

    /// Stop all daemons. Idempotent; failures are logged, never returned.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        let pidfiles: Vec<String> = match &self.kind {
            DaemonKind::Frr { daemons } => daemons
                .iter()
                .rev()
                .map(|d| format!("/var/run/frr/{}/{d}.pid", self.space))
                .collect(),
            DaemonKind::Bird => {
                let _ = sudo(&["birdc", "-s", &self.bird_socket(), "down"]);
                vec![self.bird_pidfile()]
            }
        };

        for pidfile in &pidfiles {
            match read_pid(pidfile) {
                Some(pid) => terminate(pid),
                None => debug!(node = self.node, pidfile, "no pid file, nothing to stop"),
            }
        }

        let leftovers = match self.kind {
            DaemonKind::Frr { .. } => [
                format!("/etc/frr/{}", self.space),
                format!("/var/run/frr/{}", self.space),
            ],
            DaemonKind::Bird => [
                format!("/etc/netns/{}", self.space),
                format!("/var/run/bird/{}", self.space),
            ],
        };
        for dir in &leftovers {
            let _ = sudo(&["rm", "-rf", dir]);
        }
        debug!(node = self.node, "routing daemon stopped");
    }

    fn bird_socket(&self) -> String {
        format!("/var/run/bird/{}/bird.ctl", self.space)
    }

    fn bird_pidfile(&self) -> String {
        format!("/var/run/bird/{}/bird.pid", self.space)
    }
}

impl Drop for RouterDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn require_file(path: PathBuf) -> Result<PathBuf> {
    if !path.is_file() {
        bail!("missing daemon configuration {}", path.display());
    }
    Ok(path)
}

/// `*.conf` files in `dir`, sorted by name.
fn shared_configs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "conf"))
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

fn read_pid(pidfile: &str) -> Option<u32> {
    let out = sudo(&["cat", pidfile]).ok()?;
    if !out.status.success() {
        return None;
    }
    String::from_utf8_lossy(&out.stdout).trim().parse().ok()
}

fn is_alive(pid: u32) -> bool {
    sudo(&["kill", "-0", &pid.to_string()]).is_ok_and(|o| o.status.success())
}

/// Send SIGTERM, wait up to [`STOP_GRACE`], then SIGKILL.
fn terminate(pid: u32) {
    let pid_str = pid.to_string();
    let _ = sudo(&["kill", "-TERM", &pid_str]);

    let start = Instant::now();
    while start.elapsed() < STOP_GRACE {
        if !is_alive(pid) {
            return;
        }
        thread::sleep(STOP_POLL);
    }

    warn!(pid, "daemon ignored SIGTERM, killing");
    let _ = sudo(&["kill", "-KILL", &pid_str]);
}
