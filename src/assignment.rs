//! On-disk layout of a submitted assignment.
//!
//! ```text
//! <root>/<id>/
//!   topology.json | topology.in
//!   lib/*.conf            shared BIRD includes (optional)
//!   <router>/frr.conf | <router>/bird.conf
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use network_sim::Topology;

pub const TOPOLOGY_JSON: &str = "topology.json";
pub const TOPOLOGY_LINK_LIST: &str = "topology.in";
pub const SHARED_CONFIG_DIR: &str = "lib";

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: String,
    pub root: PathBuf,
}

impl Assignment {
    /// `id` names a directory under `root`; it may not contain a path separator.
    pub fn new(id: &str, root: &Path) -> Result<Self> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            bail!("invalid assignment id '{id}'");
        }
        let assignment = Self {
            id: id.to_string(),
            root: root.to_path_buf(),
        };
        if !assignment.dir().is_dir() {
            bail!("assignment directory {} does not exist", assignment.dir().display());
        }
        Ok(assignment)
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.id)
    }

    /// Directory of BIRD include files shared by all routers, if present.
    pub fn shared_config_dir(&self) -> Option<PathBuf> {
        let dir = self.dir().join(SHARED_CONFIG_DIR);
        dir.is_dir().then_some(dir)
    }

    /// Topology from `topology.json`, or from the `topology.in` link list.
    pub fn load_topology(&self) -> Result<Topology> {
        let json = self.dir().join(TOPOLOGY_JSON);
        if json.is_file() {
            return Topology::load(&json).with_context(|| format!("topology of {}", self.id));
        }
        let list = self.dir().join(TOPOLOGY_LINK_LIST);
        if list.is_file() {
            let text = std::fs::read_to_string(&list)
                .with_context(|| format!("read {}", list.display()))?;
            return Topology::from_link_list(&text)
                .with_context(|| format!("topology of {}", self.id));
        }
        bail!(
            "{} has neither {TOPOLOGY_JSON} nor {TOPOLOGY_LINK_LIST}",
            self.dir().display()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_rejects_path_like_ids() {
        let root = tempfile::tempdir().unwrap();
        assert!(Assignment::new("../etc", root.path()).is_err());
        assert!(Assignment::new("", root.path()).is_err());
        assert!(Assignment::new("missing", root.path()).is_err());
    }

    #[test]
    fn test_prefers_json_and_finds_shared_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("A1");
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(dir.join(TOPOLOGY_LINK_LIST), "garbage").unwrap();
        fs::write(
            dir.join(TOPOLOGY_JSON),
            r#"{"nodes": [{"name": "h1"}, {"name": "h2"}],
                "links": [{"a": {"node": "h1"}, "b": {"node": "h2"}}]}"#,
        )
        .unwrap();

        let a = Assignment::new("A1", root.path()).unwrap();
        assert_eq!(a.shared_config_dir(), Some(dir.join("lib")));
        let topo = a.load_topology().unwrap();
        assert_eq!(topo.nodes().count(), 2);
    }

    #[test]
    fn test_link_list_fallback() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("A2");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(TOPOLOGY_LINK_LIST), "2 1 2\nh1,s1\nh2,s1\n").unwrap();

        let a = Assignment::new("A2", root.path()).unwrap();
        assert_eq!(a.shared_config_dir(), None);
        let topo = a.load_topology().unwrap();
        assert_eq!(topo.primary_address("h2"), Some("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_missing_topology_file() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("A3")).unwrap();
        let err = Assignment::new("A3", root.path()).unwrap().load_topology().unwrap_err();
        assert!(err.to_string().contains("neither"));
    }
}
