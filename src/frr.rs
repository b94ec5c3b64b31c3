//! Models for the JSON that FRR and iproute2 print.
//!
//! Only the fields the checks read are modelled; everything else is ignored.
//! Every field is optional on the wire, so missing keys never fail a parse
//! that would otherwise succeed.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Deserialize;

/// `show bgp ipv4 unicast <prefix> json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BgpPrefixDump {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub paths: Vec<BgpPath>,
}

/// `show bgp ipv4 unicast json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BgpTable {
    #[serde(default, rename = "routerId")]
    pub router_id: Option<String>,
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<BgpPath>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BgpPath {
    #[serde(default)]
    pub nexthops: Vec<NextHop>,
    #[serde(default)]
    pub community: Option<Community>,
    #[serde(default, rename = "locPrf")]
    pub local_pref: Option<u32>,
    /// MED; FRR leaves the key out when the attribute is not set.
    #[serde(default)]
    pub metric: Option<u32>,
    #[serde(default)]
    pub bestpath: Option<BestPath>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NextHop {
    #[serde(default)]
    pub ip: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Community {
    #[serde(default)]
    pub string: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct BestPath {
    #[serde(default)]
    pub overall: bool,
}

impl BgpPath {
    pub fn has_next_hop(&self, hop: Ipv4Addr) -> bool {
        self.nexthops
            .iter()
            .any(|nh| nh.ip.parse::<Ipv4Addr>().is_ok_and(|ip| ip == hop))
    }

    /// Community list as printed by FRR, e.g. `"400:100 400:300"`.
    pub fn community_string(&self) -> &str {
        self.community.as_ref().map_or("", |c| c.string.as_str())
    }

    pub fn is_best(&self) -> bool {
        self.bestpath.is_some_and(|b| b.overall)
    }
}

impl BgpTable {
    /// All paths, paired with their prefix, whose next hop is `hop`.
    pub fn paths_via(&self, hop: Ipv4Addr) -> impl Iterator<Item = (&str, &BgpPath)> {
        self.routes.iter().flat_map(move |(prefix, paths)| {
            paths
                .iter()
                .filter(move |p| p.has_next_hop(hop))
                .map(move |p| (prefix.as_str(), p))
        })
    }
}

/// One element of `ip -j addr show`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpAddrEntry {
    #[serde(default)]
    pub ifname: String,
    #[serde(default)]
    pub link_type: String,
    #[serde(default)]
    pub addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddrInfo {
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub local: String,
    #[serde(default)]
    pub prefixlen: u8,
}

impl IpAddrEntry {
    pub fn is_ethernet(&self) -> bool {
        self.link_type == "ether"
    }

    /// IPv4 addresses in the order the kernel lists them.
    pub fn ipv4_addrs(&self) -> Vec<Ipv4Net> {
        self.addr_info
            .iter()
            .filter(|a| a.family == "inet")
            .filter_map(|a| {
                let ip = a.local.parse::<Ipv4Addr>().ok()?;
                Ipv4Net::new(ip, a.prefixlen).ok()
            })
            .collect()
    }
}

pub fn parse_prefix_dump(json: &str) -> Result<BgpPrefixDump, serde_json::Error> {
    serde_json::from_str(json)
}

pub fn parse_bgp_table(json: &str) -> Result<BgpTable, serde_json::Error> {
    serde_json::from_str(json)
}

/// Parse `ip -j addr show`, skipping the empty objects iproute2 emits for
/// interfaces filtered out by family.
pub fn parse_ip_addr(json: &str) -> Result<Vec<IpAddrEntry>, serde_json::Error> {
    let entries: Vec<IpAddrEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().filter(|e| !e.ifname.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX_DUMP: &str = r#"{
      "prefix": "10.4.1.0/25",
      "paths": [
        {
          "aspath": {"string": "400", "segments": [], "length": 1},
          "origin": "IGP",
          "metric": 0,
          "locPrf": 300,
          "valid": true,
          "community": {"string": "400:300", "list": ["400:300"]},
          "bestpath": {"overall": true},
          "nexthops": [{"ip": "172.17.3.1", "afi": "ipv4", "used": true}]
        },
        {
          "origin": "IGP",
          "locPrf": 100,
          "nexthops": [{"ip": "100.100.1.3", "afi": "ipv4"}]
        }
      ]
    }"#;

    #[test]
    fn test_prefix_dump_fields() {
        let dump = parse_prefix_dump(PREFIX_DUMP).unwrap();
        assert_eq!(dump.prefix.as_deref(), Some("10.4.1.0/25"));
        assert_eq!(dump.paths.len(), 2);

        let best = &dump.paths[0];
        assert!(best.is_best());
        assert!(best.has_next_hop("172.17.3.1".parse().unwrap()));
        assert_eq!(best.community_string(), "400:300");
        assert_eq!(best.local_pref, Some(300));

        let other = &dump.paths[1];
        assert!(!other.is_best());
        assert_eq!(other.community_string(), "");
        assert_eq!(other.metric, None);
    }

    #[test]
    fn test_table_paths_via() {
        let json = r#"{
          "routerId": "100.100.4.1",
          "routes": {
            "10.2.1.0/24": [{"metric": 0, "nexthops": [{"ip": "172.17.3.0"}]}],
            "10.3.1.0/24": [
              {"metric": 20, "nexthops": [{"ip": "172.17.3.0"}]},
              {"nexthops": [{"ip": "172.17.4.0"}]}
            ]
          }
        }"#;
        let table = parse_bgp_table(json).unwrap();
        let via: Vec<_> = table
            .paths_via("172.17.3.0".parse().unwrap())
            .map(|(prefix, p)| (prefix, p.metric))
            .collect();
        assert_eq!(via, vec![("10.2.1.0/24", Some(0)), ("10.3.1.0/24", Some(20))]);
        assert_eq!(table.paths_via("172.17.4.0".parse().unwrap()).count(), 1);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(parse_prefix_dump("% Network not in table").is_err());
        assert!(parse_bgp_table("{\"routes\": [").is_err());
    }

    #[test]
    fn test_ip_addr_filters_and_families() {
        let json = r#"[
          {"ifindex": 1, "ifname": "lo", "link_type": "loopback",
           "addr_info": [{"family": "inet", "local": "127.0.0.1", "prefixlen": 8}]},
          {},
          {"ifindex": 2, "ifname": "h211-eth0", "link_type": "ether",
           "addr_info": [
             {"family": "inet", "local": "10.2.1.1", "prefixlen": 24},
             {"family": "inet6", "local": "fe80::1", "prefixlen": 64}
           ]}
        ]"#;
        let entries = parse_ip_addr(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_ethernet());
        assert!(entries[1].is_ethernet());
        assert_eq!(entries[1].ipv4_addrs(), vec!["10.2.1.1/24".parse::<Ipv4Net>().unwrap()]);
    }
}
