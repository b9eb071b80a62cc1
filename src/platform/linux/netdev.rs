//! Network interface statistics from /proc/net/dev.

use crate::platform::NetCounters;
use std::collections::HashMap;

/// Network interface statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetDevStats {
    pub receive_bytes: u64,
    pub receive_packets: u64,
    pub transmit_bytes: u64,
    pub transmit_packets: u64,
}

impl From<NetDevStats> for NetCounters {
    fn from(s: NetDevStats) -> Self {
        NetCounters {
            packets_in: s.receive_packets,
            packets_out: s.transmit_packets,
            bytes_in: s.receive_bytes,
            bytes_out: s.transmit_bytes,
        }
    }
}

/// Parses `/proc/net/dev` into per-interface statistics.
pub fn parse_netdev(content: &str) -> HashMap<String, NetDevStats> {
    let mut stats = HashMap::new();

    for (idx, line) in content.lines().enumerate() {
        // Skip the first two header lines
        if idx < 2 {
            continue;
        }

        let Some((interface, stats_str)) = line.split_once(':') else {
            continue;
        };

        let values: Vec<&str> = stats_str.split_whitespace().collect();
        if values.len() < 16 {
            continue; // Skip malformed lines
        }

        stats.insert(
            interface.trim().to_string(),
            NetDevStats {
                receive_bytes: values[0].parse().unwrap_or(0),
                receive_packets: values[1].parse().unwrap_or(0),
                transmit_bytes: values[8].parse().unwrap_or(0),
                transmit_packets: values[9].parse().unwrap_or(0),
            },
        );
    }

    stats
}

/// Sums counters over every interface except loopback.
pub fn sum_interfaces(stats: &HashMap<String, NetDevStats>) -> NetCounters {
    stats
        .iter()
        .filter(|(name, _)| name.as_str() != "lo")
        .fold(NetCounters::default(), |acc, (_, s)| acc + NetCounters::from(*s))
}
