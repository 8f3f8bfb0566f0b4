use crate::types::Measurement;
use std::io::{self, Write};

/// Fastest first. The sort is stable, so equal latencies keep collection order.
pub fn rank(results: &[Measurement]) -> Vec<&Measurement> {
    let mut ranked: Vec<&Measurement> = results.iter().collect();
    ranked.sort_by_key(|m| m.latency);
    ranked
}

pub fn format_line(index: usize, measurement: &Measurement) -> String {
    format!(
        "[{}] time:{}ms, ip:{}, pubkey:{}",
        index,
        measurement.latency.as_millis(),
        measurement.ip,
        measurement.node.pubkey
    )
}

/// The `top` fastest entries, one formatted line each.
pub fn render(results: &[Measurement], top: usize) -> Vec<String> {
    rank(results)
        .into_iter()
        .take(top)
        .enumerate()
        .map(|(i, m)| format_line(i, m))
        .collect()
}

pub fn print_result<W: Write>(out: &mut W, results: &[Measurement], top: usize) -> io::Result<()> {
    for line in render(results, top) {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::ClusterNode;
    use std::time::Duration;

    fn measurement(ip: &str, pubkey: &str, micros: u64) -> Measurement {
        Measurement {
            latency: Duration::from_micros(micros),
            ip: ip.to_string(),
            node: ClusterNode {
                pubkey: pubkey.to_string(),
                gossip: Some(format!("{}:8001", ip)),
                ..Default::default()
            },
        }
    }

    #[test]
    fn ranks_fastest_first_in_expected_format() {
        let results = vec![
            measurement("10.0.0.1", "A", 50_000),
            measurement("10.0.0.2", "C", 20_000),
        ];
        assert_eq!(
            render(&results, 10),
            [
                "[0] time:20ms, ip:10.0.0.2, pubkey:C",
                "[1] time:50ms, ip:10.0.0.1, pubkey:A",
            ]
        );
    }

    #[test]
    fn milliseconds_are_truncated() {
        let results = vec![measurement("10.0.0.1", "A", 20_999)];
        assert_eq!(render(&results, 1), ["[0] time:20ms, ip:10.0.0.1, pubkey:A"]);
    }

    #[test]
    fn output_length_is_min_of_top_and_results() {
        let results = vec![
            measurement("10.0.0.1", "A", 30_000),
            measurement("10.0.0.2", "B", 10_000),
            measurement("10.0.0.3", "C", 20_000),
        ];
        assert_eq!(render(&results, 1), ["[0] time:10ms, ip:10.0.0.2, pubkey:B"]);
        assert_eq!(render(&results, 3).len(), 3);
        assert_eq!(render(&results, 10).len(), 3);
        assert!(render(&results, 0).is_empty());
        assert!(render(&[], 10).is_empty());
    }

    #[test]
    fn ties_keep_collection_order_and_latency_never_decreases() {
        let results = vec![
            measurement("10.0.0.1", "first", 15_000),
            measurement("10.0.0.2", "fast", 5_000),
            measurement("10.0.0.3", "second", 15_000),
            measurement("10.0.0.4", "third", 15_000),
        ];
        let ranked = rank(&results);
        assert!(ranked.windows(2).all(|w| w[0].latency <= w[1].latency));
        let keys: Vec<&str> = ranked.iter().map(|m| m.node.pubkey.as_str()).collect();
        assert_eq!(keys, ["fast", "first", "second", "third"]);
    }

    #[test]
    fn rendering_twice_gives_identical_output() {
        let results = vec![
            measurement("10.0.0.1", "A", 7_000),
            measurement("10.0.0.2", "B", 7_000),
            measurement("10.0.0.3", "C", 3_000),
        ];
        let mut first = Vec::new();
        let mut second = Vec::new();
        print_result(&mut first, &results, 2).unwrap();
        print_result(&mut second, &results, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            String::from_utf8(first).unwrap(),
            "[0] time:3ms, ip:10.0.0.3, pubkey:C\n[1] time:7ms, ip:10.0.0.1, pubkey:A\n"
        );
    }
}
