#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// Golden table of called flowgrams, one `index<TAB>call<TAB>values` row per read.
///
/// Values are rendered with one decimal so golden files stay stable across
/// platforms; an empty call renders as `-`.
#[derive(Debug, Default)]
pub struct FlowgramSnapshot {
    rows: Vec<String>,
}

impl FlowgramSnapshot {
    pub fn push(&mut self, call: &str, values: &[f32]) {
        let call = if call.is_empty() { "-" } else { call };
        let rendered = values
            .iter()
            .map(|value| format!("{value:.1}"))
            .collect::<Vec<_>>()
            .join("\t");
        self.rows
            .push(format!("{}\t{}\t{}", self.rows.len(), call, rendered));
    }

    /// Compare against `tests/snapshots/<name>`, or rewrite it when
    /// `PHASECALL_UPDATE_SNAPSHOTS` is set.
    pub fn assert_matches(&self, name: &str) {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("snapshots")
            .join(name);
        let mut actual = self.rows.join("\n");
        actual.push('\n');

        if std::env::var("PHASECALL_UPDATE_SNAPSHOTS").is_ok() {
            fs::write(&path, actual).expect("write snapshot");
            return;
        }

        let expected =
            fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
        let expected: Vec<&str> = expected.lines().collect();
        for (idx, row) in self.rows.iter().enumerate() {
            let golden = expected.get(idx).copied().unwrap_or("<missing>");
            assert_eq!(
                row.as_str(),
                golden,
                "flowgram row {idx} differs from {name}; set PHASECALL_UPDATE_SNAPSHOTS=1 to regenerate"
            );
        }
        assert_eq!(
            self.rows.len(),
            expected.len(),
            "{name} holds a different number of flowgrams"
        );
    }
}

/// Phasing-free flowgram of `sequence`: each base incorporates at the first
/// flow at or after the previous incorporation that dispenses it.
///
/// Returns `None` when the sequence does not fit in `num_flows` flows.
pub fn ideal_flowgram(flow_order: &str, num_flows: usize, sequence: &[u8]) -> Option<Vec<f32>> {
    let cycle = flow_order.as_bytes();
    let mut signal = vec![0.0f32; num_flows];
    let mut flow = 0;
    for &base in sequence {
        while flow < num_flows && cycle[flow % cycle.len()] != base {
            flow += 1;
        }
        if flow == num_flows {
            return None;
        }
        signal[flow] += 1.0;
    }
    Some(signal)
}
