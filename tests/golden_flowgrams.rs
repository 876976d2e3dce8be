#[path = "common/mod.rs"]
mod common;
use common::{ideal_flowgram, FlowgramSnapshot};
use phasecall::{BasecallerRead, Decoder, DecoderConfig};

const FLOW_ORDER: &str = "TACGTACGTCTGAGCATCGATCGATGTACAGC";
const NUM_FLOWS: usize = 40;

#[test]
fn clean_flowgrams_match_golden() {
    let config = DecoderConfig::new(FLOW_ORDER, NUM_FLOWS).expect("valid config");
    let mut decoder = Decoder::new(&config).expect("decoder initialises");

    let mut snapshot = FlowgramSnapshot::default();
    for sequence in ["TCAG", "GATTACA", "TTTAACCG", "ACGTACGTTGCA", ""] {
        let signal = ideal_flowgram(FLOW_ORDER, NUM_FLOWS, sequence.as_bytes())
            .expect("sequence fits in the configured flows");
        let mut read = BasecallerRead::new(signal);
        decoder
            .normalize_and_solve(&mut read)
            .expect("decoding succeeds");
        snapshot.push(&read.sequence_string(), &read.prediction);
    }

    snapshot.assert_matches("clean_flowgrams.tsv");
}
