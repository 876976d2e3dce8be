#[path = "common/mod.rs"]
mod common;

use common::ideal_flowgram;
use phasecall::path::MAX_SEQUENCE_LENGTH;
use phasecall::{BasecallerRead, Decoder, DecoderConfig};
use proptest::prelude::*;

const FLOW_ORDER: &str = "TACGTACGTCTGAGCATCGATCGATGTACAGC";

fn bases() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'T')], 0..24)
}

fn decoder(num_flows: usize, carry_forward: f64, incomplete_extension: f64, delay: usize) -> Decoder {
    let config = DecoderConfig::new(FLOW_ORDER, num_flows)
        .expect("valid config")
        .with_phasing(carry_forward, incomplete_extension)
        .with_max_path_delay(delay);
    Decoder::new(&config).expect("decoder initialises")
}

proptest! {
    #[test]
    fn clean_flowgrams_decode_to_their_sequence(sequence in bases()) {
        let num_flows = 64;
        let signal = ideal_flowgram(FLOW_ORDER, num_flows, &sequence);
        prop_assume!(signal.is_some());
        let signal = signal.unwrap();

        let mut decoder = decoder(num_flows, 0.0, 0.0, DecoderConfig::DEFAULT_MAX_PATH_DELAY);
        let mut read = BasecallerRead::new(signal.clone());
        decoder.normalize_and_solve(&mut read).expect("decoding succeeds");

        prop_assert_eq!(&read.sequence, &sequence);
        prop_assert_eq!(&read.prediction, &signal);
    }

    #[test]
    fn decoded_reads_are_well_formed(
        sequence in bases(),
        carry_forward in 0.0f64..0.04,
        incomplete_extension in 0.0f64..0.04,
        noise in proptest::collection::vec(-0.15f32..0.15, 96),
    ) {
        let num_flows = 96;
        let mut decoder = decoder(num_flows, carry_forward, incomplete_extension, 40);
        let mut template = BasecallerRead::new(vec![0.0; num_flows]).with_sequence(sequence);
        decoder.simulate(&mut template, num_flows).expect("simulation succeeds");

        let raw: Vec<f32> = template.prediction.iter().zip(&noise).map(|(p, n)| p + n).collect();
        let mut read = BasecallerRead::new(raw);
        decoder.normalize_and_solve(&mut read).expect("decoding succeeds");
        let searched = read.prediction.clone();
        decoder.compute_qv_metrics(&mut read).expect("quality metrics succeed");

        prop_assert!(read.sequence.len() <= MAX_SEQUENCE_LENGTH);
        prop_assert!(read.sequence.iter().all(|b| b"ACGT".contains(b)));
        prop_assert_eq!(read.prediction.len(), num_flows);
        prop_assert_eq!(read.penalty_residual.len(), read.sequence.len());
        prop_assert_eq!(read.penalty_mismatch.len(), read.sequence.len());
        prop_assert!(read.prediction.iter().all(|p| p.is_finite() && *p >= 0.0));
        prop_assert!(read.penalty_mismatch.iter().all(|&m| m >= -1.0));
        for flow in 0..num_flows {
            prop_assert!(read.state_inphase[flow] >= 0.01);
            prop_assert!(read.state_total[flow] >= 0.01);
        }

        // Both passes agree with simulating the call.
        for (walked, found) in read.prediction.iter().zip(&searched) {
            prop_assert!((walked - found).abs() < 1e-3);
        }
        let mut replay = BasecallerRead::new(vec![0.0; num_flows]).with_sequence(read.sequence.clone());
        decoder.simulate(&mut replay, num_flows).expect("simulation succeeds");
        for (called, simulated) in read.prediction.iter().zip(&replay.prediction) {
            prop_assert!((called - simulated).abs() < 1e-3);
        }
    }

    #[test]
    fn delay_beyond_read_length_never_prunes(
        sequence in bases(),
        noise in proptest::collection::vec(-0.2f32..0.2, 48),
    ) {
        let num_flows = 48;
        let mut template = BasecallerRead::new(vec![0.0; num_flows]).with_sequence(sequence);
        decoder(num_flows, 0.01, 0.01, 40)
            .simulate(&mut template, num_flows)
            .expect("simulation succeeds");
        let raw: Vec<f32> = template.prediction.iter().zip(&noise).map(|(p, n)| p + n).collect();

        let mut bounded = BasecallerRead::new(raw.clone());
        decoder(num_flows, 0.01, 0.01, num_flows)
            .normalize_and_solve(&mut bounded)
            .expect("decoding succeeds");
        let mut unbounded = BasecallerRead::new(raw);
        decoder(num_flows, 0.01, 0.01, 10 * num_flows)
            .normalize_and_solve(&mut unbounded)
            .expect("decoding succeeds");

        prop_assert_eq!(bounded, unbounded);
    }
}

fn noisy_flowgram(num_flows: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec((0u8..3, -0.3f32..0.3), num_flows)
        .prop_map(|flows| flows.into_iter().map(|(level, noise)| level as f32 + noise).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn search_paths_stay_inside_the_flow_range(
        raw in noisy_flowgram(160),
        carry_forward in 0.002f64..0.02,
        incomplete_extension in 0.002f64..0.02,
        delay in prop_oneof![Just(5usize), Just(20), Just(40), Just(400)],
    ) {
        let num_flows = raw.len();
        let mut decoder = decoder(num_flows, carry_forward, incomplete_extension, delay);
        let mut read = BasecallerRead::new(raw);
        decoder.normalize_and_solve(&mut read).expect("decoding succeeds");

        prop_assert_eq!(read.prediction.len(), num_flows);
        prop_assert!(read.sequence.iter().all(|b| b"ACGT".contains(b)));
        for path in decoder.paths() {
            prop_assert!(path.window_start <= path.window_end);
            prop_assert!(path.window_end <= num_flows);
        }
        let best = decoder.best_path();
        if !best.sequence.is_empty() {
            prop_assert!(best.window_start < best.window_end);
            let mass: f32 = best.state[best.window_start..best.window_end].iter().sum();
            prop_assert!(mass <= 1.0 + 1e-4, "mass {} exceeds one", mass);
        }

        decoder.compute_qv_metrics(&mut read).expect("quality metrics succeed");
        prop_assert_eq!(read.penalty_residual.len(), read.sequence.len());
    }
}
