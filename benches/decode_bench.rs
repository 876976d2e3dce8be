//! Decoder throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use phasecall::{BasecallerRead, Decoder, DecoderConfig};

const FLOW_ORDER: &str = "TACGTACGTCTGAGCATCGATCGATGTACAGC";
const TEMPLATE: &str = "TCAGGATTACACCGTTAGCATGCAAGTCCTGAATGCGGTACCATTGACGTAGCTAGGCATCAATGGCTTACG";

fn decoder(num_flows: usize) -> Decoder {
    let config = DecoderConfig::new(FLOW_ORDER, num_flows)
        .expect("valid config")
        .with_phasing(0.01, 0.006);
    Decoder::new(&config).expect("decoder")
}

fn phased_flowgram(decoder: &mut Decoder, num_flows: usize) -> Vec<f32> {
    let mut read = BasecallerRead::new(vec![0.0; num_flows]).with_sequence(TEMPLATE.repeat(4));
    decoder.simulate(&mut read, num_flows).expect("simulate");
    read.prediction
        .iter()
        .enumerate()
        .map(|(flow, value)| value * 1.05 + 0.03 * ((flow * 7919 % 13) as f32 / 13.0 - 0.5))
        .collect()
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_and_solve");
    for num_flows in [120usize, 260, 520] {
        let mut decoder = decoder(num_flows);
        let signal = phased_flowgram(&mut decoder, num_flows);
        group.bench_with_input(BenchmarkId::from_parameter(num_flows), &signal, |b, signal| {
            b.iter(|| {
                let mut read = BasecallerRead::new(signal.clone());
                decoder.normalize_and_solve(&mut read).expect("decode");
                decoder.compute_qv_metrics(&mut read).expect("quality");
                black_box(read.sequence.len())
            });
        });
    }
    group.finish();
}

fn benchmark_simulate(c: &mut Criterion) {
    let num_flows = 520;
    let mut decoder = decoder(num_flows);
    c.bench_function("simulate_flows=520", |b| {
        b.iter(|| {
            let mut read =
                BasecallerRead::new(vec![0.0; num_flows]).with_sequence(TEMPLATE.repeat(4));
            decoder.simulate(&mut read, num_flows).expect("simulate");
            black_box(read.prediction[num_flows - 1])
        });
    });
}

criterion_group!(benches, benchmark_decode, benchmark_simulate);
criterion_main!(benches);
