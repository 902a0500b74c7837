//! Performance benchmarks for sample conversion and WAVE parsing
//!
//! Run with: cargo bench -p chime_codec

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use chime_codec::{convert_to_native, parse_wave, DeviceFormat, WAVE_FORMAT_PCM};

fn test_pcm(samples: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| (((i as f32 * 0.01).sin() * 30000.0) as i16).to_le_bytes())
        .collect()
}

fn benchmark_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_to_native");

    // One second of stereo audio at common rates
    for rate in [44100usize, 48000] {
        let pcm = test_pcm(rate * 2);
        group.throughput(Throughput::Bytes(pcm.len() as u64));

        let float = DeviceFormat::float32(2, rate as u32);
        group.bench_function(format!("float32_{}hz", rate), |b| {
            b.iter(|| convert_to_native(black_box(&float), black_box(&pcm)).unwrap());
        });

        let pcm8 = DeviceFormat::new(WAVE_FORMAT_PCM, 2, 8, rate as u32);
        group.bench_function(format!("pcm8_{}hz", rate), |b| {
            b.iter(|| convert_to_native(black_box(&pcm8), black_box(&pcm)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_parse(c: &mut Criterion) {
    let data = test_pcm(48000 * 2);
    let mut file = b"RIFF".to_vec();
    file.extend_from_slice(&(data.len() as u32 + 12).to_le_bytes());
    file.extend_from_slice(b"WAVE");
    file.extend_from_slice(b"data");
    file.extend_from_slice(&(data.len() as u32).to_le_bytes());
    file.extend_from_slice(&data);

    c.bench_function("parse_wave_1s_stereo", |b| {
        b.iter(|| parse_wave(black_box(&file)).unwrap());
    });
}

criterion_group!(benches, benchmark_conversion, benchmark_parse);

criterion_main!(benches);
