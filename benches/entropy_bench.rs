use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use entcode::bitstream::{DefaultInputBitStream, DefaultOutputBitStream, OutputBitStream};
use entcode::{new_decoder, new_encoder, EntropyCodecType, EntropyDecoder, EntropyEncoder};

fn sample_input() -> Vec<u8> {
    // Skewed, BWT-like: long runs over a small alphabet.
    (0..64 * 1024u32)
        .map(|i| match (i / 17) % 11 {
            0..=5 => b'e',
            6 | 7 => b't',
            8 => b' ',
            9 => (i % 26) as u8 + b'a',
            _ => (i % 7) as u8,
        })
        .collect()
}

fn compress(codec: EntropyCodecType, input: &[u8]) -> Vec<u8> {
    let mut obs = DefaultOutputBitStream::new(Vec::with_capacity(input.len()));
    {
        let mut encoder = new_encoder(codec, &mut obs);
        encoder.encode(input).unwrap();
        encoder.dispose().unwrap();
    }
    obs.close().unwrap();
    obs.into_inner()
}

fn bench_codecs(c: &mut Criterion) {
    let input = sample_input();

    for codec in EntropyCodecType::ALL {
        let mut group = c.benchmark_group(codec.name().to_lowercase());
        group.throughput(Throughput::Bytes(input.len() as u64));

        group.bench_function("encode", |b| b.iter(|| compress(codec, black_box(&input))));

        let compressed = compress(codec, &input);
        let mut output = vec![0u8; input.len()];
        group.bench_function("decode", |b| {
            b.iter(|| {
                let mut decoder = new_decoder(codec, DefaultInputBitStream::new(&compressed[..]));
                decoder.decode(black_box(&mut output)).unwrap();
            })
        });
        group.finish();
    }
}

criterion_group!(benches, bench_codecs);
criterion_main!(benches);
