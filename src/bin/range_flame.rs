use entcode::bitstream::{DefaultInputBitStream, DefaultOutputBitStream, OutputBitStream};
use entcode::{EntropyDecoder, EntropyEncoder, RangeDecoder, RangeEncoder};

fn main() -> entcode::Result<()> {
    let input = (0..100_000u32)
        .map(|i| ((i * 7) ^ (i >> 3)) as u8 & 63)
        .collect::<Vec<_>>();
    let mut output = vec![0u8; input.len()];

    for _ in 0..200 {
        let mut obs = DefaultOutputBitStream::new(Vec::with_capacity(input.len()));
        let mut encoder = RangeEncoder::new(&mut obs);
        encoder.encode(&input)?;
        encoder.dispose()?;
        obs.close()?;
        let bytes = obs.into_inner();

        let mut decoder = RangeDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        decoder.decode(&mut output)?;
        assert_eq!(input, output);
    }
    Ok(())
}
