#![no_main]
use entcode::bitstream::{DefaultInputBitStream, DefaultOutputBitStream, OutputBitStream};
use entcode::{new_decoder, new_encoder, EntropyCodecType, EntropyDecoder, EntropyEncoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (u8, Vec<u8>)| {
    let (selector, input) = data;
    let codec = EntropyCodecType::ALL[selector as usize % EntropyCodecType::ALL.len()];

    let mut obs = DefaultOutputBitStream::new(Vec::new());
    {
        let mut encoder = new_encoder(codec, &mut obs);
        assert_eq!(encoder.encode(&input).unwrap(), input.len());
        encoder.dispose().unwrap();
    }
    obs.close().unwrap();
    let bytes = obs.into_inner();

    let mut decoder = new_decoder(codec, DefaultInputBitStream::new(&bytes[..]));
    let mut output = vec![0u8; input.len()];
    decoder.decode(&mut output).unwrap();
    assert_eq!(input, output);
});
