#![no_main]
use entcode::bitstream::DefaultInputBitStream;
use entcode::{new_decoder, EntropyCodecType, EntropyDecoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (u8, u16, Vec<u8>)| {
    let (selector, len, input) = data;
    let codec = EntropyCodecType::ALL[selector as usize % EntropyCodecType::ALL.len()];

    let mut decoder = new_decoder(codec, DefaultInputBitStream::new(&input[..]));
    let mut output = vec![0u8; usize::from(len % 4096)];
    let _ = decoder.decode(&mut output);
});
