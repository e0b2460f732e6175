use std::io::Cursor;
use std::net::TcpStream;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ::wirews::buffer::BufferPool;
use ::wirews::ws::{Config, Decoder, Encoder, Mask, OpCode, Websocket};

mod server;

const MSG: [u8; 256] = [90u8; 256];

fn mask_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask");
    let mut payload = vec![7u8; 64 * 1024];
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("apply_64k", |b| {
        let mut mask = Mask::new([0x37, 0xfa, 0x21, 0x3d]);
        b.iter(|| {
            mask.apply(black_box(&mut payload));
        })
    });

    group.finish();
}

fn codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(MSG.len() as u64));

    let client = Config::client();
    let mut encoder = Encoder::new(&client, StdRng::seed_from_u64(0), BufferPool::default());
    let mut wire = Vec::with_capacity(1024);

    group.bench_function("encode_masked_256", |b| {
        b.iter(|| {
            wire.clear();
            encoder.send(&mut wire, OpCode::Text, black_box(&MSG)).unwrap();
        })
    });

    let fragmented = Config::client().with_fragment_size(64);
    let mut encoder = Encoder::new(&fragmented, StdRng::seed_from_u64(0), BufferPool::default());
    let mut fragments = Vec::new();
    encoder.send(&mut fragments, OpCode::Binary, &MSG).unwrap();

    let mut decoder = Decoder::new(&Config::server(), BufferPool::default());
    group.bench_function("decode_fragmented_256", |b| {
        b.iter(|| {
            let mut stream = Cursor::new(fragments.as_slice());
            let message = decoder.read_message(&mut stream, |_, _| Ok(())).unwrap();
            black_box(message.payload);
        })
    });

    group.finish();
}

fn rtt_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("wirews");
    group.throughput(Throughput::Bytes(MSG.len() as u64));

    // run server in the background
    server::start_on_thread(9002);

    let stream = TcpStream::connect("127.0.0.1:9002").unwrap();
    stream.set_nodelay(true).unwrap();
    let mut ws = Websocket::connect(stream, "ws://127.0.0.1:9002", Config::client()).unwrap();

    group.bench_function("wirews_rtt", |b| {
        b.iter(|| {
            ws.send_binary(&MSG).unwrap();
            let message = ws.read_message().unwrap();
            black_box(message.payload);
        })
    });

    ws.close(&1000u16.to_be_bytes()).unwrap();
    group.finish();
}

criterion_group!(benches, mask_benchmark, codec_benchmark, rtt_benchmark);
criterion_main!(benches);
