//! Benchmarks for the telemetry codec and command decoding

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lumen_core::DeviceId;
use lumen_runtime::command_text;
use lumen_transport::{ConnectionString, Message};
use lumen_wire::{CommandInvocation, JsonSerializer, Serializer};

fn bench_serialize(c: &mut Criterion) {
    let serializer = JsonSerializer::new();
    serializer.init().unwrap();
    let device = DeviceId::new("LightSensorDevice").unwrap();
    let mut model = serializer.create_model(&device).unwrap();
    model.set_sample(&device, 512);

    c.bench_function("telemetry_serialize", |b| {
        b.iter(|| serializer.serialize(black_box(&model)))
    });
}

fn bench_serialize_into_message(c: &mut Criterion) {
    let serializer = JsonSerializer::new();
    serializer.init().unwrap();
    let device = DeviceId::new("LightSensorDevice").unwrap();
    let mut model = serializer.create_model(&device).unwrap();

    c.bench_function("telemetry_message", |b| {
        let mut value = 0;
        b.iter(|| {
            value += 1;
            model.set_sample(&device, value);
            let payload = serializer.serialize(&model).unwrap();
            Message::from_bytes(black_box(payload))
        })
    });
}

fn bench_command_decode(c: &mut Criterion) {
    let bare = b"ResetDevice".to_vec();
    let envelope = br#"{"Name":"ResetDevice","Parameters":{"delay":0}}"#.to_vec();

    c.bench_function("command_decode_bare", |b| {
        b.iter(|| {
            let text = command_text(black_box(&bare)).unwrap();
            CommandInvocation::decode(&text)
        })
    });

    c.bench_function("command_decode_envelope", |b| {
        b.iter(|| {
            let text = command_text(black_box(&envelope)).unwrap();
            CommandInvocation::decode(&text)
        })
    });
}

fn bench_connection_string(c: &mut Criterion) {
    let raw = "HostName=hub.example.net;DeviceId=LightSensorDevice;SharedAccessKey=YWJjZGVmZ2hpamtsbW5vcA==";

    c.bench_function("connection_string_parse", |b| {
        b.iter(|| ConnectionString::parse(black_box(raw)))
    });
}

criterion_group!(
    benches,
    bench_serialize,
    bench_serialize_into_message,
    bench_command_decode,
    bench_connection_string
);
criterion_main!(benches);
