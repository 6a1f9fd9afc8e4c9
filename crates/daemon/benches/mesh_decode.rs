//! Performance benchmarks for `.ply` decoding.
//!
//! These benchmarks measure the mesh preview hot path:
//! - ASCII point clouds
//! - Binary little-endian point clouds with colors
//! - Binary meshes with triangle faces

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use daemon::MeshDecoder;

fn ascii_cloud(vertices: usize) -> Vec<u8> {
    let mut out = format!(
        "ply\nformat ascii 1.0\nelement vertex {vertices}\n\
         property float x\nproperty float y\nproperty float z\nend_header\n"
    );
    for i in 0..vertices {
        let f = i as f32;
        out.push_str(&format!("{} {} {}\n", f * 0.5, f * 0.25, f * 0.125));
    }
    out.into_bytes()
}

fn binary_mesh(vertices: usize, with_faces: bool) -> Vec<u8> {
    let faces = if with_faces { vertices.saturating_sub(2) } else { 0 };
    let mut header = format!(
        "ply\nformat binary_little_endian 1.0\nelement vertex {vertices}\n\
         property float x\nproperty float y\nproperty float z\n\
         property uchar red\nproperty uchar green\nproperty uchar blue\n"
    );
    if with_faces {
        header.push_str(&format!(
            "element face {faces}\nproperty list uchar int vertex_indices\n"
        ));
    }
    header.push_str("end_header\n");

    let mut out = header.into_bytes();
    for i in 0..vertices {
        let f = i as f32;
        for coord in [f, f * 0.5, f * 0.25] {
            out.extend_from_slice(&coord.to_le_bytes());
        }
        out.extend_from_slice(&[(i % 256) as u8, 128, 64]);
    }
    for i in 0..faces {
        out.push(3);
        for index in [i, i + 1, i + 2] {
            out.extend_from_slice(&(index as i32).to_le_bytes());
        }
    }
    out
}

/// Benchmark decoding of the different body encodings.
fn bench_decode(c: &mut Criterion) {
    let decoder = MeshDecoder::default();
    let mut group = c.benchmark_group("mesh_decode");

    let ascii = ascii_cloud(100_000);
    group.throughput(Throughput::Bytes(ascii.len() as u64));
    group.bench_function("ascii_cloud_100k", |b| {
        b.iter(|| decoder.decode(black_box(ascii.as_slice())))
    });

    let cloud = binary_mesh(100_000, false);
    group.throughput(Throughput::Bytes(cloud.len() as u64));
    group.bench_function("binary_cloud_100k", |b| {
        b.iter(|| decoder.decode(black_box(cloud.as_slice())))
    });

    let mesh = binary_mesh(100_000, true);
    group.throughput(Throughput::Bytes(mesh.len() as u64));
    group.bench_function("binary_mesh_100k", |b| {
        b.iter(|| decoder.decode(black_box(mesh.as_slice())))
    });

    group.finish();
}

/// Benchmark payload encoding for the wire.
fn bench_payload(c: &mut Criterion) {
    let decoded = match MeshDecoder::default().decode(binary_mesh(50_000, true).as_slice()) {
        Ok(mesh) => mesh,
        Err(e) => panic!("benchmark mesh failed to decode: {e}"),
    };
    let payload = decoded.to_payload();
    let mut group = c.benchmark_group("mesh_payload");

    group.bench_function("json_50k", |b| b.iter(|| black_box(&payload).to_json()));
    group.bench_function("msgpack_50k", |b| {
        b.iter(|| black_box(&payload).to_msgpack())
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_payload);
criterion_main!(benches);
