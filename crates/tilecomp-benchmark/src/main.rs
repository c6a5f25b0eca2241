use std::time::Instant;

use fitsio_tilecomp::{
    compress, decompress, Compression, CompressionParameters, ImageData, TileGeometry,
};

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    label: String,
    compress_ms: f64,
    decompress_ms: f64,
    compress_mpx_per_sec: f64,
    decompress_mpx_per_sec: f64,
    ratio: f64,
    bound_ratio: f64,
}

fn time_iterations<F: FnMut()>(mut f: F, iterations: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iterations {
        f();
    }
    start.elapsed().as_secs_f64() * 1000.0 / iterations as f64
}

/// Sky-like background with a linear-congruential noise term.
fn generate_i16(nx: usize, n: usize) -> Vec<i16> {
    let mut data = Vec::with_capacity(n);
    let mut state: u64 = 0xdeadbeef;
    for k in 0..n {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let noise = ((state >> 40) % 64) as i16;
        data.push(1000 + (k % nx) as i16 / 8 + noise);
    }
    data
}

fn generate_f32(nx: usize, n: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(n);
    let mut state: u64 = 0xdeadbeef;
    for k in 0..n {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let noise = (state >> 40) as f32 / (1u64 << 24) as f32;
        data.push(100.0 + (k % nx) as f32 * 0.01 + 5.0 * noise);
    }
    data
}

fn bench_case(
    label: &str,
    iterations: usize,
    image: &ImageData,
    geometry: &TileGeometry,
    params: &CompressionParameters,
) -> BenchResult {
    let total = image.len();
    let megapixels = total as f64 / 1_000_000.0;
    let raw_bytes = (total * image.pixel_type().byte_width()) as f64;

    // Warmup
    let compressed = compress(image, geometry, params).unwrap();

    let compress_ms = time_iterations(
        || drop(compress(image, geometry, params).unwrap()),
        iterations,
    );
    let decompress_ms = time_iterations(
        || drop(decompress(&compressed, params, None).unwrap()),
        iterations,
    );

    let bound = params
        .compression
        .max_compressed_len(geometry.maxtilelen(), image.pixel_type())
        * geometry.ntiles();

    BenchResult {
        label: label.to_string(),
        compress_ms,
        decompress_ms,
        compress_mpx_per_sec: megapixels / (compress_ms / 1000.0),
        decompress_mpx_per_sec: megapixels / (decompress_ms / 1000.0),
        ratio: raw_bytes / compressed.stored_len() as f64,
        bound_ratio: raw_bytes / bound as f64,
    }
}

fn run_benchmarks() -> Vec<BenchResult> {
    let mut results = Vec::new();

    let sizes: &[(&str, [usize; 2], usize)] = &[
        ("256x256", [256, 256], 20),
        ("1024x1024", [1024, 1024], 5),
        ("4096x4096", [4096, 4096], 1),
    ];

    let codecs = [
        Compression::rice(),
        Compression::Gzip1,
        Compression::Gzip2,
        Compression::Plio,
        Compression::hcompress(),
    ];

    for &(size_label, shape, iterations) in sizes {
        let total: usize = shape.iter().product();
        let row_tiles = TileGeometry::row_tiles(&shape).unwrap();
        let square_tiles = TileGeometry::new(&shape, &[64, 64]).unwrap();

        eprint!("  {size_label} ...");

        let i16_image = ImageData::I16(generate_i16(shape[0], total));
        for codec in codecs {
            let geometry = match codec {
                Compression::Hcompress { .. } => &square_tiles,
                _ => &row_tiles,
            };
            let params = CompressionParameters::new(codec);
            let label = format!("i16 {codec} {size_label}");
            results.push(bench_case(&label, iterations, &i16_image, geometry, &params));
        }

        let f32_image = ImageData::F32(generate_f32(shape[0], total));
        for codec in [Compression::rice(), Compression::Gzip2, Compression::hcompress()] {
            let geometry = match codec {
                Compression::Hcompress { .. } => &square_tiles,
                _ => &row_tiles,
            };
            let params = CompressionParameters::new(codec);
            let label = format!("f32 {codec} {size_label}");
            results.push(bench_case(&label, iterations, &f32_image, geometry, &params));
        }

        eprintln!(" done");
    }

    results
}

fn print_results(results: &[BenchResult]) {
    println!(
        "| {:32} | {:>10} | {:>12} | {:>10} | {:>12} | {:>7} | {:>7} |",
        "Test", "Comp ms", "Comp MP/s", "Decomp ms", "Decomp MP/s", "Ratio", "Bound"
    );
    println!(
        "|{:-<34}|{:->12}|{:->14}|{:->12}|{:->14}|{:->9}|{:->9}|",
        "", "", "", "", "", "", ""
    );
    for r in results {
        println!(
            "| {:32} | {:>10.2} | {:>12.1} | {:>10.2} | {:>12.1} | {:>7.2} | {:>7.2} |",
            r.label,
            r.compress_ms,
            r.compress_mpx_per_sec,
            r.decompress_ms,
            r.decompress_mpx_per_sec,
            r.ratio,
            r.bound_ratio
        );
    }
}

fn main() {
    println!("# FITS Tile Compression Benchmark\n");
    println!("Measuring compress and decompress throughput per codec.");
    println!("Each test runs several times and reports the average.");
    println!("MP/s = megapixels per second. Ratio = raw bytes / stored bytes;");
    println!("Bound = raw bytes / worst-case compressed size.\n");

    let results = run_benchmarks();
    print_results(&results);
}
