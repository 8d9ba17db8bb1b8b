//! # Heap Report
//!
//! Initializes the engine heap, runs a small mixed workload and prints the
//! resulting heap report.
//!
//! ```text
//! heap_report [config.toml]
//! RUST_LOG=oroboros_runtime=debug heap_report
//! ```

use std::process::ExitCode;

use oroboros_runtime::{
    memory, sid, Array, HeapConfig, HeapString, RuntimeResult, SharedPtr, SplitMode,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mesh-like records kept alive across the report.
struct Workload {
    meshes: Array<SharedPtr<Array<f32>>>,
    names: Array<HeapString>,
}

/// Allocates meshes and names, then frees every other mesh to leave holes
/// in the free list.
fn run_workload() -> RuntimeResult<Workload> {
    let mut meshes = Array::new();
    for i in 0..64u16 {
        let mut vertices = Array::with_capacity(usize::from(i) * 3 + 3)?;
        for v in 0..=i {
            let v = f32::from(v);
            vertices.extend_from_slice(&[v, v * 0.5, -v])?;
        }
        meshes.add(SharedPtr::new(vertices)?)?;
    }

    let manifest: HeapString = "terrain/water//sky/props/player/".parse()?;
    let names = manifest.split_with(b'/', SplitMode::SkipEmpty)?;
    for name in &names {
        tracing::debug!(name = %name, id = sid(name.as_str()?).as_u64(), "registered asset");
    }

    let mut index = 0;
    while index < meshes.len() {
        meshes.remove_at(index)?;
        index += 1;
    }
    Ok(Workload { meshes, names })
}

fn report(config: &HeapConfig) -> RuntimeResult<()> {
    memory::init(config)?;

    let workload = run_workload()?;
    memory::validate()?;
    let stats = memory::dump()?;

    println!("{stats}");
    println!(
        "Workload: {} meshes, {} names, fragmentation {:.1}%",
        workload.meshes.len(),
        workload.names.len(),
        stats.fragmentation() * 100.0
    );

    drop(workload);
    memory::shutdown()
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oroboros_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match HeapConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: could not load {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => HeapConfig::default(),
    };

    match report(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
