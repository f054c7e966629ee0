//! Compile-time benchmarks per lowering mode and tier.
//!
//! Uses `std::time::Instant` timing over a fixed number of iterations. Run
//! with:
//!
//! ```bash
//! cargo bench -p lanewise-codegen
//! ```

use std::time::{Duration, Instant};

use lanewise_codegen::{Engine, EngineConfig, LoweringMode, Tier};
use lanewise_wasm::{FuncType, LaneShape, Module, ModuleBuilder, SimdBinop, SimdUnop, ValueType};

const ITERATIONS: u32 = 20;

/// A chain of `depth` vector operations over one splatted parameter.
fn vector_chain(depth: usize) -> Module {
    let mut b = ModuleBuilder::new();
    let f = b
        .new_function(FuncType::new([ValueType::I32], [ValueType::I32]))
        .expect("function");
    let body = b.body(&f).expect("body");
    body.local_get(0)
        .and_then(|c| c.splat(LaneShape::I8x16))
        .expect("splat");
    for i in 0..depth {
        let step = match i % 4 {
            0 => body
                .local_get(0)
                .and_then(|c| c.splat(LaneShape::I8x16))
                .and_then(|c| c.binop(SimdBinop::I8x16Add)),
            1 => body.unop(SimdUnop::I16x8Neg),
            2 => body
                .local_get(0)
                .and_then(|c| c.splat(LaneShape::I16x8))
                .and_then(|c| c.binop(SimdBinop::I16x8Mul)),
            _ => body.unop(SimdUnop::V128Not),
        };
        step.expect("vector op");
    }
    body.all_true(LaneShape::I8x16).expect("all_true");
    b.build().expect("module")
}

fn compile(config: EngineConfig, module: &Module) -> Duration {
    let start = Instant::now();
    let compiled = Engine::new(config).compile(module.bytes()).expect("compile");
    let elapsed = start.elapsed();
    drop(compiled);
    elapsed
}

fn run_bench(config: EngineConfig, name: &str, module: &Module) {
    // Warm-up run (not counted).
    let _ = compile(config, module);

    let mut durations: Vec<Duration> = (0..ITERATIONS).map(|_| compile(config, module)).collect();
    durations.sort();
    let min = durations[0];
    let max = durations[durations.len() - 1];
    let median = durations[durations.len() / 2];
    let mean: Duration = durations.iter().sum::<Duration>() / ITERATIONS;

    println!("  {name} [{config}]");
    println!("    min        : {:.3} ms", min.as_secs_f64() * 1000.0);
    println!("    median     : {:.3} ms", median.as_secs_f64() * 1000.0);
    println!("    mean       : {:.3} ms", mean.as_secs_f64() * 1000.0);
    println!("    max        : {:.3} ms", max.as_secs_f64() * 1000.0);
    println!();
}

fn main() {
    println!("lanewise-codegen compile benchmarks ({ITERATIONS} iterations)\n");
    let programs = [("chain_16", vector_chain(16)), ("chain_256", vector_chain(256))];
    for (name, module) in &programs {
        for mode in [LoweringMode::Native, LoweringMode::ScalarLowered] {
            for tier in [Tier::Baseline, Tier::Optimizing] {
                run_bench(EngineConfig::new(mode, tier), name, module);
            }
        }
    }
}
