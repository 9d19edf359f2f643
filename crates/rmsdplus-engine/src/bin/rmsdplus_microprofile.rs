use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use rmsdplus_engine::{
    ContextState, ForceError, ForceResult, Precision, RmsdPlusConfig, RmsdPlusKernel,
};

#[derive(Debug, Clone)]
struct Args {
    config: PathBuf,
    noise: f64,
    seed: u64,
    repeats: usize,
    warmup_repeats: usize,
    fd_step: f64,
    fd_particles: usize,
    device: Option<String>,
    precision: Option<Precision>,
    json_out: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::new(),
            noise: 0.05,
            seed: 2024,
            repeats: 20,
            warmup_repeats: 2,
            fd_step: 1.0e-5,
            fd_particles: 8,
            device: None,
            precision: None,
            json_out: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct TimingSummary {
    sec_mean: f64,
    sec_median: f64,
    sec_std: f64,
    sec_min: f64,
    sec_max: f64,
    sec_samples: usize,
    warmup_repeats: usize,
    evals_per_sec: f64,
}

#[derive(Debug, Serialize)]
struct ConfigInfo {
    config: String,
    noise: f64,
    seed: u64,
    device: String,
    backend: String,
    precision: String,
    block_size: usize,
    n_alignment: usize,
    n_rmsd: usize,
    periodic: bool,
}

#[derive(Debug, Serialize)]
struct GradientCheck {
    fd_step: f64,
    n_particles_checked: usize,
    max_abs_error: f64,
    max_force: f64,
}

#[derive(Debug, Serialize)]
struct MicroprofileReport {
    config: ConfigInfo,
    energy: f64,
    lambda_max: f64,
    alignment_residual: f64,
    degenerate: bool,
    energy_and_forces: TimingSummary,
    energy_only: TimingSummary,
    gradient: GradientCheck,
}

fn usage() {
    println!("RmsdPlusKernel microprofiler");
    println!("Usage:");
    println!("  cargo run -p rmsdplus-engine --bin rmsdplus_microprofile -- \\");
    println!("    --config <force.json> [options]");
    println!();
    println!("Options:");
    println!("  --noise <float>              gaussian position noise, default: 0.05");
    println!("  --seed <int>                 default: 2024");
    println!("  --repeats <int>              default: 20");
    println!("  --warmup-repeats <int>       default: 2");
    println!("  --fd-step <float>            default: 1e-5");
    println!("  --fd-particles <int>         particles checked by finite differences, default: 8");
    println!("  --device <cpu|auto|cuda[:N]> overrides the config");
    println!("  --precision <single|double>  overrides the config");
    println!("  --json-out <path>            optional JSON output");
    println!("  --help                       show this message");
}

fn parse_args() -> ForceResult<Args> {
    let mut args = Args::default();
    let mut it = env::args().skip(1);
    while let Some(flag) = it.next() {
        match flag.as_str() {
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            "--config" => args.config = PathBuf::from(next_value(&mut it, "--config")?),
            "--noise" => args.noise = parse_f64(&next_value(&mut it, "--noise")?, "--noise")?,
            "--seed" => {
                let value = next_value(&mut it, "--seed")?;
                args.seed = value
                    .parse()
                    .map_err(|_| ForceError::Parse(format!("invalid integer for --seed: {value}")))?
            }
            "--repeats" => {
                args.repeats = parse_usize(&next_value(&mut it, "--repeats")?, "--repeats")?
            }
            "--warmup-repeats" => {
                args.warmup_repeats = parse_usize(
                    &next_value(&mut it, "--warmup-repeats")?,
                    "--warmup-repeats",
                )?
            }
            "--fd-step" => {
                args.fd_step = parse_f64(&next_value(&mut it, "--fd-step")?, "--fd-step")?
            }
            "--fd-particles" => {
                args.fd_particles =
                    parse_usize(&next_value(&mut it, "--fd-particles")?, "--fd-particles")?
            }
            "--device" => args.device = Some(next_value(&mut it, "--device")?),
            "--precision" => {
                let value = next_value(&mut it, "--precision")?;
                args.precision = Some(match value.to_ascii_lowercase().as_str() {
                    "single" => Precision::Single,
                    "double" => Precision::Double,
                    _ => {
                        return Err(ForceError::Parse(format!(
                            "invalid precision '{value}' (single|double)"
                        )))
                    }
                });
            }
            "--json-out" => args.json_out = Some(PathBuf::from(next_value(&mut it, "--json-out")?)),
            _ => {
                return Err(ForceError::Parse(format!(
                    "unknown argument '{flag}' (use --help for usage)"
                )))
            }
        }
    }
    if args.config.as_os_str().is_empty() {
        return Err(ForceError::Parse(
            "missing required --config (use --help)".into(),
        ));
    }
    if args.noise < 0.0 {
        return Err(ForceError::Parse("--noise must be >= 0".into()));
    }
    if args.repeats == 0 {
        return Err(ForceError::Parse("--repeats must be > 0".into()));
    }
    if args.fd_step <= 0.0 {
        return Err(ForceError::Parse("--fd-step must be > 0".into()));
    }
    Ok(args)
}

fn next_value(it: &mut impl Iterator<Item = String>, flag: &str) -> ForceResult<String> {
    it.next()
        .ok_or_else(|| ForceError::Parse(format!("missing value for {flag}")))
}

fn parse_usize(value: &str, flag: &str) -> ForceResult<usize> {
    value
        .parse::<usize>()
        .map_err(|_| ForceError::Parse(format!("invalid integer for {flag}: {value}")))
}

fn parse_f64(value: &str, flag: &str) -> ForceResult<f64> {
    value
        .parse::<f64>()
        .map_err(|_| ForceError::Parse(format!("invalid float for {flag}: {value}")))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stddev(values: &[f64], mu: f64) -> f64 {
    if values.len() < 2 {
        0.0
    } else {
        let var = values.iter().map(|&x| (x - mu) * (x - mu)).sum::<f64>() / values.len() as f64;
        var.sqrt()
    }
}

fn timing_summary(samples_sec: &[f64], warmup_repeats: usize) -> ForceResult<TimingSummary> {
    let start = warmup_repeats.min(samples_sec.len());
    let active = &samples_sec[start..];
    if active.is_empty() {
        return Err(ForceError::Parse(
            "warmup_repeats consumed all samples; increase repeats".into(),
        ));
    }
    let mut sorted = active.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    let sec_median = if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    };
    let sec_mean = mean(active);
    Ok(TimingSummary {
        sec_mean,
        sec_median,
        sec_std: stddev(active, sec_mean),
        sec_min: sorted[0],
        sec_max: sorted[sorted.len() - 1],
        sec_samples: active.len(),
        warmup_repeats,
        evals_per_sec: if sec_mean > 0.0 { 1.0 / sec_mean } else { 0.0 },
    })
}

fn time_evaluations(
    kernel: &mut RmsdPlusKernel,
    ctx: &ContextState,
    forces: &mut [[f64; 3]],
    include_forces: bool,
    args: &Args,
) -> ForceResult<TimingSummary> {
    let mut samples = Vec::with_capacity(args.warmup_repeats + args.repeats);
    for _ in 0..args.warmup_repeats + args.repeats {
        forces.fill([0.0; 3]);
        let t0 = Instant::now();
        kernel.execute(ctx, forces, include_forces, true)?;
        samples.push(t0.elapsed().as_secs_f64());
    }
    timing_summary(&samples, args.warmup_repeats)
}

/// Central differences of the energy against the analytic forces for the
/// first `fd_particles` involved particles.
fn gradient_check(
    kernel: &mut RmsdPlusKernel,
    ctx: &ContextState,
    forces: &[[f64; 3]],
    involved: &[usize],
    args: &Args,
) -> ForceResult<GradientCheck> {
    let mut probe = ctx.clone();
    let mut max_abs_error = 0.0f64;
    let mut max_force = 0.0f64;
    let checked = &involved[..involved.len().min(args.fd_particles)];
    for &idx in checked {
        for dim in 0..3 {
            let x0 = ctx.positions[idx][dim];
            probe.positions[idx][dim] = x0 + args.fd_step;
            let ep = kernel.execute(&probe, &mut [], false, true)?;
            probe.positions[idx][dim] = x0 - args.fd_step;
            let em = kernel.execute(&probe, &mut [], false, true)?;
            probe.positions[idx][dim] = x0;
            let fd_force = -(ep - em) / (2.0 * args.fd_step);
            max_abs_error = max_abs_error.max((fd_force - forces[idx][dim]).abs());
            max_force = max_force.max(forces[idx][dim].abs());
        }
    }
    Ok(GradientCheck {
        fd_step: args.fd_step,
        n_particles_checked: checked.len(),
        max_abs_error,
        max_force,
    })
}

fn run() -> ForceResult<()> {
    let args = parse_args()?;
    let mut cfg = RmsdPlusConfig::from_path(&args.config)?;
    if let Some(device) = &args.device {
        cfg.device = Some(device.clone());
    }
    if let Some(precision) = args.precision {
        cfg.precision = Some(precision);
    }
    let cfg = cfg.normalized()?;
    let mut kernel = RmsdPlusKernel::from_config(&cfg)?;

    let normal = Normal::new(0.0, args.noise)
        .map_err(|e| ForceError::Parse(format!("invalid --noise: {e}")))?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let positions = cfg
        .reference_positions
        .iter()
        .map(|p| {
            [
                p[0] + normal.sample(&mut rng),
                p[1] + normal.sample(&mut rng),
                p[2] + normal.sample(&mut rng),
            ]
        })
        .collect();
    let mut ctx = ContextState::new(positions);
    if let Some(box_vectors) = cfg.box_vectors {
        ctx = ctx.with_box(box_vectors);
    }

    let mut involved = cfg.alignment_particles.clone();
    for &idx in &cfg.rmsd_particles {
        if !involved.contains(&idx) {
            involved.push(idx);
        }
    }

    let mut forces = vec![[0.0f64; 3]; ctx.positions.len()];
    let timed_forces = time_evaluations(&mut kernel, &ctx, &mut forces, true, &args)?;
    let report = kernel
        .last_report()
        .cloned()
        .ok_or_else(|| ForceError::Parse("no evaluation recorded".into()))?;
    let mut scratch = vec![[0.0f64; 3]; ctx.positions.len()];
    let timed_energy = time_evaluations(&mut kernel, &ctx, &mut scratch, false, &args)?;
    let gradient = gradient_check(&mut kernel, &ctx, &forces, &involved, &args)?;

    println!(
        "energy={:.6e} lambda_max={:.6e} residual={:.6e} degenerate={}",
        report.energy, report.lambda_max, report.alignment_residual, report.degenerate
    );
    println!(
        "energy+forces: evals/s={:.1} sec_mean={:.3e} sec_median={:.3e}",
        timed_forces.evals_per_sec, timed_forces.sec_mean, timed_forces.sec_median
    );
    println!(
        "energy only:   evals/s={:.1} sec_mean={:.3e} sec_median={:.3e}",
        timed_energy.evals_per_sec, timed_energy.sec_mean, timed_energy.sec_median
    );
    println!(
        "gradient check: particles={} max_abs_error={:.3e} max_force={:.3e}",
        gradient.n_particles_checked, gradient.max_abs_error, gradient.max_force
    );

    let precision = cfg.precision.unwrap_or_default();
    let summary = MicroprofileReport {
        config: ConfigInfo {
            config: args.config.display().to_string(),
            noise: args.noise,
            seed: args.seed,
            device: kernel.device().name(),
            backend: kernel.backend_name().unwrap_or("none").to_string(),
            precision: precision.name().to_string(),
            block_size: kernel.block_size(),
            n_alignment: cfg.alignment_particles.len(),
            n_rmsd: cfg.rmsd_particles.len(),
            periodic: cfg.use_periodic,
        },
        energy: report.energy,
        lambda_max: report.lambda_max,
        alignment_residual: report.alignment_residual,
        degenerate: report.degenerate,
        energy_and_forces: timed_forces,
        energy_only: timed_energy,
        gradient,
    };

    if let Some(path) = &args.json_out {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| ForceError::Parse(format!("json serialize error: {e}")))?;
        fs::write(path, json)?;
        println!("wrote json: {}", path.display());
    }

    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
