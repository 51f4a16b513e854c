// Sets up the parallel layer from a JSON config, sums a unit field across
// every rank on each multigrid level, and reports the largest value seen.
// Run with e.g. `mpirun -n 4 cargo run --example halo_exchange --features mpi-support -- grid.json`.
// Without a path, a 2x2x1 grid is assumed.
use sphere_halo::algs::communicator::{Communicator, MpiComm};
use sphere_halo::algs::passes::InterleavedEquations;
use sphere_halo::config::HaloConfig;
use sphere_halo::halo_error::HaloError;
use sphere_halo::parallel::run;

const DEFAULT_CONFIG: &str = r#"{
    "nprocx": 2, "nprocy": 2, "nprocz": 1,
    "elx": 8, "ely": 8, "elz": 4,
    "levmin": 0, "levmax": 2,
    "verbose": false
}"#;

fn load_config() -> Result<HaloConfig, Box<dyn std::error::Error>> {
    let text = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_CONFIG.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn main() {
    let world = match MpiComm::new() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_status());
        }
    };
    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("rank {}: bad config: {e}", world.rank());
            world.abort(sphere_halo::halo_error::FATAL_CONFIG_EXIT);
        }
    };
    let eqs = InterleavedEquations::new(config.nsd);

    let status = run(world, config, &eqs, |ctx| {
        let start = ctx.wtime();
        let d = ctx.decomposition();
        for lev in (d.levmin()..=d.levmax()).rev() {
            let mesh = d.level(lev)?;
            let mut field = vec![vec![1.0f64; mesh.nno]];
            ctx.exchange_node_d(lev, &mut field)?;
            let max = field[0].iter().copied().fold(0.0, f64::max);
            if max > 8.0 {
                return Err(HaloError::InvariantViolation(format!(
                    "level {lev}: node shared by {max} ranks"
                )));
            }
            println!("rank {} level {lev}: max copies {max}", ctx.topology().me());
        }
        ctx.sync();
        if ctx.topology().me() == 0 {
            println!("exchange done in {:.3} ms", 1e3 * (ctx.wtime() - start));
        }
        Ok(())
    });
    std::process::exit(status);
}
