#![cfg(feature = "mpi-support")]

use serial_test::serial;
use sphere_halo::algs::communicator::{Communicator, MpiComm};
use sphere_halo::algs::passes::InterleavedEquations;
use sphere_halo::config::HaloConfig;
use sphere_halo::parallel::run;

// MPI can be initialized once per process
#[test]
#[serial]
fn single_process_run_succeeds() {
    let world = MpiComm::new().unwrap();
    let size = world.size();
    let cfg: HaloConfig = serde_json::from_str(&format!(
        r#"{{ "nprocx": {size}, "nprocy": 1, "nprocz": 1, "elx": {}, "ely": 2, "elz": 2, "levmax": 1 }}"#,
        2 * size
    ))
    .unwrap();
    let status = run(world, cfg, &InterleavedEquations::new(3), |ctx| {
        let mesh = *ctx.decomposition().finest();
        let mut f = vec![vec![1.0; mesh.nno]];
        ctx.exchange_node_d(1, &mut f)?;
        ctx.sync();
        Ok(())
    });
    assert_eq!(status, 0);
}
