//! Human-readable dumps of the setup tables.
//!
//! Nothing here is part of the exchange contract. Each writer takes any
//! [`Write`] so the output can go to a file, a buffer, or the log.

use std::io::Write;

use crate::algs::passes::{Pass, PassTable, SurfacePassTable, VolumePassTable};
use crate::halo_error::HaloError;
use crate::topology::boundary::{BoundaryTable, Face};
use crate::topology::processor_grid::{LocationMap, Topology};

/// One line per grid location: `cap x y z -> rank`.
pub fn write_location_map<W: Write>(mut writer: W, map: &LocationMap) -> Result<(), HaloError> {
    let g = map.grid();
    writeln!(
        writer,
        "LOCATION MAP caps={} nprocx={} nprocy={} nprocz={}",
        g.caps, g.nprocx, g.nprocy, g.nprocz
    )?;
    for (loc, rank) in map.iter() {
        writeln!(writer, "{} {} {} {} -> {}", loc.cap, loc.x, loc.y, loc.z, rank)?;
    }
    Ok(())
}

/// Location of the calling rank and both sub-communicator member lists.
pub fn write_groups<W: Write>(mut writer: W, topo: &Topology) -> Result<(), HaloError> {
    let loc = topo.location();
    writeln!(
        writer,
        "RANK {} cap={} x={} y={} z={}",
        topo.me(),
        loc.cap,
        loc.x,
        loc.y,
        loc.z
    )?;
    writeln!(writer, "HORIZONTAL {:?}", topo.horizontal_members())?;
    writeln!(writer, "VERTICAL {:?}", topo.vertical_members())?;
    Ok(())
}

/// Face node lists of every level and cap.
pub fn write_boundaries<W: Write>(mut writer: W, bounds: &BoundaryTable) -> Result<(), HaloError> {
    for lev in bounds.levmin()..=bounds.levmax() {
        for (cap, set) in bounds.level(lev)?.iter().enumerate() {
            for face in Face::ALL {
                let nodes = set.face(face);
                write!(writer, "BOUND lev={lev} cap={cap} face={} n={}:", face.id(), nodes.len())?;
                for n in nodes {
                    write!(writer, " {n}")?;
                }
                writeln!(writer)?;
            }
        }
    }
    Ok(())
}

/// Duplicate-owned nodes of every level and cap.
pub fn write_skip_nodes<W: Write>(mut writer: W, bounds: &BoundaryTable) -> Result<(), HaloError> {
    for lev in bounds.levmin()..=bounds.levmax() {
        for (cap, set) in bounds.level(lev)?.iter().enumerate() {
            write!(writer, "SKIP lev={lev} cap={cap}:")?;
            for n in set.skip_nodes() {
                write!(writer, " {n}")?;
            }
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn write_pass_table<W: Write, P: Pass>(
    writer: &mut W,
    label: &str,
    table: &PassTable<P>,
) -> Result<(), HaloError> {
    for lev in table.levmin()..=table.levmax() {
        for (cap, passes) in table.level(lev)?.iter().enumerate() {
            writeln!(
                writer,
                "{label} lev={lev} cap={cap} total={} per_face={:?}",
                passes.len(),
                passes.bound_passes
            )?;
            for p in &passes.passes {
                write!(
                    writer,
                    "  pass {} face={} neighbor={} n={}:",
                    p.seq(),
                    p.face().id(),
                    p.neighbor(),
                    p.nodes().len()
                )?;
                for n in p.nodes() {
                    write!(writer, " {n}")?;
                }
                writeln!(writer)?;
            }
        }
    }
    Ok(())
}

/// Volume then surface pass tables.
pub fn write_passes<W: Write>(
    mut writer: W,
    volume: &VolumePassTable,
    surface: &SurfacePassTable,
) -> Result<(), HaloError> {
    write_pass_table(&mut writer, "PASS", volume)?;
    write_pass_table(&mut writer, "SPASS", surface)
}
