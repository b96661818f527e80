//! Topology walker: drives the packer over every triangle corner of an evaluated mesh.

pub mod batch;
pub mod walker;
