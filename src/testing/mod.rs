//! Test/demo provider fixtures (spec §10.4). Not maintained product surface.

pub mod mem_provider;
