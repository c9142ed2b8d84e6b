//! Library side of the `spatialcv` binary: config loading and the three
//! pipeline entry points used by the subcommands.
pub mod pipeline;
