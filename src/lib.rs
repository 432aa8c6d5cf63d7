// gluecat - command-line surface for the Glue catalog demo stack
//
// Configuration and synthesis live in gluecat-config and gluecat-core; this
// crate wires them to the `synth`, `verify` and `list` subcommands.

mod init;

pub mod commands;

pub use init::init_tracing;
