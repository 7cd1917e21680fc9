//! Command modules for CLI

pub mod keys;
pub mod serve;

use clap::Subcommand;

#[derive(Debug, Subcommand)]
#[command(about = "pack-registry commands")]
pub enum Commands {
    /// Import owner keys, open the store and serve the registry API
    #[command(about = "Run the registry HTTP server")]
    Serve(serve::ServeArgs),

    /// Validate the key directory and list the identities it holds
    #[command(about = "Check owner public keys without starting the server")]
    Keys(keys::KeysArgs),
}
