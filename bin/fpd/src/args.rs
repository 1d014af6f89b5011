use std::path::PathBuf;

use argh::FromArgs;

/// Finality provider daemon.
#[derive(FromArgs, PartialEq, Debug)]
pub struct TopLevel {
    /// path to configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub cmd: Command,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum Command {
    CreateKey(CreateKeyArgs),
    Register(RegisterArgs),
    Start(StartArgs),
}

/// Create a new EOTS key.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "create-key")]
pub struct CreateKeyArgs {
    /// name for the key
    #[argh(option)]
    pub name: String,

    /// passphrase sealing the key at rest
    #[argh(option)]
    pub passphrase: String,

    /// bip-32 derivation path
    #[argh(option)]
    pub hd_path: Option<String>,
}

/// Register a finality provider for an existing key.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "register")]
pub struct RegisterArgs {
    /// x-only BTC public key of the EOTS key, hex
    #[argh(option)]
    pub btc_pk: String,

    /// control plane account address
    #[argh(option)]
    pub addr: String,

    /// consumer chain id to provide finality for
    #[argh(option)]
    pub chain_id: String,

    /// commission in basis points
    #[argh(option, default = "0")]
    pub commission_bps: u16,

    /// provider description
    #[argh(option, default = "String::new()")]
    pub description: String,
}

/// Run the daemon for all registered providers.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "start")]
pub struct StartArgs {
    /// passphrase unlocking the provider keys
    #[argh(option)]
    pub passphrase: String,
}
