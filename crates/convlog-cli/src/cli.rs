use clap::{Args, Parser, Subcommand};

use convlog_types::ConversationMode;

#[derive(Parser)]
#[command(
    name = "convlog",
    about = "convlog: permissioned, replicated conversation logs",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run two in-process peers through invite, join and ban
    Demo(DemoArgs),
    /// Print the effective conversation configuration
    InspectConfig(InspectConfigArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    OneToOne,
    AdminInvitesOnly,
    InvitesOnly,
    Public,
}

impl From<ModeArg> for ConversationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::OneToOne => Self::OneToOne,
            ModeArg::AdminInvitesOnly => Self::AdminInvitesOnly,
            ModeArg::InvitesOnly => Self::InvitesOnly,
            ModeArg::Public => Self::Public,
        }
    }
}

#[derive(Args)]
pub struct DemoArgs {
    #[arg(long, value_enum, default_value = "one-to-one")]
    pub mode: ModeArg,
    /// Configuration file applied to both peers
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Args)]
pub struct InspectConfigArgs {
    #[arg(long)]
    pub config: Option<String>,
}
