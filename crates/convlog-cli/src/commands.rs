use std::sync::Arc;

use colored::Colorize;
use tracing::{debug, info};

use convlog_sdk::{
    Account, Conversation, ConversationConfig, ConversationMode, LocalAccount, LogOptions,
    MemberRole, MemoryNetwork, MergeStatus, TargetKind,
};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Demo(args) => cmd_demo(args).await,
        Command::InspectConfig(args) => cmd_inspect_config(args),
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<ConversationConfig> {
    let config = match path {
        Some(path) => ConversationConfig::load(path)?,
        None => ConversationConfig::default(),
    };
    debug!(source = path.unwrap_or("defaults"), ?config, "loaded configuration");
    Ok(config)
}

fn cmd_inspect_config(args: InspectConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let source = args.config.unwrap_or_else(|| "defaults".into());
    println!("# {} {}", "effective configuration from".dimmed(), source.bold());
    print!("{}", config.to_toml_string()?);
    Ok(())
}

async fn cmd_demo(args: DemoArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mode = ConversationMode::from(args.mode);
    info!(%mode, "starting demo");
    let network = MemoryNetwork::new(64);
    let alice = Arc::new(LocalAccount::generate("alice"));
    let bob = Arc::new(LocalAccount::generate("bob"));
    println!("alice {}  device {}", short(&alice.uri()).cyan(), short(&alice.device_id()).dimmed());
    println!("bob   {}  device {}", short(&bob.uri()).cyan(), short(&bob.device_id()).dimmed());

    step("alice creates the conversation");
    let invited = (mode == ConversationMode::OneToOne).then(|| bob.uri());
    let origin = Arc::new(Conversation::create(
        alice.clone(),
        mode,
        invited.as_deref(),
        config.clone(),
    )?);
    println!("  id {} ({})", origin.id().short_hex().yellow(), mode.to_string().bold());
    let initial: Vec<String> = origin.initial_members().iter().map(String::as_str).map(short).collect();
    println!("  initial members: {}", initial.join(", "));
    let _alice_server = Arc::clone(&origin).listen(network.listen(alice.device_id()));

    if mode != ConversationMode::OneToOne {
        step("alice invites bob");
        let id = origin.add_member(&bob.uri())?;
        println!("  {} {}", "commit".dimmed(), id.short_hex().yellow());
    }

    step("bob clones from alice's device");
    let replica = Arc::new(
        Conversation::clone_from_peer(
            bob.clone(),
            &network.as_device(bob.device_id()),
            &alice.device_id(),
            &origin.id(),
            config.clone(),
        )
        .await?,
    );
    println!("  {} validated {} commits", "✓".green(), replica.log(&LogOptions::new())?.len());
    let _bob_server = Arc::clone(&replica).listen(network.listen(bob.device_id()));

    step("bob joins");
    if let Some(id) = replica.join()? {
        println!("  {} {}", "commit".dimmed(), id.short_hex().yellow());
    }

    step("alice fetches from bob");
    let status = origin
        .fetch_and_merge(&network.as_device(alice.device_id()), &bob.device_id())
        .await?;
    println!("  {}", describe(status));
    print_members(&origin)?;

    step("alice votes to ban bob");
    let outcome = origin.vote_kick(&bob.uri(), TargetKind::Members)?;
    if let Some(vote) = outcome.vote {
        println!("  {} {}", "vote".dimmed(), vote.short_hex().yellow());
    }
    match outcome.resolution {
        Some(id) => println!("  {} resolved by {}", "✓".green(), id.short_hex().yellow()),
        None => println!("  {} waiting for more admins", "…".yellow()),
    }
    print_members(&origin)?;
    let devices = origin.devices(false)?;
    println!(
        "  bob's device certificate {}",
        if devices.contains_key(&bob.device_id()) { "present".red() } else { "removed".green() }
    );

    step("bob fetches from alice");
    let status = replica
        .fetch_and_merge(&network.as_device(bob.device_id()), &alice.device_id())
        .await?;
    println!("  {}", describe(status));
    let role = replica
        .role_of(&bob.uri())?
        .map(|r| r.as_str().to_string())
        .unwrap_or_else(|| "none".into());
    println!("  bob's role on bob's device: {}", role.bold());
    Ok(())
}

fn step(title: &str) {
    println!("\n{} {}", "==>".blue().bold(), title.bold());
}

fn short(id: &str) -> String {
    id.chars().take(12).collect()
}

fn describe(status: MergeStatus) -> String {
    match status {
        MergeStatus::UpToDate => "already up to date".dimmed().to_string(),
        MergeStatus::FastForward(id) => format!("fast-forward to {}", id.short_hex().yellow()),
        MergeStatus::Merged(id) => format!("merge commit {}", id.short_hex().yellow()),
    }
}

fn print_members(conv: &Conversation) -> anyhow::Result<()> {
    for member in conv.members()? {
        let role = match member.role {
            MemberRole::Admin => "admin".green(),
            MemberRole::Member => "member".normal(),
            MemberRole::Banned => "banned".red(),
            other => other.as_str().yellow(),
        };
        println!("    {}  {}", short(&member.uri), role);
    }
    Ok(())
}
