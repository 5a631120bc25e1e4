//! CLI command definitions and argument parsing

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde::Serialize;
use zeroize::Zeroizing;

use pmid_core::{
    FileStore, IdentityError, IdentitySession, IncomingEvent, InMemoryStore, LocalBus,
    LocalWallet, MemoryBlobStore, MessageBody, Messenger, PeerDirectory, PmidConfig,
    StaticSession, Store, TempIdentityManager, Transport, WalletSigner,
};
use pmid_crypto::hash::fingerprint;
use pmid_proto::decode_frame;

use crate::output::{EnvelopeSummary, IdentityInfo, OutputFormat, OutputFormatter};
use crate::ExitCode;

/// PMID - identity layer for end-to-end encrypted messaging
#[derive(Parser, Debug)]
#[command(name = "pmid")]
#[command(version, about = "PMID identity and envelope tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Identity store directory (overrides config and PMID_STORE_ROOT)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage temp identities in the local store
    Identity(IdentityArgs),
    /// Decode a hex-encoded wire frame
    Inspect(InspectArgs),
    /// Show or initialise the configuration
    Config(ConfigArgs),
    /// Run a two-party exchange with a mid-session wallet rotation
    Demo,
}

impl Cli {
    /// Execute with a resolved configuration. CLI flags take precedence.
    pub async fn execute_with_config(self, mut config: PmidConfig) -> anyhow::Result<ExitCode> {
        if let Some(store) = self.store {
            config.store.root = Some(store);
        }
        tracing::debug!(?config, "resolved configuration");
        let out = OutputFormatter::new(self.output, self.verbose);

        match self.command {
            Commands::Identity(args) => args.execute(&out, &config).await,
            Commands::Inspect(args) => args.execute(&out),
            Commands::Config(args) => args.execute(&out, &config, self.config),
            Commands::Demo => run_demo(&out, &config).await,
        }
    }
}

#[derive(Parser, Debug)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub command: IdentityCommand,
}

#[derive(Subcommand, Debug)]
pub enum IdentityCommand {
    /// Generate and store a new temp identity
    Generate {
        #[arg(long)]
        user: String,
        /// Session secret that unlocks the identity
        #[arg(long, env = "PMID_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Unlock and show a stored identity
    Show {
        #[arg(long)]
        user: String,
        #[arg(long, env = "PMID_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Irreversibly delete an identity
    Remove {
        #[arg(long)]
        user: String,
    },
    /// Mark an identity inactive, keeping the record until purge
    Retire {
        #[arg(long)]
        user: String,
    },
    /// Delete all inactive records
    Purge,
}

#[derive(Serialize)]
struct RemovedOutput<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
struct CountOutput {
    count: usize,
}

impl IdentityArgs {
    pub async fn execute(self, out: &OutputFormatter, config: &PmidConfig) -> anyhow::Result<ExitCode> {
        let root = config.store_root()?;
        out.info(&format!("store: {}", root.display()));
        let store: Arc<dyn Store> = Arc::new(FileStore::new(root));
        let manager = TempIdentityManager::new(store.clone(), config.kdf_params());

        match self.command {
            IdentityCommand::Generate { user, secret } => {
                let secret = Zeroizing::new(secret.into_bytes());
                match manager.generate(&user, &secret).await {
                    Ok(identity) => {
                        let info = identity_info(&store, &user, &identity.public_key()).await?;
                        out.success("Generated temp identity");
                        println!("{}", out.format_identity(&info, "identity generate"));
                        Ok(ExitCode::Success)
                    }
                    Err(e @ IdentityError::AlreadyExists(_)) => {
                        out.error(&e.to_string());
                        Ok(ExitCode::InvalidInput)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            IdentityCommand::Show { user, secret } => {
                let secret = Zeroizing::new(secret.into_bytes());
                match manager.load(&user, &secret).await {
                    Ok(Some(identity)) => {
                        let info = identity_info(&store, &user, &identity.public_key()).await?;
                        println!("{}", out.format_identity(&info, "identity show"));
                        Ok(ExitCode::Success)
                    }
                    Ok(None) => {
                        out.error(&format!("No active identity for {user}"));
                        Ok(ExitCode::NotFound)
                    }
                    Err(e) if e.is_decryption() => {
                        out.error("Wrong secret or corrupted identity record");
                        Ok(ExitCode::AuthenticationFailed)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            IdentityCommand::Remove { user } => {
                manager.remove(&user).await?;
                out.success(&format!("Removed identity for {user}"));
                print_json(out, &RemovedOutput { user_id: &user }, "identity remove");
                Ok(ExitCode::Success)
            }
            IdentityCommand::Retire { user } => {
                if !manager.retire(&user).await? {
                    out.error(&format!("No active identity for {user}"));
                    return Ok(ExitCode::NotFound);
                }
                out.success(&format!("Retired identity for {user}"));
                print_json(out, &RemovedOutput { user_id: &user }, "identity retire");
                Ok(ExitCode::Success)
            }
            IdentityCommand::Purge => {
                let count = store.purge_inactive().await?;
                out.success(&format!("Purged {count} inactive record(s)"));
                print_json(out, &CountOutput { count }, "identity purge");
                Ok(ExitCode::Success)
            }
        }
    }
}

async fn identity_info(
    store: &Arc<dyn Store>,
    user_id: &str,
    public_key: &pmid_crypto::PublicKey,
) -> anyhow::Result<IdentityInfo> {
    let record = store
        .get(user_id)
        .await?
        .with_context(|| format!("record for {user_id} vanished"))?;
    let bytes = public_key.to_bytes();
    Ok(IdentityInfo {
        user_id: user_id.to_string(),
        wallet_type: "temp".to_string(),
        public_key: hex::encode(bytes),
        fingerprint: hex::encode(fingerprint(&bytes)),
        created_at: record.created_at,
        active: record.is_active,
    })
}

fn print_json<T: Serialize>(out: &OutputFormatter, data: &T, command: &str) {
    let rendered = out.format_success(data, command);
    if !rendered.is_empty() {
        println!("{rendered}");
    }
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Hex-encoded frame
    pub frame: String,
}

impl InspectArgs {
    pub fn execute(self, out: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let bytes = match hex::decode(self.frame.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                out.error(&format!("Frame is not valid hex: {e}"));
                return Ok(ExitCode::InvalidInput);
            }
        };
        match decode_frame(&bytes) {
            Ok(envelope) => {
                println!("{}", out.format_envelope(&EnvelopeSummary::from(&envelope)));
                Ok(ExitCode::Success)
            }
            Err(e) => {
                out.error(&e.to_string());
                Ok(ExitCode::InvalidInput)
            }
        }
    }
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigArgs {
    pub fn execute(
        self,
        out: &OutputFormatter,
        config: &PmidConfig,
        path: Option<PathBuf>,
    ) -> anyhow::Result<ExitCode> {
        match self.command {
            ConfigCommand::Show => {
                match out.format() {
                    OutputFormat::Json => print_json(out, config, "config show"),
                    OutputFormat::Table => print!("{}", toml::to_string_pretty(config)?),
                    OutputFormat::Quiet => {}
                }
                Ok(ExitCode::Success)
            }
            ConfigCommand::Init { force } => {
                let path = path
                    .or_else(PmidConfig::default_path)
                    .context("no config path given and no platform config directory")?;
                if path.exists() && !force {
                    out.error(&format!("{} exists; pass --force to overwrite", path.display()));
                    return Ok(ExitCode::InvalidInput);
                }
                PmidConfig::default().save(&path)?;
                out.success(&format!("Wrote {}", path.display()));
                Ok(ExitCode::Success)
            }
        }
    }
}

/// Alice starts on a temp identity, messages Bob, connects a wallet and
/// rotates; Bob follows the rotation and keeps talking to her.
async fn run_demo(out: &OutputFormatter, config: &PmidConfig) -> anyhow::Result<ExitCode> {
    let bus = Arc::new(LocalBus::default());
    let blobs = Arc::new(MemoryBlobStore::new());
    let topics = config.topics();
    let new_messenger = || {
        Messenger::new(
            bus.clone(),
            blobs.clone(),
            Arc::new(PeerDirectory::new()),
            topics.clone(),
        )
    };
    let (alice_m, bob_m) = (new_messenger(), new_messenger());

    let params = config.kdf_params();
    let mut alice = IdentitySession::login(
        "alice",
        InMemoryStore::new_shared(),
        params,
        &StaticSession::new("alice-session"),
    )
    .await?;
    let bob = IdentitySession::login(
        "bob",
        InMemoryStore::new_shared(),
        params,
        &StaticSession::new("bob-session"),
    )
    .await?;
    out.success("alice and bob logged in with temp identities");

    let mut identity_rx = bus.subscribe(&topics.identity_topic).await?;
    let mut alice_inbox = bus.subscribe(&topics.inbox("alice")).await?;
    let mut bob_inbox = bus.subscribe(&topics.inbox("bob")).await?;

    alice_m.announce(&alice).await?;
    bob_m.announce(&bob).await?;
    for _ in 0..2 {
        let frame = identity_rx.recv().await?;
        alice_m.handle_incoming(&alice, &frame).await?;
        bob_m.handle_incoming(&bob, &frame).await?;
    }
    out.success("handshakes exchanged");

    alice_m
        .send_chat(&alice, "bob", b"hi bob, temp key here", "text/plain", None, None)
        .await?;
    report_chat(out, &bob_m.handle_incoming(&bob, &bob_inbox.recv().await?).await?);

    let wallet: Arc<dyn WalletSigner> = Arc::new(LocalWallet::generate("0xa11ce"));
    let rotation = alice
        .wallet_changed(Some(wallet))
        .await?
        .context("wallet connect did not propose a rotation")?;
    out.info(&format!("rotation proposed, sequence {}", rotation.sequence_number));
    let outcome = alice_m.broadcast_rotation(&mut alice, &rotation).await?;
    out.success(&format!("alice rotation outcome: {outcome:?}"));

    if let IncomingEvent::PeerRotated { sequence, .. } =
        bob_m.handle_incoming(&bob, &identity_rx.recv().await?).await?
    {
        out.success(&format!("bob accepted alice's rotation (sequence {sequence})"));
    }

    bob_m
        .send_chat(
            &bob,
            "alice",
            b"got your new key",
            "text/plain",
            Some(pmid_core::OutgoingAttachment {
                file_name: "note.txt".into(),
                mime_type: "text/plain".into(),
                data: Bytes::from_static(b"attached"),
            }),
            None,
        )
        .await?;
    report_chat(out, &alice_m.handle_incoming(&alice, &alice_inbox.recv().await?).await?);

    alice.logout();
    bob.logout();
    Ok(ExitCode::Success)
}

fn report_chat(out: &OutputFormatter, event: &IncomingEvent) {
    if let IncomingEvent::Chat(msg) = event {
        match &msg.body {
            MessageBody::Plaintext(text) => out.success(&format!(
                "{} -> {}{}",
                msg.sender_user_id,
                String::from_utf8_lossy(text),
                msg.attachment
                    .as_ref()
                    .map(|a| format!(" [{}]", a.file_name))
                    .unwrap_or_default()
            )),
            MessageBody::Undecryptable => out.error(&format!("undecryptable message from {}", msg.sender_user_id)),
        }
    }
}
