//! warden — CLI client for the Warden guardian key-custody network.
//!
//! Thin layer only: argument parsing, prompts, and printing. All vault and
//! protocol behaviour lives in `warden-core`. The store and HTTP client are
//! constructed here, once, and passed by reference into every operation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use uuid::Uuid;
use zeroize::Zeroizing;

use warden_core::auth::Authenticator;
use warden_core::envelope;
use warden_core::identity::{self, IdentityKeyPair, PublicKeyBytes};
use warden_core::models::{GuardianKind, GuardianRecord, KeyType, TokenPair, UserRecord};
use warden_core::remote::{self, GuardianService, HttpGuardianService, DEFAULT_TIMEOUT};
use warden_core::sealing;
use warden_core::store::VaultStore;

const DEFAULT_API_URL: &str = "https://api.warden.network";

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Client for the Warden distributed key-custody network", long_about = None)]
struct Cli {
    /// Account email (prompted when omitted)
    #[arg(long, global = true)]
    email: Option<String>,

    /// Guardian service base URL (or WARDEN_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Verbose output, including remote error codes
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user and this device as its owner guardian
    CreateUser {
        /// Display name for the account
        name: String,
    },

    /// Register an additional guardian for the account
    AddGuardian {
        /// Node id of the guardian
        node_id: String,
        /// Display name of the guardian
        name: String,
        /// Guardian type: local, social, cloud, gridlock, or partner
        #[arg(value_parser = parse_guardian_kind)]
        kind: GuardianKind,
        /// base64url X25519 public key of the guardian
        public_key: String,
    },

    /// Create wallets and distribute per-guardian key material
    CreateWallet {
        /// Coin types to create wallets for
        #[arg(required = true)]
        coins: Vec<String>,
    },

    /// Sign a message through the guardian network
    Sign {
        message: String,
        #[arg(long, default_value = "eth")]
        coin_type: String,
    },

    /// Verify a signature through the guardian network
    Verify {
        message: String,
        signature: String,
        #[arg(long, default_value = "eth")]
        coin_type: String,
    },

    /// Log in and cache a session token
    Login,

    /// Discard the cached session token
    Logout,

    /// Recover an account onto this device
    Recover {
        /// Recovery code (prompted when omitted)
        #[arg(long)]
        code: Option<String>,
    },

    /// Transfer the owner role to a different guardian
    TransferOwner {
        /// Node id of the new owner guardian
        node_id: String,
        /// Display name of the new owner guardian
        name: String,
        /// base64url X25519 public key of the new owner
        public_key: String,
    },

    /// Show guardians stored in the local vault
    Guardians,
}

fn parse_guardian_kind(s: &str) -> std::result::Result<GuardianKind, String> {
    match s {
        "local" => Ok(GuardianKind::Local),
        "social" => Ok(GuardianKind::Social),
        "cloud" => Ok(GuardianKind::Cloud),
        "gridlock" => Ok(GuardianKind::Gridlock),
        "partner" => Ok(GuardianKind::Partner),
        // the owner guardian is created by create-user or recover, never added
        "owner" => Err("the owner guardian is managed by create-user and recover".to_string()),
        other => Err(format!(
            "unknown guardian type {other:?} (expected local|social|cloud|gridlock|partner)"
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let store = VaultStore::open_default().context("open vault")?;
    tracing::debug!(root = %store.root().display(), "vault opened");
    let api_url = cli
        .api_url
        .clone()
        .or_else(|| std::env::var("WARDEN_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let service = HttpGuardianService::new(api_url, DEFAULT_TIMEOUT)?;

    match cli.command {
        Commands::CreateUser { name } => {
            let email = resolve_email(&cli.email)?;
            let password = prompt_password("choose a password: ")?;
            create_user(&store, &service, &name, &email, &password).await?;
        }

        Commands::AddGuardian {
            node_id,
            name,
            kind,
            public_key,
        } => {
            let email = resolve_email(&cli.email)?;
            let password = prompt_password("password: ")?;
            // the sealed-delivery key must decode before anything is stored
            PublicKeyBytes::from_b64(&public_key).context("guardian public key")?;
            let guardian = GuardianRecord {
                node_id,
                name,
                kind,
                public_key,
                active: true,
            };
            let tokens = require_login(&store, &service, &email, &password).await?;
            let user = service
                .add_guardian(&email, &guardian, false, &tokens)
                .await?;
            store.save_guardian(&guardian)?;
            store.save_user(&user)?;
            println!(
                "guardian {} added ({} guardians in pool)",
                guardian.node_id,
                user.node_pool.len()
            );
        }

        Commands::CreateWallet { coins } => {
            let email = resolve_email(&cli.email)?;
            let password = prompt_password("password: ")?;
            let tokens = require_login(&store, &service, &email, &password).await?;

            let user = store.load_user(&email)?;
            let sealed_root = store.load_key(&email, KeyType::Signing)?;
            let root = envelope::decrypt_off_thread(sealed_root, password.to_string()).await?;

            let mut pool = Vec::with_capacity(user.node_pool.len());
            for node_id in &user.node_pool {
                pool.push(store.load_guardian(node_id)?);
            }
            let sealed_keys = sealing::seal_node_keys(root.as_slice(), &pool)?;

            let wallets = service
                .create_wallets(&email, &coins, &sealed_keys, &tokens)
                .await?;
            for wallet in wallets {
                println!("{}: {}", wallet.coin_type, wallet.address);
            }
        }

        Commands::Sign { message, coin_type } => {
            let email = resolve_email(&cli.email)?;
            let password = prompt_password("password: ")?;
            let tokens = require_login(&store, &service, &email, &password).await?;
            let receipt = service
                .sign_message(&email, &message, &coin_type, &tokens)
                .await?;
            println!("{}", receipt.signature);
        }

        Commands::Verify {
            message,
            signature,
            coin_type,
        } => {
            let email = resolve_email(&cli.email)?;
            let password = prompt_password("password: ")?;
            let tokens = require_login(&store, &service, &email, &password).await?;
            let valid = service
                .verify_signature(&email, &message, &signature, &coin_type, &tokens)
                .await?;
            println!("{}", if valid { "valid" } else { "INVALID" });
            if !valid {
                std::process::exit(1);
            }
        }

        Commands::Login => {
            let email = resolve_email(&cli.email)?;
            let password = prompt_password("password: ")?;
            require_login(&store, &service, &email, &password).await?;
            println!("logged in as {email}");
        }

        Commands::Logout => {
            let email = resolve_email(&cli.email)?;
            store.delete_tokens(&email)?;
            println!("logged out {email}");
        }

        Commands::Recover { code } => {
            let email = resolve_email(&cli.email)?;
            recover(&store, &service, &email, code).await?;
        }

        Commands::TransferOwner {
            node_id,
            name,
            public_key,
        } => {
            let email = resolve_email(&cli.email)?;
            let password = prompt_password("password: ")?;
            PublicKeyBytes::from_b64(&public_key).context("new owner public key")?;
            let new_owner = GuardianRecord {
                node_id,
                name,
                kind: GuardianKind::Owner,
                public_key,
                active: true,
            };
            let tokens = require_login(&store, &service, &email, &password).await?;
            let user =
                remote::transfer_ownership(&store, &service, &email, &new_owner, &tokens).await?;
            println!("owner role transferred to {}", user.owner_guardian);
        }

        Commands::Guardians => {
            let guardians = store.load_guardians()?;
            if guardians.is_empty() {
                println!("no guardians in the local vault");
            }
            for g in guardians {
                let fingerprint = PublicKeyBytes::from_b64(&g.public_key)
                    .map(|pk| pk.fingerprint())
                    .unwrap_or_else(|_| "<invalid key>".to_string());
                println!(
                    "{} [{}] {} {}\n    {}",
                    g.node_id,
                    g.kind,
                    if g.active { "active" } else { "inactive" },
                    g.name,
                    fingerprint
                );
            }
        }
    }

    Ok(())
}

/// Full account bootstrap: remote registration, local key material, owner
/// guardian, then a first login to prove the chain works.
async fn create_user(
    store: &VaultStore,
    service: &HttpGuardianService,
    name: &str,
    email: &str,
    password: &str,
) -> Result<()> {
    let device_keys = IdentityKeyPair::generate();
    let root_signing_key = identity::generate_signing_key();
    let owner = GuardianRecord {
        node_id: Uuid::new_v4().to_string(),
        name: format!("{name}'s device"),
        kind: GuardianKind::Owner,
        public_key: device_keys.public_b64(),
        active: true,
    };

    service.create_user(name, email).await?;

    store.save_guardian(&owner)?;
    store.save_user(&UserRecord {
        email: email.to_string(),
        name: name.to_string(),
        owner_guardian: owner.node_id.clone(),
        node_pool: vec![owner.node_id.clone()],
    })?;

    let sealed_identity =
        envelope::encrypt_off_thread(device_keys.secret_bytes().to_vec(), password.to_string())
            .await?;
    store.save_key(&owner.node_id, KeyType::Identity, &sealed_identity)?;
    let sealed_root =
        envelope::encrypt_off_thread(root_signing_key.to_vec(), password.to_string()).await?;
    store.save_key(email, KeyType::Signing, &sealed_root)?;

    let tokens = require_login(store, service, email, password).await?;
    let user = service.add_guardian(email, &owner, true, &tokens).await?;
    store.save_user(&user)?;

    let gridlock = remote::sync_gridlock_guardians(store, service).await?;

    println!("user {email} created; owner guardian {}", owner.node_id);
    if !gridlock.is_empty() {
        println!("cached {} gridlock guardians for wallet creation", gridlock.len());
    }
    Ok(())
}

/// Recover an account onto this device: fresh identity and signing keys, a
/// superseding user record, and a replaced owner guardian.
async fn recover(
    store: &VaultStore,
    service: &HttpGuardianService,
    email: &str,
    code: Option<String>,
) -> Result<()> {
    service.start_recovery(email).await?;
    println!("recovery started; a confirmation code was sent to {email}");
    let code = match code {
        Some(code) => code,
        None => prompt_line("recovery code: ")?,
    };

    let device_keys = IdentityKeyPair::generate();
    let root_signing_key = identity::generate_signing_key();
    let user = service
        .confirm_recovery(email, &code, &device_keys.public_b64())
        .await?;

    // last write wins: the recovered record replaces whatever was here
    store.save_user(&user)?;
    store.replace_owner_guardian(&GuardianRecord {
        node_id: user.owner_guardian.clone(),
        name: format!("{} (recovered device)", user.name),
        kind: GuardianKind::Owner,
        public_key: device_keys.public_b64(),
        active: true,
    })?;

    let password = prompt_password("choose a password: ")?;
    let sealed_identity =
        envelope::encrypt_off_thread(device_keys.secret_bytes().to_vec(), password.to_string())
            .await?;
    store.save_key(&user.owner_guardian, KeyType::Identity, &sealed_identity)?;
    let sealed_root =
        envelope::encrypt_off_thread(root_signing_key.to_vec(), password.to_string()).await?;
    store.save_key(email, KeyType::Signing, &sealed_root)?;

    println!("recovery confirmed for {email}");
    Ok(())
}

async fn require_login(
    store: &VaultStore,
    service: &HttpGuardianService,
    email: &str,
    password: &str,
) -> Result<TokenPair> {
    let auth = Authenticator::new(store, service);
    match auth.login(email, password).await? {
        Some(tokens) => Ok(tokens),
        None => bail!("login failed: wrong password or credentials rejected"),
    }
}

fn resolve_email(flag: &Option<String>) -> Result<String> {
    if let Some(email) = flag {
        return Ok(email.clone());
    }
    let email = prompt_line("email: ")?;
    if email.is_empty() {
        bail!("email is required");
    }
    Ok(email)
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    Ok(Zeroizing::new(rpassword::prompt_password(prompt)?))
}
