//! Conciliar Client
//!
//! Command line front end for signing in to the Conciliar back office and
//! administering user accounts.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use dialoguer::Password;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use conciliar_client::config::{self, ClientConfig};
use conciliar_client::{
    account, Access, AdminService, DirectoryLoader, HttpApi, LoadOutcome, SessionStore,
};
use conciliar_common::{
    Credentials, NewUser, PasswordChange, Role, RoleFilter, SqliteTokenStore, TokenStore, User,
    UserUpdate,
};

#[derive(Parser)]
#[command(name = "conciliar")]
#[command(about = "Conciliar Client - user administration for the Conciliar back office")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the API, e.g. https://conciliar.example/api
    #[arg(short, long, global = true)]
    api: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the session token
    Login {
        email: String,

        #[arg(short, long)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Administer user accounts (admin only)
    Users {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Change your own password
    ChangePassword,

    /// Activate an account from its e-mail token
    Activate {
        token: String,
    },

    GenerateConfig {
        #[arg(short, long, default_value = "client.toml")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    List {
        /// todos, conciliador, tercero or admin
        #[arg(short, long, default_value = "todos")]
        role: String,

        #[arg(short, long)]
        search: Option<String>,

        /// Number of pages to fetch
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },

    Show {
        id: String,
    },

    Create {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        cedula: String,

        #[arg(long)]
        phone: String,

        #[arg(long, default_value = "tercero")]
        role: String,

        /// SICAAC number, required for conciliadores
        #[arg(long)]
        sicac: Option<String>,
    },

    Update {
        id: String,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        cedula: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        sicac: Option<String>,
    },

    Activate {
        id: String,
    },

    Deactivate {
        id: String,
    },

    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    SetPassword {
        id: String,
    },

    UploadPicture {
        id: String,
        file: PathBuf,
    },

    DeletePicture {
        id: String,
    },
}

/// Everything a command needs to talk to the API.
struct ClientContext {
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
    api: Arc<HttpApi>,
}

impl ClientContext {
    fn open(config: ClientConfig) -> Result<Self> {
        let tokens: Arc<dyn TokenStore> = Arc::new(
            SqliteTokenStore::open(&config.storage.database_path)
                .with_context(|| format!("Failed to open {:?}", config.storage.database_path))?,
        );
        let api = Arc::new(HttpApi::new(&config.api, tokens.clone())?);
        Ok(Self { config, tokens, api })
    }

    fn session(&self) -> SessionStore<Arc<HttpApi>> {
        SessionStore::new(self.api.clone(), self.tokens.clone())
    }

    /// Restores the stored session and checks the role.
    async fn require(&self, allowed: &[Role]) -> Result<SessionStore<Arc<HttpApi>>> {
        let session = self.session();
        if session.token().is_none() {
            bail!("Not logged in. Run `conciliar login <email>` first.");
        }
        session
            .load_current_user()
            .await
            .context("Session could not be restored, please log in again")?;

        match session.authorize(allowed) {
            Access::Granted => Ok(session),
            Access::LoginRequired => bail!("Not logged in"),
            Access::Forbidden => bail!("This action requires one of the roles: {:?}", allowed),
        }
    }

    fn admin(&self) -> AdminService<Arc<HttpApi>, Arc<HttpApi>> {
        AdminService::new(self.api.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(ClientConfig::default_path);
    let mut config = if config_path.exists() {
        ClientConfig::load(&config_path)?
    } else {
        ClientConfig::default()
    };

    if let Some(api) = cli.api {
        config.api.base_url = api;
    }

    let command = match cli.command {
        Commands::GenerateConfig { output } => return generate_config(&output),
        command => command,
    };

    debug!("Using API at {}", config.api.base_url);
    let ctx = ClientContext::open(config)?;

    match command {
        Commands::Login { email, password } => run_login(&ctx, email, password).await,
        Commands::Logout => run_logout(&ctx).await,
        Commands::Whoami => run_whoami(&ctx).await,
        Commands::Users { action } => run_users(&ctx, action).await,
        Commands::ChangePassword => run_change_password(&ctx).await,
        Commands::Activate { token } => run_activate(&ctx, &token).await,
        Commands::GenerateConfig { .. } => Ok(()),
    }
}

async fn run_login(ctx: &ClientContext, email: String, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt_secret("Password")?,
    };

    let session = ctx.session();
    let user = session.authenticate(&Credentials::new(email, password)).await?;
    println!("Logged in as {} <{}> ({})", user.full_name(), user.email, user.role);
    Ok(())
}

async fn run_logout(ctx: &ClientContext) -> Result<()> {
    ctx.session().end_session().await;
    println!("Logged out");
    Ok(())
}

async fn run_whoami(ctx: &ClientContext) -> Result<()> {
    let session = ctx.require(&[]).await?;
    if let Some(user) = session.current_user() {
        print_user(&user);
    }
    Ok(())
}

async fn run_users(ctx: &ClientContext, action: UserCommands) -> Result<()> {
    ctx.require(&[Role::Admin]).await?;
    let admin = ctx.admin();

    match action {
        UserCommands::List { role, search, pages } => {
            let filter: RoleFilter = role.parse().map_err(anyhow::Error::msg)?;
            run_list(ctx, filter, search, pages).await?;
        }
        UserCommands::Show { id } => {
            print_user(&admin.get_user(&id).await?);
        }
        UserCommands::Create { first_name, last_name, email, cedula, phone, role, sicac } => {
            let role: Role = role.parse().map_err(anyhow::Error::msg)?;
            let password = prompt_secret("Initial password")?;
            let new_user = NewUser {
                first_name,
                last_name,
                email,
                cedula,
                phone_number: phone,
                password,
                role,
                numero_sicac: sicac,
            };
            let created = admin.create_user(&new_user).await?;
            println!("Created {} {} ({}). An activation e-mail was sent.", created.role, created.full_name(), created.id);
        }
        UserCommands::Update { id, first_name, last_name, email, cedula, phone, role, sicac } => {
            let role = role
                .map(|r| r.parse::<Role>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let update = UserUpdate {
                first_name,
                last_name,
                email,
                cedula,
                phone_number: phone,
                role,
                is_active: None,
                numero_sicac: sicac.map(Some),
            };
            if update.is_empty() {
                bail!("Nothing to update");
            }
            let current = admin.get_user(&id).await?;
            let updated = admin.update_user(&id, update, Some(current.role)).await?;
            println!("Updated {}", updated.full_name());
        }
        UserCommands::Activate { id } => {
            let user = admin.set_active(&id, true).await?;
            println!("Activated {}", user.full_name());
        }
        UserCommands::Deactivate { id } => {
            let user = admin.set_active(&id, false).await?;
            println!("Deactivated {}", user.full_name());
        }
        UserCommands::Delete { id, yes } => {
            if !yes {
                let user = admin.get_user(&id).await?;
                let answer = prompt(&format!("Delete {} <{}>? This cannot be undone [y/N]: ", user.full_name(), user.email))?;
                if !matches!(answer.to_lowercase().as_str(), "y" | "yes" | "s" | "si") {
                    println!("Cancelled");
                    return Ok(());
                }
            }
            admin.delete_user(&id).await?;
            println!("Deleted {}", id);
        }
        UserCommands::SetPassword { id } => {
            let password = prompt_secret("New password")?;
            let confirm = prompt_secret("Confirm password")?;
            admin.reset_password(&id, &password, &confirm).await?;
            println!("Password updated");
        }
        UserCommands::UploadPicture { id, file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "picture".to_string());
            let user = admin.upload_profile_picture(&id, &file_name, Bytes::from(bytes)).await?;
            println!("Picture updated: {}", user.profile_picture.unwrap_or_default());
        }
        UserCommands::DeletePicture { id } => {
            admin.delete_profile_picture(&id).await?;
            println!("Picture removed");
        }
    }

    Ok(())
}

async fn run_list(ctx: &ClientContext, filter: RoleFilter, search: Option<String>, pages: u32) -> Result<()> {
    let directory = DirectoryLoader::new(ctx.api.clone(), &ctx.config.directory).with_filter(filter);

    let mut outcome = match search.filter(|s| !s.trim().is_empty()) {
        Some(term) => directory.apply_search_term(term).await?,
        None => directory.load_next_page().await?,
    };

    let mut fetched = 1;
    while fetched < pages {
        if let LoadOutcome::Loaded { has_more: false, .. } | LoadOutcome::Skipped = outcome {
            break;
        }
        outcome = directory.load_next_page().await?;
        fetched += 1;
    }

    let state = directory.snapshot();
    println!("{:<26} {:<30} {:<32} {:<12} {}", "ID", "NAME", "EMAIL", "ROLE", "ACTIVE");
    for user in &state.items {
        println!(
            "{:<26} {:<30} {:<32} {:<12} {}",
            user.id,
            user.full_name(),
            user.email,
            user.role.as_str(),
            if user.is_active { "yes" } else { "no" },
        );
    }
    println!();
    println!(
        "{} users, page {}{}",
        state.items.len(),
        state.page,
        if state.has_more { " (more available, use --pages)" } else { "" }
    );
    info!("Listed {} users", state.items.len());
    Ok(())
}

async fn run_change_password(ctx: &ClientContext) -> Result<()> {
    ctx.require(&[]).await?;
    let change = PasswordChange {
        current_password: prompt_secret("Current password")?,
        new_password: prompt_secret("New password")?,
        confirm_new_password: prompt_secret("Confirm new password")?,
    };
    account::change_password(ctx.api.as_ref(), &change).await?;
    println!("Password changed");
    Ok(())
}

async fn run_activate(ctx: &ClientContext, token: &str) -> Result<()> {
    match account::activate_account(ctx.api.as_ref(), token).await? {
        Some(user) => println!("Account {} activated", user.email),
        None => println!("Account activated"),
    }
    Ok(())
}

fn print_user(user: &User) {
    println!("{}", user.full_name());
    println!("  ID:        {}", user.id);
    println!("  Email:     {}", user.email);
    println!("  Role:      {}", user.role);
    println!("  Active:    {}", if user.is_active { "yes" } else { "no" });
    if let Some(cedula) = &user.cedula {
        println!("  Cedula:    {}", cedula);
    }
    if let Some(phone) = &user.phone_number {
        println!("  Phone:     {}", phone);
    }
    if let Some(sicac) = &user.numero_sicac {
        println!("  SICAAC:    {}", sicac);
    }
    if let Some(picture) = &user.profile_picture {
        println!("  Picture:   {}", picture);
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Reads a secret without echoing it to the terminal.
fn prompt_secret(label: &str) -> Result<String> {
    let secret = Password::new()
        .with_prompt(label)
        .allow_empty_password(true)
        .interact()?;
    Ok(secret)
}

fn generate_config(output: &PathBuf) -> Result<()> {
    let config_content = config::generate_example_config();
    std::fs::write(output, config_content)?;
    println!("Generated example config: {:?}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_password_is_optional() {
        let cli = Cli::try_parse_from(["conciliar", "login", "ana@example.com"]).unwrap();
        match cli.command {
            Commands::Login { email, password } => {
                assert_eq!(email, "ana@example.com");
                assert!(password.is_none());
            }
            _ => panic!("expected login"),
        }
    }

    #[test]
    fn test_password_commands_take_no_secret_arguments() {
        assert!(Cli::try_parse_from(["conciliar", "users", "set-password", "u1"]).is_ok());
        assert!(Cli::try_parse_from(["conciliar", "users", "set-password", "u1", "--password", "x"]).is_err());
        assert!(Cli::try_parse_from(["conciliar", "change-password", "--new-password", "x"]).is_err());
    }
}
