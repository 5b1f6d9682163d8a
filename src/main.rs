//! `drivelink` command line shell.
//!
//! # Usage
//!
//! ```text
//! drivelink login --token <TOKEN>      # store an access token in the keychain
//! drivelink list                       # first page of files
//! drivelink upload ./report.pdf        # upload as a new file
//! drivelink download <ID>              # download into the files directory
//! drivelink edit <ID>                  # edit in $EDITOR, then replace
//! drivelink delete <ID>
//! drivelink logout
//! ```
//!
//! `DRIVELINK_TOKEN` takes precedence over the keychain.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use drivelink::collaborators::{
    Authenticator, CommandEditorLauncher, EditorLauncher, EnvAuthenticator,
    KeychainAuthenticator, LocalFileLocator, TracingNotifier, TOKEN_ENV_VAR,
};
use drivelink::config::{download_dir, AppConfig, ConfigStorage, TokenKeychain};
use drivelink::drive::{HttpRemoteStore, TransferEngine};
use drivelink::{ControllerBuilder, ControllerHandle, EditOutcome, RemoteFile};

#[derive(Parser)]
#[command(name = "drivelink", version, about = "Remote drive file manager")]
struct Cli {
    /// Path to config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the first page of remote files.
    List,

    /// Upload a local file as a new remote file.
    Upload {
        path: PathBuf,
    },

    /// Download a remote file into the download directory.
    Download {
        id: String,
    },

    /// Delete a remote file.
    Delete {
        id: String,
    },

    /// Edit a remote file externally and replace it with the result.
    ///
    /// The original is deleted before the edited copy is uploaded. If the
    /// upload fails the file is gone; the working copy stays on disk.
    Edit {
        id: String,

        /// Editor command, overrides config and $EDITOR
        #[arg(short, long)]
        editor: Option<String>,
    },

    /// Store an access token in the system keychain.
    Login {
        /// Read from stdin when omitted
        #[arg(long)]
        token: Option<String>,

        /// Keychain account to sign in as; becomes the default in config.json
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Remove the stored access token.
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    drivelink::init_logging();

    let cli = Cli::parse();
    let storage = match cli.config {
        Some(path) => ConfigStorage::with_path(path),
        None => ConfigStorage::new().context("failed to locate config directory")?,
    };
    let mut config = storage.load().await.context("failed to load config")?;
    debug!("Loaded config from {}", storage.path().display());

    match cli.command {
        Commands::Login { token, account } => {
            if let Some(account) = account {
                storage
                    .switch_account(&mut config, &account)
                    .await
                    .context("failed to save config")?;
            }
            login(&config, token)
        }
        Commands::Logout => {
            TokenKeychain::new()
                .delete_token(&config.account)
                .context("failed to remove token")?;
            println!("Signed out of {}", config.account);
            Ok(())
        }
        Commands::List => {
            let handle = start(&config, None)?;
            let files = handle.refresh().await?;
            print_files(&files);
            Ok(())
        }
        Commands::Upload { path } => {
            let handle = start(&config, None)?;
            let created = handle.upload(LocalFileLocator::new(path)).await?;
            println!("Uploaded {} ({})", created.name, created.id);
            Ok(())
        }
        Commands::Download { id } => {
            let handle = start(&config, None)?;
            let file = find_file(&handle, &id).await?;
            let downloaded = handle.download(file).await?;
            println!(
                "Downloaded {} bytes to {}",
                downloaded.bytes,
                downloaded.local_path.display()
            );
            Ok(())
        }
        Commands::Delete { id } => {
            let handle = start(&config, None)?;
            handle.delete(&id).await?;
            println!("Deleted {}", id);
            Ok(())
        }
        Commands::Edit { id, editor } => {
            let command = editor.or_else(|| config.editor_command.clone());
            let launcher: Arc<dyn EditorLauncher> = match command {
                Some(cmd) => Arc::new(CommandEditorLauncher::new(&cmd)),
                None => Arc::new(CommandEditorLauncher::from_env()),
            };
            let handle = start(&config, Some(launcher))?;
            let file = find_file(&handle, &id).await?;
            match handle.edit(file).await? {
                EditOutcome::Replaced { old_id, new_file } => {
                    println!("Replaced {} with {} ({})", old_id, new_file.id, new_file.name)
                }
                EditOutcome::Cancelled { file_id } => {
                    println!("Edit cancelled, {} unchanged", file_id)
                }
            }
            Ok(())
        }
    }
}

fn login(config: &AppConfig, token: Option<String>) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => {
            eprintln!("Paste access token, then press Enter:");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read token")?;
            line
        }
    };
    let token = token.trim();
    if token.is_empty() {
        bail!("empty token");
    }

    TokenKeychain::new()
        .store_token(&config.account, token)
        .context("failed to store token")?;
    println!("Signed in as {}", config.account);
    Ok(())
}

fn authenticator(config: &AppConfig) -> Arc<dyn Authenticator> {
    let env = EnvAuthenticator::new();
    if env.current_credential().is_some() {
        debug!("Using token from {}", TOKEN_ENV_VAR);
        return Arc::new(env);
    }
    Arc::new(KeychainAuthenticator::new(
        TokenKeychain::new(),
        config.account.clone(),
    ))
}

fn start(config: &AppConfig, editor: Option<Arc<dyn EditorLauncher>>) -> Result<ControllerHandle> {
    let auth = authenticator(config);
    let store = HttpRemoteStore::new(config.endpoints.clone(), auth.clone());
    let engine = TransferEngine::new(download_dir(config)?)
        .with_chunk_size(config.chunk_size);

    let mut builder = ControllerBuilder::new(Arc::new(store), auth, engine)
        .notifier(Arc::new(TracingNotifier))
        .list_query(config.list_query());
    if let Some(editor) = editor {
        builder = builder.editor(editor);
    }

    builder.spawn().with_context(|| {
        format!(
            "not signed in: run `drivelink login` or set {}",
            TOKEN_ENV_VAR
        )
    })
}

/// Look `id` up in a fresh listing so name and type are known
async fn find_file(handle: &ControllerHandle, id: &str) -> Result<RemoteFile> {
    let files = handle.refresh().await?;
    match files.into_iter().find(|f| f.id == id) {
        Some(file) => Ok(file),
        None => bail!("no file with id {} on the first page", id),
    }
}

fn print_files(files: &[RemoteFile]) {
    if files.is_empty() {
        println!("No files");
        return;
    }
    for file in files {
        println!(
            "{:<36}  {:<32}  {}",
            file.id,
            file.effective_mime_type(),
            file.name
        );
    }
}
