// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands};
use clinic_core::models::Session;
use clinic_core::permissions::get_permissions_for_role;
use clinic_portal::{
    FileStorage, ListenerId, PortalConfig, PortalError, RefreshScheduler, RemoteVerifier,
    SessionEvent, SessionStore,
};
use tokio::sync::Notify;

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let args = Cli::parse();

    let mut config = PortalConfig::from_env();
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if let Some(dir) = args.session_dir {
        config.session_dir = dir;
    }

    match args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::Role { role } => {
            for permission in get_permissions_for_role(&role)? {
                println!("{permission}");
            }
        }
        command => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(session_command(&config, command))?;
        }
    }

    Ok(())
}

async fn session_command(config: &PortalConfig, command: Commands) -> Result<()> {
    let verifier = RemoteVerifier::new(&config.api_base_url)?;
    let storage = FileStorage::new(&config.session_dir);
    let store = SessionStore::new(Arc::new(verifier), Arc::new(storage));
    store.restore().await?;

    match command {
        Commands::Login {
            email,
            password,
            role,
        } => {
            let session = store.login(&email, &password, role).await?;
            println!(
                "Logged in as {} ({}), session expires {}",
                session.user.email, session.user.role, session.expires_at
            );
        }
        Commands::Logout => {
            store.logout().await;
            println!("Logged out");
        }
        Commands::Refresh => {
            let session = store.refresh().await?;
            println!("Session renewed, expires {}", session.expires_at);
        }
        Commands::Status => match store.session() {
            None => println!("Not logged in"),
            Some(session) if store.is_authenticated() => println!(
                "Logged in as {} ({}), expires {}",
                session.user.email, session.user.role, session.expires_at
            ),
            Some(session) => println!(
                "Session for {} expired at {}",
                session.user.email, session.expires_at
            ),
        },
        Commands::Whoami => {
            let user = store
                .user()
                .filter(|_| store.is_authenticated())
                .ok_or(PortalError::NotAuthenticated)?;
            println!("id:          {}", user.id);
            println!("email:       {}", user.email);
            println!("name:        {}", user.name);
            println!("role:        {}", user.role);
            println!("permissions: {}", Vec::from_iter(user.permissions).join(", "));
        }
        Commands::Can { permission } => {
            if !store.is_authenticated() {
                return Err(PortalError::NotAuthenticated.into());
            }
            if store.has_permission(&permission) {
                println!("yes");
            } else {
                println!("no");
                std::process::exit(2);
            }
        }
        Commands::Keepalive => {
            if !store.is_authenticated() {
                return Err(PortalError::NotAuthenticated.into());
            }
            let scheduler = RefreshScheduler::attach(&store, config.refresh_lead);
            let (listener, ended) = session_end_signal(&store);
            println!("Keeping session alive, press Ctrl-C to stop");
            let outcome = tokio::select! {
                result = tokio::signal::ctrl_c() => result.map_err(Error::from),
                _ = ended.notified() => Err(Error::Custom("Session ended".into())),
            };
            store.unsubscribe(listener);
            scheduler.detach();
            outcome?;
        }
        Commands::Version | Commands::Role { .. } => {}
    }

    Ok(())
}

/// Subscribe a listener that fires the returned [`Notify`] when the session
/// is logged out, including by a failed refresh.
fn session_end_signal(store: &SessionStore) -> (ListenerId, Arc<Notify>) {
    let ended = Arc::new(Notify::new());
    let signal = Arc::clone(&ended);
    let id = store.subscribe(Arc::new(
        move |event: SessionEvent, _: Option<&Session>| {
            if event == SessionEvent::LoggedOut {
                signal.notify_one();
            }
        },
    ));
    (id, ended)
}
