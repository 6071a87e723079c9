//! lounge: join a conversation's typing presence or toggle a like from the
//! terminal.
//!
//! `typing` reads stdin: every non-empty line counts as typing, an empty
//! line as "message sent", `/quit` leaves. Remote typing indicators are
//! printed as they change.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use lounge_common::{ConversationId, LoungeError};
use lounge_config::LoungeConfig;
use lounge_social::{
    ChannelTransport, ConversationPresence, CounterStore, Identity, MemoryCounterStore,
    MemoryHub, PostgrestCounterStore, PresenceTiming, RealtimeConfig, RealtimeTransport,
    Reconciler, ToggleKey, ToggleKind,
};

#[derive(Parser)]
#[command(name = "lounge", about = "Typing presence and optimistic toggles")]
struct Args {
    /// Config file (defaults to the platform config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use in-process transport and store instead of Supabase.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective configuration with secrets masked.
    Config,
    /// Join a conversation and exchange typing indicators.
    Typing {
        #[arg(long)]
        conversation: String,
        #[arg(long, default_value = "anonymous")]
        name: String,
        /// User id (random if omitted).
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Flip a toggle (like, follow, pin) and print the reconciled result.
    Toggle {
        #[arg(long, default_value = "post_like")]
        kind: ToggleKind,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        resource: String,
        /// Current state as shown to the user.
        #[arg(long)]
        on: bool,
        /// Current count as shown to the user.
        #[arg(long, default_value_t = 0)]
        count: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lounge=info".into()),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "lounge failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> lounge_common::Result<()> {
    let config = load(args.config.as_deref())?;
    match args.command {
        Command::Config => {
            println!("{}", lounge_config::config_to_json(&config));
            Ok(())
        }
        Command::Typing {
            conversation,
            name,
            user_id,
        } => {
            let identity = identity(&config, name, user_id);
            typing(&config, identity, ConversationId::new(conversation), args.offline).await
        }
        Command::Toggle {
            kind,
            subject,
            resource,
            on,
            count,
        } => {
            let key = ToggleKey::new(kind, subject, resource);
            toggle(&config, key, on, count, args.offline).await
        }
    }
}

fn load(path: Option<&std::path::Path>) -> Result<LoungeConfig, LoungeError> {
    match path {
        Some(path) => {
            let config = lounge_config::load_from_path(path)?;
            lounge_config::validation::validate(&config)?;
            Ok(config)
        }
        None => Ok(lounge_config::load_config()?),
    }
}

fn identity(config: &LoungeConfig, name: String, user_id: Option<String>) -> Identity {
    let token = config
        .realtime
        .access_token
        .clone()
        .filter(|t| !t.is_empty());
    match (user_id, token) {
        (Some(id), Some(token)) => Identity::from_supabase_auth(id, name, token),
        (Some(id), None) => Identity {
            user_id: id,
            ..Identity::generate(&name)
        },
        (None, _) => Identity::generate(&name),
    }
}

// ---------------------------------------------------------------------------
// typing
// ---------------------------------------------------------------------------

async fn typing(
    config: &LoungeConfig,
    identity: Identity,
    conversation: ConversationId,
    offline: bool,
) -> lounge_common::Result<()> {
    let realtime = (!offline).then(|| {
        Arc::new(RealtimeTransport::connect_as(
            RealtimeConfig::from(config.realtime.clone()),
            &identity,
        ))
    });
    let transport: Arc<dyn ChannelTransport> = match &realtime {
        Some(rt) => Arc::clone(rt) as Arc<dyn ChannelTransport>,
        None => Arc::new(MemoryHub::new().connect()),
    };

    let presence = ConversationPresence::join(
        transport,
        &identity,
        conversation,
        PresenceTiming::from(&config.presence),
    )
    .await?;

    let mut view = presence.watch();
    let printer = tokio::spawn(async move {
        while view.changed().await.is_ok() {
            let snapshot = view.borrow_and_update().clone();
            if snapshot.is_anyone_typing {
                println!("typing: {}", snapshot.typing_user_names.join(", "));
            } else {
                println!("typing: -");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "" => presence.send_typing(false).await,
            _ => presence.send_typing(true).await,
        }
    }

    presence.teardown().await;
    printer.abort();
    if let Some(rt) = realtime {
        rt.disconnect().await;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// toggle
// ---------------------------------------------------------------------------

async fn toggle(
    config: &LoungeConfig,
    key: ToggleKey,
    on: bool,
    count: u64,
    offline: bool,
) -> lounge_common::Result<()> {
    let store: Arc<dyn CounterStore> = if offline {
        Arc::new(MemoryCounterStore::new())
    } else {
        let mut store = PostgrestCounterStore::new(
            &config.store,
            &config.realtime.project_ref,
            &config.realtime.api_key,
        )?;
        if let Some(token) = &config.realtime.access_token {
            store = store.with_access_token(token.clone());
        }
        Arc::new(store)
    };

    let reconciler = Reconciler::new(store);
    let result = reconciler
        .toggle_with(key, on, count, |local| {
            println!("optimistic: on={} count={}", local.state, local.count);
        })
        .await;

    match result {
        Ok(confirmed) => {
            println!("confirmed: on={} count={}", confirmed.state, confirmed.count);
            Ok(())
        }
        Err(e) => {
            let rollback = e.rollback();
            println!("rolled back: on={} count={}", rollback.state, rollback.count);
            Err(LoungeError::Store(e.to_string()))
        }
    }
}
