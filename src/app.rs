use std::{
    io::{self, Write},
    path::Path,
    sync::mpsc,
    time::Instant,
};

use anyhow::{bail, Context, Result};
use chrono::Local;

use crate::{
    cli::{Cli, Command},
    domain, infra,
    infra::{
        contracts::SessionAdapter,
        error::AppError,
        rest::RestClient,
        session_store::{SessionInfo, SessionStore},
        storage_layout::StorageLayout,
    },
    realtime::{self, connection::ConnectionManager, ws_transport::WsConnector},
    ui::{
        self,
        event_source::ChannelEventSource,
        message_rendering::{format_conversation, format_participant, NoticeRenderer},
    },
    usecases::{
        self,
        bootstrap,
        backend_jobs::BackendWorker,
        chat_session::{describe_list_error, resolve_conversation, ChatSession},
        context::AppContext,
        list_chats::list_chats,
        login::{run_login, LoginOutcome, LoginRequest, StdTerminal},
        logout::logout,
        search_users::{search_users, SearchUsersError, MIN_QUERY_CHARS},
    },
};

const LOGOUT_BOOTSTRAP_FALLBACK: &str = "LOGOUT_BOOTSTRAP_FALLBACK";

pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(
        ui = ui::module_name(),
        domain = domain::module_name(),
        realtime = realtime::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    match cli.command_or_default() {
        Command::Login { username, user_id } => {
            let mut context = bootstrap::bootstrap(cli.config.as_deref())?;
            let outcome = run_login(
                &mut StdTerminal,
                &mut context.session,
                &LoginRequest { username, user_id },
            )?;
            if outcome == LoginOutcome::Cancelled {
                bail!("login cancelled");
            }
            tracing::info!(path = %context.session.path().display(), "session file updated");
        }
        Command::Logout => {
            let (_context, mut store) = logout_store(cli.config.as_deref())?;
            let outcome = logout(&mut store)?;
            if outcome.had_session() {
                println!("Logged out. Removed: {}.", outcome.removed_keys.join(", "));
            } else {
                println!("No stored session; nothing to remove.");
            }
        }
        Command::Chats => {
            let context = bootstrap::bootstrap(cli.config.as_deref())?;
            let rest = rest_client(&context, &require_session(&context.session)?)?;
            let chats = list_chats(&rest).map_err(|error| anyhow::anyhow!(describe_list_error(&error)))?;
            let mut out = io::stdout().lock();
            if chats.is_empty() {
                writeln!(out, "No conversations yet.")?;
            }
            for chat in &chats {
                writeln!(out, "{}", format_conversation(chat))?;
            }
        }
        Command::Search { query } => {
            let context = bootstrap::bootstrap(cli.config.as_deref())?;
            let session = require_session(&context.session)?;
            let rest = rest_client(&context, &session)?;
            let users = search_users(&rest, &query, session.profile.as_ref())
                .map_err(|error| anyhow::anyhow!(describe_search_error(&error)))?;
            let mut out = io::stdout().lock();
            if users.is_empty() {
                writeln!(out, "No users match {query:?}.")?;
            }
            for user in &users {
                writeln!(out, "{}", format_participant(user))?;
            }
        }
        Command::Chat { username } => {
            let context = bootstrap::bootstrap(cli.config.as_deref())?;
            run_interactive(&context, Some(&username))?;
        }
        Command::Watch => {
            let context = bootstrap::bootstrap(cli.config.as_deref())?;
            run_interactive(&context, None)?;
        }
    }

    Ok(())
}

fn run_interactive(context: &AppContext, peer: Option<&str>) -> Result<()> {
    let session = require_session(&context.session)?;
    let rest = rest_client(context, &session)?;
    let conversation = match peer {
        Some(username) => Some(
            resolve_conversation(&rest, session.profile.as_ref(), username)
                .map_err(anyhow::Error::msg)?,
        ),
        None => None,
    };

    let (events, receiver) = mpsc::channel();
    let connector = WsConnector::new(events.clone())?;
    let jobs = BackendWorker::start(rest, events.clone())?;
    let conn = ConnectionManager::new(context.config.api.base_url.clone(), connector);
    let mut chat = ChatSession::new(
        conn,
        jobs,
        session.access_token,
        session.profile,
        &context.config.chat,
    );

    tracing::info!(
        api = %context.config.api.base_url,
        mode = if peer.is_some() { "chat" } else { "watch" },
        "starting interactive session"
    );
    let now = Instant::now();
    let initial = match conversation {
        Some(conversation) => chat.start_chat(conversation, now),
        None => chat.start_watch(now),
    };

    ui::event_source::spawn_stdin_reader(events).context("failed to start stdin reader")?;
    let mut source = ChannelEventSource::new(receiver);
    let mut renderer = NoticeRenderer::new(*Local::now().offset());
    let mut stdout = io::stdout().lock();
    let result = ui::shell::run(&mut source, &mut chat, &mut renderer, &mut stdout, &initial);
    chat.shutdown();

    result
}

fn rest_client(context: &AppContext, session: &SessionInfo) -> Result<RestClient, AppError> {
    RestClient::new(
        &context.config.api,
        session.access_token.clone(),
        context.config.chat.read_receipt_batch_max,
    )
}

fn require_session(session: &dyn SessionAdapter) -> Result<SessionInfo, AppError> {
    session.load_session()?.ok_or(AppError::MissingSession)
}

/// Logout must work even when the config is broken; it only needs the
/// storage layout.
fn logout_store(config_path: Option<&Path>) -> Result<(Option<AppContext>, SessionStore), AppError> {
    match bootstrap::bootstrap(config_path) {
        Ok(context) => {
            let store = context.session.clone();
            Ok((Some(context), store))
        }
        Err(error) => {
            tracing::warn!(
                code = LOGOUT_BOOTSTRAP_FALLBACK,
                error = %error,
                "bootstrap failed; clearing the session from the default layout"
            );
            let layout = StorageLayout::resolve()?;
            layout.ensure_dirs()?;
            Ok((None, SessionStore::from_layout(&layout)))
        }
    }
}

fn describe_search_error(error: &SearchUsersError) -> String {
    match error {
        SearchUsersError::QueryTooShort => {
            format!("search needs at least {MIN_QUERY_CHARS} characters")
        }
        SearchUsersError::Unauthorized => "access token was rejected; run `relochat login`".to_owned(),
        SearchUsersError::TemporarilyUnavailable => "search is temporarily unavailable".to_owned(),
        SearchUsersError::DataContractViolation => "server returned unexpected users".to_owned(),
    }
}
