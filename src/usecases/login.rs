use std::io;

use crate::infra::{access_token::user_id_claim, contracts::SessionAdapter, error::AppError};

const LOGIN_ATTEMPTS: usize = 3;

pub trait LoginTerminal {
    fn print_line(&mut self, line: &str) -> io::Result<()>;
    /// `None` on EOF.
    fn prompt_secret(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

pub struct StdTerminal;

impl LoginTerminal for StdTerminal {
    fn print_line(&mut self, line: &str) -> io::Result<()> {
        println!("{line}");
        Ok(())
    }

    fn prompt_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match rpassword::prompt_password(prompt) {
            Ok(token) => Ok(Some(token.trim().to_owned())),
            Err(source) if source.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(source) => Err(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Stored,
    Cancelled,
}

/// Prompts for the access token without echo and stores it together with
/// the local identity. The user id comes from `--user-id` or, failing that,
/// from the token's `user_id` claim; socket frames name senders only by id,
/// so a session without one is not stored.
pub fn run_login(
    terminal: &mut dyn LoginTerminal,
    session: &mut dyn SessionAdapter,
    request: &LoginRequest,
) -> Result<LoginOutcome, AppError> {
    let username = request.username.trim().trim_start_matches('@');
    if username.is_empty() {
        say(terminal, "A username is required: relochat login --username <name>")?;
        return Ok(LoginOutcome::Cancelled);
    }
    let explicit_user_id = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    for attempt in 1..=LOGIN_ATTEMPTS {
        let Some(token) = terminal
            .prompt_secret("Access token: ")
            .map_err(AppError::TerminalIo)?
        else {
            say(terminal, "Input cancelled (EOF). Nothing was stored.")?;
            return Ok(LoginOutcome::Cancelled);
        };

        if token.is_empty() || token.chars().any(char::is_whitespace) {
            say(
                terminal,
                &format!(
                    "The token must be a single non-empty value. Attempts left: {}",
                    LOGIN_ATTEMPTS - attempt
                ),
            )?;
            continue;
        }

        let user_id = match explicit_user_id {
            Some(user_id) => user_id.to_owned(),
            None => match user_id_claim(&token) {
                Some(claimed) => claimed.to_string(),
                None => {
                    say(
                        terminal,
                        "The token carries no user_id claim. Run `relochat login --username <name> --user-id <id>`.",
                    )?;
                    return Ok(LoginOutcome::Cancelled);
                }
            },
        };

        session.save_session(&token, username, Some(&user_id))?;
        tracing::info!(
            username,
            from_token = explicit_user_id.is_none(),
            "session stored"
        );
        say(terminal, &format!("Signed in as {username}. Session saved."))?;
        return Ok(LoginOutcome::Stored);
    }

    say(terminal, "No token stored. Run `relochat login` again.")?;
    Ok(LoginOutcome::Cancelled)
}

fn say(terminal: &mut dyn LoginTerminal, line: &str) -> Result<(), AppError> {
    terminal.print_line(line).map_err(AppError::TerminalIo)
}
