//! Terminal front-end.
//!
//! Each screen is rendered as plain text; the user drives the app with slash
//! commands, and anything that is not a command is sent as a chat message.
//! Stdin is read on its own task so user input and realtime events can be
//! awaited together.

use crate::app::{App, AppEvent, Screen};
use crate::backend::Backend;
use crate::directory::GroupDraft;
use crate::error::{ClientError, Result};
use crate::models::Message;
use base64::{engine::general_purpose, Engine as _};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Command types for the terminal front-end
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Reload the directory
    Refresh,
    /// Open a group by id or by its 1-based position in the directory
    Open(String),
    Back,
    Info,
    /// Show the create-group form
    New,
    /// Submit the create-group form
    Create {
        name: String,
        description: String,
        avatar: Option<PathBuf>,
    },
    Join,
    Admin,
    /// Approve the n-th (1-based) pending request
    Approve(usize),
    /// Send the given images plus anything attached, with an optional caption
    Image { paths: Vec<PathBuf>, caption: String },
    /// Stage images for the next message
    Attach(Vec<PathBuf>),
    /// Drop the n-th (1-based) staged image
    Detach(usize),
    Message(String),
    Help,
    Quit,
}

impl Command {
    /// Parse a command string
    pub fn parse(input: &str) -> std::result::Result<Self, String> {
        let input = input.trim();

        if !input.starts_with('/') {
            return Ok(Command::Message(input.to_string()));
        }

        let (name, rest) = match input.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };

        match name {
            "/quit" | "/exit" => Ok(Command::Quit),
            "/help" => Ok(Command::Help),
            "/groups" | "/refresh" => Ok(Command::Refresh),
            "/back" => Ok(Command::Back),
            "/info" => Ok(Command::Info),
            "/new" => Ok(Command::New),
            "/join" => Ok(Command::Join),
            "/admin" => Ok(Command::Admin),
            "/open" => {
                if rest.is_empty() {
                    return Err("Usage: /open <group id | number>".to_string());
                }
                Ok(Command::Open(rest.to_string()))
            }
            "/create" => {
                let mut fields = rest.splitn(3, '|').map(str::trim);
                let name = fields.next().unwrap_or_default();
                let description = fields.next().unwrap_or_default();
                let avatar = fields.next().filter(|a| !a.is_empty()).map(PathBuf::from);
                if name.is_empty() {
                    return Err("Usage: /create <name> | <description> [| <avatar path>]".to_string());
                }
                Ok(Command::Create {
                    name: name.to_string(),
                    description: description.to_string(),
                    avatar,
                })
            }
            "/approve" => rest
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(Command::Approve)
                .ok_or_else(|| "Usage: /approve <number>".to_string()),
            "/image" => {
                let (paths, caption) = match rest.split_once('|') {
                    Some((paths, caption)) => (paths, caption.trim()),
                    None => (rest, ""),
                };
                Ok(Command::Image {
                    paths: split_paths(paths),
                    caption: caption.to_string(),
                })
            }
            "/attach" => {
                let paths = split_paths(rest);
                if paths.is_empty() {
                    return Err("Usage: /attach <path> [<path>...]".to_string());
                }
                Ok(Command::Attach(paths))
            }
            "/detach" => rest
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(Command::Detach)
                .ok_or_else(|| "Usage: /detach <number>".to_string()),
            _ => Err(format!("Unknown command: {}", input)),
        }
    }
}

fn split_paths(input: &str) -> Vec<PathBuf> {
    input.split_whitespace().map(PathBuf::from).collect()
}

/// Parse a command from user input
pub fn parse_command(input: &str) -> Result<Command> {
    Command::parse(input).map_err(ClientError::StateError)
}

pub const HELP: &str = "\
Commands:
  /groups            reload the group list
  /open <id|n>       open a group
  /back              go back
  /info              group details (from a chat)
  /new               new group form (admins)
  /create <name> | <description> [| <avatar path>]
  /join              join the open group with a social login
  /admin             sign in as administrator
  /approve <n>       approve the n-th pending request (admins, on /info)
  /image [<path>...] [| caption]   send images (and anything attached)
  /attach <path>...  stage images for the next message
  /detach <n>        remove the n-th staged image
  /quit
Anything else is sent to the open chat.";

/// Format a message for display
pub fn format_message(message: &Message) -> String {
    if message.is_system() {
        return format!("  -- {} --", message.text.as_deref().unwrap_or_default());
    }

    let who = if message.is_me { "me" } else { message.sender.name.as_str() };
    let mut line = format!("[{}] <{}>", message.timestamp, who);
    if let Some(text) = &message.text {
        line.push(' ');
        line.push_str(text);
    }
    if !message.images.is_empty() {
        line.push_str(&format!(" [{} image(s)]", message.images.len()));
    }
    line
}

/// Render the current screen
pub fn render_screen<B: Backend>(app: &App<B>) -> String {
    let mut out = String::new();
    let group = app.active_group();

    match app.screen() {
        Screen::GroupList => {
            out.push_str("== Groups ==\n");
            for (i, g) in app.groups().iter().enumerate() {
                out.push_str(&format!(
                    "{:>3}. {} ({} members) [{}]\n",
                    i + 1,
                    g.name,
                    g.member_count,
                    g.id
                ));
            }
            if app.groups().is_empty() {
                if app.user().is_admin() {
                    out.push_str("No groups yet. Create the first one with /new.\n");
                } else {
                    out.push_str("No groups yet. Please wait for an admin to create one.\n");
                }
            }
        }
        Screen::CreateGroup => {
            out.push_str("== New group ==\n");
            out.push_str("/create <name> | <description>, or /back\n");
        }
        Screen::Welcome => {
            out.push_str(&format!("== {} ==\n", group.name));
            if app.is_waiting_approval() {
                out.push_str("Request sent! Waiting for an admin to approve you.\n");
            } else {
                out.push_str("Join the community: /join");
                if !app.user().is_admin() {
                    out.push_str(" (or /admin)");
                }
                out.push('\n');
            }
        }
        Screen::Chat => {
            out.push_str(&format!("== {} ({} members) ==\n", group.name, group.member_count));
            for message in app.messages() {
                out.push_str(&format_message(message));
                out.push('\n');
            }
        }
        Screen::Info => {
            out.push_str(&format!("== {} ==\n{} members\n", group.name, group.member_count));
            if app.is_current_user_admin() {
                out.push_str(&format!(
                    "Join requests ({}):\n",
                    app.pending_requests().len()
                ));
                for (i, request) in app.pending_requests().iter().enumerate() {
                    out.push_str(&format!("{:>3}. {}\n", i + 1, request.user_name));
                }
                if app.pending_requests().is_empty() {
                    out.push_str("  No new requests.\n");
                }
            }
            out.push_str("About:\n  ");
            if group.description.is_empty() {
                out.push_str("No description for this group yet.");
            } else {
                out.push_str(&group.description);
            }
            out.push('\n');
            if !group.rules.is_empty() {
                out.push_str("Rules:\n");
                for rule in &group.rules {
                    out.push_str(&format!("  - {}\n", rule));
                }
            }
        }
        Screen::ProfileEdit => out.push_str("== Profile ==\n"),
    }

    out
}

/// Images staged for the next message
#[derive(Debug, Default)]
pub struct Composer {
    images: Vec<String>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Read and stage each file; nothing is staged if one of them fails
    pub fn attach(&mut self, paths: &[PathBuf]) -> Result<()> {
        let images = paths
            .iter()
            .map(|path| image_data_url(path))
            .collect::<Result<Vec<_>>>()?;
        self.images.extend(images);
        Ok(())
    }

    /// Remove the n-th (1-based) staged image
    pub fn detach(&mut self, n: usize) -> bool {
        match n.checked_sub(1).filter(|i| *i < self.images.len()) {
            Some(i) => {
                self.images.remove(i);
                true
            }
            None => false,
        }
    }

    /// Send `text` with the staged images. The tray is emptied only when a
    /// message actually went out.
    pub fn send<B: Backend>(&mut self, app: &mut App<B>, text: &str) -> Option<String> {
        let id = app.send_message(text, self.images.clone())?;
        self.images.clear();
        Some(id)
    }
}

/// Read an image file into a `data:` URL
pub fn image_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    Ok(format!(
        "data:{};base64,{}",
        mime,
        general_purpose::STANDARD.encode(bytes)
    ))
}

/// Apply one command to the app
pub async fn execute<B: Backend>(
    app: &mut App<B>,
    composer: &mut Composer,
    command: Command,
) -> Result<()> {
    match command {
        Command::Refresh => app.refresh_groups().await,
        Command::Open(target) => {
            let by_position = target
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| app.groups().get(i))
                .map(|g| g.id.clone());
            let group_id = by_position.unwrap_or(target);
            app.open_group(&group_id).await;
        }
        Command::Back => app.back(),
        Command::Info => app.show_info().await,
        Command::New => {
            if !app.begin_create_group() {
                println!("Only administrators can create groups.");
            }
        }
        Command::Create {
            name,
            description,
            avatar,
        } => {
            let mut draft = GroupDraft::new(&name, &description);
            draft.avatar = avatar.as_deref().map(image_data_url).transpose()?;

            if app.screen() != Screen::CreateGroup {
                app.begin_create_group();
            }
            if !app.submit_group(draft).await {
                println!("Cannot create the group here.");
            }
        }
        Command::Join => app.join_with_social().await,
        Command::Admin => app.login_as_admin().await,
        Command::Approve(n) => {
            let request = n
                .checked_sub(1)
                .and_then(|i| app.pending_requests().get(i))
                .cloned();
            match request {
                Some(request) => app.approve(&request).await,
                None => println!("No request #{}", n),
            }
        }
        Command::Image { paths, caption } => {
            composer.attach(&paths)?;
            if composer.send(app, &caption).is_none() {
                println!("Nothing to send.");
            }
        }
        Command::Attach(paths) => {
            composer.attach(&paths)?;
            println!("{} image(s) attached", composer.images().len());
        }
        Command::Detach(n) => {
            if !composer.detach(n) {
                println!("No attachment #{}", n);
            }
        }
        Command::Message(text) => {
            if app.screen() == Screen::Chat {
                composer.send(app, &text);
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

/// Forward stdin lines over a channel; the channel closes on EOF
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut reader = BufReader::new(tokio::io::stdin());
        loop {
            match read_line_async(&mut reader).await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

/// Async stdin reader that yields one line at a time
///
/// # Returns
/// - `Ok(Some(line))` - User entered a line
/// - `Ok(None)` - EOF reached (Ctrl+D)
/// - `Err(e)` - I/O error
pub async fn read_line_async(reader: &mut BufReader<tokio::io::Stdin>) -> Result<Option<String>> {
    print!("> ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) => Ok(None),
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Ok(Some(line))
        }
        Err(e) => Err(e.into()),
    }
}

/// Run the interactive loop until `/quit` or EOF
pub async fn run_client_loop<B: Backend>(app: &mut App<B>) -> Result<()> {
    let mut events = app
        .take_events()
        .ok_or_else(|| ClientError::StateError("Event loop already running".to_string()))?;
    let mut lines = spawn_stdin_reader();
    let mut composer = Composer::new();

    println!("{}", HELP);
    println!("{}", render_screen(app));

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = execute(app, &mut composer, command).await {
                            println!("{}", e);
                        }
                        println!("{}", render_screen(app));
                        if !composer.images().is_empty() {
                            println!("[{} image(s) attached]", composer.images().len());
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            Some(event) = events.recv() => {
                let inserted = matches!(
                    &event,
                    AppEvent::Remote { change: crate::backend::ChangeEvent::MessageInserted(_), .. }
                );
                let changed = app.handle_event(event).await;
                if changed && inserted && app.screen() == Screen::Chat {
                    if let Some(message) = app.messages().last() {
                        println!("{}", format_message(message));
                    }
                } else if changed {
                    println!("{}", render_screen(app));
                }
            }
        }
    }

    app.shutdown();
    println!("Goodbye!");
    Ok(())
}
