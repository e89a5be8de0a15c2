//! Touchpad Remote - headless driver
//!
//! Runs the remote on a single-threaded event loop and drives it from
//! line commands on stdin. Type `help` for the command list.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, MissedTickBehavior};
use touchpad_remote::editor::{ParamForm, TileForm};
use touchpad_remote::gesture::{TouchFrame, TouchPoint};
use touchpad_remote::grid::GridSlot;
use touchpad_remote::intent::MouseButton;
use touchpad_remote::session::TransportEvent;
use touchpad_remote::tile::{Cell, CommandTile, CommandType, TileId};
use touchpad_remote::ws::WsTransport;
use touchpad_remote::{AppSettings, BlobStore, DirStore, Feedback, MemoryStore, Remote, SessionState, TileTap};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Commands:
  connect <host> <secret>      open a session
  disconnect                   close the session
  status                       show connection state
  tiles                        list the grid
  tap <id> | tap <row> <col>   tap a tile, or an empty cell in edit mode
  click left|right             press a trackpad button
  touch start x,y [x,y]        put one or two fingers down
  touch move x,y [x,y]         move the fingers
  touch lift                   lift the last finger
  touch end                    lift every finger
  touch cancel                 drop every finger without a tap
  edit on|off                  toggle layout-edit mode
  form                         show the open editor form
  label <text>                 set the form label
  type <command type>          change the form's command type
  param <value>                set the form's parameter (\\n for newlines)
  color <color>                set the form color
  size <w> <h>                 set the form size
  save | cancel                commit or discard the form
  delete <id> [yes]            remove a tile
  sensitivity <1-20>           scroll sensitivity unit
  haptics on|off               toggle the terminal bell on sends
  quit";

#[derive(Parser, Debug)]
#[command(name = "touchpad-remote", version, about = "Trackpad and command grid remote control")]
struct Args {
    /// Host to connect to at startup (needs --key)
    #[arg(long)]
    host: Option<String>,

    /// Shared secret configured on the host
    #[arg(long)]
    key: Option<String>,

    /// Directory for settings and tiles (default: the user config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Keep everything in memory, write nothing to disk
    #[arg(long)]
    ephemeral: bool,
}

/// Rings the terminal bell in place of a haptic pulse
struct TerminalBell;

impl Feedback for TerminalBell {
    fn pulse(&self) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Remote plus the fingers currently on the simulated trackpad
struct Driver {
    remote: Remote,
    touches: Vec<TouchPoint>,
    tile_updates: Receiver<Vec<CommandTile>>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Touchpad Remote starting...");

    let store: Rc<dyn BlobStore> = if args.ephemeral {
        Rc::new(MemoryStore::new())
    } else {
        match &args.config_dir {
            Some(dir) => Rc::new(DirStore::new(dir)?),
            None => Rc::new(DirStore::default_location()?),
        }
    };

    let settings = AppSettings::load(store.as_ref()).unwrap_or_else(|e| {
        warn!("Failed to load settings, using defaults: {:#}", e);
        AppSettings::default()
    });
    let frame_interval = settings.frame_interval();

    let (transport, mut events) = WsTransport::new();
    let mut remote = Remote::new(store, settings, Box::new(transport), Box::new(TerminalBell));
    let tile_updates = remote.subscribe_tiles();
    let mut driver = Driver { remote, touches: Vec::new(), tile_updates };

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    match (&args.host, &args.key) {
        (Some(host), Some(key)) => driver.report(|driver| driver.remote.connect(host, key).map_err(Into::into)),
        (Some(_), None) | (None, Some(_)) => {
            warn!("--host and --key must be given together");
            driver.print_status();
        }
        (None, None) => {
            if let Some(host) = driver.remote.session().remembered_host() {
                println!("Last host: {} (connect <host> <secret>)", host);
            }
            driver.print_status();
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut frames = tokio::time::interval(frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let deadline = driver.remote.next_deadline().map(Instant::from_std);

        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => {
                    if driver.run_line(&line) == Flow::Quit {
                        break;
                    }
                }
                None => break,
            },
            Some((id, event)) = events.recv() => {
                let before = driver.status_line();
                driver.remote.transport_event(id, event);
                if driver.status_line() != before {
                    driver.print_status();
                }
            }
            _ = frames.tick(), if driver.remote.wants_frame() => driver.remote.frame(),
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                driver.remote.tick(std::time::Instant::now());
            }
            _ = shutdown_rx.recv() => {
                info!("Interrupted");
                break;
            }
        }
    }

    if driver.remote.session().state() != SessionState::Disconnected {
        driver.remote.disconnect();
        // Give the link task a moment to send its close frame
        let _ = tokio::time::timeout(Duration::from_millis(500), async {
            while let Some((_, event)) = events.recv().await {
                if matches!(event, TransportEvent::Closed { .. }) {
                    break;
                }
            }
        })
        .await;
    }

    info!("Touchpad Remote shutting down");
    Ok(())
}

impl Driver {
    fn status_line(&self) -> String {
        let session = self.remote.session();
        format!("[{}] {}", session.state(), session.status_message())
    }

    fn print_status(&self) {
        println!("{}", self.status_line());
    }

    /// Run `action` and print its error, or the new status if it changed
    fn report(&mut self, action: impl FnOnce(&mut Self) -> Result<()>) {
        let before = self.status_line();
        if let Err(e) = action(self) {
            println!("error: {:#}", e);
        }
        if self.status_line() != before {
            self.print_status();
        }
    }

    fn run_line(&mut self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "quit" | "exit" => return Flow::Quit,
            "help" => println!("{}", HELP),
            "status" => self.print_status(),
            "tiles" => self.print_tiles(),
            "form" => self.print_form(),
            "touch" => self.report(|driver| driver.touch(rest)),
            _ => {
                self.report(|driver| run_command(&mut driver.remote, command, rest));
                if matches!(command, "tap" | "type" | "edit") && self.remote.editor().is_open() {
                    self.print_form();
                }
            }
        }
        if self.tile_updates.try_iter().count() > 0 {
            self.print_tiles();
        }
        Flow::Continue
    }

    /// Simulated trackpad: fingers get ids in the order they are listed
    fn touch(&mut self, rest: &str) -> Result<()> {
        let mut words = rest.split_whitespace();
        let action = words.next().unwrap_or_default();

        let frame = match action {
            "start" | "move" => {
                let points = words
                    .enumerate()
                    .map(|(id, word)| parse_point(id as u64, word))
                    .collect::<Result<Vec<_>>>()?;
                if points.is_empty() {
                    bail!("usage: touch {} x,y [x,y]", action);
                }
                self.touches = points.clone();
                if action == "start" {
                    TouchFrame::start(points)
                } else {
                    TouchFrame::moved(points)
                }
            }
            "lift" => {
                if self.touches.pop().is_none() {
                    bail!("no finger is down");
                }
                TouchFrame::end(self.touches.clone(), 1)
            }
            "end" => {
                let lifted = self.touches.len();
                if lifted == 0 {
                    bail!("no finger is down");
                }
                self.touches.clear();
                TouchFrame::end(Vec::new(), lifted)
            }
            "cancel" => {
                let cancelled = self.touches.len();
                self.touches.clear();
                TouchFrame::cancel(Vec::new(), cancelled)
            }
            _ => bail!("usage: touch start|move|lift|end|cancel"),
        };

        self.remote.touch(&frame, std::time::Instant::now());
        Ok(())
    }

    fn print_tiles(&self) {
        for slot in self.remote.layout() {
            match slot {
                GridSlot::Tile(tile) => println!(
                    "  {:<18} {} {}x{}  {:<13} {}",
                    tile.id.as_str(),
                    tile.anchor(),
                    tile.w,
                    tile.h,
                    tile.command_type().as_str(),
                    tile.label
                ),
                GridSlot::Add(cell) => println!("  + {}", cell),
            }
        }
    }

    fn print_form(&self) {
        let Some(form) = self.remote.editor().form() else {
            println!("No command is being edited");
            return;
        };
        println!("  label: {}", form.label);
        println!("  type:  {}", form.params.command_type().display_name());
        match &form.params {
            ParamForm::MediaControl { action } => println!("  value: {} ({})", action.as_str(), action.label()),
            params => println!("  value: {}", params.value()),
        }
        println!("  color: {}", form.color);
        println!("  size:  {} x {}", form.w, form.h);
        if let Some(preview) = form.macro_preview() {
            for line in preview.to_display_text().lines() {
                println!("    {}", line);
            }
            for error in &preview.errors {
                println!("    ! {}", error);
            }
            if preview.is_valid() {
                println!("    total wait {:.2}s", preview.total_wait().as_secs_f64());
            }
        }
    }
}

fn run_command(remote: &mut Remote, command: &str, rest: &str) -> Result<()> {
    let words: Vec<&str> = rest.split_whitespace().collect();

    match (command, words.as_slice()) {
        ("connect", [host, secret]) => remote.connect(host, secret)?,
        ("connect", _) => bail!("usage: connect <host> <secret>"),
        ("disconnect", _) => remote.disconnect(),

        ("edit", ["on"]) => remote.set_edit_mode(true),
        ("edit", ["off"]) => remote.set_edit_mode(false),

        ("tap", [id]) => match remote.tap_tile(&TileId::new(*id)) {
            TileTap::Unknown => bail!("no tile '{}'", id),
            TileTap::Dropped => println!("not connected, command dropped"),
            TileTap::Sent | TileTap::Editing => {}
        },
        ("tap", [row, col]) => {
            let cell = Cell::new(row.parse()?, col.parse()?);
            if !remote.tap_empty_cell(cell) {
                bail!("{} is not an empty cell in edit mode", cell);
            }
        }

        ("click", ["left"]) => {
            remote.click(MouseButton::Left);
        }
        ("click", ["right"]) => {
            remote.click(MouseButton::Right);
        }

        ("label", _) => edit_form(remote, |form| form.label = rest.to_string())?,
        ("color", [color]) => edit_form(remote, |form| form.color = color.to_string())?,
        ("size", [w, h]) => edit_form(remote, |form| {
            form.w = w.to_string();
            form.h = h.to_string();
        })?,
        ("param", _) => {
            let value = rest.replace("\\n", "\n");
            let form = remote.edit_form_mut().context("no command is being edited")?;
            form.params.set_value(&value).map_err(anyhow::Error::msg)?;
        }
        ("type", [kind]) => {
            let kind: CommandType = kind.parse().map_err(anyhow::Error::msg)?;
            remote.editor().form().context("no command is being edited")?;
            remote.change_edit_type(kind);
        }
        ("save", _) => {
            let values: TileForm = remote.editor().form().cloned().context("no command is being edited")?;
            let tile = remote.save_edit(values)?;
            println!("saved {}", tile.id);
        }
        ("cancel", _) => remote.cancel_edit(),
        ("delete", [id, rest @ ..]) => {
            let confirmed = rest.first() == Some(&"yes");
            let removed = remote.delete_tile(&TileId::new(*id), &mut |prompt: &str| {
                if !confirmed {
                    println!("{} (repeat with 'yes' to confirm)", prompt);
                }
                confirmed
            })?;
            if removed {
                println!("deleted {}", id);
            }
        }

        ("sensitivity", [unit]) => remote.set_scroll_sensitivity(unit.parse()?)?,
        ("haptics", ["on"]) => remote.set_haptics(true)?,
        ("haptics", ["off"]) => remote.set_haptics(false)?,

        _ => bail!("unknown command '{} {}' (try 'help')", command, rest),
    }
    Ok(())
}

fn parse_point(id: u64, word: &str) -> Result<TouchPoint> {
    let (x, y) = word
        .split_once(',')
        .with_context(|| format!("expected x,y but got '{}'", word))?;
    Ok(TouchPoint::new(id, x.trim().parse()?, y.trim().parse()?))
}

fn edit_form(remote: &mut Remote, change: impl FnOnce(&mut TileForm)) -> Result<()> {
    let form = remote.edit_form_mut().context("no command is being edited")?;
    change(form);
    Ok(())
}
