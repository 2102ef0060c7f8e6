//! Terminal client for doodleroom rooms.
//!
//! Hosts or joins a room on a relay and drives it with line commands. The
//! canvas is shown as a running stroke summary rather than pixels; the
//! point of this front end is watching replication happen, not drawing
//! masterpieces.

use std::io::{self, BufRead};
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::thread;
use std::time::Duration;

use doodleroom_core::channel::RelayEndpoints;
use doodleroom_core::client::RoomClient;
use doodleroom_core::events::{GameOptions, RoomEvent};
use doodleroom_core::input::{InputTracker, PointerButton};
use doodleroom_core::repaint::Repaint;
use doodleroom_core::room::RoomState;
use doodleroom_core::session::Notice;
use doodleroom_core::stroke::parse_hex_color;
use doodleroom_core::tools::{Tool, ToolAction, ToolSettings};

const DEFAULT_SERVER: &str = "ws://127.0.0.1:3030";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const USAGE: &str = "\
doodleroom - shared canvas rooms in the terminal

Usage: doodleroom [--server ws://host:port] [--join CODE] [--name NAME]

  --server  relay URL (default ws://127.0.0.1:3030)
  --join    join an existing room instead of hosting a fresh one
  --name    display name sent to the relay (default anonymous)

Commands once connected:
  draw            draw a small squiggle with the current brush
  undo            remove the most recent stroke
  clear           wipe the canvas for everyone
  start           start the game
  color #rrggbb   change brush color
  width N         change brush width
  brush | eraser  switch tool
  room            show code, status, players and stroke count
  link            show how others can join this room
  quit            leave the room
";

struct CliArgs {
    server: String,
    join: Option<String>,
    name: String,
}

impl CliArgs {
    fn parse(args: Vec<String>) -> Result<Self, String> {
        let mut out = Self {
            server: DEFAULT_SERVER.to_string(),
            join: None,
            name: "anonymous".to_string(),
        };

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--server" => {
                    out.server = args.next().ok_or("--server needs a value")?;
                }
                "--join" => {
                    out.join = Some(args.next().ok_or("--join needs a value")?);
                }
                "--name" => {
                    out.name = args.next().ok_or("--name needs a value")?;
                }
                other => return Err(format!("unknown argument: {}", other)),
            }
        }
        Ok(out)
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print!("{}", USAGE);
        return;
    }

    let args = match CliArgs::parse(args) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            eprint!("{}", USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let endpoints = RelayEndpoints::new(&args.server)?;
    let mut client = RoomClient::new(endpoints);

    match &args.join {
        Some(code) => {
            println!("joining room {} as {}...", code, args.name);
            client.join(code, &args.name)?;
        }
        None => {
            println!("hosting a fresh room as {}...", args.name);
            client.host(&args.name)?;
        }
    }

    let commands = spawn_stdin_reader();
    let mut tools = ToolSettings::default();

    loop {
        for notice in client.poll() {
            match notice {
                Notice::Connected => println!("connected, waiting for the room snapshot..."),
                Notice::Disconnected => {
                    println!("disconnected from the relay");
                    return Ok(());
                }
                Notice::ConnectFailed(message) => return Err(message.into()),
            }
        }

        match client.take_repaint() {
            Repaint::None => {}
            Repaint::LastStroke => print_tail_stroke(client.state()),
            Repaint::Everything => print_room(client.state()),
        }

        match commands.try_recv() {
            Ok(line) => {
                if !handle_command(line.trim(), &mut client, &mut tools, &args) {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {}
            // stdin closed; behave like quit.
            Err(TryRecvError::Disconnected) => break,
        }

        thread::sleep(POLL_INTERVAL);
    }

    println!("leaving...");
    client.leave();
    Ok(())
}

/// Run one line command. Returns false when the user wants out.
fn handle_command(
    line: &str,
    client: &mut RoomClient,
    tools: &mut ToolSettings,
    args: &CliArgs,
) -> bool {
    let mut words = line.split_whitespace();
    match words.next() {
        None => {}
        Some("draw") => draw_squiggle(client, tools),
        Some("undo") => client.dispatch(&RoomEvent::UndoStroke),
        Some("clear") => client.dispatch(&RoomEvent::ClearStrokes),
        Some("start") => client.dispatch(&RoomEvent::StartGame(GameOptions::default())),
        Some("color") => match words.next() {
            Some(hex) if parse_hex_color(hex).is_some() => {
                *tools = tools.reduce(&ToolAction::ChangeColor(hex.to_string()));
                println!("brush color is now {}", tools.color);
            }
            _ => println!("usage: color #rrggbb"),
        },
        Some("width") => match words.next().and_then(|w| w.parse::<f64>().ok()) {
            Some(width) if width > 0.0 => {
                *tools = tools.reduce(&ToolAction::ChangeStrokeWidth(width));
                println!("brush width is now {}", tools.stroke_width);
            }
            _ => println!("usage: width N"),
        },
        Some("brush") => {
            *tools = tools.reduce(&ToolAction::ChangeTool(Tool::Brush));
            println!("tool: brush");
        }
        Some("eraser") => {
            *tools = tools.reduce(&ToolAction::ChangeTool(Tool::Eraser));
            println!("tool: eraser");
        }
        Some("room") => print_room(client.state()),
        Some("link") => {
            let code = &client.state().code;
            if code.is_empty() {
                println!("no room code yet");
            } else {
                println!(
                    "others can join with: doodleroom --server {} --join {}",
                    args.server, code
                );
            }
        }
        Some("quit") | Some("exit") => return false,
        Some("help") => print!("{}", USAGE),
        Some(other) => println!("unknown command: {} (try `help`)", other),
    }
    true
}

/// Synthesize a small squiggle through the pointer path, so drawing from a
/// terminal exercises the same event flow a real canvas would.
fn draw_squiggle(client: &mut RoomClient, tools: &ToolSettings) {
    let mut tracker = InputTracker::new();
    let n = client.state().game.strokes.len() as f64;
    let (ox, oy) = (20.0 + 8.0 * n, 30.0 + 5.0 * n);

    if let Some(event) = tracker.pointer_down(ox, oy, PointerButton::Primary, tools) {
        client.dispatch(&event);
    }
    for i in 1..=10 {
        let x = ox + i as f64 * 4.0;
        let y = oy + (i as f64 * 0.9).sin() * 6.0;
        if let Some(event) = tracker.pointer_move(x, y, true) {
            client.dispatch(&event);
        }
    }
    tracker.pointer_up();
}

fn print_room(state: &RoomState) {
    let players: Vec<&str> = state.players.iter().map(|p| p.name.as_str()).collect();
    println!(
        "room {} [{:?}] players: [{}] strokes: {}",
        if state.code.is_empty() { "-" } else { &state.code },
        state.status,
        players.join(", "),
        state.game.strokes.len()
    );
}

fn print_tail_stroke(state: &RoomState) {
    if let Some(stroke) = state.game.strokes.last() {
        println!(
            "~ stroke {}: {} points, {} width {}",
            state.game.strokes.len(),
            stroke.len(),
            stroke.color,
            stroke.width
        );
    }
}

/// Read stdin lines on a side thread so the poll loop never blocks.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}
