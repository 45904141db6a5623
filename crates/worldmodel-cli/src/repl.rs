//! REPL – Read-Eval-Print Loop for the world model shell.
//!
//! Every boundary operation is reachable as a slash-command; payloads are
//! JSON in the wire format.  `/help` prints the full list.

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use schemars::schema_for;
use worldmodel_ingest::{MapBus, MapUpdate};
use worldmodel_store::WorldModel;
use worldmodel_types::{WorldObjectDescription, WorldObjectInstance};

const HELP: &[(&str, &str)] = &[
    ("/create-instance <json>", "create an instance, print its id"),
    ("/update-instance <id> <json>", "write the set fields of <json> onto an instance"),
    ("/remove-instance <id>", "delete an instance"),
    ("/get-instance <id>", "print one instance"),
    ("/search-instances <tag>...", "instances carrying every tag"),
    ("/create-description <json>", "create a description with its descriptors"),
    ("/get-description <id>", "print one description and whether it exists"),
    ("/remove-description <id>", "delete a description and its descriptors"),
    ("/search-descriptions <tag>...", "descriptions carrying every tag"),
    ("/ingest-map <topic> <type> <json>", "publish a map update to the listener"),
    ("/schema <instance|description>", "print the JSON Schema of a payload"),
    ("/quit  /exit", "exit the shell"),
];

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Instance,
    Description,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateInstance(WorldObjectInstance),
    UpdateInstance(u64, WorldObjectInstance),
    RemoveInstance(u64),
    GetInstance(u64),
    SearchInstances(Vec<String>),
    CreateDescription(WorldObjectDescription),
    GetDescription(u64),
    RemoveDescription(u64),
    SearchDescriptions(Vec<String>),
    IngestMap { topic: String, msg_type: String, data: String },
    Schema(SchemaKind),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match head {
            "/create-instance" => Ok(Command::CreateInstance(parse_json(rest)?)),
            "/update-instance" => {
                let (id, json) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Ok(Command::UpdateInstance(parse_id(id)?, parse_json(json)?))
            }
            "/remove-instance" => Ok(Command::RemoveInstance(parse_id(rest)?)),
            "/get-instance" => Ok(Command::GetInstance(parse_id(rest)?)),
            "/search-instances" => Ok(Command::SearchInstances(parse_tags(rest))),
            "/create-description" => Ok(Command::CreateDescription(parse_json(rest)?)),
            "/get-description" => Ok(Command::GetDescription(parse_id(rest)?)),
            "/remove-description" => Ok(Command::RemoveDescription(parse_id(rest)?)),
            "/search-descriptions" => Ok(Command::SearchDescriptions(parse_tags(rest))),
            "/ingest-map" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(topic), Some(msg_type), Some(data)) if !topic.is_empty() => Ok(Command::IngestMap {
                        topic: topic.to_string(),
                        msg_type: msg_type.to_string(),
                        data: data.trim().to_string(),
                    }),
                    _ => Err("usage: /ingest-map <topic> <type> <json>".to_string()),
                }
            }
            "/schema" => match rest {
                "instance" => Ok(Command::Schema(SchemaKind::Instance)),
                "description" => Ok(Command::Schema(SchemaKind::Description)),
                other => Err(format!("unknown schema '{other}' (instance | description)")),
            },
            "/help" => Ok(Command::Help),
            "/quit" | "/exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command '{other}'. Type /help for available commands.")),
        }
    }
}

fn parse_id(raw: &str) -> Result<u64, String> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| format!("'{}' is not a valid id", raw.trim()))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, String> {
    if raw.trim().is_empty() {
        return Err("missing JSON payload".to_string());
    }
    serde_json::from_str(raw).map_err(|e| format!("invalid payload: {e}"))
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Shell
// ─────────────────────────────────────────────────────────────────────────────

/// Executes commands against one world model.
pub struct Shell {
    world: Arc<WorldModel>,
    bus: MapBus,
}

impl Shell {
    pub fn new(world: Arc<WorldModel>, bus: MapBus) -> Self {
        Self { world, bus }
    }

    /// Run `cmd` and return the text to show the user.
    pub fn execute(&self, cmd: Command) -> Result<String, String> {
        match cmd {
            Command::CreateInstance(inst) => {
                let id = self.world.create_instance(&inst).map_err(|e| e.to_string())?;
                Ok(format!("created instance {id}"))
            }
            Command::UpdateInstance(id, inst) => {
                match self.world.update_instance(id, &inst).map_err(|e| e.to_string())? {
                    true => Ok(format!("updated instance {id}")),
                    false => Ok(format!("no instance {id}")),
                }
            }
            Command::RemoveInstance(id) => match self.world.remove_instance(id).map_err(|e| e.to_string())? {
                true => Ok(format!("removed instance {id}")),
                false => Ok(format!("no instance {id}")),
            },
            Command::GetInstance(id) => match self.world.get_instance(id).map_err(|e| e.to_string())? {
                Some(inst) => to_pretty(&inst),
                None => Ok(format!("no instance {id}")),
            },
            Command::SearchInstances(tags) => {
                to_pretty(&self.world.search_instances_by_tags(tags.as_slice()).map_err(|e| e.to_string())?)
            }
            Command::CreateDescription(desc) => {
                let id = self.world.create_description(&desc).map_err(|e| e.to_string())?;
                Ok(format!("created description {id}"))
            }
            Command::GetDescription(id) => {
                let (description, found) = self.world.get_description(id).map_err(|e| e.to_string())?;
                to_pretty(&serde_json::json!({ "found": found, "description": description }))
            }
            Command::RemoveDescription(id) => {
                match self.world.remove_description(id).map_err(|e| e.to_string())? {
                    true => Ok(format!("removed description {id}")),
                    false => Ok(format!("no description {id}")),
                }
            }
            Command::SearchDescriptions(tags) => {
                to_pretty(&self.world.search_descriptions_by_tags(tags.as_slice()).map_err(|e| e.to_string())?)
            }
            Command::IngestMap { topic, msg_type, data } => {
                let update = MapUpdate::from_json(topic, msg_type, &data).map_err(|e| e.to_string())?;
                let (id, topic) = (update.id, update.topic.clone());
                self.bus.publish(update).map_err(|e| e.to_string())?;
                Ok(format!("queued map update {id} on {topic}"))
            }
            Command::Schema(SchemaKind::Instance) => to_pretty(&schema_for!(WorldObjectInstance)),
            Command::Schema(SchemaKind::Description) => to_pretty(&schema_for!(WorldObjectDescription)),
            Command::Help => Ok(help_text()),
            Command::Quit => Ok("Goodbye.".to_string()),
        }
    }
}

fn to_pretty<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn help_text() -> String {
    let width = HELP.iter().map(|(cmd, _)| cmd.len()).max().unwrap_or(0);
    let mut out = String::from("World Model Commands\n");
    for (cmd, what) in HELP {
        out.push_str(&format!("  {cmd:<width$}  – {what}\n"));
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(shell: &Shell, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "worldmodel>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        let cmd = match Command::parse(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{}", e.yellow());
                continue;
            }
        };
        let quit = cmd == Command::Quit;
        match shell.execute(cmd) {
            Ok(text) if quit => println!("{}", text.green()),
            Ok(text) => println!("{text}"),
            Err(e) => println!("{}: {}", "Error".red(), e),
        }
        if quit {
            shutdown.store(true, Ordering::SeqCst);
            break;
        }
    }
}
