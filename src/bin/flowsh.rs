// flowsh: interactive shell over an EditorSession
// Build with: cargo build --features cli --bin flowsh

use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, Command};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use flow_canvas::clipboard::document;
use flow_canvas::graph_utils::graph::{Connection, NodeKind, Position};
use flow_canvas::persistence::persist;
use flow_canvas::persistence::settings::EditorSettings;
use flow_canvas::EditorSession;

const HELP: &str = "Commands:
  add <kind> [name] [x y]   Add a node (kinds: trigger, agent, tool, condition, loop,
                            transform, http_request, delay, approval, output)
  rm <node>                 Remove a node and its edges
  connect <from> <to>       Connect two nodes
  disconnect <edge>         Remove an edge
  move <node> <x> <y>       Drag a node to a position (one undo step)
  select [node...]          Select nodes (none clears)
  undo | redo
  copy | copyall | paste
  show                      List nodes and edges
  save [path]               Write the document and an autosave
  quit";

enum Flow {
    Continue,
    Quit,
}

struct Shell {
    session: EditorSession,
    file: Option<PathBuf>,
}

impl Shell {
    // Ids are long; accept any unique prefix
    fn resolve(&self, prefix: &str, edges: bool) -> anyhow::Result<String> {
        let ids: Vec<&String> = if edges {
            self.session.graph().edges().iter().map(|e| &e.id).filter(|id| id.starts_with(prefix)).collect()
        } else {
            self.session.graph().nodes().iter().map(|n| &n.id).filter(|id| id.starts_with(prefix)).collect()
        };
        match ids.as_slice() {
            [one] => Ok((*one).clone()),
            [] => anyhow::bail!("no match for '{prefix}'"),
            _ => anyhow::bail!("'{prefix}' is ambiguous ({} matches)", ids.len()),
        }
    }

    fn show(&self) -> anyhow::Result<()> {
        let g = self.session.graph();
        for n in g.nodes() {
            let mark = if n.selected { "*" } else { " " };
            println!("{mark} {} {:<12} {:<20} ({:.0}, {:.0})", short(&n.id), n.data.kind.as_str(), n.data.display_name, n.position.x, n.position.y);
        }
        for e in g.edges() {
            println!("  {} {} -> {}", short(&e.id), short(&e.source), short(&e.target));
        }
        println!(
            "{} nodes, {} edges, undo {} / redo {}{}",
            g.node_count(),
            g.edge_count(),
            self.session.history().past_len(),
            self.session.history().future_len(),
            if self.session.has_pending_changes() { ", unsaved" } else { "" }
        );
        Ok(())
    }

    fn save(&mut self, path: Option<&str>) -> anyhow::Result<()> {
        if let Some(p) = path {
            self.file = Some(PathBuf::from(p));
        }
        if let Some(file) = &self.file {
            let doc = document::serialize(self.session.graph().nodes(), self.session.graph().edges());
            std::fs::write(file, doc.to_json()?)?;
            println!("wrote {}", file.display());
        }
        if let Some(state) = self.session.session_file() {
            let p = persist::save_active(&state)?;
            log::info!("autosaved to {}", p.display());
        }
        self.session.mark_saved();
        Ok(())
    }

    fn run(&mut self, line: &str) -> anyhow::Result<Flow> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((cmd, args)) = parts.split_first() else { return Ok(Flow::Continue) };
        match (*cmd, args) {
            ("quit" | "exit", _) => return Ok(Flow::Quit),
            ("help" | "?", _) => println!("{HELP}"),
            ("add", [kind, rest @ ..]) => {
                let kind: NodeKind = kind.parse()?;
                let (name, pos) = match rest {
                    [name, x, y] => (Some(name.to_string()), Position::new(x.parse()?, y.parse()?)),
                    [x, y] => (None, Position::new(x.parse()?, y.parse()?)),
                    [name] => (Some(name.to_string()), Position::default()),
                    _ => (None, Position::default()),
                };
                let id = self.session.add_node(kind, name, pos);
                println!("added {id}");
            }
            ("rm", [node]) => {
                let id = self.resolve(node, false)?;
                self.session.remove_node(&id);
            }
            ("connect", [from, to]) => {
                let c = Connection::new(self.resolve(from, false)?, self.resolve(to, false)?);
                match self.session.connect(c) {
                    Some(id) => println!("edge {id}"),
                    None => println!("already connected"),
                }
            }
            ("disconnect", [edge]) => {
                let id = self.resolve(edge, true)?;
                self.session.remove_edge(&id);
            }
            ("move", [node, x, y]) => {
                let id = self.resolve(node, false)?;
                let target = Position::new(x.parse()?, y.parse()?);
                let start = self.session.graph().node(&id).map(|n| n.position).unwrap_or_default();
                self.session.on_node_drag_start(&id);
                for step in 1..=5 {
                    let t = step as f64 / 5.0;
                    let p = Position::new(start.x + (target.x - start.x) * t, start.y + (target.y - start.y) * t);
                    self.session.on_node_drag(&id, p);
                }
                self.session.on_node_drag_stop(&id);
            }
            ("select", nodes) => {
                let ids = nodes.iter().map(|n| self.resolve(n, false)).collect::<anyhow::Result<Vec<_>>>()?;
                self.session.on_selection_change(&ids, &[]);
            }
            ("undo", []) => println!("{}", if self.session.undo() { "undone" } else { "nothing to undo" }),
            ("redo", []) => println!("{}", if self.session.redo() { "redone" } else { "nothing to redo" }),
            ("copy", []) => match self.session.copy_selection() {
                Some(text) => println!("copied {} bytes", text.len()),
                None => println!("nothing selected"),
            },
            ("copyall", []) => match self.session.copy_all() {
                Some(text) => println!("copied {} bytes", text.len()),
                None => println!("graph is empty"),
            },
            ("paste", []) => {
                let ids = self.session.paste_clipboard()?;
                println!("pasted {} nodes", ids.len());
            }
            ("show", []) => self.show()?,
            ("save", []) => self.save(None)?,
            ("save", [path]) => self.save(Some(*path))?,
            _ => anyhow::bail!("unknown command '{line}', try 'help'"),
        }
        Ok(Flow::Continue)
    }
}

fn short(id: &str) -> &str { id.get(..8).unwrap_or(id) }

fn open(file: Option<&Path>, workflow: &str, version: Option<i64>, settings: EditorSettings) -> anyhow::Result<EditorSession> {
    let mut session = EditorSession::new(settings, None, None);
    match file {
        Some(path) if path.exists() => {
            let text = std::fs::read_to_string(path)?;
            session.load_workflow_json(workflow, version, &text)?;
        }
        Some(_) => session.load_workflow(workflow, version, Default::default()),
        None => match persist::load_active()? {
            Some(state) => session.restore_session(state),
            None => session.load_workflow(workflow, version, Default::default()),
        },
    }
    Ok(session)
}

fn main() {
    let matches = Command::new("flowsh")
        .about("flowsh - edit a workflow graph document from the terminal")
        .arg(Arg::new("file").value_name("FILE").help("Workflow document (JSON); created on save"))
        .arg(Arg::new("workflow").long("workflow").default_value("local").help("Workflow id"))
        .arg(Arg::new("version_id").long("version-id").value_parser(clap::value_parser!(i64)).help("Version id"))
        .arg(Arg::new("eval").short('e').long("eval").value_name("CMD").help("Run a single command and exit"))
        .arg(Arg::new("quiet").short('q').long("quiet").action(ArgAction::SetTrue).help("Suppress banner/help text"))
        .get_matches();

    env_logger::init();

    let file = matches.get_one::<String>("file").map(PathBuf::from);
    let workflow = matches.get_one::<String>("workflow").cloned().unwrap_or_else(|| "local".to_string());
    let version = matches.get_one::<i64>("version_id").copied();
    let eval = matches.get_one::<String>("eval").cloned();
    let quiet = matches.get_flag("quiet");

    let settings = EditorSettings::load().unwrap_or_else(|e| {
        log::warn!("settings unreadable, using defaults: {e}");
        EditorSettings::default()
    });
    persist::set_settings_override(settings.clone());

    let session = match open(file.as_deref(), &workflow, version, settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to open workflow: {e:#}");
            std::process::exit(1);
        }
    };
    let mut shell = Shell { session, file };

    // One-off eval mode
    if let Some(cmd) = eval {
        match shell.run(&cmd) {
            Ok(_) => {
                if shell.session.has_pending_changes()
                    && let Err(e) = shell.save(None)
                {
                    eprintln!("save failed: {e:#}");
                    std::process::exit(3);
                }
            }
            Err(e) => {
                eprintln!("{e:#}");
                std::process::exit(2);
            }
        }
        return;
    }

    let mut rl: Editor<(), DefaultHistory> = match Editor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("failed to initialize editor: {}", e);
            std::process::exit(1);
        }
    };
    let hist_path = EditorSettings::settings_dir().join("flowsh_history.txt");
    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or_else(|| Path::new(".")));
    let _ = rl.load_history(&hist_path);

    if !quiet {
        eprintln!("flowsh ready. Type 'help' for commands. History saved at {}.\n", hist_path.display());
    }

    loop {
        match rl.readline("flowsh> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() { continue; }
                rl.add_history_entry(input).ok();
                match shell.run(input) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => eprintln!("error: {e:#}"),
                }
            }
            Err(ReadlineError::Interrupted) => { // Ctrl-C
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => { // Ctrl-D
                break;
            }
            Err(e) => {
                eprintln!("readline error: {}", e);
                break;
            }
        }
    }

    if shell.session.has_pending_changes() {
        eprintln!("unsaved changes kept in the autosave");
        if let Some(state) = shell.session.session_file()
            && let Err(e) = persist::save_active(&state)
        {
            eprintln!("autosave failed: {e:#}");
        }
    }
    let _ = rl.save_history(&hist_path);
}
