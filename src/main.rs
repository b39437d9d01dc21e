//! Helios CLI
//!
//! Usage:
//!   helios --serve                          # HTTP API server
//!   helios --prompt linxi                   # Print the compiled system prompt
//!   helios --route "酒保，给我一杯酒"        # Show the routing decision
//!   helios                                  # Interactive tavern chat
//!   helios --route "text" --json            # JSON output

use clap::Parser;
use colored::Colorize;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use helios::core::{
    describe_environment, run_server, AppState, BeliefCompiler, Config, GatewayClient, NpcRegistry,
};
use helios::types::{ConversationContext, ConversationTurn, RouteKind, Scene};
use helios::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "helios",
    version = VERSION,
    about = "Helios - belief-driven NPC backend",
    long_about = "Helios turns YAML belief systems into LLM system prompts and routes\n\
                  player messages to the NPC they address.\n\n\
                  Modes:\n  \
                  --serve        HTTP API server\n  \
                  --prompt <id>  Print an NPC's compiled prompt\n  \
                  --route <text> Show which NPC would answer\n  \
                  (none)         Interactive chat in the tavern\n\n\
                  Without AI_GATEWAY_API_KEY every reply is a local test string."
)]
struct Args {
    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Directory of NPC profile YAML files (default: bundled cast)
    #[arg(long)]
    beliefs_dir: Option<String>,

    /// Print the compiled system prompt for this NPC id
    #[arg(long)]
    prompt: Option<String>,

    /// Route a message and print the decision
    #[arg(long)]
    route: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("helios=info")),
        )
        .with_writer(io::stderr)
        .init();

    if args.no_color {
        colored::control::set_override(false);
    }

    let config = Config::from_env();
    let registry = match load_registry(&args) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to load NPC profiles: {}", e);
            std::process::exit(1);
        }
    };

    if args.serve {
        run_serve(&args, &config, registry).await;
    } else if let Some(ref npc_id) = args.prompt {
        run_prompt(npc_id, &registry, &args);
    } else if let Some(ref text) = args.route {
        run_route(text, &config, &registry, &args);
    } else {
        run_interactive(&config, &registry, &args).await;
    }
}

fn load_registry(args: &Args) -> Result<NpcRegistry, helios::core::RegistryError> {
    match &args.beliefs_dir {
        Some(dir) => NpcRegistry::load_dir(dir),
        None => NpcRegistry::bundled(),
    }
}

/// Print one NPC's first-conversation prompt
fn run_prompt(npc_id: &str, registry: &NpcRegistry, args: &Args) {
    let Some(profile) = registry.get(npc_id) else {
        eprintln!("Unknown NPC: {}", npc_id);
        eprintln!("Known: {}", known_ids(registry));
        std::process::exit(1);
    };

    let context = ConversationContext::new(Scene::default());
    let prompt = BeliefCompiler::new().compile_profile(profile, &context);

    if args.json {
        let out = serde_json::json!({ "npc_id": profile.id, "name": profile.name, "prompt": prompt });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
    } else {
        println!("{}", format!("── {} ({}) ──", profile.name, profile.id).bold());
        println!("{}", prompt);
    }
}

/// Print the routing decision for one message
fn run_route(text: &str, config: &Config, registry: &NpcRegistry, args: &Args) {
    let result = config.router().route(text, &registry.routes());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
        return;
    }

    let name = registry.name_of(&result.npc_id);
    let kind = match result.kind {
        RouteKind::Matched => "matched".green(),
        RouteKind::Fallback => "fallback".yellow(),
        RouteKind::Environment => "environment".cyan(),
        RouteKind::Requested => "requested".normal(),
    };
    println!("{} {} [{}]", "→".bold(), name.bold(), kind);
    println!("  {}", result.reasoning.dimmed());
    if result.kind == RouteKind::Environment {
        println!("  {}", describe_environment(text));
    }
}

/// Chat in the tavern from stdin
async fn run_interactive(config: &Config, registry: &NpcRegistry, args: &Args) {
    let router = config.router();
    let compiler = BeliefCompiler::new();
    let gateway = GatewayClient::new(config.gateway.clone());
    let routes = registry.routes();
    let mut histories: HashMap<String, Vec<ConversationTurn>> = HashMap::new();

    print_header("Tavern", args.no_color);
    if !gateway.is_live() {
        println!("{}", "Local test mode: replies are simulated.".yellow());
    }
    println!("NPCs: {}", known_ids(registry));
    println!("Type a message and press Enter. Type 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", "你>".bold());
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }

        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let routing = router.route(line, &routes);
        if routing.kind == RouteKind::Environment {
            print_reply("环境", describe_environment(line), args);
            continue;
        }
        let Some(profile) = registry.get(&routing.npc_id) else {
            continue;
        };

        let history = histories.entry(profile.id.clone()).or_default();
        let context = ConversationContext::new(Scene::default()).with_history(history.clone());
        let prompt = compiler.compile_profile(profile, &context);
        let reply = gateway.complete(&prompt, line, context.history()).await;

        history.push(ConversationTurn::user(line));
        history.push(ConversationTurn::npc(&profile.name, &reply));
        print_reply(&profile.name, &reply, args);
    }

    println!("\nSession ended.");
}

fn print_reply(name: &str, reply: &str, args: &Args) {
    if args.json {
        let out = serde_json::json!({ "npc_name": name, "response": reply });
        println!("{}", serde_json::to_string(&out).unwrap_or_default());
    } else {
        println!("{} {}", format!("{}>", name).cyan().bold(), reply);
        println!();
    }
}

/// Run the API server
async fn run_serve(args: &Args, config: &Config, registry: NpcRegistry) {
    println!();
    println!("{}", "╔══════════════════════════════════════╗".bold());
    println!("{}", format!("║  Helios Agent Core API  v{:<12}║", VERSION).bold());
    println!("{}", "╚══════════════════════════════════════╝".bold());
    println!();

    config.log_summary();
    let state = Arc::new(AppState::from_config(config, registry));

    if let Err(e) = run_server(&args.addr, state).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn print_header(mode: &str, no_color: bool) {
    if no_color {
        println!("========================================");
        println!("  Helios v{} - {}", VERSION, mode);
        println!("========================================");
    } else {
        println!("{}", "════════════════════════════════════════".bold());
        println!("  {}", format!("Helios v{} - {}", VERSION, mode).bold());
        println!("{}", "════════════════════════════════════════".bold());
    }
    println!();
}

fn known_ids(registry: &NpcRegistry) -> String {
    registry
        .profiles()
        .iter()
        .map(|p| p.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
