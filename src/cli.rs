//! CLI module
//!
//! This module provides the command-line interface functionality for the heartree tool.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;

use crate::{
    api::{serve, AppState, ClientConfig, HttpClientImpl, ServerConfig, ServiceClient},
    config::ServiceConfig,
    controller::Core,
    ideas::generate_ideas,
    models::{IdeaContext, NodeId, NodeState, TreeId, VisibleNode},
    session::{Conversation, TurnOptions},
    upstream::Services,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(short, long, env = "HEARTREE_SERVER", default_value = "http://localhost:3000")]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the heartree API server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value_t = 3000)]
        port: u16,

        #[command(flatten)]
        services: ServiceConfig,
    },

    /// Grow a tree from a prompt and print it
    Tree {
        /// What the tree is about, e.g. "Plan a wedding"
        prompt: String,

        /// Expand collapsed nodes down to this depth, generating ideas as needed
        #[arg(short, long, default_value_t = 0)]
        depth: usize,
    },

    /// Ask for ideas under a node
    Ideas {
        /// Path from the root to the node, e.g. "Plan a wedding" Venue Outdoor
        #[arg(required = true)]
        path: Vec<String>,
    },

    /// Send one message into a conversation about a topic
    Chat {
        /// Topic of the conversation (usually a node name)
        topic: String,

        /// Message to send
        message: String,

        /// Write the spoken reply to this file
        #[arg(long)]
        speak_to: Option<PathBuf>,

        /// Skip speech synthesis
        #[arg(long, conflicts_with = "speak_to")]
        no_speech: bool,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { port, services } => {
            tracing_subscriber::fmt::init();

            let services = Services::from_config(services);
            let core = Core::new(Arc::new(ServiceClient::new(services.clone())));
            let state = AppState { services, core };

            // Create a server configuration with the specified port
            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };

            println!("Starting heartree API server on port {}...", port);
            serve(state, config).await?;
            Ok(())
        }

        Commands::Tree { prompt, depth } => {
            init_stderr_logging();
            let core = Core::new(Arc::new(create_client(&cli.server)));

            let planted = core.plant(prompt).await?;
            grow(&core, planted.id, *depth).await?;

            print_tree(&core.visible(planted.id)?, 0);
            Ok(())
        }

        Commands::Ideas { path } => {
            init_stderr_logging();
            let client = create_client(&cli.server);

            let (current, ancestors) = match path.split_last() {
                Some((current, ancestors)) => (current.clone(), ancestors.to_vec()),
                None => return Err("A node path is required".into()),
            };
            let context = IdeaContext {
                depth: ancestors.len(),
                ancestors,
                current,
            };

            for (i, idea) in generate_ideas(&client, &context).await.iter().enumerate() {
                println!("{}. {}", i + 1, idea);
            }
            Ok(())
        }

        Commands::Chat {
            topic,
            message,
            speak_to,
            no_speech,
        } => {
            init_stderr_logging();
            let client = create_client(&cli.server);
            let mut conversation = Conversation::new(topic.as_str());
            let options = TurnOptions {
                speak: !*no_speech,
                ..TurnOptions::default()
            };

            match conversation.send(&client, message, options).await? {
                Some(reply) => println!("{} {}", "ai:".magenta().bold(), reply),
                None => println!("{}", "No reply; the chat service failed.".red()),
            }
            println!("{} {}", "image:".cyan(), conversation.image_url());

            if let (Some(path), Some(audio)) = (speak_to, conversation.last_audio()) {
                std::fs::write(path, audio)?;
                println!("{} {}", "audio:".cyan(), path.display());
            }
            Ok(())
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

// Helper function to create a client
fn create_client(server_url: &str) -> HttpClientImpl {
    HttpClientImpl::with_config(ClientConfig {
        base_url: server_url.to_string(),
    })
}

fn init_stderr_logging() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
}

/// Expands every collapsed node shallower than `depth`
async fn grow(core: &Core, id: TreeId, depth: usize) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let mut frontier = Vec::new();
        collect_collapsed(&core.visible(id)?, 0, depth, &mut frontier);
        if frontier.is_empty() {
            return Ok(());
        }
        for node in frontier {
            core.toggle(id, node).await?;
        }
    }
}

fn collect_collapsed(node: &VisibleNode, level: usize, depth: usize, out: &mut Vec<NodeId>) {
    if level >= depth {
        return;
    }
    match &node.children {
        Some(children) => {
            for child in children {
                collect_collapsed(child, level + 1, depth, out);
            }
        }
        None if node.state == NodeState::Collapsed => out.push(node.id),
        None => {}
    }
}

fn print_tree(node: &VisibleNode, indent: usize) {
    let indent_str = "  ".repeat(indent);

    let marker = match node.state {
        NodeState::Collapsed => "+".green(),
        NodeState::Expanding => "~".yellow(),
        NodeState::Expanded => "-".blue(),
    };
    let name = if indent == 0 {
        node.name.bold()
    } else {
        node.name.normal()
    };

    println!(
        "{}{} {} {}",
        indent_str,
        marker,
        name,
        format!("#{}", node.id).dimmed()
    );

    for child in node.children.iter().flatten() {
        print_tree(child, indent + 1);
    }
}
