//! Command-line client for an `agor` HTTP server.

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Base URL of the running `agor` server.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submits a new task with the given instruction text.
    SubmitTask {
        /// Instruction text delivered to the root agent.
        text: String,
    },
    /// Sends a message from one agent to another within a task.
    Send {
        task_id: String,
        from: String,
        to: String,
        text: String,
    },
    /// Lists every agent in a task.
    ListAgents { task_id: String },
    /// Lists every role in a task.
    ListRoles { task_id: String },
    /// Fetches an agent's conversation history.
    GetMessages { task_id: String, agent_id: String },
    /// Aborts an agent's in-flight LLM call.
    Abort { task_id: String, agent_id: String },
    /// Terminates an agent on behalf of its direct parent.
    DeleteAgent {
        task_id: String,
        agent_id: String,
        caller: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();

    let response = match args.command {
        Command::SubmitTask { text } => {
            client
                .post(format!("{}/tasks", args.server))
                .json(&serde_json::json!({ "text": text }))
                .send()
                .await?
        }
        Command::Send {
            task_id,
            from,
            to,
            text,
        } => {
            client
                .post(format!("{}/tasks/{task_id}/messages", args.server))
                .json(&serde_json::json!({ "from": from, "to": to, "text": text }))
                .send()
                .await?
        }
        Command::ListAgents { task_id } => {
            client
                .get(format!("{}/tasks/{task_id}/agents", args.server))
                .send()
                .await?
        }
        Command::ListRoles { task_id } => {
            client
                .get(format!("{}/tasks/{task_id}/roles", args.server))
                .send()
                .await?
        }
        Command::GetMessages { task_id, agent_id } => {
            client
                .get(format!(
                    "{}/tasks/{task_id}/agents/{agent_id}/messages",
                    args.server
                ))
                .send()
                .await?
        }
        Command::Abort { task_id, agent_id } => {
            client
                .post(format!(
                    "{}/tasks/{task_id}/agents/{agent_id}/abort",
                    args.server
                ))
                .send()
                .await?
        }
        Command::DeleteAgent {
            task_id,
            agent_id,
            caller,
        } => {
            client
                .delete(format!("{}/tasks/{task_id}/agents/{agent_id}", args.server))
                .json(&serde_json::json!({ "caller": caller }))
                .send()
                .await?
        }
    };

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    println!("{status}: {}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
