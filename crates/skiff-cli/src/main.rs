//! Skiff command-line client.
//!
//! Manages templates and sandboxes and runs code or shell commands in a
//! sandbox. Credentials and endpoints are read from the environment (and a
//! `.env` file, if present); see `skiff_core::Config::from_env`.
//!
//! Results are printed to stdout as JSON. Logs go to stderr and are
//! controlled with `RUST_LOG`.

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use skiff_core::{
    Client, CodeLanguage, Config, ExecuteOptions, ListSandboxesInput, PageableInput,
    SandboxInput, SandboxStatus, TemplateInput, TemplateType,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "skiff", version, about = "Manage Skiff sandboxes and templates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage templates
    #[command(subcommand)]
    Template(TemplateCommand),
    /// Manage sandboxes
    #[command(subcommand)]
    Sandbox(SandboxCommand),
    /// Run code in a sandbox
    Exec {
        /// Sandbox id
        sandbox: String,
        /// Code to run
        code: String,
        #[arg(long, value_enum, default_value_t = Language::Python)]
        language: Language,
        /// Run inside an existing context
        #[arg(long)]
        context: Option<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run a shell command in a sandbox
    Cmd {
        /// Sandbox id
        sandbox: String,
        /// Command line
        command: String,
        #[arg(long)]
        cwd: Option<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Exit non-zero when the command fails
        #[arg(long)]
        check: bool,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// Create a template; unset resources use the type's defaults
    Create {
        name: String,
        #[arg(long = "type")]
        template_type: TemplateType,
        #[arg(long)]
        cpu: Option<f64>,
        /// Memory in MB
        #[arg(long)]
        memory: Option<u32>,
        #[arg(long)]
        description: Option<String>,
    },
    Get {
        name: String,
    },
    /// List all templates
    List {
        #[arg(long = "type")]
        template_type: Option<TemplateType>,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
enum SandboxCommand {
    /// Create a sandbox from a template
    Create {
        /// Template name
        template: String,
        #[arg(long = "type")]
        template_type: TemplateType,
        /// Idle timeout in seconds
        #[arg(long)]
        idle_timeout: Option<u64>,
        /// Lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    Get {
        id: String,
    },
    /// Probe readiness once
    Health {
        id: String,
    },
    Stop {
        id: String,
    },
    Delete {
        id: String,
    },
    List {
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        max_results: Option<u32>,
        #[arg(long)]
        next_token: Option<String>,
        /// Only list running sandboxes
        #[arg(long)]
        running: bool,
    },
    /// Print the browser CDP and live-view URLs
    Urls {
        id: String,
        /// Record sessions started through these URLs
        #[arg(long)]
        record: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Language {
    Python,
    Javascript,
}

impl From<Language> for CodeLanguage {
    fn from(language: Language) -> Self {
        match language {
            Language::Python => CodeLanguage::Python,
            Language::Javascript => CodeLanguage::JavaScript,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the JSON results
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skiff_core=warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(?config, "Configuration loaded");
    let client = Client::new(config).context("failed to create client")?;

    match cli.command {
        Command::Template(command) => template(&client, command).await,
        Command::Sandbox(command) => sandbox(&client, command).await,
        Command::Exec {
            sandbox,
            code,
            language,
            context,
            timeout,
        } => {
            let sandbox = client.connect(&sandbox, None).await?;
            let mut options = ExecuteOptions::new().language(language.into());
            if let Some(context) = context {
                options = options.context(context);
            }
            if let Some(secs) = timeout {
                options = options.timeout(Duration::from_secs(secs));
            }
            let result = sandbox.contexts()?.execute(&code, options).await?;
            print_json(&result)?;
            if let Some(error) = &result.error {
                bail!("{}: {}", error.name, error.value);
            }
            Ok(())
        }
        Command::Cmd {
            sandbox,
            command,
            cwd,
            timeout,
            check,
        } => {
            let sandbox = client.connect(&sandbox, None).await?;
            let result = sandbox
                .processes()?
                .cmd(&command, cwd.as_deref(), timeout.map(Duration::from_secs))
                .await?;
            print_json(&result)?;
            if check {
                result.check()?;
            }
            Ok(())
        }
    }
}

async fn template(client: &Client, command: TemplateCommand) -> Result<()> {
    match command {
        TemplateCommand::Create {
            name,
            template_type,
            cpu,
            memory,
            description,
        } => {
            let mut input = TemplateInput::new(name, template_type);
            if let Some(cpu) = cpu {
                input = input.cpu(cpu);
            }
            if let Some(memory) = memory {
                input = input.memory(memory);
            }
            if let Some(description) = description {
                input = input.description(description);
            }
            print_json(&client.create_template(input).await?)
        }
        TemplateCommand::Get { name } => print_json(&client.get_template(&name).await?),
        TemplateCommand::List {
            template_type,
            page_size,
        } => {
            let mut page = PageableInput::default().page_size(page_size);
            if let Some(template_type) = template_type {
                page = page.template_type(template_type);
            }
            print_json(&client.list_templates(page).collect_all().await?)
        }
        TemplateCommand::Delete { name } => {
            client.delete_template(&name).await?;
            print_json(&serde_json::json!({ "deleted": name }))
        }
    }
}

async fn sandbox(client: &Client, command: SandboxCommand) -> Result<()> {
    match command {
        SandboxCommand::Create {
            template,
            template_type,
            idle_timeout,
            ttl,
        } => {
            let mut input = SandboxInput::new(template);
            if let Some(secs) = idle_timeout {
                input = input.idle_timeout_secs(secs);
            }
            if let Some(secs) = ttl {
                input = input.ttl_secs(secs);
            }
            let sandbox = client.create(template_type, input).await?;
            print_json(sandbox.info())
        }
        SandboxCommand::Get { id } => print_json(&client.get_sandbox(&id).await?),
        SandboxCommand::Health { id } => {
            let sandbox = client.connect(&id, None).await?;
            print_json(&sandbox.check_health().await?)
        }
        SandboxCommand::Stop { id } => print_json(&client.stop_by_id(&id).await?),
        SandboxCommand::Delete { id } => print_json(&client.delete_by_id(&id).await?),
        SandboxCommand::List {
            template,
            max_results,
            next_token,
            running,
        } => {
            let mut input = ListSandboxesInput::new();
            if let Some(template) = template {
                input = input.template_name(template);
            }
            if let Some(max) = max_results {
                input = input.max_results(max);
            }
            if let Some(token) = next_token {
                input = input.next_token(token);
            }
            if running {
                input = input.status(SandboxStatus::Running);
            }
            print_json(&client.list(input).await?)
        }
        SandboxCommand::Urls { id, record } => {
            let sandbox = client.connect(&id, None).await?;
            let browser = sandbox.browser()?;
            print_json(&serde_json::json!({
                "cdp": browser.cdp_url(record)?,
                "vnc": browser.vnc_url(record)?,
            }))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
