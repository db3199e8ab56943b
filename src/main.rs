use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use render_proxy::{
    EngineConfig, Method, RenderRequest, RenderResult, RenderServer, RenderWorker, ServerConfig, SessionOptions,
};
use serde_json::json;

/// Render pages in headless Chrome and report their dialogs, console output and script errors
#[derive(Parser)]
#[command(name = "render-proxy", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP render server
    Serve {
        #[arg(long, env = "RENDER_PROXY_HOST", default_value = "127.0.0.1")]
        host: String,
        #[arg(long, env = "RENDER_PROXY_PORT", default_value_t = 8888)]
        port: u16,
        /// Largest accepted request body
        #[arg(long, env = "RENDER_PROXY_MAX_BODY_BYTES", default_value_t = 8 * 1024 * 1024)]
        max_body_bytes: usize,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Render one URL and print the result as JSON
    Render {
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Request body for POST
        #[arg(long)]
        body: Option<String>,
        /// Extra request header, `Name: value` (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,
        /// Dispatch pointer events to inline handlers after load
        #[arg(long)]
        provoke_events: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Maximum time to wait for a page load
    #[arg(long, env = "RENDER_PROXY_LOAD_TIMEOUT_MS", default_value_t = 30_000)]
    load_timeout_ms: u64,
    /// Pause before reading the document
    #[arg(long, env = "RENDER_PROXY_SETTLE_MS", default_value_t = 250)]
    settle_ms: u64,
    /// Chrome/Chromium executable
    #[arg(long, env = "RENDER_PROXY_CHROME")]
    chrome_path: Option<PathBuf>,
    /// Disable Chrome's sandbox (needed when running as root in containers)
    #[arg(long, env = "RENDER_PROXY_NO_SANDBOX")]
    no_sandbox: bool,
    /// Share one cookie store between all renders
    #[arg(long, env = "RENDER_PROXY_SHARED_COOKIES")]
    shared_cookies: bool,
    #[arg(long, env = "RENDER_PROXY_USER_AGENT")]
    user_agent: Option<String>,
}

impl EngineArgs {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chrome_path: self.chrome_path.clone(),
            sandbox: !self.no_sandbox,
            isolate_cookies: !self.shared_cookies,
            user_agent: self.user_agent.clone(),
            ..Default::default()
        }
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            load_timeout_ms: self.load_timeout_ms,
            settle_ms: self.settle_ms,
            ..Default::default()
        }
    }

    fn spawn_worker(&self) -> anyhow::Result<RenderWorker> {
        let config = self.engine_config();
        RenderWorker::spawn(move || render_proxy::new_engine(config), self.session_options())
            .context("failed to start headless Chrome")
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("render_proxy=info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Serve {
            host,
            port,
            max_body_bytes,
            engine,
        } => serve(
            ServerConfig {
                host,
                port,
                max_body_bytes,
            },
            &engine,
        ),
        Command::Render {
            url,
            method,
            body,
            headers,
            provoke_events,
            engine,
        } => render_once(url, &method, body, &headers, provoke_events, &engine),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("render-proxy: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn serve(config: ServerConfig, engine: &EngineArgs) -> anyhow::Result<()> {
    let worker = engine.spawn_worker()?;
    let server = RenderServer::bind(config, worker)?;
    server.run()?;
    Ok(())
}

fn render_once(
    url: String,
    method: &str,
    body: Option<String>,
    headers: &[String],
    provoke_events: bool,
    engine: &EngineArgs,
) -> anyhow::Result<()> {
    let mut request = RenderRequest::get(url).provoke_events(provoke_events);
    request.method = method.parse::<Method>()?;
    request.body = body;
    for raw in headers {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("header '{}' is not in `Name: value` form", raw))?;
        request = request.with_header(name.trim(), value.trim());
    }

    let worker = engine.spawn_worker()?;
    let result = worker.render_blocking(request)?;
    println!("{}", serde_json::to_string_pretty(&result_json(&result))?);
    Ok(())
}

fn result_json(result: &RenderResult) -> serde_json::Value {
    json!({
        "status": result.status,
        "html": result.html,
        "errors": result.errors,
        "consoleMessages": result.console_messages,
        "alerts": result.alerts,
        "confirms": result.confirms,
        "prompts": result.prompts,
    })
}
