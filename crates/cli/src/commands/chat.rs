//! `chatweave chat`: send one message and print the answer.

use std::io::Write;
use std::sync::Arc;

use chatweave_chat::{ChatLoop, ChatStreamLoop, ChatStreamPart, ToolCallStatus, ToolStatus};
use chatweave_config::AppConfig;
use chatweave_core::message::{Conversation, Message};
use chatweave_core::progress::Progress;
use chatweave_telemetry::{Scope, TokenUsage};
use tracing::debug;

use crate::tools::builtin_registry;

/// Options of the `chat` command.
pub struct ChatArgs {
    pub message: String,
    pub stream: bool,
    pub system: Option<String>,
    pub report: bool,
}

/// Providers that run locally and need no key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "vllm"];

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early and give a clear error
    let provider_name = config.default_provider.clone();
    if config.api_key_for(&provider_name).is_none()
        && !KEYLESS_PROVIDERS.contains(&provider_name.as_str())
    {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{provider_name}'!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY      (for OpenAI)");
        eprintln!("    MISTRAL_API_KEY     (for Mistral)");
        eprintln!("    CHATWEAVE_API_KEY   (fallback for any provider)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = chatweave_providers::router::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let tools = Arc::new(builtin_registry());
    debug!(provider = %provider.name(), model = %config.chat.model, "Chat command ready");

    let mut conversation = Conversation::new();
    if let Some(system) = &args.system {
        conversation.push(Message::system(system));
    }
    conversation.push(Message::user(&args.message));

    let root = Scope::root("chatweave");
    root.record_arguments(serde_json::json!({
        "provider": provider_name,
        "model": config.chat.model,
        "stream": args.stream,
    }));

    if args.stream {
        let progress = Progress::new(|part: ChatStreamPart| match part {
            ChatStreamPart::Message { content } => {
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            ChatStreamPart::Tool(status) => {
                if let Some(line) = describe(&status) {
                    eprintln!("{line}");
                }
            }
        });
        let chat = ChatStreamLoop::new(provider, config.chat.clone())
            .with_toolset(tools)
            .with_progress(progress);
        let reply = chat.run(&mut conversation, &root).await?;
        println!();
        root.record_result(serde_json::Value::String(reply));
    } else {
        let progress = Progress::new(|status: ToolStatus| {
            if let Some(line) = describe(&status) {
                eprintln!("{line}");
            }
        });
        let chat = ChatLoop::new(provider, config.chat.clone())
            .with_toolset(tools)
            .with_progress(progress);

        eprint!("  Thinking...");
        let reply = chat.run(&mut conversation, &root).await;
        eprint!("\r              \r");
        let reply = reply?;
        println!("{reply}");
        root.record_result(serde_json::Value::String(reply));
    }

    if args.report {
        print_report(&root);
    }

    Ok(())
}

/// One status line for a tool event; intermediate progress is not shown.
fn describe(status: &ToolStatus) -> Option<String> {
    let verb = match status.status {
        ToolCallStatus::Started => "calling",
        ToolCallStatus::Finished => "finished",
        ToolCallStatus::Failed => "failed",
        ToolCallStatus::Progress => return None,
    };
    Some(format!("  [tool] {verb} {} ({})", status.name, status.id))
}

fn print_report(root: &Scope) {
    eprintln!();
    eprintln!("📊 Conversation Report");
    eprintln!("─────────────────────────────────────");
    for line in root.report().render().lines() {
        eprintln!("  {line}");
    }
    if let Some(usage) = root.metric::<TokenUsage>() {
        eprintln!();
        eprintln!("  Input tokens:  {}", usage.input_tokens);
        eprintln!("  Output tokens: {}", usage.output_tokens);
        eprintln!("  Total tokens:  {}", usage.total());
    }
}
