//! Observing a run through the hook bus.
//!
//! Installs a sink that prints every lifecycle event, alongside the
//! library's own tracing output (RUST_LOG=agentry=debug to see it).
//!
//! Run with: cargo run --example hooks_tracing

use agentry::hooks::{
    self, Hooks, IterationEvent, LlmResponseEvent, RunEndEvent, RunStartEvent, ToolEndEvent,
    ToolStartEvent,
};
use agentry::{tool, Agent, Llm, LlmConfig, ToolRegistry};
use std::sync::Arc;

struct Printer;

#[async_trait::async_trait]
impl Hooks for Printer {
    async fn on_run_start(&self, event: &RunStartEvent) {
        println!("▶ run [{}]: {:?}", event.agent, event.input);
    }
    async fn on_iter_start(&self, event: &IterationEvent) {
        println!("  iteration {}", event.iteration);
    }
    async fn on_llm_response(&self, event: &LlmResponseEvent) {
        println!(
            "    llm: {:?} ({} out tokens)",
            event.stop_reason, event.usage.output_tokens
        );
    }
    async fn on_tool_start(&self, event: &ToolStartEvent) {
        println!("    tool {}({})", event.tool, event.input);
    }
    async fn on_tool_end(&self, event: &ToolEndEvent) {
        println!("    tool {} -> {:?}", event.tool, event.output);
    }
    async fn on_run_end(&self, event: &RunEndEvent) {
        println!(
            "■ run [{}] done: {} iteration(s), {} tokens",
            event.agent,
            event.iterations,
            event.usage.total()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    hooks::set_hooks(Some(Arc::new(Printer)));

    let llm = Arc::new(Llm::new(
        LlmConfig::builder().provider("anthropic").build()?,
    )?);

    let mut registry = ToolRegistry::new();
    registry.add(
        tool("word_count", "Count words in a text")
            .param("text", "string")
            .build(|args| async move {
                let text = args["text"].as_str().unwrap_or_default();
                Ok(text.split_whitespace().count().to_string())
            }),
    )?;

    let mut agent = Agent::builder()
        .name("counter")
        .instructions("Use word_count rather than counting yourself.")
        .llm(llm)
        .tools(Arc::new(registry))
        .max_iterations(4)
        .build()?;

    let result = agent
        .run("How many words are in: 'the quick brown fox jumps over the lazy dog'?")
        .await?;
    println!("\n{}", result.content);

    hooks::set_hooks(None);
    Ok(())
}
