//! Minimal single-turn chat.
//!
//! Reads `ANTHROPIC_API_KEY` (or set `--provider openai` style config
//! below and `OPENAI_API_KEY`) from the environment.
//!
//! Run with: cargo run --example plain_chat

use agentry::{Agent, Llm, LlmConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let llm = Arc::new(Llm::new(
        LlmConfig::builder()
            .provider("anthropic")
            .instructions("You are a concise assistant.")
            .max_tokens(512)
            .build()?,
    )?);

    let mut agent = Agent::builder()
        .name("assistant")
        .llm(llm)
        .max_iterations(1)
        .build()?;

    let result = agent.run("What is the capital of France?").await?;

    println!("{}", result.content);
    println!(
        "({} iteration(s), {} tokens)",
        result.iterations,
        result.usage.total()
    );
    Ok(())
}
