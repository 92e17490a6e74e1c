//! Streaming with the thinking channel enabled.
//!
//! Reasoning deltas print dimmed before the visible answer streams in.
//!
//! Run with: cargo run --example streaming_thinking

use agentry::types::{DeltaKind, Message, StreamControl, StreamEvent};
use agentry::{Llm, LlmConfig};
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let llm = Llm::new(
        LlmConfig::builder()
            .provider("anthropic")
            .thinking(true, 2048)
            .max_tokens(1024)
            .build()?,
    )?;

    let messages = [Message::user(
        "A farmer has 17 sheep. All but 9 run away. How many are left?",
    )];

    let mut in_thinking = false;
    let response = llm
        .chat_stream(&messages, &[], |event| {
            match event {
                StreamEvent::Delta {
                    kind: DeltaKind::Thinking,
                    payload,
                    ..
                } => {
                    if !in_thinking {
                        print!("\x1b[2m[thinking] ");
                        in_thinking = true;
                    }
                    print!("{payload}");
                }
                StreamEvent::Delta {
                    kind: DeltaKind::Text,
                    payload,
                    ..
                } => {
                    if in_thinking {
                        println!("\x1b[0m");
                        in_thinking = false;
                    }
                    print!("{payload}");
                }
                _ => {}
            }
            let _ = std::io::stdout().flush();
            StreamControl::Continue
        })
        .await?;

    println!();
    println!(
        "[{} in / {} out tokens]",
        response.usage.input_tokens, response.usage.output_tokens
    );
    Ok(())
}
