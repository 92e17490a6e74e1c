//! A ReAct agent with arithmetic tools.
//!
//! The model decides when to call `add` and `divide`; failed calls
//! (division by zero) are fed back as error results and the model
//! recovers on the next iteration.
//!
//! Run with: cargo run --example calculator_agent

use agentry::{format_decimal, tool, Agent, Error, Llm, LlmConfig, Session, ToolRegistry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let llm = Arc::new(Llm::new(
        LlmConfig::builder()
            .provider("anthropic")
            .instructions("Use the calculator tools for any arithmetic. Show only the result.")
            .build()?,
    )?);

    let mut registry = ToolRegistry::new();
    registry.add(
        tool("add", "Add two numbers")
            .param("a", "number")
            .param("b", "number")
            .build(|args| async move {
                let a = args["a"].as_f64().unwrap_or(0.0);
                let b = args["b"].as_f64().unwrap_or(0.0);
                format_decimal(a + b)
            }),
    )?;
    registry.add(
        tool("divide", "Divide a by b")
            .param("a", "number")
            .param("b", "number")
            .build(|args| async move {
                let a = args["a"].as_f64().unwrap_or(0.0);
                let b = args["b"].as_f64().unwrap_or(0.0);
                if b == 0.0 {
                    return Err(Error::invalid_arg("division by zero"));
                }
                format_decimal(a / b)
            }),
    )?;

    let mut session = Session::open();
    let tools = session.register_tools(registry);
    let calculator = session.create_agent(
        Agent::builder()
            .name("calculator")
            .llm(llm)
            .tools(tools)
            .max_iterations(6),
    )?;

    for question in [
        "What is 17 + 25?",
        "What is 100 divided by 8?",
        "What is 5 divided by 0? If that fails, explain why.",
    ] {
        let result = session.run(calculator, question).await?;
        println!("Q: {question}");
        println!("A: {}\n", result.content);
    }

    session.close();
    Ok(())
}
